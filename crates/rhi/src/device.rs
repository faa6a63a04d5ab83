//! Vulkan logical device and queue management.
//!
//! The [`Device`] is shared through `Arc` by every RAII wrapper that needs to
//! destroy a device-level object, so it is destroyed only after all of them.
//!
//! # Example
//!
//! ```no_run
//! use framepace_rhi::device::Device;
//! use framepace_rhi::instance::Instance;
//! use framepace_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! # fn example(instance: &Instance, surface: vk::SurfaceKHR) -> framepace_rhi::RhiResult<()> {
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let info = select_physical_device(instance.handle(), surface, &surface_loader)?;
//! let device = Device::new(instance, &info)?;
//! let _graphics = device.graphics_queue();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use crate::error::RhiResult;
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices, REQUIRED_DEVICE_EXTENSIONS};

/// Vulkan logical device wrapper.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// Graphics queue handle.
    graphics_queue: vk::Queue,
    /// Presentation queue handle (same as graphics when the family is shared).
    present_queue: vk::Queue,
    /// Queue family indices.
    queue_families: QueueFamilyIndices,
}

impl Device {
    /// Creates the logical device with one queue per unique family.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue families are incomplete or device
    /// creation fails.
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let queue_families = physical_device_info.queue_families;
        let (graphics_family, present_family) = queue_families.resolved()?;

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let extension_names: Vec<*const std::ffi::c_char> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            REQUIRED_DEVICE_EXTENSIONS.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        debug!(
            "Queues retrieved: graphics family {}, present family {}",
            graphics_family, present_family
        );

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            graphics_queue,
            present_queue,
            queue_families,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the presentation queue handle.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Blocks until all outstanding work on all queues has completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails (e.g. device lost).
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits work to the graphics queue, signaling `fence` on completion.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - All referenced command buffers are fully recorded
    /// - The fence is unsignaled and not in use by another submission
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)?;
        }
        Ok(())
    }

    /// Submits work to the presentation queue without a fence.
    ///
    /// # Safety
    ///
    /// All referenced command buffers must be fully recorded and allocated
    /// from a pool of the present family.
    pub unsafe fn submit_present(&self, submit_infos: &[vk::SubmitInfo]) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.present_queue, submit_infos, vk::Fence::null())?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send+Sync; the remaining fields are plain handles
// and Copy data.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}
