//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`]: GPU-side ordering between acquisition, submission and
//!   presentation. Never observed by the CPU.
//! - [`Fence`]: CPU-waitable completion of one submission.
//! - [`SemaphorePair`]: the image-acquired / render-finished pair.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use framepace_rhi::device::Device;
//! use framepace_rhi::sync::{Fence, Semaphore};
//!
//! # fn example(device: Arc<Device>) -> Result<(), framepace_rhi::RhiError> {
//! let image_acquired = Semaphore::new(device.clone())?;
//! // Signaled so the first wait on a fresh frame slot returns immediately
//! let in_flight = Fence::new(device, true)?;
//!
//! in_flight.wait(u64::MAX)?;
//! in_flight.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan semaphore wrapper.
///
/// Created unsignaled and destroyed on drop.
pub struct Semaphore {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan semaphore handle.
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new binary semaphore in the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
///
/// One fence guards each frame slot: it is signaled by the slot's submission
/// and waited on before the slot's command buffer is recorded again.
pub struct Fence {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan fence handle.
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence, optionally in the signaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds pass.
    ///
    /// # Errors
    ///
    /// Returns `vk::Result::TIMEOUT` on expiry, or the driver error
    /// (e.g. `ERROR_DEVICE_LOST`).
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout)?
        };
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be referenced by a pending submission.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

/// Image-acquired and render-finished semaphores sharing one index.
///
/// The acquire half is used by the frame slot with the same index; the
/// render-finished half by the swapchain image with the same index.
pub struct SemaphorePair {
    image_acquired: Semaphore,
    render_finished: Semaphore,
}

impl SemaphorePair {
    /// Creates both semaphores.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            image_acquired: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device)?,
        })
    }

    /// Creates `count` pairs.
    pub fn create_many(device: &Arc<Device>, count: usize) -> RhiResult<Vec<Self>> {
        let pairs = (0..count)
            .map(|_| Self::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        debug!("Created {} semaphore pair(s)", pairs.len());
        Ok(pairs)
    }

    #[inline]
    pub fn image_acquired(&self) -> vk::Semaphore {
        self.image_acquired.handle()
    }

    #[inline]
    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished.handle()
    }
}

/// Number of semaphore pairs needed so that every frame slot and every
/// swapchain image has its own entry.
#[inline]
pub fn semaphore_pair_count(image_count: u32, frames_in_flight: usize) -> usize {
    (image_count as usize).max(frames_in_flight)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_count_covers_images() {
        assert_eq!(semaphore_pair_count(3, 2), 3);
        assert_eq!(semaphore_pair_count(4, 2), 4);
    }

    #[test]
    fn test_pair_count_covers_slots() {
        // A surface capped at 2 images with 3 slots still needs 3 acquire semaphores
        assert_eq!(semaphore_pair_count(2, 3), 3);
        assert_eq!(semaphore_pair_count(2, 2), 2);
    }

    #[test]
    fn test_semaphore_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_fence_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fence>();
    }

    #[test]
    fn test_semaphore_pair_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SemaphorePair>();
    }
}
