//! Swapchain pool: presentable images, their views, acquisition and
//! presentation.
//!
//! The [`Swapchain`] is a versioned unit. Format, extent, present mode, images
//! and views are replaced together by [`Swapchain::recreate`], and the
//! [`generation`](Swapchain::generation) counter advances each time so that
//! dependents (framebuffers, per-image semaphores) can tell whether they were
//! built against the current set.
//!
//! Images are always created with `EXCLUSIVE` sharing. When graphics and
//! presentation run on different queue families the caller is responsible for
//! the ownership transfer barriers.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use framepace_rhi::device::Device;
//! use framepace_rhi::instance::Instance;
//! use framepace_rhi::swapchain::{AcquireOutcome, Swapchain, SwapchainDesc};
//! use ash::vk;
//!
//! # fn example(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR,
//! #     image_acquired: vk::Semaphore) -> framepace_rhi::RhiResult<()> {
//! let desc = SwapchainDesc {
//!     surface,
//!     extent: vk::Extent2D { width: 800, height: 600 },
//!     preferred_present_mode: vk::PresentModeKHR::MAILBOX,
//! };
//! let swapchain = Swapchain::new(instance, device, &desc)?;
//!
//! match swapchain.acquire(u64::MAX, image_acquired)? {
//!     AcquireOutcome::Acquired { image_index, .. } => { /* record and submit */ }
//!     AcquireOutcome::OutOfDate | AcquireOutcome::Timeout => { /* rebuild */ }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Surface format every swapchain tries first.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// What the surface supports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the surface queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// True if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Parameters for building or rebuilding a swapchain.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    /// Target surface.
    pub surface: vk::SurfaceKHR,
    /// Requested extent, used when the surface leaves the choice to us.
    pub extent: vk::Extent2D,
    /// Present mode used when supported; FIFO otherwise.
    pub preferred_present_mode: vk::PresentModeKHR,
}

/// Result of asking the swapchain for the next writable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired; its semaphore will be signaled when writable.
    Acquired {
        /// Index into the swapchain image set.
        image_index: u32,
        /// The swapchain still works but no longer matches the surface.
        suboptimal: bool,
    },
    /// The swapchain no longer matches the surface and must be rebuilt.
    OutOfDate,
    /// No image became available before the timeout.
    Timeout,
}

impl AcquireOutcome {
    /// Maps the raw acquisition result onto an outcome.
    ///
    /// Errors other than staleness and timeouts are returned unchanged.
    pub fn from_vk(result: Result<(u32, bool), vk::Result>) -> RhiResult<Self> {
        match result {
            Ok((image_index, suboptimal)) => Ok(Self::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::OutOfDate),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Ok(Self::Timeout),
            Err(e) => Err(e.into()),
        }
    }
}

/// Result of queueing an image for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented, but the swapchain should be rebuilt.
    Suboptimal,
    /// Not presented; the swapchain must be rebuilt.
    OutOfDate,
}

impl PresentOutcome {
    pub fn from_vk(result: Result<bool, vk::Result>) -> RhiResult<Self> {
        match result {
            Ok(false) => Ok(Self::Presented),
            Ok(true) => Ok(Self::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// True when the next tick has to rebuild before acquiring.
    #[inline]
    pub fn is_stale(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// Swapchain state produced by one creation call.
struct SwapchainParts {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    surface_format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

/// Vulkan swapchain wrapper.
///
/// Owns the swapchain handle and one color view per image. The images
/// themselves belong to the presentation engine.
///
/// # Thread Safety
///
/// Not thread-safe. Acquisition, presentation and rebuild must be driven from
/// one thread.
pub struct Swapchain {
    /// Reference to the logical device
    device: Arc<Device>,
    /// Swapchain extension loader
    swapchain_loader: ash::khr::swapchain::Device,
    /// Surface extension loader
    surface_loader: ash::khr::surface::Instance,
    /// Swapchain handle
    swapchain: vk::SwapchainKHR,
    /// Swapchain images (owned by the presentation engine)
    images: Vec<vk::Image>,
    /// Image views for the swapchain images
    image_views: Vec<vk::ImageView>,
    /// Format and color space of the images
    surface_format: vk::SurfaceFormatKHR,
    /// Swapchain extent (resolution)
    extent: vk::Extent2D,
    /// Incremented on every rebuild
    generation: u64,
}

impl Swapchain {
    /// Creates a new swapchain for `desc.surface`.
    ///
    /// # Errors
    ///
    /// Returns an error if surface queries fail, the surface reports no
    /// formats or present modes, or swapchain or view creation fails.
    pub fn new(instance: &Instance, device: Arc<Device>, desc: &SwapchainDesc) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let parts = create_parts(
            &device,
            &swapchain_loader,
            &surface_loader,
            desc,
            vk::SwapchainKHR::null(),
        )?;

        Ok(Self {
            device,
            swapchain_loader,
            surface_loader,
            swapchain: parts.swapchain,
            images: parts.images,
            image_views: parts.image_views,
            surface_format: parts.surface_format,
            extent: parts.extent,
            generation: 0,
        })
    }

    /// Rebuilds the swapchain for the surface's current state.
    ///
    /// The old handle is passed as `old_swapchain` and destroyed after the
    /// new one exists. Old views are destroyed before creation, so on error
    /// the swapchain has no views and must not be used for acquisition.
    ///
    /// # Safety contract
    ///
    /// No submitted work may still reference the old images or views. This
    /// waits for device idle first.
    ///
    /// # Errors
    ///
    /// Returns an error if the idle wait or creation fails.
    pub fn recreate(&mut self, desc: &SwapchainDesc) -> RhiResult<()> {
        self.device.wait_idle()?;

        info!(
            "Recreating swapchain for {}x{}",
            desc.extent.width, desc.extent.height
        );

        self.destroy_image_views();

        let old_swapchain = self.swapchain;
        let parts = create_parts(
            &self.device,
            &self.swapchain_loader,
            &self.surface_loader,
            desc,
            old_swapchain,
        )?;

        unsafe {
            self.swapchain_loader.destroy_swapchain(old_swapchain, None);
        }

        self.swapchain = parts.swapchain;
        self.images = parts.images;
        self.image_views = parts.image_views;
        self.surface_format = parts.surface_format;
        self.extent = parts.extent;
        self.generation += 1;

        Ok(())
    }

    /// Extent a rebuild for `requested` would produce right now.
    ///
    /// Zero while the window is minimized, even before the window system
    /// has reported the new size.
    ///
    /// # Errors
    ///
    /// Returns an error if the capability query fails.
    pub fn surface_extent(
        &self,
        surface: vk::SurfaceKHR,
        requested: vk::Extent2D,
    ) -> RhiResult<vk::Extent2D> {
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.device.physical_device(), surface)?
        };
        Ok(choose_extent(
            &capabilities,
            requested.width,
            requested.height,
        ))
    }

    /// Requests the next writable image, signaling `semaphore` when it is
    /// ready.
    ///
    /// The returned index is chosen by the presentation engine and need not
    /// follow any order.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than staleness or timeout.
    pub fn acquire(&self, timeout: u64, semaphore: vk::Semaphore) -> RhiResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        };
        AcquireOutcome::from_vk(result)
    }

    /// Queues `image_index` for presentation after all `wait_semaphores`.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than staleness.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> RhiResult<PresentOutcome> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };
        PresentOutcome::from_vk(result)
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    /// Returns the swapchain extent (resolution).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Number of rebuilds since creation.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns all swapchain images.
    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Returns all image views.
    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    fn destroy_image_views(&mut self) {
        for &image_view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
        debug!("Destroyed {} image views", self.image_views.len());
        self.image_views.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();

        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader
                    .destroy_swapchain(self.swapchain, None);
            }
            info!(
                "Swapchain destroyed (was {}x{}, {} images, generation {})",
                self.extent.width,
                self.extent.height,
                self.images.len(),
                self.generation
            );
        }
    }
}

fn create_parts(
    device: &Device,
    swapchain_loader: &ash::khr::swapchain::Device,
    surface_loader: &ash::khr::surface::Instance,
    desc: &SwapchainDesc,
    old_swapchain: vk::SwapchainKHR,
) -> RhiResult<SwapchainParts> {
    let support =
        SwapchainSupportDetails::query(device.physical_device(), desc.surface, surface_loader)?;

    if !support.is_adequate() {
        return Err(RhiError::SwapchainError(
            "Inadequate swapchain support (no formats or present modes)".to_string(),
        ));
    }

    let surface_format = choose_surface_format(&support.formats)?;
    let present_mode = choose_present_mode(&support.present_modes, desc.preferred_present_mode);
    let extent = choose_extent(&support.capabilities, desc.extent.width, desc.extent.height);
    let image_count = determine_image_count(&support.capabilities);

    info!(
        "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
        extent.width,
        extent.height,
        surface_format.format,
        surface_format.color_space,
        present_mode,
        image_count
    );

    // Ownership between split queue families is transferred with barriers
    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(desc.surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(support.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(old_swapchain);

    let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

    let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
        Ok(images) => images,
        Err(e) => {
            unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
            return Err(e.into());
        }
    };
    info!("Swapchain created with {} images", images.len());

    let image_views = match create_image_views(device, &images, surface_format.format) {
        Ok(views) => views,
        Err(e) => {
            unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
            return Err(e);
        }
    };

    Ok(SwapchainParts {
        swapchain,
        images,
        image_views,
        surface_format,
        extent,
    })
}

/// Chooses the surface format.
///
/// Takes [`PREFERRED_SURFACE_FORMAT`] on an exact format and color space
/// match, otherwise the first advertised entry unchanged.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> RhiResult<vk::SurfaceFormatKHR> {
    if let Some(&format) = formats.iter().find(|f| {
        f.format == PREFERRED_SURFACE_FORMAT.format
            && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
    }) {
        debug!("Selected preferred surface format: B8G8R8A8_SRGB with SRGB_NONLINEAR");
        return Ok(format);
    }

    let first = formats
        .first()
        .copied()
        .ok_or_else(|| RhiError::SwapchainError("Surface reports no formats".to_string()))?;
    warn!(
        "Preferred surface format unavailable, using {:?} / {:?}",
        first.format, first.color_space
    );
    Ok(first)
}

/// Chooses `preferred` if the surface supports it, FIFO otherwise.
///
/// FIFO is the only mode every surface must support.
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if present_modes.contains(&preferred) {
        debug!("Selected {:?} present mode", preferred);
        return preferred;
    }

    debug!("{:?} unsupported, selected FIFO present mode", preferred);
    vk::PresentModeKHR::FIFO
}

/// Chooses the swapchain extent.
///
/// A defined current extent wins. Otherwise (width `u32::MAX`) the requested
/// size is clamped to the surface's min/max image extent.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        debug!(
            "Using current surface extent: {}x{}",
            capabilities.current_extent.width, capabilities.current_extent.height
        );
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{})",
        extent.width, extent.height, width, height
    );

    extent
}

/// One image more than the minimum, capped by `max_image_count` unless that
/// is 0 (uncapped).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count.saturating_add(1);

    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );

        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for &view in &image_views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::SwapchainError(format!(
                    "Failed to create image view {}: {:?}",
                    i, e
                )));
            }
        }
    }

    debug!("Created {} image views", image_views.len());
    Ok(image_views)
}
