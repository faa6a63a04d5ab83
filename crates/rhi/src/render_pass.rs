//! Render pass and framebuffers for presenting to swapchain images.
//!
//! [`RenderPass::new_single_color`] builds the one-subpass pass used for every
//! frame: a single color attachment in the swapchain format, cleared on load,
//! stored, and left in `PRESENT_SRC_KHR`. [`Framebuffers`] holds one
//! framebuffer per swapchain image view and is rebuilt with the swapchain.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan render pass wrapper.
pub struct RenderPass {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan render pass handle.
    render_pass: vk::RenderPass,
    /// Format of the color attachment.
    color_format: vk::Format,
}

impl RenderPass {
    /// Creates a render pass with one presentable color attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    pub fn new_single_color(device: Arc<Device>, color_format: vk::Format) -> RhiResult<Self> {
        let attachments = [color_attachment_description(color_format)];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];

        let dependencies = [external_color_dependency()];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        debug!("Created render pass for {:?}", color_format);

        Ok(Self {
            device,
            render_pass,
            color_format,
        })
    }

    /// Returns the Vulkan render pass handle.
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Format the pass was built for.
    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        debug!("Render pass destroyed");
    }
}

/// Color attachment: cleared, stored, `UNDEFINED` to `PRESENT_SRC_KHR`.
pub fn color_attachment_description(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
}

/// Orders the layout transition after the acquire semaphore wait, which
/// happens at `COLOR_ATTACHMENT_OUTPUT`.
pub fn external_color_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
}

/// One framebuffer per swapchain image view.
///
/// Indexed by swapchain image index.
pub struct Framebuffers {
    /// Reference to the logical device.
    device: Arc<Device>,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
}

impl Framebuffers {
    /// Creates a framebuffer for every view.
    ///
    /// # Errors
    ///
    /// Returns an error if any framebuffer creation fails. Framebuffers
    /// created before the failure are destroyed.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let mut framebuffers = Self {
            device,
            framebuffers: Vec::with_capacity(image_views.len()),
            extent,
        };

        for &view in image_views {
            let attachments = [view];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass.handle())
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            // Drop of the partial set cleans up on error
            let framebuffer = unsafe {
                framebuffers
                    .device
                    .handle()
                    .create_framebuffer(&create_info, None)?
            };
            framebuffers.framebuffers.push(framebuffer);
        }

        debug!(
            "Created {} framebuffers at {}x{}",
            framebuffers.framebuffers.len(),
            extent.width,
            extent.height
        );

        Ok(framebuffers)
    }

    /// Framebuffer for swapchain image `image_index`.
    #[inline]
    pub fn get(&self, image_index: usize) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }

    /// Extent all framebuffers were created with.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        for &framebuffer in &self.framebuffers {
            unsafe {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
        }
        debug!("Destroyed {} framebuffers", self.framebuffers.len());
    }
}
