//! The device-facing seam of the frame sequencer.
//!
//! [`FrameSequencer`](crate::sequencer::FrameSequencer) decides *what* happens
//! each tick and with which slot, image and semaphore indices; a
//! [`FrameBackend`] carries each step out against a device. The Vulkan
//! implementation lives in [`presenter`](crate::presenter).

use ash::vk;

use framepace_rhi::RhiResult;
pub use framepace_rhi::swapchain::{AcquireOutcome, PresentOutcome};

use crate::lifecycle::CreationStage;

/// Indices for one graphics submission.
///
/// `wait_semaphore` is taken from the slot's pair (the one handed to the
/// acquire); `signal_semaphore` is taken from the acquired image's pair, so the
/// present for image `i` always waits on the semaphore rendering into `i`
/// signaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitPlan {
    pub slot: usize,
    pub image_index: u32,
    /// Index of the pair whose image-acquired semaphore is waited on.
    pub wait_semaphore: usize,
    /// Index of the pair whose render-finished semaphore is signaled.
    pub signal_semaphore: usize,
    /// Stage at which the wait happens.
    pub wait_stage: vk::PipelineStageFlags,
}

impl SubmitPlan {
    pub fn new(slot: usize, image_index: u32) -> Self {
        Self {
            slot,
            image_index,
            wait_semaphore: slot,
            signal_semaphore: image_index as usize,
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        }
    }
}

/// Device operations the sequencer drives.
pub trait FrameBackend {
    /// Number of images in the current swapchain.
    fn image_count(&self) -> u32;

    /// Extent of the current swapchain.
    fn extent(&self) -> vk::Extent2D;

    /// Blocks until the previous submission using `slot` has completed.
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()>;

    /// Returns the slot's fence to the unsignaled state. Only called once an
    /// image has been acquired for the slot.
    fn reset_slot(&mut self, slot: usize) -> RhiResult<()>;

    /// Requests the next image, signaling the image-acquired semaphore of
    /// pair `semaphore` when it is ready.
    fn acquire_image(&mut self, semaphore: usize) -> RhiResult<AcquireOutcome>;

    /// Records the slot's command buffer for `image_index`.
    fn record(&mut self, slot: usize, image_index: u32) -> RhiResult<()>;

    /// Submits the slot's command buffer, signaling the slot's fence.
    fn submit(&mut self, plan: &SubmitPlan) -> RhiResult<()>;

    /// Queues `image_index` for presentation after the render-finished
    /// semaphore of pair `wait_semaphore` is signaled.
    fn present(&mut self, image_index: u32, wait_semaphore: usize) -> RhiResult<PresentOutcome>;

    /// Extent a swapchain built now for `requested` would get, read from the
    /// surface at call time. Zero while the surface has no area.
    fn surface_extent(&mut self, requested: vk::Extent2D) -> RhiResult<vk::Extent2D>;

    /// Waits for the device, then recreates the swapchain and everything that
    /// depends on it. `extent` comes from [`surface_extent`](Self::surface_extent)
    /// and is never zero.
    fn rebuild(&mut self, extent: vk::Extent2D) -> RhiResult<()>;

    /// Blocks until the device has no pending work.
    fn wait_idle(&mut self) -> RhiResult<()>;

    /// Releases every object created in `stage`. Called in teardown order
    /// after [`wait_idle`](Self::wait_idle).
    fn release(&mut self, stage: CreationStage);
}
