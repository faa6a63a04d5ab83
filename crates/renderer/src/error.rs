//! Error types for frame sequencing.

use std::fmt;

use thiserror::Error;

use framepace_rhi::RhiError;

use crate::lifecycle::CreationStage;

/// Phase of the per-tick state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TickPhase {
    /// Waiting on the current slot's fence.
    WaitSlot,
    /// Acquiring the next swapchain image.
    Acquire,
    /// Recording the slot's command buffer.
    Record,
    /// Submitting to the graphics queue.
    Submit,
    /// Queueing the image for presentation.
    Present,
    /// Between ticks.
    #[default]
    Idle,
    /// Recreating the swapchain and its dependents.
    Rebuild,
    /// Waiting for the device before releasing resources.
    Teardown,
}

impl TickPhase {
    pub fn name(self) -> &'static str {
        match self {
            TickPhase::WaitSlot => "wait-slot",
            TickPhase::Acquire => "acquire",
            TickPhase::Record => "record",
            TickPhase::Submit => "submit",
            TickPhase::Present => "present",
            TickPhase::Idle => "idle",
            TickPhase::Rebuild => "rebuild",
            TickPhase::Teardown => "teardown",
        }
    }
}

impl fmt::Display for TickPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors surfaced by the frame controller.
///
/// Every variant is fatal for the controller: the caller is expected to shut
/// down rather than keep ticking.
#[derive(Error, Debug)]
pub enum FrameError {
    /// A setup collaborator failed while building `stage`.
    #[error("failed to create {stage}: {source}")]
    Setup {
        stage: CreationStage,
        #[source]
        source: RhiError,
    },

    /// Window or configuration failure.
    #[error(transparent)]
    Core(#[from] framepace_core::Error),

    /// A device operation failed during a tick.
    #[error("{phase} phase failed: {source}")]
    Device {
        phase: TickPhase,
        #[source]
        source: RhiError,
    },

    /// The presentation engine returned an image index outside the pool.
    #[error("acquired image index {image_index} is outside the {image_count}-image swapchain")]
    ImageIndexOutOfRange { image_index: u32, image_count: u32 },
}

impl FrameError {
    pub(crate) fn setup(stage: CreationStage) -> impl FnOnce(RhiError) -> Self {
        move |source| FrameError::Setup { stage, source }
    }

    pub(crate) fn device(phase: TickPhase) -> impl FnOnce(RhiError) -> Self {
        move |source| FrameError::Device { phase, source }
    }

    /// True when the device was lost.
    pub fn is_device_lost(&self) -> bool {
        matches!(
            self,
            FrameError::Device {
                source: RhiError::VulkanError(framepace_rhi::vk::Result::ERROR_DEVICE_LOST),
                ..
            }
        )
    }
}

/// Result alias for frame operations.
pub type FrameResult<T> = std::result::Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use super::*;
    use framepace_rhi::vk;

    #[test]
    fn test_phase_display() {
        assert_eq!(TickPhase::WaitSlot.to_string(), "wait-slot");
        assert_eq!(TickPhase::default(), TickPhase::Idle);
    }

    #[test]
    fn test_device_error_message() {
        let err = FrameError::device(TickPhase::Submit)(RhiError::VulkanError(
            vk::Result::ERROR_DEVICE_LOST,
        ));
        assert!(err.to_string().starts_with("submit phase failed"));
        assert!(err.is_device_lost());
    }

    #[test]
    fn test_setup_error_names_stage() {
        let err = FrameError::setup(CreationStage::RenderPass)(RhiError::NoSuitableGpu);
        assert!(err.to_string().contains("render pass"));
        assert!(!err.is_device_lost());
    }
}
