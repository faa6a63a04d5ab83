//! Top-level frame controller.

use ash::vk;
use tracing::{debug, info};

use framepace_core::{Config, Timer};
use framepace_platform::Window;

use crate::error::FrameResult;
use crate::presenter::VulkanPresenter;
use crate::sequencer::{FrameSequencer, TickOutcome};

/// Composes the Vulkan presenter, the frame-slot ring and the sequencer, and
/// reports frame statistics.
pub struct FrameController {
    sequencer: FrameSequencer<VulkanPresenter>,
    timer: Timer,
}

impl FrameController {
    /// Builds all GPU state for `window`.
    ///
    /// # Errors
    ///
    /// Any setup failure aborts construction; nothing is left alive.
    pub fn new(window: &Window, config: &Config) -> FrameResult<Self> {
        let presenter = VulkanPresenter::new(window, config)?;
        let sequencer = FrameSequencer::new(presenter, config.render.frames_in_flight);

        Ok(Self {
            sequencer,
            timer: Timer::new(),
        })
    }

    /// Forwards a window resize. Takes effect before the next acquisition.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.sequencer.request_resize(vk::Extent2D { width, height });
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// Returns fatal device errors; the caller should stop the loop and call
    /// [`shutdown`](Self::shutdown).
    pub fn tick(&mut self) -> FrameResult<TickOutcome> {
        let outcome = self.sequencer.tick()?;
        self.timer.tick();

        if let TickOutcome::Presented { .. } = outcome
            && let Some(stats) = self.timer.record_frame()
        {
            debug!(
                "{} frames in {:.2}s: {:.1} fps, {:.2} ms/frame",
                stats.frames,
                stats.elapsed.as_secs_f64(),
                stats.fps(),
                stats.avg_frame_ms()
            );
        }

        Ok(outcome)
    }

    /// Waits for the device and releases everything in reverse creation
    /// order. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the idle-wait failure, if any. Teardown runs regardless.
    pub fn shutdown(&mut self) -> FrameResult<()> {
        if self.sequencer.is_shut_down() {
            return Ok(());
        }
        info!(
            "Shutting down after {:.1}s, {} frame(s) submitted",
            self.timer.elapsed().as_secs_f64(),
            self.sequencer.frames_submitted()
        );
        self.sequencer.shutdown()
    }

    #[inline]
    pub fn sequencer(&self) -> &FrameSequencer<VulkanPresenter> {
        &self.sequencer
    }

    #[inline]
    pub fn frames_submitted(&self) -> u64 {
        self.sequencer.frames_submitted()
    }
}
