//! Per-tick acquisition, submission and presentation state machine.
//!
//! Each [`tick`](FrameSequencer::tick) walks
//! `WaitSlot → Acquire → Record → Submit → Present → Idle` for the current
//! frame slot. Staleness reported by the presentation engine is absorbed by
//! rebuilding the swapchain; every other device failure is returned as a
//! fatal [`FrameError`].

use ash::vk;
use tracing::{debug, error, info, trace, warn};

use framepace_platform::is_zero_area;

use crate::backend::{AcquireOutcome, FrameBackend, SubmitPlan};
use crate::error::{FrameError, FrameResult, TickPhase};
use crate::lifecycle::CreationStage;
use crate::ring::FrameSlotRing;

/// Result of one non-fatal tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was submitted and queued for presentation.
    Presented { slot: usize, image_index: u32 },
    /// No image could be acquired; the slot is reused by the next tick.
    Skipped,
    /// The window or its surface has no area; no image was acquired.
    Suspended,
}

/// What the acquire phase produced.
enum Acquired {
    Image { image_index: u32, suboptimal: bool },
    Skipped,
    Suspended,
}

/// Drives a [`FrameBackend`] through the frame-slot ring.
pub struct FrameSequencer<B: FrameBackend> {
    backend: B,
    ring: FrameSlotRing,
    /// Latest window size reported through [`request_resize`](Self::request_resize).
    target_extent: vk::Extent2D,
    /// Set by resizes and stale acquire/present results.
    needs_rebuild: bool,
    phase: TickPhase,
    frames_submitted: u64,
    rebuilds: u64,
    shut_down: bool,
}

impl<B: FrameBackend> FrameSequencer<B> {
    pub fn new(backend: B, frames_in_flight: usize) -> Self {
        let target_extent = backend.extent();
        let ring = FrameSlotRing::new(frames_in_flight);
        info!(
            "Frame sequencer ready: {} slot(s), {} swapchain image(s)",
            ring.len(),
            backend.image_count()
        );
        Self {
            backend,
            ring,
            target_extent,
            needs_rebuild: false,
            phase: TickPhase::Idle,
            frames_submitted: 0,
            rebuilds: 0,
            shut_down: false,
        }
    }

    /// Records a new window size. The swapchain is rebuilt before the next
    /// acquisition if the size differs from the current swapchain extent.
    pub fn request_resize(&mut self, extent: vk::Extent2D) {
        self.target_extent = extent;
        if is_zero_area(extent.width, extent.height) {
            debug!("Window minimized, suspending ticks");
            return;
        }
        if extent != self.backend.extent() {
            debug!("Resize to {}x{} requested", extent.width, extent.height);
            self.needs_rebuild = true;
        }
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// Returns an error for any device failure other than swapchain
    /// staleness, and when the presentation engine hands back an image index
    /// outside the pool. The caller should stop ticking and shut down.
    pub fn tick(&mut self) -> FrameResult<TickOutcome> {
        if self.shut_down {
            warn!("tick() called after shutdown");
            return Ok(TickOutcome::Suspended);
        }
        if is_zero_area(self.target_extent.width, self.target_extent.height) {
            self.enter(TickPhase::Idle);
            return Ok(TickOutcome::Suspended);
        }
        if self.needs_rebuild && !self.rebuild()? {
            self.enter(TickPhase::Idle);
            return Ok(TickOutcome::Suspended);
        }

        let slot = self.ring.current();

        self.enter(TickPhase::WaitSlot);
        self.backend
            .wait_for_slot(slot)
            .map_err(FrameError::device(TickPhase::WaitSlot))?;

        self.enter(TickPhase::Acquire);
        let (image_index, suboptimal) = match self.acquire(slot)? {
            Acquired::Image {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            Acquired::Skipped => {
                self.enter(TickPhase::Idle);
                return Ok(TickOutcome::Skipped);
            }
            Acquired::Suspended => {
                self.enter(TickPhase::Idle);
                return Ok(TickOutcome::Suspended);
            }
        };

        let image_count = self.backend.image_count();
        if image_index >= image_count {
            return Err(FrameError::ImageIndexOutOfRange {
                image_index,
                image_count,
            });
        }
        if suboptimal {
            debug!("Acquired image {} from a suboptimal swapchain", image_index);
            self.needs_rebuild = true;
        }

        self.enter(TickPhase::Record);
        self.backend
            .reset_slot(slot)
            .map_err(FrameError::device(TickPhase::Record))?;
        self.backend
            .record(slot, image_index)
            .map_err(FrameError::device(TickPhase::Record))?;

        self.enter(TickPhase::Submit);
        let plan = SubmitPlan::new(slot, image_index);
        self.backend
            .submit(&plan)
            .map_err(FrameError::device(TickPhase::Submit))?;

        self.enter(TickPhase::Present);
        let outcome = self
            .backend
            .present(image_index, plan.signal_semaphore)
            .map_err(FrameError::device(TickPhase::Present))?;
        if outcome.is_stale() {
            debug!("Present reported {:?}, rebuilding next tick", outcome);
            self.needs_rebuild = true;
        }

        self.enter(TickPhase::Idle);
        self.ring.advance();
        self.frames_submitted += 1;

        Ok(TickOutcome::Presented { slot, image_index })
    }

    /// Acquires an image, rebuilding and retrying once on staleness.
    fn acquire(&mut self, slot: usize) -> FrameResult<Acquired> {
        match self.acquire_once(slot)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => Ok(Acquired::Image {
                image_index,
                suboptimal,
            }),
            AcquireOutcome::Timeout => {
                warn!("Image acquisition timed out, skipping frame");
                self.needs_rebuild = true;
                Ok(Acquired::Skipped)
            }
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date at acquire, rebuilding");
                if !self.rebuild()? {
                    return Ok(Acquired::Suspended);
                }
                self.enter(TickPhase::Acquire);
                match self.acquire_once(slot)? {
                    AcquireOutcome::Acquired {
                        image_index,
                        suboptimal,
                    } => Ok(Acquired::Image {
                        image_index,
                        suboptimal,
                    }),
                    outcome => {
                        warn!("Acquire still {:?} after rebuild, skipping frame", outcome);
                        self.needs_rebuild = true;
                        Ok(Acquired::Skipped)
                    }
                }
            }
        }
    }

    fn enter(&mut self, phase: TickPhase) {
        trace!("{} -> {}", self.phase, phase);
        self.phase = phase;
    }

    fn acquire_once(&mut self, slot: usize) -> FrameResult<AcquireOutcome> {
        self.backend
            .acquire_image(slot)
            .map_err(FrameError::device(TickPhase::Acquire))
    }

    /// Rebuilds for the size the surface reports now. Returns `false` and
    /// leaves the swapchain alone while that size is zero, which happens when
    /// a minimize reaches the swapchain before the resize event arrives.
    fn rebuild(&mut self) -> FrameResult<bool> {
        self.enter(TickPhase::Rebuild);
        let requested = self.target_extent;
        let surface = self
            .backend
            .surface_extent(requested)
            .map_err(FrameError::device(TickPhase::Rebuild))?;
        if is_zero_area(surface.width, surface.height) {
            debug!(
                "Surface reports {}x{}, deferring rebuild",
                surface.width, surface.height
            );
            self.needs_rebuild = true;
            return Ok(false);
        }

        self.backend
            .rebuild(surface)
            .map_err(FrameError::device(TickPhase::Rebuild))?;
        self.needs_rebuild = false;
        self.rebuilds += 1;

        let extent = self.backend.extent();
        info!(
            "Swapchain rebuilt: {}x{} (requested {}x{}), {} image(s)",
            extent.width,
            extent.height,
            requested.width,
            requested.height,
            self.backend.image_count()
        );
        Ok(true)
    }

    /// Waits for the device to go idle, then releases every stage in
    /// teardown order. A failed wait is reported after teardown completes.
    ///
    /// Calling this more than once is a no-op.
    pub fn shutdown(&mut self) -> FrameResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        self.enter(TickPhase::Teardown);

        let idle = self.backend.wait_idle();
        if let Err(e) = &idle {
            error!("Device did not reach idle before teardown: {}", e);
        }

        for stage in CreationStage::teardown_order() {
            debug!("Releasing {}", stage);
            self.backend.release(stage);
        }

        self.enter(TickPhase::Idle);
        info!(
            "Frame sequencer shut down after {} frame(s), {} rebuild(s)",
            self.frames_submitted, self.rebuilds
        );
        idle.map_err(FrameError::device(TickPhase::Teardown))
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn ring(&self) -> &FrameSlotRing {
        &self.ring
    }

    /// Phase the last tick reached; stays at the failing phase after an error.
    #[inline]
    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    #[inline]
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    #[inline]
    pub fn target_extent(&self) -> vk::Extent2D {
        self.target_extent
    }

    #[inline]
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    #[inline]
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl<B: FrameBackend> Drop for FrameSequencer<B> {
    fn drop(&mut self) {
        if !self.shut_down
            && let Err(e) = self.shutdown()
        {
            error!("Teardown during drop reported: {}", e);
        }
    }
}
