//! Frame synchronization and presentation.
//!
//! This crate drives the per-frame cycle of a Vulkan presenter:
//! - [`FrameSlotRing`]: round-robin frame slots bounding frames in flight
//! - [`FrameSequencer`]: the wait/acquire/record/submit/present state machine
//! - [`CommandRecorder`]: per-frame command recording
//! - [`VulkanPresenter`]: the device-side [`FrameBackend`]
//! - [`FrameController`]: composes the above for the application
//!
//! Teardown follows [`CreationStage::teardown_order`].

pub mod backend;
pub mod controller;
pub mod error;
pub mod lifecycle;
pub mod presenter;
pub mod recorder;
pub mod ring;
pub mod sequencer;

pub use backend::{AcquireOutcome, FrameBackend, PresentOutcome, SubmitPlan};
pub use controller::FrameController;
pub use error::{FrameError, FrameResult, TickPhase};
pub use lifecycle::CreationStage;
pub use presenter::VulkanPresenter;
pub use recorder::CommandRecorder;
pub use ring::FrameSlotRing;
pub use sequencer::{FrameSequencer, TickOutcome};
