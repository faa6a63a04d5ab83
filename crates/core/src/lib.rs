//! Core utilities for the frame presenter.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - Configuration loading

mod config;
mod error;
mod logging;
mod timer;

pub use config::{
    Config, MAX_FRAMES_IN_FLIGHT_LIMIT, PresentModePreference, RenderConfig, ShaderConfig,
    WindowConfig,
};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FrameStats, Timer};
