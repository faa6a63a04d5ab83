//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Thin RAII wrappers over `ash` for everything the frame presenter creates:
//! - Instance, validation messenger, physical and logical device selection
//! - Swapchain pool with acquisition and presentation outcomes
//! - Render pass, framebuffers, shaders and the graphics pipeline
//! - Command pools and buffers
//! - Synchronization primitives

mod error;

pub mod command;
pub mod debug;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
