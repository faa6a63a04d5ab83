//! Platform layer: the winit window and the Vulkan surface it presents to.

mod window;

pub use window::{Surface, Window, is_zero_area, required_extensions};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
