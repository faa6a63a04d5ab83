//! Frame presenter - Main Entry Point
//!
//! Opens a window and presents a clear-and-draw frame every tick until the
//! window is closed or a fatal device error occurs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use framepace_core::Config;
use framepace_platform::Window;
use framepace_renderer::{FrameController, TickOutcome};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "framepace", version, about = "Vulkan frame pacing and presentation demo")]
struct Args {
    /// Configuration file; defaults apply when it does not exist
    #[arg(short, long, default_value = "framepace.toml")]
    config: PathBuf,

    /// Force validation layers on
    #[arg(long, conflicts_with = "no_validation")]
    validation: bool,

    /// Force validation layers off
    #[arg(long)]
    no_validation: bool,

    /// Exit after presenting this many frames
    #[arg(long)]
    frames: Option<u64>,
}

struct App {
    config: Config,
    frame_limit: Option<u64>,
    /// Declared before `window` so it drops first; its surface needs the window alive.
    controller: Option<FrameController>,
    window: Option<Window>,
    failed: bool,
}

impl App {
    fn new(config: Config, frame_limit: Option<u64>) -> Self {
        Self {
            config,
            frame_limit,
            controller: None,
            window: None,
            failed: false,
        }
    }

    /// Tears the controller down before the window it renders to.
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut controller) = self.controller.take()
            && let Err(e) = controller.shutdown()
        {
            error!("Shutdown reported: {}", e);
            self.failed = true;
        }
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                self.failed = true;
                event_loop.exit();
                return;
            }
        };

        match FrameController::new(&window, &self.config) {
            Ok(controller) => {
                info!("Initialization complete, entering main loop");
                self.controller = Some(controller);
                self.window = Some(window);
            }
            Err(e) => {
                error!("Failed to initialize presenter: {}", e);
                self.failed = true;
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                info!("Window resized to {}x{}", size.width, size.height);
                if let Some(ref mut controller) = self.controller {
                    controller.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(ref mut controller) = self.controller else {
                    return;
                };
                match controller.tick() {
                    Ok(TickOutcome::Presented { .. } | TickOutcome::Suspended) => {}
                    Ok(TickOutcome::Skipped) => warn!("Frame skipped"),
                    Err(e) => {
                        error!("Fatal frame error: {}", e);
                        self.failed = true;
                        self.shutdown(event_loop);
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let limit_reached = match (self.frame_limit, &self.controller) {
            (Some(limit), Some(controller)) => controller.frames_submitted() >= limit,
            _ => false,
        };
        if limit_reached {
            info!("Frame limit reached, exiting");
            self.shutdown(event_loop);
            return;
        }

        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    framepace_core::init_logging();
    info!("Starting frame presenter");

    let mut config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if args.validation {
        config.render.validation = Some(true);
    } else if args.no_validation {
        config.render.validation = Some(false);
    }
    config.validate().context("invalid configuration")?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, args.frames);
    event_loop.run_app(&mut app)?;

    if app.failed {
        anyhow::bail!("presenter stopped after a fatal error");
    }
    info!("Exited cleanly");
    Ok(())
}
