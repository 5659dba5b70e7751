//! Sandbox application
//!
//! Opens a window, brings up the renderer and draws the built-in test quad
//! until the window is closed. Resizing and minimizing the window exercise
//! the swapchain recreation path.

use forge_engine::core::{ApplicationConfig, Config, ConfigError};
use forge_engine::foundation::logging;
use forge_engine::foundation::time::Timer;
use forge_engine::platform::{GlfwPlatform, PlatformError, PlatformEvent};
use forge_engine::render::{RenderError, RenderPacket, RendererFrontend};
use thiserror::Error;

const CONFIG_PATH: &str = "forge_sandbox.toml";

/// Errors that stop the sandbox before the first frame
#[derive(Error, Debug)]
enum SandboxError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Window error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Renderer error: {0}")]
    Render(#[from] RenderError),
}

struct SandboxApp {
    // Renderer drops before the window it presents to
    renderer: RendererFrontend,
    platform: GlfwPlatform,
    timer: Timer,
}

impl SandboxApp {
    fn new(config: &ApplicationConfig) -> Result<Self, SandboxError> {
        let platform = GlfwPlatform::new(&config.window)?;
        let renderer = RendererFrontend::new(&config.renderer, &platform)?;

        Ok(Self {
            renderer,
            platform,
            timer: Timer::new(),
        })
    }

    fn run(&mut self) {
        log::info!("Entering main loop");

        while !self.platform.should_close() {
            for event in self.platform.poll_events() {
                match event {
                    PlatformEvent::Resized { width, height } => {
                        log::debug!("Framebuffer resized to {width}x{height}");
                        self.renderer.on_resized(width, height);
                    }
                    PlatformEvent::KeyPressed(glfw::Key::Escape) | PlatformEvent::CloseRequested => {
                        self.platform.set_should_close(true);
                    }
                    PlatformEvent::KeyPressed(_) => {}
                }
            }

            let packet = RenderPacket {
                delta_time: self.timer.tick(),
            };
            if !self.renderer.draw_frame(&packet) {
                log::error!("Frame failed, shutting down");
                break;
            }
        }

        log::info!(
            "Rendered {} frames, {:.1} fps average",
            self.renderer.frame_number(),
            self.timer.average_fps()
        );
        self.renderer.shutdown();
    }
}

fn main() -> Result<(), SandboxError> {
    let config = ApplicationConfig::load_or_default(CONFIG_PATH)?;
    logging::init_with_level(&config.engine.log_level);
    config.validate()?;

    log::info!("Starting {}", config.renderer.application_name);
    let mut app = SandboxApp::new(&config)?;
    app.run();
    Ok(())
}
