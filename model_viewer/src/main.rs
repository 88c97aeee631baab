//! Model viewer
//!
//! Opens a window and spins the configured textured model until the window is
//! closed or Escape is pressed. Settings come from `viewer.toml` in the working
//! directory when present.

use std::path::Path;
use std::process::ExitCode;

use thiserror::Error;
use viewer_engine::config::{Config, ConfigError, ViewerConfig};
use viewer_engine::foundation::logging;
use viewer_engine::render::vulkan::WindowError;
use viewer_engine::render::{FrameOrchestrator, VulkanError, Window};

const CONFIG_PATH: &str = "viewer.toml";

#[derive(Error, Debug)]
enum AppError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("window: {0}")]
    Window(#[from] WindowError),

    #[error("renderer: {0}")]
    Render(#[from] VulkanError),
}

fn load_config() -> Result<ViewerConfig, AppError> {
    let path = Path::new(CONFIG_PATH);
    let config = if path.exists() {
        log::info!("Loading configuration from {}", path.display());
        ViewerConfig::load_from_file(path)?
    } else {
        log::info!("No {} found, using defaults", CONFIG_PATH);
        ViewerConfig::default()
    };
    config.validate()?;
    Ok(config)
}

struct ViewerApp {
    // Dropped before the window so the surface goes before its window
    renderer: FrameOrchestrator,
    window: Window,
}

impl ViewerApp {
    fn new(config: &ViewerConfig) -> Result<Self, AppError> {
        let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
        let mut renderer = FrameOrchestrator::new(&mut window, config)?;

        renderer.load_model(&config.assets.model_path)?;
        renderer.load_texture(&config.assets.texture_path)?;

        Ok(Self { renderer, window })
    }

    fn run(&mut self) -> Result<(), AppError> {
        log::info!("Entering main loop ({:?})", self.renderer.backend());
        while !self.window.should_close() {
            self.window.poll_events();
            if self.window.drain_events() {
                self.renderer.handle_framebuffer_resize();
            }
            self.renderer.draw_frame(&mut self.window)?;
        }
        self.renderer.wait_idle()?;
        Ok(())
    }
}

fn run() -> Result<(), AppError> {
    let config = load_config()?;
    let mut app = ViewerApp::new(&config)?;
    app.run()
}

fn main() -> ExitCode {
    logging::init();
    log::info!("Starting model viewer");

    match run() {
        Ok(()) => {
            log::info!("Model viewer finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Fatal: {}", e);
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
