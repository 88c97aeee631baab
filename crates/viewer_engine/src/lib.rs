//! # Viewer Engine
//!
//! A single-window Vulkan renderer that loads a textured OBJ model and spins
//! it in front of a perspective camera.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use viewer_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ViewerConfig::default();
//!     let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
//!     let mut renderer = FrameOrchestrator::new(&mut window, &config)?;
//!     renderer.load_model(&config.assets.model_path)?;
//!     renderer.load_texture(&config.assets.texture_path)?;
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         if window.drain_events() {
//!             renderer.handle_framebuffer_resize();
//!         }
//!         renderer.draw_frame(&mut window)?;
//!     }
//!     renderer.wait_idle()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for viewer users
pub mod prelude {
    pub use crate::{
        assets::{ImageData, MeshData, ObjLoader},
        config::{Config, ViewerConfig},
        foundation::logging,
        render::{FrameOrchestrator, FrameStatus, RenderingBackend, Vertex, VulkanError, VulkanResult, Window},
    };
}
