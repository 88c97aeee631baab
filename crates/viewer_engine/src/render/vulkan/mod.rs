//! Vulkan rendering backend
//!
//! Thin RAII wrappers over ash. Every wrapper keeps a clone of the logical
//! device, exposes an idempotent `destroy()`, and calls it from `Drop`, so
//! owners can tear down in an explicit order and still be safe on early exit.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor;
pub mod framebuffer;
pub mod image;
pub mod pipeline;
pub mod render_pass;
pub mod swapchain;
pub mod sync;
pub mod window;

pub use buffer::{GpuBuffer, MappingState};
pub use commands::CommandDispatcher;
pub use context::{find_memory_type, find_supported_format, GraphicsContext, RenderingBackend};
pub use descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
pub use framebuffer::Framebuffer;
pub use image::{transition_masks, GpuImage, TransitionMasks};
pub use pipeline::{PipelineState, ShaderModule};
pub use render_pass::RenderPass;
pub use swapchain::{PresentationSurface, SwapchainSupport};
pub use sync::{Fence, FrameSynchronizer, Semaphore};
pub use window::{SurfaceWindow, Window, WindowError};

use ash::vk;
use thiserror::Error;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// A requested instance layer is not installed
    #[error("Required layer not supported: {0}")]
    LayerNotSupported(String),

    /// A required instance extension is not available
    #[error("Required instance extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// No physical device met the adapter requirements
    #[error("no suitable GPU")]
    NoSuitableGpu,

    /// No queue family supports both graphics and presentation
    #[error("no graphics+present queue")]
    NoGraphicsPresentQueue,

    /// No suitable memory type found for allocation
    #[error("no suitable memory type")]
    NoSuitableMemoryType,

    /// None of the candidate formats has the requested features
    #[error("no supported format")]
    NoSupportedFormat,

    /// `copy_data` was called on an unmapped buffer
    #[error("buffer not mapped")]
    BufferNotMapped,

    /// Bind or draw on a mesh that holds no data
    #[error("cannot operate on empty mesh")]
    EmptyMesh,

    /// Image layout pair outside the supported upload sequence
    #[error("unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        /// Layout the image is in
        old: vk::ImageLayout,
        /// Layout requested
        new: vk::ImageLayout,
    },

    /// Windowing failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Asset loading failure
    #[error("Asset error: {0}")]
    Asset(#[from] crate::assets::AssetError),
}

impl From<crate::assets::ObjError> for VulkanError {
    fn from(err: crate::assets::ObjError) -> Self {
        Self::Asset(err.into())
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
