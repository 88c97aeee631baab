//! Rendering
//!
//! `vulkan` holds the RAII wrappers around device objects. The modules at this
//! level build the frame on top of them: vertex and uniform layouts, the mesh,
//! the backend-specific attachment pass, the frame protocol and the
//! orchestrator that owns it all.

pub mod frame;
pub mod frame_pass;
pub mod mesh;
pub mod renderer;
pub mod uniform;
pub mod vertex;
pub mod vulkan;

pub use frame::{FrameBackend, FrameCycle, FrameStatus};
pub use frame_pass::FramePass;
pub use mesh::RenderableMesh;
pub use renderer::FrameOrchestrator;
pub use uniform::UniformBufferObject;
pub use vertex::Vertex;
pub use vulkan::{RenderingBackend, VulkanError, VulkanResult, Window};
