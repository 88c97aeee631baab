//! GPU-resident triangle mesh
//!
//! Vertex and index data are kept on the CPU and mirrored into device-local
//! buffers through a staging upload. Data is only ever replaced wholesale.

use ash::{vk, Device};
use std::path::Path;

use crate::assets::{MeshData, ObjLoader};
use crate::render::vulkan::{CommandDispatcher, GpuBuffer, GraphicsContext, VulkanError, VulkanResult};
use crate::render::Vertex;

/// Reject meshes with no vertices or no indices
pub fn validate_mesh_data(vertices: &[Vertex], indices: &[u32]) -> VulkanResult<()> {
    if vertices.is_empty() || indices.is_empty() {
        return Err(VulkanError::EmptyMesh);
    }
    Ok(())
}

/// Decode an OBJ file into validated mesh data
///
/// The loader reports the load; nothing is logged here.
pub fn read_source<P: AsRef<Path>>(path: P) -> VulkanResult<MeshData> {
    let data = ObjLoader::load_obj(path)?;
    validate_mesh_data(&data.vertices, &data.indices)?;
    Ok(data)
}

/// Copy `bytes` into a new device-local buffer through a host-visible staging buffer
pub fn upload_device_local(
    context: &GraphicsContext,
    commands: &CommandDispatcher,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> VulkanResult<GpuBuffer> {
    let size = bytes.len() as vk::DeviceSize;

    let mut staging = GpuBuffer::new(
        context,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    staging.map()?;
    staging.copy_data(bytes)?;
    staging.unmap();

    let buffer = GpuBuffer::new(
        context,
        size,
        vk::BufferUsageFlags::TRANSFER_DST | usage,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    let command_buffer = commands.begin_one_shot()?;
    buffer.copy_from(&staging, command_buffer);
    commands.end_one_shot(command_buffer)?;

    Ok(buffer)
}

/// Mesh with CPU-side arrays and their device-local copies
#[derive(Default)]
pub struct RenderableMesh {
    device: Option<Device>,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    vertex_buffer: Option<GpuBuffer>,
    index_buffer: Option<GpuBuffer>,
}

impl RenderableMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an OBJ file and upload it
    pub fn load_from_source<P: AsRef<Path>>(
        &mut self,
        context: &GraphicsContext,
        commands: &CommandDispatcher,
        path: P,
    ) -> VulkanResult<()> {
        let data = read_source(path)?;
        self.set_data(context, commands, data.vertices, data.indices)
    }

    /// Replace all data and rebuild both device buffers
    pub fn set_data(
        &mut self,
        context: &GraphicsContext,
        commands: &CommandDispatcher,
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
    ) -> VulkanResult<()> {
        validate_mesh_data(&vertices, &indices)?;

        let vertex_buffer = upload_device_local(
            context,
            commands,
            bytemuck::cast_slice(&vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        let index_buffer = upload_device_local(
            context,
            commands,
            bytemuck::cast_slice(&indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;

        // Old buffers may still be referenced by in-flight frames
        context.wait_idle()?;
        self.destroy();

        self.device = Some(context.device()?.clone());
        self.vertices = vertices;
        self.indices = indices;
        self.vertex_buffer = Some(vertex_buffer);
        self.index_buffer = Some(index_buffer);
        Ok(())
    }

    fn buffers(&self) -> VulkanResult<(&Device, &GpuBuffer, &GpuBuffer)> {
        match (&self.device, &self.vertex_buffer, &self.index_buffer) {
            (Some(device), Some(vertices), Some(indices)) if self.has_data() => Ok((device, vertices, indices)),
            _ => Err(VulkanError::EmptyMesh),
        }
    }

    /// Bind vertex buffer 0 and the UINT32 index buffer
    pub fn bind(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let (device, vertex_buffer, index_buffer) = self.buffers()?;
        unsafe {
            device.cmd_bind_vertex_buffers(command_buffer, 0, &[vertex_buffer.handle()], &[0]);
            device.cmd_bind_index_buffer(command_buffer, index_buffer.handle(), 0, vk::IndexType::UINT32);
        }
        Ok(())
    }

    /// Indexed draw of every index, one instance
    pub fn draw(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let (device, _, _) = self.buffers()?;
        unsafe {
            device.cmd_draw_indexed(command_buffer, self.index_count(), 1, 0, 0, 0);
        }
        Ok(())
    }

    pub fn has_data(&self) -> bool {
        !self.vertices.is_empty() && !self.indices.is_empty()
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Release the device buffers and clear the CPU arrays; safe to call more than once
    pub fn destroy(&mut self) {
        if let Some(mut buffer) = self.vertex_buffer.take() {
            buffer.destroy();
        }
        if let Some(mut buffer) = self.index_buffer.take() {
            buffer.destroy();
        }
        self.vertices.clear();
        self.indices.clear();
        self.device = None;
    }
}

impl Drop for RenderableMesh {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
v -0.5 -0.5 0
v 0.5 -0.5 0
v 0.5 0.5 0
v -0.5 0.5 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";

    #[test]
    fn test_empty_mesh_rejects_bind_and_draw() {
        let mesh = RenderableMesh::new();
        let command_buffer = vk::CommandBuffer::null();

        assert!(!mesh.has_data());
        assert!(matches!(mesh.bind(command_buffer), Err(VulkanError::EmptyMesh)));
        assert!(matches!(mesh.draw(command_buffer), Err(VulkanError::EmptyMesh)));
    }

    #[test]
    fn test_validate_rejects_empty_arrays() {
        let vertex = Vertex {
            pos: [0.0; 3],
            color: [1.0; 3],
            tex_coord: [0.0; 2],
        };
        assert!(matches!(validate_mesh_data(&[], &[0]), Err(VulkanError::EmptyMesh)));
        assert!(matches!(validate_mesh_data(&[vertex], &[]), Err(VulkanError::EmptyMesh)));
        assert!(validate_mesh_data(&[vertex], &[0, 0, 0]).is_ok());
    }

    #[test]
    fn test_quad_source_is_drawable() {
        let data = ObjLoader::parse_str(QUAD).unwrap();

        assert_eq!(data.vertices.len(), 4);
        assert_eq!(data.indices, vec![0, 1, 2, 0, 2, 3]);
        assert!(validate_mesh_data(&data.vertices, &data.indices).is_ok());
    }

    #[test]
    fn test_read_source_returns_loader_data() {
        let path = std::env::temp_dir().join("viewer_engine_mesh_source_test.obj");
        std::fs::write(&path, QUAD).unwrap();
        let data = read_source(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(data.vertices.len(), 4);
        assert_eq!(data.indices.len(), 6);
    }

    #[test]
    fn test_read_source_reports_missing_file() {
        let path = std::env::temp_dir().join("viewer_engine_missing_mesh.obj");
        let _ = std::fs::remove_file(&path);
        assert!(matches!(read_source(&path), Err(VulkanError::Asset(_))));
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut mesh = RenderableMesh::new();
        mesh.destroy();
        mesh.destroy();
        assert_eq!(mesh.index_count(), 0);
    }
}
