//! Vertex format shared by the mesh loader and the graphics pipeline

use ash::vk;
use bytemuck::{Pod, Zeroable};

/// Interleaved vertex: position, color, texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub pos: [f32; 3],
    /// Per-vertex color
    pub color: [f32; 3],
    /// Texture coordinate (v already flipped for Vulkan)
    pub tex_coord: [f32; 2],
}

const POSITION_OFFSET: u32 = 0;
const COLOR_OFFSET: u32 = POSITION_OFFSET + std::mem::size_of::<[f32; 3]>() as u32;
const TEX_COORD_OFFSET: u32 = COLOR_OFFSET + std::mem::size_of::<[f32; 3]>() as u32;

impl Vertex {
    /// Binding 0, advanced per vertex
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Locations 0..=2: position, color, texture coordinate
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: POSITION_OFFSET,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: COLOR_OFFSET,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: TEX_COORD_OFFSET,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(Vertex::binding_description().stride, 32);
    }

    #[test]
    fn test_attribute_offsets_match_fields() {
        let vertex = Vertex {
            pos: [1.0, 2.0, 3.0],
            color: [4.0, 5.0, 6.0],
            tex_coord: [7.0, 8.0],
        };
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&vertex));
        let attributes = Vertex::attribute_descriptions();

        assert_eq!(floats[(attributes[0].offset / 4) as usize], 1.0);
        assert_eq!(floats[(attributes[1].offset / 4) as usize], 4.0);
        assert_eq!(floats[(attributes[2].offset / 4) as usize], 7.0);
        assert_eq!(attributes[2].format, vk::Format::R32G32_SFLOAT);
    }
}
