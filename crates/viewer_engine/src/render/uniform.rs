//! Per-frame uniform data

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{utils::deg_to_rad, Mat4, Mat4Ext, Vec3};

/// Rotation speed of the model around +Z
pub const ROTATION_DEGREES_PER_SECOND: f32 = 90.0;
/// Camera position looking at the origin
pub const CAMERA_EYE: [f32; 3] = [2.0, 2.0, 2.0];
/// Vertical field of view
pub const FIELD_OF_VIEW_DEGREES: f32 = 45.0;
/// Near clip plane
pub const NEAR_PLANE: f32 = 0.1;
/// Far clip plane
pub const FAR_PLANE: f32 = 10.0;

/// Model, view and projection matrices, column-major, std140 compatible
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    /// Object to world
    pub model: [[f32; 4]; 4],
    /// World to camera
    pub view: [[f32; 4]; 4],
    /// Camera to clip
    pub proj: [[f32; 4]; 4],
}

impl UniformBufferObject {
    /// Size in bytes as seen by the descriptor
    pub const SIZE: vk::DeviceSize = std::mem::size_of::<Self>() as vk::DeviceSize;

    /// Matrices for the rotating model at `elapsed_secs`, viewed through a surface of `extent`
    pub fn for_frame(elapsed_secs: f32, extent: vk::Extent2D) -> Self {
        let model = Mat4::rotation_z(elapsed_secs * deg_to_rad(ROTATION_DEGREES_PER_SECOND));
        let view = Mat4::look_at(Vec3::from(CAMERA_EYE), Vec3::zeros(), Vec3::z());

        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let mut proj = Mat4::perspective(deg_to_rad(FIELD_OF_VIEW_DEGREES), aspect, NEAR_PLANE, FAR_PLANE);
        // Vulkan clip space has Y pointing down
        proj[(1, 1)] *= -1.0;

        Self {
            model: model.to_cols_array(),
            view: view.to_cols_array(),
            proj: proj.to_cols_array(),
        }
    }

    /// Raw bytes for upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_size_is_three_matrices() {
        assert_eq!(UniformBufferObject::SIZE, 3 * 64);
        assert_eq!(UniformBufferObject::for_frame(0.0, extent(800, 600)).as_bytes().len(), 192);
    }

    #[test]
    fn test_model_is_identity_at_start() {
        let ubo = UniformBufferObject::for_frame(0.0, extent(800, 600));
        assert_eq!(ubo.model, Mat4::identity().to_cols_array());
    }

    #[test]
    fn test_model_quarter_turn_after_one_second() {
        let ubo = UniformBufferObject::for_frame(1.0, extent(800, 600));
        // First column is the image of +X, which should now point along +Y
        assert_relative_eq!(ubo.model[0][0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(ubo.model[0][1], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_projection_flips_y_and_uses_aspect() {
        let ubo = UniformBufferObject::for_frame(0.0, extent(800, 400));
        let focal = 1.0 / (deg_to_rad(FIELD_OF_VIEW_DEGREES) * 0.5).tan();
        assert_relative_eq!(ubo.proj[1][1], -focal, epsilon = 1e-5);
        assert_relative_eq!(ubo.proj[0][0], focal / 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_zero_height_does_not_divide_by_zero() {
        let ubo = UniformBufferObject::for_frame(0.0, extent(800, 0));
        assert!(ubo.proj[0][0].is_finite());
    }
}
