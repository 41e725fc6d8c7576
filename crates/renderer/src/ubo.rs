//! Uniform buffer object definitions for shaders.
//!
//! Structures use `#[repr(C)]` and derive `Pod` so they can be copied
//! byte-for-byte into mapped uniform memory. The layout must match the
//! `Transforms` struct in `shaders/quad.wgsl`.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Degrees the quad turns per second.
pub const ROTATION_DEGREES_PER_SECOND: f32 = 90.0;

/// Model, view and projection matrices.
///
/// # Memory Layout
///
/// - Offset 0: model matrix (64 bytes)
/// - Offset 64: view matrix (64 bytes)
/// - Offset 128: projection matrix (64 bytes)
/// - Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TransformUbo {
    /// Object to world space.
    pub model: Mat4,
    /// World to view space.
    pub view: Mat4,
    /// View to Vulkan clip space.
    pub proj: Mat4,
}

impl TransformUbo {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Computes the transforms `seconds` after start for a target of `extent`.
    ///
    /// The model spins about +Z, the camera looks from (2, 2, 2) at the origin
    /// with +Z up, and the projection is a 45 degree perspective with its Y
    /// axis flipped for Vulkan's downward-pointing clip space.
    pub fn at(seconds: f32, extent: vk::Extent2D) -> Self {
        let model = Mat4::from_rotation_z((seconds * ROTATION_DEGREES_PER_SECOND).to_radians());
        let view = Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Z);

        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let mut proj = Mat4::perspective_rh(45.0_f32.to_radians(), aspect, 0.1, 10.0);
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    const EPSILON: f32 = 1e-5;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_transform_ubo_size() {
        // 3 Mat4 (3 * 64) = 192 bytes
        assert_eq!(TransformUbo::SIZE, 192);
        assert_eq!(std::mem::align_of::<TransformUbo>(), 16);
    }

    #[test]
    fn test_model_starts_at_identity() {
        let ubo = TransformUbo::at(0.0, extent(800, 600));
        assert!(ubo.model.abs_diff_eq(Mat4::IDENTITY, EPSILON));
    }

    #[test]
    fn test_model_turns_a_quarter_per_second() {
        let ubo = TransformUbo::at(1.0, extent(800, 600));
        let rotated = ubo.model * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!(rotated.abs_diff_eq(Vec4::new(0.0, 1.0, 0.0, 1.0), EPSILON));
    }

    #[test]
    fn test_view_looks_at_origin() {
        let ubo = TransformUbo::at(0.0, extent(800, 600));
        let origin = ubo.view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        // Right-handed view space looks down -Z
        assert!(origin.x.abs() < EPSILON);
        assert!(origin.y.abs() < EPSILON);
        assert!((origin.z + 12.0_f32.sqrt()).abs() < EPSILON);
    }

    #[test]
    fn test_projection_flips_y_and_tracks_aspect() {
        let wide = TransformUbo::at(0.0, extent(800, 400));
        let square = TransformUbo::at(0.0, extent(400, 400));

        assert!(wide.proj.y_axis.y < 0.0);
        assert!((square.proj.x_axis.x * 2.0 - wide.proj.x_axis.x * 4.0).abs() < EPSILON);
        assert!((square.proj.x_axis.x + square.proj.y_axis.y).abs() < EPSILON);
    }

    #[test]
    fn test_zero_height_does_not_divide_by_zero() {
        let ubo = TransformUbo::at(0.0, extent(800, 0));
        assert!(ubo.proj.x_axis.x.is_finite());
    }

    #[test]
    fn test_ubo_pod_bytes() {
        let ubo = TransformUbo::at(0.5, extent(800, 600));
        let bytes: &[u8] = bytemuck::bytes_of(&ubo);
        assert_eq!(bytes.len(), TransformUbo::SIZE);
    }
}
