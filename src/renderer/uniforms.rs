// renderer/uniforms.rs
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use super::cascades::Cascade;
use crate::scene::Camera;

/// Per-view constants bound at the vertex stage's view slot.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, PartialEq, Debug)]
pub struct ViewUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inverse_view_proj: [[f32; 4]; 4],
    pub eye: [f32; 3],
    /// Index of the shadow cascade being rendered, or `-1` for camera views.
    pub cascade: i32,
}

impl ViewUniform {
    pub fn from_matrices(view_proj: Mat4, eye: Vec3, cascade: i32) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            inverse_view_proj: view_proj.inverse().to_cols_array_2d(),
            eye: eye.to_array(),
            cascade,
        }
    }

    pub fn from_camera(camera: &Camera) -> Self {
        Self::from_matrices(camera.view_projection(), camera.position(), -1)
    }

    pub fn from_cascade(cascade: &Cascade) -> Self {
        Self::from_matrices(
            cascade.view_projection,
            cascade.light_position,
            cascade.index as i32,
        )
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl Default for ViewUniform {
    fn default() -> Self {
        Self::from_matrices(Mat4::IDENTITY, Vec3::ZERO, -1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_uniform_is_144_bytes() {
        // 2 * mat4x4<f32> = 128 bytes, vec3<f32> + i32 = 16 bytes
        assert_eq!(std::mem::size_of::<ViewUniform>(), 144);
        assert_eq!(ViewUniform::default().as_bytes().len(), 144);
    }

    #[test]
    fn camera_uniform_round_trips_the_matrix() {
        let camera = Camera::default();
        let uniform = ViewUniform::from_camera(&camera);
        let vp = Mat4::from_cols_array_2d(&uniform.view_proj);
        let inv = Mat4::from_cols_array_2d(&uniform.inverse_view_proj);
        assert!((vp * inv).abs_diff_eq(Mat4::IDENTITY, 1e-4));
        assert_eq!(uniform.cascade, -1);
    }
}
