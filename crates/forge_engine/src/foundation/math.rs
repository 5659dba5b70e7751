//! Math utilities and types
//!
//! Thin aliases over `nalgebra` plus the camera matrices the renderer needs.
//! Projections target Vulkan clip space (depth in `[0, 1]`); the backend flips
//! the viewport so +Y stays up.

pub use nalgebra::{Matrix4, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Right-handed perspective projection with a zero-to-one depth range
///
/// `fov_y` is in radians. A non-positive aspect ratio is treated as 1.
pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let aspect = if aspect > 0.0 { aspect } else { 1.0 };
    let focal = 1.0 / (fov_y * 0.5).tan();
    let depth = far / (near - far);

    #[rustfmt::skip]
    let projection = Mat4::new(
        focal / aspect, 0.0,   0.0,   0.0,
        0.0,            focal, 0.0,   0.0,
        0.0,            0.0,   depth, depth * near,
        0.0,            0.0,   -1.0,  0.0,
    );
    projection
}

/// View matrix for a camera at `eye` looking at `target`
pub fn look_at(eye: &Point3, target: &Point3, up: &Vec3) -> Mat4 {
    Mat4::look_at_rh(eye, target, up)
}

/// Column-major array layout used by GPU uniform blocks
pub fn to_columns(matrix: &Mat4) -> [[f32; 4]; 4] {
    (*matrix).into()
}
