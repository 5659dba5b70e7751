//! Types shared between the renderer frontend and its backends

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::render::backends::vulkan::VulkanError;

/// Graphics API a backend renders with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RendererBackendType {
    /// Vulkan
    Vulkan,
    /// OpenGL (not implemented)
    OpenGl,
    /// DirectX (not implemented)
    DirectX,
    /// Metal (not implemented)
    Metal,
}

impl std::fmt::Display for RendererBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Vulkan => "Vulkan",
            Self::OpenGl => "OpenGL",
            Self::DirectX => "DirectX",
            Self::Metal => "Metal",
        };
        f.write_str(name)
    }
}

/// Per-frame input to [`crate::render::RendererFrontend::draw_frame`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderPacket {
    /// Seconds since the previous frame
    pub delta_time: f32,
}

/// Global uniform block bound at set 0, binding 0
///
/// Padded to 256 bytes so consecutive copies in one buffer satisfy the
/// uniform offset alignment of every desktop GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalUniformObject {
    /// Projection matrix, column-major
    pub projection: [[f32; 4]; 4],
    /// View matrix, column-major
    pub view: [[f32; 4]; 4],
    /// Reserved
    pub reserved0: [[f32; 4]; 4],
    /// Reserved
    pub reserved1: [[f32; 4]; 4],
}

// SAFETY: repr(C), only f32 arrays, no padding
unsafe impl bytemuck::Zeroable for GlobalUniformObject {}
unsafe impl bytemuck::Pod for GlobalUniformObject {}

impl Default for GlobalUniformObject {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

/// Size of one [`GlobalUniformObject`] slot in bytes
pub const GLOBAL_UBO_SIZE: u64 = std::mem::size_of::<GlobalUniformObject>() as u64;

/// Position-only vertex used by the built-in geometry
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vertex3D {
    /// Object-space position
    pub position: [f32; 3],
}

// SAFETY: repr(C), only f32 fields, no padding
unsafe impl bytemuck::Zeroable for Vertex3D {}
unsafe impl bytemuck::Pod for Vertex3D {}

impl Vertex3D {
    /// Vertex at a position
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { position: [x, y, z] }
    }
}

/// Renderer errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// Renderer could not be brought up
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// An operation needed an initialized backend
    #[error("Renderer backend is not initialized")]
    BackendNotInitialized,

    /// The selected backend has no implementation
    #[error("{0} backend is not supported")]
    UnsupportedBackend(RendererBackendType),

    /// Error raised by the Vulkan backend
    #[error(transparent)]
    Backend(#[from] VulkanError),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;
