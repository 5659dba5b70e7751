//! Backend implementations for the render module
//!
//! Vulkan is the only working backend; OpenGL, DirectX and Metal resolve to
//! [`stub::StubBackend`].

/// Placeholder for unimplemented APIs
pub mod stub;

/// Vulkan rendering backend implementation
pub mod vulkan;
