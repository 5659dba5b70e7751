//! # Rendering System
//!
//! The renderer is split into a frontend that owns the camera and frame
//! counter, and a backend that talks to the graphics API.
//!
//! ## Architecture
//!
//! - **Frontend**: [`RendererFrontend`] drives one backend per frame
//! - **Backend trait**: [`RendererBackend`] is the seam every graphics API implements
//! - **Vulkan Backend**: the only backend that renders today
//!
//! Per-frame calls return `bool` so a skipped frame (resize, minimize,
//! out-of-date swapchain) never tears the application down.

/// Renderer backend trait and factory
pub mod backend;

/// Graphics backend implementations
///
/// Vulkan is implemented; the other backend types resolve to a stub.
pub mod backends;

/// Frontend driving the active backend
pub mod frontend;

/// Shared render data types
pub mod types;

pub use backend::{create_backend, RendererBackend};
pub use frontend::RendererFrontend;
pub use types::{BackendResult, GlobalUniformObject, RenderError, RenderPacket, RendererBackendType, Vertex3D};
