//! Renderer backend trait
//!
//! The frontend drives exactly one backend through [`RendererBackend`],
//! picked once at startup by [`create_backend`].

use crate::core::config::RendererConfig;
use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::platform::Platform;

use super::backends::stub::StubBackend;
use super::backends::vulkan::VulkanRendererBackend;
use super::types::{BackendResult, RendererBackendType};

/// Operations every rendering backend provides
///
/// Initialization reports errors; the per-frame calls answer with `bool`
/// so the frame loop needs a single branch per frame.
pub trait RendererBackend {
    /// API this backend renders with
    fn backend_type(&self) -> RendererBackendType;

    /// Bring the backend up against a platform window
    fn initialize(&mut self, platform: &dyn Platform) -> BackendResult<()>;

    /// Release every GPU resource; a no-op when not initialized
    fn shutdown(&mut self);

    /// Record a framebuffer size change, applied at the next `begin_frame`
    fn on_resized(&mut self, width: u16, height: u16);

    /// Start a frame; `false` means skip this frame
    fn begin_frame(&mut self, delta_time: f32) -> bool;

    /// Write the global shader state for the frame being recorded
    fn update_global_state(
        &mut self,
        projection: &Mat4,
        view: &Mat4,
        view_position: &Vec3,
        ambient_colour: &Vec4,
        mode: i32,
    );

    /// Submit and present the frame started by `begin_frame`
    fn end_frame(&mut self, delta_time: f32) -> bool;
}

/// Create the backend selected in the configuration
///
/// Only Vulkan renders; the other types get a stub whose `initialize`
/// fails with [`crate::render::RenderError::UnsupportedBackend`].
pub fn create_backend(config: &RendererConfig) -> Box<dyn RendererBackend> {
    match config.backend {
        RendererBackendType::Vulkan => Box::new(VulkanRendererBackend::new(config.clone())),
        other => {
            log::warn!("{other} backend is not implemented");
            Box::new(StubBackend::new(other))
        }
    }
}
