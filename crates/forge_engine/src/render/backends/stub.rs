//! Placeholder backends for APIs without an implementation

use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::platform::Platform;
use crate::render::backend::RendererBackend;
use crate::render::types::{BackendResult, RenderError, RendererBackendType};

/// Backend that refuses to initialize and skips every frame
#[derive(Debug)]
pub struct StubBackend {
    backend_type: RendererBackendType,
}

impl StubBackend {
    /// Stub standing in for an unimplemented API
    pub fn new(backend_type: RendererBackendType) -> Self {
        Self { backend_type }
    }
}

impl RendererBackend for StubBackend {
    fn backend_type(&self) -> RendererBackendType {
        self.backend_type
    }

    fn initialize(&mut self, _platform: &dyn Platform) -> BackendResult<()> {
        log::error!("{} backend is not supported", self.backend_type);
        Err(RenderError::UnsupportedBackend(self.backend_type))
    }

    fn shutdown(&mut self) {}

    fn on_resized(&mut self, _width: u16, _height: u16) {}

    fn begin_frame(&mut self, _delta_time: f32) -> bool {
        false
    }

    fn update_global_state(&mut self, _: &Mat4, _: &Mat4, _: &Vec3, _: &Vec4, _: i32) {}

    fn end_frame(&mut self, _delta_time: f32) -> bool {
        false
    }
}
