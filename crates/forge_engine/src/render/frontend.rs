//! Renderer frontend
//!
//! Owns the active backend, the camera matrices and the frame counter. The
//! application calls [`RendererFrontend::draw_frame`] once per loop
//! iteration and forwards window resizes through
//! [`RendererFrontend::on_resized`].

use crate::core::config::RendererConfig;
use crate::foundation::math::{look_at, perspective, Mat4, Point3, Vec3, Vec4};
use crate::platform::Platform;

use super::backend::{create_backend, RendererBackend};
use super::types::{BackendResult, RenderPacket};

const FIELD_OF_VIEW_DEGREES: f32 = 45.0;
const NEAR_CLIP: f32 = 0.1;
const FAR_CLIP: f32 = 1000.0;
const CAMERA_DISTANCE: f32 = 30.0;

/// High-level renderer driving one backend
pub struct RendererFrontend {
    backend: Option<Box<dyn RendererBackend>>,
    frame_number: u64,
    projection: Mat4,
    view: Mat4,
}

impl RendererFrontend {
    /// Create and initialize the backend selected by the configuration
    pub fn new(config: &RendererConfig, platform: &dyn Platform) -> BackendResult<Self> {
        Self::with_backend(create_backend(config), platform)
    }

    /// Initialize a given backend and wrap it
    pub fn with_backend(mut backend: Box<dyn RendererBackend>, platform: &dyn Platform) -> BackendResult<Self> {
        backend.initialize(platform)?;
        log::info!("{} renderer ready", backend.backend_type());

        let (width, height) = platform.framebuffer_size();
        Ok(Self {
            backend: Some(backend),
            frame_number: 0,
            projection: projection_for(width, height),
            view: look_at(
                &Point3::new(0.0, 0.0, CAMERA_DISTANCE),
                &Point3::origin(),
                &Vec3::y(),
            ),
        })
    }

    /// Tear the backend down and release it
    pub fn shutdown(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.shutdown();
        }
    }

    /// Update the projection aspect and forward the new size to the backend
    pub fn on_resized(&mut self, width: u16, height: u16) {
        let Some(backend) = self.backend.as_mut() else {
            log::warn!("Renderer backend does not exist to accept resize: {width} {height}");
            return;
        };
        self.projection = projection_for(u32::from(width), u32::from(height));
        backend.on_resized(width, height);
    }

    /// Render one frame
    ///
    /// A frame the backend chose to skip still counts as success; only a
    /// failed `end_frame` returns `false`.
    pub fn draw_frame(&mut self, packet: &RenderPacket) -> bool {
        let Some(backend) = self.backend.as_mut() else {
            log::warn!("draw_frame called without a renderer backend");
            return false;
        };

        if backend.begin_frame(packet.delta_time) {
            backend.update_global_state(
                &self.projection,
                &self.view,
                &Vec3::zeros(),
                &Vec4::repeat(1.0),
                0,
            );

            if !backend.end_frame(packet.delta_time) {
                log::error!("end_frame failed, application shutting down");
                return false;
            }
            self.frame_number += 1;
        }
        true
    }

    /// Frames successfully ended so far
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Current projection matrix
    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// Current view matrix
    pub fn view(&self) -> &Mat4 {
        &self.view
    }
}

impl Drop for RendererFrontend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn projection_for(width: u32, height: u32) -> Mat4 {
    let aspect = if height == 0 { 1.0 } else { width as f32 / height as f32 };
    perspective(FIELD_OF_VIEW_DEGREES.to_radians(), aspect, NEAR_CLIP, FAR_CLIP)
}
