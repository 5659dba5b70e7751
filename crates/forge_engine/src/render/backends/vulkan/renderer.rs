//! Vulkan implementation of [`RendererBackend`]

use crate::core::config::RendererConfig;
use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::platform::Platform;
use crate::render::backend::RendererBackend;
use crate::render::types::{BackendResult, RenderError, RendererBackendType};

use super::context::VulkanContext;
use super::device::{DeviceFactory, NativeDeviceFactory};

/// Vulkan renderer backend
///
/// Holds no GPU state until [`RendererBackend::initialize`] succeeds. The
/// device comes from `F`, which is the native `ash` factory in production.
pub struct VulkanRendererBackend<F: DeviceFactory = NativeDeviceFactory> {
    context: Option<VulkanContext>,
    config: RendererConfig,
    factory: F,
}

impl VulkanRendererBackend {
    /// Backend creating a real device, with validation per the configuration
    pub fn new(config: RendererConfig) -> Self {
        let factory = NativeDeviceFactory::new(config.validation_enabled());
        Self::with_factory(config, factory)
    }
}

impl<F: DeviceFactory> VulkanRendererBackend<F> {
    /// Backend creating its device through a custom factory
    pub fn with_factory(config: RendererConfig, factory: F) -> Self {
        Self {
            context: None,
            config,
            factory,
        }
    }

    /// Whether `initialize` has succeeded and `shutdown` has not run
    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    /// The live context, if initialized
    pub fn context(&self) -> Option<&VulkanContext> {
        self.context.as_ref()
    }
}

impl<F: DeviceFactory> RendererBackend for VulkanRendererBackend<F> {
    fn backend_type(&self) -> RendererBackendType {
        RendererBackendType::Vulkan
    }

    fn initialize(&mut self, platform: &dyn Platform) -> BackendResult<()> {
        if self.context.is_some() {
            return Err(RenderError::InitializationFailed(
                "Vulkan backend is already initialized".to_string(),
            ));
        }
        self.config
            .validate()
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;

        let device = self
            .factory
            .create_device(platform, &self.config.application_name)?;

        let (width, height) = match platform.framebuffer_size() {
            (0, _) | (_, 0) => {
                log::warn!(
                    "Platform reported an empty framebuffer, using {}x{}",
                    self.config.fallback_width,
                    self.config.fallback_height
                );
                (self.config.fallback_width, self.config.fallback_height)
            }
            size => size,
        };

        let context = VulkanContext::new(device, &self.config, width, height).map_err(|e| {
            log::error!("Vulkan backend initialization failed: {e}");
            e
        })?;
        self.context = Some(context);

        log::info!("Vulkan renderer initialized successfully");
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(context) = self.context.take() {
            // Dropping the context waits for the device to go idle
            drop(context);
            log::info!("Vulkan renderer shut down");
        }
    }

    fn on_resized(&mut self, width: u16, height: u16) {
        match self.context.as_mut() {
            Some(context) => context.on_resized(width, height),
            None => log::debug!("Resize to {width}x{height} before initialization ignored"),
        }
    }

    fn begin_frame(&mut self, delta_time: f32) -> bool {
        self.context
            .as_mut()
            .is_some_and(|context| context.begin_frame(delta_time))
    }

    fn update_global_state(
        &mut self,
        projection: &Mat4,
        view: &Mat4,
        _view_position: &Vec3,
        _ambient_colour: &Vec4,
        _mode: i32,
    ) {
        // The uniform block carries projection and view only; the rest is reserved
        if let Some(context) = self.context.as_mut() {
            if let Err(e) = context.update_global_state(projection, view) {
                log::error!("Failed to update global state: {e}");
            }
        }
    }

    fn end_frame(&mut self, delta_time: f32) -> bool {
        self.context
            .as_mut()
            .is_some_and(|context| context.end_frame(delta_time))
    }
}

impl<F: DeviceFactory> Drop for VulkanRendererBackend<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::render::backends::vulkan::device::mock::MockDevice;
    use crate::render::backends::vulkan::device::RenderDevice;
    use crate::render::backends::vulkan::rendering::object_shader::tests::write_test_shader;
    use crate::render::backends::vulkan::{VulkanError, VulkanResult};
    use crate::render::test_support::FixedPlatform;

    struct MockFactory {
        device: Arc<MockDevice>,
        created: usize,
    }

    impl DeviceFactory for MockFactory {
        fn create_device(&mut self, _platform: &dyn Platform, _app_name: &str) -> VulkanResult<Arc<dyn RenderDevice>> {
            self.created += 1;
            Ok(self.device.clone())
        }
    }

    struct FailingFactory;

    impl DeviceFactory for FailingFactory {
        fn create_device(&mut self, _platform: &dyn Platform, _app_name: &str) -> VulkanResult<Arc<dyn RenderDevice>> {
            Err(VulkanError::NoSuitableDevice)
        }
    }

    fn backend(assets: &tempfile::TempDir) -> (Arc<MockDevice>, VulkanRendererBackend<MockFactory>) {
        let config = RendererConfig::new("Backend Test").with_assets_root(assets.path().to_string_lossy());
        write_test_shader(assets.path(), &config.object_shader);
        let device = Arc::new(MockDevice::new());
        let factory = MockFactory {
            device: device.clone(),
            created: 0,
        };
        (device, VulkanRendererBackend::with_factory(config, factory))
    }

    #[test]
    fn test_frames_before_initialize_are_skipped() {
        let assets = tempfile::tempdir().unwrap();
        let (_device, mut backend) = backend(&assets);

        backend.on_resized(640, 480);
        assert!(!backend.begin_frame(0.016));
        assert!(!backend.end_frame(0.016));
        assert!(!backend.is_initialized());
    }

    #[test]
    fn test_initialize_then_render() {
        let assets = tempfile::tempdir().unwrap();
        let (device, mut backend) = backend(&assets);

        backend.initialize(&FixedPlatform::new(800, 600)).unwrap();
        assert_eq!(backend.factory.created, 1);
        assert_eq!(device.swapchain_extents()[0].width, 800);

        let mut frame_number = 0;
        for _ in 0..3 {
            if backend.begin_frame(0.016) {
                backend.update_global_state(
                    &Mat4::identity(),
                    &Mat4::identity(),
                    &Vec3::zeros(),
                    &Vec4::repeat(1.0),
                    0,
                );
                if backend.end_frame(0.016) {
                    frame_number += 1;
                }
            }
        }
        assert_eq!(frame_number, 3);
    }

    #[test]
    fn test_second_initialize_is_rejected() {
        let assets = tempfile::tempdir().unwrap();
        let (_device, mut backend) = backend(&assets);
        let platform = FixedPlatform::new(800, 600);

        backend.initialize(&platform).unwrap();
        assert!(matches!(
            backend.initialize(&platform),
            Err(RenderError::InitializationFailed(_))
        ));
        assert_eq!(backend.factory.created, 1);
    }

    #[test]
    fn test_empty_framebuffer_uses_fallback_size() {
        let assets = tempfile::tempdir().unwrap();
        let (device, mut backend) = backend(&assets);

        backend.initialize(&FixedPlatform::new(0, 0)).unwrap();
        let extent = device.swapchain_extents()[0];
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_missing_shader_fails_initialization() {
        let assets = tempfile::tempdir().unwrap();
        let (device, mut backend) = backend(&assets);
        std::fs::remove_dir_all(assets.path().join("shaders")).unwrap();

        let result = backend.initialize(&FixedPlatform::new(800, 600));
        assert!(matches!(result, Err(RenderError::Backend(VulkanError::ShaderLoad { .. }))));
        assert!(!backend.is_initialized());
        assert_eq!(device.live_total(), 0);
    }

    #[test]
    fn test_device_failure_is_reported() {
        let mut backend = VulkanRendererBackend::with_factory(RendererConfig::default(), FailingFactory);
        let result = backend.initialize(&FixedPlatform::new(800, 600));
        assert!(matches!(result, Err(RenderError::Backend(VulkanError::NoSuitableDevice))));
    }

    #[test]
    fn test_shutdown_releases_resources_once() {
        let assets = tempfile::tempdir().unwrap();
        let (device, mut backend) = backend(&assets);
        backend.initialize(&FixedPlatform::new(800, 600)).unwrap();

        backend.shutdown();
        assert!(!backend.is_initialized());
        assert_eq!(device.live_total(), 0);

        let idle = device.calls("device_wait_idle");
        backend.shutdown();
        assert_eq!(device.calls("device_wait_idle"), idle);
    }
}
