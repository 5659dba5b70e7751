//! Window management using GLFW
//!
//! Provides window creation and event handling for the Vulkan backend.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};

use super::{saturate_dimension, Platform, PlatformError, PlatformEvent, PlatformResult};
use crate::core::WindowConfig;

/// GLFW window configured for Vulkan
pub struct GlfwPlatform {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    extensions: Vec<String>,
}

impl GlfwPlatform {
    /// Open a window with no client API so Vulkan can present to it
    pub fn new(config: &WindowConfig) -> PlatformResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| PlatformError::InitializationFailed(format!("{e:?}")))?;

        if !glfw.vulkan_supported() {
            return Err(PlatformError::InitializationFailed("GLFW reports no Vulkan loader".to_string()));
        }

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(config.resizable));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or(PlatformError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        let extensions = glfw
            .get_required_instance_extensions()
            .ok_or(PlatformError::MissingExtensions)?;

        log::info!("Created {}x{} window '{}'", config.width, config.height, config.title);

        Ok(Self {
            glfw,
            window,
            events,
            extensions,
        })
    }

    /// Whether the user has asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request that the window close at the end of this frame
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Pump the native event queue and translate what the engine cares about
    pub fn poll_events(&mut self) -> Vec<PlatformEvent> {
        self.glfw.poll_events();
        glfw::flush_messages(&self.events)
            .filter_map(|(_, event)| match event {
                glfw::WindowEvent::FramebufferSize(width, height) => Some(PlatformEvent::Resized {
                    width: saturate_dimension(width),
                    height: saturate_dimension(height),
                }),
                glfw::WindowEvent::Close => Some(PlatformEvent::CloseRequested),
                glfw::WindowEvent::Key(key, _, glfw::Action::Press, _) => Some(PlatformEvent::KeyPressed(key)),
                _ => None,
            })
            .collect()
    }
}

impl Platform for GlfwPlatform {
    fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    fn required_instance_extensions(&self) -> Vec<String> {
        self.extensions.clone()
    }

    fn create_surface(&self, _entry: &ash::Entry, instance: &ash::Instance) -> VkResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance.handle(), std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            log::debug!("Created GLFW surface {:#x}", surface.as_raw());
            Ok(surface)
        } else {
            log::error!("{}", PlatformError::Surface(result));
            Err(result)
        }
    }
}
