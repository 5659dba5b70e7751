//! Platform seam
//!
//! The renderer needs three things from the windowing layer: the current
//! framebuffer size, the instance extensions required for presentation, and a
//! way to create a presentation surface. Resize notifications flow back up as
//! [`PlatformEvent::Resized`].

use ash::prelude::VkResult;
use ash::vk;
use thiserror::Error;

mod glfw_window;
mod raw_window;

pub use glfw_window::GlfwPlatform;
pub use raw_window::RawWindowPlatform;

/// Windowing services consumed by the renderer backend
pub trait Platform {
    /// Current framebuffer size in pixels
    fn framebuffer_size(&self) -> (u32, u32);

    /// Instance extensions needed to present to this platform's windows
    fn required_instance_extensions(&self) -> Vec<String>;

    /// Create a presentation surface for the window on the given instance
    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> VkResult<vk::SurfaceKHR>;
}

/// Events translated from the native window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    /// Framebuffer was resized; zero in either dimension means minimized
    Resized {
        /// New width in pixels
        width: u16,
        /// New height in pixels
        height: u16,
    },
    /// User asked to close the window
    CloseRequested,
    /// A key was pressed
    KeyPressed(glfw::Key),
}

/// Window management errors
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Windowing library failed to start
    #[error("Platform initialization failed: {0}")]
    InitializationFailed(String),

    /// Native window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// Surface creation was rejected by the driver
    #[error("Surface creation failed: {0}")]
    Surface(vk::Result),

    /// The platform cannot report presentation extensions
    #[error("Vulkan presentation extensions are unavailable")]
    MissingExtensions,
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Clamp a native size into the 16-bit resize payload
pub(crate) fn saturate_dimension(value: i32) -> u16 {
    u16::try_from(value.max(0)).unwrap_or(u16::MAX)
}
