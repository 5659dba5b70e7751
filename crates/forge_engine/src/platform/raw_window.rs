//! Presentation for windows owned by another windowing library
//!
//! Anything exposing `raw-window-handle` 0.5 handles can host the renderer;
//! surface creation and the extension list come from `ash-window`.

use ash::prelude::VkResult;
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

use super::{Platform, PlatformError, PlatformResult};

/// Adapter from a raw-window-handle window to [`Platform`]
///
/// The window type does not report its own framebuffer size through
/// raw-window-handle, so the host application keeps it current with
/// [`RawWindowPlatform::set_framebuffer_size`].
pub struct RawWindowPlatform<W> {
    window: W,
    framebuffer_size: (u32, u32),
    extensions: Vec<String>,
}

impl<W: HasRawWindowHandle + HasRawDisplayHandle> RawWindowPlatform<W> {
    /// Wrap a window with its initial framebuffer size
    pub fn new(window: W, width: u32, height: u32) -> PlatformResult<Self> {
        let extensions = ash_window::enumerate_required_extensions(window.raw_display_handle())
            .map_err(|_| PlatformError::MissingExtensions)?
            .iter()
            .map(|&name| unsafe { std::ffi::CStr::from_ptr(name) }.to_string_lossy().into_owned())
            .collect();

        Ok(Self {
            window,
            framebuffer_size: (width, height),
            extensions,
        })
    }

    /// Record a new framebuffer size reported by the host
    pub fn set_framebuffer_size(&mut self, width: u32, height: u32) {
        self.framebuffer_size = (width, height);
    }

    /// The wrapped window
    pub fn window(&self) -> &W {
        &self.window
    }
}

impl<W: HasRawWindowHandle + HasRawDisplayHandle> Platform for RawWindowPlatform<W> {
    fn framebuffer_size(&self) -> (u32, u32) {
        self.framebuffer_size
    }

    fn required_instance_extensions(&self) -> Vec<String> {
        self.extensions.clone()
    }

    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> VkResult<vk::SurfaceKHR> {
        unsafe {
            ash_window::create_surface(
                entry,
                instance,
                self.window.raw_display_handle(),
                self.window.raw_window_handle(),
                None,
            )
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use raw_window_handle::{
        RawDisplayHandle, RawWindowHandle, XlibDisplayHandle, XlibWindowHandle,
    };

    struct FakeXlibWindow;

    unsafe impl HasRawWindowHandle for FakeXlibWindow {
        fn raw_window_handle(&self) -> RawWindowHandle {
            RawWindowHandle::Xlib(XlibWindowHandle::empty())
        }
    }

    unsafe impl HasRawDisplayHandle for FakeXlibWindow {
        fn raw_display_handle(&self) -> RawDisplayHandle {
            RawDisplayHandle::Xlib(XlibDisplayHandle::empty())
        }
    }

    #[test]
    fn test_xlib_window_requires_surface_extensions() {
        let platform = RawWindowPlatform::new(FakeXlibWindow, 800, 600).unwrap();
        let extensions = platform.required_instance_extensions();

        assert!(extensions.iter().any(|name| name == "VK_KHR_surface"));
        assert!(extensions.iter().any(|name| name == "VK_KHR_xlib_surface"));
    }

    #[test]
    fn test_host_reports_framebuffer_size() {
        let mut platform = RawWindowPlatform::new(FakeXlibWindow, 800, 600).unwrap();
        assert_eq!(platform.framebuffer_size(), (800, 600));

        platform.set_framebuffer_size(0, 0);
        assert_eq!(platform.framebuffer_size(), (0, 0));
    }
}
