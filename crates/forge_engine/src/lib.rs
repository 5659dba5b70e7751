//! # Forge Engine
//!
//! A hobby game engine whose renderer runs on Vulkan.
//!
//! ## Features
//!
//! - **Vulkan Rendering**: swapchain, depth buffer, one built-in object shader
//! - **Resize Handling**: minimize, restore and out-of-date swapchains are absorbed per frame
//! - **Pluggable Windowing**: GLFW out of the box, any `raw-window-handle` window through [`platform::RawWindowPlatform`]
//! - **File Configuration**: TOML or RON
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use forge_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ApplicationConfig::new("My Game");
//!     let mut platform = GlfwPlatform::new(&config.window)?;
//!     let mut renderer = RendererFrontend::new(&config.renderer, &platform)?;
//!     let mut timer = Timer::new();
//!
//!     while !platform.should_close() {
//!         for event in platform.poll_events() {
//!             if let PlatformEvent::Resized { width, height } = event {
//!                 renderer.on_resized(width, height);
//!             }
//!         }
//!         let packet = RenderPacket { delta_time: timer.tick() };
//!         if !renderer.draw_frame(&packet) {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

/// Configuration file loading
pub mod config;

// Core engine modules
pub mod core;
pub mod foundation;
pub mod platform;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::config::{ApplicationConfig, Config, EngineConfig, RendererConfig, WindowConfig},
        foundation::{
            math::{Mat4, Vec3, Vec4},
            time::Timer,
        },
        platform::{GlfwPlatform, Platform, PlatformEvent},
        render::{RenderError, RenderPacket, RendererBackendType, RendererFrontend},
    };
}
