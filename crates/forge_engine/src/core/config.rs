//! # Application Configuration
//!
//! Configuration for the engine core, the window, and the renderer. The top
//! level [`ApplicationConfig`] can be loaded from TOML or RON through the
//! [`Config`] trait.
//!
//! ## Configuration Categories
//!
//! - **Engine Config**: logging and debug behavior
//! - **Window Config**: title and initial size of the main window
//! - **Renderer Config**: backend choice, validation, shader and asset locations

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};
use crate::render::RendererBackendType;

/// # Renderer Configuration
///
/// Settings consumed by the renderer frontend and the Vulkan backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the graphics driver
    pub application_name: String,
    /// Which backend the frontend creates
    pub backend: RendererBackendType,
    /// Whether to enable Vulkan validation layers; `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Root directory of runtime assets; shaders live under `{root}/shaders`
    pub assets_root: String,
    /// Name of the built-in object shader
    pub object_shader: String,
    /// Clear color of the main render pass
    pub clear_color: [f32; 4],
    /// Framebuffer width used when the platform reports zero at startup
    pub fallback_width: u32,
    /// Framebuffer height used when the platform reports zero at startup
    pub fallback_height: u32,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            backend: RendererBackendType::Vulkan,
            enable_validation: None,
            assets_root: "Assets".to_string(),
            object_shader: "Builtin.ObjectShader".to_string(),
            clear_color: [0.0, 0.0, 0.2, 1.0],
            fallback_width: 800,
            fallback_height: 600,
        }
    }

    /// Select the backend
    pub fn with_backend(mut self, backend: RendererBackendType) -> Self {
        self.backend = backend;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the assets root directory
    pub fn with_assets_root(mut self, root: impl Into<String>) -> Self {
        self.assets_root = root.into();
        self
    }

    /// Set the clear color
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Whether validation should be requested, resolving `None` by build type
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }
        if self.object_shader.is_empty() {
            return Err(ConfigError::Invalid("Object shader name cannot be empty".to_string()));
        }
        if self.fallback_width == 0 || self.fallback_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Fallback framebuffer size must be nonzero, got {}x{}",
                self.fallback_width, self.fallback_height
            )));
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Forge Application")
    }
}

/// # Engine Configuration
///
/// Core engine behavior configuration: logging and debug features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level for the engine
    pub log_level: String,
    /// Whether to enable debug features
    pub debug_mode: bool,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            debug_mode: cfg!(debug_assertions),
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable debug mode
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Main window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
    /// Whether the user may resize the window
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Forge Engine".to_string(),
            width: 1280,
            height: 720,
            resizable: true,
        }
    }
}

impl WindowConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Window size must be nonzero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration that encompasses all engine subsystems.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Main window configuration
    pub window: WindowConfig,
    /// Rendering system configuration
    pub renderer: RendererConfig,
}

impl ApplicationConfig {
    /// Create a new application configuration with defaults
    pub fn new(app_name: impl Into<String>) -> Self {
        let app_name = app_name.into();
        Self {
            engine: EngineConfig::default(),
            window: WindowConfig {
                title: app_name.clone(),
                ..WindowConfig::default()
            },
            renderer: RendererConfig::new(app_name),
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window.validate()?;
        self.renderer.validate()
    }
}

impl Config for ApplicationConfig {}
