//! # Core Engine Module
//!
//! Shared configuration types used by the renderer and the applications
//! built on top of the engine.

pub mod config;

pub use config::{ApplicationConfig, Config, ConfigError, EngineConfig, RendererConfig, WindowConfig};
