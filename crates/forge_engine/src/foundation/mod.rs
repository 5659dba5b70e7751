//! Foundation module - Core utilities and types
//!
//! - Math types and camera matrices
//! - Frame timing
//! - Logging setup

pub mod logging;
pub mod math;
pub mod time;
