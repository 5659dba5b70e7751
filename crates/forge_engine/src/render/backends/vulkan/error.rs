//! Vulkan backend error types

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted, such as an illegal command buffer transition
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Memory allocation failed
    #[error("Out of memory: {requested} bytes")]
    OutOfMemory {
        /// Number of bytes that were requested
        requested: u64,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// No physical device met the renderer requirements
    #[error("No physical device meets the renderer requirements")]
    NoSuitableDevice,

    /// None of the depth format candidates is supported
    #[error("No supported depth format found")]
    UnsupportedDepthFormat,

    /// A shader binary could not be read
    #[error("Failed to read shader {path}: {source}")]
    ShaderLoad {
        /// Path that was resolved for the shader stage
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// A shader binary was read but is not valid SPIR-V
    #[error("Invalid SPIR-V in {path}")]
    InvalidShaderCode {
        /// Path of the offending file
        path: PathBuf,
    },
}

impl VulkanError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            reason: reason.into(),
        }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
