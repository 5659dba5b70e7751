//! Per-frame state: synchronization, command recording and the swapchain

/// Command pools and the command buffer state machine
pub mod commands;

/// Swapchain lifecycle and presentation
pub mod swapchain;

/// Semaphores, fences and per-frame sync sets
pub mod sync;

pub use commands::{CommandBuffer, CommandBufferState, CommandBufferUsage, CommandPool};
pub use swapchain::{AcquireResult, PresentResult, Swapchain};
pub use sync::{Fence, FrameSync, Semaphore};
