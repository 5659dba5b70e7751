//! Vulkan backend implementation
//!
//! Organized into device, resources, rendering and state modules, tied
//! together by the per-frame [`context::VulkanContext`].

mod error;

/// Instance, physical device selection and the logical device seam
pub mod device;

/// GPU memory backed resources (buffers, images, descriptors)
pub mod resources;

/// Render pass, framebuffer, pipeline and shader objects
pub mod rendering;

/// Synchronization, command buffers and the swapchain
pub mod state;

/// Frame orchestration over all Vulkan objects
pub mod context;

/// `RendererBackend` implementation for Vulkan
pub mod renderer;

pub use error::{VulkanError, VulkanResult};

pub use context::VulkanContext;
pub use device::{AshDevice, DeviceFactory, NativeDeviceFactory, RenderDevice};
pub use renderer::VulkanRendererBackend;

pub use resources::buffer::Buffer;
pub use resources::image::Image;
pub use rendering::object_shader::ObjectShader;
pub use rendering::pipeline::Pipeline;
pub use rendering::render_pass::RenderPass;
pub use state::commands::{CommandBuffer, CommandBufferState, CommandBufferUsage, CommandPool};
pub use state::swapchain::Swapchain;
pub use state::sync::{Fence, FrameSync, Semaphore};
