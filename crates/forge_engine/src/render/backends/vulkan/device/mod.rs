//! Logical device abstraction
//!
//! Every Vulkan resource wrapper in this backend talks to the GPU through the
//! [`RenderDevice`] trait instead of holding an `ash::Device` directly. The
//! production implementation is [`AshDevice`]; tests drive the same wrappers
//! through a scripted in-memory device.
//!
//! Resource wrappers keep an `Arc<dyn RenderDevice>`, so the device always
//! outlives the handles created from it and teardown order follows ownership.

use std::ffi::c_void;
use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;

use crate::platform::Platform;
use super::VulkanResult;

mod ash_device;
mod instance;
pub mod selection;

#[cfg(test)]
pub(crate) mod mock;

pub use ash_device::{AshDevice, NativeDeviceFactory};
pub use instance::VulkanInstance;
pub use selection::{DeviceRequirements, PhysicalDeviceSnapshot, Rejection};

/// Queue family indices chosen for a physical device
///
/// The indices may alias: on most desktop GPUs graphics and present share a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueFamilyIndices {
    /// Family used for graphics submission
    pub graphics: u32,
    /// Family used for presentation
    pub present: u32,
    /// Family preferred for transfer work
    pub transfer: u32,
}

impl QueueFamilyIndices {
    /// Distinct families in queue-creation order: graphics, then present, then transfer
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = vec![self.graphics];
        for family in [self.present, self.transfer] {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        families
    }
}

/// Surface capabilities, formats and present modes for a device/surface pair
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    /// Surface capabilities (extent limits, image counts, transforms)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported presentation modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Static information about the selected physical device
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Human readable device name
    pub name: String,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types
    pub memory: vk::PhysicalDeviceMemoryProperties,
    /// Queue families bound on the logical device
    pub queue_families: QueueFamilyIndices,
}

/// Logical device operations used by the renderer backend
///
/// Methods mirror the `ash` calls of the same name. Implementations own the
/// instance, surface and logical device and wrap the raw `unsafe` calls.
pub trait RenderDevice: Send + Sync {
    /// Information about the selected physical device
    fn info(&self) -> &DeviceInfo;

    /// Graphics queue handle
    fn graphics_queue(&self) -> vk::Queue;
    /// Presentation queue handle
    fn present_queue(&self) -> vk::Queue;
    /// Transfer queue handle
    fn transfer_queue(&self) -> vk::Queue;

    /// Presentation surface owned by the device
    fn surface(&self) -> vk::SurfaceKHR;
    /// Re-query surface capabilities, formats and present modes
    fn query_swapchain_support(&self) -> VkResult<SwapchainSupport>;
    /// Format feature support on the physical device
    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties;

    /// Block until every queue on the device is idle
    fn device_wait_idle(&self) -> VkResult<()>;
    /// Block until a queue is idle
    fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()>;
    /// Submit command buffers to a queue
    fn queue_submit(&self, queue: vk::Queue, submits: &[vk::SubmitInfo], fence: vk::Fence) -> VkResult<()>;

    /// Create a semaphore
    fn create_semaphore(&self, info: &vk::SemaphoreCreateInfo) -> VkResult<vk::Semaphore>;
    /// Destroy a semaphore
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    /// Create a fence
    fn create_fence(&self, info: &vk::FenceCreateInfo) -> VkResult<vk::Fence>;
    /// Destroy a fence
    fn destroy_fence(&self, fence: vk::Fence);
    /// Wait on fences; `Err(vk::Result::TIMEOUT)` when the timeout elapses
    fn wait_for_fences(&self, fences: &[vk::Fence], wait_all: bool, timeout: u64) -> VkResult<()>;
    /// Reset fences to the unsignaled state
    fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()>;

    /// Create a command pool
    fn create_command_pool(&self, info: &vk::CommandPoolCreateInfo) -> VkResult<vk::CommandPool>;
    /// Destroy a command pool and every buffer allocated from it
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    /// Allocate command buffers from a pool
    fn allocate_command_buffers(&self, info: &vk::CommandBufferAllocateInfo) -> VkResult<Vec<vk::CommandBuffer>>;
    /// Return command buffers to their pool
    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    /// Begin recording
    fn begin_command_buffer(&self, buffer: vk::CommandBuffer, info: &vk::CommandBufferBeginInfo) -> VkResult<()>;
    /// Finish recording
    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()>;

    /// Record a render pass begin
    fn cmd_begin_render_pass(&self, buffer: vk::CommandBuffer, info: &vk::RenderPassBeginInfo, contents: vk::SubpassContents);
    /// Record a render pass end
    fn cmd_end_render_pass(&self, buffer: vk::CommandBuffer);
    /// Record dynamic viewports
    fn cmd_set_viewport(&self, buffer: vk::CommandBuffer, first: u32, viewports: &[vk::Viewport]);
    /// Record dynamic scissors
    fn cmd_set_scissor(&self, buffer: vk::CommandBuffer, first: u32, scissors: &[vk::Rect2D]);
    /// Record the dynamic line width
    fn cmd_set_line_width(&self, buffer: vk::CommandBuffer, width: f32);
    /// Record a pipeline bind
    fn cmd_bind_pipeline(&self, buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);
    /// Record descriptor set binds
    fn cmd_bind_descriptor_sets(
        &self,
        buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    );
    /// Record vertex buffer binds
    fn cmd_bind_vertex_buffers(&self, buffer: vk::CommandBuffer, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]);
    /// Record an index buffer bind
    fn cmd_bind_index_buffer(&self, buffer: vk::CommandBuffer, index_buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType);
    /// Record an indexed draw
    fn cmd_draw_indexed(
        &self,
        buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    /// Record a buffer-to-buffer copy
    fn cmd_copy_buffer(&self, buffer: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]);

    /// Allocate device memory
    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo) -> VkResult<vk::DeviceMemory>;
    /// Free device memory
    fn free_memory(&self, memory: vk::DeviceMemory);
    /// Map a range of host-visible memory
    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        flags: vk::MemoryMapFlags,
    ) -> VkResult<*mut c_void>;
    /// Unmap previously mapped memory
    fn unmap_memory(&self, memory: vk::DeviceMemory);

    /// Create a buffer
    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VkResult<vk::Buffer>;
    /// Destroy a buffer
    fn destroy_buffer(&self, buffer: vk::Buffer);
    /// Memory requirements of a buffer
    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    /// Bind memory to a buffer
    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> VkResult<()>;

    /// Create an image
    fn create_image(&self, info: &vk::ImageCreateInfo) -> VkResult<vk::Image>;
    /// Destroy an image
    fn destroy_image(&self, image: vk::Image);
    /// Memory requirements of an image
    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;
    /// Bind memory to an image
    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> VkResult<()>;
    /// Create an image view
    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView>;
    /// Destroy an image view
    fn destroy_image_view(&self, view: vk::ImageView);

    /// Create a render pass
    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass>;
    /// Destroy a render pass
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    /// Create a framebuffer
    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer>;
    /// Destroy a framebuffer
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);
    /// Create a shader module from SPIR-V words
    fn create_shader_module(&self, info: &vk::ShaderModuleCreateInfo) -> VkResult<vk::ShaderModule>;
    /// Destroy a shader module
    fn destroy_shader_module(&self, module: vk::ShaderModule);
    /// Create a pipeline layout
    fn create_pipeline_layout(&self, info: &vk::PipelineLayoutCreateInfo) -> VkResult<vk::PipelineLayout>;
    /// Destroy a pipeline layout
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    /// Create a single graphics pipeline
    fn create_graphics_pipeline(&self, info: &vk::GraphicsPipelineCreateInfo) -> VkResult<vk::Pipeline>;
    /// Destroy a pipeline
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    /// Create a descriptor set layout
    fn create_descriptor_set_layout(&self, info: &vk::DescriptorSetLayoutCreateInfo) -> VkResult<vk::DescriptorSetLayout>;
    /// Destroy a descriptor set layout
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    /// Create a descriptor pool
    fn create_descriptor_pool(&self, info: &vk::DescriptorPoolCreateInfo) -> VkResult<vk::DescriptorPool>;
    /// Destroy a descriptor pool and its sets
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    /// Allocate descriptor sets
    fn allocate_descriptor_sets(&self, info: &vk::DescriptorSetAllocateInfo) -> VkResult<Vec<vk::DescriptorSet>>;
    /// Write descriptor sets
    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]);

    /// Create a swapchain for the device surface
    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR>;
    /// Destroy a swapchain
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    /// Presentable images owned by a swapchain
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    /// Acquire the next presentable image; returns `(index, suboptimal)`
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<(u32, bool)>;
    /// Queue an image for presentation; returns `true` when suboptimal
    fn queue_present(&self, queue: vk::Queue, info: &vk::PresentInfoKHR) -> VkResult<bool>;
}

/// Creates the [`RenderDevice`] a backend renders with
pub trait DeviceFactory {
    /// Create instance, surface and logical device for a platform window
    fn create_device(&mut self, platform: &dyn Platform, app_name: &str) -> VulkanResult<Arc<dyn RenderDevice>>;
}

/// Find the first memory type allowed by `type_filter` that has all of `properties`
pub fn find_memory_index(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let found = (0..memory.memory_type_count).find(|&i| {
        type_filter & (1 << i) != 0
            && memory.memory_types[i as usize].property_flags.contains(properties)
    });

    if found.is_none() {
        log::warn!("Unable to find suitable memory type for {:?}", properties);
    }
    found
}

/// Depth formats probed in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Pick the first depth format usable as a depth/stencil attachment with linear or optimal tiling
pub fn detect_depth_format(device: &dyn RenderDevice) -> Option<vk::Format> {
    let required = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
    DEPTH_FORMAT_CANDIDATES.into_iter().find(|&format| {
        let properties = device.format_properties(format);
        properties.linear_tiling_features.contains(required)
            || properties.optimal_tiling_features.contains(required)
    })
}
