//! Scripted in-memory device for tests
//!
//! Handles are fabricated from a counter. Live objects are counted per kind so
//! tests can assert that teardown releases everything, and calls are counted
//! per operation. Memory allocations are backed by host vectors; buffer copies
//! recorded with `cmd_copy_buffer` are applied immediately.

use std::collections::{HashMap, VecDeque};
use std::ffi::c_void;
use std::sync::Mutex;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};

use super::{DeviceInfo, QueueFamilyIndices, RenderDevice, SwapchainSupport};

#[derive(Default)]
struct MockState {
    next_handle: u64,
    live: HashMap<&'static str, i64>,
    calls: HashMap<&'static str, usize>,
    memory: HashMap<u64, Vec<u8>>,
    buffer_bindings: HashMap<u64, (u64, u64)>,
    buffer_sizes: HashMap<u64, u64>,
    swapchain_images: HashMap<u64, Vec<vk::Image>>,
    next_image: u32,
    acquire_script: VecDeque<VkResult<(u32, bool)>>,
    present_script: VecDeque<VkResult<bool>>,
    wait_script: VecDeque<VkResult<()>>,
    support: SwapchainSupport,
    depth_formats: Vec<vk::Format>,
    fail_next_allocation: bool,
    failing_command_buffer_allocations: usize,
    swapchain_extents: Vec<vk::Extent2D>,
    draws: Vec<u32>,
}

/// Test double for [`RenderDevice`]
pub(crate) struct MockDevice {
    info: DeviceInfo,
    state: Mutex<MockState>,
}

pub(crate) const HOST_MEMORY_TYPE: u32 = 1;

impl MockDevice {
    pub(crate) fn new() -> Self {
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            memory_heap_count: 1,
            ..Default::default()
        };
        memory.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        memory.memory_types[HOST_MEMORY_TYPE as usize].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        let state = MockState {
            next_handle: 1,
            support: SwapchainSupport {
                capabilities: vk::SurfaceCapabilitiesKHR {
                    min_image_count: 2,
                    max_image_count: 4,
                    current_extent: vk::Extent2D {
                        width: u32::MAX,
                        height: u32::MAX,
                    },
                    min_image_extent: vk::Extent2D { width: 1, height: 1 },
                    max_image_extent: vk::Extent2D {
                        width: 4096,
                        height: 4096,
                    },
                    max_image_array_layers: 1,
                    current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                    ..Default::default()
                },
                formats: vec![vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }],
                present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            },
            depth_formats: vec![vk::Format::D32_SFLOAT],
            ..Default::default()
        };

        Self {
            info: DeviceInfo {
                name: "Mock GPU".to_string(),
                properties: vk::PhysicalDeviceProperties::default(),
                features: vk::PhysicalDeviceFeatures {
                    sampler_anisotropy: vk::TRUE,
                    ..Default::default()
                },
                memory,
                queue_families: QueueFamilyIndices::default(),
            },
            state: Mutex::new(state),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut state)
    }

    fn call(&self, name: &'static str) {
        self.with(|state| *state.calls.entry(name).or_default() += 1);
    }

    fn create<H: Handle>(&self, kind: &'static str) -> H {
        self.with(|state| {
            *state.live.entry(kind).or_default() += 1;
            let raw = state.next_handle;
            state.next_handle += 1;
            H::from_raw(raw)
        })
    }

    fn destroy<H: Handle>(&self, kind: &'static str, handle: H) {
        if handle.as_raw() != 0 {
            self.with(|state| *state.live.entry(kind).or_default() -= 1);
        }
    }

    /// Number of live objects of a kind ("fence", "buffer", "image_view", ...)
    pub(crate) fn live(&self, kind: &'static str) -> i64 {
        self.with(|state| state.live.get(kind).copied().unwrap_or(0))
    }

    /// Total number of live objects across all kinds
    pub(crate) fn live_total(&self) -> i64 {
        self.with(|state| state.live.values().sum())
    }

    /// How often an operation was invoked
    pub(crate) fn calls(&self, name: &'static str) -> usize {
        self.with(|state| state.calls.get(name).copied().unwrap_or(0))
    }

    pub(crate) fn script_acquire(&self, result: VkResult<(u32, bool)>) {
        self.with(|state| state.acquire_script.push_back(result));
    }

    pub(crate) fn script_present(&self, result: VkResult<bool>) {
        self.with(|state| state.present_script.push_back(result));
    }

    pub(crate) fn script_fence_wait(&self, result: VkResult<()>) {
        self.with(|state| state.wait_script.push_back(result));
    }

    pub(crate) fn set_depth_support(&self, formats: &[vk::Format]) {
        self.with(|state| state.depth_formats = formats.to_vec());
    }

    pub(crate) fn set_capabilities(&self, capabilities: vk::SurfaceCapabilitiesKHR) {
        self.with(|state| state.support.capabilities = capabilities);
    }

    pub(crate) fn set_surface_formats(&self, formats: Vec<vk::SurfaceFormatKHR>) {
        self.with(|state| state.support.formats = formats);
    }

    pub(crate) fn set_present_modes(&self, modes: Vec<vk::PresentModeKHR>) {
        self.with(|state| state.support.present_modes = modes);
    }

    pub(crate) fn fail_next_allocation(&self) {
        self.with(|state| state.fail_next_allocation = true);
    }

    /// Fail the next `count` command buffer allocations
    pub(crate) fn fail_command_buffer_allocations(&self, count: usize) {
        self.with(|state| state.failing_command_buffer_allocations = count);
    }

    /// Change the image count bounds reported by later capability queries
    pub(crate) fn set_image_count_range(&self, min: u32, max: u32) {
        self.with(|state| {
            state.support.capabilities.min_image_count = min;
            state.support.capabilities.max_image_count = max;
        });
    }

    /// Extents of every swapchain created so far
    pub(crate) fn swapchain_extents(&self) -> Vec<vk::Extent2D> {
        self.with(|state| state.swapchain_extents.clone())
    }

    /// Index counts of every indexed draw recorded so far
    pub(crate) fn draws(&self) -> Vec<u32> {
        self.with(|state| state.draws.clone())
    }

    /// Copy of the bytes backing an allocation
    pub(crate) fn memory_contents(&self, memory: vk::DeviceMemory) -> Vec<u8> {
        self.with(|state| state.memory.get(&memory.as_raw()).cloned().unwrap_or_default())
    }

    /// Bytes backing the memory a buffer is bound to, starting at the bind offset
    pub(crate) fn buffer_contents(&self, buffer: vk::Buffer) -> Vec<u8> {
        self.with(|state| {
            let Some(&(memory, offset)) = state.buffer_bindings.get(&buffer.as_raw()) else {
                return Vec::new();
            };
            state
                .memory
                .get(&memory)
                .map(|bytes| bytes[offset as usize..].to_vec())
                .unwrap_or_default()
        })
    }
}

impl RenderDevice for MockDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn graphics_queue(&self) -> vk::Queue {
        vk::Queue::from_raw(0x1000)
    }

    fn present_queue(&self) -> vk::Queue {
        vk::Queue::from_raw(0x1000)
    }

    fn transfer_queue(&self) -> vk::Queue {
        vk::Queue::from_raw(0x1000)
    }

    fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0x2000)
    }

    fn query_swapchain_support(&self) -> VkResult<SwapchainSupport> {
        self.call("query_swapchain_support");
        Ok(self.with(|state| state.support.clone()))
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        let supported = self.with(|state| state.depth_formats.contains(&format));
        let features = if supported {
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::FormatFeatureFlags::empty()
        };
        vk::FormatProperties {
            optimal_tiling_features: features,
            ..Default::default()
        }
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        self.call("device_wait_idle");
        Ok(())
    }

    fn queue_wait_idle(&self, _queue: vk::Queue) -> VkResult<()> {
        self.call("queue_wait_idle");
        Ok(())
    }

    fn queue_submit(&self, _queue: vk::Queue, _submits: &[vk::SubmitInfo], _fence: vk::Fence) -> VkResult<()> {
        self.call("queue_submit");
        Ok(())
    }

    fn create_semaphore(&self, _info: &vk::SemaphoreCreateInfo) -> VkResult<vk::Semaphore> {
        Ok(self.create("semaphore"))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.destroy("semaphore", semaphore);
    }

    fn create_fence(&self, _info: &vk::FenceCreateInfo) -> VkResult<vk::Fence> {
        Ok(self.create("fence"))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.destroy("fence", fence);
    }

    fn wait_for_fences(&self, _fences: &[vk::Fence], _wait_all: bool, _timeout: u64) -> VkResult<()> {
        self.call("wait_for_fences");
        self.with(|state| state.wait_script.pop_front().unwrap_or(Ok(())))
    }

    fn reset_fences(&self, _fences: &[vk::Fence]) -> VkResult<()> {
        self.call("reset_fences");
        Ok(())
    }

    fn create_command_pool(&self, _info: &vk::CommandPoolCreateInfo) -> VkResult<vk::CommandPool> {
        Ok(self.create("command_pool"))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.destroy("command_pool", pool);
    }

    fn allocate_command_buffers(&self, info: &vk::CommandBufferAllocateInfo) -> VkResult<Vec<vk::CommandBuffer>> {
        let fail = self.with(|state| {
            let failing = state.failing_command_buffer_allocations > 0;
            state.failing_command_buffer_allocations = state.failing_command_buffer_allocations.saturating_sub(1);
            failing
        });
        if fail {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        Ok((0..info.command_buffer_count).map(|_| self.create("command_buffer")).collect())
    }

    fn free_command_buffers(&self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        for &buffer in buffers {
            self.destroy("command_buffer", buffer);
        }
    }

    fn begin_command_buffer(&self, _buffer: vk::CommandBuffer, _info: &vk::CommandBufferBeginInfo) -> VkResult<()> {
        self.call("begin_command_buffer");
        Ok(())
    }

    fn end_command_buffer(&self, _buffer: vk::CommandBuffer) -> VkResult<()> {
        self.call("end_command_buffer");
        Ok(())
    }

    fn cmd_begin_render_pass(&self, _buffer: vk::CommandBuffer, _info: &vk::RenderPassBeginInfo, _contents: vk::SubpassContents) {
        self.call("cmd_begin_render_pass");
    }

    fn cmd_end_render_pass(&self, _buffer: vk::CommandBuffer) {
        self.call("cmd_end_render_pass");
    }

    fn cmd_set_viewport(&self, _buffer: vk::CommandBuffer, _first: u32, _viewports: &[vk::Viewport]) {
        self.call("cmd_set_viewport");
    }

    fn cmd_set_scissor(&self, _buffer: vk::CommandBuffer, _first: u32, _scissors: &[vk::Rect2D]) {
        self.call("cmd_set_scissor");
    }

    fn cmd_set_line_width(&self, _buffer: vk::CommandBuffer, _width: f32) {
        self.call("cmd_set_line_width");
    }

    fn cmd_bind_pipeline(&self, _buffer: vk::CommandBuffer, _bind_point: vk::PipelineBindPoint, _pipeline: vk::Pipeline) {
        self.call("cmd_bind_pipeline");
    }

    fn cmd_bind_descriptor_sets(
        &self,
        _buffer: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        _layout: vk::PipelineLayout,
        _first_set: u32,
        _sets: &[vk::DescriptorSet],
        _dynamic_offsets: &[u32],
    ) {
        self.call("cmd_bind_descriptor_sets");
    }

    fn cmd_bind_vertex_buffers(&self, _buffer: vk::CommandBuffer, _first_binding: u32, _buffers: &[vk::Buffer], _offsets: &[vk::DeviceSize]) {
        self.call("cmd_bind_vertex_buffers");
    }

    fn cmd_bind_index_buffer(&self, _buffer: vk::CommandBuffer, _index_buffer: vk::Buffer, _offset: vk::DeviceSize, _index_type: vk::IndexType) {
        self.call("cmd_bind_index_buffer");
    }

    fn cmd_draw_indexed(
        &self,
        _buffer: vk::CommandBuffer,
        index_count: u32,
        _instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.call("cmd_draw_indexed");
        self.with(|state| state.draws.push(index_count));
    }

    fn cmd_copy_buffer(&self, _buffer: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.call("cmd_copy_buffer");
        self.with(|state| {
            let (Some(&(src_memory, src_base)), Some(&(dst_memory, dst_base))) = (
                state.buffer_bindings.get(&src.as_raw()),
                state.buffer_bindings.get(&dst.as_raw()),
            ) else {
                return;
            };
            for region in regions {
                let start = (src_base + region.src_offset) as usize;
                let bytes = state.memory[&src_memory][start..start + region.size as usize].to_vec();
                let dst_start = (dst_base + region.dst_offset) as usize;
                if let Some(target) = state.memory.get_mut(&dst_memory) {
                    target[dst_start..dst_start + bytes.len()].copy_from_slice(&bytes);
                }
            }
        });
    }

    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo) -> VkResult<vk::DeviceMemory> {
        if self.with(|state| std::mem::take(&mut state.fail_next_allocation)) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        let memory: vk::DeviceMemory = self.create("memory");
        self.with(|state| {
            state
                .memory
                .insert(memory.as_raw(), vec![0; info.allocation_size as usize]);
        });
        Ok(memory)
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        self.with(|state| state.memory.remove(&memory.as_raw()));
        self.destroy("memory", memory);
    }

    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        _size: vk::DeviceSize,
        _flags: vk::MemoryMapFlags,
    ) -> VkResult<*mut c_void> {
        self.call("map_memory");
        self.with(|state| {
            let bytes = state
                .memory
                .get_mut(&memory.as_raw())
                .ok_or(vk::Result::ERROR_MEMORY_MAP_FAILED)?;
            Ok(bytes[offset as usize..].as_mut_ptr().cast::<c_void>())
        })
    }

    fn unmap_memory(&self, _memory: vk::DeviceMemory) {
        self.call("unmap_memory");
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VkResult<vk::Buffer> {
        let buffer: vk::Buffer = self.create("buffer");
        self.with(|state| state.buffer_sizes.insert(buffer.as_raw(), info.size));
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.with(|state| {
            state.buffer_bindings.remove(&buffer.as_raw());
            state.buffer_sizes.remove(&buffer.as_raw());
        });
        self.destroy("buffer", buffer);
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let size = self.with(|state| state.buffer_sizes.get(&buffer.as_raw()).copied().unwrap_or(0));
        vk::MemoryRequirements {
            size,
            alignment: 256,
            memory_type_bits: 0b11,
        }
    }

    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> VkResult<()> {
        self.call("bind_buffer_memory");
        self.with(|state| {
            state
                .buffer_bindings
                .insert(buffer.as_raw(), (memory.as_raw(), offset));
        });
        Ok(())
    }

    fn create_image(&self, _info: &vk::ImageCreateInfo) -> VkResult<vk::Image> {
        Ok(self.create("image"))
    }

    fn destroy_image(&self, image: vk::Image) {
        self.destroy("image", image);
    }

    fn image_memory_requirements(&self, _image: vk::Image) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size: 1024,
            alignment: 256,
            memory_type_bits: 0b11,
        }
    }

    fn bind_image_memory(&self, _image: vk::Image, _memory: vk::DeviceMemory, _offset: vk::DeviceSize) -> VkResult<()> {
        self.call("bind_image_memory");
        Ok(())
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        Ok(self.create("image_view"))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.destroy("image_view", view);
    }

    fn create_render_pass(&self, _info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass> {
        Ok(self.create("render_pass"))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.destroy("render_pass", render_pass);
    }

    fn create_framebuffer(&self, _info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer> {
        Ok(self.create("framebuffer"))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.destroy("framebuffer", framebuffer);
    }

    fn create_shader_module(&self, _info: &vk::ShaderModuleCreateInfo) -> VkResult<vk::ShaderModule> {
        Ok(self.create("shader_module"))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.destroy("shader_module", module);
    }

    fn create_pipeline_layout(&self, _info: &vk::PipelineLayoutCreateInfo) -> VkResult<vk::PipelineLayout> {
        Ok(self.create("pipeline_layout"))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.destroy("pipeline_layout", layout);
    }

    fn create_graphics_pipeline(&self, _info: &vk::GraphicsPipelineCreateInfo) -> VkResult<vk::Pipeline> {
        Ok(self.create("pipeline"))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.destroy("pipeline", pipeline);
    }

    fn create_descriptor_set_layout(&self, _info: &vk::DescriptorSetLayoutCreateInfo) -> VkResult<vk::DescriptorSetLayout> {
        Ok(self.create("descriptor_set_layout"))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.destroy("descriptor_set_layout", layout);
    }

    fn create_descriptor_pool(&self, _info: &vk::DescriptorPoolCreateInfo) -> VkResult<vk::DescriptorPool> {
        Ok(self.create("descriptor_pool"))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.destroy("descriptor_pool", pool);
    }

    fn allocate_descriptor_sets(&self, info: &vk::DescriptorSetAllocateInfo) -> VkResult<Vec<vk::DescriptorSet>> {
        self.call("allocate_descriptor_sets");
        // Sets are owned by the pool, so they are not tracked as live objects
        Ok(self.with(|state| {
            (0..info.descriptor_set_count)
                .map(|_| {
                    let raw = state.next_handle;
                    state.next_handle += 1;
                    vk::DescriptorSet::from_raw(raw)
                })
                .collect()
        }))
    }

    fn update_descriptor_sets(&self, _writes: &[vk::WriteDescriptorSet]) {
        self.call("update_descriptor_sets");
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR> {
        let swapchain: vk::SwapchainKHR = self.create("swapchain");
        let images: Vec<vk::Image> = (0..info.min_image_count)
            .map(|_| {
                self.with(|state| {
                    let raw = state.next_handle;
                    state.next_handle += 1;
                    vk::Image::from_raw(raw)
                })
            })
            .collect();
        self.with(|state| {
            state.swapchain_images.insert(swapchain.as_raw(), images);
            state.swapchain_extents.push(info.image_extent);
            state.next_image = 0;
        });
        Ok(swapchain)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.with(|state| state.swapchain_images.remove(&swapchain.as_raw()));
        self.destroy("swapchain", swapchain);
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.with(|state| {
            state
                .swapchain_images
                .get(&swapchain.as_raw())
                .cloned()
                .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)
        })
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        _semaphore: vk::Semaphore,
        _fence: vk::Fence,
    ) -> VkResult<(u32, bool)> {
        self.call("acquire_next_image");
        self.with(|state| {
            if let Some(scripted) = state.acquire_script.pop_front() {
                return scripted;
            }
            let count = state
                .swapchain_images
                .get(&swapchain.as_raw())
                .map_or(0, Vec::len) as u32;
            if count == 0 {
                return Err(vk::Result::ERROR_SURFACE_LOST_KHR);
            }
            let index = state.next_image % count;
            state.next_image = state.next_image.wrapping_add(1);
            Ok((index, false))
        })
    }

    fn queue_present(&self, _queue: vk::Queue, _info: &vk::PresentInfoKHR) -> VkResult<bool> {
        self.call("queue_present");
        self.with(|state| state.present_script.pop_front().unwrap_or(Ok(false)))
    }
}
