//! Production [`RenderDevice`] backed by `ash`

use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::Arc;

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::prelude::VkResult;
use ash::{vk, Device, Instance};

use super::selection::{self, DeviceRequirements, PhysicalDeviceSnapshot};
use super::{DeviceFactory, DeviceInfo, RenderDevice, SwapchainSupport, VulkanInstance};
use crate::platform::Platform;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Presentation surface with RAII cleanup
struct PresentationSurface {
    loader: Surface,
    handle: vk::SurfaceKHR,
}

impl PresentationSurface {
    fn support(&self, physical_device: vk::PhysicalDevice) -> VkResult<SwapchainSupport> {
        unsafe {
            Ok(SwapchainSupport {
                capabilities: self.loader.get_physical_device_surface_capabilities(physical_device, self.handle)?,
                formats: self.loader.get_physical_device_surface_formats(physical_device, self.handle)?,
                present_modes: self.loader.get_physical_device_surface_present_modes(physical_device, self.handle)?,
            })
        }
    }
}

impl Drop for PresentationSurface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}

/// Instance, surface and logical device bundled behind [`RenderDevice`]
///
/// Field order matters: after `Drop::drop` destroys the logical device the
/// surface goes next and the instance (with its debug messenger) last.
pub struct AshDevice {
    info: DeviceInfo,
    physical_device: vk::PhysicalDevice,
    device: Device,
    swapchain_loader: SwapchainLoader,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    transfer_queue: vk::Queue,
    surface: PresentationSurface,
    instance: VulkanInstance,
}

impl AshDevice {
    /// Create the instance, surface and logical device for a platform window
    pub fn new(
        platform: &dyn Platform,
        app_name: &str,
        enable_validation: bool,
        requirements: &DeviceRequirements,
    ) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(platform, app_name, enable_validation)?;

        let surface = PresentationSurface {
            loader: Surface::new(&instance.entry, &instance.instance),
            handle: platform
                .create_surface(&instance.entry, &instance.instance)
                .map_err(VulkanError::Api)?,
        };
        log::info!("Vulkan surface created");

        let physical_devices = unsafe {
            instance.instance.enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };
        if physical_devices.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "No devices which support Vulkan were found".to_string(),
            ));
        }

        let snapshots = physical_devices
            .iter()
            .map(|&physical_device| snapshot_device(&instance.instance, &surface, physical_device))
            .collect::<VkResult<Vec<_>>>()
            .map_err(VulkanError::Api)?;

        let (selected, queue_families) = selection::select_physical_device(&snapshots, requirements)
            .ok_or(VulkanError::NoSuitableDevice)?;
        let snapshot = &snapshots[selected];
        log_device_report(snapshot);

        let queue_priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique_families()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extension_names = selection::enabled_device_extensions(requirements, &snapshot.extensions)
            .into_iter()
            .map(CString::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VulkanError::InitializationFailed("Invalid device extension name".to_string()))?;
        let extension_ptrs: Vec<*const c_char> = extension_names.iter().map(|name| name.as_ptr()).collect();

        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(requirements.sampler_anisotropy)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&device_features);

        let device = unsafe {
            instance.instance.create_device(snapshot.handle, &create_info, None)
                .map_err(VulkanError::Api)?
        };
        log::info!("Logical device created");

        let (graphics_queue, present_queue, transfer_queue) = unsafe {
            (
                device.get_device_queue(queue_families.graphics, 0),
                device.get_device_queue(queue_families.present, 0),
                device.get_device_queue(queue_families.transfer, 0),
            )
        };
        log::info!("Queues obtained");

        let swapchain_loader = SwapchainLoader::new(&instance.instance, &device);

        Ok(Self {
            info: DeviceInfo {
                name: snapshot.name.clone(),
                properties: snapshot.properties,
                features: snapshot.features,
                memory: snapshot.memory,
                queue_families,
            },
            physical_device: snapshot.handle,
            device,
            swapchain_loader,
            graphics_queue,
            present_queue,
            transfer_queue,
            surface,
            instance,
        })
    }
}

impl Drop for AshDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
        log::debug!("Logical device destroyed");
    }
}

fn snapshot_device(
    instance: &Instance,
    surface: &PresentationSurface,
    physical_device: vk::PhysicalDevice,
) -> VkResult<PhysicalDeviceSnapshot> {
    unsafe {
        let properties = instance.get_physical_device_properties(physical_device);
        let queue_families = instance.get_physical_device_queue_family_properties(physical_device);

        let mut present_support = Vec::with_capacity(queue_families.len());
        for index in 0..queue_families.len() as u32 {
            present_support.push(
                surface
                    .loader
                    .get_physical_device_surface_support(physical_device, index, surface.handle)?,
            );
        }

        let extensions = instance
            .enumerate_device_extension_properties(physical_device)?
            .iter()
            .map(|ext| CStr::from_ptr(ext.extension_name.as_ptr()).to_string_lossy().into_owned())
            .collect();

        Ok(PhysicalDeviceSnapshot {
            handle: physical_device,
            name: CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy().into_owned(),
            properties,
            features: instance.get_physical_device_features(physical_device),
            memory: instance.get_physical_device_memory_properties(physical_device),
            queue_families,
            present_support,
            extensions,
            swapchain_support: surface.support(physical_device)?,
        })
    }
}

fn log_device_report(snapshot: &PhysicalDeviceSnapshot) {
    let properties = &snapshot.properties;
    log::info!("Selected device: '{}'", snapshot.name);
    log::info!("GPU type is {}", selection::device_type_name(properties.device_type));
    log::info!(
        "GPU driver version: {}.{}.{}",
        vk::api_version_major(properties.driver_version),
        vk::api_version_minor(properties.driver_version),
        vk::api_version_patch(properties.driver_version)
    );
    log::info!(
        "Vulkan API version: {}.{}.{}",
        vk::api_version_major(properties.api_version),
        vk::api_version_minor(properties.api_version),
        vk::api_version_patch(properties.api_version)
    );

    let memory = &snapshot.memory;
    for heap in &memory.memory_heaps[..memory.memory_heap_count as usize] {
        let gib = heap.size as f64 / 1024.0 / 1024.0 / 1024.0;
        if heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL) {
            log::info!("Local GPU memory: {gib:.2} GiB");
        } else {
            log::info!("Shared system memory: {gib:.2} GiB");
        }
    }
}

impl RenderDevice for AshDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    fn transfer_queue(&self) -> vk::Queue {
        self.transfer_queue
    }

    fn surface(&self) -> vk::SurfaceKHR {
        self.surface.handle
    }

    fn query_swapchain_support(&self) -> VkResult<SwapchainSupport> {
        self.surface.support(self.physical_device)
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()> {
        unsafe { self.device.queue_wait_idle(queue) }
    }

    fn queue_submit(&self, queue: vk::Queue, submits: &[vk::SubmitInfo], fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.queue_submit(queue, submits, fence) }
    }

    fn create_semaphore(&self, info: &vk::SemaphoreCreateInfo) -> VkResult<vk::Semaphore> {
        unsafe { self.device.create_semaphore(info, None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&self, info: &vk::FenceCreateInfo) -> VkResult<vk::Fence> {
        unsafe { self.device.create_fence(info, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], wait_all: bool, timeout: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(fences, wait_all, timeout) }
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        unsafe { self.device.reset_fences(fences) }
    }

    fn create_command_pool(&self, info: &vk::CommandPoolCreateInfo) -> VkResult<vk::CommandPool> {
        unsafe { self.device.create_command_pool(info, None) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(&self, info: &vk::CommandBufferAllocateInfo) -> VkResult<Vec<vk::CommandBuffer>> {
        unsafe { self.device.allocate_command_buffers(info) }
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, buffers) }
    }

    fn begin_command_buffer(&self, buffer: vk::CommandBuffer, info: &vk::CommandBufferBeginInfo) -> VkResult<()> {
        unsafe { self.device.begin_command_buffer(buffer, info) }
    }

    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(buffer) }
    }

    fn cmd_begin_render_pass(&self, buffer: vk::CommandBuffer, info: &vk::RenderPassBeginInfo, contents: vk::SubpassContents) {
        unsafe { self.device.cmd_begin_render_pass(buffer, info, contents) }
    }

    fn cmd_end_render_pass(&self, buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(buffer) }
    }

    fn cmd_set_viewport(&self, buffer: vk::CommandBuffer, first: u32, viewports: &[vk::Viewport]) {
        unsafe { self.device.cmd_set_viewport(buffer, first, viewports) }
    }

    fn cmd_set_scissor(&self, buffer: vk::CommandBuffer, first: u32, scissors: &[vk::Rect2D]) {
        unsafe { self.device.cmd_set_scissor(buffer, first, scissors) }
    }

    fn cmd_set_line_width(&self, buffer: vk::CommandBuffer, width: f32) {
        unsafe { self.device.cmd_set_line_width(buffer, width) }
    }

    fn cmd_bind_pipeline(&self, buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.device.cmd_bind_pipeline(buffer, bind_point, pipeline) }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device
                .cmd_bind_descriptor_sets(buffer, bind_point, layout, first_set, sets, dynamic_offsets);
        }
    }

    fn cmd_bind_vertex_buffers(&self, buffer: vk::CommandBuffer, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        unsafe { self.device.cmd_bind_vertex_buffers(buffer, first_binding, buffers, offsets) }
    }

    fn cmd_bind_index_buffer(&self, buffer: vk::CommandBuffer, index_buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        unsafe { self.device.cmd_bind_index_buffer(buffer, index_buffer, offset, index_type) }
    }

    fn cmd_draw_indexed(
        &self,
        buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    fn cmd_copy_buffer(&self, buffer: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.device.cmd_copy_buffer(buffer, src, dst, regions) }
    }

    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo) -> VkResult<vk::DeviceMemory> {
        unsafe { self.device.allocate_memory(info, None) }
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) }
    }

    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        flags: vk::MemoryMapFlags,
    ) -> VkResult<*mut c_void> {
        unsafe { self.device.map_memory(memory, offset, size, flags) }
    }

    fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.unmap_memory(memory) }
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VkResult<vk::Buffer> {
        unsafe { self.device.create_buffer(info, None) }
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        unsafe { self.device.get_buffer_memory_requirements(buffer) }
    }

    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> VkResult<()> {
        unsafe { self.device.bind_buffer_memory(buffer, memory, offset) }
    }

    fn create_image(&self, info: &vk::ImageCreateInfo) -> VkResult<vk::Image> {
        unsafe { self.device.create_image(info, None) }
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.device.get_image_memory_requirements(image) }
    }

    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> VkResult<()> {
        unsafe { self.device.bind_image_memory(image, memory, offset) }
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        unsafe { self.device.create_image_view(info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass> {
        unsafe { self.device.create_render_pass(info, None) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer> {
        unsafe { self.device.create_framebuffer(info, None) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn create_shader_module(&self, info: &vk::ShaderModuleCreateInfo) -> VkResult<vk::ShaderModule> {
        unsafe { self.device.create_shader_module(info, None) }
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) }
    }

    fn create_pipeline_layout(&self, info: &vk::PipelineLayoutCreateInfo) -> VkResult<vk::PipelineLayout> {
        unsafe { self.device.create_pipeline_layout(info, None) }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(&self, info: &vk::GraphicsPipelineCreateInfo) -> VkResult<vk::Pipeline> {
        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(info), None)
                .map_err(|(_, result)| result)?
        };
        pipelines.into_iter().next().ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    fn create_descriptor_set_layout(&self, info: &vk::DescriptorSetLayoutCreateInfo) -> VkResult<vk::DescriptorSetLayout> {
        unsafe { self.device.create_descriptor_set_layout(info, None) }
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_descriptor_pool(&self, info: &vk::DescriptorPoolCreateInfo) -> VkResult<vk::DescriptorPool> {
        unsafe { self.device.create_descriptor_pool(info, None) }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_sets(&self, info: &vk::DescriptorSetAllocateInfo) -> VkResult<Vec<vk::DescriptorSet>> {
        unsafe { self.device.allocate_descriptor_sets(info) }
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        unsafe { self.device.update_descriptor_sets(writes, &[]) }
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR> {
        unsafe { self.swapchain_loader.create_swapchain(info, None) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<(u32, bool)> {
        unsafe { self.swapchain_loader.acquire_next_image(swapchain, timeout, semaphore, fence) }
    }

    fn queue_present(&self, queue: vk::Queue, info: &vk::PresentInfoKHR) -> VkResult<bool> {
        unsafe { self.swapchain_loader.queue_present(queue, info) }
    }
}

/// Creates [`AshDevice`]s for the Vulkan backend
#[derive(Debug, Clone, Default)]
pub struct NativeDeviceFactory {
    /// Enable validation layers (debug builds only)
    pub enable_validation: bool,
    /// Requirements passed to physical device selection
    pub requirements: DeviceRequirements,
}

impl NativeDeviceFactory {
    /// Factory with default requirements
    pub fn new(enable_validation: bool) -> Self {
        Self {
            enable_validation,
            requirements: DeviceRequirements::default(),
        }
    }
}

impl DeviceFactory for NativeDeviceFactory {
    fn create_device(&mut self, platform: &dyn Platform, app_name: &str) -> VulkanResult<Arc<dyn RenderDevice>> {
        let device = AshDevice::new(platform, app_name, self.enable_validation, &self.requirements)?;
        Ok(Arc::new(device))
    }
}
