//! Descriptor set layouts, pools and writes for uniform buffers

use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::device::RenderDevice;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Descriptor set layout builder for creating reusable layouts
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(mut self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &Arc<dyn RenderDevice>) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);
        let layout = device
            .create_descriptor_set_layout(&layout_info)
            .map_err(VulkanError::Api)?;

        Ok(DescriptorSetLayout {
            layout,
            device: Arc::clone(device),
            bindings: self.bindings,
        })
    }
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Arc<dyn RenderDevice>,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Get the bindings used in this layout
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        self.device.destroy_descriptor_set_layout(self.layout);
    }
}

/// Descriptor pool holding uniform buffer descriptors
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Arc<dyn RenderDevice>,
}

impl DescriptorPool {
    /// Create a pool with room for `max_sets` sets of one uniform buffer each
    pub fn new(device: Arc<dyn RenderDevice>, max_sets: u32) -> VulkanResult<Self> {
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: max_sets,
        }];

        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = device.create_descriptor_pool(&pool_info).map_err(VulkanError::Api)?;
        Ok(Self { pool, device })
    }

    /// Allocate one descriptor set per layout entry
    pub fn allocate_descriptor_sets(&self, layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        self.device
            .allocate_descriptor_sets(&alloc_info)
            .map_err(VulkanError::Api)
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        self.device.destroy_descriptor_pool(self.pool);
    }
}

struct PendingBufferWrite {
    set: vk::DescriptorSet,
    binding: u32,
    info: vk::DescriptorBufferInfo,
}

/// Batches uniform buffer writes into a single update call
#[derive(Default)]
pub struct DescriptorSetWriter {
    pending: Vec<PendingBufferWrite>,
}

impl DescriptorSetWriter {
    /// Create a new descriptor set writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Point a uniform buffer binding at a buffer range
    pub fn write_buffer(
        mut self,
        descriptor_set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> Self {
        self.pending.push(PendingBufferWrite {
            set: descriptor_set,
            binding,
            info: vk::DescriptorBufferInfo { buffer, offset, range },
        });
        self
    }

    /// Execute all write operations
    pub fn update(self, device: &dyn RenderDevice) {
        // Buffer infos stay in `self.pending` while the writes point into it
        let writes: Vec<vk::WriteDescriptorSet> = self
            .pending
            .iter()
            .map(|pending| {
                vk::WriteDescriptorSet::builder()
                    .dst_set(pending.set)
                    .dst_binding(pending.binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(&pending.info))
                    .build()
            })
            .collect();

        if !writes.is_empty() {
            device.update_descriptor_sets(&writes);
        }
    }
}
