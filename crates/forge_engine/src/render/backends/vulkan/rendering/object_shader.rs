//! Built-in object shader
//!
//! Owns the vertex and fragment stages, the global uniform buffer with one
//! [`GlobalUniformObject`] slot per frame in flight (at least three), one
//! descriptor set per slot, and the graphics pipeline that draws
//! [`Vertex3D`] geometry.

use std::path::Path;
use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::device::RenderDevice;
use crate::render::backends::vulkan::resources::{
    Buffer, DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter,
};
use crate::render::backends::vulkan::state::commands::CommandBuffer;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::types::{GlobalUniformObject, Vertex3D, GLOBAL_UBO_SIZE};

use super::pipeline::{flipped_viewport, full_scissor, Pipeline, PipelineDesc};
use super::render_pass::RenderPass;
use super::shader::ShaderModule;

/// Minimum number of global uniform slots
pub const MIN_GLOBAL_SLOTS: usize = 3;

/// The engine's built-in shader for world geometry
pub struct ObjectShader {
    device: Arc<dyn RenderDevice>,
    pipeline: Pipeline,
    global_ubo: Buffer,
    global_descriptor_sets: Vec<vk::DescriptorSet>,
    global_descriptor_pool: DescriptorPool,
    global_descriptor_layout: DescriptorSetLayout,
    stages: Vec<ShaderModule>,
}

impl ObjectShader {
    /// Load the shader stages and build the pipeline and global descriptors
    pub fn new(
        device: &Arc<dyn RenderDevice>,
        assets_root: &Path,
        name: &str,
        render_pass: &RenderPass,
        framebuffer_width: u32,
        framebuffer_height: u32,
        frames_in_flight: usize,
    ) -> VulkanResult<Self> {
        let stages = [vk::ShaderStageFlags::VERTEX, vk::ShaderStageFlags::FRAGMENT]
            .into_iter()
            .map(|stage| ShaderModule::load(Arc::clone(device), assets_root, name, stage))
            .collect::<VulkanResult<Vec<_>>>()?;

        let slot_count = frames_in_flight.max(MIN_GLOBAL_SLOTS);

        let global_descriptor_layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .build(device)?;
        let (global_descriptor_pool, global_descriptor_sets, global_ubo) =
            build_global_slots(device, &global_descriptor_layout, slot_count)?;

        let attributes = [vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        }];
        let stage_infos: Vec<_> = stages.iter().map(ShaderModule::stage_info).collect();
        let set_layouts = [global_descriptor_layout.handle()];

        let pipeline = Pipeline::new_graphics(
            Arc::clone(device),
            &PipelineDesc {
                render_pass: render_pass.handle(),
                vertex_stride: std::mem::size_of::<Vertex3D>() as u32,
                attributes: &attributes,
                descriptor_set_layouts: &set_layouts,
                stages: &stage_infos,
                viewport: flipped_viewport(framebuffer_width, framebuffer_height),
                scissor: full_scissor(framebuffer_width, framebuffer_height),
                wireframe: false,
            },
        )?;

        log::info!("{name} created with {slot_count} global uniform slots");

        Ok(Self {
            device: Arc::clone(device),
            pipeline,
            global_ubo,
            global_descriptor_sets,
            global_descriptor_pool,
            global_descriptor_layout,
            stages,
        })
    }

    /// Bind the shader's pipeline
    pub fn use_shader(&self, command_buffer: &CommandBuffer) {
        self.pipeline.bind(command_buffer, vk::PipelineBindPoint::GRAPHICS);
    }

    /// Bind the global descriptor set of a slot
    pub fn bind_global(&self, command_buffer: &CommandBuffer, slot: usize) {
        let set = self.global_descriptor_sets[slot % self.global_descriptor_sets.len()];
        self.device.cmd_bind_descriptor_sets(
            command_buffer.handle(),
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline.layout(),
            0,
            &[set],
            &[],
        );
    }

    /// Write the global uniforms for a slot
    pub fn update_global_state(&mut self, slot: usize, ubo: &GlobalUniformObject) -> VulkanResult<()> {
        let slot = slot % self.global_descriptor_sets.len();
        self.global_ubo
            .load_data(slot as u64 * GLOBAL_UBO_SIZE, bytemuck::bytes_of(ubo))
            .map_err(|e| {
                log::error!("Failed to write global uniforms for slot {slot}: {e}");
                e
            })
    }

    /// Grow the global slots so each of `frames_in_flight` frames owns one
    ///
    /// Only valid while the device is idle. Existing uniform contents are
    /// discarded; every frame writes its slot before submitting.
    pub fn ensure_slots(&mut self, frames_in_flight: usize) -> VulkanResult<()> {
        if frames_in_flight <= self.slot_count() {
            return Ok(());
        }

        let (pool, sets, ubo) = build_global_slots(&self.device, &self.global_descriptor_layout, frames_in_flight)?;
        self.global_descriptor_sets = sets;
        self.global_ubo = ubo;
        self.global_descriptor_pool = pool;

        log::info!("Global uniform slots grown to {frames_in_flight}");
        Ok(())
    }

    /// Number of global uniform slots
    pub fn slot_count(&self) -> usize {
        self.global_descriptor_sets.len()
    }

    /// Uniform buffer backing the global slots
    pub fn global_buffer(&self) -> &Buffer {
        &self.global_ubo
    }

    /// Shader stages, vertex first
    pub fn stages(&self) -> &[ShaderModule] {
        &self.stages
    }

    /// Layout of descriptor set 0
    pub fn global_layout(&self) -> &DescriptorSetLayout {
        &self.global_descriptor_layout
    }

    /// Pool the global sets come from
    pub fn descriptor_pool(&self) -> &DescriptorPool {
        &self.global_descriptor_pool
    }
}

/// Pool, one set per slot, and the uniform buffer the sets point into
fn build_global_slots(
    device: &Arc<dyn RenderDevice>,
    layout: &DescriptorSetLayout,
    slot_count: usize,
) -> VulkanResult<(DescriptorPool, Vec<vk::DescriptorSet>, Buffer)> {
    let pool = DescriptorPool::new(Arc::clone(device), slot_count as u32)?;

    let layouts = vec![layout.handle(); slot_count];
    let sets = pool.allocate_descriptor_sets(&layouts)?;

    let ubo = Buffer::new(
        Arc::clone(device),
        GLOBAL_UBO_SIZE * slot_count as u64,
        vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        true,
    )?;

    // Each slot's set points at its own range for the lifetime of the buffer
    sets.iter()
        .enumerate()
        .fold(DescriptorSetWriter::new(), |writer, (slot, &set)| {
            writer.write_buffer(set, 0, ubo.handle(), slot as u64 * GLOBAL_UBO_SIZE, GLOBAL_UBO_SIZE)
        })
        .update(device.as_ref());

    Ok((pool, sets, ubo))
}
