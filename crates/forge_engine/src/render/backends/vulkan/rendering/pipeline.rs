//! Graphics pipeline creation
//!
//! One fixed-function configuration is used for all geometry: back-face
//! culling with counter-clockwise front faces, depth testing with writes, and
//! standard alpha blending. Viewport, scissor and line width are dynamic.

use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::device::RenderDevice;
use crate::render::backends::vulkan::state::commands::CommandBuffer;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Everything needed to build a graphics pipeline
pub struct PipelineDesc<'a> {
    /// Render pass the pipeline renders within (subpass 0)
    pub render_pass: vk::RenderPass,
    /// Stride of one vertex in binding 0
    pub vertex_stride: u32,
    /// Vertex attributes read from binding 0
    pub attributes: &'a [vk::VertexInputAttributeDescription],
    /// Descriptor set layouts, in set order
    pub descriptor_set_layouts: &'a [vk::DescriptorSetLayout],
    /// Shader stages
    pub stages: &'a [vk::PipelineShaderStageCreateInfo],
    /// Initial viewport; replaced dynamically each frame
    pub viewport: vk::Viewport,
    /// Initial scissor; replaced dynamically each frame
    pub scissor: vk::Rect2D,
    /// Rasterize edges only
    pub wireframe: bool,
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct Pipeline {
    device: Arc<dyn RenderDevice>,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl Pipeline {
    /// Create a graphics pipeline and its layout
    pub fn new_graphics(device: Arc<dyn RenderDevice>, desc: &PipelineDesc<'_>) -> VulkanResult<Self> {
        let viewports = [desc.viewport];
        let scissors = [desc.scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(if desc.wireframe {
                vk::PolygonMode::LINE
            } else {
                vk::PolygonMode::FILL
            })
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments);

        let dynamic_states = [
            vk::DynamicState::VIEWPORT,
            vk::DynamicState::SCISSOR,
            vk::DynamicState::LINE_WIDTH,
        ];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: desc.vertex_stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(desc.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(desc.descriptor_set_layouts);
        let layout = device
            .create_pipeline_layout(&layout_info)
            .map_err(VulkanError::Api)?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(desc.stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(desc.render_pass)
            .subpass(0)
            .base_pipeline_index(-1);

        let pipeline = match device.create_graphics_pipeline(&pipeline_info) {
            Ok(pipeline) => pipeline,
            Err(result) => {
                log::error!("Graphics pipeline creation failed: {result:?}");
                device.destroy_pipeline_layout(layout);
                return Err(VulkanError::Api(result));
            }
        };
        log::debug!("Graphics pipeline created");

        Ok(Self {
            device,
            pipeline,
            layout,
        })
    }

    /// Bind the pipeline into a command buffer
    pub fn bind(&self, command_buffer: &CommandBuffer, bind_point: vk::PipelineBindPoint) {
        self.device
            .cmd_bind_pipeline(command_buffer.handle(), bind_point, self.pipeline);
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.device.destroy_pipeline(self.pipeline);
        self.device.destroy_pipeline_layout(self.layout);
    }
}

/// Viewport covering a framebuffer with Y pointing up
///
/// The origin sits at the bottom-left corner and the height is negative, so
/// clip-space +Y maps to the top of the screen.
pub fn flipped_viewport(width: u32, height: u32) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: height as f32,
        width: width as f32,
        height: -(height as f32),
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering a whole framebuffer
pub fn full_scissor(width: u32, height: u32) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: vk::Extent2D { width, height },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::device::mock::MockDevice;
    use approx::assert_relative_eq;

    #[test]
    fn test_flipped_viewport_negates_height() {
        let viewport = flipped_viewport(800, 600);
        assert_relative_eq!(viewport.y, 600.0);
        assert_relative_eq!(viewport.height, -600.0);
        assert_relative_eq!(viewport.width, 800.0);
        assert_relative_eq!(viewport.max_depth, 1.0);

        assert_eq!(full_scissor(800, 600).extent, vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn test_pipeline_destroys_pipeline_and_layout() {
        let mock = Arc::new(MockDevice::new());
        let attributes = [vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        }];
        let desc = PipelineDesc {
            render_pass: vk::RenderPass::null(),
            vertex_stride: 12,
            attributes: &attributes,
            descriptor_set_layouts: &[],
            stages: &[],
            viewport: flipped_viewport(800, 600),
            scissor: full_scissor(800, 600),
            wireframe: false,
        };

        let pipeline = Pipeline::new_graphics(mock.clone(), &desc).unwrap();
        assert_eq!(mock.live("pipeline"), 1);
        assert_eq!(mock.live("pipeline_layout"), 1);

        drop(pipeline);
        assert_eq!(mock.live_total(), 0);
    }
}
