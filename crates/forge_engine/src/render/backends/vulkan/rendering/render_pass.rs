//! Render pass management
//!
//! The main pass clears a color target that is presented afterwards and a
//! depth target that is discarded at the end of the pass.

use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::device::RenderDevice;
use crate::render::backends::vulkan::state::commands::CommandBuffer;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Render pass wrapper with RAII cleanup
pub struct RenderPass {
    device: Arc<dyn RenderDevice>,
    render_pass: vk::RenderPass,
    render_area: vk::Rect2D,
    clear_color: [f32; 4],
    depth: f32,
    stencil: u32,
}

impl RenderPass {
    /// Create the main forward pass with one color and one depth attachment
    pub fn new(
        device: Arc<dyn RenderDevice>,
        color_format: vk::Format,
        depth_format: vk::Format,
        render_area: vk::Rect2D,
        clear_color: [f32; 4],
        depth: f32,
        stencil: u32,
    ) -> VulkanResult<Self> {
        let color_attachment = vk::AttachmentDescription::builder()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();

        let depth_attachment = vk::AttachmentDescription::builder()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build();

        let attachments = [color_attachment, depth_attachment];

        let color_attachment_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_attachment_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_attachment_refs)
            .depth_stencil_attachment(&depth_attachment_ref)
            .build()];

        // Color writes wait for the acquired image to be released by presentation
        let dependencies = [vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .build()];

        let render_pass_create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = device
            .create_render_pass(&render_pass_create_info)
            .map_err(VulkanError::Api)?;
        log::debug!("Main render pass created ({color_format:?} / {depth_format:?})");

        Ok(Self {
            device,
            render_pass,
            render_area,
            clear_color,
            depth,
            stencil,
        })
    }

    /// Begin the pass on a framebuffer, moving the command buffer into `InRenderPass`
    pub fn begin(&self, command_buffer: &mut CommandBuffer, framebuffer: vk::Framebuffer) -> VulkanResult<()> {
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.depth,
                    stencil: self.stencil,
                },
            },
        ];

        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(self.render_area)
            .clear_values(&clear_values);

        command_buffer.begin_render_pass(&begin_info)
    }

    /// End the pass, returning the command buffer to `Recording`
    pub fn end(&self, command_buffer: &mut CommandBuffer) -> VulkanResult<()> {
        command_buffer.end_render_pass()
    }

    /// Update the area cleared and rendered by the pass
    pub fn set_extent(&mut self, width: u32, height: u32) {
        self.render_area.extent = vk::Extent2D { width, height };
    }

    /// Current render area
    pub fn render_area(&self) -> vk::Rect2D {
        self.render_area
    }

    /// Get the render pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        self.device.destroy_render_pass(self.render_pass);
    }
}
