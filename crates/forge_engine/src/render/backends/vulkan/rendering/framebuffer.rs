//! Framebuffer management

use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::device::RenderDevice;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Arc<dyn RenderDevice>,
    framebuffer: vk::Framebuffer,
    attachments: Vec<vk::ImageView>,
}

impl Framebuffer {
    /// Bind image views to the attachment slots of a render pass
    pub fn new(
        device: Arc<dyn RenderDevice>,
        render_pass: vk::RenderPass,
        width: u32,
        height: u32,
        attachments: &[vk::ImageView],
    ) -> VulkanResult<Self> {
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(width)
            .height(height)
            .layers(1);

        let framebuffer = device
            .create_framebuffer(&framebuffer_create_info)
            .map_err(VulkanError::Api)?;

        Ok(Self {
            device,
            framebuffer,
            attachments: attachments.to_vec(),
        })
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Views bound to the attachment slots, in order
    pub fn attachments(&self) -> &[vk::ImageView] {
        &self.attachments
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.device.destroy_framebuffer(self.framebuffer);
    }
}
