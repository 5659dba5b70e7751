//! Images and image views
//!
//! Every [`Image`] is created with [`IMAGE_MIP_LEVELS`] mip levels and a
//! single array layer. Nothing generates or samples those mips yet; the count
//! is a fixed policy rather than a caller choice.

use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::device::{find_memory_index, RenderDevice};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Mip levels requested for every image
pub const IMAGE_MIP_LEVELS: u32 = 4;

/// Image view wrapper with RAII cleanup
pub struct ImageView {
    device: Arc<dyn RenderDevice>,
    handle: vk::ImageView,
}

impl ImageView {
    /// Create a 2D view of the first mip level and layer
    pub fn new(
        device: Arc<dyn RenderDevice>,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<Self> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let handle = device.create_image_view(&view_info).map_err(VulkanError::Api)?;
        Ok(Self { device, handle })
    }

    /// Get the view handle
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        self.device.destroy_image_view(self.handle);
    }
}

/// Parameters for [`Image::new`]
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    /// Image dimensionality
    pub image_type: vk::ImageType,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Texel format
    pub format: vk::Format,
    /// Tiling mode
    pub tiling: vk::ImageTiling,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Required memory properties
    pub memory_flags: vk::MemoryPropertyFlags,
    /// Aspect of the view to create, if any
    pub view_aspect: Option<vk::ImageAspectFlags>,
}

impl ImageDesc {
    /// Device-local 2D depth attachment with a depth view
    pub fn depth_attachment(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            image_type: vk::ImageType::TYPE_2D,
            width,
            height,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            memory_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            view_aspect: Some(vk::ImageAspectFlags::DEPTH),
        }
    }
}

/// Image with its own memory and optional view
pub struct Image {
    device: Arc<dyn RenderDevice>,
    view: Option<ImageView>,
    memory: vk::DeviceMemory,
    handle: vk::Image,
    width: u32,
    height: u32,
}

impl Image {
    /// Create, allocate and bind an image, optionally with a view
    pub fn new(device: Arc<dyn RenderDevice>, desc: &ImageDesc) -> VulkanResult<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(desc.image_type)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(IMAGE_MIP_LEVELS)
            .array_layers(1)
            .format(desc.format)
            .tiling(desc.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = device.create_image(&image_info).map_err(VulkanError::Api)?;
        let mut image = Self {
            device,
            view: None,
            memory: vk::DeviceMemory::null(),
            handle,
            width: desc.width,
            height: desc.height,
        };

        let requirements = image.device.image_memory_requirements(handle);
        let memory_index = find_memory_index(
            &image.device.info().memory,
            requirements.memory_type_bits,
            desc.memory_flags,
        )
        .ok_or_else(|| {
            log::error!("Required memory type not found, image not valid");
            VulkanError::NoSuitableMemoryType
        })?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_index);
        image.memory = image.device.allocate_memory(&alloc_info).map_err(VulkanError::Api)?;
        image
            .device
            .bind_image_memory(handle, image.memory, 0)
            .map_err(VulkanError::Api)?;

        if let Some(aspect) = desc.view_aspect {
            image.view = Some(ImageView::new(Arc::clone(&image.device), handle, desc.format, aspect)?);
        }

        Ok(image)
    }

    /// Get the image handle
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    /// View handle, or null when created without a view
    pub fn view(&self) -> vk::ImageView {
        self.view.as_ref().map_or_else(vk::ImageView::null, ImageView::handle)
    }

    /// Image size in texels
    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        self.view = None;
        self.device.free_memory(self.memory);
        self.device.destroy_image(self.handle);
    }
}
