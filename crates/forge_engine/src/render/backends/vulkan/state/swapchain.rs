//! Swapchain lifecycle
//!
//! [`Swapchain`] owns the presentable image views, one shared depth
//! attachment and a framebuffer per image. Resizing never patches these in
//! place: [`Swapchain::recreate`] waits for the device to go idle, drops the
//! whole set and builds a new one.
//!
//! Acquire and present handle a stale surface themselves by recreating with
//! the last requested extent, then report [`AcquireResult::Recreated`] or
//! [`PresentResult::Recreated`] so the caller can rebuild any per-image
//! bookkeeping.

use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::device::{detect_depth_format, RenderDevice};
use crate::render::backends::vulkan::rendering::framebuffer::Framebuffer;
use crate::render::backends::vulkan::resources::{Image, ImageDesc, ImageView};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Preferred surface format
const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Outcome of [`Swapchain::acquire_next_image`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// An image is ready for rendering
    Acquired {
        /// Index into the swapchain images
        index: u32,
        /// The surface no longer matches exactly, but the image is usable
        suboptimal: bool,
    },
    /// The surface was out of date and the swapchain has been rebuilt; skip the frame
    Recreated,
}

/// Outcome of [`Swapchain::present`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentResult {
    /// The image was queued for presentation
    Presented,
    /// Presentation reported a stale surface and the swapchain has been rebuilt
    Recreated,
}

/// Native swapchain handle with RAII cleanup
struct SwapchainHandle {
    device: Arc<dyn RenderDevice>,
    handle: vk::SwapchainKHR,
}

impl Drop for SwapchainHandle {
    fn drop(&mut self) {
        self.device.destroy_swapchain(self.handle);
    }
}

/// Everything rebuilt by a recreation, in drop order
struct SwapchainResources {
    framebuffers: Vec<Framebuffer>,
    depth_attachment: Image,
    views: Vec<ImageView>,
    handle: SwapchainHandle,
    images: Vec<vk::Image>,
}

/// Swapchain with its views, depth attachment and framebuffers
pub struct Swapchain {
    device: Arc<dyn RenderDevice>,
    resources: Option<SwapchainResources>,
    render_pass: Option<vk::RenderPass>,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    depth_format: vk::Format,
    extent: vk::Extent2D,
    requested: (u32, u32),
    max_frames_in_flight: usize,
    current_frame: usize,
}

impl Swapchain {
    /// Create a swapchain for the device surface
    ///
    /// Framebuffers are added once a render pass exists, through
    /// [`Swapchain::regenerate_framebuffers`].
    pub fn new(device: Arc<dyn RenderDevice>, width: u32, height: u32) -> VulkanResult<Self> {
        let mut swapchain = Self {
            device,
            resources: None,
            render_pass: None,
            surface_format: PREFERRED_FORMAT,
            present_mode: vk::PresentModeKHR::FIFO,
            depth_format: vk::Format::UNDEFINED,
            extent: vk::Extent2D::default(),
            requested: (width, height),
            max_frames_in_flight: 1,
            current_frame: 0,
        };
        swapchain.create(width, height)?;
        Ok(swapchain)
    }

    fn create(&mut self, width: u32, height: u32) -> VulkanResult<()> {
        // Capabilities can change between recreations
        let support = self.device.query_swapchain_support().map_err(VulkanError::Api)?;

        self.surface_format = choose_surface_format(&support.formats)?;
        self.present_mode = choose_present_mode(&support.present_modes);
        self.extent = choose_extent(&support.capabilities, width, height);
        self.requested = (width, height);

        let image_count = choose_image_count(&support.capabilities);
        self.max_frames_in_flight = (image_count as usize).saturating_sub(1).max(1);

        let families = self.device.info().queue_families;
        let family_indices = [families.graphics, families.present];
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.device.surface())
            .min_image_count(image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(self.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());
        let create_info = if families.graphics == families.present {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let handle = SwapchainHandle {
            device: Arc::clone(&self.device),
            handle: self.device.create_swapchain(&create_info).map_err(VulkanError::Api)?,
        };

        let images = self
            .device
            .swapchain_images(handle.handle)
            .map_err(VulkanError::Api)?;
        let views = images
            .iter()
            .map(|&image| {
                ImageView::new(
                    Arc::clone(&self.device),
                    image,
                    self.surface_format.format,
                    vk::ImageAspectFlags::COLOR,
                )
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        self.depth_format = detect_depth_format(self.device.as_ref()).ok_or_else(|| {
            log::error!("Failed to find a supported depth format");
            VulkanError::UnsupportedDepthFormat
        })?;
        let depth_attachment = Image::new(
            Arc::clone(&self.device),
            &ImageDesc::depth_attachment(self.extent.width, self.extent.height, self.depth_format),
        )?;

        let mut resources = SwapchainResources {
            framebuffers: Vec::new(),
            depth_attachment,
            views,
            handle,
            images,
        };
        if let Some(render_pass) = self.render_pass {
            resources.framebuffers = build_framebuffers(&self.device, &resources, render_pass, self.extent)?;
        }
        self.resources = Some(resources);

        log::info!(
            "Swapchain created: {}x{}, {} images, {:?}, {:?}",
            self.extent.width,
            self.extent.height,
            self.image_count(),
            self.surface_format.format,
            self.present_mode
        );
        Ok(())
    }

    /// Build one framebuffer per image against a render pass
    ///
    /// The render pass is remembered and reused by every later recreation.
    pub fn regenerate_framebuffers(&mut self, render_pass: vk::RenderPass) -> VulkanResult<()> {
        self.render_pass = Some(render_pass);
        let Some(resources) = self.resources.as_mut() else {
            return Err(VulkanError::invalid("Swapchain has no images"));
        };
        resources.framebuffers.clear();
        resources.framebuffers = build_framebuffers(&self.device, resources, render_pass, self.extent)?;
        Ok(())
    }

    /// Destroy everything and create it again at a new size
    ///
    /// Waits for device idle first. Callers tracking per-image fences must
    /// clear them before calling this. The frame counter is kept, wrapped
    /// to the new frames-in-flight count.
    pub fn recreate(&mut self, width: u32, height: u32) -> VulkanResult<()> {
        if width == 0 || height == 0 {
            return Err(VulkanError::invalid(format!(
                "Cannot recreate swapchain at {width}x{height}"
            )));
        }

        self.device.device_wait_idle().map_err(VulkanError::Api)?;
        self.resources = None;
        self.create(width, height)?;
        self.current_frame %= self.max_frames_in_flight;
        log::debug!("Swapchain recreated at {width}x{height}");
        Ok(())
    }

    /// Acquire the next presentable image
    ///
    /// An out-of-date surface rebuilds the swapchain at the last requested
    /// size and yields [`AcquireResult::Recreated`]; no index is returned.
    pub fn acquire_next_image(
        &mut self,
        timeout: u64,
        image_available: vk::Semaphore,
        fence: vk::Fence,
    ) -> VulkanResult<AcquireResult> {
        let handle = self.handle();
        match self.device.acquire_next_image(handle, timeout, image_available, fence) {
            Ok((index, suboptimal)) => Ok(AcquireResult::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain out of date on acquire");
                let (width, height) = self.requested;
                self.recreate(width, height)?;
                Ok(AcquireResult::Recreated)
            }
            Err(result) => {
                log::error!("Failed to acquire swapchain image: {result:?}");
                Err(VulkanError::Api(result))
            }
        }
    }

    /// Queue an image for presentation and advance the frame counter
    ///
    /// Out-of-date and suboptimal results rebuild the swapchain. The frame
    /// counter advances exactly once either way.
    pub fn present(
        &mut self,
        queue: vk::Queue,
        render_complete: vk::Semaphore,
        image_index: u32,
    ) -> VulkanResult<PresentResult> {
        let wait_semaphores = [render_complete];
        let swapchains = [self.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = match self.device.queue_present(queue, &present_info) {
            Ok(false) => Ok(PresentResult::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain stale on present, recreating");
                let (width, height) = self.requested;
                self.recreate(width, height).map(|()| PresentResult::Recreated)
            }
            Err(result) => {
                log::error!("Failed to present swapchain image: {result:?}");
                Err(VulkanError::Api(result))
            }
        };

        self.current_frame = (self.current_frame + 1) % self.max_frames_in_flight;
        result
    }

    /// Native swapchain handle; null only if a recreation failed
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.resources
            .as_ref()
            .map_or_else(vk::SwapchainKHR::null, |resources| resources.handle.handle)
    }

    /// Framebuffer for an image index
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.resources
            .as_ref()?
            .framebuffers
            .get(image_index as usize)
            .map(Framebuffer::handle)
    }

    /// Presentable images, owned by the swapchain itself
    pub fn images(&self) -> &[vk::Image] {
        self.resources.as_ref().map_or(&[], |resources| &resources.images)
    }

    /// Number of presentable images
    pub fn image_count(&self) -> usize {
        self.images().len()
    }

    /// Chosen surface format
    pub fn image_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    /// Chosen presentation mode
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Detected depth attachment format
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Depth attachment view shared by every framebuffer
    pub fn depth_view(&self) -> vk::ImageView {
        self.resources
            .as_ref()
            .map_or_else(vk::ImageView::null, |resources| resources.depth_attachment.view())
    }

    /// Extent of the current images
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Image count minus one
    pub fn max_frames_in_flight(&self) -> usize {
        self.max_frames_in_flight
    }

    /// Frame slot currently being recorded
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }
}

fn build_framebuffers(
    device: &Arc<dyn RenderDevice>,
    resources: &SwapchainResources,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> VulkanResult<Vec<Framebuffer>> {
    let depth_view = resources.depth_attachment.view();
    resources
        .views
        .iter()
        .map(|view| {
            Framebuffer::new(
                Arc::clone(device),
                render_pass,
                extent.width,
                extent.height,
                &[view.handle(), depth_view],
            )
        })
        .collect()
}

/// Exact match on the preferred format, else the first one offered
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|format| *format == PREFERRED_FORMAT)
        .or_else(|| formats.first().copied())
        .ok_or_else(|| VulkanError::InitializationFailed("Surface reports no formats".to_string()))
}

/// Mailbox when available, else FIFO
fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (min, max) = (capabilities.min_image_extent, capabilities.max_image_extent);
    vk::Extent2D {
        width: width.clamp(min.width, max.width.max(min.width)),
        height: height.clamp(min.height, max.height.max(min.height)),
    }
}

fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}
