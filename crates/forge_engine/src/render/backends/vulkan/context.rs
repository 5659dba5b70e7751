//! Per-frame orchestration
//!
//! [`VulkanContext`] owns every Vulkan object the backend renders with and
//! runs the frame state machine:
//!
//! ```text
//! begin_frame: recreating?          -> idle, skip
//!              size generation moved -> idle, recreate, skip
//!              wait in-flight fence  -> acquire -> wait image owner
//!              -> record (viewport, scissor, pass, shader, quad)
//! end_frame:   end pass, end recording -> reset fence -> submit
//!              -> claim image for this frame slot -> present
//! ```
//!
//! Every per-frame failure is logged and reported as `false`; the caller
//! skips the frame and tries again next loop iteration. A frame abandoned
//! after its image was acquired gets fresh sync objects for its slot, since
//! its image-available semaphore would otherwise carry an unconsumed signal.

use std::path::Path;
use std::sync::Arc;

use ash::vk;

use crate::core::config::RendererConfig;
use crate::foundation::math::{to_columns, Mat4};
use crate::render::types::{GlobalUniformObject, Vertex3D};

use super::device::RenderDevice;
use super::rendering::pipeline::{flipped_viewport, full_scissor};
use super::rendering::{ObjectShader, RenderPass};
use super::resources::{upload_data_range, Buffer};
use super::state::{AcquireResult, CommandBuffer, CommandBufferUsage, CommandPool, FrameSync, PresentResult, Swapchain};
use super::{VulkanError, VulkanResult};

/// Vertices reserved in the shared vertex buffer
pub const GEOMETRY_VERTEX_CAPACITY: u64 = 1024 * 1024;

/// Bytes reserved in the shared index buffer
pub const GEOMETRY_INDEX_BYTES: u64 = 4 * 1024 * 1024;

/// Built-in test quad
const QUAD_VERTICES: [Vertex3D; 4] = [
    Vertex3D::new(0.0, -0.5, 0.0),
    Vertex3D::new(0.5, 0.5, 0.0),
    Vertex3D::new(0.0, 0.5, 0.0),
    Vertex3D::new(0.5, -0.5, 0.0),
];

const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 3, 1];

/// Owner of all Vulkan state for one renderer
///
/// Fields drop top to bottom after the device has gone idle, so command
/// buffers go before their pool and framebuffers before the render pass.
pub struct VulkanContext {
    command_buffers: Vec<CommandBuffer>,
    frame_sync: Vec<FrameSync>,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    object_shader: ObjectShader,
    swapchain: Swapchain,
    main_render_pass: RenderPass,
    command_pool: CommandPool,
    device: Arc<dyn RenderDevice>,

    /// Frame slot that last claimed each swapchain image
    images_in_flight: Vec<Option<usize>>,
    image_index: u32,
    pending_width: u32,
    pending_height: u32,
    size_generation: u64,
    last_size_generation: u64,
    recreating: bool,
    /// Per-image state no longer matches the swapchain
    bookkeeping_stale: bool,
}

impl VulkanContext {
    /// Build the swapchain, render pass, shader and geometry for a device
    pub fn new(device: Arc<dyn RenderDevice>, config: &RendererConfig, width: u32, height: u32) -> VulkanResult<Self> {
        let families = device.info().queue_families;
        log::info!(
            "Queue families: graphics {}, present {}, transfer {}",
            families.graphics,
            families.present,
            families.transfer
        );

        let command_pool = CommandPool::new(Arc::clone(&device), families.graphics)?;

        let mut swapchain = Swapchain::new(Arc::clone(&device), width, height)?;
        let extent = swapchain.extent();

        let main_render_pass = RenderPass::new(
            Arc::clone(&device),
            swapchain.image_format().format,
            swapchain.depth_format(),
            full_scissor(extent.width, extent.height),
            config.clear_color,
            1.0,
            0,
        )?;
        swapchain.regenerate_framebuffers(main_render_pass.handle())?;

        let command_buffers = CommandBuffer::allocate_many(&device, &command_pool, swapchain.image_count())?;
        let frame_sync = FrameSync::create_set(&device, swapchain.max_frames_in_flight())?;
        let images_in_flight = vec![None; swapchain.image_count()];

        let object_shader = ObjectShader::new(
            &device,
            Path::new(&config.assets_root),
            &config.object_shader,
            &main_render_pass,
            extent.width,
            extent.height,
            swapchain.max_frames_in_flight(),
        )?;

        let vertex_buffer = Buffer::new(
            Arc::clone(&device),
            std::mem::size_of::<Vertex3D>() as u64 * GEOMETRY_VERTEX_CAPACITY,
            vk::BufferUsageFlags::VERTEX_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST
                | vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            true,
        )?;
        let index_buffer = Buffer::new(
            Arc::clone(&device),
            GEOMETRY_INDEX_BYTES,
            vk::BufferUsageFlags::INDEX_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST
                | vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            true,
        )?;

        let queue = device.graphics_queue();
        upload_data_range(&device, &command_pool, queue, &vertex_buffer, 0, bytemuck::cast_slice(&QUAD_VERTICES))?;
        upload_data_range(&device, &command_pool, queue, &index_buffer, 0, bytemuck::cast_slice(&QUAD_INDICES))?;

        log::info!("Vulkan context ready: {}x{}", extent.width, extent.height);

        Ok(Self {
            command_buffers,
            frame_sync,
            vertex_buffer,
            index_buffer,
            object_shader,
            swapchain,
            main_render_pass,
            command_pool,
            device,
            images_in_flight,
            image_index: 0,
            pending_width: width,
            pending_height: height,
            size_generation: 0,
            last_size_generation: 0,
            recreating: false,
            bookkeeping_stale: false,
        })
    }

    /// Cache a new framebuffer size; the swapchain is rebuilt by the next `begin_frame`
    pub fn on_resized(&mut self, width: u16, height: u16) {
        self.pending_width = u32::from(width);
        self.pending_height = u32::from(height);
        self.size_generation += 1;
        log::debug!(
            "Framebuffer resized to {width}x{height} (generation {})",
            self.size_generation
        );
    }

    fn wait_idle(&self) {
        if let Err(result) = self.device.device_wait_idle() {
            log::error!("Device wait idle failed: {result:?}");
        }
    }

    /// Start a frame; `false` means skip it
    pub fn begin_frame(&mut self, _delta_time: f32) -> bool {
        if self.recreating {
            self.wait_idle();
            log::debug!("Swapchain recreation in progress, skipping frame");
            return false;
        }

        if self.size_generation != self.last_size_generation {
            self.wait_idle();
            if !self.recreate_swapchain() {
                log::debug!("Swapchain not recreated, skipping frame");
            }
            return false;
        }

        if self.bookkeeping_stale {
            if let Err(e) = self.after_swapchain_rebuilt() {
                log::error!("Per-image state still incomplete after swapchain rebuild: {e}");
                return false;
            }
        }

        let frame = self.swapchain.current_frame();
        let Some(sync) = self.frame_sync.get_mut(frame) else {
            log::error!("No sync objects for frame {frame}, skipping");
            return false;
        };
        if !sync.in_flight.wait(u64::MAX) {
            log::warn!("In-flight fence wait failed for frame {frame}, skipping");
            return false;
        }

        let image_available = sync.image_available.handle();
        let index = match self
            .swapchain
            .acquire_next_image(u64::MAX, image_available, vk::Fence::null())
        {
            Ok(AcquireResult::Acquired { index, .. }) => index,
            Ok(AcquireResult::Recreated) => {
                if let Err(e) = self.after_swapchain_rebuilt() {
                    log::error!("Failed to rebuild per-image state: {e}");
                }
                return false;
            }
            Err(e) => {
                log::error!("Failed to acquire next image: {e}");
                return false;
            }
        };
        self.image_index = index;

        // The image's previous frame must finish before its command buffer is reset
        if !self.wait_for_image_owner(index) {
            log::warn!("Fence for image {index} did not signal, skipping");
            self.abandon_acquired_image(frame);
            return false;
        }

        match self.record_frame(index, frame) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to record frame: {e}");
                self.abandon_acquired_image(frame);
                false
            }
        }
    }

    fn wait_for_image_owner(&mut self, index: u32) -> bool {
        let owner = self.images_in_flight.get(index as usize).copied().flatten();
        match owner.and_then(|owner| self.frame_sync.get_mut(owner)) {
            Some(sync) => sync.in_flight.wait(u64::MAX),
            None => true,
        }
    }

    /// Give up on an acquired image without submitting
    ///
    /// Nothing will wait on the slot's image-available semaphore, and its
    /// fence may already be reset, so the whole set is replaced.
    fn abandon_acquired_image(&mut self, frame: usize) {
        match FrameSync::new(&self.device) {
            Ok(fresh) => {
                if let Some(sync) = self.frame_sync.get_mut(frame) {
                    *sync = fresh;
                }
            }
            Err(e) => log::error!("Failed to replace sync objects for frame {frame}: {e}"),
        }
    }

    fn record_frame(&mut self, index: u32, frame: usize) -> VulkanResult<()> {
        let extent = self.swapchain.extent();
        let framebuffer = self
            .swapchain
            .framebuffer(index)
            .ok_or_else(|| VulkanError::invalid(format!("No framebuffer for image {index}")))?;

        let command_buffer = self
            .command_buffers
            .get_mut(index as usize)
            .ok_or_else(|| VulkanError::invalid(format!("No command buffer for image {index}")))?;
        command_buffer.reset();
        command_buffer.begin(CommandBufferUsage::empty())?;

        let handle = command_buffer.handle();
        self.device
            .cmd_set_viewport(handle, 0, &[flipped_viewport(extent.width, extent.height)]);
        self.device
            .cmd_set_scissor(handle, 0, &[full_scissor(extent.width, extent.height)]);
        self.device.cmd_set_line_width(handle, 1.0);

        self.main_render_pass.begin(command_buffer, framebuffer)?;

        self.object_shader.use_shader(command_buffer);
        self.object_shader.bind_global(command_buffer, frame);
        self.device
            .cmd_bind_vertex_buffers(handle, 0, &[self.vertex_buffer.handle()], &[0]);
        self.device
            .cmd_bind_index_buffer(handle, self.index_buffer.handle(), 0, vk::IndexType::UINT32);
        self.device
            .cmd_draw_indexed(handle, QUAD_INDICES.len() as u32, 1, 0, 0, 0);
        Ok(())
    }

    /// Write the global uniforms for the frame being recorded
    pub fn update_global_state(&mut self, projection: &Mat4, view: &Mat4) -> VulkanResult<()> {
        let ubo = GlobalUniformObject {
            projection: to_columns(projection),
            view: to_columns(view),
            ..GlobalUniformObject::default()
        };
        self.object_shader
            .update_global_state(self.swapchain.current_frame(), &ubo)
    }

    /// Finish, submit and present the frame started by `begin_frame`
    pub fn end_frame(&mut self, _delta_time: f32) -> bool {
        let frame = self.swapchain.current_frame();
        if let Err(e) = self.submit(frame) {
            log::error!("Failed to submit frame: {e}");
            self.abandon_acquired_image(frame);
            return false;
        }

        match self.present(frame) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to present frame: {e}");
                false
            }
        }
    }

    fn submit(&mut self, frame: usize) -> VulkanResult<()> {
        let index = self.image_index;
        let slot = index as usize;

        let command_buffer = self
            .command_buffers
            .get_mut(slot)
            .ok_or_else(|| VulkanError::invalid(format!("No command buffer for image {index}")))?;
        self.main_render_pass.end(command_buffer)?;
        command_buffer.end()?;
        let command_buffers = [command_buffer.handle()];

        if !self.wait_for_image_owner(index) {
            return Err(VulkanError::invalid(format!("Fence for image {index} never signaled")));
        }

        let sync = self
            .frame_sync
            .get_mut(frame)
            .ok_or_else(|| VulkanError::invalid(format!("No sync objects for frame {frame}")))?;
        sync.in_flight.reset()?;

        let wait_semaphores = [sync.image_available.handle()];
        let signal_semaphores = [sync.queue_complete.handle()];
        // Color writes wait for the acquired image, earlier stages may run ahead
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        self.device
            .queue_submit(self.device.graphics_queue(), &[submit_info], sync.in_flight.handle())
            .map_err(VulkanError::Api)?;

        if let Some(owner) = self.images_in_flight.get_mut(slot) {
            *owner = Some(frame);
        }
        // Already on the queue; a bookkeeping error here must not tear down its sync objects
        if let Some(Err(e)) = self.command_buffers.get_mut(slot).map(CommandBuffer::mark_submitted) {
            log::warn!("{e}");
        }
        Ok(())
    }

    fn present(&mut self, frame: usize) -> VulkanResult<()> {
        let render_complete = self
            .frame_sync
            .get(frame)
            .map(|sync| sync.queue_complete.handle())
            .ok_or_else(|| VulkanError::invalid(format!("No sync objects for frame {frame}")))?;

        match self
            .swapchain
            .present(self.device.present_queue(), render_complete, self.image_index)?
        {
            PresentResult::Presented => {}
            // The frame itself was presented; begin_frame retries the bookkeeping
            PresentResult::Recreated => {
                if let Err(e) = self.after_swapchain_rebuilt() {
                    log::error!("Failed to rebuild per-image state: {e}");
                }
            }
        }
        Ok(())
    }

    /// Rebuild the swapchain at the pending size
    ///
    /// Refuses while either pending dimension is zero, which keeps a
    /// minimized window skipping frames until it is restored.
    pub fn recreate_swapchain(&mut self) -> bool {
        if self.recreating {
            log::debug!("Swapchain recreation already in progress");
            return false;
        }
        if self.pending_width == 0 || self.pending_height == 0 {
            log::debug!(
                "Framebuffer is {}x{}, waiting for a usable size",
                self.pending_width,
                self.pending_height
            );
            return false;
        }

        self.recreating = true;
        self.wait_idle();
        self.images_in_flight.fill(None);

        let rebuilt = match self.swapchain.recreate(self.pending_width, self.pending_height) {
            Ok(()) => {
                self.last_size_generation = self.size_generation;
                match self.after_swapchain_rebuilt() {
                    Ok(()) => true,
                    Err(e) => {
                        log::error!("Failed to rebuild per-image state: {e}");
                        false
                    }
                }
            }
            Err(e) => {
                log::error!("Swapchain recreation failed: {e}");
                false
            }
        };

        self.recreating = false;
        rebuilt
    }

    /// Resize per-image and per-frame bookkeeping to a rebuilt swapchain
    ///
    /// Replacements are built before the old objects are released. On
    /// failure the context stays marked stale and `begin_frame` retries
    /// before touching any per-image state.
    fn after_swapchain_rebuilt(&mut self) -> VulkanResult<()> {
        self.bookkeeping_stale = true;

        let image_count = self.swapchain.image_count();
        let frames_in_flight = self.swapchain.max_frames_in_flight();
        let extent = self.swapchain.extent();

        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, None);
        self.main_render_pass.set_extent(extent.width, extent.height);

        if self.frame_sync.len() != frames_in_flight {
            self.frame_sync = FrameSync::create_set(&self.device, frames_in_flight)?;
        }
        self.object_shader.ensure_slots(frames_in_flight)?;
        self.command_buffers = CommandBuffer::allocate_many(&self.device, &self.command_pool, image_count)?;

        self.bookkeeping_stale = false;
        log::info!(
            "Swapchain rebuilt: {}x{}, {image_count} images, {frames_in_flight} frames in flight",
            extent.width,
            extent.height
        );
        Ok(())
    }

    /// The device everything renders with
    pub fn device(&self) -> &Arc<dyn RenderDevice> {
        &self.device
    }

    /// The swapchain
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// The built-in object shader
    pub fn object_shader(&self) -> &ObjectShader {
        &self.object_shader
    }

    /// Shared geometry buffers (vertex, index)
    pub fn geometry_buffers(&self) -> (&Buffer, &Buffer) {
        (&self.vertex_buffer, &self.index_buffer)
    }

    /// Frame slot that last claimed each image
    pub fn images_in_flight(&self) -> &[Option<usize>] {
        &self.images_in_flight
    }

    /// Number of per-frame sync sets
    pub fn frames_in_flight(&self) -> usize {
        self.frame_sync.len()
    }

    /// Image acquired by the last successful `begin_frame`
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Size that the next recreation will use
    pub fn pending_size(&self) -> (u32, u32) {
        (self.pending_width, self.pending_height)
    }

    /// Whether a resize is waiting to be applied
    pub fn resize_pending(&self) -> bool {
        self.size_generation != self.last_size_generation
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        self.wait_idle();
        log::debug!("Destroying Vulkan context");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::device::mock::MockDevice;
    use crate::render::backends::vulkan::rendering::object_shader::tests::write_test_shader;
    use crate::render::backends::vulkan::state::CommandBufferState;

    struct Fixture {
        mock: Arc<MockDevice>,
        context: VulkanContext,
        _assets: tempfile::TempDir,
    }

    fn fixture(width: u32, height: u32) -> Fixture {
        let assets = tempfile::tempdir().unwrap();
        let config = RendererConfig::new("Context Test").with_assets_root(assets.path().to_string_lossy());
        write_test_shader(assets.path(), &config.object_shader);

        let mock = Arc::new(MockDevice::new());
        let context = VulkanContext::new(mock.clone(), &config, width, height).unwrap();
        Fixture {
            mock,
            context,
            _assets: assets,
        }
    }

    fn run_frame(context: &mut VulkanContext) -> bool {
        if !context.begin_frame(0.016) {
            return false;
        }
        context
            .update_global_state(&Mat4::identity(), &Mat4::identity())
            .unwrap();
        context.end_frame(0.016)
    }

    #[test]
    fn test_initialization_uploads_the_quad() {
        let Fixture { mock, context, _assets } = fixture(800, 600);
        let (vertices, indices) = context.geometry_buffers();

        assert_eq!(vertices.size(), 12 * 1024 * 1024);
        assert_eq!(indices.size(), 4 * 1024 * 1024);

        let index_bytes = mock.buffer_contents(indices.handle());
        assert_eq!(&index_bytes[..24], bytemuck::cast_slice::<u32, u8>(&QUAD_INDICES));
        let vertex_bytes = mock.buffer_contents(vertices.handle());
        assert_eq!(&vertex_bytes[..48], bytemuck::cast_slice::<Vertex3D, u8>(&QUAD_VERTICES));

        assert_eq!(context.images_in_flight(), &[None, None, None]);
        assert_eq!(context.frames_in_flight(), 2);
        // Only the single-use upload buffers came and went
        assert_eq!(mock.live("command_buffer"), 3);
    }

    #[test]
    fn test_frames_run_end_to_end() {
        let Fixture { mock, mut context, _assets } = fixture(800, 600);
        let mut frame_number = 0u64;

        for _ in 0..5 {
            if run_frame(&mut context) {
                frame_number += 1;
            }
        }

        assert_eq!(frame_number, 5);
        assert_eq!(mock.calls("queue_present"), 5);
        assert_eq!(mock.draws(), vec![6; 5]);
        // Two uploads plus five frames
        assert_eq!(mock.calls("queue_submit"), 7);
        assert_eq!(context.swapchain().current_frame(), 5 % 2);
    }

    #[test]
    fn test_frame_claims_image_for_its_slot() {
        let Fixture { mut context, _assets, .. } = fixture(800, 600);

        assert!(run_frame(&mut context));
        assert_eq!(context.images_in_flight()[0], Some(0));
        assert!(run_frame(&mut context));
        assert_eq!(context.images_in_flight()[1], Some(1));
        assert!(run_frame(&mut context));
        assert_eq!(context.images_in_flight()[2], Some(0));
        assert_eq!(
            context.command_buffers[2].state(),
            CommandBufferState::Submitted
        );
    }

    #[test]
    fn test_unequal_generations_fail_until_applied() {
        let Fixture { mock, mut context, _assets } = fixture(800, 600);
        context.on_resized(1024, 768);

        // Recreation happens but the frame is still skipped
        assert!(!context.begin_frame(0.016));
        assert_eq!(mock.swapchain_extents().last().unwrap().width, 1024);
        assert!(!context.resize_pending());

        context.on_resized(1280, 720);
        context.on_resized(1300, 700);
        assert!(!context.begin_frame(0.016));
        assert!(context.begin_frame(0.016));
        assert!(context.end_frame(0.016));
        assert_eq!(context.swapchain().extent(), vk::Extent2D { width: 1300, height: 700 });
    }

    #[test]
    fn test_repeated_begin_fails_while_generation_is_stale() {
        let Fixture { mut context, _assets, .. } = fixture(800, 600);
        context.on_resized(0, 0);

        assert!(!context.begin_frame(0.016));
        assert!(!context.begin_frame(0.016));
        assert!(context.resize_pending());
    }

    #[test]
    fn test_minimize_then_restore() {
        let Fixture { mock, mut context, _assets } = fixture(800, 600);
        assert!(run_frame(&mut context));

        context.on_resized(0, 0);
        for _ in 0..4 {
            assert!(!run_frame(&mut context));
        }
        assert_eq!(mock.swapchain_extents().len(), 1);

        context.on_resized(800, 600);
        assert!(!run_frame(&mut context));
        assert!(run_frame(&mut context));
        assert_eq!(mock.swapchain_extents().len(), 2);
    }

    #[test]
    fn test_out_of_date_acquire_skips_frame_and_recovers() {
        let Fixture { mock, mut context, _assets } = fixture(800, 600);
        mock.script_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        assert!(!context.begin_frame(0.016));
        assert_eq!(mock.calls("begin_command_buffer"), 2);
        assert_eq!(context.images_in_flight(), &[None, None, None]);

        assert!(run_frame(&mut context));
    }

    #[test]
    fn test_suboptimal_present_counts_as_success() {
        let Fixture { mock, mut context, _assets } = fixture(800, 600);
        mock.script_present(Ok(true));

        assert!(run_frame(&mut context));
        assert_eq!(mock.swapchain_extents().len(), 2);
        assert_eq!(context.swapchain().current_frame(), 1);
        assert!(run_frame(&mut context));
    }

    #[test]
    fn test_fence_timeout_skips_frame() {
        let Fixture { mock, mut context, _assets } = fixture(800, 600);
        assert!(run_frame(&mut context));
        assert!(run_frame(&mut context));

        // Slot 0 was reset on submit, so the next wait reaches the device
        mock.script_fence_wait(Err(vk::Result::TIMEOUT));
        assert!(!context.begin_frame(0.016));
        assert_eq!(mock.calls("acquire_next_image"), 2);
    }

    #[test]
    fn test_recording_failure_is_reported_not_fatal() {
        let Fixture { mock, mut context, _assets } = fixture(800, 600);
        assert!(context.begin_frame(0.016));
        let stale_semaphore = context.frame_sync[0].image_available.handle();
        let semaphores = mock.live("semaphore");

        // End without a render pass open
        context.main_render_pass.end(&mut context.command_buffers[0]).unwrap();
        assert!(!context.end_frame(0.016));

        // The unconsumed acquire signal goes away with the replaced set
        assert_ne!(context.frame_sync[0].image_available.handle(), stale_semaphore);
        assert!(context.frame_sync[0].in_flight.is_signaled());
        assert_eq!(mock.live("semaphore"), semaphores);
        assert_eq!(context.images_in_flight()[0], None);
        assert!(run_frame(&mut context));
    }

    #[test]
    fn test_failed_command_buffer_reallocation_retries_instead_of_panicking() {
        let Fixture { mock, mut context, _assets } = fixture(800, 600);
        assert!(run_frame(&mut context));

        mock.fail_command_buffer_allocations(2);
        context.on_resized(1024, 768);
        assert!(!context.begin_frame(0.016));
        assert_eq!(context.command_buffers.len(), 3);

        // Still failing: skipped, not indexed out of bounds
        assert!(!context.begin_frame(0.016));

        assert!(run_frame(&mut context));
        assert_eq!(context.command_buffers.len(), context.swapchain().image_count());
        assert_eq!(mock.live("command_buffer"), 3);
        assert_eq!(context.swapchain().extent().width, 1024);
    }

    #[test]
    fn test_more_frames_in_flight_after_rebuild_get_their_own_slots() {
        let Fixture { mock, mut context, _assets } = fixture(800, 600);
        assert_eq!(context.object_shader().slot_count(), 3);

        mock.set_image_count_range(4, 8);
        context.on_resized(1024, 768);
        assert!(!context.begin_frame(0.016));

        assert_eq!(context.swapchain().image_count(), 5);
        assert_eq!(context.frames_in_flight(), 4);
        assert_eq!(context.command_buffers.len(), 5);
        assert_eq!(context.images_in_flight().len(), 5);
        assert!(context.object_shader().slot_count() >= context.frames_in_flight());

        for scale in 1..=4u8 {
            assert!(context.begin_frame(0.016));
            context
                .update_global_state(&Mat4::new_scaling(f32::from(scale)), &Mat4::identity())
                .unwrap();
            assert!(context.end_frame(0.016));
        }

        let bytes = mock.buffer_contents(context.object_shader().global_buffer().handle());
        for slot in 0..4usize {
            let start = slot * 256;
            assert_eq!(&bytes[start..start + 4], &(slot as f32 + 1.0).to_ne_bytes());
        }
    }

    #[test]
    fn test_global_state_lands_in_current_slot() {
        let Fixture { mock, mut context, _assets } = fixture(800, 600);
        assert!(context.begin_frame(0.016));

        let projection = Mat4::new_scaling(2.0);
        context.update_global_state(&projection, &Mat4::identity()).unwrap();

        let bytes = mock.buffer_contents(context.object_shader().global_buffer().handle());
        assert_eq!(&bytes[..4], &2.0f32.to_ne_bytes());
        assert!(context.end_frame(0.016));
    }

    #[test]
    fn test_drop_waits_idle_and_releases_everything() {
        let Fixture { mock, context, _assets } = fixture(800, 600);
        let idle_before = mock.calls("device_wait_idle");

        drop(context);
        assert_eq!(mock.calls("device_wait_idle"), idle_before + 1);
        assert_eq!(mock.live_total(), 0);
    }
}
