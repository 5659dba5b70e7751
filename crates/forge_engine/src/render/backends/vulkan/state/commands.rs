//! Command buffer management
//!
//! [`CommandBuffer`] tracks its recording state explicitly and rejects
//! out-of-order transitions instead of letting them reach the driver:
//!
//! ```text
//! NotAllocated -allocate-> Ready -begin-> Recording -begin_render_pass-> InRenderPass
//!                                           ^    |                            |
//!                                           |    +-----end_render_pass--------+
//!                                           end
//!                                            v
//!                              RecordingEnded -mark_submitted-> Submitted
//! reset: any -> Ready        free: any -> NotAllocated
//! ```

use std::sync::Arc;

use ash::vk;
use bitflags::bitflags;

use crate::render::backends::vulkan::device::RenderDevice;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
///
/// Created with `RESET_COMMAND_BUFFER` so buffers can be re-begun individually.
pub struct CommandPool {
    device: Arc<dyn RenderDevice>,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool for a queue family
    pub fn new(device: Arc<dyn RenderDevice>, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = device
            .create_command_pool(&pool_create_info)
            .map_err(VulkanError::Api)?;
        log::debug!("Command pool created for queue family {queue_family_index}");

        Ok(Self { device, command_pool })
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        self.device.destroy_command_pool(self.command_pool);
    }
}

/// Recording state of a [`CommandBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    /// No native buffer exists
    NotAllocated,
    /// Allocated or reset; may begin recording
    Ready,
    /// Recording outside a render pass
    Recording,
    /// Recording inside a render pass
    InRenderPass,
    /// Recording finished; may be submitted
    RecordingEnded,
    /// Submitted to a queue
    Submitted,
}

bitflags! {
    /// Usage hints passed to `begin`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommandBufferUsage: u32 {
        /// Recorded once, submitted once
        const SINGLE_USE = 1;
        /// Secondary buffer entirely inside a render pass
        const RENDER_PASS_CONTINUE = 1 << 1;
        /// May be resubmitted while still pending
        const SIMULTANEOUS_USE = 1 << 2;
    }
}

impl CommandBufferUsage {
    fn to_vk(self) -> vk::CommandBufferUsageFlags {
        let mut flags = vk::CommandBufferUsageFlags::empty();
        if self.contains(Self::SINGLE_USE) {
            flags |= vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT;
        }
        if self.contains(Self::RENDER_PASS_CONTINUE) {
            flags |= vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE;
        }
        if self.contains(Self::SIMULTANEOUS_USE) {
            flags |= vk::CommandBufferUsageFlags::SIMULTANEOUS_USE;
        }
        flags
    }
}

/// Command buffer with an explicit recording state machine
pub struct CommandBuffer {
    device: Arc<dyn RenderDevice>,
    pool: vk::CommandPool,
    handle: vk::CommandBuffer,
    state: CommandBufferState,
}

impl CommandBuffer {
    /// Allocate a command buffer from a pool
    pub fn allocate(device: Arc<dyn RenderDevice>, pool: &CommandPool, primary: bool) -> VulkanResult<Self> {
        let level = if primary {
            vk::CommandBufferLevel::PRIMARY
        } else {
            vk::CommandBufferLevel::SECONDARY
        };
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool.handle())
            .level(level)
            .command_buffer_count(1);

        let handle = device
            .allocate_command_buffers(&alloc_info)
            .map_err(VulkanError::Api)?
            .first()
            .copied()
            .ok_or_else(|| VulkanError::invalid("Driver returned no command buffer"))?;

        Ok(Self {
            device,
            pool: pool.handle(),
            handle,
            state: CommandBufferState::Ready,
        })
    }

    /// Allocate one primary buffer per swapchain image
    pub fn allocate_many(device: &Arc<dyn RenderDevice>, pool: &CommandPool, count: usize) -> VulkanResult<Vec<Self>> {
        (0..count)
            .map(|_| Self::allocate(Arc::clone(device), pool, true))
            .collect()
    }

    fn expect_state(&self, expected: CommandBufferState, operation: &str) -> VulkanResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(VulkanError::invalid(format!(
                "Cannot {operation} command buffer in state {:?}, expected {expected:?}",
                self.state
            )))
        }
    }

    /// Begin recording; only valid from `Ready`
    pub fn begin(&mut self, usage: CommandBufferUsage) -> VulkanResult<()> {
        self.expect_state(CommandBufferState::Ready, "begin")?;

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(usage.to_vk());
        self.device
            .begin_command_buffer(self.handle, &begin_info)
            .map_err(VulkanError::Api)?;

        self.state = CommandBufferState::Recording;
        Ok(())
    }

    /// Record a render pass begin; only valid from `Recording`
    pub fn begin_render_pass(&mut self, begin_info: &vk::RenderPassBeginInfo) -> VulkanResult<()> {
        self.expect_state(CommandBufferState::Recording, "begin a render pass on")?;
        self.device
            .cmd_begin_render_pass(self.handle, begin_info, vk::SubpassContents::INLINE);
        self.state = CommandBufferState::InRenderPass;
        Ok(())
    }

    /// Record a render pass end; only valid from `InRenderPass`
    pub fn end_render_pass(&mut self) -> VulkanResult<()> {
        self.expect_state(CommandBufferState::InRenderPass, "end a render pass on")?;
        self.device.cmd_end_render_pass(self.handle);
        self.state = CommandBufferState::Recording;
        Ok(())
    }

    /// Finish recording; only valid from `Recording`
    pub fn end(&mut self) -> VulkanResult<()> {
        self.expect_state(CommandBufferState::Recording, "end")?;
        self.device
            .end_command_buffer(self.handle)
            .map_err(VulkanError::Api)?;
        self.state = CommandBufferState::RecordingEnded;
        Ok(())
    }

    /// Note that the buffer was handed to a queue; only valid from `RecordingEnded`
    pub fn mark_submitted(&mut self) -> VulkanResult<()> {
        self.expect_state(CommandBufferState::RecordingEnded, "submit")?;
        self.state = CommandBufferState::Submitted;
        Ok(())
    }

    /// Return to `Ready` from any state
    ///
    /// The pool is created with `RESET_COMMAND_BUFFER`, so the next `begin`
    /// implicitly resets the native buffer.
    pub fn reset(&mut self) {
        self.state = CommandBufferState::Ready;
    }

    /// Release the native buffer back to its pool
    pub fn free(&mut self) {
        if self.state != CommandBufferState::NotAllocated {
            self.device.free_command_buffers(self.pool, &[self.handle]);
            self.handle = vk::CommandBuffer::null();
            self.state = CommandBufferState::NotAllocated;
        }
    }

    /// Allocate a primary buffer and begin a single-use recording
    pub fn allocate_and_begin_single_use(device: Arc<dyn RenderDevice>, pool: &CommandPool) -> VulkanResult<Self> {
        let mut command_buffer = Self::allocate(device, pool, true)?;
        command_buffer.begin(CommandBufferUsage::SINGLE_USE)?;
        Ok(command_buffer)
    }

    /// End recording, submit, wait for the queue to drain, then free
    ///
    /// The buffer is freed even when submission fails.
    pub fn end_single_use(mut self, queue: vk::Queue) -> VulkanResult<()> {
        self.end()?;

        let command_buffers = [self.handle];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
        self.device
            .queue_submit(queue, &[submit_info], vk::Fence::null())
            .map_err(VulkanError::Api)?;
        self.mark_submitted()?;

        self.device.queue_wait_idle(queue).map_err(VulkanError::Api)?;
        self.free();
        Ok(())
    }

    /// Current recording state
    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    /// Native handle for recording commands
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        self.free();
    }
}
