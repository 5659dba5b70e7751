//! Buffer management for vertex, index and uniform data
//!
//! Memory is allocated per buffer straight from the device. Host access goes
//! through [`Buffer::lock_memory`]/[`Buffer::unlock_memory`] or the
//! [`Buffer::load_data`] convenience; device-local buffers are filled with
//! [`upload_data_range`], which stages through a temporary host-visible buffer.

use std::ffi::c_void;
use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::device::{find_memory_index, RenderDevice};
use crate::render::backends::vulkan::state::commands::{CommandBuffer, CommandPool};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Arc<dyn RenderDevice>,
    handle: vk::Buffer,
    memory: vk::DeviceMemory,
    total_size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_flags: vk::MemoryPropertyFlags,
    memory_index: u32,
    is_locked: bool,
}

impl Buffer {
    /// Create a buffer and allocate memory for it
    ///
    /// When `bind_on_create` is false the caller must call [`Buffer::bind`]
    /// before using the buffer.
    pub fn new(
        device: Arc<dyn RenderDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_flags: vk::MemoryPropertyFlags,
        bind_on_create: bool,
    ) -> VulkanResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = device.create_buffer(&buffer_info).map_err(VulkanError::Api)?;

        // From here on Drop releases whatever has been created
        let mut buffer = Self {
            device,
            handle,
            memory: vk::DeviceMemory::null(),
            total_size: size,
            usage,
            memory_flags,
            memory_index: 0,
            is_locked: false,
        };

        let requirements = buffer.device.buffer_memory_requirements(handle);
        let Some(memory_index) = find_memory_index(
            &buffer.device.info().memory,
            requirements.memory_type_bits,
            memory_flags,
        ) else {
            log::error!("Unable to create buffer: no memory type matches {memory_flags:?}");
            return Err(VulkanError::NoSuitableMemoryType);
        };
        buffer.memory_index = memory_index;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_index);

        buffer.memory = buffer.device.allocate_memory(&alloc_info).map_err(|result| match result {
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                VulkanError::OutOfMemory {
                    requested: requirements.size,
                }
            }
            other => VulkanError::Api(other),
        })?;

        if bind_on_create {
            buffer.bind(0)?;
        }

        Ok(buffer)
    }

    /// Bind the buffer's memory at an offset
    pub fn bind(&self, offset: vk::DeviceSize) -> VulkanResult<()> {
        self.device
            .bind_buffer_memory(self.handle, self.memory, offset)
            .map_err(VulkanError::Api)
    }

    /// Grow the buffer by creating a new one and copying the old contents
    ///
    /// Blocks until the copy completes, then releases the old buffer.
    pub fn resize(&mut self, new_size: vk::DeviceSize, queue: vk::Queue, pool: &CommandPool) -> VulkanResult<()> {
        if new_size < self.total_size {
            return Err(VulkanError::invalid(format!(
                "Buffer resize requires a larger size ({new_size} < {})",
                self.total_size
            )));
        }

        let resized = Self::new(Arc::clone(&self.device), new_size, self.usage, self.memory_flags, true)?;
        self.copy_to(pool, queue, 0, &resized, 0, self.total_size)?;
        self.device.device_wait_idle().map_err(VulkanError::Api)?;

        log::debug!("Resized buffer from {} to {new_size} bytes", self.total_size);
        // The old buffer drops here, releasing memory then handle
        *self = resized;
        Ok(())
    }

    /// Map a range of the buffer's memory for host access
    pub fn lock_memory(
        &mut self,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        flags: vk::MemoryMapFlags,
    ) -> VulkanResult<*mut c_void> {
        let ptr = self
            .device
            .map_memory(self.memory, offset, size, flags)
            .map_err(VulkanError::Api)?;
        self.is_locked = true;
        Ok(ptr)
    }

    /// Unmap memory mapped by [`Buffer::lock_memory`]
    pub fn unlock_memory(&mut self) {
        if self.is_locked {
            self.device.unmap_memory(self.memory);
            self.is_locked = false;
        }
    }

    /// Copy bytes into host-visible memory at an offset
    pub fn load_data(&mut self, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        let size = data.len() as vk::DeviceSize;
        if offset.checked_add(size).map_or(true, |end| end > self.total_size) {
            return Err(VulkanError::invalid(format!(
                "Write of {size} bytes at offset {offset} exceeds buffer size {}",
                self.total_size
            )));
        }

        let ptr = self.lock_memory(offset, size, vk::MemoryMapFlags::empty())?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
        }
        self.unlock_memory();
        Ok(())
    }

    /// Copy a range into another buffer using a single-use command buffer
    ///
    /// Waits for the queue to go idle before recording so the source is not
    /// still being written by earlier work.
    pub fn copy_to(
        &self,
        pool: &CommandPool,
        queue: vk::Queue,
        source_offset: vk::DeviceSize,
        dest: &Buffer,
        dest_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VulkanResult<()> {
        self.device.queue_wait_idle(queue).map_err(VulkanError::Api)?;

        let command_buffer = CommandBuffer::allocate_and_begin_single_use(Arc::clone(&self.device), pool)?;
        let region = vk::BufferCopy {
            src_offset: source_offset,
            dst_offset: dest_offset,
            size,
        };
        self.device
            .cmd_copy_buffer(command_buffer.handle(), self.handle, dest.handle, &[region]);

        command_buffer.end_single_use(queue)
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    /// Size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.total_size
    }

    /// Memory type index the buffer was allocated from
    pub fn memory_index(&self) -> u32 {
        self.memory_index
    }

    #[cfg(test)]
    pub(crate) fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.unlock_memory();
        self.device.free_memory(self.memory);
        self.device.destroy_buffer(self.handle);
    }
}

/// Upload bytes into a device-local buffer through a host-visible staging buffer
pub fn upload_data_range(
    device: &Arc<dyn RenderDevice>,
    pool: &CommandPool,
    queue: vk::Queue,
    target: &Buffer,
    offset: vk::DeviceSize,
    data: &[u8],
) -> VulkanResult<()> {
    let size = data.len() as vk::DeviceSize;
    let mut staging = Buffer::new(
        Arc::clone(device),
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        true,
    )?;
    staging.load_data(0, data)?;
    staging.copy_to(pool, queue, 0, target, offset, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::device::mock::{MockDevice, HOST_MEMORY_TYPE};

    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    );

    fn setup() -> (Arc<MockDevice>, Arc<dyn RenderDevice>, CommandPool) {
        let mock = Arc::new(MockDevice::new());
        let device: Arc<dyn RenderDevice> = mock.clone();
        let pool = CommandPool::new(Arc::clone(&device), 0).unwrap();
        (mock, device, pool)
    }

    #[test]
    fn test_load_data_writes_mapped_memory() {
        let (mock, device, _pool) = setup();
        let mut buffer = Buffer::new(device, 16, vk::BufferUsageFlags::UNIFORM_BUFFER, HOST, true).unwrap();
        assert_eq!(buffer.memory_index(), HOST_MEMORY_TYPE);

        buffer.load_data(4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(mock.memory_contents(buffer.memory())[..8], [0, 0, 0, 0, 1, 2, 3, 4]);
        assert_eq!(mock.calls("unmap_memory"), 1);

        assert!(buffer.load_data(14, &[0; 4]).is_err());
        assert!(matches!(
            buffer.load_data(u64::MAX - 1, &[0; 4]),
            Err(VulkanError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_missing_memory_type_is_reported() {
        let (mock, device, _pool) = setup();
        let result = Buffer::new(
            device,
            64,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::MemoryPropertyFlags::LAZILY_ALLOCATED,
            true,
        );

        assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType)));
        assert_eq!(mock.live("buffer"), 0);
    }

    #[test]
    fn test_allocation_failure_maps_to_out_of_memory() {
        let (mock, device, _pool) = setup();
        mock.fail_next_allocation();
        let result = Buffer::new(device, 64, vk::BufferUsageFlags::VERTEX_BUFFER, HOST, true);

        assert!(matches!(result, Err(VulkanError::OutOfMemory { requested: 64 })));
        assert_eq!(mock.live("buffer"), 0);
        assert_eq!(mock.live("memory"), 0);
    }

    #[test]
    fn test_resize_preserves_contents() {
        let (mock, device, pool) = setup();
        let queue = device.graphics_queue();
        let mut buffer = Buffer::new(Arc::clone(&device), 4, vk::BufferUsageFlags::TRANSFER_SRC, HOST, true).unwrap();
        buffer.load_data(0, &[9, 8, 7, 6]).unwrap();

        buffer.resize(8, queue, &pool).unwrap();

        assert_eq!(buffer.size(), 8);
        assert_eq!(mock.buffer_contents(buffer.handle()), vec![9, 8, 7, 6, 0, 0, 0, 0]);
        assert_eq!(mock.live("buffer"), 1);
        assert_eq!(mock.live("memory"), 1);
        assert_eq!(mock.calls("device_wait_idle"), 1);

        assert!(buffer.resize(2, queue, &pool).is_err());
    }

    #[test]
    fn test_staged_upload_reaches_device_local_buffer() {
        let (mock, device, pool) = setup();
        let target = Buffer::new(
            Arc::clone(&device),
            8,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            true,
        )
        .unwrap();

        upload_data_range(&device, &pool, device.graphics_queue(), &target, 4, &[5, 6, 7, 8]).unwrap();

        assert_eq!(mock.buffer_contents(target.handle()), vec![0, 0, 0, 0, 5, 6, 7, 8]);
        // Staging buffer is gone, target remains
        assert_eq!(mock.live("buffer"), 1);
        assert_eq!(mock.live("command_buffer"), 0);
    }
}
