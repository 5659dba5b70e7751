//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! RAII wrappers for semaphores and fences plus the per-frame [`FrameSync`]
//! bundle used by the frame loop.
//!
//! ## Frame synchronization
//!
//! ```text
//! acquire ──signals──> image_available ──waited by──> submit
//! submit  ──signals──> queue_complete  ──waited by──> present
//! submit  ──signals──> in_flight (fence) ──waited by──> CPU, next use of the slot
//! ```
//!
//! [`Fence`] caches its signaled state on the host. The cache is the only
//! record of it, so [`Fence::wait`] and [`Fence::reset`] keep it consistent:
//! waiting on a fence already known to be signaled never reaches the driver.

use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::device::RenderDevice;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive with automatic resource management
///
/// Signaled by one queue operation and waited on by another:
/// image acquisition signals, rendering waits; rendering signals, presentation waits.
pub struct Semaphore {
    device: Arc<dyn RenderDevice>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Arc<dyn RenderDevice>) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = device.create_semaphore(&create_info).map_err(VulkanError::Api)?;

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.semaphore);
    }
}

/// Fence wrapper with RAII cleanup and a host-side signaled flag
pub struct Fence {
    device: Arc<dyn RenderDevice>,
    fence: vk::Fence,
    is_signaled: bool,
}

impl Fence {
    /// Create a new fence, optionally already signaled
    pub fn new(device: Arc<dyn RenderDevice>, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = device.create_fence(&create_info).map_err(VulkanError::Api)?;

        Ok(Self {
            device,
            fence,
            is_signaled: signaled,
        })
    }

    /// Wait for the fence to signal
    ///
    /// Returns `true` immediately if the fence is already known to be signaled.
    /// A timeout or device error is logged and reported as `false`.
    pub fn wait(&mut self, timeout_ns: u64) -> bool {
        if self.is_signaled {
            return true;
        }

        match self.device.wait_for_fences(&[self.fence], true, timeout_ns) {
            Ok(()) => {
                self.is_signaled = true;
                true
            }
            Err(vk::Result::TIMEOUT) => {
                log::warn!("Fence wait timed out after {timeout_ns} ns");
                false
            }
            Err(vk::Result::ERROR_DEVICE_LOST) => {
                log::error!("Fence wait failed: device lost");
                false
            }
            Err(
                result @ (vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            ) => {
                log::error!("Fence wait failed: {result:?}");
                false
            }
            Err(result) => {
                log::error!("Unexpected fence wait result: {result:?}");
                false
            }
        }
    }

    /// Return the fence to the unsignaled state
    ///
    /// A no-op when the fence is not known to be signaled.
    pub fn reset(&mut self) -> VulkanResult<()> {
        if self.is_signaled {
            self.device.reset_fences(&[self.fence]).map_err(VulkanError::Api)?;
            self.is_signaled = false;
        }
        Ok(())
    }

    /// Whether the fence was last observed signaled
    pub fn is_signaled(&self) -> bool {
        self.is_signaled
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.fence);
    }
}

/// Frame synchronization objects for one in-flight frame slot
pub struct FrameSync {
    /// Semaphore signaled when swapchain image becomes available
    pub image_available: Semaphore,
    /// Semaphore signaled when the frame's queue submission completes
    pub queue_complete: Semaphore,
    /// Fence for CPU-GPU synchronization of the frame; created signaled
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create frame synchronization objects
    pub fn new(device: &Arc<dyn RenderDevice>) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(Arc::clone(device))?,
            queue_complete: Semaphore::new(Arc::clone(device))?,
            in_flight: Fence::new(Arc::clone(device), true)?,
        })
    }

    /// Create one set per frame in flight
    pub fn create_set(device: &Arc<dyn RenderDevice>, frames_in_flight: usize) -> VulkanResult<Vec<Self>> {
        (0..frames_in_flight).map(|_| Self::new(device)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::device::mock::MockDevice;

    fn mock() -> (Arc<MockDevice>, Arc<dyn RenderDevice>) {
        let mock = Arc::new(MockDevice::new());
        let device: Arc<dyn RenderDevice> = mock.clone();
        (mock, device)
    }

    #[test]
    fn test_wait_on_signaled_fence_skips_driver() {
        let (mock, device) = mock();
        let mut fence = Fence::new(device, true).unwrap();

        assert!(fence.wait(u64::MAX));
        assert!(fence.wait(u64::MAX));
        assert_eq!(mock.calls("wait_for_fences"), 0);
    }

    #[test]
    fn test_wait_marks_fence_signaled() {
        let (mock, device) = mock();
        let mut fence = Fence::new(device, false).unwrap();

        assert!(fence.wait(u64::MAX));
        assert!(fence.is_signaled());
        assert!(fence.wait(u64::MAX));
        assert_eq!(mock.calls("wait_for_fences"), 1);
    }

    #[test]
    fn test_timeout_and_device_loss_report_failure() {
        let (mock, device) = mock();
        let mut fence = Fence::new(device, false).unwrap();

        mock.script_fence_wait(Err(vk::Result::TIMEOUT));
        assert!(!fence.wait(10));
        assert!(!fence.is_signaled());

        mock.script_fence_wait(Err(vk::Result::ERROR_DEVICE_LOST));
        assert!(!fence.wait(10));

        mock.script_fence_wait(Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY));
        assert!(!fence.wait(10));
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_reset_only_touches_signaled_fences() {
        let (mock, device) = mock();
        let mut fence = Fence::new(device, false).unwrap();

        fence.reset().unwrap();
        assert_eq!(mock.calls("reset_fences"), 0);

        assert!(fence.wait(u64::MAX));
        fence.reset().unwrap();
        assert_eq!(mock.calls("reset_fences"), 1);
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_frame_sync_set_is_released_on_drop() {
        let (mock, device) = mock();
        let frames = FrameSync::create_set(&device, 2).unwrap();

        assert_eq!(mock.live("semaphore"), 4);
        assert_eq!(mock.live("fence"), 2);
        assert!(frames.iter().all(|frame| frame.in_flight.is_signaled()));

        drop(frames);
        assert_eq!(mock.live("semaphore"), 0);
        assert_eq!(mock.live("fence"), 0);
    }
}
