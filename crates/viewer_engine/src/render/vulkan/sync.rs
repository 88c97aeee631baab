//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! [`FrameSynchronizer`] keeps three pools: one acquire semaphore and one fence
//! per frame in flight, and one render-complete semaphore per swapchain image.
//! Render-complete semaphores are indexed by the acquired image because the
//! presentation engine may still hold an image's semaphore when the same frame
//! slot comes around again.

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};

/// Binary semaphore with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe { device.create_semaphore(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, semaphore })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Repeat `wait` for as long as it reports TIMEOUT
pub fn wait_until_signaled<F>(mut wait: F) -> VulkanResult<()>
where
    F: FnMut() -> Result<(), vk::Result>,
{
    loop {
        match wait() {
            Ok(()) => return Ok(()),
            Err(vk::Result::TIMEOUT) => continue,
            Err(e) => return Err(VulkanError::Api(e)),
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe { device.create_fence(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, fence })
    }

    /// Block until signaled, retrying on timeout
    pub fn wait(&self) -> VulkanResult<()> {
        wait_until_signaled(|| unsafe { self.device.wait_for_fences(&[self.fence], true, u64::MAX) })
    }

    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]).map_err(VulkanError::Api) }
    }

    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

fn out_of_range(kind: &str, index: usize, len: usize) -> VulkanError {
    VulkanError::InvalidOperation {
        reason: format!("{kind} index {index} out of range ({len} available)"),
    }
}

/// Per-frame and per-image synchronization objects
pub struct FrameSynchronizer {
    device: Device,
    acquire_semaphores: Vec<Semaphore>,
    render_complete_semaphores: Vec<Semaphore>,
    in_flight_fences: Vec<Fence>,
}

impl FrameSynchronizer {
    /// Create `frames_in_flight` acquire semaphores and signaled fences, and
    /// `image_count` render-complete semaphores
    pub fn new(device: Device, frames_in_flight: usize, image_count: usize) -> VulkanResult<Self> {
        let acquire_semaphores = (0..frames_in_flight)
            .map(|_| Semaphore::new(device.clone()))
            .collect::<VulkanResult<Vec<_>>>()?;
        let render_complete_semaphores = (0..image_count)
            .map(|_| Semaphore::new(device.clone()))
            .collect::<VulkanResult<Vec<_>>>()?;
        let in_flight_fences = (0..frames_in_flight)
            .map(|_| Fence::new(device.clone(), true))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::debug!(
            "Created sync objects: {} frames in flight, {} images",
            frames_in_flight,
            image_count
        );

        Ok(Self {
            device,
            acquire_semaphores,
            render_complete_semaphores,
            in_flight_fences,
        })
    }

    pub fn wait_for_fence(&self, frame: usize) -> VulkanResult<()> {
        self.fence_ref(frame)?.wait()
    }

    pub fn reset_fence(&self, frame: usize) -> VulkanResult<()> {
        self.fence_ref(frame)?.reset()
    }

    fn fence_ref(&self, frame: usize) -> VulkanResult<&Fence> {
        self.in_flight_fences
            .get(frame)
            .ok_or_else(|| out_of_range("frame", frame, self.in_flight_fences.len()))
    }

    pub fn fence(&self, frame: usize) -> VulkanResult<vk::Fence> {
        self.fence_ref(frame).map(Fence::handle)
    }

    /// Signaled when the image acquired for `frame` is ready
    pub fn acquire_semaphore(&self, frame: usize) -> VulkanResult<vk::Semaphore> {
        self.acquire_semaphores
            .get(frame)
            .map(Semaphore::handle)
            .ok_or_else(|| out_of_range("frame", frame, self.acquire_semaphores.len()))
    }

    /// Signaled when rendering to `image_index` completes
    pub fn render_complete_semaphore(&self, image_index: u32) -> VulkanResult<vk::Semaphore> {
        let index = image_index as usize;
        self.render_complete_semaphores
            .get(index)
            .map(Semaphore::handle)
            .ok_or_else(|| out_of_range("image", index, self.render_complete_semaphores.len()))
    }

    pub fn frames_in_flight(&self) -> usize {
        self.in_flight_fences.len()
    }

    pub fn image_count(&self) -> usize {
        self.render_complete_semaphores.len()
    }

    /// Regenerate the per-image semaphores after the swapchain image count changed
    ///
    /// The caller must ensure the device is idle.
    pub fn resize_image_semaphores(&mut self, image_count: usize) -> VulkanResult<()> {
        if image_count == self.render_complete_semaphores.len() {
            return Ok(());
        }
        self.render_complete_semaphores.clear();
        for _ in 0..image_count {
            self.render_complete_semaphores.push(Semaphore::new(self.device.clone())?);
        }
        log::debug!("Render-complete semaphores resized to {}", image_count);
        Ok(())
    }

    /// Release every semaphore and fence; safe to call more than once
    pub fn destroy(&mut self) {
        self.acquire_semaphores.clear();
        self.render_complete_semaphores.clear();
        self.in_flight_fences.clear();
    }
}

impl Drop for FrameSynchronizer {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_retries_on_timeout() {
        let mut attempts = 0;
        let result = wait_until_signaled(|| {
            attempts += 1;
            if attempts < 3 {
                Err(vk::Result::TIMEOUT)
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(attempts, 3);
    }

    #[test]
    fn test_wait_propagates_device_loss() {
        let result = wait_until_signaled(|| Err(vk::Result::ERROR_DEVICE_LOST));
        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))));
    }
}
