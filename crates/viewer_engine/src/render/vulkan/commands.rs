//! Command buffer management
//!
//! One resettable pool on the graphics family, a fixed set of per-frame
//! primary buffers, and blocking one-shot buffers for uploads.

use ash::{vk, Device};

use super::context::GraphicsContext;
use super::{VulkanError, VulkanResult};

/// Command pool plus one reusable primary buffer per frame in flight
pub struct CommandDispatcher {
    device: Device,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
}

impl CommandDispatcher {
    pub fn new(context: &GraphicsContext, frames_in_flight: usize) -> VulkanResult<Self> {
        let device = context.device()?.clone();

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(context.graphics_queue_family());

        let command_pool = unsafe { device.create_command_pool(&pool_info, None).map_err(VulkanError::Api)? };

        let mut dispatcher = Self {
            device,
            queue: context.graphics_queue(),
            command_pool,
            command_buffers: Vec::new(),
        };
        dispatcher.command_buffers = dispatcher.allocate(frames_in_flight as u32)?;
        Ok(dispatcher)
    }

    fn allocate(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.allocate_command_buffers(&alloc_info).map_err(VulkanError::Api) }
    }

    /// The preallocated buffer for `frame`
    pub fn command_buffer(&self, frame: usize) -> VulkanResult<vk::CommandBuffer> {
        self.command_buffers
            .get(frame)
            .copied()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("no command buffer for frame {frame}"),
            })
    }

    /// Allocate a buffer and begin it for a single submission
    pub fn begin_one_shot(&self) -> VulkanResult<vk::CommandBuffer> {
        let command_buffer = self
            .allocate(1)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InitializationFailed("no command buffer allocated".to_string()))?;

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        if let Err(e) = unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) } {
            unsafe { self.device.free_command_buffers(self.command_pool, &[command_buffer]) };
            return Err(VulkanError::Api(e));
        }
        Ok(command_buffer)
    }

    /// End, submit, wait for the queue to drain, and free
    pub fn end_one_shot(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let result = self.submit_and_wait(command_buffer);
        unsafe { self.device.free_command_buffers(self.command_pool, &[command_buffer]) };
        result
    }

    fn submit_and_wait(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        unsafe {
            self.device.end_command_buffer(command_buffer).map_err(VulkanError::Api)?;
            self.device
                .queue_submit(self.queue, &[submit_info.build()], vk::Fence::null())
                .map_err(VulkanError::Api)?;
            self.device.queue_wait_idle(self.queue).map_err(VulkanError::Api)
        }
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Destroy the pool and its buffers; safe to call more than once
    pub fn destroy(&mut self) {
        if self.command_pool != vk::CommandPool::null() {
            unsafe { self.device.destroy_command_pool(self.command_pool, None) };
            self.command_pool = vk::CommandPool::null();
            self.command_buffers.clear();
        }
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        self.destroy();
    }
}
