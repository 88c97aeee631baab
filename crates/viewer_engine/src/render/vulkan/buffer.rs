//! Buffer management for vertex, index, uniform and staging data
//!
//! Each [`GpuBuffer`] owns one buffer bound to its own allocation.

use ash::{vk, Device};
use std::ffi::c_void;
use std::ptr::NonNull;

use super::context::GraphicsContext;
use super::{VulkanError, VulkanResult};

/// Host mapping of a buffer's memory
///
/// Tracks the mapped pointer so that mapping and unmapping are idempotent and
/// writes to an unmapped buffer fail instead of touching freed memory.
#[derive(Debug, Default)]
pub struct MappingState {
    ptr: Option<NonNull<c_void>>,
}

impl MappingState {
    pub fn is_mapped(&self) -> bool {
        self.ptr.is_some()
    }

    /// Run `map` only if not already mapped
    pub fn map_with<F>(&mut self, map: F) -> VulkanResult<()>
    where
        F: FnOnce() -> VulkanResult<*mut c_void>,
    {
        if self.ptr.is_none() {
            let raw = map()?;
            self.ptr = Some(NonNull::new(raw).ok_or_else(|| VulkanError::InvalidOperation {
                reason: "driver returned a null mapping".to_string(),
            })?);
        }
        Ok(())
    }

    /// Run `unmap` only if currently mapped
    pub fn unmap_with<F: FnOnce()>(&mut self, unmap: F) {
        if self.ptr.take().is_some() {
            unmap();
        }
    }

    /// Copy `bytes` to the start of the mapping
    ///
    /// `capacity` is the size of the mapped range.
    pub fn write(&mut self, bytes: &[u8], capacity: vk::DeviceSize) -> VulkanResult<()> {
        let ptr = self.ptr.ok_or(VulkanError::BufferNotMapped)?;
        if bytes.len() as vk::DeviceSize > capacity {
            return Err(VulkanError::InvalidOperation {
                reason: format!("write of {} bytes exceeds buffer size {}", bytes.len(), capacity),
            });
        }
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr().cast::<u8>(), bytes.len());
        }
        Ok(())
    }
}

/// Buffer with its own bound device memory
pub struct GpuBuffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    mapping: MappingState,
}

impl GpuBuffer {
    /// Create a buffer and bind freshly allocated memory with `properties`
    pub fn new(
        context: &GraphicsContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let device = context.device()?.clone();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None).map_err(VulkanError::Api)? };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory_type_index = match context.find_memory_type(requirements.memory_type_bits, properties) {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(VulkanError::Api(e));
            }
        };

        let this = Self {
            device,
            buffer,
            memory,
            size,
            mapping: MappingState::default(),
        };

        unsafe {
            this.device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(this)
    }

    /// Map the whole buffer; a second call is a no-op
    pub fn map(&mut self) -> VulkanResult<()> {
        let (device, memory, size) = (&self.device, self.memory, self.size);
        self.mapping.map_with(|| unsafe {
            device
                .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)
        })
    }

    /// Unmap the buffer; a no-op when not mapped
    pub fn unmap(&mut self) {
        let (device, memory) = (&self.device, self.memory);
        self.mapping.unmap_with(|| unsafe { device.unmap_memory(memory) });
    }

    /// Write `bytes` at offset 0 of the mapped buffer
    pub fn copy_data(&mut self, bytes: &[u8]) -> VulkanResult<()> {
        self.mapping.write(bytes, self.size)
    }

    /// Record a copy of all of `source` into this buffer at offset 0
    pub fn copy_from(&self, source: &GpuBuffer, command_buffer: vk::CommandBuffer) {
        let region = vk::BufferCopy::builder().src_offset(0).dst_offset(0).size(source.size);
        unsafe {
            self.device
                .cmd_copy_buffer(command_buffer, source.buffer, self.buffer, &[region.build()]);
        }
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_mapped()
    }

    /// Unmap, free and destroy; safe to call more than once
    pub fn destroy(&mut self) {
        self.unmap();
        unsafe {
            if self.buffer != vk::Buffer::null() {
                self.device.destroy_buffer(self.buffer, None);
                self.buffer = vk::Buffer::null();
            }
            if self.memory != vk::DeviceMemory::null() {
                self.device.free_memory(self.memory, None);
                self.memory = vk::DeviceMemory::null();
            }
        }
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}
