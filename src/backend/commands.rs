// Command pool + the single primary command buffer recorded each frame

use anyhow::{Context, Result};
use ash::vk;

#[derive(Default)]
pub struct CommandPool {
    device: Option<ash::Device>,
    raw: vk::CommandPool,
}

impl CommandPool {
    /// Pool on `queue_family` whose buffers are short-lived and reset one by one
    pub fn create(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            );

        let raw = unsafe { device.create_command_pool(&create_info, None) }
            .context("Failed to create command pool")?;

        Ok(Self {
            device: Some(device.clone()),
            raw,
        })
    }

    pub fn raw(&self) -> vk::CommandPool {
        self.raw
    }

    pub fn is_created(&self) -> bool {
        self.raw != vk::CommandPool::null()
    }

    /// Frees every buffer allocated from the pool. Safe to call more than once.
    pub fn destroy(&mut self) {
        if let Some(device) = self.device.as_ref() {
            if self.raw != vk::CommandPool::null() {
                unsafe { device.destroy_command_pool(self.raw, None) };
            }
        }
        self.raw = vk::CommandPool::null();
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Exactly one primary command buffer
#[derive(Default)]
pub struct CommandBuffers {
    device: Option<ash::Device>,
    pool: vk::CommandPool,
    raw: vk::CommandBuffer,
}

impl CommandBuffers {
    pub fn allocate(device: &ash::Device, pool: &CommandPool) -> Result<Self> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool.raw())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { device.allocate_command_buffers(&allocate_info) }
            .context("Failed to allocate command buffer")?;
        let raw = buffers
            .into_iter()
            .next()
            .context("Driver returned no command buffer")?;

        Ok(Self {
            device: Some(device.clone()),
            pool: pool.raw(),
            raw,
        })
    }

    pub fn raw(&self) -> vk::CommandBuffer {
        self.raw
    }

    /// Return the buffer to its pool. Must run before the pool is destroyed.
    pub fn free(&mut self) {
        if let Some(device) = self.device.as_ref() {
            if self.raw != vk::CommandBuffer::null() {
                unsafe { device.free_command_buffers(self.pool, &[self.raw]) };
            }
        }
        self.raw = vk::CommandBuffer::null();
    }
}
