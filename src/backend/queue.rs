// Render queue - frame synchronization and submission
//
// One frame in flight: a single image-available semaphore, render-finished
// semaphore and in-flight fence.
//
// The fence starts signaled so the very first wait returns at once. It is
// reset right before submission, not after the wait: a frame abandoned after
// an out-of-date acquire submits nothing, and the next wait must not block
// on a fence nobody will signal.
//
// Waits use an infinite timeout. A hung GPU hangs the frame loop.

use super::commands::CommandBuffers;
use super::render_pass::{FrameBuffers, RenderPass};
use super::{SwapchainState, Swapchain};
use anyhow::{Context, Result};
use ash::vk;

#[derive(Default)]
pub struct RenderQueue {
    device: Option<ash::Device>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
}

impl RenderQueue {
    pub fn create(
        device: &ash::Device,
        graphics_queue: vk::Queue,
        present_queue: vk::Queue,
    ) -> Result<Self> {
        let mut queue = Self {
            device: Some(device.clone()),
            graphics_queue,
            present_queue,
            ..Default::default()
        };

        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            queue.image_available = device
                .create_semaphore(&semaphore_info, None)
                .context("Failed to create image-available semaphore")?;
            queue.render_finished = device
                .create_semaphore(&semaphore_info, None)
                .context("Failed to create render-finished semaphore")?;
            queue.in_flight = device
                .create_fence(&fence_info, None)
                .context("Failed to create in-flight fence")?;
        }

        Ok(queue)
    }

    fn device(&self) -> Result<&ash::Device> {
        self.device.as_ref().context("Render queue not created")
    }

    /// Block until the previously submitted frame has completed
    pub fn wait_for(&self) -> Result<()> {
        let device = self.device()?;
        unsafe { device.wait_for_fences(&[self.in_flight], true, u64::MAX) }
            .context("Failed to wait for in-flight fence")
    }

    pub fn acquire_next_image(&self, swapchain: &mut Swapchain) -> Result<SwapchainState> {
        swapchain.acquire_next_image(self.image_available)
    }

    pub fn begin_command_buffer(&self, commands: &CommandBuffers) -> Result<()> {
        let device = self.device()?;
        let cmd = commands.raw();
        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin command buffer")
        }
    }

    /// Begin the render pass on the framebuffer of the acquired image
    pub fn begin_render_pass(
        &self,
        commands: &CommandBuffers,
        render_pass: &RenderPass,
        framebuffers: &FrameBuffers,
        swapchain: &Swapchain,
        clear_color: [f32; 4],
    ) -> Result<()> {
        let device = self.device()?;
        let framebuffer = framebuffers
            .get(swapchain.image_index())
            .context("No framebuffer for acquired image")?;

        // Same order as the attachments; the resolve target is not cleared
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
            vk::ClearValue::default(),
        ];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass.raw())
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: swapchain.extent(),
            })
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(commands.raw(), &begin_info, vk::SubpassContents::INLINE)
        };
        Ok(())
    }

    pub fn end_render_pass(&self, commands: &CommandBuffers) -> Result<()> {
        let device = self.device()?;
        unsafe { device.cmd_end_render_pass(commands.raw()) };
        Ok(())
    }

    pub fn end_command_buffer(&self, commands: &CommandBuffers) -> Result<()> {
        let device = self.device()?;
        unsafe { device.end_command_buffer(commands.raw()) }
            .context("Failed to end command buffer")
    }

    /// Submit once the image is available; signal render-finished and the fence
    pub fn queue_submit(&self, commands: &CommandBuffers) -> Result<()> {
        let device = self.device()?;

        let wait_semaphores = [self.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [commands.raw()];
        let signal_semaphores = [self.render_finished];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .reset_fences(&[self.in_flight])
                .context("Failed to reset in-flight fence")?;
            device
                .queue_submit(self.graphics_queue, &[submit_info], self.in_flight)
                .context("Failed to submit draw command buffer")
        }
    }

    /// Present the acquired image once rendering has finished
    pub fn queue_present(&self, swapchain: &Swapchain) -> Result<SwapchainState> {
        swapchain.present(self.present_queue, &[self.render_finished])
    }

    /// Safe to call more than once. The device must be idle.
    pub fn destroy(&mut self) {
        let Some(device) = self.device.as_ref() else {
            return;
        };

        unsafe {
            if self.image_available != vk::Semaphore::null() {
                device.destroy_semaphore(self.image_available, None);
                self.image_available = vk::Semaphore::null();
            }
            if self.render_finished != vk::Semaphore::null() {
                device.destroy_semaphore(self.render_finished, None);
                self.render_finished = vk::Semaphore::null();
            }
            if self.in_flight != vk::Fence::null() {
                device.destroy_fence(self.in_flight, None);
                self.in_flight = vk::Fence::null();
            }
        }
    }
}

impl Drop for RenderQueue {
    fn drop(&mut self) {
        self.destroy();
    }
}
