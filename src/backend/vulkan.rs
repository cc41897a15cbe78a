// Vulkan backend - composes the components behind `RenderBackend`
//
// Created once: Instance -> PhysicalAdapter -> LogicalDevice -> CommandPool
// -> RenderQueue. Everything tied to a swapchain generation (swapchain,
// attachment textures, render pass, framebuffers, command buffer) starts
// empty and is built by the driver through the `recreate_*` calls.
//
// Teardown runs in reverse; see the Drop impl.

use super::buffer::VertexBuffer;
use super::commands::{CommandBuffers, CommandPool};
use super::render_pass::{FrameBuffers, RenderPass};
use super::{
    Extent, GraphicsPipeline, Generation, Instance, LogicalDevice, PhysicalAdapter, RenderBackend,
    RenderQueue, Swapchain, SwapchainState, SwapchainStatus,
};
use crate::resources::{MaterialParams, VertexData, ViewportRect};
use crate::shaders::ShaderLibrary;
use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub struct VulkanBackend {
    instance: Instance,
    adapter: PhysicalAdapter,
    device: LogicalDevice,
    swapchain: Swapchain,
    render_pass: RenderPass,
    framebuffers: FrameBuffers,
    command_pool: CommandPool,
    command_buffers: CommandBuffers,
    queue: RenderQueue,
    shaders: ShaderLibrary,
    generation: Generation,
}

impl VulkanBackend {
    /// Create the long-lived objects for `window`. No swapchain yet.
    pub fn new<W>(
        app_name: &str,
        enable_validation: bool,
        window: &W,
        shaders: ShaderLibrary,
    ) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        let display = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();

        let mut instance = Instance::create(app_name, enable_validation, Some(display))?;
        instance.create_surface(window)?;

        let adapter = PhysicalAdapter::select(&instance)?;
        let device = LogicalDevice::create(&instance, &adapter)?;

        let command_pool = CommandPool::create(device.raw(), device.graphics_family())?;
        let queue = RenderQueue::create(device.raw(), device.graphics_queue(), device.present_queue())?;

        Ok(Self {
            instance,
            adapter,
            device,
            swapchain: Swapchain::default(),
            render_pass: RenderPass::default(),
            framebuffers: FrameBuffers::default(),
            command_pool,
            command_buffers: CommandBuffers::default(),
            queue,
            shaders,
            generation: Generation::default(),
        })
    }

    pub fn adapter(&self) -> &PhysicalAdapter {
        &self.adapter
    }

    pub fn device(&self) -> &LogicalDevice {
        &self.device
    }

    pub fn validation_enabled(&self) -> bool {
        self.instance.validation_enabled()
    }

    fn cmd(&self) -> vk::CommandBuffer {
        self.command_buffers.raw()
    }

    /// Release the current generation: framebuffers reference the render
    /// pass and the swapchain views, so they go first
    fn destroy_generation(&mut self) {
        self.framebuffers.destroy();
        self.render_pass.destroy();
        self.swapchain.destroy();
    }
}

impl RenderBackend for VulkanBackend {
    type Pipeline = GraphicsPipeline;
    type VertexBuffer = VertexBuffer;

    fn generation(&self) -> Generation {
        self.generation
    }

    fn extent(&self) -> Extent {
        let extent = self.swapchain.extent();
        Extent::new(extent.width, extent.height)
    }

    fn wait_for_previous_frame(&mut self) -> Result<()> {
        self.queue.wait_for()
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.device.wait_idle()
    }

    fn create_pipeline(&mut self, params: &MaterialParams) -> Result<Option<GraphicsPipeline>> {
        if !self.render_pass.is_created() {
            anyhow::bail!("Cannot build a pipeline before the render pass exists");
        }

        let mut pipeline = GraphicsPipeline::default();
        pipeline.instantiate(
            self.device.raw(),
            params,
            &self.shaders,
            &self.render_pass,
            self.swapchain.samples(),
        )?;

        Ok(pipeline.is_created().then_some(pipeline))
    }

    fn destroy_pipeline(&mut self, mut pipeline: GraphicsPipeline) {
        pipeline.destroy();
    }

    fn upload_vertices(&mut self, vertices: &VertexData) -> Result<VertexBuffer> {
        VertexBuffer::upload(&self.device, vertices)
    }

    fn destroy_vertex_buffer(&mut self, mut buffer: VertexBuffer) {
        buffer.destroy();
    }

    fn acquire_next_image(&mut self) -> Result<SwapchainState> {
        self.queue.acquire_next_image(&mut self.swapchain)
    }

    fn begin_frame(&mut self, clear_color: [f32; 4]) -> Result<()> {
        self.queue.begin_command_buffer(&self.command_buffers)?;
        self.queue.begin_render_pass(
            &self.command_buffers,
            &self.render_pass,
            &self.framebuffers,
            &self.swapchain,
            clear_color,
        )
    }

    fn set_viewport(&mut self, rect: ViewportRect) {
        let viewport = vk::Viewport {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D {
                x: rect.x.max(0.0) as i32,
                y: rect.y.max(0.0) as i32,
            },
            extent: vk::Extent2D {
                width: rect.width.max(0.0) as u32,
                height: rect.height.max(0.0) as u32,
            },
        };

        let device = self.device.raw();
        unsafe {
            device.cmd_set_viewport(self.cmd(), 0, &[viewport]);
            device.cmd_set_scissor(self.cmd(), 0, &[scissor]);
        }
    }

    fn bind_pipeline(&mut self, pipeline: &GraphicsPipeline) {
        unsafe {
            self.device.raw().cmd_bind_pipeline(
                self.cmd(),
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.raw(),
            )
        };
    }

    fn push_constants(&mut self, pipeline: &GraphicsPipeline, offset: u32, bytes: &[u8]) {
        unsafe {
            self.device.raw().cmd_push_constants(
                self.cmd(),
                pipeline.layout(),
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                offset,
                bytes,
            )
        };
    }

    fn bind_vertex_buffer(&mut self, buffer: &VertexBuffer) {
        unsafe {
            self.device
                .raw()
                .cmd_bind_vertex_buffers(self.cmd(), 0, &[buffer.raw()], &[0])
        };
    }

    fn draw(&mut self, vertex_count: u32) {
        unsafe { self.device.raw().cmd_draw(self.cmd(), vertex_count, 1, 0, 0) };
    }

    fn end_frame(&mut self) -> Result<()> {
        self.queue.end_render_pass(&self.command_buffers)?;
        self.queue.end_command_buffer(&self.command_buffers)
    }

    fn submit(&mut self) -> Result<()> {
        self.queue.queue_submit(&self.command_buffers)
    }

    fn present(&mut self) -> Result<SwapchainState> {
        self.queue.queue_present(&self.swapchain)
    }

    fn recreate_swapchain(&mut self, extent: Extent) -> Result<SwapchainStatus> {
        self.destroy_generation();

        let status = self
            .swapchain
            .instantiate(&self.instance, &self.adapter, &self.device, extent)?;
        if status == SwapchainStatus::NotReady {
            return Ok(status);
        }

        // The render pass takes its formats and sample count from these
        self.swapchain.create_color_texture(&self.device)?;
        self.swapchain.create_depth_texture(&self.device)?;
        self.render_pass.instantiate(self.device.raw(), &self.swapchain)?;

        self.generation = self.generation.next();
        log::info!(
            "Swapchain generation {} ready ({}x{})",
            self.generation.0,
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(SwapchainStatus::Ready)
    }

    fn recreate_framebuffers(&mut self) -> Result<()> {
        if !self.swapchain.is_created() {
            anyhow::bail!("Cannot build framebuffers before the swapchain exists");
        }
        self.framebuffers
            .instantiate(self.device.raw(), &self.swapchain, &self.render_pass)
    }

    fn recreate_command_buffer(&mut self) -> Result<()> {
        self.command_buffers.free();
        self.command_buffers = CommandBuffers::allocate(self.device.raw(), &self.command_pool)?;
        Ok(())
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        log::info!("Shutting down Vulkan backend...");
        if let Err(e) = self.device.wait_idle() {
            log::warn!("Device did not go idle during shutdown: {:#}", e);
        }

        // Reverse creation order; the allocator goes with the device
        self.queue.destroy();
        self.command_buffers.free();
        self.command_pool.destroy();
        self.destroy_generation();
        self.device.destroy();
        self.instance.destroy();
    }
}
