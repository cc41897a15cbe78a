// Backend module - Vulkan abstraction layer
//
// Design: Thin wrappers around ash, one per Vulkan object family, composed by
// `VulkanBackend`. The driver only talks to the `RenderBackend` trait.

pub mod adapter;
pub mod buffer;
pub mod commands;
pub mod device;
pub mod instance;
pub mod pipeline;
pub mod queue;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod vulkan;

pub use adapter::PhysicalAdapter;
pub use device::LogicalDevice;
pub use instance::Instance;
pub use pipeline::GraphicsPipeline;
pub use queue::RenderQueue;
pub use swapchain::Swapchain;
pub use vulkan::VulkanBackend;

use crate::resources::{MaterialParams, VertexData, ViewportRect};
use anyhow::Result;

/// Counter shared by every object that must be rebuilt with the swapchain
///
/// Generation 0 means no swapchain has been created yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

/// Framebuffer size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Minimized windows report a zero dimension
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Swapchain health reported by acquire and present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainState {
    Optimal,
    /// Still usable, but no longer matches the surface exactly
    Suboptimal,
    /// Unusable; the generation has to be rebuilt
    OutOfDate,
}

/// Result of creating a swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainStatus {
    Ready,
    /// Surface extent is zero (minimized); nothing was created
    NotReady,
}

/// Operations the driver needs from a GPU backend
///
/// Every fatal condition is an `Err`; staleness and minimization come back
/// as `SwapchainState` / `SwapchainStatus` values.
pub trait RenderBackend {
    type Pipeline;
    type VertexBuffer;

    /// Generation of the current swapchain objects
    fn generation(&self) -> Generation;

    /// Extent of the current swapchain
    fn extent(&self) -> Extent;

    /// Block until the previously submitted frame has finished on the GPU
    fn wait_for_previous_frame(&mut self) -> Result<()>;

    /// Block until the device has no pending work
    fn wait_idle(&mut self) -> Result<()>;

    /// Compile a pipeline for the current render pass; `None` if the
    /// material declares no shader stages
    fn create_pipeline(&mut self, params: &MaterialParams) -> Result<Option<Self::Pipeline>>;

    fn destroy_pipeline(&mut self, pipeline: Self::Pipeline);

    /// Copy non-empty vertex data into a new GPU buffer
    fn upload_vertices(&mut self, vertices: &VertexData) -> Result<Self::VertexBuffer>;

    fn destroy_vertex_buffer(&mut self, buffer: Self::VertexBuffer);

    fn acquire_next_image(&mut self) -> Result<SwapchainState>;

    /// Begin the command buffer and the render pass on the acquired image
    fn begin_frame(&mut self, clear_color: [f32; 4]) -> Result<()>;

    /// Set dynamic viewport and scissor
    fn set_viewport(&mut self, rect: ViewportRect);

    fn bind_pipeline(&mut self, pipeline: &Self::Pipeline);

    fn push_constants(&mut self, pipeline: &Self::Pipeline, offset: u32, bytes: &[u8]);

    fn bind_vertex_buffer(&mut self, buffer: &Self::VertexBuffer);

    fn draw(&mut self, vertex_count: u32);

    /// End the render pass and the command buffer
    fn end_frame(&mut self) -> Result<()>;

    fn submit(&mut self) -> Result<()>;

    fn present(&mut self) -> Result<SwapchainState>;

    /// Destroy the old generation and create swapchain, colour/depth
    /// textures and render pass for `extent`. Advances the generation on
    /// `Ready`. The caller must have waited for the device to go idle.
    fn recreate_swapchain(&mut self, extent: Extent) -> Result<SwapchainStatus>;

    fn recreate_framebuffers(&mut self) -> Result<()>;

    fn recreate_command_buffer(&mut self) -> Result<()>;
}
