// =============================================================================
// SCENE RENDERER - Vulkan backend for a scene-graph UI engine
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  Scene code (materials, render objects, viewports, canvases)    │
// │    └── Driver (registries + per-frame sequence)                 │
// │          └── RenderBackend trait                                │
// │                └── VulkanBackend                                │
// │                      ├── Instance / PhysicalAdapter / Device    │
// │                      ├── Swapchain / RenderPass / FrameBuffers  │
// │                      ├── GraphicsPipeline (per material)        │
// │                      └── CommandPool / RenderQueue              │
// └─────────────────────────────────────────────────────────────────┘
//
// =============================================================================

pub mod backend;
pub mod config;
pub mod driver;
pub mod resources;
pub mod shaders;
pub mod window;

pub use backend::{Extent, Generation, RenderBackend, SwapchainState, SwapchainStatus, VulkanBackend};
pub use driver::{Driver, FrameOutcome};
pub use window::{SurfaceProvider, WinitSurface};
