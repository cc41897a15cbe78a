// Scene resources consumed by the driver
//
// Plain CPU-side descriptions: materials, renderables with their surfaces,
// viewports and canvases. GPU counterparts (pipelines, vertex buffers) are
// owned by the driver and materialized lazily from the `ResourceState` tag.

pub mod material;
pub mod mesh;
pub mod viewport;

pub use material::{
    BlendFactor, BlendOp, BlendState, CompareOp, CullMode, DepthState, FillMode, FrontFace,
    Material, MaterialParams, ShaderStage, Topology, VertexAttribute, VertexFormat, VertexLayout,
};
pub use mesh::{RenderObject, Surface, SurfaceId, Vertex, VertexData};
pub use viewport::{Canvas, CameraData, DrawTransform, RenderViewport, ViewportRect};

slotmap::new_key_type! {
    /// Handle to a material in the driver's registry
    pub struct MaterialId;
    /// Handle to a renderable in the driver's registry
    pub struct RenderObjectId;
    /// Handle to a viewport in the driver's registry
    pub struct ViewportId;
    /// Handle to a canvas in the driver's registry
    pub struct CanvasId;
}

/// Whether a resource's GPU counterpart matches its CPU description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceState {
    Clean,
    /// CPU side changed; rebuild/upload before next use
    #[default]
    Dirty,
}

impl ResourceState {
    pub fn is_dirty(self) -> bool {
        self == ResourceState::Dirty
    }
}
