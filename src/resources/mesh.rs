// Renderables and their surfaces

use super::material::{VertexFormat, VertexLayout};
use super::{CanvasId, MaterialId, ResourceState, ViewportId};
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use std::collections::BTreeMap;

/// Default UI vertex: 2D position, RGBA colour, texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn layout() -> VertexLayout {
        VertexLayout::packed(&[
            VertexFormat::Float32x2,
            VertexFormat::Float32x4,
            VertexFormat::Float32x2,
        ])
    }

    /// Axis-aligned rectangle as two triangles
    pub fn quad(x: f32, y: f32, width: f32, height: f32, color: [f32; 4]) -> [Vertex; 6] {
        let v = |px: f32, py: f32, u: f32, w: f32| Vertex {
            position: [px, py],
            color,
            uv: [u, w],
        };
        let (x1, y1) = (x + width, y + height);
        [
            v(x, y, 0.0, 0.0),
            v(x1, y, 1.0, 0.0),
            v(x1, y1, 1.0, 1.0),
            v(x, y, 0.0, 0.0),
            v(x1, y1, 1.0, 1.0),
            v(x, y1, 0.0, 1.0),
        ]
    }
}

/// CPU-side vertex array stored as raw bytes plus the stride of one vertex
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexData {
    bytes: Vec<u8>,
    stride: u32,
}

impl VertexData {
    pub fn from_slice<T: Pod>(vertices: &[T]) -> Self {
        Self {
            bytes: bytemuck::cast_slice(vertices).to_vec(),
            stride: std::mem::size_of::<T>() as u32,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn vertex_count(&self) -> u32 {
        if self.stride == 0 {
            return 0;
        }
        (self.bytes.len() / self.stride as usize) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_count() == 0
    }
}

/// Key of a surface inside its render object, chosen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(pub u32);

/// One drawable piece of a render object: a material and its vertices
#[derive(Debug, Clone)]
pub struct Surface {
    pub material: MaterialId,
    vertices: VertexData,
    state: ResourceState,
}

impl Surface {
    pub fn new(material: MaterialId, vertices: VertexData) -> Self {
        Self {
            material,
            vertices,
            state: ResourceState::Dirty,
        }
    }

    pub fn vertices(&self) -> &VertexData {
        &self.vertices
    }

    /// Replace the CPU vertex array and flag it for upload
    pub fn set_vertices(&mut self, vertices: VertexData) {
        self.vertices = vertices;
        self.mark_dirty();
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.state.is_dirty()
    }

    pub fn mark_dirty(&mut self) {
        self.state = ResourceState::Dirty;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.state = ResourceState::Clean;
    }
}

/// A renderable: transform, draw-order key and a set of surfaces
#[derive(Debug, Clone)]
pub struct RenderObject {
    pub transform: Mat4,
    /// Lower priorities are drawn first
    pub priority: i32,
    pub viewport: Option<ViewportId>,
    pub canvas: Option<CanvasId>,
    surfaces: BTreeMap<SurfaceId, Surface>,
}

impl Default for RenderObject {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            priority: 0,
            viewport: None,
            canvas: None,
            surfaces: BTreeMap::new(),
        }
    }
}

impl RenderObject {
    pub fn new(priority: i32) -> Self {
        Self {
            priority,
            ..Default::default()
        }
    }

    pub fn with_viewport(mut self, viewport: ViewportId) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn with_canvas(mut self, canvas: CanvasId) -> Self {
        self.canvas = Some(canvas);
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_surface(mut self, id: SurfaceId, surface: Surface) -> Self {
        self.surfaces.insert(id, surface);
        self
    }

    pub fn surface(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    pub fn surface_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        self.surfaces.get_mut(&id)
    }

    pub fn surfaces(&self) -> impl Iterator<Item = (SurfaceId, &Surface)> {
        self.surfaces.iter().map(|(&id, surface)| (id, surface))
    }

    pub(crate) fn surfaces_mut(&mut self) -> impl Iterator<Item = (SurfaceId, &mut Surface)> {
        self.surfaces.iter_mut().map(|(&id, surface)| (id, surface))
    }

    pub(crate) fn insert_surface(&mut self, id: SurfaceId, surface: Surface) -> Option<Surface> {
        self.surfaces.insert(id, surface)
    }

    pub(crate) fn remove_surface(&mut self, id: SurfaceId) -> Option<Surface> {
        self.surfaces.remove(&id)
    }

    pub fn has_dirty_surfaces(&self) -> bool {
        self.surfaces.values().any(Surface::is_dirty)
    }
}
