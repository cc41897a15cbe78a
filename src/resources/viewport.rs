// Viewports, camera data and canvases

use super::ViewportId;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Screen-space rectangle in framebuffer pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewportRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ViewportRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }
}

/// Camera block pushed at offset 0 of the push-constant range
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraData {
    pub view_projection: Mat4,
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            view_projection: Mat4::IDENTITY,
        }
    }
}

impl CameraData {
    /// Pixel-space projection with the origin in the top-left corner
    pub fn pixel_space(width: f32, height: f32) -> Self {
        Self {
            view_projection: Mat4::orthographic_rh(0.0, width, 0.0, height, -1.0, 1.0),
        }
    }
}

/// Per-draw block pushed right after `CameraData`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DrawTransform {
    pub model: Mat4,
}

/// Byte offset of `DrawTransform` inside the push-constant range
pub const TRANSFORM_OFFSET: u32 = std::mem::size_of::<CameraData>() as u32;

/// Total push-constant range declared by every pipeline
pub const PUSH_CONSTANT_SIZE: u32 = TRANSFORM_OFFSET + std::mem::size_of::<DrawTransform>() as u32;

/// A region of the framebuffer and the camera used to draw into it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderViewport {
    pub rect: ViewportRect,
    pub camera: CameraData,
}

impl RenderViewport {
    pub fn new(rect: ViewportRect, camera: CameraData) -> Self {
        Self { rect, camera }
    }

    /// Viewport whose camera maps pixels 1:1 onto `rect`
    pub fn pixel_space(rect: ViewportRect) -> Self {
        Self {
            rect,
            camera: CameraData::pixel_space(rect.width, rect.height),
        }
    }
}

/// Groups render objects so they can be hidden together
#[derive(Debug, Clone)]
pub struct Canvas {
    pub name: String,
    pub visible: bool,
    /// Viewport used by member objects that do not name their own
    pub viewport: Option<ViewportId>,
}

impl Canvas {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            viewport: None,
        }
    }

    pub fn with_viewport(mut self, viewport: ViewportId) -> Self {
        self.viewport = Some(viewport);
        self
    }
}
