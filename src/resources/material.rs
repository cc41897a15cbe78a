// Materials - shader stages plus fixed-function state
//
// A material is backend-agnostic: the Vulkan pipeline builder translates
// these enums into `vk::*` values when the pipeline is compiled.

use super::{mesh::Vertex, ResourceState};
use std::collections::BTreeMap;

/// Programmable pipeline stage a shader source is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// File extension used by on-disk shader sources
    pub fn extension(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "vert" => Some(ShaderStage::Vertex),
            "frag" => Some(ShaderStage::Fragment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Blend configuration of the single colour attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendState {
    pub enabled: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub alpha_op: BlendOp,
}

impl BlendState {
    pub const OPAQUE: Self = Self {
        enabled: false,
        src_color: BlendFactor::One,
        dst_color: BlendFactor::Zero,
        color_op: BlendOp::Add,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::Zero,
        alpha_op: BlendOp::Add,
    };

    /// Straight (non-premultiplied) alpha blending
    pub const ALPHA: Self = Self {
        enabled: true,
        src_color: BlendFactor::SrcAlpha,
        dst_color: BlendFactor::OneMinusSrcAlpha,
        color_op: BlendOp::Add,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::OneMinusSrcAlpha,
        alpha_op: BlendOp::Add,
    };

    pub const ADDITIVE: Self = Self {
        enabled: true,
        src_color: BlendFactor::SrcAlpha,
        dst_color: BlendFactor::One,
        color_op: BlendOp::Add,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::One,
        alpha_op: BlendOp::Add,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    Fill,
    Line,
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

/// Depth test settings. Disabled by default: the engine draws 2D/UI content
/// in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    pub test_enabled: bool,
    pub write_enabled: bool,
    pub compare: CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test_enabled: false,
            write_enabled: false,
            compare: CompareOp::LessOrEqual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Unorm8x4,
}

impl VertexFormat {
    pub fn size(self) -> u32 {
        match self {
            VertexFormat::Float32 | VertexFormat::Unorm8x4 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

/// Interleaved layout of a single vertex buffer binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Build a tightly packed layout, assigning locations in order
    pub fn packed(formats: &[VertexFormat]) -> Self {
        let mut offset = 0;
        let attributes = formats
            .iter()
            .enumerate()
            .map(|(location, &format)| {
                let attribute = VertexAttribute {
                    location: location as u32,
                    format,
                    offset,
                };
                offset += format.size();
                attribute
            })
            .collect();

        Self {
            stride: offset,
            attributes,
        }
    }
}

/// Everything the pipeline builder needs to compile a material
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialParams {
    /// Stage -> logical shader name, resolved through a `ShaderSource`
    pub shader_stages: BTreeMap<ShaderStage, String>,
    pub vertex_layout: VertexLayout,
    pub topology: Topology,
    pub blend: BlendState,
    pub cull_mode: CullMode,
    pub fill_mode: FillMode,
    pub front_face: FrontFace,
    pub depth: DepthState,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            shader_stages: BTreeMap::new(),
            vertex_layout: Vertex::layout(),
            topology: Topology::TriangleList,
            blend: BlendState::ALPHA,
            cull_mode: CullMode::None,
            fill_mode: FillMode::Fill,
            front_face: FrontFace::CounterClockwise,
            depth: DepthState::default(),
        }
    }
}

impl MaterialParams {
    /// Vertex + fragment pair sharing one shader name (`<name>.vert`, `<name>.frag`)
    pub fn with_shader(name: &str) -> Self {
        Self::default()
            .stage(ShaderStage::Vertex, name)
            .stage(ShaderStage::Fragment, name)
    }

    pub fn stage(mut self, stage: ShaderStage, shader: &str) -> Self {
        self.shader_stages.insert(stage, shader.to_string());
        self
    }

    pub fn blend(mut self, blend: BlendState) -> Self {
        self.blend = blend;
        self
    }

    pub fn cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn fill_mode(mut self, fill_mode: FillMode) -> Self {
        self.fill_mode = fill_mode;
        self
    }

    pub fn depth(mut self, depth: DepthState) -> Self {
        self.depth = depth;
        self
    }

    pub fn vertex_layout(mut self, layout: VertexLayout) -> Self {
        self.vertex_layout = layout;
        self
    }

    pub fn references_shader(&self, name: &str) -> bool {
        self.shader_stages.values().any(|shader| shader == name)
    }
}

/// A named material registered with the driver
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    params: MaterialParams,
    state: ResourceState,
}

impl Material {
    /// New materials start dirty so their pipeline is built on the next frame
    pub fn new(name: impl Into<String>, params: MaterialParams) -> Self {
        Self {
            name: name.into(),
            params,
            state: ResourceState::Dirty,
        }
    }

    pub fn params(&self) -> &MaterialParams {
        &self.params
    }

    /// Replace the parameters. The pipeline is not rebuilt until `mark_dirty`.
    pub fn set_params(&mut self, params: MaterialParams) {
        self.params = params;
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn mark_dirty(&mut self) {
        self.state = ResourceState::Dirty;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.state = ResourceState::Clean;
    }
}
