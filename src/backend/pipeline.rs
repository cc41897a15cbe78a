// Graphics pipeline creation and management
//
// A pipeline is compiled from a material's parameters against one render pass
// and is therefore part of a swapchain generation. Viewport and scissor are
// dynamic: they are set per draw, never baked in.
//
// Push constants: one VERTEX | FRAGMENT range holding the camera block at
// offset 0 followed by the per-draw transform block.

use super::shader::{create_shader_module, stage_flags};
use super::render_pass::RenderPass;
use crate::resources::viewport::PUSH_CONSTANT_SIZE;
use crate::resources::{
    BlendFactor, BlendOp, CompareOp, CullMode, FillMode, FrontFace, MaterialParams, ShaderStage,
    Topology, VertexFormat,
};
use crate::shaders::{compile_glsl, ShaderSource};
use anyhow::{Context, Result};
use ash::vk;

/// Vulkan translation of `MaterialParams`, independent of any device
#[derive(Debug, Clone)]
pub struct PipelineDescription {
    pub stages: Vec<(ShaderStage, String)>,
    pub binding: vk::VertexInputBindingDescription,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub samples: vk::SampleCountFlags,
    pub blend: vk::PipelineColorBlendAttachmentState,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: vk::CompareOp,
}

impl PipelineDescription {
    /// `None` when the material declares no shader stages
    pub fn from_params(params: &MaterialParams, samples: vk::SampleCountFlags) -> Option<Self> {
        if params.shader_stages.is_empty() {
            return None;
        }

        let layout = &params.vertex_layout;
        let attributes = layout
            .attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: 0,
                format: vertex_format(attribute.format),
                offset: attribute.offset,
            })
            .collect();

        let blend = &params.blend;
        let blend = vk::PipelineColorBlendAttachmentState {
            blend_enable: blend.enabled.into(),
            src_color_blend_factor: blend_factor(blend.src_color),
            dst_color_blend_factor: blend_factor(blend.dst_color),
            color_blend_op: blend_op(blend.color_op),
            src_alpha_blend_factor: blend_factor(blend.src_alpha),
            dst_alpha_blend_factor: blend_factor(blend.dst_alpha),
            alpha_blend_op: blend_op(blend.alpha_op),
            color_write_mask: vk::ColorComponentFlags::RGBA,
        };

        Some(Self {
            stages: params
                .shader_stages
                .iter()
                .map(|(&stage, name)| (stage, name.clone()))
                .collect(),
            binding: vk::VertexInputBindingDescription {
                binding: 0,
                stride: layout.stride,
                input_rate: vk::VertexInputRate::VERTEX,
            },
            attributes,
            topology: match params.topology {
                Topology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
                Topology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
                Topology::LineList => vk::PrimitiveTopology::LINE_LIST,
                Topology::PointList => vk::PrimitiveTopology::POINT_LIST,
            },
            polygon_mode: match params.fill_mode {
                FillMode::Fill => vk::PolygonMode::FILL,
                FillMode::Line => vk::PolygonMode::LINE,
                FillMode::Point => vk::PolygonMode::POINT,
            },
            cull_mode: match params.cull_mode {
                CullMode::None => vk::CullModeFlags::NONE,
                CullMode::Front => vk::CullModeFlags::FRONT,
                CullMode::Back => vk::CullModeFlags::BACK,
            },
            front_face: match params.front_face {
                FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
                FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
            },
            samples,
            blend,
            depth_test: params.depth.test_enabled,
            depth_write: params.depth.write_enabled,
            depth_compare: compare_op(params.depth.compare),
        })
    }
}

fn vertex_format(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::Float32 => vk::Format::R32_SFLOAT,
        VertexFormat::Float32x2 => vk::Format::R32G32_SFLOAT,
        VertexFormat::Float32x3 => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::Float32x4 => vk::Format::R32G32B32A32_SFLOAT,
        VertexFormat::Unorm8x4 => vk::Format::R8G8B8A8_UNORM,
    }
}

fn blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
    }
}

fn blend_op(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOp::Min => vk::BlendOp::MIN,
        BlendOp::Max => vk::BlendOp::MAX,
    }
}

fn compare_op(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

/// A compiled material. Only bindable once `is_created()` is true.
#[derive(Default)]
pub struct GraphicsPipeline {
    device: Option<ash::Device>,
    modules: Vec<vk::ShaderModule>,
    layout: vk::PipelineLayout,
    raw: vk::Pipeline,
}

impl GraphicsPipeline {
    /// Compile `params` against `render_pass`. No-op without shader stages.
    pub fn instantiate(
        &mut self,
        device: &ash::Device,
        params: &MaterialParams,
        shaders: &dyn ShaderSource,
        render_pass: &RenderPass,
        samples: vk::SampleCountFlags,
    ) -> Result<()> {
        let Some(description) = PipelineDescription::from_params(params, samples) else {
            return Ok(());
        };

        self.destroy();
        self.device = Some(device.clone());

        if let Err(e) = self.build(device, &description, shaders, render_pass) {
            self.destroy();
            return Err(e);
        }
        Ok(())
    }

    fn build(
        &mut self,
        device: &ash::Device,
        description: &PipelineDescription,
        shaders: &dyn ShaderSource,
        render_pass: &RenderPass,
    ) -> Result<()> {
        let entry_point = c"main";

        let mut stages = Vec::with_capacity(description.stages.len());
        for (stage, name) in &description.stages {
            let code = shaders.load(name, *stage)?;
            let words = compile_glsl(&code, *stage)?;
            let module = create_shader_module(device, &words)
                .with_context(|| format!("Shader module for {}", code.path_hint))?;
            self.modules.push(module);

            stages.push(
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage_flags(*stage))
                    .module(module)
                    .name(entry_point),
            );
        }

        let bindings = [description.binding];
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&description.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(description.topology)
            .primitive_restart_enable(false);

        // Counts only; the values come from cmd_set_viewport / cmd_set_scissor
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(description.polygon_mode)
            .line_width(1.0)
            .cull_mode(description.cull_mode)
            .front_face(description.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(description.samples);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(description.depth_test)
            .depth_write_enable(description.depth_write)
            .depth_compare_op(description.depth_compare)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let blend_attachments = [description.blend];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let push_constant_ranges = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: PUSH_CONSTANT_SIZE,
        }];
        let layout_info =
            vk::PipelineLayoutCreateInfo::default().push_constant_ranges(&push_constant_ranges);

        self.layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .context("Failed to create pipeline layout")?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(self.layout)
            .render_pass(render_pass.raw())
            .subpass(0);

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| e)
        .context("Failed to create graphics pipeline")?;

        self.raw = pipelines
            .into_iter()
            .next()
            .context("Driver returned no pipeline")?;
        Ok(())
    }

    pub fn is_created(&self) -> bool {
        self.raw != vk::Pipeline::null()
    }

    pub fn raw(&self) -> vk::Pipeline {
        self.raw
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Shader modules, then pipeline, then layout. Safe to call more than once.
    pub fn destroy(&mut self) {
        let Some(device) = self.device.as_ref() else {
            return;
        };

        unsafe {
            for module in self.modules.drain(..) {
                device.destroy_shader_module(module, None);
            }
            if self.raw != vk::Pipeline::null() {
                device.destroy_pipeline(self.raw, None);
                self.raw = vk::Pipeline::null();
            }
            if self.layout != vk::PipelineLayout::null() {
                device.destroy_pipeline_layout(self.layout, None);
                self.layout = vk::PipelineLayout::null();
            }
        }
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        self.destroy();
    }
}
