// Shader modules
//
// Sources are compiled to SPIR-V words by `crate::shaders`; this only wraps
// the words in a Vulkan object.

use crate::resources::ShaderStage;
use anyhow::{Context, Result};
use ash::vk;

/// Create a shader module from SPIR-V words
pub fn create_shader_module(device: &ash::Device, words: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(words);

    unsafe { device.create_shader_module(&create_info, None) }
        .context("Failed to create shader module")
}

pub fn stage_flags(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
    }
}
