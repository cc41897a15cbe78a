// Render pass + framebuffers for one swapchain generation
//
// Attachments (indices are fixed, framebuffers follow the same order):
//   0: multisampled colour   clear / store   -> COLOR_ATTACHMENT_OPTIMAL
//   1: multisampled depth    clear / store   -> DEPTH_STENCIL_ATTACHMENT_OPTIMAL
//   2: resolve (swapchain)   dont-care/store -> PRESENT_SRC_KHR
//
// Both objects are rebuilt whenever the swapchain format or extent changes.

use super::Swapchain;
use anyhow::{Context, Result};
use ash::vk;

const COLOR_ATTACHMENT: u32 = 0;
const DEPTH_ATTACHMENT: u32 = 1;
const RESOLVE_ATTACHMENT: u32 = 2;

/// Attachment descriptions in framebuffer order
pub fn attachment_descriptions(
    color_format: vk::Format,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
) -> [vk::AttachmentDescription; 3] {
    let color = vk::AttachmentDescription::default()
        .format(color_format)
        .samples(samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    let depth = vk::AttachmentDescription::default()
        .format(depth_format)
        .samples(samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let resolve = vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::DONT_CARE)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    [color, depth, resolve]
}

#[derive(Default)]
pub struct RenderPass {
    device: Option<ash::Device>,
    raw: vk::RenderPass,
}

impl RenderPass {
    /// Describe the attachment set of `swapchain`'s current generation
    pub fn instantiate(&mut self, device: &ash::Device, swapchain: &Swapchain) -> Result<()> {
        self.destroy();

        let attachments = attachment_descriptions(
            swapchain.format(),
            swapchain.depth_format(),
            swapchain.samples(),
        );

        let color_refs = [vk::AttachmentReference {
            attachment: COLOR_ATTACHMENT,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: DEPTH_ATTACHMENT,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let resolve_refs = [vk::AttachmentReference {
            attachment: RESOLVE_ATTACHMENT,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)
            .resolve_attachments(&resolve_refs)];

        // The acquire semaphore is waited on at this stage, so the layout
        // transition of the swapchain image must not start before it
        let dependencies = [vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            )];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        self.raw = unsafe { device.create_render_pass(&create_info, None) }
            .context("Failed to create render pass")?;
        self.device = Some(device.clone());
        Ok(())
    }

    pub fn raw(&self) -> vk::RenderPass {
        self.raw
    }

    pub fn is_created(&self) -> bool {
        self.raw != vk::RenderPass::null()
    }

    /// Safe to call more than once
    pub fn destroy(&mut self) {
        if let Some(device) = self.device.as_ref() {
            if self.raw != vk::RenderPass::null() {
                unsafe { device.destroy_render_pass(self.raw, None) };
            }
        }
        self.raw = vk::RenderPass::null();
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// One framebuffer per swapchain image
#[derive(Default)]
pub struct FrameBuffers {
    device: Option<ash::Device>,
    framebuffers: Vec<vk::Framebuffer>,
}

impl FrameBuffers {
    pub fn instantiate(
        &mut self,
        device: &ash::Device,
        swapchain: &Swapchain,
        render_pass: &RenderPass,
    ) -> Result<()> {
        self.destroy();
        self.device = Some(device.clone());

        let extent = swapchain.extent();
        for &image_view in swapchain.image_views() {
            let attachments = [swapchain.color_view(), swapchain.depth_view(), image_view];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass.raw())
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe { device.create_framebuffer(&create_info, None) }
                .context("Failed to create framebuffer")?;
            self.framebuffers.push(framebuffer);
        }

        log::debug!("Created {} framebuffers", self.framebuffers.len());
        Ok(())
    }

    pub fn get(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    /// Safe to call more than once
    pub fn destroy(&mut self) {
        let Some(device) = self.device.as_ref() else {
            return;
        };
        for framebuffer in self.framebuffers.drain(..) {
            unsafe { device.destroy_framebuffer(framebuffer, None) };
        }
    }
}

impl Drop for FrameBuffers {
    fn drop(&mut self) {
        self.destroy();
    }
}
