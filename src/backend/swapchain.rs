// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen, plus
// the multisampled colour and depth targets that resolve into them.
//
// Lifecycle: Uninitialized -> instantiate -> Ready -> destroy -> Uninitialized.
// A resize goes through destroy + instantiate; nothing is mutated in place.
// Presentation is vsync-locked (FIFO) on purpose.

use super::adapter::SwapchainSupport;
use super::buffer::{AttachmentKind, AttachmentTexture};
use super::{Extent, Instance, LogicalDevice, PhysicalAdapter, SwapchainState, SwapchainStatus};
use anyhow::{Context, Result};
use ash::khr::swapchain;
use ash::vk;

/// Everything needed to create a swapchain, resolved from surface support
#[derive(Debug, Clone, Copy)]
pub struct SwapchainSettings {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainSettings {
    /// `Ok(None)` when the window is minimized (zero extent)
    pub fn resolve(support: &SwapchainSupport, requested: Extent) -> Result<Option<Self>> {
        if requested.is_empty() {
            return Ok(None);
        }

        let caps = &support.capabilities;

        let surface_format = support
            .formats
            .iter()
            .find(|f| {
                f.format == vk::Format::B8G8R8A8_SRGB
                    && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| support.formats.first())
            .copied()
            .context("Surface reports no formats")?;

        // FIFO is the only mode every driver must support
        let present_mode = vk::PresentModeKHR::FIFO;

        let extent = if caps.current_extent.width != u32::MAX {
            caps.current_extent
        } else {
            vk::Extent2D {
                width: requested
                    .width
                    .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
                height: requested
                    .height
                    .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
            }
        };
        if extent.width == 0 || extent.height == 0 {
            return Ok(None);
        }

        // A max of zero means "no limit"
        let mut image_count = caps.min_image_count + 1;
        if caps.max_image_count > 0 && image_count > caps.max_image_count {
            image_count = caps.max_image_count;
        }

        Ok(Some(Self {
            surface_format,
            present_mode,
            extent,
            image_count,
            pre_transform: caps.current_transform,
        }))
    }
}

#[derive(Default)]
pub struct Swapchain {
    loader: Option<swapchain::Device>,
    device: Option<ash::Device>,
    raw: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    depth_format: vk::Format,
    extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
    color_texture: AttachmentTexture,
    depth_texture: AttachmentTexture,
    image_index: u32,
}

impl Swapchain {
    /// Create the image chain for `requested`.
    ///
    /// Returns `NotReady` without creating anything while the window is
    /// minimized. Any previous chain must already be destroyed.
    pub fn instantiate(
        &mut self,
        instance: &Instance,
        adapter: &PhysicalAdapter,
        device: &LogicalDevice,
        requested: Extent,
    ) -> Result<SwapchainStatus> {
        let support = adapter.query_swapchain_support(instance)?;
        let Some(settings) = SwapchainSettings::resolve(&support, requested)? else {
            log::debug!(
                "Swapchain not created: zero extent {}x{}",
                requested.width,
                requested.height
            );
            return Ok(SwapchainStatus::NotReady);
        };

        let loader = self
            .loader
            .get_or_insert_with(|| swapchain::Device::new(instance.raw(), device.raw()))
            .clone();
        self.device = Some(device.raw().clone());

        let families = [device.graphics_family(), device.present_family()];
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(instance.surface())
            .min_image_count(settings.image_count)
            .image_format(settings.surface_format.format)
            .image_color_space(settings.surface_format.color_space)
            .image_extent(settings.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(settings.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(settings.present_mode)
            .clipped(true);
        create_info = if families[0] != families[1] {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        self.raw = unsafe { loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;
        self.format = settings.surface_format.format;
        self.extent = settings.extent;
        self.samples = device.max_sample_count();

        self.images = unsafe { loader.get_swapchain_images(self.raw) }
            .context("Failed to get swapchain images")?;

        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { device.raw().create_image_view(&view_info, None) }
                .context("Failed to create swapchain image view")?;
            self.image_views.push(view);
        }

        self.depth_format = device
            .supported_depth_format()
            .context("No supported depth format")?;

        log::info!(
            "Created swapchain {}x{} with {} images ({:?}, depth {:?})",
            self.extent.width,
            self.extent.height,
            self.images.len(),
            self.format,
            self.depth_format
        );

        Ok(SwapchainStatus::Ready)
    }

    /// Multisampled colour target matching the current extent
    pub fn create_color_texture(&mut self, device: &LogicalDevice) -> Result<()> {
        self.color_texture.destroy();
        self.color_texture = AttachmentTexture::create(
            device,
            AttachmentKind::Color,
            self.format,
            self.extent,
            self.samples,
        )?;
        Ok(())
    }

    /// Multisampled depth target matching the current extent
    pub fn create_depth_texture(&mut self, device: &LogicalDevice) -> Result<()> {
        self.depth_texture.destroy();
        self.depth_texture = AttachmentTexture::create(
            device,
            AttachmentKind::Depth,
            self.depth_format,
            self.extent,
            self.samples,
        )?;
        Ok(())
    }

    pub fn is_created(&self) -> bool {
        self.raw != vk::SwapchainKHR::null()
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    pub fn color_view(&self) -> vk::ImageView {
        self.color_texture.view()
    }

    pub fn depth_view(&self) -> vk::ImageView {
        self.depth_texture.view()
    }

    /// Index of the most recently acquired image
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Acquire the next image, signalling `semaphore` when it is usable
    pub fn acquire_next_image(&mut self, semaphore: vk::Semaphore) -> Result<SwapchainState> {
        let loader = self.loader.as_ref().context("Swapchain not created")?;

        let result = unsafe {
            loader.acquire_next_image(self.raw, u64::MAX, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, suboptimal)) => {
                self.image_index = index;
                Ok(if suboptimal {
                    SwapchainState::Suboptimal
                } else {
                    SwapchainState::Optimal
                })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainState::OutOfDate),
            Err(e) => Err(e).context("Failed to acquire swapchain image"),
        }
    }

    /// Present the acquired image once `wait_semaphores` are signalled
    pub fn present(
        &self,
        queue: vk::Queue,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<SwapchainState> {
        let loader = self.loader.as_ref().context("Swapchain not created")?;

        let swapchains = [self.raw];
        let image_indices = [self.image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(SwapchainState::Optimal),
            Ok(true) => Ok(SwapchainState::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainState::OutOfDate),
            Err(e) => Err(e).context("Failed to present swapchain image"),
        }
    }

    /// Release textures, views and the chain. Safe to call more than once.
    /// The device must be idle.
    pub fn destroy(&mut self) {
        self.color_texture.destroy();
        self.depth_texture.destroy();

        let Some(device) = self.device.as_ref() else {
            return;
        };

        unsafe {
            for view in self.image_views.drain(..) {
                device.destroy_image_view(view, None);
            }
            if let Some(loader) = self.loader.as_ref() {
                if self.raw != vk::SwapchainKHR::null() {
                    loader.destroy_swapchain(self.raw, None);
                }
            }
        }

        self.raw = vk::SwapchainKHR::null();
        self.images.clear();
        self.extent = vk::Extent2D::default();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}
