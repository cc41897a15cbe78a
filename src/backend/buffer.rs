// GPU memory - vertex buffers and render-target textures
//
// Vertex buffers: host-visible + coherent, written once per upload. Memory
// type lookup is a soft query on the device; a miss becomes fatal here.
// Attachment textures: device-local images from the shared allocator, used
// as the multisampled colour and depth targets of one swapchain generation.

use super::LogicalDevice;
use crate::resources::VertexData;
use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use std::sync::Arc;

/// Host-visible vertex buffer holding one surface's vertices
pub struct VertexBuffer {
    device: ash::Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    vertex_count: u32,
}

impl VertexBuffer {
    /// Create the buffer and copy `data` into it
    pub fn upload(device: &LogicalDevice, data: &VertexData) -> Result<Self> {
        if data.is_empty() {
            anyhow::bail!("Refusing to upload an empty vertex array");
        }

        let raw = device.raw();
        let size = data.bytes().len() as vk::DeviceSize;

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { raw.create_buffer(&buffer_info, None) }
            .context("Failed to create vertex buffer")?;

        let requirements = unsafe { raw.get_buffer_memory_requirements(buffer) };
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let Some(memory_type_index) =
            device.find_memory_type_index(host, requirements.memory_type_bits)
        else {
            unsafe { raw.destroy_buffer(buffer, None) };
            anyhow::bail!("No host-visible memory type for a {} byte vertex buffer", size);
        };

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = match unsafe { raw.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { raw.destroy_buffer(buffer, None) };
                return Err(e).context("Failed to allocate vertex buffer memory");
            }
        };

        let mut vertex_buffer = Self {
            device: raw.clone(),
            buffer,
            memory,
            size,
            vertex_count: data.vertex_count(),
        };
        // From here on, an early return frees both handles through Drop
        vertex_buffer.write(data.bytes())?;

        log::debug!(
            "Uploaded {} vertices ({} bytes)",
            vertex_buffer.vertex_count,
            size
        );
        Ok(vertex_buffer)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        unsafe {
            self.device
                .bind_buffer_memory(self.buffer, self.memory, 0)
                .context("Failed to bind vertex buffer memory")?;

            let ptr = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .context("Failed to map vertex buffer memory")? as *mut u8;
            ptr.copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    pub fn raw(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Safe to call more than once
    pub fn destroy(&mut self) {
        unsafe {
            if self.buffer != vk::Buffer::null() {
                self.device.destroy_buffer(self.buffer, None);
                self.buffer = vk::Buffer::null();
            }
            if self.memory != vk::DeviceMemory::null() {
                self.device.free_memory(self.memory, None);
                self.memory = vk::DeviceMemory::null();
            }
        }
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// What an attachment texture is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Color,
    Depth,
}

impl AttachmentKind {
    fn usage(self) -> vk::ImageUsageFlags {
        match self {
            // Multisampled targets are resolved, never sampled or stored
            AttachmentKind::Color => {
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
            }
            AttachmentKind::Depth => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        }
    }

    fn aspect(self, format: vk::Format) -> vk::ImageAspectFlags {
        match self {
            AttachmentKind::Color => vk::ImageAspectFlags::COLOR,
            AttachmentKind::Depth if has_stencil(format) => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            AttachmentKind::Depth => vk::ImageAspectFlags::DEPTH,
        }
    }
}

pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::S8_UINT
    )
}

/// Device-local image + view used as a render-pass attachment
#[derive(Default)]
pub struct AttachmentTexture {
    device: Option<ash::Device>,
    allocator: Option<Arc<Mutex<Allocator>>>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
}

impl AttachmentTexture {
    pub fn create(
        device: &LogicalDevice,
        kind: AttachmentKind,
        format: vk::Format,
        extent: vk::Extent2D,
        samples: vk::SampleCountFlags,
    ) -> Result<Self> {
        let raw = device.raw();
        let mut texture = Self {
            device: Some(raw.clone()),
            allocator: Some(device.allocator()?),
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            allocation: None,
        };

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(kind.usage())
            .samples(samples)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        texture.image = unsafe { raw.create_image(&image_info, None) }
            .with_context(|| format!("Failed to create {:?} attachment image", kind))?;

        let requirements = unsafe { raw.get_image_memory_requirements(texture.image) };
        let allocation = texture
            .allocator
            .as_ref()
            .context("Memory allocator missing")?
            .lock()
            .allocate(&AllocationCreateDesc {
                name: match kind {
                    AttachmentKind::Color => "msaa color attachment",
                    AttachmentKind::Depth => "depth attachment",
                },
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .with_context(|| format!("Failed to allocate {:?} attachment memory", kind))?;

        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        texture.allocation = Some(allocation);
        unsafe { raw.bind_image_memory(texture.image, memory, offset) }
            .context("Failed to bind attachment memory")?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(texture.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: kind.aspect(format),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        texture.view = unsafe { raw.create_image_view(&view_info, None) }
            .context("Failed to create attachment view")?;

        Ok(texture)
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// View, image, then memory. Safe to call more than once.
    pub fn destroy(&mut self) {
        let Some(device) = self.device.as_ref() else {
            return;
        };

        unsafe {
            if self.view != vk::ImageView::null() {
                device.destroy_image_view(self.view, None);
                self.view = vk::ImageView::null();
            }
            if self.image != vk::Image::null() {
                device.destroy_image(self.image, None);
                self.image = vk::Image::null();
            }
        }

        if let (Some(allocation), Some(allocator)) = (self.allocation.take(), self.allocator.as_ref()) {
            if let Err(e) = allocator.lock().free(allocation) {
                log::warn!("Failed to free attachment memory: {}", e);
            }
        }
        self.allocator = None;
    }
}

impl Drop for AttachmentTexture {
    fn drop(&mut self) {
        self.destroy();
    }
}
