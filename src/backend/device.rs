// Logical device - queues, MSAA level, memory and format queries
//
// Responsibilities:
// - Logical device + one queue per distinct family (graphics, present)
// - Negotiate the highest sample count shared by colour and depth targets
// - Memory type / depth format lookups (soft failures: `Option`)
// - Memory allocator for device-local attachments

use super::adapter::QueueFamilyIndices;
use super::{Instance, PhysicalAdapter};
use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;
use std::ffi::c_char;
use std::sync::Arc;

/// Depth formats from highest to lowest precision
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 5] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM_S8_UINT,
    vk::Format::D16_UNORM,
];

const SAMPLE_COUNTS_DESCENDING: [vk::SampleCountFlags; 6] = [
    vk::SampleCountFlags::TYPE_64,
    vk::SampleCountFlags::TYPE_32,
    vk::SampleCountFlags::TYPE_16,
    vk::SampleCountFlags::TYPE_8,
    vk::SampleCountFlags::TYPE_4,
    vk::SampleCountFlags::TYPE_2,
];

/// Highest single sample count contained in `supported`, else one sample
pub fn max_usable_sample_count(supported: vk::SampleCountFlags) -> vk::SampleCountFlags {
    SAMPLE_COUNTS_DESCENDING
        .into_iter()
        .find(|&count| supported.contains(count))
        .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// First memory type allowed by `type_bits` whose flags include `required`
pub fn find_memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    required: vk::MemoryPropertyFlags,
    type_bits: u32,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&index| {
        let allowed = type_bits & (1 << index) != 0;
        allowed
            && memory_properties.memory_types[index as usize]
                .property_flags
                .contains(required)
    })
}

/// First candidate usable as an optimal-tiling depth/stencil attachment
pub fn select_depth_format(
    mut format_properties: impl FnMut(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
    DEPTH_FORMAT_CANDIDATES.into_iter().find(|&format| {
        format_properties(format)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

/// Logical device wrapper; every other GPU object borrows from it
pub struct LogicalDevice {
    raw: ash::Device,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,

    graphics_queue: vk::Queue,
    graphics_family: u32,
    present_queue: vk::Queue,
    present_family: u32,

    max_samples: vk::SampleCountFlags,
    memory_properties: vk::PhysicalDeviceMemoryProperties,

    allocator: Option<Arc<Mutex<Allocator>>>,
    destroyed: bool,
}

impl LogicalDevice {
    pub fn create(instance: &Instance, adapter: &PhysicalAdapter) -> Result<Self> {
        let families = adapter.find_queue_families(instance)?;
        let (graphics_family, present_family) = match families {
            QueueFamilyIndices {
                graphics: Some(graphics),
                present: Some(present),
            } => (graphics, present),
            _ => anyhow::bail!("Selected GPU lost its graphics/present queue families"),
        };

        let queue_priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let extensions: Vec<*const c_char> = adapter
            .required_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();
        let layers: Vec<*const c_char> = instance
            .validation_layers()
            .iter()
            .map(|layer| layer.as_ptr())
            .collect();

        let supported = unsafe { instance.raw().get_physical_device_features(adapter.raw()) };
        let features = vk::PhysicalDeviceFeatures::default()
            .fill_mode_non_solid(supported.fill_mode_non_solid == vk::TRUE);

        // Device layers are ignored by modern loaders but required by old ones
        #[allow(deprecated)]
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers)
            .enabled_features(&features);

        let raw = unsafe { instance.raw().create_device(adapter.raw(), &create_info, None) }
            .context("Failed to create logical device")?;

        let graphics_queue = unsafe { raw.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { raw.get_device_queue(present_family, 0) };

        let properties = unsafe { instance.raw().get_physical_device_properties(adapter.raw()) };
        let max_samples = max_usable_sample_count(
            properties.limits.framebuffer_color_sample_counts
                & properties.limits.framebuffer_depth_sample_counts,
        );
        let memory_properties =
            unsafe { instance.raw().get_physical_device_memory_properties(adapter.raw()) };

        log::info!(
            "Logical device ready (graphics family {}, present family {}, MSAA {:?})",
            graphics_family,
            present_family,
            max_samples
        );

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.raw().clone(),
            device: raw.clone(),
            physical_device: adapter.raw(),
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .context("Failed to create memory allocator")?;

        Ok(Self {
            raw,
            instance: instance.raw().clone(),
            physical_device: adapter.raw(),
            graphics_queue,
            graphics_family,
            present_queue,
            present_family,
            max_samples,
            memory_properties,
            allocator: Some(Arc::new(Mutex::new(allocator))),
            destroyed: false,
        })
    }

    pub fn raw(&self) -> &ash::Device {
        &self.raw
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn present_family(&self) -> u32 {
        self.present_family
    }

    /// Sample count used by every multisampled render target
    pub fn max_sample_count(&self) -> vk::SampleCountFlags {
        self.max_samples
    }

    /// `None` when no memory type fits; the caller decides whether that is fatal
    pub fn find_memory_type_index(
        &self,
        required: vk::MemoryPropertyFlags,
        type_bits: u32,
    ) -> Option<u32> {
        find_memory_type_index(&self.memory_properties, required, type_bits)
    }

    /// `None` when no candidate supports depth/stencil attachments
    pub fn supported_depth_format(&self) -> Option<vk::Format> {
        select_depth_format(|format| unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        })
    }

    pub fn allocator(&self) -> Result<Arc<Mutex<Allocator>>> {
        self.allocator
            .clone()
            .context("Memory allocator already destroyed")
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.raw.device_wait_idle() }.context("Failed to wait for device idle")
    }

    /// Release the allocator, then the device. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        log::info!("Destroying logical device...");
        if let Err(e) = self.wait_idle() {
            log::warn!("Device did not go idle before destruction: {:#}", e);
        }

        if let Some(allocator) = self.allocator.take() {
            if Arc::strong_count(&allocator) > 1 {
                log::warn!("Memory allocator still shared while destroying the device");
            }
        }

        unsafe { self.raw.destroy_device(None) };
        self.destroyed = true;
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        self.destroy();
    }
}
