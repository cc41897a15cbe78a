// Physical adapter - GPU selection
//
// A device is accepted when:
// - some queue family can submit graphics work and some (possibly other)
//   family can present to the bound surface
// - it exposes every required device extension
// - the surface reports at least one format and one present mode
// The first device that passes wins.
//
// Queue families and swapchain support are recomputed on every call:
// surface capabilities change between calls (e.g. after a resize).

use super::Instance;
use anyhow::{Context, Result};
use ash::vk;
use std::ffi::CStr;

/// Device extensions every adapter must support
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Queue family indices for the two roles the renderer needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Search `families`, asking `supports_present` for each index.
    ///
    /// A family that does both is preferred for presentation so the common
    /// case needs a single queue.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> bool,
    ) -> Self {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            if family.queue_count == 0 {
                continue;
            }

            let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let present = supports_present(index);

            if graphics && indices.graphics.is_none() {
                indices.graphics = Some(index);
            }
            if present && (indices.present.is_none() || (graphics && indices.graphics == Some(index))) {
                indices.present = Some(index);
            }
        }

        indices
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct family indices, one queue to create per entry
    pub fn unique(&self) -> Vec<u32> {
        let mut families: Vec<u32> = self.graphics.iter().chain(self.present.iter()).copied().collect();
        families.sort_unstable();
        families.dedup();
        families
    }
}

/// Surface capabilities, formats and present modes for one adapter
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(instance: &Instance, device: vk::PhysicalDevice) -> Result<Self> {
        let loader = instance.surface_loader();
        let surface = instance.surface();

        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(device, surface)
                    .context("Failed to query surface capabilities")?,
                formats: loader
                    .get_physical_device_surface_formats(device, surface)
                    .context("Failed to query surface formats")?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(device, surface)
                    .context("Failed to query present modes")?,
            })
        }
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// True when every `required` extension is in `available`
pub fn supports_extensions(available: &[&CStr], required: &[&CStr]) -> bool {
    required.iter().all(|ext| available.contains(ext))
}

/// The selected GPU
pub struct PhysicalAdapter {
    raw: vk::PhysicalDevice,
    name: String,
    extensions: &'static [&'static CStr],
}

impl PhysicalAdapter {
    /// Pick the first device that satisfies the filter described above
    pub fn select(instance: &Instance) -> Result<Self> {
        let devices = unsafe { instance.raw().enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        for device in devices {
            let name = Self::device_name(instance, device);

            if !Self::is_suitable(instance, device)? {
                log::debug!("Skipping unsuitable GPU: {}", name);
                continue;
            }

            log::info!("Selected GPU: {}", name);
            return Ok(Self {
                raw: device,
                name,
                extensions: REQUIRED_DEVICE_EXTENSIONS,
            });
        }

        anyhow::bail!("No suitable device")
    }

    fn device_name(instance: &Instance, device: vk::PhysicalDevice) -> String {
        let properties = unsafe { instance.raw().get_physical_device_properties(device) };
        properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "<unnamed>".to_string())
    }

    fn is_suitable(instance: &Instance, device: vk::PhysicalDevice) -> Result<bool> {
        if !Self::queue_families_of(instance, device)?.is_complete() {
            return Ok(false);
        }

        let properties = unsafe { instance.raw().enumerate_device_extension_properties(device) }
            .context("Failed to enumerate device extensions")?;
        let available: Vec<&CStr> = properties
            .iter()
            .filter_map(|p| p.extension_name_as_c_str().ok())
            .collect();
        if !supports_extensions(&available, REQUIRED_DEVICE_EXTENSIONS) {
            return Ok(false);
        }

        Ok(SwapchainSupport::query(instance, device)?.is_adequate())
    }

    fn queue_families_of(instance: &Instance, device: vk::PhysicalDevice) -> Result<QueueFamilyIndices> {
        let families =
            unsafe { instance.raw().get_physical_device_queue_family_properties(device) };

        let present = (0..families.len() as u32)
            .map(|index| unsafe {
                instance.surface_loader().get_physical_device_surface_support(
                    device,
                    index,
                    instance.surface(),
                )
            })
            .collect::<Result<Vec<bool>, _>>()
            .context("Failed to query present support")?;

        Ok(QueueFamilyIndices::find(&families, |index| present[index as usize]))
    }

    /// Recomputed on every call
    pub fn find_queue_families(&self, instance: &Instance) -> Result<QueueFamilyIndices> {
        Self::queue_families_of(instance, self.raw)
    }

    /// Recomputed on every call
    pub fn query_swapchain_support(&self, instance: &Instance) -> Result<SwapchainSupport> {
        SwapchainSupport::query(instance, self.raw)
    }

    pub fn raw(&self) -> vk::PhysicalDevice {
        self.raw
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn required_extensions(&self) -> &[&'static CStr] {
        self.extensions
    }
}
