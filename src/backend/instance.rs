// Instance - API context and presentation surface
//
// Responsibilities:
// - Load the Vulkan library and create the instance
// - Resolve a validation layer set and route its messages into `log`
// - Bind the platform window to a `vk::SurfaceKHR`
//
// Teardown order is the reverse of creation: surface, messenger, instance.

use anyhow::{Context, Result};
use ash::{ext::debug_utils, khr::surface, vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use std::ffi::{c_char, CStr, CString};

/// Validation layer sets in priority order; the first fully available set wins
pub const VALIDATION_CANDIDATES: &[&[&CStr]] = &[
    &[c"VK_LAYER_KHRONOS_validation"],
    &[c"VK_LAYER_LUNARG_standard_validation"],
    &[
        c"VK_LAYER_GOOGLE_threading",
        c"VK_LAYER_LUNARG_parameter_validation",
        c"VK_LAYER_LUNARG_object_tracker",
        c"VK_LAYER_LUNARG_core_validation",
        c"VK_LAYER_GOOGLE_unique_objects",
    ],
];

/// Pick the first candidate set whose layers are all present in `available`
pub fn resolve_validation_layers<'a>(
    candidates: &[&'a [&'a CStr]],
    available: &[&CStr],
) -> Option<&'a [&'a CStr]> {
    candidates
        .iter()
        .copied()
        .find(|set| set.iter().all(|layer| available.contains(layer)))
}

pub struct Instance {
    raw: ash::Instance,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    debug_utils: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    validation_layers: Vec<CString>,
    destroyed: bool,
    // Keeps the loaded library alive; must outlive `raw`
    entry: Entry,
}

impl Instance {
    /// Create the API context.
    ///
    /// `display` selects the platform surface extensions; pass `None` for a
    /// headless instance that can never present.
    pub fn create(
        app_name: &str,
        enable_validation: bool,
        display: Option<RawDisplayHandle>,
    ) -> Result<Self> {
        log::info!("Creating Vulkan instance: {}", app_name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let validation_layers = if enable_validation {
            Self::find_validation_layers(&entry)?
        } else {
            Vec::new()
        };

        let app_name_cstr = CString::new(app_name)?;
        let engine_name = c"Scene Renderer";

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        let mut extensions: Vec<*const c_char> = match display {
            Some(display) => ash_window::enumerate_required_extensions(display)
                .context("Failed to query surface extensions")?
                .to_vec(),
            None => Vec::new(),
        };
        if enable_validation {
            extensions.push(debug_utils::NAME.as_ptr());
        }

        let layer_ptrs: Vec<*const c_char> =
            validation_layers.iter().map(|layer| layer.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_ptrs);

        let raw = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        let debug_utils = if enable_validation {
            match Self::setup_debug_messenger(&entry, &raw) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { raw.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        let surface_loader = surface::Instance::new(&entry, &raw);

        Ok(Self {
            raw,
            surface_loader,
            surface: vk::SurfaceKHR::null(),
            debug_utils,
            validation_layers,
            destroyed: false,
            entry,
        })
    }

    fn find_validation_layers(entry: &Entry) -> Result<Vec<CString>> {
        let properties = unsafe { entry.enumerate_instance_layer_properties() }
            .context("Failed to enumerate instance layers")?;

        let available: Vec<&CStr> = properties
            .iter()
            .filter_map(|p| p.layer_name_as_c_str().ok())
            .collect();

        let set = resolve_validation_layers(VALIDATION_CANDIDATES, &available).context(
            "Validation layers requested, but no candidate layer set is available",
        )?;

        for layer in set {
            log::info!("Enabling validation layer {}", layer.to_string_lossy());
        }

        Ok(set.iter().map(|&layer| layer.to_owned()).collect())
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = debug_utils::Instance::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }

    /// Bind the platform window to a presentation surface.
    ///
    /// Must run before adapter selection: the adapter filter checks present
    /// support against this surface.
    pub fn create_surface<W>(&mut self, window: &W) -> Result<()>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let window_handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();

        if self.surface != vk::SurfaceKHR::null() {
            unsafe { self.surface_loader.destroy_surface(self.surface, None) };
        }

        self.surface = unsafe {
            ash_window::create_surface(&self.entry, &self.raw, display_handle, window_handle, None)
        }
        .context("Failed to create window surface")?;

        Ok(())
    }

    pub fn raw(&self) -> &ash::Instance {
        &self.raw
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn surface_loader(&self) -> &surface::Instance {
        &self.surface_loader
    }

    pub fn validation_layers(&self) -> &[CString] {
        &self.validation_layers
    }

    pub fn validation_enabled(&self) -> bool {
        !self.validation_layers.is_empty()
    }

    /// Release the surface, then the context. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        log::info!("Destroying Vulkan instance...");

        unsafe {
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
                self.surface = vk::SurfaceKHR::null();
            }

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.raw.destroy_instance(None);
        }

        self.destroyed = true;
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.destroy();
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
