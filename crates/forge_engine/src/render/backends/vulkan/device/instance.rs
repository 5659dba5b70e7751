//! Vulkan instance creation and validation messaging

use std::ffi::{c_char, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};

use crate::platform::Platform;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

const VALIDATION_LAYER: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

/// Engine name reported to the driver
pub const ENGINE_NAME: &str = "Forge Engine";

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug_utils: Option<DebugUtils>,
    debug_messenger: vk::DebugUtilsMessengerEXT,
}

impl VulkanInstance {
    /// Create a Vulkan 1.2 instance with the extensions the platform requires
    ///
    /// Validation is only wired up in debug builds and only when the Khronos
    /// validation layer is installed; otherwise a warning is logged and the
    /// instance is created without it.
    pub fn new(platform: &dyn Platform, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed("Application name contains a nul byte".to_string()))?;
        let engine_name_cstr = CString::new(ENGINE_NAME)
            .map_err(|_| VulkanError::InitializationFailed("Engine name contains a nul byte".to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let required_extensions = platform.required_instance_extensions();
        let cstr_extensions = required_extensions
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VulkanError::InitializationFailed("Invalid instance extension name".to_string()))?;
        let mut extensions: Vec<*const c_char> = cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();

        let use_validation = cfg!(debug_assertions) && enable_validation && validation_layer_available(&entry);
        if cfg!(debug_assertions) && enable_validation && !use_validation {
            log::warn!("Validation requested but {:?} is not available", VALIDATION_LAYER);
        }

        let mut layer_names: Vec<*const c_char> = Vec::new();
        if use_validation {
            extensions.push(DebugUtils::name().as_ptr());
            layer_names.push(VALIDATION_LAYER.as_ptr());
            log::info!("Validation layers enabled");
        }

        for name in &required_extensions {
            log::debug!("Instance extension: {name}");
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe {
            entry.create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        log::info!("Vulkan instance created");

        let mut vulkan_instance = Self {
            entry,
            instance,
            debug_utils: None,
            debug_messenger: vk::DebugUtilsMessengerEXT::null(),
        };

        if use_validation {
            let debug_utils = DebugUtils::new(&vulkan_instance.entry, &vulkan_instance.instance);
            vulkan_instance.debug_messenger = setup_debug_messenger(&debug_utils)?;
            vulkan_instance.debug_utils = Some(debug_utils);
        }

        Ok(vulkan_instance)
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug_utils) = &self.debug_utils {
                debug_utils.destroy_debug_utils_messenger(self.debug_messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn validation_layer_available(entry: &Entry) -> bool {
    let Ok(layers) = entry.enumerate_instance_layer_properties() else {
        return false;
    };
    layers.iter().any(|layer| {
        let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        name == VALIDATION_LAYER
    })
}

fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
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

    unsafe {
        debug_utils.create_debug_utils_messenger(&create_info, None)
            .map_err(VulkanError::Api)
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}
