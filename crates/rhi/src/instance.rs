//! The Vulkan instance and optional Khronos validation.
//!
//! Validation is best effort: when it is requested but the layer is not
//! installed, the instance is created without it and a warning is logged.
//! Validation messages are forwarded to `tracing` under the
//! `framepace::vulkan` target.

use std::borrow::Cow;
use std::ffi::{CStr, CString, c_char, c_void};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Debug-utils loader and the messenger registered with it.
struct Validation {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

/// Owns the loader entry and the `VkInstance`.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    validation: Option<Validation>,
}

impl Instance {
    /// Loads Vulkan and creates an instance.
    ///
    /// `surface_extensions` are the instance extensions the target display
    /// needs; the debug-utils extension is added when validation is active.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::LoadingError`] if no Vulkan loader is installed,
    /// [`RhiError::InvalidHandle`] if `app_name` contains a NUL byte, or the
    /// Vulkan error from instance or messenger creation.
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        surface_extensions: &[*const c_char],
    ) -> RhiResult<Self> {
        let app_name = CString::new(app_name)
            .map_err(|e| RhiError::InvalidHandle(format!("application name: {}", e)))?;

        // SAFETY: `entry` outlives every object created through it.
        let entry = unsafe { Entry::load()? };

        let validate = enable_validation && layer_available(&entry)?;
        if enable_validation && !validate {
            warn!("{:?} is not installed; continuing without validation", VALIDATION_LAYER);
        }

        let version = vk::make_api_version(0, 0, 1, 0);
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(version)
            .engine_name(c"framepace")
            .engine_version(version)
            .api_version(vk::API_VERSION_1_0);

        let extensions = enabled_extensions(surface_extensions, validate);
        let layers: Vec<*const c_char> = if validate {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        // Also receives messages from vkCreateInstance and vkDestroyInstance
        let mut creation_messenger = messenger_info();
        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        if validate {
            create_info = create_info.push_next(&mut creation_messenger);
        }

        // SAFETY: every pointer in create_info outlives this call.
        let instance = unsafe { entry.create_instance(&create_info, None)? };
        info!(
            "Vulkan instance created with {} extension(s), validation {}",
            extensions.len(),
            if validate { "on" } else { "off" }
        );

        let validation = if validate {
            match Validation::register(&entry, &instance) {
                Ok(validation) => Some(validation),
                Err(e) => {
                    // SAFETY: nothing has been created from the instance yet.
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            validation,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Whether validation messages are being forwarded.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.validation.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        // SAFETY: surfaces and devices created from the instance are gone.
        unsafe {
            if let Some(validation) = self.validation.take() {
                validation
                    .loader
                    .destroy_debug_utils_messenger(validation.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

impl Validation {
    fn register(entry: &Entry, instance: &ash::Instance) -> RhiResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        // SAFETY: the callback is a plain function and lives forever.
        let messenger = unsafe { loader.create_debug_utils_messenger(&messenger_info(), None)? };
        debug!("Validation messenger registered");
        Ok(Self { loader, messenger })
    }
}

fn layer_available(entry: &Entry) -> RhiResult<bool> {
    // SAFETY: plain enumeration call on a loaded entry.
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER)))
}

/// Surface extensions plus debug utils when validating.
fn enabled_extensions(surface_extensions: &[*const c_char], validate: bool) -> Vec<*const c_char> {
    let mut extensions = surface_extensions.to_vec();
    if validate {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    extensions
}

/// Warnings and errors of every message type.
fn messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(forward_message))
}

fn message_kind(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

/// # Safety
///
/// Called by the loader; `callback_data` is null or valid for the call.
unsafe extern "system" fn forward_message(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    // SAFETY: see the function contract.
    let message = match unsafe { callback_data.as_ref() } {
        Some(data) if !data.p_message.is_null() => {
            // SAFETY: the loader passes a NUL-terminated string.
            unsafe { CStr::from_ptr(data.p_message) }.to_string_lossy()
        }
        _ => Cow::Borrowed("<empty message>"),
    };
    let kind = message_kind(message_type);

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "framepace::vulkan", "{}: {}", kind, message);
    } else {
        warn!(target: "framepace::vulkan", "{}: {}", kind, message);
    }
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vulkan_unavailable(e: &RhiError) -> bool {
        matches!(
            e,
            RhiError::LoadingError(_)
                | RhiError::VulkanError(
                    vk::Result::ERROR_INCOMPATIBLE_DRIVER | vk::Result::ERROR_INITIALIZATION_FAILED
                )
        )
    }

    #[test]
    fn test_debug_utils_only_when_validating() {
        let surface = [ash::khr::surface::NAME.as_ptr()];
        assert_eq!(enabled_extensions(&surface, false), surface.to_vec());

        let validating = enabled_extensions(&surface, true);
        assert_eq!(validating.len(), 2);
        assert_eq!(validating[1], ash::ext::debug_utils::NAME.as_ptr());
    }

    #[test]
    fn test_message_kind() {
        assert_eq!(
            message_kind(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION),
            "validation"
        );
        assert_eq!(
            message_kind(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE),
            "performance"
        );
        assert_eq!(message_kind(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL), "general");
    }

    #[test]
    fn test_instance_without_validation() {
        match Instance::new("framepace-test", false, &[]) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(e) if vulkan_unavailable(&e) => eprintln!("Skipping: no Vulkan ({})", e),
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_rejects_interior_nul_in_name() {
        let err = Instance::new("bad\0name", false, &[]).err();
        assert!(matches!(err, Some(RhiError::InvalidHandle(msg)) if msg.contains("application name")));
    }
}
