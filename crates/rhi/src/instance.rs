//! Vulkan instance management.
//!
//! The [`Instance`] owns the loader entry and the `VkInstance`. Validation
//! layers are enabled here, but the messenger that reports their output
//! lives in [`crate::debug`] so that it can be released independently.
//!
//! # Example
//!
//! ```no_run
//! use framepace_rhi::instance::{Instance, InstanceDesc};
//!
//! let desc = InstanceDesc {
//!     application_name: "Hello Vulkan".to_string(),
//!     enable_validation: cfg!(debug_assertions),
//!     extensions: Vec::new(),
//! };
//! let instance = Instance::new(&desc).expect("Failed to create Vulkan instance");
//! let _vk_instance = instance.handle();
//! ```

use std::ffi::{CStr, CString, c_char};

use ash::{Entry, vk};
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};

/// Validation layers in order of preference.
const VALIDATION_LAYER_CANDIDATES: &[&CStr] = &[
    c"VK_LAYER_KHRONOS_validation",
    c"VK_LAYER_LUNARG_standard_validation",
];

/// Parameters for instance creation.
#[derive(Debug, Clone)]
pub struct InstanceDesc {
    /// Application name reported to the driver.
    pub application_name: String,
    /// Request validation layers and the debug utils extension.
    pub enable_validation: bool,
    /// Surface extensions required by the windowing system.
    pub extensions: Vec<*const c_char>,
}

/// Vulkan instance wrapper.
pub struct Instance {
    /// Vulkan entry point loader
    entry: Entry,
    /// Vulkan instance handle
    instance: ash::Instance,
    /// Name of the enabled validation layer, if any
    validation_layer: Option<&'static CStr>,
}

impl Instance {
    /// Creates a new Vulkan instance (API 1.0).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Vulkan library cannot be loaded
    /// - Required extensions are not available
    /// - Instance creation fails
    pub fn new(desc: &InstanceDesc) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let validation_layer = if desc.enable_validation {
            let found = find_validation_layer(&entry)?;
            if found.is_none() {
                warn!("Validation layer requested but not available, proceeding without it");
            }
            found
        } else {
            None
        };

        let application_name = CString::new(desc.application_name.as_str()).map_err(|e| {
            RhiError::InvalidHandle(format!("Invalid application name: {}", e))
        })?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&application_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"No Engine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let mut extensions = desc.extensions.clone();
        if validation_layer.is_some() {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers: Vec<*const c_char> = validation_layer
            .iter()
            .map(|layer| layer.as_ptr())
            .collect();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        match validation_layer {
            Some(layer) => info!(
                "Vulkan instance created with {} extension(s), validation layer {:?}",
                extensions.len(),
                layer
            ),
            None => info!(
                "Vulkan instance created with {} extension(s)",
                extensions.len()
            ),
        }

        Ok(Self {
            entry,
            instance,
            validation_layer,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether a validation layer is enabled.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.validation_layer.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Returns the first available validation layer from the candidate list.
fn find_validation_layer(entry: &Entry) -> RhiResult<Option<&'static CStr>> {
    let available = unsafe { entry.enumerate_instance_layer_properties()? };
    let names: Vec<&CStr> = available
        .iter()
        .filter_map(|layer| layer.layer_name_as_c_str().ok())
        .collect();

    let found = pick_validation_layer(&names);
    if let Some(layer) = found {
        debug!("Using validation layer {:?}", layer);
    }
    Ok(found)
}

fn pick_validation_layer(available: &[&CStr]) -> Option<&'static CStr> {
    VALIDATION_LAYER_CANDIDATES
        .iter()
        .copied()
        .find(|candidate| available.contains(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_khronos_layer() {
        let available = [
            c"VK_LAYER_LUNARG_standard_validation",
            c"VK_LAYER_KHRONOS_validation",
        ];
        assert_eq!(
            pick_validation_layer(&available),
            Some(c"VK_LAYER_KHRONOS_validation")
        );
    }

    #[test]
    fn test_falls_back_to_legacy_layer() {
        let available = [c"VK_LAYER_MESA_overlay", c"VK_LAYER_LUNARG_standard_validation"];
        assert_eq!(
            pick_validation_layer(&available),
            Some(c"VK_LAYER_LUNARG_standard_validation")
        );
    }

    #[test]
    fn test_no_validation_layer() {
        assert_eq!(pick_validation_layer(&[c"VK_LAYER_MESA_overlay"]), None);
    }

    #[test]
    fn test_instance_creation_without_validation() {
        // Requires a Vulkan loader; skipped otherwise
        let desc = InstanceDesc {
            application_name: "framepace-test".to_string(),
            enable_validation: false,
            extensions: Vec::new(),
        };
        match Instance::new(&desc) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::LoadingError(_)) | Err(RhiError::VulkanError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }
}
