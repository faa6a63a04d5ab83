//! Physical device (GPU) selection.
//!
//! A device qualifies when it has a graphics queue family, a family that can
//! present to the target surface, the swapchain extension, and at least one
//! surface format and present mode. A single family that does both is
//! preferred so the swapchain images never change queue-family ownership.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::swapchain::SwapchainSupportDetails;

/// Device extensions every candidate must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Queue family indices used by the presenter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Index of the queue family that supports presentation to a surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Checks if both graphics and present families were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns `(graphics, present)` or an error if either is missing.
    pub fn resolved(&self) -> RhiResult<(u32, u32)> {
        match (self.graphics_family, self.present_family) {
            (Some(graphics), Some(present)) => Ok((graphics, present)),
            _ => Err(RhiError::InvalidHandle(format!(
                "incomplete queue families: {:?}",
                self
            ))),
        }
    }

    /// True when one family serves both graphics and presentation.
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.is_complete() && self.graphics_family == self.present_family
    }

    /// Returns the unique queue family indices.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }

        families
    }
}

/// Information about the selected physical device.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Queue family indices for graphics and presentation.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the most suitable physical device for presenting to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no device qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut best: Option<(PhysicalDeviceInfo, u32)> = None;
    for device in devices {
        let Some(info) = check_device_suitability(instance, device, surface, surface_loader)?
        else {
            continue;
        };
        let score = rate_device(&info);
        debug!(
            "GPU '{}' ({}) - Score: {}",
            info.device_name(),
            info.device_type_name(),
            score
        );
        // Ties keep the earlier device.
        if best.as_ref().is_none_or(|(_, best_score)| score > *best_score) {
            best = Some((info, score));
        }
    }

    let (selected, score) = best.ok_or_else(|| {
        warn!("No suitable GPU found with required capabilities");
        RhiError::NoSuitableGpu
    })?;

    info!(
        "Selected GPU: '{}' ({}), queue families {:?}, score {}",
        selected.device_name(),
        selected.device_type_name(),
        selected.queue_families,
        score
    );

    Ok(selected)
}

/// Returns `Some` if the device meets every requirement.
fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<Option<PhysicalDeviceInfo>> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let name = properties
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "Unknown".to_string());

    let family_properties = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let families: Vec<(vk::QueueFlags, u32)> = family_properties
        .iter()
        .map(|family| (family.queue_flags, family.queue_count))
        .collect();

    let queue_families = pick_queue_families(&families, |index| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, index, surface)
            .unwrap_or(false)
    });

    if !queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: missing queue families (graphics={}, present={})",
            name,
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some()
        );
        return Ok(None);
    }

    let extensions = unsafe { instance.enumerate_device_extension_properties(device)? };
    let extension_names: Vec<&CStr> = extensions
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .collect();
    if let Some(missing) = REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .find(|required| !extension_names.contains(required))
    {
        debug!("GPU '{}' skipped: missing extension {:?}", name, missing);
        return Ok(None);
    }

    let support = SwapchainSupportDetails::query(device, surface, surface_loader)?;
    if !support.is_adequate() {
        debug!("GPU '{}' skipped: inadequate swapchain support", name);
        return Ok(None);
    }

    Ok(Some(PhysicalDeviceInfo {
        device,
        properties,
        queue_families,
    }))
}

/// Chooses graphics and present families from `(flags, queue_count)` pairs.
///
/// A family that supports both wins; otherwise the first graphics family and
/// the first present-capable family are used.
pub fn pick_queue_families(
    families: &[(vk::QueueFlags, u32)],
    supports_present: impl Fn(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, &(flags, count)) in families.iter().enumerate() {
        let i = i as u32;
        if count == 0 {
            continue;
        }

        let graphics = flags.contains(vk::QueueFlags::GRAPHICS);
        let present = supports_present(i);

        if graphics && present {
            return QueueFamilyIndices {
                graphics_family: Some(i),
                present_family: Some(i),
            };
        }
        if graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(i);
        }
        if present && indices.present_family.is_none() {
            indices.present_family = Some(i);
        }
    }

    indices
}

/// Higher scores indicate more desirable devices.
fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    // No ownership transfers needed
    if info.queue_families.is_shared() {
        score += 500;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPHICS: vk::QueueFlags = vk::QueueFlags::GRAPHICS;
    const TRANSFER: vk::QueueFlags = vk::QueueFlags::TRANSFER;

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(indices.graphics_family.is_none());
        assert!(indices.present_family.is_none());
        assert!(!indices.is_complete());
        assert!(indices.resolved().is_err());
    }

    #[test]
    fn test_unique_families_shared() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert!(indices.is_shared());
        assert_eq!(indices.unique_families(), vec![0]);
        assert_eq!(indices.resolved().unwrap(), (0, 0));
    }

    #[test]
    fn test_unique_families_split() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert!(!indices.is_shared());
        assert_eq!(indices.unique_families(), vec![0, 2]);
    }

    #[test]
    fn test_pick_prefers_shared_family() {
        // Family 0: graphics only, family 1: present only, family 2: both
        let families = [(GRAPHICS, 1), (TRANSFER, 1), (GRAPHICS | TRANSFER, 1)];
        let indices = pick_queue_families(&families, |i| i == 1 || i == 2);
        assert_eq!(indices.graphics_family, Some(2));
        assert_eq!(indices.present_family, Some(2));
    }

    #[test]
    fn test_pick_falls_back_to_split_families() {
        let families = [(GRAPHICS, 1), (TRANSFER, 1)];
        let indices = pick_queue_families(&families, |i| i == 1);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(1));
        assert!(indices.is_complete());
        assert!(!indices.is_shared());
    }

    #[test]
    fn test_pick_skips_empty_families() {
        let families = [(GRAPHICS, 0), (GRAPHICS, 2)];
        let indices = pick_queue_families(&families, |_| true);
        assert_eq!(indices.graphics_family, Some(1));
    }

    #[test]
    fn test_pick_incomplete_without_present() {
        let families = [(GRAPHICS, 1)];
        let indices = pick_queue_families(&families, |_| false);
        assert!(!indices.is_complete());
    }
}
