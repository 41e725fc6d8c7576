//! GPU selection for a presentation surface.
//!
//! A GPU qualifies when it has a queue family that can render, a queue
//! family that can present to the surface, the swapchain extension, and a
//! surface report with at least one format and one present mode. Among the
//! qualifying GPUs the best device type wins; ties go to enumeration order.
//!
//! # Example
//!
//! ```no_run
//! use framepace_rhi::instance::Instance;
//! use framepace_rhi::physical_device::select_physical_device;
//! use framepace_rhi::swapchain::SurfaceContext;
//!
//! # fn example(instance: &Instance, surface: &SurfaceContext) -> Result<(), framepace_rhi::RhiError> {
//! let gpu = select_physical_device(instance.handle(), surface)?;
//! println!("Rendering on {} ({})", gpu.device_name(), gpu.device_type_name());
//! # Ok(())
//! # }
//! ```

use ash::vk;
use tracing::{debug, info};

use crate::error::RhiError;
use crate::swapchain::{SurfaceContext, SurfaceSupport};

/// Queue family indices found while inspecting a device.
///
/// Either index may be missing on a device that cannot render or cannot
/// present to the surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Converts to [`QueueFamilies`] once both families are known.
    pub fn resolve(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics_family?,
            present: self.present_family?,
        })
    }
}

/// Graphics and present queue families of the selected device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    /// May equal `graphics`.
    pub present: u32,
}

impl QueueFamilies {
    /// Whether one family does both graphics and presentation.
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// The distinct families, graphics first. One queue is created per entry.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Capabilities of one queue family relevant to frame pacing.
#[derive(Clone, Copy, Debug, Default)]
pub struct FamilyCaps {
    pub queue_count: u32,
    pub graphics: bool,
    pub present: bool,
}

/// Picks graphics and present families from `families`, in family-index order.
///
/// The first family doing both wins outright. Otherwise the first graphics
/// family and the first present family are used. Families without queues
/// are skipped.
pub fn pick_queue_families(families: &[FamilyCaps]) -> QueueFamilyIndices {
    let usable = || {
        families
            .iter()
            .enumerate()
            .filter(|(_, caps)| caps.queue_count > 0)
            .map(|(index, caps)| (index as u32, caps))
    };

    if let Some((index, _)) = usable().find(|(_, caps)| caps.graphics && caps.present) {
        return QueueFamilyIndices {
            graphics_family: Some(index),
            present_family: Some(index),
        };
    }

    QueueFamilyIndices {
        graphics_family: usable().find(|(_, p)| p.graphics).map(|(i, _)| i),
        present_family: usable().find(|(_, p)| p.present).map(|(i, _)| i),
    }
}

/// A GPU that can render and present to the surface it was checked against.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub queue_families: QueueFamilies,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("unnamed device")
    }

    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "discrete",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "integrated",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "virtual",
            vk::PhysicalDeviceType::CPU => "software",
            _ => "other",
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

/// Preference order of device types; higher is better.
fn type_rank(device_type: vk::PhysicalDeviceType) -> u8 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

/// Selects the GPU to render to `surface` with.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU qualifies, or the Vulkan
/// error if enumeration fails.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: &SurfaceContext,
) -> Result<PhysicalDeviceInfo, RhiError> {
    // SAFETY: plain enumeration call on a live instance.
    let devices = unsafe { instance.enumerate_physical_devices()? };
    debug!("Checking {} GPU(s)", devices.len());

    let mut best: Option<PhysicalDeviceInfo> = None;
    for device in devices {
        let Some(candidate) = inspect(instance, device, surface) else {
            continue;
        };
        let better = best.as_ref().is_none_or(|current| {
            type_rank(candidate.properties.device_type) > type_rank(current.properties.device_type)
        });
        if better {
            best = Some(candidate);
        }
    }

    let selected = best.ok_or(RhiError::NoSuitableGpu)?;
    info!(
        "Selected GPU '{}' ({}), queue families {:?}",
        selected.device_name(),
        selected.device_type_name(),
        selected.queue_families
    );
    Ok(selected)
}

/// Returns the device's info if it qualifies for `surface`.
fn inspect(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: &SurfaceContext,
) -> Option<PhysicalDeviceInfo> {
    // SAFETY: `device` was enumerated from `instance`.
    let properties = unsafe { instance.get_physical_device_properties(device) };
    // SAFETY: as above.
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let caps: Vec<FamilyCaps> = families
        .iter()
        .enumerate()
        .map(|(index, family)| FamilyCaps {
            queue_count: family.queue_count,
            graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
            // SAFETY: `index` is a valid family index for `device`.
            present: unsafe {
                surface.loader.get_physical_device_surface_support(
                    device,
                    index as u32,
                    surface.surface,
                )
            }
            .unwrap_or(false),
        })
        .collect();

    let info = PhysicalDeviceInfo {
        device,
        properties,
        queue_families: pick_queue_families(&caps).resolve()?,
    };

    let rejection = if !has_swapchain_extension(instance, device) {
        Some("no VK_KHR_swapchain".to_string())
    } else {
        match SurfaceSupport::query(device, surface) {
            Ok(support) if support.can_present() => None,
            Ok(_) => Some("surface offers no format or present mode".to_string()),
            Err(e) => Some(format!("surface query failed: {}", e)),
        }
    };

    match rejection {
        Some(reason) => {
            debug!("Skipping GPU '{}': {}", info.device_name(), reason);
            None
        }
        None => Some(info),
    }
}

fn has_swapchain_extension(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    // SAFETY: `device` was enumerated from `instance`.
    unsafe { instance.enumerate_device_extension_properties(device) }
        .map(|extensions| {
            extensions.iter().any(|ext| {
                ext.extension_name_as_c_str()
                    .is_ok_and(|name| name == ash::khr::swapchain::NAME)
            })
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(graphics: bool, present: bool) -> FamilyCaps {
        FamilyCaps {
            queue_count: 1,
            graphics,
            present,
        }
    }

    #[test]
    fn test_combined_family_wins() {
        let caps = [family(true, false), family(false, true), family(true, true)];
        let families = pick_queue_families(&caps).resolve().unwrap();
        assert_eq!(families, QueueFamilies { graphics: 2, present: 2 });
        assert_eq!(families.unique(), vec![2]);
    }

    #[test]
    fn test_split_families() {
        let caps = [family(false, true), family(true, false)];
        let families = pick_queue_families(&caps).resolve().unwrap();
        assert_eq!(families, QueueFamilies { graphics: 1, present: 0 });
        assert!(!families.is_shared());
        assert_eq!(families.unique(), vec![1, 0]);
    }

    #[test]
    fn test_empty_families_are_skipped() {
        let caps = [
            FamilyCaps {
                queue_count: 0,
                graphics: true,
                present: true,
            },
            family(true, true),
        ];
        let indices = pick_queue_families(&caps);
        assert_eq!(indices.graphics_family, Some(1));
    }

    #[test]
    fn test_missing_present_does_not_resolve() {
        let indices = pick_queue_families(&[family(true, false)]);
        assert_eq!(indices.graphics_family, Some(0));
        assert!(indices.resolve().is_none());
        assert!(pick_queue_families(&[]).resolve().is_none());
    }

    #[test]
    fn test_discrete_preferred() {
        assert!(
            type_rank(vk::PhysicalDeviceType::DISCRETE_GPU)
                > type_rank(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(
            type_rank(vk::PhysicalDeviceType::CPU) > type_rank(vk::PhysicalDeviceType::OTHER)
        );
    }
}
