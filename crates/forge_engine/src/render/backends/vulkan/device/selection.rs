//! Physical device selection
//!
//! Selection is pass/fail: the first device that meets every requirement is
//! used, there is no ranking across devices. The checks work on
//! [`PhysicalDeviceSnapshot`]s so they can be exercised without a GPU.

use ash::vk;
use thiserror::Error;

use super::{QueueFamilyIndices, SwapchainSupport};

/// Swapchain device extension name
pub const SWAPCHAIN_EXTENSION: &str = "VK_KHR_swapchain";

/// Enabled automatically when a device advertises it (MoltenVK and friends)
pub const PORTABILITY_SUBSET_EXTENSION: &str = "VK_KHR_portability_subset";

/// Hard requirements a physical device must satisfy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequirements {
    /// Needs a graphics-capable queue family
    pub graphics: bool,
    /// Needs a family that can present to the surface
    pub present: bool,
    /// Needs a compute-capable queue family
    pub compute: bool,
    /// Needs a transfer-capable queue family
    pub transfer: bool,
    /// Needs the sampler anisotropy feature
    pub sampler_anisotropy: bool,
    /// Only accept discrete GPUs
    pub discrete_gpu: bool,
    /// Device extensions that must be present
    pub extensions: Vec<String>,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self {
            graphics: true,
            present: true,
            compute: false,
            transfer: true,
            sampler_anisotropy: true,
            discrete_gpu: false,
            extensions: vec![SWAPCHAIN_EXTENSION.to_string()],
        }
    }
}

/// Everything selection needs to know about one physical device
#[derive(Debug, Clone)]
pub struct PhysicalDeviceSnapshot {
    /// Physical device handle
    pub handle: vk::PhysicalDevice,
    /// Device name from the properties
    pub name: String,
    /// Device properties
    pub properties: vk::PhysicalDeviceProperties,
    /// Device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types
    pub memory: vk::PhysicalDeviceMemoryProperties,
    /// Queue family properties, indexed by family
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    /// Whether each family can present to the surface
    pub present_support: Vec<bool>,
    /// Names of available device extensions
    pub extensions: Vec<String>,
    /// Surface support for this device
    pub swapchain_support: SwapchainSupport,
}

/// Raw queue family scan result before requirements are applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyScan {
    /// First family with graphics
    pub graphics: Option<u32>,
    /// First family that can present
    pub present: Option<u32>,
    /// First family with compute
    pub compute: Option<u32>,
    /// Family with the lowest graphics+compute score that has transfer
    pub transfer: Option<u32>,
}

/// Reason a device was turned down
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Discrete GPU required
    #[error("device is not a discrete GPU")]
    NotDiscrete,
    /// No graphics family
    #[error("no graphics queue family")]
    MissingGraphics,
    /// No present family
    #[error("no queue family can present to the surface")]
    MissingPresent,
    /// No compute family
    #[error("no compute queue family")]
    MissingCompute,
    /// No transfer family
    #[error("no transfer queue family")]
    MissingTransfer,
    /// Surface reports no formats
    #[error("surface reports no formats")]
    NoSurfaceFormats,
    /// Surface reports no present modes
    #[error("surface reports no present modes")]
    NoPresentModes,
    /// A required extension is missing
    #[error("required extension {0} is not available")]
    MissingExtension(String),
    /// Sampler anisotropy unsupported
    #[error("sampler anisotropy is not supported")]
    MissingSamplerAnisotropy,
}

/// Scan queue families
///
/// Graphics, present and compute take the first family that advertises them.
/// Transfer goes to the family whose graphics+compute score is lowest, where a
/// later family with an equal score replaces an earlier one.
pub fn scan_queue_families(families: &[vk::QueueFamilyProperties], present_support: &[bool]) -> QueueFamilyScan {
    let mut scan = QueueFamilyScan::default();
    let mut min_transfer_score = u8::MAX;

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        let mut score = 0u8;

        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            scan.graphics.get_or_insert(index);
            score += 1;
        }

        if family.queue_flags.contains(vk::QueueFlags::COMPUTE) {
            scan.compute.get_or_insert(index);
            score += 1;
        }

        if family.queue_flags.contains(vk::QueueFlags::TRANSFER) && score <= min_transfer_score {
            min_transfer_score = score;
            scan.transfer = Some(index);
        }

        if present_support.get(index as usize).copied().unwrap_or(false) {
            scan.present.get_or_insert(index);
        }
    }

    scan
}

/// Check one device against the requirements
pub fn evaluate_device(
    snapshot: &PhysicalDeviceSnapshot,
    requirements: &DeviceRequirements,
) -> Result<QueueFamilyIndices, Rejection> {
    if requirements.discrete_gpu && snapshot.properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU {
        return Err(Rejection::NotDiscrete);
    }

    let scan = scan_queue_families(&snapshot.queue_families, &snapshot.present_support);
    log::info!(
        "{}: graphics {:?} | present {:?} | compute {:?} | transfer {:?}",
        snapshot.name,
        scan.graphics,
        scan.present,
        scan.compute,
        scan.transfer
    );

    let graphics = match scan.graphics {
        Some(index) => index,
        None if requirements.graphics => return Err(Rejection::MissingGraphics),
        None => 0,
    };
    let present = match scan.present {
        Some(index) => index,
        None if requirements.present => return Err(Rejection::MissingPresent),
        None => graphics,
    };
    if requirements.compute && scan.compute.is_none() {
        return Err(Rejection::MissingCompute);
    }
    let transfer = match scan.transfer {
        Some(index) => index,
        None if requirements.transfer => return Err(Rejection::MissingTransfer),
        None => graphics,
    };

    if snapshot.swapchain_support.formats.is_empty() {
        return Err(Rejection::NoSurfaceFormats);
    }
    if snapshot.swapchain_support.present_modes.is_empty() {
        return Err(Rejection::NoPresentModes);
    }

    if let Some(missing) = requirements
        .extensions
        .iter()
        .find(|required| !snapshot.extensions.contains(required))
    {
        return Err(Rejection::MissingExtension(missing.clone()));
    }

    if requirements.sampler_anisotropy && snapshot.features.sampler_anisotropy == vk::FALSE {
        return Err(Rejection::MissingSamplerAnisotropy);
    }

    Ok(QueueFamilyIndices {
        graphics,
        present,
        transfer,
    })
}

/// Select the first device that meets every requirement
pub fn select_physical_device(
    snapshots: &[PhysicalDeviceSnapshot],
    requirements: &DeviceRequirements,
) -> Option<(usize, QueueFamilyIndices)> {
    snapshots.iter().enumerate().find_map(|(index, snapshot)| {
        match evaluate_device(snapshot, requirements) {
            Ok(families) => Some((index, families)),
            Err(reason) => {
                log::info!("Skipping device '{}': {}", snapshot.name, reason);
                None
            }
        }
    })
}

/// Extensions to enable on the logical device
pub fn enabled_device_extensions(requirements: &DeviceRequirements, available: &[String]) -> Vec<String> {
    let mut extensions = requirements.extensions.clone();
    if available.iter().any(|name| name == PORTABILITY_SUBSET_EXTENSION)
        && !extensions.iter().any(|name| name == PORTABILITY_SUBSET_EXTENSION)
    {
        extensions.push(PORTABILITY_SUBSET_EXTENSION.to_string());
    }
    extensions
}

/// Human readable device type
pub fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated",
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "Unknown",
    }
}
