//! Vulkan instance creation and physical device selection.

use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{CStr, CString};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Create a Vulkan instance with the surface extensions this platform needs.
///
/// Validation is requested only when the layer is actually installed;
/// otherwise the instance comes up without it and a warning is logged.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    display_handle: RawDisplayHandle,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|_| GpuError::Other("Application name contains a NUL byte".to_string()))?;
    let engine_name = c"Lantern";

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(engine_name)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    // Surface extensions come from the window system
    #[allow(unused_mut)]
    let mut extension_names: Vec<*const i8> =
        ash_window::enumerate_required_extensions(display_handle)?.to_vec();

    #[cfg(target_os = "macos")]
    extension_names.push(ash::khr::portability_enumeration::NAME.as_ptr());

    let mut layer_names: Vec<*const i8> = Vec::new();
    if enable_validation {
        if layer_available(entry, VALIDATION_LAYER)? {
            layer_names.push(VALIDATION_LAYER.as_ptr());
        } else {
            tracing::warn!(
                "Validation layer {} not installed, continuing without it",
                VALIDATION_LAYER.to_string_lossy()
            );
        }
    }

    // MoltenVK requires the portability flag
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    Ok(entry.create_instance(&create_info, None)?)
}

unsafe fn layer_available(entry: &ash::Entry, name: &CStr) -> Result<bool> {
    let layers = entry.enumerate_instance_layer_properties()?;
    Ok(layers
        .iter()
        .any(|props| CStr::from_ptr(props.layer_name.as_ptr()) == name))
}

/// Pick the physical device best suited for the demo.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(instance: &ash::Instance) -> Result<vk::PhysicalDevice> {
    instance
        .enumerate_physical_devices()?
        .into_iter()
        .filter_map(|device| score_device(instance, device).map(|score| (score, device)))
        .max_by_key(|&(score, _)| score)
        .map(|(_, device)| device)
        .ok_or(GpuError::NoSuitableDevice)
}

/// Score a device, or `None` if it cannot run the demo at all.
///
/// Vulkan 1.3 and the swapchain extension are hard requirements. Among
/// capable devices, discrete GPUs win, then more device-local memory.
unsafe fn score_device(instance: &ash::Instance, device: vk::PhysicalDevice) -> Option<i64> {
    let properties = instance.get_physical_device_properties(device);

    let version = properties.api_version;
    if (vk::api_version_major(version), vk::api_version_minor(version)) < (1, 3) {
        return None;
    }

    let extensions = instance.enumerate_device_extension_properties(device).ok()?;
    let has_swapchain = extensions
        .iter()
        .any(|ext| CStr::from_ptr(ext.extension_name.as_ptr()) == ash::khr::swapchain::NAME);
    if !has_swapchain {
        return None;
    }

    let class = match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 0,
    };

    let memory = instance.get_physical_device_memory_properties(device);
    let local_mib: u64 = memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size >> 20)
        .sum();

    // One point per GiB of local memory on top of the device class
    Some(class + (local_mib >> 10) as i64)
}
