use std::sync::Arc;

use ash::vk;
use rgfx_core::backend::AdapterBackend;
use rgfx_core::descriptor::{
    AdapterInfo, DeviceDescriptor, DeviceExtension, DeviceLimits,
    QueueFamilyProperties,
};
use rgfx_core::{AdapterType, BackendKind};

use crate::conv;
use crate::device::VulkanDevice;
use crate::instance::{Instance, VkVersion};
use crate::surface::VulkanSurface;

pub(crate) fn adapter_type(ty: vk::PhysicalDeviceType) -> AdapterType {
    match ty {
        vk::PhysicalDeviceType::DISCRETE_GPU => AdapterType::DiscreteGpu,
        vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterType::IntegratedGpu,
        vk::PhysicalDeviceType::CPU => AdapterType::Cpu,
        _ => AdapterType::Unknown,
    }
}

/// One physical device, as enumerated by a [`crate::VulkanInstance`].
///
/// All queries are answered from data captured at enumeration time.
#[derive(Clone)]
pub struct VulkanAdapter {
    instance: Arc<Instance>,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    features: vk::PhysicalDeviceFeatures,
    queue_families: Vec<vk::QueueFamilyProperties>,
    swapchain: bool,
    portability_subset: bool,
    timeline_semaphores: bool,
    max_buffer_size: u64,
}

impl std::fmt::Debug for VulkanAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanAdapter")
            .field("physical_device", &self.physical_device)
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

impl VulkanAdapter {
    pub(crate) fn new(
        instance: &Arc<Instance>,
        physical_device: vk::PhysicalDevice,
    ) -> Self {
        // SAFETY: physical_device was just enumerated from this instance.
        let (properties, features, queue_families, timeline_semaphores) = unsafe {
            (
                instance.get_raw_physical_device_properties(physical_device),
                instance.get_raw_physical_device_features(physical_device),
                instance.get_raw_physical_device_queue_family_properties(
                    physical_device,
                ),
                instance.get_raw_physical_device_timeline_support(
                    physical_device,
                ),
            )
        };
        // SAFETY: as above.
        let extensions = match unsafe {
            instance.enumerate_raw_device_extension_properties(physical_device)
        } {
            Ok(extensions) => extensions,
            Err(e) => {
                tracing::warn!(
                    "Failed to enumerate extensions of {:?}: {e}",
                    properties.device_name_as_c_str().unwrap_or(c"unknown")
                );
                Vec::new()
            }
        };
        let has_extension = |name: &std::ffi::CStr| {
            extensions
                .iter()
                .any(|ext| ext.extension_name_as_c_str() == Ok(name))
        };
        let swapchain = has_extension(ash::khr::swapchain::NAME);
        let portability_subset =
            has_extension(ash::khr::portability_subset::NAME);

        let max_buffer_size = if instance.supported_ver().at_least(1, 3)
            && VkVersion::from_raw(properties.api_version).at_least(1, 3)
        {
            let mut maintenance4 =
                vk::PhysicalDeviceMaintenance4Properties::default();
            let mut properties2 = vk::PhysicalDeviceProperties2::default()
                .push_next(&mut maintenance4);
            // SAFETY: Both the instance and the device are at least 1.3, so
            // the query and the chained struct are core.
            unsafe {
                instance.ash_instance().get_physical_device_properties2(
                    physical_device,
                    &mut properties2,
                )
            };
            maintenance4.max_buffer_size
        } else {
            u64::from(u32::MAX)
        };

        Self {
            instance: instance.clone(),
            physical_device,
            properties,
            features,
            queue_families,
            swapchain,
            portability_subset,
            timeline_semaphores,
            max_buffer_size,
        }
    }

    pub fn name(&self) -> String {
        self.properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn adapter_type(&self) -> AdapterType {
        adapter_type(self.properties.device_type)
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features
    }

    /// Portability implementations require the subset extension enabled.
    pub fn has_portability_subset(&self) -> bool {
        self.portability_subset
    }

    pub fn supports(&self, extension: DeviceExtension) -> bool {
        match extension {
            DeviceExtension::Swapchain => self.swapchain,
            DeviceExtension::TimelineSemaphore => self.timeline_semaphores,
            DeviceExtension::AnisotropicFiltering => {
                self.features.sampler_anisotropy == vk::TRUE
            }
        }
    }

    /// First queue family with graphics and compute support.
    pub fn graphics_queue_family(&self) -> Option<u32> {
        let wanted = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE;
        self.queue_families
            .iter()
            .position(|family| {
                family.queue_flags.contains(wanted) && family.queue_count > 0
            })
            .map(|i| i as u32)
    }

    pub fn queue_family_count(&self) -> u32 {
        self.queue_families.len() as u32
    }
}

impl AdapterBackend for VulkanAdapter {
    type Device = VulkanDevice;

    fn info(&self) -> AdapterInfo {
        let api = VkVersion::from_raw(self.properties.api_version);
        AdapterInfo {
            name: self.name(),
            driver_description: format!(
                "Vulkan {}.{}.{}, driver version {:#x}",
                api.major(),
                api.minor(),
                api.patch(),
                self.properties.driver_version
            ),
            vendor_id: self.properties.vendor_id,
            device_id: self.properties.device_id,
            adapter_type: self.adapter_type(),
            backend: BackendKind::Vulkan,
        }
    }

    fn limits(&self) -> DeviceLimits {
        let limits = &self.properties.limits;
        DeviceLimits {
            min_uniform_buffer_offset_alignment: limits
                .min_uniform_buffer_offset_alignment
                as u32,
            min_storage_buffer_offset_alignment: limits
                .min_storage_buffer_offset_alignment
                as u32,
            max_uniform_buffer_binding_size: limits.max_uniform_buffer_range,
            max_storage_buffer_binding_size: limits.max_storage_buffer_range,
            max_buffer_size: self.max_buffer_size,
            max_texture_dimension_1d: limits.max_image_dimension1_d,
            max_texture_dimension_2d: limits.max_image_dimension2_d,
            max_texture_dimension_3d: limits.max_image_dimension3_d,
            max_texture_array_layers: limits.max_image_array_layers,
        }
    }

    fn queue_families(&self) -> Vec<QueueFamilyProperties> {
        self.queue_families.iter().map(conv::queue_family).collect()
    }

    fn queue_family_surface_support(
        &self,
        queue_family_index: u32,
        surface: &VulkanSurface,
    ) -> rgfx_core::Result<bool> {
        if queue_family_index >= self.queue_family_count() {
            return Err(rgfx_core::Error::invalid_argument(format!(
                "queue family {queue_family_index} out of range for {} \
                 families",
                self.queue_family_count()
            )));
        }
        if !Arc::ptr_eq(surface.instance(), &self.instance) {
            return Err(rgfx_core::Error::invalid_argument(
                "surface belongs to a different instance",
            ));
        }
        // SAFETY: physical device and surface both derive from
        // self.instance, checked above.
        Ok(unsafe {
            self.instance.get_raw_physical_device_surface_support(
                self.physical_device,
                queue_family_index,
                surface.raw(),
            )
        }?)
    }

    fn extensions(&self) -> Vec<&'static str> {
        DeviceExtension::ALL
            .into_iter()
            .filter(|ext| self.supports(*ext))
            .map(DeviceExtension::name)
            .collect()
    }

    fn create_device(
        &self,
        desc: &DeviceDescriptor<'_>,
    ) -> rgfx_core::Result<Arc<VulkanDevice>> {
        VulkanDevice::new(self, desc).map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_device_types_map() {
        assert_eq!(
            adapter_type(vk::PhysicalDeviceType::VIRTUAL_GPU),
            AdapterType::Unknown
        );
        assert_eq!(adapter_type(vk::PhysicalDeviceType::CPU), AdapterType::Cpu);
    }
}
