use std::sync::Arc;

use rgfx_core::backend::AdapterBackend;
use rgfx_core::descriptor::{
    AdapterInfo, DeviceDescriptor, DeviceExtension, DeviceLimits,
    QueueFamilyProperties,
};
use rgfx_core::{AdapterType, BackendKind, QueueFlags};

use crate::conv;
use crate::device::WgpuDevice;
use crate::surface::WgpuSurface;

pub fn device_limits(limits: &wgpu::Limits) -> DeviceLimits {
    DeviceLimits {
        min_uniform_buffer_offset_alignment: limits
            .min_uniform_buffer_offset_alignment,
        min_storage_buffer_offset_alignment: limits
            .min_storage_buffer_offset_alignment,
        max_uniform_buffer_binding_size: limits.max_uniform_buffer_binding_size,
        max_storage_buffer_binding_size: limits.max_storage_buffer_binding_size,
        max_buffer_size: limits.max_buffer_size,
        max_texture_dimension_1d: limits.max_texture_dimension_1d,
        max_texture_dimension_2d: limits.max_texture_dimension_2d,
        max_texture_dimension_3d: limits.max_texture_dimension_3d,
        max_texture_array_layers: limits.max_texture_array_layers,
    }
}

/// WebGPU exposes a single queue that accepts every kind of work.
pub const QUEUE_FAMILY: QueueFamilyProperties = QueueFamilyProperties {
    flags: QueueFlags::GRAPHICS
        .union(QueueFlags::COMPUTE)
        .union(QueueFlags::TRANSFER),
    queue_count: 1,
};

#[derive(Clone)]
pub struct WgpuAdapter {
    instance: Arc<wgpu::Instance>,
    raw: wgpu::Adapter,
    info: wgpu::AdapterInfo,
}

impl std::fmt::Debug for WgpuAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuAdapter")
            .field("name", &self.info.name)
            .field("backend", &self.info.backend)
            .finish_non_exhaustive()
    }
}

impl WgpuAdapter {
    pub(crate) fn new(
        instance: &Arc<wgpu::Instance>,
        raw: wgpu::Adapter,
    ) -> Self {
        let info = raw.get_info();
        Self {
            instance: Arc::clone(instance),
            raw,
            info,
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn adapter_type(&self) -> AdapterType {
        conv::adapter_type(self.info.device_type)
    }

    pub fn raw(&self) -> &wgpu::Adapter {
        &self.raw
    }

    pub fn instance(&self) -> &Arc<wgpu::Instance> {
        &self.instance
    }
}

impl AdapterBackend for WgpuAdapter {
    type Device = WgpuDevice;

    fn info(&self) -> AdapterInfo {
        let driver_description = match self.info.driver_info.as_str() {
            "" => self.info.driver.clone(),
            info => format!("{} {info}", self.info.driver),
        };
        AdapterInfo {
            name: self.info.name.clone(),
            driver_description,
            vendor_id: self.info.vendor,
            device_id: self.info.device,
            adapter_type: self.adapter_type(),
            backend: BackendKind::WebGpu,
        }
    }

    fn limits(&self) -> DeviceLimits {
        device_limits(&self.raw.limits())
    }

    fn queue_families(&self) -> Vec<QueueFamilyProperties> {
        vec![QUEUE_FAMILY]
    }

    fn queue_family_surface_support(
        &self,
        queue_family_index: u32,
        surface: &WgpuSurface,
    ) -> rgfx_core::Result<bool> {
        if queue_family_index != 0 {
            return Err(rgfx_core::Error::invalid_argument(format!(
                "queue family {queue_family_index} out of range for 1 family"
            )));
        }
        Ok(surface.is_supported_by(&self.raw))
    }

    /// Swapchains and anisotropy are core WebGPU; timeline semaphores are
    /// emulated on the host.
    fn extensions(&self) -> Vec<&'static str> {
        DeviceExtension::ALL.iter().map(|e| e.name()).collect()
    }

    fn create_device(
        &self,
        desc: &DeviceDescriptor<'_>,
    ) -> rgfx_core::Result<Arc<WgpuDevice>> {
        WgpuDevice::new(self, desc).map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_translate_field_by_field() {
        let limits = wgpu::Limits::default();
        let ours = device_limits(&limits);
        assert_eq!(ours.max_buffer_size, limits.max_buffer_size);
        assert_eq!(
            ours.min_uniform_buffer_offset_alignment,
            limits.min_uniform_buffer_offset_alignment
        );
        assert_eq!(
            ours.max_texture_array_layers,
            limits.max_texture_array_layers
        );
    }

    #[test]
    fn single_queue_family_does_everything() {
        assert!(QUEUE_FAMILY.flags.contains(QueueFlags::GRAPHICS));
        assert!(QUEUE_FAMILY.flags.contains(QueueFlags::COMPUTE));
        assert!(QUEUE_FAMILY.flags.contains(QueueFlags::TRANSFER));
        assert_eq!(QUEUE_FAMILY.queue_count, 1);
    }
}
