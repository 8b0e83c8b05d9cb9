use rgfx_core::backend::AdapterBackend;
use rgfx_core::descriptor::{
    AdapterInfo, DeviceDescriptor, DeviceLimits, QueueFamilyProperties,
};
use rgfx_core::{BackendKind, Result};

use crate::device::Device;
use crate::surface::{Surface, SurfaceInner};

backend_enum! {
    #[derive(Debug, Clone)]
    pub(crate) enum AdapterInner {
        rgfx_vk::VulkanAdapter,
        rgfx_wgpu::WgpuAdapter,
    }
}

/// A physical GPU exposed by an [`Instance`](crate::Instance).
#[derive(Debug, Clone)]
pub struct Adapter {
    inner: AdapterInner,
}

impl Adapter {
    pub(crate) fn from_inner(inner: AdapterInner) -> Self {
        Self { inner }
    }

    pub fn backend(&self) -> BackendKind {
        self.inner.backend()
    }

    pub fn info(&self) -> AdapterInfo {
        dispatch!(&self.inner, AdapterInner, a => a.info())
    }

    pub fn limits(&self) -> DeviceLimits {
        dispatch!(&self.inner, AdapterInner, a => a.limits())
    }

    pub fn queue_families(&self) -> Vec<QueueFamilyProperties> {
        dispatch!(&self.inner, AdapterInner, a => a.queue_families())
    }

    /// Whether queues of `queue_family_index` can present to `surface`.
    pub fn queue_family_surface_support(
        &self,
        queue_family_index: u32,
        surface: &Surface,
    ) -> Result<bool> {
        dispatch_pair!(
            (&self.inner, AdapterInner), (surface.inner(), SurfaceInner),
            a, s => a.queue_family_surface_support(queue_family_index, s)
        )
    }

    /// Device extension names this adapter supports.
    pub fn extensions(&self) -> Vec<&'static str> {
        dispatch!(&self.inner, AdapterInner, a => a.extensions())
    }

    pub fn create_device(&self, desc: &DeviceDescriptor<'_>) -> Result<Device> {
        dispatch!(&self.inner, AdapterInner, a => {
            Ok(Device::from_inner(a.create_device(desc)?.into()))
        })
    }

    #[cfg(feature = "vulkan")]
    pub fn as_vulkan(&self) -> Option<&rgfx_vk::VulkanAdapter> {
        match &self.inner {
            AdapterInner::Vulkan(a) => Some(a),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    #[cfg(feature = "webgpu")]
    pub fn as_wgpu(&self) -> Option<&rgfx_wgpu::WgpuAdapter> {
        match &self.inner {
            AdapterInner::WebGpu(a) => Some(a),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}
