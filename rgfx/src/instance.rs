use rgfx_core::backend::InstanceBackend;
use rgfx_core::descriptor::{
    AdapterDescriptor, InstanceDescriptor, InstanceExtension,
};
use rgfx_core::{BackendKind, Result};

use crate::adapter::Adapter;
use crate::registry;

backend_enum! {
    #[derive(Debug, Clone)]
    pub(crate) enum InstanceInner {
        rgfx_vk::VulkanInstance,
        rgfx_wgpu::WgpuInstance,
    }
}

/// Process entry point bound to one loaded backend.
#[derive(Debug, Clone)]
pub struct Instance {
    inner: InstanceInner,
}

impl Instance {
    /// Create an instance on `desc.backend`, which must have been loaded
    /// with [`load_backend`](crate::load_backend). `Auto` binds to the
    /// first loaded backend.
    pub fn new(desc: &InstanceDescriptor<'_>) -> Result<Self> {
        let kind = registry::resolve(desc.backend)?;
        let inner = match kind {
            #[cfg(feature = "vulkan")]
            BackendKind::Vulkan => {
                InstanceInner::Vulkan(rgfx_vk::VulkanInstance::new(desc)?)
            }
            #[cfg(feature = "webgpu")]
            BackendKind::WebGpu => {
                InstanceInner::WebGpu(rgfx_wgpu::WgpuInstance::new(desc)?)
            }
            other => {
                return Err(rgfx_core::Error::BackendNotLoaded(
                    other.name().into(),
                ));
            }
        };
        tracing::debug!("Created {} instance", kind.name());
        Ok(Self { inner })
    }

    pub fn backend(&self) -> BackendKind {
        self.inner.backend()
    }

    pub fn enumerate_adapters(&self) -> Result<Vec<Adapter>> {
        dispatch!(&self.inner, InstanceInner, i => Ok(i
            .enumerate_adapters()?
            .into_iter()
            .map(|a| Adapter::from_inner(a.into()))
            .collect()))
    }

    pub fn request_adapter(&self, desc: &AdapterDescriptor) -> Result<Adapter> {
        dispatch!(&self.inner, InstanceInner, i => {
            let adapter = i.request_adapter(desc)?;
            Ok(Adapter::from_inner(adapter.into()))
        })
    }

    #[cfg(feature = "vulkan")]
    pub fn as_vulkan(&self) -> Option<&rgfx_vk::VulkanInstance> {
        match &self.inner {
            InstanceInner::Vulkan(i) => Some(i),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    #[cfg(feature = "webgpu")]
    pub fn as_wgpu(&self) -> Option<&rgfx_wgpu::WgpuInstance> {
        match &self.inner {
            InstanceInner::WebGpu(i) => Some(i),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

/// Instance extensions `backend` supports. The backend must be loaded.
pub fn enumerate_instance_extensions(
    backend: BackendKind,
) -> Result<Vec<InstanceExtension>> {
    match registry::resolve(backend)? {
        #[cfg(feature = "vulkan")]
        BackendKind::Vulkan => rgfx_vk::VulkanInstance::enumerate_extensions(),
        #[cfg(feature = "webgpu")]
        BackendKind::WebGpu => rgfx_wgpu::WgpuInstance::enumerate_extensions(),
        other => Err(rgfx_core::Error::BackendNotLoaded(other.name().into())),
    }
}
