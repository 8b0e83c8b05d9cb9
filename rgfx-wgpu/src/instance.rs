use std::sync::Arc;

use rgfx_core::backend::InstanceBackend;
use rgfx_core::descriptor::{
    AdapterDescriptor, InstanceDescriptor, InstanceExtension,
};
use rgfx_core::BackendKind;

use crate::adapter::WgpuAdapter;

/// Instance flags for a descriptor. The debug extension turns on wgpu's
/// validation and debug labels on top of the build defaults.
pub fn instance_flags(desc: &InstanceDescriptor<'_>) -> wgpu::InstanceFlags {
    let flags = wgpu::InstanceFlags::from_build_config();
    if desc.wants(InstanceExtension::Debug) {
        flags | wgpu::InstanceFlags::debugging()
    } else {
        flags
    }
}

/// Entry point of the WebGPU backend.
#[derive(Clone)]
pub struct WgpuInstance {
    raw: Arc<wgpu::Instance>,
}

impl std::fmt::Debug for WgpuInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuInstance").finish_non_exhaustive()
    }
}

impl WgpuInstance {
    pub fn new(desc: &InstanceDescriptor<'_>) -> rgfx_core::Result<Self> {
        let flags = instance_flags(desc);
        let raw = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::from_env()
                .unwrap_or(wgpu::Backends::PRIMARY),
            flags,
            ..Default::default()
        });
        tracing::info!(
            "Created wgpu instance for {:?} (flags: {flags:?})",
            desc.application_name.unwrap_or("unnamed application"),
        );
        Ok(Self { raw: Arc::new(raw) })
    }

    /// Every instance extension is always available: surfaces are part of
    /// the core API and debugging is an instance flag.
    pub fn enumerate_extensions() -> rgfx_core::Result<Vec<InstanceExtension>>
    {
        Ok(InstanceExtension::ALL.to_vec())
    }

    pub fn raw(&self) -> &Arc<wgpu::Instance> {
        &self.raw
    }
}

impl InstanceBackend for WgpuInstance {
    type Adapter = WgpuAdapter;

    fn kind(&self) -> BackendKind {
        BackendKind::WebGpu
    }

    fn enumerate_adapters(&self) -> rgfx_core::Result<Vec<WgpuAdapter>> {
        Ok(self
            .raw
            .enumerate_adapters(wgpu::Backends::all())
            .into_iter()
            .map(|adapter| WgpuAdapter::new(&self.raw, adapter))
            .collect())
    }

    fn request_adapter(
        &self,
        desc: &AdapterDescriptor,
    ) -> rgfx_core::Result<WgpuAdapter> {
        let mut adapters = self.enumerate_adapters()?;
        if adapters.is_empty() {
            return Err(rgfx_core::Error::NotFound(
                "no WebGPU adapters".into(),
            ));
        }
        let index = match desc.adapter_index {
            Some(index) if index as usize >= adapters.len() => {
                return Err(rgfx_core::Error::NotFound(format!(
                    "adapter index {index} out of range for {} adapters",
                    adapters.len()
                )));
            }
            Some(index) => index as usize,
            None => rgfx_core::descriptor::select_adapter(
                adapters.iter().map(|a| a.adapter_type()),
                desc.preference,
            )
            .unwrap_or(0),
        };
        let adapter = adapters.swap_remove(index);
        tracing::info!(
            "Selected adapter: {:?} (type: {:?}, backend: {:?})",
            adapter.name(),
            adapter.adapter_type(),
            adapter.raw().get_info().backend,
        );
        Ok(adapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_extension_enables_validation() {
        let desc = InstanceDescriptor {
            enabled_extensions: &[InstanceExtension::Debug],
            ..Default::default()
        };
        assert!(instance_flags(&desc).contains(wgpu::InstanceFlags::VALIDATION));
    }

    #[test]
    fn all_extensions_are_reported() {
        let extensions = WgpuInstance::enumerate_extensions().unwrap();
        assert!(extensions.contains(&InstanceExtension::Surface));
        assert!(extensions.contains(&InstanceExtension::Debug));
    }
}
