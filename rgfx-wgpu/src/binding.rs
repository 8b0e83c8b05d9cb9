//! Bind group layouts and bind groups.

use rgfx_core::descriptor::BindGroupLayoutEntry;

use crate::conv;
use crate::error::scoped;

pub struct BindGroupLayout {
    raw: wgpu::BindGroupLayout,
    entries: Vec<BindGroupLayoutEntry>,
}

impl std::fmt::Debug for BindGroupLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindGroupLayout")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl BindGroupLayout {
    pub fn new(
        device: &wgpu::Device,
        label: Option<&str>,
        entries: &[BindGroupLayoutEntry],
    ) -> rgfx_core::Result<Self> {
        let native = entries
            .iter()
            .map(|entry| {
                Ok(wgpu::BindGroupLayoutEntry {
                    binding: entry.binding,
                    visibility: conv::shader_stages(entry.visibility),
                    ty: conv::binding_type(&entry.ty)?,
                    count: None,
                })
            })
            .collect::<rgfx_core::Result<Vec<_>>>()?;
        let raw = scoped(device, "create_bind_group_layout", || {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label,
                entries: &native,
            })
        })?;
        Ok(Self {
            raw,
            entries: entries.to_vec(),
        })
    }

    pub fn raw(&self) -> &wgpu::BindGroupLayout {
        &self.raw
    }

    pub fn entries(&self) -> &[BindGroupLayoutEntry] {
        &self.entries
    }

    pub fn entry(&self, binding: u32) -> Option<&BindGroupLayoutEntry> {
        self.entries.iter().find(|e| e.binding == binding)
    }

    /// Number of dynamic offsets a group of this layout consumes.
    pub fn dynamic_offset_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.ty.has_dynamic_offset())
            .count()
    }
}

impl Drop for BindGroupLayout {
    fn drop(&mut self) {
        tracing::debug!("Dropping bind group layout {:?}", self.raw);
    }
}

/// A resource resolved to its native object, ready to bind.
#[derive(Debug, Clone)]
pub enum BoundResource {
    Buffer {
        buffer: wgpu::Buffer,
        offset: u64,
        size: u64,
    },
    Sampler(wgpu::Sampler),
    TextureView(wgpu::TextureView),
}

impl BoundResource {
    fn as_binding(&self) -> wgpu::BindingResource<'_> {
        match self {
            BoundResource::Buffer {
                buffer,
                offset,
                size,
            } => wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: *offset,
                size: wgpu::BufferSize::new(*size),
            }),
            BoundResource::Sampler(sampler) => {
                wgpu::BindingResource::Sampler(sampler)
            }
            BoundResource::TextureView(view) => {
                wgpu::BindingResource::TextureView(view)
            }
        }
    }
}

pub struct BindGroup {
    raw: wgpu::BindGroup,
    dynamic_offset_count: usize,
}

impl std::fmt::Debug for BindGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindGroup")
            .field("dynamic_offset_count", &self.dynamic_offset_count)
            .finish_non_exhaustive()
    }
}

impl BindGroup {
    /// Bind `resources` against `layout`. The caller has already checked
    /// them against the layout's entries.
    pub fn new(
        device: &wgpu::Device,
        label: Option<&str>,
        layout: &BindGroupLayout,
        resources: &[(u32, BoundResource)],
    ) -> rgfx_core::Result<Self> {
        let entries: Vec<wgpu::BindGroupEntry<'_>> = resources
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: resource.as_binding(),
            })
            .collect();
        let raw = scoped(device, "create_bind_group", || {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label,
                layout: layout.raw(),
                entries: &entries,
            })
        })?;
        Ok(Self {
            raw,
            dynamic_offset_count: layout.dynamic_offset_count(),
        })
    }

    pub fn raw(&self) -> &wgpu::BindGroup {
        &self.raw
    }

    pub fn dynamic_offset_count(&self) -> usize {
        self.dynamic_offset_count
    }
}

impl Drop for BindGroup {
    fn drop(&mut self) {
        tracing::debug!("Dropping bind group {:?}", self.raw);
    }
}
