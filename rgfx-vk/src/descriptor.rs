//! Bind group layouts and bind groups.
//!
//! A [`BindGroupLayout`] is a `VkDescriptorSetLayout` that also remembers
//! its entries. A [`BindGroup`] owns a `VkDescriptorPool` sized for exactly
//! one set of its layout, so destroying the group frees the set with it.

use std::sync::Arc;

use ash::vk;
use rgfx_core::descriptor::{BindGroupLayoutEntry, BindingType};
use thiserror::Error;

use crate::conv;
use crate::error::classify;
use crate::raw::RawDevice;

#[derive(Debug, Error)]
pub enum CreateBindGroupError {
    #[error("Vulkan error creating descriptor pool: {0}")]
    CreatePool(vk::Result),

    #[error("Vulkan error allocating descriptor set: {0}")]
    AllocateSet(vk::Result),
}

impl From<CreateBindGroupError> for rgfx_core::Error {
    fn from(value: CreateBindGroupError) -> Self {
        match value {
            CreateBindGroupError::CreatePool(e) => {
                classify("vkCreateDescriptorPool", e)
            }
            CreateBindGroupError::AllocateSet(e) => {
                classify("vkAllocateDescriptorSets", e)
            }
        }
    }
}

/// Pool sizes needed for one set of `entries`, one size per descriptor
/// type.
pub fn pool_sizes(entries: &[BindGroupLayoutEntry]) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    for entry in entries {
        let ty = conv::descriptor_type(&entry.ty);
        match sizes.iter_mut().find(|s| s.ty == ty) {
            Some(size) => size.descriptor_count += 1,
            None => sizes.push(vk::DescriptorPoolSize {
                ty,
                descriptor_count: 1,
            }),
        }
    }
    sizes
}

/// Layout a view bound as `ty` must be in when shaders access it.
pub fn binding_image_layout(ty: &BindingType) -> vk::ImageLayout {
    match ty {
        BindingType::StorageTexture { .. } => vk::ImageLayout::GENERAL,
        _ => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }
}

// ---------------------------------------------------------------------------
// BindGroupLayout
// ---------------------------------------------------------------------------

pub struct BindGroupLayout {
    parent: Arc<RawDevice>,
    handle: vk::DescriptorSetLayout,
    entries: Vec<BindGroupLayoutEntry>,
}

impl std::fmt::Debug for BindGroupLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindGroupLayout")
            .field("handle", &self.handle)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl BindGroupLayout {
    pub fn new(
        device: &Arc<RawDevice>,
        label: Option<&str>,
        entries: &[BindGroupLayoutEntry],
    ) -> Result<Self, vk::Result> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding<'_>> = entries
            .iter()
            .map(|entry| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(entry.binding)
                    .descriptor_type(conv::descriptor_type(&entry.ty))
                    .descriptor_count(1)
                    .stage_flags(conv::shader_stages(entry.visibility))
            })
            .collect();
        let create_info =
            vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        // SAFETY: create_info references valid binding descriptions
        // for the duration of this call.
        let handle = unsafe {
            device
                .ash_device()
                .create_descriptor_set_layout(&create_info, None)
        }?;
        // SAFETY: handle was just created from device.
        unsafe { device.label_object(handle, "descriptor set layout", label) };
        Ok(Self {
            parent: Arc::clone(device),
            handle,
            entries: entries.to_vec(),
        })
    }

    pub fn raw(&self) -> vk::DescriptorSetLayout {
        self.handle
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
        tracing::debug!("Dropping descriptor set layout {:?}", self.handle);
        // SAFETY: handle was created from parent. Layouts may be destroyed
        // while sets allocated with them are still alive.
        unsafe {
            self.parent
                .ash_device()
                .destroy_descriptor_set_layout(self.handle, None)
        };
    }
}

// ---------------------------------------------------------------------------
// BindGroup
// ---------------------------------------------------------------------------

/// A resource resolved to its native handle, ready to write into a set.
#[derive(Debug, Clone, Copy)]
pub enum BoundResource {
    Buffer {
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    },
    Sampler(vk::Sampler),
    TextureView {
        view: vk::ImageView,
        layout: vk::ImageLayout,
    },
}

pub struct BindGroup {
    parent: Arc<RawDevice>,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
    dynamic_offset_count: usize,
}

impl std::fmt::Debug for BindGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindGroup")
            .field("set", &self.set)
            .finish_non_exhaustive()
    }
}

impl BindGroup {
    /// Allocate a set of `layout` and write `resources` into it.
    ///
    /// `resources` pairs binding indices with resolved resources; the
    /// caller has already checked them against the layout.
    pub fn new(
        device: &Arc<RawDevice>,
        label: Option<&str>,
        layout: &BindGroupLayout,
        resources: &[(u32, BoundResource)],
    ) -> Result<Self, CreateBindGroupError> {
        let mut sizes = pool_sizes(layout.entries());
        if sizes.is_empty() {
            // Zero-sized pools are invalid; empty layouts still get a set.
            sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLER,
                descriptor_count: 1,
            });
        }
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(1)
            .pool_sizes(&sizes);
        let ash_device = device.ash_device();
        // SAFETY: pool_info is valid and references only local data.
        let pool = unsafe { ash_device.create_descriptor_pool(&pool_info, None) }
            .map_err(CreateBindGroupError::CreatePool)?;

        let layouts = [layout.raw()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        // SAFETY: pool and layout were created from this device and the pool
        // has room for exactly this set.
        let set = match unsafe { ash_device.allocate_descriptor_sets(&alloc_info) }
        {
            Ok(sets) => sets[0],
            Err(e) => {
                // SAFETY: pool is unused.
                unsafe { ash_device.destroy_descriptor_pool(pool, None) };
                return Err(CreateBindGroupError::AllocateSet(e));
            }
        };

        // Infos are collected first so the writes can borrow them.
        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        for (_, resource) in resources {
            match *resource {
                BoundResource::Buffer {
                    buffer,
                    offset,
                    range,
                } => buffer_infos.push(
                    vk::DescriptorBufferInfo::default()
                        .buffer(buffer)
                        .offset(offset)
                        .range(range),
                ),
                BoundResource::Sampler(sampler) => image_infos
                    .push(vk::DescriptorImageInfo::default().sampler(sampler)),
                BoundResource::TextureView { view, layout } => image_infos.push(
                    vk::DescriptorImageInfo::default()
                        .image_view(view)
                        .image_layout(layout),
                ),
            }
        }

        let (mut next_buffer, mut next_image) = (0, 0);
        let mut writes = Vec::with_capacity(resources.len());
        for (binding, resource) in resources {
            let write = vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(*binding);
            let write = match resource {
                BoundResource::Buffer { .. } => {
                    next_buffer += 1;
                    write.buffer_info(std::slice::from_ref(
                        &buffer_infos[next_buffer - 1],
                    ))
                }
                _ => {
                    next_image += 1;
                    write.image_info(std::slice::from_ref(
                        &image_infos[next_image - 1],
                    ))
                }
            };
            let Some(entry) = layout.entry(*binding) else {
                continue;
            };
            writes.push(write.descriptor_type(conv::descriptor_type(&entry.ty)));
        }

        // SAFETY: Every write targets a binding of the set's layout with its
        // declared type, and the referenced objects derive from this device.
        unsafe { ash_device.update_descriptor_sets(&writes, &[]) };
        // SAFETY: set and pool were created from device.
        unsafe { device.label_object(set, "descriptor set", label) };

        Ok(Self {
            parent: Arc::clone(device),
            pool,
            set,
            dynamic_offset_count: layout.dynamic_offset_count(),
        })
    }

    pub fn raw(&self) -> vk::DescriptorSet {
        self.set
    }

    pub fn dynamic_offset_count(&self) -> usize {
        self.dynamic_offset_count
    }
}

impl Drop for BindGroup {
    fn drop(&mut self) {
        tracing::debug!("Dropping descriptor set {:?}", self.set);
        // SAFETY: The pool was created from parent and owns only this set.
        // Command buffers that used it have completed: the device waits
        // for in-flight encoders before destroying bound resources.
        unsafe {
            self.parent
                .ash_device()
                .destroy_descriptor_pool(self.pool, None)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rgfx_core::descriptor::BufferBindingType;
    use rgfx_core::{ShaderStage, TextureFormat, TextureSampleType, TextureViewType};

    fn entry(binding: u32, ty: BindingType) -> BindGroupLayoutEntry {
        BindGroupLayoutEntry {
            binding,
            visibility: ShaderStage::FRAGMENT,
            ty,
        }
    }

    #[test]
    fn pool_sizes_group_by_type() {
        let uniform = BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: 0,
        };
        let texture = BindingType::Texture {
            sample_type: TextureSampleType::Float,
            view_dimension: TextureViewType::D2,
            multisampled: false,
        };
        let sizes = pool_sizes(&[
            entry(0, uniform),
            entry(1, texture),
            entry(2, uniform),
        ]);
        assert_eq!(sizes.len(), 2);
        let uniform_size = sizes
            .iter()
            .find(|s| s.ty == vk::DescriptorType::UNIFORM_BUFFER)
            .unwrap();
        assert_eq!(uniform_size.descriptor_count, 2);
    }

    #[test]
    fn storage_textures_bind_in_general_layout() {
        let storage = BindingType::StorageTexture {
            format: TextureFormat::R32Float,
            view_dimension: TextureViewType::D2,
            write_only: true,
        };
        assert_eq!(binding_image_layout(&storage), vk::ImageLayout::GENERAL);
        assert_eq!(
            binding_image_layout(&BindingType::Sampler { comparison: false }),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
    }
}
