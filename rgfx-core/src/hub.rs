//! Per-device entity arena.
//!
//! A [`Hub`] owns every device-level entity of one backend device, keyed by
//! the typed handles in [`crate::handle`]. Backends wrap it in an `RwLock`:
//! creation and destruction take the write lock, recording and queries only
//! the read lock.
//!
//! Field order is drop order. Entities that reference others are declared
//! before what they reference, so dropping a hub with live entities tears
//! them down in a valid order.

use slotmap::SlotMap;

use crate::handle::{
    BindGroupHandle, BindGroupLayoutHandle, BufferHandle,
    ComputePipelineHandle, FenceHandle, FramebufferHandle, Handle,
    QuerySetHandle, RenderPassHandle, RenderPipelineHandle, SamplerHandle,
    SemaphoreHandle, ShaderHandle, SwapchainHandle, TextureHandle,
    TextureViewHandle,
};

/// Concrete entity types stored by one backend.
pub trait HubTypes {
    type Buffer;
    type Texture;
    type TextureView;
    type Sampler;
    type Shader;
    type BindGroupLayout;
    type BindGroup;
    type RenderPass;
    type Framebuffer;
    type RenderPipeline;
    type ComputePipeline;
    type Fence;
    type Semaphore;
    type QuerySet;
    type Swapchain;
}

pub struct Hub<T: HubTypes> {
    pub framebuffers: SlotMap<FramebufferHandle, T::Framebuffer>,
    pub render_pipelines: SlotMap<RenderPipelineHandle, T::RenderPipeline>,
    pub compute_pipelines: SlotMap<ComputePipelineHandle, T::ComputePipeline>,
    pub bind_groups: SlotMap<BindGroupHandle, T::BindGroup>,
    pub bind_group_layouts: SlotMap<BindGroupLayoutHandle, T::BindGroupLayout>,
    pub render_passes: SlotMap<RenderPassHandle, T::RenderPass>,
    pub texture_views: SlotMap<TextureViewHandle, T::TextureView>,
    pub samplers: SlotMap<SamplerHandle, T::Sampler>,
    pub shaders: SlotMap<ShaderHandle, T::Shader>,
    pub swapchains: SlotMap<SwapchainHandle, T::Swapchain>,
    pub textures: SlotMap<TextureHandle, T::Texture>,
    pub buffers: SlotMap<BufferHandle, T::Buffer>,
    pub query_sets: SlotMap<QuerySetHandle, T::QuerySet>,
    pub fences: SlotMap<FenceHandle, T::Fence>,
    pub semaphores: SlotMap<SemaphoreHandle, T::Semaphore>,
}

impl<T: HubTypes> Default for Hub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: HubTypes> Hub<T> {
    pub fn new() -> Self {
        Self {
            framebuffers: SlotMap::with_key(),
            render_pipelines: SlotMap::with_key(),
            compute_pipelines: SlotMap::with_key(),
            bind_groups: SlotMap::with_key(),
            bind_group_layouts: SlotMap::with_key(),
            render_passes: SlotMap::with_key(),
            texture_views: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            swapchains: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            query_sets: SlotMap::with_key(),
            fences: SlotMap::with_key(),
            semaphores: SlotMap::with_key(),
        }
    }

    /// Number of live entities per kind, skipping empty kinds.
    pub fn live_counts(&self) -> Vec<(&'static str, usize)> {
        let counts = [
            (FramebufferHandle::KIND, self.framebuffers.len()),
            (RenderPipelineHandle::KIND, self.render_pipelines.len()),
            (ComputePipelineHandle::KIND, self.compute_pipelines.len()),
            (BindGroupHandle::KIND, self.bind_groups.len()),
            (BindGroupLayoutHandle::KIND, self.bind_group_layouts.len()),
            (RenderPassHandle::KIND, self.render_passes.len()),
            (TextureViewHandle::KIND, self.texture_views.len()),
            (SamplerHandle::KIND, self.samplers.len()),
            (ShaderHandle::KIND, self.shaders.len()),
            (SwapchainHandle::KIND, self.swapchains.len()),
            (TextureHandle::KIND, self.textures.len()),
            (BufferHandle::KIND, self.buffers.len()),
            (QuerySetHandle::KIND, self.query_sets.len()),
            (FenceHandle::KIND, self.fences.len()),
            (SemaphoreHandle::KIND, self.semaphores.len()),
        ];
        counts.into_iter().filter(|(_, n)| *n > 0).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.live_counts().is_empty()
    }

    /// Log every kind that still has live entities. Called by backends when
    /// a device is dropped with outstanding resources.
    pub fn report_leaks(&self, device_label: &str) {
        for (kind, count) in self.live_counts() {
            tracing::warn!(
                "Device {device_label:?} dropped with {count} live {kind} \
                 entit{}",
                if count == 1 { "y" } else { "ies" }
            );
        }
    }
}

/// Remove `key` from `map`, treating an already-removed key as a no-op.
///
/// Returns the removed value so the caller controls when it drops (for
/// example outside the hub lock).
pub fn release<K: Handle, V>(map: &mut SlotMap<K, V>, key: K) -> Option<V> {
    let removed = map.remove(key);
    if removed.is_none() {
        tracing::trace!("Ignoring destroy of stale {} handle", K::KIND);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    impl HubTypes for Dummy {
        type Buffer = u64;
        type Texture = ();
        type TextureView = ();
        type Sampler = ();
        type Shader = ();
        type BindGroupLayout = ();
        type BindGroup = ();
        type RenderPass = ();
        type Framebuffer = ();
        type RenderPipeline = ();
        type ComputePipeline = ();
        type Fence = bool;
        type Semaphore = ();
        type QuerySet = ();
        type Swapchain = ();
    }

    #[test]
    fn double_release_is_noop() {
        let mut hub: Hub<Dummy> = Hub::new();
        let buffer = hub.buffers.insert(64);
        assert_eq!(release(&mut hub.buffers, buffer), Some(64));
        assert_eq!(release(&mut hub.buffers, buffer), None);
        assert!(hub.is_empty());
    }

    #[test]
    fn live_counts_skip_empty_kinds() {
        let mut hub: Hub<Dummy> = Hub::new();
        hub.fences.insert(true);
        hub.fences.insert(false);
        hub.buffers.insert(1);
        let counts = hub.live_counts();
        assert_eq!(counts.len(), 2);
        assert!(counts.contains(&("fence", 2)));
        assert!(counts.contains(&("buffer", 1)));
    }
}
