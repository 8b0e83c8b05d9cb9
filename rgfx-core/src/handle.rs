//! Generation-checked entity handles.
//!
//! Every device-owned entity is addressed by a typed [`slotmap`] key. A key
//! packs an index and a generation counter, so a handle that outlives its
//! entity resolves to [`Error::InvalidHandle`](crate::Error::InvalidHandle)
//! instead of aliasing whatever reused the slot.

use slotmap::{Key, SlotMap, new_key_type};

use crate::error::{Error, Result};

new_key_type! {
    pub struct BufferHandle;
    pub struct TextureHandle;
    pub struct TextureViewHandle;
    pub struct SamplerHandle;
    pub struct ShaderHandle;
    pub struct BindGroupLayoutHandle;
    pub struct BindGroupHandle;
    pub struct RenderPassHandle;
    pub struct FramebufferHandle;
    pub struct RenderPipelineHandle;
    pub struct ComputePipelineHandle;
    pub struct FenceHandle;
    pub struct SemaphoreHandle;
    pub struct QuerySetHandle;
    pub struct SwapchainHandle;
}

/// A typed key with a human readable entity name for error messages.
pub trait Handle: Key {
    const KIND: &'static str;

    /// Raw `(index, generation)` packing, useful for logging and FFI.
    fn to_bits(self) -> u64 {
        self.data().as_ffi()
    }
}

macro_rules! impl_handle {
    ($($ty:ty => $kind:literal),* $(,)?) => {
        $(impl Handle for $ty {
            const KIND: &'static str = $kind;
        })*
    };
}

impl_handle! {
    BufferHandle => "buffer",
    TextureHandle => "texture",
    TextureViewHandle => "texture view",
    SamplerHandle => "sampler",
    ShaderHandle => "shader",
    BindGroupLayoutHandle => "bind group layout",
    BindGroupHandle => "bind group",
    RenderPassHandle => "render pass",
    FramebufferHandle => "framebuffer",
    RenderPipelineHandle => "render pipeline",
    ComputePipelineHandle => "compute pipeline",
    FenceHandle => "fence",
    SemaphoreHandle => "semaphore",
    QuerySetHandle => "query set",
    SwapchainHandle => "swapchain",
}

/// Lookups on a [`SlotMap`] that fail with a typed
/// [`Error::InvalidHandle`] rather than `None`.
pub trait Resolve<K: Handle, V> {
    fn resolve(&self, key: K) -> Result<&V>;
    fn resolve_mut(&mut self, key: K) -> Result<&mut V>;
}

impl<K: Handle, V> Resolve<K, V> for SlotMap<K, V> {
    fn resolve(&self, key: K) -> Result<&V> {
        self.get(key)
            .ok_or(Error::InvalidHandle { kind: K::KIND })
    }

    fn resolve_mut(&mut self, key: K) -> Result<&mut V> {
        self.get_mut(key)
            .ok_or(Error::InvalidHandle { kind: K::KIND })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handle_fails_after_slot_reuse() {
        let mut map: SlotMap<BufferHandle, u32> = SlotMap::with_key();
        let first = map.insert(1);
        assert_eq!(*map.resolve(first).unwrap(), 1);
        map.remove(first);

        let second = map.insert(2);
        // Same slot, newer generation.
        assert_ne!(first, second);
        assert!(matches!(
            map.resolve(first),
            Err(Error::InvalidHandle { kind: "buffer" })
        ));
        assert_eq!(*map.resolve(second).unwrap(), 2);
    }

    #[test]
    fn null_handle_never_resolves() {
        let map: SlotMap<FenceHandle, ()> = SlotMap::with_key();
        assert!(map.resolve(FenceHandle::null()).is_err());
    }

    #[test]
    fn bits_differ_between_generations() {
        let mut map: SlotMap<TextureHandle, ()> = SlotMap::with_key();
        let a = map.insert(());
        map.remove(a);
        let b = map.insert(());
        assert_ne!(a.to_bits(), b.to_bits());
    }
}
