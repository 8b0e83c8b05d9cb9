//! Textures and texture views.
//!
//! wgpu transitions textures itself, but a [`Texture`] still tracks the
//! layout of each mip level so both backends report the same layouts and
//! reject the same out-of-order usage.
//!
//! Swapchain textures and their views have no native object until an image
//! is acquired. Both keep their native handle in a [`Rebindable`] slot that
//! the swapchain fills on acquire and clears on present.

use std::ops::Range;
use std::sync::Mutex;

use rgfx_core::descriptor::{
    ResolvedTextureView, TextureDescriptor, TextureInfo, TextureViewDescriptor,
};
use rgfx_core::layout::LayoutTracker;
use rgfx_core::util::mip_level_size;
use rgfx_core::{
    Extent3D, SampleCount, TextureFormat, TextureHandle, TextureLayout,
    TextureType, TextureUsage,
};
use thiserror::Error;

use crate::conv;
use crate::error::scoped;

#[derive(Debug, Error)]
pub enum CreateTextureViewError {
    #[error("View format {view:?} is not compatible with texture format {texture:?}")]
    IncompatibleFormat {
        texture: TextureFormat,
        view: TextureFormat,
    },
}

impl From<CreateTextureViewError> for rgfx_core::Error {
    fn from(value: CreateTextureViewError) -> Self {
        rgfx_core::Error::invalid_argument(value.to_string())
    }
}

/// Whether a view of `texture` may reinterpret it as `view`.
///
/// WebGPU only reinterprets between the sRGB and linear variants of one
/// format.
pub fn view_format_compatible(
    texture: TextureFormat,
    view: TextureFormat,
) -> bool {
    if texture == view {
        return true;
    }
    match (conv::texture_format(texture), conv::texture_format(view)) {
        (Some(t), Some(v)) => t.remove_srgb_suffix() == v.remove_srgb_suffix(),
        _ => false,
    }
}

/// Formats a texture of `format` may be viewed as besides its own.
fn reinterpretable_formats(format: wgpu::TextureFormat) -> Vec<wgpu::TextureFormat> {
    [format.add_srgb_suffix(), format.remove_srgb_suffix()]
        .into_iter()
        .filter(|f| *f != format)
        .collect()
}

/// Native usages added so the blitter can read and write a texture that
/// takes part in copies.
pub fn blit_usages(
    format: wgpu::TextureFormat,
    info: &TextureInfo,
    features: wgpu::Features,
) -> wgpu::TextureUsages {
    let copies = TextureUsage::COPY_SRC | TextureUsage::COPY_DST;
    if !info.usage.intersects(copies)
        || info.texture_type != TextureType::D2
        || info.sample_count != SampleCount::X1
    {
        return wgpu::TextureUsages::empty();
    }
    format.guaranteed_format_features(features).allowed_usages
        & (wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::RENDER_ATTACHMENT)
}

/// A native object that may be swapped out after creation.
pub(crate) struct Rebindable<T> {
    what: &'static str,
    slot: Mutex<Option<T>>,
}

impl<T: Clone> Rebindable<T> {
    pub(crate) fn new(what: &'static str, value: Option<T>) -> Self {
        Self {
            what,
            slot: Mutex::new(value),
        }
    }

    pub(crate) fn get(&self) -> rgfx_core::Result<T> {
        self.slot
            .lock()
            .expect("native slot lock poisoned")
            .clone()
            .ok_or_else(|| {
                rgfx_core::Error::invalid_state(format!(
                    "{} has no acquired swapchain image",
                    self.what
                ))
            })
    }

    pub(crate) fn set(&self, value: Option<T>) {
        *self.slot.lock().expect("native slot lock poisoned") = value;
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.slot.lock().expect("native slot lock poisoned").is_some()
    }
}

pub struct Texture {
    raw: Rebindable<wgpu::Texture>,
    info: TextureInfo,
    owned: bool,
    layouts: Mutex<LayoutTracker>,
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("format", &self.info.format)
            .field("size", &self.info.size)
            .field("owned", &self.owned)
            .finish_non_exhaustive()
    }
}

impl Texture {
    pub fn new(
        device: &wgpu::Device,
        desc: &TextureDescriptor<'_>,
    ) -> rgfx_core::Result<Self> {
        let info = desc.info();
        let format = conv::require_texture_format(info.format)?;
        let view_formats = reinterpretable_formats(format);
        let usage = conv::texture_usage(info.usage)
            | blit_usages(format, &info, device.features());
        let raw = scoped(device, "create_texture", || {
            device.create_texture(&wgpu::TextureDescriptor {
                label: desc.label,
                size: conv::texture_extent(&info),
                mip_level_count: info.mip_level_count,
                sample_count: info.sample_count.count(),
                dimension: conv::texture_dimension(info.texture_type),
                format,
                usage,
                view_formats: &view_formats,
            })
        })?;
        Ok(Self {
            raw: Rebindable::new("texture", Some(raw)),
            layouts: Mutex::new(LayoutTracker::new(
                info.mip_level_count,
                TextureLayout::Undefined,
            )),
            info,
            owned: true,
        })
    }

    /// Wrap a `wgpu::Texture` created elsewhere. Its layout is taken on
    /// trust from the caller.
    pub fn import(raw: wgpu::Texture, layout: TextureLayout) -> Self {
        let size = raw.size();
        let texture_type = match raw.dimension() {
            wgpu::TextureDimension::D1 => TextureType::D1,
            wgpu::TextureDimension::D2 => TextureType::D2,
            wgpu::TextureDimension::D3 => TextureType::D3,
        };
        let info = TextureInfo {
            texture_type,
            size: Extent3D {
                width: size.width,
                height: size.height,
                depth: match texture_type {
                    TextureType::D3 => size.depth_or_array_layers,
                    _ => 1,
                },
            },
            array_layer_count: match texture_type {
                TextureType::D3 => 1,
                _ => size.depth_or_array_layers,
            },
            mip_level_count: raw.mip_level_count(),
            sample_count: SampleCount::from_count(raw.sample_count())
                .unwrap_or(SampleCount::X1),
            format: conv::texture_format_from_wgpu(raw.format()),
            usage: conv::texture_usage_from_wgpu(raw.usage()),
        };
        Self::non_owning(Some(raw), info, layout)
    }

    pub(crate) fn non_owning(
        raw: Option<wgpu::Texture>,
        info: TextureInfo,
        layout: TextureLayout,
    ) -> Self {
        Self {
            raw: Rebindable::new("swapchain texture", raw),
            layouts: Mutex::new(LayoutTracker::new(
                info.mip_level_count,
                layout,
            )),
            info,
            owned: false,
        }
    }

    pub fn raw(&self) -> rgfx_core::Result<wgpu::Texture> {
        self.raw.get()
    }

    pub(crate) fn rebind(&self, raw: Option<wgpu::Texture>) {
        self.raw.set(raw);
    }

    pub fn info(&self) -> TextureInfo {
        self.info
    }

    pub fn all_layers(&self) -> Range<u32> {
        0..self.info.layer_count()
    }

    pub fn mip_size(&self, level: u32) -> Extent3D {
        let size = mip_level_size(self.info.size, level, self.info.texture_type);
        match self.info.texture_type {
            TextureType::D3 => size,
            _ => Extent3D { depth: 1, ..size },
        }
    }

    pub fn current_layout(&self) -> TextureLayout {
        self.layouts.lock().expect("layout lock poisoned").current()
    }

    pub fn layout(&self, mip: u32) -> Option<TextureLayout> {
        self.layouts.lock().expect("layout lock poisoned").get(mip)
    }

    /// Record that `mips` moved to `new`. wgpu performs the transition.
    pub fn transition(&self, mips: Range<u32>, new: TextureLayout) {
        let changes = self
            .layouts
            .lock()
            .expect("layout lock poisoned")
            .transition(mips, new);
        for change in changes {
            tracing::trace!(
                "Texture mips {:?}: {:?} -> {:?}",
                change.mips,
                change.old,
                change.new
            );
        }
    }

    /// Check `mips` are in `expected` and record that they moved to `new`.
    pub fn transition_from(
        &self,
        mips: Range<u32>,
        expected: TextureLayout,
        new: TextureLayout,
    ) -> rgfx_core::Result<()> {
        self.layouts
            .lock()
            .expect("layout lock poisoned")
            .transition_from(mips, expected, new)
            .map(|_| ())
    }

    /// Record that a render pass or present left `mips` in `layout`.
    pub fn assume(&self, mips: Range<u32>, layout: TextureLayout) {
        self.layouts
            .lock()
            .expect("layout lock poisoned")
            .assume(mips, layout);
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if !self.owned {
            tracing::trace!("Releasing non-owning texture {:?}", self.info.format);
            return;
        }
        tracing::debug!("Dropping texture {:?}", self.info.format);
        if let Ok(raw) = self.raw.get() {
            raw.destroy();
        }
    }
}

/// A `wgpu::TextureView` onto one [`Texture`].
pub struct TextureView {
    raw: Rebindable<wgpu::TextureView>,
    texture: TextureHandle,
    resolved: ResolvedTextureView,
    sample_count: SampleCount,
    extent: Extent3D,
    usage: TextureUsage,
}

impl std::fmt::Debug for TextureView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureView")
            .field("texture", &self.texture)
            .field("format", &self.resolved.format)
            .finish_non_exhaustive()
    }
}

impl TextureView {
    pub fn new(
        device: &wgpu::Device,
        texture_handle: TextureHandle,
        texture: &Texture,
        desc: &TextureViewDescriptor<'_>,
    ) -> rgfx_core::Result<Self> {
        let info = texture.info();
        let resolved = desc.resolve(&info)?;
        if !view_format_compatible(info.format, resolved.format) {
            return Err(CreateTextureViewError::IncompatibleFormat {
                texture: info.format,
                view: resolved.format,
            }
            .into());
        }
        let raw = Self::create_raw(device, &texture.raw()?, desc.label, &resolved)?;
        Ok(Self::from_parts(texture_handle, texture, resolved, Some(raw)))
    }

    /// A view of a swapchain texture, bound when an image is acquired.
    pub(crate) fn unbound(
        texture_handle: TextureHandle,
        texture: &Texture,
    ) -> rgfx_core::Result<Self> {
        let resolved = TextureViewDescriptor::default().resolve(&texture.info())?;
        Ok(Self::from_parts(texture_handle, texture, resolved, None))
    }

    fn from_parts(
        texture_handle: TextureHandle,
        texture: &Texture,
        resolved: ResolvedTextureView,
        raw: Option<wgpu::TextureView>,
    ) -> Self {
        let info = texture.info();
        Self {
            raw: Rebindable::new("texture view", raw),
            texture: texture_handle,
            resolved,
            sample_count: info.sample_count,
            extent: texture.mip_size(resolved.base_mip_level),
            usage: info.usage,
        }
    }

    pub(crate) fn create_raw(
        device: &wgpu::Device,
        texture: &wgpu::Texture,
        label: Option<&str>,
        resolved: &ResolvedTextureView,
    ) -> rgfx_core::Result<wgpu::TextureView> {
        let format = conv::require_texture_format(resolved.format)?;
        scoped(device, "create_texture_view", || {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label,
                format: Some(format),
                dimension: Some(conv::view_dimension(resolved.view_type)),
                base_mip_level: resolved.base_mip_level,
                mip_level_count: Some(resolved.mip_level_count),
                base_array_layer: resolved.base_array_layer,
                array_layer_count: Some(resolved.array_layer_count),
                ..Default::default()
            })
        })
    }

    pub fn raw(&self) -> rgfx_core::Result<wgpu::TextureView> {
        self.raw.get()
    }

    pub(crate) fn rebind(&self, raw: Option<wgpu::TextureView>) {
        self.raw.set(raw);
    }

    pub fn is_bound(&self) -> bool {
        self.raw.is_bound()
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn format(&self) -> TextureFormat {
        self.resolved.format
    }

    pub fn sample_count(&self) -> SampleCount {
        self.sample_count
    }

    /// Size of the view's base mip level.
    pub fn extent(&self) -> Extent3D {
        self.extent
    }

    pub fn usage(&self) -> TextureUsage {
        self.usage
    }

    pub fn mips(&self) -> Range<u32> {
        let base = self.resolved.base_mip_level;
        base..base + self.resolved.mip_level_count
    }

    pub fn resolved(&self) -> &ResolvedTextureView {
        &self.resolved
    }
}

impl Drop for TextureView {
    fn drop(&mut self) {
        tracing::debug!("Dropping texture view of {:?}", self.texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srgb_and_linear_views_share_storage() {
        assert!(view_format_compatible(
            TextureFormat::R8G8B8A8Unorm,
            TextureFormat::R8G8B8A8UnormSrgb
        ));
        assert!(view_format_compatible(
            TextureFormat::B8G8R8A8UnormSrgb,
            TextureFormat::B8G8R8A8Unorm
        ));
    }

    #[test]
    fn same_sized_formats_do_not_reinterpret() {
        assert!(!view_format_compatible(
            TextureFormat::R8G8B8A8Unorm,
            TextureFormat::R32Float
        ));
        assert!(!view_format_compatible(
            TextureFormat::Depth32Float,
            TextureFormat::R32Float
        ));
        assert!(view_format_compatible(
            TextureFormat::Depth32Float,
            TextureFormat::Depth32Float
        ));
    }

    #[test]
    fn only_srgb_pairs_are_declared_as_view_formats() {
        assert_eq!(
            reinterpretable_formats(wgpu::TextureFormat::Rgba8Unorm),
            vec![wgpu::TextureFormat::Rgba8UnormSrgb]
        );
        assert!(reinterpretable_formats(wgpu::TextureFormat::R32Float).is_empty());
    }

    #[test]
    fn copyable_color_textures_gain_blit_usages() {
        let info = TextureInfo {
            texture_type: TextureType::D2,
            size: Extent3D::new(16, 16, 1),
            array_layer_count: 1,
            mip_level_count: 5,
            sample_count: SampleCount::X1,
            format: TextureFormat::R8G8B8A8Unorm,
            usage: TextureUsage::COPY_SRC | TextureUsage::COPY_DST,
        };
        let usages = blit_usages(
            wgpu::TextureFormat::Rgba8Unorm,
            &info,
            wgpu::Features::empty(),
        );
        assert!(usages.contains(
            wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
        ));

        let sampled_only = TextureInfo {
            usage: TextureUsage::TEXTURE_BINDING,
            ..info
        };
        assert!(blit_usages(
            wgpu::TextureFormat::Rgba8Unorm,
            &sampled_only,
            wgpu::Features::empty()
        )
        .is_empty());
    }

    #[test]
    fn unbound_slots_report_invalid_state() {
        let slot: Rebindable<u32> = Rebindable::new("swapchain texture", None);
        assert!(matches!(
            slot.get(),
            Err(rgfx_core::Error::InvalidState(_))
        ));
        slot.set(Some(7));
        assert_eq!(slot.get().unwrap(), 7);
    }
}
