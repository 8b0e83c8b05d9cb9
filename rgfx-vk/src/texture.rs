//! Textures and texture views.
//!
//! A [`Texture`] wraps a `VkImage` and tracks the layout of each mip level
//! in a [`LayoutTracker`]. Every command that touches the image goes through
//! [`Texture::transition`], which updates the tracker and emits the matching
//! image barriers into a [`BarrierBatch`]. Array layers of one mip share a
//! layout: transitions always cover every layer.
//!
//! Swapchain images and imported images are non-owning textures: dropping
//! them releases only the wrapper.

use std::ops::Range;
use std::sync::{Arc, Mutex};

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::{AllocationError, vulkan::Allocation};
use rgfx_core::descriptor::{
    ResolvedTextureView, TextureDescriptor, TextureImportDescriptor,
    TextureInfo, TextureViewDescriptor,
};
use rgfx_core::layout::LayoutTracker;
use rgfx_core::util::mip_level_size;
use rgfx_core::{
    Extent3D, SampleCount, TextureFormat, TextureHandle, TextureLayout,
    TextureType, TextureUsage,
};
use thiserror::Error;

use crate::barrier::BarrierBatch;
use crate::conv;
use crate::error::{allocation_error, classify};
use crate::raw::{MemoryUsage, RawDevice};

#[derive(Debug, Error)]
pub enum CreateTextureError {
    #[error("Format {0:?} has no Vulkan equivalent")]
    UnsupportedFormat(TextureFormat),

    #[error("Vulkan error creating image: {0}")]
    CreateImage(vk::Result),

    #[error("GPU allocator error allocating memory: {0}")]
    AllocateMemory(AllocationError),

    #[error("Vulkan error binding image memory: {0}")]
    BindMemory(vk::Result),
}

impl From<CreateTextureError> for rgfx_core::Error {
    fn from(value: CreateTextureError) -> Self {
        match value {
            CreateTextureError::UnsupportedFormat(_) => {
                rgfx_core::Error::unsupported(value.to_string())
            }
            CreateTextureError::CreateImage(e) => classify("vkCreateImage", e),
            CreateTextureError::AllocateMemory(e) => allocation_error(e),
            CreateTextureError::BindMemory(e) => {
                classify("vkBindImageMemory", e)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum CreateTextureViewError {
    #[error("View format {view:?} is not compatible with texture format {texture:?}")]
    IncompatibleFormat {
        texture: TextureFormat,
        view: TextureFormat,
    },

    #[error("Vulkan error creating image view: {0}")]
    Vulkan(vk::Result),
}

impl From<CreateTextureViewError> for rgfx_core::Error {
    fn from(value: CreateTextureViewError) -> Self {
        match value {
            CreateTextureViewError::IncompatibleFormat { .. } => {
                rgfx_core::Error::invalid_argument(value.to_string())
            }
            CreateTextureViewError::Vulkan(e) => {
                classify("vkCreateImageView", e)
            }
        }
    }
}

/// Whether a view of `texture` may reinterpret it as `view`.
///
/// Color formats of equal texel size are compatible; depth/stencil formats
/// only with themselves.
pub fn view_format_compatible(
    texture: TextureFormat,
    view: TextureFormat,
) -> bool {
    if texture == view {
        return true;
    }
    !texture.is_depth_stencil()
        && !view.is_depth_stencil()
        && texture.bytes_per_pixel() == view.bytes_per_pixel()
}

fn image_extent(info: &TextureInfo) -> vk::Extent3D {
    vk::Extent3D {
        width: info.size.width,
        height: info.size.height,
        depth: match info.texture_type {
            TextureType::D3 => info.size.depth,
            _ => 1,
        },
    }
}

pub struct Texture {
    parent: Arc<RawDevice>,
    handle: vk::Image,
    allocation: Option<Allocation>,
    info: TextureInfo,
    owned: bool,
    layouts: Mutex<LayoutTracker>,
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("handle", &self.handle)
            .field("format", &self.info.format)
            .field("size", &self.info.size)
            .field("owned", &self.owned)
            .finish_non_exhaustive()
    }
}

impl Texture {
    pub fn new(
        device: &Arc<RawDevice>,
        desc: &TextureDescriptor<'_>,
    ) -> Result<Self, CreateTextureError> {
        let info = desc.info();
        let format = conv::texture_format(info.format);
        if format == vk::Format::UNDEFINED {
            return Err(CreateTextureError::UnsupportedFormat(info.format));
        }

        let mut flags = vk::ImageCreateFlags::empty();
        if info.texture_type == TextureType::Cube {
            flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
        }
        if !info.format.is_depth_stencil() {
            flags |= vk::ImageCreateFlags::MUTABLE_FORMAT;
        }
        let create_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(conv::image_type(info.texture_type))
            .format(format)
            .extent(image_extent(&info))
            .mip_levels(info.mip_level_count)
            .array_layers(info.layer_count())
            .samples(conv::sample_count(info.sample_count))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(conv::texture_usage(info.usage, info.format))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let ash_device = device.ash_device();
        // SAFETY: create_info is fully initialised and has no borrowed data.
        let handle = unsafe { ash_device.create_image(&create_info, None) }
            .map_err(CreateTextureError::CreateImage)?;

        // SAFETY: handle is a valid image created from device.
        unsafe { device.label_object(handle, "image", desc.label) };

        // SAFETY: handle is a valid image created from this device.
        let reqs = unsafe { ash_device.get_image_memory_requirements(handle) };
        let allocation = device
            .allocate_memory(
                desc.label.unwrap_or("texture"),
                reqs,
                MemoryUsage::GpuOnly,
                false,
            )
            .map_err(|e| {
                // SAFETY: handle was created from this device and is not
                // bound to memory yet.
                unsafe { ash_device.destroy_image(handle, None) };
                CreateTextureError::AllocateMemory(e)
            })?;

        // SAFETY: handle and allocation memory are valid and belong to this
        // device.
        let bind_result = unsafe {
            ash_device.bind_image_memory(
                handle,
                allocation.memory(),
                allocation.offset(),
            )
        };
        if let Err(e) = bind_result {
            let _ = device.free_memory(allocation);
            // SAFETY: handle is valid and owned by this scope.
            unsafe { ash_device.destroy_image(handle, None) };
            return Err(CreateTextureError::BindMemory(e));
        }

        Ok(Self {
            parent: Arc::clone(device),
            handle,
            allocation: Some(allocation),
            layouts: Mutex::new(LayoutTracker::new(
                info.mip_level_count,
                TextureLayout::Undefined,
            )),
            info,
            owned: true,
        })
    }

    /// Wrap a `VkImage` owned elsewhere. Its layout is taken on trust from
    /// the descriptor.
    pub fn import(
        device: &Arc<RawDevice>,
        desc: &TextureImportDescriptor<'_>,
    ) -> Self {
        let handle = vk::Image::from_raw(desc.native_handle);
        // SAFETY: the caller vouches that the handle belongs to this device.
        unsafe { device.label_object(handle, "image", desc.label) };
        let info = desc.info();
        Self::non_owning(device, handle, info, desc.current_layout)
    }

    pub(crate) fn non_owning(
        device: &Arc<RawDevice>,
        handle: vk::Image,
        info: TextureInfo,
        layout: TextureLayout,
    ) -> Self {
        Self {
            parent: Arc::clone(device),
            handle,
            allocation: None,
            layouts: Mutex::new(LayoutTracker::new(
                info.mip_level_count,
                layout,
            )),
            info,
            owned: false,
        }
    }

    pub fn raw(&self) -> vk::Image {
        self.handle
    }

    pub fn info(&self) -> TextureInfo {
        self.info
    }

    pub fn native_handle(&self) -> u64 {
        self.handle.as_raw()
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        conv::aspect_mask(self.info.format)
    }

    /// Aspect addressed by copies and blits.
    pub fn copy_aspect(&self) -> vk::ImageAspectFlags {
        conv::view_aspect_mask(self.info.format)
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

    /// Move `mips` to `new`, queueing barriers for every mip that changes.
    pub fn transition(
        &self,
        mips: Range<u32>,
        new: TextureLayout,
        batch: &mut BarrierBatch,
    ) {
        let changes = self
            .layouts
            .lock()
            .expect("layout lock poisoned")
            .transition(mips, new);
        for change in changes {
            batch.layout_change(
                self.handle,
                self.aspect(),
                change.mips,
                self.all_layers(),
                change.old,
                change.new,
            );
        }
    }

    /// Check `mips` are in `expected` and record that they moved to `new`,
    /// without emitting barriers.
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
            tracing::trace!("Releasing non-owning image {:?}", self.handle);
            return;
        }
        tracing::debug!("Dropping image {:?}", self.handle);
        // SAFETY: handle was created from parent and is owned by this
        // wrapper.
        unsafe { self.parent.ash_device().destroy_image(self.handle, None) };

        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.parent.free_memory(allocation)
        {
            tracing::error!("Failed to free GPU image allocation: {e}");
        }
    }
}

/// A `VkImageView` onto one [`Texture`].
///
/// Keeps what framebuffers, bind groups and render passes need to know
/// about the viewed subresource without going back to the texture.
pub struct TextureView {
    parent: Arc<RawDevice>,
    handle: vk::ImageView,
    texture: TextureHandle,
    image: vk::Image,
    resolved: ResolvedTextureView,
    sample_count: SampleCount,
    extent: Extent3D,
    usage: TextureUsage,
}

impl std::fmt::Debug for TextureView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureView")
            .field("handle", &self.handle)
            .field("texture", &self.texture)
            .field("format", &self.resolved.format)
            .finish_non_exhaustive()
    }
}

impl TextureView {
    pub fn new(
        device: &Arc<RawDevice>,
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

        let create_info = vk::ImageViewCreateInfo::default()
            .image(texture.raw())
            .view_type(conv::image_view_type(resolved.view_type))
            .format(conv::texture_format(resolved.format))
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: conv::view_aspect_mask(resolved.format),
                base_mip_level: resolved.base_mip_level,
                level_count: resolved.mip_level_count,
                base_array_layer: resolved.base_array_layer,
                layer_count: resolved.array_layer_count,
            });

        // SAFETY: The image belongs to this device and the subresource
        // range was checked against it by `resolve`.
        let handle = unsafe {
            device.ash_device().create_image_view(&create_info, None)
        }
        .map_err(CreateTextureViewError::Vulkan)?;
        // SAFETY: handle was just created from device.
        unsafe { device.label_object(handle, "image view", desc.label) };

        Ok(Self {
            parent: Arc::clone(device),
            handle,
            texture: texture_handle,
            image: texture.raw(),
            resolved,
            sample_count: info.sample_count,
            extent: texture.mip_size(resolved.base_mip_level),
            usage: info.usage,
        })
    }

    pub fn raw(&self) -> vk::ImageView {
        self.handle
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn image(&self) -> vk::Image {
        self.image
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
        tracing::debug!("Dropping image view {:?}", self.handle);
        // SAFETY: handle was created from parent and is owned by this
        // wrapper.
        unsafe {
            self.parent
                .ash_device()
                .destroy_image_view(self.handle, None)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_views_reinterpret_same_sized_formats() {
        assert!(view_format_compatible(
            TextureFormat::R8G8B8A8Unorm,
            TextureFormat::R8G8B8A8UnormSrgb
        ));
        assert!(!view_format_compatible(
            TextureFormat::R8G8B8A8Unorm,
            TextureFormat::R16G16B16A16Float
        ));
    }

    #[test]
    fn depth_views_keep_their_format() {
        assert!(view_format_compatible(
            TextureFormat::Depth32Float,
            TextureFormat::Depth32Float
        ));
        assert!(!view_format_compatible(
            TextureFormat::Depth32Float,
            TextureFormat::R32Float
        ));
    }

    #[test]
    fn array_textures_use_flat_extents() {
        let info = TextureDescriptor {
            size: Extent3D::new(32, 16, 6),
            array_layer_count: 6,
            texture_type: TextureType::Cube,
            ..Default::default()
        }
        .info();
        let extent = image_extent(&info);
        assert_eq!((extent.width, extent.height, extent.depth), (32, 16, 1));

        let info = TextureDescriptor {
            size: Extent3D::new(8, 8, 4),
            texture_type: TextureType::D3,
            ..Default::default()
        }
        .info();
        assert_eq!(image_extent(&info).depth, 4);
    }
}
