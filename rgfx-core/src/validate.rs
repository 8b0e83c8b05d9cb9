//! Side-effect-free descriptor checks run before any backend call.

use crate::descriptor::{
    BindGroupDescriptor, BindGroupLayoutDescriptor, BindGroupLayoutEntry,
    BindingResource, BindingType, BlitTextureToTextureDescriptor,
    BufferBindingType, BufferDescriptor, BufferImportDescriptor, DeviceLimits,
    ComputePipelineDescriptor, CopyBufferToBufferDescriptor,
    CopyBufferToTextureDescriptor, CopyTextureToBufferDescriptor,
    CopyTextureToTextureDescriptor, DeviceDescriptor, FramebufferDescriptor,
    QuerySetDescriptor, RenderPassBeginDescriptor, RenderPassDescriptor,
    RenderPipelineDescriptor, SamplerDescriptor, ShaderDescriptor,
    SwapchainDescriptor, TextureDescriptor, TextureImportDescriptor,
    TextureInfo,
};
use crate::error::{Error, Result};
use crate::flags::BufferUsage;
use crate::format::TextureFormat;
use crate::types::{Extent3D, SampleCount, ShaderSourceType, TextureType};
use crate::util::full_mip_chain_len;

fn ensure(cond: bool, msg: &str) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(Error::invalid_argument(msg))
    }
}

fn texture_extent(texture_type: TextureType, size: Extent3D) -> Result<()> {
    match texture_type {
        TextureType::D1 => ensure(size.width > 0, "1D texture width is zero"),
        TextureType::D2 | TextureType::Cube => ensure(
            size.width > 0 && size.height > 0,
            "2D texture width or height is zero",
        ),
        TextureType::D3 => ensure(
            size.width > 0 && size.height > 0 && size.depth > 0,
            "3D texture has a zero dimension",
        ),
    }
}

fn copy_extent(extent: Extent3D) -> Result<()> {
    ensure(
        extent.width > 0 && extent.height > 0 && extent.depth > 0,
        "copy extent has a zero dimension",
    )
}

pub fn device(desc: &DeviceDescriptor<'_>) -> Result<()> {
    for request in desc.queue_requests {
        ensure(
            (0.0..=1.0).contains(&request.priority),
            "queue priority must be within [0, 1]",
        )?;
    }
    Ok(())
}

pub fn buffer(desc: &BufferDescriptor<'_>) -> Result<()> {
    ensure(desc.size > 0, "buffer size is zero")?;
    ensure(!desc.usage.is_empty(), "buffer usage is empty")
}

pub fn buffer_import(desc: &BufferImportDescriptor<'_>) -> Result<()> {
    ensure(desc.native_handle != 0, "imported buffer handle is null")?;
    ensure(desc.size > 0, "buffer size is zero")?;
    ensure(!desc.usage.is_empty(), "buffer usage is empty")
}

pub fn texture(desc: &TextureDescriptor<'_>) -> Result<()> {
    texture_extent(desc.texture_type, desc.size)?;
    ensure(
        desc.format != TextureFormat::Undefined,
        "texture format is undefined",
    )?;
    ensure(!desc.usage.is_empty(), "texture usage is empty")?;
    ensure(desc.mip_level_count > 0, "texture mip level count is zero")?;
    ensure(desc.array_layer_count > 0, "texture array layer count is zero")?;
    if desc.texture_type == TextureType::Cube {
        ensure(
            desc.array_layer_count % 6 == 0,
            "cube texture layer count must be a multiple of 6",
        )?;
    }
    Ok(())
}

pub fn texture_import(desc: &TextureImportDescriptor<'_>) -> Result<()> {
    ensure(desc.native_handle != 0, "imported texture handle is null")?;
    texture_extent(desc.texture_type, desc.size)?;
    ensure(!desc.usage.is_empty(), "texture usage is empty")?;
    ensure(desc.mip_level_count > 0, "texture mip level count is zero")?;
    ensure(desc.array_layer_count > 0, "texture array layer count is zero")
}

pub fn sampler(desc: &SamplerDescriptor<'_>) -> Result<()> {
    ensure(
        desc.lod_min_clamp >= 0.0 && desc.lod_min_clamp <= desc.lod_max_clamp,
        "sampler LOD clamp range is invalid",
    )?;
    ensure(desc.max_anisotropy >= 1, "sampler max anisotropy is zero")
}

pub fn bind_group_layout(desc: &BindGroupLayoutDescriptor<'_>) -> Result<()> {
    for (i, entry) in desc.entries.iter().enumerate() {
        ensure(
            !desc.entries[..i].iter().any(|e| e.binding == entry.binding),
            "bind group layout declares a binding twice",
        )?;
        ensure(
            !entry.visibility.is_empty(),
            "bind group layout entry has no visibility",
        )?;
    }
    Ok(())
}

fn resource_matches(ty: &BindingType, resource: &BindingResource) -> bool {
    matches!(
        (ty, resource),
        (BindingType::Buffer { .. }, BindingResource::Buffer { .. })
            | (BindingType::Sampler { .. }, BindingResource::Sampler(_))
            | (BindingType::Texture { .. }, BindingResource::TextureView(_))
            | (
                BindingType::StorageTexture { .. },
                BindingResource::TextureView(_)
            )
    )
}

/// Every layout binding must be written exactly once with a resource of
/// the declared kind.
pub fn bind_group(
    layout: &[BindGroupLayoutEntry],
    desc: &BindGroupDescriptor<'_>,
) -> Result<()> {
    for (i, entry) in desc.entries.iter().enumerate() {
        ensure(
            !desc.entries[..i].iter().any(|e| e.binding == entry.binding),
            "bind group writes a binding twice",
        )?;
        let declared = layout
            .iter()
            .find(|l| l.binding == entry.binding)
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "binding {} is not declared by the layout",
                    entry.binding
                ))
            })?;
        if !resource_matches(&declared.ty, &entry.resource) {
            return Err(Error::invalid_argument(format!(
                "binding {} expects {:?}, got {:?}",
                entry.binding, declared.ty, entry.resource
            )));
        }
    }
    ensure(
        layout
            .iter()
            .all(|l| desc.entries.iter().any(|e| e.binding == l.binding)),
        "bind group leaves a layout binding unwritten",
    )
}

pub fn shader(desc: &ShaderDescriptor<'_>) -> Result<()> {
    ensure(!desc.code.is_empty(), "shader code is empty")?;
    if desc.source_type == ShaderSourceType::SpirV {
        ensure(
            desc.code.len() % 4 == 0,
            "SPIR-V code size must be a multiple of 4",
        )?;
    }
    Ok(())
}

pub fn render_pass(desc: &RenderPassDescriptor<'_>) -> Result<()> {
    for attachment in desc.color_attachments {
        ensure(
            attachment.target.format != TextureFormat::Undefined,
            "color attachment format is undefined",
        )?;
        ensure(
            !attachment.target.format.is_depth_stencil(),
            "color attachment uses a depth/stencil format",
        )?;
        if let Some(resolve) = attachment.resolve_target {
            ensure(
                resolve.sample_count.count() == 1,
                "resolve target must be single-sampled",
            )?;
        }
    }
    if let Some(depth) = desc.depth_stencil_attachment {
        ensure(
            depth.format.is_depth_stencil(),
            "depth/stencil attachment uses a color format",
        )?;
    }
    Ok(())
}

pub fn framebuffer(desc: &FramebufferDescriptor<'_>) -> Result<()> {
    ensure(
        desc.width > 0 && desc.height > 0,
        "framebuffer width or height is zero",
    )
}

/// Every attachment view of a framebuffer must be exactly its size: the
/// render area of a pass is the whole framebuffer on every backend.
pub fn framebuffer_view(
    desc: &FramebufferDescriptor<'_>,
    view_extent: Extent3D,
) -> Result<()> {
    if view_extent.width != desc.width || view_extent.height != desc.height {
        return Err(Error::invalid_argument(format!(
            "view of size {}x{} does not match the {}x{} framebuffer",
            view_extent.width, view_extent.height, desc.width, desc.height
        )));
    }
    Ok(())
}

pub fn render_pass_begin(desc: &RenderPassBeginDescriptor<'_>) -> Result<()> {
    ensure(
        desc.depth_clear_value.is_finite(),
        "depth clear value is not finite",
    )
}

pub fn render_pipeline(desc: &RenderPipelineDescriptor<'_>) -> Result<()> {
    ensure(!desc.vertex.entry_point.is_empty(), "vertex entry point is empty")?;
    if let Some(fragment) = &desc.fragment {
        ensure(
            !fragment.entry_point.is_empty(),
            "fragment entry point is empty",
        )?;
    }
    if let Some(depth) = &desc.depth_stencil {
        ensure(
            depth.format.is_depth_stencil(),
            "depth state uses a color format",
        )?;
    }
    Ok(())
}

pub fn compute_pipeline(desc: &ComputePipelineDescriptor<'_>) -> Result<()> {
    ensure(!desc.entry_point.is_empty(), "compute entry point is empty")
}

pub fn query_set(desc: &QuerySetDescriptor<'_>) -> Result<()> {
    ensure(desc.count > 0, "query set count is zero")
}

pub fn swapchain(desc: &SwapchainDescriptor<'_>) -> Result<()> {
    ensure(
        desc.width > 0 && desc.height > 0,
        "swapchain width or height is zero",
    )?;
    ensure(desc.image_count > 0, "swapchain image count is zero")?;
    ensure(
        desc.format != TextureFormat::Undefined,
        "swapchain format is undefined",
    )?;
    ensure(!desc.usage.is_empty(), "swapchain usage is empty")
}

pub fn copy_buffer_to_buffer(desc: &CopyBufferToBufferDescriptor) -> Result<()> {
    ensure(desc.size > 0, "copy size is zero")
}

pub fn copy_buffer_to_texture(
    desc: &CopyBufferToTextureDescriptor,
) -> Result<()> {
    copy_extent(desc.extent)
}

pub fn copy_texture_to_buffer(
    desc: &CopyTextureToBufferDescriptor,
) -> Result<()> {
    copy_extent(desc.extent)
}

pub fn copy_texture_to_texture(
    desc: &CopyTextureToTextureDescriptor,
) -> Result<()> {
    copy_extent(desc.extent)
}

pub fn blit_texture_to_texture(
    desc: &BlitTextureToTextureDescriptor,
) -> Result<()> {
    copy_extent(desc.source_extent)?;
    copy_extent(desc.destination_extent)
}

/// Check a buffer range bound to a layout entry of type `ty`.
pub fn buffer_binding(
    ty: &BindingType,
    usage: BufferUsage,
    offset: u64,
    len: u64,
    limits: &DeviceLimits,
) -> Result<()> {
    let BindingType::Buffer {
        ty,
        min_binding_size,
        ..
    } = *ty
    else {
        return Err(Error::invalid_argument(
            "buffer bound to a non-buffer binding",
        ));
    };
    let (required, alignment, max) = match ty {
        BufferBindingType::Uniform => (
            BufferUsage::UNIFORM,
            limits.min_uniform_buffer_offset_alignment,
            limits.max_uniform_buffer_binding_size,
        ),
        BufferBindingType::Storage { .. } => (
            BufferUsage::STORAGE,
            limits.min_storage_buffer_offset_alignment,
            limits.max_storage_buffer_binding_size,
        ),
    };
    if !usage.contains(required) {
        return Err(Error::invalid_argument(format!(
            "buffer usage {usage:?} lacks {required:?}"
        )));
    }
    if alignment > 0 && offset % u64::from(alignment) != 0 {
        return Err(Error::invalid_argument(format!(
            "binding offset {offset} is not a multiple of {alignment}"
        )));
    }
    if len < min_binding_size {
        return Err(Error::invalid_argument(format!(
            "binding covers {len} bytes, layout requires {min_binding_size}"
        )));
    }
    if max > 0 && len > u64::from(max) {
        return Err(Error::invalid_argument(format!(
            "binding covers {len} bytes, device allows {max}"
        )));
    }
    Ok(())
}

/// Check a new texture against device limits and its own mip chain.
pub fn texture_limits(
    info: &TextureInfo,
    limits: &DeviceLimits,
) -> Result<()> {
    let size = info.size;
    let (dims, max) = match info.texture_type {
        TextureType::D1 => ([size.width, 1, 1], limits.max_texture_dimension_1d),
        TextureType::D2 | TextureType::Cube => {
            ([size.width, size.height, 1], limits.max_texture_dimension_2d)
        }
        TextureType::D3 => (
            [size.width, size.height, size.depth],
            limits.max_texture_dimension_3d,
        ),
    };
    if dims.iter().any(|d| *d > max) {
        return Err(Error::invalid_argument(format!(
            "texture size {size:?} exceeds the device limit of {max}"
        )));
    }
    if info.layer_count() > limits.max_texture_array_layers {
        return Err(Error::invalid_argument(format!(
            "{} array layers exceed the device limit of {}",
            info.layer_count(),
            limits.max_texture_array_layers
        )));
    }
    let chain = full_mip_chain_len(Extent3D::new(dims[0], dims[1], dims[2]));
    if info.mip_level_count > chain {
        return Err(Error::invalid_argument(format!(
            "{} mip levels requested, size {size:?} has {chain}",
            info.mip_level_count
        )));
    }
    if info.sample_count != SampleCount::X1
        && (info.mip_level_count != 1 || info.texture_type != TextureType::D2)
    {
        return Err(Error::invalid_argument(
            "multisampled textures must be 2D with a single mip level",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::ShaderStage;
    use crate::handle::{
        BindGroupLayoutHandle, BufferHandle, RenderPassHandle, SamplerHandle,
    };
    use slotmap::Key;
    use crate::descriptor::QueueRequest;
    use crate::flags::{BufferUsage, TextureUsage};
    use crate::format::TextureFormat;
    use crate::types::{PresentMode, QueryType};

    #[test]
    fn framebuffer_views_match_exactly() {
        let desc = FramebufferDescriptor {
            label: None,
            render_pass: RenderPassHandle::null(),
            color_attachments: &[],
            depth_stencil_attachment: None,
            width: 64,
            height: 32,
        };
        assert!(framebuffer_view(&desc, Extent3D::d2(64, 32)).is_ok());
        assert!(framebuffer_view(&desc, Extent3D::d2(128, 32)).is_err());
        assert!(framebuffer_view(&desc, Extent3D::d2(64, 16)).is_err());
    }

    #[test]
    fn buffer_rules() {
        let good = BufferDescriptor {
            size: 16,
            usage: BufferUsage::VERTEX,
            ..Default::default()
        };
        assert!(buffer(&good).is_ok());
        assert!(buffer(&BufferDescriptor { size: 0, ..good }).is_err());
        assert!(
            buffer(&BufferDescriptor {
                usage: BufferUsage::empty(),
                ..good
            })
            .is_err()
        );
    }

    #[test]
    fn texture_rules() {
        let good = TextureDescriptor {
            size: Extent3D::d2(4, 4),
            format: TextureFormat::R8G8B8A8Unorm,
            usage: TextureUsage::TEXTURE_BINDING,
            ..Default::default()
        };
        assert!(texture(&good).is_ok());
        assert!(
            texture(&TextureDescriptor {
                format: TextureFormat::Undefined,
                ..good
            })
            .is_err()
        );
        assert!(
            texture(&TextureDescriptor {
                mip_level_count: 0,
                ..good
            })
            .is_err()
        );
        assert!(
            texture(&TextureDescriptor {
                size: Extent3D::new(4, 0, 1),
                ..good
            })
            .is_err()
        );
        // 1D textures only need a width.
        assert!(
            texture(&TextureDescriptor {
                texture_type: TextureType::D1,
                size: Extent3D::new(4, 0, 0),
                ..good
            })
            .is_ok()
        );
        assert!(
            texture(&TextureDescriptor {
                texture_type: TextureType::Cube,
                array_layer_count: 4,
                ..good
            })
            .is_err()
        );
    }

    #[test]
    fn shader_rules() {
        assert!(shader(&ShaderDescriptor::wgsl(None, "")).is_err());
        let bytes = [0u8; 6];
        let desc = ShaderDescriptor {
            label: None,
            source_type: ShaderSourceType::SpirV,
            code: &bytes,
            entry_point: None,
        };
        assert!(shader(&desc).is_err());
        assert!(shader(&ShaderDescriptor::spirv(None, &[1, 2])).is_ok());
    }

    #[test]
    fn swapchain_rules() {
        let good = SwapchainDescriptor {
            label: None,
            width: 800,
            height: 600,
            format: TextureFormat::B8G8R8A8Unorm,
            usage: TextureUsage::RENDER_ATTACHMENT,
            present_mode: PresentMode::Fifo,
            image_count: 3,
        };
        assert!(swapchain(&good).is_ok());
        assert!(
            swapchain(&SwapchainDescriptor {
                image_count: 0,
                ..good
            })
            .is_err()
        );
        assert!(swapchain(&SwapchainDescriptor { width: 0, ..good }).is_err());
    }

    #[test]
    fn misc_rules() {
        let requests = [QueueRequest {
            queue_family_index: 0,
            queue_index: 0,
            priority: 1.5,
        }];
        assert!(
            device(&DeviceDescriptor {
                queue_requests: &requests,
                ..Default::default()
            })
            .is_err()
        );
        assert!(
            query_set(&QuerySetDescriptor {
                label: None,
                query_type: QueryType::Timestamp,
                count: 0,
            })
            .is_err()
        );
        assert!(
            sampler(&SamplerDescriptor {
                max_anisotropy: 0,
                ..Default::default()
            })
            .is_err()
        );
    }

    #[test]
    fn bind_group_must_cover_layout_with_matching_kinds() {
        let layout = [
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStage::COMPUTE,
                ty: BindingType::Buffer {
                    ty: crate::descriptor::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: 0,
                },
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStage::COMPUTE,
                ty: BindingType::Sampler { comparison: false },
            },
        ];
        let buffer = BindingResource::Buffer {
            buffer: BufferHandle::null(),
            offset: 0,
            size: 0,
        };
        let sampler = BindingResource::Sampler(SamplerHandle::null());
        let entries = [
            crate::descriptor::BindGroupEntry {
                binding: 0,
                resource: buffer,
            },
            crate::descriptor::BindGroupEntry {
                binding: 1,
                resource: sampler,
            },
        ];
        let desc = |entries| BindGroupDescriptor {
            label: None,
            layout: BindGroupLayoutHandle::null(),
            entries,
        };
        assert!(bind_group(&layout, &desc(&entries)).is_ok());
        assert!(bind_group(&layout, &desc(&entries[..1])).is_err());

        let swapped = [
            crate::descriptor::BindGroupEntry {
                binding: 0,
                resource: sampler,
            },
            crate::descriptor::BindGroupEntry {
                binding: 1,
                resource: buffer,
            },
        ];
        assert!(bind_group(&layout, &desc(&swapped)).is_err());
    }

    #[test]
    fn layout_bindings_are_unique() {
        let entry = BindGroupLayoutEntry {
            binding: 3,
            visibility: ShaderStage::FRAGMENT,
            ty: BindingType::Sampler { comparison: true },
        };
        let desc = BindGroupLayoutDescriptor {
            label: None,
            entries: &[entry, entry],
        };
        assert!(bind_group_layout(&desc).is_err());
        let desc = BindGroupLayoutDescriptor {
            label: None,
            entries: &[entry],
        };
        assert!(bind_group_layout(&desc).is_ok());
    }

    fn device_limits() -> DeviceLimits {
        DeviceLimits {
            min_uniform_buffer_offset_alignment: 256,
            min_storage_buffer_offset_alignment: 64,
            max_uniform_buffer_binding_size: 65536,
            max_storage_buffer_binding_size: 1 << 27,
            max_buffer_size: 1 << 30,
            max_texture_dimension_1d: 8192,
            max_texture_dimension_2d: 8192,
            max_texture_dimension_3d: 2048,
            max_texture_array_layers: 256,
        }
    }

    fn uniform_binding(min_binding_size: u64) -> BindingType {
        BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size,
        }
    }

    #[test]
    fn uniform_bindings_follow_alignment_and_size_limits() {
        let usage = BufferUsage::UNIFORM;
        let limits = device_limits();
        let check = |min_binding_size, offset| {
            let ty = uniform_binding(min_binding_size);
            buffer_binding(&ty, usage, offset, 64, &limits)
        };
        assert!(check(0, 256).is_ok());
        assert!(check(0, 128).is_err());
        assert!(check(128, 0).is_err());
        assert!(
            buffer_binding(&uniform_binding(0), usage, 0, 65537, &limits).is_err()
        );
    }

    #[test]
    fn buffer_bindings_need_matching_usage() {
        let storage = BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: 0,
        };
        assert!(
            buffer_binding(&storage, BufferUsage::UNIFORM, 0, 16, &device_limits())
                .is_err()
        );
        assert!(
            buffer_binding(&storage, BufferUsage::STORAGE, 64, 16, &device_limits())
                .is_ok()
        );
        let sampler = BindingType::Sampler { comparison: false };
        assert!(
            buffer_binding(&sampler, BufferUsage::STORAGE, 0, 16, &device_limits())
                .is_err()
        );
    }

    fn texture_info(size: Extent3D, ty: TextureType, mips: u32) -> TextureInfo {
        TextureInfo {
            texture_type: ty,
            size,
            array_layer_count: if ty == TextureType::D3 { 1 } else { size.depth },
            mip_level_count: mips,
            sample_count: SampleCount::X1,
            format: TextureFormat::R8G8B8A8Unorm,
            usage: TextureUsage::TEXTURE_BINDING,
        }
    }

    #[test]
    fn texture_mip_counts_are_bounded_by_the_chain() {
        let size = Extent3D::d2(256, 64);
        let full = texture_info(size, TextureType::D2, 9);
        assert!(texture_limits(&full, &device_limits()).is_ok());
        assert!(
            texture_limits(&texture_info(size, TextureType::D2, 10), &device_limits())
                .is_err()
        );
        // Array layers do not lengthen the chain.
        let layered = Extent3D::new(4, 4, 64);
        assert!(
            texture_limits(&texture_info(layered, TextureType::D2, 4), &device_limits())
                .is_err()
        );
        assert!(
            texture_limits(&texture_info(layered, TextureType::D3, 7), &device_limits())
                .is_ok()
        );
    }

    #[test]
    fn texture_dimensions_respect_limits() {
        let wide = Extent3D::d2(8193, 1);
        assert!(
            texture_limits(&texture_info(wide, TextureType::D2, 1), &device_limits())
                .is_err()
        );
        let mut multisampled = texture_info(Extent3D::d2(64, 64), TextureType::D2, 2);
        multisampled.sample_count = SampleCount::X4;
        assert!(texture_limits(&multisampled, &device_limits()).is_err());
        multisampled.mip_level_count = 1;
        assert!(texture_limits(&multisampled, &device_limits()).is_ok());
    }
}
