use crate::descriptor::TextureInfo;
use crate::error::{Error, Result};
use crate::flags::AccessFlags;
use crate::types::{Extent3D, Origin3D, TextureLayout, TextureType};

/// Round `value` up to a multiple of `alignment`. An alignment of 0 or 1
/// returns `value` unchanged.
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Round `value` down to a multiple of `alignment`. An alignment of 0 or 1
/// returns `value` unchanged.
pub fn align_down(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value - value % alignment
}

/// Access mask implied by reading or writing a subresource in `layout`.
pub fn access_flags_for_layout(layout: TextureLayout) -> AccessFlags {
    match layout {
        TextureLayout::Undefined => AccessFlags::empty(),
        TextureLayout::General => {
            AccessFlags::MEMORY_READ | AccessFlags::MEMORY_WRITE
        }
        TextureLayout::ColorAttachment => {
            AccessFlags::COLOR_ATTACHMENT_READ
                | AccessFlags::COLOR_ATTACHMENT_WRITE
        }
        TextureLayout::DepthStencilAttachment => {
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        }
        TextureLayout::DepthStencilReadOnly => {
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
        }
        TextureLayout::ShaderReadOnly => AccessFlags::SHADER_READ,
        TextureLayout::TransferSrc => AccessFlags::TRANSFER_READ,
        TextureLayout::TransferDst => AccessFlags::TRANSFER_WRITE,
        TextureLayout::PresentSrc => AccessFlags::MEMORY_READ,
    }
}

/// One dimension of mip `level`: `max(1, dim >> level)`.
pub fn mip_dimension(dim: u32, level: u32) -> u32 {
    dim.checked_shr(level).unwrap_or(0).max(1)
}

/// Size of mip `level`. Depth only shrinks for 3D textures; for the other
/// types it counts array layers.
pub fn mip_level_size(
    size: Extent3D,
    level: u32,
    texture_type: TextureType,
) -> Extent3D {
    Extent3D {
        width: mip_dimension(size.width, level),
        height: mip_dimension(size.height, level),
        depth: match texture_type {
            TextureType::D3 => mip_dimension(size.depth, level),
            _ => size.depth,
        },
    }
}

/// Length of the full mip chain for `size`.
pub fn full_mip_chain_len(size: Extent3D) -> u32 {
    let largest = size.width.max(size.height).max(size.depth).max(1);
    32 - largest.leading_zeros()
}

/// Clamp a `[base, base + count)` mip range to the texture. `count == 0`
/// means "to the end". Returns `None` when the range is empty.
pub fn clamp_mip_range(
    base: u32,
    count: u32,
    total: u32,
) -> Option<std::ops::Range<u32>> {
    if base >= total {
        return None;
    }
    let end = match count {
        0 => total,
        n => base.saturating_add(n).min(total),
    };
    Some(base..end)
}

/// Split an origin/extent into the 3D offset used for texel addressing and
/// the array layer range, following the convention that non-3D textures
/// address layers through `z`/`depth`.
pub fn split_layers(
    origin: Origin3D,
    extent: Extent3D,
    texture_type: TextureType,
) -> (Origin3D, Extent3D, std::ops::Range<u32>) {
    match texture_type {
        TextureType::D3 => (origin, extent, 0..1),
        _ => {
            let base = origin.z.max(0) as u32;
            (
                Origin3D { z: 0, ..origin },
                Extent3D { depth: 1, ..extent },
                base..base + extent.depth.max(1),
            )
        }
    }
}

/// Bytes needed for tightly packed texel data of `extent`.
pub fn packed_data_size(extent: Extent3D, bytes_per_pixel: u32) -> u64 {
    extent.width as u64
        * extent.height as u64
        * extent.depth as u64
        * bytes_per_pixel as u64
}

/// Levels touched when generating mips from `base`: the source level and
/// every level it feeds. `None` when fewer than two levels are in range.
pub fn mip_chain(
    base: u32,
    count: u32,
    total: u32,
) -> Option<std::ops::Range<u32>> {
    if base >= total || count == 0 {
        return None;
    }
    let end = base.saturating_add(count).min(total);
    (end - base > 1).then_some(base..end)
}

/// Check a copy region against `mip` of a texture. Returns the texel
/// offset, the texel extent and the array layers it covers.
pub fn texel_region(
    info: &TextureInfo,
    mip: u32,
    origin: Origin3D,
    extent: Extent3D,
) -> Result<(Origin3D, Extent3D, std::ops::Range<u32>)> {
    if mip >= info.mip_level_count {
        return Err(Error::invalid_argument(format!(
            "mip level {mip} out of range for a texture with {} levels",
            info.mip_level_count
        )));
    }
    if origin.x < 0 || origin.y < 0 || origin.z < 0 {
        return Err(Error::invalid_argument(format!(
            "copy origin {origin:?} is negative"
        )));
    }
    let (offset, texels, layers) =
        split_layers(origin, extent, info.texture_type);
    let mut size = mip_level_size(info.size, mip, info.texture_type);
    if info.texture_type != TextureType::D3 {
        size.depth = 1;
    }
    let fits = |o: i32, len: u32, max: u32| o as u64 + len as u64 <= max as u64;
    if !fits(offset.x, texels.width, size.width)
        || !fits(offset.y, texels.height, size.height)
        || !fits(offset.z, texels.depth, size.depth)
    {
        return Err(Error::invalid_argument(format!(
            "region {extent:?} at {origin:?} exceeds mip {mip} of size \
             {size:?}"
        )));
    }
    if layers.end > info.layer_count() {
        return Err(Error::invalid_argument(format!(
            "layers {layers:?} out of range for a texture with {}",
            info.layer_count()
        )));
    }
    Ok((offset, texels, layers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::TextureUsage;
    use crate::format::TextureFormat;
    use crate::types::SampleCount;

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(13, 0), 13);
        assert_eq!(align_down(511, 256), 256);
        assert_eq!(align_down(512, 256), 512);
        assert_eq!(align_down(13, 0), 13);
    }

    #[test]
    fn access_flags_follow_layout() {
        assert_eq!(
            access_flags_for_layout(TextureLayout::Undefined),
            AccessFlags::empty()
        );
        assert_eq!(
            access_flags_for_layout(TextureLayout::TransferDst),
            AccessFlags::TRANSFER_WRITE
        );
        assert_eq!(
            access_flags_for_layout(TextureLayout::PresentSrc),
            AccessFlags::MEMORY_READ
        );
        assert!(
            access_flags_for_layout(TextureLayout::General)
                .contains(AccessFlags::MEMORY_WRITE)
        );
    }

    #[test]
    fn mip_sizes_halve_and_floor_at_one() {
        assert_eq!(mip_dimension(800, 1), 400);
        assert_eq!(mip_dimension(600, 3), 75);
        assert_eq!(mip_dimension(5, 1), 2);
        assert_eq!(mip_dimension(1, 4), 1);
        assert_eq!(mip_dimension(256, 40), 1);

        let size = mip_level_size(Extent3D::new(64, 16, 6), 3, TextureType::D2);
        assert_eq!(size, Extent3D::new(8, 2, 6));
        let size = mip_level_size(Extent3D::new(64, 16, 8), 3, TextureType::D3);
        assert_eq!(size, Extent3D::new(8, 2, 1));
    }

    #[test]
    fn full_chain_length() {
        assert_eq!(full_mip_chain_len(Extent3D::d2(1, 1)), 1);
        assert_eq!(full_mip_chain_len(Extent3D::d2(256, 256)), 9);
        assert_eq!(full_mip_chain_len(Extent3D::d2(800, 600)), 10);
    }

    #[test]
    fn mip_range_clamps() {
        assert_eq!(clamp_mip_range(0, 0, 5), Some(0..5));
        assert_eq!(clamp_mip_range(2, 10, 5), Some(2..5));
        assert_eq!(clamp_mip_range(1, 2, 5), Some(1..3));
        assert_eq!(clamp_mip_range(5, 1, 5), None);
    }

    #[test]
    fn array_layers_come_from_z() {
        let (origin, extent, layers) = split_layers(
            Origin3D::new(4, 4, 2),
            Extent3D::new(8, 8, 3),
            TextureType::D2,
        );
        assert_eq!(origin, Origin3D::new(4, 4, 0));
        assert_eq!(extent, Extent3D::new(8, 8, 1));
        assert_eq!(layers, 2..5);

        let (origin, extent, layers) = split_layers(
            Origin3D::new(0, 0, 2),
            Extent3D::new(8, 8, 3),
            TextureType::D3,
        );
        assert_eq!(origin.z, 2);
        assert_eq!(extent.depth, 3);
        assert_eq!(layers, 0..1);
    }

    fn info_2d(width: u32, height: u32, mips: u32, layers: u32) -> TextureInfo {
        TextureInfo {
            texture_type: TextureType::D2,
            size: Extent3D::new(width, height, layers),
            array_layer_count: layers,
            mip_level_count: mips,
            sample_count: SampleCount::X1,
            format: TextureFormat::R8G8B8A8Unorm,
            usage: TextureUsage::COPY_SRC | TextureUsage::COPY_DST,
        }
    }

    #[test]
    fn mip_chain_follows_range_rules() {
        assert_eq!(mip_chain(0, u32::MAX, 5), Some(0..5));
        assert_eq!(mip_chain(2, 10, 5), Some(2..5));
        assert_eq!(mip_chain(1, 2, 5), Some(1..3));
        // Single level textures and one-level ranges have nothing to fill.
        assert_eq!(mip_chain(0, u32::MAX, 1), None);
        assert_eq!(mip_chain(4, 3, 5), None);
        assert_eq!(mip_chain(0, 0, 5), None);
        assert_eq!(mip_chain(5, 1, 5), None);
    }

    #[test]
    fn texel_region_addresses_layers_through_depth() {
        let info = info_2d(64, 32, 3, 4);
        let (offset, texels, layers) = texel_region(
            &info,
            1,
            Origin3D::new(8, 0, 1),
            Extent3D::new(24, 16, 2),
        )
        .unwrap();
        assert_eq!(offset, Origin3D::new(8, 0, 0));
        assert_eq!(texels, Extent3D::new(24, 16, 1));
        assert_eq!(layers, 1..3);
    }

    #[test]
    fn texel_region_rejects_out_of_bounds() {
        let info = info_2d(64, 32, 3, 4);
        // Mip 2 is 16x8.
        assert!(
            texel_region(&info, 2, Origin3D::ZERO, Extent3D::new(17, 8, 1))
                .is_err()
        );
        assert!(
            texel_region(&info, 3, Origin3D::ZERO, Extent3D::new(1, 1, 1))
                .is_err()
        );
        assert!(
            texel_region(&info, 0, Origin3D::new(0, 0, 3), Extent3D::new(1, 1, 2))
                .is_err()
        );
        assert!(
            texel_region(&info, 0, Origin3D::new(-1, 0, 0), Extent3D::new(1, 1, 1))
                .is_err()
        );
    }
}
