//! Conversions between `rgfx-core` values and `wgpu` types.
//!
//! Everything here is a pure function so the tables can be unit tested
//! without an adapter.

use rgfx_core::descriptor::{BindingType, BufferBindingType, TextureInfo};
use rgfx_core::{
    AdapterType, AddressMode, BlendFactor, BlendOperation, BufferUsage,
    ColorWriteMask, CompareFunction, CullMode, FilterMode, FrontFace,
    IndexFormat, PolygonMode, PresentMode, PrimitiveTopology, QueryType,
    ShaderStage, StencilOperation, TextureFormat, TextureSampleType,
    TextureType, TextureUsage, TextureViewType, VertexStepMode,
};

/// `None` for [`TextureFormat::Undefined`] and formats WebGPU cannot
/// sample or render (three-component 32-bit floats).
pub fn texture_format(format: TextureFormat) -> Option<wgpu::TextureFormat> {
    use TextureFormat as F;
    use wgpu::TextureFormat as W;
    Some(match format {
        F::Undefined | F::R32G32B32Float => return None,
        F::R8Unorm => W::R8Unorm,
        F::R8G8Unorm => W::Rg8Unorm,
        F::R8G8B8A8Unorm => W::Rgba8Unorm,
        F::R8G8B8A8UnormSrgb => W::Rgba8UnormSrgb,
        F::B8G8R8A8Unorm => W::Bgra8Unorm,
        F::B8G8R8A8UnormSrgb => W::Bgra8UnormSrgb,
        F::R16Float => W::R16Float,
        F::R16G16Float => W::Rg16Float,
        F::R16G16B16A16Float => W::Rgba16Float,
        F::R32Float => W::R32Float,
        F::R32G32Float => W::Rg32Float,
        F::R32G32B32A32Float => W::Rgba32Float,
        F::Depth16Unorm => W::Depth16Unorm,
        F::Depth24Plus => W::Depth24Plus,
        F::Depth32Float => W::Depth32Float,
        F::Stencil8 => W::Stencil8,
        F::Depth24PlusStencil8 => W::Depth24PlusStencil8,
        F::Depth32FloatStencil8 => W::Depth32FloatStencil8,
    })
}

/// Like [`texture_format`], failing with `FeatureNotSupported`.
pub fn require_texture_format(
    format: TextureFormat,
) -> rgfx_core::Result<wgpu::TextureFormat> {
    texture_format(format).ok_or_else(|| {
        rgfx_core::Error::unsupported(format!(
            "{format:?} has no WebGPU texture format"
        ))
    })
}

/// Inverse of [`texture_format`]; formats outside the core set come back
/// as [`TextureFormat::Undefined`].
pub fn texture_format_from_wgpu(format: wgpu::TextureFormat) -> TextureFormat {
    use TextureFormat as F;
    use wgpu::TextureFormat as W;
    match format {
        W::R8Unorm => F::R8Unorm,
        W::Rg8Unorm => F::R8G8Unorm,
        W::Rgba8Unorm => F::R8G8B8A8Unorm,
        W::Rgba8UnormSrgb => F::R8G8B8A8UnormSrgb,
        W::Bgra8Unorm => F::B8G8R8A8Unorm,
        W::Bgra8UnormSrgb => F::B8G8R8A8UnormSrgb,
        W::R16Float => F::R16Float,
        W::Rg16Float => F::R16G16Float,
        W::Rgba16Float => F::R16G16B16A16Float,
        W::R32Float => F::R32Float,
        W::Rg32Float => F::R32G32Float,
        W::Rgba32Float => F::R32G32B32A32Float,
        W::Depth16Unorm => F::Depth16Unorm,
        W::Depth24Plus => F::Depth24Plus,
        W::Depth32Float => F::Depth32Float,
        W::Stencil8 => F::Stencil8,
        W::Depth24PlusStencil8 => F::Depth24PlusStencil8,
        W::Depth32FloatStencil8 => F::Depth32FloatStencil8,
        _ => F::Undefined,
    }
}

/// Aspect addressed by copies. Combined depth-stencil textures copy their
/// depth plane.
pub fn copy_aspect(format: TextureFormat) -> wgpu::TextureAspect {
    if format.has_depth() && format.has_stencil() {
        wgpu::TextureAspect::DepthOnly
    } else {
        wgpu::TextureAspect::All
    }
}

pub fn vertex_format(format: TextureFormat) -> Option<wgpu::VertexFormat> {
    use TextureFormat as F;
    use wgpu::VertexFormat as V;
    Some(match format {
        F::R32Float => V::Float32,
        F::R32G32Float => V::Float32x2,
        F::R32G32B32Float => V::Float32x3,
        F::R32G32B32A32Float => V::Float32x4,
        F::R8G8Unorm => V::Unorm8x2,
        F::R8G8B8A8Unorm => V::Unorm8x4,
        F::R16G16Float => V::Float16x2,
        F::R16G16B16A16Float => V::Float16x4,
        _ => return None,
    })
}

pub fn buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut flags = wgpu::BufferUsages::empty();
    for (ours, theirs) in [
        (BufferUsage::MAP_READ, wgpu::BufferUsages::MAP_READ),
        (BufferUsage::MAP_WRITE, wgpu::BufferUsages::MAP_WRITE),
        (BufferUsage::COPY_SRC, wgpu::BufferUsages::COPY_SRC),
        (BufferUsage::COPY_DST, wgpu::BufferUsages::COPY_DST),
        (BufferUsage::INDEX, wgpu::BufferUsages::INDEX),
        (BufferUsage::VERTEX, wgpu::BufferUsages::VERTEX),
        (BufferUsage::UNIFORM, wgpu::BufferUsages::UNIFORM),
        (BufferUsage::STORAGE, wgpu::BufferUsages::STORAGE),
        (BufferUsage::INDIRECT, wgpu::BufferUsages::INDIRECT),
    ] {
        if usage.contains(ours) {
            flags |= theirs;
        }
    }
    // Query results are resolved through copy-destination buffers.
    if usage.contains(BufferUsage::COPY_DST) && !usage.is_mappable() {
        flags |= wgpu::BufferUsages::QUERY_RESOLVE;
    }
    flags
}

pub fn buffer_usage_from_wgpu(usage: wgpu::BufferUsages) -> BufferUsage {
    let mut flags = BufferUsage::empty();
    for (theirs, ours) in [
        (wgpu::BufferUsages::MAP_READ, BufferUsage::MAP_READ),
        (wgpu::BufferUsages::MAP_WRITE, BufferUsage::MAP_WRITE),
        (wgpu::BufferUsages::COPY_SRC, BufferUsage::COPY_SRC),
        (wgpu::BufferUsages::COPY_DST, BufferUsage::COPY_DST),
        (wgpu::BufferUsages::INDEX, BufferUsage::INDEX),
        (wgpu::BufferUsages::VERTEX, BufferUsage::VERTEX),
        (wgpu::BufferUsages::UNIFORM, BufferUsage::UNIFORM),
        (wgpu::BufferUsages::STORAGE, BufferUsage::STORAGE),
        (wgpu::BufferUsages::INDIRECT, BufferUsage::INDIRECT),
    ] {
        if usage.contains(theirs) {
            flags |= ours;
        }
    }
    flags
}

const TEXTURE_USAGES: [(TextureUsage, wgpu::TextureUsages); 5] = [
    (TextureUsage::COPY_SRC, wgpu::TextureUsages::COPY_SRC),
    (TextureUsage::COPY_DST, wgpu::TextureUsages::COPY_DST),
    (TextureUsage::TEXTURE_BINDING, wgpu::TextureUsages::TEXTURE_BINDING),
    (TextureUsage::STORAGE_BINDING, wgpu::TextureUsages::STORAGE_BINDING),
    (
        TextureUsage::RENDER_ATTACHMENT,
        wgpu::TextureUsages::RENDER_ATTACHMENT,
    ),
];

pub fn texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    TEXTURE_USAGES
        .iter()
        .filter(|(ours, _)| usage.contains(*ours))
        .fold(wgpu::TextureUsages::empty(), |acc, (_, theirs)| acc | *theirs)
}

pub fn texture_usage_from_wgpu(usage: wgpu::TextureUsages) -> TextureUsage {
    TEXTURE_USAGES
        .iter()
        .filter(|(_, theirs)| usage.contains(*theirs))
        .fold(TextureUsage::empty(), |acc, (ours, _)| acc | *ours)
}

pub fn texture_dimension(ty: TextureType) -> wgpu::TextureDimension {
    match ty {
        TextureType::D1 => wgpu::TextureDimension::D1,
        TextureType::D2 | TextureType::Cube => wgpu::TextureDimension::D2,
        TextureType::D3 => wgpu::TextureDimension::D3,
    }
}

/// Native size of a texture: depth for 3D textures, layers otherwise.
pub fn texture_extent(info: &TextureInfo) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: info.size.width,
        height: info.size.height,
        depth_or_array_layers: match info.texture_type {
            TextureType::D3 => info.size.depth,
            _ => info.layer_count(),
        },
    }
}

pub fn view_dimension(ty: TextureViewType) -> wgpu::TextureViewDimension {
    match ty {
        TextureViewType::D1 => wgpu::TextureViewDimension::D1,
        TextureViewType::D2 => wgpu::TextureViewDimension::D2,
        TextureViewType::D3 => wgpu::TextureViewDimension::D3,
        TextureViewType::Cube => wgpu::TextureViewDimension::Cube,
        TextureViewType::D2Array => wgpu::TextureViewDimension::D2Array,
        TextureViewType::CubeArray => wgpu::TextureViewDimension::CubeArray,
        // WebGPU has no 1D arrays; bind them as 2D arrays of height one.
        TextureViewType::D1Array => wgpu::TextureViewDimension::D2Array,
    }
}

pub fn sample_type(ty: TextureSampleType) -> wgpu::TextureSampleType {
    match ty {
        TextureSampleType::Float => {
            wgpu::TextureSampleType::Float { filterable: true }
        }
        TextureSampleType::UnfilterableFloat => {
            wgpu::TextureSampleType::Float { filterable: false }
        }
        TextureSampleType::Depth => wgpu::TextureSampleType::Depth,
        TextureSampleType::Sint => wgpu::TextureSampleType::Sint,
        TextureSampleType::Uint => wgpu::TextureSampleType::Uint,
    }
}

pub fn binding_type(
    ty: &BindingType,
) -> rgfx_core::Result<wgpu::BindingType> {
    Ok(match *ty {
        BindingType::Buffer {
            ty,
            has_dynamic_offset,
            min_binding_size,
        } => wgpu::BindingType::Buffer {
            ty: match ty {
                BufferBindingType::Uniform => wgpu::BufferBindingType::Uniform,
                BufferBindingType::Storage { read_only } => {
                    wgpu::BufferBindingType::Storage { read_only }
                }
            },
            has_dynamic_offset,
            min_binding_size: std::num::NonZeroU64::new(min_binding_size),
        },
        BindingType::Sampler { comparison } => {
            wgpu::BindingType::Sampler(if comparison {
                wgpu::SamplerBindingType::Comparison
            } else {
                wgpu::SamplerBindingType::Filtering
            })
        }
        BindingType::Texture {
            sample_type: ty,
            view_dimension: dimension,
            multisampled,
        } => wgpu::BindingType::Texture {
            sample_type: sample_type(ty),
            view_dimension: view_dimension(dimension),
            multisampled,
        },
        BindingType::StorageTexture {
            format,
            view_dimension: dimension,
            write_only,
        } => wgpu::BindingType::StorageTexture {
            access: if write_only {
                wgpu::StorageTextureAccess::WriteOnly
            } else {
                wgpu::StorageTextureAccess::ReadWrite
            },
            format: require_texture_format(format)?,
            view_dimension: view_dimension(dimension),
        },
    })
}

pub fn shader_stages(stages: ShaderStage) -> wgpu::ShaderStages {
    let mut flags = wgpu::ShaderStages::NONE;
    if stages.contains(ShaderStage::VERTEX) {
        flags |= wgpu::ShaderStages::VERTEX;
    }
    if stages.contains(ShaderStage::FRAGMENT) {
        flags |= wgpu::ShaderStages::FRAGMENT;
    }
    if stages.contains(ShaderStage::COMPUTE) {
        flags |= wgpu::ShaderStages::COMPUTE;
    }
    flags
}

pub fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

pub fn filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

pub fn compare_function(f: CompareFunction) -> wgpu::CompareFunction {
    match f {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

pub fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    use BlendFactor as B;
    use wgpu::BlendFactor as W;
    match factor {
        B::Zero => W::Zero,
        B::One => W::One,
        B::Src => W::Src,
        B::OneMinusSrc => W::OneMinusSrc,
        B::SrcAlpha => W::SrcAlpha,
        B::OneMinusSrcAlpha => W::OneMinusSrcAlpha,
        B::Dst => W::Dst,
        B::OneMinusDst => W::OneMinusDst,
        B::DstAlpha => W::DstAlpha,
        B::OneMinusDstAlpha => W::OneMinusDstAlpha,
        B::SrcAlphaSaturated => W::SrcAlphaSaturated,
        B::Constant => W::Constant,
        B::OneMinusConstant => W::OneMinusConstant,
    }
}

pub fn blend_operation(op: BlendOperation) -> wgpu::BlendOperation {
    match op {
        BlendOperation::Add => wgpu::BlendOperation::Add,
        BlendOperation::Subtract => wgpu::BlendOperation::Subtract,
        BlendOperation::ReverseSubtract => {
            wgpu::BlendOperation::ReverseSubtract
        }
        BlendOperation::Min => wgpu::BlendOperation::Min,
        BlendOperation::Max => wgpu::BlendOperation::Max,
    }
}

pub fn stencil_operation(op: StencilOperation) -> wgpu::StencilOperation {
    use StencilOperation as S;
    use wgpu::StencilOperation as W;
    match op {
        S::Keep => W::Keep,
        S::Zero => W::Zero,
        S::Replace => W::Replace,
        S::IncrementClamp => W::IncrementClamp,
        S::DecrementClamp => W::DecrementClamp,
        S::Invert => W::Invert,
        S::IncrementWrap => W::IncrementWrap,
        S::DecrementWrap => W::DecrementWrap,
    }
}

pub fn color_writes(mask: ColorWriteMask) -> wgpu::ColorWrites {
    wgpu::ColorWrites::from_bits_truncate(mask.bits())
}

pub fn primitive_topology(t: PrimitiveTopology) -> wgpu::PrimitiveTopology {
    match t {
        PrimitiveTopology::PointList => wgpu::PrimitiveTopology::PointList,
        PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
        PrimitiveTopology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        PrimitiveTopology::TriangleList => {
            wgpu::PrimitiveTopology::TriangleList
        }
        PrimitiveTopology::TriangleStrip => {
            wgpu::PrimitiveTopology::TriangleStrip
        }
    }
}

pub fn front_face(face: FrontFace) -> wgpu::FrontFace {
    match face {
        FrontFace::CounterClockwise => wgpu::FrontFace::Ccw,
        FrontFace::Clockwise => wgpu::FrontFace::Cw,
    }
}

/// WebGPU culls at most one face.
pub fn cull_mode(mode: CullMode) -> rgfx_core::Result<Option<wgpu::Face>> {
    match mode {
        CullMode::None => Ok(None),
        CullMode::Front => Ok(Some(wgpu::Face::Front)),
        CullMode::Back => Ok(Some(wgpu::Face::Back)),
        CullMode::FrontAndBack => Err(rgfx_core::Error::unsupported(
            "WebGPU cannot cull both faces",
        )),
    }
}

pub fn polygon_mode(mode: PolygonMode) -> wgpu::PolygonMode {
    match mode {
        PolygonMode::Fill => wgpu::PolygonMode::Fill,
        PolygonMode::Line => wgpu::PolygonMode::Line,
        PolygonMode::Point => wgpu::PolygonMode::Point,
    }
}

pub fn index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
        IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
    }
}

pub fn step_mode(mode: VertexStepMode) -> wgpu::VertexStepMode {
    match mode {
        VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
        VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
    }
}

pub fn query_type(ty: QueryType) -> wgpu::QueryType {
    match ty {
        QueryType::Occlusion => wgpu::QueryType::Occlusion,
        QueryType::Timestamp => wgpu::QueryType::Timestamp,
    }
}

pub fn present_mode(mode: PresentMode) -> wgpu::PresentMode {
    match mode {
        PresentMode::Immediate => wgpu::PresentMode::Immediate,
        PresentMode::Fifo => wgpu::PresentMode::Fifo,
        PresentMode::FifoRelaxed => wgpu::PresentMode::FifoRelaxed,
        PresentMode::Mailbox => wgpu::PresentMode::Mailbox,
    }
}

/// `None` for the automatic modes, which only exist on the wgpu side.
pub fn present_mode_from_wgpu(mode: wgpu::PresentMode) -> Option<PresentMode> {
    match mode {
        wgpu::PresentMode::Immediate => Some(PresentMode::Immediate),
        wgpu::PresentMode::Fifo => Some(PresentMode::Fifo),
        wgpu::PresentMode::FifoRelaxed => Some(PresentMode::FifoRelaxed),
        wgpu::PresentMode::Mailbox => Some(PresentMode::Mailbox),
        _ => None,
    }
}

pub fn adapter_type(ty: wgpu::DeviceType) -> AdapterType {
    match ty {
        wgpu::DeviceType::DiscreteGpu => AdapterType::DiscreteGpu,
        wgpu::DeviceType::IntegratedGpu => AdapterType::IntegratedGpu,
        wgpu::DeviceType::Cpu => AdapterType::Cpu,
        _ => AdapterType::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use rgfx_core::{Extent3D, SampleCount};

    use super::*;

    const ALL_FORMATS: [TextureFormat; 19] = [
        TextureFormat::R8Unorm,
        TextureFormat::R8G8Unorm,
        TextureFormat::R8G8B8A8Unorm,
        TextureFormat::R8G8B8A8UnormSrgb,
        TextureFormat::B8G8R8A8Unorm,
        TextureFormat::B8G8R8A8UnormSrgb,
        TextureFormat::R16Float,
        TextureFormat::R16G16Float,
        TextureFormat::R16G16B16A16Float,
        TextureFormat::R32Float,
        TextureFormat::R32G32Float,
        TextureFormat::R32G32B32Float,
        TextureFormat::R32G32B32A32Float,
        TextureFormat::Depth16Unorm,
        TextureFormat::Depth24Plus,
        TextureFormat::Depth32Float,
        TextureFormat::Stencil8,
        TextureFormat::Depth24PlusStencil8,
        TextureFormat::Depth32FloatStencil8,
    ];

    #[test]
    fn texture_formats_roundtrip() {
        for format in ALL_FORMATS {
            match texture_format(format) {
                Some(native) => {
                    assert_eq!(texture_format_from_wgpu(native), format)
                }
                None => assert_eq!(format, TextureFormat::R32G32B32Float),
            }
        }
        assert_eq!(texture_format(TextureFormat::Undefined), None);
        assert_eq!(
            texture_format_from_wgpu(wgpu::TextureFormat::Rgba8Sint),
            TextureFormat::Undefined
        );
    }

    #[test]
    fn rgb32_is_a_vertex_format_only() {
        assert!(require_texture_format(TextureFormat::R32G32B32Float).is_err());
        assert_eq!(
            vertex_format(TextureFormat::R32G32B32Float),
            Some(wgpu::VertexFormat::Float32x3)
        );
        assert_eq!(vertex_format(TextureFormat::Depth32Float), None);
    }

    #[test]
    fn resolvable_buffers_get_query_resolve() {
        let flags = buffer_usage(BufferUsage::COPY_DST | BufferUsage::STORAGE);
        assert!(flags.contains(wgpu::BufferUsages::QUERY_RESOLVE));
        let flags = buffer_usage(BufferUsage::COPY_DST | BufferUsage::MAP_READ);
        assert_eq!(
            flags,
            wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ
        );
        assert_eq!(
            buffer_usage_from_wgpu(buffer_usage(
                BufferUsage::COPY_DST | BufferUsage::UNIFORM
            )),
            BufferUsage::COPY_DST | BufferUsage::UNIFORM
        );
    }

    #[test]
    fn texture_usages_roundtrip() {
        let usage = TextureUsage::RENDER_ATTACHMENT
            | TextureUsage::TEXTURE_BINDING
            | TextureUsage::COPY_SRC;
        assert_eq!(texture_usage_from_wgpu(texture_usage(usage)), usage);
    }

    #[test]
    fn layered_textures_use_array_extents() {
        let info = TextureInfo {
            texture_type: TextureType::Cube,
            size: Extent3D::d2(64, 64),
            array_layer_count: 2,
            mip_level_count: 1,
            sample_count: SampleCount::X1,
            format: TextureFormat::R8G8B8A8Unorm,
            usage: TextureUsage::TEXTURE_BINDING,
        };
        let extent = texture_extent(&info);
        assert_eq!(extent.depth_or_array_layers, info.layer_count());
        assert_eq!(texture_dimension(info.texture_type), wgpu::TextureDimension::D2);

        let volume = TextureInfo {
            texture_type: TextureType::D3,
            size: Extent3D::new(16, 16, 8),
            array_layer_count: 1,
            ..info
        };
        assert_eq!(texture_extent(&volume).depth_or_array_layers, 8);
    }

    #[test]
    fn combined_depth_stencil_copies_depth() {
        assert_eq!(
            copy_aspect(TextureFormat::Depth24PlusStencil8),
            wgpu::TextureAspect::DepthOnly
        );
        assert_eq!(
            copy_aspect(TextureFormat::Depth32Float),
            wgpu::TextureAspect::All
        );
    }

    #[test]
    fn double_sided_culling_is_unsupported() {
        assert!(cull_mode(CullMode::FrontAndBack).is_err());
        assert_eq!(cull_mode(CullMode::Back).unwrap(), Some(wgpu::Face::Back));
    }

    #[test]
    fn present_modes_roundtrip() {
        for mode in [
            PresentMode::Immediate,
            PresentMode::Fifo,
            PresentMode::FifoRelaxed,
            PresentMode::Mailbox,
        ] {
            assert_eq!(present_mode_from_wgpu(present_mode(mode)), Some(mode));
        }
        assert_eq!(present_mode_from_wgpu(wgpu::PresentMode::AutoVsync), None);
    }

    #[test]
    fn write_masks_share_bits() {
        assert_eq!(color_writes(ColorWriteMask::ALL), wgpu::ColorWrites::ALL);
        assert_eq!(
            color_writes(ColorWriteMask::RED | ColorWriteMask::ALPHA),
            wgpu::ColorWrites::RED | wgpu::ColorWrites::ALPHA
        );
    }

    #[test]
    fn unfilterable_floats_stay_unfilterable() {
        assert_eq!(
            sample_type(TextureSampleType::UnfilterableFloat),
            wgpu::TextureSampleType::Float { filterable: false }
        );
        let ty = binding_type(&BindingType::Sampler { comparison: true })
            .unwrap();
        assert_eq!(
            ty,
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison)
        );
    }
}
