//! Conversions from `rgfx-core` descriptors and enums to `ash::vk` values.
//!
//! Everything here is a pure function so the tables can be unit tested
//! without a driver.

use ash::vk;
use rgfx_core::descriptor::{BindingType, BufferBindingType, QueueFamilyProperties};
use rgfx_core::{
    AccessFlags, AddressMode, BlendFactor, BlendOperation, BufferUsage,
    ColorWriteMask, CompareFunction, CullMode, FilterMode, FrontFace,
    IndexFormat, LoadOp, MemoryProperty, PipelineStage, PolygonMode,
    PresentMode, PrimitiveTopology, QueueFlags, SampleCount, ShaderStage,
    StencilOperation, StoreOp, TextureFormat, TextureLayout, TextureType,
    TextureUsage, TextureViewType, VertexStepMode,
};

pub fn texture_format(format: TextureFormat) -> vk::Format {
    use TextureFormat as F;
    match format {
        F::Undefined => vk::Format::UNDEFINED,
        F::R8Unorm => vk::Format::R8_UNORM,
        F::R8G8Unorm => vk::Format::R8G8_UNORM,
        F::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
        F::R8G8B8A8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        F::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
        F::B8G8R8A8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        F::R16Float => vk::Format::R16_SFLOAT,
        F::R16G16Float => vk::Format::R16G16_SFLOAT,
        F::R16G16B16A16Float => vk::Format::R16G16B16A16_SFLOAT,
        F::R32Float => vk::Format::R32_SFLOAT,
        F::R32G32Float => vk::Format::R32G32_SFLOAT,
        F::R32G32B32Float => vk::Format::R32G32B32_SFLOAT,
        F::R32G32B32A32Float => vk::Format::R32G32B32A32_SFLOAT,
        F::Depth16Unorm => vk::Format::D16_UNORM,
        F::Depth24Plus | F::Depth24PlusStencil8 => {
            vk::Format::D24_UNORM_S8_UINT
        }
        F::Depth32Float => vk::Format::D32_SFLOAT,
        F::Stencil8 => vk::Format::S8_UINT,
        F::Depth32FloatStencil8 => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

/// Inverse of [`texture_format`] for formats reported by the driver.
/// `D24_UNORM_S8_UINT` comes back as the stencil-carrying variant.
pub fn texture_format_from_vk(format: vk::Format) -> TextureFormat {
    use TextureFormat as F;
    match format {
        vk::Format::R8_UNORM => F::R8Unorm,
        vk::Format::R8G8_UNORM => F::R8G8Unorm,
        vk::Format::R8G8B8A8_UNORM => F::R8G8B8A8Unorm,
        vk::Format::R8G8B8A8_SRGB => F::R8G8B8A8UnormSrgb,
        vk::Format::B8G8R8A8_UNORM => F::B8G8R8A8Unorm,
        vk::Format::B8G8R8A8_SRGB => F::B8G8R8A8UnormSrgb,
        vk::Format::R16_SFLOAT => F::R16Float,
        vk::Format::R16G16_SFLOAT => F::R16G16Float,
        vk::Format::R16G16B16A16_SFLOAT => F::R16G16B16A16Float,
        vk::Format::R32_SFLOAT => F::R32Float,
        vk::Format::R32G32_SFLOAT => F::R32G32Float,
        vk::Format::R32G32B32_SFLOAT => F::R32G32B32Float,
        vk::Format::R32G32B32A32_SFLOAT => F::R32G32B32A32Float,
        vk::Format::D16_UNORM => F::Depth16Unorm,
        vk::Format::D24_UNORM_S8_UINT => F::Depth24PlusStencil8,
        vk::Format::D32_SFLOAT => F::Depth32Float,
        vk::Format::S8_UINT => F::Stencil8,
        vk::Format::D32_SFLOAT_S8_UINT => F::Depth32FloatStencil8,
        _ => F::Undefined,
    }
}

/// Aspect mask covering every aspect of `format`.
///
/// Derived from the native format because `Depth24Plus` is stored with a
/// stencil aspect.
pub fn aspect_mask(format: TextureFormat) -> vk::ImageAspectFlags {
    match texture_format(format) {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Aspect used for sampling and copies: depth only for combined formats.
pub fn view_aspect_mask(format: TextureFormat) -> vk::ImageAspectFlags {
    let full = aspect_mask(format);
    if full.contains(vk::ImageAspectFlags::DEPTH) {
        vk::ImageAspectFlags::DEPTH
    } else {
        full
    }
}

pub fn texture_layout(layout: TextureLayout) -> vk::ImageLayout {
    match layout {
        TextureLayout::Undefined => vk::ImageLayout::UNDEFINED,
        TextureLayout::General => vk::ImageLayout::GENERAL,
        TextureLayout::ColorAttachment => {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        }
        TextureLayout::DepthStencilAttachment => {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        }
        TextureLayout::DepthStencilReadOnly => {
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        }
        TextureLayout::ShaderReadOnly => {
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        }
        TextureLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        TextureLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        TextureLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

/// Stages that read or write a subresource held in `layout`.
pub fn layout_stages(layout: TextureLayout) -> vk::PipelineStageFlags {
    use vk::PipelineStageFlags as S;
    match layout {
        TextureLayout::Undefined => S::TOP_OF_PIPE,
        TextureLayout::General => S::ALL_COMMANDS,
        TextureLayout::ColorAttachment => S::COLOR_ATTACHMENT_OUTPUT,
        TextureLayout::DepthStencilAttachment
        | TextureLayout::DepthStencilReadOnly => {
            S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS
        }
        TextureLayout::ShaderReadOnly => {
            S::VERTEX_SHADER | S::FRAGMENT_SHADER | S::COMPUTE_SHADER
        }
        TextureLayout::TransferSrc | TextureLayout::TransferDst => S::TRANSFER,
        TextureLayout::PresentSrc => S::BOTTOM_OF_PIPE,
    }
}

pub fn pipeline_stages(stages: PipelineStage) -> vk::PipelineStageFlags {
    if stages.contains(PipelineStage::ALL_COMMANDS) {
        return vk::PipelineStageFlags::ALL_COMMANDS;
    }
    if stages.contains(PipelineStage::ALL_GRAPHICS) {
        return vk::PipelineStageFlags::ALL_GRAPHICS;
    }
    // Individual stage bits share their native values.
    vk::PipelineStageFlags::from_raw(stages.bits() & 0x3FFF)
}

pub fn access_flags(access: AccessFlags) -> vk::AccessFlags {
    let mut flags = vk::AccessFlags::from_raw(access.bits() & 0x1FFF);
    if access.contains(AccessFlags::MEMORY_READ) {
        flags |= vk::AccessFlags::MEMORY_READ;
    }
    if access.contains(AccessFlags::MEMORY_WRITE) {
        flags |= vk::AccessFlags::MEMORY_WRITE;
    }
    flags
}

pub fn buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    // Mapped buffers are filled and drained through copies as well.
    if usage.contains(BufferUsage::COPY_SRC)
        || usage.contains(BufferUsage::MAP_WRITE)
    {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST)
        || usage.contains(BufferUsage::MAP_READ)
    {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        flags |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    flags
}

pub fn texture_usage(
    usage: TextureUsage,
    format: TextureFormat,
) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(TextureUsage::COPY_SRC) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(TextureUsage::TEXTURE_BINDING) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::STORAGE_BINDING) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        flags |= if format.is_depth_stencil() {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::ImageUsageFlags::COLOR_ATTACHMENT
        };
    }
    flags
}

pub fn memory_property(flags: vk::MemoryPropertyFlags) -> MemoryProperty {
    let mut props = MemoryProperty::empty();
    if flags.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL) {
        props |= MemoryProperty::DEVICE_LOCAL;
    }
    if flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
        props |= MemoryProperty::HOST_VISIBLE;
    }
    if flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT) {
        props |= MemoryProperty::HOST_COHERENT;
    }
    if flags.contains(vk::MemoryPropertyFlags::HOST_CACHED) {
        props |= MemoryProperty::HOST_CACHED;
    }
    props
}

pub fn queue_family(props: &vk::QueueFamilyProperties) -> QueueFamilyProperties {
    let mut flags = QueueFlags::empty();
    if props.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
        flags |= QueueFlags::GRAPHICS;
    }
    if props.queue_flags.contains(vk::QueueFlags::COMPUTE) {
        flags |= QueueFlags::COMPUTE;
    }
    if props.queue_flags.contains(vk::QueueFlags::TRANSFER) {
        flags |= QueueFlags::TRANSFER;
    }
    if props.queue_flags.contains(vk::QueueFlags::SPARSE_BINDING) {
        flags |= QueueFlags::SPARSE_BINDING;
    }
    QueueFamilyProperties {
        flags,
        queue_count: props.queue_count,
    }
}

pub fn image_type(texture_type: TextureType) -> vk::ImageType {
    match texture_type {
        TextureType::D1 => vk::ImageType::TYPE_1D,
        TextureType::D2 | TextureType::Cube => vk::ImageType::TYPE_2D,
        TextureType::D3 => vk::ImageType::TYPE_3D,
    }
}

pub fn image_view_type(view_type: TextureViewType) -> vk::ImageViewType {
    match view_type {
        TextureViewType::D1 => vk::ImageViewType::TYPE_1D,
        TextureViewType::D2 => vk::ImageViewType::TYPE_2D,
        TextureViewType::D3 => vk::ImageViewType::TYPE_3D,
        TextureViewType::Cube => vk::ImageViewType::CUBE,
        TextureViewType::D1Array => vk::ImageViewType::TYPE_1D_ARRAY,
        TextureViewType::D2Array => vk::ImageViewType::TYPE_2D_ARRAY,
        TextureViewType::CubeArray => vk::ImageViewType::CUBE_ARRAY,
    }
}

pub fn sample_count(count: SampleCount) -> vk::SampleCountFlags {
    // The discriminant is the native bit.
    vk::SampleCountFlags::from_raw(count.count())
}

pub fn filter(mode: FilterMode) -> vk::Filter {
    match mode {
        FilterMode::Nearest => vk::Filter::NEAREST,
        FilterMode::Linear => vk::Filter::LINEAR,
    }
}

pub fn mipmap_mode(mode: FilterMode) -> vk::SamplerMipmapMode {
    match mode {
        FilterMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        FilterMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub fn address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::MirrorRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
    }
}

pub fn compare_op(func: CompareFunction) -> vk::CompareOp {
    match func {
        CompareFunction::Never => vk::CompareOp::NEVER,
        CompareFunction::Less => vk::CompareOp::LESS,
        CompareFunction::Equal => vk::CompareOp::EQUAL,
        CompareFunction::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareFunction::Greater => vk::CompareOp::GREATER,
        CompareFunction::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareFunction::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareFunction::Always => vk::CompareOp::ALWAYS,
    }
}

pub fn load_op(op: LoadOp) -> vk::AttachmentLoadOp {
    match op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

pub fn store_op(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub fn present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
    }
}

pub fn present_mode_from_vk(mode: vk::PresentModeKHR) -> Option<PresentMode> {
    match mode {
        vk::PresentModeKHR::IMMEDIATE => Some(PresentMode::Immediate),
        vk::PresentModeKHR::FIFO => Some(PresentMode::Fifo),
        vk::PresentModeKHR::FIFO_RELAXED => Some(PresentMode::FifoRelaxed),
        vk::PresentModeKHR::MAILBOX => Some(PresentMode::Mailbox),
        _ => None,
    }
}

pub fn index_type(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::Uint16 => vk::IndexType::UINT16,
        IndexFormat::Uint32 => vk::IndexType::UINT32,
    }
}

pub fn primitive_topology(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => {
            vk::PrimitiveTopology::TRIANGLE_LIST
        }
        PrimitiveTopology::TriangleStrip => {
            vk::PrimitiveTopology::TRIANGLE_STRIP
        }
    }
}

pub fn front_face(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

pub fn cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
        CullMode::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
    }
}

pub fn polygon_mode(mode: PolygonMode) -> vk::PolygonMode {
    match mode {
        PolygonMode::Fill => vk::PolygonMode::FILL,
        PolygonMode::Line => vk::PolygonMode::LINE,
        PolygonMode::Point => vk::PolygonMode::POINT,
    }
}

pub fn blend_op(op: BlendOperation) -> vk::BlendOp {
    match op {
        BlendOperation::Add => vk::BlendOp::ADD,
        BlendOperation::Subtract => vk::BlendOp::SUBTRACT,
        BlendOperation::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOperation::Min => vk::BlendOp::MIN,
        BlendOperation::Max => vk::BlendOp::MAX,
    }
}

pub fn blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    use vk::BlendFactor as V;
    match factor {
        BlendFactor::Zero => V::ZERO,
        BlendFactor::One => V::ONE,
        BlendFactor::Src => V::SRC_COLOR,
        BlendFactor::OneMinusSrc => V::ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => V::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => V::ONE_MINUS_SRC_ALPHA,
        BlendFactor::Dst => V::DST_COLOR,
        BlendFactor::OneMinusDst => V::ONE_MINUS_DST_COLOR,
        BlendFactor::DstAlpha => V::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => V::ONE_MINUS_DST_ALPHA,
        BlendFactor::SrcAlphaSaturated => V::SRC_ALPHA_SATURATE,
        BlendFactor::Constant => V::CONSTANT_COLOR,
        BlendFactor::OneMinusConstant => V::ONE_MINUS_CONSTANT_COLOR,
    }
}

pub fn stencil_op(op: StencilOperation) -> vk::StencilOp {
    match op {
        StencilOperation::Keep => vk::StencilOp::KEEP,
        StencilOperation::Zero => vk::StencilOp::ZERO,
        StencilOperation::Replace => vk::StencilOp::REPLACE,
        StencilOperation::IncrementClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOperation::DecrementClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOperation::Invert => vk::StencilOp::INVERT,
        StencilOperation::IncrementWrap => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOperation::DecrementWrap => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

pub fn color_write_mask(mask: ColorWriteMask) -> vk::ColorComponentFlags {
    // Same bit order: R, G, B, A.
    vk::ColorComponentFlags::from_raw(mask.bits())
}

pub fn shader_stages(stages: ShaderStage) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStage::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStage::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    if stages.contains(ShaderStage::COMPUTE) {
        flags |= vk::ShaderStageFlags::COMPUTE;
    }
    flags
}

pub fn vertex_input_rate(mode: VertexStepMode) -> vk::VertexInputRate {
    match mode {
        VertexStepMode::Vertex => vk::VertexInputRate::VERTEX,
        VertexStepMode::Instance => vk::VertexInputRate::INSTANCE,
    }
}

pub fn descriptor_type(ty: &BindingType) -> vk::DescriptorType {
    match *ty {
        BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            ..
        } => vk::DescriptorType::UNIFORM_BUFFER,
        BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: true,
            ..
        } => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        BindingType::Buffer {
            ty: BufferBindingType::Storage { .. },
            has_dynamic_offset: false,
            ..
        } => vk::DescriptorType::STORAGE_BUFFER,
        BindingType::Buffer {
            ty: BufferBindingType::Storage { .. },
            has_dynamic_offset: true,
            ..
        } => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
        BindingType::Sampler { .. } => vk::DescriptorType::SAMPLER,
        BindingType::Texture { .. } => vk::DescriptorType::SAMPLED_IMAGE,
        BindingType::StorageTexture { .. } => vk::DescriptorType::STORAGE_IMAGE,
    }
}

/// Vertex attribute format for a texture format with the same components.
pub fn vertex_format(format: TextureFormat) -> Option<vk::Format> {
    match format {
        TextureFormat::Undefined
        | TextureFormat::Depth16Unorm
        | TextureFormat::Depth24Plus
        | TextureFormat::Depth32Float
        | TextureFormat::Stencil8
        | TextureFormat::Depth24PlusStencil8
        | TextureFormat::Depth32FloatStencil8 => None,
        other => Some(texture_format(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_formats_roundtrip() {
        for format in [
            TextureFormat::R8Unorm,
            TextureFormat::R8G8B8A8UnormSrgb,
            TextureFormat::B8G8R8A8Unorm,
            TextureFormat::R16G16B16A16Float,
            TextureFormat::R32G32B32A32Float,
            TextureFormat::Depth32Float,
        ] {
            assert_eq!(texture_format_from_vk(texture_format(format)), format);
        }
        assert_eq!(
            texture_format_from_vk(vk::Format::A2B10G10R10_UNORM_PACK32),
            TextureFormat::Undefined
        );
    }

    #[test]
    fn depth24_plus_carries_stencil_aspect() {
        assert_eq!(
            texture_format(TextureFormat::Depth24Plus),
            vk::Format::D24_UNORM_S8_UINT
        );
        assert_eq!(
            aspect_mask(TextureFormat::Depth24Plus),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            view_aspect_mask(TextureFormat::Depth24Plus),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_mask(TextureFormat::Stencil8),
            vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            aspect_mask(TextureFormat::R8G8Unorm),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn stage_bits_map_to_native() {
        assert_eq!(
            pipeline_stages(
                PipelineStage::VERTEX_SHADER | PipelineStage::TRANSFER
            ),
            vk::PipelineStageFlags::VERTEX_SHADER
                | vk::PipelineStageFlags::TRANSFER
        );
        assert_eq!(
            pipeline_stages(PipelineStage::ALL_GRAPHICS),
            vk::PipelineStageFlags::ALL_GRAPHICS
        );
        assert_eq!(
            pipeline_stages(PipelineStage::ALL_COMMANDS),
            vk::PipelineStageFlags::ALL_COMMANDS
        );
        assert_eq!(
            pipeline_stages(PipelineStage::BOTTOM_OF_PIPE),
            vk::PipelineStageFlags::BOTTOM_OF_PIPE
        );
    }

    #[test]
    fn memory_access_bits_are_remapped() {
        assert_eq!(
            access_flags(AccessFlags::MEMORY_READ | AccessFlags::MEMORY_WRITE),
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE
        );
        assert_eq!(
            access_flags(
                AccessFlags::TRANSFER_WRITE | AccessFlags::SHADER_READ
            ),
            vk::AccessFlags::TRANSFER_WRITE | vk::AccessFlags::SHADER_READ
        );
    }

    #[test]
    fn mapped_buffers_get_transfer_usage() {
        let flags = buffer_usage(BufferUsage::MAP_READ);
        assert_eq!(flags, vk::BufferUsageFlags::TRANSFER_DST);
        let flags = buffer_usage(BufferUsage::MAP_WRITE | BufferUsage::VERTEX);
        assert!(flags.contains(vk::BufferUsageFlags::TRANSFER_SRC));
        assert!(flags.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
    }

    #[test]
    fn render_attachment_usage_follows_format() {
        assert_eq!(
            texture_usage(
                TextureUsage::RENDER_ATTACHMENT,
                TextureFormat::Depth32Float
            ),
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        );
        assert_eq!(
            texture_usage(
                TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
                TextureFormat::B8G8R8A8Unorm
            ),
            vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn sample_counts_and_write_masks_share_bits() {
        assert_eq!(sample_count(SampleCount::X4), vk::SampleCountFlags::TYPE_4);
        assert_eq!(
            sample_count(SampleCount::X64),
            vk::SampleCountFlags::TYPE_64
        );
        assert_eq!(
            color_write_mask(ColorWriteMask::ALL),
            vk::ColorComponentFlags::RGBA
        );
    }

    #[test]
    fn dynamic_buffers_get_dynamic_descriptors() {
        let ty = BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: true,
            min_binding_size: 0,
        };
        assert_eq!(
            descriptor_type(&ty),
            vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
        );
    }

    #[test]
    fn depth_formats_are_not_vertex_formats() {
        assert_eq!(vertex_format(TextureFormat::Depth16Unorm), None);
        assert_eq!(
            vertex_format(TextureFormat::R32G32Float),
            Some(vk::Format::R32G32_SFLOAT)
        );
    }

    #[test]
    fn present_modes_roundtrip() {
        for mode in [
            PresentMode::Immediate,
            PresentMode::Fifo,
            PresentMode::FifoRelaxed,
            PresentMode::Mailbox,
        ] {
            assert_eq!(present_mode_from_vk(present_mode(mode)), Some(mode));
        }
        assert_eq!(
            present_mode_from_vk(vk::PresentModeKHR::SHARED_DEMAND_REFRESH),
            None
        );
    }
}
