use crate::flags::ColorWriteMask;
use crate::format::TextureFormat;
use crate::handle::{BindGroupLayoutHandle, RenderPassHandle, ShaderHandle};
use crate::types::{
    BlendFactor, BlendOperation, CompareFunction, CullMode, FrontFace,
    IndexFormat, PolygonMode, PrimitiveTopology, SampleCount,
    StencilOperation, VertexStepMode,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendComponent {
    pub operation: BlendOperation,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
}

impl BlendComponent {
    pub const REPLACE: Self = Self {
        operation: BlendOperation::Add,
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
    };
    pub const OVER: Self = Self {
        operation: BlendOperation::Add,
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::OneMinusSrcAlpha,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

impl BlendState {
    pub const ALPHA_BLENDING: Self = Self {
        color: BlendComponent {
            operation: BlendOperation::Add,
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
        },
        alpha: BlendComponent::OVER,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorTargetState {
    pub format: TextureFormat,
    pub blend: Option<BlendState>,
    pub write_mask: ColorWriteMask,
}

/// A vertex attribute. The format is expressed as the texture format with
/// the same component layout, e.g. `R32G32Float` for a `vec2<f32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub format: TextureFormat,
    pub offset: u64,
    pub shader_location: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct VertexBufferLayout<'a> {
    pub array_stride: u64,
    pub attributes: &'a [VertexAttribute],
    pub step_mode: VertexStepMode,
}

#[derive(Debug, Clone, Copy)]
pub struct VertexState<'a> {
    pub module: ShaderHandle,
    pub entry_point: &'a str,
    pub buffers: &'a [VertexBufferLayout<'a>],
}

#[derive(Debug, Clone, Copy)]
pub struct FragmentState<'a> {
    pub module: ShaderHandle,
    pub entry_point: &'a str,
    pub targets: &'a [ColorTargetState],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrimitiveState {
    pub topology: PrimitiveTopology,
    pub strip_index_format: Option<IndexFormat>,
    pub front_face: FrontFace,
    pub cull_mode: CullMode,
    pub polygon_mode: PolygonMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilFaceState {
    pub compare: CompareFunction,
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            compare: CompareFunction::Always,
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
    pub stencil_front: StencilFaceState,
    pub stencil_back: StencilFaceState,
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
    pub depth_bias: i32,
    pub depth_bias_slope_scale: f32,
    pub depth_bias_clamp: f32,
}

impl DepthStencilState {
    pub fn depth_only(
        format: TextureFormat,
        depth_write_enabled: bool,
        depth_compare: CompareFunction,
    ) -> Self {
        Self {
            format,
            depth_write_enabled,
            depth_compare,
            stencil_front: StencilFaceState::default(),
            stencil_back: StencilFaceState::default(),
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            depth_bias: 0,
            depth_bias_slope_scale: 0.0,
            depth_bias_clamp: 0.0,
        }
    }

    pub fn stencil_enabled(&self) -> bool {
        self.stencil_front != StencilFaceState::default()
            || self.stencil_back != StencilFaceState::default()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderPipelineDescriptor<'a> {
    pub label: Option<&'a str>,
    /// Render pass whose attachment signature the pipeline targets.
    pub render_pass: RenderPassHandle,
    pub vertex: VertexState<'a>,
    pub fragment: Option<FragmentState<'a>>,
    pub primitive: PrimitiveState,
    pub depth_stencil: Option<DepthStencilState>,
    pub sample_count: SampleCount,
    pub bind_group_layouts: &'a [BindGroupLayoutHandle],
}

#[derive(Debug, Clone, Copy)]
pub struct ComputePipelineDescriptor<'a> {
    pub label: Option<&'a str>,
    pub compute: ShaderHandle,
    pub entry_point: &'a str,
    pub bind_group_layouts: &'a [BindGroupLayoutHandle],
}
