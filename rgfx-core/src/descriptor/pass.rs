use crate::format::TextureFormat;
use crate::handle::{
    FramebufferHandle, QuerySetHandle, RenderPassHandle, TextureViewHandle,
};
use crate::types::{Color, LoadOp, SampleCount, StoreOp, TextureLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadStoreOps {
    pub load: LoadOp,
    pub store: StoreOp,
}

impl LoadStoreOps {
    pub const CLEAR_STORE: Self = Self {
        load: LoadOp::Clear,
        store: StoreOp::Store,
    };
    pub const LOAD_STORE: Self = Self {
        load: LoadOp::Load,
        store: StoreOp::Store,
    };
    pub const DONT_CARE: Self = Self {
        load: LoadOp::DontCare,
        store: StoreOp::DontCare,
    };
}

/// Format and behaviour of one color slot (main or resolve).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassColorTarget {
    pub format: TextureFormat,
    pub sample_count: SampleCount,
    pub ops: LoadStoreOps,
    pub final_layout: TextureLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassColorAttachment {
    pub target: RenderPassColorTarget,
    pub resolve_target: Option<RenderPassColorTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassDepthStencilTarget {
    pub format: TextureFormat,
    pub sample_count: SampleCount,
    pub depth_ops: LoadStoreOps,
    pub stencil_ops: LoadStoreOps,
    pub final_layout: TextureLayout,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderPassDescriptor<'a> {
    pub label: Option<&'a str>,
    pub color_attachments: &'a [RenderPassColorAttachment],
    pub depth_stencil_attachment: Option<RenderPassDepthStencilTarget>,
}

/// Owned attachment signature of a render pass, kept by both backends.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderPassLayout {
    pub color_attachments: Vec<RenderPassColorAttachment>,
    pub depth_stencil_attachment: Option<RenderPassDepthStencilTarget>,
}

impl RenderPassLayout {
    pub fn from_descriptor(desc: &RenderPassDescriptor<'_>) -> Self {
        Self {
            color_attachments: desc.color_attachments.to_vec(),
            depth_stencil_attachment: desc.depth_stencil_attachment,
        }
    }

    pub fn color_formats(&self) -> impl Iterator<Item = TextureFormat> + '_ {
        self.color_attachments.iter().map(|a| a.target.format)
    }

    /// Sample count shared by the main attachments, or 1 for an empty pass.
    pub fn sample_count(&self) -> SampleCount {
        self.color_attachments
            .first()
            .map(|a| a.target.sample_count)
            .or(self.depth_stencil_attachment.map(|d| d.sample_count))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferAttachment {
    pub view: TextureViewHandle,
    pub resolve_target: Option<TextureViewHandle>,
}

#[derive(Debug, Clone, Copy)]
pub struct FramebufferDescriptor<'a> {
    pub label: Option<&'a str>,
    pub render_pass: RenderPassHandle,
    pub color_attachments: &'a [FramebufferAttachment],
    pub depth_stencil_attachment: Option<TextureViewHandle>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderPassBeginDescriptor<'a> {
    pub label: Option<&'a str>,
    pub render_pass: RenderPassHandle,
    pub framebuffer: FramebufferHandle,
    /// Indexed by color attachment. Entries of attachments that do not
    /// clear are ignored; missing entries clear to transparent black.
    pub color_clear_values: &'a [Color],
    pub depth_clear_value: f32,
    pub stencil_clear_value: u32,
    pub occlusion_query_set: Option<QuerySetHandle>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ComputePassBeginDescriptor<'a> {
    pub label: Option<&'a str>,
}
