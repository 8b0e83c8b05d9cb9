//! Render passes and framebuffers.
//!
//! WebGPU has no render pass object. A [`RenderPass`] only keeps its
//! attachment layout, and a [`Framebuffer`] keeps the view handles bound to
//! it. When a pass begins the encoder combines both with the caller's clear
//! values into a `wgpu::RenderPassDescriptor`; the functions in this module
//! do that synthesis.
//!
//! Views are looked up again at every begin because swapchain views change
//! their native object each frame.

use std::ops::Range;

use rgfx_core::descriptor::{
    RenderPassDepthStencilTarget, RenderPassLayout, LoadStoreOps,
};
use rgfx_core::{
    Color, LoadOp, StoreOp, TextureHandle, TextureLayout, TextureViewHandle,
};

/// Flatten attachments into pass order: colors, present resolves, depth.
pub fn ordered_attachments<T: Copy>(
    colors: &[T],
    resolves: &[Option<T>],
    depth: Option<T>,
) -> Vec<T> {
    colors
        .iter()
        .copied()
        .chain(resolves.iter().flatten().copied())
        .chain(depth)
        .collect()
}

/// Tracked layout a target ends the pass in.
pub fn tracked_final_layout(
    requested: TextureLayout,
    attachment: TextureLayout,
) -> TextureLayout {
    match requested {
        TextureLayout::Undefined => attachment,
        other => other,
    }
}

fn load_op<V>(op: LoadOp, clear: V) -> wgpu::LoadOp<V> {
    match op {
        LoadOp::Load => wgpu::LoadOp::Load,
        // WebGPU has no undefined load; clearing is the cheapest option.
        LoadOp::Clear | LoadOp::DontCare => wgpu::LoadOp::Clear(clear),
    }
}

fn store_op(op: StoreOp) -> wgpu::StoreOp {
    match op {
        StoreOp::Store => wgpu::StoreOp::Store,
        StoreOp::DontCare => wgpu::StoreOp::Discard,
    }
}

fn operations<V>(ops: LoadStoreOps, clear: V) -> wgpu::Operations<V> {
    wgpu::Operations {
        load: load_op(ops.load, clear),
        store: store_op(ops.store),
    }
}

/// Operations of every color attachment in order.
///
/// `clears[i]` belongs to color attachment `i`; missing values clear to
/// transparent black.
pub fn color_operations(
    layout: &RenderPassLayout,
    clears: &[Color],
) -> Vec<wgpu::Operations<wgpu::Color>> {
    layout
        .color_attachments
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let clear = match a.target.ops.load {
                LoadOp::Clear => clears.get(i).copied().unwrap_or_default(),
                _ => Color::TRANSPARENT,
            };
            operations(
                a.target.ops,
                wgpu::Color {
                    r: f64::from(clear.r),
                    g: f64::from(clear.g),
                    b: f64::from(clear.b),
                    a: f64::from(clear.a),
                },
            )
        })
        .collect()
}

/// Depth and stencil operations. Aspects the format lacks get `None`, as
/// WebGPU requires.
pub fn depth_stencil_operations(
    target: &RenderPassDepthStencilTarget,
    depth: f32,
    stencil: u32,
) -> (Option<wgpu::Operations<f32>>, Option<wgpu::Operations<u32>>) {
    (
        target
            .format
            .has_depth()
            .then(|| operations(target.depth_ops, depth)),
        target
            .format
            .has_stencil()
            .then(|| operations(target.stencil_ops, stencil)),
    )
}

/// Native views of one framebuffer, resolved for a single pass begin.
#[derive(Debug, Default)]
pub struct PassViews {
    pub colors: Vec<wgpu::TextureView>,
    pub resolves: Vec<Option<wgpu::TextureView>>,
    pub depth_stencil: Option<wgpu::TextureView>,
}

/// Build the color attachment list of a pass begin.
pub fn color_attachments<'a>(
    views: &'a PassViews,
    ops: &[wgpu::Operations<wgpu::Color>],
) -> Vec<Option<wgpu::RenderPassColorAttachment<'a>>> {
    views
        .colors
        .iter()
        .zip(ops)
        .enumerate()
        .map(|(i, (view, ops))| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: views.resolves.get(i).and_then(Option::as_ref),
                ops: *ops,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// RenderPass
// ---------------------------------------------------------------------------

/// The attachment layout of a render pass. Nothing native exists until the
/// pass is begun.
#[derive(Debug)]
pub struct RenderPass {
    label: Option<String>,
    layout: RenderPassLayout,
}

impl RenderPass {
    pub fn new(label: Option<&str>, layout: RenderPassLayout) -> Self {
        Self {
            label: label.map(str::to_owned),
            layout,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn layout(&self) -> &RenderPassLayout {
        &self.layout
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        tracing::debug!("Dropping render pass {:?}", self.label);
    }
}

// ---------------------------------------------------------------------------
// Framebuffer
// ---------------------------------------------------------------------------

/// One attachment of a framebuffer, as the encoder sees it at pass begin.
#[derive(Debug, Clone)]
pub struct FramebufferTarget {
    pub texture: TextureHandle,
    pub mips: Range<u32>,
    /// Layout the pass works in.
    pub attachment_layout: TextureLayout,
    /// Layout the pass leaves behind.
    pub final_layout: TextureLayout,
}

/// View handles bound to a framebuffer, by role.
#[derive(Debug, Clone, Default)]
pub struct FramebufferViews {
    pub colors: Vec<TextureViewHandle>,
    pub resolves: Vec<Option<TextureViewHandle>>,
    pub depth_stencil: Option<TextureViewHandle>,
}

#[derive(Debug)]
pub struct Framebuffer {
    layout: RenderPassLayout,
    views: FramebufferViews,
    targets: Vec<FramebufferTarget>,
    width: u32,
    height: u32,
}

impl Framebuffer {
    /// `targets` are in pass order (see [`ordered_attachments`]).
    pub fn new(
        render_pass: &RenderPass,
        views: FramebufferViews,
        targets: Vec<FramebufferTarget>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            layout: render_pass.layout().clone(),
            views,
            targets,
            width,
            height,
        }
    }

    /// Layout of the render pass this framebuffer was built against.
    pub fn layout(&self) -> &RenderPassLayout {
        &self.layout
    }

    pub fn views(&self) -> &FramebufferViews {
        &self.views
    }

    pub fn targets(&self) -> &[FramebufferTarget] {
        &self.targets
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn uses_view(&self, view: TextureViewHandle) -> bool {
        self.views.colors.contains(&view)
            || self.views.resolves.contains(&Some(view))
            || self.views.depth_stencil == Some(view)
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        tracing::debug!(
            "Dropping framebuffer {}x{} with {} targets",
            self.width,
            self.height,
            self.targets.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use rgfx_core::descriptor::{
        RenderPassColorAttachment, RenderPassColorTarget,
    };
    use rgfx_core::{SampleCount, TextureFormat};

    use super::*;

    fn target(ops: LoadStoreOps) -> RenderPassColorTarget {
        RenderPassColorTarget {
            format: TextureFormat::R8G8B8A8Unorm,
            sample_count: SampleCount::X1,
            ops,
            final_layout: TextureLayout::Undefined,
        }
    }

    fn layout(ops: &[LoadStoreOps]) -> RenderPassLayout {
        RenderPassLayout {
            color_attachments: ops
                .iter()
                .map(|ops| RenderPassColorAttachment {
                    target: target(*ops),
                    resolve_target: None,
                })
                .collect(),
            depth_stencil_attachment: None,
        }
    }

    #[test]
    fn clear_values_are_indexed_by_attachment() {
        let layout = layout(&[
            LoadStoreOps::CLEAR_STORE,
            LoadStoreOps::LOAD_STORE,
            LoadStoreOps::CLEAR_STORE,
        ]);
        let clears = [Color::WHITE, Color::BLACK, Color::BLACK];
        let ops = color_operations(&layout, &clears);
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].load, wgpu::LoadOp::Clear(wgpu::Color::WHITE));
        assert_eq!(ops[1].load, wgpu::LoadOp::Load);
        assert_eq!(ops[2].load, wgpu::LoadOp::Clear(wgpu::Color::BLACK));
    }

    #[test]
    fn loading_attachment_keeps_its_clear_slot() {
        let layout = layout(&[LoadStoreOps::LOAD_STORE, LoadStoreOps::CLEAR_STORE]);
        let ops = color_operations(&layout, &[Color::BLACK, Color::WHITE]);
        assert_eq!(ops[0].load, wgpu::LoadOp::Load);
        assert_eq!(ops[1].load, wgpu::LoadOp::Clear(wgpu::Color::WHITE));
    }

    #[test]
    fn missing_clear_values_are_transparent() {
        let layout = layout(&[LoadStoreOps::CLEAR_STORE]);
        let ops = color_operations(&layout, &[]);
        assert_eq!(ops[0].load, wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT));
        assert_eq!(ops[0].store, wgpu::StoreOp::Store);
    }

    #[test]
    fn dont_care_discards() {
        let layout = layout(&[LoadStoreOps::DONT_CARE]);
        let ops = color_operations(&layout, &[Color::WHITE]);
        assert_eq!(ops[0].store, wgpu::StoreOp::Discard);
        assert_eq!(ops[0].load, wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT));
    }

    #[test]
    fn depth_only_formats_have_no_stencil_ops() {
        let depth = RenderPassDepthStencilTarget {
            format: TextureFormat::Depth32Float,
            sample_count: SampleCount::X1,
            depth_ops: LoadStoreOps::CLEAR_STORE,
            stencil_ops: LoadStoreOps::CLEAR_STORE,
            final_layout: TextureLayout::Undefined,
        };
        let (d, s) = depth_stencil_operations(&depth, 1.0, 0);
        assert_eq!(d.map(|o| o.load), Some(wgpu::LoadOp::Clear(1.0)));
        assert!(s.is_none());

        let combined = RenderPassDepthStencilTarget {
            format: TextureFormat::Depth24PlusStencil8,
            ..depth
        };
        let (d, s) = depth_stencil_operations(&combined, 0.5, 3);
        assert!(d.is_some());
        assert_eq!(s.map(|o| o.load), Some(wgpu::LoadOp::Clear(3)));
    }

    #[test]
    fn attachments_follow_pass_order() {
        let order = ordered_attachments(&[1, 2], &[None, Some(3)], Some(4));
        assert_eq!(order, [1, 2, 3, 4]);
    }

    #[test]
    fn undefined_final_layout_keeps_attachment_layout() {
        assert_eq!(
            tracked_final_layout(
                TextureLayout::Undefined,
                TextureLayout::ColorAttachment
            ),
            TextureLayout::ColorAttachment
        );
        assert_eq!(
            tracked_final_layout(
                TextureLayout::PresentSrc,
                TextureLayout::ColorAttachment
            ),
            TextureLayout::PresentSrc
        );
    }
}
