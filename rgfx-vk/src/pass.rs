//! Persistent render passes and framebuffers.
//!
//! Attachments are laid out in one fixed order everywhere: every color
//! attachment, then the resolve targets of the colors that have one, then
//! depth/stencil. [`ordered_attachments`] produces that order for views,
//! [`PassAttachments::from_layout`] for descriptions, and
//! [`clear_values`] for clears.
//!
//! Attachments enter the pass already in their attachment-optimal layout:
//! the encoder transitions them before `vkCmdBeginRenderPass`. The pass then
//! moves them to each target's final layout.

use std::ops::Range;
use std::sync::Arc;

use ash::vk;
use rgfx_core::descriptor::{RenderPassDescriptor, RenderPassLayout};
use rgfx_core::{Color, LoadOp, TextureHandle, TextureLayout};
use thiserror::Error;

use crate::conv;
use crate::error::classify;
use crate::raw::RawDevice;

#[derive(Debug, Error)]
pub enum CreateRenderPassError {
    #[error("Vulkan error creating render pass: {0}")]
    RenderPass(vk::Result),

    #[error("Vulkan error creating framebuffer: {0}")]
    Framebuffer(vk::Result),
}

impl From<CreateRenderPassError> for rgfx_core::Error {
    fn from(value: CreateRenderPassError) -> Self {
        match value {
            CreateRenderPassError::RenderPass(e) => {
                classify("vkCreateRenderPass", e)
            }
            CreateRenderPassError::Framebuffer(e) => {
                classify("vkCreateFramebuffer", e)
            }
        }
    }
}

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

fn final_layout(layout: TextureLayout, attachment: vk::ImageLayout) -> vk::ImageLayout {
    match layout {
        // A pass may not end in UNDEFINED; keep the attachment layout.
        TextureLayout::Undefined => attachment,
        other => conv::texture_layout(other),
    }
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

/// Attachment descriptions and subpass references for one layout.
#[derive(Debug, Default)]
pub struct PassAttachments {
    pub descriptions: Vec<vk::AttachmentDescription>,
    pub color_refs: Vec<vk::AttachmentReference>,
    pub resolve_refs: Vec<vk::AttachmentReference>,
    pub depth_ref: Option<vk::AttachmentReference>,
}

impl PassAttachments {
    pub fn from_layout(layout: &RenderPassLayout) -> Self {
        let color_layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
        let depth_layout = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
        let mut out = Self::default();

        for attachment in &layout.color_attachments {
            let target = &attachment.target;
            out.color_refs.push(vk::AttachmentReference {
                attachment: out.descriptions.len() as u32,
                layout: color_layout,
            });
            out.descriptions.push(
                vk::AttachmentDescription::default()
                    .format(conv::texture_format(target.format))
                    .samples(conv::sample_count(target.sample_count))
                    .load_op(conv::load_op(target.ops.load))
                    .store_op(conv::store_op(target.ops.store))
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(color_layout)
                    .final_layout(final_layout(target.final_layout, color_layout)),
            );
        }

        let any_resolve = layout
            .color_attachments
            .iter()
            .any(|a| a.resolve_target.is_some());
        if any_resolve {
            for attachment in &layout.color_attachments {
                let Some(resolve) = attachment.resolve_target else {
                    out.resolve_refs.push(vk::AttachmentReference {
                        attachment: vk::ATTACHMENT_UNUSED,
                        layout: vk::ImageLayout::UNDEFINED,
                    });
                    continue;
                };
                out.resolve_refs.push(vk::AttachmentReference {
                    attachment: out.descriptions.len() as u32,
                    layout: color_layout,
                });
                out.descriptions.push(
                    vk::AttachmentDescription::default()
                        .format(conv::texture_format(resolve.format))
                        .samples(vk::SampleCountFlags::TYPE_1)
                        .load_op(vk::AttachmentLoadOp::DONT_CARE)
                        .store_op(conv::store_op(resolve.ops.store))
                        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                        .initial_layout(color_layout)
                        .final_layout(final_layout(
                            resolve.final_layout,
                            color_layout,
                        )),
                );
            }
        }

        if let Some(depth) = &layout.depth_stencil_attachment {
            out.depth_ref = Some(vk::AttachmentReference {
                attachment: out.descriptions.len() as u32,
                layout: depth_layout,
            });
            out.descriptions.push(
                vk::AttachmentDescription::default()
                    .format(conv::texture_format(depth.format))
                    .samples(conv::sample_count(depth.sample_count))
                    .load_op(conv::load_op(depth.depth_ops.load))
                    .store_op(conv::store_op(depth.depth_ops.store))
                    .stencil_load_op(conv::load_op(depth.stencil_ops.load))
                    .stencil_store_op(conv::store_op(depth.stencil_ops.store))
                    .initial_layout(depth_layout)
                    .final_layout(final_layout(depth.final_layout, depth_layout)),
            );
        }
        out
    }
}

/// One clear value per attachment in pass order.
///
/// `colors[i]` belongs to color attachment `i`; missing values default to
/// transparent black. Resolve targets get a placeholder, as Vulkan indexes
/// clear values by attachment.
pub fn clear_values(
    layout: &RenderPassLayout,
    colors: &[Color],
    depth: f32,
    stencil: u32,
) -> Vec<vk::ClearValue> {
    let color = |c: Color| vk::ClearValue {
        color: vk::ClearColorValue {
            float32: [c.r, c.g, c.b, c.a],
        },
    };
    let mut values: Vec<vk::ClearValue> = layout
        .color_attachments
        .iter()
        .enumerate()
        .map(|(i, a)| match a.target.ops.load {
            LoadOp::Clear => color(colors.get(i).copied().unwrap_or_default()),
            _ => color(Color::TRANSPARENT),
        })
        .collect();
    let resolves = layout
        .color_attachments
        .iter()
        .filter(|a| a.resolve_target.is_some())
        .count();
    values.extend(std::iter::repeat_n(color(Color::TRANSPARENT), resolves));
    if layout.depth_stencil_attachment.is_some() {
        values.push(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
        });
    }
    values
}

/// Whether any attachment of the layout reads its previous contents.
pub fn loads_contents(layout: &RenderPassLayout) -> bool {
    layout
        .color_attachments
        .iter()
        .any(|a| a.target.ops.load == LoadOp::Load)
        || layout.depth_stencil_attachment.is_some_and(|d| {
            d.depth_ops.load == LoadOp::Load
                || d.stencil_ops.load == LoadOp::Load
        })
}

// ---------------------------------------------------------------------------
// RenderPass
// ---------------------------------------------------------------------------

pub struct RenderPass {
    parent: Arc<RawDevice>,
    handle: vk::RenderPass,
    layout: RenderPassLayout,
}

impl std::fmt::Debug for RenderPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPass")
            .field("handle", &self.handle)
            .field("colors", &self.layout.color_attachments.len())
            .finish_non_exhaustive()
    }
}

impl RenderPass {
    pub fn new(
        device: &Arc<RawDevice>,
        desc: &RenderPassDescriptor<'_>,
    ) -> Result<Self, CreateRenderPassError> {
        let layout = RenderPassLayout::from_descriptor(desc);
        let attachments = PassAttachments::from_layout(&layout);

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&attachments.color_refs);
        if !attachments.resolve_refs.is_empty() {
            subpass = subpass.resolve_attachments(&attachments.resolve_refs);
        }
        if let Some(depth_ref) = attachments.depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }

        let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        let attachment_writes = vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        let dependencies = [
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(attachment_stages)
                .dst_stage_mask(attachment_stages)
                .src_access_mask(attachment_writes)
                .dst_access_mask(
                    attachment_writes
                        | vk::AccessFlags::COLOR_ATTACHMENT_READ
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
                ),
            vk::SubpassDependency::default()
                .src_subpass(0)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(attachment_stages)
                .dst_stage_mask(vk::PipelineStageFlags::ALL_COMMANDS)
                .src_access_mask(attachment_writes)
                .dst_access_mask(
                    vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                ),
        ];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments.descriptions)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&dependencies);
        // SAFETY: create_info and everything it points to lives on this
        // stack frame.
        let handle = unsafe {
            device.ash_device().create_render_pass(&create_info, None)
        }
        .map_err(CreateRenderPassError::RenderPass)?;
        // SAFETY: handle was just created from device.
        unsafe { device.label_object(handle, "render pass", desc.label) };

        Ok(Self {
            parent: Arc::clone(device),
            handle,
            layout,
        })
    }

    pub fn raw(&self) -> vk::RenderPass {
        self.handle
    }

    pub fn layout(&self) -> &RenderPassLayout {
        &self.layout
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        tracing::debug!("Dropping render pass {:?}", self.handle);
        // SAFETY: handle was created from parent and is owned by this
        // wrapper.
        unsafe {
            self.parent
                .ash_device()
                .destroy_render_pass(self.handle, None)
        };
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
    /// Layout the pass expects on entry.
    pub attachment_layout: TextureLayout,
    /// Layout the pass leaves behind.
    pub final_layout: TextureLayout,
}

pub struct Framebuffer {
    parent: Arc<RawDevice>,
    handle: vk::Framebuffer,
    layout: RenderPassLayout,
    targets: Vec<FramebufferTarget>,
    extent: vk::Extent2D,
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("handle", &self.handle)
            .field("extent", &self.extent)
            .finish_non_exhaustive()
    }
}

impl Framebuffer {
    /// `views` and `targets` are in pass order (see [`ordered_attachments`]).
    pub fn new(
        device: &Arc<RawDevice>,
        label: Option<&str>,
        render_pass: &RenderPass,
        views: &[vk::ImageView],
        targets: Vec<FramebufferTarget>,
        extent: vk::Extent2D,
    ) -> Result<Self, CreateRenderPassError> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.raw())
            .attachments(views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        // SAFETY: The views and the render pass derive from this device and
        // were checked compatible by the caller.
        let handle = unsafe {
            device.ash_device().create_framebuffer(&create_info, None)
        }
        .map_err(CreateRenderPassError::Framebuffer)?;
        // SAFETY: handle was just created from device.
        unsafe { device.label_object(handle, "framebuffer", label) };

        Ok(Self {
            parent: Arc::clone(device),
            handle,
            layout: render_pass.layout().clone(),
            targets,
            extent,
        })
    }

    pub fn raw(&self) -> vk::Framebuffer {
        self.handle
    }

    /// Layout of the render pass this framebuffer was built against.
    pub fn layout(&self) -> &RenderPassLayout {
        &self.layout
    }

    pub fn targets(&self) -> &[FramebufferTarget] {
        &self.targets
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        tracing::debug!("Dropping framebuffer {:?}", self.handle);
        // SAFETY: handle was created from parent and is owned by this
        // wrapper.
        unsafe {
            self.parent
                .ash_device()
                .destroy_framebuffer(self.handle, None)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rgfx_core::descriptor::{
        LoadStoreOps, RenderPassColorAttachment, RenderPassColorTarget,
        RenderPassDepthStencilTarget,
    };
    use rgfx_core::{SampleCount, TextureFormat};

    fn target(format: TextureFormat, samples: SampleCount) -> RenderPassColorTarget {
        RenderPassColorTarget {
            format,
            sample_count: samples,
            ops: LoadStoreOps::CLEAR_STORE,
            final_layout: TextureLayout::ShaderReadOnly,
        }
    }

    fn msaa_layout() -> RenderPassLayout {
        RenderPassLayout {
            color_attachments: vec![
                RenderPassColorAttachment {
                    target: target(TextureFormat::R8G8B8A8Unorm, SampleCount::X4),
                    resolve_target: Some(target(
                        TextureFormat::R8G8B8A8Unorm,
                        SampleCount::X1,
                    )),
                },
                RenderPassColorAttachment {
                    target: target(TextureFormat::R16G16B16A16Float, SampleCount::X4),
                    resolve_target: None,
                },
            ],
            depth_stencil_attachment: Some(RenderPassDepthStencilTarget {
                format: TextureFormat::Depth32Float,
                sample_count: SampleCount::X4,
                depth_ops: LoadStoreOps::CLEAR_STORE,
                stencil_ops: LoadStoreOps::DONT_CARE,
                final_layout: TextureLayout::Undefined,
            }),
        }
    }

    #[test]
    fn attachments_follow_pass_order() {
        let order = ordered_attachments(&['a', 'b'], &[Some('r'), None], Some('d'));
        assert_eq!(order, vec!['a', 'b', 'r', 'd']);

        let pass = PassAttachments::from_layout(&msaa_layout());
        assert_eq!(pass.descriptions.len(), 4);
        assert_eq!(pass.color_refs[1].attachment, 1);
        assert_eq!(pass.resolve_refs[0].attachment, 2);
        assert_eq!(pass.resolve_refs[1].attachment, vk::ATTACHMENT_UNUSED);
        assert_eq!(pass.depth_ref.map(|r| r.attachment), Some(3));
    }

    #[test]
    fn undefined_final_layout_keeps_attachment_layout() {
        let pass = PassAttachments::from_layout(&msaa_layout());
        assert_eq!(
            pass.descriptions[0].final_layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
        assert_eq!(
            pass.descriptions[3].final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert_eq!(
            tracked_final_layout(
                TextureLayout::Undefined,
                TextureLayout::DepthStencilAttachment
            ),
            TextureLayout::DepthStencilAttachment
        );
    }

    #[test]
    fn clear_values_cover_every_attachment() {
        let layout = msaa_layout();
        let values = clear_values(&layout, &[Color::WHITE], 0.5, 7);
        assert_eq!(values.len(), 4);
        // SAFETY: color attachments are cleared through the color member.
        let first = unsafe { values[0].color.float32 };
        assert_eq!(first, [1.0, 1.0, 1.0, 1.0]);
        // SAFETY: as above; the second color had no clear value given.
        let second = unsafe { values[1].color.float32 };
        assert_eq!(second, [0.0; 4]);
        // SAFETY: the last attachment is depth/stencil.
        let depth = unsafe { values[3].depth_stencil };
        assert_eq!((depth.depth, depth.stencil), (0.5, 7));
    }

    #[test]
    fn loading_attachment_keeps_its_clear_slot() {
        let mut layout = msaa_layout();
        layout.color_attachments[0].target.ops = LoadStoreOps::LOAD_STORE;
        let values = clear_values(&layout, &[Color::BLACK, Color::WHITE], 1.0, 0);
        // SAFETY: color attachments are cleared through the color member.
        let (first, second) =
            unsafe { (values[0].color.float32, values[1].color.float32) };
        assert_eq!(first, [0.0; 4]);
        assert_eq!(second, [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn load_detection() {
        let mut layout = msaa_layout();
        assert!(!loads_contents(&layout));
        layout.color_attachments[1].target.ops = LoadStoreOps::LOAD_STORE;
        assert!(loads_contents(&layout));
    }
}
