//! Command recording.
//!
//! A `wgpu::CommandEncoder` is consumed by `finish`, so a [`WgpuEncoder`]
//! builds a fresh one every time it begins. Passes are held with their
//! lifetime erased so they can live on the encoder between calls.
//!
//! Texture layouts are tracked as commands are recorded. Encoders that
//! touch the same texture must be submitted in the order they were
//! recorded.

use std::ops::Range;
use std::sync::Arc;

use rgfx_core::backend::CommandEncoderBackend;
use rgfx_core::compat;
use rgfx_core::descriptor::{
    BlitTextureToTextureDescriptor, ComputePassBeginDescriptor,
    CopyBufferToBufferDescriptor, CopyBufferToTextureDescriptor,
    CopyTextureToBufferDescriptor, CopyTextureToTextureDescriptor,
    PipelineBarrierDescriptor, RenderPassBeginDescriptor, RenderPassLayout,
    TextureInfo,
};
use rgfx_core::encoder::{EncoderLifecycle, EncoderState, PassKind, RecyclePolicy};
use rgfx_core::handle::Resolve;
use rgfx_core::util::{clamp_mip_range, mip_chain, packed_data_size, texel_region};
use rgfx_core::validate;
use rgfx_core::{
    BindGroupHandle, BufferHandle, BufferUsage, ComputePipelineHandle, Extent3D,
    IndexFormat, Origin3D, QuerySetHandle, QueryType, RenderPipelineHandle,
    SampleCount, ScissorRect, TextureHandle, TextureLayout, TextureType,
    TextureUsage, TextureViewHandle, Viewport,
};

use crate::blit::{BlitSurface, Blitter};
use crate::buffer::{Buffer, byte_range};
use crate::conv;
use crate::device::WgpuDevice;
use crate::error::scoped;
use crate::pass::{
    PassViews, color_attachments, color_operations, depth_stencil_operations,
    ordered_attachments, tracked_final_layout,
};
use crate::texture::{Texture, view_format_compatible};

const DRAW_INDIRECT_SIZE: u64 = 16;
const DRAW_INDEXED_INDIRECT_SIZE: u64 = 20;
const DISPATCH_INDIRECT_SIZE: u64 = 12;

// ---------------------------------------------------------------------------
// Recording helpers
// ---------------------------------------------------------------------------

fn require_single_sample(info: &TextureInfo) -> rgfx_core::Result<()> {
    if info.sample_count != SampleCount::X1 {
        return Err(rgfx_core::Error::invalid_argument(
            "multisampled textures cannot be copied; resolve them first",
        ));
    }
    Ok(())
}

fn require_usage(info: &TextureInfo, usage: TextureUsage) -> rgfx_core::Result<()> {
    if !info.usage.contains(usage) {
        return Err(rgfx_core::Error::invalid_argument(format!(
            "texture usage {:?} lacks {usage:?}",
            info.usage
        )));
    }
    Ok(())
}

/// Buffer copies move whole 4-byte words.
fn require_copy_alignment(what: &str, value: u64) -> rgfx_core::Result<()> {
    if value % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
        return Err(rgfx_core::Error::invalid_argument(format!(
            "{what} {value} is not a multiple of {}",
            wgpu::COPY_BUFFER_ALIGNMENT
        )));
    }
    Ok(())
}

/// Layouts each framebuffer target is left in by `layout`, in attachment
/// order.
fn pass_final_layouts(layout: &RenderPassLayout) -> Vec<TextureLayout> {
    let color = TextureLayout::ColorAttachment;
    let colors: Vec<TextureLayout> = layout
        .color_attachments
        .iter()
        .map(|a| tracked_final_layout(a.target.final_layout, color))
        .collect();
    let resolves: Vec<Option<TextureLayout>> = layout
        .color_attachments
        .iter()
        .map(|a| {
            a.resolve_target
                .map(|r| tracked_final_layout(r.final_layout, color))
        })
        .collect();
    let depth = layout.depth_stencil_attachment.map(|d| {
        tracked_final_layout(d.final_layout, TextureLayout::DepthStencilAttachment)
    });
    ordered_attachments(&colors, &resolves, depth)
}

/// Check dynamic offsets for group `index` against the bound layout and
/// the group being bound.
fn check_dynamic_offsets(
    index: u32,
    layout_groups: &[usize],
    group_offsets: usize,
    given: usize,
) -> rgfx_core::Result<()> {
    let Some(&expected) = layout_groups.get(index as usize) else {
        return Err(rgfx_core::Error::invalid_argument(format!(
            "bind group index {index} out of range for a pipeline with {} \
             groups",
            layout_groups.len()
        )));
    };
    if group_offsets != expected {
        return Err(rgfx_core::Error::invalid_argument(format!(
            "bind group has {group_offsets} dynamic bindings, group {index} \
             of the pipeline expects {expected}"
        )));
    }
    if given != expected {
        return Err(rgfx_core::Error::invalid_argument(format!(
            "{given} dynamic offsets given, group {index} expects {expected}"
        )));
    }
    Ok(())
}

/// Native origin and extent of a checked copy region. Array layers are
/// addressed through `z` and the depth of the extent.
fn copy_region(
    info: &TextureInfo,
    offset: Origin3D,
    texels: Extent3D,
    layers: Range<u32>,
) -> (wgpu::Origin3d, wgpu::Extent3d) {
    let (z, depth) = match info.texture_type {
        TextureType::D3 => (offset.z as u32, texels.depth),
        _ => (layers.start, layers.len() as u32),
    };
    (
        wgpu::Origin3d {
            x: offset.x as u32,
            y: offset.y as u32,
            z,
        },
        wgpu::Extent3d {
            width: texels.width,
            height: texels.height,
            depth_or_array_layers: depth,
        },
    )
}

/// One row of a buffer/texture copy split into rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCopy {
    /// Byte offset of the row from the start of the packed data.
    pub offset: u64,
    pub y: u32,
    pub z: u32,
}

/// Rows to copy one at a time when packed rows of `extent` do not meet
/// wgpu's row pitch alignment. `None` when a single copy will do.
pub fn row_copies(
    extent: wgpu::Extent3d,
    bytes_per_pixel: u32,
) -> Option<Vec<RowCopy>> {
    let bytes_per_row = u64::from(extent.width) * u64::from(bytes_per_pixel);
    let rows = extent.height * extent.depth_or_array_layers;
    let alignment = u64::from(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
    if rows <= 1 || bytes_per_row % alignment == 0 {
        return None;
    }
    Some(
        (0..extent.depth_or_array_layers)
            .flat_map(|z| (0..extent.height).map(move |y| (y, z)))
            .map(|(y, z)| RowCopy {
                offset: (u64::from(z) * u64::from(extent.height) + u64::from(y))
                    * bytes_per_row,
                y,
                z,
            })
            .collect(),
    )
}

fn packed_layout(
    offset: u64,
    extent: wgpu::Extent3d,
    bytes_per_pixel: u32,
) -> wgpu::TexelCopyBufferLayout {
    wgpu::TexelCopyBufferLayout {
        offset,
        bytes_per_row: Some(extent.width * bytes_per_pixel),
        rows_per_image: Some(extent.height),
    }
}

/// Direction of a buffer/texture copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyDirection {
    BufferToTexture,
    TextureToBuffer,
}

/// Record a copy between tightly packed texels in `buffer` and a region of
/// `texture`, splitting it into rows when the pitch is unaligned.
fn record_texel_copy(
    encoder: &mut wgpu::CommandEncoder,
    direction: CopyDirection,
    (buffer, buffer_offset): (&wgpu::Buffer, u64),
    (texture, mip_level, aspect): (&wgpu::Texture, u32, wgpu::TextureAspect),
    (origin, extent): (wgpu::Origin3d, wgpu::Extent3d),
    bytes_per_pixel: u32,
) {
    let mut copy = |offset: u64, origin: wgpu::Origin3d, extent: wgpu::Extent3d| {
        let buffer_info = wgpu::TexelCopyBufferInfo {
            buffer,
            layout: packed_layout(offset, extent, bytes_per_pixel),
        };
        let texture_info = wgpu::TexelCopyTextureInfo {
            texture,
            mip_level,
            origin,
            aspect,
        };
        match direction {
            CopyDirection::BufferToTexture => {
                encoder.copy_buffer_to_texture(buffer_info, texture_info, extent)
            }
            CopyDirection::TextureToBuffer => {
                encoder.copy_texture_to_buffer(texture_info, buffer_info, extent)
            }
        }
    };
    match row_copies(extent, bytes_per_pixel) {
        None => copy(buffer_offset, origin, extent),
        Some(rows) => {
            tracing::trace!(
                "Splitting {}-byte rows into {} row copies",
                extent.width * bytes_per_pixel,
                rows.len()
            );
            for row in rows {
                copy(
                    buffer_offset + row.offset,
                    wgpu::Origin3d {
                        x: origin.x,
                        y: origin.y + row.y,
                        z: origin.z + row.z,
                    },
                    wgpu::Extent3d {
                        width: extent.width,
                        height: 1,
                        depth_or_array_layers: 1,
                    },
                );
            }
        }
    }
}

/// Move one mip to the caller's final layout. `Undefined` keeps the
/// transfer layout.
fn settle(texture: &Texture, mip: u32, final_layout: TextureLayout) {
    if final_layout != TextureLayout::Undefined {
        texture.transition(mip..mip + 1, final_layout);
    }
}

// ---------------------------------------------------------------------------
// WgpuEncoder
// ---------------------------------------------------------------------------

enum OpenPass {
    Render(wgpu::RenderPass<'static>),
    Compute(wgpu::ComputePass<'static>),
}

#[derive(Debug)]
struct TrackedTarget {
    texture: TextureHandle,
    mips: Range<u32>,
    final_layout: TextureLayout,
}

#[derive(Debug)]
struct OpenRenderPass {
    targets: Vec<TrackedTarget>,
    occlusion_query_set: Option<QuerySetHandle>,
    active_query: Option<u32>,
}

pub struct WgpuEncoder {
    device: Arc<WgpuDevice>,
    label: Option<String>,
    lifecycle: EncoderLifecycle,
    /// Ended before `raw` so the pass releases the encoder first.
    pass: Option<OpenPass>,
    raw: Option<wgpu::CommandEncoder>,
    finished: Option<wgpu::CommandBuffer>,
    render_pass: Option<OpenRenderPass>,
    /// Dynamic offset count of each group of the bound pipeline.
    bound: Option<Vec<usize>>,
}

impl std::fmt::Debug for WgpuEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuEncoder")
            .field("label", &self.label)
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl WgpuEncoder {
    pub(crate) fn new(device: Arc<WgpuDevice>, label: Option<&str>) -> Self {
        Self {
            device,
            label: label.map(str::to_owned),
            lifecycle: EncoderLifecycle::new(RecyclePolicy::Recreate),
            pass: None,
            raw: None,
            finished: None,
            render_pass: None,
            bound: None,
        }
    }

    pub(crate) fn device(&self) -> &Arc<WgpuDevice> {
        &self.device
    }

    /// End the encoder if still recording and take the buffer to submit.
    pub(crate) fn prepare_submit(&mut self) -> rgfx_core::Result<wgpu::CommandBuffer> {
        if self.lifecycle.prepare_submit()? {
            self.end()?;
        }
        self.finished.take().ok_or_else(|| {
            rgfx_core::Error::invalid_state("encoder has no finished commands")
        })
    }

    /// Check the encoder can be submitted without ending it.
    pub(crate) fn check_submit(&self) -> rgfx_core::Result<()> {
        self.lifecycle.prepare_submit().map(drop)
    }

    /// Hand back a buffer taken by [`Self::prepare_submit`] that never
    /// reached the queue.
    pub(crate) fn restore_finished(&mut self, finished: wgpu::CommandBuffer) {
        self.finished = Some(finished);
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.lifecycle.mark_submitted();
    }

    fn encoder(&mut self) -> rgfx_core::Result<&mut wgpu::CommandEncoder> {
        self.raw
            .as_mut()
            .ok_or_else(|| rgfx_core::Error::invalid_state("encoder is not recording"))
    }

    fn render(&mut self) -> rgfx_core::Result<&mut wgpu::RenderPass<'static>> {
        self.lifecycle.require_pass(PassKind::Render)?;
        match self.pass.as_mut() {
            Some(OpenPass::Render(pass)) => Ok(pass),
            _ => Err(rgfx_core::Error::invalid_state("no render pass is open")),
        }
    }

    fn compute(&mut self) -> rgfx_core::Result<&mut wgpu::ComputePass<'static>> {
        self.lifecycle.require_pass(PassKind::Compute)?;
        match self.pass.as_mut() {
            Some(OpenPass::Compute(pass)) => Ok(pass),
            _ => Err(rgfx_core::Error::invalid_state("no compute pass is open")),
        }
    }

    fn require_pipeline(&self, kind: PassKind) -> rgfx_core::Result<()> {
        self.lifecycle.require_pass(kind)?;
        if self.bound.is_none() {
            return Err(rgfx_core::Error::invalid_state(format!(
                "no pipeline set in the open {kind:?} pass"
            )));
        }
        Ok(())
    }

    fn require_indirect(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> rgfx_core::Result<wgpu::Buffer> {
        let hub = self.device.hub();
        let buffer = hub.buffers.resolve(buffer)?;
        if !buffer.usage().contains(BufferUsage::INDIRECT) {
            return Err(rgfx_core::Error::invalid_argument(
                "indirect buffer lacks INDIRECT usage",
            ));
        }
        if offset % 4 != 0 {
            return Err(rgfx_core::Error::invalid_argument(format!(
                "indirect offset {offset} is not a multiple of 4"
            )));
        }
        byte_range(offset, size, buffer.size())?;
        Ok(buffer.raw().clone())
    }

    /// Slice of `buffer` for binding; `size == 0` runs to the end.
    fn bound_slice(
        buffer: &Buffer,
        offset: u64,
        size: u64,
    ) -> rgfx_core::Result<wgpu::BufferSlice<'_>> {
        let range = byte_range(offset, size, buffer.size())?;
        Ok(buffer.raw().slice(range))
    }
}

impl Drop for WgpuEncoder {
    fn drop(&mut self) {
        tracing::debug!("Dropping command encoder {:?}", self.label);
        self.pass = None;
    }
}

impl CommandEncoderBackend for WgpuEncoder {
    fn state(&self) -> EncoderState {
        self.lifecycle.state()
    }

    fn begin(&mut self) -> rgfx_core::Result<()> {
        let mut lifecycle = self.lifecycle.clone();
        let action = lifecycle.begin()?;
        let label = self.label.as_deref();
        let raw = self
            .device
            .raw()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label });
        tracing::trace!("Began encoder {label:?} ({action:?})");
        self.pass = None;
        self.raw = Some(raw);
        self.finished = None;
        self.lifecycle = lifecycle;
        self.render_pass = None;
        self.bound = None;
        Ok(())
    }

    fn end(&mut self) -> rgfx_core::Result<()> {
        self.lifecycle.require_recording()?;
        let raw = self.raw.take().ok_or_else(|| {
            rgfx_core::Error::invalid_state("encoder is not recording")
        })?;
        let finished =
            scoped(self.device.raw(), "finish_command_encoder", || raw.finish())?;
        self.finished = Some(finished);
        self.lifecycle.end()
    }

    fn reset(&mut self) -> rgfx_core::Result<()> {
        let mut lifecycle = self.lifecycle.clone();
        lifecycle.reset()?;
        self.pass = None;
        self.finished = None;
        self.raw = None;
        self.render_pass = None;
        self.bound = None;
        self.lifecycle = lifecycle;
        Ok(())
    }

    // ---- passes

    fn begin_render_pass(
        &mut self,
        desc: &RenderPassBeginDescriptor<'_>,
    ) -> rgfx_core::Result<()> {
        let mut lifecycle = self.lifecycle.clone();
        lifecycle.begin_pass(PassKind::Render)?;
        validate::render_pass_begin(desc)?;
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let pass = hub.render_passes.resolve(desc.render_pass)?;
        let framebuffer = hub.framebuffers.resolve(desc.framebuffer)?;
        compat::check_render_passes(pass.layout(), framebuffer.layout())?;
        let occlusion_query_set = match desc.occlusion_query_set {
            Some(set) => {
                let set = hub.query_sets.resolve(set)?;
                if set.ty() != QueryType::Occlusion {
                    return Err(rgfx_core::Error::invalid_argument(
                        "render pass occlusion query set holds timestamp queries",
                    ));
                }
                Some(set.raw().clone())
            }
            None => None,
        };

        let fb_views = framebuffer.views();
        let view = |handle: TextureViewHandle| {
            hub.texture_views.resolve(handle)?.raw()
        };
        let views = PassViews {
            colors: fb_views
                .colors
                .iter()
                .map(|h| view(*h))
                .collect::<rgfx_core::Result<_>>()?,
            resolves: fb_views
                .resolves
                .iter()
                .map(|h| h.map(view).transpose())
                .collect::<rgfx_core::Result<_>>()?,
            depth_stencil: fb_views.depth_stencil.map(view).transpose()?,
        };
        let ops = color_operations(pass.layout(), desc.color_clear_values);
        let colors = color_attachments(&views, &ops);
        let depth_stencil_attachment = match (
            &views.depth_stencil,
            &pass.layout().depth_stencil_attachment,
        ) {
            (Some(view), Some(target)) => {
                let (depth_ops, stencil_ops) = depth_stencil_operations(
                    target,
                    desc.depth_clear_value,
                    desc.stencil_clear_value,
                );
                Some(wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops,
                    stencil_ops,
                })
            }
            _ => None,
        };

        for target in framebuffer.targets() {
            let texture = hub.textures.resolve(target.texture)?;
            texture.transition(target.mips.clone(), target.attachment_layout);
        }
        let targets = framebuffer
            .targets()
            .iter()
            .zip(pass_final_layouts(pass.layout()))
            .map(|(target, final_layout)| TrackedTarget {
                texture: target.texture,
                mips: target.mips.clone(),
                final_layout,
            })
            .collect();
        let label = desc.label.or(pass.label());

        let encoder = self.encoder()?;
        let raw = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label,
                color_attachments: &colors,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: occlusion_query_set.as_ref(),
            })
            .forget_lifetime();

        self.lifecycle = lifecycle;
        self.pass = Some(OpenPass::Render(raw));
        self.render_pass = Some(OpenRenderPass {
            targets,
            occlusion_query_set: desc.occlusion_query_set,
            active_query: None,
        });
        self.bound = None;
        tracing::trace!("Began render pass {:?}", desc.label);
        Ok(())
    }

    fn end_render_pass(&mut self) -> rgfx_core::Result<()> {
        self.render()?;
        if self.render_pass.as_ref().is_some_and(|p| p.active_query.is_some()) {
            return Err(rgfx_core::Error::invalid_state(
                "an occlusion query is still active in this render pass",
            ));
        }
        self.pass = None;
        if let Some(open) = self.render_pass.take() {
            let hub = self.device.hub();
            for target in open.targets {
                // A target destroyed mid-recording has nothing to track.
                if let Ok(texture) = hub.textures.resolve(target.texture) {
                    texture.assume(target.mips, target.final_layout);
                }
            }
        }
        self.bound = None;
        self.lifecycle.end_pass(PassKind::Render)
    }

    fn begin_compute_pass(
        &mut self,
        desc: &ComputePassBeginDescriptor<'_>,
    ) -> rgfx_core::Result<()> {
        let mut lifecycle = self.lifecycle.clone();
        lifecycle.begin_pass(PassKind::Compute)?;
        let raw = self
            .encoder()?
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: desc.label,
                timestamp_writes: None,
            })
            .forget_lifetime();
        self.lifecycle = lifecycle;
        self.pass = Some(OpenPass::Compute(raw));
        self.bound = None;
        tracing::trace!("Began compute pass {:?}", desc.label);
        Ok(())
    }

    fn end_compute_pass(&mut self) -> rgfx_core::Result<()> {
        self.compute()?;
        self.pass = None;
        self.bound = None;
        self.lifecycle.end_pass(PassKind::Compute)
    }

    // ---- transfer

    fn copy_buffer_to_buffer(
        &mut self,
        desc: &CopyBufferToBufferDescriptor,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_recording()?;
        validate::copy_buffer_to_buffer(desc)?;
        require_copy_alignment("copy size", desc.size)?;
        require_copy_alignment("source offset", desc.source_offset)?;
        require_copy_alignment("destination offset", desc.destination_offset)?;
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let source = hub.buffers.resolve(desc.source)?;
        let destination = hub.buffers.resolve(desc.destination)?;
        let src = byte_range(desc.source_offset, desc.size, source.size())?;
        let dst = byte_range(desc.destination_offset, desc.size, destination.size())?;
        if desc.source == desc.destination && src.start < dst.end && dst.start < src.end {
            return Err(rgfx_core::Error::invalid_argument(
                "source and destination ranges overlap",
            ));
        }
        self.encoder()?.copy_buffer_to_buffer(
            source.raw(),
            desc.source_offset,
            destination.raw(),
            desc.destination_offset,
            desc.size,
        );
        Ok(())
    }

    fn copy_buffer_to_texture(
        &mut self,
        desc: &CopyBufferToTextureDescriptor,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_recording()?;
        validate::copy_buffer_to_texture(desc)?;
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let source = hub.buffers.resolve(desc.source)?;
        let texture = hub.textures.resolve(desc.destination)?;
        let info = texture.info();
        require_single_sample(&info)?;
        require_usage(&info, TextureUsage::COPY_DST)?;
        let (offset, texels, layers) =
            texel_region(&info, desc.mip_level, desc.origin, desc.extent)?;
        let bytes_per_pixel = info.format.bytes_per_pixel();
        let bytes = packed_data_size(desc.extent, bytes_per_pixel);
        byte_range(desc.source_offset, bytes, source.size())?;
        let raw = texture.raw()?;

        texture.transition(
            desc.mip_level..desc.mip_level + 1,
            TextureLayout::TransferDst,
        );
        record_texel_copy(
            self.encoder()?,
            CopyDirection::BufferToTexture,
            (source.raw(), desc.source_offset),
            (&raw, desc.mip_level, conv::copy_aspect(info.format)),
            copy_region(&info, offset, texels, layers),
            bytes_per_pixel,
        );
        settle(texture, desc.mip_level, desc.final_layout);
        Ok(())
    }

    fn copy_texture_to_buffer(
        &mut self,
        desc: &CopyTextureToBufferDescriptor,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_recording()?;
        validate::copy_texture_to_buffer(desc)?;
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let texture = hub.textures.resolve(desc.source)?;
        let destination = hub.buffers.resolve(desc.destination)?;
        let info = texture.info();
        require_single_sample(&info)?;
        require_usage(&info, TextureUsage::COPY_SRC)?;
        let (offset, texels, layers) =
            texel_region(&info, desc.mip_level, desc.origin, desc.extent)?;
        let bytes_per_pixel = info.format.bytes_per_pixel();
        let bytes = packed_data_size(desc.extent, bytes_per_pixel);
        byte_range(desc.destination_offset, bytes, destination.size())?;
        let raw = texture.raw()?;

        texture.transition(
            desc.mip_level..desc.mip_level + 1,
            TextureLayout::TransferSrc,
        );
        record_texel_copy(
            self.encoder()?,
            CopyDirection::TextureToBuffer,
            (destination.raw(), desc.destination_offset),
            (&raw, desc.mip_level, conv::copy_aspect(info.format)),
            copy_region(&info, offset, texels, layers),
            bytes_per_pixel,
        );
        settle(texture, desc.mip_level, desc.final_layout);
        Ok(())
    }

    fn copy_texture_to_texture(
        &mut self,
        desc: &CopyTextureToTextureDescriptor,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_recording()?;
        validate::copy_texture_to_texture(desc)?;
        if desc.source == desc.destination
            && desc.source_mip_level == desc.destination_mip_level
        {
            return Err(rgfx_core::Error::invalid_argument(
                "copy source and destination are the same mip level",
            ));
        }
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let source = hub.textures.resolve(desc.source)?;
        let destination = hub.textures.resolve(desc.destination)?;
        let (src_info, dst_info) = (source.info(), destination.info());
        require_single_sample(&src_info)?;
        require_single_sample(&dst_info)?;
        require_usage(&src_info, TextureUsage::COPY_SRC)?;
        require_usage(&dst_info, TextureUsage::COPY_DST)?;
        if !view_format_compatible(src_info.format, dst_info.format) {
            return Err(rgfx_core::Error::invalid_argument(format!(
                "cannot copy {:?} texels into {:?}",
                src_info.format, dst_info.format
            )));
        }
        let (src_offset, texels, src_layers) = texel_region(
            &src_info,
            desc.source_mip_level,
            desc.source_origin,
            desc.extent,
        )?;
        let (dst_offset, dst_texels, dst_layers) = texel_region(
            &dst_info,
            desc.destination_mip_level,
            desc.destination_origin,
            desc.extent,
        )?;
        let (src_origin, extent) = copy_region(&src_info, src_offset, texels, src_layers);
        let (dst_origin, _) = copy_region(&dst_info, dst_offset, dst_texels, dst_layers);
        let (src_raw, dst_raw) = (source.raw()?, destination.raw()?);

        source.transition(
            desc.source_mip_level..desc.source_mip_level + 1,
            TextureLayout::TransferSrc,
        );
        destination.transition(
            desc.destination_mip_level..desc.destination_mip_level + 1,
            TextureLayout::TransferDst,
        );
        self.encoder()?.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &src_raw,
                mip_level: desc.source_mip_level,
                origin: src_origin,
                aspect: conv::copy_aspect(src_info.format),
            },
            wgpu::TexelCopyTextureInfo {
                texture: &dst_raw,
                mip_level: desc.destination_mip_level,
                origin: dst_origin,
                aspect: conv::copy_aspect(dst_info.format),
            },
            extent,
        );
        settle(source, desc.source_mip_level, desc.source_final_layout);
        settle(
            destination,
            desc.destination_mip_level,
            desc.destination_final_layout,
        );
        Ok(())
    }

    fn blit_texture_to_texture(
        &mut self,
        desc: &BlitTextureToTextureDescriptor,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_recording()?;
        validate::blit_texture_to_texture(desc)?;
        if desc.source == desc.destination
            && desc.source_mip_level == desc.destination_mip_level
        {
            return Err(rgfx_core::Error::invalid_argument(
                "blit source and destination are the same mip level",
            ));
        }
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let source = hub.textures.resolve(desc.source)?;
        let destination = hub.textures.resolve(desc.destination)?;
        let (src_info, dst_info) = (source.info(), destination.info());
        require_single_sample(&src_info)?;
        require_single_sample(&dst_info)?;
        require_usage(&src_info, TextureUsage::COPY_SRC)?;
        require_usage(&dst_info, TextureUsage::COPY_DST)?;
        let (src_offset, src_texels, src_layers) = texel_region(
            &src_info,
            desc.source_mip_level,
            desc.source_origin,
            desc.source_extent,
        )?;
        let (dst_offset, dst_texels, dst_layers) = texel_region(
            &dst_info,
            desc.destination_mip_level,
            desc.destination_origin,
            desc.destination_extent,
        )?;
        if src_layers.len() != dst_layers.len() {
            return Err(rgfx_core::Error::invalid_argument(format!(
                "blit covers {} source layers but {} destination layers",
                src_layers.len(),
                dst_layers.len()
            )));
        }
        let (src_raw, dst_raw) = (source.raw()?, destination.raw()?);
        Blitter::check(device.raw(), &src_raw, &dst_raw, desc.filter)?;

        source.transition(
            desc.source_mip_level..desc.source_mip_level + 1,
            TextureLayout::TransferSrc,
        );
        destination.transition(
            desc.destination_mip_level..desc.destination_mip_level + 1,
            TextureLayout::TransferDst,
        );
        let encoder = self.raw.as_mut().ok_or_else(|| {
            rgfx_core::Error::invalid_state("encoder is not recording")
        })?;
        for (src_layer, dst_layer) in src_layers.zip(dst_layers) {
            device.blitter().blit(
                device.raw(),
                encoder,
                &BlitSurface {
                    texture: &src_raw,
                    mip_level: desc.source_mip_level,
                    layer: src_layer,
                    origin: src_offset,
                    extent: src_texels,
                },
                &BlitSurface {
                    texture: &dst_raw,
                    mip_level: desc.destination_mip_level,
                    layer: dst_layer,
                    origin: dst_offset,
                    extent: dst_texels,
                },
                desc.filter,
            );
        }
        settle(source, desc.source_mip_level, desc.source_final_layout);
        settle(
            destination,
            desc.destination_mip_level,
            desc.destination_final_layout,
        );
        Ok(())
    }

    /// wgpu synchronises on its own; barriers only move tracked layouts.
    fn pipeline_barrier(
        &mut self,
        desc: &PipelineBarrierDescriptor<'_>,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_recording()?;
        if desc.is_empty() {
            return Ok(());
        }
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        for barrier in desc.buffer_barriers {
            let buffer = hub.buffers.resolve(barrier.buffer)?;
            byte_range(barrier.offset, barrier.size, buffer.size())?;
        }

        // Check every texture before touching any tracked layout.
        let mut textures = Vec::with_capacity(desc.texture_barriers.len());
        for barrier in desc.texture_barriers {
            if barrier.new_layout == TextureLayout::Undefined {
                return Err(rgfx_core::Error::invalid_argument(
                    "a texture barrier cannot move to Undefined",
                ));
            }
            let texture = hub.textures.resolve(barrier.texture)?;
            let info = texture.info();
            let mips = clamp_mip_range(
                barrier.base_mip_level,
                barrier.mip_level_count,
                info.mip_level_count,
            )
            .ok_or_else(|| {
                rgfx_core::Error::invalid_argument(format!(
                    "barrier mip {} out of range",
                    barrier.base_mip_level
                ))
            })?;
            clamp_mip_range(
                barrier.base_array_layer,
                barrier.array_layer_count,
                info.layer_count(),
            )
            .ok_or_else(|| {
                rgfx_core::Error::invalid_argument(format!(
                    "barrier layer {} out of range",
                    barrier.base_array_layer
                ))
            })?;
            if barrier.old_layout != TextureLayout::Undefined {
                for mip in mips.clone() {
                    let actual = texture.layout(mip).unwrap_or_default();
                    if actual != barrier.old_layout {
                        return Err(rgfx_core::Error::LayoutMismatch {
                            mip_level: mip,
                            expected: barrier.old_layout,
                            actual,
                        });
                    }
                }
            }
            textures.push((barrier, texture, mips));
        }
        for (barrier, texture, mips) in textures {
            texture.transition_from(mips, barrier.old_layout, barrier.new_layout)?;
        }
        Ok(())
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle) -> rgfx_core::Result<()> {
        self.generate_mipmaps_range(texture, 0, u32::MAX)
    }

    fn generate_mipmaps_range(
        &mut self,
        texture: TextureHandle,
        base_mip_level: u32,
        level_count: u32,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_recording()?;
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let texture = hub.textures.resolve(texture)?;
        let info = texture.info();
        let Some(levels) = mip_chain(base_mip_level, level_count, info.mip_level_count)
        else {
            tracing::trace!(
                "No mips to generate from level {base_mip_level} of {}",
                info.mip_level_count
            );
            return Ok(());
        };
        require_single_sample(&info)?;
        require_usage(&info, TextureUsage::COPY_SRC | TextureUsage::COPY_DST)?;
        let raw = texture.raw()?;
        Blitter::check(device.raw(), &raw, &raw, rgfx_core::FilterMode::Nearest)?;

        let restore = match texture.layout(levels.start) {
            None | Some(TextureLayout::Undefined) => TextureLayout::TransferSrc,
            Some(layout) => layout,
        };
        let encoder = self.raw.as_mut().ok_or_else(|| {
            rgfx_core::Error::invalid_state("encoder is not recording")
        })?;
        device.blitter().generate_mipmaps(
            device.raw(),
            encoder,
            &raw,
            levels.clone(),
            texture.all_layers(),
        );
        texture.transition(levels, restore);
        Ok(())
    }

    fn write_timestamp(
        &mut self,
        query_set: QuerySetHandle,
        query_index: u32,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_recording()?;
        let device = Arc::clone(&self.device);
        if !device
            .raw()
            .features()
            .contains(wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS)
        {
            return Err(rgfx_core::Error::unsupported(
                "timestamps between passes are not available on this adapter",
            ));
        }
        let hub = device.hub();
        let set = hub.query_sets.resolve(query_set)?;
        set.require(QueryType::Timestamp, query_index)?;
        self.encoder()?.write_timestamp(set.raw(), query_index);
        Ok(())
    }

    fn resolve_query_set(
        &mut self,
        query_set: QuerySetHandle,
        first_query: u32,
        query_count: u32,
        destination: BufferHandle,
        destination_offset: u64,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_recording()?;
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let set = hub.query_sets.resolve(query_set)?;
        let buffer = hub.buffers.resolve(destination)?;
        crate::query::check_resolve(
            first_query,
            query_count,
            set.count(),
            destination_offset,
            buffer.size(),
        )?;
        if !buffer.raw().usage().contains(wgpu::BufferUsages::QUERY_RESOLVE) {
            return Err(rgfx_core::Error::invalid_argument(
                "query results need a COPY_DST buffer that is not mappable",
            ));
        }
        self.encoder()?.resolve_query_set(
            set.raw(),
            first_query..first_query + query_count,
            buffer.raw(),
            destination_offset,
        );
        Ok(())
    }

    // ---- render pass

    fn set_render_pipeline(
        &mut self,
        pipeline: RenderPipelineHandle,
    ) -> rgfx_core::Result<()> {
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let pipeline = hub.render_pipelines.resolve(pipeline)?;
        self.render()?.set_pipeline(pipeline.raw());
        let layout = pipeline.layout();
        self.bound = Some(
            (0..layout.group_count())
                .map(|i| layout.dynamic_offset_count(i).unwrap_or(0))
                .collect(),
        );
        Ok(())
    }

    fn set_vertex_buffer(
        &mut self,
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> rgfx_core::Result<()> {
        self.render()?;
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let buffer = hub.buffers.resolve(buffer)?;
        if !buffer.usage().contains(BufferUsage::VERTEX) {
            return Err(rgfx_core::Error::invalid_argument(
                "vertex buffer lacks VERTEX usage",
            ));
        }
        let slice = Self::bound_slice(buffer, offset, size)?;
        self.render()?.set_vertex_buffer(slot, slice);
        Ok(())
    }

    fn set_index_buffer(
        &mut self,
        buffer: BufferHandle,
        format: IndexFormat,
        offset: u64,
        size: u64,
    ) -> rgfx_core::Result<()> {
        self.render()?;
        if offset % format.size() != 0 {
            return Err(rgfx_core::Error::invalid_argument(format!(
                "index offset {offset} is not aligned to {format:?}"
            )));
        }
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let buffer = hub.buffers.resolve(buffer)?;
        if !buffer.usage().contains(BufferUsage::INDEX) {
            return Err(rgfx_core::Error::invalid_argument(
                "index buffer lacks INDEX usage",
            ));
        }
        let slice = Self::bound_slice(buffer, offset, size)?;
        self.render()?.set_index_buffer(slice, conv::index_format(format));
        Ok(())
    }

    fn set_viewport(&mut self, viewport: &Viewport) -> rgfx_core::Result<()> {
        self.render()?.set_viewport(
            viewport.x,
            viewport.y,
            viewport.width,
            viewport.height,
            viewport.min_depth,
            viewport.max_depth,
        );
        Ok(())
    }

    fn set_scissor_rect(&mut self, scissor: &ScissorRect) -> rgfx_core::Result<()> {
        let pass = self.render()?;
        if scissor.x < 0 || scissor.y < 0 {
            return Err(rgfx_core::Error::invalid_argument(format!(
                "scissor origin ({}, {}) is negative",
                scissor.x, scissor.y
            )));
        }
        pass.set_scissor_rect(
            scissor.x as u32,
            scissor.y as u32,
            scissor.width,
            scissor.height,
        );
        Ok(())
    }

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> rgfx_core::Result<()> {
        self.require_pipeline(PassKind::Render)?;
        self.render()?.draw(
            first_vertex..first_vertex + vertex_count,
            first_instance..first_instance + instance_count,
        );
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> rgfx_core::Result<()> {
        self.require_pipeline(PassKind::Render)?;
        self.render()?.draw_indexed(
            first_index..first_index + index_count,
            base_vertex,
            first_instance..first_instance + instance_count,
        );
        Ok(())
    }

    fn draw_indirect(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
    ) -> rgfx_core::Result<()> {
        self.require_pipeline(PassKind::Render)?;
        let raw = self.require_indirect(buffer, offset, DRAW_INDIRECT_SIZE)?;
        self.render()?.draw_indirect(&raw, offset);
        Ok(())
    }

    fn draw_indexed_indirect(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
    ) -> rgfx_core::Result<()> {
        self.require_pipeline(PassKind::Render)?;
        let raw = self.require_indirect(buffer, offset, DRAW_INDEXED_INDIRECT_SIZE)?;
        self.render()?.draw_indexed_indirect(&raw, offset);
        Ok(())
    }

    fn begin_occlusion_query(
        &mut self,
        query_set: QuerySetHandle,
        query_index: u32,
    ) -> rgfx_core::Result<()> {
        self.render()?;
        let Some(open) = self.render_pass.as_ref() else {
            return Err(rgfx_core::Error::invalid_state(
                "no render pass is open on this encoder",
            ));
        };
        if open.active_query.is_some() {
            return Err(rgfx_core::Error::invalid_state(
                "an occlusion query is already active",
            ));
        }
        if open.occlusion_query_set != Some(query_set) {
            return Err(rgfx_core::Error::invalid_argument(
                "query set was not named when the render pass began",
            ));
        }
        {
            let hub = self.device.hub();
            let set = hub.query_sets.resolve(query_set)?;
            set.require(QueryType::Occlusion, query_index)?;
        }
        self.render()?.begin_occlusion_query(query_index);
        if let Some(open) = self.render_pass.as_mut() {
            open.active_query = Some(query_index);
        }
        Ok(())
    }

    fn end_occlusion_query(&mut self) -> rgfx_core::Result<()> {
        self.render()?;
        let active = self
            .render_pass
            .as_mut()
            .and_then(|open| open.active_query.take());
        if active.is_none() {
            return Err(rgfx_core::Error::invalid_state(
                "no occlusion query is active",
            ));
        }
        self.render()?.end_occlusion_query();
        Ok(())
    }

    // ---- render or compute pass

    fn set_bind_group(
        &mut self,
        index: u32,
        group: BindGroupHandle,
        dynamic_offsets: &[u32],
    ) -> rgfx_core::Result<()> {
        let kind = self.lifecycle.open_pass().ok_or_else(|| {
            rgfx_core::Error::invalid_state("set_bind_group outside a pass")
        })?;
        self.require_pipeline(kind)?;
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let group = hub.bind_groups.resolve(group)?;
        check_dynamic_offsets(
            index,
            self.bound.as_deref().unwrap_or_default(),
            group.dynamic_offset_count(),
            dynamic_offsets.len(),
        )?;
        match self.pass.as_mut() {
            Some(OpenPass::Render(pass)) => {
                pass.set_bind_group(index, group.raw(), dynamic_offsets)
            }
            Some(OpenPass::Compute(pass)) => {
                pass.set_bind_group(index, group.raw(), dynamic_offsets)
            }
            None => {
                return Err(rgfx_core::Error::invalid_state(
                    "set_bind_group outside a pass",
                ));
            }
        }
        Ok(())
    }

    // ---- compute pass

    fn set_compute_pipeline(
        &mut self,
        pipeline: ComputePipelineHandle,
    ) -> rgfx_core::Result<()> {
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let pipeline = hub.compute_pipelines.resolve(pipeline)?;
        self.compute()?.set_pipeline(pipeline.raw());
        let layout = pipeline.layout();
        self.bound = Some(
            (0..layout.group_count())
                .map(|i| layout.dynamic_offset_count(i).unwrap_or(0))
                .collect(),
        );
        Ok(())
    }

    fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32) -> rgfx_core::Result<()> {
        self.require_pipeline(PassKind::Compute)?;
        self.compute()?.dispatch_workgroups(x, y, z);
        Ok(())
    }

    fn dispatch_workgroups_indirect(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
    ) -> rgfx_core::Result<()> {
        self.require_pipeline(PassKind::Compute)?;
        let raw = self.require_indirect(buffer, offset, DISPATCH_INDIRECT_SIZE)?;
        self.compute()?.dispatch_workgroups_indirect(&raw, offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rgfx_core::descriptor::{
        LoadStoreOps, RenderPassColorAttachment, RenderPassColorTarget,
        RenderPassDepthStencilTarget,
    };
    use rgfx_core::TextureFormat;

    use super::*;

    fn extent(width: u32, height: u32, layers: u32) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: layers,
        }
    }

    #[test]
    fn aligned_pitches_copy_in_one_go() {
        // 64 texels * 4 bytes = 256.
        assert!(row_copies(extent(64, 16, 1), 4).is_none());
        assert!(row_copies(extent(3, 1, 1), 4).is_none());
    }

    #[test]
    fn unaligned_pitches_split_into_rows() {
        let rows = row_copies(extent(3, 2, 2), 4).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], RowCopy { offset: 0, y: 0, z: 0 });
        assert_eq!(rows[1], RowCopy { offset: 12, y: 1, z: 0 });
        assert_eq!(rows[2], RowCopy { offset: 24, y: 0, z: 1 });
        assert_eq!(rows[3], RowCopy { offset: 36, y: 1, z: 1 });
    }

    #[test]
    fn array_layers_are_addressed_through_z() {
        let info = TextureInfo {
            texture_type: TextureType::D2,
            size: Extent3D::new(32, 32, 1),
            array_layer_count: 6,
            mip_level_count: 1,
            sample_count: SampleCount::X1,
            format: TextureFormat::R8G8B8A8Unorm,
            usage: TextureUsage::COPY_DST,
        };
        let (origin, size) = copy_region(
            &info,
            Origin3D::new(4, 8, 0),
            Extent3D::new(8, 8, 1),
            2..5,
        );
        assert_eq!((origin.x, origin.y, origin.z), (4, 8, 2));
        assert_eq!(size, extent(8, 8, 3));

        let volume = TextureInfo {
            texture_type: TextureType::D3,
            size: Extent3D::new(32, 32, 16),
            array_layer_count: 1,
            ..info
        };
        let (origin, size) = copy_region(
            &volume,
            Origin3D::new(0, 0, 3),
            Extent3D::new(8, 8, 4),
            0..1,
        );
        assert_eq!(origin.z, 3);
        assert_eq!(size.depth_or_array_layers, 4);
    }

    #[test]
    fn buffer_copies_need_word_alignment() {
        assert!(require_copy_alignment("size", 16).is_ok());
        assert!(require_copy_alignment("size", 6).is_err());
    }

    #[test]
    fn dynamic_offsets_must_match_layout_and_group() {
        let groups = [0, 2];
        assert!(check_dynamic_offsets(1, &groups, 2, 2).is_ok());
        assert!(check_dynamic_offsets(0, &groups, 0, 0).is_ok());
        assert!(check_dynamic_offsets(2, &groups, 0, 0).is_err());
        assert!(check_dynamic_offsets(1, &groups, 1, 2).is_err());
        assert!(check_dynamic_offsets(1, &groups, 2, 1).is_err());
    }

    #[test]
    fn final_layouts_follow_attachment_order() {
        let target = |final_layout| RenderPassColorTarget {
            format: TextureFormat::R8G8B8A8Unorm,
            sample_count: SampleCount::X4,
            ops: LoadStoreOps::default(),
            final_layout,
        };
        let layout = RenderPassLayout {
            color_attachments: vec![
                RenderPassColorAttachment {
                    target: target(TextureLayout::Undefined),
                    resolve_target: Some(RenderPassColorTarget {
                        sample_count: SampleCount::X1,
                        ..target(TextureLayout::PresentSrc)
                    }),
                },
                RenderPassColorAttachment {
                    target: target(TextureLayout::ShaderReadOnly),
                    resolve_target: None,
                },
            ],
            depth_stencil_attachment: Some(RenderPassDepthStencilTarget {
                format: TextureFormat::Depth32Float,
                sample_count: SampleCount::X4,
                depth_ops: LoadStoreOps::default(),
                stencil_ops: LoadStoreOps::default(),
                final_layout: TextureLayout::Undefined,
            }),
        };
        assert_eq!(
            pass_final_layouts(&layout),
            vec![
                TextureLayout::ColorAttachment,
                TextureLayout::ShaderReadOnly,
                TextureLayout::PresentSrc,
                TextureLayout::DepthStencilAttachment,
            ]
        );
    }
}
