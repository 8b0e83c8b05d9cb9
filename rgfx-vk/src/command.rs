//! Command recording.
//!
//! Each [`VulkanEncoder`] owns a command pool holding one primary buffer.
//! A submission leaves a tracking fence on the encoder; beginning it again
//! waits for that fence and resets the pool, so an encoder can be recorded
//! and submitted any number of times.
//!
//! Texture layouts are tracked as commands are recorded. Encoders that
//! touch the same texture must be submitted in the order they were
//! recorded.

use std::ops::Range;
use std::sync::Arc;

use ash::vk;
use rgfx_core::backend::CommandEncoderBackend;
use rgfx_core::compat;
use rgfx_core::descriptor::{
    BlitTextureToTextureDescriptor, ComputePassBeginDescriptor,
    CopyBufferToBufferDescriptor, CopyBufferToTextureDescriptor,
    CopyTextureToBufferDescriptor, CopyTextureToTextureDescriptor,
    PipelineBarrierDescriptor, RenderPassBeginDescriptor, RenderPassLayout,
    TextureInfo,
};
use rgfx_core::encoder::{
    BeginAction, EncoderLifecycle, EncoderState, PassKind, RecyclePolicy,
};
use rgfx_core::handle::Resolve;
use rgfx_core::util::{
    clamp_mip_range, mip_chain, packed_data_size, texel_region,
};
use rgfx_core::validate;
use rgfx_core::{
    BindGroupHandle, BufferHandle, BufferUsage, ComputePipelineHandle,
    Extent3D, FilterMode, IndexFormat, Origin3D, QueryType, QuerySetHandle,
    RenderPipelineHandle, SampleCount, ScissorRect, TextureHandle,
    TextureLayout, TextureType, TextureUsage, Viewport,
};

use crate::barrier::BarrierBatch;
use crate::buffer::{Buffer, byte_range};
use crate::conv;
use crate::device::VulkanDevice;
use crate::error::{VkResultExt, classify};
use crate::pass::{clear_values, ordered_attachments, tracked_final_layout};
use crate::sync::Fence;
use crate::texture::Texture;

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

fn require_usage(
    info: &TextureInfo,
    usage: TextureUsage,
) -> rgfx_core::Result<()> {
    if !info.usage.contains(usage) {
        return Err(rgfx_core::Error::invalid_argument(format!(
            "texture usage {:?} lacks {usage:?}",
            info.usage
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
        tracked_final_layout(
            d.final_layout,
            TextureLayout::DepthStencilAttachment,
        )
    });
    ordered_attachments(&colors, &resolves, depth)
}

/// Check dynamic offsets for set `index` against the bound layout and the
/// group being bound.
fn check_dynamic_offsets(
    index: u32,
    layout_sets: &[usize],
    group_offsets: usize,
    given: usize,
) -> rgfx_core::Result<()> {
    let Some(&expected) = layout_sets.get(index as usize) else {
        return Err(rgfx_core::Error::invalid_argument(format!(
            "bind group index {index} out of range for a pipeline with {} \
             sets",
            layout_sets.len()
        )));
    };
    if group_offsets != expected {
        return Err(rgfx_core::Error::invalid_argument(format!(
            "bind group has {group_offsets} dynamic bindings, set {index} of \
             the pipeline expects {expected}"
        )));
    }
    if given != expected {
        return Err(rgfx_core::Error::invalid_argument(format!(
            "{given} dynamic offsets given, set {index} expects {expected}"
        )));
    }
    Ok(())
}

fn offset3d(origin: Origin3D) -> vk::Offset3D {
    vk::Offset3D {
        x: origin.x,
        y: origin.y,
        z: origin.z,
    }
}

fn extent3d(extent: Extent3D) -> vk::Extent3D {
    vk::Extent3D {
        width: extent.width,
        height: extent.height,
        depth: extent.depth,
    }
}

fn blit_bounds(origin: Origin3D, extent: Extent3D) -> [vk::Offset3D; 2] {
    [
        offset3d(origin),
        vk::Offset3D {
            x: origin.x + extent.width as i32,
            y: origin.y + extent.height as i32,
            z: origin.z + extent.depth as i32,
        },
    ]
}

fn subresource_layers(
    aspect: vk::ImageAspectFlags,
    mip: u32,
    layers: Range<u32>,
) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: aspect,
        mip_level: mip,
        base_array_layer: layers.start,
        layer_count: layers.len() as u32,
    }
}

/// Make earlier writes visible to a transfer.
fn transfer_prologue(batch: &mut BarrierBatch) {
    batch.memory(
        (
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (
            vk::AccessFlags::MEMORY_WRITE,
            vk::AccessFlags::TRANSFER_READ | vk::AccessFlags::TRANSFER_WRITE,
        ),
    );
}

/// Make a transfer's writes visible to later commands.
fn transfer_epilogue(batch: &mut BarrierBatch) {
    batch.memory(
        (
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::ALL_COMMANDS,
        ),
        (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
        ),
    );
}

/// Move one mip to the caller's final layout. `Undefined` keeps the
/// transfer layout.
fn settle(
    texture: &Texture,
    mip: u32,
    final_layout: TextureLayout,
    batch: &mut BarrierBatch,
) {
    if final_layout != TextureLayout::Undefined {
        texture.transition(mip..mip + 1, final_layout, batch);
    }
}

/// Check and record a copy of tightly packed texels from `source` into
/// one mip of `texture`, leaving it in `final_layout`.
///
/// # Safety
/// `cmd` must be recording outside a pass on the device that owns both
/// resources.
pub(crate) unsafe fn record_upload(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    source: &Buffer,
    source_offset: u64,
    texture: &Texture,
    (mip_level, origin, extent): (u32, Origin3D, Extent3D),
    final_layout: TextureLayout,
) -> rgfx_core::Result<()> {
    let info = texture.info();
    require_single_sample(&info)?;
    require_usage(&info, TextureUsage::COPY_DST)?;
    let (offset, texels, layers) =
        texel_region(&info, mip_level, origin, extent)?;
    let bytes = packed_data_size(extent, info.format.bytes_per_pixel());
    byte_range(source_offset, bytes, source.size())?;

    let mut before = BarrierBatch::new();
    transfer_prologue(&mut before);
    texture.transition(
        mip_level..mip_level + 1,
        TextureLayout::TransferDst,
        &mut before,
    );
    let region = vk::BufferImageCopy {
        buffer_offset: source_offset,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: subresource_layers(
            texture.copy_aspect(),
            mip_level,
            layers,
        ),
        image_offset: offset3d(offset),
        image_extent: extent3d(texels),
    };
    let mut after = BarrierBatch::new();
    settle(texture, mip_level, final_layout, &mut after);
    transfer_epilogue(&mut after);
    // SAFETY: Caller guarantees cmd is recording outside a pass; the region
    // was checked against both resources and the mip is moved to
    // TRANSFER_DST before the copy.
    unsafe {
        before.record(device, cmd);
        device.cmd_copy_buffer_to_image(
            cmd,
            source.raw(),
            texture.raw(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
        after.record(device, cmd);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// VulkanEncoder
// ---------------------------------------------------------------------------

/// Pipeline layout state needed to validate and record bind groups.
#[derive(Debug, Clone)]
struct BoundLayout {
    raw: vk::PipelineLayout,
    bind_point: vk::PipelineBindPoint,
    dynamic_offsets: Vec<usize>,
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
    /// Index of the occlusion query begun and not yet ended.
    active_query: Option<u32>,
}

pub struct VulkanEncoder {
    device: Arc<VulkanDevice>,
    pool: vk::CommandPool,
    cmd: vk::CommandBuffer,
    label: Option<String>,
    lifecycle: EncoderLifecycle,
    /// Signaled when the last submission of `cmd` retires.
    in_flight: Option<Arc<Fence>>,
    render_pass: Option<OpenRenderPass>,
    bound: Option<BoundLayout>,
}

impl std::fmt::Debug for VulkanEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanEncoder")
            .field("cmd", &self.cmd)
            .field("label", &self.label)
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl VulkanEncoder {
    pub(crate) fn new(
        device: Arc<VulkanDevice>,
        label: Option<&str>,
    ) -> rgfx_core::Result<Self> {
        let (pool, cmd) = {
            let raw = device.raw();
            let ash_device = raw.ash_device();
            let create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(raw.queue_family_index());
            // SAFETY: create_info names the device's own queue family.
            let pool =
                unsafe { ash_device.create_command_pool(&create_info, None) }
                    .or_classify("vkCreateCommandPool")?;
            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            // SAFETY: pool was just created and is owned by this encoder.
            let cmd = match unsafe {
                ash_device.allocate_command_buffers(&alloc_info)
            } {
                Ok(mut buffers) => buffers.remove(0),
                Err(e) => {
                    // SAFETY: Nothing was allocated from the pool.
                    unsafe { ash_device.destroy_command_pool(pool, None) };
                    return Err(classify("vkAllocateCommandBuffers", e));
                }
            };
            // SAFETY: Both objects were just created from this device.
            unsafe {
                raw.label_object(pool, "command pool", label);
                raw.label_object(cmd, "command buffer", label);
            }
            (pool, cmd)
        };
        Ok(Self {
            device,
            pool,
            cmd,
            label: label.map(str::to_owned),
            lifecycle: EncoderLifecycle::new(RecyclePolicy::Reset),
            in_flight: None,
            render_pass: None,
            bound: None,
        })
    }

    pub(crate) fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    /// Block until the last submission of this encoder has retired.
    fn retire(&mut self) -> rgfx_core::Result<()> {
        if let Some(fence) = self.in_flight.take()
            && let Err(e) = fence.wait(u64::MAX)
        {
            self.in_flight = Some(fence);
            return Err(e.into());
        }
        Ok(())
    }

    fn reset_pool(&mut self) -> rgfx_core::Result<()> {
        self.retire()?;
        // SAFETY: The only buffer of the pool is not pending: its last
        // submission retired above.
        unsafe {
            self.device.raw().ash_device().reset_command_pool(
                self.pool,
                vk::CommandPoolResetFlags::empty(),
            )
        }
        .or_classify("vkResetCommandPool")
    }

    /// End the encoder if still recording and return the buffer to submit.
    pub(crate) fn prepare_submit(
        &mut self,
    ) -> rgfx_core::Result<vk::CommandBuffer> {
        if self.lifecycle.prepare_submit()? {
            self.end()?;
        }
        // A resubmitted buffer must not still be pending.
        self.retire()?;
        Ok(self.cmd)
    }

    pub(crate) fn mark_submitted(&mut self, fence: &Arc<Fence>) {
        self.lifecycle.mark_submitted();
        self.in_flight = Some(Arc::clone(fence));
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

    /// Record `batch` outside any pass.
    fn record_barriers(&self, batch: &BarrierBatch) {
        // SAFETY: Callers check the encoder is recording outside a pass, and
        // everything in the batch was resolved from this device's hub.
        unsafe { batch.record(self.device.raw().ash_device(), self.cmd) };
    }

    fn require_indirect(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> rgfx_core::Result<vk::Buffer> {
        let hub = self.device.hub();
        let buffer = hub.buffers.resolve(buffer)?;
        if !buffer.info().usage.contains(BufferUsage::INDIRECT) {
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
        Ok(buffer.raw())
    }
}

impl Drop for VulkanEncoder {
    fn drop(&mut self) {
        tracing::debug!("Dropping command pool {:?}", self.pool);
        if let Err(e) = self.retire() {
            tracing::error!("Waiting on encoder {:?} failed: {e}", self.label);
        }
        // SAFETY: pool was created from this device and its buffer is no
        // longer pending.
        unsafe {
            self.device
                .raw()
                .ash_device()
                .destroy_command_pool(self.pool, None)
        };
    }
}

impl CommandEncoderBackend for VulkanEncoder {
    fn state(&self) -> EncoderState {
        self.lifecycle.state()
    }

    fn begin(&mut self) -> rgfx_core::Result<()> {
        let mut lifecycle = self.lifecycle.clone();
        if lifecycle.begin()? != BeginAction::Fresh {
            self.reset_pool()?;
        }
        let begin_info = vk::CommandBufferBeginInfo::default();
        // SAFETY: cmd is in the initial state: fresh, or its pool was reset.
        unsafe {
            self.device
                .raw()
                .ash_device()
                .begin_command_buffer(self.cmd, &begin_info)
        }
        .or_classify("vkBeginCommandBuffer")?;
        self.lifecycle = lifecycle;
        self.render_pass = None;
        self.bound = None;
        Ok(())
    }

    fn end(&mut self) -> rgfx_core::Result<()> {
        self.lifecycle.require_recording()?;
        // SAFETY: cmd is recording with no pass open.
        unsafe { self.device.raw().ash_device().end_command_buffer(self.cmd) }
            .or_classify("vkEndCommandBuffer")?;
        self.lifecycle.end()
    }

    fn reset(&mut self) -> rgfx_core::Result<()> {
        let mut lifecycle = self.lifecycle.clone();
        if lifecycle.reset()? == EncoderState::Idle {
            self.reset_pool()?;
        }
        self.lifecycle = lifecycle;
        Ok(())
    }

    // ---- passes

    fn begin_render_pass(
        &mut self,
        desc: &RenderPassBeginDescriptor<'_>,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_recording()?;
        validate::render_pass_begin(desc)?;
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let pass = hub.render_passes.resolve(desc.render_pass)?;
        let framebuffer = hub.framebuffers.resolve(desc.framebuffer)?;
        compat::check_render_passes(pass.layout(), framebuffer.layout())?;
        if let Some(set) = desc.occlusion_query_set {
            let set = hub.query_sets.resolve(set)?;
            if set.ty() != QueryType::Occlusion {
                return Err(rgfx_core::Error::invalid_argument(
                    "render pass occlusion query set holds timestamp queries",
                ));
            }
        }

        let mut batch = BarrierBatch::new();
        for target in framebuffer.targets() {
            let texture = hub.textures.resolve(target.texture)?;
            texture.transition(
                target.mips.clone(),
                target.attachment_layout,
                &mut batch,
            );
        }
        self.record_barriers(&batch);

        let extent = framebuffer.extent();
        let clears = clear_values(
            pass.layout(),
            desc.color_clear_values,
            desc.depth_clear_value,
            desc.stencil_clear_value,
        );
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(pass.raw())
            .framebuffer(framebuffer.raw())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clears);
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let ash_device = device.raw().ash_device();
        // SAFETY: cmd is recording outside a pass; the pass and framebuffer
        // were checked compatible and the targets moved to their attachment
        // layouts above.
        unsafe {
            ash_device.cmd_begin_render_pass(
                self.cmd,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
            ash_device.cmd_set_viewport(self.cmd, 0, &[viewport]);
            ash_device.cmd_set_scissor(self.cmd, 0, &[scissor]);
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
        drop(hub);

        self.lifecycle.begin_pass(PassKind::Render)?;
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
        self.lifecycle.require_pass(PassKind::Render)?;
        if self.render_pass.as_ref().is_some_and(|p| p.active_query.is_some())
        {
            return Err(rgfx_core::Error::invalid_state(
                "an occlusion query is still active in this render pass",
            ));
        }
        // SAFETY: A render pass is open on cmd.
        unsafe {
            self.device.raw().ash_device().cmd_end_render_pass(self.cmd)
        };
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
        self.lifecycle.begin_pass(PassKind::Compute)?;
        self.bound = None;
        tracing::trace!("Began compute pass {:?}", desc.label);
        Ok(())
    }

    fn end_compute_pass(&mut self) -> rgfx_core::Result<()> {
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
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let source = hub.buffers.resolve(desc.source)?;
        let destination = hub.buffers.resolve(desc.destination)?;
        let src = byte_range(desc.source_offset, desc.size, source.size())?;
        let dst = byte_range(
            desc.destination_offset,
            desc.size,
            destination.size(),
        )?;
        if desc.source == desc.destination
            && src.start < dst.end
            && dst.start < src.end
        {
            return Err(rgfx_core::Error::invalid_argument(
                "source and destination ranges overlap",
            ));
        }

        let mut before = BarrierBatch::new();
        transfer_prologue(&mut before);
        self.record_barriers(&before);
        let region = vk::BufferCopy {
            src_offset: desc.source_offset,
            dst_offset: desc.destination_offset,
            size: desc.size,
        };
        // SAFETY: cmd is recording outside a pass and both ranges were
        // checked against their buffers.
        unsafe {
            device.raw().ash_device().cmd_copy_buffer(
                self.cmd,
                source.raw(),
                destination.raw(),
                &[region],
            )
        };
        let mut after = BarrierBatch::new();
        transfer_epilogue(&mut after);
        self.record_barriers(&after);
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
        // SAFETY: cmd is recording outside a pass on this device.
        unsafe {
            record_upload(
                device.raw().ash_device(),
                self.cmd,
                source,
                desc.source_offset,
                texture,
                (desc.mip_level, desc.origin, desc.extent),
                desc.final_layout,
            )
        }
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
        let bytes = packed_data_size(desc.extent, info.format.bytes_per_pixel());
        byte_range(desc.destination_offset, bytes, destination.size())?;

        let mut before = BarrierBatch::new();
        transfer_prologue(&mut before);
        texture.transition(
            desc.mip_level..desc.mip_level + 1,
            TextureLayout::TransferSrc,
            &mut before,
        );
        self.record_barriers(&before);
        let region = vk::BufferImageCopy {
            buffer_offset: desc.destination_offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: subresource_layers(
                texture.copy_aspect(),
                desc.mip_level,
                layers,
            ),
            image_offset: offset3d(offset),
            image_extent: extent3d(texels),
        };
        // SAFETY: cmd is recording outside a pass, the region was checked
        // against both resources and the mip is in TRANSFER_SRC.
        unsafe {
            device.raw().ash_device().cmd_copy_image_to_buffer(
                self.cmd,
                texture.raw(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                destination.raw(),
                &[region],
            )
        };
        let mut after = BarrierBatch::new();
        settle(texture, desc.mip_level, desc.final_layout, &mut after);
        transfer_epilogue(&mut after);
        self.record_barriers(&after);
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
        if src_info.format.bytes_per_pixel() != dst_info.format.bytes_per_pixel()
        {
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
        let (dst_offset, _, dst_layers) = texel_region(
            &dst_info,
            desc.destination_mip_level,
            desc.destination_origin,
            desc.extent,
        )?;

        let mut before = BarrierBatch::new();
        transfer_prologue(&mut before);
        source.transition(
            desc.source_mip_level..desc.source_mip_level + 1,
            TextureLayout::TransferSrc,
            &mut before,
        );
        destination.transition(
            desc.destination_mip_level..desc.destination_mip_level + 1,
            TextureLayout::TransferDst,
            &mut before,
        );
        self.record_barriers(&before);
        let region = vk::ImageCopy {
            src_subresource: subresource_layers(
                source.copy_aspect(),
                desc.source_mip_level,
                src_layers,
            ),
            src_offset: offset3d(src_offset),
            dst_subresource: subresource_layers(
                destination.copy_aspect(),
                desc.destination_mip_level,
                dst_layers,
            ),
            dst_offset: offset3d(dst_offset),
            extent: extent3d(texels),
        };
        // SAFETY: cmd is recording outside a pass, both regions were checked
        // and the mips are in their transfer layouts.
        unsafe {
            device.raw().ash_device().cmd_copy_image(
                self.cmd,
                source.raw(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                destination.raw(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        };
        let mut after = BarrierBatch::new();
        settle(
            source,
            desc.source_mip_level,
            desc.source_final_layout,
            &mut after,
        );
        settle(
            destination,
            desc.destination_mip_level,
            desc.destination_final_layout,
            &mut after,
        );
        transfer_epilogue(&mut after);
        self.record_barriers(&after);
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
        if desc.filter == FilterMode::Linear
            && (src_info.format.is_depth_stencil()
                || !src_info.format.is_filterable())
        {
            return Err(rgfx_core::Error::invalid_argument(format!(
                "{:?} cannot be blitted with linear filtering",
                src_info.format
            )));
        }
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

        let mut before = BarrierBatch::new();
        transfer_prologue(&mut before);
        source.transition(
            desc.source_mip_level..desc.source_mip_level + 1,
            TextureLayout::TransferSrc,
            &mut before,
        );
        destination.transition(
            desc.destination_mip_level..desc.destination_mip_level + 1,
            TextureLayout::TransferDst,
            &mut before,
        );
        self.record_barriers(&before);
        let region = vk::ImageBlit {
            src_subresource: subresource_layers(
                source.copy_aspect(),
                desc.source_mip_level,
                src_layers,
            ),
            src_offsets: blit_bounds(src_offset, src_texels),
            dst_subresource: subresource_layers(
                destination.copy_aspect(),
                desc.destination_mip_level,
                dst_layers,
            ),
            dst_offsets: blit_bounds(dst_offset, dst_texels),
        };
        // SAFETY: cmd is recording outside a pass, both regions were checked
        // and the mips are in their transfer layouts.
        unsafe {
            device.raw().ash_device().cmd_blit_image(
                self.cmd,
                source.raw(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                destination.raw(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                conv::filter(desc.filter),
            )
        };
        let mut after = BarrierBatch::new();
        settle(
            source,
            desc.source_mip_level,
            desc.source_final_layout,
            &mut after,
        );
        settle(
            destination,
            desc.destination_mip_level,
            desc.destination_final_layout,
            &mut after,
        );
        transfer_epilogue(&mut after);
        self.record_barriers(&after);
        Ok(())
    }

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
        let stages = |src, dst| {
            (conv::pipeline_stages(src), conv::pipeline_stages(dst))
        };
        let access =
            |src, dst| (conv::access_flags(src), conv::access_flags(dst));

        let mut batch = BarrierBatch::new();
        for barrier in desc.memory_barriers {
            batch.memory(
                stages(barrier.src_stage_mask, barrier.dst_stage_mask),
                access(barrier.src_access_mask, barrier.dst_access_mask),
            );
        }
        for barrier in desc.buffer_barriers {
            let buffer = hub.buffers.resolve(barrier.buffer)?;
            let range = byte_range(barrier.offset, barrier.size, buffer.size())?;
            let size = match barrier.size {
                0 => vk::WHOLE_SIZE,
                _ => range.end - range.start,
            };
            batch.buffer(
                buffer.raw(),
                (barrier.offset, size),
                stages(barrier.src_stage_mask, barrier.dst_stage_mask),
                access(barrier.src_access_mask, barrier.dst_access_mask),
            );
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
            // Layers follow the same "zero means the rest" rule as mips.
            let layers = clamp_mip_range(
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
            textures.push((barrier, texture, mips, layers));
        }
        for (barrier, texture, mips, layers) in textures {
            texture.transition_from(
                mips.clone(),
                barrier.old_layout,
                barrier.new_layout,
            )?;
            let subresource = vk::ImageSubresourceRange {
                aspect_mask: texture.aspect(),
                base_mip_level: mips.start,
                level_count: mips.len() as u32,
                base_array_layer: layers.start,
                layer_count: layers.len() as u32,
            };
            batch.image(
                texture.raw(),
                subresource,
                (
                    conv::texture_layout(barrier.old_layout),
                    conv::texture_layout(barrier.new_layout),
                ),
                stages(barrier.src_stage_mask, barrier.dst_stage_mask),
                access(barrier.src_access_mask, barrier.dst_access_mask),
            );
        }
        self.record_barriers(&batch);
        Ok(())
    }

    fn generate_mipmaps(
        &mut self,
        texture: TextureHandle,
    ) -> rgfx_core::Result<()> {
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
        let Some(levels) =
            mip_chain(base_mip_level, level_count, info.mip_level_count)
        else {
            tracing::trace!(
                "No mips to generate from level {base_mip_level} of {}",
                info.mip_level_count
            );
            return Ok(());
        };
        require_single_sample(&info)?;
        require_usage(&info, TextureUsage::COPY_SRC | TextureUsage::COPY_DST)?;

        let restore = match texture.layout(levels.start) {
            None | Some(TextureLayout::Undefined) => TextureLayout::TransferSrc,
            Some(layout) => layout,
        };
        let filter = if info.format.is_depth_stencil()
            || !info.format.is_filterable()
        {
            vk::Filter::NEAREST
        } else {
            vk::Filter::LINEAR
        };
        let aspect = texture.copy_aspect();
        let layers = texture.all_layers();
        let ash_device = device.raw().ash_device();

        let mut before = BarrierBatch::new();
        transfer_prologue(&mut before);
        self.record_barriers(&before);
        for dst in levels.start + 1..levels.end {
            let src = dst - 1;
            let mut batch = BarrierBatch::new();
            texture.transition(src..src + 1, TextureLayout::TransferSrc, &mut batch);
            texture.transition(dst..dst + 1, TextureLayout::TransferDst, &mut batch);
            self.record_barriers(&batch);
            let region = vk::ImageBlit {
                src_subresource: subresource_layers(aspect, src, layers.clone()),
                src_offsets: blit_bounds(Origin3D::ZERO, texture.mip_size(src)),
                dst_subresource: subresource_layers(aspect, dst, layers.clone()),
                dst_offsets: blit_bounds(Origin3D::ZERO, texture.mip_size(dst)),
            };
            // SAFETY: cmd is recording outside a pass; src is in
            // TRANSFER_SRC and dst in TRANSFER_DST.
            unsafe {
                ash_device.cmd_blit_image(
                    self.cmd,
                    texture.raw(),
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    texture.raw(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                    filter,
                )
            };
        }
        let mut after = BarrierBatch::new();
        texture.transition(levels, restore, &mut after);
        transfer_epilogue(&mut after);
        self.record_barriers(&after);
        Ok(())
    }

    fn write_timestamp(
        &mut self,
        query_set: QuerySetHandle,
        query_index: u32,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_recording()?;
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let set = hub.query_sets.resolve(query_set)?;
        set.require(QueryType::Timestamp, query_index)?;
        // SAFETY: cmd is recording and the index is inside the pool.
        unsafe {
            device.raw().ash_device().cmd_write_timestamp(
                self.cmd,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                set.raw(),
                query_index,
            )
        };
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
        // SAFETY: cmd is recording outside a pass and the range passed
        // check_resolve.
        unsafe {
            set.record_resolve(
                self.cmd,
                first_query,
                query_count,
                buffer.raw(),
                destination_offset,
            )
        };
        Ok(())
    }

    // ---- render pass

    fn set_render_pipeline(
        &mut self,
        pipeline: RenderPipelineHandle,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_pass(PassKind::Render)?;
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let pipeline = hub.render_pipelines.resolve(pipeline)?;
        let layout = pipeline.layout();
        // SAFETY: A render pass is open on cmd.
        unsafe {
            device.raw().ash_device().cmd_bind_pipeline(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.raw(),
            )
        };
        self.bound = Some(BoundLayout {
            raw: layout.raw(),
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            dynamic_offsets: (0..layout.set_count())
                .map(|i| layout.dynamic_offset_count(i).unwrap_or(0))
                .collect(),
        });
        Ok(())
    }

    fn set_vertex_buffer(
        &mut self,
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_pass(PassKind::Render)?;
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let buffer = hub.buffers.resolve(buffer)?;
        if !buffer.info().usage.contains(BufferUsage::VERTEX) {
            return Err(rgfx_core::Error::invalid_argument(
                "vertex buffer lacks VERTEX usage",
            ));
        }
        byte_range(offset, size, buffer.size())?;
        // SAFETY: A render pass is open and offset lies inside the buffer.
        unsafe {
            device.raw().ash_device().cmd_bind_vertex_buffers(
                self.cmd,
                slot,
                &[buffer.raw()],
                &[offset],
            )
        };
        Ok(())
    }

    fn set_index_buffer(
        &mut self,
        buffer: BufferHandle,
        format: IndexFormat,
        offset: u64,
        size: u64,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_pass(PassKind::Render)?;
        if offset % format.size() != 0 {
            return Err(rgfx_core::Error::invalid_argument(format!(
                "index offset {offset} is not aligned to {format:?}"
            )));
        }
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let buffer = hub.buffers.resolve(buffer)?;
        if !buffer.info().usage.contains(BufferUsage::INDEX) {
            return Err(rgfx_core::Error::invalid_argument(
                "index buffer lacks INDEX usage",
            ));
        }
        byte_range(offset, size, buffer.size())?;
        // SAFETY: A render pass is open and offset lies inside the buffer.
        unsafe {
            device.raw().ash_device().cmd_bind_index_buffer(
                self.cmd,
                buffer.raw(),
                offset,
                conv::index_type(format),
            )
        };
        Ok(())
    }

    fn set_viewport(&mut self, viewport: &Viewport) -> rgfx_core::Result<()> {
        self.lifecycle.require_pass(PassKind::Render)?;
        let viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        // SAFETY: A render pass is open; viewport is dynamic state on every
        // pipeline.
        unsafe {
            self.device
                .raw()
                .ash_device()
                .cmd_set_viewport(self.cmd, 0, &[viewport])
        };
        Ok(())
    }

    fn set_scissor_rect(
        &mut self,
        scissor: &ScissorRect,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_pass(PassKind::Render)?;
        if scissor.x < 0 || scissor.y < 0 {
            return Err(rgfx_core::Error::invalid_argument(format!(
                "scissor origin ({}, {}) is negative",
                scissor.x, scissor.y
            )));
        }
        let rect = vk::Rect2D {
            offset: vk::Offset2D {
                x: scissor.x,
                y: scissor.y,
            },
            extent: vk::Extent2D {
                width: scissor.width,
                height: scissor.height,
            },
        };
        // SAFETY: A render pass is open; scissor is dynamic state on every
        // pipeline.
        unsafe {
            self.device
                .raw()
                .ash_device()
                .cmd_set_scissor(self.cmd, 0, &[rect])
        };
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
        // SAFETY: A render pass is open with a pipeline bound.
        unsafe {
            self.device.raw().ash_device().cmd_draw(
                self.cmd,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            )
        };
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
        // SAFETY: A render pass is open with a pipeline bound.
        unsafe {
            self.device.raw().ash_device().cmd_draw_indexed(
                self.cmd,
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
            )
        };
        Ok(())
    }

    fn draw_indirect(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
    ) -> rgfx_core::Result<()> {
        self.require_pipeline(PassKind::Render)?;
        let raw = self.require_indirect(buffer, offset, DRAW_INDIRECT_SIZE)?;
        // SAFETY: A render pass is open with a pipeline bound; the command
        // lies inside the buffer.
        unsafe {
            self.device
                .raw()
                .ash_device()
                .cmd_draw_indirect(self.cmd, raw, offset, 1, 0)
        };
        Ok(())
    }

    fn draw_indexed_indirect(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
    ) -> rgfx_core::Result<()> {
        self.require_pipeline(PassKind::Render)?;
        let raw =
            self.require_indirect(buffer, offset, DRAW_INDEXED_INDIRECT_SIZE)?;
        // SAFETY: A render pass is open with a pipeline bound; the command
        // lies inside the buffer.
        unsafe {
            self.device
                .raw()
                .ash_device()
                .cmd_draw_indexed_indirect(self.cmd, raw, offset, 1, 0)
        };
        Ok(())
    }

    fn begin_occlusion_query(
        &mut self,
        query_set: QuerySetHandle,
        query_index: u32,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_pass(PassKind::Render)?;
        let Some(open) = self.render_pass.as_mut() else {
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
        let hub = self.device.hub();
        let set = hub.query_sets.resolve(query_set)?;
        set.require(QueryType::Occlusion, query_index)?;
        // SAFETY: A render pass is open and the query was reset at creation
        // or by its last resolve.
        unsafe {
            self.device.raw().ash_device().cmd_begin_query(
                self.cmd,
                set.raw(),
                query_index,
                vk::QueryControlFlags::empty(),
            )
        };
        drop(hub);
        open.active_query = Some(query_index);
        Ok(())
    }

    fn end_occlusion_query(&mut self) -> rgfx_core::Result<()> {
        self.lifecycle.require_pass(PassKind::Render)?;
        let Some(open) = self.render_pass.as_mut() else {
            return Err(rgfx_core::Error::invalid_state(
                "no render pass is open on this encoder",
            ));
        };
        let (Some(set), Some(index)) =
            (open.occlusion_query_set, open.active_query.take())
        else {
            return Err(rgfx_core::Error::invalid_state(
                "no occlusion query is active",
            ));
        };
        let hub = self.device.hub();
        let set = hub.query_sets.resolve(set)?;
        // SAFETY: The query was begun in this render pass.
        unsafe {
            self.device
                .raw()
                .ash_device()
                .cmd_end_query(self.cmd, set.raw(), index)
        };
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
        let Some(bound) = self.bound.as_ref() else {
            return Ok(());
        };
        let hub = self.device.hub();
        let group = hub.bind_groups.resolve(group)?;
        check_dynamic_offsets(
            index,
            &bound.dynamic_offsets,
            group.dynamic_offset_count(),
            dynamic_offsets.len(),
        )?;
        // SAFETY: A pass is open with a pipeline whose layout has set
        // `index`, and the offsets match its dynamic bindings.
        unsafe {
            self.device.raw().ash_device().cmd_bind_descriptor_sets(
                self.cmd,
                bound.bind_point,
                bound.raw,
                index,
                &[group.raw()],
                dynamic_offsets,
            )
        };
        Ok(())
    }

    // ---- compute pass

    fn set_compute_pipeline(
        &mut self,
        pipeline: ComputePipelineHandle,
    ) -> rgfx_core::Result<()> {
        self.lifecycle.require_pass(PassKind::Compute)?;
        let device = Arc::clone(&self.device);
        let hub = device.hub();
        let pipeline = hub.compute_pipelines.resolve(pipeline)?;
        let layout = pipeline.layout();
        // SAFETY: cmd is recording with a compute pass open.
        unsafe {
            device.raw().ash_device().cmd_bind_pipeline(
                self.cmd,
                vk::PipelineBindPoint::COMPUTE,
                pipeline.raw(),
            )
        };
        self.bound = Some(BoundLayout {
            raw: layout.raw(),
            bind_point: vk::PipelineBindPoint::COMPUTE,
            dynamic_offsets: (0..layout.set_count())
                .map(|i| layout.dynamic_offset_count(i).unwrap_or(0))
                .collect(),
        });
        Ok(())
    }

    fn dispatch_workgroups(
        &mut self,
        x: u32,
        y: u32,
        z: u32,
    ) -> rgfx_core::Result<()> {
        self.require_pipeline(PassKind::Compute)?;
        // SAFETY: A compute pipeline is bound.
        unsafe {
            self.device
                .raw()
                .ash_device()
                .cmd_dispatch(self.cmd, x, y, z)
        };
        Ok(())
    }

    fn dispatch_workgroups_indirect(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
    ) -> rgfx_core::Result<()> {
        self.require_pipeline(PassKind::Compute)?;
        let raw = self.require_indirect(buffer, offset, DISPATCH_INDIRECT_SIZE)?;
        // SAFETY: A compute pipeline is bound and the command lies inside
        // the buffer.
        unsafe {
            self.device
                .raw()
                .ash_device()
                .cmd_dispatch_indirect(self.cmd, raw, offset)
        };
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

    #[test]
    fn dynamic_offsets_must_match_layout_and_group() {
        let sets = [0, 2];
        assert!(check_dynamic_offsets(1, &sets, 2, 2).is_ok());
        assert!(check_dynamic_offsets(0, &sets, 0, 0).is_ok());
        assert!(check_dynamic_offsets(2, &sets, 0, 0).is_err());
        assert!(check_dynamic_offsets(1, &sets, 1, 2).is_err());
        assert!(check_dynamic_offsets(1, &sets, 2, 1).is_err());
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

    #[test]
    fn blit_bounds_span_the_region() {
        let [lo, hi] =
            blit_bounds(Origin3D::new(2, 4, 0), Extent3D::new(8, 6, 1));
        assert_eq!((lo.x, lo.y, lo.z), (2, 4, 0));
        assert_eq!((hi.x, hi.y, hi.z), (10, 10, 1));
    }
}
