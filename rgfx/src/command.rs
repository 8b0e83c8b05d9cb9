//! Command recording.
//!
//! A [`CommandEncoder`] is an owned value that may move to another thread
//! and record there while other encoders record elsewhere. Pass scopes
//! borrow their encoder mutably, so a pass has to end before the encoder
//! can record anything else, end or be submitted. A scope dropped without
//! [`RenderPassEncoder::end`] ends itself and logs the outcome.
//!
//! Every encoder is reusable: after a submission, [`CommandEncoder::begin`]
//! starts a new recording on either backend.

use rgfx_core::backend::CommandEncoderBackend;
use rgfx_core::descriptor::{
    BlitTextureToTextureDescriptor, ComputePassBeginDescriptor,
    CopyBufferToBufferDescriptor, CopyBufferToTextureDescriptor,
    CopyTextureToBufferDescriptor, CopyTextureToTextureDescriptor,
    PipelineBarrierDescriptor, RenderPassBeginDescriptor,
};
use rgfx_core::encoder::EncoderState;
use rgfx_core::{
    BackendKind, BindGroupHandle, BufferHandle, ComputePipelineHandle,
    IndexFormat, QuerySetHandle, RenderPipelineHandle, Result, ScissorRect,
    TextureHandle, Viewport,
};

use crate::device::Device;

backend_enum! {
    #[derive(Debug)]
    pub(crate) enum EncoderInner {
        rgfx_vk::VulkanEncoder,
        rgfx_wgpu::WgpuEncoder,
    }
}

#[derive(Debug)]
pub struct CommandEncoder {
    inner: EncoderInner,
    device: Device,
    label: Option<String>,
}

impl CommandEncoder {
    pub(crate) fn from_inner(
        inner: EncoderInner,
        device: Device,
        label: Option<&str>,
    ) -> Self {
        Self {
            inner,
            device,
            label: label.map(str::to_owned),
        }
    }

    pub(crate) fn inner_mut(&mut self) -> &mut EncoderInner {
        &mut self.inner
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn backend(&self) -> BackendKind {
        self.inner.backend()
    }

    pub fn state(&self) -> EncoderState {
        dispatch!(&self.inner, EncoderInner, e => e.state())
    }

    /// Start recording. An encoder that was ended or submitted is reset
    /// or rebuilt first, whichever its backend needs.
    pub fn begin(&mut self) -> Result<()> {
        dispatch!(&mut self.inner, EncoderInner, e => e.begin())
    }

    pub fn end(&mut self) -> Result<()> {
        dispatch!(&mut self.inner, EncoderInner, e => e.end())
    }

    /// Drop everything recorded and return to idle.
    pub fn reset(&mut self) -> Result<()> {
        dispatch!(&mut self.inner, EncoderInner, e => e.reset())
    }

    /// Begin a render pass against `desc.framebuffer`, which must be
    /// compatible with `desc.render_pass`.
    pub fn begin_render_pass(
        &mut self,
        desc: &RenderPassBeginDescriptor<'_>,
    ) -> Result<RenderPassEncoder<'_>> {
        dispatch!(&mut self.inner, EncoderInner, e => e.begin_render_pass(desc))?;
        Ok(RenderPassEncoder {
            encoder: self,
            open: true,
        })
    }

    pub fn begin_compute_pass(
        &mut self,
        desc: &ComputePassBeginDescriptor<'_>,
    ) -> Result<ComputePassEncoder<'_>> {
        dispatch!(&mut self.inner, EncoderInner, e => e.begin_compute_pass(desc))?;
        Ok(ComputePassEncoder {
            encoder: self,
            open: true,
        })
    }

    // ---- transfer

    pub fn copy_buffer_to_buffer(
        &mut self,
        desc: &CopyBufferToBufferDescriptor,
    ) -> Result<()> {
        dispatch!(&mut self.inner, EncoderInner, e => e.copy_buffer_to_buffer(desc))
    }

    pub fn copy_buffer_to_texture(
        &mut self,
        desc: &CopyBufferToTextureDescriptor,
    ) -> Result<()> {
        dispatch!(&mut self.inner, EncoderInner, e => e.copy_buffer_to_texture(desc))
    }

    pub fn copy_texture_to_buffer(
        &mut self,
        desc: &CopyTextureToBufferDescriptor,
    ) -> Result<()> {
        dispatch!(&mut self.inner, EncoderInner, e => e.copy_texture_to_buffer(desc))
    }

    pub fn copy_texture_to_texture(
        &mut self,
        desc: &CopyTextureToTextureDescriptor,
    ) -> Result<()> {
        dispatch!(&mut self.inner, EncoderInner, e => e.copy_texture_to_texture(desc))
    }

    /// Scaled, filtered copy between texture regions.
    pub fn blit_texture_to_texture(
        &mut self,
        desc: &BlitTextureToTextureDescriptor,
    ) -> Result<()> {
        dispatch!(&mut self.inner, EncoderInner, e => e.blit_texture_to_texture(desc))
    }

    pub fn pipeline_barrier(
        &mut self,
        desc: &PipelineBarrierDescriptor<'_>,
    ) -> Result<()> {
        dispatch!(&mut self.inner, EncoderInner, e => e.pipeline_barrier(desc))
    }

    /// Fill every mip below 0 from its parent. No-op for single-level
    /// textures.
    pub fn generate_mipmaps(&mut self, texture: TextureHandle) -> Result<()> {
        dispatch!(&mut self.inner, EncoderInner, e => e.generate_mipmaps(texture))
    }

    pub fn generate_mipmaps_range(
        &mut self,
        texture: TextureHandle,
        base_mip_level: u32,
        level_count: u32,
    ) -> Result<()> {
        dispatch!(&mut self.inner, EncoderInner, e => {
            e.generate_mipmaps_range(texture, base_mip_level, level_count)
        })
    }

    pub fn write_timestamp(
        &mut self,
        query_set: QuerySetHandle,
        query_index: u32,
    ) -> Result<()> {
        dispatch!(&mut self.inner, EncoderInner, e => {
            e.write_timestamp(query_set, query_index)
        })
    }

    /// Copy `query_count` 64-bit results into `destination`.
    pub fn resolve_query_set(
        &mut self,
        query_set: QuerySetHandle,
        first_query: u32,
        query_count: u32,
        destination: BufferHandle,
        destination_offset: u64,
    ) -> Result<()> {
        dispatch!(&mut self.inner, EncoderInner, e => e.resolve_query_set(
            query_set,
            first_query,
            query_count,
            destination,
            destination_offset,
        ))
    }
}

// ----------------------------------------------------------------------------
// Pass scopes

/// An open render pass on a borrowed [`CommandEncoder`].
#[derive(Debug)]
pub struct RenderPassEncoder<'a> {
    encoder: &'a mut CommandEncoder,
    open: bool,
}

impl RenderPassEncoder<'_> {
    fn inner(&mut self) -> &mut EncoderInner {
        &mut self.encoder.inner
    }

    pub fn set_pipeline(&mut self, pipeline: RenderPipelineHandle) -> Result<()> {
        dispatch!(self.inner(), EncoderInner, e => e.set_render_pipeline(pipeline))
    }

    /// `size == 0` binds to the end of the buffer.
    pub fn set_vertex_buffer(
        &mut self,
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        dispatch!(self.inner(), EncoderInner, e => {
            e.set_vertex_buffer(slot, buffer, offset, size)
        })
    }

    pub fn set_index_buffer(
        &mut self,
        buffer: BufferHandle,
        format: IndexFormat,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        dispatch!(self.inner(), EncoderInner, e => {
            e.set_index_buffer(buffer, format, offset, size)
        })
    }

    /// Binds against the layout of the pipeline set on this pass.
    pub fn set_bind_group(
        &mut self,
        index: u32,
        group: BindGroupHandle,
        dynamic_offsets: &[u32],
    ) -> Result<()> {
        dispatch!(self.inner(), EncoderInner, e => {
            e.set_bind_group(index, group, dynamic_offsets)
        })
    }

    pub fn set_viewport(&mut self, viewport: &Viewport) -> Result<()> {
        dispatch!(self.inner(), EncoderInner, e => e.set_viewport(viewport))
    }

    pub fn set_scissor_rect(&mut self, scissor: &ScissorRect) -> Result<()> {
        dispatch!(self.inner(), EncoderInner, e => e.set_scissor_rect(scissor))
    }

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()> {
        dispatch!(self.inner(), EncoderInner, e => {
            e.draw(vertex_count, instance_count, first_vertex, first_instance)
        })
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<()> {
        dispatch!(self.inner(), EncoderInner, e => e.draw_indexed(
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        ))
    }

    pub fn draw_indirect(&mut self, buffer: BufferHandle, offset: u64) -> Result<()> {
        dispatch!(self.inner(), EncoderInner, e => e.draw_indirect(buffer, offset))
    }

    pub fn draw_indexed_indirect(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
    ) -> Result<()> {
        dispatch!(self.inner(), EncoderInner, e => {
            e.draw_indexed_indirect(buffer, offset)
        })
    }

    /// Needs the occlusion query set named when the pass began.
    pub fn begin_occlusion_query(
        &mut self,
        query_set: QuerySetHandle,
        query_index: u32,
    ) -> Result<()> {
        dispatch!(self.inner(), EncoderInner, e => {
            e.begin_occlusion_query(query_set, query_index)
        })
    }

    pub fn end_occlusion_query(&mut self) -> Result<()> {
        dispatch!(self.inner(), EncoderInner, e => e.end_occlusion_query())
    }

    pub fn end(mut self) -> Result<()> {
        self.open = false;
        dispatch!(self.inner(), EncoderInner, e => e.end_render_pass())
    }
}

impl Drop for RenderPassEncoder<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        tracing::debug!("Dropping open render pass on {:?}", self.encoder.label);
        let ended = dispatch!(self.inner(), EncoderInner, e => e.end_render_pass());
        if let Err(e) = ended {
            tracing::warn!("Failed to end dropped render pass: {e}");
        }
    }
}

/// An open compute pass on a borrowed [`CommandEncoder`].
#[derive(Debug)]
pub struct ComputePassEncoder<'a> {
    encoder: &'a mut CommandEncoder,
    open: bool,
}

impl ComputePassEncoder<'_> {
    fn inner(&mut self) -> &mut EncoderInner {
        &mut self.encoder.inner
    }

    pub fn set_pipeline(&mut self, pipeline: ComputePipelineHandle) -> Result<()> {
        dispatch!(self.inner(), EncoderInner, e => e.set_compute_pipeline(pipeline))
    }

    pub fn set_bind_group(
        &mut self,
        index: u32,
        group: BindGroupHandle,
        dynamic_offsets: &[u32],
    ) -> Result<()> {
        dispatch!(self.inner(), EncoderInner, e => {
            e.set_bind_group(index, group, dynamic_offsets)
        })
    }

    pub fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        dispatch!(self.inner(), EncoderInner, e => e.dispatch_workgroups(x, y, z))
    }

    pub fn dispatch_workgroups_indirect(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
    ) -> Result<()> {
        dispatch!(self.inner(), EncoderInner, e => {
            e.dispatch_workgroups_indirect(buffer, offset)
        })
    }

    pub fn end(mut self) -> Result<()> {
        self.open = false;
        dispatch!(self.inner(), EncoderInner, e => e.end_compute_pass())
    }
}

impl Drop for ComputePassEncoder<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        tracing::debug!("Dropping open compute pass on {:?}", self.encoder.label);
        let ended = dispatch!(self.inner(), EncoderInner, e => e.end_compute_pass());
        if let Err(e) = ended {
            tracing::warn!("Failed to end dropped compute pass: {e}");
        }
    }
}
