//! The contract every backend implements.
//!
//! Backends are a closed set: the facade holds one concrete implementation
//! per variant and dispatches statically. These traits keep the variants
//! honest about offering the same surface.

use std::sync::Arc;

use crate::descriptor::{
    AdapterDescriptor, AdapterInfo, BindGroupDescriptor,
    BindGroupLayoutDescriptor, BlitTextureToTextureDescriptor,
    BufferDescriptor, BufferImportDescriptor, BufferInfo,
    ComputePassBeginDescriptor, ComputePipelineDescriptor,
    CopyBufferToBufferDescriptor, CopyBufferToTextureDescriptor,
    CopyTextureToBufferDescriptor, CopyTextureToTextureDescriptor,
    DeviceDescriptor, DeviceLimits, FenceDescriptor, FramebufferDescriptor,
    PipelineBarrierDescriptor, PresentDescriptor, QuerySetDescriptor,
    QueueFamilyProperties, RenderPassBeginDescriptor, RenderPassDescriptor,
    RenderPipelineDescriptor, SamplerDescriptor, SemaphoreDescriptor,
    ShaderDescriptor, SubmitInfo, SurfaceDescriptor, SwapchainDescriptor,
    SwapchainInfo, TextureDescriptor, TextureImportDescriptor, TextureInfo,
    TextureViewDescriptor,
};
use crate::encoder::EncoderState;
use crate::error::Result;
use crate::format::TextureFormat;
use crate::handle::{
    BindGroupHandle, BindGroupLayoutHandle, BufferHandle,
    ComputePipelineHandle, FenceHandle, FramebufferHandle, QuerySetHandle,
    RenderPassHandle, RenderPipelineHandle, SamplerHandle, SemaphoreHandle,
    ShaderHandle, SwapchainHandle, TextureHandle, TextureViewHandle,
};
use crate::types::{
    BackendKind, Extent3D, IndexFormat, Origin3D, PresentMode, ScissorRect,
    SemaphoreType, ShaderSourceType, TextureLayout, Viewport,
};

pub trait InstanceBackend: Send + Sync + Sized {
    type Adapter: AdapterBackend;

    fn kind(&self) -> BackendKind;
    fn enumerate_adapters(&self) -> Result<Vec<Self::Adapter>>;
    fn request_adapter(&self, desc: &AdapterDescriptor) -> Result<Self::Adapter>;
}

pub trait AdapterBackend: Send + Sync {
    type Device: DeviceBackend;

    fn info(&self) -> AdapterInfo;
    fn limits(&self) -> DeviceLimits;
    fn queue_families(&self) -> Vec<QueueFamilyProperties>;
    fn queue_family_surface_support(
        &self,
        queue_family_index: u32,
        surface: &<Self::Device as DeviceBackend>::Surface,
    ) -> Result<bool>;
    fn extensions(&self) -> Vec<&'static str>;
    fn create_device(
        &self,
        desc: &DeviceDescriptor<'_>,
    ) -> Result<Arc<Self::Device>>;
}

pub trait SurfaceBackend: Send + Sync {
    fn supported_formats(&self) -> Result<Vec<TextureFormat>>;
    fn supported_present_modes(&self) -> Result<Vec<PresentMode>>;
}

/// A logical device together with its single queue.
///
/// `destroy_*` on a handle that was already destroyed is a no-op returning
/// `Ok(())`. Every other call on a stale handle fails with
/// [`crate::Error::InvalidHandle`].
pub trait DeviceBackend: Send + Sync + Sized {
    type Surface: SurfaceBackend;
    type CommandEncoder: CommandEncoderBackend;

    fn limits(&self) -> DeviceLimits;
    fn supports_shader_format(&self, format: ShaderSourceType) -> bool;
    fn wait_idle(&self) -> Result<()>;

    fn create_surface(
        &self,
        desc: &SurfaceDescriptor<'_>,
    ) -> Result<Self::Surface>;

    // ---- buffers

    fn create_buffer(&self, desc: &BufferDescriptor<'_>) -> Result<BufferHandle>;
    fn import_buffer(
        &self,
        desc: &BufferImportDescriptor<'_>,
    ) -> Result<BufferHandle>;
    fn destroy_buffer(&self, buffer: BufferHandle) -> Result<()>;
    fn buffer_info(&self, buffer: BufferHandle) -> Result<BufferInfo>;
    fn buffer_native_handle(&self, buffer: BufferHandle) -> Result<u64>;
    /// Map `[offset, offset + size)`; `size == 0` maps to the end.
    fn map_buffer(&self, buffer: BufferHandle, offset: u64, size: u64)
    -> Result<()>;
    fn unmap_buffer(&self, buffer: BufferHandle) -> Result<()>;
    /// Copy into the mapped range. `offset` is relative to the buffer start.
    fn write_mapped(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<()>;
    fn read_mapped(
        &self,
        buffer: BufferHandle,
        offset: u64,
        out: &mut [u8],
    ) -> Result<()>;
    fn flush_mapped_range(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Result<()>;
    fn invalidate_mapped_range(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Result<()>;

    // ---- textures

    fn create_texture(
        &self,
        desc: &TextureDescriptor<'_>,
    ) -> Result<TextureHandle>;
    fn import_texture(
        &self,
        desc: &TextureImportDescriptor<'_>,
    ) -> Result<TextureHandle>;
    fn destroy_texture(&self, texture: TextureHandle) -> Result<()>;
    fn texture_info(&self, texture: TextureHandle) -> Result<TextureInfo>;
    fn texture_native_handle(&self, texture: TextureHandle) -> Result<u64>;
    fn texture_layout(&self, texture: TextureHandle) -> Result<TextureLayout>;
    fn create_texture_view(
        &self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor<'_>,
    ) -> Result<TextureViewHandle>;
    fn destroy_texture_view(&self, view: TextureViewHandle) -> Result<()>;

    // ---- samplers, shaders, bindings

    fn create_sampler(
        &self,
        desc: &SamplerDescriptor<'_>,
    ) -> Result<SamplerHandle>;
    fn destroy_sampler(&self, sampler: SamplerHandle) -> Result<()>;
    fn create_shader(&self, desc: &ShaderDescriptor<'_>) -> Result<ShaderHandle>;
    fn destroy_shader(&self, shader: ShaderHandle) -> Result<()>;
    fn create_bind_group_layout(
        &self,
        desc: &BindGroupLayoutDescriptor<'_>,
    ) -> Result<BindGroupLayoutHandle>;
    fn destroy_bind_group_layout(
        &self,
        layout: BindGroupLayoutHandle,
    ) -> Result<()>;
    fn create_bind_group(
        &self,
        desc: &BindGroupDescriptor<'_>,
    ) -> Result<BindGroupHandle>;
    fn destroy_bind_group(&self, group: BindGroupHandle) -> Result<()>;

    // ---- passes and pipelines

    fn create_render_pass(
        &self,
        desc: &RenderPassDescriptor<'_>,
    ) -> Result<RenderPassHandle>;
    fn destroy_render_pass(&self, pass: RenderPassHandle) -> Result<()>;
    fn create_framebuffer(
        &self,
        desc: &FramebufferDescriptor<'_>,
    ) -> Result<FramebufferHandle>;
    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle)
    -> Result<()>;
    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDescriptor<'_>,
    ) -> Result<RenderPipelineHandle>;
    fn destroy_render_pipeline(
        &self,
        pipeline: RenderPipelineHandle,
    ) -> Result<()>;
    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor<'_>,
    ) -> Result<ComputePipelineHandle>;
    fn destroy_compute_pipeline(
        &self,
        pipeline: ComputePipelineHandle,
    ) -> Result<()>;

    // ---- synchronization and queries

    fn create_fence(&self, desc: &FenceDescriptor<'_>) -> Result<FenceHandle>;
    fn destroy_fence(&self, fence: FenceHandle) -> Result<()>;
    fn fence_status(&self, fence: FenceHandle) -> Result<bool>;
    /// Blocks until signaled; fails with [`crate::Error::Timeout`] when
    /// `timeout_ns` elapses first.
    fn wait_fence(&self, fence: FenceHandle, timeout_ns: u64) -> Result<()>;
    fn reset_fence(&self, fence: FenceHandle) -> Result<()>;

    fn create_semaphore(
        &self,
        desc: &SemaphoreDescriptor<'_>,
    ) -> Result<SemaphoreHandle>;
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) -> Result<()>;
    fn semaphore_type(&self, semaphore: SemaphoreHandle)
    -> Result<SemaphoreType>;
    fn signal_semaphore(
        &self,
        semaphore: SemaphoreHandle,
        value: u64,
    ) -> Result<()>;
    fn wait_semaphore(
        &self,
        semaphore: SemaphoreHandle,
        value: u64,
        timeout_ns: u64,
    ) -> Result<()>;
    fn semaphore_value(&self, semaphore: SemaphoreHandle) -> Result<u64>;

    fn create_query_set(
        &self,
        desc: &QuerySetDescriptor<'_>,
    ) -> Result<QuerySetHandle>;
    fn destroy_query_set(&self, query_set: QuerySetHandle) -> Result<()>;

    // ---- swapchains

    fn create_swapchain(
        &self,
        surface: &Self::Surface,
        desc: &SwapchainDescriptor<'_>,
    ) -> Result<SwapchainHandle>;
    fn destroy_swapchain(&self, swapchain: SwapchainHandle) -> Result<()>;
    fn swapchain_info(&self, swapchain: SwapchainHandle)
    -> Result<SwapchainInfo>;
    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        timeout_ns: u64,
        signal_semaphore: Option<SemaphoreHandle>,
        signal_fence: Option<FenceHandle>,
    ) -> Result<u32>;
    fn swapchain_texture_view(
        &self,
        swapchain: SwapchainHandle,
        index: u32,
    ) -> Result<TextureViewHandle>;
    fn swapchain_current_texture_view(
        &self,
        swapchain: SwapchainHandle,
    ) -> Result<TextureViewHandle>;
    fn present(
        &self,
        swapchain: SwapchainHandle,
        desc: &PresentDescriptor<'_>,
    ) -> Result<()>;

    // ---- recording and the queue

    fn create_command_encoder(
        self: &Arc<Self>,
        label: Option<&str>,
    ) -> Result<Self::CommandEncoder>;

    /// Ends every encoder still recording, then submits them in order.
    fn submit(
        &self,
        encoders: &mut [&mut Self::CommandEncoder],
        info: &SubmitInfo<'_>,
    ) -> Result<()>;
    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<()>;
    #[allow(clippy::too_many_arguments)]
    fn write_texture(
        &self,
        texture: TextureHandle,
        origin: Origin3D,
        mip_level: u32,
        data: &[u8],
        extent: Extent3D,
        final_layout: TextureLayout,
    ) -> Result<()>;
    fn queue_wait_idle(&self) -> Result<()>;
}

/// One recording unit.
///
/// Render and compute pass commands are only valid between the matching
/// `begin_*_pass` / `end_*_pass`; transfer commands only outside a pass.
pub trait CommandEncoderBackend: Send {
    fn state(&self) -> EncoderState;
    fn begin(&mut self) -> Result<()>;
    fn end(&mut self) -> Result<()>;
    fn reset(&mut self) -> Result<()>;

    fn begin_render_pass(
        &mut self,
        desc: &RenderPassBeginDescriptor<'_>,
    ) -> Result<()>;
    fn end_render_pass(&mut self) -> Result<()>;
    fn begin_compute_pass(
        &mut self,
        desc: &ComputePassBeginDescriptor<'_>,
    ) -> Result<()>;
    fn end_compute_pass(&mut self) -> Result<()>;

    // ---- transfer

    fn copy_buffer_to_buffer(
        &mut self,
        desc: &CopyBufferToBufferDescriptor,
    ) -> Result<()>;
    fn copy_buffer_to_texture(
        &mut self,
        desc: &CopyBufferToTextureDescriptor,
    ) -> Result<()>;
    fn copy_texture_to_buffer(
        &mut self,
        desc: &CopyTextureToBufferDescriptor,
    ) -> Result<()>;
    fn copy_texture_to_texture(
        &mut self,
        desc: &CopyTextureToTextureDescriptor,
    ) -> Result<()>;
    fn blit_texture_to_texture(
        &mut self,
        desc: &BlitTextureToTextureDescriptor,
    ) -> Result<()>;
    fn pipeline_barrier(
        &mut self,
        desc: &PipelineBarrierDescriptor<'_>,
    ) -> Result<()>;
    fn generate_mipmaps(&mut self, texture: TextureHandle) -> Result<()>;
    fn generate_mipmaps_range(
        &mut self,
        texture: TextureHandle,
        base_mip_level: u32,
        level_count: u32,
    ) -> Result<()>;
    fn write_timestamp(
        &mut self,
        query_set: QuerySetHandle,
        query_index: u32,
    ) -> Result<()>;
    fn resolve_query_set(
        &mut self,
        query_set: QuerySetHandle,
        first_query: u32,
        query_count: u32,
        destination: BufferHandle,
        destination_offset: u64,
    ) -> Result<()>;

    // ---- render pass

    fn set_render_pipeline(
        &mut self,
        pipeline: RenderPipelineHandle,
    ) -> Result<()>;
    fn set_vertex_buffer(
        &mut self,
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Result<()>;
    fn set_index_buffer(
        &mut self,
        buffer: BufferHandle,
        format: IndexFormat,
        offset: u64,
        size: u64,
    ) -> Result<()>;
    fn set_viewport(&mut self, viewport: &Viewport) -> Result<()>;
    fn set_scissor_rect(&mut self, scissor: &ScissorRect) -> Result<()>;
    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()>;
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<()>;
    fn draw_indirect(&mut self, buffer: BufferHandle, offset: u64)
    -> Result<()>;
    fn draw_indexed_indirect(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
    ) -> Result<()>;
    fn begin_occlusion_query(
        &mut self,
        query_set: QuerySetHandle,
        query_index: u32,
    ) -> Result<()>;
    fn end_occlusion_query(&mut self) -> Result<()>;

    // ---- render or compute pass

    /// Binds against the layout of the pipeline set in the open pass.
    fn set_bind_group(
        &mut self,
        index: u32,
        group: BindGroupHandle,
        dynamic_offsets: &[u32],
    ) -> Result<()>;

    // ---- compute pass

    fn set_compute_pipeline(
        &mut self,
        pipeline: ComputePipelineHandle,
    ) -> Result<()>;
    fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32) -> Result<()>;
    fn dispatch_workgroups_indirect(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
    ) -> Result<()>;
}
