//! The logical device and everything it creates.
//!
//! [`Device`] is a cheap, cloneable reference to the backend device. All
//! device children are generation-checked handles; destroying a handle
//! twice is a no-op, any other use of a destroyed handle fails with
//! [`Error::InvalidHandle`](rgfx_core::Error::InvalidHandle).

use std::sync::Arc;

use rgfx_core::backend::DeviceBackend;
use rgfx_core::descriptor::{
    BindGroupDescriptor, BindGroupLayoutDescriptor, BufferDescriptor,
    BufferImportDescriptor, BufferInfo, ComputePipelineDescriptor,
    DeviceLimits, FenceDescriptor, FramebufferDescriptor, PresentDescriptor,
    QuerySetDescriptor, RenderPassDescriptor, RenderPipelineDescriptor,
    SamplerDescriptor, SemaphoreDescriptor, ShaderDescriptor,
    SurfaceDescriptor, SwapchainDescriptor, SwapchainInfo, TextureDescriptor,
    TextureImportDescriptor, TextureInfo, TextureViewDescriptor,
};
use rgfx_core::{
    BackendKind, BindGroupHandle, BindGroupLayoutHandle, BufferHandle,
    ComputePipelineHandle, Error, FenceHandle, FramebufferHandle,
    QuerySetHandle, RenderPassHandle, RenderPipelineHandle, Result,
    SamplerHandle, SemaphoreHandle, SemaphoreType, ShaderHandle,
    ShaderSourceType, SwapchainHandle, TextureHandle, TextureLayout,
    TextureViewHandle,
};

use crate::command::{CommandEncoder, EncoderInner};
use crate::queue::Queue;
use crate::surface::{Surface, SurfaceInner};

backend_enum! {
    #[derive(Debug, Clone)]
    pub(crate) enum DeviceInner {
        Arc<rgfx_vk::VulkanDevice>,
        Arc<rgfx_wgpu::WgpuDevice>,
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    inner: DeviceInner,
}

impl Device {
    pub(crate) fn from_inner(inner: DeviceInner) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &DeviceInner {
        &self.inner
    }

    pub fn backend(&self) -> BackendKind {
        self.inner.backend()
    }

    /// Whether both values refer to the same logical device.
    pub fn same_device(&self, other: &Device) -> bool {
        match (&self.inner, &other.inner) {
            #[cfg(feature = "vulkan")]
            (DeviceInner::Vulkan(a), DeviceInner::Vulkan(b)) => Arc::ptr_eq(a, b),
            #[cfg(feature = "webgpu")]
            (DeviceInner::WebGpu(a), DeviceInner::WebGpu(b)) => Arc::ptr_eq(a, b),
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }

    /// Family and index of the device's queue.
    pub(crate) fn queue_location(&self) -> (u32, u32) {
        match &self.inner {
            #[cfg(feature = "vulkan")]
            DeviceInner::Vulkan(d) => {
                (d.raw().queue_family_index(), d.raw().queue_index())
            }
            #[cfg(feature = "webgpu")]
            DeviceInner::WebGpu(_) => (0, 0),
        }
    }

    pub fn queue(&self) -> Queue {
        Queue::new(self.clone())
    }

    /// The device's queue, when it is the one at `family`/`index`.
    pub fn queue_by_index(&self, family: u32, index: u32) -> Result<Queue> {
        if self.queue_location() != (family, index) {
            return Err(Error::NotFound(format!(
                "device has no queue {index} in family {family}"
            )));
        }
        Ok(self.queue())
    }

    pub fn limits(&self) -> DeviceLimits {
        dispatch!(&self.inner, DeviceInner, d => d.limits())
    }

    pub fn supports_shader_format(&self, format: ShaderSourceType) -> bool {
        dispatch!(&self.inner, DeviceInner, d => d.supports_shader_format(format))
    }

    pub fn wait_idle(&self) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.wait_idle())
    }

    pub fn create_surface(&self, desc: &SurfaceDescriptor<'_>) -> Result<Surface> {
        dispatch!(&self.inner, DeviceInner, d => {
            Ok(Surface::from_inner(d.create_surface(desc)?.into()))
        })
    }

    pub fn create_command_encoder(
        &self,
        label: Option<&str>,
    ) -> Result<CommandEncoder> {
        let inner: EncoderInner = dispatch!(&self.inner, DeviceInner, d => {
            d.create_command_encoder(label)?.into()
        });
        Ok(CommandEncoder::from_inner(inner, self.clone(), label))
    }

    // ---- buffers

    pub fn create_buffer(&self, desc: &BufferDescriptor<'_>) -> Result<BufferHandle> {
        dispatch!(&self.inner, DeviceInner, d => d.create_buffer(desc))
    }

    /// Wrap a buffer owned elsewhere. Destroying the handle releases only
    /// the wrapper.
    pub fn import_buffer(
        &self,
        desc: &BufferImportDescriptor<'_>,
    ) -> Result<BufferHandle> {
        dispatch!(&self.inner, DeviceInner, d => d.import_buffer(desc))
    }

    pub fn destroy_buffer(&self, buffer: BufferHandle) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.destroy_buffer(buffer))
    }

    pub fn buffer_info(&self, buffer: BufferHandle) -> Result<BufferInfo> {
        dispatch!(&self.inner, DeviceInner, d => d.buffer_info(buffer))
    }

    pub fn buffer_native_handle(&self, buffer: BufferHandle) -> Result<u64> {
        dispatch!(&self.inner, DeviceInner, d => d.buffer_native_handle(buffer))
    }

    /// Map `[offset, offset + size)` for host access; `size == 0` maps to
    /// the end of the buffer.
    pub fn map_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.map_buffer(buffer, offset, size))
    }

    pub fn unmap_buffer(&self, buffer: BufferHandle) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.unmap_buffer(buffer))
    }

    pub fn write_mapped(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => {
            d.write_mapped(buffer, offset, data)
        })
    }

    pub fn read_mapped(
        &self,
        buffer: BufferHandle,
        offset: u64,
        out: &mut [u8],
    ) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.read_mapped(buffer, offset, out))
    }

    pub fn flush_mapped_range(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => {
            d.flush_mapped_range(buffer, offset, size)
        })
    }

    pub fn invalidate_mapped_range(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => {
            d.invalidate_mapped_range(buffer, offset, size)
        })
    }

    // ---- textures

    pub fn create_texture(&self, desc: &TextureDescriptor<'_>) -> Result<TextureHandle> {
        dispatch!(&self.inner, DeviceInner, d => d.create_texture(desc))
    }

    pub fn import_texture(
        &self,
        desc: &TextureImportDescriptor<'_>,
    ) -> Result<TextureHandle> {
        dispatch!(&self.inner, DeviceInner, d => d.import_texture(desc))
    }

    pub fn destroy_texture(&self, texture: TextureHandle) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.destroy_texture(texture))
    }

    pub fn texture_info(&self, texture: TextureHandle) -> Result<TextureInfo> {
        dispatch!(&self.inner, DeviceInner, d => d.texture_info(texture))
    }

    pub fn texture_native_handle(&self, texture: TextureHandle) -> Result<u64> {
        dispatch!(&self.inner, DeviceInner, d => d.texture_native_handle(texture))
    }

    /// The tracked layout of mip 0, which is the whole texture's layout
    /// after any full-texture transition.
    pub fn texture_layout(&self, texture: TextureHandle) -> Result<TextureLayout> {
        dispatch!(&self.inner, DeviceInner, d => d.texture_layout(texture))
    }

    pub fn create_texture_view(
        &self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor<'_>,
    ) -> Result<TextureViewHandle> {
        dispatch!(&self.inner, DeviceInner, d => d.create_texture_view(texture, desc))
    }

    pub fn destroy_texture_view(&self, view: TextureViewHandle) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.destroy_texture_view(view))
    }

    // ---- samplers, shaders, bindings

    pub fn create_sampler(&self, desc: &SamplerDescriptor<'_>) -> Result<SamplerHandle> {
        dispatch!(&self.inner, DeviceInner, d => d.create_sampler(desc))
    }

    pub fn destroy_sampler(&self, sampler: SamplerHandle) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.destroy_sampler(sampler))
    }

    pub fn create_shader(&self, desc: &ShaderDescriptor<'_>) -> Result<ShaderHandle> {
        dispatch!(&self.inner, DeviceInner, d => d.create_shader(desc))
    }

    pub fn destroy_shader(&self, shader: ShaderHandle) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.destroy_shader(shader))
    }

    pub fn create_bind_group_layout(
        &self,
        desc: &BindGroupLayoutDescriptor<'_>,
    ) -> Result<BindGroupLayoutHandle> {
        dispatch!(&self.inner, DeviceInner, d => d.create_bind_group_layout(desc))
    }

    pub fn destroy_bind_group_layout(&self, layout: BindGroupLayoutHandle) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.destroy_bind_group_layout(layout))
    }

    pub fn create_bind_group(
        &self,
        desc: &BindGroupDescriptor<'_>,
    ) -> Result<BindGroupHandle> {
        dispatch!(&self.inner, DeviceInner, d => d.create_bind_group(desc))
    }

    pub fn destroy_bind_group(&self, group: BindGroupHandle) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.destroy_bind_group(group))
    }

    // ---- passes and pipelines

    pub fn create_render_pass(
        &self,
        desc: &RenderPassDescriptor<'_>,
    ) -> Result<RenderPassHandle> {
        dispatch!(&self.inner, DeviceInner, d => d.create_render_pass(desc))
    }

    pub fn destroy_render_pass(&self, pass: RenderPassHandle) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.destroy_render_pass(pass))
    }

    /// Bind views to a render pass's slots. Fails with
    /// [`Error::Incompatible`] when attachment counts, formats or sample
    /// counts differ from the pass.
    pub fn create_framebuffer(
        &self,
        desc: &FramebufferDescriptor<'_>,
    ) -> Result<FramebufferHandle> {
        dispatch!(&self.inner, DeviceInner, d => d.create_framebuffer(desc))
    }

    pub fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.destroy_framebuffer(framebuffer))
    }

    pub fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDescriptor<'_>,
    ) -> Result<RenderPipelineHandle> {
        dispatch!(&self.inner, DeviceInner, d => d.create_render_pipeline(desc))
    }

    pub fn destroy_render_pipeline(&self, pipeline: RenderPipelineHandle) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.destroy_render_pipeline(pipeline))
    }

    pub fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor<'_>,
    ) -> Result<ComputePipelineHandle> {
        dispatch!(&self.inner, DeviceInner, d => d.create_compute_pipeline(desc))
    }

    pub fn destroy_compute_pipeline(
        &self,
        pipeline: ComputePipelineHandle,
    ) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.destroy_compute_pipeline(pipeline))
    }

    // ---- synchronization and queries

    pub fn create_fence(&self, desc: &FenceDescriptor<'_>) -> Result<FenceHandle> {
        dispatch!(&self.inner, DeviceInner, d => d.create_fence(desc))
    }

    pub fn destroy_fence(&self, fence: FenceHandle) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.destroy_fence(fence))
    }

    /// Non-blocking: `true` once signaled.
    pub fn fence_status(&self, fence: FenceHandle) -> Result<bool> {
        dispatch!(&self.inner, DeviceInner, d => d.fence_status(fence))
    }

    /// Block until `fence` is signaled or `timeout_ns` elapses, in which
    /// case the error code is [`ResultCode::Timeout`].
    ///
    /// On WebGPU a fence signals when the queue drains, which may be later
    /// than the submission it was attached to.
    ///
    /// [`ResultCode::Timeout`]: rgfx_core::ResultCode::Timeout
    pub fn wait_fence(&self, fence: FenceHandle, timeout_ns: u64) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.wait_fence(fence, timeout_ns))
    }

    pub fn reset_fence(&self, fence: FenceHandle) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.reset_fence(fence))
    }

    pub fn create_semaphore(
        &self,
        desc: &SemaphoreDescriptor<'_>,
    ) -> Result<SemaphoreHandle> {
        dispatch!(&self.inner, DeviceInner, d => d.create_semaphore(desc))
    }

    pub fn destroy_semaphore(&self, semaphore: SemaphoreHandle) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.destroy_semaphore(semaphore))
    }

    pub fn semaphore_type(&self, semaphore: SemaphoreHandle) -> Result<SemaphoreType> {
        dispatch!(&self.inner, DeviceInner, d => d.semaphore_type(semaphore))
    }

    /// Host signal of a timeline semaphore.
    pub fn signal_semaphore(&self, semaphore: SemaphoreHandle, value: u64) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.signal_semaphore(semaphore, value))
    }

    /// Host wait until a timeline semaphore reaches `value`.
    pub fn wait_semaphore(
        &self,
        semaphore: SemaphoreHandle,
        value: u64,
        timeout_ns: u64,
    ) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => {
            d.wait_semaphore(semaphore, value, timeout_ns)
        })
    }

    pub fn semaphore_value(&self, semaphore: SemaphoreHandle) -> Result<u64> {
        dispatch!(&self.inner, DeviceInner, d => d.semaphore_value(semaphore))
    }

    pub fn create_query_set(
        &self,
        desc: &QuerySetDescriptor<'_>,
    ) -> Result<QuerySetHandle> {
        dispatch!(&self.inner, DeviceInner, d => d.create_query_set(desc))
    }

    pub fn destroy_query_set(&self, query_set: QuerySetHandle) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.destroy_query_set(query_set))
    }

    // ---- swapchains

    pub fn create_swapchain(
        &self,
        surface: &Surface,
        desc: &SwapchainDescriptor<'_>,
    ) -> Result<SwapchainHandle> {
        dispatch_pair!(
            (&self.inner, DeviceInner), (surface.inner(), SurfaceInner),
            d, s => d.create_swapchain(s, desc)
        )
    }

    pub fn destroy_swapchain(&self, swapchain: SwapchainHandle) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.destroy_swapchain(swapchain))
    }

    pub fn swapchain_info(&self, swapchain: SwapchainHandle) -> Result<SwapchainInfo> {
        dispatch!(&self.inner, DeviceInner, d => d.swapchain_info(swapchain))
    }

    /// Acquire the next presentable image and return its index. Timeouts,
    /// not-ready and out-of-date surfaces come back as error codes.
    pub fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        timeout_ns: u64,
        signal_semaphore: Option<SemaphoreHandle>,
        signal_fence: Option<FenceHandle>,
    ) -> Result<u32> {
        dispatch!(&self.inner, DeviceInner, d => {
            d.acquire_next_image(swapchain, timeout_ns, signal_semaphore, signal_fence)
        })
    }

    pub fn swapchain_texture_view(
        &self,
        swapchain: SwapchainHandle,
        index: u32,
    ) -> Result<TextureViewHandle> {
        dispatch!(&self.inner, DeviceInner, d => {
            d.swapchain_texture_view(swapchain, index)
        })
    }

    pub fn swapchain_current_texture_view(
        &self,
        swapchain: SwapchainHandle,
    ) -> Result<TextureViewHandle> {
        dispatch!(&self.inner, DeviceInner, d => {
            d.swapchain_current_texture_view(swapchain)
        })
    }

    /// Present the acquired image after `desc.wait_semaphores` signal.
    pub fn present(
        &self,
        swapchain: SwapchainHandle,
        desc: &PresentDescriptor<'_>,
    ) -> Result<()> {
        dispatch!(&self.inner, DeviceInner, d => d.present(swapchain, desc))
    }

    // ---- backend access

    #[cfg(feature = "vulkan")]
    pub fn as_vulkan(&self) -> Option<&Arc<rgfx_vk::VulkanDevice>> {
        match &self.inner {
            DeviceInner::Vulkan(d) => Some(d),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    #[cfg(feature = "webgpu")]
    pub fn as_wgpu(&self) -> Option<&Arc<rgfx_wgpu::WgpuDevice>> {
        match &self.inner {
            DeviceInner::WebGpu(d) => Some(d),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}
