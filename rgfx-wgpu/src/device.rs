//! The wgpu device, its queue and its entity hub.
//!
//! Entities live in one [`Hub`] behind an `RwLock`, as on every backend.
//! wgpu objects are reference counted, so recording clones what it needs
//! out of the hub instead of holding raw handles.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rgfx_core::backend::{AdapterBackend, DeviceBackend};
use rgfx_core::compat::{self, AttachmentSignature, FramebufferSignature};
use rgfx_core::descriptor::{
    BindGroupDescriptor, BindGroupLayoutDescriptor, BindingResource,
    BindingType, BufferDescriptor, BufferImportDescriptor, BufferInfo,
    ComputePipelineDescriptor, DeviceDescriptor, DeviceLimits,
    FenceDescriptor, FramebufferDescriptor, PresentDescriptor,
    QuerySetDescriptor, RenderPassDescriptor, RenderPassLayout,
    RenderPipelineDescriptor, SamplerDescriptor, SemaphoreDescriptor,
    ShaderDescriptor, SubmitInfo, SurfaceDescriptor, SwapchainDescriptor,
    SwapchainInfo, TextureDescriptor, TextureImportDescriptor, TextureInfo,
    TextureViewDescriptor,
};
use rgfx_core::handle::{Handle, Resolve};
use rgfx_core::hub::{self, Hub, HubTypes};
use rgfx_core::util::{packed_data_size, texel_region};
use rgfx_core::validate;
use rgfx_core::{
    BindGroupHandle, BindGroupLayoutHandle, BufferHandle, BufferUsage,
    ComputePipelineHandle, Extent3D, FenceHandle, FramebufferHandle,
    Origin3D, QuerySetHandle, RenderPassHandle, RenderPipelineHandle,
    SampleCount, SamplerHandle, SemaphoreHandle, SemaphoreType, ShaderHandle,
    ShaderSourceType, SwapchainHandle, TextureHandle, TextureLayout,
    TextureType, TextureUsage, TextureViewHandle,
};
use slotmap::SlotMap;
use thiserror::Error;

use crate::adapter::{QUEUE_FAMILY, WgpuAdapter};
use crate::binding::{BindGroup, BindGroupLayout, BoundResource};
use crate::blit::Blitter;
use crate::buffer::{Buffer, byte_range};
use crate::command::WgpuEncoder;
use crate::conv;
use crate::error::scoped;
use crate::pass::{
    Framebuffer, FramebufferTarget, FramebufferViews, RenderPass,
    tracked_final_layout,
};
use crate::pipeline::{ComputePipeline, RenderPipeline};
use crate::query::QuerySet;
use crate::sampler::Sampler;
use crate::shader::ShaderModule;
use crate::surface::WgpuSurface;
use crate::swapchain::Swapchain;
use crate::sync::{Fence, Semaphore, poll_wait};
use crate::texture::{Texture, TextureView};

/// Optional features turned on whenever the adapter has them.
const WANTED_FEATURES: wgpu::Features = wgpu::Features::TIMESTAMP_QUERY
    .union(wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS)
    .union(wgpu::Features::MAPPABLE_PRIMARY_BUFFERS)
    .union(wgpu::Features::POLYGON_MODE_LINE)
    .union(wgpu::Features::POLYGON_MODE_POINT)
    .union(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES);

#[derive(Debug, Error)]
pub enum CreateDeviceError {
    #[error("Queue family {family} index {index} does not exist")]
    NoSuchQueue { family: u32, index: u32 },
    #[error("Device request failed: {0}")]
    Request(#[from] wgpu::RequestDeviceError),
}

impl From<CreateDeviceError> for rgfx_core::Error {
    fn from(value: CreateDeviceError) -> Self {
        match value {
            CreateDeviceError::NoSuchQueue { .. } => {
                rgfx_core::Error::invalid_argument(value.to_string())
            }
            CreateDeviceError::Request(_) => {
                tracing::error!("{value}");
                rgfx_core::Error::backend(value)
            }
        }
    }
}

/// Only queue 0 of family 0 exists.
fn check_queue_requests(desc: &DeviceDescriptor<'_>) -> Result<(), CreateDeviceError> {
    if let Some(request) = desc.queue_requests.first()
        && (request.queue_family_index != 0
            || request.queue_index >= QUEUE_FAMILY.queue_count)
    {
        return Err(CreateDeviceError::NoSuchQueue {
            family: request.queue_family_index,
            index: request.queue_index,
        });
    }
    if desc.queue_requests.len() > 1 {
        tracing::warn!(
            "{} queues requested; only the first is created",
            desc.queue_requests.len()
        );
    }
    Ok(())
}

/// Entity types stored by the wgpu hub.
///
/// Fences, semaphores and swapchains sit behind an `Arc` so blocking host
/// calls can run without holding the hub lock.
#[derive(Debug)]
pub struct WgpuHub;

impl HubTypes for WgpuHub {
    type Buffer = Buffer;
    type Texture = Texture;
    type TextureView = TextureView;
    type Sampler = Sampler;
    type Shader = ShaderModule;
    type BindGroupLayout = BindGroupLayout;
    type BindGroup = BindGroup;
    type RenderPass = RenderPass;
    type Framebuffer = Framebuffer;
    type RenderPipeline = RenderPipeline;
    type ComputePipeline = ComputePipeline;
    type Fence = Arc<Fence>;
    type Semaphore = Arc<Semaphore>;
    type QuerySet = QuerySet;
    type Swapchain = Arc<Swapchain>;
}

/// A logical device with one queue. Created by [`WgpuAdapter`].
pub struct WgpuDevice {
    hub: RwLock<Hub<WgpuHub>>,
    blitter: Blitter,
    label: String,
    limits: DeviceLimits,
    instance: Arc<wgpu::Instance>,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("label", &self.label)
            .field("features", &self.device.features())
            .finish_non_exhaustive()
    }
}

impl WgpuDevice {
    pub(crate) fn new(
        adapter: &WgpuAdapter,
        desc: &DeviceDescriptor<'_>,
    ) -> rgfx_core::Result<Self> {
        validate::device(desc)?;
        check_queue_requests(desc)?;
        let label = desc.label.unwrap_or("device").to_owned();
        let raw_adapter = adapter.raw();
        let required_features = raw_adapter.features() & WANTED_FEATURES;
        let (device, queue) = pollster::block_on(raw_adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some(label.as_str()),
                required_features,
                required_limits: raw_adapter.limits(),
                ..Default::default()
            },
        ))
        .map_err(CreateDeviceError::from)?;

        let error_label = label.clone();
        device.on_uncaptured_error(Box::new(move |error| {
            tracing::error!("Uncaptured wgpu error on {error_label:?}: {error}");
        }));
        let lost_label = label.clone();
        device.set_device_lost_callback(move |reason, message| {
            tracing::error!("Device {lost_label:?} lost ({reason:?}): {message}");
        });

        let blitter = Blitter::new(&device)?;
        tracing::info!(
            "Created device {label:?} on {} with {required_features:?}",
            adapter.name()
        );
        Ok(Self {
            hub: RwLock::new(Hub::new()),
            blitter,
            label,
            limits: adapter.limits(),
            instance: Arc::clone(adapter.instance()),
            adapter: raw_adapter.clone(),
            device,
            queue,
        })
    }

    pub fn raw(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn blitter(&self) -> &Blitter {
        &self.blitter
    }

    pub(crate) fn hub(&self) -> RwLockReadGuard<'_, Hub<WgpuHub>> {
        self.hub.read().expect("hub lock poisoned")
    }

    fn hub_mut(&self) -> RwLockWriteGuard<'_, Hub<WgpuHub>> {
        self.hub.write().expect("hub lock poisoned")
    }

    /// Remove `key` and drop the entity after the write lock is released.
    fn release<K: Handle, V>(
        &self,
        select: impl FnOnce(&mut Hub<WgpuHub>) -> &mut SlotMap<K, V>,
        key: K,
    ) -> rgfx_core::Result<()> {
        let removed = hub::release(select(&mut self.hub_mut()), key);
        drop(removed);
        Ok(())
    }

    fn fence(&self, fence: FenceHandle) -> rgfx_core::Result<Arc<Fence>> {
        Ok(Arc::clone(self.hub().fences.resolve(fence)?))
    }

    fn semaphore(
        &self,
        semaphore: SemaphoreHandle,
    ) -> rgfx_core::Result<Arc<Semaphore>> {
        Ok(Arc::clone(self.hub().semaphores.resolve(semaphore)?))
    }

    fn swapchain(
        &self,
        swapchain: SwapchainHandle,
    ) -> rgfx_core::Result<Arc<Swapchain>> {
        Ok(Arc::clone(self.hub().swapchains.resolve(swapchain)?))
    }

    fn poll_idle(&self) -> rgfx_core::Result<()> {
        poll_wait(&self.device).map_err(|e| {
            tracing::error!("Polling {:?} failed: {e}", self.label);
            rgfx_core::Error::backend(e)
        })
    }

    /// Run pending queue callbacks without blocking.
    fn poll_now(&self) -> rgfx_core::Result<()> {
        match self.device.poll(wgpu::PollType::Poll) {
            Ok(_) => Ok(()),
            Err(e) => Err(rgfx_core::Error::backend(e)),
        }
    }

    // ---- native interop

    /// Wrap a buffer created on this device through `wgpu` directly.
    pub fn import_wgpu_buffer(
        &self,
        raw: wgpu::Buffer,
    ) -> rgfx_core::Result<BufferHandle> {
        Ok(self.hub_mut().buffers.insert(Buffer::import(raw)))
    }

    /// Wrap a texture created on this device through `wgpu` directly. Its
    /// layout is taken on trust.
    pub fn import_wgpu_texture(
        &self,
        raw: wgpu::Texture,
        layout: TextureLayout,
    ) -> rgfx_core::Result<TextureHandle> {
        Ok(self.hub_mut().textures.insert(Texture::import(raw, layout)))
    }
}

impl Drop for WgpuDevice {
    fn drop(&mut self) {
        tracing::debug!("Dropping device {:?}", self.label);
        if let Err(e) = poll_wait(&self.device) {
            tracing::error!("Waiting for {:?} to idle failed: {e}", self.label);
        }
        self.hub().report_leaks(&self.label);
    }
}

impl DeviceBackend for WgpuDevice {
    type Surface = WgpuSurface;
    type CommandEncoder = WgpuEncoder;

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    /// SPIR-V is translated to the native shading language by naga.
    fn supports_shader_format(&self, format: ShaderSourceType) -> bool {
        matches!(format, ShaderSourceType::Wgsl | ShaderSourceType::SpirV)
    }

    fn wait_idle(&self) -> rgfx_core::Result<()> {
        self.poll_idle()
    }

    fn create_surface(
        &self,
        desc: &SurfaceDescriptor<'_>,
    ) -> rgfx_core::Result<WgpuSurface> {
        // SAFETY: A platform window handle borrows its window, which the
        // caller keeps alive for every surface created from it.
        unsafe { WgpuSurface::new(&self.instance, &self.adapter, desc) }
    }

    // ---- buffers

    fn create_buffer(
        &self,
        desc: &BufferDescriptor<'_>,
    ) -> rgfx_core::Result<BufferHandle> {
        validate::buffer(desc)?;
        if desc.size > self.limits.max_buffer_size {
            return Err(rgfx_core::Error::invalid_argument(format!(
                "buffer size {} exceeds the device limit of {}",
                desc.size, self.limits.max_buffer_size
            )));
        }
        let buffer = Buffer::new(&self.device, desc)?;
        Ok(self.hub_mut().buffers.insert(buffer))
    }

    fn import_buffer(
        &self,
        desc: &BufferImportDescriptor<'_>,
    ) -> rgfx_core::Result<BufferHandle> {
        validate::buffer_import(desc)?;
        Err(rgfx_core::Error::unsupported(
            "wgpu buffers cannot be imported from integer handles; use \
             WgpuDevice::import_wgpu_buffer",
        ))
    }

    fn destroy_buffer(&self, buffer: BufferHandle) -> rgfx_core::Result<()> {
        self.release(|hub| &mut hub.buffers, buffer)
    }

    fn buffer_info(&self, buffer: BufferHandle) -> rgfx_core::Result<BufferInfo> {
        Ok(self.hub().buffers.resolve(buffer)?.info())
    }

    fn buffer_native_handle(
        &self,
        buffer: BufferHandle,
    ) -> rgfx_core::Result<u64> {
        self.hub().buffers.resolve(buffer)?;
        Err(rgfx_core::Error::unsupported(
            "wgpu buffers have no integer native handle",
        ))
    }

    fn map_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> rgfx_core::Result<()> {
        Ok(self
            .hub()
            .buffers
            .resolve(buffer)?
            .map(&self.device, offset, size)?)
    }

    fn unmap_buffer(&self, buffer: BufferHandle) -> rgfx_core::Result<()> {
        self.hub().buffers.resolve(buffer)?.unmap();
        Ok(())
    }

    fn write_mapped(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> rgfx_core::Result<()> {
        Ok(self
            .hub()
            .buffers
            .resolve(buffer)?
            .write_mapped(offset, data)?)
    }

    fn read_mapped(
        &self,
        buffer: BufferHandle,
        offset: u64,
        out: &mut [u8],
    ) -> rgfx_core::Result<()> {
        Ok(self.hub().buffers.resolve(buffer)?.read_mapped(offset, out)?)
    }

    fn flush_mapped_range(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> rgfx_core::Result<()> {
        Ok(self
            .hub()
            .buffers
            .resolve(buffer)?
            .check_host_range(offset, size)?)
    }

    fn invalidate_mapped_range(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> rgfx_core::Result<()> {
        Ok(self
            .hub()
            .buffers
            .resolve(buffer)?
            .check_host_range(offset, size)?)
    }

    // ---- textures

    fn create_texture(
        &self,
        desc: &TextureDescriptor<'_>,
    ) -> rgfx_core::Result<TextureHandle> {
        validate::texture(desc)?;
        validate::texture_limits(&desc.info(), &self.limits)?;
        let texture = Texture::new(&self.device, desc)?;
        Ok(self.hub_mut().textures.insert(texture))
    }

    fn import_texture(
        &self,
        desc: &TextureImportDescriptor<'_>,
    ) -> rgfx_core::Result<TextureHandle> {
        validate::texture_import(desc)?;
        Err(rgfx_core::Error::unsupported(
            "wgpu textures cannot be imported from integer handles; use \
             WgpuDevice::import_wgpu_texture",
        ))
    }

    fn destroy_texture(&self, texture: TextureHandle) -> rgfx_core::Result<()> {
        {
            let hub = self.hub();
            if hub.swapchains.values().any(|s| s.texture() == Some(texture)) {
                return Err(rgfx_core::Error::invalid_argument(
                    "swapchain images are destroyed with their swapchain",
                ));
            }
        }
        self.release(|hub| &mut hub.textures, texture)
    }

    fn texture_info(
        &self,
        texture: TextureHandle,
    ) -> rgfx_core::Result<TextureInfo> {
        Ok(self.hub().textures.resolve(texture)?.info())
    }

    fn texture_native_handle(
        &self,
        texture: TextureHandle,
    ) -> rgfx_core::Result<u64> {
        self.hub().textures.resolve(texture)?;
        Err(rgfx_core::Error::unsupported(
            "wgpu textures have no integer native handle",
        ))
    }

    fn texture_layout(
        &self,
        texture: TextureHandle,
    ) -> rgfx_core::Result<TextureLayout> {
        Ok(self.hub().textures.resolve(texture)?.current_layout())
    }

    fn create_texture_view(
        &self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor<'_>,
    ) -> rgfx_core::Result<TextureViewHandle> {
        let view = {
            let hub = self.hub();
            let target = hub.textures.resolve(texture)?;
            TextureView::new(&self.device, texture, target, desc)?
        };
        Ok(self.hub_mut().texture_views.insert(view))
    }

    fn destroy_texture_view(
        &self,
        view: TextureViewHandle,
    ) -> rgfx_core::Result<()> {
        {
            let hub = self.hub();
            if hub.swapchains.values().any(|s| s.image_view() == Some(view)) {
                return Err(rgfx_core::Error::invalid_argument(
                    "swapchain views are destroyed with their swapchain",
                ));
            }
        }
        self.release(|hub| &mut hub.texture_views, view)
    }

    // ---- samplers, shaders, bindings

    fn create_sampler(
        &self,
        desc: &SamplerDescriptor<'_>,
    ) -> rgfx_core::Result<SamplerHandle> {
        validate::sampler(desc)?;
        let sampler = Sampler::new(&self.device, desc)?;
        Ok(self.hub_mut().samplers.insert(sampler))
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) -> rgfx_core::Result<()> {
        self.release(|hub| &mut hub.samplers, sampler)
    }

    fn create_shader(
        &self,
        desc: &ShaderDescriptor<'_>,
    ) -> rgfx_core::Result<ShaderHandle> {
        validate::shader(desc)?;
        let module = ShaderModule::new(&self.device, desc)?;
        Ok(self.hub_mut().shaders.insert(module))
    }

    fn destroy_shader(&self, shader: ShaderHandle) -> rgfx_core::Result<()> {
        self.release(|hub| &mut hub.shaders, shader)
    }

    fn create_bind_group_layout(
        &self,
        desc: &BindGroupLayoutDescriptor<'_>,
    ) -> rgfx_core::Result<BindGroupLayoutHandle> {
        validate::bind_group_layout(desc)?;
        let layout = BindGroupLayout::new(&self.device, desc.label, desc.entries)?;
        Ok(self.hub_mut().bind_group_layouts.insert(layout))
    }

    fn destroy_bind_group_layout(
        &self,
        layout: BindGroupLayoutHandle,
    ) -> rgfx_core::Result<()> {
        self.release(|hub| &mut hub.bind_group_layouts, layout)
    }

    fn create_bind_group(
        &self,
        desc: &BindGroupDescriptor<'_>,
    ) -> rgfx_core::Result<BindGroupHandle> {
        let group = {
            let hub = self.hub();
            let layout = hub.bind_group_layouts.resolve(desc.layout)?;
            validate::bind_group(layout.entries(), desc)?;
            let mut resources = Vec::with_capacity(desc.entries.len());
            for entry in desc.entries {
                let Some(declared) = layout.entry(entry.binding) else {
                    return Err(rgfx_core::Error::invalid_argument(format!(
                        "binding {} is not declared by the layout",
                        entry.binding
                    )));
                };
                let resource = match entry.resource {
                    BindingResource::Buffer {
                        buffer,
                        offset,
                        size,
                    } => {
                        let buffer = hub.buffers.resolve(buffer)?;
                        let range = byte_range(offset, size, buffer.size())?;
                        let len = range.end - range.start;
                        validate::buffer_binding(
                            &declared.ty,
                            buffer.usage(),
                            offset,
                            len,
                            &self.limits,
                        )?;
                        BoundResource::Buffer {
                            buffer: buffer.raw().clone(),
                            offset,
                            size: len,
                        }
                    }
                    BindingResource::Sampler(sampler) => BoundResource::Sampler(
                        hub.samplers.resolve(sampler)?.raw().clone(),
                    ),
                    BindingResource::TextureView(view) => {
                        let view = hub.texture_views.resolve(view)?;
                        let required = match declared.ty {
                            BindingType::StorageTexture { .. } => {
                                TextureUsage::STORAGE_BINDING
                            }
                            _ => TextureUsage::TEXTURE_BINDING,
                        };
                        if !view.usage().contains(required) {
                            return Err(rgfx_core::Error::invalid_argument(
                                format!(
                                    "binding {} needs a texture with \
                                     {required:?} usage",
                                    entry.binding
                                ),
                            ));
                        }
                        BoundResource::TextureView(view.raw()?)
                    }
                };
                resources.push((entry.binding, resource));
            }
            BindGroup::new(&self.device, desc.label, layout, &resources)?
        };
        Ok(self.hub_mut().bind_groups.insert(group))
    }

    fn destroy_bind_group(
        &self,
        group: BindGroupHandle,
    ) -> rgfx_core::Result<()> {
        self.release(|hub| &mut hub.bind_groups, group)
    }

    // ---- passes and pipelines

    fn create_render_pass(
        &self,
        desc: &RenderPassDescriptor<'_>,
    ) -> rgfx_core::Result<RenderPassHandle> {
        validate::render_pass(desc)?;
        let layout = RenderPassLayout::from_descriptor(desc);
        for format in layout
            .color_attachments
            .iter()
            .map(|a| a.target.format)
            .chain(layout.depth_stencil_attachment.map(|d| d.format))
        {
            conv::require_texture_format(format)?;
        }
        let pass = RenderPass::new(desc.label, layout);
        Ok(self.hub_mut().render_passes.insert(pass))
    }

    fn destroy_render_pass(
        &self,
        pass: RenderPassHandle,
    ) -> rgfx_core::Result<()> {
        self.release(|hub| &mut hub.render_passes, pass)
    }

    fn create_framebuffer(
        &self,
        desc: &FramebufferDescriptor<'_>,
    ) -> rgfx_core::Result<FramebufferHandle> {
        validate::framebuffer(desc)?;
        let framebuffer = {
            let hub = self.hub();
            let pass = hub.render_passes.resolve(desc.render_pass)?;
            let layout = pass.layout();

            let resolve_view = |handle: TextureViewHandle| {
                let view = hub.texture_views.resolve(handle)?;
                if !view.usage().contains(TextureUsage::RENDER_ATTACHMENT) {
                    return Err(rgfx_core::Error::invalid_argument(
                        "framebuffer view lacks RENDER_ATTACHMENT usage",
                    ));
                }
                if view.mips().len() != 1 {
                    return Err(rgfx_core::Error::invalid_argument(
                        "framebuffer views must cover a single mip level",
                    ));
                }
                validate::framebuffer_view(desc, view.extent())?;
                Ok(view)
            };
            let signature = |view: &TextureView| AttachmentSignature {
                format: view.format(),
                sample_count: view.sample_count(),
            };

            let colors = desc
                .color_attachments
                .iter()
                .map(|a| resolve_view(a.view))
                .collect::<rgfx_core::Result<Vec<_>>>()?;
            let resolves = desc
                .color_attachments
                .iter()
                .map(|a| a.resolve_target.map(resolve_view).transpose())
                .collect::<rgfx_core::Result<Vec<_>>>()?;
            let depth = desc
                .depth_stencil_attachment
                .map(resolve_view)
                .transpose()?;
            compat::check_framebuffer(
                layout,
                &FramebufferSignature {
                    color: colors.iter().map(|v| signature(*v)).collect(),
                    resolve: resolves.iter().map(|v| v.map(signature)).collect(),
                    depth_stencil: depth.map(signature),
                },
            )?;

            let color_layout = TextureLayout::ColorAttachment;
            let depth_layout = TextureLayout::DepthStencilAttachment;
            let target = |view: &TextureView, attachment, requested| {
                FramebufferTarget {
                    texture: view.texture(),
                    mips: view.mips(),
                    attachment_layout: attachment,
                    final_layout: tracked_final_layout(requested, attachment),
                }
            };
            let color_targets: Vec<FramebufferTarget> = colors
                .iter()
                .zip(&layout.color_attachments)
                .map(|(v, a)| target(*v, color_layout, a.target.final_layout))
                .collect();
            let resolve_targets: Vec<Option<FramebufferTarget>> = resolves
                .iter()
                .zip(&layout.color_attachments)
                .map(|(v, a)| {
                    let requested = a
                        .resolve_target
                        .map(|r| r.final_layout)
                        .unwrap_or_default();
                    v.map(|v| target(v, color_layout, requested))
                })
                .collect();
            let depth_target = depth
                .zip(layout.depth_stencil_attachment)
                .map(|(v, d)| target(v, depth_layout, d.final_layout));
            let targets = color_targets
                .into_iter()
                .chain(resolve_targets.into_iter().flatten())
                .chain(depth_target)
                .collect();

            let views = FramebufferViews {
                colors: desc.color_attachments.iter().map(|a| a.view).collect(),
                resolves: desc
                    .color_attachments
                    .iter()
                    .map(|a| a.resolve_target)
                    .collect(),
                depth_stencil: desc.depth_stencil_attachment,
            };
            Framebuffer::new(pass, views, targets, desc.width, desc.height)
        };
        tracing::trace!(
            "Created framebuffer {:?} ({}x{})",
            desc.label,
            desc.width,
            desc.height
        );
        Ok(self.hub_mut().framebuffers.insert(framebuffer))
    }

    fn destroy_framebuffer(
        &self,
        framebuffer: FramebufferHandle,
    ) -> rgfx_core::Result<()> {
        self.release(|hub| &mut hub.framebuffers, framebuffer)
    }

    fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDescriptor<'_>,
    ) -> rgfx_core::Result<RenderPipelineHandle> {
        validate::render_pipeline(desc)?;
        let pipeline = {
            let hub = self.hub();
            let pass = hub.render_passes.resolve(desc.render_pass)?;
            let groups = desc
                .bind_group_layouts
                .iter()
                .map(|h| hub.bind_group_layouts.resolve(*h))
                .collect::<rgfx_core::Result<Vec<_>>>()?;
            let vertex = hub.shaders.resolve(desc.vertex.module)?;
            let fragment = desc
                .fragment
                .map(|f| hub.shaders.resolve(f.module))
                .transpose()?;
            RenderPipeline::new(&self.device, desc, pass, &groups, vertex, fragment)?
        };
        Ok(self.hub_mut().render_pipelines.insert(pipeline))
    }

    fn destroy_render_pipeline(
        &self,
        pipeline: RenderPipelineHandle,
    ) -> rgfx_core::Result<()> {
        self.release(|hub| &mut hub.render_pipelines, pipeline)
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor<'_>,
    ) -> rgfx_core::Result<ComputePipelineHandle> {
        validate::compute_pipeline(desc)?;
        let pipeline = {
            let hub = self.hub();
            let groups = desc
                .bind_group_layouts
                .iter()
                .map(|h| hub.bind_group_layouts.resolve(*h))
                .collect::<rgfx_core::Result<Vec<_>>>()?;
            let module = hub.shaders.resolve(desc.compute)?;
            ComputePipeline::new(&self.device, desc, &groups, module)?
        };
        Ok(self.hub_mut().compute_pipelines.insert(pipeline))
    }

    fn destroy_compute_pipeline(
        &self,
        pipeline: ComputePipelineHandle,
    ) -> rgfx_core::Result<()> {
        self.release(|hub| &mut hub.compute_pipelines, pipeline)
    }

    // ---- synchronization and queries

    fn create_fence(
        &self,
        desc: &FenceDescriptor<'_>,
    ) -> rgfx_core::Result<FenceHandle> {
        let fence = Fence::new(desc.signaled, desc.label);
        Ok(self.hub_mut().fences.insert(Arc::new(fence)))
    }

    fn destroy_fence(&self, fence: FenceHandle) -> rgfx_core::Result<()> {
        self.release(|hub| &mut hub.fences, fence)
    }

    fn fence_status(&self, fence: FenceHandle) -> rgfx_core::Result<bool> {
        let fence = self.fence(fence)?;
        // Queue callbacks only run while the device is polled.
        if !fence.is_signaled() {
            self.poll_now()?;
        }
        Ok(fence.is_signaled())
    }

    fn wait_fence(
        &self,
        fence: FenceHandle,
        timeout_ns: u64,
    ) -> rgfx_core::Result<()> {
        Ok(self.fence(fence)?.wait(&self.device, timeout_ns)?)
    }

    fn reset_fence(&self, fence: FenceHandle) -> rgfx_core::Result<()> {
        self.fence(fence)?.reset();
        Ok(())
    }

    fn create_semaphore(
        &self,
        desc: &SemaphoreDescriptor<'_>,
    ) -> rgfx_core::Result<SemaphoreHandle> {
        let semaphore =
            Semaphore::new(desc.semaphore_type, desc.initial_value, desc.label);
        Ok(self.hub_mut().semaphores.insert(Arc::new(semaphore)))
    }

    fn destroy_semaphore(
        &self,
        semaphore: SemaphoreHandle,
    ) -> rgfx_core::Result<()> {
        self.release(|hub| &mut hub.semaphores, semaphore)
    }

    fn semaphore_type(
        &self,
        semaphore: SemaphoreHandle,
    ) -> rgfx_core::Result<SemaphoreType> {
        Ok(self.hub().semaphores.resolve(semaphore)?.ty())
    }

    fn signal_semaphore(
        &self,
        semaphore: SemaphoreHandle,
        value: u64,
    ) -> rgfx_core::Result<()> {
        Ok(self.semaphore(semaphore)?.signal(value)?)
    }

    fn wait_semaphore(
        &self,
        semaphore: SemaphoreHandle,
        value: u64,
        timeout_ns: u64,
    ) -> rgfx_core::Result<()> {
        Ok(self
            .semaphore(semaphore)?
            .wait(&self.device, value, timeout_ns)?)
    }

    fn semaphore_value(
        &self,
        semaphore: SemaphoreHandle,
    ) -> rgfx_core::Result<u64> {
        let semaphore = self.semaphore(semaphore)?;
        self.poll_now()?;
        Ok(semaphore.value()?)
    }

    fn create_query_set(
        &self,
        desc: &QuerySetDescriptor<'_>,
    ) -> rgfx_core::Result<QuerySetHandle> {
        validate::query_set(desc)?;
        let set = QuerySet::new(&self.device, desc)?;
        Ok(self.hub_mut().query_sets.insert(set))
    }

    fn destroy_query_set(
        &self,
        query_set: QuerySetHandle,
    ) -> rgfx_core::Result<()> {
        self.release(|hub| &mut hub.query_sets, query_set)
    }

    // ---- swapchains

    fn create_swapchain(
        &self,
        surface: &WgpuSurface,
        desc: &SwapchainDescriptor<'_>,
    ) -> rgfx_core::Result<SwapchainHandle> {
        validate::swapchain(desc)?;
        let mut swapchain = Swapchain::new(&self.device, surface, desc)?;
        let info = swapchain.info();
        let texture_info = TextureInfo {
            texture_type: TextureType::D2,
            size: Extent3D::d2(info.width, info.height),
            array_layer_count: 1,
            mip_level_count: 1,
            sample_count: SampleCount::X1,
            format: info.format,
            usage: desc.usage,
        };
        let mut hub = self.hub_mut();
        let texture = hub.textures.insert(Texture::non_owning(
            None,
            texture_info,
            TextureLayout::Undefined,
        ));
        let view = match TextureView::unbound(texture, &hub.textures[texture]) {
            Ok(view) => hub.texture_views.insert(view),
            Err(e) => {
                hub.textures.remove(texture);
                return Err(e);
            }
        };
        swapchain.attach_image(texture, view);
        Ok(hub.swapchains.insert(Arc::new(swapchain)))
    }

    fn destroy_swapchain(
        &self,
        swapchain: SwapchainHandle,
    ) -> rgfx_core::Result<()> {
        let removed = {
            let mut hub = self.hub_mut();
            let Some(swapchain) = hub::release(&mut hub.swapchains, swapchain)
            else {
                return Ok(());
            };
            let view = swapchain
                .image_view()
                .and_then(|v| hub.texture_views.remove(v));
            let texture = swapchain
                .texture()
                .and_then(|t| hub.textures.remove(t));
            (view, texture, swapchain)
        };
        drop(removed);
        Ok(())
    }

    fn swapchain_info(
        &self,
        swapchain: SwapchainHandle,
    ) -> rgfx_core::Result<SwapchainInfo> {
        Ok(self.hub().swapchains.resolve(swapchain)?.info())
    }

    /// wgpu blocks inside `get_current_texture` on its own terms; the
    /// timeout is not forwarded. The semaphore and fence are signaled as
    /// soon as the image is handed out.
    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        timeout_ns: u64,
        signal_semaphore: Option<SemaphoreHandle>,
        signal_fence: Option<FenceHandle>,
    ) -> rgfx_core::Result<u32> {
        let swapchain = self.swapchain(swapchain)?;
        let semaphore = signal_semaphore
            .map(|s| self.semaphore(s))
            .transpose()?;
        if let Some(semaphore) = &semaphore
            && semaphore.ty() != SemaphoreType::Binary
        {
            return Err(rgfx_core::Error::invalid_argument(
                "image acquisition signals binary semaphores only",
            ));
        }
        let fence = signal_fence.map(|f| self.fence(f)).transpose()?;

        let (index, raw) = swapchain.acquire()?;
        {
            let hub = self.hub();
            if let Some(texture) = swapchain.texture() {
                let texture = hub.textures.resolve(texture)?;
                texture.rebind(Some(raw.clone()));
                texture.assume(0..1, TextureLayout::Undefined);
            }
            if let Some(view) = swapchain.image_view() {
                let view = hub.texture_views.resolve(view)?;
                view.rebind(Some(TextureView::create_raw(
                    &self.device,
                    &raw,
                    Some("swapchain image"),
                    view.resolved(),
                )?));
            }
        }
        if let Some(semaphore) = semaphore {
            semaphore.signal_now()?;
        }
        if let Some(fence) = fence {
            fence.signal_now();
        }
        tracing::trace!("Acquired swapchain image {index} (timeout {timeout_ns} ns)");
        Ok(index)
    }

    fn swapchain_texture_view(
        &self,
        swapchain: SwapchainHandle,
        index: u32,
    ) -> rgfx_core::Result<TextureViewHandle> {
        self.hub().swapchains.resolve(swapchain)?.view(index)
    }

    fn swapchain_current_texture_view(
        &self,
        swapchain: SwapchainHandle,
    ) -> rgfx_core::Result<TextureViewHandle> {
        let hub = self.hub();
        let swapchain = hub.swapchains.resolve(swapchain)?;
        let index = swapchain.current_index().ok_or_else(|| {
            rgfx_core::Error::invalid_state("no swapchain image is acquired")
        })?;
        swapchain.view(index)
    }

    fn present(
        &self,
        swapchain: SwapchainHandle,
        desc: &PresentDescriptor<'_>,
    ) -> rgfx_core::Result<()> {
        let swapchain = {
            let hub = self.hub();
            let swapchain = hub.swapchains.resolve(swapchain)?;
            if swapchain.current_index().is_none() {
                return Err(rgfx_core::Error::invalid_state(
                    "no swapchain image is acquired",
                ));
            }
            let texture = swapchain
                .texture()
                .map(|t| hub.textures.resolve(t))
                .transpose()?;
            if let Some(texture) = texture {
                let actual = texture.current_layout();
                if actual != TextureLayout::PresentSrc {
                    return Err(rgfx_core::Error::LayoutMismatch {
                        mip_level: 0,
                        expected: TextureLayout::PresentSrc,
                        actual,
                    });
                }
            }
            for handle in desc.wait_semaphores {
                let semaphore = hub.semaphores.resolve(*handle)?;
                if semaphore.ty() != SemaphoreType::Binary {
                    return Err(rgfx_core::Error::invalid_argument(
                        "presentation waits on binary semaphores only",
                    ));
                }
            }
            for handle in desc.wait_semaphores {
                hub.semaphores.resolve(*handle)?.consume_wait();
            }
            // Release the image before handing it back to the surface.
            if let Some(texture) = texture {
                texture.rebind(None);
            }
            if let Some(view) = swapchain.image_view() {
                hub.texture_views.resolve(view)?.rebind(None);
            }
            Arc::clone(swapchain)
        };
        swapchain.present()
    }

    // ---- recording and the queue

    fn create_command_encoder(
        self: &Arc<Self>,
        label: Option<&str>,
    ) -> rgfx_core::Result<WgpuEncoder> {
        Ok(WgpuEncoder::new(Arc::clone(self), label))
    }

    /// Wait semaphores are satisfied by queue order. Signals and the fence
    /// complete through `on_submitted_work_done`.
    fn submit(
        &self,
        encoders: &mut [&mut WgpuEncoder],
        info: &SubmitInfo<'_>,
    ) -> rgfx_core::Result<()> {
        if encoders
            .iter()
            .any(|e| !std::ptr::eq(Arc::as_ptr(e.device()), self))
        {
            return Err(rgfx_core::Error::invalid_argument(
                "encoder belongs to another device",
            ));
        }
        for (name, values, semaphores) in [
            ("wait", info.wait_values, info.wait_semaphores),
            ("signal", info.signal_values, info.signal_semaphores),
        ] {
            if !values.is_empty() && values.len() != semaphores.len() {
                return Err(rgfx_core::Error::invalid_argument(format!(
                    "{} {name} values given for {} semaphores",
                    values.len(),
                    semaphores.len()
                )));
            }
        }

        let (waits, signals, fence) = {
            let hub = self.hub();
            let resolve = |handles: &[SemaphoreHandle]| {
                handles
                    .iter()
                    .map(|h| hub.semaphores.resolve(*h).map(Arc::clone))
                    .collect::<rgfx_core::Result<Vec<_>>>()
            };
            let fence = info
                .signal_fence
                .map(|f| hub.fences.resolve(f).map(Arc::clone))
                .transpose()?;
            (
                resolve(info.wait_semaphores)?,
                resolve(info.signal_semaphores)?,
                fence,
            )
        };
        for (i, semaphore) in waits.iter().enumerate() {
            if semaphore.ty() == SemaphoreType::Timeline
                && semaphore.value()? < info.wait_value(i)
            {
                tracing::debug!(
                    "Submitting ahead of timeline value {} on {:?}",
                    info.wait_value(i),
                    self.label
                );
            }
        }

        for encoder in encoders.iter() {
            encoder.check_submit()?;
        }
        let mut cmds = Vec::with_capacity(encoders.len());
        let mut failed = None;
        for encoder in encoders.iter_mut() {
            match encoder.prepare_submit() {
                Ok(cmd) => cmds.push(cmd),
                Err(e) => {
                    failed = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = failed {
            for (encoder, cmd) in encoders.iter_mut().zip(cmds) {
                encoder.restore_finished(cmd);
            }
            return Err(e);
        }
        let count = cmds.len();
        // The queue owns the buffers from here on, even when it rejects them.
        if let Err(e) =
            scoped(&self.device, "queue_submit", || self.queue.submit(cmds))
        {
            for encoder in encoders.iter_mut() {
                encoder.mark_submitted();
            }
            return Err(e);
        }

        for semaphore in &waits {
            semaphore.consume_wait();
        }
        for (i, semaphore) in signals.iter().enumerate() {
            semaphore.signal_on_completion(&self.queue, info.signal_value(i));
        }
        if let Some(fence) = fence {
            fence.arm(&self.queue);
        }
        for encoder in encoders.iter_mut() {
            encoder.mark_submitted();
        }
        tracing::trace!("Submitted {count} command buffers on {:?}", self.label);
        Ok(())
    }

    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> rgfx_core::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let hub = self.hub();
        let target = hub.buffers.resolve(buffer)?;
        byte_range(offset, data.len() as u64, target.size())?;
        if target.usage().contains(BufferUsage::COPY_DST) {
            let alignment = wgpu::COPY_BUFFER_ALIGNMENT;
            if offset % alignment != 0 || data.len() as u64 % alignment != 0 {
                return Err(rgfx_core::Error::invalid_argument(format!(
                    "queue writes need offset and size aligned to \
                     {alignment} bytes, got {offset} and {}",
                    data.len()
                )));
            }
            return scoped(&self.device, "write_buffer", || {
                self.queue.write_buffer(target.raw(), offset, data)
            });
        }
        if target.usage().contains(BufferUsage::MAP_WRITE) {
            return Ok(target.write_host(&self.device, offset, data)?);
        }
        Err(rgfx_core::Error::invalid_argument(
            "buffer writes need COPY_DST or MAP_WRITE usage",
        ))
    }

    fn write_texture(
        &self,
        texture: TextureHandle,
        origin: Origin3D,
        mip_level: u32,
        data: &[u8],
        extent: Extent3D,
        final_layout: TextureLayout,
    ) -> rgfx_core::Result<()> {
        let hub = self.hub();
        let target = hub.textures.resolve(texture)?;
        let info = target.info();
        if info.sample_count != SampleCount::X1 {
            return Err(rgfx_core::Error::invalid_argument(
                "multisampled textures cannot be written from the host",
            ));
        }
        if !info.usage.contains(TextureUsage::COPY_DST) {
            return Err(rgfx_core::Error::invalid_argument(
                "texture writes need COPY_DST usage",
            ));
        }
        let (offset, texels, layers) = texel_region(&info, mip_level, origin, extent)?;
        let bytes_per_pixel = info.format.bytes_per_pixel();
        let needed = packed_data_size(extent, bytes_per_pixel);
        if (data.len() as u64) < needed {
            return Err(rgfx_core::Error::invalid_argument(format!(
                "{} bytes given for a region of {needed} bytes",
                data.len()
            )));
        }
        let (z, depth) = match info.texture_type {
            TextureType::D3 => (offset.z as u32, texels.depth),
            _ => (layers.start, layers.len() as u32),
        };
        let raw = target.raw()?;
        scoped(&self.device, "write_texture", || {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &raw,
                    mip_level,
                    origin: wgpu::Origin3d {
                        x: offset.x as u32,
                        y: offset.y as u32,
                        z,
                    },
                    aspect: conv::copy_aspect(info.format),
                },
                &data[..needed as usize],
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(texels.width * bytes_per_pixel),
                    rows_per_image: Some(texels.height),
                },
                wgpu::Extent3d {
                    width: texels.width,
                    height: texels.height,
                    depth_or_array_layers: depth,
                },
            )
        })?;
        let settled = match final_layout {
            TextureLayout::Undefined => TextureLayout::TransferDst,
            layout => layout,
        };
        target.transition(mip_level..mip_level + 1, settled);
        Ok(())
    }

    fn queue_wait_idle(&self) -> rgfx_core::Result<()> {
        self.poll_idle()
    }
}

#[cfg(test)]
mod tests {
    use rgfx_core::descriptor::QueueRequest;

    use super::*;

    fn request(family: u32, index: u32) -> QueueRequest {
        QueueRequest {
            queue_family_index: family,
            queue_index: index,
            priority: 1.0,
        }
    }

    #[test]
    fn only_the_single_queue_can_be_requested() {
        let ok = [request(0, 0)];
        let desc = DeviceDescriptor {
            queue_requests: &ok,
            ..Default::default()
        };
        assert!(check_queue_requests(&desc).is_ok());
        assert!(check_queue_requests(&DeviceDescriptor::default()).is_ok());

        for bad in [request(1, 0), request(0, 1)] {
            let requests = [bad];
            let desc = DeviceDescriptor {
                queue_requests: &requests,
                ..Default::default()
            };
            assert!(matches!(
                check_queue_requests(&desc),
                Err(CreateDeviceError::NoSuchQueue { .. })
            ));
        }
    }

    #[test]
    fn missing_queues_are_invalid_arguments() {
        let error: rgfx_core::Error =
            CreateDeviceError::NoSuchQueue { family: 3, index: 0 }.into();
        assert_eq!(error.code(), rgfx_core::ResultCode::InvalidArgument);
    }
}
