//! The Vulkan logical device and its entity hub.
//!
//! Every entity created through [`VulkanDevice`] lives in one
//! [`Hub`] behind an `RwLock`. Recording resolves handles under the read
//! lock; creation and destruction take the write lock, and removed entities
//! are dropped only after the lock is released.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ash::vk;
use rgfx_core::backend::{AdapterBackend, DeviceBackend};
use rgfx_core::compat::{
    self, AttachmentSignature, FramebufferSignature,
};
use rgfx_core::descriptor::{
    BindGroupDescriptor, BindGroupLayoutDescriptor, BindingResource,
    BindingType, BufferDescriptor, BufferImportDescriptor,
    BufferInfo, ComputePipelineDescriptor, DeviceDescriptor, DeviceLimits,
    FenceDescriptor, FramebufferDescriptor, PresentDescriptor,
    QuerySetDescriptor, RenderPassDescriptor, RenderPipelineDescriptor,
    SamplerDescriptor, SemaphoreDescriptor, ShaderDescriptor, SubmitInfo,
    SurfaceDescriptor, SwapchainDescriptor, SwapchainInfo, TextureDescriptor,
    TextureImportDescriptor, TextureInfo, TextureViewDescriptor,
};
use rgfx_core::handle::{Handle, Resolve};
use rgfx_core::hub::{self, Hub, HubTypes};
use rgfx_core::validate;
use rgfx_core::{
    BindGroupHandle, BindGroupLayoutHandle, BufferHandle, BufferUsage,
    ComputePipelineHandle, Extent3D, FenceHandle, FramebufferHandle,
    MemoryProperty, Origin3D, QuerySetHandle, RenderPassHandle,
    RenderPipelineHandle, SampleCount, SamplerHandle, SemaphoreHandle,
    SemaphoreType, ShaderHandle, ShaderSourceType, SwapchainHandle,
    TextureHandle, TextureLayout, TextureType, TextureUsage,
    TextureViewHandle,
};
use slotmap::SlotMap;

use crate::adapter::VulkanAdapter;
use crate::buffer::{Buffer, byte_range};
use crate::command::{VulkanEncoder, record_upload};
use crate::descriptor::{
    BindGroup, BindGroupLayout, BoundResource, binding_image_layout,
};
use crate::error::VkResultExt;
use crate::pass::{
    Framebuffer, FramebufferTarget, RenderPass, ordered_attachments,
    tracked_final_layout,
};
use crate::pipeline::{ComputePipeline, RenderPipeline};
use crate::query::QuerySet;
use crate::raw::RawDevice;
use crate::sampler::Sampler;
use crate::shader::ShaderModule;
use crate::surface::VulkanSurface;
use crate::swapchain::Swapchain;
use crate::sync::{Fence, Semaphore};
use crate::texture::{Texture, TextureView};

/// Entity types stored by the Vulkan hub.
///
/// Fences, semaphores and swapchains sit behind an `Arc` so blocking host
/// calls can run without holding the hub lock.
#[derive(Debug)]
pub struct VkHub;

impl HubTypes for VkHub {
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

/// A logical device with one queue. Created by [`VulkanAdapter`].
pub struct VulkanDevice {
    hub: RwLock<Hub<VkHub>>,
    label: String,
    limits: DeviceLimits,
    raw: Arc<RawDevice>,
}

impl std::fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDevice")
            .field("label", &self.label)
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

impl VulkanDevice {
    pub(crate) fn new(
        adapter: &VulkanAdapter,
        desc: &DeviceDescriptor<'_>,
    ) -> rgfx_core::Result<Self> {
        validate::device(desc)?;
        let raw = RawDevice::new(adapter, desc)?;
        let label = desc.label.unwrap_or("device").to_owned();
        tracing::info!("Created device {label:?} on {}", adapter.name());
        Ok(Self {
            hub: RwLock::new(Hub::new()),
            label,
            limits: adapter.limits(),
            raw: Arc::new(raw),
        })
    }

    pub fn raw(&self) -> &Arc<RawDevice> {
        &self.raw
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn hub(&self) -> RwLockReadGuard<'_, Hub<VkHub>> {
        self.hub.read().expect("hub lock poisoned")
    }

    fn hub_mut(&self) -> RwLockWriteGuard<'_, Hub<VkHub>> {
        self.hub.write().expect("hub lock poisoned")
    }

    /// Remove `key` and drop the entity after the write lock is released.
    fn release<K: Handle, V>(
        &self,
        select: impl FnOnce(&mut Hub<VkHub>) -> &mut SlotMap<K, V>,
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

    fn staging_buffer(&self, data: &[u8]) -> rgfx_core::Result<Buffer> {
        let staging = Buffer::new(
            &self.raw,
            &BufferDescriptor {
                label: Some("staging"),
                size: data.len() as u64,
                usage: BufferUsage::COPY_SRC | BufferUsage::MAP_WRITE,
                memory_properties: MemoryProperty::HOST_VISIBLE
                    | MemoryProperty::HOST_COHERENT,
            },
        )?;
        staging.write_host(0, data)?;
        Ok(staging)
    }

    /// Register the images of a new swapchain as textures with one default
    /// view each. Rolls back on failure.
    fn register_swapchain_images(
        &self,
        hub: &mut Hub<VkHub>,
        images: Vec<vk::Image>,
        info: TextureInfo,
    ) -> rgfx_core::Result<(Vec<TextureHandle>, Vec<TextureViewHandle>)> {
        let mut textures = Vec::with_capacity(images.len());
        let mut views = Vec::with_capacity(images.len());
        for image in images {
            let texture = hub.textures.insert(Texture::non_owning(
                &self.raw,
                image,
                info,
                TextureLayout::Undefined,
            ));
            textures.push(texture);
            let view = TextureView::new(
                &self.raw,
                texture,
                &hub.textures[texture],
                &TextureViewDescriptor {
                    label: Some("swapchain image"),
                    ..Default::default()
                },
            );
            match view {
                Ok(view) => views.push(hub.texture_views.insert(view)),
                Err(e) => {
                    for view in views {
                        hub.texture_views.remove(view);
                    }
                    for texture in textures {
                        hub.textures.remove(texture);
                    }
                    return Err(e);
                }
            }
        }
        Ok((textures, views))
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        tracing::debug!("Dropping device {:?}", self.label);
        if let Err(e) = self.raw.wait_idle() {
            tracing::error!("vkDeviceWaitIdle failed: {e:?}");
        }
        self.hub().report_leaks(&self.label);
    }
}

impl DeviceBackend for VulkanDevice {
    type Surface = VulkanSurface;
    type CommandEncoder = VulkanEncoder;

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn supports_shader_format(&self, format: ShaderSourceType) -> bool {
        format == ShaderSourceType::SpirV
    }

    fn wait_idle(&self) -> rgfx_core::Result<()> {
        self.raw.wait_idle().or_classify("vkDeviceWaitIdle")
    }

    fn create_surface(
        &self,
        desc: &SurfaceDescriptor<'_>,
    ) -> rgfx_core::Result<VulkanSurface> {
        // SAFETY: A platform window handle borrows its window, which the
        // caller keeps alive for every surface created from it. The
        // physical device belongs to the surface's instance.
        unsafe {
            VulkanSurface::new(
                self.raw.parent(),
                self.raw.physical_device(),
                desc,
            )
        }
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
        let buffer = Buffer::new(&self.raw, desc)?;
        Ok(self.hub_mut().buffers.insert(buffer))
    }

    fn import_buffer(
        &self,
        desc: &BufferImportDescriptor<'_>,
    ) -> rgfx_core::Result<BufferHandle> {
        validate::buffer_import(desc)?;
        let buffer = Buffer::import(&self.raw, desc);
        Ok(self.hub_mut().buffers.insert(buffer))
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
        Ok(self.hub().buffers.resolve(buffer)?.native_handle())
    }

    fn map_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> rgfx_core::Result<()> {
        Ok(self.hub().buffers.resolve(buffer)?.map(offset, size)?)
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
        Ok(self.hub().buffers.resolve(buffer)?.flush(offset, size)?)
    }

    fn invalidate_mapped_range(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> rgfx_core::Result<()> {
        Ok(self.hub().buffers.resolve(buffer)?.invalidate(offset, size)?)
    }

    // ---- textures

    fn create_texture(
        &self,
        desc: &TextureDescriptor<'_>,
    ) -> rgfx_core::Result<TextureHandle> {
        validate::texture(desc)?;
        validate::texture_limits(&desc.info(), &self.limits)?;
        let texture = Texture::new(&self.raw, desc)?;
        Ok(self.hub_mut().textures.insert(texture))
    }

    fn import_texture(
        &self,
        desc: &TextureImportDescriptor<'_>,
    ) -> rgfx_core::Result<TextureHandle> {
        validate::texture_import(desc)?;
        let texture = Texture::import(&self.raw, desc);
        Ok(self.hub_mut().textures.insert(texture))
    }

    fn destroy_texture(&self, texture: TextureHandle) -> rgfx_core::Result<()> {
        {
            let hub = self.hub();
            if hub.swapchains.values().any(|s| s.textures().contains(&texture))
            {
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
        Ok(self.hub().textures.resolve(texture)?.native_handle())
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
            TextureView::new(&self.raw, texture, target, desc)?
        };
        Ok(self.hub_mut().texture_views.insert(view))
    }

    fn destroy_texture_view(
        &self,
        view: TextureViewHandle,
    ) -> rgfx_core::Result<()> {
        {
            let hub = self.hub();
            if hub.swapchains.values().any(|s| s.views().contains(&view)) {
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
        let sampler = Sampler::new(&self.raw, desc)?;
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
        let module = ShaderModule::new(&self.raw, desc)?;
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
        let layout = BindGroupLayout::new(&self.raw, desc.label, desc.entries)
            .or_classify("vkCreateDescriptorSetLayout")?;
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
                            buffer.info().usage,
                            offset,
                            len,
                            &self.limits,
                        )?;
                        BoundResource::Buffer {
                            buffer: buffer.raw(),
                            offset,
                            range: len,
                        }
                    }
                    BindingResource::Sampler(sampler) => {
                        BoundResource::Sampler(
                            hub.samplers.resolve(sampler)?.raw(),
                        )
                    }
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
                        BoundResource::TextureView {
                            view: view.raw(),
                            layout: binding_image_layout(&declared.ty),
                        }
                    }
                };
                resources.push((entry.binding, resource));
            }
            BindGroup::new(&self.raw, desc.label, layout, &resources)?
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
        let pass = RenderPass::new(&self.raw, desc)?;
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
                    resolve: resolves
                        .iter()
                        .map(|v| v.map(signature))
                        .collect(),
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
            let depth_target = depth.zip(layout.depth_stencil_attachment).map(
                |(v, d)| target(v, depth_layout, d.final_layout),
            );

            let raw_colors: Vec<vk::ImageView> =
                colors.iter().map(|v| v.raw()).collect();
            let raw_resolves: Vec<Option<vk::ImageView>> =
                resolves.iter().map(|v| v.map(TextureView::raw)).collect();
            let views = ordered_attachments(
                &raw_colors,
                &raw_resolves,
                depth.map(TextureView::raw),
            );
            let targets = color_targets
                .into_iter()
                .chain(resolve_targets.into_iter().flatten())
                .chain(depth_target)
                .collect();
            Framebuffer::new(
                &self.raw,
                desc.label,
                pass,
                &views,
                targets,
                vk::Extent2D {
                    width: desc.width,
                    height: desc.height,
                },
            )?
        };
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
            RenderPipeline::new(&self.raw, desc, pass, &groups, vertex, fragment)?
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
            ComputePipeline::new(&self.raw, desc, &groups, module)?
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
        let fence = Fence::new(&self.raw, desc.signaled, desc.label)?;
        Ok(self.hub_mut().fences.insert(Arc::new(fence)))
    }

    fn destroy_fence(&self, fence: FenceHandle) -> rgfx_core::Result<()> {
        self.release(|hub| &mut hub.fences, fence)
    }

    fn fence_status(&self, fence: FenceHandle) -> rgfx_core::Result<bool> {
        Ok(self.fence(fence)?.is_signaled()?)
    }

    fn wait_fence(
        &self,
        fence: FenceHandle,
        timeout_ns: u64,
    ) -> rgfx_core::Result<()> {
        Ok(self.fence(fence)?.wait(timeout_ns)?)
    }

    fn reset_fence(&self, fence: FenceHandle) -> rgfx_core::Result<()> {
        Ok(self.fence(fence)?.reset()?)
    }

    fn create_semaphore(
        &self,
        desc: &SemaphoreDescriptor<'_>,
    ) -> rgfx_core::Result<SemaphoreHandle> {
        let semaphore = Semaphore::new(
            &self.raw,
            desc.semaphore_type,
            desc.initial_value,
            desc.label,
        )?;
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
        Ok(self.semaphore(semaphore)?.wait(value, timeout_ns)?)
    }

    fn semaphore_value(
        &self,
        semaphore: SemaphoreHandle,
    ) -> rgfx_core::Result<u64> {
        Ok(self.semaphore(semaphore)?.value()?)
    }

    fn create_query_set(
        &self,
        desc: &QuerySetDescriptor<'_>,
    ) -> rgfx_core::Result<QuerySetHandle> {
        validate::query_set(desc)?;
        let set = QuerySet::new(&self.raw, desc)?;
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
        surface: &VulkanSurface,
        desc: &SwapchainDescriptor<'_>,
    ) -> rgfx_core::Result<SwapchainHandle> {
        validate::swapchain(desc)?;
        let (mut swapchain, images) = Swapchain::new(&self.raw, surface, desc)?;
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
        let (textures, views) =
            self.register_swapchain_images(&mut hub, images, texture_info)?;
        swapchain.attach_images(textures, views);
        Ok(hub.swapchains.insert(Arc::new(swapchain)))
    }

    fn destroy_swapchain(
        &self,
        swapchain: SwapchainHandle,
    ) -> rgfx_core::Result<()> {
        let (swapchain, views, textures) = {
            let mut hub = self.hub_mut();
            let Some(swapchain) = hub::release(&mut hub.swapchains, swapchain)
            else {
                return Ok(());
            };
            let views: Vec<TextureView> = swapchain
                .views()
                .iter()
                .filter_map(|v| hub.texture_views.remove(*v))
                .collect();
            let textures: Vec<Texture> = swapchain
                .textures()
                .iter()
                .filter_map(|t| hub.textures.remove(*t))
                .collect();
            (swapchain, views, textures)
        };
        // Presentation may still read the images.
        self.raw.queue_wait_idle().or_classify("vkQueueWaitIdle")?;
        drop(views);
        drop(textures);
        drop(swapchain);
        Ok(())
    }

    fn swapchain_info(
        &self,
        swapchain: SwapchainHandle,
    ) -> rgfx_core::Result<SwapchainInfo> {
        Ok(self.hub().swapchains.resolve(swapchain)?.info())
    }

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
        // SAFETY: Both objects belong to this device; that they carry no
        // pending signal is part of the acquire contract.
        unsafe {
            swapchain.acquire(
                timeout_ns,
                semaphore.as_ref().map_or(vk::Semaphore::null(), |s| s.raw()),
                fence.as_ref().map_or(vk::Fence::null(), |f| f.raw()),
            )
        }
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
        let (swapchain, semaphores) = {
            let hub = self.hub();
            let swapchain = hub.swapchains.resolve(swapchain)?;
            let index = swapchain.current_index().ok_or_else(|| {
                rgfx_core::Error::invalid_state("no swapchain image is acquired")
            })?;
            if let Some(texture) = swapchain.textures().get(index as usize) {
                let actual = hub.textures.resolve(*texture)?.current_layout();
                if actual != TextureLayout::PresentSrc {
                    return Err(rgfx_core::Error::LayoutMismatch {
                        mip_level: 0,
                        expected: TextureLayout::PresentSrc,
                        actual,
                    });
                }
            }
            let semaphores = desc
                .wait_semaphores
                .iter()
                .map(|s| {
                    let semaphore = hub.semaphores.resolve(*s)?;
                    match semaphore.ty() {
                        SemaphoreType::Binary => Ok(Arc::clone(semaphore)),
                        SemaphoreType::Timeline => {
                            Err(rgfx_core::Error::invalid_argument(
                                "presentation waits on binary semaphores only",
                            ))
                        }
                    }
                })
                .collect::<rgfx_core::Result<Vec<_>>>()?;
            (Arc::clone(swapchain), semaphores)
        };
        let raw: Vec<vk::Semaphore> = semaphores.iter().map(|s| s.raw()).collect();
        // SAFETY: The semaphores are binary semaphores of this device and
        // the acquired image was checked to be in PRESENT_SRC.
        unsafe { swapchain.present(&raw) }
    }

    // ---- recording and the queue

    fn create_command_encoder(
        self: &Arc<Self>,
        label: Option<&str>,
    ) -> rgfx_core::Result<VulkanEncoder> {
        VulkanEncoder::new(Arc::clone(self), label)
    }

    fn submit(
        &self,
        encoders: &mut [&mut VulkanEncoder],
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

        let (waits, signals, user_fence) = {
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

        let mut cmds = Vec::with_capacity(encoders.len());
        for encoder in encoders.iter_mut() {
            cmds.push(encoder.prepare_submit()?);
        }

        let wait_raw: Vec<vk::Semaphore> = waits.iter().map(|s| s.raw()).collect();
        let wait_stages =
            vec![vk::PipelineStageFlags::ALL_COMMANDS; wait_raw.len()];
        let wait_values: Vec<u64> =
            (0..waits.len()).map(|i| info.wait_value(i)).collect();
        let signal_raw: Vec<vk::Semaphore> =
            signals.iter().map(|s| s.raw()).collect();
        let signal_values: Vec<u64> =
            (0..signals.len()).map(|i| info.signal_value(i)).collect();
        let any_timeline = waits
            .iter()
            .chain(&signals)
            .any(|s| s.ty() == SemaphoreType::Timeline);

        // Encoders track their own submission so a user fence can be reset
        // and reused freely.
        let tracking = if cmds.is_empty() {
            None
        } else {
            Some(Arc::new(Fence::new(&self.raw, false, Some("submission"))?))
        };

        let mut timeline = vk::TimelineSemaphoreSubmitInfo::default()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values);
        let mut submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_raw)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&cmds)
            .signal_semaphores(&signal_raw);
        if any_timeline {
            submit = submit.push_next(&mut timeline);
        }
        let submit_fence = match (&tracking, &user_fence) {
            (Some(fence), _) | (None, Some(fence)) => fence.raw(),
            (None, None) => vk::Fence::null(),
        };
        // SAFETY: Every command buffer was ended and retired above, every
        // semaphore and fence belongs to this device, and the arrays
        // referenced by `submit` outlive the call.
        unsafe { self.raw.queue_submit(&[submit], submit_fence) }
            .or_classify("vkQueueSubmit")?;

        if let Some(tracking) = &tracking {
            for encoder in encoders.iter_mut() {
                encoder.mark_submitted(tracking);
            }
            if let Some(user_fence) = &user_fence {
                // An empty submission signals once all prior work retires.
                // SAFETY: The fence belongs to this device; it being
                // unsignaled is the caller's submit contract.
                unsafe { self.raw.queue_submit(&[], user_fence.raw()) }
                    .or_classify("vkQueueSubmit")?;
            }
        }
        tracing::trace!(
            "Submitted {} command buffers on {:?}",
            cmds.len(),
            self.label
        );
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
        if target.is_host_visible() {
            return Ok(target.write_host(offset, data)?);
        }
        if !target.info().usage.contains(BufferUsage::COPY_DST) {
            return Err(rgfx_core::Error::invalid_argument(
                "device-local buffer writes need COPY_DST usage",
            ));
        }
        let staging = self.staging_buffer(data)?;
        let ash_device = self.raw.ash_device();
        self.raw.one_shot("write_buffer", |cmd| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: offset,
                size: data.len() as u64,
            };
            let barrier = vk::MemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(
                    vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                );
            // SAFETY: cmd is recording; the destination range was checked
            // and the staging buffer holds exactly `data`.
            unsafe {
                ash_device.cmd_copy_buffer(
                    cmd,
                    staging.raw(),
                    target.raw(),
                    &[region],
                );
                ash_device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::ALL_COMMANDS,
                    vk::DependencyFlags::empty(),
                    &[barrier],
                    &[],
                    &[],
                );
            }
            Ok(())
        })
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
        let staging = self.staging_buffer(data)?;
        let ash_device = self.raw.ash_device();
        self.raw.one_shot("write_texture", |cmd| {
            // SAFETY: cmd is a fresh one-shot buffer of this device, outside
            // any pass.
            unsafe {
                record_upload(
                    ash_device,
                    cmd,
                    &staging,
                    0,
                    target,
                    (mip_level, origin, extent),
                    final_layout,
                )
            }
        })
    }

    fn queue_wait_idle(&self) -> rgfx_core::Result<()> {
        self.raw.queue_wait_idle().or_classify("vkQueueWaitIdle")
    }
}
