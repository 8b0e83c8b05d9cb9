//! The logical device shared by every Vulkan entity.
//!
//! [`RawDevice`] owns the `ash::Device`, its single queue, the
//! `gpu-allocator` instance and the optional extension loaders. Entities
//! hold an `Arc<RawDevice>` and destroy their native objects through it in
//! `Drop`, so the device always outlives what was created from it.

use std::ffi::{CStr, CString, NulError};
use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator,
    AllocatorCreateDesc,
};
use gpu_allocator::AllocationError;
use rgfx_core::descriptor::{DeviceDescriptor, DeviceExtension};
use rgfx_core::{BufferUsage, MemoryProperty};
use thiserror::Error;

use crate::adapter::VulkanAdapter;
use crate::error::classify;
use crate::instance::Instance;

/// Intended access pattern of a memory allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryUsage {
    /// Device-local memory, never mapped.
    GpuOnly,
    /// Host-visible memory written by the CPU and read by the GPU.
    CpuToGpu,
    /// Host-visible memory written by the GPU and read back by the CPU.
    GpuToCpu,
}

impl MemoryUsage {
    /// Pick a usage from the requested buffer usage and memory properties.
    /// Readback wins over upload when both are requested.
    pub fn for_buffer(usage: BufferUsage, properties: MemoryProperty) -> Self {
        let host_visible = properties.is_host_visible() || usage.is_mappable();
        if !host_visible {
            MemoryUsage::GpuOnly
        } else if usage.contains(BufferUsage::MAP_READ)
            || properties.contains(MemoryProperty::HOST_CACHED)
        {
            MemoryUsage::GpuToCpu
        } else {
            MemoryUsage::CpuToGpu
        }
    }

    fn location(self) -> MemoryLocation {
        match self {
            MemoryUsage::GpuOnly => MemoryLocation::GpuOnly,
            MemoryUsage::CpuToGpu => MemoryLocation::CpuToGpu,
            MemoryUsage::GpuToCpu => MemoryLocation::GpuToCpu,
        }
    }
}

/// Score a memory type for a given usage; `None` if the type is
/// incompatible. Higher scores are more preferred.
fn score_memory_type(
    flags: vk::MemoryPropertyFlags,
    usage: MemoryUsage,
) -> Option<u32> {
    use vk::MemoryPropertyFlags as F;
    let device_local = flags.contains(F::DEVICE_LOCAL);
    let host_visible = flags.contains(F::HOST_VISIBLE);
    let host_cached = flags.contains(F::HOST_CACHED);
    match usage {
        MemoryUsage::GpuOnly => {
            device_local.then_some(if host_visible { 1 } else { 2 })
        }
        MemoryUsage::CpuToGpu => {
            host_visible.then_some(if device_local { 2 } else { 1 })
        }
        MemoryUsage::GpuToCpu => {
            host_visible.then_some(if host_cached { 2 } else { 1 })
        }
    }
}

/// Best memory type index among `types` allowed by `type_bits`. Equal
/// scores go to the lowest index.
fn select_memory_type(
    types: &[vk::MemoryType],
    type_bits: u32,
    usage: MemoryUsage,
) -> Option<u32> {
    types
        .iter()
        .enumerate()
        .filter(|(i, _)| type_bits & (1 << i) != 0)
        .filter_map(|(i, ty)| {
            score_memory_type(ty.property_flags, usage).map(|s| (i as u32, s))
        })
        .max_by(|(i1, s1), (i2, s2)| s1.cmp(s2).then(i2.cmp(i1)))
        .map(|(i, _)| i)
}

#[derive(Debug, Error)]
pub enum CreateDeviceError {
    #[error("Adapter has no queue family with graphics and compute support")]
    NoGraphicsQueue,
    #[error("Queue family {family} index {index} does not exist")]
    NoSuchQueue { family: u32, index: u32 },
    #[error("Device extension {0} is not supported by this adapter")]
    UnsupportedExtension(&'static str),
    #[error("Vulkan error creating device: {0}")]
    Vulkan(vk::Result),
    #[error("Failed to create allocator: {0}")]
    Allocator(AllocationError),
}

impl From<CreateDeviceError> for rgfx_core::Error {
    fn from(value: CreateDeviceError) -> Self {
        match value {
            CreateDeviceError::NoGraphicsQueue => {
                rgfx_core::Error::NotFound(value.to_string())
            }
            CreateDeviceError::NoSuchQueue { .. } => {
                rgfx_core::Error::invalid_argument(value.to_string())
            }
            CreateDeviceError::UnsupportedExtension(_) => {
                rgfx_core::Error::unsupported(value.to_string())
            }
            CreateDeviceError::Vulkan(e) => classify("vkCreateDevice", e),
            CreateDeviceError::Allocator(e) => {
                crate::error::allocation_error(e)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum NameObjectError {
    #[error("Invalid name: {0}")]
    InvalidName(#[from] NulError),
    #[error("Vulkan error: {0}")]
    Vulkan(vk::Result),
}

#[derive(Debug, Error)]
pub enum CreateSwapchainError {
    #[error("Swapchain extension not enabled on this device")]
    SwapchainNotEnabled,
    #[error("Vulkan error creating swapchain: {0}")]
    VulkanCreate(vk::Result),
    #[error("Vulkan error getting swapchain images: {0}")]
    VulkanGetImages(vk::Result),
}

impl From<CreateSwapchainError> for rgfx_core::Error {
    fn from(value: CreateSwapchainError) -> Self {
        match value {
            CreateSwapchainError::SwapchainNotEnabled => {
                rgfx_core::Error::unsupported(
                    "device was created without the swapchain extension",
                )
            }
            CreateSwapchainError::VulkanCreate(e) => {
                classify("vkCreateSwapchainKHR", e)
            }
            CreateSwapchainError::VulkanGetImages(e) => {
                classify("vkGetSwapchainImagesKHR", e)
            }
        }
    }
}

pub struct RawDevice {
    parent: Arc<Instance>,
    allocator: Option<Mutex<Allocator>>,
    handle: ash::Device,
    physical_device: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    properties: vk::PhysicalDeviceProperties,
    swapchain_device: Option<ash::khr::swapchain::Device>,
    debug_utils_device: Option<ash::ext::debug_utils::Device>,
    queue: Mutex<vk::Queue>,
    queue_family_index: u32,
    queue_index: u32,
    /// Pool for internal one-shot uploads. Locked for the whole upload.
    transient_pool: Mutex<vk::CommandPool>,
    timeline_semaphores: bool,
    anisotropy: bool,
}

impl std::fmt::Debug for RawDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDevice")
            .field("handle", &self.handle.handle())
            .field("queue_family_index", &self.queue_family_index)
            .finish_non_exhaustive()
    }
}

impl Drop for RawDevice {
    fn drop(&mut self) {
        tracing::debug!("Dropping device {:?}", self.handle.handle());
        // SAFETY: The device is live; all entities holding an Arc to it are
        // gone, so only internal work can be in flight.
        if let Err(e) = unsafe { self.handle.device_wait_idle() } {
            tracing::error!("vkDeviceWaitIdle failed during teardown: {e}");
        }
        let pool = *self
            .transient_pool
            .get_mut()
            .unwrap_or_else(|e| e.into_inner());
        // SAFETY: The pool was created from this device and the wait above
        // retired every command buffer allocated from it.
        unsafe { self.handle.destroy_command_pool(pool, None) };
        // Ensure allocator is dropped before vkDestroyDevice.
        self.allocator = None;
        //SAFETY: All objects derived from this device are dropped before
        //this device is dropped.
        unsafe { self.handle.destroy_device(None) };
    }
}

impl RawDevice {
    pub fn new(
        adapter: &VulkanAdapter,
        desc: &DeviceDescriptor<'_>,
    ) -> Result<Self, CreateDeviceError> {
        let instance = adapter.instance();
        let physical_device = adapter.physical_device();

        let (queue_family_index, queue_index, priority) =
            match desc.queue_requests.first() {
                Some(request) => (
                    request.queue_family_index,
                    request.queue_index,
                    request.priority,
                ),
                None => (
                    adapter
                        .graphics_queue_family()
                        .ok_or(CreateDeviceError::NoGraphicsQueue)?,
                    0,
                    1.0,
                ),
            };
        let queue_families = rgfx_core::backend::AdapterBackend::queue_families(
            adapter,
        );
        match queue_families.get(queue_family_index as usize) {
            Some(family) if queue_index < family.queue_count => {}
            _ => {
                return Err(CreateDeviceError::NoSuchQueue {
                    family: queue_family_index,
                    index: queue_index,
                });
            }
        }
        if desc.queue_requests.len() > 1 {
            tracing::warn!(
                "{} queues requested; only the first is created",
                desc.queue_requests.len()
            );
        }

        for extension in desc.enabled_extensions {
            if !adapter.supports(*extension) {
                return Err(CreateDeviceError::UnsupportedExtension(
                    extension.name(),
                ));
            }
        }

        let swapchain = desc.wants(DeviceExtension::Swapchain);
        let timeline_semaphores =
            desc.wants(DeviceExtension::TimelineSemaphore);
        let anisotropy = desc.wants(DeviceExtension::AnisotropicFiltering);

        let mut enabled_exts: Vec<&CStr> = Vec::with_capacity(2);
        if swapchain {
            enabled_exts.push(ash::khr::swapchain::NAME);
        }
        if adapter.has_portability_subset() {
            enabled_exts.push(ash::khr::portability_subset::NAME);
        }
        let enabled_ext_ptrs: Vec<_> =
            enabled_exts.iter().map(|ext| ext.as_ptr()).collect();

        let supported = adapter.features();
        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(anisotropy)
            .fill_mode_non_solid(supported.fill_mode_non_solid == vk::TRUE)
            .independent_blend(supported.independent_blend == vk::TRUE)
            .occlusion_query_precise(
                supported.occlusion_query_precise == vk::TRUE,
            );

        let priorities = vec![priority; queue_index as usize + 1];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family_index)
            .queue_priorities(&priorities)];

        let mut timeline_features =
            vk::PhysicalDeviceTimelineSemaphoreFeatures::default()
                .timeline_semaphore(true);
        let mut create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_ext_ptrs)
            .enabled_features(&features);
        if timeline_semaphores {
            create_info = create_info.push_next(&mut timeline_features);
        }

        // SAFETY: physical_device derives from instance and create_info
        // only points at locals that outlive this call.
        let device = unsafe {
            instance.create_ash_device(physical_device, &create_info)
        }
        .map_err(CreateDeviceError::Vulkan)?;

        // SAFETY: The queue was requested in create_info.
        let queue =
            unsafe { device.get_device_queue(queue_family_index, queue_index) };

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(queue_family_index);
        // SAFETY: device is live and pool_info is valid.
        let transient_pool =
            match unsafe { device.create_command_pool(&pool_info, None) } {
                Ok(pool) => pool,
                Err(e) => {
                    // SAFETY: Nothing has been created from the device yet.
                    unsafe { device.destroy_device(None) };
                    return Err(CreateDeviceError::Vulkan(e));
                }
            };

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.ash_instance().clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                // SAFETY: Only the pool has been created from the device.
                unsafe {
                    device.destroy_command_pool(transient_pool, None);
                    device.destroy_device(None);
                }
                return Err(CreateDeviceError::Allocator(e));
            }
        };

        let swapchain_device = swapchain
            .then(|| instance.create_swapchain_loader(&device));
        let debug_utils_device =
            instance.create_debug_utils_device_loader(&device);

        // SAFETY: physical_device derives from instance.
        let memory_properties = unsafe {
            instance.get_raw_physical_device_memory_properties(physical_device)
        };

        let device = Self {
            parent: instance.clone(),
            allocator: Some(Mutex::new(allocator)),
            handle: device,
            physical_device,
            memory_properties,
            properties: *adapter.properties(),
            swapchain_device,
            debug_utils_device,
            queue: Mutex::new(queue),
            queue_family_index,
            queue_index,
            transient_pool: Mutex::new(transient_pool),
            timeline_semaphores,
            anisotropy,
        };
        // SAFETY: the handle is the device itself.
        unsafe {
            device.label_object(device.handle.handle(), "device", desc.label)
        };
        tracing::info!(
            "Created device {:?} on {:?} (queue {}:{})",
            device.handle.handle(),
            adapter.name(),
            queue_family_index,
            queue_index,
        );
        Ok(device)
    }

    pub fn parent(&self) -> &Arc<Instance> {
        &self.parent
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn non_coherent_atom_size(&self) -> vk::DeviceSize {
        self.properties.limits.non_coherent_atom_size
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    pub fn queue_index(&self) -> u32 {
        self.queue_index
    }

    pub fn has_timeline_semaphores(&self) -> bool {
        self.timeline_semaphores
    }

    pub fn has_anisotropy(&self) -> bool {
        self.anisotropy
    }

    pub fn has_swapchain_support(&self) -> bool {
        self.swapchain_device.is_some()
    }

    pub fn ash_device(&self) -> &ash::Device {
        &self.handle
    }

    pub fn raw_device(&self) -> vk::Device {
        self.handle.handle()
    }

    /// Wait until all submitted work on this device has completed.
    pub fn wait_idle(&self) -> Result<(), vk::Result> {
        let _span = tracing::debug_span!("device_wait_idle").entered();
        // Hold the queue so no submission races the wait.
        let _queue = self.queue.lock().expect("queue lock poisoned");
        // SAFETY: `self.handle` is a valid logical device for the lifetime
        // of `self`; the queue lock gives the required external sync.
        unsafe { self.handle.device_wait_idle() }
    }

    pub fn queue_wait_idle(&self) -> Result<(), vk::Result> {
        let queue = self.queue.lock().expect("queue lock poisoned");
        // SAFETY: The queue belongs to this device and is locked.
        unsafe { self.handle.queue_wait_idle(*queue) }
    }
}

// Memory functionality
impl RawDevice {
    /// Allocate device memory for the given requirements.
    ///
    /// Narrows `requirements.memory_type_bits` to the best type for `usage`
    /// and pads size and alignment to `nonCoherentAtomSize` when that type
    /// is host visible but not coherent, so flushes never touch a
    /// neighbouring allocation.
    pub fn allocate_memory(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        usage: MemoryUsage,
        linear: bool,
    ) -> Result<Allocation, AllocationError> {
        let atom = self.non_coherent_atom_size();
        let types = &self.memory_properties.memory_types
            [..self.memory_properties.memory_type_count as usize];
        let requirements = match select_memory_type(
            types,
            requirements.memory_type_bits,
            usage,
        ) {
            Some(idx) => {
                use vk::MemoryPropertyFlags as F;
                let flags = types[idx as usize].property_flags;
                let non_coherent_visible = flags.contains(F::HOST_VISIBLE)
                    && !flags.contains(F::HOST_COHERENT);
                let (size, alignment) = if non_coherent_visible {
                    (
                        requirements.size.div_ceil(atom) * atom,
                        requirements.alignment.max(atom),
                    )
                } else {
                    (requirements.size, requirements.alignment)
                };
                vk::MemoryRequirements {
                    size,
                    alignment,
                    memory_type_bits: 1 << idx,
                }
            }
            None => requirements,
        };
        let mut allocator = self
            .allocator
            .as_ref()
            .ok_or(AllocationError::Internal("allocator is gone".into()))?
            .lock()
            .expect("allocator lock poisoned");
        allocator.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: usage.location(),
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
    }

    pub fn free_memory(
        &self,
        allocation: Allocation,
    ) -> Result<(), AllocationError> {
        let mut allocator = self
            .allocator
            .as_ref()
            .ok_or(AllocationError::Internal("allocator is gone".into()))?
            .lock()
            .expect("allocator lock poisoned");
        allocator.free(allocation)
    }

    /// Property flags of memory type `index`.
    pub fn memory_type_flags(&self, index: u32) -> vk::MemoryPropertyFlags {
        self.memory_properties
            .memory_types
            .get(index as usize)
            .map(|ty| ty.property_flags)
            .unwrap_or_default()
    }
}

// Queue functionality
impl RawDevice {
    /// # Safety
    /// Every handle referenced by `submits` must derive from this device and
    /// be in a state valid for submission. `fence`, when not null, must be
    /// unsignaled.
    pub unsafe fn queue_submit(
        &self,
        submits: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> Result<(), vk::Result> {
        let queue = self.queue.lock().expect("queue lock poisoned");
        // SAFETY: Caller guarantees submit validity; the lock provides
        // external synchronization of the queue.
        unsafe { self.handle.queue_submit(*queue, submits, fence) }
    }

    /// Record with `record`, submit, and block until the GPU is done.
    ///
    /// Used for internal uploads. The transient pool stays locked for the
    /// whole round trip.
    pub fn one_shot<F>(&self, label: &str, record: F) -> rgfx_core::Result<()>
    where
        F: FnOnce(vk::CommandBuffer) -> rgfx_core::Result<()>,
    {
        let _span = tracing::debug_span!("one_shot", label).entered();
        let pool = self
            .transient_pool
            .lock()
            .expect("transient pool lock poisoned");
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        // SAFETY: The pool is locked and belongs to this device.
        let cmd = unsafe { self.handle.allocate_command_buffers(&alloc_info) }
            .map_err(|e| classify("vkAllocateCommandBuffers", e))?[0];

        let result = (|| {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            // SAFETY: cmd was just allocated and is in the initial state.
            unsafe { self.handle.begin_command_buffer(cmd, &begin_info) }
                .map_err(|e| classify("vkBeginCommandBuffer", e))?;
            record(cmd)?;
            // SAFETY: cmd is recording.
            unsafe { self.handle.end_command_buffer(cmd) }
                .map_err(|e| classify("vkEndCommandBuffer", e))?;

            // SAFETY: Valid create info.
            let fence = unsafe {
                self.handle
                    .create_fence(&vk::FenceCreateInfo::default(), None)
            }
            .map_err(|e| classify("vkCreateFence", e))?;
            let cmds = [cmd];
            let submit = vk::SubmitInfo::default().command_buffers(&cmds);
            // SAFETY: cmd is executable, fence is fresh and unsignaled.
            let submitted = unsafe {
                self.queue_submit(std::slice::from_ref(&submit), fence)
            }
            .map_err(|e| classify("vkQueueSubmit", e))
            .and_then(|()| {
                // SAFETY: fence belongs to this device.
                unsafe { self.handle.wait_for_fences(&[fence], true, u64::MAX) }
                    .map_err(|e| classify("vkWaitForFences", e))
            });
            // SAFETY: The fence was waited on, or never submitted.
            unsafe { self.handle.destroy_fence(fence, None) };
            submitted
        })();

        // SAFETY: cmd is no longer pending: it either completed or was
        // never submitted.
        unsafe { self.handle.free_command_buffers(*pool, &[cmd]) };
        result
    }
}

// Swapchain functionality
impl RawDevice {
    /// # Safety
    /// `create_info` must reference valid Vulkan objects derived from this
    /// device and its parent instance. If `create_info.old_swapchain` is
    /// non-null, it must be a valid swapchain created from this device.
    pub unsafe fn create_raw_swapchain(
        &self,
        create_info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> Result<vk::SwapchainKHR, CreateSwapchainError> {
        let swapchain_device = self
            .swapchain_device
            .as_ref()
            .ok_or(CreateSwapchainError::SwapchainNotEnabled)?;
        // SAFETY: Caller guarantees create_info validity and provenance.
        unsafe { swapchain_device.create_swapchain(create_info, None) }
            .map_err(CreateSwapchainError::VulkanCreate)
    }

    /// # Safety
    /// `swapchain` must be a valid swapchain handle created from this device
    /// and not yet destroyed.
    pub unsafe fn get_raw_swapchain_images(
        &self,
        swapchain: vk::SwapchainKHR,
    ) -> Result<Vec<vk::Image>, CreateSwapchainError> {
        let swapchain_device = self
            .swapchain_device
            .as_ref()
            .ok_or(CreateSwapchainError::SwapchainNotEnabled)?;
        // SAFETY: Caller guarantees swapchain validity and lifetime.
        unsafe { swapchain_device.get_swapchain_images(swapchain) }
            .map_err(CreateSwapchainError::VulkanGetImages)
    }

    /// # Safety
    /// `swapchain` must be a valid handle derived from this device. No
    /// in-flight GPU work may still reference it.
    pub unsafe fn destroy_raw_swapchain(&self, swapchain: vk::SwapchainKHR) {
        if let Some(swapchain_device) = self.swapchain_device.as_ref() {
            // SAFETY: Caller guarantees provenance and drop ordering.
            unsafe { swapchain_device.destroy_swapchain(swapchain, None) };
        }
    }

    /// Returns `(image_index, is_suboptimal)`.
    ///
    /// # Safety
    /// `swapchain` must be a valid handle created from this device.
    /// `semaphore` and `fence`, when not null, must be valid unsignaled
    /// handles created from this device.
    pub unsafe fn acquire_next_swapchain_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<(u32, bool), vk::Result> {
        let swapchain_device = self
            .swapchain_device
            .as_ref()
            .ok_or(vk::Result::ERROR_EXTENSION_NOT_PRESENT)?;
        // SAFETY: Caller guarantees swapchain, semaphore and fence
        // validity.
        unsafe {
            swapchain_device
                .acquire_next_image(swapchain, timeout_ns, semaphore, fence)
        }
    }

    /// Present through the device queue. `Ok(true)` means suboptimal.
    ///
    /// # Safety
    /// All handles in `present_info` must be valid and derived from this
    /// device. The presented image must be in `PRESENT_SRC_KHR`.
    pub unsafe fn queue_present(
        &self,
        present_info: &vk::PresentInfoKHR<'_>,
    ) -> Result<bool, vk::Result> {
        let swapchain_device = self
            .swapchain_device
            .as_ref()
            .ok_or(vk::Result::ERROR_EXTENSION_NOT_PRESENT)?;
        let queue = self.queue.lock().expect("queue lock poisoned");
        // SAFETY: Caller guarantees all handles and synchronization
        // requirements.
        unsafe { swapchain_device.queue_present(*queue, present_info) }
    }
}

// Debug naming functionality
impl RawDevice {
    /// Set a Vulkan debug name for an object owned by this device.
    ///
    /// Passing `None` as the name is treated as a no-op.
    ///
    /// # Safety
    /// `object` must be a valid Vulkan handle created from this device and
    /// must remain valid for the duration of the call.
    pub unsafe fn set_object_name<H>(
        &self,
        object: H,
        name: Option<&CStr>,
    ) -> Result<(), NameObjectError>
    where
        H: vk::Handle,
    {
        let Some(debug_utils) = self.debug_utils_device.as_ref() else {
            return Ok(());
        };
        let Some(name) = name else {
            return Ok(());
        };

        let object_name_info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(object)
            .object_name(name);

        // SAFETY: Caller guarantees object provenance and validity.
        unsafe { debug_utils.set_debug_utils_object_name(&object_name_info) }
            .map_err(NameObjectError::Vulkan)
    }

    /// # Safety
    /// Same contract as [`RawDevice::set_object_name`].
    pub unsafe fn set_object_name_str<H>(
        &self,
        object: H,
        name: Option<&str>,
    ) -> Result<(), NameObjectError>
    where
        H: vk::Handle,
    {
        if self.debug_utils_device.is_none() {
            return Ok(());
        }
        let name = name.map(CString::new).transpose()?;
        // SAFETY: This method shares the contract of set_object_name.
        unsafe { self.set_object_name(object, name.as_deref()) }
    }

    /// Name `object` after `label`, logging instead of failing.
    ///
    /// # Safety
    /// Same contract as [`RawDevice::set_object_name`].
    pub unsafe fn label_object<H>(&self, object: H, kind: &str, label: Option<&str>)
    where
        H: vk::Handle + std::fmt::Debug + Copy,
    {
        // SAFETY: passed on to the caller
        if let Err(e) = unsafe { self.set_object_name_str(object, label) } {
            tracing::warn!("Failed to name {kind} {:?}: {e}", object);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_type(flags: vk::MemoryPropertyFlags) -> vk::MemoryType {
        vk::MemoryType {
            property_flags: flags,
            heap_index: 0,
        }
    }

    #[test]
    fn buffer_usage_selects_memory_usage() {
        assert_eq!(
            MemoryUsage::for_buffer(BufferUsage::VERTEX, MemoryProperty::DEVICE_LOCAL),
            MemoryUsage::GpuOnly
        );
        assert_eq!(
            MemoryUsage::for_buffer(
                BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC,
                MemoryProperty::empty()
            ),
            MemoryUsage::CpuToGpu
        );
        assert_eq!(
            MemoryUsage::for_buffer(
                BufferUsage::MAP_READ | BufferUsage::COPY_DST,
                MemoryProperty::HOST_VISIBLE
            ),
            MemoryUsage::GpuToCpu
        );
        assert_eq!(
            MemoryUsage::for_buffer(
                BufferUsage::UNIFORM,
                MemoryProperty::HOST_VISIBLE | MemoryProperty::HOST_COHERENT
            ),
            MemoryUsage::CpuToGpu
        );
    }

    #[test]
    fn gpu_only_prefers_pure_vram() {
        use vk::MemoryPropertyFlags as F;
        let types = [
            memory_type(F::DEVICE_LOCAL | F::HOST_VISIBLE),
            memory_type(F::DEVICE_LOCAL),
            memory_type(F::HOST_VISIBLE | F::HOST_COHERENT),
        ];
        assert_eq!(
            select_memory_type(&types, 0b111, MemoryUsage::GpuOnly),
            Some(1)
        );
        // Filtered out by the requirement bits.
        assert_eq!(
            select_memory_type(&types, 0b101, MemoryUsage::GpuOnly),
            Some(0)
        );
        assert_eq!(select_memory_type(&types, 0b100, MemoryUsage::GpuOnly), None);
    }

    #[test]
    fn readback_prefers_cached_and_ties_take_lowest_index() {
        use vk::MemoryPropertyFlags as F;
        let types = [
            memory_type(F::HOST_VISIBLE | F::HOST_COHERENT),
            memory_type(F::HOST_VISIBLE | F::HOST_CACHED),
            memory_type(F::HOST_VISIBLE | F::HOST_COHERENT),
        ];
        assert_eq!(
            select_memory_type(&types, 0b111, MemoryUsage::GpuToCpu),
            Some(1)
        );
        assert_eq!(
            select_memory_type(&types, 0b101, MemoryUsage::CpuToGpu),
            Some(0)
        );
    }
}
