//! Vulkan instance creation and physical device enumeration.
//!
//! The central type is [`Instance`], which wraps an `ash::Instance` and
//! owns the entry-point loader, an optional debug messenger, and an
//! optional surface instance extension loader. It exposes physical device
//! queries and unsafe constructors for surfaces and logical devices.
//! [`VulkanInstance`] is the shareable backend object built on top of it.
//!
//! [`VkVersion`] is a thin newtype over the packed Vulkan version word.

use std::ffi::{CStr, CString};
use std::fmt::Debug;
use std::sync::Arc;

use ash::vk;
use rgfx_core::backend::InstanceBackend;
use rgfx_core::descriptor::{
    AdapterDescriptor, InstanceDescriptor, InstanceExtension,
    PlatformWindowHandle,
};
use rgfx_core::BackendKind;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::adapter::VulkanAdapter;
use crate::error::classify;

/// Minimum severity level for Vulkan validation layer messages.
///
/// Messages at or above the chosen level are forwarded to the [`tracing`]
/// subscriber; lower-severity messages are suppressed. Variants are
/// ordered least-to-most severe: `Verbose < Info < Warning < Error`.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum VulkanLogLevel {
    Verbose,
    Info,
    Warning,
    Error,
}

impl VulkanLogLevel {
    /// The most verbose level the active subscriber would still record.
    pub fn from_filter(filter: LevelFilter) -> Self {
        if filter >= LevelFilter::TRACE {
            VulkanLogLevel::Verbose
        } else if filter >= LevelFilter::INFO {
            VulkanLogLevel::Info
        } else if filter >= LevelFilter::WARN {
            VulkanLogLevel::Warning
        } else {
            VulkanLogLevel::Error
        }
    }

    fn severity_flags(self) -> vk::DebugUtilsMessageSeverityFlagsEXT {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        match self {
            VulkanLogLevel::Verbose => {
                S::VERBOSE | S::INFO | S::WARNING | S::ERROR
            }
            VulkanLogLevel::Info => S::INFO | S::WARNING | S::ERROR,
            VulkanLogLevel::Warning => S::WARNING | S::ERROR,
            VulkanLogLevel::Error => S::ERROR,
        }
    }
}

/// A packed Vulkan API version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VkVersion(u32);

impl VkVersion {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn new(variant: u32, major: u32, minor: u32, patch: u32) -> Self {
        Self(vk::make_api_version(variant, major, minor, patch))
    }

    pub fn variant(&self) -> u32 {
        vk::api_version_variant(self.0)
    }

    pub fn major(&self) -> u32 {
        vk::api_version_major(self.0)
    }
    pub fn minor(&self) -> u32 {
        vk::api_version_minor(self.0)
    }
    pub fn patch(&self) -> u32 {
        vk::api_version_patch(self.0)
    }

    /// Whether this version is `major.minor` or newer, ignoring patch.
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major(), self.minor()) >= (major, minor)
    }

    pub fn to_tuple(&self) -> (u32, u32, u32, u32) {
        (self.variant(), self.major(), self.minor(), self.patch())
    }

    pub fn from_tuple(tuple: (u32, u32, u32, u32)) -> Self {
        Self::new(tuple.0, tuple.1, tuple.2, tuple.3)
    }

    pub fn to_raw(&self) -> u32 {
        self.0
    }
}

/// Window-system surface extensions, enabled whenever the loader has them.
const PLATFORM_SURFACE_EXTENSIONS: [&CStr; 6] = [
    ash::khr::win32_surface::NAME,
    ash::khr::xlib_surface::NAME,
    ash::khr::xcb_surface::NAME,
    ash::khr::wayland_surface::NAME,
    ash::khr::android_surface::NAME,
    ash::ext::metal_surface::NAME,
];

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// The root Vulkan object.
///
/// Owns the `ash::Entry` loader, the `ash::Instance` handle, an optional
/// debug messenger, and optional surface extension state. Everything
/// derived from an instance holds an `Arc<Instance>` to keep it alive.
pub struct Instance {
    entry: ash::Entry,
    handle: ash::Instance,
    debug_messenger:
        Option<(vk::DebugUtilsMessengerEXT, ash::ext::debug_utils::Instance)>,
    surface_instance: Option<ash::khr::surface::Instance>,
    metal_surface_instance: Option<ash::ext::metal_surface::Instance>,
    ver: VkVersion,
}

impl Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("handle", &self.handle.handle())
            .field("ver", &self.ver.to_tuple())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum InstanceCreationError {
    #[error("Could not load Vulkan: {0}")]
    Loading(ash::LoadingError),
    #[error("Missing mandatory instance extensions: {0:?}")]
    MissingExtensions(Vec<String>),
    #[error("Unknown Vulkan Error {0}")]
    UnknownVulkan(vk::Result),
    #[error("Invalid application name was passed to Instance::new")]
    InvalidAppName,
}

impl From<vk::Result> for InstanceCreationError {
    fn from(value: vk::Result) -> Self {
        InstanceCreationError::UnknownVulkan(value)
    }
}

impl From<InstanceCreationError> for rgfx_core::Error {
    fn from(value: InstanceCreationError) -> Self {
        match value {
            InstanceCreationError::Loading(e) => {
                tracing::warn!("Vulkan loader unavailable: {e}");
                rgfx_core::Error::BackendNotLoaded(e.to_string())
            }
            InstanceCreationError::MissingExtensions(names) => {
                rgfx_core::Error::unsupported(format!(
                    "missing instance extensions {names:?}"
                ))
            }
            InstanceCreationError::UnknownVulkan(e) => {
                classify("vkCreateInstance", e)
            }
            InstanceCreationError::InvalidAppName => {
                rgfx_core::Error::invalid_argument(
                    "application name contains an interior NUL",
                )
            }
        }
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        tracing::debug!("Dropping instance {:?}", self.handle.handle());
        if let Some((debug_messenger, debug_utils_instance)) =
            self.debug_messenger.take()
        {
            //SAFETY: last use of this debug messenger. We made it from this
            //instance and debug_utils_instance is derived from this instance
            unsafe {
                debug_utils_instance
                    .destroy_debug_utils_messenger(debug_messenger, None)
            };
        }
        //SAFETY: We are in drop so this is the last use of instance. Every
        //derived object holds an Arc to us and is therefore gone
        unsafe { self.handle.destroy_instance(None) };
    }
}

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    //SAFETY: Vulkan guarantees p_callback_data and its message are valid
    //for the duration of the callback
    let message = unsafe { CStr::from_ptr((*p_callback_data).p_message) }
        .to_string_lossy();

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "GENERAL",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "VALIDATION",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "PERFORMANCE",
        _ => "UNKNOWN",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            tracing::trace!(target: "rgfx-vk-debug", "[{type_str}] {message}");
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            tracing::info!(target: "rgfx-vk-debug", "[{type_str}] {message}");
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            tracing::warn!(target: "rgfx-vk-debug", "[{type_str}] {message}");
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            tracing::error!(target: "rgfx-vk-debug", "[{type_str}] {message}");
        }
        _ => {
            tracing::debug!(target: "rgfx-vk-debug", "[{type_str}] {message}");
        }
    }

    vk::FALSE
}

fn has_extension(available: &[vk::ExtensionProperties], name: &CStr) -> bool {
    available
        .iter()
        .any(|ext| ext.extension_name_as_c_str() == Ok(name))
}

impl Instance {
    /// Load Vulkan and create an instance configured by `desc`.
    ///
    /// # Safety
    /// This loads the system Vulkan loader with libloading, which runs
    /// arbitrary initialisation code from that library.
    pub unsafe fn new(
        desc: &InstanceDescriptor<'_>,
    ) -> Result<Self, InstanceCreationError> {
        use InstanceCreationError as Error;

        let app_name = CString::new(desc.application_name.unwrap_or("rgfx"))
            .map_err(|_| Error::InvalidAppName)?;
        //SAFETY: The caller accepts the burden of loading the library. All
        //other Vulkan objects are dropped before Entry (see Drop)
        let entry = unsafe { ash::Entry::load() }.map_err(Error::Loading)?;

        // SAFETY: entry is a live Vulkan entry; vkEnumerateInstanceVersion
        // has no further preconditions.
        let api_version = unsafe { entry.try_enumerate_instance_version() }
            .unwrap_or(Some(vk::API_VERSION_1_0))
            .unwrap_or(vk::API_VERSION_1_0);

        // SAFETY: entry is live; None queries the implementation's own
        // extensions and dereferences no layer name.
        let instance_exts_avail =
            unsafe { entry.enumerate_instance_extension_properties(None) }?;
        // SAFETY: entry is live; no additional preconditions.
        let instance_layers_avail =
            unsafe { entry.enumerate_instance_layer_properties() };

        let mut enabled_exts: Vec<&CStr> = Vec::with_capacity(8);
        let mut create_flags = vk::InstanceCreateFlags::empty();

        let wants_surface = desc.wants(InstanceExtension::Surface);
        if wants_surface {
            if !has_extension(&instance_exts_avail, ash::khr::surface::NAME) {
                return Err(Error::MissingExtensions(vec![
                    ash::khr::surface::NAME.to_string_lossy().into_owned(),
                ]));
            }
            enabled_exts.push(ash::khr::surface::NAME);
            enabled_exts.extend(
                PLATFORM_SURFACE_EXTENSIONS
                    .into_iter()
                    .filter(|name| has_extension(&instance_exts_avail, name)),
            );
        }

        if has_extension(
            &instance_exts_avail,
            ash::khr::portability_enumeration::NAME,
        ) {
            enabled_exts.push(ash::khr::portability_enumeration::NAME);
            create_flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        let debug_utils_available =
            has_extension(&instance_exts_avail, ash::ext::debug_utils::NAME);
        let validation_layer_available = instance_layers_avail
            .as_ref()
            .map(|layers| {
                layers.iter().any(|layer| {
                    layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER)
                })
            })
            .unwrap_or(false);

        let mut enabled_layers: Vec<*const std::ffi::c_char> = Vec::new();
        let mut debug_messenger_create_info = if desc
            .wants(InstanceExtension::Debug)
            && debug_utils_available
            && validation_layer_available
        {
            enabled_exts.push(ash::ext::debug_utils::NAME);
            enabled_layers.push(VALIDATION_LAYER.as_ptr());
            let level = VulkanLogLevel::from_filter(LevelFilter::current());

            Some(
                vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(level.severity_flags())
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                    )
                    .pfn_user_callback(Some(vulkan_debug_callback)),
            )
        } else {
            if desc.wants(InstanceExtension::Debug) {
                tracing::warn!(
                    "Debug extension requested but VK_EXT_debug_utils or \
                     {VALIDATION_LAYER:?} is unavailable; continuing without \
                     validation"
                );
            }
            None
        };

        let enabled_ext_ptrs: Vec<_> =
            enabled_exts.iter().map(|ext| ext.as_ptr()).collect();

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(desc.application_version)
            .engine_name(c"rgfx")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(api_version);

        let mut instance_create_info = vk::InstanceCreateInfo::default()
            .flags(create_flags)
            .application_info(&app_info)
            .enabled_extension_names(&enabled_ext_ptrs)
            .enabled_layer_names(&enabled_layers);

        if let Some(ref mut debug_info) = debug_messenger_create_info {
            instance_create_info = instance_create_info.push_next(debug_info);
        }

        //SAFETY: instance_create_info and everything it points to is alive
        //for this call
        let instance =
            unsafe { entry.create_instance(&instance_create_info, None) }?;

        let debug_messenger = if let Some(mut debug_messenger_create_info) =
            debug_messenger_create_info
        {
            // The chained copy must not point back into the instance info.
            debug_messenger_create_info.p_next = std::ptr::null();
            let debug_utils_instance =
                ash::ext::debug_utils::Instance::new(&entry, &instance);
            //SAFETY: Valid create info, instance is live
            match unsafe {
                debug_utils_instance.create_debug_utils_messenger(
                    &debug_messenger_create_info,
                    None,
                )
            } {
                Ok(debug_messenger) => {
                    Some((debug_messenger, debug_utils_instance))
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to create debug messenger, continuing \
                         without one: {e}"
                    );
                    None
                }
            }
        } else {
            None
        };

        let surface_instance = wants_surface
            .then(|| ash::khr::surface::Instance::new(&entry, &instance));
        let metal_surface_instance = (wants_surface
            && enabled_exts.contains(&ash::ext::metal_surface::NAME))
        .then(|| ash::ext::metal_surface::Instance::new(&entry, &instance));

        tracing::info!(
            "Created Vulkan instance {:?} (api {}.{}, {} extensions, \
             validation {})",
            instance.handle(),
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
            enabled_exts.len(),
            if debug_messenger.is_some() { "on" } else { "off" },
        );

        Ok(Instance {
            entry,
            handle: instance,
            debug_messenger,
            surface_instance,
            metal_surface_instance,
            ver: VkVersion::from_raw(api_version),
        })
    }

    /// Named instance extensions the system loader can provide.
    ///
    /// # Safety
    /// Same contract as [`Instance::new`]: the Vulkan loader is loaded.
    pub unsafe fn available_extensions()
    -> Result<Vec<InstanceExtension>, InstanceCreationError> {
        //SAFETY: passed on to the caller
        let entry = unsafe { ash::Entry::load() }
            .map_err(InstanceCreationError::Loading)?;
        // SAFETY: entry is live.
        let exts = unsafe { entry.enumerate_instance_extension_properties(None) }?;
        let mut supported = Vec::with_capacity(2);
        if has_extension(&exts, ash::khr::surface::NAME)
            && PLATFORM_SURFACE_EXTENSIONS
                .iter()
                .any(|name| has_extension(&exts, name))
        {
            supported.push(InstanceExtension::Surface);
        }
        if has_extension(&exts, ash::ext::debug_utils::NAME) {
            supported.push(InstanceExtension::Debug);
        }
        Ok(supported)
    }

    /// Get a vector of handles to available physical devices. These handles
    /// are ONLY valid in the context of this instance.
    pub fn fetch_raw_physical_devices(
        &self,
    ) -> Result<Vec<vk::PhysicalDevice>, FetchPhysicalDeviceError> {
        //SAFETY: The instance is live; no other preconditions
        match unsafe { self.handle.enumerate_physical_devices() } {
            Ok(v) => Ok(v),
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
            | Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY) => {
                Err(FetchPhysicalDeviceError::MemoryExhaustion)
            }
            Err(e) => Err(FetchPhysicalDeviceError::UnknownVulkan(e)),
        }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    pub unsafe fn get_raw_physical_device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties {
        //SAFETY: physical_device was derived from this instance
        unsafe { self.handle.get_physical_device_properties(physical_device) }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    pub unsafe fn get_raw_physical_device_queue_family_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        //SAFETY: physical_device was derived from this instance
        unsafe {
            self.handle
                .get_physical_device_queue_family_properties(physical_device)
        }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    pub unsafe fn get_raw_physical_device_memory_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceMemoryProperties {
        // SAFETY: physical_device was derived from this instance.
        unsafe {
            self.handle
                .get_physical_device_memory_properties(physical_device)
        }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    pub unsafe fn get_raw_physical_device_features(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceFeatures {
        // SAFETY: physical_device was derived from this instance.
        unsafe { self.handle.get_physical_device_features(physical_device) }
    }

    /// Whether the device exposes timeline semaphores, which needs Vulkan
    /// 1.2 on both the instance and the device.
    ///
    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    pub unsafe fn get_raw_physical_device_timeline_support(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> bool {
        // SAFETY: physical_device was derived from this instance.
        let props =
            unsafe { self.get_raw_physical_device_properties(physical_device) };
        if !self.ver.at_least(1, 2)
            || !VkVersion::from_raw(props.api_version).at_least(1, 2)
        {
            return false;
        }
        let mut timeline = vk::PhysicalDeviceTimelineSemaphoreFeatures::default();
        let mut features =
            vk::PhysicalDeviceFeatures2::default().push_next(&mut timeline);
        // SAFETY: Instance is at least 1.2 so vkGetPhysicalDeviceFeatures2
        // is core; the pNext chain only holds `timeline`.
        unsafe {
            self.handle
                .get_physical_device_features2(physical_device, &mut features)
        };
        timeline.timeline_semaphore == vk::TRUE
    }

    /// Enumerate device extension properties for a physical device.
    ///
    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    pub unsafe fn enumerate_raw_device_extension_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::ExtensionProperties>, vk::Result> {
        //SAFETY: physical_device was derived from this instance
        unsafe {
            self.handle
                .enumerate_device_extension_properties(physical_device)
        }
    }

    /// Create a logical device from a physical device.
    ///
    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    /// `create_info` must be a valid DeviceCreateInfo whose pointers stay
    /// alive for the call.
    pub unsafe fn create_ash_device(
        &self,
        physical_device: vk::PhysicalDevice,
        create_info: &vk::DeviceCreateInfo<'_>,
    ) -> Result<ash::Device, vk::Result> {
        //SAFETY: physical_device was derived from this instance,
        //create_info is valid
        unsafe {
            self.handle
                .create_device(physical_device, create_info, None)
        }
    }

    /// The Vulkan API version negotiated at instance creation time.
    pub fn supported_ver(&self) -> VkVersion {
        self.ver
    }

    pub fn ash_instance(&self) -> &ash::Instance {
        &self.handle
    }
}

#[derive(Debug, Error)]
pub enum FetchPhysicalDeviceError {
    #[error("Error fetching physical devices, memory exhaustion")]
    MemoryExhaustion,
    #[error("Error fetching physical devices, Unknown vulkan: {0}")]
    UnknownVulkan(vk::Result),
}

impl From<FetchPhysicalDeviceError> for rgfx_core::Error {
    fn from(value: FetchPhysicalDeviceError) -> Self {
        match value {
            FetchPhysicalDeviceError::MemoryExhaustion => {
                rgfx_core::Error::OutOfMemory(value.to_string())
            }
            FetchPhysicalDeviceError::UnknownVulkan(e) => {
                classify("vkEnumeratePhysicalDevices", e)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SurfaceQueryError {
    #[error("Surface extension is not loaded")]
    ExtensionNotLoaded,
    #[error("Vulkan error querying surface: {0}")]
    Vulkan(vk::Result),
}

impl From<SurfaceQueryError> for rgfx_core::Error {
    fn from(value: SurfaceQueryError) -> Self {
        match value {
            SurfaceQueryError::ExtensionNotLoaded => {
                rgfx_core::Error::unsupported(
                    "instance was created without the surface extension",
                )
            }
            SurfaceQueryError::Vulkan(e) => classify("surface query", e),
        }
    }
}

#[derive(Debug, Error)]
pub enum CreateSurfaceError {
    #[error("Surface extension is not loaded")]
    MissingExtension,
    #[error("{0:?} windows cannot host a Vulkan surface")]
    UnsupportedPlatform(rgfx_core::descriptor::WindowingSystem),
    #[error("Invalid window handle: {0}")]
    InvalidHandle(rgfx_core::Error),
    #[error("Vulkan error creating surface: {0}")]
    VulkanError(vk::Result),
}

impl From<CreateSurfaceError> for rgfx_core::Error {
    fn from(value: CreateSurfaceError) -> Self {
        match value {
            CreateSurfaceError::InvalidHandle(e) => e,
            CreateSurfaceError::VulkanError(e) => {
                classify("vkCreateSurfaceKHR", e)
            }
            other => rgfx_core::Error::unsupported(other.to_string()),
        }
    }
}

// Surface functionality
impl Instance {
    /// # Safety
    /// `physical_device` and `surface` must be derived from this instance.
    pub unsafe fn get_raw_physical_device_surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> Result<bool, SurfaceQueryError> {
        let surface_instance = self
            .surface_instance
            .as_ref()
            .ok_or(SurfaceQueryError::ExtensionNotLoaded)?;
        //SAFETY: physical_device and surface were derived from this instance
        unsafe {
            surface_instance.get_physical_device_surface_support(
                physical_device,
                queue_family_index,
                surface,
            )
        }
        .map_err(SurfaceQueryError::Vulkan)
    }

    /// # Safety
    /// `physical_device` and `surface` must be derived from this instance.
    pub unsafe fn get_surface_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<vk::SurfaceCapabilitiesKHR, SurfaceQueryError> {
        let surface_instance = self
            .surface_instance
            .as_ref()
            .ok_or(SurfaceQueryError::ExtensionNotLoaded)?;
        // SAFETY: Caller guarantees physical_device and surface provenance.
        unsafe {
            surface_instance
                .get_physical_device_surface_capabilities(physical_device, surface)
        }
        .map_err(SurfaceQueryError::Vulkan)
    }

    /// # Safety
    /// `physical_device` and `surface` must be derived from this instance.
    pub unsafe fn get_surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, SurfaceQueryError> {
        let surface_instance = self
            .surface_instance
            .as_ref()
            .ok_or(SurfaceQueryError::ExtensionNotLoaded)?;
        // SAFETY: Caller guarantees physical_device and surface provenance.
        unsafe {
            surface_instance
                .get_physical_device_surface_formats(physical_device, surface)
        }
        .map_err(SurfaceQueryError::Vulkan)
    }

    /// # Safety
    /// `physical_device` and `surface` must be derived from this instance.
    pub unsafe fn get_surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::PresentModeKHR>, SurfaceQueryError> {
        let surface_instance = self
            .surface_instance
            .as_ref()
            .ok_or(SurfaceQueryError::ExtensionNotLoaded)?;
        // SAFETY: Caller guarantees physical_device and surface provenance.
        unsafe {
            surface_instance.get_physical_device_surface_present_modes(
                physical_device,
                surface,
            )
        }
        .map_err(SurfaceQueryError::Vulkan)
    }

    /// Create a raw VkSurfaceKHR for a platform window.
    ///
    /// # Safety
    /// The native window behind `window` must outlive the returned surface,
    /// and the surface must be destroyed with
    /// [`Instance::destroy_raw_surface`] on this instance.
    pub unsafe fn create_raw_surface(
        &self,
        window: &PlatformWindowHandle,
    ) -> Result<vk::SurfaceKHR, CreateSurfaceError> {
        if self.surface_instance.is_none() {
            return Err(CreateSurfaceError::MissingExtension);
        }
        match window {
            PlatformWindowHandle::Metal { layer } => {
                let metal = self
                    .metal_surface_instance
                    .as_ref()
                    .ok_or(CreateSurfaceError::MissingExtension)?;
                let create_info = vk::MetalSurfaceCreateInfoEXT::default()
                    .layer(layer.cast_const().cast());
                // SAFETY: the caller guarantees the layer outlives the
                // surface.
                unsafe { metal.create_metal_surface(&create_info, None) }
                    .map_err(CreateSurfaceError::VulkanError)
            }
            PlatformWindowHandle::Emscripten { .. } => Err(
                CreateSurfaceError::UnsupportedPlatform(window.windowing_system()),
            ),
            _ => {
                let (display, window) = window
                    .to_raw_handles()
                    .map_err(CreateSurfaceError::InvalidHandle)?;
                // SAFETY: the caller guarantees the native window and
                // display outlive the surface; the matching platform
                // extension was enabled when the loader offered it.
                unsafe {
                    ash_window::create_surface(
                        &self.entry,
                        &self.handle,
                        display,
                        window,
                        None,
                    )
                }
                .map_err(CreateSurfaceError::VulkanError)
            }
        }
    }

    /// Destroy the raw VkSurfaceKHR.
    ///
    /// # Safety
    /// Every swapchain created on `surf` must be destroyed first, and no
    /// in-flight GPU work may still reference it. `surf` must be derived
    /// from this instance.
    pub unsafe fn destroy_raw_surface(&self, surf: vk::SurfaceKHR) {
        if let Some(ref surface_instance) = self.surface_instance {
            // SAFETY: surf is derived from this instance (passed on to
            // caller)
            unsafe { surface_instance.destroy_surface(surf, None) };
        }
    }
}

// Device extension loader creation functionality
impl Instance {
    pub fn create_swapchain_loader(
        &self,
        device: &ash::Device,
    ) -> ash::khr::swapchain::Device {
        ash::khr::swapchain::Device::new(&self.handle, device)
    }

    pub fn create_debug_utils_device_loader(
        &self,
        device: &ash::Device,
    ) -> Option<ash::ext::debug_utils::Device> {
        if self.debug_messenger.is_some() {
            Some(ash::ext::debug_utils::Device::new(&self.handle, device))
        } else {
            None
        }
    }
}

/// The explicit backend's instance.
#[derive(Debug, Clone)]
pub struct VulkanInstance {
    raw: Arc<Instance>,
}

impl VulkanInstance {
    pub fn new(desc: &InstanceDescriptor<'_>) -> rgfx_core::Result<Self> {
        // SAFETY: loading the system Vulkan loader is inherent to this
        // backend; its initialisation code is trusted like any driver.
        let raw = unsafe { Instance::new(desc) }?;
        Ok(Self { raw: Arc::new(raw) })
    }

    /// Instance extensions the system loader supports.
    pub fn enumerate_extensions() -> rgfx_core::Result<Vec<InstanceExtension>>
    {
        // SAFETY: see VulkanInstance::new.
        Ok(unsafe { Instance::available_extensions() }?)
    }

    pub fn raw(&self) -> &Arc<Instance> {
        &self.raw
    }
}

impl InstanceBackend for VulkanInstance {
    type Adapter = VulkanAdapter;

    fn kind(&self) -> BackendKind {
        BackendKind::Vulkan
    }

    fn enumerate_adapters(&self) -> rgfx_core::Result<Vec<VulkanAdapter>> {
        let physical_devices = self.raw.fetch_raw_physical_devices()?;
        Ok(physical_devices
            .into_iter()
            .map(|pd| VulkanAdapter::new(&self.raw, pd))
            .collect())
    }

    fn request_adapter(
        &self,
        desc: &AdapterDescriptor,
    ) -> rgfx_core::Result<VulkanAdapter> {
        let mut adapters = self.enumerate_adapters()?;
        if adapters.is_empty() {
            return Err(rgfx_core::Error::NotFound(
                "no Vulkan physical devices".into(),
            ));
        }
        let index = match desc.adapter_index {
            Some(index) if index as usize >= adapters.len() => {
                return Err(rgfx_core::Error::NotFound(format!(
                    "adapter index {index} out of range for {} adapters",
                    adapters.len()
                )));
            }
            Some(index) => index as usize,
            None => rgfx_core::descriptor::select_adapter(
                adapters.iter().map(|a| a.adapter_type()),
                desc.preference,
            )
            .unwrap_or(0),
        };
        let adapter = adapters.swap_remove(index);
        tracing::info!(
            "Selected physical device: {:?} (type: {:?})",
            adapter.name(),
            adapter.adapter_type(),
        );
        Ok(adapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vk_version_tuple_roundtrip() {
        let version = VkVersion::new(0, 1, 2, 3);
        let rebuilt = VkVersion::from_tuple(version.to_tuple());
        assert_eq!(version.to_raw(), rebuilt.to_raw());
    }

    #[test]
    fn vk_version_raw_fields() {
        let raw = vk::make_api_version(0, 1, 3, 275);
        let version = VkVersion::from_raw(raw);

        assert_eq!(version.to_raw(), raw);
        assert_eq!(version.major(), 1);
        assert_eq!(version.minor(), 3);
        assert_eq!(version.patch(), 275);
        assert!(version.at_least(1, 2));
        assert!(version.at_least(1, 3));
        assert!(!version.at_least(1, 4));
    }

    #[test]
    fn debug_level_follows_tracing_filter() {
        assert_eq!(
            VulkanLogLevel::from_filter(LevelFilter::TRACE),
            VulkanLogLevel::Verbose
        );
        assert_eq!(
            VulkanLogLevel::from_filter(LevelFilter::DEBUG),
            VulkanLogLevel::Info
        );
        assert_eq!(
            VulkanLogLevel::from_filter(LevelFilter::WARN),
            VulkanLogLevel::Warning
        );
        assert_eq!(
            VulkanLogLevel::from_filter(LevelFilter::OFF),
            VulkanLogLevel::Error
        );
    }

    #[test]
    fn severity_flags_include_everything_more_severe() {
        let flags = VulkanLogLevel::Warning.severity_flags();
        assert!(flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR));
        assert!(!flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO));
        assert!(
            VulkanLogLevel::Verbose
                .severity_flags()
                .contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE)
        );
    }
}
