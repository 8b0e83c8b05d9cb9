use std::sync::Arc;

use ash::vk;
use rgfx_core::backend::SurfaceBackend;
use rgfx_core::descriptor::SurfaceDescriptor;
use rgfx_core::{PresentMode, TextureFormat};

use crate::conv;
use crate::instance::Instance;

struct RawSurface {
    instance: Arc<Instance>,
    handle: vk::SurfaceKHR,
}

impl Drop for RawSurface {
    fn drop(&mut self) {
        tracing::debug!("Dropping surface {:?}", self.handle);
        // SAFETY: Swapchains hold a clone of this Arc, so the last one is
        // already gone when the surface drops.
        unsafe { self.instance.destroy_raw_surface(self.handle) };
    }
}

/// A presentable window surface, created from a device.
///
/// Cloning shares the native surface; it is destroyed when the last clone
/// and the last swapchain built on it are dropped.
#[derive(Clone)]
pub struct VulkanSurface {
    raw: Arc<RawSurface>,
    physical_device: vk::PhysicalDevice,
}

impl std::fmt::Debug for VulkanSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanSurface")
            .field("handle", &self.raw.handle)
            .finish_non_exhaustive()
    }
}

impl VulkanSurface {
    /// # Safety
    /// The window behind `desc.window_handle` must outlive the surface, and
    /// `physical_device` must derive from `instance`.
    pub unsafe fn new(
        instance: &Arc<Instance>,
        physical_device: vk::PhysicalDevice,
        desc: &SurfaceDescriptor<'_>,
    ) -> rgfx_core::Result<Self> {
        // SAFETY: Forwarded from the caller.
        let handle = unsafe { instance.create_raw_surface(&desc.window_handle) }?;
        tracing::debug!(
            "Created {:?} surface {:?} ({:?})",
            desc.window_handle.windowing_system(),
            handle,
            desc.label
        );
        Ok(Self {
            raw: Arc::new(RawSurface {
                instance: Arc::clone(instance),
                handle,
            }),
            physical_device,
        })
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.raw.instance
    }

    pub fn raw(&self) -> vk::SurfaceKHR {
        self.raw.handle
    }

    pub fn capabilities(&self) -> rgfx_core::Result<vk::SurfaceCapabilitiesKHR> {
        // SAFETY: physical_device and the surface share an instance.
        let caps = unsafe {
            self.raw
                .instance
                .get_surface_capabilities(self.physical_device, self.raw.handle)
        }?;
        Ok(caps)
    }

    pub fn raw_formats(&self) -> rgfx_core::Result<Vec<vk::SurfaceFormatKHR>> {
        // SAFETY: physical_device and the surface share an instance.
        let formats = unsafe {
            self.raw
                .instance
                .get_surface_formats(self.physical_device, self.raw.handle)
        }?;
        Ok(formats)
    }

    pub fn raw_present_modes(
        &self,
    ) -> rgfx_core::Result<Vec<vk::PresentModeKHR>> {
        // SAFETY: physical_device and the surface share an instance.
        let modes = unsafe {
            self.raw
                .instance
                .get_surface_present_modes(self.physical_device, self.raw.handle)
        }?;
        Ok(modes)
    }
}

impl SurfaceBackend for VulkanSurface {
    fn supported_formats(&self) -> rgfx_core::Result<Vec<TextureFormat>> {
        let mut formats: Vec<TextureFormat> = self
            .raw_formats()?
            .iter()
            .map(|f| conv::texture_format_from_vk(f.format))
            .filter(|f| *f != TextureFormat::Undefined)
            .collect();
        formats.dedup();
        Ok(formats)
    }

    fn supported_present_modes(&self) -> rgfx_core::Result<Vec<PresentMode>> {
        Ok(self
            .raw_present_modes()?
            .into_iter()
            .filter_map(conv::present_mode_from_vk)
            .collect())
    }
}
