use rgfx_core::backend::SurfaceBackend;
use rgfx_core::{BackendKind, PresentMode, Result, TextureFormat};

backend_enum! {
    #[derive(Debug, Clone)]
    pub(crate) enum SurfaceInner {
        rgfx_vk::VulkanSurface,
        rgfx_wgpu::WgpuSurface,
    }
}

/// A platform window bound for presentation. Created by
/// [`Device::create_surface`](crate::Device::create_surface); the native
/// surface is destroyed when the last clone and every swapchain built on
/// it are gone.
#[derive(Debug, Clone)]
pub struct Surface {
    inner: SurfaceInner,
}

impl Surface {
    pub(crate) fn from_inner(inner: SurfaceInner) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &SurfaceInner {
        &self.inner
    }

    pub fn backend(&self) -> BackendKind {
        self.inner.backend()
    }

    pub fn supported_formats(&self) -> Result<Vec<TextureFormat>> {
        dispatch!(&self.inner, SurfaceInner, s => s.supported_formats())
    }

    pub fn supported_present_modes(&self) -> Result<Vec<PresentMode>> {
        dispatch!(&self.inner, SurfaceInner, s => s.supported_present_modes())
    }
}
