use std::sync::Arc;

use rgfx_core::backend::SurfaceBackend;
use rgfx_core::descriptor::{PlatformWindowHandle, SurfaceDescriptor};
use rgfx_core::{PresentMode, TextureFormat};
use thiserror::Error;

use crate::conv;

#[derive(Debug, Error)]
pub enum CreateSurfaceError {
    #[error("{0:?} windows cannot be bound by the wgpu backend")]
    UnsupportedWindow(rgfx_core::descriptor::WindowingSystem),

    #[error("wgpu error creating surface: {0}")]
    Wgpu(#[from] wgpu::CreateSurfaceError),
}

impl From<CreateSurfaceError> for rgfx_core::Error {
    fn from(value: CreateSurfaceError) -> Self {
        match value {
            CreateSurfaceError::UnsupportedWindow(_) => {
                rgfx_core::Error::unsupported(value.to_string())
            }
            CreateSurfaceError::Wgpu(e) => {
                tracing::error!("create_surface failed: {e}");
                rgfx_core::Error::backend(e)
            }
        }
    }
}

/// A presentable window surface, created from a device.
///
/// Cloning shares the native surface. The adapter is kept so capability
/// queries need no device round trip.
#[derive(Clone)]
pub struct WgpuSurface {
    raw: Arc<wgpu::Surface<'static>>,
    adapter: wgpu::Adapter,
}

impl std::fmt::Debug for WgpuSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuSurface").finish_non_exhaustive()
    }
}

impl WgpuSurface {
    /// # Safety
    /// The window behind `desc.window_handle` must outlive the surface.
    pub unsafe fn new(
        instance: &wgpu::Instance,
        adapter: &wgpu::Adapter,
        desc: &SurfaceDescriptor<'_>,
    ) -> rgfx_core::Result<Self> {
        let system = desc.window_handle.windowing_system();
        if matches!(
            desc.window_handle,
            PlatformWindowHandle::Metal { .. }
                | PlatformWindowHandle::Emscripten { .. }
        ) {
            return Err(CreateSurfaceError::UnsupportedWindow(system).into());
        }
        let (raw_display_handle, raw_window_handle) =
            desc.window_handle.to_raw_handles()?;

        // SAFETY: The handles were validated non-null by `to_raw_handles`
        // and the caller keeps the window alive.
        let raw = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle,
                raw_window_handle,
            })
        }
        .map_err(CreateSurfaceError::from)?;
        tracing::debug!("Created {system:?} surface ({:?})", desc.label);
        Ok(Self {
            raw: Arc::new(raw),
            adapter: adapter.clone(),
        })
    }

    pub fn raw(&self) -> &wgpu::Surface<'static> {
        &self.raw
    }

    pub fn capabilities(&self) -> wgpu::SurfaceCapabilities {
        self.raw.get_capabilities(&self.adapter)
    }

    pub fn is_supported_by(&self, adapter: &wgpu::Adapter) -> bool {
        !self.raw.get_capabilities(adapter).formats.is_empty()
    }
}

impl SurfaceBackend for WgpuSurface {
    fn supported_formats(&self) -> rgfx_core::Result<Vec<TextureFormat>> {
        let mut formats: Vec<TextureFormat> = self
            .capabilities()
            .formats
            .into_iter()
            .map(conv::texture_format_from_wgpu)
            .filter(|f| *f != TextureFormat::Undefined)
            .collect();
        formats.dedup();
        Ok(formats)
    }

    fn supported_present_modes(&self) -> rgfx_core::Result<Vec<PresentMode>> {
        Ok(self
            .capabilities()
            .present_modes
            .into_iter()
            .filter_map(conv::present_mode_from_wgpu)
            .collect())
    }
}
