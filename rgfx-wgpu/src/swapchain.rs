//! Surface configuration, acquisition and presentation.
//!
//! wgpu hands out one `SurfaceTexture` per frame and never exposes the
//! image ring behind it. The device therefore wraps the swapchain in a
//! single non-owning [`Texture`] and view whose native objects are bound at
//! acquire and released at present. Image indices are a rotating counter
//! over the negotiated image count; every index resolves to the same view.
//!
//! [`Texture`]: crate::texture::Texture

use std::sync::Mutex;

use rgfx_core::descriptor::{SwapchainDescriptor, SwapchainInfo, clamp_image_count};
use rgfx_core::{PresentMode, TextureHandle, TextureViewHandle};

use crate::conv;
use crate::error::{scoped, surface_error};
use crate::surface::WgpuSurface;

/// Image counts the frame latency setting can express.
pub const MIN_IMAGE_COUNT: u32 = 2;
pub const MAX_IMAGE_COUNT: u32 = 4;

/// The requested format when the surface offers it, else the first one.
pub fn choose_surface_format(
    formats: &[wgpu::TextureFormat],
    requested: Option<wgpu::TextureFormat>,
) -> Option<wgpu::TextureFormat> {
    requested
        .filter(|f| formats.contains(f))
        .or_else(|| formats.first().copied())
}

/// The requested mode when supported, else FIFO, which every surface
/// supports.
pub fn choose_present_mode(
    modes: &[wgpu::PresentMode],
    requested: wgpu::PresentMode,
) -> wgpu::PresentMode {
    if modes.contains(&requested) {
        requested
    } else {
        wgpu::PresentMode::Fifo
    }
}

/// wgpu surfaces have no fixed extent; the request is clamped to what a
/// 2D texture may be.
pub fn choose_extent(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    (width.clamp(1, max_dimension), height.clamp(1, max_dimension))
}

fn choose_alpha_mode(modes: &[wgpu::CompositeAlphaMode]) -> wgpu::CompositeAlphaMode {
    [
        wgpu::CompositeAlphaMode::Opaque,
        wgpu::CompositeAlphaMode::PreMultiplied,
        wgpu::CompositeAlphaMode::PostMultiplied,
    ]
    .into_iter()
    .find(|mode| modes.contains(mode))
    .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

#[derive(Debug, Default)]
struct Frame {
    surface_texture: Option<wgpu::SurfaceTexture>,
    index: Option<u32>,
    next: u32,
}

pub struct Swapchain {
    surface: WgpuSurface,
    config: wgpu::SurfaceConfiguration,
    info: SwapchainInfo,
    texture: Option<TextureHandle>,
    view: Option<TextureViewHandle>,
    frame: Mutex<Frame>,
}

impl std::fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swapchain")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl Swapchain {
    /// Negotiate and configure the surface. The caller wraps the image in a
    /// texture and view and hands the handles back through
    /// [`Swapchain::attach_image`].
    pub fn new(
        device: &wgpu::Device,
        surface: &WgpuSurface,
        desc: &SwapchainDescriptor<'_>,
    ) -> rgfx_core::Result<Self> {
        let capabilities = surface.capabilities();
        let format = choose_surface_format(
            &capabilities.formats,
            conv::texture_format(desc.format),
        )
        .ok_or_else(|| {
            rgfx_core::Error::unsupported("surface reports no supported formats")
        })?;
        let usage = conv::texture_usage(desc.usage);
        if !capabilities.usages.contains(usage) {
            return Err(rgfx_core::Error::unsupported(format!(
                "surface does not support usage {:?}",
                desc.usage
            )));
        }
        let present_mode = choose_present_mode(
            &capabilities.present_modes,
            conv::present_mode(desc.present_mode),
        );
        let (width, height) = choose_extent(
            desc.width,
            desc.height,
            device.limits().max_texture_dimension_2d,
        );
        let image_count =
            clamp_image_count(desc.image_count, MIN_IMAGE_COUNT, MAX_IMAGE_COUNT);

        let config = wgpu::SurfaceConfiguration {
            usage,
            format,
            width,
            height,
            present_mode,
            desired_maximum_frame_latency: image_count - 1,
            alpha_mode: choose_alpha_mode(&capabilities.alpha_modes),
            view_formats: Vec::new(),
        };
        scoped(device, "configure_surface", || {
            surface.raw().configure(device, &config)
        })?;

        let info = SwapchainInfo {
            width,
            height,
            format: conv::texture_format_from_wgpu(format),
            image_count,
            present_mode: conv::present_mode_from_wgpu(present_mode)
                .unwrap_or(PresentMode::Fifo),
        };
        if info.format != desc.format {
            tracing::info!(
                "Surface does not offer {:?}, using {:?}",
                desc.format,
                info.format
            );
        }
        tracing::debug!("Configured swapchain {:?}: {:?}", desc.label, info);

        Ok(Self {
            surface: surface.clone(),
            config,
            info,
            texture: None,
            view: None,
            frame: Mutex::new(Frame::default()),
        })
    }

    pub fn attach_image(&mut self, texture: TextureHandle, view: TextureViewHandle) {
        self.texture = Some(texture);
        self.view = Some(view);
    }

    pub fn info(&self) -> SwapchainInfo {
        self.info
    }

    pub fn config(&self) -> &wgpu::SurfaceConfiguration {
        &self.config
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub fn image_view(&self) -> Option<TextureViewHandle> {
        self.view
    }

    pub fn view(&self, index: u32) -> rgfx_core::Result<TextureViewHandle> {
        if index >= self.info.image_count {
            return Err(rgfx_core::Error::invalid_argument(format!(
                "swapchain image {index} out of range for {} images",
                self.info.image_count
            )));
        }
        self.view.ok_or_else(|| {
            rgfx_core::Error::invalid_state("swapchain image is not attached")
        })
    }

    pub fn current_index(&self) -> Option<u32> {
        self.frame.lock().expect("swapchain lock poisoned").index
    }

    /// Take the next surface texture. Returns its index and the native
    /// texture for the caller to bind.
    pub fn acquire(&self) -> rgfx_core::Result<(u32, wgpu::Texture)> {
        let mut frame = self.frame.lock().expect("swapchain lock poisoned");
        if frame.surface_texture.is_some() {
            return Err(rgfx_core::Error::invalid_state(
                "a swapchain image is already acquired",
            ));
        }
        let surface_texture = self
            .surface
            .raw()
            .get_current_texture()
            .map_err(surface_error)?;
        if surface_texture.suboptimal {
            tracing::debug!("Swapchain is suboptimal for its surface");
        }
        let index = frame.next;
        frame.next = (index + 1) % self.info.image_count;
        frame.index = Some(index);
        let texture = surface_texture.texture.clone();
        frame.surface_texture = Some(surface_texture);
        Ok((index, texture))
    }

    /// Present the acquired image.
    pub fn present(&self) -> rgfx_core::Result<()> {
        let mut frame = self.frame.lock().expect("swapchain lock poisoned");
        let surface_texture = frame.surface_texture.take().ok_or_else(|| {
            rgfx_core::Error::invalid_state("no swapchain image is acquired")
        })?;
        frame.index = None;
        surface_texture.present();
        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        tracing::debug!("Dropping swapchain {:?}", self.info);
        let frame = self.frame.get_mut().map(|f| f.surface_texture.take());
        if let Ok(Some(_)) = frame {
            tracing::warn!("Swapchain dropped with an unpresented image");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_format_wins_when_offered() {
        let formats = [
            wgpu::TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Bgra8UnormSrgb,
        ];
        assert_eq!(
            choose_surface_format(
                &formats,
                Some(wgpu::TextureFormat::Bgra8UnormSrgb)
            ),
            Some(wgpu::TextureFormat::Bgra8UnormSrgb)
        );
        assert_eq!(
            choose_surface_format(&formats, Some(wgpu::TextureFormat::Rgba16Float)),
            Some(wgpu::TextureFormat::Bgra8Unorm)
        );
        assert_eq!(
            choose_surface_format(&formats, None),
            Some(wgpu::TextureFormat::Bgra8Unorm)
        );
        assert!(choose_surface_format(&[], None).is_none());
    }

    #[test]
    fn unsupported_present_mode_falls_back_to_fifo() {
        let modes = [wgpu::PresentMode::Fifo, wgpu::PresentMode::Mailbox];
        assert_eq!(
            choose_present_mode(&modes, wgpu::PresentMode::Mailbox),
            wgpu::PresentMode::Mailbox
        );
        assert_eq!(
            choose_present_mode(&modes, wgpu::PresentMode::Immediate),
            wgpu::PresentMode::Fifo
        );
    }

    #[test]
    fn extent_is_clamped_to_texture_limits() {
        assert_eq!(choose_extent(800, 600, 8192), (800, 600));
        assert_eq!(choose_extent(0, 10_000, 8192), (1, 8192));
    }

    #[test]
    fn image_count_fits_frame_latency() {
        assert_eq!(clamp_image_count(0, MIN_IMAGE_COUNT, MAX_IMAGE_COUNT), 2);
        assert_eq!(clamp_image_count(3, MIN_IMAGE_COUNT, MAX_IMAGE_COUNT), 3);
        assert_eq!(clamp_image_count(8, MIN_IMAGE_COUNT, MAX_IMAGE_COUNT), 4);
    }

    #[test]
    fn alpha_mode_prefers_opaque() {
        assert_eq!(
            choose_alpha_mode(&[
                wgpu::CompositeAlphaMode::PreMultiplied,
                wgpu::CompositeAlphaMode::Opaque
            ]),
            wgpu::CompositeAlphaMode::Opaque
        );
        assert_eq!(
            choose_alpha_mode(&[wgpu::CompositeAlphaMode::Inherit]),
            wgpu::CompositeAlphaMode::Auto
        );
    }
}
