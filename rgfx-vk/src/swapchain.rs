//! Swapchain negotiation, acquisition and presentation.
//!
//! The device wraps each swapchain image in a non-owning [`Texture`] and a
//! default view, both stored in the hub like any other entity. The
//! swapchain remembers their handles and which image is currently
//! acquired.
//!
//! [`Texture`]: crate::texture::Texture

use std::sync::{Arc, Mutex};

use ash::vk;
use rgfx_core::descriptor::{SwapchainDescriptor, SwapchainInfo, clamp_image_count};
use rgfx_core::{PresentMode, TextureHandle, TextureViewHandle};

use crate::conv;
use crate::error::classify;
use crate::raw::RawDevice;
use crate::surface::VulkanSurface;

/// The requested format when the surface offers it, else the first one.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    requested: vk::Format,
) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| f.format == requested)
        .or_else(|| formats.first().copied())
}

/// The requested mode when supported, else FIFO, which every surface
/// supports.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    requested: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if modes.contains(&requested) {
        requested
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

fn choose_composite_alpha(
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|mode| capabilities.supported_composite_alpha.contains(*mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::INHERIT)
}

pub struct Swapchain {
    parent: Arc<RawDevice>,
    _surface: VulkanSurface,
    handle: vk::SwapchainKHR,
    info: SwapchainInfo,
    textures: Vec<TextureHandle>,
    views: Vec<TextureViewHandle>,
    /// Index of the acquired image. Also serialises acquisition, which
    /// Vulkan requires to be externally synchronised.
    current: Mutex<Option<u32>>,
}

impl std::fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swapchain")
            .field("handle", &self.handle)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl Swapchain {
    /// Create the native swapchain. Returns it with its images; the caller
    /// wraps those and hands the handles back through
    /// [`Swapchain::attach_images`].
    pub fn new(
        device: &Arc<RawDevice>,
        surface: &VulkanSurface,
        desc: &SwapchainDescriptor<'_>,
    ) -> rgfx_core::Result<(Self, Vec<vk::Image>)> {
        if !device.has_swapchain_support() {
            return Err(rgfx_core::Error::unsupported(
                "device was created without the swapchain extension",
            ));
        }
        if !Arc::ptr_eq(surface.instance(), device.parent()) {
            return Err(rgfx_core::Error::invalid_argument(
                "surface belongs to a different instance",
            ));
        }

        let capabilities = surface.capabilities()?;
        let formats = surface.raw_formats()?;
        let modes = surface.raw_present_modes()?;
        let surface_format =
            choose_surface_format(&formats, conv::texture_format(desc.format))
                .ok_or_else(|| {
                    rgfx_core::Error::unsupported(
                        "surface reports no supported formats",
                    )
                })?;
        let present_mode =
            choose_present_mode(&modes, conv::present_mode(desc.present_mode));
        let extent = choose_extent(&capabilities, desc.width, desc.height);
        let image_count = clamp_image_count(
            desc.image_count,
            capabilities.min_image_count,
            capabilities.max_image_count,
        );
        let format = conv::texture_format_from_vk(surface_format.format);
        if surface_format.format != conv::texture_format(desc.format) {
            tracing::info!(
                "Surface does not offer {:?}, using {:?}",
                desc.format,
                format
            );
        }

        let queue_family_indices = [device.queue_family_index()];
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.raw())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(conv::texture_usage(desc.usage, format))
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(&queue_family_indices)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(choose_composite_alpha(&capabilities))
            .present_mode(present_mode)
            .clipped(true);

        // SAFETY: create_info references the surface and values negotiated
        // from its reported capabilities.
        let handle = unsafe { device.create_raw_swapchain(&create_info) }?;
        // SAFETY: handle was just created from device.
        unsafe { device.label_object(handle, "swapchain", desc.label) };

        // SAFETY: handle is a live swapchain of device.
        let images = match unsafe { device.get_raw_swapchain_images(handle) } {
            Ok(images) => images,
            Err(e) => {
                // SAFETY: handle is unused.
                unsafe { device.destroy_raw_swapchain(handle) };
                return Err(e.into());
            }
        };

        let info = SwapchainInfo {
            width: extent.width,
            height: extent.height,
            format,
            image_count: images.len() as u32,
            present_mode: conv::present_mode_from_vk(present_mode)
                .unwrap_or(PresentMode::Fifo),
        };
        tracing::debug!("Created swapchain {:?}: {:?}", handle, info);

        Ok((
            Self {
                parent: Arc::clone(device),
                _surface: surface.clone(),
                handle,
                info,
                textures: Vec::new(),
                views: Vec::new(),
                current: Mutex::new(None),
            },
            images,
        ))
    }

    pub fn attach_images(
        &mut self,
        textures: Vec<TextureHandle>,
        views: Vec<TextureViewHandle>,
    ) {
        self.textures = textures;
        self.views = views;
    }

    pub fn info(&self) -> SwapchainInfo {
        self.info
    }

    pub fn textures(&self) -> &[TextureHandle] {
        &self.textures
    }

    pub fn views(&self) -> &[TextureViewHandle] {
        &self.views
    }

    pub fn view(&self, index: u32) -> rgfx_core::Result<TextureViewHandle> {
        self.views.get(index as usize).copied().ok_or_else(|| {
            rgfx_core::Error::invalid_argument(format!(
                "swapchain image {index} out of range for {} images",
                self.views.len()
            ))
        })
    }

    pub fn current_index(&self) -> Option<u32> {
        *self.current.lock().expect("swapchain lock poisoned")
    }

    /// Acquire the next image, signalling `semaphore` and `fence` (either
    /// may be null) when it is ready for use.
    ///
    /// # Safety
    /// `semaphore` and `fence`, when not null, must be unsignaled handles of
    /// the parent device with no pending signal operation.
    pub unsafe fn acquire(
        &self,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> rgfx_core::Result<u32> {
        let mut current = self.current.lock().expect("swapchain lock poisoned");
        // SAFETY: The lock serialises acquisition on this swapchain; the
        // caller vouches for the sync objects.
        let acquired = unsafe {
            self.parent.acquire_next_swapchain_image(
                self.handle,
                timeout_ns,
                semaphore,
                fence,
            )
        };
        match acquired {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    tracing::debug!(
                        "Swapchain {:?} is suboptimal for its surface",
                        self.handle
                    );
                }
                *current = Some(index);
                Ok(index)
            }
            Err(e) => Err(classify("vkAcquireNextImageKHR", e)),
        }
    }

    /// Present the acquired image after `wait_semaphores`.
    ///
    /// # Safety
    /// The semaphores must be binary semaphores of the parent device with a
    /// pending signal, and the image must be in `PRESENT_SRC_KHR`.
    pub unsafe fn present(
        &self,
        wait_semaphores: &[vk::Semaphore],
    ) -> rgfx_core::Result<()> {
        let mut current = self.current.lock().expect("swapchain lock poisoned");
        let index = current.take().ok_or_else(|| {
            rgfx_core::Error::invalid_state("no swapchain image is acquired")
        })?;
        let swapchains = [self.handle];
        let indices = [index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);
        // SAFETY: Caller guarantees the semaphores and image layout; the
        // arrays outlive the call.
        match unsafe { self.parent.queue_present(&present_info) } {
            Ok(suboptimal) => {
                if suboptimal {
                    tracing::debug!(
                        "Presented to suboptimal swapchain {:?}",
                        self.handle
                    );
                }
                Ok(())
            }
            Err(e) => Err(classify("vkQueuePresentKHR", e)),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        tracing::debug!("Dropping swapchain {:?}", self.handle);
        // SAFETY: The device removed this swapchain's image views before
        // dropping it; presentation work is retired by the queue wait the
        // device performs on swapchain destruction.
        unsafe { self.parent.destroy_raw_swapchain(self.handle) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn requested_format_wins_when_offered() {
        let formats = [
            format(vk::Format::B8G8R8A8_UNORM),
            format(vk::Format::B8G8R8A8_SRGB),
        ];
        let chosen =
            choose_surface_format(&formats, vk::Format::B8G8R8A8_SRGB).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        let chosen =
            choose_surface_format(&formats, vk::Format::R16G16B16A16_SFLOAT)
                .unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert!(choose_surface_format(&[], vk::Format::B8G8R8A8_UNORM).is_none());
    }

    #[test]
    fn unsupported_present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_follows_surface_when_fixed() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 1024,
            },
            ..Default::default()
        };
        assert_eq!(
            choose_extent(&caps, 1920, 1080),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
        caps.current_extent.width = u32::MAX;
        assert_eq!(
            choose_extent(&caps, 1920, 300),
            vk::Extent2D {
                width: 1024,
                height: 300
            }
        );
    }

    #[test]
    fn composite_alpha_prefers_opaque() {
        let caps = vk::SurfaceCapabilitiesKHR {
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::INHERIT
                | vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            ..Default::default()
        };
        assert_eq!(
            choose_composite_alpha(&caps),
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
        );
    }
}
