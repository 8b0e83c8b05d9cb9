//! Sampler wrapper ([`Sampler`]).

use std::sync::Arc;

use ash::vk;
use rgfx_core::descriptor::SamplerDescriptor;
use thiserror::Error;

use crate::conv;
use crate::error::classify;
use crate::raw::RawDevice;

#[derive(Debug, Error)]
pub enum CreateSamplerError {
    #[error(
        "Anisotropy {requested} requested but the device does not support \
         anisotropic filtering"
    )]
    AnisotropyUnsupported { requested: u16 },

    #[error("Vulkan error creating sampler: {0}")]
    Vulkan(vk::Result),
}

impl From<CreateSamplerError> for rgfx_core::Error {
    fn from(value: CreateSamplerError) -> Self {
        match value {
            CreateSamplerError::AnisotropyUnsupported { .. } => {
                rgfx_core::Error::unsupported(value.to_string())
            }
            CreateSamplerError::Vulkan(e) => classify("vkCreateSampler", e),
        }
    }
}

/// Anisotropy to program, or `None` when filtering is isotropic.
///
/// Clamped to the device's `maxSamplerAnisotropy`.
pub fn effective_anisotropy(requested: u16, device_max: f32) -> Option<f32> {
    (requested > 1).then(|| f32::from(requested).min(device_max.max(1.0)))
}

/// An owned `VkSampler`.
pub struct Sampler {
    parent: Arc<RawDevice>,
    handle: vk::Sampler,
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Sampler {
    pub fn new(
        device: &Arc<RawDevice>,
        desc: &SamplerDescriptor<'_>,
    ) -> Result<Self, CreateSamplerError> {
        let anisotropy = effective_anisotropy(
            desc.max_anisotropy,
            device.properties().limits.max_sampler_anisotropy,
        );
        if anisotropy.is_some() && !device.has_anisotropy() {
            return Err(CreateSamplerError::AnisotropyUnsupported {
                requested: desc.max_anisotropy,
            });
        }

        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(conv::filter(desc.mag_filter))
            .min_filter(conv::filter(desc.min_filter))
            .mipmap_mode(conv::mipmap_mode(desc.mipmap_filter))
            .address_mode_u(conv::address_mode(desc.address_mode_u))
            .address_mode_v(conv::address_mode(desc.address_mode_v))
            .address_mode_w(conv::address_mode(desc.address_mode_w))
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .compare_enable(desc.compare.is_some())
            .compare_op(
                desc.compare
                    .map(conv::compare_op)
                    .unwrap_or(vk::CompareOp::NEVER),
            )
            .mip_lod_bias(0.0)
            .min_lod(desc.lod_min_clamp)
            .max_lod(desc.lod_max_clamp)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
            .unnormalized_coordinates(false);

        // SAFETY: create_info is fully initialised with no borrowed data.
        let handle =
            unsafe { device.ash_device().create_sampler(&create_info, None) }
                .map_err(CreateSamplerError::Vulkan)?;

        // SAFETY: handle is a valid sampler from this device.
        unsafe { device.label_object(handle, "sampler", desc.label) };

        Ok(Self {
            parent: Arc::clone(device),
            handle,
        })
    }

    pub fn raw(&self) -> vk::Sampler {
        self.handle
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        tracing::debug!("Dropping sampler {:?}", self.handle);
        // SAFETY: handle was created from parent and is owned by this
        // wrapper. No GPU work may still reference it.
        unsafe { self.parent.ash_device().destroy_sampler(self.handle, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anisotropy_is_clamped_to_device() {
        assert_eq!(effective_anisotropy(1, 16.0), None);
        assert_eq!(effective_anisotropy(0, 16.0), None);
        assert_eq!(effective_anisotropy(8, 16.0), Some(8.0));
        assert_eq!(effective_anisotropy(32, 16.0), Some(16.0));
    }
}
