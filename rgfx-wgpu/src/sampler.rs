use rgfx_core::FilterMode;
use rgfx_core::descriptor::SamplerDescriptor;

use crate::conv;
use crate::error::scoped;

/// Anisotropy clamp to program. WebGPU only filters anisotropically when
/// every filter is linear, and caps the clamp at 16.
pub fn anisotropy_clamp(desc: &SamplerDescriptor<'_>) -> u16 {
    if desc.max_anisotropy <= 1 {
        return 1;
    }
    let all_linear = [desc.mag_filter, desc.min_filter, desc.mipmap_filter]
        .iter()
        .all(|f| *f == FilterMode::Linear);
    if !all_linear {
        tracing::warn!(
            "Ignoring anisotropy {} on a sampler with nearest filtering",
            desc.max_anisotropy
        );
        return 1;
    }
    desc.max_anisotropy.min(16)
}

pub struct Sampler {
    raw: wgpu::Sampler,
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler").finish_non_exhaustive()
    }
}

impl Sampler {
    pub fn new(
        device: &wgpu::Device,
        desc: &SamplerDescriptor<'_>,
    ) -> rgfx_core::Result<Self> {
        let raw = scoped(device, "create_sampler", || {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: desc.label,
                address_mode_u: conv::address_mode(desc.address_mode_u),
                address_mode_v: conv::address_mode(desc.address_mode_v),
                address_mode_w: conv::address_mode(desc.address_mode_w),
                mag_filter: conv::filter_mode(desc.mag_filter),
                min_filter: conv::filter_mode(desc.min_filter),
                mipmap_filter: conv::filter_mode(desc.mipmap_filter),
                lod_min_clamp: desc.lod_min_clamp,
                lod_max_clamp: desc.lod_max_clamp,
                compare: desc.compare.map(conv::compare_function),
                anisotropy_clamp: anisotropy_clamp(desc),
                border_color: None,
            })
        })?;
        Ok(Self { raw })
    }

    pub fn raw(&self) -> &wgpu::Sampler {
        &self.raw
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        tracing::debug!("Dropping sampler {:?}", self.raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anisotropy_needs_linear_filters() {
        let linear = SamplerDescriptor {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            max_anisotropy: 8,
            ..Default::default()
        };
        assert_eq!(anisotropy_clamp(&linear), 8);

        let nearest = SamplerDescriptor {
            max_anisotropy: 8,
            ..Default::default()
        };
        assert_eq!(anisotropy_clamp(&nearest), 1);
    }

    #[test]
    fn anisotropy_is_capped() {
        let desc = SamplerDescriptor {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            max_anisotropy: 64,
            ..Default::default()
        };
        assert_eq!(anisotropy_clamp(&desc), 16);
    }
}
