use crate::flags::{BufferUsage, MemoryProperty, TextureUsage};
use crate::format::TextureFormat;
use crate::types::{
    AddressMode, CompareFunction, Extent3D, FilterMode, SampleCount,
    ShaderSourceType, TextureLayout, TextureType, TextureViewType,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct BufferDescriptor<'a> {
    pub label: Option<&'a str>,
    pub size: u64,
    pub usage: BufferUsage,
    pub memory_properties: MemoryProperty,
}

/// Wraps a buffer owned elsewhere. Destroying the resulting handle never
/// frees `native_handle`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferImportDescriptor<'a> {
    pub label: Option<&'a str>,
    pub native_handle: u64,
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub size: u64,
    pub usage: BufferUsage,
    pub memory_properties: MemoryProperty,
}

#[derive(Debug, Clone, Copy)]
pub struct TextureDescriptor<'a> {
    pub label: Option<&'a str>,
    pub texture_type: TextureType,
    pub size: Extent3D,
    pub array_layer_count: u32,
    pub mip_level_count: u32,
    pub sample_count: SampleCount,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl Default for TextureDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            texture_type: TextureType::D2,
            size: Extent3D::default(),
            array_layer_count: 1,
            mip_level_count: 1,
            sample_count: SampleCount::X1,
            format: TextureFormat::Undefined,
            usage: TextureUsage::empty(),
        }
    }
}

impl TextureDescriptor<'_> {
    pub fn info(&self) -> TextureInfo {
        TextureInfo {
            texture_type: self.texture_type,
            size: self.size,
            array_layer_count: self.array_layer_count,
            mip_level_count: self.mip_level_count,
            sample_count: self.sample_count,
            format: self.format,
            usage: self.usage,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TextureImportDescriptor<'a> {
    pub label: Option<&'a str>,
    pub native_handle: u64,
    pub texture_type: TextureType,
    pub size: Extent3D,
    pub array_layer_count: u32,
    pub mip_level_count: u32,
    pub sample_count: SampleCount,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub current_layout: TextureLayout,
}

impl TextureImportDescriptor<'_> {
    pub fn info(&self) -> TextureInfo {
        TextureInfo {
            texture_type: self.texture_type,
            size: self.size,
            array_layer_count: self.array_layer_count,
            mip_level_count: self.mip_level_count,
            sample_count: self.sample_count,
            format: self.format,
            usage: self.usage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub texture_type: TextureType,
    pub size: Extent3D,
    pub array_layer_count: u32,
    pub mip_level_count: u32,
    pub sample_count: SampleCount,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureInfo {
    /// Number of addressable layers: depth for 3D textures, array layers
    /// otherwise.
    pub fn layer_count(&self) -> u32 {
        match self.texture_type {
            TextureType::D3 => 1,
            _ => self.array_layer_count,
        }
    }

    /// View type covering the whole texture.
    pub fn default_view_type(&self) -> TextureViewType {
        match self.texture_type {
            TextureType::D1 if self.array_layer_count > 1 => {
                TextureViewType::D1Array
            }
            TextureType::D1 => TextureViewType::D1,
            TextureType::D2 if self.array_layer_count > 1 => {
                TextureViewType::D2Array
            }
            TextureType::D2 => TextureViewType::D2,
            TextureType::D3 => TextureViewType::D3,
            TextureType::Cube if self.array_layer_count > 6 => {
                TextureViewType::CubeArray
            }
            TextureType::Cube => TextureViewType::Cube,
        }
    }
}

/// Zero counts and [`TextureFormat::Undefined`] are filled in from the
/// texture by [`TextureViewDescriptor::resolve`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TextureViewDescriptor<'a> {
    pub label: Option<&'a str>,
    pub view_type: Option<TextureViewType>,
    pub format: TextureFormat,
    pub base_mip_level: u32,
    pub mip_level_count: u32,
    pub base_array_layer: u32,
    pub array_layer_count: u32,
}

/// A view descriptor with every default filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTextureView {
    pub view_type: TextureViewType,
    pub format: TextureFormat,
    pub base_mip_level: u32,
    pub mip_level_count: u32,
    pub base_array_layer: u32,
    pub array_layer_count: u32,
}

impl TextureViewDescriptor<'_> {
    pub fn resolve(
        &self,
        texture: &TextureInfo,
    ) -> crate::Result<ResolvedTextureView> {
        let layers = texture.layer_count();
        if self.base_mip_level >= texture.mip_level_count {
            return Err(crate::Error::invalid_argument(format!(
                "base mip level {} out of range for {} levels",
                self.base_mip_level, texture.mip_level_count
            )));
        }
        if self.base_array_layer >= layers {
            return Err(crate::Error::invalid_argument(format!(
                "base array layer {} out of range for {layers} layers",
                self.base_array_layer
            )));
        }
        let mip_level_count = match self.mip_level_count {
            0 => texture.mip_level_count - self.base_mip_level,
            n => n,
        };
        let array_layer_count = match self.array_layer_count {
            0 => layers - self.base_array_layer,
            n => n,
        };
        if self.base_mip_level + mip_level_count > texture.mip_level_count
            || self.base_array_layer + array_layer_count > layers
        {
            return Err(crate::Error::invalid_argument(
                "texture view subresource range exceeds texture",
            ));
        }
        Ok(ResolvedTextureView {
            view_type: self
                .view_type
                .unwrap_or_else(|| texture.default_view_type()),
            format: match self.format {
                TextureFormat::Undefined => texture.format,
                f => f,
            },
            base_mip_level: self.base_mip_level,
            mip_level_count,
            base_array_layer: self.base_array_layer,
            array_layer_count,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerDescriptor<'a> {
    pub label: Option<&'a str>,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub lod_min_clamp: f32,
    pub lod_max_clamp: f32,
    pub compare: Option<CompareFunction>,
    pub max_anisotropy: u16,
}

impl Default for SamplerDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: None,
            max_anisotropy: 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ShaderDescriptor<'a> {
    pub label: Option<&'a str>,
    pub source_type: ShaderSourceType,
    /// WGSL text or SPIR-V words, as raw bytes.
    pub code: &'a [u8],
    pub entry_point: Option<&'a str>,
}

impl<'a> ShaderDescriptor<'a> {
    pub fn wgsl(label: Option<&'a str>, source: &'a str) -> Self {
        Self {
            label,
            source_type: ShaderSourceType::Wgsl,
            code: source.as_bytes(),
            entry_point: None,
        }
    }

    pub fn spirv(label: Option<&'a str>, words: &'a [u32]) -> Self {
        Self {
            label,
            source_type: ShaderSourceType::SpirV,
            code: bytemuck::cast_slice(words),
            entry_point: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(mips: u32, layers: u32) -> TextureInfo {
        TextureInfo {
            texture_type: TextureType::D2,
            size: Extent3D::d2(64, 64),
            array_layer_count: layers,
            mip_level_count: mips,
            sample_count: SampleCount::X1,
            format: TextureFormat::R8G8B8A8Unorm,
            usage: TextureUsage::TEXTURE_BINDING,
        }
    }

    #[test]
    fn view_defaults_cover_remaining_subresources() {
        let desc = TextureViewDescriptor {
            base_mip_level: 2,
            base_array_layer: 1,
            ..Default::default()
        };
        let view = desc.resolve(&texture(7, 4)).unwrap();
        assert_eq!(view.mip_level_count, 5);
        assert_eq!(view.array_layer_count, 3);
        assert_eq!(view.format, TextureFormat::R8G8B8A8Unorm);
        assert_eq!(view.view_type, TextureViewType::D2Array);
    }

    #[test]
    fn view_out_of_range_is_rejected() {
        let desc = TextureViewDescriptor {
            base_mip_level: 1,
            mip_level_count: 4,
            ..Default::default()
        };
        assert!(desc.resolve(&texture(4, 1)).is_err());

        let desc = TextureViewDescriptor {
            base_array_layer: 1,
            ..Default::default()
        };
        assert!(desc.resolve(&texture(1, 1)).is_err());
    }

    #[test]
    fn spirv_descriptor_is_word_aligned_bytes() {
        let words = [0x0723_0203u32, 0x0001_0000];
        let desc = ShaderDescriptor::spirv(None, &words);
        assert_eq!(desc.code.len(), 8);
        assert_eq!(desc.source_type, ShaderSourceType::SpirV);
    }
}
