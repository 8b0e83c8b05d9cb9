//! [`TextureFormat`] and per-format queries.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    #[default]
    Undefined,
    R8Unorm,
    R8G8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8UnormSrgb,
    B8G8R8A8Unorm,
    B8G8R8A8UnormSrgb,
    R16Float,
    R16G16Float,
    R16G16B16A16Float,
    R32Float,
    R32G32Float,
    R32G32B32Float,
    R32G32B32A32Float,
    Depth16Unorm,
    Depth24Plus,
    Depth32Float,
    Stencil8,
    Depth24PlusStencil8,
    Depth32FloatStencil8,
}

impl TextureFormat {
    /// Size of one texel in bytes, or 0 for [`TextureFormat::Undefined`].
    ///
    /// Depth formats report their storage size as used for copies.
    pub fn bytes_per_pixel(self) -> u32 {
        use TextureFormat as F;
        match self {
            F::Undefined => 0,
            F::R8Unorm | F::Stencil8 => 1,
            F::R8G8Unorm | F::R16Float | F::Depth16Unorm => 2,
            F::R8G8B8A8Unorm
            | F::R8G8B8A8UnormSrgb
            | F::B8G8R8A8Unorm
            | F::B8G8R8A8UnormSrgb
            | F::R16G16Float
            | F::R32Float
            | F::Depth24Plus
            | F::Depth32Float
            | F::Depth24PlusStencil8 => 4,
            F::R16G16B16A16Float | F::R32G32Float => 8,
            F::Depth32FloatStencil8 => 5,
            F::R32G32B32Float => 12,
            F::R32G32B32A32Float => 16,
        }
    }

    pub fn has_depth(self) -> bool {
        matches!(
            self,
            TextureFormat::Depth16Unorm
                | TextureFormat::Depth24Plus
                | TextureFormat::Depth32Float
                | TextureFormat::Depth24PlusStencil8
                | TextureFormat::Depth32FloatStencil8
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(
            self,
            TextureFormat::Stencil8
                | TextureFormat::Depth24PlusStencil8
                | TextureFormat::Depth32FloatStencil8
        )
    }

    pub fn is_depth_stencil(self) -> bool {
        self.has_depth() || self.has_stencil()
    }

    pub fn is_srgb(self) -> bool {
        matches!(
            self,
            TextureFormat::R8G8B8A8UnormSrgb | TextureFormat::B8G8R8A8UnormSrgb
        )
    }

    /// Whether hardware linear filtering is guaranteed for this format.
    pub fn is_filterable(self) -> bool {
        !self.is_depth_stencil()
            && !matches!(
                self,
                TextureFormat::Undefined
                    | TextureFormat::R32Float
                    | TextureFormat::R32G32Float
                    | TextureFormat::R32G32B32Float
                    | TextureFormat::R32G32B32A32Float
            )
    }
}

/// Free-function form of [`TextureFormat::bytes_per_pixel`].
pub fn format_bytes_per_pixel(format: TextureFormat) -> u32 {
    format.bytes_per_pixel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_per_pixel_matches_layout() {
        assert_eq!(format_bytes_per_pixel(TextureFormat::Undefined), 0);
        assert_eq!(TextureFormat::R8Unorm.bytes_per_pixel(), 1);
        assert_eq!(TextureFormat::R8G8Unorm.bytes_per_pixel(), 2);
        assert_eq!(TextureFormat::B8G8R8A8UnormSrgb.bytes_per_pixel(), 4);
        assert_eq!(TextureFormat::R16G16B16A16Float.bytes_per_pixel(), 8);
        assert_eq!(TextureFormat::R32G32B32Float.bytes_per_pixel(), 12);
        assert_eq!(TextureFormat::R32G32B32A32Float.bytes_per_pixel(), 16);
        assert_eq!(TextureFormat::Depth32FloatStencil8.bytes_per_pixel(), 5);
    }

    #[test]
    fn depth_stencil_classification() {
        assert!(TextureFormat::Depth24PlusStencil8.has_depth());
        assert!(TextureFormat::Depth24PlusStencil8.has_stencil());
        assert!(!TextureFormat::Depth32Float.has_stencil());
        assert!(TextureFormat::Stencil8.is_depth_stencil());
        assert!(!TextureFormat::Stencil8.has_depth());
        assert!(!TextureFormat::R8G8B8A8Unorm.is_depth_stencil());
    }

    #[test]
    fn filterability() {
        assert!(TextureFormat::R8G8B8A8Unorm.is_filterable());
        assert!(TextureFormat::R16G16B16A16Float.is_filterable());
        assert!(!TextureFormat::R32Float.is_filterable());
        assert!(!TextureFormat::Depth16Unorm.is_filterable());
    }
}
