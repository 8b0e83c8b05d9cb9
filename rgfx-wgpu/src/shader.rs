use std::borrow::Cow;

use rgfx_core::ShaderSourceType;
use rgfx_core::descriptor::ShaderDescriptor;
use thiserror::Error;

use crate::error::scoped;

const SPIRV_MAGIC: u32 = 0x0723_0203;

#[derive(Debug, Error)]
pub enum CreateShaderModuleError {
    #[error("WGSL source is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("SPIR-V byte slice length ({0}) is not a multiple of 4")]
    InvalidLength(usize),

    #[error("SPIR-V module does not start with the magic number")]
    BadMagic,
}

impl From<CreateShaderModuleError> for rgfx_core::Error {
    fn from(value: CreateShaderModuleError) -> Self {
        rgfx_core::Error::invalid_argument(value.to_string())
    }
}

/// Decode SPIR-V bytes into native-endian words, swapping modules written
/// in the other byte order.
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>, CreateShaderModuleError> {
    if !bytes.len().is_multiple_of(4) {
        return Err(CreateShaderModuleError::InvalidLength(bytes.len()));
    }
    let mut words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    match words.first() {
        Some(&SPIRV_MAGIC) => {}
        Some(&magic) if magic == SPIRV_MAGIC.swap_bytes() => {
            words.iter_mut().for_each(|w| *w = w.swap_bytes());
        }
        _ => return Err(CreateShaderModuleError::BadMagic),
    }
    Ok(words)
}

pub struct ShaderModule {
    raw: wgpu::ShaderModule,
    entry_point: Option<String>,
}

impl std::fmt::Debug for ShaderModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderModule")
            .field("entry_point", &self.entry_point)
            .finish_non_exhaustive()
    }
}

impl ShaderModule {
    pub fn new(
        device: &wgpu::Device,
        desc: &ShaderDescriptor<'_>,
    ) -> rgfx_core::Result<Self> {
        let source = match desc.source_type {
            ShaderSourceType::Wgsl => {
                let text = std::str::from_utf8(desc.code)
                    .map_err(CreateShaderModuleError::from)?;
                wgpu::ShaderSource::Wgsl(Cow::Borrowed(text))
            }
            ShaderSourceType::SpirV => {
                wgpu::ShaderSource::SpirV(Cow::Owned(spirv_words(desc.code)?))
            }
        };
        let raw = scoped(device, "create_shader_module", || {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: desc.label,
                source,
            })
        })?;
        Ok(Self {
            raw,
            entry_point: desc.entry_point.map(str::to_owned),
        })
    }

    /// Entry point for a pipeline stage: `requested` unless empty, then the
    /// module's default. `None` lets wgpu pick the module's only entry
    /// point for the stage.
    pub fn entry_point<'a>(&'a self, requested: &'a str) -> Option<&'a str> {
        if requested.is_empty() {
            self.entry_point.as_deref()
        } else {
            Some(requested)
        }
    }

    pub fn raw(&self) -> &wgpu::ShaderModule {
        &self.raw
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        tracing::debug!("Dropping shader module {:?}", self.entry_point);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spirv_length_must_be_word_multiple() {
        assert!(matches!(
            spirv_words(&[0x03, 0x02, 0x23]),
            Err(CreateShaderModuleError::InvalidLength(3))
        ));
    }

    #[test]
    fn spirv_magic_is_checked() {
        let words = [SPIRV_MAGIC, 0x0001_0000];
        let bytes: &[u8] = bytemuck::cast_slice(&words);
        assert_eq!(spirv_words(bytes).unwrap(), words);
        assert!(matches!(
            spirv_words(&[0u8; 8]),
            Err(CreateShaderModuleError::BadMagic)
        ));
    }

    #[test]
    fn big_endian_modules_are_swapped() {
        let mut bytes = SPIRV_MAGIC.to_be_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        assert_eq!(spirv_words(&bytes).unwrap(), [SPIRV_MAGIC, 0x0001_0000]);
    }
}
