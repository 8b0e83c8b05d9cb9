use std::ffi::CString;
use std::io::Cursor;
use std::sync::Arc;

use ash::vk;
use rgfx_core::ShaderSourceType;
use rgfx_core::descriptor::ShaderDescriptor;
use thiserror::Error;

use crate::error::classify;
use crate::raw::RawDevice;

const SPIRV_MAGIC: u32 = 0x0723_0203;

#[derive(Debug, Error)]
pub enum CreateShaderModuleError {
    #[error("{0:?} shaders are not accepted by the Vulkan backend")]
    UnsupportedSource(ShaderSourceType),

    #[error("SPIR-V byte slice length ({0}) is not a multiple of 4")]
    InvalidLength(usize),

    #[error("SPIR-V module does not start with the magic number")]
    BadMagic,

    #[error("Failed to read SPIR-V words: {0}")]
    Read(#[from] std::io::Error),

    #[error("Vulkan error creating shader module: {0}")]
    Vulkan(vk::Result),
}

impl From<CreateShaderModuleError> for rgfx_core::Error {
    fn from(value: CreateShaderModuleError) -> Self {
        match value {
            CreateShaderModuleError::UnsupportedSource(_) => {
                rgfx_core::Error::unsupported(value.to_string())
            }
            CreateShaderModuleError::Vulkan(e) => {
                classify("vkCreateShaderModule", e)
            }
            _ => rgfx_core::Error::invalid_argument(value.to_string()),
        }
    }
}

/// Decode SPIR-V bytes into words, fixing up byte order and alignment.
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>, CreateShaderModuleError> {
    if !bytes.len().is_multiple_of(4) {
        return Err(CreateShaderModuleError::InvalidLength(bytes.len()));
    }
    // read_spv copies into an aligned buffer and swaps big-endian modules.
    let words = ash::util::read_spv(&mut Cursor::new(bytes))?;
    if words.first() != Some(&SPIRV_MAGIC) {
        return Err(CreateShaderModuleError::BadMagic);
    }
    Ok(words)
}

pub struct ShaderModule {
    parent: Arc<RawDevice>,
    handle: vk::ShaderModule,
    entry_point: Option<String>,
}

impl std::fmt::Debug for ShaderModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderModule")
            .field("handle", &self.handle)
            .field("entry_point", &self.entry_point)
            .finish_non_exhaustive()
    }
}

impl ShaderModule {
    pub fn new(
        device: &Arc<RawDevice>,
        desc: &ShaderDescriptor<'_>,
    ) -> Result<Self, CreateShaderModuleError> {
        if desc.source_type != ShaderSourceType::SpirV {
            return Err(CreateShaderModuleError::UnsupportedSource(
                desc.source_type,
            ));
        }
        let code = spirv_words(desc.code)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        // SAFETY: create_info contains valid SPIR-V code words.
        let handle = unsafe {
            device.ash_device().create_shader_module(&create_info, None)
        }
        .map_err(CreateShaderModuleError::Vulkan)?;

        // SAFETY: handle is a valid shader module created from device.
        unsafe { device.label_object(handle, "shader module", desc.label) };

        Ok(Self {
            parent: Arc::clone(device),
            handle,
            entry_point: desc.entry_point.map(str::to_owned),
        })
    }

    /// Entry point name for a pipeline stage: `requested` unless empty, then
    /// the module's default, then `"main"`.
    pub fn entry_point(
        &self,
        requested: &str,
    ) -> Result<CString, std::ffi::NulError> {
        let name = if requested.is_empty() {
            self.entry_point.as_deref().unwrap_or("main")
        } else {
            requested
        };
        CString::new(name)
    }

    pub fn raw(&self) -> vk::ShaderModule {
        self.handle
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        tracing::debug!("Dropping shader module {:?}", self.handle);
        // SAFETY: handle was created from parent. Pipelines keep their own
        // compiled copy, so the module may go before them.
        unsafe {
            self.parent
                .ash_device()
                .destroy_shader_module(self.handle, None)
        };
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
    fn unaligned_bytes_are_copied() {
        let mut storage = vec![0u8; 9];
        storage[1..5].copy_from_slice(&SPIRV_MAGIC.to_le_bytes());
        assert_eq!(spirv_words(&storage[1..9]).unwrap()[0], SPIRV_MAGIC);
    }
}
