use crate::flags::ShaderStage;
use crate::format::TextureFormat;
use crate::handle::{
    BindGroupLayoutHandle, BufferHandle, SamplerHandle, TextureViewHandle,
};
use crate::types::{TextureSampleType, TextureViewType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferBindingType {
    Uniform,
    Storage { read_only: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingType {
    Buffer {
        ty: BufferBindingType,
        has_dynamic_offset: bool,
        /// 0 means no minimum.
        min_binding_size: u64,
    },
    Sampler {
        comparison: bool,
    },
    Texture {
        sample_type: TextureSampleType,
        view_dimension: TextureViewType,
        multisampled: bool,
    },
    StorageTexture {
        format: TextureFormat,
        view_dimension: TextureViewType,
        write_only: bool,
    },
}

impl BindingType {
    pub fn has_dynamic_offset(&self) -> bool {
        matches!(
            self,
            BindingType::Buffer {
                has_dynamic_offset: true,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub visibility: ShaderStage,
    pub ty: BindingType,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BindGroupLayoutDescriptor<'a> {
    pub label: Option<&'a str>,
    pub entries: &'a [BindGroupLayoutEntry],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingResource {
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        /// 0 binds to the end of the buffer.
        size: u64,
    },
    Sampler(SamplerHandle),
    TextureView(TextureViewHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub resource: BindingResource,
}

#[derive(Debug, Clone, Copy)]
pub struct BindGroupDescriptor<'a> {
    pub label: Option<&'a str>,
    pub layout: BindGroupLayoutHandle,
    pub entries: &'a [BindGroupEntry],
}
