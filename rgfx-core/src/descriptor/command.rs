//! Transfer, blit and barrier descriptors recorded on a command encoder.

use crate::flags::{AccessFlags, PipelineStage};
use crate::handle::{BufferHandle, TextureHandle};
use crate::types::{Extent3D, FilterMode, Origin3D, TextureLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyBufferToBufferDescriptor {
    pub source: BufferHandle,
    pub source_offset: u64,
    pub destination: BufferHandle,
    pub destination_offset: u64,
    pub size: u64,
}

/// Buffer data is tightly packed: rows of `extent.width` texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyBufferToTextureDescriptor {
    pub source: BufferHandle,
    pub source_offset: u64,
    pub destination: TextureHandle,
    pub origin: Origin3D,
    pub extent: Extent3D,
    pub mip_level: u32,
    pub final_layout: TextureLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyTextureToBufferDescriptor {
    pub source: TextureHandle,
    pub origin: Origin3D,
    pub mip_level: u32,
    pub destination: BufferHandle,
    pub destination_offset: u64,
    pub extent: Extent3D,
    pub final_layout: TextureLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyTextureToTextureDescriptor {
    pub source: TextureHandle,
    pub source_origin: Origin3D,
    pub source_mip_level: u32,
    pub source_final_layout: TextureLayout,
    pub destination: TextureHandle,
    pub destination_origin: Origin3D,
    pub destination_mip_level: u32,
    pub destination_final_layout: TextureLayout,
    pub extent: Extent3D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitTextureToTextureDescriptor {
    pub source: TextureHandle,
    pub source_origin: Origin3D,
    pub source_extent: Extent3D,
    pub source_mip_level: u32,
    pub source_final_layout: TextureLayout,
    pub destination: TextureHandle,
    pub destination_origin: Origin3D,
    pub destination_extent: Extent3D,
    pub destination_mip_level: u32,
    pub destination_final_layout: TextureLayout,
    pub filter: FilterMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryBarrier {
    pub src_stage_mask: PipelineStage,
    pub dst_stage_mask: PipelineStage,
    pub src_access_mask: AccessFlags,
    pub dst_access_mask: AccessFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: BufferHandle,
    pub src_stage_mask: PipelineStage,
    pub dst_stage_mask: PipelineStage,
    pub src_access_mask: AccessFlags,
    pub dst_access_mask: AccessFlags,
    pub offset: u64,
    /// 0 covers the rest of the buffer.
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBarrier {
    pub texture: TextureHandle,
    pub old_layout: TextureLayout,
    pub new_layout: TextureLayout,
    pub src_stage_mask: PipelineStage,
    pub dst_stage_mask: PipelineStage,
    pub src_access_mask: AccessFlags,
    pub dst_access_mask: AccessFlags,
    pub base_mip_level: u32,
    /// 0 covers the remaining levels.
    pub mip_level_count: u32,
    pub base_array_layer: u32,
    /// 0 covers the remaining layers.
    pub array_layer_count: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineBarrierDescriptor<'a> {
    pub memory_barriers: &'a [MemoryBarrier],
    pub buffer_barriers: &'a [BufferBarrier],
    pub texture_barriers: &'a [TextureBarrier],
}

impl PipelineBarrierDescriptor<'_> {
    pub fn is_empty(&self) -> bool {
        self.memory_barriers.is_empty()
            && self.buffer_barriers.is_empty()
            && self.texture_barriers.is_empty()
    }
}
