use std::ops::Range;

use ash::vk;
use rgfx_core::TextureLayout;
use rgfx_core::util::access_flags_for_layout;

use crate::conv;

/// Barriers collected during one command and recorded with a single
/// `vkCmdPipelineBarrier`.
#[derive(Debug, Default)]
pub struct BarrierBatch {
    src_stages: vk::PipelineStageFlags,
    dst_stages: vk::PipelineStageFlags,
    memory: Vec<vk::MemoryBarrier<'static>>,
    buffers: Vec<vk::BufferMemoryBarrier<'static>>,
    images: Vec<vk::ImageMemoryBarrier<'static>>,
}

impl BarrierBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty() && self.buffers.is_empty() && self.images.is_empty()
    }

    pub fn stages(&self) -> (vk::PipelineStageFlags, vk::PipelineStageFlags) {
        (self.src_stages, self.dst_stages)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn memory(
        &mut self,
        stages: (vk::PipelineStageFlags, vk::PipelineStageFlags),
        access: (vk::AccessFlags, vk::AccessFlags),
    ) {
        self.src_stages |= stages.0;
        self.dst_stages |= stages.1;
        self.memory.push(
            vk::MemoryBarrier::default()
                .src_access_mask(access.0)
                .dst_access_mask(access.1),
        );
    }

    pub fn buffer(
        &mut self,
        buffer: vk::Buffer,
        range: (vk::DeviceSize, vk::DeviceSize),
        stages: (vk::PipelineStageFlags, vk::PipelineStageFlags),
        access: (vk::AccessFlags, vk::AccessFlags),
    ) {
        self.src_stages |= stages.0;
        self.dst_stages |= stages.1;
        self.buffers.push(
            vk::BufferMemoryBarrier::default()
                .buffer(buffer)
                .offset(range.0)
                .size(range.1)
                .src_access_mask(access.0)
                .dst_access_mask(access.1)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED),
        );
    }

    pub fn image(
        &mut self,
        image: vk::Image,
        subresource: vk::ImageSubresourceRange,
        layouts: (vk::ImageLayout, vk::ImageLayout),
        stages: (vk::PipelineStageFlags, vk::PipelineStageFlags),
        access: (vk::AccessFlags, vk::AccessFlags),
    ) {
        self.src_stages |= stages.0;
        self.dst_stages |= stages.1;
        self.images.push(
            vk::ImageMemoryBarrier::default()
                .image(image)
                .subresource_range(subresource)
                .old_layout(layouts.0)
                .new_layout(layouts.1)
                .src_access_mask(access.0)
                .dst_access_mask(access.1)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED),
        );
    }

    /// Layout transition with stage and access masks implied by the two
    /// layouts.
    pub fn layout_change(
        &mut self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        mips: Range<u32>,
        layers: Range<u32>,
        old: TextureLayout,
        new: TextureLayout,
    ) {
        let subresource = vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: mips.start,
            level_count: mips.len() as u32,
            base_array_layer: layers.start,
            layer_count: layers.len() as u32,
        };
        self.image(
            image,
            subresource,
            (conv::texture_layout(old), conv::texture_layout(new)),
            (conv::layout_stages(old), conv::layout_stages(new)),
            (
                conv::access_flags(access_flags_for_layout(old)),
                conv::access_flags(access_flags_for_layout(new)),
            ),
        );
    }

    /// Record every collected barrier into `cmd`. An empty batch records
    /// nothing.
    ///
    /// # Safety
    /// `cmd` must be recording outside a render pass on `device`, and every
    /// buffer and image in the batch must derive from `device`.
    pub unsafe fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        if self.is_empty() {
            return;
        }
        let src = if self.src_stages.is_empty() {
            vk::PipelineStageFlags::TOP_OF_PIPE
        } else {
            self.src_stages
        };
        let dst = if self.dst_stages.is_empty() {
            vk::PipelineStageFlags::BOTTOM_OF_PIPE
        } else {
            self.dst_stages
        };
        // SAFETY: Caller guarantees cmd is recording and the barriers
        // reference objects of this device.
        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                src,
                dst,
                vk::DependencyFlags::empty(),
                &self.memory,
                &self.buffers,
                &self.images,
            )
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_transition_masks() {
        let mut batch = BarrierBatch::new();
        assert!(batch.is_empty());
        batch.layout_change(
            vk::Image::null(),
            vk::ImageAspectFlags::COLOR,
            0..3,
            0..1,
            TextureLayout::Undefined,
            TextureLayout::TransferDst,
        );
        assert!(!batch.is_empty());
        assert_eq!(
            batch.stages(),
            (
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER
            )
        );
        let barrier = &batch.images[0];
        assert_eq!(barrier.src_access_mask, vk::AccessFlags::empty());
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(barrier.subresource_range.level_count, 3);
        assert_eq!(barrier.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    }

    #[test]
    fn stages_accumulate_across_barriers() {
        let mut batch = BarrierBatch::new();
        batch.memory(
            (
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::PipelineStageFlags::TRANSFER,
            ),
            (vk::AccessFlags::SHADER_WRITE, vk::AccessFlags::TRANSFER_READ),
        );
        batch.buffer(
            vk::Buffer::null(),
            (0, vk::WHOLE_SIZE),
            (
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::VERTEX_INPUT,
            ),
            (
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
            ),
        );
        let (src, dst) = batch.stages();
        assert!(src.contains(vk::PipelineStageFlags::COMPUTE_SHADER));
        assert!(src.contains(vk::PipelineStageFlags::TRANSFER));
        assert!(dst.contains(vk::PipelineStageFlags::VERTEX_INPUT));
        assert_eq!(batch.image_count(), 0);
    }
}
