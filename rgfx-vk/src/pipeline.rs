use std::ffi::NulError;
use std::sync::Arc;

use ash::vk;
use rgfx_core::compat::{self, CompatibilityError};
use rgfx_core::descriptor::{
    ColorTargetState, ComputePipelineDescriptor, DepthStencilState,
    RenderPipelineDescriptor, StencilFaceState, VertexBufferLayout,
};
use rgfx_core::TextureFormat;
use thiserror::Error;

use crate::conv;
use crate::descriptor::BindGroupLayout;
use crate::error::classify;
use crate::pass::RenderPass;
use crate::raw::RawDevice;
use crate::shader::ShaderModule;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CreatePipelineError {
    #[error("Entry point name contains a NUL byte")]
    EntryPoint(#[from] NulError),

    #[error("{0:?} cannot be used as a vertex attribute format")]
    VertexFormat(TextureFormat),

    #[error("Pipeline does not match its render pass: {0}")]
    Incompatible(#[from] CompatibilityError),

    #[error("Vulkan error creating pipeline layout: {0}")]
    Layout(vk::Result),

    #[error("Vulkan error creating pipeline: {0}")]
    Pipeline(vk::Result),
}

impl From<CreatePipelineError> for rgfx_core::Error {
    fn from(value: CreatePipelineError) -> Self {
        match value {
            CreatePipelineError::EntryPoint(_)
            | CreatePipelineError::VertexFormat(_) => {
                rgfx_core::Error::InvalidArgument(value.to_string())
            }
            CreatePipelineError::Incompatible(e) => {
                rgfx_core::Error::Incompatible(e)
            }
            CreatePipelineError::Layout(e) => {
                classify("vkCreatePipelineLayout", e)
            }
            CreatePipelineError::Pipeline(e) => classify("vkCreatePipelines", e),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineLayout
// ---------------------------------------------------------------------------

/// A `VkPipelineLayout` built from bind group layouts, one set per group.
///
/// Each pipeline owns its layout. Bind groups record against it through
/// [`PipelineLayout::raw`], and the per-set dynamic offset counts are kept
/// for checking `set_bind_group` calls.
pub struct PipelineLayout {
    parent: Arc<RawDevice>,
    handle: vk::PipelineLayout,
    dynamic_offsets: Vec<usize>,
}

impl std::fmt::Debug for PipelineLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineLayout")
            .field("handle", &self.handle)
            .field("sets", &self.dynamic_offsets.len())
            .finish_non_exhaustive()
    }
}

impl PipelineLayout {
    pub fn new(
        device: &Arc<RawDevice>,
        label: Option<&str>,
        groups: &[&BindGroupLayout],
    ) -> Result<Self, CreatePipelineError> {
        let set_layouts: Vec<vk::DescriptorSetLayout> =
            groups.iter().map(|g| g.raw()).collect();
        let create_info =
            vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        // SAFETY: The set layouts derive from device and outlive this call.
        let handle = unsafe {
            device.ash_device().create_pipeline_layout(&create_info, None)
        }
        .map_err(CreatePipelineError::Layout)?;
        // SAFETY: handle was just created from device.
        unsafe { device.label_object(handle, "pipeline layout", label) };
        Ok(Self {
            parent: Arc::clone(device),
            handle,
            dynamic_offsets: groups
                .iter()
                .map(|g| g.dynamic_offset_count())
                .collect(),
        })
    }

    pub fn raw(&self) -> vk::PipelineLayout {
        self.handle
    }

    pub fn set_count(&self) -> u32 {
        self.dynamic_offsets.len() as u32
    }

    /// Dynamic offsets set `index` expects, or `None` past the last set.
    pub fn dynamic_offset_count(&self, index: u32) -> Option<usize> {
        self.dynamic_offsets.get(index as usize).copied()
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        tracing::debug!("Dropping pipeline layout {:?}", self.handle);
        // SAFETY: handle was created from parent. The owning pipeline is
        // destroyed first, see the field order of the pipeline structs.
        unsafe {
            self.parent
                .ash_device()
                .destroy_pipeline_layout(self.handle, None)
        };
    }
}

// ---------------------------------------------------------------------------
// State conversion
// ---------------------------------------------------------------------------

/// Vertex bindings and attributes, one binding per buffer slot.
pub fn vertex_input(
    buffers: &[VertexBufferLayout<'_>],
) -> Result<
    (
        Vec<vk::VertexInputBindingDescription>,
        Vec<vk::VertexInputAttributeDescription>,
    ),
    CreatePipelineError,
> {
    let mut bindings = Vec::with_capacity(buffers.len());
    let mut attributes = Vec::new();
    for (slot, layout) in buffers.iter().enumerate() {
        bindings.push(vk::VertexInputBindingDescription {
            binding: slot as u32,
            stride: layout.array_stride as u32,
            input_rate: conv::vertex_input_rate(layout.step_mode),
        });
        for attribute in layout.attributes {
            let format = conv::vertex_format(attribute.format)
                .ok_or(CreatePipelineError::VertexFormat(attribute.format))?;
            attributes.push(vk::VertexInputAttributeDescription {
                location: attribute.shader_location,
                binding: slot as u32,
                format,
                offset: attribute.offset as u32,
            });
        }
    }
    Ok((bindings, attributes))
}

pub fn color_blend_attachment(
    target: &ColorTargetState,
) -> vk::PipelineColorBlendAttachmentState {
    let state = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(conv::color_write_mask(target.write_mask));
    match target.blend {
        None => state,
        Some(blend) => state
            .blend_enable(true)
            .src_color_blend_factor(conv::blend_factor(blend.color.src_factor))
            .dst_color_blend_factor(conv::blend_factor(blend.color.dst_factor))
            .color_blend_op(conv::blend_op(blend.color.operation))
            .src_alpha_blend_factor(conv::blend_factor(blend.alpha.src_factor))
            .dst_alpha_blend_factor(conv::blend_factor(blend.alpha.dst_factor))
            .alpha_blend_op(conv::blend_op(blend.alpha.operation)),
    }
}

fn stencil_face(
    face: &StencilFaceState,
    read_mask: u32,
    write_mask: u32,
) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: conv::stencil_op(face.fail_op),
        pass_op: conv::stencil_op(face.pass_op),
        depth_fail_op: conv::stencil_op(face.depth_fail_op),
        compare_op: conv::compare_op(face.compare),
        compare_mask: read_mask,
        write_mask,
        reference: 0,
    }
}

pub fn depth_stencil_state(
    state: Option<&DepthStencilState>,
) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
    let Some(state) = state else {
        return vk::PipelineDepthStencilStateCreateInfo::default();
    };
    vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(true)
        .depth_write_enable(state.depth_write_enabled)
        .depth_compare_op(conv::compare_op(state.depth_compare))
        .stencil_test_enable(state.stencil_enabled())
        .front(stencil_face(
            &state.stencil_front,
            state.stencil_read_mask,
            state.stencil_write_mask,
        ))
        .back(stencil_face(
            &state.stencil_back,
            state.stencil_read_mask,
            state.stencil_write_mask,
        ))
}

// ---------------------------------------------------------------------------
// RenderPipeline
// ---------------------------------------------------------------------------

/// A graphics pipeline for one render pass signature.
///
/// Viewport and scissor are dynamic. Beginning a render pass sets both to
/// the framebuffer extent.
pub struct RenderPipeline {
    parent: Arc<RawDevice>,
    handle: vk::Pipeline,
    layout: PipelineLayout,
}

impl std::fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("handle", &self.handle)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl RenderPipeline {
    pub fn new(
        device: &Arc<RawDevice>,
        desc: &RenderPipelineDescriptor<'_>,
        render_pass: &RenderPass,
        groups: &[&BindGroupLayout],
        vertex_module: &ShaderModule,
        fragment_module: Option<&ShaderModule>,
    ) -> Result<Self, CreatePipelineError> {
        let pass_layout = render_pass.layout();
        // A pipeline without a fragment stage still declares one blend
        // state per pass color attachment, with writes masked off.
        let (color_formats, blend_attachments): (Vec<_>, Vec<_>) =
            match &desc.fragment {
                Some(fragment) => fragment
                    .targets
                    .iter()
                    .map(|t| (t.format, color_blend_attachment(t)))
                    .unzip(),
                None => pass_layout
                    .color_formats()
                    .map(|f| {
                        (f, vk::PipelineColorBlendAttachmentState::default())
                    })
                    .unzip(),
            };
        compat::check_pipeline_targets(
            pass_layout,
            &color_formats,
            desc.depth_stencil.map(|d| d.format),
            desc.sample_count,
        )?;

        let vertex_entry = vertex_module.entry_point(desc.vertex.entry_point)?;
        let fragment_entry = match (&desc.fragment, fragment_module) {
            (Some(fragment), Some(module)) => {
                Some((module, module.entry_point(fragment.entry_point)?))
            }
            _ => None,
        };
        let mut stages = vec![
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_module.raw())
                .name(&vertex_entry),
        ];
        if let Some((module, entry)) = &fragment_entry {
            stages.push(
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(module.raw())
                    .name(entry),
            );
        }

        let (bindings, attributes) = vertex_input(desc.vertex.buffers)?;
        let vertex_input_state =
            vk::PipelineVertexInputStateCreateInfo::default()
                .vertex_binding_descriptions(&bindings)
                .vertex_attribute_descriptions(&attributes);

        let input_assembly_state =
            vk::PipelineInputAssemblyStateCreateInfo::default()
                .topology(conv::primitive_topology(desc.primitive.topology))
                .primitive_restart_enable(
                    desc.primitive.strip_index_format.is_some(),
                );

        // Counts must be declared even though the values are dynamic.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let mut rasterization_state =
            vk::PipelineRasterizationStateCreateInfo::default()
                .polygon_mode(conv::polygon_mode(desc.primitive.polygon_mode))
                .cull_mode(conv::cull_mode(desc.primitive.cull_mode))
                .front_face(conv::front_face(desc.primitive.front_face))
                .line_width(1.0);
        if let Some(depth) = &desc.depth_stencil
            && (depth.depth_bias != 0 || depth.depth_bias_slope_scale != 0.0)
        {
            rasterization_state = rasterization_state
                .depth_bias_enable(true)
                .depth_bias_constant_factor(depth.depth_bias as f32)
                .depth_bias_slope_factor(depth.depth_bias_slope_scale)
                .depth_bias_clamp(depth.depth_bias_clamp);
        }

        let multisample_state =
            vk::PipelineMultisampleStateCreateInfo::default()
                .rasterization_samples(conv::sample_count(desc.sample_count));

        let depth_stencil_state =
            depth_stencil_state(desc.depth_stencil.as_ref());

        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .attachments(&blend_attachments);

        let dynamic_states =
            [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default()
            .dynamic_states(&dynamic_states);

        let layout = PipelineLayout::new(device, desc.label, groups)?;

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.raw())
            .render_pass(render_pass.raw())
            .subpass(0);

        // SAFETY: Every state struct, stage and entry point name referenced
        // by create_info lives until this call returns. The shader modules,
        // layout and render pass derive from device.
        let handle = unsafe {
            device.ash_device().create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&create_info),
                None,
            )
        }
        .map_err(|(_, e)| CreatePipelineError::Pipeline(e))?[0];
        // SAFETY: handle was just created from device.
        unsafe { device.label_object(handle, "render pipeline", desc.label) };

        Ok(Self {
            parent: Arc::clone(device),
            handle,
            layout,
        })
    }

    pub fn raw(&self) -> vk::Pipeline {
        self.handle
    }

    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }
}

impl Drop for RenderPipeline {
    fn drop(&mut self) {
        tracing::debug!("Dropping render pipeline {:?}", self.handle);
        // SAFETY: handle was created from parent; the layout field is
        // dropped after this.
        unsafe { self.parent.ash_device().destroy_pipeline(self.handle, None) };
    }
}

// ---------------------------------------------------------------------------
// ComputePipeline
// ---------------------------------------------------------------------------

pub struct ComputePipeline {
    parent: Arc<RawDevice>,
    handle: vk::Pipeline,
    layout: PipelineLayout,
}

impl std::fmt::Debug for ComputePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputePipeline")
            .field("handle", &self.handle)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl ComputePipeline {
    pub fn new(
        device: &Arc<RawDevice>,
        desc: &ComputePipelineDescriptor<'_>,
        groups: &[&BindGroupLayout],
        module: &ShaderModule,
    ) -> Result<Self, CreatePipelineError> {
        let entry = module.entry_point(desc.entry_point)?;
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(module.raw())
            .name(&entry);
        let layout = PipelineLayout::new(device, desc.label, groups)?;
        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(layout.raw());

        // SAFETY: create_info and the entry point name outlive this call;
        // module and layout derive from device.
        let handle = unsafe {
            device.ash_device().create_compute_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&create_info),
                None,
            )
        }
        .map_err(|(_, e)| CreatePipelineError::Pipeline(e))?[0];
        // SAFETY: handle was just created from device.
        unsafe { device.label_object(handle, "compute pipeline", desc.label) };

        Ok(Self {
            parent: Arc::clone(device),
            handle,
            layout,
        })
    }

    pub fn raw(&self) -> vk::Pipeline {
        self.handle
    }

    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        tracing::debug!("Dropping compute pipeline {:?}", self.handle);
        // SAFETY: handle was created from parent; the layout field is
        // dropped after this.
        unsafe { self.parent.ash_device().destroy_pipeline(self.handle, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rgfx_core::descriptor::{BlendState, VertexAttribute};
    use rgfx_core::{ColorWriteMask, CompareFunction, VertexStepMode};

    #[test]
    fn vertex_slots_become_bindings() {
        let per_vertex = [
            VertexAttribute {
                format: TextureFormat::R32G32Float,
                offset: 0,
                shader_location: 0,
            },
            VertexAttribute {
                format: TextureFormat::R8G8B8A8Unorm,
                offset: 8,
                shader_location: 1,
            },
        ];
        let per_instance = [VertexAttribute {
            format: TextureFormat::R32Float,
            offset: 0,
            shader_location: 2,
        }];
        let (bindings, attributes) = vertex_input(&[
            VertexBufferLayout {
                array_stride: 12,
                attributes: &per_vertex,
                step_mode: VertexStepMode::Vertex,
            },
            VertexBufferLayout {
                array_stride: 4,
                attributes: &per_instance,
                step_mode: VertexStepMode::Instance,
            },
        ])
        .unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[1].input_rate, vk::VertexInputRate::INSTANCE);
        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes[2].binding, 1);
        assert_eq!(attributes[1].format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn depth_formats_are_not_vertex_formats() {
        let attrs = [VertexAttribute {
            format: TextureFormat::Depth32Float,
            offset: 0,
            shader_location: 0,
        }];
        let err = vertex_input(&[VertexBufferLayout {
            array_stride: 4,
            attributes: &attrs,
            step_mode: VertexStepMode::Vertex,
        }])
        .unwrap_err();
        assert!(matches!(
            rgfx_core::Error::from(err),
            rgfx_core::Error::InvalidArgument(_)
        ));
    }

    #[test]
    fn blending_is_enabled_only_when_requested() {
        let opaque = ColorTargetState {
            format: TextureFormat::R8G8B8A8Unorm,
            blend: None,
            write_mask: ColorWriteMask::ALL,
        };
        let state = color_blend_attachment(&opaque);
        assert_eq!(state.blend_enable, vk::FALSE);
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);

        let blended = ColorTargetState {
            blend: Some(BlendState::ALPHA_BLENDING),
            ..opaque
        };
        let state = color_blend_attachment(&blended);
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(
            state.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
    }

    #[test]
    fn depth_state_enables_testing() {
        let none = depth_stencil_state(None);
        assert_eq!(none.depth_test_enable, vk::FALSE);

        let depth = DepthStencilState::depth_only(
            TextureFormat::Depth32Float,
            true,
            CompareFunction::Less,
        );
        let state = depth_stencil_state(Some(&depth));
        assert_eq!(state.depth_test_enable, vk::TRUE);
        assert_eq!(state.depth_write_enable, vk::TRUE);
        assert_eq!(state.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(state.stencil_test_enable, vk::FALSE);
    }
}
