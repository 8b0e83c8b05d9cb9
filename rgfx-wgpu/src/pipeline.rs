use rgfx_core::compat::{self, CompatibilityError};
use rgfx_core::descriptor::{
    BlendComponent, BlendState, ColorTargetState, ComputePipelineDescriptor,
    DepthStencilState, RenderPipelineDescriptor, StencilFaceState,
    VertexBufferLayout,
};
use rgfx_core::{PrimitiveTopology, TextureFormat};
use thiserror::Error;

use crate::binding::BindGroupLayout;
use crate::conv;
use crate::error::scoped;
use crate::pass::RenderPass;
use crate::shader::ShaderModule;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CreatePipelineError {
    #[error("{0:?} cannot be used as a vertex attribute format")]
    VertexFormat(TextureFormat),

    #[error("Pipeline does not match its render pass: {0}")]
    Incompatible(#[from] CompatibilityError),
}

impl From<CreatePipelineError> for rgfx_core::Error {
    fn from(value: CreatePipelineError) -> Self {
        match value {
            CreatePipelineError::VertexFormat(_) => {
                rgfx_core::Error::invalid_argument(value.to_string())
            }
            CreatePipelineError::Incompatible(e) => {
                rgfx_core::Error::Incompatible(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineLayout
// ---------------------------------------------------------------------------

/// A `wgpu::PipelineLayout` plus the dynamic offset count of each group,
/// kept for checking `set_bind_group` calls.
pub struct PipelineLayout {
    raw: wgpu::PipelineLayout,
    dynamic_offsets: Vec<usize>,
}

impl std::fmt::Debug for PipelineLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineLayout")
            .field("groups", &self.dynamic_offsets.len())
            .finish_non_exhaustive()
    }
}

impl PipelineLayout {
    pub fn new(
        device: &wgpu::Device,
        label: Option<&str>,
        groups: &[&BindGroupLayout],
    ) -> rgfx_core::Result<Self> {
        let layouts: Vec<&wgpu::BindGroupLayout> =
            groups.iter().map(|g| g.raw()).collect();
        let raw = scoped(device, "create_pipeline_layout", || {
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label,
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            })
        })?;
        Ok(Self {
            raw,
            dynamic_offsets: groups
                .iter()
                .map(|g| g.dynamic_offset_count())
                .collect(),
        })
    }

    pub fn raw(&self) -> &wgpu::PipelineLayout {
        &self.raw
    }

    pub fn group_count(&self) -> u32 {
        self.dynamic_offsets.len() as u32
    }

    /// Dynamic offsets group `index` expects, or `None` past the last group.
    pub fn dynamic_offset_count(&self, index: u32) -> Option<usize> {
        self.dynamic_offsets.get(index as usize).copied()
    }
}

// ---------------------------------------------------------------------------
// State conversion
// ---------------------------------------------------------------------------

/// Native attributes of each vertex buffer slot.
pub fn vertex_attributes(
    buffers: &[VertexBufferLayout<'_>],
) -> Result<Vec<Vec<wgpu::VertexAttribute>>, CreatePipelineError> {
    buffers
        .iter()
        .map(|buffer| {
            buffer
                .attributes
                .iter()
                .map(|a| {
                    Ok(wgpu::VertexAttribute {
                        format: conv::vertex_format(a.format)
                            .ok_or(CreatePipelineError::VertexFormat(a.format))?,
                        offset: a.offset,
                        shader_location: a.shader_location,
                    })
                })
                .collect()
        })
        .collect()
}

fn blend_component(component: &BlendComponent) -> wgpu::BlendComponent {
    wgpu::BlendComponent {
        src_factor: conv::blend_factor(component.src_factor),
        dst_factor: conv::blend_factor(component.dst_factor),
        operation: conv::blend_operation(component.operation),
    }
}

pub fn blend_state(blend: &BlendState) -> wgpu::BlendState {
    wgpu::BlendState {
        color: blend_component(&blend.color),
        alpha: blend_component(&blend.alpha),
    }
}

pub fn color_target(
    target: &ColorTargetState,
) -> rgfx_core::Result<wgpu::ColorTargetState> {
    Ok(wgpu::ColorTargetState {
        format: conv::require_texture_format(target.format)?,
        blend: target.blend.as_ref().map(blend_state),
        write_mask: conv::color_writes(target.write_mask),
    })
}

fn stencil_face(face: &StencilFaceState) -> wgpu::StencilFaceState {
    wgpu::StencilFaceState {
        compare: conv::compare_function(face.compare),
        fail_op: conv::stencil_operation(face.fail_op),
        depth_fail_op: conv::stencil_operation(face.depth_fail_op),
        pass_op: conv::stencil_operation(face.pass_op),
    }
}

pub fn depth_stencil_state(
    state: &DepthStencilState,
) -> rgfx_core::Result<wgpu::DepthStencilState> {
    Ok(wgpu::DepthStencilState {
        format: conv::require_texture_format(state.format)?,
        depth_write_enabled: state.depth_write_enabled,
        depth_compare: conv::compare_function(state.depth_compare),
        stencil: wgpu::StencilState {
            front: stencil_face(&state.stencil_front),
            back: stencil_face(&state.stencil_back),
            read_mask: state.stencil_read_mask,
            write_mask: state.stencil_write_mask,
        },
        bias: wgpu::DepthBiasState {
            constant: state.depth_bias,
            slope_scale: state.depth_bias_slope_scale,
            clamp: state.depth_bias_clamp,
        },
    })
}

/// Strip index formats are only legal on strip topologies.
fn strip_index_format(
    topology: PrimitiveTopology,
    format: Option<rgfx_core::IndexFormat>,
) -> Option<wgpu::IndexFormat> {
    match topology {
        PrimitiveTopology::LineStrip | PrimitiveTopology::TriangleStrip => {
            format.map(conv::index_format)
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// RenderPipeline
// ---------------------------------------------------------------------------

pub struct RenderPipeline {
    raw: wgpu::RenderPipeline,
    layout: PipelineLayout,
}

impl std::fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl RenderPipeline {
    pub fn new(
        device: &wgpu::Device,
        desc: &RenderPipelineDescriptor<'_>,
        render_pass: &RenderPass,
        groups: &[&BindGroupLayout],
        vertex_module: &ShaderModule,
        fragment_module: Option<&ShaderModule>,
    ) -> rgfx_core::Result<Self> {
        let pass_layout = render_pass.layout();
        let color_formats: Vec<TextureFormat> = match &desc.fragment {
            Some(fragment) => fragment.targets.iter().map(|t| t.format).collect(),
            None => pass_layout.color_formats().collect(),
        };
        compat::check_pipeline_targets(
            pass_layout,
            &color_formats,
            desc.depth_stencil.map(|d| d.format),
            desc.sample_count,
        )
        .map_err(CreatePipelineError::from)?;

        let attributes = vertex_attributes(desc.vertex.buffers)?;
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = desc
            .vertex
            .buffers
            .iter()
            .zip(&attributes)
            .map(|(buffer, attributes)| wgpu::VertexBufferLayout {
                array_stride: buffer.array_stride,
                step_mode: conv::step_mode(buffer.step_mode),
                attributes,
            })
            .collect();

        let targets = match &desc.fragment {
            Some(fragment) => fragment
                .targets
                .iter()
                .map(|t| color_target(t).map(Some))
                .collect::<rgfx_core::Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        let fragment = match (&desc.fragment, fragment_module) {
            (Some(fragment), Some(module)) => Some(wgpu::FragmentState {
                module: module.raw(),
                entry_point: module.entry_point(fragment.entry_point),
                compilation_options: Default::default(),
                targets: &targets,
            }),
            _ => None,
        };

        let primitive = wgpu::PrimitiveState {
            topology: conv::primitive_topology(desc.primitive.topology),
            strip_index_format: strip_index_format(
                desc.primitive.topology,
                desc.primitive.strip_index_format,
            ),
            front_face: conv::front_face(desc.primitive.front_face),
            cull_mode: conv::cull_mode(desc.primitive.cull_mode)?,
            unclipped_depth: false,
            polygon_mode: conv::polygon_mode(desc.primitive.polygon_mode),
            conservative: false,
        };
        let depth_stencil =
            desc.depth_stencil.as_ref().map(depth_stencil_state).transpose()?;

        let layout = PipelineLayout::new(device, desc.label, groups)?;
        let raw = scoped(device, "create_render_pipeline", || {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: desc.label,
                layout: Some(layout.raw()),
                vertex: wgpu::VertexState {
                    module: vertex_module.raw(),
                    entry_point: vertex_module
                        .entry_point(desc.vertex.entry_point),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                primitive,
                depth_stencil,
                multisample: wgpu::MultisampleState {
                    count: desc.sample_count.count(),
                    ..Default::default()
                },
                fragment,
                multiview: None,
                cache: None,
            })
        })?;
        Ok(Self { raw, layout })
    }

    pub fn raw(&self) -> &wgpu::RenderPipeline {
        &self.raw
    }

    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }
}

impl Drop for RenderPipeline {
    fn drop(&mut self) {
        tracing::debug!("Dropping render pipeline {:?}", self.raw);
    }
}

// ---------------------------------------------------------------------------
// ComputePipeline
// ---------------------------------------------------------------------------

pub struct ComputePipeline {
    raw: wgpu::ComputePipeline,
    layout: PipelineLayout,
}

impl std::fmt::Debug for ComputePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputePipeline")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl ComputePipeline {
    pub fn new(
        device: &wgpu::Device,
        desc: &ComputePipelineDescriptor<'_>,
        groups: &[&BindGroupLayout],
        module: &ShaderModule,
    ) -> rgfx_core::Result<Self> {
        let layout = PipelineLayout::new(device, desc.label, groups)?;
        let raw = scoped(device, "create_compute_pipeline", || {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: desc.label,
                layout: Some(layout.raw()),
                module: module.raw(),
                entry_point: module.entry_point(desc.entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;
        Ok(Self { raw, layout })
    }

    pub fn raw(&self) -> &wgpu::ComputePipeline {
        &self.raw
    }

    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        tracing::debug!("Dropping compute pipeline {:?}", self.raw);
    }
}

#[cfg(test)]
mod tests {
    use rgfx_core::descriptor::VertexAttribute;
    use rgfx_core::{
        BlendFactor, BlendOperation, ColorWriteMask, IndexFormat,
        VertexStepMode,
    };

    use super::*;

    #[test]
    fn vertex_slots_keep_their_attributes() {
        let per_vertex = [
            VertexAttribute {
                format: TextureFormat::R32G32B32Float,
                offset: 0,
                shader_location: 0,
            },
            VertexAttribute {
                format: TextureFormat::R8G8B8A8Unorm,
                offset: 12,
                shader_location: 1,
            },
        ];
        let attributes = vertex_attributes(&[VertexBufferLayout {
            array_stride: 16,
            attributes: &per_vertex,
            step_mode: VertexStepMode::Vertex,
        }])
        .unwrap();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0][0].format, wgpu::VertexFormat::Float32x3);
        assert_eq!(attributes[0][1].offset, 12);
        assert_eq!(attributes[0][1].shader_location, 1);
    }

    #[test]
    fn depth_formats_are_not_vertex_formats() {
        let attribute = [VertexAttribute {
            format: TextureFormat::Depth32Float,
            offset: 0,
            shader_location: 0,
        }];
        assert!(matches!(
            vertex_attributes(&[VertexBufferLayout {
                array_stride: 4,
                attributes: &attribute,
                step_mode: VertexStepMode::Vertex,
            }]),
            Err(CreatePipelineError::VertexFormat(TextureFormat::Depth32Float))
        ));
    }

    #[test]
    fn blending_translates_per_component() {
        let component = BlendComponent {
            operation: BlendOperation::Add,
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
        };
        let target = color_target(&ColorTargetState {
            format: TextureFormat::B8G8R8A8Unorm,
            blend: Some(BlendState {
                color: component,
                alpha: component,
            }),
            write_mask: ColorWriteMask::ALL,
        })
        .unwrap();
        assert_eq!(target.blend, Some(wgpu::BlendState::ALPHA_BLENDING));
        assert_eq!(target.write_mask, wgpu::ColorWrites::ALL);
    }

    #[test]
    fn strip_index_format_only_on_strips() {
        assert_eq!(
            strip_index_format(
                PrimitiveTopology::TriangleStrip,
                Some(IndexFormat::Uint16)
            ),
            Some(wgpu::IndexFormat::Uint16)
        );
        assert_eq!(
            strip_index_format(
                PrimitiveTopology::TriangleList,
                Some(IndexFormat::Uint16)
            ),
            None
        );
    }
}
