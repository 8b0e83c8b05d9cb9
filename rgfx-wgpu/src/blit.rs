//! Filtered blits and mip generation.
//!
//! WebGPU has no blit command. A blit draws a full-screen triangle into the
//! destination region, sampling the source region. Pipelines are cached per
//! destination format and sampler kind; every blit renders one mip of one
//! layer.

use std::collections::HashMap;
use std::sync::Mutex;

use rgfx_core::{Extent3D, FilterMode, Origin3D};

use crate::error::scoped;

const SHADER: &str = r#"
struct Region {
    offset: vec2<f32>,
    scale: vec2<f32>,
}

@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;
@group(0) @binding(2) var<uniform> region: Region;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let corner = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(corner.x * 2.0 - 1.0, 1.0 - corner.y * 2.0, 0.0, 1.0);
    out.uv = region.offset + corner * region.scale;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSampleLevel(source, source_sampler, in.uv, 0.0);
}
"#;

/// Normalised source rectangle as `[offset.x, offset.y, scale.x, scale.y]`
/// for a region of a mip of `mip_size`.
pub fn source_rect(origin: Origin3D, extent: Extent3D, mip_size: Extent3D) -> [f32; 4] {
    let width = mip_size.width.max(1) as f32;
    let height = mip_size.height.max(1) as f32;
    [
        origin.x as f32 / width,
        origin.y as f32 / height,
        extent.width as f32 / width,
        extent.height as f32 / height,
    ]
}

/// One side of a blit: a 2D region of one mip and layer.
#[derive(Debug, Clone, Copy)]
pub struct BlitSurface<'a> {
    pub texture: &'a wgpu::Texture,
    pub mip_level: u32,
    pub layer: u32,
    pub origin: Origin3D,
    pub extent: Extent3D,
}

impl BlitSurface<'_> {
    fn mip_size(&self) -> Extent3D {
        let size = self.texture.size();
        Extent3D {
            width: (size.width >> self.mip_level).max(1),
            height: (size.height >> self.mip_level).max(1),
            depth: 1,
        }
    }

    fn view(&self) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("blit"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: self.mip_level,
            mip_level_count: Some(1),
            base_array_layer: self.layer,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }
}

/// Whether `format` can be sampled as float, and filtered.
fn float_sampling(
    format: wgpu::TextureFormat,
    features: wgpu::Features,
) -> Option<bool> {
    match format.sample_type(None, Some(features)) {
        Some(wgpu::TextureSampleType::Float { filterable }) => Some(filterable),
        _ => None,
    }
}

fn bind_group_layout(device: &wgpu::Device, filterable: bool) -> wgpu::BindGroupLayout {
    let sampler = if filterable {
        wgpu::SamplerBindingType::Filtering
    } else {
        wgpu::SamplerBindingType::NonFiltering
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("blit"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(sampler),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

fn sampler(device: &wgpu::Device, filter: wgpu::FilterMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("blit"),
        mag_filter: filter,
        min_filter: filter,
        ..Default::default()
    })
}

pub struct Blitter {
    shader: wgpu::ShaderModule,
    /// Indexed by whether the source is filterable.
    layouts: [wgpu::BindGroupLayout; 2],
    pipeline_layouts: [wgpu::PipelineLayout; 2],
    nearest: wgpu::Sampler,
    linear: wgpu::Sampler,
    pipelines: Mutex<HashMap<(wgpu::TextureFormat, bool), wgpu::RenderPipeline>>,
}

impl std::fmt::Debug for Blitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blitter")
            .field(
                "pipelines",
                &self.pipelines.lock().expect("blit cache lock poisoned").len(),
            )
            .finish_non_exhaustive()
    }
}

impl Blitter {
    pub fn new(device: &wgpu::Device) -> rgfx_core::Result<Self> {
        scoped(device, "create_blitter", || {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("blit"),
                source: wgpu::ShaderSource::Wgsl(SHADER.into()),
            });
            let layouts = [
                bind_group_layout(device, false),
                bind_group_layout(device, true),
            ];
            let pipeline_layouts = [0, 1].map(|i| {
                device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("blit"),
                    bind_group_layouts: &[&layouts[i]],
                    push_constant_ranges: &[],
                })
            });
            Self {
                shader,
                layouts,
                pipeline_layouts,
                nearest: sampler(device, wgpu::FilterMode::Nearest),
                linear: sampler(device, wgpu::FilterMode::Linear),
                pipelines: Mutex::new(HashMap::new()),
            }
        })
    }

    fn pipeline(
        &self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        filterable: bool,
    ) -> wgpu::RenderPipeline {
        let mut pipelines = self.pipelines.lock().expect("blit cache lock poisoned");
        pipelines
            .entry((format, filterable))
            .or_insert_with(|| {
                tracing::debug!("Creating blit pipeline for {format:?}");
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("blit"),
                    layout: Some(&self.pipeline_layouts[usize::from(filterable)]),
                    vertex: wgpu::VertexState {
                        module: &self.shader,
                        entry_point: Some("vs_main"),
                        compilation_options: Default::default(),
                        buffers: &[],
                    },
                    primitive: wgpu::PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    fragment: Some(wgpu::FragmentState {
                        module: &self.shader,
                        entry_point: Some("fs_main"),
                        compilation_options: Default::default(),
                        targets: &[Some(format.into())],
                    }),
                    multiview: None,
                    cache: None,
                })
            })
            .clone()
    }

    /// Check both sides can take part in a blit with `filter`.
    pub fn check(
        device: &wgpu::Device,
        source: &wgpu::Texture,
        destination: &wgpu::Texture,
        filter: FilterMode,
    ) -> rgfx_core::Result<()> {
        for texture in [source, destination] {
            if texture.dimension() != wgpu::TextureDimension::D2 {
                return Err(rgfx_core::Error::unsupported(
                    "only 2D textures can be blitted",
                ));
            }
        }
        if !source.usage().contains(wgpu::TextureUsages::TEXTURE_BINDING) {
            return Err(rgfx_core::Error::unsupported(format!(
                "{:?} sources cannot be sampled for a blit",
                source.format()
            )));
        }
        if !destination
            .usage()
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
        {
            return Err(rgfx_core::Error::unsupported(format!(
                "{:?} destinations cannot be rendered for a blit",
                destination.format()
            )));
        }
        let filterable = float_sampling(source.format(), device.features())
            .ok_or_else(|| {
                rgfx_core::Error::unsupported(format!(
                    "{:?} cannot be sampled as float for a blit",
                    source.format()
                ))
            })?;
        if filter == FilterMode::Linear && !filterable {
            return Err(rgfx_core::Error::invalid_argument(format!(
                "{:?} cannot be blitted with linear filtering",
                source.format()
            )));
        }
        Ok(())
    }

    /// Record a blit of one region. Both sides must have passed
    /// [`Blitter::check`].
    pub fn blit(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        source: &BlitSurface<'_>,
        destination: &BlitSurface<'_>,
        filter: FilterMode,
    ) {
        let filterable = float_sampling(source.texture.format(), device.features())
            .unwrap_or(false);
        let pipeline = self.pipeline(device, destination.texture.format(), filterable);
        let sampler = match (filter, filterable) {
            (FilterMode::Linear, true) => &self.linear,
            _ => &self.nearest,
        };

        let rect = source_rect(source.origin, source.extent, source.mip_size());
        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("blit region"),
            size: std::mem::size_of_val(&rect) as u64,
            usage: wgpu::BufferUsages::UNIFORM,
            mapped_at_creation: true,
        });
        uniforms
            .slice(..)
            .get_mapped_range_mut()
            .copy_from_slice(bytemuck::cast_slice(&rect));
        uniforms.unmap();

        let source_view = source.view();
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blit"),
            layout: &self.layouts[usize::from(filterable)],
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniforms.as_entire_binding(),
                },
            ],
        });

        let target = destination.view();
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("blit"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        let (x, y) = (destination.origin.x as u32, destination.origin.y as u32);
        let (width, height) = (destination.extent.width, destination.extent.height);
        pass.set_viewport(x as f32, y as f32, width as f32, height as f32, 0.0, 1.0);
        pass.set_scissor_rect(x, y, width, height);
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    /// Downsample `levels` of every layer of `texture`, each level from the
    /// one before it.
    pub fn generate_mipmaps(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        levels: std::ops::Range<u32>,
        layers: std::ops::Range<u32>,
    ) {
        let filter = match float_sampling(texture.format(), device.features()) {
            Some(true) => FilterMode::Linear,
            _ => FilterMode::Nearest,
        };
        for layer in layers {
            for dst in levels.start + 1..levels.end {
                let side = |mip_level| {
                    let surface = BlitSurface {
                        texture,
                        mip_level,
                        layer,
                        origin: Origin3D::ZERO,
                        extent: Extent3D::new(1, 1, 1),
                    };
                    BlitSurface {
                        extent: surface.mip_size(),
                        ..surface
                    }
                };
                self.blit(device, encoder, &side(dst - 1), &side(dst), filter);
            }
        }
    }
}

impl Drop for Blitter {
    fn drop(&mut self) {
        tracing::debug!("Dropping blitter {:?}", self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_mip_maps_to_unit_square() {
        let size = Extent3D::new(64, 32, 1);
        assert_eq!(
            source_rect(Origin3D::ZERO, size, size),
            [0.0, 0.0, 1.0, 1.0]
        );
    }

    #[test]
    fn sub_region_is_normalised_to_its_mip() {
        let rect = source_rect(
            Origin3D::new(16, 8, 0),
            Extent3D::new(32, 8, 1),
            Extent3D::new(64, 32, 1),
        );
        assert_eq!(rect, [0.25, 0.25, 0.5, 0.25]);
    }

    #[test]
    fn degenerate_mip_size_does_not_divide_by_zero() {
        let rect = source_rect(
            Origin3D::ZERO,
            Extent3D::new(1, 1, 1),
            Extent3D::new(0, 0, 1),
        );
        assert_eq!(rect, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn float_formats_report_filtering() {
        let features = wgpu::Features::empty();
        assert_eq!(
            float_sampling(wgpu::TextureFormat::Rgba8Unorm, features),
            Some(true)
        );
        assert_eq!(
            float_sampling(wgpu::TextureFormat::R32Float, features),
            Some(false)
        );
        assert_eq!(float_sampling(wgpu::TextureFormat::Rgba8Uint, features), None);
    }
}
