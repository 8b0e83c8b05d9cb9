//! End-to-end checks against real adapters. Each test runs once per
//! compiled backend and skips backends the machine cannot provide.

mod common;

use rgfx::descriptor::{
    BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, BufferBindingType,
    BufferDescriptor, ColorTargetState, ComputePassBeginDescriptor,
    ComputePipelineDescriptor, CopyBufferToBufferDescriptor,
    CopyTextureToBufferDescriptor, DepthStencilState, FragmentState,
    FramebufferAttachment, FramebufferDescriptor, LoadStoreOps,
    MemoryBarrier, PipelineBarrierDescriptor, RenderPassBeginDescriptor,
    RenderPassColorAttachment, RenderPassColorTarget, RenderPassDescriptor,
    RenderPassDepthStencilTarget, RenderPipelineDescriptor,
    SemaphoreDescriptor, SubmitInfo, TextureDescriptor,
    TextureViewDescriptor, VertexState,
};
use rgfx::{
    AccessFlags, BufferUsage, Color, ColorWriteMask, CompareFunction,
    EncoderState, Error, Extent3D, MemoryProperty, Origin3D, PipelineStage,
    ResultCode, SampleCount, SemaphoreType, ShaderStage, TextureFormat,
    TextureLayout, TextureType, TextureUsage,
};

use common::{WAIT_NS, on_each_device};

const TWO_TARGETS: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    return out;
}

struct FragmentOutput {
    @location(0) first: vec4<f32>,
    @location(1) second: vec4<f32>,
};

@fragment
fn fs_main() -> FragmentOutput {
    var out: FragmentOutput;
    out.first = vec4<f32>(1.0, 0.0, 0.0, 1.0);
    out.second = vec4<f32>(0.0, 1.0, 0.0, 1.0);
    return out;
}
"#;

const DOUBLE: &str = r#"
@group(0) @binding(0) var<storage, read_write> values: array<u32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x < arrayLength(&values)) {
        values[id.x] = values[id.x] * 2u;
    }
}
"#;

fn color_target(
    format: TextureFormat,
    final_layout: TextureLayout,
) -> RenderPassColorTarget {
    RenderPassColorTarget {
        format,
        sample_count: SampleCount::X1,
        ops: LoadStoreOps::CLEAR_STORE,
        final_layout,
    }
}

fn attachment_texture(
    device: &rgfx::Device,
    format: TextureFormat,
    width: u32,
    height: u32,
) -> (rgfx::TextureHandle, rgfx::TextureViewHandle) {
    let texture = device
        .create_texture(&TextureDescriptor {
            label: Some("attachment"),
            size: Extent3D::d2(width, height),
            format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
            ..Default::default()
        })
        .expect("attachment texture");
    let view = device
        .create_texture_view(texture, &TextureViewDescriptor::default())
        .expect("attachment view");
    (texture, view)
}

#[test]
fn created_resources_report_what_was_requested() {
    on_each_device(|device| {
        let desc = BufferDescriptor {
            label: Some("vertices"),
            size: 1024,
            usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            memory_properties: MemoryProperty::DEVICE_LOCAL,
        };
        let buffer = device.create_buffer(&desc).unwrap();
        let info = device.buffer_info(buffer).unwrap();
        assert_eq!(info.size, desc.size);
        assert_eq!(info.usage, desc.usage);

        let desc = TextureDescriptor {
            label: Some("sampled"),
            texture_type: TextureType::D2,
            size: Extent3D::d2(128, 64),
            array_layer_count: 2,
            mip_level_count: 3,
            format: TextureFormat::R8G8B8A8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            ..Default::default()
        };
        let texture = device.create_texture(&desc).unwrap();
        assert_eq!(device.texture_info(texture).unwrap(), desc.info());
        assert_eq!(
            device.texture_layout(texture).unwrap(),
            TextureLayout::Undefined
        );

        device.destroy_texture(texture).unwrap();
        device.destroy_buffer(buffer).unwrap();
    });
}

#[test]
fn destroyed_handles_are_rejected_and_destroy_is_idempotent() {
    on_each_device(|device| {
        let buffer = device
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 64,
                usage: BufferUsage::UNIFORM,
                memory_properties: MemoryProperty::DEVICE_LOCAL,
            })
            .unwrap();
        device.destroy_buffer(buffer).unwrap();
        device.destroy_buffer(buffer).unwrap();
        assert!(matches!(
            device.buffer_info(buffer),
            Err(Error::InvalidHandle { .. })
        ));
    });
}

#[test]
fn invalid_descriptors_fail_before_reaching_the_driver() {
    on_each_device(|device| {
        let err = device
            .create_buffer(&BufferDescriptor {
                size: 0,
                usage: BufferUsage::VERTEX,
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidArgument);
        assert_eq!(
            device.queue_by_index(99, 99).unwrap_err().code(),
            ResultCode::NotFound
        );
    });
}

#[test]
fn framebuffers_must_match_their_render_pass() {
    on_each_device(|device| {
        let format = TextureFormat::R8G8B8A8Unorm;
        let color = RenderPassColorAttachment {
            target: color_target(format, TextureLayout::ColorAttachment),
            resolve_target: None,
        };
        let pass = device
            .create_render_pass(&RenderPassDescriptor {
                label: Some("two colors"),
                color_attachments: &[color, color],
                depth_stencil_attachment: None,
            })
            .unwrap();
        let (_, a) = attachment_texture(device, format, 32, 32);
        let (_, b) = attachment_texture(device, TextureFormat::R16Float, 32, 32);

        let attach = |view| FramebufferAttachment {
            view,
            resolve_target: None,
        };
        let too_few = device.create_framebuffer(&FramebufferDescriptor {
            label: None,
            render_pass: pass,
            color_attachments: &[attach(a)],
            depth_stencil_attachment: None,
            width: 32,
            height: 32,
        });
        assert!(matches!(too_few, Err(Error::Incompatible(_))));

        let wrong_format = device.create_framebuffer(&FramebufferDescriptor {
            label: None,
            render_pass: pass,
            color_attachments: &[attach(a), attach(b)],
            depth_stencil_attachment: None,
            width: 32,
            height: 32,
        });
        assert!(matches!(wrong_format, Err(Error::Incompatible(_))));
    });
}

#[test]
fn framebuffer_views_must_match_its_size() {
    on_each_device(|device| {
        let format = TextureFormat::R8G8B8A8Unorm;
        let pass = device
            .create_render_pass(&RenderPassDescriptor {
                label: Some("one color"),
                color_attachments: &[RenderPassColorAttachment {
                    target: color_target(format, TextureLayout::ColorAttachment),
                    resolve_target: None,
                }],
                depth_stencil_attachment: None,
            })
            .unwrap();
        let (_, view) = attachment_texture(device, format, 64, 64);
        let attachments = [FramebufferAttachment {
            view,
            resolve_target: None,
        }];
        let framebuffer = |width, height| {
            device.create_framebuffer(&FramebufferDescriptor {
                label: None,
                render_pass: pass,
                color_attachments: &attachments,
                depth_stencil_attachment: None,
                width,
                height,
            })
        };
        let err = framebuffer(32, 32).unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidArgument);
        assert!(framebuffer(64, 64).is_ok());
    });
}

#[test]
fn draw_into_two_colors_and_depth_then_signal_fence() {
    on_each_device(|device| {
        let (width, height) = (800, 600);
        let format = TextureFormat::R8G8B8A8Unorm;
        let depth_format = TextureFormat::Depth32Float;
        let color = RenderPassColorAttachment {
            target: color_target(format, TextureLayout::TransferSrc),
            resolve_target: None,
        };
        let pass = device
            .create_render_pass(&RenderPassDescriptor {
                label: Some("scene"),
                color_attachments: &[color, color],
                depth_stencil_attachment: Some(RenderPassDepthStencilTarget {
                    format: depth_format,
                    sample_count: SampleCount::X1,
                    depth_ops: LoadStoreOps::CLEAR_STORE,
                    stencil_ops: LoadStoreOps::DONT_CARE,
                    final_layout: TextureLayout::DepthStencilAttachment,
                }),
            })
            .unwrap();
        let (first, first_view) = attachment_texture(device, format, width, height);
        let (_, second_view) = attachment_texture(device, format, width, height);
        let depth = device
            .create_texture(&TextureDescriptor {
                label: Some("depth"),
                size: Extent3D::d2(width, height),
                format: depth_format,
                usage: TextureUsage::RENDER_ATTACHMENT,
                ..Default::default()
            })
            .unwrap();
        let depth_view = device
            .create_texture_view(depth, &TextureViewDescriptor::default())
            .unwrap();
        let framebuffer = device
            .create_framebuffer(&FramebufferDescriptor {
                label: Some("scene"),
                render_pass: pass,
                color_attachments: &[
                    FramebufferAttachment {
                        view: first_view,
                        resolve_target: None,
                    },
                    FramebufferAttachment {
                        view: second_view,
                        resolve_target: None,
                    },
                ],
                depth_stencil_attachment: Some(depth_view),
                width,
                height,
            })
            .unwrap();

        let module = common::shader(device, "two targets", TWO_TARGETS);
        let targets = [ColorTargetState {
            format,
            blend: None,
            write_mask: ColorWriteMask::ALL,
        }; 2];
        let pipeline = device
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: Some("two targets"),
                render_pass: pass,
                vertex: VertexState {
                    module,
                    entry_point: "vs_main",
                    buffers: &[],
                },
                fragment: Some(FragmentState {
                    module,
                    entry_point: "fs_main",
                    targets: &targets,
                }),
                primitive: Default::default(),
                depth_stencil: Some(DepthStencilState::depth_only(
                    depth_format,
                    true,
                    CompareFunction::Always,
                )),
                sample_count: SampleCount::X1,
                bind_group_layouts: &[],
            })
            .unwrap();

        // Frame pacing fence, signaled before the first frame.
        let in_flight = common::fence(device, true);
        device.wait_fence(in_flight, WAIT_NS).unwrap();
        device.reset_fence(in_flight).unwrap();

        let readback = common::readback_buffer(device, 64 * 64 * 4);
        let mut encoder = device.create_command_encoder(Some("frame")).unwrap();
        encoder.begin().unwrap();
        {
            let mut rpass = encoder
                .begin_render_pass(&RenderPassBeginDescriptor {
                    label: Some("scene"),
                    render_pass: pass,
                    framebuffer,
                    color_clear_values: &[Color::BLACK, Color::BLACK],
                    depth_clear_value: 1.0,
                    stencil_clear_value: 0,
                    occlusion_query_set: None,
                })
                .unwrap();
            rpass.set_pipeline(pipeline).unwrap();
            rpass.draw(3, 1, 0, 0).unwrap();
            rpass.end().unwrap();
        }
        encoder
            .copy_texture_to_buffer(&CopyTextureToBufferDescriptor {
                source: first,
                origin: Origin3D::ZERO,
                mip_level: 0,
                destination: readback,
                destination_offset: 0,
                extent: Extent3D::d2(64, 64),
                final_layout: TextureLayout::ColorAttachment,
            })
            .unwrap();
        encoder.end().unwrap();
        device
            .queue()
            .submit(
                &mut [&mut encoder],
                &SubmitInfo {
                    signal_fence: Some(in_flight),
                    ..Default::default()
                },
            )
            .unwrap();
        device.wait_fence(in_flight, WAIT_NS).unwrap();
        assert!(device.fence_status(in_flight).unwrap());

        let texels = common::read_buffer(device, readback, 64 * 64 * 4);
        assert!(texels.chunks_exact(4).all(|px| px == [255, 0, 0, 255]));
        assert_eq!(
            device.texture_layout(first).unwrap(),
            TextureLayout::ColorAttachment
        );
    });
}

#[test]
fn encoders_are_reusable_after_submission() {
    on_each_device(|device| {
        let mut encoder = device.create_command_encoder(Some("reused")).unwrap();
        assert_eq!(encoder.state(), EncoderState::Idle);
        for _ in 0..3 {
            encoder.begin().unwrap();
            assert_eq!(encoder.state(), EncoderState::Recording);
            encoder
                .pipeline_barrier(&PipelineBarrierDescriptor {
                    memory_barriers: &[MemoryBarrier {
                        src_stage_mask: PipelineStage::TRANSFER,
                        dst_stage_mask: PipelineStage::TRANSFER,
                        src_access_mask: AccessFlags::TRANSFER_WRITE,
                        dst_access_mask: AccessFlags::TRANSFER_READ,
                    }],
                    ..Default::default()
                })
                .unwrap();
            encoder.end().unwrap();
            common::submit_and_wait(device, &mut encoder);
        }
        // Backends that consume the native encoder on submit need a
        // replacement before the next recording.
        encoder.reset().unwrap();
        assert!(matches!(
            encoder.state(),
            EncoderState::Idle | EncoderState::NeedsRecreate
        ));
        encoder.begin().unwrap();
        assert_eq!(encoder.state(), EncoderState::Recording);
        encoder.end().unwrap();
    });
}

#[test]
fn rejected_submission_keeps_recorded_work() {
    on_each_device(|device| {
        let size = 256;
        let src = device
            .create_buffer(&BufferDescriptor {
                label: Some("source"),
                size,
                usage: BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
                memory_properties: MemoryProperty::DEVICE_LOCAL,
            })
            .unwrap();
        device.queue().write_buffer(src, 0, &[7; 256]).unwrap();
        let readback = common::readback_buffer(device, size);

        let mut recorded = device.create_command_encoder(Some("recorded")).unwrap();
        recorded.begin().unwrap();
        recorded
            .copy_buffer_to_buffer(&CopyBufferToBufferDescriptor {
                source: src,
                source_offset: 0,
                destination: readback,
                destination_offset: 0,
                size,
            })
            .unwrap();
        recorded.end().unwrap();
        let mut idle = device.create_command_encoder(Some("idle")).unwrap();

        let err = device
            .queue()
            .submit(&mut [&mut recorded, &mut idle], &SubmitInfo::default())
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidState);
        assert_eq!(recorded.state(), EncoderState::Ended);

        common::submit_and_wait(device, &mut recorded);
        assert_eq!(common::read_buffer(device, readback, 256), [7; 256]);
    });
}

#[test]
fn fences_start_signaled_on_request_and_reset() {
    on_each_device(|device| {
        let fence = common::fence(device, true);
        assert!(device.fence_status(fence).unwrap());
        device.reset_fence(fence).unwrap();
        assert!(!device.fence_status(fence).unwrap());
        assert_eq!(
            device.wait_fence(fence, 1_000_000).unwrap_err().code(),
            ResultCode::Timeout
        );
        device.destroy_fence(fence).unwrap();
    });
}

#[test]
fn timeline_semaphores_signal_from_the_host() {
    on_each_device(|device| {
        let Ok(semaphore) = device.create_semaphore(&SemaphoreDescriptor {
            label: Some("timeline"),
            semaphore_type: SemaphoreType::Timeline,
            initial_value: 1,
        }) else {
            eprintln!("skipping: no timeline semaphores on {:?}", device.backend());
            return;
        };
        assert_eq!(device.semaphore_type(semaphore).unwrap(), SemaphoreType::Timeline);
        assert_eq!(device.semaphore_value(semaphore).unwrap(), 1);
        device.signal_semaphore(semaphore, 5).unwrap();
        device.wait_semaphore(semaphore, 5, WAIT_NS).unwrap();
        assert_eq!(device.semaphore_value(semaphore).unwrap(), 5);
        assert_eq!(
            device.wait_semaphore(semaphore, 6, 1_000_000).unwrap_err().code(),
            ResultCode::Timeout
        );
        device.destroy_semaphore(semaphore).unwrap();
    });
}

#[test]
fn mip_chain_is_generated_from_each_parent() {
    on_each_device(|device| {
        let size = 64;
        let levels = 7;
        let texture = device
            .create_texture(&TextureDescriptor {
                label: Some("mipped"),
                size: Extent3D::d2(size, size),
                mip_level_count: levels,
                format: TextureFormat::R8G8B8A8Unorm,
                usage: TextureUsage::TEXTURE_BINDING
                    | TextureUsage::RENDER_ATTACHMENT
                    | TextureUsage::COPY_SRC
                    | TextureUsage::COPY_DST,
                ..Default::default()
            })
            .unwrap();
        let texels: Vec<u8> = [32u8, 96, 160, 255].repeat((size * size) as usize);
        device
            .queue()
            .write_texture(
                texture,
                Origin3D::ZERO,
                0,
                &texels,
                Extent3D::d2(size, size),
                TextureLayout::ShaderReadOnly,
            )
            .unwrap();

        let readback = common::readback_buffer(device, 256);
        let mut encoder = device.create_command_encoder(Some("mips")).unwrap();
        encoder.begin().unwrap();
        encoder.generate_mipmaps(texture).unwrap();
        encoder
            .copy_texture_to_buffer(&CopyTextureToBufferDescriptor {
                source: texture,
                origin: Origin3D::ZERO,
                mip_level: levels - 1,
                destination: readback,
                destination_offset: 0,
                extent: Extent3D::d2(1, 1),
                final_layout: TextureLayout::ShaderReadOnly,
            })
            .unwrap();
        encoder.end().unwrap();
        common::submit_and_wait(device, &mut encoder);

        let px = common::read_buffer(device, readback, 4);
        for (got, want) in px.iter().zip([32u8, 96, 160, 255]) {
            assert!(got.abs_diff(want) <= 1, "{px:?}");
        }
    });
}

#[test]
fn encoders_recorded_on_threads_run_in_submission_order() {
    on_each_device(|device| {
        const COUNT: u32 = 256;
        let size = u64::from(COUNT) * 4;
        let values: Vec<u32> = (0..COUNT).collect();
        let storage = device
            .create_buffer(&BufferDescriptor {
                label: Some("values"),
                size,
                usage: BufferUsage::STORAGE
                    | BufferUsage::COPY_SRC
                    | BufferUsage::COPY_DST,
                memory_properties: MemoryProperty::DEVICE_LOCAL,
            })
            .unwrap();
        device
            .queue()
            .write_buffer(storage, 0, bytemuck::cast_slice(&values))
            .unwrap();
        let readback = common::readback_buffer(device, size);

        let layout = device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: Some("values"),
                entries: &[BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStage::COMPUTE,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: 0,
                    },
                }],
            })
            .unwrap();
        let group = device
            .create_bind_group(&BindGroupDescriptor {
                label: Some("values"),
                layout,
                entries: &[BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::Buffer {
                        buffer: storage,
                        offset: 0,
                        size: 0,
                    },
                }],
            })
            .unwrap();
        let module = common::shader(device, "double", DOUBLE);
        let pipeline = device
            .create_compute_pipeline(&ComputePipelineDescriptor {
                label: Some("double"),
                compute: module,
                entry_point: "main",
                bind_group_layouts: &[layout],
            })
            .unwrap();
        let done = device
            .create_semaphore(&SemaphoreDescriptor {
                label: Some("doubled"),
                ..Default::default()
            })
            .unwrap();

        let mut first = device.create_command_encoder(Some("double")).unwrap();
        let mut second = device.create_command_encoder(Some("copy")).unwrap();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                first.begin().unwrap();
                let mut cpass = first
                    .begin_compute_pass(&ComputePassBeginDescriptor::default())
                    .unwrap();
                cpass.set_pipeline(pipeline).unwrap();
                cpass.set_bind_group(0, group, &[]).unwrap();
                cpass.dispatch_workgroups(COUNT / 64, 1, 1).unwrap();
                cpass.end().unwrap();
                first.end().unwrap();
            });
            scope.spawn(|| {
                second.begin().unwrap();
                second
                    .pipeline_barrier(&PipelineBarrierDescriptor {
                        memory_barriers: &[MemoryBarrier {
                            src_stage_mask: PipelineStage::COMPUTE_SHADER,
                            dst_stage_mask: PipelineStage::TRANSFER,
                            src_access_mask: AccessFlags::SHADER_WRITE,
                            dst_access_mask: AccessFlags::TRANSFER_READ,
                        }],
                        ..Default::default()
                    })
                    .unwrap();
                second
                    .copy_buffer_to_buffer(&CopyBufferToBufferDescriptor {
                        source: storage,
                        source_offset: 0,
                        destination: readback,
                        destination_offset: 0,
                        size,
                    })
                    .unwrap();
                second.end().unwrap();
            });
        });

        let queue = device.queue();
        queue
            .submit(
                &mut [&mut first],
                &SubmitInfo {
                    signal_semaphores: &[done],
                    ..Default::default()
                },
            )
            .unwrap();
        let fence = common::fence(device, false);
        queue
            .submit(
                &mut [&mut second],
                &SubmitInfo {
                    wait_semaphores: &[done],
                    signal_fence: Some(fence),
                    ..Default::default()
                },
            )
            .unwrap();
        device.wait_fence(fence, WAIT_NS).unwrap();

        let bytes = common::read_buffer(device, readback, size as usize);
        let doubled: &[u32] = bytemuck::cast_slice(&bytes);
        assert!(doubled.iter().zip(&values).all(|(d, v)| *d == v * 2));
    });
}

#[test]
fn mip_generation_on_a_single_level_is_a_no_op() {
    on_each_device(|device| {
        let texture = device
            .create_texture(&TextureDescriptor {
                label: Some("single level"),
                size: Extent3D::d2(16, 16),
                format: TextureFormat::R8G8B8A8Unorm,
                usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
                ..Default::default()
            })
            .unwrap();
        let mut encoder = device.create_command_encoder(None).unwrap();
        encoder.begin().unwrap();
        encoder.generate_mipmaps(texture).unwrap();
        encoder.end().unwrap();
        common::submit_and_wait(device, &mut encoder);
        assert_eq!(device.texture_info(texture).unwrap().mip_level_count, 1);
    });
}
