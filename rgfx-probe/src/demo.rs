//! Offscreen workloads that read their results back and check them.

use std::time::Instant;

use eyre::{WrapErr, ensure};
use rgfx::descriptor::{
    BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, BufferBindingType,
    BufferDescriptor, ColorTargetState, ComputePassBeginDescriptor,
    ComputePipelineDescriptor, CopyBufferToBufferDescriptor,
    CopyTextureToBufferDescriptor, DeviceDescriptor, DeviceExtension,
    FenceDescriptor, FragmentState, FramebufferAttachment,
    FramebufferDescriptor, LoadStoreOps, MemoryBarrier,
    PipelineBarrierDescriptor, RenderPassBeginDescriptor,
    RenderPassColorAttachment, RenderPassColorTarget, RenderPassDescriptor,
    RenderPipelineDescriptor, SemaphoreDescriptor, SubmitInfo,
    TextureDescriptor, TextureViewDescriptor, VertexState,
};
use rgfx::{
    AccessFlags, Adapter, BufferHandle, BufferUsage, Color, ColorWriteMask,
    CommandEncoder, Device, Extent3D, MemoryProperty, Origin3D, PipelineStage,
    SampleCount, SemaphoreType, ShaderStage, TextureFormat, TextureLayout,
    TextureUsage,
};

use crate::shader;

const WAIT_NS: u64 = 5_000_000_000;

const TRIANGLE_WGSL: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let x = f32(i32(index) - 1);
    let y = f32(i32(index & 1u) * 2 - 1);
    return vec4<f32>(x, y, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.5, 0.0, 1.0);
}
"#;

pub(crate) const DOUBLE_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read_write> values: array<u32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x < arrayLength(&values)) {
        values[id.x] = values[id.x] * 2u;
    }
}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Demo {
    All,
    Triangle,
    Compute,
    Sync,
    Mipmaps,
}

pub fn run(adapter: &Adapter, demo: Demo) -> eyre::Result<()> {
    let info = adapter.info();
    let offered = adapter.extensions();
    let extensions: Vec<DeviceExtension> = DeviceExtension::ALL
        .into_iter()
        .filter(|e| offered.contains(&e.name()))
        .collect();
    let device = adapter.create_device(&DeviceDescriptor {
        label: Some("probe"),
        enabled_extensions: &extensions,
        ..Default::default()
    })?;
    println!("running on {} ({})", info.name, device.backend().name());

    let demos: &[(Demo, fn(&Device) -> eyre::Result<()>)] = &[
        (Demo::Triangle, triangle),
        (Demo::Compute, compute),
        (Demo::Sync, sync),
        (Demo::Mipmaps, mipmaps),
    ];
    for (kind, body) in demos {
        if demo != Demo::All && demo != *kind {
            continue;
        }
        let start = Instant::now();
        body(&device).wrap_err_with(|| format!("{kind:?} demo"))?;
        println!("{kind:?}: ok in {:.2?}", start.elapsed());
    }
    device.wait_idle()?;
    Ok(())
}

fn readback_buffer(device: &Device, size: u64) -> eyre::Result<BufferHandle> {
    Ok(device.create_buffer(&BufferDescriptor {
        label: Some("readback"),
        size,
        usage: BufferUsage::MAP_READ | BufferUsage::COPY_DST,
        memory_properties: MemoryProperty::HOST_VISIBLE | MemoryProperty::HOST_COHERENT,
    })?)
}

fn read_back(device: &Device, buffer: BufferHandle, len: usize) -> eyre::Result<Vec<u8>> {
    let mut out = vec![0; len];
    device.map_buffer(buffer, 0, 0)?;
    let read = device.read_mapped(buffer, 0, &mut out);
    device.unmap_buffer(buffer)?;
    read?;
    Ok(out)
}

fn submit_and_wait(device: &Device, encoder: &mut CommandEncoder) -> eyre::Result<()> {
    let fence = device.create_fence(&FenceDescriptor::default())?;
    device.queue().submit(
        &mut [encoder],
        &SubmitInfo {
            signal_fence: Some(fence),
            ..Default::default()
        },
    )?;
    device.wait_fence(fence, WAIT_NS)?;
    device.destroy_fence(fence)?;
    Ok(())
}

fn triangle(device: &Device) -> eyre::Result<()> {
    let (width, height) = (256, 256);
    let format = TextureFormat::R8G8B8A8Unorm;
    let pass = device.create_render_pass(&RenderPassDescriptor {
        label: Some("triangle"),
        color_attachments: &[RenderPassColorAttachment {
            target: RenderPassColorTarget {
                format,
                sample_count: SampleCount::X1,
                ops: LoadStoreOps::CLEAR_STORE,
                final_layout: TextureLayout::TransferSrc,
            },
            resolve_target: None,
        }],
        depth_stencil_attachment: None,
    })?;
    let target = device.create_texture(&TextureDescriptor {
        label: Some("triangle target"),
        size: Extent3D::d2(width, height),
        format,
        usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
        ..Default::default()
    })?;
    let view = device.create_texture_view(target, &TextureViewDescriptor::default())?;
    let framebuffer = device.create_framebuffer(&FramebufferDescriptor {
        label: Some("triangle"),
        render_pass: pass,
        color_attachments: &[FramebufferAttachment {
            view,
            resolve_target: None,
        }],
        depth_stencil_attachment: None,
        width,
        height,
    })?;
    let module = shader::load(device, "triangle", TRIANGLE_WGSL)?;
    let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("triangle"),
        render_pass: pass,
        vertex: VertexState {
            module,
            entry_point: "vs_main",
            buffers: &[],
        },
        fragment: Some(FragmentState {
            module,
            entry_point: "fs_main",
            targets: &[ColorTargetState {
                format,
                blend: None,
                write_mask: ColorWriteMask::ALL,
            }],
        }),
        primitive: Default::default(),
        depth_stencil: None,
        sample_count: SampleCount::X1,
        bind_group_layouts: &[],
    })?;

    let row = u64::from(width) * 4;
    let readback = readback_buffer(device, row * u64::from(height))?;
    let mut encoder = device.create_command_encoder(Some("triangle"))?;
    encoder.begin()?;
    {
        let mut rpass = encoder.begin_render_pass(&RenderPassBeginDescriptor {
            label: Some("triangle"),
            render_pass: pass,
            framebuffer,
            color_clear_values: &[Color::new(0.0, 0.0, 0.25, 1.0)],
            depth_clear_value: 1.0,
            stencil_clear_value: 0,
            occlusion_query_set: None,
        })?;
        rpass.set_pipeline(pipeline)?;
        rpass.draw(3, 1, 0, 0)?;
        rpass.end()?;
    }
    encoder.copy_texture_to_buffer(&CopyTextureToBufferDescriptor {
        source: target,
        origin: Origin3D::ZERO,
        mip_level: 0,
        destination: readback,
        destination_offset: 0,
        extent: Extent3D::d2(width, height),
        final_layout: TextureLayout::ColorAttachment,
    })?;
    encoder.end()?;
    submit_and_wait(device, &mut encoder)?;

    let texels = read_back(device, readback, (row * u64::from(height)) as usize)?;
    let pixel = |x: u64, y: u64| {
        let at = (y * row + x * 4) as usize;
        &texels[at..at + 4]
    };
    let center = pixel(u64::from(width) / 2, u64::from(height) / 2);
    let outside = pixel(0, u64::from(height) / 2);
    ensure!(
        center == [255, 128, 0, 255] || center == [255, 127, 0, 255],
        "center {center:?}"
    );
    ensure!(
        outside == [0, 0, 64, 255] || outside == [0, 0, 63, 255],
        "outside {outside:?}"
    );

    device.destroy_render_pipeline(pipeline)?;
    device.destroy_shader(module)?;
    device.destroy_framebuffer(framebuffer)?;
    device.destroy_texture_view(view)?;
    device.destroy_texture(target)?;
    device.destroy_render_pass(pass)?;
    device.destroy_buffer(readback)?;
    Ok(())
}

/// Two encoders recorded on separate threads, ordered on the queue by a
/// binary semaphore.
fn compute(device: &Device) -> eyre::Result<()> {
    const COUNT: u32 = 4096;
    let size = u64::from(COUNT) * 4;
    let values: Vec<u32> = (0..COUNT).collect();

    let storage = device.create_buffer(&BufferDescriptor {
        label: Some("values"),
        size,
        usage: BufferUsage::STORAGE | BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
        memory_properties: MemoryProperty::DEVICE_LOCAL,
    })?;
    let queue = device.queue();
    queue.write_buffer(storage, 0, bytemuck::cast_slice(&values))?;
    let readback = readback_buffer(device, size)?;

    let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
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
    })?;
    let group = device.create_bind_group(&BindGroupDescriptor {
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
    })?;
    let module = shader::load(device, "double", DOUBLE_WGSL)?;
    let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
        label: Some("double"),
        compute: module,
        entry_point: "main",
        bind_group_layouts: &[layout],
    })?;
    let doubled = device.create_semaphore(&SemaphoreDescriptor {
        label: Some("doubled"),
        ..Default::default()
    })?;

    let mut work = device.create_command_encoder(Some("double"))?;
    let mut copy = device.create_command_encoder(Some("copy out"))?;
    std::thread::scope(|scope| -> eyre::Result<()> {
        let recording = scope.spawn(|| -> rgfx::Result<()> {
            work.begin()?;
            let mut cpass = work.begin_compute_pass(&ComputePassBeginDescriptor {
                label: Some("double"),
            })?;
            cpass.set_pipeline(pipeline)?;
            cpass.set_bind_group(0, group, &[])?;
            cpass.dispatch_workgroups(COUNT.div_ceil(64), 1, 1)?;
            cpass.end()?;
            work.end()
        });
        copy.begin()?;
        copy.pipeline_barrier(&PipelineBarrierDescriptor {
            memory_barriers: &[MemoryBarrier {
                src_stage_mask: PipelineStage::COMPUTE_SHADER,
                dst_stage_mask: PipelineStage::TRANSFER,
                src_access_mask: AccessFlags::SHADER_WRITE,
                dst_access_mask: AccessFlags::TRANSFER_READ,
            }],
            ..Default::default()
        })?;
        copy.copy_buffer_to_buffer(&CopyBufferToBufferDescriptor {
            source: storage,
            source_offset: 0,
            destination: readback,
            destination_offset: 0,
            size,
        })?;
        copy.end()?;
        recording
            .join()
            .map_err(|_| eyre::eyre!("recording thread panicked"))??;
        Ok(())
    })?;

    queue.submit(
        &mut [&mut work],
        &SubmitInfo {
            signal_semaphores: &[doubled],
            ..Default::default()
        },
    )?;
    let fence = device.create_fence(&FenceDescriptor::default())?;
    queue.submit(
        &mut [&mut copy],
        &SubmitInfo {
            wait_semaphores: &[doubled],
            signal_fence: Some(fence),
            ..Default::default()
        },
    )?;
    device.wait_fence(fence, WAIT_NS)?;

    let bytes = read_back(device, readback, size as usize)?;
    let out: &[u32] = bytemuck::cast_slice(&bytes);
    if let Some((i, got)) = out.iter().enumerate().find(|(i, v)| **v != values[*i] * 2) {
        eyre::bail!("value {i} is {got}, expected {}", values[i] * 2);
    }

    device.destroy_fence(fence)?;
    device.destroy_semaphore(doubled)?;
    device.destroy_compute_pipeline(pipeline)?;
    device.destroy_shader(module)?;
    device.destroy_bind_group(group)?;
    device.destroy_bind_group_layout(layout)?;
    device.destroy_buffer(readback)?;
    device.destroy_buffer(storage)?;
    Ok(())
}

fn sync(device: &Device) -> eyre::Result<()> {
    let fence = device.create_fence(&FenceDescriptor {
        label: Some("pacing"),
        signaled: true,
    })?;
    ensure!(device.fence_status(fence)?, "fence created signaled reads unsignaled");
    device.reset_fence(fence)?;
    ensure!(!device.fence_status(fence)?, "reset fence still signaled");

    let mut encoder = device.create_command_encoder(Some("empty"))?;
    for frame in 0..3 {
        encoder.begin()?;
        encoder.end()?;
        device.queue().submit(
            &mut [&mut encoder],
            &SubmitInfo {
                signal_fence: Some(fence),
                ..Default::default()
            },
        )?;
        device.wait_fence(fence, WAIT_NS)?;
        device.reset_fence(fence)?;
        tracing::debug!("Frame {frame} retired");
    }
    device.destroy_fence(fence)?;

    match device.create_semaphore(&SemaphoreDescriptor {
        label: Some("timeline"),
        semaphore_type: SemaphoreType::Timeline,
        initial_value: 0,
    }) {
        Ok(timeline) => {
            device.signal_semaphore(timeline, 7)?;
            device.wait_semaphore(timeline, 7, WAIT_NS)?;
            ensure!(device.semaphore_value(timeline)? == 7, "timeline value lost");
            device.destroy_semaphore(timeline)?;
        }
        Err(e) => println!("  timeline semaphores unavailable: {e}"),
    }
    Ok(())
}

fn mipmaps(device: &Device) -> eyre::Result<()> {
    let size = 128;
    let levels = rgfx::util::full_mip_chain_len(Extent3D::d2(size, size));
    let texture = device.create_texture(&TextureDescriptor {
        label: Some("mipped"),
        size: Extent3D::d2(size, size),
        mip_level_count: levels,
        format: TextureFormat::R8G8B8A8Unorm,
        usage: TextureUsage::TEXTURE_BINDING
            | TextureUsage::RENDER_ATTACHMENT
            | TextureUsage::COPY_SRC
            | TextureUsage::COPY_DST,
        ..Default::default()
    })?;
    // Alternating black and white rows average to mid grey.
    let texels: Vec<u8> = (0..size)
        .flat_map(|y| {
            let v = if y % 2 == 0 { 0 } else { 255 };
            [v, v, v, 255].repeat(size as usize)
        })
        .collect();
    device.queue().write_texture(
        texture,
        Origin3D::ZERO,
        0,
        &texels,
        Extent3D::d2(size, size),
        TextureLayout::ShaderReadOnly,
    )?;

    let readback = readback_buffer(device, 4)?;
    let mut encoder = device.create_command_encoder(Some("mips"))?;
    encoder.begin()?;
    encoder.generate_mipmaps(texture)?;
    encoder.copy_texture_to_buffer(&CopyTextureToBufferDescriptor {
        source: texture,
        origin: Origin3D::ZERO,
        mip_level: levels - 1,
        destination: readback,
        destination_offset: 0,
        extent: Extent3D::d2(1, 1),
        final_layout: TextureLayout::ShaderReadOnly,
    })?;
    encoder.end()?;
    submit_and_wait(device, &mut encoder)?;

    let px = read_back(device, readback, 4)?;
    ensure!(
        px[..3].iter().all(|c| c.abs_diff(128) <= 2) && px[3] == 255,
        "smallest mip is {px:?}"
    );
    device.destroy_buffer(readback)?;
    device.destroy_texture(texture)?;
    Ok(())
}
