#![allow(dead_code)]

use rgfx::descriptor::{
    AdapterDescriptor, BufferDescriptor, DeviceDescriptor, DeviceExtension,
    InstanceDescriptor, ShaderDescriptor, SubmitInfo,
};
use rgfx::{
    BackendKind, BufferHandle, BufferUsage, CommandEncoder, Device,
    FenceHandle, Instance, MemoryProperty, ShaderHandle, ShaderSourceType,
};

pub const WAIT_NS: u64 = 5_000_000_000;

/// Backends compiled into this build.
pub fn backends() -> Vec<BackendKind> {
    let mut kinds = Vec::new();
    if cfg!(feature = "vulkan") {
        kinds.push(BackendKind::Vulkan);
    }
    if cfg!(feature = "webgpu") {
        kinds.push(BackendKind::WebGpu);
    }
    kinds
}

/// A device on `backend` with every device extension the adapter offers,
/// or `None` when the machine has no usable adapter.
pub fn device(backend: BackendKind) -> Option<Device> {
    if let Err(e) = rgfx::load_backend(backend) {
        eprintln!("skipping {}: backend unavailable: {e}", backend.name());
        return None;
    }
    let instance = Instance::new(&InstanceDescriptor {
        backend,
        application_name: Some("rgfx-tests"),
        ..Default::default()
    })
    .inspect_err(|e| eprintln!("skipping {}: no instance: {e}", backend.name()))
    .ok()?;
    let adapter = instance
        .request_adapter(&AdapterDescriptor::default())
        .inspect_err(|e| eprintln!("skipping {}: no adapter: {e}", backend.name()))
        .ok()?;
    let names = adapter.extensions();
    let extensions: Vec<DeviceExtension> = DeviceExtension::ALL
        .into_iter()
        .filter(|e| names.contains(&e.name()))
        .collect();
    adapter
        .create_device(&DeviceDescriptor {
            label: Some("test device"),
            enabled_extensions: &extensions,
            ..Default::default()
        })
        .inspect_err(|e| eprintln!("skipping {}: no device: {e}", backend.name()))
        .ok()
}

/// Run `test` once per backend that yields a device.
pub fn on_each_device(test: impl Fn(&Device)) {
    for backend in backends() {
        if let Some(device) = device(backend) {
            test(&device);
            device.wait_idle().expect("device idles");
        }
    }
}

/// Compile WGSL for whichever shader form the device takes.
pub fn shader(device: &Device, label: &str, wgsl: &str) -> ShaderHandle {
    if device.supports_shader_format(ShaderSourceType::Wgsl) {
        return device
            .create_shader(&ShaderDescriptor::wgsl(Some(label), wgsl))
            .expect("WGSL shader");
    }
    let module = naga::front::wgsl::parse_str(wgsl).expect("WGSL parses");
    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .expect("WGSL validates");
    let words = naga::back::spv::write_vec(
        &module,
        &info,
        &naga::back::spv::Options::default(),
        None,
    )
    .expect("SPIR-V output");
    device
        .create_shader(&ShaderDescriptor::spirv(Some(label), &words))
        .expect("SPIR-V shader")
}

pub fn readback_buffer(device: &Device, size: u64) -> BufferHandle {
    device
        .create_buffer(&BufferDescriptor {
            label: Some("readback"),
            size,
            usage: BufferUsage::MAP_READ | BufferUsage::COPY_DST,
            memory_properties: MemoryProperty::HOST_VISIBLE
                | MemoryProperty::HOST_COHERENT,
        })
        .expect("readback buffer")
}

pub fn read_buffer(device: &Device, buffer: BufferHandle, len: usize) -> Vec<u8> {
    let mut out = vec![0; len];
    device.map_buffer(buffer, 0, 0).expect("map");
    device.read_mapped(buffer, 0, &mut out).expect("read");
    device.unmap_buffer(buffer).expect("unmap");
    out
}

/// Submit one encoder with a fresh fence and wait for it.
pub fn submit_and_wait(device: &Device, encoder: &mut CommandEncoder) {
    let fence = fence(device, false);
    device
        .queue()
        .submit(
            &mut [encoder],
            &SubmitInfo {
                signal_fence: Some(fence),
                ..Default::default()
            },
        )
        .expect("submit");
    device.wait_fence(fence, WAIT_NS).expect("fence signals");
    device.destroy_fence(fence).expect("destroy fence");
}

pub fn fence(device: &Device, signaled: bool) -> FenceHandle {
    device
        .create_fence(&rgfx::descriptor::FenceDescriptor {
            label: Some("test fence"),
            signaled,
        })
        .expect("fence")
}
