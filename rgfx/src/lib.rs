//! One GPU API over two native backends.
//!
//! `rgfx` selects a backend once, when an [`Instance`] is created, and
//! dispatches every later call to it statically. The Vulkan backend keeps
//! persistent render pass objects and native synchronization; the WebGPU
//! backend synthesizes passes when they begin and emulates fences and
//! semaphores. Code written against this crate behaves the same on both.
//!
//! ```no_run
//! use rgfx::descriptor::{AdapterDescriptor, DeviceDescriptor, InstanceDescriptor};
//!
//! # fn main() -> rgfx::Result<()> {
//! rgfx::load_backend(rgfx::BackendKind::Auto)?;
//! let instance = rgfx::Instance::new(&InstanceDescriptor::default())?;
//! let adapter = instance.request_adapter(&AdapterDescriptor::default())?;
//! let device = adapter.create_device(&DeviceDescriptor::default())?;
//! let queue = device.queue();
//! queue.wait_idle()?;
//! # Ok(())
//! # }
//! ```
//!
//! Device children are generation-checked handles from
//! [`rgfx_core::handle`]; they are destroyed through the [`Device`] that
//! created them. Command encoders and surfaces are owned values.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

#[cfg(not(any(feature = "vulkan", feature = "webgpu")))]
compile_error!("enable at least one of the `vulkan` or `webgpu` features");

#[macro_use]
mod dispatch;

pub mod adapter;
pub mod command;
pub mod device;
pub mod instance;
pub mod log;
pub mod queue;
pub mod registry;
pub mod surface;

pub use adapter::Adapter;
pub use command::{CommandEncoder, ComputePassEncoder, RenderPassEncoder};
pub use device::Device;
pub use instance::{Instance, enumerate_instance_extensions};
pub use queue::Queue;
pub use registry::{
    is_backend_compiled, is_backend_loaded, load_all_backends, load_backend,
    loaded_backends, unload_all_backends, unload_backend,
};
pub use surface::Surface;

pub use rgfx_core::{
    Error, Result, ResultCode, descriptor, encoder::EncoderState, get_version,
    result_to_string, util,
};
pub use rgfx_core::{flags::*, format::*, handle::*, types::*};

pub use raw_window_handle;
#[cfg(feature = "vulkan")]
pub use rgfx_vk;
#[cfg(feature = "webgpu")]
pub use rgfx_wgpu;
