//! WebGPU backend for `rgfx`, built on [`wgpu`].
//!
//! # Object hierarchy
//!
//! ```text
//! WgpuInstance (Arc<wgpu::Instance>)
//! └── WgpuAdapter
//!     └── WgpuDevice (wgpu::Device + wgpu::Queue + Hub<WgpuHub>)
//!         ├── WgpuSurface → Swapchain
//!         ├── Buffer / Texture → TextureView / Sampler
//!         ├── BindGroupLayout → BindGroup
//!         ├── RenderPass (descriptor only) → Framebuffer, RenderPipeline
//!         ├── ComputePipeline, QuerySet
//!         ├── Fence / Semaphore (emulated)
//!         ├── Blitter
//!         └── WgpuEncoder
//! ```
//!
//! WebGPU has no render pass object, no fences and no semaphores. Render
//! passes are plain descriptors turned into a `wgpu::RenderPassDescriptor`
//! when a pass begins, fences complete through
//! `Queue::on_submitted_work_done`, and semaphores are host-side counters.
//!
//! Texture layouts are tracked only so both backends report the same
//! layouts; wgpu performs the actual transitions.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

pub mod adapter;
pub mod binding;
pub mod blit;
pub mod buffer;
pub mod command;
pub mod conv;
pub mod device;
pub mod error;
pub mod instance;
pub mod pass;
pub mod pipeline;
pub mod query;
pub mod sampler;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use adapter::WgpuAdapter;
pub use command::WgpuEncoder;
pub use device::WgpuDevice;
pub use instance::WgpuInstance;
pub use surface::WgpuSurface;

pub use wgpu;
