//! Vulkan backend for `rgfx`, built on [`ash`] and [`gpu_allocator`].
//!
//! # Object hierarchy
//!
//! ```text
//! VulkanInstance (Arc<Instance>)
//! └── VulkanAdapter
//!     └── VulkanDevice (Arc<RawDevice> + Hub<VkHub>)
//!         ├── VulkanSurface → Swapchain
//!         ├── Buffer / Texture → TextureView / Sampler
//!         ├── BindGroupLayout → BindGroup
//!         ├── RenderPass → Framebuffer, RenderPipeline
//!         ├── ComputePipeline, QuerySet
//!         ├── Fence / Semaphore
//!         └── VulkanEncoder
//! ```
//!
//! Every native wrapper holds its parent [`raw::RawDevice`] or
//! [`instance::Instance`] through an `Arc`, so parents outlive children
//! regardless of the order in which handles are released.
//!
//! # Naming conventions
//!
//! | prefix  | meaning                                   |
//! |---------|-------------------------------------------|
//! | `raw_*` | accepts or returns a raw `ash::vk` handle |
//! | `ash_*` | returns the `ash` wrapper object          |

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

pub mod adapter;
pub mod barrier;
pub mod buffer;
pub mod command;
pub mod conv;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod instance;
pub mod pass;
pub mod pipeline;
pub mod query;
pub mod raw;
pub mod sampler;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use adapter::VulkanAdapter;
pub use command::VulkanEncoder;
pub use device::VulkanDevice;
pub use instance::VulkanInstance;
pub use surface::VulkanSurface;

pub use ash;
