//! Backend-independent types for the `rgfx` GPU abstraction.
//!
//! This crate has no GPU dependencies. It defines what every backend speaks:
//! descriptors, handles, result codes, the per-device entity [`hub::Hub`],
//! and the traits in [`backend`] that the Vulkan and WebGPU backends
//! implement.
//!
//! # Object hierarchy
//!
//! ```text
//! Instance
//! ├── Surface
//! └── Adapter
//!     └── Device ── Queue
//!         ├── Buffer / Texture → TextureView / Sampler
//!         ├── Shader
//!         ├── BindGroupLayout → BindGroup
//!         ├── RenderPass → Framebuffer, RenderPipeline
//!         ├── ComputePipeline
//!         ├── Swapchain (on a Surface)
//!         ├── CommandEncoder → RenderPassEncoder / ComputePassEncoder
//!         └── Fence / Semaphore / QuerySet
//! ```
//!
//! Device children are addressed by generation-checked handles, see
//! [`handle`].

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

pub mod backend;
pub mod compat;
pub mod descriptor;
pub mod encoder;
pub mod error;
pub mod flags;
pub mod format;
pub mod handle;
pub mod hub;
pub mod layout;
pub mod log;
pub mod types;
pub mod util;
pub mod validate;

pub use error::{Error, Result, ResultCode, result_to_string};
pub use flags::*;
pub use format::{TextureFormat, format_bytes_per_pixel};
pub use handle::*;
pub use types::*;

/// Library version as `(major, minor, patch)`.
pub fn get_version() -> (u32, u32, u32) {
    let parse = |s: &str| s.parse::<u32>().unwrap_or(0);
    (
        parse(env!("CARGO_PKG_VERSION_MAJOR")),
        parse(env!("CARGO_PKG_VERSION_MINOR")),
        parse(env!("CARGO_PKG_VERSION_PATCH")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_package() {
        let (major, minor, patch) = get_version();
        assert_eq!(
            format!("{major}.{minor}.{patch}"),
            env!("CARGO_PKG_VERSION")
        );
    }
}
