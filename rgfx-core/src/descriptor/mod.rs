//! Flat creation and recording descriptors.
//!
//! Descriptors borrow their labels and arrays for the duration of a call.
//! Nothing here is retained by a backend except through the owned forms
//! ([`RenderPassLayout`], [`TextureInfo`], ...).

mod binding;
mod command;
mod device;
mod pass;
mod pipeline;
mod resource;
mod surface;
mod sync;

pub use binding::*;
pub use command::*;
pub use device::*;
pub use pass::*;
pub use pipeline::*;
pub use resource::*;
pub use surface::*;
pub use sync::*;
