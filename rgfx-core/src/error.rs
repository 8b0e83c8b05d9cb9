//! Result codes and the crate-wide [`Error`] type.
//!
//! Every public operation returns [`Result`]. Failures are categorised by
//! [`ResultCode`], which is what a caller switches on: recoverable
//! conditions ([`ResultCode::Timeout`], [`ResultCode::NotReady`]) are told
//! apart from terminal ones ([`ResultCode::DeviceLost`]) by code, never by
//! error type.

use thiserror::Error;

use crate::compat::CompatibilityError;
use crate::types::TextureLayout;

/// Stable numeric outcome of an operation.
///
/// Non-negative values are non-error outcomes; negative values are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    Success = 0,
    Timeout = 1,
    NotReady = 2,
    InvalidArgument = -1,
    NotFound = -2,
    OutOfMemory = -3,
    DeviceLost = -4,
    SurfaceLost = -5,
    OutOfDate = -6,
    BackendNotLoaded = -7,
    FeatureNotSupported = -8,
    Unknown = -9,
}

impl ResultCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultCode::Success => "Success",
            ResultCode::Timeout => "Timeout",
            ResultCode::NotReady => "Not ready",
            ResultCode::InvalidArgument => "Invalid argument",
            ResultCode::NotFound => "Not found",
            ResultCode::OutOfMemory => "Out of memory",
            ResultCode::DeviceLost => "Device lost",
            ResultCode::SurfaceLost => "Surface lost",
            ResultCode::OutOfDate => "Out of date",
            ResultCode::BackendNotLoaded => "Backend not loaded",
            ResultCode::FeatureNotSupported => "Feature not supported",
            ResultCode::Unknown => "Unknown error",
        }
    }

    pub fn is_error(self) -> bool {
        (self as i32) < 0
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0 => ResultCode::Success,
            1 => ResultCode::Timeout,
            2 => ResultCode::NotReady,
            -1 => ResultCode::InvalidArgument,
            -2 => ResultCode::NotFound,
            -3 => ResultCode::OutOfMemory,
            -4 => ResultCode::DeviceLost,
            -5 => ResultCode::SurfaceLost,
            -6 => ResultCode::OutOfDate,
            -7 => ResultCode::BackendNotLoaded,
            -8 => ResultCode::FeatureNotSupported,
            -9 => ResultCode::Unknown,
            _ => return None,
        })
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human readable name for a [`ResultCode`].
pub fn result_to_string(code: ResultCode) -> &'static str {
    code.as_str()
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Stale or destroyed {kind} handle")]
    InvalidHandle { kind: &'static str },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Framebuffer is incompatible with render pass: {0}")]
    Incompatible(#[from] CompatibilityError),

    #[error(
        "Texture layout mismatch at mip {mip_level}: expected {expected:?}, \
         tracked {actual:?}"
    )]
    LayoutMismatch {
        mip_level: u32,
        expected: TextureLayout,
        actual: TextureLayout,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Device lost")]
    DeviceLost,

    #[error("Surface lost")]
    SurfaceLost,

    #[error("Swapchain is out of date")]
    OutOfDate,

    #[error("Operation timed out")]
    Timeout,

    #[error("Not ready")]
    NotReady,

    #[error("Backend not loaded: {0}")]
    BackendNotLoaded(String),

    #[error("Feature not supported: {0}")]
    FeatureNotSupported(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl Error {
    pub fn code(&self) -> ResultCode {
        match self {
            Error::InvalidArgument(_)
            | Error::InvalidHandle { .. }
            | Error::InvalidState(_)
            | Error::Incompatible(_)
            | Error::LayoutMismatch { .. } => ResultCode::InvalidArgument,
            Error::NotFound(_) => ResultCode::NotFound,
            Error::OutOfMemory(_) => ResultCode::OutOfMemory,
            Error::DeviceLost => ResultCode::DeviceLost,
            Error::SurfaceLost => ResultCode::SurfaceLost,
            Error::OutOfDate => ResultCode::OutOfDate,
            Error::Timeout => ResultCode::Timeout,
            Error::NotReady => ResultCode::NotReady,
            Error::BackendNotLoaded(_) => ResultCode::BackendNotLoaded,
            Error::FeatureNotSupported(_) => ResultCode::FeatureNotSupported,
            Error::Backend(_) => ResultCode::Unknown,
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::FeatureNotSupported(msg.into())
    }

    pub fn backend(msg: impl std::fmt::Display) -> Self {
        Error::Backend(msg.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Collapse a `Result<()>` into its [`ResultCode`].
pub fn code_of<T>(result: &Result<T>) -> ResultCode {
    match result {
        Ok(_) => ResultCode::Success,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip_through_raw() {
        for code in [
            ResultCode::Success,
            ResultCode::Timeout,
            ResultCode::NotReady,
            ResultCode::InvalidArgument,
            ResultCode::NotFound,
            ResultCode::OutOfMemory,
            ResultCode::DeviceLost,
            ResultCode::SurfaceLost,
            ResultCode::OutOfDate,
            ResultCode::BackendNotLoaded,
            ResultCode::FeatureNotSupported,
            ResultCode::Unknown,
        ] {
            assert_eq!(ResultCode::from_raw(code as i32), Some(code));
        }
        assert_eq!(ResultCode::from_raw(42), None);
    }

    #[test]
    fn recoverable_codes_are_not_errors() {
        assert!(!ResultCode::Success.is_error());
        assert!(!ResultCode::Timeout.is_error());
        assert!(!ResultCode::NotReady.is_error());
        assert!(ResultCode::DeviceLost.is_error());
        assert!(ResultCode::Unknown.is_error());
    }

    #[test]
    fn result_strings_are_distinct() {
        assert_eq!(result_to_string(ResultCode::Success), "Success");
        assert_eq!(result_to_string(ResultCode::OutOfDate), "Out of date");
        assert_ne!(
            result_to_string(ResultCode::Timeout),
            result_to_string(ResultCode::NotReady)
        );
    }

    #[test]
    fn error_variants_map_to_codes() {
        assert_eq!(
            Error::InvalidHandle { kind: "buffer" }.code(),
            ResultCode::InvalidArgument
        );
        assert_eq!(Error::Timeout.code(), ResultCode::Timeout);
        assert_eq!(Error::backend("boom").code(), ResultCode::Unknown);
        assert_eq!(
            Error::unsupported("import").code(),
            ResultCode::FeatureNotSupported
        );
        let err: Result<()> = Err(Error::DeviceLost);
        assert_eq!(code_of(&err), ResultCode::DeviceLost);
        assert_eq!(code_of(&Ok::<_, Error>(3)), ResultCode::Success);
    }
}
