//! Translation of native Vulkan failures into [`rgfx_core::Error`].
//!
//! Per-operation error enums live next to the code that produces them and
//! convert into the core error through `From`. Raw `vk::Result` values go
//! through [`classify`], which logs the native string before translating.

use ash::vk;
use gpu_allocator::AllocationError;
use rgfx_core::Error;

/// Map a native result onto the core taxonomy without logging.
pub fn error_for(result: vk::Result) -> Error {
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY
        | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
        | vk::Result::ERROR_OUT_OF_POOL_MEMORY
        | vk::Result::ERROR_FRAGMENTED_POOL => {
            Error::OutOfMemory(format!("{result:?}"))
        }
        vk::Result::ERROR_DEVICE_LOST => Error::DeviceLost,
        vk::Result::ERROR_SURFACE_LOST_KHR => Error::SurfaceLost,
        vk::Result::ERROR_OUT_OF_DATE_KHR => Error::OutOfDate,
        vk::Result::TIMEOUT => Error::Timeout,
        vk::Result::NOT_READY => Error::NotReady,
        vk::Result::ERROR_FEATURE_NOT_PRESENT
        | vk::Result::ERROR_FORMAT_NOT_SUPPORTED
        | vk::Result::ERROR_EXTENSION_NOT_PRESENT
        | vk::Result::ERROR_LAYER_NOT_PRESENT => {
            Error::FeatureNotSupported(format!("{result:?}"))
        }
        vk::Result::ERROR_INCOMPATIBLE_DRIVER => {
            Error::BackendNotLoaded(format!("{result:?}"))
        }
        other => Error::Backend(format!("{other:?}: {other}")),
    }
}

/// Log `result` with the failing call and translate it.
///
/// Timeouts, not-ready and out-of-date are expected outcomes and only
/// logged at `debug`.
pub fn classify(call: &str, result: vk::Result) -> Error {
    match result {
        vk::Result::TIMEOUT
        | vk::Result::NOT_READY
        | vk::Result::ERROR_OUT_OF_DATE_KHR => {
            tracing::debug!("{call} returned {result:?}");
        }
        vk::Result::ERROR_DEVICE_LOST => {
            tracing::error!("{call} failed: {result:?} ({result})");
        }
        _ => tracing::warn!("{call} failed: {result:?} ({result})"),
    }
    error_for(result)
}

pub trait VkResultExt<T> {
    /// Classify a failed native call, naming it in the log.
    fn or_classify(self, call: &str) -> rgfx_core::Result<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn or_classify(self, call: &str) -> rgfx_core::Result<T> {
        self.map_err(|e| classify(call, e))
    }
}

pub fn allocation_error(e: AllocationError) -> Error {
    tracing::warn!("GPU allocation failed: {e}");
    match e {
        AllocationError::OutOfMemory => Error::OutOfMemory(e.to_string()),
        AllocationError::NoCompatibleMemoryTypeFound => {
            Error::FeatureNotSupported(e.to_string())
        }
        other => Error::Backend(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use rgfx_core::ResultCode;

    use super::*;

    #[test]
    fn memory_exhaustion_is_out_of_memory() {
        for result in [
            vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            vk::Result::ERROR_OUT_OF_POOL_MEMORY,
        ] {
            assert_eq!(error_for(result).code(), ResultCode::OutOfMemory);
        }
    }

    #[test]
    fn recoverable_results_keep_their_codes() {
        assert_eq!(error_for(vk::Result::TIMEOUT).code(), ResultCode::Timeout);
        assert_eq!(
            error_for(vk::Result::NOT_READY).code(),
            ResultCode::NotReady
        );
        assert_eq!(
            classify("vkAcquireNextImageKHR", vk::Result::ERROR_OUT_OF_DATE_KHR)
                .code(),
            ResultCode::OutOfDate
        );
    }

    #[test]
    fn terminal_and_unknown_results() {
        assert_eq!(
            error_for(vk::Result::ERROR_DEVICE_LOST).code(),
            ResultCode::DeviceLost
        );
        assert_eq!(
            error_for(vk::Result::ERROR_SURFACE_LOST_KHR).code(),
            ResultCode::SurfaceLost
        );
        assert_eq!(
            error_for(vk::Result::ERROR_FORMAT_NOT_SUPPORTED).code(),
            ResultCode::FeatureNotSupported
        );
        let err = error_for(vk::Result::ERROR_INITIALIZATION_FAILED);
        assert_eq!(err.code(), ResultCode::Unknown);
        assert!(err.to_string().contains("INITIALIZATION_FAILED"));
    }

    #[test]
    fn result_extension_classifies_errors_only() {
        let ok: Result<u32, vk::Result> = Ok(7);
        assert_eq!(ok.or_classify("vkTest").unwrap(), 7);
        let err: Result<u32, vk::Result> = Err(vk::Result::TIMEOUT);
        assert!(matches!(err.or_classify("vkTest"), Err(Error::Timeout)));
    }
}
