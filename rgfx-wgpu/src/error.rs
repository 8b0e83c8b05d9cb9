//! Translation of wgpu failures into [`rgfx_core::Error`].
//!
//! wgpu reports most failures asynchronously through error scopes or the
//! uncaptured-error handler rather than return values. Creation calls run
//! inside [`scoped`], which pushes a validation and an out-of-memory scope
//! around the call and turns whatever was captured into a `Result`.

use rgfx_core::Error;

/// Map a captured wgpu error onto the core taxonomy without logging.
pub fn error_for(error: &wgpu::Error) -> Error {
    match error {
        wgpu::Error::OutOfMemory { .. } => Error::OutOfMemory(error.to_string()),
        wgpu::Error::Validation { description, .. } => {
            Error::InvalidArgument(description.clone())
        }
        other => Error::Backend(other.to_string()),
    }
}

/// Log `error` with the failing call and translate it.
pub fn classify(call: &str, error: wgpu::Error) -> Error {
    match &error {
        wgpu::Error::Validation { description, .. } => {
            tracing::warn!("{call} failed validation: {description}");
        }
        other => tracing::error!("{call} failed: {other}"),
    }
    error_for(&error)
}

pub fn surface_error(error: wgpu::SurfaceError) -> Error {
    match error {
        wgpu::SurfaceError::Timeout => Error::Timeout,
        wgpu::SurfaceError::Outdated => Error::OutOfDate,
        wgpu::SurfaceError::Lost => Error::SurfaceLost,
        wgpu::SurfaceError::OutOfMemory => {
            Error::OutOfMemory("surface texture".into())
        }
        other => {
            tracing::warn!("Surface error: {other}");
            Error::Backend(other.to_string())
        }
    }
}

/// Run `f` inside validation and out-of-memory error scopes on `device`.
///
/// The value returned by `f` is dropped when either scope captured an
/// error, since wgpu hands back invalid objects rather than failing.
pub fn scoped<T>(
    device: &wgpu::Device,
    call: &str,
    f: impl FnOnce() -> T,
) -> rgfx_core::Result<T> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    match validation.or(out_of_memory) {
        Some(error) => Err(classify(call, error)),
        None => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use rgfx_core::ResultCode;

    use super::*;

    #[test]
    fn surface_errors_keep_recoverable_codes() {
        assert_eq!(
            surface_error(wgpu::SurfaceError::Timeout).code(),
            ResultCode::Timeout
        );
        assert_eq!(
            surface_error(wgpu::SurfaceError::Outdated).code(),
            ResultCode::OutOfDate
        );
        assert_eq!(
            surface_error(wgpu::SurfaceError::Lost).code(),
            ResultCode::SurfaceLost
        );
        assert_eq!(
            surface_error(wgpu::SurfaceError::OutOfMemory).code(),
            ResultCode::OutOfMemory
        );
    }

    #[test]
    fn validation_errors_are_invalid_arguments() {
        let error = wgpu::Error::Validation {
            source: Box::new(std::fmt::Error),
            description: "buffer usage is empty".into(),
        };
        let translated = error_for(&error);
        assert_eq!(translated.code(), ResultCode::InvalidArgument);
        assert!(translated.to_string().contains("buffer usage is empty"));
    }

    #[test]
    fn out_of_memory_errors_keep_their_code() {
        let error = wgpu::Error::OutOfMemory {
            source: Box::new(std::fmt::Error),
        };
        assert_eq!(
            classify("create_buffer", error).code(),
            ResultCode::OutOfMemory
        );
    }
}
