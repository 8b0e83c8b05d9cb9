//! Backend registry and process-wide hooks. These share global state, so
//! the registry steps run in one test.

use std::sync::{Arc, Mutex};

use rgfx::descriptor::InstanceDescriptor;
use rgfx::log::{LogLevel, emit, has_log_callback, set_log_callback};
use rgfx::{BackendKind, Instance, ResultCode};

#[test]
fn load_and_unload_backends() {
    rgfx::unload_all_backends();
    assert!(rgfx::loaded_backends().is_empty());
    assert_eq!(
        rgfx::unload_backend(BackendKind::Auto).unwrap_err().code(),
        ResultCode::BackendNotLoaded
    );
    let err = Instance::new(&InstanceDescriptor {
        backend: BackendKind::Auto,
        ..Default::default()
    })
    .unwrap_err();
    assert_eq!(err.code(), ResultCode::BackendNotLoaded);

    let Ok(loaded) = rgfx::load_all_backends() else {
        eprintln!("skipping: no backend loads on this machine");
        return;
    };
    assert!(!loaded.is_empty());
    assert_eq!(rgfx::loaded_backends(), loaded);

    // Loading again is a no-op.
    let first = loaded[0];
    assert_eq!(rgfx::load_backend(first).unwrap(), first);
    assert_eq!(rgfx::load_backend(BackendKind::Auto).unwrap(), first);
    assert!(!rgfx::enumerate_instance_extensions(first).unwrap().is_empty());

    rgfx::unload_backend(first).unwrap();
    assert!(!rgfx::is_backend_loaded(first));
    assert_eq!(
        rgfx::unload_backend(first).unwrap_err().code(),
        ResultCode::BackendNotLoaded
    );
    let err = Instance::new(&InstanceDescriptor {
        backend: first,
        ..Default::default()
    })
    .unwrap_err();
    assert_eq!(err.code(), ResultCode::BackendNotLoaded);
    assert_eq!(
        rgfx::enumerate_instance_extensions(first).unwrap_err().code(),
        ResultCode::BackendNotLoaded
    );

    rgfx::unload_all_backends();
    assert!(rgfx::loaded_backends().is_empty());
}

#[test]
fn uncompiled_backends_are_reported() {
    for kind in [BackendKind::Vulkan, BackendKind::WebGpu] {
        if rgfx::is_backend_compiled(kind) {
            continue;
        }
        assert_eq!(
            rgfx::load_backend(kind).unwrap_err().code(),
            ResultCode::FeatureNotSupported
        );
    }
}

#[test]
fn version_matches_package() {
    let (major, minor, patch) = rgfx::get_version();
    let expected = env!("CARGO_PKG_VERSION");
    assert_eq!(format!("{major}.{minor}.{patch}"), expected);
}

#[test]
fn result_codes_have_names() {
    assert_eq!(rgfx::result_to_string(ResultCode::Success), "Success");
    assert!(ResultCode::NotFound.is_error());
    assert!(!ResultCode::Timeout.is_error());
}

#[test]
fn log_callback_receives_forwarded_events() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    set_log_callback(Some(Box::new(move |level, message: &str| {
        sink.lock().unwrap().push((level, message.to_owned()));
    })));
    assert!(has_log_callback());

    emit(LogLevel::Warning, "direct");
    let installed = rgfx::log::install_default();
    if installed {
        tracing::error!("through tracing");
    }
    let seen = seen.lock().unwrap().clone();
    assert!(seen.contains(&(LogLevel::Warning, "direct".to_owned())));
    if installed {
        assert!(seen.iter().any(|(level, message)| {
            *level == LogLevel::Error && message.contains("through tracing")
        }));
    }

    set_log_callback(None);
    assert!(!has_log_callback());
}
