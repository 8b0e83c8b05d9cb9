//! Process-wide backend registry.
//!
//! Backends are compiled in behind the `vulkan` and `webgpu` features.
//! Loading one checks that its native runtime is usable and marks it
//! available to [`Instance::new`](crate::Instance::new). Loading is
//! idempotent per backend.

use std::sync::Mutex;

use rgfx_core::{BackendKind, Error, Result};

#[derive(Debug, Default, Clone, Copy)]
struct Loaded {
    vulkan: bool,
    webgpu: bool,
}

impl Loaded {
    fn get(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Vulkan => self.vulkan,
            BackendKind::WebGpu => self.webgpu,
            BackendKind::Auto => self.vulkan || self.webgpu,
        }
    }

    fn set(&mut self, kind: BackendKind, loaded: bool) {
        match kind {
            BackendKind::Vulkan => self.vulkan = loaded,
            BackendKind::WebGpu => self.webgpu = loaded,
            BackendKind::Auto => {}
        }
    }
}

static LOADED: Mutex<Loaded> = Mutex::new(Loaded {
    vulkan: false,
    webgpu: false,
});

/// Concrete backends in the order [`BackendKind::Auto`] tries them.
pub const BACKEND_ORDER: [BackendKind; 2] =
    [BackendKind::Vulkan, BackendKind::WebGpu];

pub fn is_backend_compiled(kind: BackendKind) -> bool {
    match kind {
        BackendKind::Vulkan => cfg!(feature = "vulkan"),
        BackendKind::WebGpu => cfg!(feature = "webgpu"),
        BackendKind::Auto => true,
    }
}

fn probe(kind: BackendKind) -> Result<()> {
    match kind {
        #[cfg(feature = "vulkan")]
        BackendKind::Vulkan => {
            rgfx_vk::VulkanInstance::enumerate_extensions().map(drop)
        }
        #[cfg(feature = "webgpu")]
        BackendKind::WebGpu => {
            rgfx_wgpu::WgpuInstance::enumerate_extensions().map(drop)
        }
        other => Err(Error::unsupported(format!(
            "{} backend was not compiled in",
            other.name()
        ))),
    }
}

/// Load a backend. [`BackendKind::Auto`] loads the first backend that
/// works, Vulkan first, and returns which one it was.
pub fn load_backend(kind: BackendKind) -> Result<BackendKind> {
    let mut loaded = LOADED.lock().expect("backend registry lock poisoned");
    if kind == BackendKind::Auto {
        if let Some(kind) = BACKEND_ORDER.into_iter().find(|k| loaded.get(*k)) {
            return Ok(kind);
        }
        let mut last_error = None;
        for candidate in BACKEND_ORDER {
            match probe(candidate) {
                Ok(()) => {
                    loaded.set(candidate, true);
                    tracing::info!("Loaded {} backend", candidate.name());
                    return Ok(candidate);
                }
                Err(e) => {
                    tracing::debug!(
                        "{} backend unavailable: {e}",
                        candidate.name()
                    );
                    last_error = Some(e);
                }
            }
        }
        return Err(Error::BackendNotLoaded(match last_error {
            Some(e) => format!("no backend could be loaded: {e}"),
            None => "no backend could be loaded".into(),
        }));
    }

    if loaded.get(kind) {
        tracing::debug!("{} backend already loaded", kind.name());
        return Ok(kind);
    }
    probe(kind).inspect_err(|e| {
        tracing::warn!("Failed to load {} backend: {e}", kind.name());
    })?;
    loaded.set(kind, true);
    tracing::info!("Loaded {} backend", kind.name());
    Ok(kind)
}

/// Unload a backend. [`BackendKind::Auto`] unloads the first loaded one.
/// Instances already created keep working.
pub fn unload_backend(kind: BackendKind) -> Result<()> {
    let mut loaded = LOADED.lock().expect("backend registry lock poisoned");
    let kind = match kind {
        BackendKind::Auto => BACKEND_ORDER
            .into_iter()
            .find(|k| loaded.get(*k))
            .ok_or_else(|| {
                Error::BackendNotLoaded("no backend is loaded".into())
            })?,
        kind => kind,
    };
    if !loaded.get(kind) {
        return Err(Error::BackendNotLoaded(kind.name().into()));
    }
    loaded.set(kind, false);
    tracing::info!("Unloaded {} backend", kind.name());
    Ok(())
}

/// Load every compiled-in backend that works. Fails only when none does.
pub fn load_all_backends() -> Result<Vec<BackendKind>> {
    let mut kinds = Vec::new();
    let mut last_error = None;
    for kind in BACKEND_ORDER.into_iter().filter(|k| is_backend_compiled(*k)) {
        match load_backend(kind) {
            Ok(kind) => kinds.push(kind),
            Err(e) => last_error = Some(e),
        }
    }
    match (kinds.is_empty(), last_error) {
        (true, Some(e)) => Err(e),
        _ => Ok(kinds),
    }
}

pub fn unload_all_backends() {
    let mut loaded = LOADED.lock().expect("backend registry lock poisoned");
    *loaded = Loaded::default();
    tracing::debug!("Unloaded all backends");
}

pub fn is_backend_loaded(kind: BackendKind) -> bool {
    LOADED
        .lock()
        .expect("backend registry lock poisoned")
        .get(kind)
}

pub fn loaded_backends() -> Vec<BackendKind> {
    let loaded = *LOADED.lock().expect("backend registry lock poisoned");
    BACKEND_ORDER
        .into_iter()
        .filter(|k| loaded.get(*k))
        .collect()
}

/// Resolve `kind` to a loaded concrete backend.
pub(crate) fn resolve(kind: BackendKind) -> Result<BackendKind> {
    let loaded = *LOADED.lock().expect("backend registry lock poisoned");
    match kind {
        BackendKind::Auto => BACKEND_ORDER
            .into_iter()
            .find(|k| loaded.get(*k))
            .ok_or_else(|| {
                Error::BackendNotLoaded(
                    "call load_backend before creating an instance".into(),
                )
            }),
        kind if loaded.get(kind) => Ok(kind),
        kind => Err(Error::BackendNotLoaded(kind.name().into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_reports_any_loaded_backend() {
        let mut loaded = Loaded::default();
        assert!(!loaded.get(BackendKind::Auto));
        loaded.set(BackendKind::WebGpu, true);
        assert!(loaded.get(BackendKind::Auto));
        assert!(!loaded.get(BackendKind::Vulkan));
        loaded.set(BackendKind::Auto, false);
        assert!(loaded.get(BackendKind::WebGpu));
    }

    #[test]
    fn auto_is_always_compiled() {
        assert!(is_backend_compiled(BackendKind::Auto));
        assert_eq!(
            is_backend_compiled(BackendKind::Vulkan),
            cfg!(feature = "vulkan")
        );
    }
}
