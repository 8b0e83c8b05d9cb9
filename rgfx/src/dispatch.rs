//! Static dispatch over the compiled-in backends.

/// Declare an enum with one variant per enabled backend.
macro_rules! backend_enum {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $vk:ty, $wgpu:ty $(,)? }) => {
        $(#[$meta])*
        $vis enum $name {
            #[cfg(feature = "vulkan")]
            Vulkan($vk),
            #[cfg(feature = "webgpu")]
            WebGpu($wgpu),
        }

        impl $name {
            #[allow(dead_code)]
            pub(crate) fn backend(&self) -> rgfx_core::BackendKind {
                match self {
                    #[cfg(feature = "vulkan")]
                    Self::Vulkan(_) => rgfx_core::BackendKind::Vulkan,
                    #[cfg(feature = "webgpu")]
                    Self::WebGpu(_) => rgfx_core::BackendKind::WebGpu,
                }
            }
        }

        #[cfg(feature = "vulkan")]
        impl From<$vk> for $name {
            fn from(value: $vk) -> Self {
                Self::Vulkan(value)
            }
        }

        #[cfg(feature = "webgpu")]
        impl From<$wgpu> for $name {
            fn from(value: $wgpu) -> Self {
                Self::WebGpu(value)
            }
        }
    };
}

/// Run `$body` with `$b` bound to the active backend object.
macro_rules! dispatch {
    ($value:expr, $enum:ident, $b:ident => $body:expr) => {
        match $value {
            #[cfg(feature = "vulkan")]
            $enum::Vulkan($b) => $body,
            #[cfg(feature = "webgpu")]
            $enum::WebGpu($b) => $body,
        }
    };
}

/// Pair two backend objects that must come from the same backend.
macro_rules! dispatch_pair {
    (
        ($lhs:expr, $lenum:ident), ($rhs:expr, $renum:ident),
        $a:ident, $b:ident => $body:expr
    ) => {
        match ($lhs, $rhs) {
            #[cfg(feature = "vulkan")]
            ($lenum::Vulkan($a), $renum::Vulkan($b)) => $body,
            #[cfg(feature = "webgpu")]
            ($lenum::WebGpu($a), $renum::WebGpu($b)) => $body,
            #[allow(unreachable_patterns)]
            (lhs, rhs) => Err($crate::dispatch::mismatch(
                lhs.backend(),
                rhs.backend(),
            )),
        }
    };
}

pub(crate) fn mismatch(
    expected: rgfx_core::BackendKind,
    actual: rgfx_core::BackendKind,
) -> rgfx_core::Error {
    rgfx_core::Error::invalid_argument(format!(
        "object from the {} backend used with a {} object",
        actual.name(),
        expected.name()
    ))
}
