//! Platform window binding and swapchain descriptors.

use std::ffi::c_void;
use std::num::{NonZeroIsize, NonZeroU32};
use std::ptr::NonNull;

use raw_window_handle::{
    AndroidDisplayHandle, AndroidNdkWindowHandle, HasDisplayHandle,
    HasWindowHandle, RawDisplayHandle, RawWindowHandle, WaylandDisplayHandle,
    WaylandWindowHandle, Win32WindowHandle, WindowsDisplayHandle,
    XcbDisplayHandle, XcbWindowHandle, XlibDisplayHandle, XlibWindowHandle,
};

use crate::error::{Error, Result};
use crate::flags::TextureUsage;
use crate::format::TextureFormat;
use crate::types::PresentMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowingSystem {
    Win32,
    Xlib,
    Wayland,
    Xcb,
    Metal,
    Emscripten,
    Android,
}

/// A native window, tagged by windowing system.
///
/// Pointers are borrowed: the window and its display connection must
/// outlive every surface created from the handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformWindowHandle {
    Win32 {
        hwnd: *mut c_void,
        hinstance: *mut c_void,
    },
    Xlib {
        display: *mut c_void,
        window: u64,
    },
    Wayland {
        surface: *mut c_void,
        display: *mut c_void,
    },
    Xcb {
        connection: *mut c_void,
        window: u32,
    },
    /// A `CAMetalLayer`.
    Metal { layer: *mut c_void },
    /// CSS selector of the target canvas, e.g. `#canvas`.
    Emscripten { canvas_selector: String },
    /// An `ANativeWindow`.
    Android { window: *mut c_void },
}

impl PlatformWindowHandle {
    pub fn win32(hwnd: *mut c_void, hinstance: *mut c_void) -> Self {
        Self::Win32 { hwnd, hinstance }
    }

    pub fn xlib(display: *mut c_void, window: u64) -> Self {
        Self::Xlib { display, window }
    }

    pub fn wayland(surface: *mut c_void, display: *mut c_void) -> Self {
        Self::Wayland { surface, display }
    }

    pub fn xcb(connection: *mut c_void, window: u32) -> Self {
        Self::Xcb { connection, window }
    }

    pub fn metal(layer: *mut c_void) -> Self {
        Self::Metal { layer }
    }

    pub fn emscripten(canvas_selector: impl Into<String>) -> Self {
        Self::Emscripten {
            canvas_selector: canvas_selector.into(),
        }
    }

    pub fn android(window: *mut c_void) -> Self {
        Self::Android { window }
    }

    pub fn windowing_system(&self) -> WindowingSystem {
        match self {
            Self::Win32 { .. } => WindowingSystem::Win32,
            Self::Xlib { .. } => WindowingSystem::Xlib,
            Self::Wayland { .. } => WindowingSystem::Wayland,
            Self::Xcb { .. } => WindowingSystem::Xcb,
            Self::Metal { .. } => WindowingSystem::Metal,
            Self::Emscripten { .. } => WindowingSystem::Emscripten,
            Self::Android { .. } => WindowingSystem::Android,
        }
    }

    /// Capture the native handles of a window from any windowing library
    /// implementing `raw-window-handle`.
    ///
    /// macOS views are rejected; pass the view's `CAMetalLayer` through
    /// [`PlatformWindowHandle::metal`] instead.
    pub fn from_window(
        window: &(impl HasWindowHandle + HasDisplayHandle),
    ) -> Result<Self> {
        let window_handle = window
            .window_handle()
            .map_err(|e| Error::invalid_argument(format!("window handle: {e}")))?
            .as_raw();
        let display_handle = window
            .display_handle()
            .map_err(|e| {
                Error::invalid_argument(format!("display handle: {e}"))
            })?
            .as_raw();

        let ptr = |p: Option<NonNull<c_void>>| {
            p.map_or(std::ptr::null_mut(), NonNull::as_ptr)
        };

        Ok(match (window_handle, display_handle) {
            (RawWindowHandle::Win32(w), _) => Self::Win32 {
                hwnd: w.hwnd.get() as *mut c_void,
                hinstance: w
                    .hinstance
                    .map_or(std::ptr::null_mut(), |h| h.get() as *mut c_void),
            },
            (RawWindowHandle::Xlib(w), RawDisplayHandle::Xlib(d)) => {
                Self::Xlib {
                    display: ptr(d.display),
                    window: w.window as u64,
                }
            }
            (RawWindowHandle::Wayland(w), RawDisplayHandle::Wayland(d)) => {
                Self::Wayland {
                    surface: w.surface.as_ptr(),
                    display: d.display.as_ptr(),
                }
            }
            (RawWindowHandle::Xcb(w), RawDisplayHandle::Xcb(d)) => Self::Xcb {
                connection: ptr(d.connection),
                window: w.window.get(),
            },
            (RawWindowHandle::AndroidNdk(w), _) => Self::Android {
                window: w.a_native_window.as_ptr(),
            },
            (RawWindowHandle::Web(w), _) => Self::Emscripten {
                canvas_selector: format!("[data-raw-handle=\"{}\"]", w.id),
            },
            (other, _) => {
                return Err(Error::unsupported(format!(
                    "window handle {other:?} has no platform binding"
                )));
            }
        })
    }

    /// Convert back into `raw-window-handle` form for surface creation.
    ///
    /// Fails for [`WindowingSystem::Metal`] and
    /// [`WindowingSystem::Emscripten`], which backends bind directly.
    pub fn to_raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
        let null = |what: &str| {
            Error::invalid_argument(format!("{what} must not be null"))
        };
        match *self {
            Self::Win32 { hwnd, hinstance } => {
                let hwnd = NonZeroIsize::new(hwnd as isize)
                    .ok_or_else(|| null("hwnd"))?;
                let mut handle = Win32WindowHandle::new(hwnd);
                handle.hinstance = NonZeroIsize::new(hinstance as isize);
                Ok((
                    RawDisplayHandle::Windows(WindowsDisplayHandle::new()),
                    RawWindowHandle::Win32(handle),
                ))
            }
            Self::Xlib { display, window } => Ok((
                RawDisplayHandle::Xlib(XlibDisplayHandle::new(
                    NonNull::new(display),
                    0,
                )),
                RawWindowHandle::Xlib(XlibWindowHandle::new(window as _)),
            )),
            Self::Wayland { surface, display } => {
                let surface =
                    NonNull::new(surface).ok_or_else(|| null("wl_surface"))?;
                let display =
                    NonNull::new(display).ok_or_else(|| null("wl_display"))?;
                Ok((
                    RawDisplayHandle::Wayland(WaylandDisplayHandle::new(
                        display,
                    )),
                    RawWindowHandle::Wayland(WaylandWindowHandle::new(
                        surface,
                    )),
                ))
            }
            Self::Xcb { connection, window } => {
                let window =
                    NonZeroU32::new(window).ok_or_else(|| null("xcb window"))?;
                Ok((
                    RawDisplayHandle::Xcb(XcbDisplayHandle::new(
                        NonNull::new(connection),
                        0,
                    )),
                    RawWindowHandle::Xcb(XcbWindowHandle::new(window)),
                ))
            }
            Self::Android { window } => {
                let window = NonNull::new(window)
                    .ok_or_else(|| null("ANativeWindow"))?;
                Ok((
                    RawDisplayHandle::Android(AndroidDisplayHandle::new()),
                    RawWindowHandle::AndroidNdk(AndroidNdkWindowHandle::new(
                        window,
                    )),
                ))
            }
            Self::Metal { .. } | Self::Emscripten { .. } => {
                Err(Error::unsupported(format!(
                    "{:?} handles have no raw-window-handle form",
                    self.windowing_system()
                )))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SurfaceDescriptor<'a> {
    pub label: Option<&'a str>,
    pub window_handle: PlatformWindowHandle,
}

#[derive(Debug, Clone, Copy)]
pub struct SwapchainDescriptor<'a> {
    pub label: Option<&'a str>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub present_mode: PresentMode,
    pub image_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainInfo {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub image_count: u32,
    pub present_mode: PresentMode,
}

/// Clamp a requested image count into what the surface allows.
/// `max == 0` means no upper bound.
pub fn clamp_image_count(requested: u32, min: u32, max: u32) -> u32 {
    let count = requested.max(min);
    if max == 0 { count } else { count.min(max) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_count_clamps_into_surface_range() {
        assert_eq!(clamp_image_count(3, 2, 4), 3);
        assert_eq!(clamp_image_count(1, 2, 4), 2);
        assert_eq!(clamp_image_count(8, 2, 4), 4);
        assert_eq!(clamp_image_count(8, 2, 0), 8);
    }

    #[test]
    fn windowing_system_follows_variant() {
        let handle = PlatformWindowHandle::xcb(std::ptr::null_mut(), 7);
        assert_eq!(handle.windowing_system(), WindowingSystem::Xcb);
        let handle = PlatformWindowHandle::emscripten("#canvas");
        assert_eq!(handle.windowing_system(), WindowingSystem::Emscripten);
    }

    #[test]
    fn null_pointers_are_rejected_before_surface_creation() {
        let handle = PlatformWindowHandle::wayland(
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        );
        assert!(handle.to_raw_handles().is_err());
        let handle = PlatformWindowHandle::win32(
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        );
        assert!(handle.to_raw_handles().is_err());
    }

    #[test]
    fn metal_layers_bypass_raw_handles() {
        let mut layer = 0u8;
        let handle =
            PlatformWindowHandle::metal((&mut layer as *mut u8).cast());
        assert!(matches!(
            handle.to_raw_handles(),
            Err(Error::FeatureNotSupported(_))
        ));
    }
}
