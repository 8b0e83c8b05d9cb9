//! Host-visible synchronisation: [`Fence`] and [`Semaphore`].
//!
//! Both live in the device hub behind an `Arc`. Host waits clone the `Arc`
//! out of the hub and block without holding the hub lock, so a destroy
//! during a wait only takes effect once the wait returns.

use std::sync::Arc;

use ash::vk;
use rgfx_core::SemaphoreType;
use thiserror::Error;

use crate::error::classify;
use crate::raw::RawDevice;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Wait timed out")]
    Timeout,

    #[error("Timeline semaphores are not enabled on this device")]
    TimelineUnsupported,

    #[error("Host operation requires a timeline semaphore")]
    NotTimeline,

    #[error("Vulkan error in {call}: {result:?}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },
}

impl SyncError {
    fn vulkan(call: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| match result {
            vk::Result::TIMEOUT => SyncError::Timeout,
            result => SyncError::Vulkan { call, result },
        }
    }
}

impl From<SyncError> for rgfx_core::Error {
    fn from(value: SyncError) -> Self {
        match value {
            SyncError::Timeout => rgfx_core::Error::Timeout,
            SyncError::TimelineUnsupported => rgfx_core::Error::unsupported(
                "timeline semaphores are not enabled",
            ),
            SyncError::NotTimeline => rgfx_core::Error::invalid_argument(
                "host signal, wait and value need a timeline semaphore",
            ),
            SyncError::Vulkan { call, result } => classify(call, result),
        }
    }
}

// ---------------------------------------------------------------------------
// Fence
// ---------------------------------------------------------------------------

/// A binary CPU-GPU fence.
pub struct Fence {
    parent: Arc<RawDevice>,
    handle: vk::Fence,
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Fence {
    /// `signaled` sets the initial state, so a first wait in a frame loop
    /// returns immediately.
    pub fn new(
        device: &Arc<RawDevice>,
        signaled: bool,
        label: Option<&str>,
    ) -> Result<Self, SyncError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        // SAFETY: create_info holds no borrowed pointers.
        let handle = unsafe { device.ash_device().create_fence(&create_info, None) }
            .map_err(SyncError::vulkan("vkCreateFence"))?;
        // SAFETY: handle was just created from device.
        unsafe { device.label_object(handle, "fence", label) };
        Ok(Self {
            parent: Arc::clone(device),
            handle,
        })
    }

    pub fn raw(&self) -> vk::Fence {
        self.handle
    }

    pub fn is_signaled(&self) -> Result<bool, SyncError> {
        // SAFETY: handle is a valid fence of parent.
        unsafe { self.parent.ash_device().get_fence_status(self.handle) }
            .map_err(SyncError::vulkan("vkGetFenceStatus"))
    }

    /// Block until signaled. `u64::MAX` waits indefinitely.
    pub fn wait(&self, timeout_ns: u64) -> Result<(), SyncError> {
        // SAFETY: handle is a valid fence of parent.
        unsafe {
            self.parent.ash_device().wait_for_fences(
                &[self.handle],
                true,
                timeout_ns,
            )
        }
        .map_err(SyncError::vulkan("vkWaitForFences"))
    }

    /// Return the fence to the unsignaled state.
    ///
    /// Resetting a fence still pending on the queue is a usage error the
    /// validation layers report; the call itself is not checked here.
    pub fn reset(&self) -> Result<(), SyncError> {
        // SAFETY: handle is a valid fence of parent. Vulkan requires the
        // fence not be pending; the caller owns that ordering.
        unsafe { self.parent.ash_device().reset_fences(&[self.handle]) }
            .map_err(SyncError::vulkan("vkResetFences"))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        tracing::debug!("Dropping fence {:?}", self.handle);
        // SAFETY: handle was created from parent. A fence pending on the
        // queue is waited on first so destruction never races the GPU.
        unsafe {
            let device = self.parent.ash_device();
            if device.get_fence_status(self.handle) == Ok(false) {
                tracing::warn!(
                    "Fence {:?} dropped while unsignaled, waiting for queue",
                    self.handle
                );
                if let Err(e) = self.parent.queue_wait_idle() {
                    tracing::error!("vkQueueWaitIdle failed: {e:?}");
                }
            }
            device.destroy_fence(self.handle, None)
        };
    }
}

// ---------------------------------------------------------------------------
// Semaphore
// ---------------------------------------------------------------------------

/// A GPU-GPU semaphore, binary or timeline.
///
/// Only timeline semaphores support host signal, wait and value queries.
pub struct Semaphore {
    parent: Arc<RawDevice>,
    handle: vk::Semaphore,
    ty: SemaphoreType,
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("handle", &self.handle)
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

impl Semaphore {
    pub fn new(
        device: &Arc<RawDevice>,
        ty: SemaphoreType,
        initial_value: u64,
        label: Option<&str>,
    ) -> Result<Self, SyncError> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let mut create_info = vk::SemaphoreCreateInfo::default();
        if ty == SemaphoreType::Timeline {
            if !device.has_timeline_semaphores() {
                return Err(SyncError::TimelineUnsupported);
            }
            create_info = create_info.push_next(&mut type_info);
        }
        // SAFETY: create_info and its chain live on this stack frame.
        let handle = unsafe {
            device.ash_device().create_semaphore(&create_info, None)
        }
        .map_err(SyncError::vulkan("vkCreateSemaphore"))?;
        // SAFETY: handle was just created from device.
        unsafe { device.label_object(handle, "semaphore", label) };
        Ok(Self {
            parent: Arc::clone(device),
            handle,
            ty,
        })
    }

    pub fn raw(&self) -> vk::Semaphore {
        self.handle
    }

    pub fn ty(&self) -> SemaphoreType {
        self.ty
    }

    fn require_timeline(&self) -> Result<(), SyncError> {
        match self.ty {
            SemaphoreType::Timeline => Ok(()),
            SemaphoreType::Binary => Err(SyncError::NotTimeline),
        }
    }

    pub fn signal(&self, value: u64) -> Result<(), SyncError> {
        self.require_timeline()?;
        let info = vk::SemaphoreSignalInfo::default()
            .semaphore(self.handle)
            .value(value);
        // SAFETY: handle is a timeline semaphore of parent.
        unsafe { self.parent.ash_device().signal_semaphore(&info) }
            .map_err(SyncError::vulkan("vkSignalSemaphore"))
    }

    pub fn wait(&self, value: u64, timeout_ns: u64) -> Result<(), SyncError> {
        self.require_timeline()?;
        let semaphores = [self.handle];
        let values = [value];
        let info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        // SAFETY: handle is a timeline semaphore of parent; the arrays live
        // until the call returns.
        unsafe { self.parent.ash_device().wait_semaphores(&info, timeout_ns) }
            .map_err(SyncError::vulkan("vkWaitSemaphores"))
    }

    pub fn value(&self) -> Result<u64, SyncError> {
        self.require_timeline()?;
        // SAFETY: handle is a timeline semaphore of parent.
        unsafe {
            self.parent
                .ash_device()
                .get_semaphore_counter_value(self.handle)
        }
        .map_err(SyncError::vulkan("vkGetSemaphoreCounterValue"))
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        tracing::debug!("Dropping semaphore {:?}", self.handle);
        // SAFETY: handle was created from parent. Submissions referencing
        // it are retired before the device releases hub entries.
        unsafe {
            self.parent
                .ash_device()
                .destroy_semaphore(self.handle, None)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_distinguished() {
        assert!(matches!(
            SyncError::vulkan("vkWaitForFences")(vk::Result::TIMEOUT),
            SyncError::Timeout
        ));
        assert!(matches!(
            rgfx_core::Error::from(SyncError::Timeout),
            rgfx_core::Error::Timeout
        ));
        let lost = SyncError::vulkan("vkWaitForFences")(
            vk::Result::ERROR_DEVICE_LOST,
        );
        assert!(matches!(
            rgfx_core::Error::from(lost),
            rgfx_core::Error::DeviceLost
        ));
    }

    #[test]
    fn binary_host_operations_are_rejected() {
        assert_eq!(
            rgfx_core::Error::from(SyncError::NotTimeline).code(),
            rgfx_core::ResultCode::InvalidArgument
        );
        assert_eq!(
            rgfx_core::Error::from(SyncError::TimelineUnsupported).code(),
            rgfx_core::ResultCode::FeatureNotSupported
        );
    }
}
