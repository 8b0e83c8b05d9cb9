//! Emulated [`Fence`] and [`Semaphore`].
//!
//! WebGPU exposes neither. A fence is a flag flipped by a
//! `Queue::on_submitted_work_done` callback registered after the submission
//! it is attached to. That callback fires once *all* work submitted so far
//! has completed, so a fence resolves on queue completion rather than on
//! completion of its own submission.
//!
//! Semaphores are host-side counters. wgpu executes submissions in order on
//! its single queue, so waits recorded in a submission have nothing to
//! order; signals update the counter when the queue completes.
//!
//! Host waits drive callbacks by polling the device, then sleep on a
//! condition variable until the predicate holds or the timeout elapses.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rgfx_core::SemaphoreType;
use thiserror::Error;

/// Sleep between polls of a waiting thread.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Wait timed out")]
    Timeout,

    #[error("Host operation requires a timeline semaphore")]
    NotTimeline,

    #[error("Operation requires a binary semaphore")]
    NotBinary,

    #[error("Timeline value {requested} is not above the current {current}")]
    NotMonotonic { requested: u64, current: u64 },

    #[error("Polling the device failed: {0}")]
    Poll(#[from] wgpu::PollError),
}

impl From<SyncError> for rgfx_core::Error {
    fn from(value: SyncError) -> Self {
        match value {
            SyncError::Timeout => rgfx_core::Error::Timeout,
            SyncError::NotTimeline
            | SyncError::NotBinary
            | SyncError::NotMonotonic { .. } => {
                rgfx_core::Error::invalid_argument(value.to_string())
            }
            SyncError::Poll(e) => {
                tracing::error!("Device poll failed: {e}");
                rgfx_core::Error::backend(e)
            }
        }
    }
}

/// Block until every submission on `device` has completed and its
/// callbacks have run.
pub fn poll_wait(device: &wgpu::Device) -> Result<(), wgpu::PollError> {
    device.poll(wgpu::PollType::Wait).map(|_| ())
}

/// State shared with queue callbacks.
#[derive(Debug, Default)]
struct Signal<T> {
    state: Mutex<T>,
    changed: Condvar,
}

impl<T> Signal<T> {
    fn new(state: T) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            changed: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.state.lock().expect("sync state lock poisoned")
    }

    fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let out = f(&mut self.lock());
        self.changed.notify_all();
        out
    }

    /// Poll `device` until `done` holds. `u64::MAX` waits indefinitely.
    fn wait_for(
        &self,
        device: &wgpu::Device,
        timeout_ns: u64,
        done: impl Fn(&T) -> bool,
    ) -> Result<(), SyncError> {
        let deadline = (timeout_ns != u64::MAX)
            .then(|| Instant::now() + Duration::from_nanos(timeout_ns));
        loop {
            if done(&self.lock()) {
                return Ok(());
            }
            match deadline {
                None => poll_wait(device)?,
                Some(_) => {
                    device.poll(wgpu::PollType::Poll)?;
                }
            }
            let state = self.lock();
            if done(&state) {
                return Ok(());
            }
            let slice = match deadline {
                None => POLL_INTERVAL,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(SyncError::Timeout);
                    }
                    (deadline - now).min(POLL_INTERVAL)
                }
            };
            let _ = self
                .changed
                .wait_timeout(state, slice)
                .expect("sync state lock poisoned");
        }
    }
}

// ---------------------------------------------------------------------------
// Fence
// ---------------------------------------------------------------------------

/// Flag logic of an emulated fence.
///
/// Every arm starts a new epoch. A completion only signals the fence when it
/// belongs to the current epoch, so a reset followed by a new submission is
/// not signaled early by the callback of an older one.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FenceState {
    signaled: bool,
    epoch: u64,
    pending: bool,
}

impl FenceState {
    pub fn new(signaled: bool) -> Self {
        Self {
            signaled,
            ..Self::default()
        }
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Attach the fence to a submission, returning the completion epoch.
    pub fn arm(&mut self) -> u64 {
        self.epoch += 1;
        self.signaled = false;
        self.pending = true;
        self.epoch
    }

    pub fn complete(&mut self, epoch: u64) {
        if epoch == self.epoch && self.pending {
            self.signaled = true;
            self.pending = false;
        }
    }

    pub fn reset(&mut self) {
        self.signaled = false;
        self.pending = false;
    }

    /// Signal immediately, dropping any pending completion.
    pub fn signal(&mut self) {
        self.epoch += 1;
        self.signaled = true;
        self.pending = false;
    }
}

pub struct Fence {
    label: Option<String>,
    signal: Arc<Signal<FenceState>>,
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence")
            .field("label", &self.label)
            .field("state", &*self.signal.lock())
            .finish()
    }
}

impl Fence {
    pub fn new(signaled: bool, label: Option<&str>) -> Self {
        Self {
            label: label.map(str::to_owned),
            signal: Signal::new(FenceState::new(signaled)),
        }
    }

    pub fn is_signaled(&self) -> bool {
        self.signal.lock().is_signaled()
    }

    /// Signal once everything submitted to `queue` so far has completed.
    pub fn arm(&self, queue: &wgpu::Queue) {
        let epoch = self.signal.update(FenceState::arm);
        let signal = Arc::clone(&self.signal);
        queue.on_submitted_work_done(move || {
            signal.update(|s| s.complete(epoch));
        });
    }

    /// Signal from the host, for operations that complete on return.
    pub fn signal_now(&self) {
        self.signal.update(FenceState::signal);
    }

    /// Block until signaled. `u64::MAX` waits indefinitely.
    pub fn wait(
        &self,
        device: &wgpu::Device,
        timeout_ns: u64,
    ) -> Result<(), SyncError> {
        self.signal
            .wait_for(device, timeout_ns, FenceState::is_signaled)
    }

    pub fn reset(&self) {
        let was_pending = self.signal.update(|s| {
            let pending = s.is_pending();
            s.reset();
            pending
        });
        if was_pending {
            tracing::warn!("Fence {:?} reset while pending", self.label);
        }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        tracing::debug!("Dropping fence {:?}", self.label);
    }
}

// ---------------------------------------------------------------------------
// Semaphore
// ---------------------------------------------------------------------------

/// A host-side counter standing in for a binary or timeline semaphore.
///
/// Binary semaphores hold 0 or 1 and only change through submissions;
/// host signal, wait and value need a timeline.
pub struct Semaphore {
    label: Option<String>,
    ty: SemaphoreType,
    signal: Arc<Signal<u64>>,
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("label", &self.label)
            .field("ty", &self.ty)
            .field("value", &*self.signal.lock())
            .finish()
    }
}

impl Semaphore {
    pub fn new(
        ty: SemaphoreType,
        initial_value: u64,
        label: Option<&str>,
    ) -> Self {
        let initial = match ty {
            SemaphoreType::Binary => 0,
            SemaphoreType::Timeline => initial_value,
        };
        Self {
            label: label.map(str::to_owned),
            ty,
            signal: Signal::new(initial),
        }
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

    /// Submission-side signal, applied once `queue` completes.
    pub fn signal_on_completion(&self, queue: &wgpu::Queue, value: u64) {
        let target = match self.ty {
            SemaphoreType::Binary => 1,
            SemaphoreType::Timeline => value,
        };
        let signal = Arc::clone(&self.signal);
        queue.on_submitted_work_done(move || {
            signal.update(|v| *v = (*v).max(target));
        });
    }

    /// Signal a binary semaphore from the host, for operations that
    /// complete on return.
    pub fn signal_now(&self) -> Result<(), SyncError> {
        match self.ty {
            SemaphoreType::Binary => {
                self.signal.update(|v| *v = 1);
                Ok(())
            }
            SemaphoreType::Timeline => Err(SyncError::NotBinary),
        }
    }

    /// Submission-side wait. Ordering comes from the single queue; a binary
    /// semaphore is consumed.
    pub fn consume_wait(&self) {
        if self.ty == SemaphoreType::Binary {
            let was = self.signal.update(|v| std::mem::take(v));
            if was == 0 {
                tracing::trace!(
                    "Semaphore {:?} waited before its signal completed",
                    self.label
                );
            }
        }
    }

    pub fn signal(&self, value: u64) -> Result<(), SyncError> {
        self.require_timeline()?;
        self.signal.update(|current| {
            if value <= *current {
                return Err(SyncError::NotMonotonic {
                    requested: value,
                    current: *current,
                });
            }
            *current = value;
            Ok(())
        })
    }

    pub fn wait(
        &self,
        device: &wgpu::Device,
        value: u64,
        timeout_ns: u64,
    ) -> Result<(), SyncError> {
        self.require_timeline()?;
        self.signal
            .wait_for(device, timeout_ns, |current| *current >= value)
    }

    pub fn value(&self) -> Result<u64, SyncError> {
        self.require_timeline()?;
        Ok(*self.signal.lock())
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        tracing::debug!("Dropping semaphore {:?}", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_starts_in_requested_state() {
        assert!(FenceState::new(true).is_signaled());
        assert!(!FenceState::new(false).is_signaled());
    }

    #[test]
    fn completion_signals_current_epoch() {
        let mut state = FenceState::new(true);
        let epoch = state.arm();
        assert!(!state.is_signaled());
        assert!(state.is_pending());
        state.complete(epoch);
        assert!(state.is_signaled());
        assert!(!state.is_pending());
    }

    #[test]
    fn stale_completion_is_ignored_after_reset() {
        let mut state = FenceState::default();
        let old = state.arm();
        state.reset();
        let new = state.arm();
        state.complete(old);
        assert!(!state.is_signaled());
        state.complete(new);
        assert!(state.is_signaled());
    }

    #[test]
    fn completion_without_arm_does_not_signal() {
        let mut state = FenceState::default();
        state.complete(0);
        assert!(!state.is_signaled());
    }

    #[test]
    fn host_signal_overrides_pending_completion() {
        let mut state = FenceState::default();
        let epoch = state.arm();
        state.signal();
        assert!(state.is_signaled());
        state.reset();
        state.complete(epoch);
        assert!(!state.is_signaled());
    }

    #[test]
    fn reset_clears_signal() {
        let mut state = FenceState::new(true);
        state.reset();
        assert!(!state.is_signaled());
    }

    #[test]
    fn fence_flag_without_device() {
        let fence = Fence::new(true, Some("frame"));
        assert!(fence.is_signaled());
        fence.reset();
        assert!(!fence.is_signaled());
    }

    #[test]
    fn timeline_host_signal_is_monotonic() {
        let semaphore = Semaphore::new(SemaphoreType::Timeline, 3, None);
        assert_eq!(semaphore.value().unwrap(), 3);
        semaphore.signal(5).unwrap();
        assert_eq!(semaphore.value().unwrap(), 5);
        assert!(matches!(
            semaphore.signal(5),
            Err(SyncError::NotMonotonic {
                requested: 5,
                current: 5
            })
        ));
    }

    #[test]
    fn binary_semaphores_reject_host_operations() {
        let semaphore = Semaphore::new(SemaphoreType::Binary, 7, None);
        assert!(matches!(semaphore.value(), Err(SyncError::NotTimeline)));
        assert!(matches!(semaphore.signal(1), Err(SyncError::NotTimeline)));
        assert_eq!(
            rgfx_core::Error::from(SyncError::NotTimeline).code(),
            rgfx_core::ResultCode::InvalidArgument
        );
    }

    #[test]
    fn timeouts_keep_their_code() {
        assert!(matches!(
            rgfx_core::Error::from(SyncError::Timeout),
            rgfx_core::Error::Timeout
        ));
    }
}
