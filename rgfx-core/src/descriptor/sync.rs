use crate::handle::{FenceHandle, SemaphoreHandle};
use crate::types::{QueryType, SemaphoreType};

#[derive(Debug, Clone, Copy, Default)]
pub struct FenceDescriptor<'a> {
    pub label: Option<&'a str>,
    pub signaled: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SemaphoreDescriptor<'a> {
    pub label: Option<&'a str>,
    pub semaphore_type: SemaphoreType,
    /// Ignored for binary semaphores.
    pub initial_value: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct QuerySetDescriptor<'a> {
    pub label: Option<&'a str>,
    pub query_type: QueryType,
    pub count: u32,
}

/// Synchronization attached to one queue submission.
///
/// `wait_values` and `signal_values` are either empty or parallel to their
/// semaphore lists; entries for binary semaphores are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitInfo<'a> {
    pub wait_semaphores: &'a [SemaphoreHandle],
    pub wait_values: &'a [u64],
    pub signal_semaphores: &'a [SemaphoreHandle],
    pub signal_values: &'a [u64],
    pub signal_fence: Option<FenceHandle>,
}

impl SubmitInfo<'_> {
    pub fn wait_value(&self, index: usize) -> u64 {
        self.wait_values.get(index).copied().unwrap_or(0)
    }

    pub fn signal_value(&self, index: usize) -> u64 {
        self.signal_values.get(index).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PresentDescriptor<'a> {
    pub wait_semaphores: &'a [SemaphoreHandle],
}
