//! Buffers and host access to their memory.
//!
//! Owning buffers are allocated through `gpu-allocator`; host-visible ones
//! stay persistently mapped by the allocator, so "mapping" only opens a
//! range the caller may touch. Imported buffers wrap a `VkBuffer` owned
//! elsewhere and are never mapped or freed here.

use std::ops::Range;
use std::sync::{Arc, Mutex};

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::{AllocationError, vulkan::Allocation};
use rgfx_core::descriptor::{BufferDescriptor, BufferImportDescriptor, BufferInfo};
use rgfx_core::util::{align_down, align_up};
use rgfx_core::MemoryProperty;
use thiserror::Error;

use crate::conv;
use crate::error::{allocation_error, classify};
use crate::raw::{MemoryUsage, RawDevice};

#[derive(Debug, Error)]
pub enum CreateBufferError {
    #[error("Vulkan error creating buffer: {0}")]
    CreateBuffer(vk::Result),

    #[error("GPU allocator error allocating memory: {0}")]
    AllocateMemory(AllocationError),

    #[error("Vulkan error binding buffer memory: {0}")]
    BindMemory(vk::Result),
}

impl From<CreateBufferError> for rgfx_core::Error {
    fn from(value: CreateBufferError) -> Self {
        match value {
            CreateBufferError::CreateBuffer(e) => classify("vkCreateBuffer", e),
            CreateBufferError::AllocateMemory(e) => allocation_error(e),
            CreateBufferError::BindMemory(e) => {
                classify("vkBindBufferMemory", e)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum MapBufferError {
    #[error("Buffer memory is not host visible")]
    NotHostVisible,

    #[error("Range {offset}+{size} exceeds buffer size {buffer_size}")]
    OutOfRange {
        offset: u64,
        size: u64,
        buffer_size: u64,
    },

    #[error("Buffer is already mapped")]
    AlreadyMapped,

    #[error("Access outside the mapped range {0:?}")]
    NotMapped(Option<Range<u64>>),

    #[error("Vulkan error flushing or invalidating mapped memory: {0}")]
    Vulkan(vk::Result),
}

impl From<MapBufferError> for rgfx_core::Error {
    fn from(value: MapBufferError) -> Self {
        match value {
            MapBufferError::NotHostVisible => {
                rgfx_core::Error::invalid_argument(value.to_string())
            }
            MapBufferError::OutOfRange { .. } => {
                rgfx_core::Error::invalid_argument(value.to_string())
            }
            MapBufferError::AlreadyMapped | MapBufferError::NotMapped(_) => {
                rgfx_core::Error::invalid_state(value.to_string())
            }
            MapBufferError::Vulkan(e) => {
                classify("vkFlushMappedMemoryRanges", e)
            }
        }
    }
}

/// Resolve `[offset, offset + size)` against a buffer of `buffer_size`
/// bytes. `size == 0` runs to the end.
pub fn byte_range(
    offset: u64,
    size: u64,
    buffer_size: u64,
) -> Result<Range<u64>, MapBufferError> {
    let end = match size {
        0 => buffer_size,
        n => offset.checked_add(n).unwrap_or(u64::MAX),
    };
    if offset > buffer_size || end > buffer_size || offset > end {
        return Err(MapBufferError::OutOfRange {
            offset,
            size,
            buffer_size,
        });
    }
    Ok(offset..end)
}

pub struct Buffer {
    parent: Arc<RawDevice>,
    handle: vk::Buffer,
    allocation: Option<Allocation>,
    info: BufferInfo,
    owned: bool,
    mapped: Mutex<Option<Range<u64>>>,
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("handle", &self.handle)
            .field("size", &self.info.size)
            .field("owned", &self.owned)
            .finish_non_exhaustive()
    }
}

impl Buffer {
    pub fn new(
        device: &Arc<RawDevice>,
        desc: &BufferDescriptor<'_>,
    ) -> Result<Self, CreateBufferError> {
        let create_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(conv::buffer_usage(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let ash_device = device.ash_device();
        // SAFETY: create_info is fully initialised and has no borrowed data.
        let handle = unsafe { ash_device.create_buffer(&create_info, None) }
            .map_err(CreateBufferError::CreateBuffer)?;

        // SAFETY: handle is a valid buffer created from device.
        unsafe { device.label_object(handle, "buffer", desc.label) };

        // SAFETY: handle is a valid buffer created from this device.
        let reqs = unsafe { ash_device.get_buffer_memory_requirements(handle) };
        let memory_usage =
            MemoryUsage::for_buffer(desc.usage, desc.memory_properties);
        let allocation = device
            .allocate_memory(
                desc.label.unwrap_or("buffer"),
                reqs,
                memory_usage,
                true,
            )
            .map_err(|e| {
                // SAFETY: handle was created from this device and is not
                // bound to memory yet.
                unsafe { ash_device.destroy_buffer(handle, None) };
                CreateBufferError::AllocateMemory(e)
            })?;

        // SAFETY: handle and allocation memory are valid and belong to this
        // device.
        let bind_result = unsafe {
            ash_device.bind_buffer_memory(
                handle,
                allocation.memory(),
                allocation.offset(),
            )
        };
        if let Err(e) = bind_result {
            let _ = device.free_memory(allocation);
            // SAFETY: handle is valid and owned by this scope.
            unsafe { ash_device.destroy_buffer(handle, None) };
            return Err(CreateBufferError::BindMemory(e));
        }

        // SAFETY: allocation was made from this device.
        let memory_properties =
            conv::memory_property(unsafe { allocation.memory_properties() });

        Ok(Self {
            parent: Arc::clone(device),
            handle,
            allocation: Some(allocation),
            info: BufferInfo {
                size: desc.size,
                usage: desc.usage,
                memory_properties,
            },
            owned: true,
            mapped: Mutex::new(None),
        })
    }

    /// Wrap a `VkBuffer` created elsewhere on the same device.
    pub fn import(
        device: &Arc<RawDevice>,
        desc: &BufferImportDescriptor<'_>,
    ) -> Self {
        let handle = vk::Buffer::from_raw(desc.native_handle);
        // SAFETY: the caller vouches that the handle belongs to this device.
        unsafe { device.label_object(handle, "buffer", desc.label) };
        Self {
            parent: Arc::clone(device),
            handle,
            allocation: None,
            info: BufferInfo {
                size: desc.size,
                usage: desc.usage,
                memory_properties: MemoryProperty::empty(),
            },
            owned: false,
            mapped: Mutex::new(None),
        }
    }

    pub fn raw(&self) -> vk::Buffer {
        self.handle
    }

    pub fn info(&self) -> BufferInfo {
        self.info
    }

    pub fn size(&self) -> u64 {
        self.info.size
    }

    pub fn native_handle(&self) -> u64 {
        self.handle.as_raw()
    }

    pub fn is_host_visible(&self) -> bool {
        self.allocation
            .as_ref()
            .is_some_and(|a| a.mapped_ptr().is_some())
    }

    fn is_coherent(&self) -> bool {
        self.info.memory_properties.contains(MemoryProperty::HOST_COHERENT)
    }

    pub fn map(&self, offset: u64, size: u64) -> Result<(), MapBufferError> {
        if !self.is_host_visible() {
            return Err(MapBufferError::NotHostVisible);
        }
        let range = byte_range(offset, size, self.info.size)?;
        let mut mapped = self.mapped.lock().expect("buffer map lock poisoned");
        if mapped.is_some() {
            return Err(MapBufferError::AlreadyMapped);
        }
        tracing::trace!("Mapping buffer {:?} range {range:?}", self.handle);
        *mapped = Some(range);
        Ok(())
    }

    /// Close the mapped range. Unmapping an unmapped buffer is a no-op.
    pub fn unmap(&self) {
        *self.mapped.lock().expect("buffer map lock poisoned") = None;
    }

    fn check_mapped(&self, range: &Range<u64>) -> Result<(), MapBufferError> {
        let mapped = self.mapped.lock().expect("buffer map lock poisoned");
        match mapped.as_ref() {
            Some(m) if m.start <= range.start && range.end <= m.end => Ok(()),
            other => Err(MapBufferError::NotMapped(other.cloned())),
        }
    }

    pub fn write_mapped(
        &self,
        offset: u64,
        data: &[u8],
    ) -> Result<(), MapBufferError> {
        let range = byte_range(offset, data.len() as u64, self.info.size)?;
        self.check_mapped(&range)?;
        self.write_host(offset, data)
    }

    pub fn read_mapped(
        &self,
        offset: u64,
        out: &mut [u8],
    ) -> Result<(), MapBufferError> {
        let range = byte_range(offset, out.len() as u64, self.info.size)?;
        self.check_mapped(&range)?;
        let ptr = self.mapped_ptr()?;
        // SAFETY: The range was checked against the buffer size and the
        // allocation is persistently mapped for at least that many bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(
                ptr.add(offset as usize),
                out.as_mut_ptr(),
                out.len(),
            )
        };
        Ok(())
    }

    fn mapped_ptr(&self) -> Result<*mut u8, MapBufferError> {
        self.allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .map(|ptr| ptr.as_ptr().cast::<u8>())
            .ok_or(MapBufferError::NotHostVisible)
    }

    /// Copy `data` into host-visible memory at `offset` and flush it,
    /// regardless of the caller's mapped range.
    pub fn write_host(
        &self,
        offset: u64,
        data: &[u8],
    ) -> Result<(), MapBufferError> {
        byte_range(offset, data.len() as u64, self.info.size)?;
        let ptr = self.mapped_ptr()?;
        // SAFETY: The destination range lies inside the persistently mapped
        // allocation; `data` cannot alias device memory.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                ptr.add(offset as usize),
                data.len(),
            )
        };
        self.flush(offset, data.len() as u64)
    }

    fn mapped_memory_range(
        &self,
        offset: u64,
        size: u64,
    ) -> Result<Option<vk::MappedMemoryRange<'static>>, MapBufferError> {
        let range = byte_range(offset, size, self.info.size)?;
        let Some(allocation) = self.allocation.as_ref() else {
            return Err(MapBufferError::NotHostVisible);
        };
        if self.is_coherent() || range.is_empty() {
            return Ok(None);
        }
        let atom = self.parent.non_coherent_atom_size();
        let base = allocation.offset();
        let start = align_down(base + range.start, atom);
        let end = align_up(base + range.end, atom).min(base + allocation.size());
        Ok(Some(
            vk::MappedMemoryRange::default()
                // SAFETY: the memory stays alive as long as the allocation.
                .memory(unsafe { allocation.memory() })
                .offset(start)
                .size(end - start),
        ))
    }

    /// Make host writes visible to the device. No-op on coherent memory.
    pub fn flush(&self, offset: u64, size: u64) -> Result<(), MapBufferError> {
        if let Some(range) = self.mapped_memory_range(offset, size)? {
            // SAFETY: The range lies inside this buffer's allocation.
            unsafe {
                self.parent
                    .ash_device()
                    .flush_mapped_memory_ranges(std::slice::from_ref(&range))
            }
            .map_err(MapBufferError::Vulkan)?;
        }
        Ok(())
    }

    /// Make device writes visible to the host. No-op on coherent memory.
    pub fn invalidate(
        &self,
        offset: u64,
        size: u64,
    ) -> Result<(), MapBufferError> {
        if let Some(range) = self.mapped_memory_range(offset, size)? {
            // SAFETY: The range lies inside this buffer's allocation.
            unsafe {
                self.parent
                    .ash_device()
                    .invalidate_mapped_memory_ranges(std::slice::from_ref(
                        &range,
                    ))
            }
            .map_err(MapBufferError::Vulkan)?;
        }
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if !self.owned {
            tracing::trace!("Releasing imported buffer {:?}", self.handle);
            return;
        }
        tracing::debug!("Dropping buffer {:?}", self.handle);
        // SAFETY: handle was created from parent and is owned by this
        // wrapper.
        unsafe { self.parent.ash_device().destroy_buffer(self.handle, None) };

        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.parent.free_memory(allocation)
        {
            tracing::error!("Failed to free GPU allocation: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_runs_to_end() {
        assert_eq!(byte_range(16, 0, 64).unwrap(), 16..64);
        assert_eq!(byte_range(0, 64, 64).unwrap(), 0..64);
    }

    #[test]
    fn ranges_past_the_end_are_rejected() {
        assert!(matches!(
            byte_range(60, 8, 64),
            Err(MapBufferError::OutOfRange { .. })
        ));
        assert!(byte_range(65, 0, 64).is_err());
        assert!(byte_range(u64::MAX, 2, 64).is_err());
    }

    #[test]
    fn map_errors_map_to_codes() {
        use rgfx_core::ResultCode;
        let err: rgfx_core::Error = MapBufferError::NotHostVisible.into();
        assert_eq!(err.code(), ResultCode::InvalidArgument);
        let err: rgfx_core::Error = MapBufferError::AlreadyMapped.into();
        assert!(matches!(err, rgfx_core::Error::InvalidState(_)));
    }
}
