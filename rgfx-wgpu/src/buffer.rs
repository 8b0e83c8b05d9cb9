//! Buffers and host access to their memory.
//!
//! wgpu maps asynchronously and only at aligned boundaries. `map` widens the
//! requested range to those boundaries, waits for the mapping with a
//! blocking poll, and later reads and writes index into the widened view.

use std::ops::Range;
use std::sync::Mutex;

use rgfx_core::descriptor::{BufferDescriptor, BufferInfo};
use rgfx_core::util::{align_down, align_up};
use rgfx_core::{BufferUsage, MemoryProperty};
use thiserror::Error;

use crate::conv;
use crate::error::scoped;
use crate::sync::poll_wait;

#[derive(Debug, Error)]
pub enum MapBufferError {
    #[error("Buffer was not created with a map usage")]
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

    #[error("wgpu failed to map the buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    #[error("Mapping callback was dropped without running")]
    CallbackDropped,

    #[error("Polling the device failed: {0}")]
    Poll(#[from] wgpu::PollError),
}

impl From<MapBufferError> for rgfx_core::Error {
    fn from(value: MapBufferError) -> Self {
        match value {
            MapBufferError::NotHostVisible
            | MapBufferError::OutOfRange { .. } => {
                rgfx_core::Error::invalid_argument(value.to_string())
            }
            MapBufferError::AlreadyMapped | MapBufferError::NotMapped(_) => {
                rgfx_core::Error::invalid_state(value.to_string())
            }
            MapBufferError::Map(_)
            | MapBufferError::CallbackDropped
            | MapBufferError::Poll(_) => {
                tracing::error!("Buffer mapping failed: {value}");
                rgfx_core::Error::backend(value)
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

/// Widen `range` to what `map_async` accepts inside a buffer whose native
/// size is `native_size`.
pub fn map_bounds(range: &Range<u64>, native_size: u64) -> Range<u64> {
    let start = align_down(range.start, wgpu::MAP_ALIGNMENT);
    let end = align_up(range.end, wgpu::COPY_BUFFER_ALIGNMENT).min(native_size);
    start..end.max(start)
}

#[derive(Debug, Clone)]
struct Mapping {
    requested: Range<u64>,
    native: Range<u64>,
}

pub struct Buffer {
    raw: wgpu::Buffer,
    info: BufferInfo,
    owned: bool,
    mapped: Mutex<Option<Mapping>>,
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.info.size)
            .field("usage", &self.info.usage)
            .field("owned", &self.owned)
            .finish_non_exhaustive()
    }
}

impl Buffer {
    pub fn new(
        device: &wgpu::Device,
        desc: &BufferDescriptor<'_>,
    ) -> rgfx_core::Result<Self> {
        // Native sizes are padded so every mapped range can end aligned.
        let native_size = align_up(desc.size, wgpu::COPY_BUFFER_ALIGNMENT);
        let raw = scoped(device, "create_buffer", || {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: desc.label,
                size: native_size,
                usage: conv::buffer_usage(desc.usage),
                mapped_at_creation: false,
            })
        })?;
        let memory_properties = if desc.usage.is_mappable() {
            MemoryProperty::HOST_VISIBLE | MemoryProperty::HOST_COHERENT
        } else {
            MemoryProperty::DEVICE_LOCAL
        };
        Ok(Self {
            raw,
            info: BufferInfo {
                size: desc.size,
                usage: desc.usage,
                memory_properties,
            },
            owned: true,
            mapped: Mutex::new(None),
        })
    }

    /// Wrap a `wgpu::Buffer` created elsewhere on the same device.
    pub fn import(raw: wgpu::Buffer) -> Self {
        let usage = conv::buffer_usage_from_wgpu(raw.usage());
        Self {
            info: BufferInfo {
                size: raw.size(),
                usage,
                memory_properties: MemoryProperty::empty(),
            },
            raw,
            owned: false,
            mapped: Mutex::new(None),
        }
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.raw
    }

    pub fn info(&self) -> BufferInfo {
        self.info
    }

    pub fn size(&self) -> u64 {
        self.info.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.info.usage
    }

    fn map_mode(&self) -> Option<wgpu::MapMode> {
        let usage = self.raw.usage();
        if usage.contains(wgpu::BufferUsages::MAP_WRITE) {
            Some(wgpu::MapMode::Write)
        } else if usage.contains(wgpu::BufferUsages::MAP_READ) {
            Some(wgpu::MapMode::Read)
        } else {
            None
        }
    }

    pub fn map(
        &self,
        device: &wgpu::Device,
        offset: u64,
        size: u64,
    ) -> Result<(), MapBufferError> {
        let mode = self.map_mode().ok_or(MapBufferError::NotHostVisible)?;
        let requested = byte_range(offset, size, self.info.size)?;
        let mut mapped = self.mapped.lock().expect("buffer map lock poisoned");
        if mapped.is_some() {
            return Err(MapBufferError::AlreadyMapped);
        }
        let native = map_bounds(&requested, self.raw.size());
        if !native.is_empty() {
            map_blocking(device, &self.raw, native.clone(), mode)?;
        }
        tracing::trace!(
            "Mapped buffer range {requested:?} (native {native:?}, {mode:?})"
        );
        *mapped = Some(Mapping { requested, native });
        Ok(())
    }

    /// Close the mapped range. Unmapping an unmapped buffer is a no-op.
    pub fn unmap(&self) {
        let mapping = self.mapped.lock().expect("buffer map lock poisoned").take();
        if let Some(mapping) = mapping
            && !mapping.native.is_empty()
        {
            self.raw.unmap();
        }
    }

    fn mapping_for(
        &self,
        range: &Range<u64>,
    ) -> Result<Range<u64>, MapBufferError> {
        let mapped = self.mapped.lock().expect("buffer map lock poisoned");
        match mapped.as_ref() {
            Some(m)
                if m.requested.start <= range.start
                    && range.end <= m.requested.end =>
            {
                Ok(m.native.clone())
            }
            other => Err(MapBufferError::NotMapped(
                other.map(|m| m.requested.clone()),
            )),
        }
    }

    pub fn write_mapped(
        &self,
        offset: u64,
        data: &[u8],
    ) -> Result<(), MapBufferError> {
        let range = byte_range(offset, data.len() as u64, self.info.size)?;
        let native = self.mapping_for(&range)?;
        if data.is_empty() {
            return Ok(());
        }
        let mut view = self.raw.slice(native.clone()).get_mapped_range_mut();
        let start = (range.start - native.start) as usize;
        view[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn read_mapped(
        &self,
        offset: u64,
        out: &mut [u8],
    ) -> Result<(), MapBufferError> {
        let range = byte_range(offset, out.len() as u64, self.info.size)?;
        let native = self.mapping_for(&range)?;
        if out.is_empty() {
            return Ok(());
        }
        let view = self.raw.slice(native.clone()).get_mapped_range();
        let start = (range.start - native.start) as usize;
        out.copy_from_slice(&view[start..start + out.len()]);
        Ok(())
    }

    /// Mapped wgpu memory is always coherent; only the range is checked.
    pub fn check_host_range(
        &self,
        offset: u64,
        size: u64,
    ) -> Result<(), MapBufferError> {
        if self.map_mode().is_none() {
            return Err(MapBufferError::NotHostVisible);
        }
        byte_range(offset, size, self.info.size).map(|_| ())
    }

    /// Write `data` through a temporary mapping. Used for queue writes into
    /// buffers without `COPY_DST`.
    pub fn write_host(
        &self,
        device: &wgpu::Device,
        offset: u64,
        data: &[u8],
    ) -> Result<(), MapBufferError> {
        self.map(device, offset, data.len() as u64)?;
        let written = self.write_mapped(offset, data);
        self.unmap();
        written
    }
}

/// Map `range` of `buffer` and block until the mapping completes.
pub(crate) fn map_blocking(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
    range: Range<u64>,
    mode: wgpu::MapMode,
) -> Result<(), MapBufferError> {
    let (sender, receiver) = std::sync::mpsc::channel();
    buffer.slice(range).map_async(mode, move |result| {
        let _ = sender.send(result);
    });
    poll_wait(device)?;
    receiver
        .recv()
        .map_err(|_| MapBufferError::CallbackDropped)?
        .map_err(MapBufferError::from)
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if !self.owned {
            tracing::trace!("Releasing imported buffer {:?}", self.raw);
            return;
        }
        tracing::debug!("Dropping buffer {:?}", self.raw);
        self.raw.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_range_runs_to_end_for_zero_size() {
        assert_eq!(byte_range(16, 0, 64).unwrap(), 16..64);
        assert_eq!(byte_range(0, 64, 64).unwrap(), 0..64);
    }

    #[test]
    fn byte_range_rejects_overflow_and_overrun() {
        assert!(byte_range(60, 8, 64).is_err());
        assert!(byte_range(65, 0, 64).is_err());
        assert!(byte_range(u64::MAX, 2, 64).is_err());
    }

    #[test]
    fn map_bounds_widen_to_native_alignment() {
        assert_eq!(map_bounds(&(3..5), 64), 0..8);
        assert_eq!(map_bounds(&(9..17), 64), 8..20);
        assert_eq!(map_bounds(&(0..64), 64), 0..64);
    }

    #[test]
    fn map_bounds_stay_inside_padded_buffer() {
        assert_eq!(map_bounds(&(10..13), 16), 8..16);
        assert_eq!(map_bounds(&(8..8), 16), 8..8);
    }

    #[test]
    fn map_errors_keep_their_codes() {
        use rgfx_core::ResultCode;
        let e: rgfx_core::Error = MapBufferError::AlreadyMapped.into();
        assert!(matches!(e, rgfx_core::Error::InvalidState(_)));
        let e: rgfx_core::Error = MapBufferError::NotHostVisible.into();
        assert_eq!(e.code(), ResultCode::InvalidArgument);
    }
}
