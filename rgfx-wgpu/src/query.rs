//! Occlusion and timestamp query sets.
//!
//! Results are resolved as 64-bit values. wgpu requires the destination
//! offset of a resolve to be 256-byte aligned, and the buffer needs
//! `QUERY_RESOLVE` usage, which buffers created as copy destinations get.

use rgfx_core::descriptor::QuerySetDescriptor;
use rgfx_core::QueryType;

use crate::conv;
use crate::error::scoped;

/// Bytes written per query by a resolve.
pub const QUERY_RESULT_SIZE: u64 = std::mem::size_of::<u64>() as u64;

/// Validate a resolve of `count` queries from `first` into a buffer of
/// `buffer_size` bytes at `offset`.
pub fn check_resolve(
    first: u32,
    count: u32,
    total: u32,
    offset: u64,
    buffer_size: u64,
) -> rgfx_core::Result<()> {
    let end = first.checked_add(count);
    if count == 0 || end.is_none_or(|end| end > total) {
        return Err(rgfx_core::Error::invalid_argument(format!(
            "queries {first}..+{count} out of range for a set of {total}"
        )));
    }
    let alignment = u64::from(wgpu::QUERY_RESOLVE_BUFFER_ALIGNMENT);
    if offset % alignment != 0 {
        return Err(rgfx_core::Error::invalid_argument(format!(
            "resolve offset {offset} is not a multiple of {alignment}"
        )));
    }
    let bytes = u64::from(count) * QUERY_RESULT_SIZE;
    if offset.checked_add(bytes).is_none_or(|end| end > buffer_size) {
        return Err(rgfx_core::Error::invalid_argument(format!(
            "{bytes} result bytes at offset {offset} overflow a buffer of \
             {buffer_size}"
        )));
    }
    Ok(())
}

pub struct QuerySet {
    raw: wgpu::QuerySet,
    ty: QueryType,
    count: u32,
}

impl std::fmt::Debug for QuerySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySet")
            .field("ty", &self.ty)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

impl QuerySet {
    pub fn new(
        device: &wgpu::Device,
        desc: &QuerySetDescriptor<'_>,
    ) -> rgfx_core::Result<Self> {
        if desc.query_type == QueryType::Timestamp
            && !device.features().contains(wgpu::Features::TIMESTAMP_QUERY)
        {
            return Err(rgfx_core::Error::unsupported(
                "timestamp queries are not available on this adapter",
            ));
        }
        let raw = scoped(device, "create_query_set", || {
            device.create_query_set(&wgpu::QuerySetDescriptor {
                label: desc.label,
                ty: conv::query_type(desc.query_type),
                count: desc.count,
            })
        })?;
        Ok(Self {
            raw,
            ty: desc.query_type,
            count: desc.count,
        })
    }

    pub fn raw(&self) -> &wgpu::QuerySet {
        &self.raw
    }

    pub fn ty(&self) -> QueryType {
        self.ty
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn require(&self, ty: QueryType, index: u32) -> rgfx_core::Result<()> {
        if self.ty != ty {
            return Err(rgfx_core::Error::invalid_argument(format!(
                "query set holds {:?} queries, not {ty:?}",
                self.ty
            )));
        }
        if index >= self.count {
            return Err(rgfx_core::Error::invalid_argument(format!(
                "query index {index} out of range for a set of {}",
                self.count
            )));
        }
        Ok(())
    }
}

impl Drop for QuerySet {
    fn drop(&mut self) {
        tracing::debug!("Dropping query set {:?}", self.raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_bounds() {
        assert!(check_resolve(0, 4, 4, 0, 32).is_ok());
        assert!(check_resolve(2, 2, 4, 256, 272).is_ok());
        assert!(check_resolve(3, 2, 4, 0, 64).is_err());
        assert!(check_resolve(0, 0, 4, 0, 32).is_err());
        assert!(check_resolve(u32::MAX, 2, 4, 0, 32).is_err());
    }

    #[test]
    fn resolve_offsets_follow_wgpu_alignment() {
        assert!(check_resolve(0, 1, 4, 8, 512).is_err());
        assert!(check_resolve(0, 1, 4, 256, 512).is_ok());
        assert!(check_resolve(0, 4, 4, 256, 280).is_err());
    }
}
