//! Query pools for occlusion and timestamp queries.
//!
//! A pool is reset once at creation. Resolving a range copies 64-bit
//! results into a buffer and then resets that range, so a query can be
//! written again once its result has been resolved.

use std::sync::Arc;

use ash::vk;
use rgfx_core::descriptor::QuerySetDescriptor;
use rgfx_core::QueryType;

use crate::error::VkResultExt;
use crate::raw::RawDevice;

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
    if offset % QUERY_RESULT_SIZE != 0 {
        return Err(rgfx_core::Error::invalid_argument(format!(
            "resolve offset {offset} is not a multiple of {QUERY_RESULT_SIZE}"
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
    parent: Arc<RawDevice>,
    pool: vk::QueryPool,
    ty: QueryType,
    count: u32,
}

impl std::fmt::Debug for QuerySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySet")
            .field("pool", &self.pool)
            .field("ty", &self.ty)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

impl QuerySet {
    pub fn new(
        device: &Arc<RawDevice>,
        desc: &QuerySetDescriptor<'_>,
    ) -> rgfx_core::Result<Self> {
        let query_type = match desc.query_type {
            QueryType::Occlusion => vk::QueryType::OCCLUSION,
            QueryType::Timestamp => vk::QueryType::TIMESTAMP,
        };
        let create_info = vk::QueryPoolCreateInfo::default()
            .query_type(query_type)
            .query_count(desc.count);
        let ash_device = device.ash_device();
        // SAFETY: create_info holds no borrowed pointers.
        let pool = unsafe { ash_device.create_query_pool(&create_info, None) }
            .or_classify("vkCreateQueryPool")?;

        let count = desc.count;
        let reset = device.one_shot("reset query pool", |cmd| {
            // SAFETY: cmd is recording outside any render pass and pool
            // derives from this device.
            unsafe { ash_device.cmd_reset_query_pool(cmd, pool, 0, count) };
            Ok(())
        });
        if let Err(e) = reset {
            // SAFETY: The reset either completed or never ran; the pool is
            // not in use.
            unsafe { ash_device.destroy_query_pool(pool, None) };
            return Err(e);
        }
        // SAFETY: pool was just created from device.
        unsafe { device.label_object(pool, "query pool", desc.label) };

        Ok(Self {
            parent: Arc::clone(device),
            pool,
            ty: desc.query_type,
            count,
        })
    }

    pub fn raw(&self) -> vk::QueryPool {
        self.pool
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

    /// Copy results of `first..first + count` into `buffer` and reset the
    /// range for reuse.
    ///
    /// # Safety
    /// `cmd` must be recording outside a render pass on the parent device,
    /// and the range must have passed [`check_resolve`].
    pub unsafe fn record_resolve(
        &self,
        cmd: vk::CommandBuffer,
        first: u32,
        count: u32,
        buffer: vk::Buffer,
        offset: u64,
    ) {
        let device = self.parent.ash_device();
        let transfer = vk::PipelineStageFlags::TRANSFER;
        // SAFETY: Caller guarantees cmd is recording outside a render pass
        // and the range and buffer region are valid.
        unsafe {
            device.cmd_copy_query_pool_results(
                cmd,
                self.pool,
                first,
                count,
                buffer,
                offset,
                QUERY_RESULT_SIZE,
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
            );
            device.cmd_pipeline_barrier(
                cmd,
                transfer,
                transfer,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[],
            );
            device.cmd_reset_query_pool(cmd, self.pool, first, count);
        }
    }
}

impl Drop for QuerySet {
    fn drop(&mut self) {
        tracing::debug!("Dropping query pool {:?}", self.pool);
        // SAFETY: pool was created from parent and no submission using it
        // is pending once the hub releases it.
        unsafe {
            self.parent
                .ash_device()
                .destroy_query_pool(self.pool, None)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_bounds() {
        assert!(check_resolve(0, 4, 4, 0, 32).is_ok());
        assert!(check_resolve(2, 2, 4, 8, 24).is_ok());
        // Past the last query.
        assert!(check_resolve(3, 2, 4, 0, 64).is_err());
        // Misaligned destination.
        assert!(check_resolve(0, 1, 4, 4, 64).is_err());
        // Destination too small.
        assert!(check_resolve(0, 4, 4, 8, 32).is_err());
        assert!(check_resolve(0, 0, 4, 0, 32).is_err());
        assert!(check_resolve(u32::MAX, 2, 4, 0, 32).is_err());
    }
}
