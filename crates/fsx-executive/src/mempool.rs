//! Memory pool services
//!
//! Pools are [`GenPool`]s over private RAM. The pool table only holds a
//! shared reference to each pool; buffer operations take that pool's own
//! lock and leave the shared data lock free.

use fsx_hal::Psp;
use fsx_pool::{BlockStats, GenPool, PoolError, RamStorage, POOL_MAX_BUCKETS};
use fsx_resource::{ResourceId, SlotRecord};

use crate::error::EsError;
use crate::executive::Executive;
use crate::sync::{Arc, SharedLock};
use crate::tables::{AppId, MemHandle, MemPoolRecord, SharedPool};

/// Pool statistics for housekeeping telemetry
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemPoolStats {
    pub pool_size: usize,
    pub blocks_requested: u32,
    pub check_err_count: u32,
    /// Bytes never yet carved into blocks
    pub free_bytes: usize,
    /// One entry per bucket, smallest first
    pub block_stats: Vec<BlockStats>,
}

impl<P: Psp> Executive<P> {
    /// Create a pool of `size` bytes owned by `owner`.
    ///
    /// # Arguments
    /// * `owner` - Application the pool is released with
    /// * `size` - Pool size in bytes
    /// * `block_sizes` - Bucket sizes, or `None` for the platform default
    ///
    /// # Returns
    /// * `Ok(handle)` - Pool ready for use
    /// * `Err(EsError::BadArgument)` - Bucket list rejected, or `size` too small
    ///   for one block of every bucket
    /// * `Err(EsError::InvalidId)` - Owner is not a registered application
    /// * `Err(EsError::Slot)` - Pool table full
    pub fn pool_create(
        &self,
        owner: AppId,
        size: usize,
        block_sizes: Option<&[usize]>,
    ) -> Result<MemHandle, EsError> {
        let sizes = block_sizes.unwrap_or(&self.config.mem_block_sizes);
        if sizes.is_empty() || sizes.len() > POOL_MAX_BUCKETS || sizes.contains(&0) {
            self.report(&format!("pool_create: {} bucket sizes rejected", sizes.len()));
            return Err(EsError::BadArgument("block sizes"));
        }

        let min_size = GenPool::<RamStorage>::calc_min_size(sizes, 1);
        if size < min_size {
            self.report(&format!(
                "pool_create: size {} below minimum {}",
                size, min_size
            ));
            return Err(EsError::BadArgument("pool size"));
        }

        // Claim a slot, then build the pool without holding the table lock
        let pending = match self.reserve_pool_slot(owner) {
            Ok(id) => id,
            Err(e) => {
                self.report(&format!("pool_create: {}", e));
                return Err(e);
            }
        };

        let built = GenPool::initialize(
            RamStorage::new(size),
            0,
            size,
            self.config.mempool_align_min,
            sizes,
        );
        self.finish_pool_create(pending, owner, built)
    }

    /// First phase of pool creation: mark a slot as pending for `owner`.
    pub(crate) fn reserve_pool_slot(&self, owner: AppId) -> Result<ResourceId, EsError> {
        self.tables.with(|t| -> Result<ResourceId, EsError> {
            if !t.apps.is_valid(owner.0) {
                return Err(EsError::InvalidId(owner.0));
            }
            let (id, record) = t.pools.reserve()?;
            record.set_used(ResourceId::RESERVED);
            record.owner = owner;
            Ok(id)
        })
    }

    /// Last phase of pool creation: publish the pool under its handle.
    ///
    /// The pending slot is freed instead if the pool could not be built or
    /// its owner was deleted in the meantime.
    pub(crate) fn finish_pool_create(
        &self,
        pending: ResourceId,
        owner: AppId,
        built: Result<GenPool<RamStorage>, PoolError>,
    ) -> Result<MemHandle, EsError> {
        let size = built.as_ref().map_or(0, |pool| pool.usage().total_size);
        let result = self.tables.with(|t| -> Result<MemHandle, EsError> {
            let owner_alive = t.apps.is_valid(owner.0);
            // A reserved slot is skipped by every other allocation
            let record = t
                .pools
                .locate_mut(pending)
                .filter(|r| r.id() == ResourceId::RESERVED)
                .ok_or(EsError::InvalidId(pending))?;
            match built {
                Ok(pool) if owner_alive => {
                    record.pool = Some(Arc::new(SharedLock::new("es-mempool", pool)));
                    record.set_used(pending);
                    Ok(MemHandle(pending))
                }
                Ok(_) => {
                    *record = MemPoolRecord::default();
                    Err(EsError::InvalidId(owner.0))
                }
                Err(e) => {
                    *record = MemPoolRecord::default();
                    Err(EsError::from(e))
                }
            }
        });

        match &result {
            Ok(handle) => log::debug!("es: created pool {} ({} bytes) for {}", handle, size, owner),
            Err(e) => self.report(&format!("pool_create: {}", e)),
        }
        result
    }

    /// Delete a pool. Outstanding buffers are lost with it.
    pub fn pool_delete(&self, handle: MemHandle) -> Result<(), EsError> {
        self.tables
            .with(|t| t.pools.release(handle.0).map_err(EsError::invalid(handle)))
            .map(|_| ())
    }

    pub fn validate_pool_handle(&self, handle: MemHandle) -> bool {
        self.pool(handle).is_ok()
    }

    /// Allocate a buffer of at least `size` bytes.
    ///
    /// # Returns
    /// Offset of the buffer within the pool.
    pub fn get_pool_buf(&self, handle: MemHandle, size: usize) -> Result<usize, EsError> {
        let pool = self.pool(handle)?;
        Ok(pool.with(|p| p.get_block(size))?)
    }

    /// Usable size of the buffer at `offset`.
    pub fn get_pool_buf_info(&self, handle: MemHandle, offset: usize) -> Result<usize, EsError> {
        let pool = self.pool(handle)?;
        Ok(pool.with(|p| p.get_block_size(offset))?)
    }

    /// Return a buffer to its pool.
    ///
    /// # Returns
    /// Usable size of the released buffer.
    pub fn put_pool_buf(&self, handle: MemHandle, offset: usize) -> Result<usize, EsError> {
        let pool = self.pool(handle)?;
        Ok(pool.with(|p| p.put_block(offset))?)
    }

    /// Copy `data` into the start of the buffer at `offset`.
    pub fn write_pool_buf(
        &self,
        handle: MemHandle,
        offset: usize,
        data: &[u8],
    ) -> Result<(), EsError> {
        let pool = self.pool(handle)?;
        pool.with(|p| -> Result<(), EsError> {
            if data.len() > p.get_block_size(offset)? {
                return Err(EsError::BadArgument("data larger than buffer"));
            }
            let dest = p
                .storage_mut()
                .data_mut(offset, data.len())
                .ok_or(PoolError::NotInPool(offset))?;
            dest.copy_from_slice(data);
            Ok(())
        })
    }

    /// Copy the start of the buffer at `offset` into `out`.
    pub fn read_pool_buf(
        &self,
        handle: MemHandle,
        offset: usize,
        out: &mut [u8],
    ) -> Result<(), EsError> {
        let pool = self.pool(handle)?;
        pool.with(|p| -> Result<(), EsError> {
            if out.len() > p.get_block_size(offset)? {
                return Err(EsError::BadArgument("buffer smaller than request"));
            }
            let src = p
                .storage()
                .data(offset, out.len())
                .ok_or(PoolError::NotInPool(offset))?;
            out.copy_from_slice(src);
            Ok(())
        })
    }

    pub fn mem_pool_stats(&self, handle: MemHandle) -> Result<MemPoolStats, EsError> {
        let pool = self.pool(handle)?;
        let stats = pool.with(|p| {
            let usage = p.usage();
            let counts = p.counts();
            MemPoolStats {
                pool_size: usage.total_size,
                blocks_requested: counts.allocation_count,
                check_err_count: counts.validation_error_count,
                free_bytes: usage.free_size,
                block_stats: p.all_bucket_stats(),
            }
        });
        Ok(stats)
    }

    pub fn pool_count(&self) -> usize {
        self.tables.with(|t| t.pools.count_used())
    }

    fn pool(&self, handle: MemHandle) -> Result<SharedPool, EsError> {
        self.tables.with(|t| {
            t.pools
                .lookup(handle.0)
                .ok()
                .and_then(|record| record.pool.clone())
                .ok_or(EsError::InvalidId(handle.0))
        })
    }
}
