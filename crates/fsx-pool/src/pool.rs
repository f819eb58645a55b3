//! Generic block pool
//!
//! [`GenPool`] owns its storage backend and the in-memory bookkeeping for one
//! arena: bucket table, free-list heads, tail and counters. The bookkeeping
//! can always be re-derived from the descriptors with [`GenPool::rebuild`].

use alloc::vec::Vec;

use crate::descriptor::{
    descriptor_offset, BlockDescriptor, BlockState, BucketId, DESCRIPTOR_SIZE, POOL_MAX_BUCKETS,
};
use crate::error::PoolError;
use crate::storage::PoolStorage;

/// Per-bucket bookkeeping
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Bucket {
    /// Size of every block in this bucket
    block_size: usize,
    /// Head of the free list (0 if empty)
    first_offset: usize,
    /// Blocks carved from the tail for this bucket
    allocation_count: u32,
    /// Blocks returned to the free list
    release_count: u32,
    /// Blocks taken back off the free list
    recycle_count: u32,
}

/// Statistics for one bucket
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockStats {
    /// Size of blocks in the bucket
    pub block_size: usize,
    /// Blocks ever created for the bucket
    pub num_created: u32,
    /// Blocks currently on the free list
    pub num_free: u32,
}

/// Pool-wide space figures
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolUsage {
    /// Bytes managed by the pool
    pub total_size: usize,
    /// Bytes past the tail, never handed out
    pub free_size: usize,
}

/// Pool-wide counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolCounts {
    pub num_buckets: usize,
    /// Blocks created from the tail
    pub allocation_count: u32,
    /// Descriptors rejected by validation
    pub validation_error_count: u32,
}

/// Bucketed allocator over a [`PoolStorage`] backend.
pub struct GenPool<S> {
    storage: S,
    start_offset: usize,
    total_size: usize,
    max_offset: usize,
    align_mask: usize,
    tail: usize,
    allocation_count: u32,
    validation_error_count: u32,
    buckets: Vec<Bucket>,
}

impl<S: PoolStorage> GenPool<S> {
    /// Set up a pool over `[start_offset, start_offset + pool_size)`.
    ///
    /// # Arguments
    /// * `storage` - Backend holding the descriptors and blocks
    /// * `start_offset` - First byte of the pool in the backend's offset space
    /// * `pool_size` - Bytes managed by the pool
    /// * `alignment` - Alignment of user data (0 or 1 for none, else a power of two)
    /// * `block_sizes` - Bucket sizes in any order
    ///
    /// # Returns
    /// * `Ok(pool)` - Empty pool with the tail at `start_offset`
    /// * `Err(PoolError::InvalidAlignment)` - Alignment is not a power of two
    /// * `Err(PoolError::InvalidBucketList)` - Empty, too long, or zero-size bucket
    /// * `Err(PoolError::InvalidRegion)` - Region overflows the descriptor offset range
    pub fn initialize(
        storage: S,
        start_offset: usize,
        pool_size: usize,
        alignment: usize,
        block_sizes: &[usize],
    ) -> Result<Self, PoolError> {
        let align_mask = match alignment {
            0 | 1 => 0,
            a if a.is_power_of_two() => a - 1,
            a => return Err(PoolError::InvalidAlignment(a)),
        };

        if block_sizes.is_empty() || block_sizes.len() > POOL_MAX_BUCKETS {
            return Err(PoolError::InvalidBucketList);
        }

        let mut sizes: Vec<usize> = block_sizes.to_vec();
        sizes.sort_unstable();
        if sizes[0] == 0 {
            return Err(PoolError::InvalidBucketList);
        }

        let max_offset = start_offset
            .checked_add(pool_size)
            .filter(|max| *max <= u32::MAX as usize)
            .ok_or(PoolError::InvalidRegion {
                start: start_offset,
                size: pool_size,
            })?;

        let buckets = sizes
            .into_iter()
            .map(|block_size| Bucket {
                block_size,
                ..Bucket::default()
            })
            .collect();

        Ok(Self {
            storage,
            start_offset,
            total_size: pool_size,
            max_offset,
            align_mask,
            tail: start_offset,
            allocation_count: 0,
            validation_error_count: 0,
            buckets,
        })
    }

    /// Minimum pool size holding `num_blocks` of the smallest bucket.
    pub fn calc_min_size(block_sizes: &[usize], num_blocks: usize) -> usize {
        let smallest = block_sizes.iter().copied().min().unwrap_or(0);
        num_blocks * (smallest + DESCRIPTOR_SIZE)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn start_offset(&self) -> usize {
        self.start_offset
    }

    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Sorted bucket sizes
    pub fn block_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.buckets.iter().map(|b| b.block_size)
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Smallest bucket whose blocks hold `size` bytes.
    pub fn find_bucket(&self, size: usize) -> Option<BucketId> {
        self.buckets
            .iter()
            .position(|b| size <= b.block_size)
            .map(BucketId::from_index)
    }

    /// Allocate a block of at least `size` bytes.
    ///
    /// Reuses the head of the bucket's free list if there is one, else
    /// carves a new block past the tail.
    ///
    /// # Returns
    /// * `Ok(offset)` - Offset of the user data
    /// * `Err(PoolError::InvalidSize)` - `size` is zero
    /// * `Err(PoolError::NoFit)` - Larger than the largest bucket
    /// * `Err(PoolError::PoolFull)` - No room past the tail
    /// * `Err(PoolError::StorageAccess)` - Backend failure
    pub fn get_block(&mut self, size: usize) -> Result<usize, PoolError> {
        if size == 0 {
            return Err(PoolError::InvalidSize(size));
        }

        let bucket = self.find_bucket(size).ok_or(PoolError::NoFit {
            requested: size,
            largest: self.buckets.last().map_or(0, |b| b.block_size),
        })?;

        if let Some(offset) = self.recycle_block(bucket, size)? {
            return Ok(offset);
        }
        self.create_block(bucket, size)
    }

    fn recycle_block(&mut self, bucket: BucketId, size: usize) -> Result<Option<usize>, PoolError> {
        let first = self.buckets[bucket.index()].first_offset;
        if first == 0 {
            return Ok(None);
        }

        let desc_offset = descriptor_offset(first);
        let mut desc = self.storage.retrieve(desc_offset)?;
        if !desc.is_valid() || desc.state != BlockState::Deallocated(bucket) {
            self.validation_error_count += 1;
            log::warn!(
                "pool: free list head at {:#x} (bucket {}) failed validation",
                first,
                bucket.get()
            );
            return Ok(None);
        }

        let next = desc.next_offset;
        desc.state = BlockState::Allocated(bucket);
        desc.actual_size = size;
        desc.next_offset = 0;
        self.storage.commit(desc_offset, &desc)?;

        let state = &mut self.buckets[bucket.index()];
        state.first_offset = next;
        state.recycle_count += 1;
        Ok(Some(first))
    }

    fn create_block(&mut self, bucket: BucketId, size: usize) -> Result<usize, PoolError> {
        let block_size = self.buckets[bucket.index()].block_size;
        let block_offset = self.align_up(self.tail + DESCRIPTOR_SIZE);
        let next_tail = block_offset + block_size;
        if next_tail > self.max_offset {
            return Err(PoolError::PoolFull {
                requested: size,
                free: self.max_offset - self.tail,
            });
        }

        let desc = BlockDescriptor::allocated(bucket, size);
        self.storage.commit(descriptor_offset(block_offset), &desc)?;

        self.tail = next_tail;
        self.allocation_count += 1;
        self.buckets[bucket.index()].allocation_count += 1;
        Ok(block_offset)
    }

    /// Return the block at `offset` to its bucket's free list.
    ///
    /// # Returns
    /// * `Ok(size)` - Size recorded for the block when it was allocated
    /// * `Err(PoolError::NotInPool)` - Offset outside the allocated region
    /// * `Err(PoolError::Corrupt)` - Descriptor failed validation (counted)
    /// * `Err(PoolError::StorageAccess)` - Backend failure
    pub fn put_block(&mut self, offset: usize) -> Result<usize, PoolError> {
        let (desc_offset, mut desc, bucket) = self.checked_descriptor(offset)?;
        let freed = desc.actual_size;

        desc.state = BlockState::Deallocated(bucket);
        desc.next_offset = self.buckets[bucket.index()].first_offset;
        self.storage.commit(desc_offset, &desc)?;

        let state = &mut self.buckets[bucket.index()];
        state.first_offset = offset;
        state.release_count += 1;
        Ok(freed)
    }

    /// Size recorded for the allocated block at `offset`.
    ///
    /// Same validation as [`GenPool::put_block`]; nothing is written.
    pub fn get_block_size(&mut self, offset: usize) -> Result<usize, PoolError> {
        let (_, desc, _) = self.checked_descriptor(offset)?;
        Ok(desc.actual_size)
    }

    fn checked_descriptor(
        &mut self,
        offset: usize,
    ) -> Result<(usize, BlockDescriptor, BucketId), PoolError> {
        if offset < self.start_offset + DESCRIPTOR_SIZE || offset >= self.tail {
            return Err(PoolError::NotInPool(offset));
        }

        let desc_offset = descriptor_offset(offset);
        let desc = self.storage.retrieve(desc_offset)?;

        let bucket = match desc.state {
            BlockState::Allocated(bucket) if desc.is_valid() => self
                .bucket(bucket)
                .filter(|b| desc.actual_size != 0 && desc.actual_size <= b.block_size)
                .map(|_| bucket),
            _ => None,
        };

        match bucket {
            Some(bucket) => Ok((desc_offset, desc, bucket)),
            None => {
                self.validation_error_count += 1;
                log::warn!("pool: block at {:#x} failed validation", offset);
                Err(PoolError::Corrupt(offset))
            }
        }
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Forget every block: tail back to the start, empty free lists, zero counters.
    ///
    /// Nothing is written to storage.
    pub fn reset(&mut self) {
        self.tail = self.start_offset;
        self.allocation_count = 0;
        self.validation_error_count = 0;
        for bucket in &mut self.buckets {
            *bucket = Bucket {
                block_size: bucket.block_size,
                ..Bucket::default()
            };
        }
    }

    /// Re-derive tail, free lists and counters from the stored descriptors.
    ///
    /// Walks forward from the start of the pool, stepping over each block by
    /// its bucket size. Stops at the end of the pool or at the first
    /// descriptor that is not a plausible block; that position becomes the
    /// tail. Freed blocks are threaded back onto their bucket lists.
    ///
    /// # Returns
    /// * `Ok(())` - Walk finished
    /// * `Err(PoolError::StorageAccess)` - Backend failure (bookkeeping is
    ///   left as far as the walk got)
    pub fn rebuild(&mut self) -> Result<(), PoolError> {
        self.reset();

        loop {
            let block_offset = self.align_up(self.tail + DESCRIPTOR_SIZE);
            if block_offset > self.max_offset {
                break;
            }

            let desc_offset = descriptor_offset(block_offset);
            let mut desc = self.storage.retrieve(desc_offset)?;
            if !desc.is_valid() {
                break;
            }

            let (bucket, is_free) = match desc.state {
                BlockState::Deallocated(bucket) => (bucket, true),
                BlockState::Allocated(bucket) => (bucket, false),
                BlockState::Unknown(_) => break,
            };
            let block_size = match self.bucket(bucket) {
                Some(b) if desc.actual_size <= b.block_size => b.block_size,
                _ => break,
            };
            if block_offset + block_size > self.max_offset {
                break;
            }

            self.tail = block_offset + block_size;
            self.allocation_count += 1;
            self.buckets[bucket.index()].allocation_count += 1;

            if is_free {
                desc.next_offset = self.buckets[bucket.index()].first_offset;
                self.storage.commit(desc_offset, &desc)?;
                let state = &mut self.buckets[bucket.index()];
                state.first_offset = block_offset;
                state.release_count += 1;
            }
        }

        log::debug!(
            "pool: rebuilt {} blocks, tail at {:#x}",
            self.allocation_count,
            self.tail
        );
        Ok(())
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Sanity check of the in-memory bookkeeping.
    pub fn validate_state(&self) -> bool {
        self.total_size > 0
            && self.tail <= self.max_offset
            && !self.buckets.is_empty()
            && self.buckets.len() <= POOL_MAX_BUCKETS
    }

    pub fn usage(&self) -> PoolUsage {
        PoolUsage {
            total_size: self.total_size,
            free_size: self.max_offset - self.tail,
        }
    }

    pub fn counts(&self) -> PoolCounts {
        PoolCounts {
            num_buckets: self.buckets.len(),
            allocation_count: self.allocation_count,
            validation_error_count: self.validation_error_count,
        }
    }

    /// Statistics for one bucket.
    pub fn bucket_stats(&self, bucket: BucketId) -> Result<BlockStats, PoolError> {
        let b = self
            .bucket(bucket)
            .ok_or(PoolError::InvalidBucket(bucket.get()))?;
        Ok(BlockStats {
            block_size: b.block_size,
            num_created: b.allocation_count,
            num_free: b.release_count.saturating_sub(b.recycle_count),
        })
    }

    /// Statistics for every bucket, smallest first.
    pub fn all_bucket_stats(&self) -> Vec<BlockStats> {
        (0..self.buckets.len())
            .filter_map(|i| self.bucket_stats(BucketId::from_index(i)).ok())
            .collect()
    }

    /// Bytes sitting on free lists, counted in whole blocks.
    pub fn free_block_bytes(&self) -> usize {
        self.all_bucket_stats()
            .iter()
            .map(|s| s.block_size * s.num_free as usize)
            .sum()
    }

    fn bucket(&self, bucket: BucketId) -> Option<&Bucket> {
        self.buckets.get(bucket.index())
    }

    fn align_up(&self, offset: usize) -> usize {
        (offset + self.align_mask) & !self.align_mask
    }
}
