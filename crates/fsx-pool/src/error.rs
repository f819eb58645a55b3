//! Pool error types

/// Errors returned by [`GenPool`](crate::GenPool) operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Alignment is not zero, one, or a power of two.
    #[error("alignment {0} is not a power of two")]
    InvalidAlignment(usize),

    /// Bucket size list is empty, too long, or has a zero-size bucket.
    #[error("invalid bucket size list")]
    InvalidBucketList,

    /// Pool region does not fit the offset range.
    #[error("invalid pool region: start {start}, size {size}")]
    InvalidRegion { start: usize, size: usize },

    /// Requested block size is zero.
    #[error("invalid block size {0}")]
    InvalidSize(usize),

    /// Request is larger than the largest bucket.
    #[error("no bucket fits {requested} bytes (largest is {largest})")]
    NoFit { requested: usize, largest: usize },

    /// Not enough room past the tail for a new block.
    #[error("pool full: {requested} bytes requested, {free} bytes left")]
    PoolFull { requested: usize, free: usize },

    /// Offset does not point into the allocated part of the pool.
    #[error("offset {0} is not a block in this pool")]
    NotInPool(usize),

    /// Descriptor failed validation (check pattern, bucket, or size).
    #[error("block at offset {0} failed validation")]
    Corrupt(usize),

    /// Bucket id does not exist in this pool.
    #[error("bucket {0} does not exist")]
    InvalidBucket(u16),

    /// Backend could not read or write the descriptor.
    #[error("storage access failed at offset {0}")]
    StorageAccess(usize),
}

impl PoolError {
    /// True for validation failures (as opposed to exhaustion, argument or I/O errors).
    pub fn is_corruption(&self) -> bool {
        matches!(self, PoolError::Corrupt(_))
    }

    /// True for exhaustion errors.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, PoolError::NoFit { .. } | PoolError::PoolFull { .. })
    }
}
