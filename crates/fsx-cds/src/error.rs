//! CDS error types

use alloc::string::String;

use fsx_hal::HalError;
use fsx_pool::PoolError;
use fsx_resource::{ResourceId, SlotError};

/// Errors returned by [`CdsInstance`](crate::CdsInstance) operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CdsError {
    /// The PSP failed a read or write.
    #[error("CDS access failed at offset {offset}: {status}")]
    Access { offset: usize, status: HalError },

    /// Persisted content cannot be trusted (bad registry size or unreadable registry).
    #[error("CDS content is not valid")]
    Invalid,

    /// Zero, oversized, or mismatched block size.
    #[error("invalid CDS block size {0}")]
    InvalidSize(usize),

    /// Empty or overlong block name.
    #[error("invalid CDS name {0:?}")]
    InvalidName(String),

    /// Region is smaller than the configured registry and pool need.
    #[error("CDS too small: {size} bytes available, {required} required")]
    TooSmall { size: usize, required: usize },

    /// Stored CRC does not match the data read back.
    #[error("CDS block CRC mismatch: stored {stored:#x}, computed {computed:#x}")]
    CrcMismatch { stored: u32, computed: u32 },

    /// Handle does not name a registered block.
    #[error("CDS handle {0} is not valid")]
    InvalidHandle(ResourceId),

    /// No block registered under the name.
    #[error("CDS block {0:?} not found")]
    NameNotFound(String),

    /// Block belongs to the other durability class.
    #[error("CDS block {0:?} has the wrong type for this caller")]
    WrongType(String),

    /// The owning application is still registered.
    #[error("owner of CDS block {0:?} is still active")]
    OwnerActive(String),

    /// Registry slot allocation failed.
    #[error(transparent)]
    Slot(#[from] SlotError),

    /// Block pool rejected the operation.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl CdsError {
    /// True for media failures, as opposed to content or argument errors.
    pub fn is_access_error(&self) -> bool {
        matches!(
            self,
            CdsError::Access { .. } | CdsError::Pool(PoolError::StorageAccess(_))
        )
    }

    pub fn is_crc_error(&self) -> bool {
        matches!(self, CdsError::CrcMismatch { .. })
    }
}
