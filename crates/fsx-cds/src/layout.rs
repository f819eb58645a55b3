//! Store layout, limits and configuration

use alloc::vec::Vec;

use fsx_pool::DESCRIPTOR_SIZE;
use serde::{Deserialize, Serialize};

use crate::crc::CrcAlgorithm;
use crate::registry::REGISTRY_ENTRY_SIZE;

/// Length of each signature field
pub const SIGNATURE_LEN: usize = 8;

/// Signature at offset 0
pub const SIGNATURE_BEGIN: [u8; SIGNATURE_LEN] = *b"_CDSBeg_";

/// Signature in the last 8 bytes
pub const SIGNATURE_END: [u8; SIGNATURE_LEN] = *b"_CDSEnd_";

/// Offset of the persisted registry entry count
pub const REGISTRY_SIZE_OFFSET: usize = SIGNATURE_LEN;

/// Offset of the first persisted registry entry
pub const REGISTRY_OFFSET: usize = REGISTRY_SIZE_OFFSET + 4;

/// Bytes reserved after the pool
pub const TRAILER_SIZE: usize = SIGNATURE_LEN;

/// Per-block header holding the CRC of the user data
pub const BLOCK_HEADER_SIZE: usize = 4;

/// Largest user block accepted by registration
pub const MAX_USER_BLOCK_SIZE: usize = (1 << 30) - BLOCK_HEADER_SIZE;

/// Alignment of user data inside the pool
pub const CDS_POOL_ALIGN: usize = 4;

/// Chunk written per cache flush when clearing the store
pub const CLEAR_CHUNK: usize = 16;

/// Maximum length of an application or task name
pub const MAX_API_LEN: usize = 20;

/// Maximum length of the local part of a block name
pub const CDS_MAX_NAME_LEN: usize = 16;

/// Size of the persisted name field; full names must be shorter
pub const CDS_MAX_FULL_NAME_LEN: usize = CDS_MAX_NAME_LEN + MAX_API_LEN + 4;

const fn max(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

/// Size of the access cache: the largest object ever cached
pub const CACHE_CAPACITY: usize = max(
    max(max(SIGNATURE_LEN, CLEAR_CHUNK), max(DESCRIPTOR_SIZE, BLOCK_HEADER_SIZE)),
    REGISTRY_ENTRY_SIZE,
);

/// Reference platform bucket sizes for the CDS pool
pub const DEFAULT_CDS_BLOCK_SIZES: [usize; 17] = [
    8, 16, 32, 48, 64, 96, 128, 160, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768, 80000,
];

/// CDS configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdsConfig {
    /// Registry capacity; also the persisted registry size
    pub max_entries: usize,
    /// Pool bucket sizes
    pub block_sizes: Vec<usize>,
    /// CRC protecting user blocks
    pub crc: CrcAlgorithm,
}

impl Default for CdsConfig {
    fn default() -> Self {
        Self {
            max_entries: 512,
            block_sizes: DEFAULT_CDS_BLOCK_SIZES.to_vec(),
            crc: CrcAlgorithm::Crc16,
        }
    }
}

impl CdsConfig {
    /// Bytes from offset 0 to the start of the pool
    pub fn header_size(&self) -> usize {
        REGISTRY_OFFSET + self.max_entries * REGISTRY_ENTRY_SIZE
    }

    /// Header plus trailer
    pub fn reserved_size(&self) -> usize {
        self.header_size() + TRAILER_SIZE
    }

    /// Smallest pool that holds one smallest block per registry entry
    pub fn reqd_min_pool_size(&self) -> usize {
        let smallest = self.block_sizes.iter().copied().min().unwrap_or(0);
        self.max_entries * (smallest + DESCRIPTOR_SIZE)
    }

    /// Smallest total store size this configuration can use
    pub fn reqd_min_size(&self) -> usize {
        self.reserved_size() + self.reqd_min_pool_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_constants() {
        assert_eq!(CACHE_CAPACITY, REGISTRY_ENTRY_SIZE);
        assert_eq!(CDS_MAX_FULL_NAME_LEN, 40);
        assert_eq!(REGISTRY_OFFSET, 12);
    }

    #[test]
    fn test_default_config_sizes() {
        let config = CdsConfig::default();
        assert_eq!(config.header_size(), 12 + 512 * REGISTRY_ENTRY_SIZE);
        assert_eq!(config.reqd_min_pool_size(), 512 * (8 + DESCRIPTOR_SIZE));
        // Reference 128 KiB store fits the reference configuration
        assert!(config.reqd_min_size() <= 128 * 1024);
    }
}
