//! Block descriptors
//!
//! Every block is preceded by a fixed-size descriptor. On media it is
//! 12 bytes, little endian:
//!
//! ```text
//! ┌────────────┬────────────┬──────────────┬──────────────┐
//! │ check u16  │ state u16  │ actual u32   │ next u32     │
//! │  0x5A5A    │ tag+bucket │ request size │ free list    │
//! └────────────┴────────────┴──────────────┴──────────────┘
//! ```
//!
//! The state word is `0xAAAA + bucket` for allocated blocks and
//! `0xDDDD + bucket` for freed ones. In memory it is decoded into
//! [`BlockState`] once, at the storage boundary.

/// Size of a descriptor on media
pub const DESCRIPTOR_SIZE: usize = 12;

/// Pattern stored in every valid descriptor
pub const CHECK_PATTERN: u16 = 0x5a5a;

/// Maximum number of buckets in a pool
pub const POOL_MAX_BUCKETS: usize = 17;

const ALLOCATED_TAG: u16 = 0xaaaa;
const DEALLOCATED_TAG: u16 = 0xdddd;

/// Offset of the descriptor belonging to the block at `block_offset`.
///
/// The caller guarantees `block_offset >= DESCRIPTOR_SIZE`.
pub const fn descriptor_offset(block_offset: usize) -> usize {
    block_offset - DESCRIPTOR_SIZE
}

/// Bucket identifier (1-based; zero is never a bucket)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketId(u16);

impl BucketId {
    /// Bucket id from its raw value, if non-zero and in range
    pub fn from_raw(raw: u16) -> Option<Self> {
        if raw == 0 || usize::from(raw) > POOL_MAX_BUCKETS {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u16 + 1)
    }

    pub fn get(self) -> u16 {
        self.0
    }

    /// Position of the bucket in the pool's sorted table
    pub fn index(self) -> usize {
        usize::from(self.0) - 1
    }
}

/// Allocation state recorded in a descriptor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockState {
    /// Block is handed out
    Allocated(BucketId),
    /// Block is on its bucket's free list
    Deallocated(BucketId),
    /// State word matches neither tag
    Unknown(u16),
}

impl BlockState {
    pub fn from_raw(raw: u16) -> Self {
        let tagged = |tag: u16| raw.checked_sub(tag).and_then(BucketId::from_raw);
        if let Some(bucket) = tagged(DEALLOCATED_TAG) {
            BlockState::Deallocated(bucket)
        } else if let Some(bucket) = tagged(ALLOCATED_TAG) {
            BlockState::Allocated(bucket)
        } else {
            BlockState::Unknown(raw)
        }
    }

    pub fn to_raw(self) -> u16 {
        match self {
            BlockState::Allocated(bucket) => ALLOCATED_TAG + bucket.get(),
            BlockState::Deallocated(bucket) => DEALLOCATED_TAG + bucket.get(),
            BlockState::Unknown(raw) => raw,
        }
    }

    pub fn bucket(self) -> Option<BucketId> {
        match self {
            BlockState::Allocated(bucket) | BlockState::Deallocated(bucket) => Some(bucket),
            BlockState::Unknown(_) => None,
        }
    }
}

/// Decoded block descriptor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Must equal [`CHECK_PATTERN`]
    pub check_bits: u16,
    /// Allocation state and owning bucket
    pub state: BlockState,
    /// Size the caller asked for
    pub actual_size: usize,
    /// Next free block in the bucket (free blocks only, 0 ends the list)
    pub next_offset: usize,
}

impl BlockDescriptor {
    /// Fresh descriptor for a newly handed out block
    pub fn allocated(bucket: BucketId, actual_size: usize) -> Self {
        Self {
            check_bits: CHECK_PATTERN,
            state: BlockState::Allocated(bucket),
            actual_size,
            next_offset: 0,
        }
    }

    /// True if the check pattern is intact
    pub fn is_valid(&self) -> bool {
        self.check_bits == CHECK_PATTERN
    }

    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut out = [0u8; DESCRIPTOR_SIZE];
        out[0..2].copy_from_slice(&self.check_bits.to_le_bytes());
        out[2..4].copy_from_slice(&self.state.to_raw().to_le_bytes());
        out[4..8].copy_from_slice(&(self.actual_size as u32).to_le_bytes());
        out[8..12].copy_from_slice(&(self.next_offset as u32).to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; DESCRIPTOR_SIZE]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let u32_at =
            |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Self {
            check_bits: u16_at(0),
            state: BlockState::from_raw(u16_at(2)),
            actual_size: u32_at(4) as usize,
            next_offset: u32_at(8) as usize,
        }
    }
}

#[cfg(kani)]
mod proofs {
    use super::*;

    /// Proof: every state word encodes back unchanged
    #[kani::proof]
    fn state_word_round_trips() {
        let raw: u16 = kani::any();
        kani::assert(
            BlockState::from_raw(raw).to_raw() == raw,
            "state word must encode unchanged",
        );
    }

    /// Proof: a decoded bucket always indexes a real bucket slot
    #[kani::proof]
    fn bucket_index_in_range() {
        let raw: u16 = kani::any();
        if let Some(bucket) = BucketId::from_raw(raw) {
            kani::assert(bucket.index() < POOL_MAX_BUCKETS, "bucket index out of range");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(raw: u16) -> BucketId {
        BucketId::from_raw(raw).unwrap()
    }

    #[test]
    fn test_bucket_id_range() {
        assert!(BucketId::from_raw(0).is_none());
        assert!(BucketId::from_raw(POOL_MAX_BUCKETS as u16 + 1).is_none());
        assert_eq!(bucket(1).index(), 0);
        assert_eq!(BucketId::from_index(4).get(), 5);
    }

    #[test]
    fn test_state_tags() {
        assert_eq!(BlockState::Allocated(bucket(3)).to_raw(), 0xaaad);
        assert_eq!(BlockState::Deallocated(bucket(1)).to_raw(), 0xddde);
        assert_eq!(BlockState::from_raw(0xaaad), BlockState::Allocated(bucket(3)));
        assert_eq!(BlockState::from_raw(0xddde), BlockState::Deallocated(bucket(1)));
    }

    #[test]
    fn test_state_untagged_values() {
        // Bare tags carry no bucket
        assert_eq!(BlockState::from_raw(0xaaaa), BlockState::Unknown(0xaaaa));
        assert_eq!(BlockState::from_raw(0xdddd), BlockState::Unknown(0xdddd));
        assert_eq!(BlockState::from_raw(0), BlockState::Unknown(0));
        assert_eq!(BlockState::from_raw(0xaaaa + 18), BlockState::Unknown(0xaaaa + 18));
        assert_eq!(BlockState::Unknown(7).bucket(), None);
    }

    #[test]
    fn test_descriptor_layout() {
        let mut desc = BlockDescriptor::allocated(bucket(2), 0x0102);
        desc.next_offset = 0x0a0b0c0d;
        let bytes = desc.to_bytes();
        assert_eq!(
            bytes,
            [0x5a, 0x5a, 0xac, 0xaa, 0x02, 0x01, 0x00, 0x00, 0x0d, 0x0c, 0x0b, 0x0a]
        );
        assert_eq!(BlockDescriptor::from_bytes(&bytes), desc);
    }

    #[test]
    fn test_zeroed_descriptor_is_invalid() {
        let desc = BlockDescriptor::from_bytes(&[0u8; DESCRIPTOR_SIZE]);
        assert!(!desc.is_valid());
        assert_eq!(desc.state.bucket(), None);
    }

    #[test]
    fn test_descriptor_offset() {
        assert_eq!(descriptor_offset(DESCRIPTOR_SIZE), 0);
        assert_eq!(descriptor_offset(100), 88);
    }
}
