//! Pool storage backends
//!
//! [`PoolStorage`] is the retrieve/commit pair the allocator uses for every
//! descriptor access. It is the only way [`GenPool`](crate::GenPool) reaches
//! the bytes it manages.

use alloc::vec;
use alloc::vec::Vec;

use crate::descriptor::{BlockDescriptor, DESCRIPTOR_SIZE};
use crate::error::PoolError;

/// Descriptor access for a pool.
///
/// Offsets are descriptor offsets, in the same offset space as the pool.
pub trait PoolStorage {
    /// Read the descriptor stored at `offset`.
    ///
    /// # Returns
    /// * `Ok(desc)` - Decoded descriptor (not yet validated)
    /// * `Err(PoolError::StorageAccess)` - Backend could not read it
    fn retrieve(&mut self, offset: usize) -> Result<BlockDescriptor, PoolError>;

    /// Write `desc` at `offset`.
    ///
    /// # Returns
    /// * `Ok(())` - Descriptor stored
    /// * `Err(PoolError::StorageAccess)` - Backend could not write it
    fn commit(&mut self, offset: usize, desc: &BlockDescriptor) -> Result<(), PoolError>;
}

/// Directly addressable RAM backing a pool.
///
/// Offset 0 is the first byte of the buffer.
pub struct RamStorage {
    bytes: Vec<u8>,
}

impl RamStorage {
    /// Zero-filled buffer of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    /// Wrap an existing buffer (e.g. one whose contents outlived the pool).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `len` bytes at `offset`, if in range.
    pub fn data(&self, offset: usize, len: usize) -> Option<&[u8]> {
        self.bytes.get(offset..offset.checked_add(len)?)
    }

    /// Mutable form of [`RamStorage::data`].
    pub fn data_mut(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
        self.bytes.get_mut(offset..offset.checked_add(len)?)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl PoolStorage for RamStorage {
    fn retrieve(&mut self, offset: usize) -> Result<BlockDescriptor, PoolError> {
        let raw: &[u8; DESCRIPTOR_SIZE] = self
            .data(offset, DESCRIPTOR_SIZE)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(PoolError::StorageAccess(offset))?;
        Ok(BlockDescriptor::from_bytes(raw))
    }

    fn commit(&mut self, offset: usize, desc: &BlockDescriptor) -> Result<(), PoolError> {
        let raw = self
            .data_mut(offset, DESCRIPTOR_SIZE)
            .ok_or(PoolError::StorageAccess(offset))?;
        raw.copy_from_slice(&desc.to_bytes());
        Ok(())
    }
}
