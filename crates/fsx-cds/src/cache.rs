//! Single-object access cache
//!
//! The store is not memory mapped, so small objects (descriptors, CRC
//! headers, registry entries, signatures) are staged in one fixed buffer
//! between the PSP and their in-memory form. The cache also implements
//! [`PoolStorage`], which is how the block pool reaches the media.

use fsx_hal::{HalError, Psp};
use fsx_pool::{BlockDescriptor, PoolError, PoolStorage, DESCRIPTOR_SIZE};

use crate::error::CdsError;
use crate::layout::CACHE_CAPACITY;

/// Staging buffer in front of the PSP.
pub struct AccessCache<P> {
    psp: P,
    data: [u8; CACHE_CAPACITY],
    offset: usize,
    size: usize,
    /// Status of the most recent PSP access
    status: Result<(), HalError>,
}

impl<P: Psp> AccessCache<P> {
    pub fn new(psp: P) -> Self {
        Self {
            psp,
            data: [0; CACHE_CAPACITY],
            offset: 0,
            size: 0,
            status: Ok(()),
        }
    }

    /// Read `size` bytes at `offset` into the cache.
    ///
    /// # Returns
    /// * `Ok(bytes)` - The cached bytes
    /// * `Err(CdsError::InvalidSize)` - Larger than the cache
    /// * `Err(CdsError::Access)` - PSP read failed
    pub fn fetch(&mut self, offset: usize, size: usize) -> Result<&[u8], CdsError> {
        Self::check_size(size)?;
        self.offset = offset;
        self.size = size;
        self.status = self.psp.read_cds(&mut self.data[..size], offset);
        match self.status {
            Ok(()) => Ok(&self.data[..size]),
            Err(status) => Err(CdsError::Access { offset, status }),
        }
    }

    /// Write the cached bytes back to their offset.
    pub fn flush(&mut self) -> Result<(), CdsError> {
        self.status = self.psp.write_cds(&self.data[..self.size], self.offset);
        self.status.map_err(|status| CdsError::Access {
            offset: self.offset,
            status,
        })
    }

    /// Stage `size` bytes for a later [`AccessCache::flush`] to `offset`.
    ///
    /// With no source the staged bytes are zero.
    pub fn preload(
        &mut self,
        source: Option<&[u8]>,
        offset: usize,
        size: usize,
    ) -> Result<(), CdsError> {
        Self::check_size(size)?;
        match source {
            Some(src) if src.len() == size => self.data[..size].copy_from_slice(src),
            Some(src) => return Err(CdsError::InvalidSize(src.len())),
            None => self.data[..size].fill(0),
        }
        self.offset = offset;
        self.size = size;
        Ok(())
    }

    /// Stage and write in one step.
    pub fn store(
        &mut self,
        source: Option<&[u8]>,
        offset: usize,
        size: usize,
    ) -> Result<(), CdsError> {
        self.preload(source, offset, size)?;
        self.flush()
    }

    fn check_size(size: usize) -> Result<(), CdsError> {
        if size > CACHE_CAPACITY {
            return Err(CdsError::InvalidSize(size));
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Bytes currently staged
    pub fn data(&self) -> &[u8] {
        &self.data[..self.size]
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Error from the most recent PSP access, if it failed
    pub fn last_status(&self) -> Option<HalError> {
        self.status.err()
    }

    pub fn psp(&self) -> &P {
        &self.psp
    }

    /// Direct PSP access for bulk user data, bypassing the cache.
    pub fn psp_mut(&mut self) -> &mut P {
        &mut self.psp
    }

    pub fn into_psp(self) -> P {
        self.psp
    }
}

impl<P: Psp> PoolStorage for AccessCache<P> {
    fn retrieve(&mut self, offset: usize) -> Result<BlockDescriptor, PoolError> {
        let raw: [u8; DESCRIPTOR_SIZE] = self
            .fetch(offset, DESCRIPTOR_SIZE)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(PoolError::StorageAccess(offset))?;
        Ok(BlockDescriptor::from_bytes(&raw))
    }

    fn commit(&mut self, offset: usize, desc: &BlockDescriptor) -> Result<(), PoolError> {
        self.store(Some(&desc.to_bytes()[..]), offset, DESCRIPTOR_SIZE)
            .map_err(|_| PoolError::StorageAccess(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsx_hal::MemoryPsp;

    #[test]
    fn test_fetch_and_flush() {
        let mut psp = MemoryPsp::new(128);
        psp.bytes_mut()[10..14].copy_from_slice(&[1, 2, 3, 4]);
        let mut cache = AccessCache::new(psp);

        assert_eq!(cache.fetch(10, 4).unwrap(), &[1, 2, 3, 4]);
        assert_eq!((cache.offset(), cache.size()), (10, 4));

        cache.preload(Some(&[9u8, 9][..]), 20, 2).unwrap();
        cache.flush().unwrap();
        assert_eq!(&cache.psp().bytes()[20..22], &[9, 9]);
        assert_eq!(cache.last_status(), None);
    }

    #[test]
    fn test_preload_zero_fill() {
        let mut psp = MemoryPsp::new(64);
        psp.bytes_mut().fill(0xff);
        let mut cache = AccessCache::new(psp);
        cache.store(None, 8, 16).unwrap();
        assert!(cache.psp().bytes()[8..24].iter().all(|&b| b == 0));
        assert_eq!(cache.psp().bytes()[24], 0xff);
    }

    #[test]
    fn test_oversize_requests_rejected() {
        let mut cache = AccessCache::new(MemoryPsp::new(256));
        assert_eq!(
            cache.fetch(0, CACHE_CAPACITY + 1).unwrap_err(),
            CdsError::InvalidSize(CACHE_CAPACITY + 1)
        );
        assert_eq!(
            cache.preload(None, 0, CACHE_CAPACITY + 1),
            Err(CdsError::InvalidSize(CACHE_CAPACITY + 1))
        );
        assert_eq!(cache.preload(Some(&[0u8; 3][..]), 0, 4), Err(CdsError::InvalidSize(3)));
    }

    #[test]
    fn test_fault_records_status() {
        let mut psp = MemoryPsp::new(64);
        psp.inject_read_fault(0..4);
        let mut cache = AccessCache::new(psp);
        let err = cache.fetch(0, 8).unwrap_err();
        assert_eq!(
            err,
            CdsError::Access {
                offset: 0,
                status: HalError::IoError
            }
        );
        assert_eq!(cache.last_status(), Some(HalError::IoError));
        assert_eq!(cache.retrieve(0), Err(PoolError::StorageAccess(0)));
    }

    #[test]
    fn test_pool_storage_bridge() {
        use fsx_pool::BucketId;

        let mut cache = AccessCache::new(MemoryPsp::new(64));
        let desc = BlockDescriptor::allocated(BucketId::from_raw(2).unwrap(), 30);
        cache.commit(16, &desc).unwrap();
        assert_eq!(&cache.psp().bytes()[16..18], &[0x5a, 0x5a]);
        assert_eq!(cache.retrieve(16), Ok(desc));
    }
}
