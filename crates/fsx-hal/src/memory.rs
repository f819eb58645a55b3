//! In-memory PSP for testing and simulation.
//!
//! Provides a `Vec<u8>` backed Critical Data Store with injectable read and
//! write faults and access counters.

use alloc::vec;
use alloc::vec::Vec;
use core::cell::Cell;
use core::ops::Range;

use crate::{check_bounds, HalError, Psp};

/// In-memory PSP for testing.
pub struct MemoryPsp {
    /// Backing bytes of the persistent region
    cds: Vec<u8>,
    /// Reads overlapping this range fail with `IoError`
    read_fault: Option<Range<usize>>,
    /// Writes overlapping this range fail with `IoError`
    write_fault: Option<Range<usize>>,
    /// Number of successful reads
    reads: Cell<usize>,
    /// Number of successful writes
    writes: usize,
}

impl MemoryPsp {
    /// Create a zero-filled region of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self::with_bytes(vec![0; size])
    }

    /// Create a region holding `bytes` (e.g. a captured image from a previous boot).
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            cds: bytes,
            read_fault: None,
            write_fault: None,
            reads: Cell::new(0),
            writes: 0,
        }
    }

    /// Raw view of the region.
    pub fn bytes(&self) -> &[u8] {
        &self.cds
    }

    /// Raw mutable view of the region, bypassing the PSP interface.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.cds
    }

    /// Make reads touching `range` fail.
    pub fn inject_read_fault(&mut self, range: Range<usize>) {
        self.read_fault = Some(range);
    }

    /// Make writes touching `range` fail.
    pub fn inject_write_fault(&mut self, range: Range<usize>) {
        self.write_fault = Some(range);
    }

    pub fn clear_faults(&mut self) {
        self.read_fault = None;
        self.write_fault = None;
    }

    pub fn read_count(&self) -> usize {
        self.reads.get()
    }

    pub fn write_count(&self) -> usize {
        self.writes
    }

    fn overlaps(fault: &Option<Range<usize>>, offset: usize, len: usize) -> bool {
        match fault {
            Some(range) => offset < range.end && range.start < offset + len,
            None => false,
        }
    }
}

impl Psp for MemoryPsp {
    fn cds_size(&self) -> Result<usize, HalError> {
        Ok(self.cds.len())
    }

    fn read_cds(&self, buf: &mut [u8], offset: usize) -> Result<(), HalError> {
        check_bounds(offset, buf.len(), self.cds.len())?;
        if Self::overlaps(&self.read_fault, offset, buf.len()) {
            return Err(HalError::IoError);
        }
        buf.copy_from_slice(&self.cds[offset..offset + buf.len()]);
        self.reads.set(self.reads.get() + 1);
        Ok(())
    }

    fn write_cds(&mut self, data: &[u8], offset: usize) -> Result<(), HalError> {
        check_bounds(offset, data.len(), self.cds.len())?;
        if Self::overlaps(&self.write_fault, offset, data.len()) {
            return Err(HalError::IoError);
        }
        self.cds[offset..offset + data.len()].copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }
}
