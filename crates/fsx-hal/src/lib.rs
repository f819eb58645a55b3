//! Platform Support Package trait for FSX
//!
//! This crate defines the narrow platform surface the executive needs from
//! the board it runs on. The only hardware service the core consumes is the
//! Critical Data Store (CDS): a battery-backed region that survives processor
//! resets but is not memory mapped, so every access is an explicit
//! read or write of N bytes at an offset.
//!
//! # Platform Implementations
//!
//! - **Flight boards**: EEPROM / battery-backed SRAM driver
//! - **Simulation / tests**: [`MemoryPsp`], a `Vec<u8>` with fault injection

#![no_std]

extern crate alloc;

mod memory;

pub use memory::MemoryPsp;

/// Platform Support Package trait
///
/// Implementations provide access to the persistent media backing the
/// Critical Data Store. All accesses are bounded by [`Psp::cds_size`].
pub trait Psp: Send + 'static {
    // === Critical Data Store ===

    /// Total size of the persistent region in bytes
    ///
    /// # Returns
    /// * `Ok(size)` - Usable size of the region
    /// * `Err(HalError::NotSupported)` - Platform has no persistent region
    fn cds_size(&self) -> Result<usize, HalError>;

    /// Read bytes from the persistent region
    ///
    /// # Arguments
    /// * `buf` - Destination; `buf.len()` bytes are read
    /// * `offset` - Byte offset from the start of the region
    ///
    /// # Returns
    /// * `Ok(())` - Buffer filled
    /// * `Err(HalError::OutOfRange)` - Access extends past the region
    /// * `Err(HalError::IoError)` - Media failure
    fn read_cds(&self, buf: &mut [u8], offset: usize) -> Result<(), HalError>;

    /// Write bytes to the persistent region
    ///
    /// # Arguments
    /// * `data` - Bytes to write
    /// * `offset` - Byte offset from the start of the region
    ///
    /// # Returns
    /// * `Ok(())` - Data written
    /// * `Err(HalError::OutOfRange)` - Access extends past the region
    /// * `Err(HalError::IoError)` - Media failure
    fn write_cds(&mut self, data: &[u8], offset: usize) -> Result<(), HalError>;

    // === Debug ===

    /// Write a debug message to the platform console
    fn debug_write(&self, msg: &str) {
        log::debug!(target: "fsx::psp", "{}", msg);
    }
}

/// PSP errors
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HalError {
    /// Operation not supported on this platform
    #[error("operation not supported")]
    NotSupported,
    /// Access outside the region
    #[error("access out of range")]
    OutOfRange,
    /// I/O error
    #[error("I/O error")]
    IoError,
    /// Invalid argument
    #[error("invalid argument")]
    InvalidArgument,
}

/// Check that `len` bytes at `offset` fit in a region of `size` bytes.
pub fn check_bounds(offset: usize, len: usize, size: usize) -> Result<(), HalError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(HalError::OutOfRange),
    }
}
