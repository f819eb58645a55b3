//! FSX Critical Data Store - Persistent Named Blocks
//!
//! The Critical Data Store (CDS) is a battery-backed region that survives
//! processor resets. It is not memory mapped: every byte goes through the
//! [`Psp`](fsx_hal::Psp) read/write calls. This crate runs the generic block
//! pool over that region and keeps a registry of named, CRC-protected blocks.
//!
//! # Design Principles
//!
//! 1. **One cached object at a time**: Descriptors, signatures and small
//!    headers all pass through a single [`AccessCache`]
//! 2. **Trust nothing at boot**: Both signatures and the registry size must
//!    match before any persisted content is reused; otherwise the store is
//!    wiped and reinitialized
//! 3. **Integrity on read**: User data carries a CRC; a mismatch is an error,
//!    never stale data
//! 4. **No locking here**: The executive serializes all access with the CDS lock
//!
//! # Store Layout
//!
//! ```text
//! 0        8        12                     header          total-8   total
//! ┌────────┬────────┬──────────────────────┬─────────────────┬────────┐
//! │_CDSBeg_│ count  │ registry entries     │  block pool     │_CDSEnd_│
//! │        │ (u32)  │ (count * 56 bytes)   │ desc|crc|data.. │        │
//! └────────┴────────┴──────────────────────┴─────────────────┴────────┘
//! ```
//!
//! # Module Organization
//!
//! - `layout` - Offsets, signatures, size limits and `CdsConfig`
//! - `cache` - `AccessCache` and its `PoolStorage` bridge
//! - `registry` - `CdsRegRecord` and its persisted form
//! - `instance` - `CdsInstance`: startup, registration, read/write, delete
//! - `crc` - CRC-16 / CRC-32 service
//! - `error` - `CdsError`

#![no_std]
extern crate alloc;

pub mod cache;
pub mod crc;
pub mod error;
pub mod instance;
pub mod layout;
pub mod registry;

pub use cache::AccessCache;
pub use crc::{calculate_crc, CrcAlgorithm};
pub use error::CdsError;
pub use instance::{CdsBlockInfo, CdsInstance, CdsRegistration, CdsStartup, CdsValidity};
pub use layout::{
    CdsConfig, BLOCK_HEADER_SIZE, CACHE_CAPACITY, CDS_MAX_FULL_NAME_LEN, CDS_MAX_NAME_LEN,
    DEFAULT_CDS_BLOCK_SIZES, MAX_API_LEN, MAX_USER_BLOCK_SIZE, SIGNATURE_BEGIN, SIGNATURE_END,
};
pub use registry::{form_name, owner_name, CdsHandle, CdsRegRecord, REGISTRY_ENTRY_SIZE};
