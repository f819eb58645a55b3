//! FSX Block Pool - Bucketed Allocator over Byte Offsets
//!
//! A [`GenPool`] hands out blocks from a fixed set of size classes
//! (buckets). It never touches memory directly: every block descriptor is
//! read and written through a [`PoolStorage`] backend, so the same allocator
//! runs over plain RAM ([`RamStorage`]) or over a persistent store reached
//! through a cache.
//!
//! # Design Principles
//!
//! 1. **Offsets, not pointers**: Blocks are identified by byte offset
//! 2. **Self-validating metadata**: Every block carries a check pattern and
//!    its bucket; corrupt descriptors are counted and rejected
//! 3. **Recycle first**: Freed blocks are reused LIFO before the tail grows
//! 4. **Tail never shrinks**: No merging, no defragmentation
//! 5. **Forward-only rebuild**: Bookkeeping is replayed from the media,
//!    stopping at the first descriptor that fails validation
//!
//! # Pool Layout
//!
//! ```text
//!  start                                              tail        max
//!   │                                                  │           │
//!   ▼                                                  ▼           ▼
//!   ┌──────┬───────────────┬──────┬───────────┬──────┬─────────────┐
//!   │ desc │ block (b0)    │ desc │ block (b2)│ ...  │   unused    │
//!   └──────┴───────────────┴──────┴───────────┴──────┴─────────────┘
//!          ▲                      ▲
//!          └ aligned user offset  └ descriptor = offset - DESCRIPTOR_SIZE
//! ```
//!
//! # Module Organization
//!
//! - `descriptor` - On-media block descriptor and its tagged state
//! - `storage` - `PoolStorage` retrieve/commit trait and `RamStorage`
//! - `pool` - `GenPool` allocator and statistics
//! - `error` - `PoolError`

#![no_std]
extern crate alloc;

pub mod descriptor;
pub mod error;
pub mod pool;
pub mod storage;

pub use descriptor::{
    descriptor_offset, BlockDescriptor, BlockState, BucketId, CHECK_PATTERN, DESCRIPTOR_SIZE,
    POOL_MAX_BUCKETS,
};
pub use error::PoolError;
pub use pool::{BlockStats, GenPool, PoolCounts, PoolUsage};
pub use storage::{PoolStorage, RamStorage};
