//! FSX Executive - Resource Services over the Core Allocators
//!
//! The executive owns the platform's resource tables, its RAM memory pools,
//! the Critical Data Store and the system log. Every table group sits
//! behind its own named [`SharedLock`]; the allocators underneath never
//! lock on their own.
//!
//! # Design Principles
//!
//! 1. **One lock per group**: Shared data (apps, libs, tasks, counters, pool
//!    table), CDS, system log, and one lock per memory pool
//! 2. **Never nested**: Data needed from a second group is copied out first
//! 3. **Validate before locking**: Names and sizes are checked up front
//! 4. **Two-phase pool setup**: A pool slot is reserved under the lock and
//!    only stamped with its handle once the pool is built
//! 5. **Degrade, don't abort**: An unusable CDS leaves every other service
//!    running
//!
//! # Service Layout
//!
//! ```text
//!                         ┌──────────────────────────────┐
//!                         │          Executive           │
//!                         └──────────────────────────────┘
//!            │                   │                 │              │
//!    ┌───────▼────────┐  ┌───────▼───────┐  ┌──────▼─────┐  ┌─────▼─────┐
//!    │ es-shared-data │  │ es-mempool(s) │  │   es-cds   │  │ es-syslog │
//!    │ ResourceTables │  │ GenPool<Ram>  │  │ CdsInstance│  │  SysLog   │
//!    └────────────────┘  └───────────────┘  └──────┬─────┘  └───────────┘
//!                                                  │
//!                                            ┌─────▼─────┐
//!                                            │  Psp media│
//!                                            └───────────┘
//! ```
//!
//! # Module Organization
//!
//! - `executive` - `Executive`: apps, libs, tasks, counters, system log
//! - `mempool` - Memory pool services and `MemPoolStats`
//! - `cds` - Critical Data Store services
//! - `tables` - Typed handles, records and `ResourceTables`
//! - `syslog` - Bounded `SysLog`
//! - `config` - `PlatformConfig`
//! - `sync` - `SharedLock` (std or loom)
//! - `error` - `EsError`

pub mod cds;
pub mod config;
pub mod error;
pub mod executive;
pub mod mempool;
pub mod sync;
pub mod syslog;
pub mod tables;

#[cfg(any(test, feature = "loom"))]
mod loom_tests;

pub use config::{check_block_sizes, ConfigError, PlatformConfig, DEFAULT_MEM_BLOCK_SIZES};
pub use error::EsError;
pub use executive::{Executive, TaskInfo};
pub use mempool::MemPoolStats;
pub use sync::SharedLock;
pub use syslog::{SysLog, SysLogEntry, SysLogMode, SysLogWrite, SYSLOG_MIN_FRAGMENT};
pub use tables::{AppId, AppType, CounterId, LibId, MemHandle, ResourceTables, TaskId};

pub use fsx_cds::{CdsBlockInfo, CdsHandle, CdsRegistration, CdsStartup};
