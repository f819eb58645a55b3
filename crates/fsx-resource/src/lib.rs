//! FSX Resource Identifiers - Typed Handles and Slot Tables
//!
//! Every live executive resource (application, library, task, counter,
//! memory pool, persistent block) is named by an opaque [`ResourceId`] and
//! stored in a fixed-capacity [`SlotTable`] for its kind.
//!
//! # Design Principles
//!
//! 1. **Handles, not indices**: Slot positions never leave this crate
//! 2. **Stored handle is authority**: `locate` finds a slot, `is_match` proves ownership
//! 3. **Slow reuse**: Serial numbers advance through a whole cycle before a
//!    freed slot is handed out under a previously issued value
//! 4. **Lock-free primitives**: Callers hold the lock that guards the table
//!
//! # Handle Layout
//!
//! ```text
//!  31            16 15             0
//! ┌────────────────┬────────────────┐
//! │  kind base     │    serial      │
//! │ MARK | offset  │  (generation)  │
//! └────────────────┴────────────────┘
//!          │                │
//!          │                └── serial % capacity = slot index
//!          └── selects the SlotTable
//! ```
//!
//! # Module Organization
//!
//! - `id` - `ResourceId`, `ResourceKind`, `find_next`, `to_index`
//! - `table` - `SlotRecord` trait and the generic `SlotTable`

#![no_std]
extern crate alloc;

pub mod id;
pub mod table;

pub use id::{
    find_next, to_index, ResourceId, ResourceIdError, ResourceKind, RESOURCEID_MARK,
    RESOURCEID_MAX, RESOURCEID_SHIFT,
};
pub use table::{SlotError, SlotRecord, SlotTable};
