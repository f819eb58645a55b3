//! Resource identifier encoding
//!
//! A [`ResourceId`] packs the base value of its kind into the upper bits and
//! a serial number into the lower [`RESOURCEID_SHIFT`] bits. The serial is
//! what `find_next` advances; the kind base never changes for a table.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Number of bits reserved for the serial part of a handle
pub const RESOURCEID_SHIFT: u32 = 16;

/// Largest serial value (also the serial mask)
pub const RESOURCEID_MAX: u32 = (1 << RESOURCEID_SHIFT) - 1;

/// Marker bit set in every kind base so that no valid handle is small
pub const RESOURCEID_MARK: u32 = 0x0200_0000;

/// Opaque resource handle
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ResourceId(u32);

impl ResourceId {
    /// Never identifies a live resource
    pub const UNDEFINED: Self = Self(0);

    /// Claims a slot while a multi-step setup is in progress
    pub const RESERVED: Self = Self(0xFFFF_FFFF);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> u32 {
        self.0
    }

    /// Build a handle from a kind base and a serial
    pub const fn from_parts(base: u32, serial: u32) -> Self {
        Self(base.wrapping_add(serial))
    }

    pub const fn is_defined(self) -> bool {
        self.0 != Self::UNDEFINED.0
    }

    /// Kind base bits (serial stripped)
    pub const fn base(self) -> u32 {
        self.0 & !RESOURCEID_MAX
    }

    /// Serial bits
    pub const fn serial(self) -> u32 {
        self.0 & RESOURCEID_MAX
    }

    /// Kind encoded in this handle, if it is one of ours
    pub fn kind(self) -> Option<ResourceKind> {
        ResourceKind::from_base(self.base())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Resource kinds, one slot table each
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Executive task
    Task,
    /// Application
    App,
    /// Shared library
    Lib,
    /// Generic counter
    Counter,
    /// Memory pool
    MemPool,
    /// Critical data store block
    CdsBlock,
}

impl ResourceKind {
    /// All kinds, in base order
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Task,
        ResourceKind::App,
        ResourceKind::Lib,
        ResourceKind::Counter,
        ResourceKind::MemPool,
        ResourceKind::CdsBlock,
    ];

    const fn offset(self) -> u32 {
        match self {
            ResourceKind::Task => 0x01,
            ResourceKind::App => 0x11,
            ResourceKind::Lib => 0x12,
            ResourceKind::Counter => 0x13,
            ResourceKind::MemPool => 0x14,
            ResourceKind::CdsBlock => 0x15,
        }
    }

    /// Base value shared by every handle of this kind
    pub const fn base_value(self) -> u32 {
        RESOURCEID_MARK | (self.offset() << RESOURCEID_SHIFT)
    }

    /// Inverse of [`ResourceKind::base_value`]
    pub fn from_base(base: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.base_value() == base)
    }

    pub const fn name(self) -> &'static str {
        match self {
            ResourceKind::Task => "task",
            ResourceKind::App => "app",
            ResourceKind::Lib => "lib",
            ResourceKind::Counter => "counter",
            ResourceKind::MemPool => "mempool",
            ResourceKind::CdsBlock => "cds-block",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Define a typed handle wrapping a [`ResourceId`] of one kind.
///
/// ```ignore
/// fsx_resource::typed_id!(
///     /// Application handle
///     AppId, ResourceKind::App
/// );
/// ```
#[macro_export]
macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub $crate::ResourceId);

        impl $name {
            pub const UNDEFINED: Self = Self($crate::ResourceId::UNDEFINED);
            pub const KIND: $crate::ResourceKind = $kind;

            pub const fn resource_id(self) -> $crate::ResourceId {
                self.0
            }

            pub const fn is_defined(self) -> bool {
                self.0.is_defined()
            }
        }

        impl From<$name> for $crate::ResourceId {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

/// Errors decoding a handle into a table index
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResourceIdError {
    /// Handle does not carry the expected kind base
    #[error("resource id {id} is not in range for base 0x{base:08x}")]
    OutOfRange { id: ResourceId, base: u32 },

    /// Zero-capacity table
    #[error("table size is zero")]
    EmptyTable,
}

// ============================================================================
// Serial Search
// ============================================================================

/// Find the next unused handle after `last_issued`.
///
/// Candidates are tested in serial order. Once the serial reaches
/// [`RESOURCEID_MAX`] it wraps to `serial % table_size`, so a serial is not
/// revisited until the rest of the cycle has been tried. At most
/// `table_size` candidates are tested.
///
/// # Arguments
/// * `last_issued` - Most recent handle issued for the kind (or the bare base)
/// * `table_size` - Number of slots in the table
/// * `is_used` - Returns true if the slot for a candidate is occupied
///
/// # Returns
/// * `Some(id)` - First free candidate
/// * `None` - Undefined base, empty table, or every slot in use
pub fn find_next<F>(last_issued: ResourceId, table_size: u32, mut is_used: F) -> Option<ResourceId>
where
    F: FnMut(ResourceId) -> bool,
{
    let base = last_issued.base();
    if base == 0 || table_size == 0 {
        return None;
    }

    let mut serial = last_issued.serial();
    let mut remaining = table_size;
    loop {
        serial += 1;
        if serial >= RESOURCEID_MAX {
            serial %= table_size;
        }

        let candidate = ResourceId::from_parts(base, serial);
        if !is_used(candidate) {
            return Some(candidate);
        }

        remaining -= 1;
        if remaining == 0 {
            return None;
        }
    }
}

/// Convert a handle into a slot index for a table of `table_size` slots.
///
/// Only the serial range is checked; the caller still has to compare the
/// stored handle before trusting the slot.
pub fn to_index(id: ResourceId, base: u32, table_size: u32) -> Result<usize, ResourceIdError> {
    let serial = id.to_raw().wrapping_sub(base);
    if serial > RESOURCEID_MAX {
        return Err(ResourceIdError::OutOfRange { id, base });
    }
    if table_size == 0 {
        return Err(ResourceIdError::EmptyTable);
    }

    Ok((serial % table_size) as usize)
}

#[cfg(kani)]
mod proofs {
    use super::*;

    /// Proof: a decoded index is always inside the table
    #[kani::proof]
    fn to_index_in_bounds() {
        let raw: u32 = kani::any();
        let table_size: u32 = kani::any();
        kani::assume(table_size > 0 && table_size <= 64);

        let base = ResourceKind::App.base_value();
        if let Ok(index) = to_index(ResourceId::from_raw(raw), base, table_size) {
            kani::assert((index as u32) < table_size, "index must be below table size");
        }
    }

    /// Proof: find_next keeps the kind base and a serial in range
    #[kani::proof]
    #[kani::unwind(6)]
    fn find_next_keeps_base() {
        let serial: u32 = kani::any();
        let table_size: u32 = kani::any();
        kani::assume(serial <= RESOURCEID_MAX);
        kani::assume(table_size > 0 && table_size <= 4);

        let base = ResourceKind::Task.base_value();
        let last = ResourceId::from_parts(base, serial);
        let used: bool = kani::any();
        if let Some(next) = find_next(last, table_size, |_| used) {
            kani::assert(next.base() == base, "kind base must not change");
            kani::assert(next.serial() < RESOURCEID_MAX, "serial must stay below max");
        }
    }
}
