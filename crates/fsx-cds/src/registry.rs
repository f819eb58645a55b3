//! CDS registry records
//!
//! The registry is a [`SlotTable`](fsx_resource::SlotTable) of
//! [`CdsRegRecord`]s mirrored entry-for-entry into the store header. Each
//! persisted entry is 56 bytes, little endian:
//!
//! ```text
//! ┌────────┬──────────┬──────────┬──────────────────┬──────┬─────┐
//! │ id u32 │ offset   │ size u32 │ name [u8; 40]    │ crit │ pad │
//! │        │ u32      │          │ NUL terminated   │ u8   │ 3   │
//! └────────┴──────────┴──────────┴──────────────────┴──────┴─────┘
//! ```

use alloc::string::String;

use fsx_resource::{typed_id, ResourceId, ResourceKind, SlotRecord};

use crate::layout::{CDS_MAX_FULL_NAME_LEN, MAX_API_LEN};

/// Size of one persisted registry entry
pub const REGISTRY_ENTRY_SIZE: usize = 12 + CDS_MAX_FULL_NAME_LEN + 4;

const NAME_OFFSET: usize = 12;
const CRITICAL_OFFSET: usize = NAME_OFFSET + CDS_MAX_FULL_NAME_LEN;

typed_id!(
    /// Handle of a registered CDS block
    CdsHandle,
    ResourceKind::CdsBlock
);

/// One registered block
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CdsRegRecord {
    pub id: ResourceId,
    /// Offset of the block (CRC header first) inside the store; 0 if none
    pub block_offset: usize,
    /// Block size including the CRC header; 0 if none
    pub block_size: usize,
    /// Full "App.Local" name
    pub name: String,
    /// Block belongs to a critical table
    pub critical_table: bool,
}

impl SlotRecord for CdsRegRecord {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn set_id(&mut self, id: ResourceId) {
        self.id = id;
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl CdsRegRecord {
    /// Encode into the persisted entry format.
    ///
    /// Names longer than the field are truncated; registration never
    /// produces one.
    pub fn to_bytes(&self) -> [u8; REGISTRY_ENTRY_SIZE] {
        let mut out = [0u8; REGISTRY_ENTRY_SIZE];
        out[0..4].copy_from_slice(&self.id.to_raw().to_le_bytes());
        out[4..8].copy_from_slice(&(self.block_offset as u32).to_le_bytes());
        out[8..12].copy_from_slice(&(self.block_size as u32).to_le_bytes());

        let name = self.name.as_bytes();
        let len = name.len().min(CDS_MAX_FULL_NAME_LEN - 1);
        out[NAME_OFFSET..NAME_OFFSET + len].copy_from_slice(&name[..len]);
        out[CRITICAL_OFFSET] = u8::from(self.critical_table);
        out
    }

    /// Decode a persisted entry. Name bytes that are not UTF-8 are replaced.
    pub fn from_bytes(bytes: &[u8; REGISTRY_ENTRY_SIZE]) -> Self {
        let u32_at =
            |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);

        let field = &bytes[NAME_OFFSET..CRITICAL_OFFSET];
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());

        Self {
            id: ResourceId::from_raw(u32_at(0)),
            block_offset: u32_at(4) as usize,
            block_size: u32_at(8) as usize,
            name: String::from_utf8_lossy(&field[..end]).into_owned(),
            critical_table: bytes[CRITICAL_OFFSET] != 0,
        }
    }
}

/// Full block name: `"{app}.{local}"`.
pub fn form_name(app_name: &str, local_name: &str) -> String {
    let mut name = String::with_capacity(app_name.len() + 1 + local_name.len());
    name.push_str(app_name);
    name.push('.');
    name.push_str(local_name);
    name
}

/// Owning application of a block: the text before the first `.`, capped
/// at the application name limit.
pub fn owner_name(full_name: &str) -> &str {
    let owner = full_name.split('.').next().unwrap_or(full_name);
    let limit = MAX_API_LEN - 1;
    if owner.len() <= limit {
        return owner;
    }
    let mut end = limit;
    while !owner.is_char_boundary(end) {
        end -= 1;
    }
    &owner[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_size() {
        assert_eq!(REGISTRY_ENTRY_SIZE, 56);
    }

    #[test]
    fn test_entry_layout() {
        let rec = CdsRegRecord {
            id: ResourceId::from_parts(ResourceKind::CdsBlock.base_value(), 2),
            block_offset: 0x1234,
            block_size: 104,
            name: String::from("APP.CFG"),
            critical_table: true,
        };
        let bytes = rec.to_bytes();
        assert_eq!(&bytes[0..4], &0x0215_0002u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &[0x34, 0x12, 0, 0]);
        assert_eq!(&bytes[12..19], b"APP.CFG");
        assert_eq!(bytes[19], 0);
        assert_eq!(bytes[52], 1);
        assert_eq!(CdsRegRecord::from_bytes(&bytes), rec);
    }

    #[test]
    fn test_blank_entry_is_free() {
        let rec = CdsRegRecord::from_bytes(&[0; REGISTRY_ENTRY_SIZE]);
        assert!(!rec.is_used());
        assert!(rec.name.is_empty());
        assert_eq!(rec, CdsRegRecord::default());
    }

    #[test]
    fn test_form_name() {
        assert_eq!(form_name("SC", "STATE"), "SC.STATE");
    }

    #[test]
    fn test_owner_name() {
        assert_eq!(owner_name("SC.STATE"), "SC");
        assert_eq!(owner_name("NODOT"), "NODOT");
        assert_eq!(owner_name("A.B.C"), "A");
        let long = "ABCDEFGHIJKLMNOPQRSTUVWXYZ.X";
        assert_eq!(owner_name(long), "ABCDEFGHIJKLMNOPQRS");
    }
}
