//! Fixed-capacity slot tables
//!
//! A [`SlotTable`] is the arena for one resource kind. Records carry their own
//! copy of the owning handle; [`SlotTable::locate`] only decodes a handle into
//! a slot, and [`SlotRecord::is_match`] is the ownership check.
//!
//! Nothing here locks. Callers hold the lock that protects the table.

use alloc::vec::Vec;
use core::mem;

use crate::id::{find_next, to_index, ResourceId, ResourceKind};

/// A record stored in a [`SlotTable`].
///
/// `Default` must produce a free record (undefined handle, zeroed payload).
pub trait SlotRecord: Default {
    /// Handle currently stored in the record
    fn id(&self) -> ResourceId;

    /// Overwrite the stored handle
    fn set_id(&mut self, id: ResourceId);

    /// Name used by name lookups (empty if the kind is unnamed)
    fn name(&self) -> &str {
        ""
    }

    fn is_used(&self) -> bool {
        self.id().is_defined()
    }

    fn set_used(&mut self, id: ResourceId) {
        self.set_id(id);
    }

    /// Clear the owning handle. Payload is left for the caller to reset.
    fn set_free(&mut self) {
        self.set_id(ResourceId::UNDEFINED);
    }

    /// True only if this record is owned by `id`
    fn is_match(&self, id: ResourceId) -> bool {
        id.is_defined() && self.id() == id
    }
}

/// Slot table errors
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    /// Every slot of the kind is occupied
    #[error("no free {0} slots")]
    NoFreeSlots(ResourceKind),

    /// Handle does not decode to a slot owned by it
    #[error("resource id {0} is not valid")]
    InvalidId(ResourceId),
}

/// Arena of records for one resource kind.
pub struct SlotTable<R> {
    kind: ResourceKind,
    last_issued: ResourceId,
    slots: Vec<R>,
}

impl<R: SlotRecord> SlotTable<R> {
    /// Create a table with `capacity` free slots.
    pub fn new(kind: ResourceKind, capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, R::default);
        Self {
            kind,
            last_issued: ResourceId::from_raw(kind.base_value()),
            slots,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Most recently issued handle (the bare kind base before the first one)
    pub fn last_issued(&self) -> ResourceId {
        self.last_issued
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    /// Decode a handle to its slot without checking ownership.
    pub fn locate(&self, id: ResourceId) -> Option<&R> {
        let index = to_index(id, self.kind.base_value(), self.slots.len() as u32).ok()?;
        self.slots.get(index)
    }

    /// Mutable form of [`SlotTable::locate`].
    pub fn locate_mut(&mut self, id: ResourceId) -> Option<&mut R> {
        let index = to_index(id, self.kind.base_value(), self.slots.len() as u32).ok()?;
        self.slots.get_mut(index)
    }

    /// Next free handle, without claiming it.
    ///
    /// A candidate whose slot cannot be located counts as used.
    pub fn find_pending(&self) -> Option<ResourceId> {
        find_next(self.last_issued, self.slots.len() as u32, |candidate| {
            self.locate(candidate).map_or(true, |slot| slot.is_used())
        })
    }

    /// Reserve the next free slot for a multi-step setup.
    ///
    /// The record is reset and the handle becomes the last issued one, but
    /// the slot is not marked used. The caller stamps it with
    /// [`SlotRecord::set_used`] once setup succeeds.
    pub fn reserve(&mut self) -> Result<(ResourceId, &mut R), SlotError> {
        let kind = self.kind;
        let id = self.find_pending().ok_or(SlotError::NoFreeSlots(kind))?;
        self.last_issued = id;
        let slot = self.locate_mut(id).ok_or(SlotError::NoFreeSlots(kind))?;
        *slot = R::default();
        Ok((id, slot))
    }

    /// Claim the next free slot and stamp it with a fresh handle.
    pub fn allocate(&mut self) -> Result<(ResourceId, &mut R), SlotError> {
        let (id, slot) = self.reserve()?;
        slot.set_used(id);
        Ok((id, slot))
    }

    // ========================================================================
    // Checked Access
    // ========================================================================

    /// Locate a slot and confirm `id` owns it.
    pub fn lookup(&self, id: ResourceId) -> Result<&R, SlotError> {
        self.locate(id)
            .filter(|slot| slot.is_match(id))
            .ok_or(SlotError::InvalidId(id))
    }

    /// Mutable form of [`SlotTable::lookup`].
    pub fn lookup_mut(&mut self, id: ResourceId) -> Result<&mut R, SlotError> {
        self.locate_mut(id)
            .filter(|slot| slot.is_match(id))
            .ok_or(SlotError::InvalidId(id))
    }

    /// Free the slot owned by `id` and zero its payload.
    ///
    /// Returns the previous record contents.
    pub fn release(&mut self, id: ResourceId) -> Result<R, SlotError> {
        let slot = self.lookup_mut(id)?;
        Ok(mem::take(slot))
    }

    /// Clear the handle owned by `id`, leaving the payload in place.
    pub fn free(&mut self, id: ResourceId) -> Result<(), SlotError> {
        self.lookup_mut(id)?.set_free();
        Ok(())
    }

    pub fn is_valid(&self, id: ResourceId) -> bool {
        self.lookup(id).is_ok()
    }

    // ========================================================================
    // Scans
    // ========================================================================

    pub fn find_by_name(&self, name: &str) -> Option<&R> {
        self.iter_used().find(|slot| slot.name() == name)
    }

    pub fn find_by_name_mut(&mut self, name: &str) -> Option<&mut R> {
        self.slots
            .iter_mut()
            .find(|slot| slot.is_used() && slot.name() == name)
    }

    pub fn iter_used(&self) -> impl Iterator<Item = &R> {
        self.slots.iter().filter(|slot| slot.is_used())
    }

    pub fn count_used(&self) -> usize {
        self.iter_used().count()
    }

    /// All slots in index order, free ones included.
    pub fn slots(&self) -> &[R] {
        &self.slots
    }

    /// Mutable view of all slots, for restoring a persisted table.
    pub fn slots_mut(&mut self) -> &mut [R] {
        &mut self.slots
    }

    /// Drop every record and restart serials from the kind base.
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = R::default());
        self.last_issued = ResourceId::from_raw(self.kind.base_value());
    }
}
