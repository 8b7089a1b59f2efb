//! # Block Arena
//!
//! Owns the record of every block the pool knows about, free or in use.
//! Records are addressed by slot index; each slot carries a generation that
//! changes whenever the block it describes is handed out again or returned
//! to the system, so an old [`BlockHandle`] can never alias a new owner.

use crate::block::{BlockHandle, Payload};
use std::collections::TryReserveError;
use std::mem;

/// Slot capacity of the first storage an empty arena grows into.
const MIN_SLOTS: usize = 16;

/// Bookkeeping for one block.
pub(crate) struct Entry {
    /// Size class the block was carved for.
    pub(crate) size_class: usize,
    /// Next block in the same free list.
    pub(crate) next: Option<u32>,
    /// True between allocate and release.
    pub(crate) in_use: bool,
    /// The block's payload and private lock.
    pub(crate) payload: Payload,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Empty slot storage, allocated outside the pool lock and swapped in by
/// [`Arena::adopt`].
pub(crate) struct ArenaStorage {
    slots: Vec<Slot>,
    vacant: Vec<u32>,
}

impl ArenaStorage {
    pub(crate) fn with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity)?;
        let mut vacant = Vec::new();
        vacant.try_reserve_exact(slots.capacity())?;
        Ok(Self { slots, vacant })
    }
}

/// Slot arena of block records.
///
/// `vacant` always has at least the capacity of `slots`, so returning a
/// slot never reallocates.
#[derive(Default)]
pub(crate) struct Arena {
    slots: Vec<Slot>,
    vacant: Vec<u32>,
    in_use: usize,
}

impl Arena {
    /// True if the next [`insert`](Self::insert) needs no new memory.
    #[inline]
    pub(crate) fn has_room(&self) -> bool {
        !self.vacant.is_empty() || self.slots.len() < self.slots.capacity()
    }

    /// Slot capacity to prepare when [`has_room`](Self::has_room) is false.
    pub(crate) fn grown_capacity(&self) -> usize {
        self.slots.capacity().saturating_mul(2).max(MIN_SLOTS)
    }

    /// Moves the records into `storage` if it is larger than the current
    /// storage. Returns the storage no longer in use so the caller can drop
    /// it after releasing the pool lock.
    pub(crate) fn adopt(&mut self, mut storage: ArenaStorage) -> ArenaStorage {
        if storage.slots.capacity() > self.slots.capacity() {
            storage.slots.append(&mut self.slots);
            storage.vacant.append(&mut self.vacant);
            mem::swap(&mut self.slots, &mut storage.slots);
            mem::swap(&mut self.vacant, &mut storage.vacant);
        }
        storage
    }

    /// Records a freshly carved, in-use block. Returns its slot and
    /// generation, or hands the payload back if the slot space is exhausted.
    ///
    /// Grows the slot vector in place when [`has_room`](Self::has_room) is
    /// false; the pool adopts prepared storage first so it never does.
    pub(crate) fn insert(&mut self, size_class: usize, payload: Payload) -> Result<(u32, u32), Payload> {
        let slot = match self.vacant.pop() {
            Some(slot) => slot,
            None => {
                let Ok(slot) = u32::try_from(self.slots.len()) else {
                    return Err(payload);
                };
                self.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                self.vacant
                    .reserve_exact(self.slots.capacity() - self.vacant.len());
                slot
            }
        };

        let record = &mut self.slots[slot as usize];
        record.entry = Some(Entry {
            size_class,
            next: None,
            in_use: true,
            payload,
        });
        self.in_use += 1;
        Ok((slot, record.generation))
    }

    /// Entry at `slot`, if occupied.
    #[inline]
    pub(crate) fn entry(&self, slot: u32) -> Option<&Entry> {
        self.slots.get(slot as usize)?.entry.as_ref()
    }

    /// Mutable entry at `slot`, if occupied.
    #[inline]
    pub(crate) fn entry_mut(&mut self, slot: u32) -> Option<&mut Entry> {
        self.slots.get_mut(slot as usize)?.entry.as_mut()
    }

    /// The entry `handle` refers to, if that block is still allocated to the
    /// handle's holder.
    pub(crate) fn live(&self, handle: &BlockHandle) -> Option<&Entry> {
        let slot = self.slots.get(handle.slot as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_ref().filter(|entry| entry.in_use)
    }

    /// Marks an in-use block as free.
    pub(crate) fn mark_free(&mut self, slot: u32) {
        if let Some(entry) = self.entry_mut(slot) {
            debug_assert!(entry.in_use);
            entry.in_use = false;
            self.in_use -= 1;
        }
    }

    /// Marks a free block as handed out and returns its new generation.
    pub(crate) fn mark_in_use(&mut self, slot: u32) -> u32 {
        let record = &mut self.slots[slot as usize];
        record.generation = record.generation.wrapping_add(1);
        if let Some(entry) = record.entry.as_mut() {
            debug_assert!(!entry.in_use);
            entry.in_use = true;
            entry.next = None;
            self.in_use += 1;
        }
        record.generation
    }

    /// Removes a block record, returning its payload so the caller can give
    /// it back to the system outside any lock.
    pub(crate) fn remove(&mut self, slot: u32) -> Option<Payload> {
        let record = self.slots.get_mut(slot as usize)?;
        let entry = record.entry.take()?;
        record.generation = record.generation.wrapping_add(1);
        if entry.in_use {
            self.in_use -= 1;
        }
        self.vacant.push(slot);
        Some(entry.payload)
    }

    /// Drops every record. Returns how many blocks were freed and how many
    /// of them were still in use.
    pub(crate) fn release_all(self) -> (usize, usize) {
        let freed = self.slots.iter().filter(|slot| slot.entry.is_some()).count();
        (freed, self.in_use)
    }

    /// Number of blocks currently allocated to callers.
    #[inline]
    pub(crate) fn in_use(&self) -> usize {
        self.in_use
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::PoolId;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn payload() -> Payload {
        Arc::new(Mutex::new(vec![0u8; 8].into_boxed_slice()))
    }

    fn handle(slot: u32, generation: u32) -> BlockHandle {
        BlockHandle {
            pool: PoolId::next(),
            slot,
            generation,
            size_class: 0,
        }
    }

    #[test]
    fn test_insert_and_free() {
        let mut arena = Arena::default();
        let (slot, generation) = arena.insert(3, payload()).unwrap();
        assert_eq!(arena.in_use(), 1);
        assert!(arena.live(&handle(slot, generation)).is_some());

        arena.mark_free(slot);
        assert_eq!(arena.in_use(), 0);
        assert!(arena.live(&handle(slot, generation)).is_none());
        assert_eq!(arena.entry(slot).unwrap().size_class, 3);
    }

    #[test]
    fn test_reuse_bumps_generation() {
        let mut arena = Arena::default();
        let (slot, old) = arena.insert(1, payload()).unwrap();
        arena.mark_free(slot);

        let new = arena.mark_in_use(slot);
        assert_ne!(old, new);
        assert!(arena.live(&handle(slot, old)).is_none());
        assert!(arena.live(&handle(slot, new)).is_some());
    }

    #[test]
    fn test_removed_slot_is_recycled() {
        let mut arena = Arena::default();
        let (slot, old) = arena.insert(1, payload()).unwrap();
        assert!(arena.remove(slot).is_some());
        assert_eq!(arena.in_use(), 0);
        assert!(arena.remove(slot).is_none());

        let (again, generation) = arena.insert(2, payload()).unwrap();
        assert_eq!(again, slot);
        assert_ne!(generation, old);
    }

    #[test]
    fn test_release_all_counts_outstanding() {
        let mut arena = Arena::default();
        let (a, _) = arena.insert(1, payload()).unwrap();
        let _ = arena.insert(2, payload()).unwrap();
        let (c, _) = arena.insert(3, payload()).unwrap();
        arena.mark_free(a);
        arena.remove(c);

        assert_eq!(arena.release_all(), (2, 1));
    }

    #[test]
    fn test_adopted_storage_gives_room() {
        let mut arena = Arena::default();
        assert!(!arena.has_room());

        let spare = ArenaStorage::with_capacity(arena.grown_capacity()).unwrap();
        let retired = arena.adopt(spare);
        assert_eq!(retired.slots.capacity(), 0);
        assert!(arena.has_room());

        let capacity = arena.slots.capacity();
        let mut slots = Vec::new();
        while arena.has_room() {
            slots.push(arena.insert(1, payload()).unwrap().0);
        }
        assert_eq!(slots.len(), capacity);
        assert_eq!(arena.slots.capacity(), capacity);

        // Returning every slot fits the reserved vacant list.
        let vacant_capacity = arena.vacant.capacity();
        for slot in slots {
            arena.remove(slot);
        }
        assert_eq!(arena.vacant.capacity(), vacant_capacity);
        assert!(arena.has_room());
    }

    #[test]
    fn test_adopt_keeps_records_and_ignores_smaller_storage() {
        let mut arena = Arena::default();
        let (slot, generation) = arena.insert(4, payload()).unwrap();

        let bigger = ArenaStorage::with_capacity(arena.slots.capacity() + 64).unwrap();
        drop(arena.adopt(bigger));
        assert!(arena.slots.capacity() >= 65);
        assert!(arena.vacant.capacity() >= arena.slots.capacity());
        assert!(arena.live(&handle(slot, generation)).is_some());

        let smaller = ArenaStorage::with_capacity(1).unwrap();
        let returned = arena.adopt(smaller);
        assert!(returned.slots.capacity() < arena.slots.capacity());
        assert_eq!(arena.entry(slot).unwrap().size_class, 4);
    }
}
