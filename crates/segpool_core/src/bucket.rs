//! # Bucket Table
//!
//! Free-list heads indexed by size class. Lists are intrusive: each arena
//! entry carries the slot of the next free block.
//!
//! ```text
//!   heads[0] ─► c0 ─► c0 ─► c9 ─► c12      (class 0 + oversized, ascending)
//!   heads[1] ─► c1 ─► c1
//!   heads[2]
//!   heads[3] ─► c3                         ◄── highest non-empty
//!   ...
//! ```
//!
//! Bucket `i > 0` only ever holds class `i` blocks. Bucket 0 holds class 0
//! and every class without a bucket of its own, sorted on insert so the
//! first-fit scan in [`BucketTable::take_oversized`] also returns the
//! smallest sufficient block.

use crate::arena::Arena;
use std::collections::TryReserveError;

/// Free-list heads plus the highest non-empty index.
pub(crate) struct BucketTable {
    heads: Vec<Option<u32>>,
    highest: usize,
    /// Sum of the size classes of every listed block.
    resident: usize,
    /// Number of listed blocks.
    free: usize,
}

#[inline]
fn next_of(arena: &Arena, slot: u32) -> Option<u32> {
    arena.entry(slot).and_then(|entry| entry.next)
}

#[inline]
fn class_of(arena: &Arena, slot: u32) -> usize {
    arena.entry(slot).map_or(0, |entry| entry.size_class)
}

#[inline]
fn set_next(arena: &mut Arena, slot: u32, next: Option<u32>) {
    if let Some(entry) = arena.entry_mut(slot) {
        entry.next = next;
    }
}

impl BucketTable {
    pub(crate) fn new(bucket_count: usize) -> Result<Self, TryReserveError> {
        let mut heads = Vec::new();
        heads.try_reserve_exact(bucket_count)?;
        heads.resize(bucket_count, None);
        Ok(Self {
            heads,
            highest: 0,
            resident: 0,
            free: 0,
        })
    }

    /// Largest bucket index known to hold a free block (0 when empty).
    #[inline]
    pub(crate) fn highest_non_empty(&self) -> usize {
        self.highest
    }

    /// Files a free block under its size class.
    pub(crate) fn push(&mut self, arena: &mut Arena, slot: u32, size_class: usize) {
        self.resident += size_class;
        self.free += 1;
        if size_class == 0 || size_class >= self.heads.len() {
            self.insert_sorted(arena, slot, size_class);
            return;
        }

        set_next(arena, slot, self.heads[size_class]);
        self.heads[size_class] = Some(slot);
        if size_class > self.highest {
            self.highest = size_class;
        }
    }

    fn insert_sorted(&mut self, arena: &mut Arena, slot: u32, size_class: usize) {
        let mut prev = None;
        let mut cursor = self.heads[0];
        while let Some(current) = cursor {
            if class_of(arena, current) >= size_class {
                break;
            }
            prev = Some(current);
            cursor = next_of(arena, current);
        }

        set_next(arena, slot, cursor);
        match prev {
            Some(prev) => set_next(arena, prev, Some(slot)),
            None => self.heads[0] = Some(slot),
        }
    }

    /// Detaches the head of the first non-empty bucket in
    /// `index..=highest`.
    pub(crate) fn pop_regular(&mut self, arena: &mut Arena, index: usize) -> Option<u32> {
        if index > self.highest {
            return None;
        }

        let bucket = (index..=self.highest).find(|&i| self.heads[i].is_some())?;
        let slot = self.heads[bucket]?;
        self.heads[bucket] = next_of(arena, slot);
        set_next(arena, slot, None);
        self.detached(arena, slot);

        if bucket == self.highest && self.heads[bucket].is_none() {
            self.lower_highest();
        }
        Some(slot)
    }

    /// Detaches the first bucket-0 block whose class is at least `index`.
    pub(crate) fn take_oversized(&mut self, arena: &mut Arena, index: usize) -> Option<u32> {
        let mut prev = None;
        let mut cursor = self.heads[0];
        while let Some(current) = cursor {
            if class_of(arena, current) >= index {
                self.unlink(arena, prev, current);
                return Some(current);
            }
            prev = Some(current);
            cursor = next_of(arena, current);
        }
        None
    }

    /// Detaches the largest free block.
    pub(crate) fn pop_largest(&mut self, arena: &mut Arena) -> Option<u32> {
        // Tail of bucket 0 and the head of the highest bucket are the only
        // candidates.
        let mut tail = None;
        let mut before_tail = None;
        let mut cursor = self.heads[0];
        while let Some(current) = cursor {
            before_tail = tail;
            tail = Some(current);
            cursor = next_of(arena, current);
        }

        let highest_head = if self.highest > 0 {
            self.heads[self.highest]
        } else {
            None
        };

        match (tail, highest_head) {
            (Some(t), Some(_)) if class_of(arena, t) >= self.highest => {
                self.unlink(arena, before_tail, t);
                Some(t)
            }
            (_, Some(_)) => self.pop_regular(arena, self.highest),
            (Some(t), None) => {
                self.unlink(arena, before_tail, t);
                Some(t)
            }
            (None, None) => None,
        }
    }

    /// Forgets every list without visiting the blocks.
    pub(crate) fn clear(&mut self) {
        self.heads.fill(None);
        self.highest = 0;
        self.resident = 0;
        self.free = 0;
    }

    /// Sum of the size classes of every free block.
    #[inline]
    pub(crate) fn resident_units(&self) -> usize {
        self.resident
    }

    /// Number of free blocks across all buckets.
    #[inline]
    pub(crate) fn free_blocks(&self) -> usize {
        self.free
    }

    /// Appends every bucket's classes, in list order, to `classes` and each
    /// bucket's length to `lengths`.
    ///
    /// Pushes [`free_blocks`](Self::free_blocks) classes and one length per
    /// bucket; callers reserve that much up front.
    pub(crate) fn write_classes(&self, arena: &Arena, lengths: &mut Vec<usize>, classes: &mut Vec<usize>) {
        for head in &self.heads {
            let start = classes.len();
            let mut cursor = *head;
            while let Some(current) = cursor {
                classes.push(class_of(arena, current));
                cursor = next_of(arena, current);
            }
            lengths.push(classes.len() - start);
        }
    }

    fn unlink(&mut self, arena: &mut Arena, prev: Option<u32>, slot: u32) {
        let next = next_of(arena, slot);
        match prev {
            Some(prev) => set_next(arena, prev, next),
            None => self.heads[0] = next,
        }
        set_next(arena, slot, None);
        self.detached(arena, slot);
    }

    fn detached(&mut self, arena: &Arena, slot: u32) {
        self.resident -= class_of(arena, slot);
        self.free -= 1;
    }

    fn lower_highest(&mut self) {
        while self.highest > 0 && self.heads[self.highest].is_none() {
            self.highest -= 1;
        }
    }
}
