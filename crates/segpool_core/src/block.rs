//! # Blocks and Handles
//!
//! A block is the pool's unit of recycling. Its payload sits behind a
//! private lock, independent of the pool lock, which lives exactly as long as
//! the block: created when the block is carved, dropped when the block goes
//! back to the system.
//!
//! Callers never see payload pointers. They hold a [`BlockHandle`], a small
//! copyable fat reference (pool id, arena slot, generation, size class). The
//! generation makes releasing the same handle twice detectable.

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared payload storage of one block.
pub(crate) type Payload = Arc<Mutex<Box<[u8]>>>;

/// Identity of a pool, used to route handles back to their owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolId(u64);

impl PoolId {
    /// Allocates a process-unique id.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to an allocated block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    pub(crate) pool: PoolId,
    pub(crate) slot: u32,
    pub(crate) generation: u32,
    pub(crate) size_class: u32,
}

impl BlockHandle {
    /// Pool that produced this block.
    #[inline]
    #[must_use]
    pub const fn pool(&self) -> PoolId {
        self.pool
    }

    /// Arena slot backing this block.
    ///
    /// Slots are reused only for the same block until it is returned to the
    /// system, so two handles with the same slot share the same storage.
    #[inline]
    #[must_use]
    pub const fn slot(&self) -> u32 {
        self.slot
    }

    /// Size class of the block (may exceed the requested class when an
    /// upward scan found a larger free block).
    #[inline]
    #[must_use]
    pub const fn size_class(&self) -> usize {
        self.size_class as usize
    }
}

/// Exclusive access to a block's payload, holding its private lock.
///
/// Dropping the guard unlocks the block.
pub struct BlockGuard {
    guard: ArcMutexGuard<RawMutex, Box<[u8]>>,
}

impl BlockGuard {
    pub(crate) fn acquire(payload: &Payload) -> Self {
        Self {
            guard: payload.lock_arc(),
        }
    }

    pub(crate) fn try_acquire(payload: &Payload) -> Option<Self> {
        payload.try_lock_arc().map(|guard| Self { guard })
    }

    /// Releases the block's private lock.
    #[inline]
    pub fn unlock(self) {
        drop(self);
    }
}

impl Deref for BlockGuard {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        &self.guard
    }
}

impl DerefMut for BlockGuard {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.guard
    }
}

impl fmt::Debug for BlockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockGuard")
            .field("payload_len", &self.guard.len())
            .finish()
    }
}
