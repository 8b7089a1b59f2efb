//! # Pool Statistics
//!
//! All counters use `Relaxed` ordering and are diagnostic only. A snapshot
//! taken while other threads allocate may be transiently inconsistent across
//! counters. Do NOT use these values for allocation decisions.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for a pool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Blocks carved fresh from the system.
    pub system_allocs: u64,
    /// Blocks returned to the system (budget evictions, trim, destroy).
    pub system_frees: u64,
    /// Allocations served from a free list.
    pub recycled: u64,
    /// Releases that went straight back to the system because the budget
    /// was exhausted.
    pub evictions: u64,
    /// Requests rejected as too large.
    pub rejected: u64,
    /// Blocks currently allocated to callers.
    pub live_blocks: u64,
}

#[derive(Default)]
pub(crate) struct StatsCounters {
    system_allocs: AtomicU64,
    system_frees: AtomicU64,
    recycled: AtomicU64,
    evictions: AtomicU64,
    rejected: AtomicU64,
}

impl StatsCounters {
    #[inline]
    pub(crate) fn system_alloc(&self) {
        self.system_allocs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn system_free(&self, count: usize) {
        self.system_frees.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn recycle(&self) {
        self.recycled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn evict(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn reject(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, live_blocks: usize) -> PoolStats {
        PoolStats {
            system_allocs: self.system_allocs.load(Ordering::Relaxed),
            system_frees: self.system_frees.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            live_blocks: live_blocks as u64,
        }
    }
}
