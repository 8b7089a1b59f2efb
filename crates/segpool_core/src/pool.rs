//! # Segregated Pool
//!
//! Variable-size allocator that recycles freed blocks through size-class
//! free lists and caps how much free memory it keeps.
//!
//! ## Locking
//!
//! ```text
//!   allocate/release/snapshot ──► pool lock ──► bucket table, budget, arena
//!   lock(handle)              ──► pool lock (clone payload ref, release)
//!                             ──► block lock
//! ```
//!
//! The pool lock is only held for list and arena bookkeeping, and nothing
//! allocates or frees while it is held. Fresh payloads and grown arena
//! storage are prepared before it is taken; evicted payloads and retired
//! storage are dropped after it is released. The pool never takes a block
//! lock, and never holds its own lock while waiting on one, so the two
//! locks cannot deadlock.

use crate::arena::{Arena, ArenaStorage};
use crate::block::{BlockGuard, BlockHandle, Payload, PoolId};
use crate::bucket::BucketTable;
use crate::budget::Budget;
use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::size_class::{SizeClass, SizeClassMap};
use crate::snapshot::PoolSnapshot;
use crate::stats::{PoolStats, StatsCounters};
use parking_lot::Mutex;
use std::mem;
use std::sync::Arc;

/// Everything guarded by the pool lock.
struct PoolState {
    arena: Arena,
    buckets: BucketTable,
    budget: Budget,
}

/// Blocks and bytes returned to the system by [`SegregatedPool::trim`] or
/// [`SegregatedPool::set_capacity`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrimReport {
    /// Number of blocks released.
    pub blocks: usize,
    /// Total block bytes released, headers included.
    pub bytes: usize,
}

/// A capacity-bounded segregated free-list allocator.
///
/// # Thread Safety
///
/// The pool is `Send + Sync`; share it with `Arc`. Every operation takes
/// `&self`.
///
/// # Example
///
/// ```rust,ignore
/// let pool = SegregatedPool::new(PoolConfig::new(0, 8, 64, 8, 6))?;
///
/// let handle = pool.allocate(10)?;
/// {
///     let mut payload = pool.lock(handle)?;
///     payload[..5].copy_from_slice(b"hello");
/// }
/// pool.release(handle)?;
/// ```
pub struct SegregatedPool {
    id: PoolId,
    classes: SizeClassMap,
    state: Mutex<PoolState>,
    stats: StatsCounters,
}

/// Carves payload memory from the system without aborting on failure.
fn carve_payload(len: usize) -> Option<Box<[u8]>> {
    let mut bytes = Vec::new();
    bytes.try_reserve_exact(len).ok()?;
    bytes.resize(len, 0);
    Some(bytes.into_boxed_slice())
}

impl SegregatedPool {
    /// Creates a pool from a configuration.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidArgument`] for a malformed configuration,
    /// [`PoolError::OutOfMemory`] if the bucket table cannot be allocated.
    pub fn new(config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;

        let classes = SizeClassMap::new(&config);
        let buckets = BucketTable::new(config.bucket_count).map_err(|_| PoolError::OutOfMemory {
            bytes: config.bucket_count.saturating_mul(mem::size_of::<Option<u32>>()),
        })?;
        let budget = Budget::new(classes.units_for_bytes(config.capacity));

        let pool = Self {
            id: PoolId::next(),
            classes,
            state: Mutex::new(PoolState {
                arena: Arena::default(),
                buckets,
                budget,
            }),
            stats: StatsCounters::default(),
        };

        tracing::debug!(
            pool = %pool.id,
            bucket_count = config.bucket_count,
            boundary = classes.boundary_size(),
            min_alloc = classes.min_alloc_size(),
            max_units = config.max_units,
            budget_units = budget.ceiling(),
            "pool created"
        );
        Ok(pool)
    }

    /// Creates a pool with the default configuration: 256 buckets, 8 KiB
    /// floor, 2048-unit maximum, 4 KiB granularity, unlimited capacity.
    ///
    /// # Errors
    ///
    /// [`PoolError::OutOfMemory`] if the bucket table cannot be allocated.
    pub fn with_defaults() -> PoolResult<Self> {
        Self::new(PoolConfig::default())
    }

    /// This pool's identity.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> PoolId {
        self.id
    }

    /// Size-class arithmetic used by this pool.
    #[inline]
    #[must_use]
    pub const fn size_classes(&self) -> &SizeClassMap {
        &self.classes
    }

    /// Allocates a block with room for at least `size` payload bytes.
    ///
    /// Recycles a free block when one of a sufficient class is retained,
    /// otherwise carves a new one from the system.
    ///
    /// # Errors
    ///
    /// [`PoolError::TooLarge`] if the size class exceeds `max_units` (no
    /// system allocation is attempted), [`PoolError::OutOfMemory`] if the
    /// system refuses the memory.
    pub fn allocate(&self, size: usize) -> PoolResult<BlockHandle> {
        let class = match self.classes.classify(size) {
            Ok(class) => class,
            Err(err) => {
                self.stats.reject();
                tracing::debug!(pool = %self.id, size, "allocation rejected: {err}");
                return Err(err);
            }
        };

        if let Some(handle) = self.recycle(class.index) {
            return Ok(handle);
        }
        self.carve(class)
    }

    /// Detaches a suitable free block, if any.
    fn recycle(&self, index: usize) -> Option<BlockHandle> {
        let mut state = self.state.lock();
        let PoolState {
            arena,
            buckets,
            budget,
        } = &mut *state;

        let slot = if self.classes.is_oversized(index) {
            buckets.take_oversized(arena, index)
        } else {
            buckets.pop_regular(arena, index)
        }?;
        let size_class = arena.entry(slot)?.size_class;
        budget.refund(size_class);
        let generation = arena.mark_in_use(slot);
        drop(state);

        self.stats.recycle();
        tracing::trace!(pool = %self.id, slot, requested_class = index, size_class, "recycled block");
        Some(self.handle(slot, generation, size_class))
    }

    /// Carves a fresh block from the system. Touches no bucket or budget
    /// state.
    fn carve(&self, class: SizeClass) -> PoolResult<BlockHandle> {
        let out_of_memory = PoolError::OutOfMemory {
            bytes: class.block_bytes,
        };
        let payload: Payload = Arc::new(Mutex::new(
            carve_payload(class.payload_len()).ok_or_else(|| out_of_memory.clone())?,
        ));

        let mut spare: Option<ArenaStorage> = None;
        let inserted = loop {
            let mut state = self.state.lock();
            let retired = spare.take().map(|storage| state.arena.adopt(storage));
            if state.arena.has_room() {
                let inserted = state.arena.insert(class.index, payload);
                drop(state);
                drop(retired);
                break inserted;
            }
            let capacity = state.arena.grown_capacity();
            drop(state);
            drop(retired);
            spare = Some(ArenaStorage::with_capacity(capacity).map_err(|_| out_of_memory.clone())?);
        };
        let (slot, generation) = inserted.map_err(|payload| {
            drop(payload);
            out_of_memory
        })?;

        self.stats.system_alloc();
        tracing::trace!(pool = %self.id, slot, size_class = class.index, bytes = class.block_bytes, "carved block");
        Ok(self.handle(slot, generation, class.index))
    }

    fn handle(&self, slot: u32, generation: u32, size_class: usize) -> BlockHandle {
        BlockHandle {
            pool: self.id,
            slot,
            generation,
            // Classes are bounded by max_units, validated to fit in u32.
            size_class: u32::try_from(size_class).unwrap_or(u32::MAX),
        }
    }

    fn check_owner(&self, handle: &BlockHandle) -> PoolResult<()> {
        if handle.pool == self.id {
            Ok(())
        } else {
            Err(PoolError::ForeignBlock {
                owner: handle.pool.get(),
                pool: self.id.get(),
            })
        }
    }

    /// Returns a block to the pool. `None` is a no-op.
    ///
    /// The block is retained for reuse if the budget allows, otherwise it
    /// goes back to the system.
    ///
    /// # Errors
    ///
    /// [`PoolError::DoubleFree`] if the block was already released,
    /// [`PoolError::ForeignBlock`] if another pool produced it.
    pub fn release(&self, handle: impl Into<Option<BlockHandle>>) -> PoolResult<()> {
        match handle.into() {
            Some(handle) => self.release_chain([handle]),
            None => Ok(()),
        }
    }

    /// Returns several blocks to the pool under one lock acquisition.
    ///
    /// The chain is validated as a whole first: if any handle is foreign,
    /// already released, or repeated within the chain, nothing is released.
    ///
    /// # Errors
    ///
    /// [`PoolError::DoubleFree`] or [`PoolError::ForeignBlock`] for the
    /// first offending handle.
    pub fn release_chain<I>(&self, chain: I) -> PoolResult<()>
    where
        I: IntoIterator<Item = BlockHandle>,
    {
        let chain: Vec<BlockHandle> = chain.into_iter().collect();
        if chain.is_empty() {
            return Ok(());
        }
        for handle in &chain {
            self.check_owner(handle)?;
        }
        let mut slots: Vec<u32> = chain.iter().map(BlockHandle::slot).collect();
        slots.sort_unstable();
        if let Some(pair) = slots.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(PoolError::DoubleFree { slot: pair[0] });
        }

        let mut evicted: Vec<Payload> = Vec::with_capacity(chain.len());
        {
            let mut state = self.state.lock();
            let PoolState {
                arena,
                buckets,
                budget,
            } = &mut *state;

            if let Some(stale) = chain.iter().find(|handle| arena.live(handle).is_none()) {
                return Err(PoolError::DoubleFree { slot: stale.slot });
            }

            for handle in &chain {
                let size_class = arena.entry(handle.slot).map_or(0, |entry| entry.size_class);
                arena.mark_free(handle.slot);
                if budget.admits(size_class) {
                    buckets.push(arena, handle.slot, size_class);
                    budget.charge(size_class);
                } else if let Some(payload) = arena.remove(handle.slot) {
                    evicted.push(payload);
                }
            }
        }

        let released = chain.len() - evicted.len();
        let returned = evicted.len();
        drop(evicted);

        if returned > 0 {
            self.stats.evict(returned);
            self.stats.system_free(returned);
        }
        tracing::trace!(pool = %self.id, released, returned, "released blocks");
        Ok(())
    }

    /// Locks a block's payload for exclusive access.
    ///
    /// Blocks until any other holder unlocks. Must not be held by the same
    /// thread across a second `lock` of the same block.
    ///
    /// # Errors
    ///
    /// [`PoolError::StaleHandle`] if the block is no longer allocated,
    /// [`PoolError::ForeignBlock`] if another pool produced it.
    pub fn lock(&self, handle: BlockHandle) -> PoolResult<BlockGuard> {
        let payload = self.live_payload(&handle)?;
        Ok(BlockGuard::acquire(&payload))
    }

    /// Like [`lock`](Self::lock) but returns `Ok(None)` instead of waiting.
    ///
    /// # Errors
    ///
    /// Same as [`lock`](Self::lock).
    pub fn try_lock(&self, handle: BlockHandle) -> PoolResult<Option<BlockGuard>> {
        let payload = self.live_payload(&handle)?;
        Ok(BlockGuard::try_acquire(&payload))
    }

    /// Payload of a live block, looked up under the pool lock and returned
    /// without taking the block lock.
    pub(crate) fn live_payload(&self, handle: &BlockHandle) -> PoolResult<Payload> {
        self.check_owner(handle)?;
        let state = self.state.lock();
        state
            .arena
            .live(handle)
            .map(|entry| Arc::clone(&entry.payload))
            .ok_or(PoolError::StaleHandle { slot: handle.slot })
    }

    /// Changes the retention capacity (bytes, 0 = unlimited).
    ///
    /// Retained blocks are evicted largest-first until the free memory fits
    /// the new ceiling.
    pub fn set_capacity(&self, capacity: usize) -> TrimReport {
        let ceiling = self.classes.units_for_bytes(capacity);
        {
            let mut state = self.state.lock();
            let resident = state.buckets.resident_units();
            state.budget.reset(ceiling, resident);
        }

        let report = self.evict_largest_while(|buckets| ceiling != 0 && buckets.resident_units() > ceiling);
        tracing::debug!(pool = %self.id, budget_units = ceiling, blocks = report.blocks, bytes = report.bytes, "capacity changed");
        report
    }

    /// Returns every retained free block to the system.
    ///
    /// Blocks released by other threads while the trim runs may be evicted
    /// as well.
    pub fn trim(&self) -> TrimReport {
        let report = self.evict_largest_while(|buckets| buckets.free_blocks() > 0);
        tracing::debug!(pool = %self.id, blocks = report.blocks, bytes = report.bytes, "pool trimmed");
        report
    }

    /// Evicts the largest free block, one per lock acquisition, while
    /// `over` holds. Each payload is dropped with the lock released.
    fn evict_largest_while(&self, over: impl Fn(&BucketTable) -> bool) -> TrimReport {
        let mut report = TrimReport::default();
        loop {
            let evicted = {
                let mut state = self.state.lock();
                let PoolState {
                    arena,
                    buckets,
                    budget,
                } = &mut *state;

                if over(buckets) {
                    let evicted = buckets.pop_largest(arena).and_then(|slot| {
                        let size_class = arena.entry(slot)?.size_class;
                        arena.remove(slot).map(|payload| (size_class, payload))
                    });
                    budget.reset(budget.ceiling(), buckets.resident_units());
                    evicted
                } else {
                    None
                }
            };

            let Some((size_class, payload)) = evicted else {
                break;
            };
            drop(payload);
            report.blocks += 1;
            report.bytes += self.classes.block_bytes(size_class);
        }
        self.stats.system_free(report.blocks);
        report
    }

    /// Read-only view of bucket occupancy and budget.
    #[must_use]
    pub fn snapshot(&self) -> PoolSnapshot {
        let mut lengths: Vec<usize> = Vec::with_capacity(self.classes.bucket_count());
        let mut classes: Vec<usize> = Vec::new();

        let (highest_non_empty, budget_ceiling, budget_available) = loop {
            let state = self.state.lock();
            let free = state.buckets.free_blocks();
            if free <= classes.capacity() {
                state.buckets.write_classes(&state.arena, &mut lengths, &mut classes);
                break (
                    state.buckets.highest_non_empty(),
                    state.budget.ceiling(),
                    state.budget.available(),
                );
            }
            drop(state);
            classes.reserve_exact(free);
        };

        let mut rest = classes.as_slice();
        let buckets = lengths
            .iter()
            .map(|&len| {
                let (bucket, tail) = rest.split_at(len);
                rest = tail;
                bucket.to_vec()
            })
            .collect();

        PoolSnapshot {
            highest_non_empty,
            budget_ceiling,
            budget_available,
            boundary_size: self.classes.boundary_size(),
            buckets,
        }
    }

    /// Emits the current snapshot at `debug` level.
    pub fn log_snapshot(&self) {
        let snapshot = self.snapshot();
        tracing::debug!(pool = %self.id, "pool snapshot\n{snapshot}");
    }

    /// Diagnostic counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let live = self.state.lock().arena.in_use();
        self.stats.snapshot(live)
    }

    /// Destroys the pool, returning every block to the system.
    ///
    /// Blocks still held by callers are freed as well; their handles become
    /// stale. A payload that is locked at this moment stays valid until its
    /// guard is dropped.
    ///
    /// # Errors
    ///
    /// [`PoolError::OutstandingBlocks`] if any block was never released.
    /// The pool is destroyed regardless.
    pub fn destroy(self) -> PoolResult<()> {
        let arena = {
            let mut state = self.state.lock();
            let PoolState {
                arena,
                buckets,
                budget,
            } = &mut *state;
            buckets.clear();
            budget.reset(budget.ceiling(), 0);
            mem::take(arena)
        };

        let (freed, outstanding) = arena.release_all();
        self.stats.system_free(freed);

        if outstanding > 0 {
            tracing::error!(pool = %self.id, outstanding, "pool destroyed with blocks still in use");
            return Err(PoolError::OutstandingBlocks { count: outstanding });
        }
        tracing::debug!(pool = %self.id, freed, "pool destroyed");
        Ok(())
    }
}

impl std::fmt::Debug for SegregatedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegregatedPool")
            .field("id", &self.id)
            .field("classes", &self.classes)
            .finish_non_exhaustive()
    }
}
