//! # Concurrency Tests
//!
//! Many threads sharing one pool:
//!
//! 1. **Exclusivity**: no block is ever held by two callers at once
//! 2. **Budget**: the retention ceiling holds under contention
//! 3. **Determinism**: the state depends only on the order calls reached
//!    the pool, so a logged multi-thread order replays to the same state
//! 4. **Lock ordering**: waiting on a block lock never stalls the pool

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use segpool_core::{BlockHandle, PoolConfig, SegregatedPool};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const THREADS: usize = 8;
const OPS_PER_THREAD: usize = 2_000;

fn shared_pool(capacity: usize) -> Arc<SegregatedPool> {
    Arc::new(SegregatedPool::new(PoolConfig::new(capacity, 16, 64, 64, 6)).unwrap())
}

// ============================================================================
// EXCLUSIVITY
// ============================================================================

#[test]
fn blocks_are_never_shared_between_threads() {
    let capacity_units = 64;
    let pool = shared_pool(capacity_units * 64);
    let owned: Arc<Mutex<HashSet<u32>>> = Arc::new(Mutex::new(HashSet::new()));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let pool = Arc::clone(&pool);
            let owned = Arc::clone(&owned);

            thread::spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(t as u64);
                let tag = u8::try_from(t + 1).unwrap();
                let mut live: Vec<(BlockHandle, usize)> = Vec::new();

                for _ in 0..OPS_PER_THREAD {
                    if live.is_empty() || (live.len() < 16 && rng.gen_bool(0.5)) {
                        let size = rng.gen_range(1..48 * 64);
                        let handle = pool.allocate(size).unwrap();
                        assert!(owned.lock().insert(handle.slot()), "slot {} handed out twice", handle.slot());

                        pool.lock(handle).unwrap()[..size].fill(tag);
                        live.push((handle, size));
                    } else {
                        let (handle, size) = live.swap_remove(rng.gen_range(0..live.len()));
                        assert!(pool.lock(handle).unwrap()[..size].iter().all(|&b| b == tag));

                        // Give up ownership before the slot can be reissued.
                        assert!(owned.lock().remove(&handle.slot()));
                        pool.release(handle).unwrap();
                    }
                }

                for (handle, _) in live {
                    assert!(owned.lock().remove(&handle.slot()));
                    pool.release(handle).unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert!(owned.lock().is_empty());
    let snapshot = pool.snapshot();
    assert!(snapshot.resident_units() <= capacity_units);
    assert_eq!(snapshot.budget_available, capacity_units - snapshot.resident_units());
    assert_eq!(snapshot.highest_non_empty, snapshot.true_highest_non_empty());

    let stats = pool.stats();
    assert_eq!(stats.live_blocks, 0);
    assert_eq!(stats.system_allocs, stats.system_frees + snapshot.free_blocks() as u64);
}

// ============================================================================
// REPLAY
// ============================================================================

#[derive(Clone, Copy, Debug)]
enum Op {
    Allocate { id: usize, size: usize },
    Release { id: usize },
}

/// Each call is made under the log lock, so the pool sees one call at a
/// time in exactly the logged order. Overlapping calls are covered by
/// `blocks_are_never_shared_between_threads`.
#[test]
fn interleaved_run_replays_to_same_state() {
    let pool = shared_pool(32 * 64);
    let log: Arc<Mutex<Vec<Op>>> = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let pool = Arc::clone(&pool);
            let log = Arc::clone(&log);

            thread::spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(1_000 + t as u64);
                let mut live: Vec<(usize, BlockHandle)> = Vec::new();

                for _ in 0..500 {
                    // Serializes pool calls so the log order is the pool's order.
                    let mut log = log.lock();
                    if live.is_empty() || rng.gen_bool(0.5) {
                        let size = rng.gen_range(0..40 * 64);
                        let handle = pool.allocate(size).unwrap();
                        let id = log.len();
                        log.push(Op::Allocate { id, size });
                        live.push((id, handle));
                    } else {
                        let (id, handle) = live.swap_remove(rng.gen_range(0..live.len()));
                        pool.release(handle).unwrap();
                        log.push(Op::Release { id });
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let replay = SegregatedPool::new(PoolConfig::new(32 * 64, 16, 64, 64, 6)).unwrap();
    let mut issued: HashMap<usize, BlockHandle> = HashMap::new();
    for op in log.lock().iter() {
        match *op {
            Op::Allocate { id, size } => {
                issued.insert(id, replay.allocate(size).unwrap());
            }
            Op::Release { id } => {
                replay.release(issued.remove(&id).unwrap()).unwrap();
            }
        }
    }

    assert_eq!(replay.snapshot(), pool.snapshot());
    assert_eq!(replay.stats(), pool.stats());
}

// ============================================================================
// LOCK ORDERING
// ============================================================================

#[test]
fn waiting_on_block_lock_does_not_stall_pool() {
    let pool = shared_pool(0);
    let contended = pool.allocate(100).unwrap();
    let barrier = Arc::new(Barrier::new(2));

    let waiter = {
        let pool = Arc::clone(&pool);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            let payload = pool.lock(contended).unwrap();
            payload[0]
        })
    };

    let mut guard = pool.lock(contended).unwrap();
    barrier.wait();
    thread::sleep(Duration::from_millis(20));

    // The waiter is parked on the block lock; the pool lock stays free.
    for size in [10, 500, 2_000] {
        let handle = pool.allocate(size).unwrap();
        pool.lock(handle).unwrap().fill(1);
        pool.release(handle).unwrap();
    }
    let _ = pool.snapshot();
    guard[0] = 0x5A;
    drop(guard);

    assert_eq!(waiter.join().unwrap(), 0x5A);
    pool.release(contended).unwrap();
}

#[test]
fn release_while_another_thread_holds_the_guard() {
    let pool = shared_pool(0);
    let handle = pool.allocate(64).unwrap();
    let barrier = Arc::new(Barrier::new(2));

    let holder = {
        let pool = Arc::clone(&pool);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let mut guard = pool.lock(handle).unwrap();
            barrier.wait();
            barrier.wait();
            // The payload stays valid while locked even though the handle is released.
            guard.fill(7);
            guard.iter().all(|&b| b == 7)
        })
    };

    barrier.wait();
    pool.release(handle).unwrap();
    assert!(pool.lock(handle).is_err());
    barrier.wait();

    assert!(holder.join().unwrap());
}
