//! # Process-Wide Pool
//!
//! Thin convenience layer holding one pool for the lifetime of the process.
//! Nothing in the crate depends on it; code that can pass a
//! [`SegregatedPool`] explicitly should do so.
//!
//! ```rust,ignore
//! segpool_core::global::init_default()?;
//! let handle = segpool_core::global::allocate(4096)?;
//! segpool_core::global::release(handle)?;
//! segpool_core::global::teardown()?;
//! ```

use crate::block::{BlockGuard, BlockHandle};
use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::pool::SegregatedPool;
use crate::snapshot::PoolSnapshot;
use parking_lot::RwLock;

static GLOBAL_POOL: RwLock<Option<SegregatedPool>> = RwLock::new(None);

fn with_pool<T>(f: impl FnOnce(&SegregatedPool) -> PoolResult<T>) -> PoolResult<T> {
    let guard = GLOBAL_POOL.read();
    let pool = guard.as_ref().ok_or(PoolError::NotInitialized)?;
    f(pool)
}

/// Installs the process-wide pool.
///
/// # Errors
///
/// [`PoolError::AlreadyInitialized`] if a pool is installed, or any error
/// from [`SegregatedPool::new`].
pub fn init(config: PoolConfig) -> PoolResult<()> {
    if is_initialized() {
        return Err(PoolError::AlreadyInitialized);
    }
    let pool = SegregatedPool::new(config)?;

    let mut slot = GLOBAL_POOL.write();
    if slot.is_some() {
        drop(slot);
        drop(pool);
        return Err(PoolError::AlreadyInitialized);
    }
    *slot = Some(pool);
    Ok(())
}

/// Installs the process-wide pool with the default configuration.
///
/// # Errors
///
/// Same as [`init`].
pub fn init_default() -> PoolResult<()> {
    init(PoolConfig::default())
}

/// True if a process-wide pool is installed.
#[must_use]
pub fn is_initialized() -> bool {
    GLOBAL_POOL.read().is_some()
}

/// Allocates from the process-wide pool.
///
/// # Errors
///
/// [`PoolError::NotInitialized`], or any error from
/// [`SegregatedPool::allocate`].
pub fn allocate(size: usize) -> PoolResult<BlockHandle> {
    with_pool(|pool| pool.allocate(size))
}

/// Releases a block to the process-wide pool. `None` is a no-op.
///
/// # Errors
///
/// [`PoolError::NotInitialized`], or any error from
/// [`SegregatedPool::release`].
pub fn release(handle: impl Into<Option<BlockHandle>>) -> PoolResult<()> {
    with_pool(|pool| pool.release(handle))
}

/// Locks a block of the process-wide pool.
///
/// The global slot is released before waiting on the block, so other
/// threads can keep using (or tear down) the pool meanwhile.
///
/// # Errors
///
/// [`PoolError::NotInitialized`], or any error from
/// [`SegregatedPool::lock`].
pub fn lock(handle: BlockHandle) -> PoolResult<BlockGuard> {
    let payload = with_pool(|pool| pool.live_payload(&handle))?;
    Ok(BlockGuard::acquire(&payload))
}

/// Snapshot of the process-wide pool.
///
/// # Errors
///
/// [`PoolError::NotInitialized`].
pub fn snapshot() -> PoolResult<PoolSnapshot> {
    with_pool(|pool| Ok(pool.snapshot()))
}

/// Removes and destroys the process-wide pool.
///
/// # Errors
///
/// [`PoolError::NotInitialized`], or [`PoolError::OutstandingBlocks`] from
/// [`SegregatedPool::destroy`]. The pool is removed in both cases.
pub fn teardown() -> PoolResult<()> {
    let pool = GLOBAL_POOL.write().take().ok_or(PoolError::NotInitialized)?;
    pool.destroy()
}
