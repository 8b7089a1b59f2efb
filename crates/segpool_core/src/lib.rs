//! # SEGPOOL Core
//!
//! Capacity-bounded memory pool built on segregated free lists.
//!
//! - Requests are rounded to a size class (a multiple of the boundary size)
//! - Freed blocks are kept per class and handed out again
//! - A retention budget caps how much free memory the pool keeps; releases
//!   beyond it go straight back to the system
//! - Blocks larger than the largest tracked class share one sorted overflow
//!   list
//!
//! ## Example
//!
//! ```rust,ignore
//! use segpool_core::{PoolConfig, SegregatedPool};
//!
//! // 1 MiB budget, 64 classes of 4 KiB, 8 KiB floor, 512-unit maximum
//! let pool = SegregatedPool::new(PoolConfig::new(1 << 20, 64, 8192, 512, 12))?;
//!
//! let handle = pool.allocate(10_000)?;
//! pool.lock(handle)?.fill(0xAB);
//! pool.release(handle)?;
//!
//! // Same class again: served from the free list, no system allocation
//! let again = pool.allocate(10_000)?;
//! assert_eq!(again.slot(), handle.slot());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

mod arena;
pub mod block;
mod bucket;
mod budget;
pub mod config;
pub mod error;
pub mod global;
pub mod pool;
pub mod size_class;
pub mod snapshot;
pub mod stats;

pub use block::{BlockGuard, BlockHandle, PoolId};
pub use config::PoolConfig;
pub use error::{PoolError, PoolResult};
pub use pool::{SegregatedPool, TrimReport};
pub use size_class::{SizeClass, SizeClassMap, BLOCK_HEADER_SIZE};
pub use snapshot::PoolSnapshot;
pub use stats::PoolStats;
