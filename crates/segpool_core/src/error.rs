//! # Pool Error Types
//!
//! All errors that can occur in the memory pool.

use thiserror::Error;

/// Errors that can occur in the memory pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The request maps to a size class above the configured maximum.
    #[error("request of {requested} bytes maps to size class {size_class}, maximum is {max_units}")]
    TooLarge {
        /// Requested payload size in bytes.
        requested: usize,
        /// Size class the request computed to (saturated on overflow).
        size_class: usize,
        /// Configured maximum size class.
        max_units: usize,
    },

    /// The system refused to provide memory.
    #[error("out of memory: could not obtain {bytes} bytes from the system")]
    OutOfMemory {
        /// Number of bytes that were requested from the system.
        bytes: usize,
    },

    /// The block was already released (or released and handed out again).
    #[error("double free of block in slot {slot}")]
    DoubleFree {
        /// Arena slot of the offending handle.
        slot: u32,
    },

    /// The handle was produced by a different pool.
    #[error("block belongs to pool {owner}, not pool {pool}")]
    ForeignBlock {
        /// Pool that issued the handle.
        owner: u64,
        /// Pool the handle was presented to.
        pool: u64,
    },

    /// The handle no longer refers to a live block.
    #[error("stale handle for slot {slot}")]
    StaleHandle {
        /// Arena slot of the offending handle.
        slot: u32,
    },

    /// Creation parameters are malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration file could not be read or parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The pool was destroyed while blocks were still allocated.
    #[error("pool destroyed with {count} blocks still in use")]
    OutstandingBlocks {
        /// Number of blocks the caller never released.
        count: usize,
    },

    /// The process-wide pool has not been initialized.
    #[error("global pool is not initialized")]
    NotInitialized,

    /// The process-wide pool is already initialized.
    #[error("global pool is already initialized")]
    AlreadyInitialized,
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
