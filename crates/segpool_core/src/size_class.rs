//! # Size Classes
//!
//! Maps a requested payload size to the bucket it is served from.
//!
//! ```text
//!   requested ──► + BLOCK_HEADER_SIZE ──► align up to boundary ──► floor at min_alloc
//!                                                                        │
//!                                          index = bytes / boundary - 1 ◄┘
//! ```
//!
//! Class `i` blocks are exactly `(i + 1) * boundary` bytes including the
//! header, so any block of class `>= i` can serve a class `i` request.

use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};

/// Per-block bookkeeping overhead charged to every request.
pub const BLOCK_HEADER_SIZE: usize = 32;

/// Rounds `size` up to a multiple of `boundary` (a power of two).
///
/// Returns `None` on overflow.
#[inline]
#[must_use]
pub const fn align_up(size: usize, boundary: usize) -> Option<usize> {
    match size.checked_add(boundary - 1) {
        Some(padded) => Some(padded & !(boundary - 1)),
        None => None,
    }
}

/// A computed size class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeClass {
    /// Bucket index (`block_bytes / boundary - 1`).
    pub index: usize,
    /// Total block size in bytes, header included.
    pub block_bytes: usize,
}

impl SizeClass {
    /// Payload bytes a block of this class hands to the caller.
    #[inline]
    #[must_use]
    pub const fn payload_len(&self) -> usize {
        self.block_bytes.saturating_sub(BLOCK_HEADER_SIZE)
    }
}

/// Size-class arithmetic for one pool.
#[derive(Clone, Copy, Debug)]
pub struct SizeClassMap {
    boundary_shift: u32,
    boundary_size: usize,
    min_alloc_size: usize,
    max_units: usize,
    bucket_count: usize,
}

impl SizeClassMap {
    /// Builds the map for a validated configuration.
    ///
    /// `min_alloc_size` is rounded up to the boundary so every block of a
    /// class has the same length.
    pub(crate) fn new(config: &PoolConfig) -> Self {
        let boundary_size = config.boundary_size();
        let min_alloc_size =
            align_up(config.min_alloc_size, boundary_size).unwrap_or(config.min_alloc_size);
        Self {
            boundary_shift: config.boundary_shift,
            boundary_size,
            min_alloc_size,
            max_units: config.max_units,
            bucket_count: config.bucket_count,
        }
    }

    /// Boundary size in bytes.
    #[inline]
    #[must_use]
    pub const fn boundary_size(&self) -> usize {
        self.boundary_size
    }

    /// Number of tracked size classes.
    #[inline]
    #[must_use]
    pub const fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Largest accepted size class.
    #[inline]
    #[must_use]
    pub const fn max_units(&self) -> usize {
        self.max_units
    }

    /// Block floor in bytes, aligned to the boundary.
    #[inline]
    #[must_use]
    pub const fn min_alloc_size(&self) -> usize {
        self.min_alloc_size
    }

    /// Computes the size class serving a `requested`-byte payload.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TooLarge`] if the class exceeds `max_units` or
    /// the arithmetic overflows.
    pub fn classify(&self, requested: usize) -> PoolResult<SizeClass> {
        let too_large = |size_class| PoolError::TooLarge {
            requested,
            size_class,
            max_units: self.max_units,
        };

        let aligned = requested
            .checked_add(BLOCK_HEADER_SIZE)
            .and_then(|total| align_up(total, self.boundary_size))
            .ok_or_else(|| too_large(usize::MAX))?;
        let block_bytes = aligned.max(self.min_alloc_size);
        let index = (block_bytes >> self.boundary_shift) - 1;

        if index > self.max_units {
            return Err(too_large(index));
        }
        Ok(SizeClass { index, block_bytes })
    }

    /// Total block size of class `index`, header included.
    #[inline]
    #[must_use]
    pub const fn block_bytes(&self, index: usize) -> usize {
        (index + 1) << self.boundary_shift
    }

    /// Converts a byte budget to boundary units, rounding up.
    #[must_use]
    pub fn units_for_bytes(&self, bytes: usize) -> usize {
        align_up(bytes, self.boundary_size).map_or(usize::MAX >> self.boundary_shift, |b| {
            b >> self.boundary_shift
        })
    }

    /// True if class `index` has no bucket of its own and lives in bucket 0.
    #[inline]
    #[must_use]
    pub const fn is_oversized(&self, index: usize) -> bool {
        index >= self.bucket_count
    }
}
