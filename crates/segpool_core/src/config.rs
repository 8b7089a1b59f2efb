//! # Pool Configuration
//!
//! Creation parameters for a [`SegregatedPool`](crate::SegregatedPool).
//!
//! Configurations are plain values. They can be built in code, taken from
//! [`PoolConfig::default`], or loaded once at startup from a TOML file where
//! every missing key falls back to the default:
//!
//! ```toml
//! capacity = 1048576     # bytes of free memory to retain, 0 = unlimited
//! bucket_count = 64
//! min_alloc_size = 4096
//! max_units = 512
//! boundary_shift = 12    # 4 KiB granularity
//! ```

use crate::error::{PoolError, PoolResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of tracked size classes in the default configuration.
pub const DEFAULT_BUCKET_COUNT: usize = 256;
/// Smallest block handed out by the default configuration (8 KiB).
pub const DEFAULT_MIN_ALLOC_SIZE: usize = 8192;
/// Largest size class accepted by the default configuration.
pub const DEFAULT_MAX_UNITS: usize = 2048;
/// Granularity exponent of the default configuration (4 KiB).
pub const DEFAULT_BOUNDARY_SHIFT: u32 = 12;
/// Capacity value meaning "retain any amount of free memory".
pub const CAPACITY_UNLIMITED: usize = 0;

/// Largest accepted `boundary_shift`: 4 GiB granularity, narrower where
/// `usize` cannot hold it.
const MAX_BOUNDARY_SHIFT: u32 = if usize::BITS - 1 < 32 {
    usize::BITS - 1
} else {
    32
};

/// Configuration for a segregated pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum free memory to retain, in bytes. `0` means unlimited.
    pub capacity: usize,
    /// Number of tracked size classes.
    pub bucket_count: usize,
    /// Floor applied to every block size, in bytes.
    pub min_alloc_size: usize,
    /// Largest size class a single allocation may map to.
    pub max_units: usize,
    /// Block sizes are multiples of `1 << boundary_shift` bytes.
    pub boundary_shift: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: CAPACITY_UNLIMITED,
            bucket_count: DEFAULT_BUCKET_COUNT,
            min_alloc_size: DEFAULT_MIN_ALLOC_SIZE,
            max_units: DEFAULT_MAX_UNITS,
            boundary_shift: DEFAULT_BOUNDARY_SHIFT,
        }
    }
}

impl PoolConfig {
    /// Creates a configuration from its five creation parameters.
    #[must_use]
    pub const fn new(
        capacity: usize,
        bucket_count: usize,
        min_alloc_size: usize,
        max_units: usize,
        boundary_shift: u32,
    ) -> Self {
        Self {
            capacity,
            bucket_count,
            min_alloc_size,
            max_units,
            boundary_shift,
        }
    }

    /// Returns a copy with a different retention capacity (bytes).
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Boundary size in bytes, or 0 if `boundary_shift` is wider than
    /// `usize`.
    #[inline]
    #[must_use]
    pub const fn boundary_size(&self) -> usize {
        match 1usize.checked_shl(self.boundary_shift) {
            Some(size) => size,
            None => 0,
        }
    }

    /// Checks that no parameter is nonsensical.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidArgument`] naming the first bad field.
    pub fn validate(&self) -> PoolResult<()> {
        if self.bucket_count == 0 {
            return Err(PoolError::InvalidArgument(
                "bucket_count must be greater than zero".into(),
            ));
        }
        if self.min_alloc_size == 0 {
            return Err(PoolError::InvalidArgument(
                "min_alloc_size must be greater than zero".into(),
            ));
        }
        if self.max_units == 0 {
            return Err(PoolError::InvalidArgument(
                "max_units must be greater than zero".into(),
            ));
        }
        if self.boundary_shift > MAX_BOUNDARY_SHIFT {
            return Err(PoolError::InvalidArgument(format!(
                "boundary_shift {} exceeds {MAX_BOUNDARY_SHIFT}",
                self.boundary_shift
            )));
        }
        // Size classes are stored as u32 inside handles.
        if u32::try_from(self.max_units).is_err() || u32::try_from(self.bucket_count).is_err() {
            return Err(PoolError::InvalidArgument(
                "bucket_count and max_units must fit in 32 bits".into(),
            ));
        }
        let boundary = self.boundary_size();
        if self.min_alloc_size.checked_add(boundary - 1).is_none()
            || self.capacity.checked_add(boundary - 1).is_none()
        {
            return Err(PoolError::InvalidArgument(
                "min_alloc_size or capacity overflows when aligned".into(),
            ));
        }
        Ok(())
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the text is not valid TOML
    /// for this structure. Values are not validated here.
    pub fn from_toml_str(text: &str) -> PoolResult<Self> {
        toml::from_str(text).map_err(|e| PoolError::InvalidConfig(format!("Failed to parse: {e}")))
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the file cannot be read or
    /// parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> PoolResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PoolError::InvalidConfig(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if serialization fails.
    pub fn to_toml_string(&self) -> PoolResult<String> {
        toml::to_string(self).map_err(|e| PoolError::InvalidConfig(format!("Failed to serialize: {e}")))
    }
}
