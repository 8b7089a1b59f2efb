//! Read-only view of bucket occupancy.

use std::fmt;

/// Snapshot of a pool's free lists and budget, taken under the pool lock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// Largest bucket index recorded as non-empty.
    pub highest_non_empty: usize,
    /// Budget ceiling in boundary units (0 = unlimited).
    pub budget_ceiling: usize,
    /// Remaining budget in boundary units.
    pub budget_available: usize,
    /// Boundary size in bytes.
    pub boundary_size: usize,
    /// Resident size classes per bucket, in list order.
    pub buckets: Vec<Vec<usize>>,
}

impl PoolSnapshot {
    /// Total free blocks across all buckets.
    #[must_use]
    pub fn free_blocks(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// Sum of resident size classes, in boundary units.
    #[must_use]
    pub fn resident_units(&self) -> usize {
        self.buckets.iter().flatten().sum()
    }

    /// Largest bucket index that actually holds a block (0 when empty).
    #[must_use]
    pub fn true_highest_non_empty(&self) -> usize {
        self.buckets
            .iter()
            .rposition(|bucket| !bucket.is_empty())
            .unwrap_or(0)
    }
}

impl fmt::Display for PoolSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "highest non-empty bucket: {}", self.highest_non_empty)?;
        if self.budget_ceiling != 0 {
            let unit_kib = self.boundary_size / 1024;
            writeln!(
                f,
                "budget: {} of {} units available (unit {} bytes, {unit_kib} KiB)",
                self.budget_available, self.budget_ceiling, self.boundary_size
            )?;
        }
        for (index, bucket) in self.buckets.iter().enumerate() {
            write!(f, "[{index}]:\t")?;
            for class in bucket {
                write!(f, "->{class}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
