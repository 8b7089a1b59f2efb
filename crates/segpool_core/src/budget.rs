//! Retention budget, in boundary units.

/// How much free memory the pool may keep before returning blocks to the
/// system. A ceiling of zero means unlimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Budget {
    ceiling: usize,
    available: usize,
}

impl Budget {
    pub(crate) const fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            available: ceiling,
        }
    }

    #[inline]
    pub(crate) const fn ceiling(&self) -> usize {
        self.ceiling
    }

    #[inline]
    pub(crate) const fn available(&self) -> usize {
        self.available
    }

    #[inline]
    pub(crate) const fn is_unlimited(&self) -> bool {
        self.ceiling == 0
    }

    /// True if a released block of `size_class` may stay in the pool.
    #[inline]
    pub(crate) const fn admits(&self, size_class: usize) -> bool {
        self.is_unlimited() || size_class <= self.available
    }

    /// A block entered the pool.
    #[inline]
    pub(crate) fn charge(&mut self, size_class: usize) {
        self.available = self.available.saturating_sub(size_class);
    }

    /// A block left the pool.
    #[inline]
    pub(crate) fn refund(&mut self, size_class: usize) {
        self.available = self.available.saturating_add(size_class).min(self.ceiling);
    }

    /// Installs a new ceiling given the units currently resident.
    pub(crate) fn reset(&mut self, ceiling: usize, resident: usize) {
        self.ceiling = ceiling;
        self.available = ceiling.saturating_sub(resident);
    }
}
