//! # Locked Wrapper
//!
//! Split and merge touch both indices together, and trimming performs a
//! lookup, a possible split, a state change, and up to two merges that must
//! all observe one consistent view. The safe concurrency discipline is
//! therefore a single exclusive lock held for the entire duration of each
//! public operation, which this wrapper provides. Observers run inside the
//! lock and must not re-enter the allocator.

use spin::Mutex;

use crate::allocator::RegionAllocator;
use crate::error::Result;
use crate::region::RegionState;
use crate::rng::RandomSource;
use crate::types::Address;

/// A [`RegionAllocator`] guarded by a [`spin::Mutex`], one lock acquisition
/// per operation.
///
/// No reference derived from one acquisition survives into the next, so a
/// region merged away by a concurrent caller can never be observed stale.
#[derive(Debug)]
pub struct LockedRegionAllocator {
    inner: Mutex<RegionAllocator>,
}

impl LockedRegionAllocator {
    /// Wrap an allocator. See [`RegionAllocator::new`] for the range
    /// preconditions.
    pub fn new(allocator: RegionAllocator) -> Self {
        Self {
            inner: Mutex::new(allocator),
        }
    }

    /// See [`RegionAllocator::allocate_region`].
    pub fn allocate_region(&self, size: u64) -> Address {
        self.inner.lock().allocate_region(size)
    }

    /// See [`RegionAllocator::allocate_region_at`].
    pub fn allocate_region_at(&self, address: Address, size: u64, state: RegionState) -> Result<()> {
        self.inner.lock().allocate_region_at(address, size, state)
    }

    /// See [`RegionAllocator::allocate_aligned_region`].
    pub fn allocate_aligned_region(&self, size: u64, alignment: u64) -> Address {
        self.inner.lock().allocate_aligned_region(size, alignment)
    }

    /// See [`RegionAllocator::allocate_region_with_hint`].
    pub fn allocate_region_with_hint(&self, hint: Address, size: u64, alignment: u64) -> Address {
        self.inner
            .lock()
            .allocate_region_with_hint(hint, size, alignment)
    }

    /// See [`RegionAllocator::allocate_region_randomized`].
    pub fn allocate_region_randomized(&self, rng: &mut dyn RandomSource, size: u64) -> Address {
        self.inner.lock().allocate_region_randomized(rng, size)
    }

    /// See [`RegionAllocator::free_region`].
    pub fn free_region(&self, address: Address) -> u64 {
        self.inner.lock().free_region(address)
    }

    /// See [`RegionAllocator::trim_region`].
    pub fn trim_region(&self, address: Address, new_size: u64) -> u64 {
        self.inner.lock().trim_region(address, new_size)
    }

    /// See [`RegionAllocator::check_region`].
    pub fn check_region(&self, address: Address) -> u64 {
        self.inner.lock().check_region(address)
    }

    /// See [`RegionAllocator::is_free`].
    pub fn is_free(&self, address: Address, size: u64) -> bool {
        self.inner.lock().is_free(address, size)
    }

    /// Sum of the sizes of all free regions.
    pub fn free_bytes(&self) -> u64 {
        self.inner.lock().free_bytes()
    }

    /// Run `f` with exclusive access to the allocator, for compound
    /// operations and diagnostics (e.g. the `Display` dump).
    pub fn with<R>(&self, f: impl FnOnce(&mut RegionAllocator) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ALLOCATION_FAILURE;

    const PAGE: u64 = 0x1000;

    #[test]
    fn test_locked_forwarding() {
        let allocator = LockedRegionAllocator::new(RegionAllocator::new(0x1000, 8 * PAGE, PAGE));

        let address = allocator.allocate_region(2 * PAGE);
        assert_ne!(address, ALLOCATION_FAILURE);
        assert_eq!(allocator.check_region(address), 2 * PAGE);
        assert_eq!(allocator.free_bytes(), 6 * PAGE);

        assert_eq!(allocator.free_region(address), 2 * PAGE);
        assert!(allocator.is_free(address, 2 * PAGE));

        let pages = allocator.with(|inner| inner.size() / inner.page_size());
        assert_eq!(pages, 8);
    }
}
