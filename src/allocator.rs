//! # Region Allocator
//!
//! The orchestrator over one contiguous, page-aligned address range. It is
//! the only component that creates, splits, merges, or destroys regions,
//! and every public operation leaves the bookkeeping in a consistent state:
//! the regions always partition the whole range exactly, and no two
//! adjacent regions are ever both free.

use alloc::boxed::Box;
use core::fmt;

use crate::error::{Error, Result};
use crate::index::{AllRegionsIndex, FreeRegionsIndex, RegionArena};
use crate::region::{Region, RegionId, RegionState};
use crate::rng::RandomSource;
use crate::types::{self, ALLOCATION_FAILURE, Address};

/// Observer invoked synchronously before a split or merge commits.
///
/// Receives `(begin, new_size)` for splits and `(begin, new_total_size)`
/// for merges. A commit-tracking layer can use these to commit or decommit
/// backing memory lazily. Observers must not re-enter the allocator.
pub type RegionObserver = Box<dyn FnMut(Address, u64) + Send>;

/// Retry bound for randomized placement.
const MAX_RANDOMIZATION_ATTEMPTS: usize = 3;

/// Fraction of the whole range (in percent) that must be free before
/// randomized placement is attempted.
const RANDOMIZATION_THRESHOLD_PERCENT: u64 = 40;

// =============================================================================
// REGION ALLOCATOR
// =============================================================================

/// Page-granular allocator over `[begin, begin + size)`.
///
/// Hands out sub-ranges whose sizes are multiples of the page size, with
/// best-fit-by-size search, alignment-constrained placement, optional
/// randomized placement, and coalescing of freed neighbors.
///
/// Not internally synchronized; see [`crate::locked::LockedRegionAllocator`]
/// for the lock-per-operation wrapper.
pub struct RegionAllocator {
    /// Start of the managed range.
    begin: Address,
    /// Total size of the managed range.
    size: u64,
    /// Allocation granularity, a power of two.
    page_size: u64,
    /// Minimum free bytes for randomized placement.
    randomization_threshold: u64,
    /// Sum of the sizes of all free regions.
    free_bytes: u64,
    /// Owns every live region.
    arena: RegionArena,
    /// All regions, ordered by end address.
    all_regions: AllRegionsIndex,
    /// Free regions, ordered by `(size, begin)`.
    free_regions: FreeRegionsIndex,
    on_split: Option<RegionObserver>,
    on_merge: Option<RegionObserver>,
}

impl RegionAllocator {
    /// Create an allocator over `[begin, begin + size)`.
    ///
    /// # Panics
    ///
    /// Panics when `page_size` is not a power of two, `size` is not a
    /// positive multiple of `page_size`, `begin` is not page-aligned, or
    /// the range wraps the address space.
    pub fn new(begin: Address, size: u64, page_size: u64) -> Self {
        assert!(page_size.is_power_of_two(), "page size must be a power of two");
        assert!(size > 0, "range size must be positive");
        assert!(
            types::is_aligned(size, page_size),
            "range size must be a multiple of the page size"
        );
        assert!(
            types::is_aligned(begin, page_size),
            "range base must be page-aligned"
        );
        assert!(begin.checked_add(size).is_some(), "address range wraps");

        let mut arena = RegionArena::new();
        let mut all_regions = AllRegionsIndex::new();
        let mut free_regions = FreeRegionsIndex::new();

        let whole = arena.insert(Region::new(begin, size, RegionState::Free));
        all_regions.insert(begin + size, whole);
        free_regions.insert(size, begin, whole);

        Self {
            begin,
            size,
            page_size,
            randomization_threshold: size / 100 * RANDOMIZATION_THRESHOLD_PERCENT,
            free_bytes: size,
            arena,
            all_regions,
            free_regions,
            on_split: None,
            on_merge: None,
        }
    }

    /// Attach a split observer.
    pub fn with_split_observer(mut self, observer: RegionObserver) -> Self {
        self.on_split = Some(observer);
        self
    }

    /// Attach a merge observer.
    pub fn with_merge_observer(mut self, observer: RegionObserver) -> Self {
        self.on_merge = Some(observer);
        self
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Start of the managed range.
    #[inline]
    pub fn begin(&self) -> Address {
        self.begin
    }

    /// End of the managed range (exclusive).
    #[inline]
    pub fn end(&self) -> Address {
        self.begin + self.size
    }

    /// Total size of the managed range.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Allocation granularity.
    #[inline]
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Sum of the sizes of all free regions.
    #[inline]
    pub fn free_bytes(&self) -> u64 {
        self.free_bytes
    }

    /// Check if `[address, address + size)` lies inside the managed range.
    #[inline]
    pub fn contains(&self, address: Address, size: u64) -> bool {
        address >= self.begin
            && address
                .checked_add(size)
                .is_some_and(|end| end <= self.end())
    }

    // =========================================================================
    // ALLOCATION
    // =========================================================================

    /// Allocate a region of `size` bytes anywhere in the range.
    ///
    /// Chooses the smallest free region that still fits, ties broken by
    /// lowest address, splitting it when oversized. Returns the region's
    /// start address, or [`ALLOCATION_FAILURE`] when no free region is
    /// large enough.
    ///
    /// # Panics
    ///
    /// Panics when `size` is not a positive multiple of the page size.
    pub fn allocate_region(&mut self, size: u64) -> Address {
        self.check_size(size);

        let Some(id) = self.free_regions.find_at_least(size) else {
            log::debug!("allocate_region: no free region of 0x{:x} bytes", size);
            return ALLOCATION_FAILURE;
        };

        if self.arena.get(id).size() > size {
            self.split(id, size);
        }
        debug_assert_eq!(self.arena.get(id).size(), size);

        let address = self.arena.get(id).begin();
        self.commit_allocation(id, RegionState::Allocated);
        log::trace!("allocated [0x{:x}, 0x{:x})", address, address + size);
        address
    }

    /// Allocate `size` bytes at exactly `address`, tagging the region with
    /// `state` (`Allocated`, or `Excluded` to permanently reserve it).
    ///
    /// Fails with [`Error::RangeUnavailable`], leaving the structure
    /// untouched, when the span is not covered by a single free region.
    ///
    /// # Panics
    ///
    /// Panics when `address` or `size` is not page-aligned, `size` is
    /// zero, or `state` is `Free`.
    pub fn allocate_region_at(
        &mut self,
        address: Address,
        size: u64,
        state: RegionState,
    ) -> Result<()> {
        assert!(
            types::is_aligned(address, self.page_size),
            "address must be page-aligned"
        );
        self.check_size(size);
        assert!(state != RegionState::Free, "requested state must not be Free");

        let Some(requested_end) = address.checked_add(size) else {
            return Err(Error::RangeUnavailable);
        };

        // All checks happen before the first split, so failure never leaves
        // a partial split behind.
        let Some(found) = self.all_regions.find_containing(address, &self.arena) else {
            return Err(Error::RangeUnavailable);
        };
        {
            let region = self.arena.get(found);
            if !region.is_free() || region.end() < requested_end {
                log::debug!(
                    "allocate_region_at: [0x{:x}, 0x{:x}) unavailable",
                    address,
                    requested_end
                );
                return Err(Error::RangeUnavailable);
            }
        }

        let mut id = found;
        let region_begin = self.arena.get(id).begin();
        if region_begin != address {
            // Cut off the part before the requested address; the tail is ours.
            id = self.split(id, address - region_begin);
        }
        if self.arena.get(id).end() > requested_end {
            self.split(id, size);
        }
        debug_assert_eq!(self.arena.get(id).begin(), address);
        debug_assert_eq!(self.arena.get(id).size(), size);

        self.commit_allocation(id, state);
        log::trace!(
            "allocated [0x{:x}, 0x{:x}) at fixed address, state {}",
            address,
            requested_end,
            state.as_str()
        );
        Ok(())
    }

    /// Allocate `size` bytes whose start address is a multiple of
    /// `alignment`.
    ///
    /// Returns the aligned start address, or [`ALLOCATION_FAILURE`]. The
    /// allocated span is exactly `size` bytes; alignment padding stays
    /// free.
    ///
    /// # Panics
    ///
    /// Panics when `size` is not a positive multiple of the page size, or
    /// `alignment` is not a power of two at least the page size.
    pub fn allocate_aligned_region(&mut self, size: u64, alignment: u64) -> Address {
        self.check_size(size);
        assert!(
            alignment.is_power_of_two() && alignment >= self.page_size,
            "alignment must be a power of two no smaller than the page size"
        );

        // A region padded by `alignment - page_size` always has room for an
        // aligned cut. Fall back to an exact-size region, which only works
        // out when its begin already happens to be aligned closely enough.
        let padded_size = size + (alignment - self.page_size);
        let found = self
            .free_regions
            .find_at_least(padded_size)
            .or_else(|| self.free_regions.find_at_least(size));
        let Some(mut id) = found else {
            return ALLOCATION_FAILURE;
        };

        let (region_begin, region_end) = {
            let region = self.arena.get(id);
            (region.begin(), region.end())
        };
        let aligned_begin = types::align_up(region_begin, alignment);
        if aligned_begin + size > region_end {
            log::debug!(
                "allocate_aligned_region: no aligned fit for 0x{:x} @ 0x{:x}",
                size,
                alignment
            );
            return ALLOCATION_FAILURE;
        }

        if aligned_begin > region_begin {
            id = self.split(id, aligned_begin - region_begin);
        }
        if self.arena.get(id).size() > size {
            self.split(id, size);
        }
        debug_assert_eq!(self.arena.get(id).begin(), aligned_begin);
        debug_assert_eq!(self.arena.get(id).size(), size);

        self.commit_allocation(id, RegionState::Allocated);
        log::trace!(
            "allocated [0x{:x}, 0x{:x}) aligned to 0x{:x}",
            aligned_begin,
            aligned_begin + size,
            alignment
        );
        aligned_begin
    }

    /// Allocate `size` bytes, preferring to place the region at `hint`.
    ///
    /// A zero or out-of-range hint is ignored. When the hinted span is
    /// unavailable, falls back to aligned allocation when
    /// `alignment > page_size`, else to plain allocation.
    ///
    /// # Panics
    ///
    /// Panics when a non-zero in-range `hint` is not page-aligned, or on
    /// the delegated operations' contract violations.
    pub fn allocate_region_with_hint(
        &mut self,
        hint: Address,
        size: u64,
        alignment: u64,
    ) -> Address {
        if hint != 0
            && self.contains(hint, size)
            && self
                .allocate_region_at(hint, size, RegionState::Allocated)
                .is_ok()
        {
            return hint;
        }

        if alignment > self.page_size {
            self.allocate_aligned_region(size, alignment)
        } else {
            self.allocate_region(size)
        }
    }

    /// Allocate `size` bytes at a randomized position.
    ///
    /// Only attempted while at least 40% of the whole range is free;
    /// otherwise, and after a bounded number of collisions, falls back to
    /// deterministic best-fit allocation.
    ///
    /// # Panics
    ///
    /// Panics when `size` is not a positive multiple of the page size.
    pub fn allocate_region_randomized(
        &mut self,
        rng: &mut dyn RandomSource,
        size: u64,
    ) -> Address {
        self.check_size(size);

        if self.free_bytes >= self.randomization_threshold {
            let page_count = self.size / self.page_size;
            for _ in 0..MAX_RANDOMIZATION_ATTEMPTS {
                let offset = self.page_size * (rng.next_u64() % page_count);
                let address = self.begin + offset;
                if self
                    .allocate_region_at(address, size, RegionState::Allocated)
                    .is_ok()
                {
                    return address;
                }
            }
            log::debug!(
                "randomized placement of 0x{:x} bytes exhausted {} attempts",
                size,
                MAX_RANDOMIZATION_ATTEMPTS
            );
        }

        self.allocate_region(size)
    }

    // =========================================================================
    // FREEING
    // =========================================================================

    /// Free the allocated region beginning exactly at `address`.
    ///
    /// Returns the number of bytes freed, or 0 when no allocated region
    /// begins there.
    pub fn free_region(&mut self, address: Address) -> u64 {
        self.trim_region(address, 0)
    }

    /// Shrink the allocated region beginning exactly at `address` to
    /// `new_size` bytes, freeing the tail; `new_size == 0` frees the whole
    /// region.
    ///
    /// The freed part is coalesced with a free successor, and, when the
    /// whole region is freed, with a free predecessor, so the surviving
    /// region is always the lower-addressed one. Returns the number of
    /// bytes freed, or 0 when no allocated region begins at `address`.
    ///
    /// # Panics
    ///
    /// Panics when a non-zero `new_size` is not page-aligned or does not
    /// shrink the region.
    pub fn trim_region(&mut self, address: Address, new_size: u64) -> u64 {
        let Some(found) = self.all_regions.find_containing(address, &self.arena) else {
            return 0;
        };
        {
            let region = self.arena.get(found);
            if region.begin() != address || !region.is_allocated() {
                return 0;
            }
        }

        let mut id = found;
        if new_size > 0 {
            assert!(
                types::is_aligned(new_size, self.page_size),
                "new size must be page-aligned"
            );
            assert!(
                new_size < self.arena.get(id).size(),
                "new size must shrink the region"
            );
            // The kept head stays allocated; only the tail is freed.
            id = self.split(id, new_size);
        }

        let (freed_begin, freed_size) = {
            let region = self.arena.get(id);
            (region.begin(), region.size())
        };
        self.arena.get_mut(id).set_state(RegionState::Free);
        self.free_regions.insert(freed_size, freed_begin, id);
        self.free_bytes += freed_size;

        if let Some(next) = self.all_regions.successor(freed_begin + freed_size) {
            if self.arena.get(next).is_free() {
                self.merge(id, next);
            }
        }
        if new_size == 0 {
            if let Some(prev) = self.all_regions.predecessor(freed_begin) {
                if self.arena.get(prev).is_free() {
                    self.merge(prev, id);
                }
            }
        }

        log::trace!("freed [0x{:x}, 0x{:x})", freed_begin, freed_begin + freed_size);
        freed_size
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Size of the allocated region beginning exactly at `address`, or 0.
    pub fn check_region(&self, address: Address) -> u64 {
        self.all_regions
            .find_containing(address, &self.arena)
            .map(|id| self.arena.get(id))
            .filter(|region| region.begin() == address && region.is_allocated())
            .map_or(0, Region::size)
    }

    /// Check if the span `[address, address + size)` is entirely free.
    ///
    /// # Panics
    ///
    /// Panics when the span does not lie inside the managed range.
    pub fn is_free(&self, address: Address, size: u64) -> bool {
        assert!(
            self.contains(address, size),
            "queried span outside the managed range"
        );
        self.all_regions
            .find_containing(address, &self.arena)
            .map(|id| self.arena.get(id))
            .is_some_and(|region| region.is_free() && region.covers(address, size))
    }

    // =========================================================================
    // SPLIT / MERGE
    // =========================================================================

    /// Split the region at `new_size` bytes from its begin. Both halves
    /// keep the original state; the new tail region's id is returned.
    fn split(&mut self, id: RegionId, new_size: u64) -> RegionId {
        let (begin, size, state) = {
            let region = self.arena.get(id);
            (region.begin(), region.size(), region.state())
        };
        debug_assert!(new_size > 0 && new_size < size);
        debug_assert!(types::is_aligned(new_size, self.page_size));

        if let Some(observer) = self.on_split.as_mut() {
            observer(begin, new_size);
        }

        if state == RegionState::Free {
            self.free_regions.remove(size, begin);
        }

        let split_at = begin + new_size;
        let old_end = begin + size;

        let tail = self
            .arena
            .insert(Region::new(split_at, size - new_size, state));
        self.arena.get_mut(id).set_size(new_size);

        // The tail takes over the old end slot; the head is re-keyed under
        // the split point.
        self.all_regions.insert(old_end, tail);
        self.all_regions.insert(split_at, id);

        if state == RegionState::Free {
            self.free_regions.insert(new_size, begin, id);
            self.free_regions.insert(size - new_size, split_at, tail);
        }
        tail
    }

    /// Merge `upper` into `lower`. Both must be free and adjacent; `upper`
    /// is destroyed.
    fn merge(&mut self, lower: RegionId, upper: RegionId) {
        let (lower_begin, lower_size) = {
            let region = self.arena.get(lower);
            debug_assert!(region.is_free());
            (region.begin(), region.size())
        };
        let (upper_begin, upper_size, upper_end) = {
            let region = self.arena.get(upper);
            debug_assert!(region.is_free());
            (region.begin(), region.size(), region.end())
        };
        debug_assert_eq!(lower_begin + lower_size, upper_begin);

        let merged_size = lower_size + upper_size;
        if let Some(observer) = self.on_merge.as_mut() {
            observer(lower_begin, merged_size);
        }

        self.free_regions.remove(lower_size, lower_begin);
        self.free_regions.remove(upper_size, upper_begin);
        self.all_regions.remove(upper_begin);
        self.all_regions.insert(upper_end, lower);

        self.arena.remove(upper);
        self.arena.get_mut(lower).set_size(merged_size);
        self.free_regions.insert(merged_size, lower_begin, lower);
    }

    // =========================================================================
    // INTERNAL HELPERS
    // =========================================================================

    /// Take the free region `id` out of the free index and tag it.
    fn commit_allocation(&mut self, id: RegionId, state: RegionState) {
        let (begin, size) = {
            let region = self.arena.get(id);
            debug_assert!(region.is_free());
            (region.begin(), region.size())
        };
        self.free_regions.remove(size, begin);
        self.arena.get_mut(id).set_state(state);
        self.free_bytes -= size;
    }

    fn check_size(&self, size: u64) {
        assert!(
            size > 0 && types::is_aligned(size, self.page_size),
            "size must be a positive multiple of the page size"
        );
    }

    /// Walk the whole structure and assert every bookkeeping invariant.
    #[cfg(test)]
    pub(crate) fn verify_invariants(&self) {
        let mut cursor = self.begin;
        let mut free_sum = 0;
        let mut free_count = 0;
        let mut prev_free = false;
        for id in self.all_regions.iter() {
            let region = self.arena.get(id);
            assert_eq!(region.begin(), cursor, "gap or overlap in region chain");
            assert!(region.size() > 0, "empty region in index");
            assert!(types::is_aligned(region.begin(), self.page_size));
            assert!(types::is_aligned(region.size(), self.page_size));
            if region.is_free() {
                assert!(!prev_free, "adjacent free regions not coalesced");
                free_sum += region.size();
                free_count += 1;
            }
            prev_free = region.is_free();
            cursor = region.end();
        }
        assert_eq!(cursor, self.end(), "regions do not tile the whole range");
        assert_eq!(free_sum, self.free_bytes, "free byte counter out of sync");
        assert_eq!(
            self.free_regions.iter().count(),
            free_count,
            "free index membership out of sync"
        );
        for id in self.free_regions.iter() {
            assert!(self.arena.get(id).is_free());
        }
    }
}

impl fmt::Debug for RegionAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionAllocator")
            .field("begin", &self.begin)
            .field("size", &self.size)
            .field("page_size", &self.page_size)
            .field("free_bytes", &self.free_bytes)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for RegionAllocator {
    /// Diagnostic dump: bounds and sizes, then every region in address
    /// order, then every free region in `(size, begin)` order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RegionAllocator: [0x{:x}, 0x{:x})", self.begin, self.end())?;
        writeln!(f, "size: 0x{:x}", self.size)?;
        writeln!(f, "free_size: 0x{:x}", self.free_bytes)?;
        writeln!(f, "page_size: 0x{:x}", self.page_size)?;
        writeln!(f, "all regions:")?;
        for id in self.all_regions.iter() {
            writeln!(f, "  {}", self.arena.get(id))?;
        }
        writeln!(f, "free regions:")?;
        for id in self.free_regions.iter() {
            writeln!(f, "  {}", self.arena.get(id))?;
        }
        Ok(())
    }
}
