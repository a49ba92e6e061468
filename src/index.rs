//! # Region Bookkeeping
//!
//! The arena that owns every [`Region`] plus the two ordered views over it:
//! all regions by end address, and free regions by `(size, begin)`.
//!
//! The indices store only [`RegionId`]s. Comparisons and lookups go back
//! through the arena, so destroying a region in one place can never leave a
//! stale reference in the other.

use alloc::collections::BTreeMap;
use core::ops::Bound;

use crate::region::{Region, RegionId};
use crate::types::Address;

// =============================================================================
// REGION ARENA
// =============================================================================

/// Owns every live region, keyed by stable id.
#[derive(Debug)]
pub(crate) struct RegionArena {
    regions: BTreeMap<RegionId, Region>,
    next_id: u64,
}

impl RegionArena {
    pub(crate) fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Add a region, returning its id.
    pub(crate) fn insert(&mut self, region: Region) -> RegionId {
        let id = RegionId::new(self.next_id);
        self.next_id += 1;
        self.regions.insert(id, region);
        id
    }

    /// Destroy a region. Panics if the id is stale; that means the indices
    /// and the arena disagree, which is unrecoverable corruption.
    pub(crate) fn remove(&mut self, id: RegionId) -> Region {
        self.regions.remove(&id).expect("stale region id in index")
    }

    pub(crate) fn get(&self, id: RegionId) -> &Region {
        self.regions.get(&id).expect("stale region id in index")
    }

    pub(crate) fn get_mut(&mut self, id: RegionId) -> &mut Region {
        self.regions.get_mut(&id).expect("stale region id in index")
    }
}

// =============================================================================
// ALL-REGIONS INDEX
// =============================================================================

/// Every region partitioning the managed range, ordered by end address.
///
/// Regions never overlap, so end order equals begin order. The index always
/// holds at least one region once the allocator is constructed.
#[derive(Debug)]
pub(crate) struct AllRegionsIndex {
    by_end: BTreeMap<Address, RegionId>,
}

impl AllRegionsIndex {
    pub(crate) fn new() -> Self {
        Self {
            by_end: BTreeMap::new(),
        }
    }

    /// Insert or re-key a region under its end address.
    pub(crate) fn insert(&mut self, end: Address, id: RegionId) {
        self.by_end.insert(end, id);
    }

    /// Remove the entry keyed by `end`.
    pub(crate) fn remove(&mut self, end: Address) {
        self.by_end.remove(&end);
    }

    /// Find the region containing `address`, in O(log n).
    pub(crate) fn find_containing(
        &self,
        address: Address,
        arena: &RegionArena,
    ) -> Option<RegionId> {
        // The containing region is the one with the smallest end > address.
        let (_, &id) = self
            .by_end
            .range((Bound::Excluded(address), Bound::Unbounded))
            .next()?;
        let region = arena.get(id);
        region.contains(address).then_some(id)
    }

    /// The region immediately before the one ending at `begin`, if any.
    pub(crate) fn predecessor(&self, begin: Address) -> Option<RegionId> {
        self.by_end.get(&begin).copied()
    }

    /// The region immediately after the one with the given `end`, if any.
    pub(crate) fn successor(&self, end: Address) -> Option<RegionId> {
        self.by_end
            .range((Bound::Excluded(end), Bound::Unbounded))
            .next()
            .map(|(_, &id)| id)
    }

    /// All regions in address order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.by_end.values().copied()
    }
}

// =============================================================================
// FREE-REGIONS INDEX
// =============================================================================

/// Free regions ordered by `(size, begin)`.
///
/// Membership mirrors the free state: a region is listed here exactly while
/// its state is `Free`.
#[derive(Debug)]
pub(crate) struct FreeRegionsIndex {
    by_size: BTreeMap<(u64, Address), RegionId>,
}

impl FreeRegionsIndex {
    pub(crate) fn new() -> Self {
        Self {
            by_size: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, size: u64, begin: Address, id: RegionId) {
        self.by_size.insert((size, begin), id);
    }

    pub(crate) fn remove(&mut self, size: u64, begin: Address) {
        self.by_size.remove(&(size, begin));
    }

    /// Smallest free region with `size >= min_size`, ties broken by lowest
    /// address (best-fit-by-size, deterministic).
    pub(crate) fn find_at_least(&self, min_size: u64) -> Option<RegionId> {
        self.by_size
            .range((min_size, 0)..)
            .next()
            .map(|(_, &id)| id)
    }

    /// Free regions in `(size, begin)` order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.by_size.values().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionState;

    fn arena_with(regions: &[(Address, u64, RegionState)]) -> (RegionArena, AllRegionsIndex) {
        let mut arena = RegionArena::new();
        let mut all = AllRegionsIndex::new();
        for &(begin, size, state) in regions {
            let id = arena.insert(Region::new(begin, size, state));
            all.insert(begin + size, id);
        }
        (arena, all)
    }

    #[test]
    fn test_find_containing() {
        let (arena, all) = arena_with(&[
            (0x1000, 0x1000, RegionState::Free),
            (0x2000, 0x2000, RegionState::Allocated),
        ]);

        let id = all.find_containing(0x1000, &arena).unwrap();
        assert_eq!(arena.get(id).begin(), 0x1000);
        let id = all.find_containing(0x3FFF, &arena).unwrap();
        assert_eq!(arena.get(id).begin(), 0x2000);
        assert!(all.find_containing(0xFFF, &arena).is_none());
        assert!(all.find_containing(0x4000, &arena).is_none());
    }

    #[test]
    fn test_neighbors() {
        let (arena, all) = arena_with(&[
            (0x1000, 0x1000, RegionState::Free),
            (0x2000, 0x1000, RegionState::Allocated),
            (0x3000, 0x1000, RegionState::Free),
        ]);

        let mid = all.find_containing(0x2000, &arena).unwrap();
        let prev = all.predecessor(arena.get(mid).begin()).unwrap();
        let next = all.successor(arena.get(mid).end()).unwrap();
        assert_eq!(arena.get(prev).begin(), 0x1000);
        assert_eq!(arena.get(next).begin(), 0x3000);

        let first = all.find_containing(0x1000, &arena).unwrap();
        assert!(all.predecessor(arena.get(first).begin()).is_none());
        let last = all.find_containing(0x3000, &arena).unwrap();
        assert!(all.successor(arena.get(last).end()).is_none());
    }

    #[test]
    fn test_best_fit_prefers_smallest() {
        let mut arena = RegionArena::new();
        let mut free = FreeRegionsIndex::new();
        let big = arena.insert(Region::new(0x1000, 0x4000, RegionState::Free));
        let small = arena.insert(Region::new(0x8000, 0x2000, RegionState::Free));
        free.insert(0x4000, 0x1000, big);
        free.insert(0x2000, 0x8000, small);

        assert_eq!(free.find_at_least(0x1000), Some(small));
        assert_eq!(free.find_at_least(0x2000), Some(small));
        assert_eq!(free.find_at_least(0x3000), Some(big));
        assert_eq!(free.find_at_least(0x5000), None);
    }

    #[test]
    fn test_best_fit_ties_by_lowest_address() {
        let mut arena = RegionArena::new();
        let mut free = FreeRegionsIndex::new();
        let high = arena.insert(Region::new(0x8000, 0x2000, RegionState::Free));
        let low = arena.insert(Region::new(0x1000, 0x2000, RegionState::Free));
        free.insert(0x2000, 0x8000, high);
        free.insert(0x2000, 0x1000, low);

        assert_eq!(free.find_at_least(0x2000), Some(low));
    }
}
