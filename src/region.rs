//! # Region Value Type
//!
//! A region is one contiguous, page-aligned sub-range of the managed range,
//! tagged with its current state. Regions are created, resized, and
//! destroyed only by the allocator; callers only ever see addresses and
//! sizes.

use core::fmt;

use crate::types::Address;

// =============================================================================
// REGION ID
// =============================================================================

/// Stable, opaque identity of a region in the allocator's arena.
///
/// Both ordered indices store ids rather than references, so a merge that
/// destroys a region can never leave a dangling pointer behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct RegionId(u64);

impl RegionId {
    /// Create an id from a raw counter value.
    #[inline]
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }
}

// =============================================================================
// REGION STATE
// =============================================================================

/// State of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    /// Available for allocation.
    Free,
    /// Permanently reserved; never allocatable, never merged.
    Excluded,
    /// Handed out to a caller.
    Allocated,
}

impl RegionState {
    /// Name used in the diagnostic dump.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Excluded => "excluded",
            Self::Allocated => "used",
        }
    }
}

// =============================================================================
// REGION
// =============================================================================

/// A contiguous sub-range `[begin, begin + size)` with a state tag.
#[derive(Debug, Clone)]
pub struct Region {
    begin: Address,
    size: u64,
    state: RegionState,
}

impl Region {
    /// Create a new region. Size must be positive; the allocator upholds
    /// page alignment.
    pub(crate) fn new(begin: Address, size: u64, state: RegionState) -> Self {
        debug_assert!(size > 0, "region size must be positive");
        Self { begin, size, state }
    }

    /// Start address.
    #[inline]
    pub fn begin(&self) -> Address {
        self.begin
    }

    /// End address (exclusive).
    #[inline]
    pub fn end(&self) -> Address {
        self.begin + self.size
    }

    /// Size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> RegionState {
        self.state
    }

    /// Check if `address` falls inside this region.
    #[inline]
    pub fn contains(&self, address: Address) -> bool {
        address >= self.begin && address < self.end()
    }

    /// Check if the span `[address, address + size)` lies fully inside.
    #[inline]
    pub fn covers(&self, address: Address, size: u64) -> bool {
        address >= self.begin && address + size <= self.end()
    }

    /// Is this region free?
    #[inline]
    pub fn is_free(&self) -> bool {
        self.state == RegionState::Free
    }

    /// Is this region allocated?
    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.state == RegionState::Allocated
    }

    /// Is this region permanently excluded?
    #[inline]
    pub fn is_excluded(&self) -> bool {
        self.state == RegionState::Excluded
    }

    /// Change the state. Free-index membership is the allocator's job.
    #[inline]
    pub(crate) fn set_state(&mut self, state: RegionState) {
        self.state = state;
    }

    /// Resize the region. Index keys are the allocator's job.
    #[inline]
    pub(crate) fn set_size(&mut self, size: u64) {
        debug_assert!(size > 0, "region size must be positive");
        self.size = size;
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[0x{:x}, 0x{:x}), size: 0x{:x}, state: {}",
            self.begin,
            self.end(),
            self.size,
            self.state.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_contains() {
        let region = Region::new(0x1000, 0x2000, RegionState::Free);
        assert!(region.contains(0x1000));
        assert!(region.contains(0x2FFF));
        assert!(!region.contains(0xFFF));
        assert!(!region.contains(0x3000));
    }

    #[test]
    fn test_region_covers() {
        let region = Region::new(0x1000, 0x2000, RegionState::Free);
        assert!(region.covers(0x1000, 0x2000));
        assert!(region.covers(0x2000, 0x1000));
        assert!(!region.covers(0x2000, 0x2000));
        assert!(!region.covers(0xF00, 0x100));
    }

    #[test]
    fn test_state_predicates() {
        let free = Region::new(0, 0x1000, RegionState::Free);
        let used = Region::new(0x1000, 0x1000, RegionState::Allocated);
        let excluded = Region::new(0x2000, 0x1000, RegionState::Excluded);
        assert!(free.is_free() && !free.is_allocated() && !free.is_excluded());
        assert!(used.is_allocated() && !used.is_free());
        assert!(excluded.is_excluded() && !excluded.is_free());
    }

    #[test]
    fn test_display_format() {
        let region = Region::new(0x1000, 0x400, RegionState::Allocated);
        assert_eq!(
            alloc::format!("{}", region),
            "[0x1000, 0x1400), size: 0x400, state: used"
        );
    }
}
