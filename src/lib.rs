//! # region-alloc
//!
//! Page-granular address-range allocator with coalescing, best-fit search,
//! alignment-constrained placement, and optional randomized placement.
//!
//! Given one large, page-aligned contiguous range, the allocator hands out
//! and reclaims sub-ranges ("regions") whose sizes are multiples of a fixed
//! page size, tracking which parts are free, allocated, or permanently
//! excluded. The addresses are opaque: nothing here maps, commits, or
//! dereferences memory. A commit-tracking layer can hook the split/merge
//! observers to manage backing storage lazily.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      RegionAllocator                         │
//! │   allocate / allocate_at / aligned / hint / randomized       │
//! │   free / trim / check / is_free          split + merge       │
//! └──────────────┬──────────────────────────────┬────────────────┘
//!                │                              │
//!     ┌──────────┴──────────┐       ┌───────────┴───────────┐
//!     │   AllRegionsIndex   │       │   FreeRegionsIndex    │
//!     │  (by end address)   │       │   (by size, begin)    │
//!     └──────────┬──────────┘       └───────────┬───────────┘
//!                │         ids only             │
//!     ┌──────────┴──────────────────────────────┴───────────┐
//!     │                     RegionArena                     │
//!     │              (owns every Region value)              │
//!     └─────────────────────────────────────────────────────┘
//! ```
//!
//! Both indices store stable [`RegionId`]s rather than references, so a
//! merge that destroys a region cannot leave a dangling entry behind.
//!
//! ## Example
//!
//! ```
//! use region_alloc::{RegionAllocator, ALLOCATION_FAILURE};
//!
//! let mut allocator = RegionAllocator::new(0x1000, 0x400, 0x100);
//! let address = allocator.allocate_region(0x300);
//! assert_ne!(address, ALLOCATION_FAILURE);
//! assert_eq!(allocator.free_region(address), 0x300);
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

pub mod allocator;
pub mod error;
pub mod locked;
pub mod region;
pub mod rng;
pub mod types;

mod index;

// Re-exports
pub use allocator::{RegionAllocator, RegionObserver};
pub use error::{Error, Result};
pub use locked::LockedRegionAllocator;
pub use region::{Region, RegionId, RegionState};
pub use rng::RandomSource;
pub use types::{ALLOCATION_FAILURE, Address};
