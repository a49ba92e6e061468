//! # Address Types
//!
//! Raw addresses, the allocation-failure sentinel, and alignment helpers.

/// An address inside the managed range.
///
/// This is a location in whatever address space the caller manages
/// (virtual, physical, GPU, file offset). It is never dereferenced here.
pub type Address = u64;

/// Sentinel returned by address-returning allocation functions on failure.
///
/// Valid addresses never equal this value; the constructor rejects ranges
/// that would contain it.
pub const ALLOCATION_FAILURE: Address = Address::MAX;

/// Check whether `value` is a multiple of `alignment`.
///
/// `alignment` must be a power of two.
#[inline]
pub const fn is_aligned(value: u64, alignment: u64) -> bool {
    value & (alignment - 1) == 0
}

/// Round `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two.
#[inline]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Round `value` down to a multiple of `alignment`.
///
/// `alignment` must be a power of two.
#[inline]
pub const fn align_down(value: u64, alignment: u64) -> u64 {
    value & !(alignment - 1)
}
