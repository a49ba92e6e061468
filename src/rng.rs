//! # Randomness Source
//!
//! The allocator never seeds or owns entropy. Randomized placement takes an
//! injected [`RandomSource`], so production callers can plug in hardware or
//! OS entropy while tests supply a deterministic sequence.

/// Source of random bytes for randomized placement.
pub trait RandomSource {
    /// Fill `buffer` with random bytes.
    fn fill_bytes(&mut self, buffer: &mut [u8]);

    /// Draw a random `u64`.
    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        self.fill_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }
}

impl<T: RandomSource + ?Sized> RandomSource for &mut T {
    fn fill_bytes(&mut self, buffer: &mut [u8]) {
        (**self).fill_bytes(buffer)
    }
}
