//! # Stack Monitor
//!
//! Fills each stack region with a pseudorandom 16-bit sequence before its
//! thread first runs. Execution overwrites the sequence from the top of
//! the region downward; counting how many words at the bottom still match
//! tells how much of the region was never touched.
//!
//! This is a diagnostic, not a guard. Overflow is not caught when it
//! happens, only observed afterwards, and a write that happens to store
//! the expected sequence value goes unnoticed. Poll it periodically, or
//! when something looks wrong.

use crate::arena::StackRegion;
use crate::config::{SENTINEL_SEED, SENTINEL_TAPS, STACK_WARN_MARGIN};

#[inline]
fn lfsr16(word: u16) -> u16 {
    (word >> 1) ^ ((word & 1).wrapping_neg() & SENTINEL_TAPS)
}

/// Health of one stack region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStatus {
    /// More than `STACK_WARN_MARGIN` bytes were never touched.
    Healthy { unused: usize },
    /// The untouched margin is down to `STACK_WARN_MARGIN` or less.
    Low { unused: usize },
    /// No sentinel left, or the saved stack pointer escaped the region.
    /// Neighbouring memory has likely been overwritten.
    Exhausted,
}

impl StackStatus {
    pub fn is_healthy(self) -> bool {
        matches!(self, StackStatus::Healthy { .. })
    }
}

/// Write the sentinel sequence over the whole region.
///
/// # Safety
/// No thread may be executing on, or hold live data in, `region`.
pub unsafe fn paint(region: &StackRegion<'_>) {
    let words = region.base() as *mut u16;
    let mut value = SENTINEL_SEED;
    for i in 0..region.size() / 2 {
        words.add(i).write_volatile(value);
        value = lfsr16(value);
    }
}

/// Bytes at the bottom of `region` never written since `paint()`.
///
/// Scans upward from the base, which is the end furthest from where the
/// stack starts, and stops at the first word that breaks the sequence.
pub fn high_water_mark(region: &StackRegion<'_>) -> usize {
    let words = region.base() as *const u16;
    let mut expected = SENTINEL_SEED;
    let mut intact = 0;

    while intact < region.size() / 2 {
        // The region is owned memory for its whole lifetime; its thread
        // may be suspended with data above the scanned words.
        let word = unsafe { words.add(intact).read_volatile() };
        if word != expected {
            break;
        }
        expected = lfsr16(expected);
        intact += 1;
    }

    intact * 2
}

/// Classify `region`. `saved_sp` is the stack pointer stored at the last
/// switch away from the thread, if it is not the one running.
pub fn status(region: &StackRegion<'_>, saved_sp: Option<usize>) -> StackStatus {
    if let Some(sp) = saved_sp {
        if !region.contains(sp) {
            return StackStatus::Exhausted;
        }
    }

    match high_water_mark(region) {
        0 => StackStatus::Exhausted,
        unused if unused <= STACK_WARN_MARGIN => StackStatus::Low { unused },
        unused => StackStatus::Healthy { unused },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{StackArena, StackMemory};

    #[test]
    fn test_lfsr_sequence() {
        assert_eq!(lfsr16(0x0001), 0xB400);
        assert_eq!(lfsr16(0xB400), 0x5A00);
        assert_ne!(lfsr16(0x5A00), 0x0001);
    }

    #[test]
    fn test_fresh_region_fully_unused() {
        let mut memory = StackMemory::<512>::new();
        let mut arena = StackArena::new(memory.as_mut_slice());
        let region = arena.reserve(256).unwrap();

        unsafe { paint(&region) };
        assert_eq!(high_water_mark(&region), 256);
        assert_eq!(status(&region, None), StackStatus::Healthy { unused: 256 });
    }

    #[test]
    fn test_writes_from_top_lower_the_mark() {
        let mut memory = StackMemory::<256>::new();
        let mut arena = StackArena::new(memory.as_mut_slice());
        let region = arena.reserve(256).unwrap();
        unsafe { paint(&region) };

        // Simulate 200 bytes of stack use from the top.
        for offset in 56..256 {
            unsafe { region.base().add(offset).write_volatile(0) };
        }

        assert_eq!(high_water_mark(&region), 56);
        assert_eq!(high_water_mark(&region), 56);
        assert_eq!(status(&region, None), StackStatus::Low { unused: 56 });
    }

    #[test]
    fn test_neighbour_paint_is_independent() {
        let mut memory = StackMemory::<256>::new();
        let mut arena = StackArena::new(memory.as_mut_slice());
        let low = arena.reserve(128).unwrap();
        let high = arena.reserve(128).unwrap();
        unsafe {
            paint(&low);
            paint(&high);
        }

        for offset in 0..128 {
            unsafe { high.base().add(offset).write_volatile(0xAA) };
        }

        assert_eq!(high_water_mark(&high), 0);
        assert_eq!(high_water_mark(&low), 128);
    }

    #[test]
    fn test_status_flags_escaped_stack_pointer() {
        let mut memory = StackMemory::<256>::new();
        let mut arena = StackArena::new(memory.as_mut_slice());
        let region = arena.reserve(128).unwrap();
        unsafe { paint(&region) };

        let below = region.base() as usize - 8;
        assert_eq!(status(&region, Some(below)), StackStatus::Exhausted);
        assert!(status(&region, Some(region.top() - 8)).is_healthy());
    }
}
