//! # Stack Arena
//!
//! One contiguous block of memory carved into per-thread stack regions.
//! Regions are handed out front to back during initialization and never
//! returned, so there is no fragmentation and no allocation failure once
//! the system runs. The price is that worst-case stack depth has to be
//! sized up front; see [`stackmon`](crate::stackmon) for measuring it.
//!
//! ```text
//!  base                                                  base + capacity
//!  │ region 0  │ region 1  │      region 2       │   remaining   │
//!  └───────────┴───────────┴─────────────────────┴───────────────┘
//! ```

use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::arch::STACK_ALIGN;
use crate::error::{Error, Result};

/// Statically allocatable arena memory, aligned for any supported port.
///
/// ```ignore
/// static mut STACKS: StackMemory<4096> = StackMemory::new();
/// ```
#[repr(C, align(16))]
pub struct StackMemory<const SIZE: usize> {
    bytes: [u8; SIZE],
}

impl<const SIZE: usize> StackMemory<SIZE> {
    pub const fn new() -> Self {
        Self { bytes: [0; SIZE] }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl<const SIZE: usize> Default for StackMemory<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

/// A reserved stack: `size` bytes starting at `base`. The stack grows
/// down from `top()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion<'a> {
    base: NonNull<u8>,
    size: usize,
    _memory: PhantomData<&'a [u8]>,
}

impl<'a> StackRegion<'a> {
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// One past the highest byte; the initial stack pointer lives here.
    #[inline]
    pub fn top(&self) -> usize {
        self.base.as_ptr() as usize + self.size
    }

    /// Whether `addr` lies inside `[base, base + size)`.
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        let base = self.base.as_ptr() as usize;
        addr >= base && addr < base + self.size
    }
}

/// Fixed-capacity stack memory handing out disjoint regions.
pub struct StackArena<'a> {
    base: NonNull<u8>,
    capacity: usize,
    used: usize,
    _memory: PhantomData<&'a mut [u8]>,
}

impl<'a> StackArena<'a> {
    /// Take over `memory` for stacks. Leading bytes up to the first
    /// `STACK_ALIGN` boundary and any trailing partial unit are not used.
    pub fn new(memory: &'a mut [u8]) -> Self {
        let len = memory.len();
        let start = memory.as_mut_ptr();
        let skip = start.align_offset(STACK_ALIGN).min(len);
        let capacity = (len - skip) & !(STACK_ALIGN - 1);

        // In bounds: skip <= len.
        let base = unsafe { NonNull::new_unchecked(start.add(skip)) };

        Self {
            base,
            capacity,
            used: 0,
            _memory: PhantomData,
        }
    }

    /// Carve the next region of at least `size` bytes, rounded up to
    /// `STACK_ALIGN`.
    pub fn reserve(&mut self, size: usize) -> Result<StackRegion<'a>> {
        let available = self.remaining();
        let rounded = match size.checked_add(STACK_ALIGN - 1) {
            Some(padded) => padded & !(STACK_ALIGN - 1),
            None => {
                return Err(Error::ArenaExhausted {
                    requested: size,
                    available,
                })
            }
        };

        if rounded == 0 {
            return Err(Error::StackTooSmall {
                requested: size,
                minimum: STACK_ALIGN,
            });
        }
        if rounded > available {
            return Err(Error::ArenaExhausted {
                requested: rounded,
                available,
            });
        }

        // In bounds: used + rounded <= capacity.
        let base = unsafe { NonNull::new_unchecked(self.base.as_ptr().add(self.used)) };
        self.used += rounded;

        Ok(StackRegion {
            base,
            size: rounded,
            _memory: PhantomData,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.used
    }
}
