//! # Execution Context
//!
//! The saved state of a suspended thread is just its stack pointer: the
//! registers themselves sit on the thread's own stack, pushed by the arch
//! switch routine. This module wraps that raw primitive and is the only
//! caller of it.

use core::cell::Cell;

use crate::arch;
use crate::sync;

/// Saved stack pointer of a context that is not executing.
#[derive(Debug, Default)]
pub struct Context {
    sp: Cell<usize>,
}

impl Context {
    pub const fn new() -> Self {
        Self { sp: Cell::new(0) }
    }

    /// Stack pointer stored at the last switch away from this context.
    /// Meaningless while the context is executing.
    #[inline]
    pub fn stack_pointer(&self) -> usize {
        self.sp.get()
    }

    /// Prepare a context that has never run. The first switch into it
    /// calls `entry(arg, launch, id)` on the stack below `frame_top`.
    ///
    /// # Safety
    /// See [`arch::prime`].
    pub unsafe fn prime(&self, frame_top: usize, entry: usize, launch: usize, id: usize) {
        self.sp.set(arch::prime(frame_top, entry, launch, id));
    }

    /// Suspend the executing code as `from` and resume `to`.
    ///
    /// Interrupts are masked while stack pointers are swapped. Each side
    /// restores its own interrupt state when it continues, so the caller
    /// sees the state it had before the call.
    ///
    /// # Safety
    /// `from` must describe the code currently executing and `to` a
    /// suspended or primed context. Neither may move while suspended.
    #[inline]
    pub unsafe fn switch(from: &Context, to: &Context, arg: usize) {
        sync::critical_section(|| arch::switch(from.sp.as_ptr(), to.sp.get(), arg));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::StackArena;

    struct Pair {
        home: Context,
        thread: Context,
        seen: Cell<(usize, usize)>,
        rounds: Cell<u32>,
    }

    unsafe extern "C" fn ping(arg: usize, launch: usize, id: usize) -> ! {
        let pair = &*(arg as *const Pair);
        pair.seen.set((launch, id));
        loop {
            pair.rounds.set(pair.rounds.get() + 1);
            Context::switch(&pair.thread, &pair.home, 0);
        }
    }

    #[test]
    fn test_primed_context_runs_and_returns() {
        let mut memory = vec![0u8; 16 * 1024];
        let mut arena = StackArena::new(&mut memory);
        let region = arena.reserve(16 * 1024).unwrap();

        let pair = Pair {
            home: Context::new(),
            thread: Context::new(),
            seen: Cell::new((0, 0)),
            rounds: Cell::new(0),
        };

        unsafe {
            pair.thread.prime(region.top(), ping as *const () as usize, 0xAB, 5);
            assert!(region.contains(pair.thread.stack_pointer()));

            Context::switch(&pair.home, &pair.thread, &pair as *const Pair as usize);
        }
        assert_eq!(pair.seen.get(), (0xAB, 5));
        assert_eq!(pair.rounds.get(), 1);
        assert!(region.contains(pair.thread.stack_pointer()));

        // A resumed context continues after its own switch call.
        unsafe { Context::switch(&pair.home, &pair.thread, 0) };
        assert_eq!(pair.rounds.get(), 2);
        assert_eq!(pair.seen.get(), (0xAB, 5));
    }
}
