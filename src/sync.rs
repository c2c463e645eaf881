//! # Synchronization Primitives
//!
//! Interrupt-safe critical sections, plus the two primitives drivers use
//! to share a peripheral between cooperative threads:
//!
//! - [`CoLock`]: mutual exclusion held across suspension points, e.g. an
//!   SPI bus claimed for a whole flash transaction
//! - [`Signal`]: a completion flag raised from an interrupt handler and
//!   awaited by a thread without spinning

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::kernel::Cothread;
use crate::thread::ThreadId;
use crate::time::Platform;

/// Execute a closure with interrupts disabled, restoring the previous
/// state afterwards.
///
/// Keep critical sections short; the only long one in the system is the
/// stack-pointer swap of a context switch.
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    cortex_m::interrupt::free(|_cs| f())
}

/// Execute a closure with interrupts disabled, restoring the previous
/// state afterwards.
#[cfg(not(all(target_arch = "arm", target_os = "none")))]
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let state = crate::arch::irq_save();
    let result = f();
    crate::arch::irq_restore(state);
    result
}

// ---------------------------------------------------------------------------
// CoLock
// ---------------------------------------------------------------------------

/// Cooperative mutual exclusion.
///
/// Threads only lose the CPU at suspension points, so plain cells are
/// enough for the lock word; what the lock adds is that a holder may
/// sleep or block while keeping others out. Not for use from interrupts.
#[derive(Debug, Default)]
pub struct CoLock {
    locked: Cell<bool>,
    owner: Cell<Option<ThreadId>>,
}

impl CoLock {
    pub const fn new() -> Self {
        Self {
            locked: Cell::new(false),
            owner: Cell::new(None),
        }
    }

    /// Take the lock, blocking the calling thread while someone else
    /// holds it.
    pub fn lock<P: Platform, const N: usize>(&self, cx: &Cothread<'_, '_, P, N>) -> CoLockGuard<'_> {
        loop {
            if let Some(guard) = self.try_lock(cx.id()) {
                return guard;
            }
            cx.block_until(|| !self.locked.get());
        }
    }

    pub fn try_lock(&self, owner: ThreadId) -> Option<CoLockGuard<'_>> {
        if self.locked.replace(true) {
            return None;
        }
        self.owner.set(Some(owner));
        Some(CoLockGuard { lock: self })
    }

    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.owner.get()
    }
}

/// Releases its [`CoLock`] when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct CoLockGuard<'l> {
    lock: &'l CoLock,
}

impl Drop for CoLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.owner.set(None);
        self.lock.locked.set(false);
    }
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// Completion flag shared with an interrupt handler.
///
/// ```ignore
/// static DMA_DONE: Signal = Signal::new();
///
/// #[interrupt]
/// fn DMA2_STREAM0() { DMA_DONE.raise(); }
///
/// // in a thread
/// DMA_DONE.wait(&cx);
/// ```
#[derive(Debug, Default)]
pub struct Signal {
    raised: AtomicBool,
}

impl Signal {
    pub const fn new() -> Self {
        Self {
            raised: AtomicBool::new(false),
        }
    }

    /// Set the flag. Safe to call from interrupt context.
    #[inline]
    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Consume a pending raise without waiting.
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }

    /// Block the calling thread until the flag is raised, then clear it.
    pub fn wait<P: Platform, const N: usize>(&self, cx: &Cothread<'_, '_, P, N>) {
        while !self.take() {
            cx.block_until(|| self.is_raised());
        }
    }
}
