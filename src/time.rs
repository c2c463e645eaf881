//! # Time Base & Idle
//!
//! The scheduler consumes two things from the hardware: a monotonically
//! increasing tick counter, advanced by a periodic interrupt, and a way to
//! park the core until the next interrupt. [`Platform`] bundles both.
//!
//! Ticks are `u32` and wrap. Deadlines are compared with wrapping
//! arithmetic, so a single wait may span at most [`MAX_SLEEP`] ticks.

use core::cell::Cell;

use crate::config::TICK_HZ;

/// Monotonic tick count.
pub type Ticks = u32;

/// Longest sleep that still compares correctly across a counter wrap.
pub const MAX_SLEEP: Ticks = i32::MAX as Ticks;

/// Clock and idle primitive the scheduler runs on.
pub trait Platform {
    /// Current value of the monotonic tick counter.
    fn now(&self) -> Ticks;

    /// Park the CPU until the next interrupt. Only the scheduler's idle
    /// step calls this, never thread code.
    fn enter_idle(&self);
}

impl<T: Platform + ?Sized> Platform for &T {
    #[inline]
    fn now(&self) -> Ticks {
        (**self).now()
    }

    #[inline]
    fn enter_idle(&self) {
        (**self).enter_idle()
    }
}

/// Whether `deadline` lies at or before `now`, across counter wraps.
#[inline]
pub fn deadline_reached(now: Ticks, deadline: Ticks) -> bool {
    now.wrapping_sub(deadline) <= MAX_SLEEP
}

/// Milliseconds to ticks, rounded up so a sleep is never shorter than
/// asked for.
pub fn ms_to_ticks(ms: u32) -> Ticks {
    let ticks = (ms as u64 * TICK_HZ as u64).div_ceil(1000);
    ticks.min(MAX_SLEEP as u64) as Ticks
}

/// A clock that only moves when told to.
///
/// Idling advances it by one tick, standing in for the timer interrupt
/// that would wake the core. Used to run the scheduler on a host, where
/// time must be deterministic.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Ticks>,
}

impl ManualClock {
    pub const fn new(start: Ticks) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, ticks: Ticks) {
        self.now.set(self.now.get().wrapping_add(ticks));
    }
}

impl Platform for ManualClock {
    fn now(&self) -> Ticks {
        self.now.get()
    }

    fn enter_idle(&self) {
        self.advance(1);
    }
}

/// SysTick-driven clock. Call
/// [`configure_systick`](crate::arch::cortex_m4::configure_systick) once
/// before starting the scheduler.
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct SysTickClock;

#[cfg(all(target_arch = "arm", target_os = "none"))]
impl Platform for SysTickClock {
    #[inline]
    fn now(&self) -> Ticks {
        crate::arch::ticks()
    }

    #[inline]
    fn enter_idle(&self) {
        crate::arch::wait_for_interrupt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_reached_across_wrap() {
        assert!(deadline_reached(10, 10));
        assert!(deadline_reached(11, 10));
        assert!(!deadline_reached(9, 10));

        let deadline = u32::MAX.wrapping_add(5);
        assert!(!deadline_reached(u32::MAX - 3, deadline));
        assert!(deadline_reached(5, deadline));
        assert!(deadline_reached(6, deadline));
    }

    #[test]
    fn test_ms_to_ticks_rounds_up() {
        assert_eq!(ms_to_ticks(0), 0);
        assert_eq!(ms_to_ticks(250), 250 * TICK_HZ / 1000);
        assert_eq!(ms_to_ticks(u32::MAX), MAX_SLEEP);
    }

    #[test]
    fn test_manual_clock_idles_one_tick() {
        let clock = ManualClock::new(41);
        clock.enter_idle();
        assert_eq!(clock.now(), 42);
        clock.advance(8);
        assert_eq!((&clock).now(), 50);
    }
}
