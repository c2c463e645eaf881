//! # Cothread Configuration
//!
//! Compile-time constants governing the scheduler and the stack monitor.
//! All limits are fixed at compile time; nothing is allocated dynamically.

/// Default number of thread slots in a [`Kernel`](crate::Kernel).
/// Each slot is a small TCB; stack memory is budgeted separately by the
/// arena, so raising this costs little RAM by itself.
pub const MAX_THREADS: usize = 8;

/// SysTick frequency in Hz. One tick is the unit of `sleep()` and of
/// every deadline the scheduler evaluates.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Stack size used by [`Scheduler::spawn`](crate::Scheduler::spawn).
/// Must cover the deepest call chain plus any interrupt frame stacked
/// on top of it while the thread runs.
pub const DEFAULT_STACK_SIZE: usize = 1024;

/// A region whose untouched sentinel drops below this many bytes is
/// reported as `Low` by the stack monitor.
pub const STACK_WARN_MARGIN: usize = 64;

/// First word of the sentinel sequence painted into every stack region.
pub const SENTINEL_SEED: u16 = 0x0001;

/// Feedback taps of the 16-bit Galois LFSR generating the sentinel.
pub const SENTINEL_TAPS: u16 = 0xB400;
