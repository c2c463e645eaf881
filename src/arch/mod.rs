//! # Architecture Abstraction Layer
//!
//! The only place that knows how registers are laid out on a thread's
//! stack. Every port provides the same small surface:
//!
//! - `STACK_ALIGN` / `FRAME_SIZE`: alignment of a stack top and size of
//!   the frame `prime()` writes below it
//! - `prime()`: build the initial frame of a thread that has never run
//! - `switch()`: save callee-saved state on the current stack, store the
//!   stack pointer, load another one and resume from it
//! - `irq_enabled()` / `irq_restore()`: read and restore the interrupt
//!   state (the host port adds `irq_save()` for its critical section; the
//!   Cortex-M4 one uses `cortex_m::interrupt::free`)
//! - `wait_for_interrupt()`: low-power wait used by idle paths
//!
//! The Cortex-M4 port is the production target. The x86_64 port runs the
//! same scheduler on a Linux host, which is how the test suite exercises
//! real context switches on arena stacks.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use self::cortex_m4::*;

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
pub mod x86_64;
#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
pub use self::x86_64::*;

#[cfg(not(any(
    all(target_arch = "arm", target_os = "none"),
    all(target_arch = "x86_64", target_os = "linux")
)))]
compile_error!("cothread supports bare-metal Cortex-M4 and x86_64 Linux hosts only");

/// Interrupt-enable state to restore with `irq_restore()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqState(pub(crate) bool);

impl IrqState {
    pub const fn enabled() -> Self {
        IrqState(true)
    }

    pub fn was_enabled(self) -> bool {
        self.0
    }
}
