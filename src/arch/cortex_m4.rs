//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor:
//! the cooperative context switch, PRIMASK handling, and the SysTick
//! time base.
//!
//! ## Context Switch Mechanism
//!
//! Switching is an ordinary function call, not an exception. Per AAPCS
//! the caller already keeps R0–R3, R12 and the flags, so `cothread_switch`
//! only pushes R4–R11 and LR (plus S16–S31 on hard-float targets) onto the
//! current stack, stores SP, loads the target SP and pops the same set.
//! The popped LR becomes PC, which lands either right after the target's
//! own `cothread_switch` call or, for a fresh thread, in the trampoline.
//!
//! ## Initial Frame (top = high address, growing down)
//!
//! ```text
//! [launch data]          <- written by the scheduler above the frame
//!   PC   (cothread_trampoline)
//!   R11..R7 (0)
//!   R6   (thread id)
//!   R5   (entry shim)
//!   R4   (launch data pointer)
//!   S31..S16 (0, hard-float only)   <- saved SP after priming
//! ```

use core::arch::global_asm;
use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::register::primask;
use cortex_m_rt::exception;

use super::IrqState;
use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};

/// AAPCS requires SP to be 8-byte aligned at public interfaces.
pub const STACK_ALIGN: usize = 8;

#[cfg(not(target_abi = "eabihf"))]
const FPU_WORDS: usize = 0;
#[cfg(target_abi = "eabihf")]
const FPU_WORDS: usize = 16;

/// R4–R11 and the resume address.
const CORE_WORDS: usize = 9;

/// Bytes `prime()` writes below the frame top.
pub const FRAME_SIZE: usize = (FPU_WORDS + CORE_WORDS) * 4;

extern "C" {
    fn cothread_switch(save: *mut usize, load: usize, arg: usize);
    fn cothread_trampoline();
}

// r0 = where to store the current SP, r1 = SP to resume, r2 = passed
// through untouched to a fresh thread's trampoline.
#[cfg(not(target_abi = "eabihf"))]
global_asm!(
    ".section .text.cothread_switch,\"ax\",%progbits",
    ".syntax unified",
    ".thumb",
    ".global cothread_switch",
    ".type cothread_switch,%function",
    ".thumb_func",
    "cothread_switch:",
    "    push {{r4-r11, lr}}",
    "    mov r3, sp",
    "    str r3, [r0]",
    "    mov sp, r1",
    "    pop {{r4-r11, pc}}",
    ".size cothread_switch, . - cothread_switch",
);

#[cfg(target_abi = "eabihf")]
global_asm!(
    ".section .text.cothread_switch,\"ax\",%progbits",
    ".syntax unified",
    ".thumb",
    ".global cothread_switch",
    ".type cothread_switch,%function",
    ".thumb_func",
    "cothread_switch:",
    "    push {{r4-r11, lr}}",
    "    vpush {{s16-s31}}",
    "    mov r3, sp",
    "    str r3, [r0]",
    "    mov sp, r1",
    "    vpop {{s16-s31}}",
    "    pop {{r4-r11, pc}}",
    ".size cothread_switch, . - cothread_switch",
);

// First code a fresh thread executes: entry(r2, r4 = launch, r6 = id).
// The entry shim never returns.
global_asm!(
    ".section .text.cothread_trampoline,\"ax\",%progbits",
    ".syntax unified",
    ".thumb",
    ".global cothread_trampoline",
    ".type cothread_trampoline,%function",
    ".thumb_func",
    "cothread_trampoline:",
    "    mov r0, r2",
    "    mov r1, r4",
    "    mov r2, r6",
    "    blx r5",
    "    udf #0",
    ".size cothread_trampoline, . - cothread_trampoline",
);

/// Write the initial frame of a thread below `frame_top` and return the
/// stack pointer to resume it from. The trampoline calls
/// `entry(arg, launch, id)`, `arg` being whatever the first `switch()`
/// into the thread passes.
///
/// # Safety
/// `frame_top` must be `STACK_ALIGN`-aligned, and the `FRAME_SIZE` bytes
/// below it must be writable memory owned by the thread being primed.
pub unsafe fn prime(frame_top: usize, entry: usize, launch: usize, id: usize) -> usize {
    let sp = frame_top - FRAME_SIZE;
    let frame = sp as *mut usize;

    for i in 0..FPU_WORDS {
        frame.add(i).write(0);
    }

    let core = frame.add(FPU_WORDS);
    core.write(launch); // R4
    core.add(1).write(entry); // R5
    core.add(2).write(id); // R6
    for i in 3..8 {
        core.add(i).write(0); // R7–R11
    }
    core.add(8).write(cothread_trampoline as *const () as usize); // PC

    sp
}

/// Save the current context, storing its SP into `*save`, and resume the
/// context whose SP is `load`. `arg` reaches the entry shim of a thread
/// that has never run.
///
/// # Safety
/// `load` must come from `prime()` or from an earlier `switch()` of a
/// context that has not been resumed since.
#[inline(always)]
pub unsafe fn switch(save: *mut usize, load: usize, arg: usize) {
    cothread_switch(save, load, arg);
}

#[inline]
pub fn irq_enabled() -> bool {
    primask::read().is_active()
}

#[inline]
pub fn irq_restore(state: IrqState) {
    if state.was_enabled() {
        unsafe { cortex_m::interrupt::enable() };
    }
}

#[inline]
pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}

// ---------------------------------------------------------------------------
// SysTick time base
// ---------------------------------------------------------------------------

static TICKS: AtomicU32 = AtomicU32::new(0);

/// Ticks since `configure_systick()`, wrapping.
#[inline]
pub fn ticks() -> u32 {
    TICKS.load(Ordering::Relaxed)
}

/// Configure the SysTick timer for the scheduler tick.
///
/// Sets up SysTick to fire at `TICK_HZ` using the processor clock. Each
/// tick advances the monotonic counter read by `SysTickClock` and wakes
/// the core out of `wfi`.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

#[exception]
fn SysTick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}
