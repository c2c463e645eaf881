//! x86_64 (System V, Linux) host port.
//!
//! Runs the scheduler inside an ordinary process: thread stacks live in
//! the arena exactly as on the target, and the switch is the same
//! callee-saved push/swap/pop sequence. Interrupt masking has nothing to
//! mask in user space and is a no-op.

use core::arch::global_asm;

use super::IrqState;

/// The System V ABI wants RSP 16-byte aligned before every `call`.
pub const STACK_ALIGN: usize = 16;

/// R15, R14, R13, R12, RBX, RBP and the resume address.
pub const FRAME_SIZE: usize = 7 * 8;

extern "C" {
    fn cothread_switch(save: *mut usize, load: usize, arg: usize);
    fn cothread_trampoline();
}

// rdi = where to store the current RSP, rsi = RSP to resume, rdx = passed
// through untouched to a fresh thread's trampoline.
global_asm!(
    ".text",
    ".global cothread_switch",
    ".type cothread_switch, @function",
    "cothread_switch:",
    "    push rbp",
    "    push rbx",
    "    push r12",
    "    push r13",
    "    push r14",
    "    push r15",
    "    mov [rdi], rsp",
    "    mov rsp, rsi",
    "    pop r15",
    "    pop r14",
    "    pop r13",
    "    pop r12",
    "    pop rbx",
    "    pop rbp",
    "    ret",
    ".size cothread_switch, . - cothread_switch",
    "",
    ".global cothread_trampoline",
    ".type cothread_trampoline, @function",
    "cothread_trampoline:",
    "    mov rdi, rdx",
    "    mov rsi, rbx",
    "    mov rdx, r13",
    "    call r12",
    "    ud2",
    ".size cothread_trampoline, . - cothread_trampoline",
);

/// Write the initial frame of a thread below `frame_top` and return the
/// stack pointer to resume it from. The trampoline calls
/// `entry(arg, launch, id)`, `arg` being whatever the first `switch()`
/// into the thread passes.
///
/// The trampoline is entered through `ret` with RSP back at `frame_top`,
/// so its `call` leaves the shim with the alignment of a normal call.
///
/// # Safety
/// `frame_top` must be `STACK_ALIGN`-aligned, and the `FRAME_SIZE` bytes
/// below it must be writable memory owned by the thread being primed.
pub unsafe fn prime(frame_top: usize, entry: usize, launch: usize, id: usize) -> usize {
    let sp = frame_top - FRAME_SIZE;
    let frame = sp as *mut usize;

    frame.write(0); // R15
    frame.add(1).write(0); // R14
    frame.add(2).write(id); // R13
    frame.add(3).write(entry); // R12
    frame.add(4).write(launch); // RBX
    frame.add(5).write(0); // RBP
    frame.add(6).write(cothread_trampoline as *const () as usize);

    sp
}

/// Save the current context, storing its RSP into `*save`, and resume the
/// context whose RSP is `load`. `arg` reaches the entry shim of a thread
/// that has never run.
///
/// # Safety
/// `load` must come from `prime()` or from an earlier `switch()` of a
/// context that has not been resumed since.
#[inline(always)]
pub unsafe fn switch(save: *mut usize, load: usize, arg: usize) {
    cothread_switch(save, load, arg);
}

/// There is nothing to mask in user space; every saved state reads as
/// enabled so restores are no-ops.
#[inline]
pub fn irq_enabled() -> bool {
    true
}

#[inline]
pub fn irq_save() -> IrqState {
    IrqState(irq_enabled())
}

#[inline]
pub fn irq_restore(_state: IrqState) {}

#[inline]
pub fn wait_for_interrupt() {
    core::hint::spin_loop();
}
