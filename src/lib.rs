//! # Cothread: Cooperative Threads for Microcontrollers
//!
//! A small runtime that lets several logical threads share one CPU and
//! one block of stack memory on an ARM Cortex-M4, without a heap and
//! without preemption.
//!
//! ## Overview
//!
//! Each thread gets its own stack region, carved once from a static arena
//! and painted with a sentinel pattern so its peak usage can be measured
//! later. Threads run until they give up the CPU by yielding, sleeping or
//! blocking on a condition; the scheduler then picks the next Ready thread
//! in round-robin order, or parks the core until the next tick if there
//! is none.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  Application Threads                   │
//! ├────────────────────────────────────────────────────────┤
//! │              Thread Handle (kernel.rs)                 │
//! │   yield_now() · sleep() · block_until() · exit()       │
//! ├──────────────┬──────────────────┬──────────────────────┤
//! │  Scheduler   │  Stack Monitor   │  Sync Primitives     │
//! │ scheduler.rs │  stackmon.rs     │  sync.rs             │
//! │ ─ create     │  ─ paint()       │  ─ critical_section  │
//! │ ─ run()      │  ─ high_water    │  ─ CoLock · Signal   │
//! ├──────────────┴──────────────────┴──────────────────────┤
//! │   TCB (thread.rs) · Arena (arena.rs) · Time (time.rs)  │
//! ├────────────────────────────────────────────────────────┤
//! │       Context (context.rs) · Arch Port (arch/)         │
//! │   frame priming · register switch · PRIMASK · SysTick  │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! static mut STACKS: StackMemory<4096> = StackMemory::new();
//!
//! let memory = unsafe { (*addr_of_mut!(STACKS)).as_mut_slice() };
//! let mut sched = Kernel::new(memory, SysTickClock);
//! sched.create_thread(1024, |cx| loop {
//!     blink();
//!     cx.sleep_ms(500);
//! }).unwrap_or_else(|err| kernel::halt(err));
//! sched.start()
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: thread closures are stored at the top of their own stack
//! - **Fixed-size TCB array**: `[Tcb; N]` inline in the scheduler
//! - **Per-thread stack**: a region of the borrowed arena, never returned
//! - **Critical sections**: only around the stack-pointer swap

#![cfg_attr(not(test), no_std)]

#[macro_use]
pub mod log;

pub mod arch;
pub mod arena;
pub mod config;
pub mod context;
pub mod error;
pub mod kernel;
pub mod scheduler;
pub mod stackmon;
pub mod sync;
pub mod thread;
pub mod time;

pub use arena::{StackArena, StackMemory, StackRegion};
pub use error::{Error, Result};
pub use kernel::{halt, Cothread};
pub use scheduler::{Kernel, Scheduler};
pub use stackmon::StackStatus;
pub use sync::{CoLock, CoLockGuard, Signal};
pub use thread::{ThreadId, ThreadState};
pub use time::{ManualClock, Platform, Ticks, MAX_SLEEP};

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use time::SysTickClock;
