//! # Cothread Example Firmware
//!
//! Three cooperative threads sharing one SPI bus on an STM32F4:
//!
//! | Thread | Stack | Behavior |
//! |--------|-------|----------|
//! | `sampler` | 1024 | Every 100 ms claims the bus, reads a sample, raises `SAMPLE_READY` |
//! | `display` | 1024 | Waits for `SAMPLE_READY`, claims the bus, pushes the sample out |
//! | `monitor` | 768 | Once a second, reports the stack margin of every thread |
//!
//! Bus transactions hold the [`CoLock`] across sleeps, so the other
//! thread blocks instead of interleaving transfers. When all three are
//! waiting the scheduler parks the core in `wfi` until the next SysTick.
//!
//! Build with `--features firmware,semihosting` to see the log output in
//! a debugger.

#![no_std]
#![no_main]

use core::cell::Cell;
use core::ptr::addr_of_mut;

use cortex_m_rt::entry;
use panic_halt as _;

use cothread::arch::configure_systick;
use cothread::time::SysTickClock;
use cothread::{co_error, co_info, co_warn, kernel, CoLock, Kernel, Signal, StackMemory, StackStatus};

const ARENA_SIZE: usize = 3 * 1024;

static mut STACKS: StackMemory<ARENA_SIZE> = StackMemory::new();

/// Raised by the sampler, consumed by the display.
static SAMPLE_READY: Signal = Signal::new();

/// Firmware entry point. Creates the threads and hands the core to the
/// scheduler. Does not return.
#[entry]
fn main() -> ! {
    let mut cp = cortex_m::Peripherals::take().unwrap();
    configure_systick(&mut cp.SYST);

    // `main` runs once, so this is the only reference to the arena.
    let memory = unsafe { (*addr_of_mut!(STACKS)).as_mut_slice() };

    let bus = CoLock::new();
    let latest = Cell::new(0u32);

    let mut sched = Kernel::new(memory, SysTickClock);

    let sampler = sched
        .create_thread(1024, |cx| {
            let mut sequence: u32 = 0;
            loop {
                cx.sleep_ms(100);

                let _bus = bus.lock(&cx);
                // Flash read in flight; the bus stays claimed meanwhile.
                cx.sleep(2);
                sequence = sequence.wrapping_add(1);
                latest.set(sequence);
                SAMPLE_READY.raise();
            }
        })
        .unwrap_or_else(|err| kernel::halt(err));

    let display = sched
        .create_thread(1024, |cx| loop {
            SAMPLE_READY.wait(&cx);

            let _bus = bus.lock(&cx);
            co_info!("sample #{} at tick {}", latest.get(), cx.now());
            cx.yield_now();
        })
        .unwrap_or_else(|err| kernel::halt(err));

    let monitored = [sampler, display];
    sched
        .create_thread(768, move |cx| loop {
            cx.sleep_ms(1000);

            for id in monitored.into_iter().chain([cx.id()]) {
                match cx.stack_status(id) {
                    Ok(StackStatus::Healthy { unused }) => {
                        co_info!("{}: {} bytes unused", id, unused)
                    }
                    Ok(StackStatus::Low { unused }) => {
                        co_warn!("{}: only {} bytes unused", id, unused)
                    }
                    Ok(StackStatus::Exhausted) => co_error!("{}: stack exhausted", id),
                    Err(err) => co_error!("{}: {}", id, err),
                }
            }
        })
        .unwrap_or_else(|err| kernel::halt(err));

    co_info!(
        "{} threads, {} of {} arena bytes left",
        sched.thread_count(),
        sched.arena().remaining(),
        sched.arena().capacity()
    );

    sched.start()
}
