//! # Scheduler
//!
//! Owns the thread table and the stack arena, and runs the cooperative
//! loop that hands the CPU from one thread to the next.
//!
//! ## Scheduling Algorithm
//!
//! The loop runs on the caller's stack (the "home" context). Each pass:
//! 1. **Wake**: walking the table round-robin from the slot after the last
//!    one selected, promote a Blocked thread to Ready when its deadline has
//!    passed or its predicate now holds
//! 2. **Select**: the first Ready thread found in that walk
//! 3. **Idle**: if none is Ready, park the core until the next interrupt
//!    and start over
//! 4. **Switch**: resume the selected thread; it runs until it yields,
//!    sleeps, blocks or terminates, which switches back home
//!
//! Threads always return to the home context rather than switching to
//! each other directly, so the selection logic exists exactly once.
//! `run()` returns when no live thread is left.
//!
//! ## Thread Startup
//!
//! `create_thread()` moves the entry closure to the top of the new thread's
//! own stack region and primes a frame below it. The first switch into the
//! thread enters `launch()`, which takes the closure back out,
//! calls it with a [`Cothread`] handle, and terminates the thread with the
//! returned exit code.

use core::cell::Cell;
use core::mem::{align_of, size_of};
use core::ptr;

use crate::arch::{self, IrqState, FRAME_SIZE, STACK_ALIGN};
use crate::arena::{StackArena, StackRegion};
use crate::config::{DEFAULT_STACK_SIZE, MAX_THREADS};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::kernel::Cothread;
use crate::stackmon::{self, StackStatus};
use crate::thread::{Tcb, ThreadId, ThreadState, Wait};
use crate::time::Platform;

/// Scheduler with the default number of thread slots.
pub type Kernel<'a, P> = Scheduler<'a, P, MAX_THREADS>;

/// Cooperative round-robin scheduler for up to `N` threads.
///
/// ## Design Notes
///
/// - All TCBs are stored inline in a fixed-size array (no heap)
/// - Stack regions come from a borrowed arena; `'a` is that borrow
/// - Threads are created through `&mut self` before the run; the run
///   loop and every thread handle use `&self`
pub struct Scheduler<'a, P: Platform, const N: usize> {
    threads: [Tcb<'a>; N],
    count: usize,
    arena: StackArena<'a>,
    platform: P,
    home: Context,
    current: Cell<Option<ThreadId>>,
    /// Slot the next selection walk starts from.
    cursor: Cell<usize>,
    /// Thread to try before the walk, set by `yield_to()`.
    hint: Cell<Option<ThreadId>>,
    /// Created threads not yet terminated.
    live: Cell<usize>,
    started: Cell<bool>,
    /// Interrupt state a fresh thread restores on its first entry.
    launch_irq: Cell<IrqState>,
}

impl<'a, P: Platform, const N: usize> Scheduler<'a, P, N> {
    /// Create a scheduler drawing thread stacks from `memory`.
    pub fn new(memory: &'a mut [u8], platform: P) -> Self {
        Self {
            threads: core::array::from_fn(|i| Tcb::empty(ThreadId::new(i))),
            count: 0,
            arena: StackArena::new(memory),
            platform,
            home: Context::new(),
            current: Cell::new(None),
            cursor: Cell::new(0),
            hint: Cell::new(None),
            live: Cell::new(0),
            started: Cell::new(false),
            launch_irq: Cell::new(IrqState::enabled()),
        }
    }

    /// Smallest region that fits the initial frame plus an entry of type
    /// `F`. A thread that does anything needs far more.
    pub fn min_stack_size<F>() -> usize {
        let launch = (size_of::<F>() + align_of::<F>() - 1 + STACK_ALIGN - 1) & !(STACK_ALIGN - 1);
        FRAME_SIZE + launch
    }

    /// Register a thread running `entry` on a fresh `stack_size`-byte
    /// region. Only possible before the run loop starts.
    ///
    /// # Errors
    /// - `AlreadyStarted` once `run()` or `start()` has been called
    /// - `NoFreeSlot` when all `N` slots are taken
    /// - `StackTooSmall` if the region could not hold the initial frame
    /// - `ArenaExhausted` if the arena has less than `stack_size` left
    pub fn create_thread<F>(&mut self, stack_size: usize, entry: F) -> Result<ThreadId>
    where
        F: for<'s> FnOnce(Cothread<'s, 'a, P, N>) -> i32 + 'a,
    {
        if self.started.get() {
            return Err(Error::AlreadyStarted);
        }
        if self.count == N {
            return Err(Error::NoFreeSlot);
        }

        let minimum = Self::min_stack_size::<F>();
        if stack_size < minimum {
            return Err(Error::StackTooSmall {
                requested: stack_size,
                minimum,
            });
        }

        let region = self.arena.reserve(stack_size)?;
        let id = ThreadId::new(self.count);
        let tcb = &self.threads[id.index()];

        // Fresh memory owned by nobody yet: paint it, then place the
        // closure at the top and the initial frame right below.
        unsafe {
            stackmon::paint(&region);

            let launch = (region.top() - size_of::<F>()) & !(align_of::<F>() - 1);
            ptr::write(launch as *mut F, entry);

            let frame_top = launch & !(STACK_ALIGN - 1);
            tcb.context
                .prime(frame_top, Self::launch::<F> as *const () as usize, launch, id.index());
        }

        tcb.region.set(Some(region));
        tcb.state.set(ThreadState::Ready);
        self.count += 1;
        self.live.set(self.live.get() + 1);

        co_info!(
            "created {}: stack {:#x}..{:#x} ({} bytes)",
            id,
            region.base() as usize,
            region.top(),
            region.size()
        );
        Ok(id)
    }

    /// [`create_thread`](Self::create_thread) with `DEFAULT_STACK_SIZE`.
    pub fn spawn<F>(&mut self, entry: F) -> Result<ThreadId>
    where
        F: for<'s> FnOnce(Cothread<'s, 'a, P, N>) -> i32 + 'a,
    {
        self.create_thread(DEFAULT_STACK_SIZE, entry)
    }

    /// Run the cooperative loop until every thread has terminated.
    ///
    /// Blocks forever if a thread never terminates, which is the usual
    /// case on a device.
    pub fn run(&self) -> Result<()> {
        if self.started.replace(true) {
            return Err(Error::AlreadyStarted);
        }
        co_info!("scheduler running {} threads", self.count);

        while self.live.get() > 0 {
            match self.select_next() {
                Some(id) => self.switch_to(id),
                None => self.platform.enter_idle(),
            }
        }

        co_info!("all threads terminated");
        Ok(())
    }

    /// Run the loop and park the core once it returns. Errors go to
    /// [`halt`](crate::kernel::halt).
    pub fn start(&self) -> ! {
        if let Err(err) = self.run() {
            crate::kernel::halt(err);
        }
        loop {
            arch::wait_for_interrupt();
        }
    }

    /// Find the next Ready thread in round-robin order, waking Blocked
    /// threads whose wait is over along the way. A pending `yield_to()`
    /// target goes first if it can run; the walk position is kept.
    fn select_next(&self) -> Option<ThreadId> {
        if self.count == 0 {
            return None;
        }

        let now = self.platform.now();
        if let Some(target) = self.hint.take() {
            if self.threads[target.index()].poll(now) {
                return Some(target);
            }
        }

        let start = self.cursor.get();
        for offset in 0..self.count {
            let index = (start + offset) % self.count;
            if self.threads[index].poll(now) {
                self.cursor.set((index + 1) % self.count);
                return Some(ThreadId::new(index));
            }
        }
        None
    }

    fn switch_to(&self, id: ThreadId) {
        let tcb = &self.threads[id.index()];
        tcb.state.set(ThreadState::Running);
        tcb.activations.set(tcb.activations.get().wrapping_add(1));
        self.current.set(Some(id));
        self.launch_irq.set(IrqState(arch::irq_enabled()));

        co_trace!("switch to {}", id);
        // `self` cannot move while borrowed by the loop; a thread that has
        // never run receives it as its scheduler pointer.
        unsafe { Context::switch(&self.home, &tcb.context, self as *const Self as usize) };

        self.current.set(None);
    }

    /// Halt unless `id` is the thread executing right now. Switching away
    /// from anything else would save the loop's own stack into `id`.
    fn ensure_running(&self, id: ThreadId) {
        if self.current.get() != Some(id) {
            crate::kernel::halt(Error::NotRunning(id));
        }
    }

    /// Called by the running thread `id`: record why it stops and switch
    /// back to the loop. Returns when the loop selects it again.
    pub(crate) fn suspend(&self, id: ThreadId, wait: Wait) {
        self.ensure_running(id);
        let tcb = &self.threads[id.index()];
        let state = match wait {
            Wait::None => ThreadState::Ready,
            _ => ThreadState::Blocked,
        };
        tcb.wait.set(wait);
        tcb.state.set(state);

        unsafe { Context::switch(&tcb.context, &self.home, 0) };
    }

    /// Let `target` run before the round-robin walk continues.
    pub(crate) fn yield_to(&self, id: ThreadId, target: ThreadId) -> Result<()> {
        self.ensure_running(id);
        self.tcb(target)?;
        self.hint.set(Some(target));
        self.suspend(id, Wait::None);
        Ok(())
    }

    pub(crate) fn terminate(&self, id: ThreadId, code: i32) -> ! {
        self.ensure_running(id);
        let tcb = &self.threads[id.index()];
        tcb.state.set(ThreadState::Terminated);
        tcb.exit_code.set(Some(code));
        self.live.set(self.live.get() - 1);
        co_info!("{} exited with code {}", id, code);

        unsafe { Context::switch(&tcb.context, &self.home, 0) };

        // Terminated threads are never selected again.
        loop {
            arch::wait_for_interrupt();
        }
    }

    /// First code of every thread, entered from the arch trampoline with
    /// the values `create_thread()` primed.
    unsafe extern "C" fn launch<F>(sched: *const Self, entry: *mut F, id: usize) -> !
    where
        F: for<'s> FnOnce(Cothread<'s, 'a, P, N>) -> i32 + 'a,
    {
        let sched = &*sched;
        arch::irq_restore(sched.launch_irq.get());

        let id = ThreadId::new(id);
        let entry = ptr::read(entry);
        let code = entry(Cothread { sched, id });
        sched.terminate(id, code)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    fn tcb(&self, id: ThreadId) -> Result<&Tcb<'a>> {
        if id.index() < self.count {
            Ok(&self.threads[id.index()])
        } else {
            Err(Error::InvalidThread(id))
        }
    }

    pub fn state(&self, id: ThreadId) -> Result<ThreadState> {
        self.tcb(id).map(|tcb| tcb.state.get())
    }

    /// Value the thread's entry returned or passed to `exit()`, once it
    /// has terminated.
    pub fn exit_code(&self, id: ThreadId) -> Result<Option<i32>> {
        self.tcb(id).map(|tcb| tcb.exit_code.get())
    }

    /// How many times the thread has been switched in.
    pub fn activations(&self, id: ThreadId) -> Result<u32> {
        self.tcb(id).map(|tcb| tcb.activations.get())
    }

    pub fn stack_region(&self, id: ThreadId) -> Result<StackRegion<'a>> {
        self.tcb(id)?.region.get().ok_or(Error::InvalidThread(id))
    }

    /// Bytes of the thread's region never written since creation.
    pub fn unused_stack(&self, id: ThreadId) -> Result<usize> {
        let region = self.stack_region(id)?;
        Ok(stackmon::high_water_mark(&region))
    }

    pub fn stack_status(&self, id: ThreadId) -> Result<StackStatus> {
        let tcb = self.tcb(id)?;
        let region = tcb.region.get().ok_or(Error::InvalidThread(id))?;
        let saved_sp = match tcb.state.get() {
            ThreadState::Running => None,
            _ => Some(tcb.context.stack_pointer()),
        };
        Ok(stackmon::status(&region, saved_sp))
    }

    /// Log every thread whose stack is not healthy and return how many
    /// there are.
    pub fn check_stacks(&self) -> usize {
        let mut unhealthy = 0;
        for tcb in &self.threads[..self.count] {
            match self.stack_status(tcb.id) {
                Ok(StackStatus::Healthy { .. }) | Err(_) => {}
                Ok(StackStatus::Low { unused }) => {
                    co_warn!("{} stack low: {} bytes unused", tcb.id, unused);
                    unhealthy += 1;
                }
                Ok(StackStatus::Exhausted) => {
                    co_error!("{} stack exhausted", tcb.id);
                    unhealthy += 1;
                }
            }
        }
        unhealthy
    }

    #[inline]
    pub fn thread_count(&self) -> usize {
        self.count
    }

    /// Threads created and not yet terminated.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.live.get()
    }

    /// The thread currently switched in, `None` while the loop itself runs.
    #[inline]
    pub fn current(&self) -> Option<ThreadId> {
        self.current.get()
    }

    #[inline]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    #[inline]
    pub fn arena(&self) -> &StackArena<'a> {
        &self.arena
    }

    /// Ids of all created threads, in slot order.
    pub fn threads(&self) -> impl Iterator<Item = ThreadId> {
        (0..self.count).map(ThreadId::new)
    }

    /// Whether thread `id` is live and not terminated.
    pub fn is_live(&self, id: ThreadId) -> bool {
        self.tcb(id).map(|tcb| tcb.is_live()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use core::hint::black_box;
    use std::cell::RefCell;
    use std::vec::Vec;

    const REGION: usize = 64 * 1024;

    #[inline(never)]
    fn recurse(depth: usize) -> usize {
        let pad = black_box([depth as u8; 128]);
        if depth == 0 {
            pad[0] as usize
        } else {
            recurse(depth - 1) + pad[127] as usize
        }
    }

    #[test]
    fn test_slots_fill_then_fail() {
        let mut memory = vec![0u8; 4096];
        let mut sched = Scheduler::<ManualClock, 3>::new(&mut memory, ManualClock::new(0));

        for expected in 0..3 {
            let id = sched.create_thread(256, |_cx| 0).unwrap();
            assert_eq!(id, ThreadId::new(expected));
            assert_eq!(sched.state(id), Ok(ThreadState::Ready));
        }
        assert_eq!(sched.create_thread(256, |_cx| 0), Err(Error::NoFreeSlot));
        assert_eq!(sched.thread_count(), 3);
        assert_eq!(sched.threads().count(), 3);
    }

    #[test]
    fn test_arena_scenario_64_64_128() {
        // 64 bytes holds the host and soft-float frames. On hard-float
        // Cortex-M the frame alone is 100 bytes and these would fail with
        // `StackTooSmall`.
        let mut memory = crate::arena::StackMemory::<256>::new();
        let mut sched = Scheduler::<ManualClock, 8>::new(memory.as_mut_slice(), ManualClock::new(0));

        assert!(sched.create_thread(64, |_cx| 0).is_ok());
        assert!(sched.create_thread(64, |_cx| 0).is_ok());
        assert!(sched.create_thread(128, |_cx| 0).is_ok());
        assert!(matches!(
            sched.create_thread(64, |_cx| 0),
            Err(Error::ArenaExhausted { .. })
        ));
        assert_eq!(sched.thread_count(), 3);
        assert_eq!(sched.arena().remaining(), 0);
    }

    #[test]
    fn test_regions_disjoint_and_painted() {
        let mut memory = vec![0u8; 4096];
        let mut sched = Scheduler::<ManualClock, 4>::new(&mut memory, ManualClock::new(0));
        let a = sched.create_thread(512, |_cx| 0).unwrap();
        let b = sched.create_thread(1024, |_cx| 0).unwrap();

        let ra = sched.stack_region(a).unwrap();
        let rb = sched.stack_region(b).unwrap();
        assert!(ra.top() <= rb.base() as usize);

        // Only the primed frame at the top has been written.
        let unused = sched.unused_stack(b).unwrap();
        assert!(unused >= 1024 - Scheduler::<ManualClock, 4>::min_stack_size::<()>());
        assert!(unused < 1024);
        assert!(sched.stack_status(a).unwrap().is_healthy());
    }

    #[test]
    fn test_stack_too_small() {
        let mut memory = vec![0u8; 4096];
        let mut sched = Scheduler::<ManualClock, 2>::new(&mut memory, ManualClock::new(0));

        assert!(matches!(
            sched.create_thread(8, |_cx| 0),
            Err(Error::StackTooSmall { requested: 8, .. })
        ));
        assert_eq!(sched.arena().used(), 0);
    }

    #[test]
    fn test_invalid_thread() {
        let mut memory = vec![0u8; 1024];
        let sched = Scheduler::<ManualClock, 2>::new(&mut memory, ManualClock::new(0));
        let id = ThreadId::new(1);

        assert_eq!(sched.state(id), Err(Error::InvalidThread(id)));
        assert_eq!(sched.unused_stack(id), Err(Error::InvalidThread(id)));
        assert!(!sched.is_live(id));
    }

    #[test]
    fn test_round_robin_order() {
        let order = RefCell::new(Vec::new());
        let mut memory = vec![0u8; 3 * REGION];

        let mut sched = Scheduler::<ManualClock, 3>::new(&mut memory, ManualClock::new(0));
        for _ in 0..3 {
            sched
                .create_thread(REGION, |cx| {
                    for _ in 0..3 {
                        order.borrow_mut().push(cx.id().index());
                        cx.yield_now();
                    }
                    0
                })
                .unwrap();
        }
        sched.run().unwrap();

        assert_eq!(*order.borrow(), [0, 1, 2, 0, 1, 2, 0, 1, 2]);
        for id in sched.threads() {
            assert_eq!(sched.activations(id), Ok(4));
            assert_eq!(sched.state(id), Ok(ThreadState::Terminated));
        }
        assert_eq!(sched.live_count(), 0);
        assert_eq!(sched.current(), None);
    }

    #[test]
    fn test_single_thread_gets_every_turn() {
        let order = RefCell::new(Vec::new());
        let mut memory = vec![0u8; REGION];

        let mut sched = Scheduler::<ManualClock, 1>::new(&mut memory, ManualClock::new(0));
        let id = sched
            .create_thread(REGION, |cx| {
                for _ in 0..3 {
                    order.borrow_mut().push(cx.id().index());
                    cx.yield_now();
                }
                0
            })
            .unwrap();
        sched.run().unwrap();

        assert_eq!(*order.borrow(), [0, 0, 0]);
        assert_eq!(sched.activations(id), Ok(4));
        assert_eq!(sched.platform().now(), 0);
    }

    #[test]
    fn test_handle_carries_own_id() {
        let seen = RefCell::new(Vec::new());
        let mut memory = vec![0u8; 2 * REGION];

        let mut sched = Scheduler::<ManualClock, 2>::new(&mut memory, ManualClock::new(0));
        for _ in 0..2 {
            sched
                .create_thread(REGION, |cx| {
                    seen.borrow_mut().push(cx.id());
                    0
                })
                .unwrap();
        }
        sched.run().unwrap();

        assert_eq!(*seen.borrow(), [ThreadId::new(0), ThreadId::new(1)]);
    }

    #[test]
    fn test_deep_recursion_lowers_only_own_mark() {
        let own = Cell::new((0, 0));
        let sibling = Cell::new((0, 0));
        let mut memory = vec![0u8; 2 * REGION];

        let mut sched = Scheduler::<ManualClock, 2>::new(&mut memory, ManualClock::new(0));
        let deep = ThreadId::new(0);
        let quiet = ThreadId::new(1);
        sched
            .create_thread(REGION, |cx| {
                let own_before = cx.unused_stack(deep).unwrap_or(0);
                let sibling_before = cx.unused_stack(quiet).unwrap_or(0);
                black_box(recurse(48));
                let own_after = cx.unused_stack(deep).unwrap_or(0);
                let sibling_after = cx.unused_stack(quiet).unwrap_or(0);
                own.set((own_before, own_after));
                sibling.set((sibling_before, sibling_after));
                0
            })
            .unwrap();
        sched.create_thread(REGION, |_cx| 0).unwrap();
        sched.run().unwrap();

        let (before, after) = own.get();
        assert!(after + 48 * 128 <= before);
        let (before, after) = sibling.get();
        assert_eq!(before, after);
    }

    #[test]
    fn test_unused_stack_is_idempotent() {
        let mut memory = vec![0u8; REGION];
        let mut sched = Scheduler::<ManualClock, 1>::new(&mut memory, ManualClock::new(0));
        let id = sched
            .create_thread(REGION, |_cx| {
                black_box(recurse(8));
                0
            })
            .unwrap();
        sched.run().unwrap();

        let first = sched.unused_stack(id).unwrap();
        let second = sched.unused_stack(id).unwrap();
        assert_eq!(first, second);
        assert!(first < REGION);
        assert_eq!(sched.check_stacks(), 0);
    }

    #[test]
    fn test_check_stacks_reports_overflow() {
        let mut memory = vec![0u8; 1024];
        let mut sched = Scheduler::<ManualClock, 1>::new(&mut memory, ManualClock::new(0));
        let id = sched.create_thread(512, |_cx| 0).unwrap();

        let region = sched.stack_region(id).unwrap();
        unsafe { core::ptr::write_bytes(region.base(), 0, region.size()) };

        assert_eq!(sched.stack_status(id), Ok(StackStatus::Exhausted));
        assert_eq!(sched.check_stacks(), 1);
    }

    #[test]
    fn test_create_after_run_fails() {
        let mut memory = vec![0u8; 2 * REGION];
        let mut sched = Scheduler::<ManualClock, 2>::new(&mut memory, ManualClock::new(0));
        sched.create_thread(REGION, |_cx| 0).unwrap();
        sched.run().unwrap();

        assert_eq!(sched.run(), Err(Error::AlreadyStarted));
        assert_eq!(
            sched.create_thread(REGION, |_cx| 0),
            Err(Error::AlreadyStarted)
        );
    }

    #[test]
    fn test_idle_advances_until_sleeper_wakes() {
        let mut memory = vec![0u8; REGION];
        let mut sched = Scheduler::<ManualClock, 1>::new(&mut memory, ManualClock::new(0));
        let id = sched
            .create_thread(REGION, |cx| {
                cx.sleep_ms(20);
                0
            })
            .unwrap();
        sched.run().unwrap();

        assert_eq!(sched.platform().now(), crate::time::ms_to_ticks(20));
        assert_eq!(sched.activations(id), Ok(2));
    }

    #[test]
    fn test_empty_scheduler_returns() {
        let mut memory = vec![0u8; 64];
        let sched = Scheduler::<ManualClock, 1>::new(&mut memory, ManualClock::new(0));
        assert_eq!(sched.run(), Ok(()));
    }
}
