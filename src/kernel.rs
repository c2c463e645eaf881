//! # Kernel
//!
//! The thread-facing API. Every thread entry receives a [`Cothread`]
//! handle; it is the only way to reach the scheduler from inside a thread,
//! and each of its suspending methods is an explicit point where other
//! threads get to run.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► configure_systick()       ← time base for sleep()
//!         ├─► Scheduler::new()          ← arena + platform
//!         ├─► Scheduler::create_thread() (×N, errors routed to halt())
//!         └─► Scheduler::start()        ← run loop, never returns
//! ```

use crate::error::Error;
use crate::scheduler::Scheduler;
use crate::stackmon::StackStatus;
use crate::thread::{ThreadId, Wait};
use crate::time::{ms_to_ticks, Platform, Ticks, MAX_SLEEP};

/// Handle passed to a running thread.
pub struct Cothread<'s, 'a: 's, P: Platform, const N: usize> {
    pub(crate) sched: &'s Scheduler<'a, P, N>,
    pub(crate) id: ThreadId,
}

impl<P: Platform, const N: usize> Clone for Cothread<'_, '_, P, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Platform, const N: usize> Copy for Cothread<'_, '_, P, N> {}

impl<'s, 'a: 's, P: Platform, const N: usize> Cothread<'s, 'a, P, N> {
    /// Id of the calling thread.
    #[inline]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    #[inline]
    pub fn now(&self) -> Ticks {
        self.sched.platform().now()
    }

    #[inline]
    pub fn platform(&self) -> &'s P {
        self.sched.platform()
    }

    /// Give every other Ready thread one turn, then continue.
    pub fn yield_now(&self) {
        self.sched.suspend(self.id, Wait::None);
    }

    /// Like `yield_now()`, but `target` runs next if it is Ready or its
    /// wait is over. Otherwise the round-robin order applies unchanged.
    pub fn yield_to(&self, target: ThreadId) -> crate::Result<()> {
        self.sched.yield_to(self.id, target)
    }

    /// Wait for `thread` to terminate and return its exit code.
    pub fn join(&self, thread: ThreadId) -> crate::Result<i32> {
        if thread == self.id {
            return Err(Error::InvalidThread(thread));
        }
        loop {
            if let Some(code) = self.sched.exit_code(thread)? {
                return Ok(code);
            }
            self.block_until(|| matches!(self.sched.exit_code(thread), Ok(Some(_))));
        }
    }

    /// Suspend for at least `ticks` ticks. Durations beyond
    /// [`MAX_SLEEP`] are clamped.
    pub fn sleep(&self, ticks: Ticks) {
        let deadline = self.now().wrapping_add(ticks.min(MAX_SLEEP));
        self.sched.suspend(self.id, Wait::Until(deadline));
    }

    pub fn sleep_ms(&self, ms: u32) {
        self.sleep(ms_to_ticks(ms));
    }

    /// Suspend until `condition` returns true.
    ///
    /// The scheduler evaluates `condition` from its own loop each time it
    /// considers this thread, so it must be cheap and must not suspend.
    /// Calling a suspending method of the handle from inside it halts.
    /// The thread always gives up its turn, even if `condition` already
    /// holds.
    pub fn block_until<F>(&self, condition: F)
    where
        F: Fn() -> bool,
    {
        let condition: &dyn Fn() -> bool = &condition;
        let condition: *const (dyn Fn() -> bool + '_) = condition;
        // Erasing the lifetime is sound: `condition` stays in this frame
        // until the thread resumes, and the scheduler drops the pointer
        // before resuming it.
        let condition: *const (dyn Fn() -> bool + 'static) =
            unsafe { core::mem::transmute(condition) };
        self.sched.suspend(self.id, Wait::Condition(condition));
    }

    /// Bytes of `thread`'s stack never written so far.
    pub fn unused_stack(&self, thread: ThreadId) -> crate::Result<usize> {
        self.sched.unused_stack(thread)
    }

    pub fn stack_status(&self, thread: ThreadId) -> crate::Result<StackStatus> {
        self.sched.stack_status(thread)
    }

    /// Terminate the calling thread with `code`. Locals of the entry are
    /// not dropped.
    pub fn exit(&self, code: i32) -> ! {
        self.sched.terminate(self.id, code)
    }
}

/// Fatal path for configuration errors and handle misuse: log, then
/// panic. With `panic-halt` on the target this stops the core where a
/// debugger can inspect it.
#[cold]
pub fn halt(err: Error) -> ! {
    co_error!("halt: {}", err);
    panic!("cothread: {}", err.as_str())
}
