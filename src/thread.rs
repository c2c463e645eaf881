//! # Thread Control Block
//!
//! Per-thread bookkeeping owned by the scheduler. A TCB slot is claimed
//! once, before the run loop starts, and keeps its id and stack region for
//! the rest of the program, even after its thread terminates.
//!
//! Fields use `Cell` because the running thread, the scheduler loop and
//! the monitor all reach the table through shared references; only one of
//! them executes at any time on the single core.

use core::cell::Cell;
use core::fmt;

use crate::arena::StackRegion;
use crate::context::Context;
use crate::time::{deadline_reached, Ticks};

/// Small integer handle of a thread, equal to its slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(usize);

impl ThreadId {
    pub const fn new(index: usize) -> Self {
        ThreadId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

/// Execution state of a thread.
///
/// ```text
///   Unused ──create──► Ready ──select──► Running ──return/exit──► Terminated
///                        ▲                  │
///                        │   yield          │
///                        ├──────────────────┤
///                        │                  │ sleep / block_until
///                        │   wake           ▼
///                        └─────────────── Blocked
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Unused,
    Ready,
    Running,
    Blocked,
    Terminated,
}

/// Why a Blocked thread is waiting.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Wait {
    None,
    /// Resume once the clock reaches this tick.
    Until(Ticks),
    /// Resume once the predicate returns true. The predicate lives in the
    /// blocked thread's frame, which stays intact while it is suspended.
    Condition(*const (dyn Fn() -> bool + 'static)),
}

pub(crate) struct Tcb<'a> {
    pub(crate) id: ThreadId,
    pub(crate) state: Cell<ThreadState>,
    pub(crate) context: Context,
    pub(crate) region: Cell<Option<StackRegion<'a>>>,
    pub(crate) wait: Cell<Wait>,
    pub(crate) exit_code: Cell<Option<i32>>,
    pub(crate) activations: Cell<u32>,
}

impl<'a> Tcb<'a> {
    pub(crate) const fn empty(id: ThreadId) -> Self {
        Self {
            id,
            state: Cell::new(ThreadState::Unused),
            context: Context::new(),
            region: Cell::new(None),
            wait: Cell::new(Wait::None),
            exit_code: Cell::new(None),
            activations: Cell::new(0),
        }
    }

    /// Promote a Blocked thread whose wait is over to Ready, then report
    /// whether the thread can be selected.
    pub(crate) fn poll(&self, now: Ticks) -> bool {
        if self.state.get() == ThreadState::Blocked {
            let due = match self.wait.get() {
                Wait::None => true,
                Wait::Until(deadline) => deadline_reached(now, deadline),
                // The pointer is only stored while its owner is Blocked.
                Wait::Condition(condition) => unsafe { (*condition)() },
            };
            if due {
                self.wait.set(Wait::None);
                self.state.set(ThreadState::Ready);
            }
        }

        self.state.get() == ThreadState::Ready
    }

    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        !matches!(
            self.state.get(),
            ThreadState::Unused | ThreadState::Terminated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_empty_tcb() {
        let tcb = Tcb::empty(ThreadId::new(2));
        assert_eq!(tcb.id.index(), 2);
        assert_eq!(tcb.state.get(), ThreadState::Unused);
        assert!(tcb.region.get().is_none());
        assert!(tcb.exit_code.get().is_none());
        assert!(!tcb.is_live());
        assert!(!tcb.poll(0));
    }

    #[test]
    fn test_sleeping_thread_wakes_at_deadline() {
        let tcb = Tcb::empty(ThreadId::new(0));
        tcb.state.set(ThreadState::Blocked);
        tcb.wait.set(Wait::Until(110));

        assert!(!tcb.poll(10));
        assert!(!tcb.poll(109));
        assert_eq!(tcb.state.get(), ThreadState::Blocked);

        assert!(tcb.poll(110));
        assert_eq!(tcb.state.get(), ThreadState::Ready);
        assert!(matches!(tcb.wait.get(), Wait::None));
    }

    #[test]
    fn test_condition_polled_until_true() {
        let flag = Cell::new(false);
        let condition = || flag.get();
        let condition: &dyn Fn() -> bool = &condition;
        let condition: *const (dyn Fn() -> bool + '_) = condition;

        let tcb = Tcb::empty(ThreadId::new(1));
        tcb.state.set(ThreadState::Blocked);
        tcb.wait
            .set(Wait::Condition(unsafe { core::mem::transmute(condition) }));

        assert!(!tcb.poll(0));
        assert!(!tcb.poll(1));
        flag.set(true);
        assert!(tcb.poll(2));
        assert!(tcb.is_live());
    }

    #[test]
    fn test_terminated_never_ready() {
        let tcb = Tcb::empty(ThreadId::new(4));
        tcb.state.set(ThreadState::Terminated);
        tcb.exit_code.set(Some(-1));

        assert!(!tcb.poll(1000));
        assert!(!tcb.is_live());
    }

    #[test]
    fn test_thread_id_display() {
        assert_eq!(ThreadId::new(7).to_string(), "thread#7");
    }
}
