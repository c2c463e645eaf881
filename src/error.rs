//! # Errors
//!
//! Everything that can go wrong while configuring the scheduler. Nothing
//! in here is reported once threads are running: a corrupted stack is only
//! visible afterwards through the stack monitor.

use core::fmt;

use crate::thread::ThreadId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The arena has fewer bytes left than the region asked for.
    ArenaExhausted { requested: usize, available: usize },
    /// The region cannot even hold the initial frame of its thread. The
    /// frame is larger on hard-float Cortex-M targets, where S16–S31 are
    /// saved too: 100 bytes there against 36 on soft-float.
    StackTooSmall { requested: usize, minimum: usize },
    /// Every TCB slot is already claimed.
    NoFreeSlot,
    /// Threads can only be created before the run loop starts.
    AlreadyStarted,
    /// No thread with this id was ever created.
    InvalidThread(ThreadId),
    /// A thread handle tried to suspend while its thread was not the one
    /// running, e.g. from a `block_until` predicate.
    NotRunning(ThreadId),
}

impl Error {
    pub fn as_str(self) -> &'static str {
        match self {
            Error::ArenaExhausted { .. } => "stack arena exhausted",
            Error::StackTooSmall { .. } => "stack region too small for initial frame",
            Error::NoFreeSlot => "no free thread slot",
            Error::AlreadyStarted => "scheduler already started",
            Error::InvalidThread(_) => "invalid thread id",
            Error::NotRunning(_) => "thread handle used while its thread is not running",
        }
    }

    /// Whether this error means the system was set up with too few
    /// resources and must not proceed.
    pub fn is_configuration(self) -> bool {
        !matches!(self, Error::InvalidThread(_) | Error::NotRunning(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::ArenaExhausted {
                requested,
                available,
            } => write!(
                f,
                "{}: requested {} bytes, {} available",
                self.as_str(),
                requested,
                available
            ),
            Error::StackTooSmall { requested, minimum } => write!(
                f,
                "{}: requested {} bytes, need at least {}",
                self.as_str(),
                requested,
                minimum
            ),
            Error::InvalidThread(id) | Error::NotRunning(id) => {
                write!(f, "{}: {}", self.as_str(), id)
            }
            Error::NoFreeSlot | Error::AlreadyStarted => f.write_str(self.as_str()),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
