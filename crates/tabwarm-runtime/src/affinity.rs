//! Home-thread affinity checks.
//!
//! Every stateful component records the thread it was built on and asserts
//! on entry that it is still being called there. Cross-thread callers go
//! through [`crate::ManagerHandle`], which marshals onto the home thread.

use std::thread::{self, ThreadId};

/// The thread a component belongs to.
#[derive(Clone, Copy, Debug)]
pub struct ThreadAffinity {
    owner: ThreadId,
}

impl ThreadAffinity {
    /// Bind to the calling thread.
    pub fn current() -> Self {
        Self {
            owner: thread::current().id(),
        }
    }

    /// Whether the calling thread is the owner.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Debug-assert that `op` runs on the owning thread.
    #[track_caller]
    pub fn assert_current(&self, op: &'static str) {
        debug_assert!(self.is_current(), "{op} called off the home thread");
    }
}
