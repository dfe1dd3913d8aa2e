//! User-initiated cancellation of a running fragment.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[derive(Debug, Default)]
struct State {
    executing: AtomicBool,
    requested: AtomicBool,
}

/// Shared between the runner (which polls it from the engine's progress
/// callback) and whatever delivers the cancel signal.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    state: Arc<State>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `false` when no fragment is running, in
    /// which case nothing is recorded.
    pub fn interrupt(&self) -> bool {
        if !self.state.executing.load(Ordering::SeqCst) {
            return false;
        }
        self.state.requested.store(true, Ordering::SeqCst);
        true
    }

    pub fn is_requested(&self) -> bool {
        self.state.requested.load(Ordering::SeqCst)
    }

    pub fn is_executing(&self) -> bool {
        self.state.executing.load(Ordering::SeqCst)
    }

    pub(crate) fn begin(&self) -> ExecutingGuard {
        self.state.requested.store(false, Ordering::SeqCst);
        self.state.executing.store(true, Ordering::SeqCst);
        ExecutingGuard { handle: self.clone() }
    }
}

pub(crate) struct ExecutingGuard {
    handle: InterruptHandle,
}

impl Drop for ExecutingGuard {
    fn drop(&mut self) {
        self.handle.state.executing.store(false, Ordering::SeqCst);
        self.handle.state.requested.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_interrupt_is_ignored() {
        let h = InterruptHandle::new();
        assert!(!h.interrupt());
        assert!(!h.is_requested());
    }

    #[test]
    fn interrupt_only_lives_for_one_execution() {
        let h = InterruptHandle::new();
        {
            let _g = h.begin();
            assert!(h.is_executing());
            assert!(h.interrupt());
            assert!(h.is_requested());
        }
        assert!(!h.is_executing());
        assert!(!h.is_requested());
    }
}
