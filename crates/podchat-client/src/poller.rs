//! Poll coalescing and the cleanup re-entrancy guard.
//!
//! Push channels deliver bursts of change signals; the coalescer folds a
//! burst into at most one running poll plus one follow-up, so a signal
//! arriving mid-poll is never lost and never fans out into a poll storm.

use std::sync::atomic::{AtomicBool, Ordering};

/// Where the poll loop currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// No poll running.
    Idle,
    /// A poll is in flight.
    Polling,
    /// A poll is in flight and a signal arrived since it started, so its
    /// result may already be stale.
    PollingStaleQueued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    /// A change signal arrived.
    Signal,
    /// The in-flight poll completed.
    PollFinished,
}

/// What the caller must do in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    StartPoll,
    /// The finished poll was stale; run one more.
    RunExtraPoll,
}

/// The coalescing state machine. Pure transitions, the caller owns the
/// actual polling.
#[derive(Debug)]
pub struct PollCoalescer {
    state: PollState,
}

impl PollCoalescer {
    pub fn new() -> Self {
        Self {
            state: PollState::Idle,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn on_event(&mut self, event: PollEvent) -> Option<PollAction> {
        let (next, action) = match (self.state, event) {
            (PollState::Idle, PollEvent::Signal) => {
                (PollState::Polling, Some(PollAction::StartPoll))
            }
            (PollState::Polling, PollEvent::Signal) => {
                (PollState::PollingStaleQueued, None)
            }
            (PollState::PollingStaleQueued, PollEvent::Signal) => {
                (PollState::PollingStaleQueued, None)
            }
            (PollState::Polling, PollEvent::PollFinished) => (PollState::Idle, None),
            (PollState::PollingStaleQueued, PollEvent::PollFinished) => {
                (PollState::Polling, Some(PollAction::RunExtraPoll))
            }
            // a stray completion without a poll in flight changes nothing
            (PollState::Idle, PollEvent::PollFinished) => (PollState::Idle, None),
        };
        self.state = next;
        action
    }
}

impl Default for PollCoalescer {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps background cleanup passes from overlapping. A pass that cannot
/// acquire the guard is simply skipped; the next tick picks the work up.
#[derive(Debug, Default)]
pub struct CleanupGuard {
    running: AtomicBool,
}

impl CleanupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the guard. `None` when a pass is already running.
    pub fn try_begin(&self) -> Option<CleanupToken<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CleanupToken { guard: self })
    }
}

/// Releases the guard on drop, also when the pass panics or is cancelled.
#[derive(Debug)]
pub struct CleanupToken<'a> {
    guard: &'a CleanupGuard,
}

impl Drop for CleanupToken<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_when_idle_starts_a_poll() {
        let mut coalescer = PollCoalescer::new();
        assert_eq!(coalescer.on_event(PollEvent::Signal), Some(PollAction::StartPoll));
        assert_eq!(coalescer.state(), PollState::Polling);
    }

    #[test]
    fn test_signals_during_a_poll_coalesce_into_one_extra() {
        let mut coalescer = PollCoalescer::new();
        coalescer.on_event(PollEvent::Signal);
        // three signals land while the poll runs
        assert_eq!(coalescer.on_event(PollEvent::Signal), None);
        assert_eq!(coalescer.on_event(PollEvent::Signal), None);
        assert_eq!(coalescer.on_event(PollEvent::Signal), None);
        assert_eq!(coalescer.state(), PollState::PollingStaleQueued);

        // finishing triggers exactly one follow-up poll
        assert_eq!(
            coalescer.on_event(PollEvent::PollFinished),
            Some(PollAction::RunExtraPoll)
        );
        assert_eq!(coalescer.state(), PollState::Polling);
        assert_eq!(coalescer.on_event(PollEvent::PollFinished), None);
        assert_eq!(coalescer.state(), PollState::Idle);
    }

    #[test]
    fn test_clean_finish_returns_to_idle() {
        let mut coalescer = PollCoalescer::new();
        coalescer.on_event(PollEvent::Signal);
        assert_eq!(coalescer.on_event(PollEvent::PollFinished), None);
        assert_eq!(coalescer.state(), PollState::Idle);
    }

    #[test]
    fn test_stray_finish_is_harmless() {
        let mut coalescer = PollCoalescer::new();
        assert_eq!(coalescer.on_event(PollEvent::PollFinished), None);
        assert_eq!(coalescer.state(), PollState::Idle);
    }

    #[test]
    fn test_cleanup_guard_excludes_overlapping_passes() {
        let guard = CleanupGuard::new();
        let token = guard.try_begin().unwrap();
        assert!(guard.try_begin().is_none());
        drop(token);
        assert!(guard.try_begin().is_some());
    }
}
