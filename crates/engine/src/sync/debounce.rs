use std::time::Duration;

use selectsync_types::SearchTerm;
use tokio::time::Instant;

/// Coalescing timer for search triggers.
///
/// Every scheduled search cancels the pending one and restarts the window, so
/// a burst of keystrokes produces a single cycle carrying the last term.
#[derive(Debug, Clone)]
pub struct SearchCoalescer {
    window: Duration,
    pending: Option<PendingSearch>,
}

#[derive(Debug, Clone)]
struct PendingSearch {
    term: Option<SearchTerm>,
    due: Instant,
}

impl SearchCoalescer {
    pub fn new(window: Duration) -> Self {
        Self { window, pending: None }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Schedules `term`, replacing any pending search. Returns the new deadline.
    pub fn schedule(&mut self, term: Option<SearchTerm>, now: Instant) -> Instant {
        let due = now + self.window;
        self.pending = Some(PendingSearch { term, due });
        due
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.due)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Takes the pending term once its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<Option<SearchTerm>> {
        if self.pending.as_ref().is_some_and(|pending| pending.due <= now) {
            return self.pending.take().map(|pending| pending.term);
        }
        None
    }

    /// Drops the pending search. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }
}
