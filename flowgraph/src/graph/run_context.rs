//! Run context passed into every node.

use tokio_util::sync::CancellationToken;

use crate::stream::SessionEvents;

/// Per-run context: the session-bound event emitter and the cancellation
/// token the owner (and fan-out scheduler) can trip.
#[derive(Clone)]
pub struct RunContext {
    /// Emitter bound to this run's session id; detached when no observer
    /// is wired up.
    pub events: SessionEvents,
    /// Cooperative cancellation for the whole run. Branch tasks and retry
    /// backoffs watch this.
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Context with a fresh cancellation token.
    pub fn new(events: SessionEvents) -> Self {
        Self {
            events,
            cancel: CancellationToken::new(),
        }
    }

    /// Context watching an owner-held token.
    pub fn with_cancel(events: SessionEvents, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    pub fn session_id(&self) -> &str {
        self.events.session_id()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Child context for one fan-out branch: same emitter, child token so
    /// a sibling failure cancels the branch without tripping the owner's
    /// token.
    pub(crate) fn branch(&self, cancel: CancellationToken) -> Self {
        Self {
            events: self.events.clone(),
            cancel,
        }
    }
}
