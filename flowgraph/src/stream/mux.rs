//! The per-session event multiplexer.
//!
//! Explicitly constructed and dependency-injected; there is no process
//! global. Publishing is synchronous and non-blocking (history append plus
//! `try_send` per listener), so synchronous call sites can publish without
//! holding an executor handle.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use super::event::RunEvent;

/// Bounded depth of each subscriber's queue; a listener that falls this
/// far behind is dropped rather than stalling the publisher.
const LISTENER_QUEUE_DEPTH: usize = 128;

#[derive(Default)]
struct SessionChannel {
    history: Vec<RunEvent>,
    listeners: Vec<mpsc::Sender<RunEvent>>,
}

/// Publish/subscribe hub keyed by session id, with per-session replayable
/// history.
///
/// Per-session appends are serialized by the map's exclusive entry access
/// (single-writer-at-a-time per session); `history` returns a consistent
/// point-in-time copy.
///
/// **Interaction**: constructed by the host at process start, shared with
/// the session facade behind an `Arc`; `clear` is called once a run's
/// results are durably persisted elsewhere.
#[derive(Default)]
pub struct EventMux {
    sessions: DashMap<String, SessionChannel>,
}

impl EventMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the session's history and forwards to every live
    /// subscriber. Listeners whose queue is closed or full are silently
    /// dropped from the set; publish never blocks.
    pub fn publish(&self, session_id: &str, event: RunEvent) {
        let mut channel = self
            .sessions
            .entry(session_id.to_string())
            .or_default();
        channel.history.push(event.clone());
        channel
            .listeners
            .retain(|tx| tx.try_send(event.clone()).is_ok());
    }

    /// Live stream of events published after this call; no replay. Use
    /// [`EventMux::history`] for what was published before joining.
    pub fn subscribe(&self, session_id: &str) -> ReceiverStream<RunEvent> {
        let (tx, rx) = mpsc::channel(LISTENER_QUEUE_DEPTH);
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .listeners
            .push(tx);
        ReceiverStream::new(rx)
    }

    /// Everything published to the session so far, in publish order.
    pub fn history(&self, session_id: &str) -> Vec<RunEvent> {
        self.sessions
            .get(session_id)
            .map(|channel| channel.history.clone())
            .unwrap_or_default()
    }

    /// Drops the session's history and listener set.
    pub fn clear(&self, session_id: &str) {
        if self.sessions.remove(session_id).is_some() {
            debug!(session_id, "cleared session event history");
        }
    }
}

/// A session-bound emitter handed to nodes through the run context.
///
/// The detached form (no mux) swallows events, so graphs can run without
/// any observer wired up.
#[derive(Clone)]
pub struct SessionEvents {
    mux: Option<std::sync::Arc<EventMux>>,
    session_id: String,
}

impl SessionEvents {
    /// An emitter bound to one session of the given mux.
    pub fn bound(mux: std::sync::Arc<EventMux>, session_id: impl Into<String>) -> Self {
        Self {
            mux: Some(mux),
            session_id: session_id.into(),
        }
    }

    /// An emitter that publishes nowhere.
    pub fn detached(session_id: impl Into<String>) -> Self {
        Self {
            mux: None,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn emit(&self, event: RunEvent) {
        if let Some(mux) = &self.mux {
            mux.publish(&self.session_id, event);
        }
    }

    pub fn log(&self, message: impl Into<String>) {
        self.emit(RunEvent::log(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_stream::StreamExt;

    /// **Scenario**: Three events published before any subscriber are all
    /// returned by history, in publish order.
    #[tokio::test]
    async fn history_returns_publish_order() {
        let mux = EventMux::new();
        for i in 1..=3 {
            mux.publish("s1", RunEvent::log(format!("event {i}")));
        }
        let history = mux.history("s1");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0], RunEvent::log("event 1"));
        assert_eq!(history[2], RunEvent::log("event 3"));
    }

    /// **Scenario**: A subscriber joining mid-stream receives only later
    /// events, while history still returns all of them.
    #[tokio::test]
    async fn late_subscriber_gets_live_events_only() {
        let mux = EventMux::new();
        mux.publish("s1", RunEvent::log("one"));

        let mut stream = mux.subscribe("s1");
        mux.publish("s1", RunEvent::log("two"));
        mux.publish("s1", RunEvent::log("three"));
        drop_listeners(&mux, "s1");

        let received: Vec<_> = stream.collect().await;
        assert_eq!(received, vec![RunEvent::log("two"), RunEvent::log("three")]);
        assert_eq!(mux.history("s1").len(), 3);
    }

    /// **Scenario**: Sessions are isolated; publishing to one never leaks
    /// into another's history or stream.
    #[tokio::test]
    async fn sessions_are_isolated() {
        let mux = EventMux::new();
        mux.publish("a", RunEvent::log("for a"));
        mux.publish("b", RunEvent::log("for b"));
        assert_eq!(mux.history("a"), vec![RunEvent::log("for a")]);
        assert_eq!(mux.history("b"), vec![RunEvent::log("for b")]);
    }

    /// **Scenario**: clear drops history; a later publish starts fresh.
    #[tokio::test]
    async fn clear_resets_session() {
        let mux = EventMux::new();
        mux.publish("s1", RunEvent::log("old"));
        mux.clear("s1");
        assert!(mux.history("s1").is_empty());
        mux.publish("s1", RunEvent::log("new"));
        assert_eq!(mux.history("s1"), vec![RunEvent::log("new")]);
    }

    /// **Scenario**: A dropped subscriber is removed from the listener set
    /// on the next publish instead of blocking it.
    #[tokio::test]
    async fn dead_listener_dropped_silently() {
        let mux = EventMux::new();
        let stream = mux.subscribe("s1");
        drop(stream);
        mux.publish("s1", RunEvent::log("after drop"));
        let listeners = mux
            .sessions
            .get("s1")
            .map(|c| c.listeners.len())
            .unwrap_or_default();
        assert_eq!(listeners, 0);
        assert_eq!(mux.history("s1").len(), 1);
    }

    /// **Scenario**: Concurrent publishers from parallel tasks produce one
    /// consistent total order (every event lands exactly once).
    #[tokio::test]
    async fn concurrent_publishes_all_recorded() {
        let mux = Arc::new(EventMux::new());
        let mut handles = Vec::new();
        for branch in 0..4 {
            let mux = Arc::clone(&mux);
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    mux.publish("s1", RunEvent::log(format!("b{branch}-{i}")));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let history = mux.history("s1");
        assert_eq!(history.len(), 100);
        let unique: std::collections::HashSet<_> = history
            .iter()
            .map(|e| format!("{e:?}"))
            .collect();
        assert_eq!(unique.len(), 100, "no event lost or duplicated");
    }

    /// **Scenario**: A detached SessionEvents emitter swallows events
    /// without panicking; a bound one forwards to the mux.
    #[tokio::test]
    async fn session_events_binding() {
        let detached = SessionEvents::detached("s0");
        detached.log("nowhere");

        let mux = Arc::new(EventMux::new());
        let events = SessionEvents::bound(Arc::clone(&mux), "s1");
        events.log("recorded");
        assert_eq!(mux.history("s1"), vec![RunEvent::log("recorded")]);
        assert_eq!(events.session_id(), "s1");
    }

    fn drop_listeners(mux: &EventMux, session_id: &str) {
        if let Some(mut channel) = mux.sessions.get_mut(session_id) {
            channel.listeners.clear();
        }
    }
}
