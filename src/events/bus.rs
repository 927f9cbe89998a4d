//! # Event bus for broadcasting run lock events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from every handle sharing a run lock.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Receivers (many):
//!   RunLock::start ───┐
//!   RunLock::watch ───┼──────► Bus ───────► RunLock::subscribe() ──► caller
//!   Finish::finish ───┤  (broadcast chan)
//!   Finish (drop)  ───┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it is safe to call with the run lock's
//!   mutex held.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for run lock events.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately.
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to a minimum of 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Returns `true` when at least one receiver would observe a published event.
    ///
    /// Lets publishers skip building events nobody reads.
    #[inline]
    pub fn has_receivers(&self) -> bool {
        self.tx.receiver_count() > 0
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn publish_without_receivers_is_noop() {
        let bus = Bus::new(0);
        assert!(!bus.has_receivers());
        bus.publish(Event::new(EventKind::TaskStarted));
    }

    #[tokio::test]
    async fn receiver_sees_events_after_subscribe() {
        let bus = Bus::new(4);
        bus.publish(Event::new(EventKind::TaskStarted));

        let mut rx = bus.subscribe();
        assert!(bus.has_receivers());
        bus.publish(Event::new(EventKind::TaskFinished).with_key("k"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::TaskFinished);
        assert_eq!(ev.key.as_deref(), Some("k"));
    }
}
