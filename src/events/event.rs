//! # Events emitted by a run lock.
//!
//! The [`EventKind`] enum classifies state transitions of a key:
//! - **Registration events**: a task started, a listener or watcher attached
//! - **Completion events**: the owner reported success or failure
//! - **Misuse events**: the owner abandoned its task, or completion found no task
//!
//! The [`Event`] struct carries the key, the listener count and the task duration where known.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Events are stamped while the run lock's mutex is held, so `seq` order matches the order in
//! which transitions took effect even if receivers observe them late.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use runlock::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskFinished)
//!     .with_key("\"job1\"")
//!     .with_listeners(2)
//!     .with_elapsed(Duration::from_millis(40));
//!
//! assert_eq!(ev.kind, EventKind::TaskFinished);
//! assert_eq!(ev.key.as_deref(), Some("\"job1\""));
//! assert_eq!(ev.listeners, Some(2));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of run lock events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Registration events ===
    /// First caller for a key became its owner.
    ///
    /// Sets:
    /// - `key`: key rendering
    /// - `at`, `seq`
    TaskStarted,

    /// A `start` caller attached to an in-flight task.
    ///
    /// Sets:
    /// - `key`: key rendering
    /// - `listeners`: listener count after attaching
    /// - `at`, `seq`
    ListenerJoined,

    /// A passive `watch`/`wait_for` caller attached to an in-flight task.
    ///
    /// Sets:
    /// - `key`: key rendering
    /// - `listeners`: listener count after attaching
    /// - `at`, `seq`
    WatcherJoined,

    // === Completion events ===
    /// Owner completed with a successful outcome; listeners notified and key cleared.
    ///
    /// Sets:
    /// - `key`: key rendering
    /// - `listeners`: number of listeners notified
    /// - `elapsed_ms`: time since the task started
    /// - `at`, `seq`
    TaskFinished,

    /// Owner completed with a failed outcome; listeners notified and key cleared.
    ///
    /// Same fields as [`EventKind::TaskFinished`].
    TaskFailed,

    // === Misuse events ===
    /// Owner handle dropped without completing; listeners released with `Abandoned`.
    ///
    /// Same fields as [`EventKind::TaskFinished`].
    TaskAbandoned,

    /// Completion found no task of its own for the key.
    ///
    /// Sets:
    /// - `key`: key rendering
    /// - `at`, `seq`
    InvalidState,
}

impl EventKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::TaskStarted => "task_started",
            EventKind::ListenerJoined => "listener_joined",
            EventKind::WatcherJoined => "watcher_joined",
            EventKind::TaskFinished => "task_finished",
            EventKind::TaskFailed => "task_failed",
            EventKind::TaskAbandoned => "task_abandoned",
            EventKind::InvalidState => "invalid_state",
        }
    }
}

/// Run lock event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Debug rendering of the key.
    pub key: Option<Arc<str>>,
    /// Listener count (attached so far, or notified on completion).
    pub listeners: Option<usize>,
    /// Task duration in milliseconds (compact).
    pub elapsed_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            key: None,
            listeners: None,
            elapsed_ms: None,
        }
    }

    /// Attaches a key rendering.
    #[inline]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attaches a listener count.
    #[inline]
    pub fn with_listeners(mut self, n: usize) -> Self {
        self.listeners = Some(n);
        self
    }

    /// Attaches a task duration (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.elapsed_ms = Some(ms);
        self
    }

    /// True for events that end a task (finished, failed or abandoned).
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::TaskFinished | EventKind::TaskFailed | EventKind::TaskAbandoned
        )
    }
}
