//! # Run lock: one in-flight computation per key.
//!
//! The lock owns a map from key to in-flight [`Task`] behind a single mutex. Every registration
//! and every removal goes through that mutex, so "is a task running for this key" always has
//! one consistent answer.
//!
//! ## Architecture
//! ```text
//!   start(k) ──┐                                ┌──► Slot::Owner(Finish)
//!   start(k) ──┼──► Mutex<HashMap<K, Task>> ────┤
//!   watch(k) ──┘      (check + attach/insert)   └──► Slot::Waiter(Wait) / Option<Wait>
//!
//!   Finish::finish(outcome) ──► lock ──► remove task ──► send outcome to listeners ──► unlock
//! ```
//!
//! ## Rules
//! - Check-and-attach and check-and-insert happen in one critical section.
//! - Completion removes the task and notifies its listeners in one critical section; nobody can
//!   attach to a task between its completion and its removal.
//! - Critical sections never suspend (oneshot sends do not block).
//! - Completion is generation-checked: a stale owner cannot complete a newer task for its key.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use super::config::RunLockConfig;
use super::slot::{Finish, Slot, Wait};
use super::task::{Outcome, Task};
use crate::error::RunError;
use crate::events::{Bus, Event, EventKind};

/// State shared by every clone of a [`RunLock`] and by its [`Finish`] handles.
pub(crate) struct Shared<K, V, E> {
    running: Mutex<HashMap<K, Task<V, E>>>,
    next_id: AtomicU64,
    bus: Bus,
}

impl<K, V, E> Shared<K, V, E> {
    fn new(cfg: &RunLockConfig) -> Self {
        Self {
            running: Mutex::new(HashMap::with_capacity(cfg.initial_capacity)),
            next_id: AtomicU64::new(0),
            bus: Bus::new(cfg.bus_capacity_clamped()),
        }
    }

    /// Builds an event only when somebody is listening.
    ///
    /// Called with the mutex held so that `seq` follows lock order.
    fn stamp(&self, kind: EventKind, label: &Arc<str>) -> Option<Event> {
        self.bus
            .has_receivers()
            .then(|| Event::new(kind).with_key(label.clone()))
    }

    fn publish(&self, ev: Option<Event>) {
        if let Some(ev) = ev {
            self.bus.publish(ev);
        }
    }
}

impl<K: Eq + Hash, V, E> Shared<K, V, E> {
    /// Owner completion: notify listeners, clear the key, pass the outcome through.
    pub(crate) fn complete(
        &self,
        key: &K,
        label: &Arc<str>,
        id: u64,
        outcome: Outcome<V, E>,
    ) -> Result<V, RunError<E>>
    where
        V: Clone,
        E: Clone,
    {
        trace!(key = %label, "taking run lock for completion");
        let mut running = self.running.lock();

        let owned = running.get(key).is_some_and(|task| task.id() == id);
        let task = if owned { running.remove(key) } else { None };
        let Some(task) = task else {
            let ev = self.stamp(EventKind::InvalidState, label);
            drop(running);

            warn!(key = %label, "completion found no task of its own; run lock state untouched");
            self.publish(ev);
            return Err(RunError::InvalidState { key: label.clone() });
        };

        let listeners = task.listener_count();
        let elapsed = task.elapsed();
        let kind = if outcome.is_ok() {
            EventKind::TaskFinished
        } else {
            EventKind::TaskFailed
        };
        let ev = self
            .stamp(kind, label)
            .map(|ev| ev.with_listeners(listeners).with_elapsed(elapsed));
        let delivered = task.notify(&outcome);
        drop(running);

        debug!(
            key = %label,
            listeners,
            delivered,
            ?elapsed,
            failed = outcome.is_err(),
            "task completed; listeners notified"
        );
        self.publish(ev);
        outcome.map_err(RunError::Failed)
    }

    /// Owner handle dropped without completing: clear the key and close every listener channel.
    pub(crate) fn abandon(&self, key: &K, label: &Arc<str>, id: u64) {
        let mut running = self.running.lock();

        let owned = running.get(key).is_some_and(|task| task.id() == id);
        let task = if owned { running.remove(key) } else { None };
        let Some(task) = task else {
            return;
        };

        let listeners = task.listener_count();
        let elapsed = task.elapsed();
        let ev = self
            .stamp(EventKind::TaskAbandoned, label)
            .map(|ev| ev.with_listeners(listeners).with_elapsed(elapsed));
        drop(running);

        // Closes every listener channel unsent.
        drop(task);

        warn!(
            key = %label,
            listeners,
            ?elapsed,
            "owner dropped without reporting an outcome; listeners released"
        );
        self.publish(ev);
    }
}

/// Keyed execution deduplication.
///
/// Guarantees at most one in-flight computation per key and delivers that computation's outcome
/// to every caller that asked for the key while it was running. The lock does not run anything
/// itself and keeps nothing once a task completes.
///
/// Cloning is cheap and every clone shares the same state; create one lock per key domain.
///
/// ### Type parameters
/// - `K`: key; `Eq + Hash`, plus `Clone + Debug` to register.
/// - `V`, `E`: success and error values of the computation; `Clone` so each listener gets a copy.
pub struct RunLock<K, V, E> {
    shared: Arc<Shared<K, V, E>>,
}

impl<K, V, E> RunLock<K, V, E> {
    /// Creates a run lock with [`RunLockConfig::default`].
    pub fn new() -> Self {
        Self::with_config(RunLockConfig::default())
    }

    /// Creates a run lock with the given configuration.
    pub fn with_config(cfg: RunLockConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(&cfg)),
        }
    }

    /// Subscribes to state transition events.
    ///
    /// The receiver only observes events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    /// Number of keys with a task in flight.
    pub fn len(&self) -> usize {
        self.shared.running.lock().len()
    }

    /// Returns `true` if no task is in flight.
    pub fn is_empty(&self) -> bool {
        self.shared.running.lock().is_empty()
    }
}

impl<K: Eq + Hash, V, E> RunLock<K, V, E> {
    /// Returns `true` if a task is in flight for `key`.
    pub fn is_running<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shared.running.lock().contains_key(key)
    }

    /// Number of listeners attached to the task for `key` (`0` if none is in flight).
    pub fn listeners<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shared
            .running
            .lock()
            .get(key)
            .map(Task::listener_count)
            .unwrap_or(0)
    }

    /// Snapshot of the keys currently in flight, in no particular order.
    pub fn running_keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.shared.running.lock().keys().cloned().collect()
    }
}

impl<K, V, E> RunLock<K, V, E>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Registers interest in `key`: become its owner, or join the task already in flight.
    ///
    /// - No task for `key`: a new task is inserted and [`Slot::Owner`] is returned. The caller
    ///   computes and then calls [`Finish::finish`] exactly once.
    /// - Task in flight: a listener is attached and [`Slot::Waiter`] is returned. Awaiting it
    ///   yields whatever the owner reports.
    ///
    /// ```
    /// use runlock::{RunLock, Slot};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let lock: RunLock<String, u32, String> = RunLock::new();
    ///
    /// let owner = lock.start("job1".to_string());
    /// let waiter = lock.start("job1".to_string());
    /// assert!(owner.is_owner());
    ///
    /// let mut finish = owner.into_owner().unwrap();
    /// let wait = waiter.into_waiter().unwrap();
    ///
    /// assert_eq!(finish.finish(Ok(42)), Ok(42));
    /// assert_eq!(wait.await, Ok(42));
    /// # }
    /// ```
    pub fn start(&self, key: K) -> Slot<K, V, E> {
        let label = key_label(&key);
        let mut running = self.shared.running.lock();

        if let Some(task) = running.get_mut(&key) {
            let rx = task.attach();
            let listeners = task.listener_count();
            let ev = self
                .shared
                .stamp(EventKind::ListenerJoined, &label)
                .map(|ev| ev.with_listeners(listeners));
            drop(running);

            debug!(key = %label, listeners, "task already running; joined as listener");
            self.shared.publish(ev);
            return Slot::Waiter(Wait::new(label, rx));
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        running.insert(key.clone(), Task::new(id));
        let ev = self.shared.stamp(EventKind::TaskStarted, &label);
        drop(running);

        debug!(key = %label, id, "starting new task");
        self.shared.publish(ev);
        Slot::Owner(Finish::new(Arc::clone(&self.shared), key, label, id))
    }

    /// Attaches to the task in flight for `key` without contending for ownership.
    ///
    /// Returns `None` right away when nothing is in flight. The existence check and the attach
    /// happen under one lock hold, so a returned [`Wait`] always receives the outcome.
    pub fn watch<Q>(&self, key: &Q) -> Option<Wait<V, E>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + Debug + ?Sized,
    {
        let mut running = self.shared.running.lock();
        let task = running.get_mut(key)?;

        let rx = task.attach();
        let listeners = task.listener_count();
        let label = key_label(key);
        let ev = self
            .shared
            .stamp(EventKind::WatcherJoined, &label)
            .map(|ev| ev.with_listeners(listeners));
        drop(running);

        debug!(key = %label, listeners, "watching running task");
        self.shared.publish(ev);
        Some(Wait::new(label, rx))
    }

    /// Waits for the task in flight for `key`, if any.
    ///
    /// With nothing in flight the returned future resolves immediately to `Ok(V::default())`.
    /// Registration happens when this method is called, not when the future is first polled.
    ///
    /// ```
    /// use runlock::RunLock;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let lock: RunLock<&str, u32, String> = RunLock::new();
    /// assert_eq!(lock.wait_for("job2").await, Ok(0));
    /// # }
    /// ```
    pub fn wait_for<Q>(
        &self,
        key: &Q,
    ) -> impl Future<Output = Result<V, RunError<E>>> + use<K, V, E, Q>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + Debug + ?Sized,
        V: Default,
    {
        let watch = self.watch(key);
        async move {
            match watch {
                Some(wait) => wait.await,
                None => Ok(V::default()),
            }
        }
    }

    /// Blocking form of [`wait_for`](RunLock::wait_for) for plain threads.
    ///
    /// # Panics
    /// Panics when it has to wait and is called from within an asynchronous execution context.
    pub fn wait_for_blocking<Q>(&self, key: &Q) -> Result<V, RunError<E>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + Debug + ?Sized,
        V: Default,
    {
        match self.watch(key) {
            Some(wait) => wait.wait_blocking(),
            None => Ok(V::default()),
        }
    }
}

impl<K, V, E> Clone for RunLock<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V, E> Default for RunLock<K, V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, E> fmt::Debug for RunLock<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLock")
            .field("running", &self.len())
            .finish()
    }
}

fn key_label<Q: Debug + ?Sized>(key: &Q) -> Arc<str> {
    Arc::from(format!("{key:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    type Lock = RunLock<String, u32, String>;

    fn owner(slot: Slot<String, u32, String>) -> Finish<String, u32, String> {
        match slot {
            Slot::Owner(finish) => finish,
            Slot::Waiter(_) => panic!("expected owner"),
        }
    }

    fn waiter(slot: Slot<String, u32, String>) -> Wait<u32, String> {
        match slot {
            Slot::Owner(_) => panic!("expected waiter"),
            Slot::Waiter(wait) => wait,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_start_yields_single_owner() {
        let lock = Lock::new();
        let barrier = Arc::new(tokio::sync::Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let lock = lock.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    lock.start("k".to_string())
                })
            })
            .collect();

        let mut slots = Vec::new();
        for res in futures::future::join_all(handles).await {
            slots.push(res.unwrap());
        }

        let owners = slots.iter().filter(|s| s.is_owner()).count();
        assert_eq!(owners, 1);
        assert_eq!(lock.listeners("k"), 15);

        let mut waits = Vec::new();
        let mut finish = None;
        for slot in slots {
            match slot {
                Slot::Owner(f) => finish = Some(f),
                Slot::Waiter(w) => waits.push(w),
            }
        }
        let mut finish = finish.unwrap();
        assert_eq!(finish.finish(Ok(3)), Ok(3));
        for res in futures::future::join_all(waits).await {
            assert_eq!(res, Ok(3));
        }
    }

    #[tokio::test]
    async fn fan_out_delivers_same_outcome() {
        let lock = Lock::new();
        let mut finish = owner(lock.start("job1".into()));
        let b = waiter(lock.start("job1".into()));
        let c = waiter(lock.start("job1".into()));

        let hb = tokio::spawn(b);
        let hc = tokio::spawn(c);

        assert_eq!(finish.finish(Ok(42)), Ok(42));
        assert_eq!(hb.await.unwrap(), Ok(42));
        assert_eq!(hc.await.unwrap(), Ok(42));

        assert!(!lock.is_running("job1"));
        assert!(lock.start("job1".into()).is_owner());
    }

    #[tokio::test]
    async fn failures_are_relayed_verbatim() {
        let lock = Lock::new();
        let mut finish = owner(lock.start("k".into()));
        let wait = waiter(lock.start("k".into()));

        assert_eq!(
            finish.finish(Err("boom".into())),
            Err(RunError::Failed("boom".to_string()))
        );
        assert_eq!(wait.await, Err(RunError::Failed("boom".to_string())));
    }

    #[tokio::test]
    async fn completed_key_has_no_memory() {
        let lock = Lock::new();
        let mut first = owner(lock.start("k".into()));
        first.finish(Ok(1)).unwrap();

        let mut second = owner(lock.start("k".into()));
        let wait = waiter(lock.start("k".into()));
        second.finish(Ok(2)).unwrap();
        assert_eq!(wait.await, Ok(2));
    }

    #[test]
    fn double_finish_is_invalid_state() {
        let lock = Lock::new();
        let mut finish = owner(lock.start("k".into()));

        assert_eq!(finish.finish(Ok(1)), Ok(1));
        let err = finish.finish(Ok(1)).unwrap_err();
        assert!(matches!(err, RunError::InvalidState { ref key } if &**key == "\"k\""));
    }

    #[tokio::test]
    async fn stale_finish_does_not_touch_newer_task() {
        let lock = Lock::new();
        let mut stale = owner(lock.start("k".into()));
        stale.finish(Ok(1)).unwrap();

        let mut fresh = owner(lock.start("k".into()));
        let wait = waiter(lock.start("k".into()));

        assert!(stale.finish(Ok(99)).unwrap_err().is_misuse());
        assert!(lock.is_running("k"));
        assert_eq!(lock.listeners("k"), 1);

        fresh.finish(Ok(2)).unwrap();
        assert_eq!(wait.await, Ok(2));
    }

    #[tokio::test]
    async fn dropped_owner_releases_listeners() {
        let lock = Lock::new();
        let finish = owner(lock.start("k".into()));
        let wait = waiter(lock.start("k".into()));

        drop(finish);
        assert!(!lock.is_running("k"));
        assert_eq!(
            wait.await,
            Err(RunError::Abandoned {
                key: "\"k\"".into()
            })
        );
        assert!(lock.start("k".into()).is_owner());
    }

    #[tokio::test]
    async fn wait_for_without_task_returns_default() {
        let lock = Lock::new();
        let res = tokio::time::timeout(Duration::from_secs(1), lock.wait_for("job2")).await;
        assert_eq!(res.unwrap(), Ok(0));
        assert!(lock.watch("job2").is_none());
    }

    #[tokio::test]
    async fn wait_for_receives_running_outcome() {
        let lock = Lock::new();
        let mut finish = owner(lock.start("k".into()));

        let pending = tokio::spawn(lock.wait_for("k"));
        let joined = waiter(lock.start("k".into()));
        assert_eq!(lock.listeners("k"), 2);

        finish.finish(Ok(7)).unwrap();
        assert_eq!(pending.await.unwrap(), Ok(7));
        assert_eq!(joined.await, Ok(7));
    }

    #[test]
    fn blocking_waiters_on_threads() {
        let lock = Lock::new();
        let mut finish = owner(lock.start("k".into()));

        let threads: Vec<_> = (0..4)
            .map(|i| {
                let wait = if i % 2 == 0 {
                    waiter(lock.start("k".into()))
                } else {
                    lock.watch("k").unwrap()
                };
                std::thread::spawn(move || wait.wait_blocking())
            })
            .collect();

        finish.finish(Ok(5)).unwrap();
        for t in threads {
            assert_eq!(t.join().unwrap(), Ok(5));
        }
        assert_eq!(lock.wait_for_blocking("k"), Ok(0));
    }

    #[test]
    fn introspection_snapshots() {
        let lock = Lock::new();
        assert!(lock.is_empty());

        let mut a = owner(lock.start("a".into()));
        let _b = owner(lock.start("b".into()));
        assert_eq!(lock.len(), 2);

        let mut keys = lock.running_keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        a.finish(Ok(0)).unwrap();
        assert_eq!(lock.len(), 1);
        assert!(lock.is_running("b"));
        assert_eq!(lock.listeners("a"), 0);
    }

    #[tokio::test]
    async fn events_follow_key_lifecycle() {
        let lock = Lock::new();
        let mut rx = lock.subscribe();

        let mut finish = owner(lock.start("k".into()));
        let wait = waiter(lock.start("k".into()));
        let watch = lock.watch("k").unwrap();
        assert!(finish.finish(Err("boom".into())).is_err());
        assert!(finish.finish(Ok(0)).is_err());

        let kinds: Vec<_> = (0..5).map(|_| rx.try_recv().unwrap().kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::TaskStarted,
                EventKind::ListenerJoined,
                EventKind::WatcherJoined,
                EventKind::TaskFailed,
                EventKind::InvalidState,
            ]
        );
        assert!(wait.await.is_err());
        assert!(watch.await.is_err());
    }

    #[tokio::test]
    async fn finished_event_carries_listener_count() {
        let lock = Lock::new();
        let mut rx = lock.subscribe();

        let mut finish = owner(lock.start("k".into()));
        let _w1 = waiter(lock.start("k".into()));
        let _w2 = waiter(lock.start("k".into()));
        finish.finish(Ok(1)).unwrap();

        let last = std::iter::from_fn(|| rx.try_recv().ok()).last().unwrap();
        assert_eq!(last.kind, EventKind::TaskFinished);
        assert_eq!(last.key.as_deref(), Some("\"k\""));
        assert_eq!(last.listeners, Some(2));
        assert!(last.elapsed_ms.is_some());
    }

    #[test]
    fn abandoned_event_is_published() {
        let lock = Lock::new();
        let mut rx = lock.subscribe();

        drop(owner(lock.start("k".into())));

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|ev| ev.kind)
            .collect();
        assert_eq!(kinds, vec![EventKind::TaskStarted, EventKind::TaskAbandoned]);
    }
}
