//! Handles returned by [`RunLock::start`](crate::RunLock::start).
//!
//! ```text
//! start(key) ──► Slot::Owner(Finish)  ── compute ──► finish(outcome) ──► notify + clear key
//!            └─► Slot::Waiter(Wait)   ── .await / wait_blocking() ──────► outcome
//! ```
//!
//! Exactly one variant is produced per call; callers branch on it.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::lock::Shared;
use super::task::Outcome;
use crate::error::RunError;

/// Result of [`RunLock::start`](crate::RunLock::start): either ownership of the key's
/// computation, or a handle to wait for the current owner.
#[must_use = "an owner must call `finish`; a waiter must be awaited"]
pub enum Slot<K, V, E>
where
    K: Eq + Hash,
{
    /// First caller for the key: compute, then call [`Finish::finish`].
    Owner(Finish<K, V, E>),
    /// A task is already in flight: await this for its outcome.
    Waiter(Wait<V, E>),
}

impl<K: Eq + Hash, V, E> Slot<K, V, E> {
    /// Returns `true` if this caller owns the computation.
    #[inline]
    pub fn is_owner(&self) -> bool {
        matches!(self, Slot::Owner(_))
    }

    /// Returns the owner handle, if any.
    pub fn into_owner(self) -> Option<Finish<K, V, E>> {
        match self {
            Slot::Owner(finish) => Some(finish),
            Slot::Waiter(_) => None,
        }
    }

    /// Returns the wait handle, if any.
    pub fn into_waiter(self) -> Option<Wait<V, E>> {
        match self {
            Slot::Owner(_) => None,
            Slot::Waiter(wait) => Some(wait),
        }
    }
}

impl<K: Eq + Hash, V, E> fmt::Debug for Slot<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Owner(finish) => f.debug_tuple("Owner").field(finish).finish(),
            Slot::Waiter(wait) => f.debug_tuple("Waiter").field(wait).finish(),
        }
    }
}

/// Owner handle: reports the outcome of the key's computation.
///
/// ### Contract
/// - Call [`finish`](Finish::finish) once the computation is done, whether it succeeded or not.
/// - A second call returns [`RunError::InvalidState`] and changes nothing.
/// - Dropping the handle without finishing clears the key and releases every listener with
///   [`RunError::Abandoned`].
pub struct Finish<K, V, E>
where
    K: Eq + Hash,
{
    shared: Arc<Shared<K, V, E>>,
    key: K,
    label: Arc<str>,
    id: u64,
    done: bool,
}

impl<K: Eq + Hash, V, E> Finish<K, V, E> {
    pub(super) fn new(shared: Arc<Shared<K, V, E>>, key: K, label: Arc<str>, id: u64) -> Self {
        Self {
            shared,
            key,
            label,
            id,
            done: false,
        }
    }

    /// The key this handle owns.
    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash, V: Clone, E: Clone> Finish<K, V, E> {
    /// Delivers `outcome` to every listener, clears the key and hands `outcome` back.
    ///
    /// The return value is the owner's own outcome (`Err` wrapped in [`RunError::Failed`]),
    /// so reporting and notifying happen in one call:
    ///
    /// ```
    /// use runlock::{RunLock, Slot};
    ///
    /// let lock: RunLock<&str, u32, String> = RunLock::new();
    /// let Slot::Owner(mut finish) = lock.start("job") else { unreachable!() };
    /// assert_eq!(finish.finish(Ok(42)), Ok(42));
    /// assert!(!lock.is_running("job"));
    /// ```
    pub fn finish(&mut self, outcome: Outcome<V, E>) -> Result<V, RunError<E>> {
        self.done = true;
        self.shared.complete(&self.key, &self.label, self.id, outcome)
    }
}

impl<K: Eq + Hash, V, E> Drop for Finish<K, V, E> {
    fn drop(&mut self) {
        if !self.done {
            self.shared.abandon(&self.key, &self.label, self.id);
        }
    }
}

impl<K: Eq + Hash, V, E> fmt::Debug for Finish<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finish")
            .field("key", &self.label)
            .field("id", &self.id)
            .field("done", &self.done)
            .finish()
    }
}

/// Listener handle: resolves to the owner's outcome.
///
/// Await it from async code, or call [`wait_blocking`](Wait::wait_blocking) from a plain thread.
#[must_use = "a Wait does nothing unless awaited"]
pub struct Wait<V, E> {
    key: Arc<str>,
    rx: oneshot::Receiver<Outcome<V, E>>,
}

impl<V, E> Wait<V, E> {
    pub(super) fn new(key: Arc<str>, rx: oneshot::Receiver<Outcome<V, E>>) -> Self {
        Self { key, rx }
    }

    /// Debug rendering of the key being waited on.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Blocks the current thread until the outcome arrives.
    ///
    /// # Panics
    /// Panics when called from within an asynchronous execution context.
    pub fn wait_blocking(self) -> Result<V, RunError<E>> {
        let received = self.rx.blocking_recv();
        resolve(&self.key, received)
    }
}

impl<V, E> Future for Wait<V, E> {
    type Output = Result<V, RunError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|received| resolve(&this.key, received))
    }
}

impl<V, E> fmt::Debug for Wait<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wait").field("key", &self.key).finish()
    }
}

/// A closed channel means the owner went away without sending.
fn resolve<V, E>(
    key: &Arc<str>,
    received: Result<Outcome<V, E>, oneshot::error::RecvError>,
) -> Result<V, RunError<E>> {
    match received {
        Ok(outcome) => outcome.map_err(RunError::Failed),
        Err(_) => Err(RunError::Abandoned { key: key.clone() }),
    }
}
