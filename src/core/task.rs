//! In-flight task record.
//!
//! A [`Task`] exists in the running map exactly while its owner is computing. It holds the
//! senders of every listener attached so far; the receivers live in [`Wait`](crate::Wait) handles.
//!
//! ## Rules
//! - Only touched with the run lock's mutex held.
//! - `notify` consumes the task: each sender is used once and then dropped, closing its channel.
//! - Dropping a task without `notify` closes every channel unsent; listeners observe `Abandoned`.

use std::time::{Duration, Instant};

use tokio::sync::oneshot;

/// Outcome reported by an owner and delivered to listeners.
pub(crate) type Outcome<V, E> = Result<V, E>;

/// One in-flight computation for a key.
pub(crate) struct Task<V, E> {
    /// Generation id; unique per task instance across the run lock's lifetime.
    id: u64,
    /// When the owner registered.
    started_at: Instant,
    /// Result channels in attach order.
    listeners: Vec<oneshot::Sender<Outcome<V, E>>>,
}

impl<V, E> Task<V, E> {
    /// Creates a task with no listeners.
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            started_at: Instant::now(),
            listeners: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub(crate) fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    #[inline]
    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Appends a listener and returns the receiving half of its channel.
    ///
    /// A oneshot sender never blocks, so notifying a listener that is slow to read
    /// cannot stall the owner.
    pub(crate) fn attach(&mut self) -> oneshot::Receiver<Outcome<V, E>> {
        let (tx, rx) = oneshot::channel();
        self.listeners.push(tx);
        rx
    }
}

impl<V: Clone, E: Clone> Task<V, E> {
    /// Sends `outcome` to every listener in attach order and closes their channels.
    ///
    /// Returns how many listeners were still there to receive it.
    pub(crate) fn notify(self, outcome: &Outcome<V, E>) -> usize {
        let mut delivered = 0;
        for tx in self.listeners {
            if tx.send(outcome.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_reaches_every_listener_in_order() {
        let mut task: Task<u32, String> = Task::new(7);
        let mut rxs: Vec<_> = (0..3).map(|_| task.attach()).collect();
        assert_eq!(task.listener_count(), 3);
        assert_eq!(task.id(), 7);

        assert_eq!(task.notify(&Ok(5)), 3);
        for rx in rxs.iter_mut() {
            assert_eq!(rx.try_recv().unwrap(), Ok(5));
        }
    }

    #[test]
    fn dropped_receivers_are_skipped() {
        let mut task: Task<u32, String> = Task::new(1);
        let kept = task.attach();
        drop(task.attach());

        assert_eq!(task.notify(&Err("boom".into())), 1);
        assert_eq!(kept.blocking_recv().unwrap(), Err("boom".to_string()));
    }

    #[test]
    fn dropping_task_closes_channels() {
        let mut task: Task<u32, String> = Task::new(1);
        let rx = task.attach();
        drop(task);
        assert!(rx.blocking_recv().is_err());
    }
}
