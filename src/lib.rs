//! # runlock
//!
//! **runlock** is a keyed execution-deduplication primitive.
//!
//! Many concurrent callers may ask for work identified by the same key. The [`RunLock`]
//! guarantees at most one in-flight computation per key and delivers that computation's outcome
//! to every caller that asked for the key while it was running. It does not run the work itself,
//! does not cache finished results, and relays errors without interpreting them.
//!
//! ## Architecture
//! ```text
//!   caller A ──► start("job1") ──► Slot::Owner(Finish) ── compute ──┐
//!   caller B ──► start("job1") ──► Slot::Waiter(Wait) ───────────┐  │
//!   caller C ──► wait_for("job1") ─► (attached as watcher) ────┐ │  │
//!                                                              │ │  ▼
//! ┌────────────────────────────────────────────────────────────┼─┼───────────┐
//! │  RunLock                                                   │ │           │
//! │  - Mutex<HashMap<K, Task>>   (one task per key)            │ │           │
//! │  - Task { listeners: Vec<oneshot::Sender> }  ◄─────────────┴─┘           │
//! │  - Bus (broadcast events)                                                │
//! └──────────────────────────────────────────┬───────────────────────────────┘
//!                                            │ finish(outcome)
//!                                            ▼
//!                     outcome cloned to every listener, key removed
//! ```
//!
//! ### Lifecycle of a key
//! ```text
//! absent ──start──► running(0 listeners) ──start/watch──► running(n listeners)
//!    ▲                                                          │
//!    └───────────────── finish(outcome) / Finish dropped ◄──────┘
//! ```
//! Each cycle is independent: once a key is cleared, the next `start` becomes a new owner.
//!
//! ## Features
//! | Area              | Description                                                      | Key types                          |
//! |-------------------|------------------------------------------------------------------|------------------------------------|
//! | **Deduplication** | One owner per key, every other caller waits for its outcome.     | [`RunLock`], [`Slot`]              |
//! | **Handles**       | Report the outcome once; await it or block on it.                | [`Finish`], [`Wait`]               |
//! | **Events**        | Observe key lifecycle transitions.                               | [`Event`], [`EventKind`]           |
//! | **Errors**        | Relayed computation errors and misuse detection.                 | [`RunError`]                       |
//! | **Configuration** | Event bus capacity, map pre-sizing.                              | [`RunLockConfig`]                  |
//!
//! ## Example
//! ```rust
//! use runlock::{RunLock, Slot};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let lock: RunLock<String, u64, String> = RunLock::new();
//!
//!     let waiter = {
//!         // First caller owns the key.
//!         let Slot::Owner(mut finish) = lock.start("job1".into()) else { unreachable!() };
//!
//!         // Second caller joins the running task.
//!         let waiter = lock.start("job1".into()).into_waiter().unwrap();
//!
//!         // Owner reports; listeners receive the same outcome.
//!         let mine = finish.finish(Ok(42))?;
//!         assert_eq!(mine, 42);
//!         waiter
//!     };
//!
//!     assert_eq!(waiter.await?, 42);
//!     assert!(!lock.is_running("job1"));
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;

// ---- Public re-exports ----

pub use self::core::{Finish, RunLock, RunLockConfig, Slot, Wait};
pub use error::RunError;
pub use events::{Event, EventKind};
