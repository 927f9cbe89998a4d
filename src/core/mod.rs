//! Run lock core: key registration, completion and fan-out.
//!
//! The public API from this module is [`RunLock`] with its handles [`Slot`], [`Finish`] and
//! [`Wait`], plus [`RunLockConfig`].
//!
//! Internal modules:
//! - [`lock`]: the running map, registration (`start`, `watch`) and completion;
//! - [`slot`]: owner and listener handles returned to callers;
//! - [`task`]: the in-flight record and its listener channels;
//! - [`config`]: construction settings.

mod config;
mod lock;
mod slot;
mod task;

pub use config::RunLockConfig;
pub use lock::RunLock;
pub use slot::{Finish, Slot, Wait};
