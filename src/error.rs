//! Error type returned by run lock completions and waits.
//!
//! [`RunError`] covers two different things:
//!
//! - [`RunError::Failed`]: the owner's computation failed; the caller-supplied error is relayed
//!   verbatim to the owner and every listener.
//! - [`RunError::InvalidState`] / [`RunError::Abandoned`]: the run lock itself detected misuse
//!   (completion without a matching task, or an owner handle dropped without completing).
//!
//! Helpers `as_label`/`as_message` give stable strings for logging and metrics.

use std::sync::Arc;
use thiserror::Error;

/// # Errors produced by a run lock.
///
/// `E` is the caller's own error type. The run lock never inspects it.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError<E> {
    /// The owner reported a failed outcome.
    #[error("task failed: {0}")]
    Failed(E),

    /// Completion found no task of its own for the key.
    ///
    /// Raised when `finish` is called twice, or after the key's task was replaced by a newer one.
    /// Returned only to the caller invoking completion; listeners are left untouched.
    #[error("invalid run lock state for key {key}")]
    InvalidState {
        /// Debug rendering of the key.
        key: Arc<str>,
    },

    /// The owner handle was dropped without reporting an outcome.
    #[error("owner of key {key} dropped without reporting an outcome")]
    Abandoned {
        /// Debug rendering of the key.
        key: Arc<str>,
    },
}

impl<E> RunError<E> {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use runlock::RunError;
    ///
    /// let err: RunError<String> = RunError::Failed("boom".into());
    /// assert_eq!(err.as_label(), "run_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RunError::Failed(_) => "run_failed",
            RunError::InvalidState { .. } => "run_invalid_state",
            RunError::Abandoned { .. } => "run_abandoned",
        }
    }

    /// Returns the relayed caller error, if this is [`RunError::Failed`].
    pub fn failure(&self) -> Option<&E> {
        match self {
            RunError::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Consumes the error and returns the relayed caller error, if any.
    pub fn into_failure(self) -> Option<E> {
        match self {
            RunError::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Indicates whether the run lock itself (not the computation) produced the error.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            RunError::InvalidState { .. } | RunError::Abandoned { .. }
        )
    }
}

impl<E: std::fmt::Display> RunError<E> {
    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RunError::Failed(e) => format!("error: {e}"),
            RunError::InvalidState { key } => format!("invalid state: key={key}"),
            RunError::Abandoned { key } => format!("abandoned: key={key}"),
        }
    }
}
