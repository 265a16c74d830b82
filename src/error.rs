//! Error types used by engines and the primitives built on them.
//!
//! This module defines two main error enums:
//!
//! - [`EngineError`]: failures of the mailbox/worker machinery itself.
//! - [`FlightError`]: failures observed by single-flight requesters.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging.

use thiserror::Error;

/// # Errors produced by an [`Engine`](crate::Engine).
///
/// These represent failures of message delivery or of a message body,
/// never of unrelated callers.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine processed its stop message (or its worker is gone); sends are refused
    /// and asks still queued behind the stop message are answered with this.
    #[error("channel closed")]
    Closed,

    /// The mailbox is full (returned by non-suspending sends only).
    #[error("mailbox full")]
    Full,

    /// The message body panicked; only the asking caller observes this.
    #[error("message body panicked: {reason}")]
    Panicked {
        /// Panic payload rendered as text.
        reason: String,
    },
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use coact::EngineError;
    ///
    /// assert_eq!(EngineError::Closed.as_label(), "engine_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::Closed => "engine_closed",
            EngineError::Full => "engine_full",
            EngineError::Panicked { .. } => "engine_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            EngineError::Closed => "mailbox closed".to_string(),
            EngineError::Full => "mailbox full".to_string(),
            EngineError::Panicked { reason } => format!("panicked: {reason}"),
        }
    }

    /// True if retrying the same send later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Full)
    }
}

/// # Errors observed by single-flight requesters.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlightError {
    /// The computation for this key panicked; the entry is permanently failed.
    #[error("computation failed: {reason}")]
    Failed {
        /// Panic payload rendered as text.
        reason: String,
    },

    /// The owning engine refused or dropped the request.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl FlightError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use coact::{EngineError, FlightError};
    ///
    /// let err = FlightError::from(EngineError::Closed);
    /// assert_eq!(err.as_label(), "engine_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            FlightError::Failed { .. } => "flight_failed",
            FlightError::Engine(e) => e.as_label(),
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            FlightError::Failed { reason } => format!("failed: {reason}"),
            FlightError::Engine(e) => e.as_message(),
        }
    }
}

/// Renders a caught panic payload.
pub(crate) fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
