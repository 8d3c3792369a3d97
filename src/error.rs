//! The error-handling ambient layer: wraps a raised [`Signal`] plus its
//! human-readable message into something that implements
//! [`std::error::Error`] via `thiserror`, instead of returning a bare
//! string.
//!
//! A `RaisedSignal` is what every public entry point (`Context::read`,
//! `Context::evaluate`, `Context::reset`) returns on the `Err` side once a
//! signal's handler has run and chosen not to resolve the condition.

use crate::signal::Signal;

/// A signal that escaped to the nearest public entry, carrying the message
/// it was raised with.
///
/// The `?` operator unwinds the call stack to produce this value; the
/// handler for `kind` has already run by the time it exists, and the hold
/// list has already been drained.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("signal({}): {message}", self.kind as i32)]
pub struct RaisedSignal {
  pub kind: Signal,
  pub message: String,
}

impl RaisedSignal {
  pub fn new(kind: Signal, message: impl Into<String>) -> Self {
    RaisedSignal {
      kind,
      message: message.into(),
    }
  }
}

/// Result alias used throughout the crate for anything that can raise a
/// signal.
pub type LfResult<T> = Result<T, RaisedSignal>;
