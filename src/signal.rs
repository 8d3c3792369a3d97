//! Signal kinds, handler table, and the raise/escalate mechanism.
//!
//! A signal is the single failure channel: raising one looks up the
//! context's registered handler for that kind and invokes it. The handler
//! may resolve the condition by returning [`Signal::Ok`], in which case the
//! raising call site is expected to retry (this is how an out-of-memory
//! condition plus a memory-donating handler cooperate), or it may return
//! any other signal, which becomes a `RaisedSignal` and propagates via `?`
//! to the nearest public entry (`Context::read`, `Context::evaluate`,
//! `Context::reset`).

use crate::context::Context;
use crate::error::RaisedSignal;

/// The closed set of signal kinds, used both as the `Err` payload
/// discriminant and as the handler-table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Signal {
  /// Not itself raised to a handler; reserved for "no condition".
  Ok = 0,
  UnfinishedChunk = 1,
  ParseError = 2,
  RuntimeError = 3,
  OutOfMemory = 4,
  StackOverflow = 5,
  StackUnderflow = 6,
  InitError = 7,
  Other = 8,
}

/// Number of raisable kinds (everything but `Ok`), sizing the handler table.
pub const SIGNAL_TABLE_SIZE: usize = Signal::Other as usize;

impl Signal {
  /// Index into the handler table for this kind (`Ok` has none).
  fn table_index(self) -> Option<usize> {
    if self == Signal::Ok {
      None
    } else {
      Some(self as usize - 1)
    }
  }
}

/// A handler callback: given the raising context, the kind, and a message,
/// decide whether the condition is resolved.
///
/// Returning `Signal::Ok` tells the raise site to retry; returning anything
/// else becomes the signal delivered to the nearest public entry.
pub type Handler = fn(&mut Context, Signal, &str) -> Signal;

/// Per-context table of one handler per raisable [`Signal`].
#[derive(Clone)]
pub struct HandlerTable {
  handlers: [Handler; SIGNAL_TABLE_SIZE],
}

impl HandlerTable {
  pub fn new() -> Self {
    HandlerTable {
      handlers: [default_handler; SIGNAL_TABLE_SIZE],
    }
  }

  /// Registers `handler` for `kind`. A no-op for `Signal::Ok`.
  pub fn set(&mut self, kind: Signal, handler: Handler) {
    if let Some(idx) = kind.table_index() {
      self.handlers[idx] = handler;
    }
  }

  fn get(&self, kind: Signal) -> Handler {
    match kind.table_index() {
      Some(idx) => self.handlers[idx],
      None => default_handler,
    }
  }
}

impl Default for HandlerTable {
  fn default() -> Self {
    Self::new()
  }
}

/// The default handler installed for every kind at `Context::init`: logs
/// the signal and message, then escalates unconditionally (returns `kind`
/// unchanged).
pub fn default_handler(_ctx: &mut Context, kind: Signal, msg: &str) -> Signal {
  log::warn!("signal({}): {msg}", kind as i32);
  kind
}

/// Runs `kind`'s handler for `msg`. If the handler resolves the condition
/// (returns `Ok`), returns `Ok` so the caller can retry; otherwise drains
/// the hold list and returns the escalated signal as an error.
pub fn raise(ctx: &mut Context, kind: Signal, msg: &str) -> Result<(), RaisedSignal> {
  let handler = ctx.handlers().get(kind);
  let resolved = handler(ctx, kind, msg);
  if resolved == Signal::Ok {
    Ok(())
  } else {
    ctx.drain_hold();
    Err(RaisedSignal::new(resolved, msg))
  }
}

/// Raises `kind`, then returns it as an escalated error regardless of
/// whether the handler resolved it. For conditions with no meaningful
/// value to hand back on retry (a bad stack index, a type mismatch, an
/// unbound symbol), the call site has nothing useful to do even if a
/// handler claims the condition is fixed, so unlike plain [`raise`] this
/// never yields `Ok`.
pub(crate) fn escalate<T>(ctx: &mut Context, kind: Signal, msg: &str) -> Result<T, RaisedSignal> {
  raise(ctx, kind, msg)?;
  Err(RaisedSignal::new(kind, msg))
}
