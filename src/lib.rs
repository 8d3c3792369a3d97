//! # lifo - An Embeddable Stack-Based Concatenative Interpreter Core
//!
//! This crate provides a small, embeddable interpreter for a postfix
//! (LIFO, last value pushed is the first consumed) concatenative language:
//! a single operand stack, a flat name/value dictionary, and a fixed set of
//! built-in primitives, all running atop a host-donated pool of
//! fixed-size memory blocks.
//!
//! ## Overview
//!
//! Every runtime value is a two-block structure: a tagged cell pointing at
//! a shared, reference-counted payload record.
//!
//! ```text
//!   Value representation:
//!
//!   +--------------+        +-----------------------+
//!   |     Cell      |------->|      Reference         |
//!   |  tag: NUMBER   |        |  count: 2              |
//!   |  reference: o  |        |  payload: Number(3.5)  |
//!   |  next: --------+-->...  +-----------------------+
//!   +--------------+
//!
//!   Another cell pointing at the same Reference shares the payload:
//!   numbers/natives are copied by value on a deep copy; strings, symbols,
//!   and user data alias; lists are the only value copied recursively.
//! ```
//!
//! Programs are read from a byte stream into a tree of chunks, one chunk
//! per open `[`, and evaluated by walking that tree, with tail calls
//! eliminated by looping instead of recursing so that a tail-recursive
//! program runs in bounded native stack no matter how many times it calls
//! itself:
//!
//! ```text
//!   "[ 1 2 + ] apl"  --reader-->  chunk tree  --eval-->  3 on the stack
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   lifo
//!   +-- block     the block allocator: a free list over host-donated memory
//!   +-- value     tagged cells, reference records, copy/equality policy
//!   +-- string    symbol/string segment chains
//!   +-- chunk     the reader's open-bracket nesting structure
//!   +-- reader    byte stream to chunk tree, with token interning
//!   +-- builtins  the closed set of native primitives
//!   +-- eval      tail-call-eliminated execute/apply
//!   +-- context   the interpreter context: heap, stack, dictionary, hold list
//!   +-- signal    signal kinds, handler table, raise/escalate
//!   +-- error     the RaisedSignal error type
//!   +-- io        host byte-source/byte-sink traits
//!   +-- trace     value formatting for diagnostics
//!   +-- config    compile-time tunables (block size, symbol length, ...)
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use lifo::context::Context;
//! use lifo::io::SliceReader;
//!
//! let mut ctx = Context::new();
//! ctx.map_memory(256);
//!
//! let mut chunk = None;
//! let mut input = SliceReader::new(b"[ 1 2 + ] apl");
//! ctx.read(&mut chunk, &mut input).unwrap();
//! ctx.evaluate(chunk.unwrap()).unwrap();
//!
//! assert_eq!(ctx.size(), 1);
//! ```
//!
//! ## Memory model
//!
//! A host owns all memory: it donates fixed-size blocks via
//! [`context::Context::map_memory`] and, on `OUT_OF_MEMORY`, a registered
//! handler is expected to donate more and resolve the condition so the
//! failed allocation can retry. Nothing is ever returned to the host; this
//! crate only ever grows its pool.
//!
//! ## Error handling
//!
//! There is a single failure channel: raising a [`signal::Signal`] looks up
//! the context's handler for that kind, and unless the handler resolves it,
//! escalates to a [`error::RaisedSignal`] propagated via `?` to the
//! nearest public entry point (`read`, `evaluate`, built-ins called through
//! them). There is no panicking path through ordinary program errors; a
//! panic here indicates a bug in this crate, not a malformed program.

pub mod block;
pub mod builtins;
pub mod chunk;
pub mod config;
pub mod context;
pub mod error;
pub mod eval;
pub mod io;
pub mod reader;
pub mod signal;
pub mod string;
pub mod trace;
pub mod value;

pub use context::Context;
pub use error::{LfResult, RaisedSignal};
pub use signal::Signal;
