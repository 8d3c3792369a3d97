//! Stack trace formatting.
//!
//! Prints the operand stack bottom-to-top, space-separated: `[ ]` around
//! list contents, `"` around string contents, bare bytes for a symbol,
//! general-precision formatting for numbers, and `(tag: <address>)` for
//! native functions and user data. An empty stack prints `-empty-`.
//! Always ends in a newline.

use crate::block::{BlockId, Heap, Link};
use crate::context::Context;
use crate::io::Write;
use crate::value::{Payload, Tag};

pub fn trace(ctx: &Context, writer: &mut dyn Write) {
  match ctx.stack_head() {
    None => writer.put_str("-empty-\n"),
    Some(head) => {
      trace_stack(ctx.heap(), head, writer);
      writer.put(b'\n');
    }
  }
}

/// Prints the operand stack bottom-to-top. The stack's own chain runs the
/// other way: its head is the top, threaded through `next` toward the
/// oldest (bottom) cell, the reverse of a list's payload chain (built by
/// the reader in source order via append). So this collects the chain and
/// walks it back to front rather than reusing [`trace_chain`] directly.
fn trace_stack(heap: &Heap, head: BlockId, writer: &mut dyn Write) {
  let mut ids = Vec::new();
  let mut obj = Some(head);
  while let Some(id) = obj {
    ids.push(id);
    obj = heap.cell(id).next;
  }
  for (i, id) in ids.iter().rev().enumerate() {
    if i > 0 {
      writer.put(b' ');
    }
    trace_one(heap, *id, writer);
  }
}

/// Prints a list's payload chain in its own order, used only for nested
/// list contents, never for the top-level stack.
fn trace_chain(heap: &Heap, mut obj: Link, writer: &mut dyn Write) {
  while let Some(id) = obj {
    trace_one(heap, id, writer);
    obj = heap.cell(id).next;
    if obj.is_some() {
      writer.put(b' ');
    }
  }
}

fn trace_one(heap: &Heap, id: crate::block::BlockId, writer: &mut dyn Write) {
  let cell = heap.cell(id);
  let reference = heap.reference(cell.reference);
  match (cell.tag, &reference.payload) {
    (Tag::List, Payload::List(head)) => {
      writer.put(b'[');
      trace_chain(heap, *head, writer);
      writer.put(b']');
    }
    (Tag::Symbol, Payload::Chars(head)) => {
      writer.put_str(&bytes_to_display(&crate::string::flatten(heap, *head)));
    }
    (Tag::String, Payload::Chars(head)) => {
      writer.put(b'"');
      writer.put_str(&bytes_to_display(&crate::string::flatten(heap, *head)));
      writer.put(b'"');
    }
    (Tag::Number, Payload::Number(n)) => {
      writer.put_str(&format_number(*n));
    }
    (Tag::Native, Payload::Native(f)) => {
      writer.put_str(&format!("(ntv: {:p})", *f as *const ()));
    }
    (Tag::User, Payload::User(u)) => {
      writer.put_str(&format!("(usr: {:p})", u.ptr));
    }
    _ => unreachable!("cell tag does not match its reference's payload"),
  }
}

fn bytes_to_display(bytes: &[u8]) -> String {
  String::from_utf8_lossy(bytes).into_owned()
}

/// Five significant digits, trimmed of trailing zeros, falling back to
/// plain formatting for values that don't round-trip cleanly through that
/// width.
fn format_number(n: f64) -> String {
  if n == 0.0 {
    return "0".to_string();
  }
  let formatted = format!("{:.*e}", 4, n);
  // Rust has no libc-style %g; reconstruct it by picking fixed-point
  // notation when the exponent is in a normal range, scientific otherwise.
  let exp = {
    let idx = formatted.find('e').unwrap();
    formatted[idx + 1..].parse::<i32>().unwrap()
  };
  if (-4..5).contains(&exp) {
    let decimals = (4 - exp).max(0) as usize;
    let s = format!("{:.*}", decimals, n);
    trim_trailing_zeros(&s)
  } else {
    let mantissa = &formatted[..formatted.find('e').unwrap()];
    let mantissa = trim_trailing_zeros(mantissa);
    format!("{mantissa}e{exp:+03}")
  }
}

fn trim_trailing_zeros(s: &str) -> String {
  if !s.contains('.') {
    return s.to_string();
  }
  let trimmed = s.trim_end_matches('0');
  trimmed.trim_end_matches('.').to_string()
}
