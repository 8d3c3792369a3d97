//! The reader: turns a byte stream into a chunk tree, one
//! [`crate::chunk::Chunk`] per open `[`, interning structurally-identical
//! tokens within the enclosing chunk nest as it goes.
//!
//! A single [`read`] call consumes input until end of stream; it does not
//! stop at the first top-level form. Reading a file with balanced brackets
//! leaves `*chunk` pointing at the single outermost chunk (`back == None`);
//! an unmatched `[` leaves it pointing at whatever chunk is still open,
//! which [`crate::eval::eval_chunk`] rejects as unfinished. A caller that
//! wants REPL-style incremental reads can keep calling `read` with the
//! same `chunk` across several inputs (each call's "more to come" state is
//! entirely captured in `*chunk`).

use crate::builtins;
use crate::context::Context;
use crate::block::Link;
use crate::config;
use crate::error::LfResult;
use crate::io::Read;
use crate::signal::Signal;
use crate::value::{Payload, Tag};

fn is_space(c: u8) -> bool {
  matches!(c, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_delim(c: u8) -> bool {
  is_space(c) || c == b'[' || c == b']' || c == b'"'
}

/// Reads every form available from `input` into `chunk`.
pub fn read(ctx: &mut Context, chunk: &mut Link, input: &mut dyn Read) -> LfResult<()> {
  if chunk.is_none() {
    *chunk = Some(ctx.open_chunk(None)?);
  }
  let mut c = input.next();
  loop {
    while let Some(b) = c {
      if !is_space(b) {
        break;
      }
      c = input.next();
    }
    let Some(b) = c else { return Ok(()) };
    match b {
      b'#' => {
        loop {
          c = input.next();
          match c {
            Some(b'\n') | None => break,
            _ => {}
          }
        }
        continue;
      }
      b'[' => {
        let current = chunk.expect("opened above");
        *chunk = Some(ctx.open_chunk(Some(current))?);
        c = input.next();
        continue;
      }
      b']' => {
        let current = chunk.expect("opened above");
        match ctx.heap().chunk(current).back {
          Some(parent) => {
            ctx.finish_chunk(current, parent)?;
            *chunk = Some(parent);
          }
          None => {
            ctx.raise(Signal::ParseError, "illegal list end")?;
          }
        }
        c = input.next();
        continue;
      }
      b'"' => {
        let mut bytes = Vec::new();
        loop {
          c = input.next();
          match c {
            Some(b'"') => break,
            Some(byte) => bytes.push(byte),
            None => {
              return crate::signal::escalate(
                ctx,
                Signal::ParseError,
                "unfinished string",
              );
            }
          }
        }
        c = input.next();
        let token = ctx.make_text_token(Tag::String, &bytes)?;
        link_token(ctx, chunk, token);
        continue;
      }
      _ => {
        let mut buf = Vec::new();
        let mut cur = Some(b);
        while let Some(byte) = cur {
          if is_delim(byte) {
            break;
          }
          if buf.len() >= config::SYM_MAX_LEN - 1 {
            return crate::signal::escalate(
              ctx,
              Signal::ParseError,
              "symbol too long",
            );
          }
          buf.push(byte);
          cur = input.next();
        }
        c = cur;
        let token = classify(ctx, &buf)?;
        link_token(ctx, chunk, token);
        continue;
      }
    }
  }
}

/// Classifies a non-string token's raw bytes into a built-in native, a
/// number, or a symbol, in that order.
fn classify(ctx: &mut Context, buf: &[u8]) -> LfResult<crate::block::BlockId> {
  if let Some(f) = builtins::lookup(buf) {
    return ctx.make_token(Tag::Native, Payload::Native(f));
  }
  if let Ok(text) = std::str::from_utf8(buf) {
    if let Ok(n) = text.parse::<f64>() {
      return ctx.make_token(Tag::Number, Payload::Number(n));
    }
  }
  ctx.make_text_token(Tag::Symbol, buf)
}

/// Interns `token` against every chunk enclosing (and including)
/// `*chunk`, then appends it to the innermost one.
fn link_token(ctx: &mut Context, chunk: &Link, token: crate::block::BlockId) {
  let current = chunk.expect("opened above");
  if let Some(existing) = ctx.search_intern(*chunk, token) {
    ctx.reintern(token, existing);
  }
  ctx.append_chunk(current, token);
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::io::SliceReader;
  use crate::value::Tag;

  fn ctx_with(blocks: usize) -> Context {
    let mut ctx = Context::new();
    ctx.map_memory(blocks);
    ctx
  }

  #[test]
  fn reads_a_flat_number_and_symbol() {
    let mut ctx = ctx_with(256);
    let mut chunk: Link = None;
    let mut input = SliceReader::new(b"42 foo");
    read(&mut ctx, &mut chunk, &mut input).unwrap();
    let top = chunk.unwrap();
    assert!(ctx.heap().chunk(top).back.is_none());
    let first = ctx.heap().chunk(top).head().unwrap();
    assert_eq!(ctx.heap().cell(first).tag, Tag::Number);
    let second = ctx.heap().cell(first).next.unwrap();
    assert_eq!(ctx.heap().cell(second).tag, Tag::Symbol);
    assert!(ctx.heap().cell(second).next.is_none());
  }

  #[test]
  fn brackets_nest_into_closed_list() {
    let mut ctx = ctx_with(256);
    let mut chunk: Link = None;
    let mut input = SliceReader::new(b"[ 1 2 ]");
    read(&mut ctx, &mut chunk, &mut input).unwrap();
    let top = chunk.unwrap();
    assert!(ctx.heap().chunk(top).back.is_none());
    let list_cell = ctx.heap().chunk(top).head().unwrap();
    assert_eq!(ctx.heap().cell(list_cell).tag, Tag::List);
    assert!(ctx.heap().cell(list_cell).next.is_none());
  }

  #[test]
  fn unmatched_open_bracket_leaves_chunk_unfinished() {
    let mut ctx = ctx_with(256);
    let mut chunk: Link = None;
    let mut input = SliceReader::new(b"[ 1 2");
    read(&mut ctx, &mut chunk, &mut input).unwrap();
    let top = chunk.unwrap();
    assert!(ctx.heap().chunk(top).back.is_some());
  }

  #[test]
  fn comment_is_skipped_to_end_of_line() {
    let mut ctx = ctx_with(256);
    let mut chunk: Link = None;
    let mut input = SliceReader::new(b"1 # a comment\n2");
    read(&mut ctx, &mut chunk, &mut input).unwrap();
    let top = chunk.unwrap();
    let first = ctx.heap().chunk(top).head().unwrap();
    let second = ctx.heap().cell(first).next.unwrap();
    assert_eq!(ctx.heap().cell(second).tag, Tag::Number);
    assert!(ctx.heap().cell(second).next.is_none());
  }

  #[test]
  fn string_literal_builds_string_token() {
    let mut ctx = ctx_with(256);
    let mut chunk: Link = None;
    let mut input = SliceReader::new(b"\"hi there\"");
    read(&mut ctx, &mut chunk, &mut input).unwrap();
    let top = chunk.unwrap();
    let first = ctx.heap().chunk(top).head().unwrap();
    assert_eq!(ctx.heap().cell(first).tag, Tag::String);
    let bytes = ctx.string_bytes(ctx.chars_of(first));
    assert_eq!(bytes, b"hi there");
  }

  #[test]
  fn builtin_token_classified_as_native() {
    let mut ctx = ctx_with(256);
    let mut chunk: Link = None;
    let mut input = SliceReader::new(b"+");
    read(&mut ctx, &mut chunk, &mut input).unwrap();
    let top = chunk.unwrap();
    let first = ctx.heap().chunk(top).head().unwrap();
    assert_eq!(ctx.heap().cell(first).tag, Tag::Native);
  }

  #[test]
  fn identical_symbols_in_one_chunk_share_one_reference() {
    let mut ctx = ctx_with(256);
    let mut chunk: Link = None;
    let mut input = SliceReader::new(b"foo foo");
    read(&mut ctx, &mut chunk, &mut input).unwrap();
    let top = chunk.unwrap();
    let first = ctx.heap().chunk(top).head().unwrap();
    let second = ctx.heap().cell(first).next.unwrap();
    assert_eq!(ctx.heap().cell(first).reference, ctx.heap().cell(second).reference);
  }
}
