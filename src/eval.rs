//! Evaluation: `execute` walks a read chunk tree (or a dictionary-bound
//! list body) read-only, always copying before it pushes; `apply` applies a
//! value taken off the stack, consuming it as it goes. Both eliminate tail
//! calls by looping instead of recursing, so a tail-recursive program runs
//! in bounded native stack regardless of how many times it calls itself.
//!
//! `apply` additionally special-cases `apl` and `eq` in tail position:
//! calling either through the ordinary native-call path would recurse back
//! into `apply` one Rust frame deeper per iteration, defeating the
//! tail-call guarantee for programs built on them (the two combinators
//! idiomatic style leans on for loops and branches).

use crate::block::{BlockId, Link};
use crate::builtins;
use crate::context::Context;
use crate::error::LfResult;
use crate::signal::Signal;
use crate::value::Tag;

/// Evaluates a fully-closed chunk tree. Raises an unfinished-chunk signal
/// if `chunk` still has an enclosing chunk, meaning the read that produced
/// it never saw a matching `]`.
pub fn eval_chunk(ctx: &mut Context, chunk: BlockId) -> LfResult<()> {
  if ctx.heap().chunk(chunk).back.is_some() {
    return crate::signal::escalate(ctx, Signal::UnfinishedChunk, "unfinished chunk");
  }
  let mut obj = ctx.heap().chunk(chunk).head();
  while let Some(id) = obj {
    let next = ctx.heap().cell(id).next;
    execute(ctx, id)?;
    obj = next;
  }
  Ok(())
}

/// Executes a single cell read-only: a symbol is looked up and, if bound to
/// a list, that list's body is executed in place (tail-call eliminated on
/// its last element); a native is called directly; anything else is copied
/// and pushed.
pub fn execute(ctx: &mut Context, mut obj: BlockId) -> LfResult<()> {
  loop {
    match ctx.heap().cell(obj).tag {
      Tag::Symbol => {
        let name = ctx.chars_of(obj);
        let bound = ctx.lookup(name)?;
        if ctx.heap().cell(bound).tag != Tag::List {
          obj = bound;
          continue;
        }
        match ctx.list_head_of(bound) {
          None => return Ok(()),
          Some(mut item) => {
            loop {
              let next = ctx.heap().cell(item).next;
              match next {
                Some(n) => {
                  execute(ctx, item)?;
                  item = n;
                }
                None => {
                  obj = item;
                  break;
                }
              }
            }
          }
        }
      }
      Tag::Native => {
        let f = ctx.native_fn_of(obj);
        f(ctx)?;
        ctx.drain_hold();
        return Ok(());
      }
      _ => {
        let copy = ctx.copy_value(obj)?;
        ctx.push_obj(copy);
        return Ok(());
      }
    }
  }
}

/// Applies `obj`, consuming it: a list's items run in sequence, each
/// non-tail item executed through [`apply`] recursively, the tail item
/// dispatched by looping back to the top instead, with `apl`/`eq` in tail
/// position additionally collapsed into that same loop rather than calling
/// through to [`builtins::apl`]/[`builtins::eq`].
///
/// A list's payload chain is walked one of two ways depending on whether
/// `obj` held the last reference to it ([`crate::value::begin_list_consume`]):
/// if unique, each element is freed as it's consumed (the chain dies with
/// this call); if shared, elements are read and aliased but never freed or
/// mutated, since another owner's chain must stay intact.
pub fn apply(ctx: &mut Context, mut obj: BlockId) -> LfResult<()> {
  loop {
    match ctx.heap().cell(obj).tag {
      Tag::List => {
        let (owned, head) = crate::value::begin_list_consume(ctx.heap_mut(), obj);
        let Some(mut item) = head else { return Ok(()) };
        loop {
          let next = ctx.heap().cell(item).next;
          let tail = next.is_none();
          match ctx.heap().cell(item).tag {
            Tag::Symbol => {
              let name = ctx.chars_of(item);
              let bound = ctx.lookup(name)?;
              if owned {
                ctx.release(item);
              }
              let aliased = ctx.alias(bound)?;
              if tail {
                obj = aliased;
                break;
              }
              apply(ctx, aliased)?;
            }
            Tag::Native => {
              let f = ctx.native_fn_of(item);
              if owned {
                ctx.release(item);
              }
              if tail && is_apl(f) {
                obj = ctx.pop_top()?;
                break;
              } else if tail && is_eq(f) {
                obj = eq_select(ctx)?;
                break;
              } else {
                f(ctx)?;
                ctx.drain_hold();
                if tail {
                  return Ok(());
                }
              }
            }
            _ => {
              let aliased = ctx.alias(item)?;
              if owned {
                ctx.release(item);
              }
              ctx.push_obj(aliased);
              if tail {
                return Ok(());
              }
            }
          }
          item = next.expect("tail item already returned above");
        }
      }
      Tag::Symbol => {
        let name = ctx.chars_of(obj);
        let bound = ctx.lookup(name)?;
        ctx.release(obj);
        obj = ctx.alias(bound)?;
      }
      Tag::Native => {
        let f = ctx.native_fn_of(obj);
        ctx.release(obj);
        if is_apl(f) {
          obj = ctx.pop_top()?;
        } else if is_eq(f) {
          obj = eq_select(ctx)?;
        } else {
          f(ctx)?;
          ctx.drain_hold();
          return Ok(());
        }
      }
      _ => {
        ctx.push_obj(obj);
        return Ok(());
      }
    }
  }
}

fn is_apl(f: crate::context::NativeFn) -> bool {
  std::ptr::fn_addr_eq(f, builtins::apl as crate::context::NativeFn)
}

fn is_eq(f: crate::context::NativeFn) -> bool {
  std::ptr::fn_addr_eq(f, builtins::eq as crate::context::NativeFn)
}

/// `eq`'s comparison and branch selection, shared by the tail-position fast
/// path above (which loops on the winner directly) and [`builtins::eq`]
/// (which applies it through the ordinary recursive path). Compares the
/// stack's `A`/`B` operands, frees the losing branch and the two operands,
/// and returns the winning branch (`t` or `e`) for the caller to dispatch.
pub(crate) fn eq_select(ctx: &mut Context) -> LfResult<BlockId> {
  let a = ctx.peek(3)?;
  let e = ctx.stack_head().expect("peek(3) succeeded, stack has 4 cells");
  let t = ctx
    .heap()
    .cell(e)
    .next
    .expect("peek(3) succeeded, stack has 4 cells");
  let b = ctx
    .heap()
    .cell(t)
    .next
    .expect("peek(3) succeeded, stack has 4 cells");
  let res = crate::value::structurally_equal(ctx.heap(), a, b);
  let below_a: Link = ctx.heap().cell(a).next;
  ctx.set_stack_head(below_a);
  ctx.adjust_size(-4);
  ctx.release(b);
  ctx.release(a);
  if res {
    ctx.release(e);
    Ok(t)
  } else {
    ctx.release(t);
    Ok(e)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::Context;

  fn ctx_with(blocks: usize) -> Context {
    let mut ctx = Context::new();
    ctx.map_memory(blocks);
    ctx
  }

  #[test]
  fn pushing_a_number_literal() {
    let mut ctx = ctx_with(32);
    let num = crate::value::make_cell(ctx.heap_mut(), Tag::Number, crate::value::Payload::Number(3.0)).unwrap();
    execute(&mut ctx, num).unwrap();
    assert_eq!(ctx.size(), 1);
    let top = ctx.peek(0).unwrap();
    assert_eq!(ctx.expect_number(top).unwrap(), 3.0);
  }

  #[test]
  fn addition_via_native() {
    let mut ctx = ctx_with(32);
    ctx.push_number(1.0).unwrap();
    ctx.push_number(2.0).unwrap();
    let plus = crate::value::make_cell(
      ctx.heap_mut(),
      Tag::Native,
      crate::value::Payload::Native(builtins::add),
    )
    .unwrap();
    execute(&mut ctx, plus).unwrap();
    assert_eq!(ctx.size(), 1);
    let top = ctx.peek(0).unwrap();
    assert_eq!(ctx.expect_number(top).unwrap(), 3.0);
  }

  /// `apl` on a uniquely-owned list must free each element as it walks
  /// the chain without ever re-reading a cell it already freed, the
  /// regression case for a list wrapper whose reference count hits zero
  /// inside `apply`'s `Tag::List` branch.
  #[test]
  fn applying_a_uniquely_owned_nonempty_list_consumes_it_without_panicking() {
    let mut ctx = ctx_with(64);
    let mut chunk = None;
    let mut input = crate::io::SliceReader::new(b"[1 2 +]");
    ctx.read(&mut chunk, &mut input).unwrap();
    ctx.evaluate(chunk.unwrap()).unwrap();
    let list = ctx.pop_top().unwrap();
    apply(&mut ctx, list).unwrap();
    assert_eq!(ctx.size(), 1);
    let top = ctx.peek(0).unwrap();
    assert_eq!(ctx.expect_number(top).unwrap(), 3.0);
  }

  /// `apl` on a shared list (another alias still live) must walk the
  /// chain read-only: it must not free or corrupt the elements the other
  /// alias still owns.
  #[test]
  fn applying_an_aliased_list_leaves_the_other_alias_intact() {
    let mut ctx = ctx_with(64);
    let mut chunk = None;
    let mut input = crate::io::SliceReader::new(b"[1 2] 0 rf apl");
    ctx.read(&mut chunk, &mut input).unwrap();
    ctx.evaluate(chunk.unwrap()).unwrap();
    // Bottom to top: the original [1 2] (untouched), then 1, then 2
    // pushed by applying the aliased copy.
    assert_eq!(ctx.size(), 3);
    let top = ctx.peek(0).unwrap();
    assert_eq!(ctx.expect_number(top).unwrap(), 2.0);
    let mid = ctx.peek(1).unwrap();
    assert_eq!(ctx.expect_number(mid).unwrap(), 1.0);
    let original = ctx.peek(2).unwrap();
    let head = ctx.expect_list(original).unwrap();
    let first = head.unwrap();
    assert_eq!(ctx.expect_number(first).unwrap(), 1.0);
    let second = ctx.heap().cell(first).next.unwrap();
    assert_eq!(ctx.expect_number(second).unwrap(), 2.0);
  }
}
