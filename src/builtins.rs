//! Built-in primitives: stack manipulation, dictionary operations,
//! equality dispatch, and arithmetic. Every function here has the
//! [`NativeFn`] signature and is reachable two ways: directly, as the
//! payload of a `NATIVE` cell the reader produces when it recognizes one
//! of [`BUILTINS`]' names (built-ins are never dictionary entries), or
//! through [`crate::eval::apply`]'s tail-position fast path for `apl`/`eq`,
//! which bypasses calling through here entirely.
//!
//! Each function is reached through [`crate::eval::execute`] or
//! [`crate::eval::apply`], both of which drain the hold list immediately
//! after the call returns, so a built-in takes its operands with
//! [`Context::take`] and simply leaves them there rather than releasing
//! them itself; the hold list's post-call drain is what actually frees
//! them.

use crate::context::{Context, NativeFn};
use crate::error::LfResult;
use crate::eval;
use crate::signal::{self, Signal};
use crate::value::{Payload, Tag};

/// `;`, binds the top-of-stack value under the name one below it.
pub fn reg(ctx: &mut Context) -> LfResult<()> {
  ctx.register()
}

/// `~`, removes the dictionary entry named by the popped top-of-stack
/// string, if one exists.
pub fn rem(ctx: &mut Context) -> LfResult<()> {
  ctx.remove()
}

/// `?`, pushes a copy of the binding named by the popped top-of-stack
/// string.
pub fn find(ctx: &mut Context) -> LfResult<()> {
  ctx.find_entry()
}

/// `rol`, rotate: pops a number step; `step > 0` brings the cell at
/// depth `step` to the top, `step < 0` sends the top to depth `|step|`,
/// `step == 0` is a no-op.
pub fn rol(ctx: &mut Context) -> LfResult<()> {
  let step_cell = ctx.take(0)?;
  let step = ctx.expect_number(step_cell)? as i64;
  if step < 0 {
    let k = -step;
    let last = ctx.peek(k)?;
    let first = ctx.stack_head().expect("peek succeeded, stack non-empty");
    let first_next = ctx.heap().cell(first).next;
    ctx.set_stack_head(first_next);
    let last_next = ctx.heap().cell(last).next;
    ctx.heap_mut().cell_mut(first).next = last_next;
    ctx.heap_mut().cell_mut(last).next = Some(first);
  } else if step > 0 {
    let prev = ctx.peek(step - 1)?;
    match ctx.heap().cell(prev).next {
      Some(last) => {
        let last_next = ctx.heap().cell(last).next;
        ctx.heap_mut().cell_mut(prev).next = last_next;
        let old_head = ctx.stack_head();
        ctx.heap_mut().cell_mut(last).next = old_head;
        ctx.set_stack_head(Some(last));
      }
      None => return signal::escalate(ctx, Signal::StackUnderflow, "stack underflow"),
    }
  }
  Ok(())
}

/// `cpy`, pops a number index, pushes a deep copy of the cell at that
/// depth.
pub fn cpy(ctx: &mut Context) -> LfResult<()> {
  let idx_cell = ctx.take(0)?;
  let idx = ctx.expect_number(idx_cell)? as i64;
  let src = ctx.peek(idx)?;
  let copy = ctx.copy_value(src)?;
  ctx.push_obj(copy);
  Ok(())
}

/// `drp`, pops a number index, discards the cell at that depth.
pub fn drp(ctx: &mut Context) -> LfResult<()> {
  let idx_cell = ctx.take(0)?;
  let idx = ctx.expect_number(idx_cell)? as i64;
  ctx.take(idx)?;
  Ok(())
}

/// `wrp`, pops a number index `i`, wraps the top `i + 1` cells (top
/// becomes the wrapped list's last element) into a single list pushed
/// back on.
pub fn wrp(ctx: &mut Context) -> LfResult<()> {
  let idx_cell = ctx.take(0)?;
  let idx = ctx.expect_number(idx_cell)? as i64;
  let boundary = ctx.peek(idx)?;
  let head = ctx.stack_head();
  let rest = ctx.heap().cell(boundary).next;
  ctx.heap_mut().cell_mut(boundary).next = None;
  ctx.set_stack_head(rest);
  ctx.adjust_size(-(idx + 1));
  let list = ctx.make_token(Tag::List, Payload::List(head))?;
  ctx.push_obj(list);
  Ok(())
}

/// `pul`, pops a list, pushes each of its elements in payload order as
/// aliases, then pushes a number with the count.
pub fn pul(ctx: &mut Context) -> LfResult<()> {
  let list_cell = ctx.take(0)?;
  let mut cur = ctx.expect_list(list_cell)?;
  let mut count = 0.0f64;
  while let Some(id) = cur {
    let aliased = ctx.alias(id)?;
    ctx.push_obj(aliased);
    cur = ctx.heap().cell(id).next;
    count += 1.0;
  }
  ctx.push_number(count)
}

/// `apl`, pops the top value and applies it. In tail position within a
/// list body, [`crate::eval::apply`] bypasses this function and loops
/// directly instead, to preserve unbounded tail-recursion depth; this is
/// the path taken everywhere else (non-tail calls, or `apl` reached via
/// [`crate::eval::execute`]).
pub fn apl(ctx: &mut Context) -> LfResult<()> {
  let obj = ctx.pop_top()?;
  eval::apply(ctx, obj)
}

/// `eq`, stack contract `... A B T E eq`: compares `A` and `B`
/// structurally, applies `T` if equal, `E` otherwise, freeing the losing
/// branch. Shares its comparison-and-branch-selection with `apply`'s
/// tail-position fast path via [`eval::eq_select`]; unlike that fast
/// path, this always recurses into [`eval::apply`] rather than looping.
pub fn eq(ctx: &mut Context) -> LfResult<()> {
  let winner = eval::eq_select(ctx)?;
  eval::apply(ctx, winner)
}

/// `is`, pops a value, pushes a three-byte string naming its tag.
pub fn is(ctx: &mut Context) -> LfResult<()> {
  let cell = ctx.take(0)?;
  let name = ctx.heap().cell(cell).tag.name();
  ctx.push_string(name.as_bytes())
}

/// `rf`, pops a number index, pushes an alias of the cell at that depth
/// (structural sharing, unlike `cpy`).
pub fn rf(ctx: &mut Context) -> LfResult<()> {
  let idx_cell = ctx.take(0)?;
  let idx = ctx.expect_number(idx_cell)? as i64;
  let src = ctx.peek(idx)?;
  let aliased = ctx.alias(src)?;
  ctx.push_obj(aliased);
  Ok(())
}

/// `sz`, pushes the current stack size as a number.
pub fn sz(ctx: &mut Context) -> LfResult<()> {
  ctx.push_number(ctx.size() as f64)
}

/// Pops two numbers (top is the right operand) and pushes
/// `f(left, right)`.
fn binop(ctx: &mut Context, f: impl Fn(f64, f64) -> f64) -> LfResult<()> {
  let b_cell = ctx.take(0)?;
  let b = ctx.expect_number(b_cell)?;
  let a_cell = ctx.take(0)?;
  let a = ctx.expect_number(a_cell)?;
  ctx.push_number(f(a, b))
}

pub fn add(ctx: &mut Context) -> LfResult<()> {
  binop(ctx, |a, b| a + b)
}

pub fn sub(ctx: &mut Context) -> LfResult<()> {
  binop(ctx, |a, b| a - b)
}

pub fn mul(ctx: &mut Context) -> LfResult<()> {
  binop(ctx, |a, b| a * b)
}

pub fn div(ctx: &mut Context) -> LfResult<()> {
  binop(ctx, |a, b| a / b)
}

/// `mod`, floating remainder; named `modulo` since `mod` is a Rust
/// keyword.
pub fn modulo(ctx: &mut Context) -> LfResult<()> {
  binop(ctx, |a, b| a % b)
}

/// `sgn`, pops a number, pushes -1, 0, or +1.
pub fn sgn(ctx: &mut Context) -> LfResult<()> {
  let cell = ctx.take(0)?;
  let n = ctx.expect_number(cell)?;
  ctx.push_number(if n < 0.0 {
    -1.0
  } else if n > 0.0 {
    1.0
  } else {
    0.0
  })
}

/// The closed set of built-in names and their native functions. These are
/// recognized directly by the reader's token classifier, never installed
/// into the dictionary.
pub const BUILTINS: [(&str, NativeFn); 19] = [
  ("rol", rol),
  ("cpy", cpy),
  ("drp", drp),
  ("wrp", wrp),
  ("pul", pul),
  ("apl", apl),
  (";", reg),
  ("~", rem),
  ("?", find),
  ("eq", eq),
  ("is", is),
  ("rf", rf),
  ("sz", sz),
  ("+", add),
  ("-", sub),
  ("*", mul),
  ("/", div),
  ("mod", modulo),
  ("sgn", sgn),
];

/// Looks up `name` among [`BUILTINS`], returning its native function if
/// found.
pub fn lookup(name: &[u8]) -> Option<NativeFn> {
  BUILTINS
    .iter()
    .find(|(key, _)| key.as_bytes() == name)
    .map(|(_, f)| *f)
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
  fn lookup_finds_all_builtin_names() {
    for (name, _) in BUILTINS {
      assert!(lookup(name.as_bytes()).is_some(), "missing {name}");
    }
    assert!(lookup(b"nope").is_none());
  }

  #[test]
  fn addition_pops_two_pushes_sum() {
    let mut ctx = ctx_with(32);
    ctx.push_number(1.0).unwrap();
    ctx.push_number(2.0).unwrap();
    add(&mut ctx).unwrap();
    ctx.drain_hold();
    assert_eq!(ctx.size(), 1);
    let top = ctx.peek(0).unwrap();
    assert_eq!(ctx.expect_number(top).unwrap(), 3.0);
  }

  #[test]
  fn subtraction_orders_operands_left_minus_right() {
    let mut ctx = ctx_with(32);
    ctx.push_number(5.0).unwrap();
    ctx.push_number(2.0).unwrap();
    sub(&mut ctx).unwrap();
    ctx.drain_hold();
    let top = ctx.peek(0).unwrap();
    assert_eq!(ctx.expect_number(top).unwrap(), 3.0);
  }

  #[test]
  fn division_by_zero_yields_infinity_without_raising() {
    let mut ctx = ctx_with(32);
    ctx.push_number(1.0).unwrap();
    ctx.push_number(0.0).unwrap();
    div(&mut ctx).unwrap();
    ctx.drain_hold();
    let top = ctx.peek(0).unwrap();
    assert!(ctx.expect_number(top).unwrap().is_infinite());
  }

  #[test]
  fn sgn_of_negative_zero_and_positive() {
    let mut ctx = ctx_with(32);
    ctx.push_number(-3.5).unwrap();
    sgn(&mut ctx).unwrap();
    ctx.drain_hold();
    let top = ctx.peek(0).unwrap();
    assert_eq!(ctx.expect_number(top).unwrap(), -1.0);

    ctx.push_number(0.0).unwrap();
    sgn(&mut ctx).unwrap();
    ctx.drain_hold();
    let top = ctx.peek(0).unwrap();
    assert_eq!(ctx.expect_number(top).unwrap(), 0.0);

    ctx.push_number(5.0).unwrap();
    sgn(&mut ctx).unwrap();
    ctx.drain_hold();
    let top = ctx.peek(0).unwrap();
    assert_eq!(ctx.expect_number(top).unwrap(), 1.0);
  }

  #[test]
  fn sz_reports_current_stack_size() {
    let mut ctx = ctx_with(32);
    ctx.push_number(1.0).unwrap();
    ctx.push_number(2.0).unwrap();
    sz(&mut ctx).unwrap();
    ctx.drain_hold();
    let top = ctx.peek(0).unwrap();
    assert_eq!(ctx.expect_number(top).unwrap(), 2.0);
  }

  #[test]
  fn rol_positive_brings_depth_to_top() {
    let mut ctx = ctx_with(64);
    ctx.push_number(1.0).unwrap();
    ctx.push_number(2.0).unwrap();
    ctx.push_number(3.0).unwrap();
    ctx.push_number(2.0).unwrap(); // step
    rol(&mut ctx).unwrap();
    ctx.drain_hold();
    let top = ctx.peek(0).unwrap();
    assert_eq!(ctx.expect_number(top).unwrap(), 1.0);
    assert_eq!(ctx.size(), 3);
  }

  #[test]
  fn rol_then_negative_rol_is_identity() {
    let mut ctx = ctx_with(64);
    ctx.push_number(1.0).unwrap();
    ctx.push_number(2.0).unwrap();
    ctx.push_number(3.0).unwrap();
    ctx.push_number(2.0).unwrap();
    rol(&mut ctx).unwrap();
    ctx.drain_hold();
    ctx.push_number(-2.0).unwrap();
    rol(&mut ctx).unwrap();
    ctx.drain_hold();
    let top = ctx.peek(0).unwrap();
    assert_eq!(ctx.expect_number(top).unwrap(), 3.0);
    let mid = ctx.peek(1).unwrap();
    assert_eq!(ctx.expect_number(mid).unwrap(), 2.0);
    let bot = ctx.peek(2).unwrap();
    assert_eq!(ctx.expect_number(bot).unwrap(), 1.0);
  }

  #[test]
  fn wrp_then_pul_round_trips_elements() {
    let mut ctx = ctx_with(64);
    ctx.push_number(1.0).unwrap();
    ctx.push_number(2.0).unwrap();
    ctx.push_number(3.0).unwrap();
    ctx.push_number(2.0).unwrap(); // wrap top 3
    wrp(&mut ctx).unwrap();
    ctx.drain_hold();
    assert_eq!(ctx.size(), 1);
    let list = ctx.peek(0).unwrap();
    pul(&mut ctx).unwrap();
    ctx.drain_hold();
    let _ = list;
    // 1 2 3 3
    assert_eq!(ctx.size(), 4);
    let count = ctx.peek(0).unwrap();
    assert_eq!(ctx.expect_number(count).unwrap(), 3.0);
  }

  #[test]
  fn cpy_pushes_independent_copy_of_list() {
    let mut ctx = ctx_with(64);
    ctx.push_number(1.0).unwrap();
    ctx.push_number(2.0).unwrap();
    ctx.push_number(3.0).unwrap();
    ctx.push_number(2.0).unwrap();
    wrp(&mut ctx).unwrap();
    ctx.drain_hold();
    ctx.push_number(0.0).unwrap();
    cpy(&mut ctx).unwrap();
    ctx.drain_hold();
    assert_eq!(ctx.size(), 2);
  }
}
