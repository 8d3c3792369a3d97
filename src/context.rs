//! The interpreter context: owns the heap, the operand stack, the
//! dictionary, the hold list, and the signal handler table.
//!
//! Per-entry setjmp/longjmp-style non-local escape is replaced by
//! `?`-propagated [`LfResult`], and a callback-plus-void-pointer pair for
//! I/O is replaced by [`io::Read`]/[`io::Write`] trait objects.

use crate::block::{BlockId, Heap, Link, Slot};
use crate::chunk;
use crate::error::LfResult;
use crate::io::{self, Read, Write};
use crate::signal::{self, Handler, HandlerTable, Signal};
use crate::string;
use crate::value::{self, Cell, Payload, Reference, Tag, UserData};

/// A built-in or host-registered native function.
pub type NativeFn = fn(&mut Context) -> LfResult<()>;

pub struct Context {
  heap: Heap,
  stack: Link,
  size: i64,
  dict: Link,
  hold: Link,
  handlers: HandlerTable,
  writer: Option<Box<dyn Write>>,
}

impl Context {
  /// Fresh, empty context with no donated memory and no I/O configured.
  pub fn new() -> Self {
    Context {
      heap: Heap::new(),
      stack: None,
      size: 0,
      dict: None,
      hold: None,
      handlers: HandlerTable::new(),
      writer: None,
    }
  }

  /// Drains the hold list.
  pub fn reset(&mut self) {
    self.drain_hold();
  }

  /// Donates `count` more blocks to the heap. Safe to call repeatedly,
  /// including from inside an out-of-memory handler.
  pub fn map_memory(&mut self, count: usize) {
    self.heap.map_memory(count);
  }

  pub fn set_writer(&mut self, writer: Box<dyn Write>) {
    self.writer = Some(writer);
  }

  pub fn set_handler(&mut self, kind: Signal, handler: Handler) {
    self.handlers.set(kind, handler);
  }

  pub fn handlers(&self) -> &HandlerTable {
    &self.handlers
  }

  pub fn heap(&self) -> &Heap {
    &self.heap
  }

  pub(crate) fn heap_mut(&mut self) -> &mut Heap {
    &mut self.heap
  }

  pub fn size(&self) -> i64 {
    self.size
  }

  pub fn stack_head(&self) -> Link {
    self.stack
  }

  pub(crate) fn set_stack_head(&mut self, head: Link) {
    self.stack = head;
  }

  pub(crate) fn adjust_size(&mut self, delta: i64) {
    self.size += delta;
  }

  /// Raises `kind` with `msg`: runs the registered handler, and if it
  /// doesn't resolve the condition, drains the hold list and returns the
  /// escalated signal as an error.
  pub fn raise(&mut self, kind: Signal, msg: &str) -> LfResult<()> {
    signal::raise(self, kind, msg)
  }

  /// Writes `msg` through the configured writer, a no-op if none is set.
  /// Used by the default handler and by [`crate::trace::trace`].
  pub fn write_str(&mut self, msg: &str) {
    if let Some(w) = self.writer.as_deref_mut() {
      w.put_str(msg);
    }
  }

  pub fn writer_mut(&mut self) -> Option<&mut dyn Write> {
    self.writer.as_deref_mut()
  }

  pub fn drain_hold(&mut self) {
    let head = self.hold.take();
    value::release_chain(&mut self.heap, head);
  }

  /// Ensures at least `n` blocks are free, raising an out-of-memory
  /// signal and retrying while the handler keeps resolving it. A host's
  /// handler is expected to call [`Context::map_memory`] before
  /// returning `Ok`.
  ///
  /// Constructors that need several blocks call this once for their
  /// whole requirement up front rather than retrying block-by-block, so
  /// a multi-block constructor either gets everything it needs before
  /// starting or raises once, keeping partially-built structures from
  /// being left half-linked across a host's out-of-memory handler doing
  /// unrelated work.
  fn ensure_free(&mut self, n: usize) -> LfResult<()> {
    while self.heap.free_len() < n {
      self.raise(Signal::OutOfMemory, "enough memory")?;
    }
    Ok(())
  }

  pub(crate) fn chars_of(&self, cell: BlockId) -> Link {
    match &self.heap.reference(self.heap.cell(cell).reference).payload {
      Payload::Chars(head) => *head,
      _ => panic!("expected a symbol or string cell"),
    }
  }

  pub(crate) fn list_head_of(&self, cell: BlockId) -> Link {
    match &self.heap.reference(self.heap.cell(cell).reference).payload {
      Payload::List(head) => *head,
      _ => panic!("expected a list cell"),
    }
  }

  pub(crate) fn native_fn_of(&self, cell: BlockId) -> NativeFn {
    match &self.heap.reference(self.heap.cell(cell).reference).payload {
      Payload::Native(f) => *f,
      _ => panic!("expected a native cell"),
    }
  }

  /// Copies `source` per the tag-dependent policy: lists deep-copy,
  /// strings/symbols/user alias, numbers/natives copy by value.
  pub fn copy_value(&mut self, source: BlockId) -> LfResult<BlockId> {
    self.ensure_free(count_copy_blocks(&self.heap, source))?;
    Ok(value::deep_copy(&mut self.heap, source).expect("ensured capacity"))
  }

  /// Allocates a new cell aliasing `source`'s reference record.
  pub fn alias(&mut self, source: BlockId) -> LfResult<BlockId> {
    self.ensure_free(1)?;
    Ok(value::make_alias(&mut self.heap, source).expect("ensured capacity"))
  }

  pub fn release(&mut self, cell: BlockId) -> Link {
    value::release_cell(&mut self.heap, cell)
  }

  /// Pushes `cell` onto the operand stack.
  pub fn push_obj(&mut self, cell: BlockId) {
    self.heap.cell_mut(cell).next = self.stack;
    self.stack = Some(cell);
    self.size += 1;
  }

  /// Returns the `i`-th cell from the top without removing it. A
  /// negative `i` raises a stack-overflow signal; an `i` at or past the
  /// stack depth (including an empty stack) raises a stack-underflow
  /// signal.
  pub fn peek(&mut self, i: i64) -> LfResult<BlockId> {
    self.check_index(i)?;
    let mut obj = self.stack.expect("size > 0 implies a stack head");
    for _ in 0..i {
      obj = self.heap.cell(obj).next.expect("index within size");
    }
    Ok(obj)
  }

  /// Removes and returns the `i`-th cell from the top, moving it onto
  /// the hold list until the next [`Context::drain_hold`]. Used by
  /// built-ins so operands they consume aren't leaked if a later operand
  /// turns out to be the wrong type and raises mid-operation.
  pub fn take(&mut self, i: i64) -> LfResult<BlockId> {
    self.check_index(i)?;
    let mut slot = &mut self.stack;
    for _ in 0..i {
      let id = slot.expect("index within size");
      slot = &mut self.heap.cell_mut(id).next;
    }
    let id = slot.expect("index within size");
    *slot = self.heap.cell(id).next;
    self.heap.cell_mut(id).next = self.hold;
    self.hold = Some(id);
    self.size -= 1;
    Ok(id)
  }

  /// Pops and returns the top cell without routing it through the hold
  /// list, the fast path used by `apl` and the tail-call shortcuts.
  pub(crate) fn pop_top(&mut self) -> LfResult<BlockId> {
    self.check_index(0)?;
    let id = self.stack.expect("size > 0 implies a stack head");
    self.stack = self.heap.cell(id).next;
    self.size -= 1;
    Ok(id)
  }

  /// Shared bounds check for `peek`/`take`/`pop_top`: an index at or
  /// past the stack depth (including an empty stack) raises a
  /// stack-underflow signal; a negative index raises a stack-overflow
  /// signal. Neither condition has a meaningful retry once a handler
  /// resolves it (there is no extra value to hand back), so unlike
  /// [`Context::ensure_free`] this always returns the signal as an error
  /// even when a handler reports it resolved.
  fn check_index(&mut self, i: i64) -> LfResult<()> {
    if i >= self.size || self.size == 0 {
      return signal::escalate(self, Signal::StackUnderflow, "stack underflow");
    }
    if i < 0 {
      return signal::escalate(self, Signal::StackOverflow, "stack overflow");
    }
    Ok(())
  }

  fn expect_tag(&mut self, cell: BlockId, want: Tag) -> LfResult<()> {
    let got = self.heap.cell(cell).tag;
    if got == want {
      Ok(())
    } else {
      let msg = format!("expected {}, got {}", want.name(), got.name());
      signal::escalate(self, Signal::RuntimeError, &msg)
    }
  }

  pub fn expect_number(&mut self, cell: BlockId) -> LfResult<f64> {
    self.expect_tag(cell, Tag::Number)?;
    match &self.heap.reference(self.heap.cell(cell).reference).payload {
      Payload::Number(n) => Ok(*n),
      _ => unreachable!(),
    }
  }

  pub fn expect_native(&mut self, cell: BlockId) -> LfResult<NativeFn> {
    self.expect_tag(cell, Tag::Native)?;
    Ok(self.native_fn_of(cell))
  }

  pub fn expect_list(&mut self, cell: BlockId) -> LfResult<Link> {
    self.expect_tag(cell, Tag::List)?;
    Ok(self.list_head_of(cell))
  }

  pub fn expect_user(&mut self, cell: BlockId) -> LfResult<*mut std::ffi::c_void> {
    self.expect_tag(cell, Tag::User)?;
    match &self.heap.reference(self.heap.cell(cell).reference).payload {
      Payload::User(u) => Ok(u.ptr),
      _ => unreachable!(),
    }
  }

  pub fn expect_string(&mut self, cell: BlockId) -> LfResult<Link> {
    self.expect_tag(cell, Tag::String)?;
    Ok(self.chars_of(cell))
  }

  /// Flattens a string/symbol cell's segment chain into a byte vector.
  pub fn string_bytes(&self, chars: Link) -> Vec<u8> {
    string::flatten(&self.heap, chars)
  }

  fn push_new_cell(&mut self, tag: Tag, payload: Payload) -> LfResult<()> {
    self.ensure_free(2)?;
    let id = value::make_cell(&mut self.heap, tag, payload).expect("ensured capacity");
    self.push_obj(id);
    Ok(())
  }

  pub fn push_list(&mut self) -> LfResult<()> {
    self.push_new_cell(Tag::List, Payload::List(None))
  }

  pub fn push_symbol(&mut self, bytes: &[u8]) -> LfResult<()> {
    let id = self.make_text_token(Tag::Symbol, bytes)?;
    self.push_obj(id);
    Ok(())
  }

  pub fn push_string(&mut self, bytes: &[u8]) -> LfResult<()> {
    let id = self.make_text_token(Tag::String, bytes)?;
    self.push_obj(id);
    Ok(())
  }

  pub fn push_native(&mut self, f: NativeFn) -> LfResult<()> {
    self.push_new_cell(Tag::Native, Payload::Native(f))
  }

  pub fn push_number(&mut self, n: f64) -> LfResult<()> {
    self.push_new_cell(Tag::Number, Payload::Number(n))
  }

  pub fn push_user(
    &mut self,
    ptr: *mut std::ffi::c_void,
    finalizer: fn(*mut std::ffi::c_void),
  ) -> LfResult<()> {
    self.push_new_cell(Tag::User, Payload::User(UserData { ptr, finalizer }))
  }

  /// Looks up `name`'s binding in the dictionary, returning the (shared,
  /// not copied) value cell, or raising a runtime-error signal if
  /// unbound. The returned id aliases the dictionary's own storage;
  /// callers must copy before pushing it onto the stack.
  pub(crate) fn lookup(&mut self, name: Link) -> LfResult<BlockId> {
    let mut cur = self.dict;
    while let Some(name_id) = cur {
      let chars = self.chars_of(name_id);
      let value_id = self
        .heap
        .cell(name_id)
        .next
        .expect("dictionary entry missing its value cell");
      if string::segments_equal(&self.heap, chars, name) {
        return Ok(value_id);
      }
      cur = self.heap.cell(value_id).next;
    }
    let text = String::from_utf8_lossy(&self.string_bytes(name)).into_owned();
    let msg = format!("unknown symbol '{text}'");
    signal::escalate(self, Signal::RuntimeError, &msg)
  }

  /// Binds the top-of-stack value under the name one below it: pops
  /// name and value, most-recently-registered entries shadow older ones
  /// with the same name since lookup scans front to back and this
  /// always prepends.
  pub fn register(&mut self) -> LfResult<()> {
    let name_peek = self.peek(0)?;
    self.expect_tag(name_peek, Tag::String)?;
    let name = self.pop_top()?;
    let value = self.pop_top()?;
    self.heap.cell_mut(value).next = self.dict;
    self.heap.cell_mut(name).next = Some(value);
    self.dict = Some(name);
    Ok(())
  }

  /// Removes the dictionary entry named by the popped top-of-stack
  /// string, if one exists.
  pub fn remove(&mut self) -> LfResult<()> {
    let name_obj = self.take(0)?;
    self.expect_tag(name_obj, Tag::String)?;
    let chars = self.chars_of(name_obj);
    let mut slot = &mut self.dict;
    loop {
      let Some(name_id) = *slot else { break };
      let entry_chars = match &self.heap.reference(self.heap.cell(name_id).reference).payload
      {
        Payload::Chars(h) => *h,
        _ => unreachable!(),
      };
      if string::segments_equal(&self.heap, entry_chars, chars) {
        let value_id = self.heap.cell(name_id).next.expect("entry has a value");
        let after = self.heap.cell(value_id).next;
        *slot = after;
        value::release_cell(&mut self.heap, name_id);
        value::release_cell(&mut self.heap, value_id);
        break;
      }
      let value_id = self.heap.cell(name_id).next.expect("entry has a value");
      slot = &mut self.heap.cell_mut(value_id).next;
    }
    Ok(())
  }

  /// Pushes a copy of the binding named by the popped top-of-stack
  /// string.
  pub fn find_entry(&mut self) -> LfResult<()> {
    let name_obj = self.take(0)?;
    self.expect_tag(name_obj, Tag::String)?;
    let chars = self.chars_of(name_obj);
    let value = self.lookup(chars)?;
    let copy = self.copy_value(value)?;
    self.push_obj(copy);
    Ok(())
  }

  /// Formats `sig` the way the default handler does, for hosts that
  /// want the same wording without installing it.
  pub fn default_trace(&mut self, sig: Signal, msg: &str) {
    let line = format!("signal({}): {msg}\n", sig as i32);
    self.write_str(&line);
  }

  /// Releases every cell still reachable from `chunk`'s chunk chain and
  /// sets `*chunk` to `None`.
  pub fn wipe_chunk(&mut self, chunk: &mut Link) {
    while let Some(id) = chunk.take() {
      let next = self.heap.chunk(id).back;
      let head = self.heap.chunk(id).head();
      value::release_chain(&mut self.heap, head);
      self.heap.release(id);
      *chunk = next;
    }
  }

  /// Opens a fresh top-level chunk with no enclosing chunk, allocating
  /// if needed (used by [`crate::reader::read`] the first time it's
  /// called with `*chunk == None`).
  pub(crate) fn open_chunk(&mut self, back: Link) -> LfResult<BlockId> {
    self.ensure_free(1)?;
    Ok(chunk::open_within(&mut self.heap, back).expect("ensured capacity"))
  }

  pub(crate) fn append_chunk(&mut self, chunk_id: BlockId, obj: BlockId) {
    chunk::append(&mut self.heap, chunk_id, obj);
  }

  /// Closes `chunk_id` on seeing its matching `]`: turns it in place
  /// into a list cell wrapping its accumulated body, and appends that
  /// cell to `parent_id`'s tail. Reinstalling a `Slot::Cell` over the
  /// chunk's own slot reuses its block rather than releasing it and
  /// allocating a fresh one.
  pub(crate) fn finish_chunk(&mut self, chunk_id: BlockId, parent_id: BlockId) -> LfResult<()> {
    self.ensure_free(1)?;
    let head = self.heap.chunk(chunk_id).head();
    let ref_id = self.heap.take_free().expect("ensured capacity");
    self.heap.install(
      ref_id,
      Slot::Reference(Reference {
        count: 1,
        payload: Payload::List(head),
      }),
    );
    self.heap.install(
      chunk_id,
      Slot::Cell(Cell {
        tag: Tag::List,
        reference: ref_id,
        next: None,
      }),
    );
    chunk::append(&mut self.heap, parent_id, chunk_id);
    Ok(())
  }

  /// Replaces `cell`'s own (freshly built) reference record with an
  /// alias to `existing`'s, for the reader's intra-chunk interning:
  /// `cell`'s original record is released (it's always fresh with count
  /// 1, so this frees it outright) and `existing`'s count is bumped in
  /// its place.
  pub(crate) fn reintern(&mut self, cell: BlockId, existing: BlockId) {
    let tag = self.heap.cell(cell).tag;
    let old_ref = self.heap.cell(cell).reference;
    value::release_reference(&mut self.heap, old_ref, tag);
    let existing_ref = self.heap.cell(existing).reference;
    self.heap.reference_mut(existing_ref).count += 1;
    self.heap.cell_mut(cell).reference = existing_ref;
  }

  /// Reads one top-level form from `input` into `chunk`, which tracks
  /// the innermost currently-open chunk across calls: `None` starts a
  /// fresh program, `Some` continues one left unfinished by a prior
  /// call.
  pub fn read(&mut self, chunk: &mut Link, input: &mut dyn Read) -> LfResult<()> {
    crate::reader::read(self, chunk, input)
  }

  /// Evaluates a fully-closed chunk tree.
  pub fn evaluate(&mut self, chunk: BlockId) -> LfResult<()> {
    crate::eval::eval_chunk(self, chunk)
  }

  /// Searches every chunk enclosing (and including) `chunk_id` for a
  /// cell structurally equal to `obj`, for the reader's intra-chunk
  /// interning. Returns the existing cell so the caller can alias its
  /// reference record instead of keeping a freshly-built duplicate.
  pub(crate) fn search_intern(&self, chunk_id: Link, obj: BlockId) -> Option<BlockId> {
    let mut chk = chunk_id;
    while let Some(cid) = chk {
      let mut it = self.heap.chunk(cid).head();
      while let Some(it_id) = it {
        if value::structurally_equal(&self.heap, it_id, obj) {
          return Some(it_id);
        }
        it = self.heap.cell(it_id).next;
      }
      chk = self.heap.chunk(cid).back;
    }
    None
  }

  /// Builds a cell without pushing it anywhere, for the reader's token
  /// construction (tokens live in a chunk's body chain, not the operand
  /// stack).
  pub(crate) fn make_token(&mut self, tag: Tag, payload: Payload) -> LfResult<BlockId> {
    self.ensure_free(2)?;
    Ok(value::make_cell(&mut self.heap, tag, payload).expect("ensured capacity"))
  }

  /// Builds a symbol or string token from raw bytes without pushing it.
  pub(crate) fn make_text_token(&mut self, tag: Tag, bytes: &[u8]) -> LfResult<BlockId> {
    let blocks = bytes.len().div_ceil(crate::config::SEGMENT_BUF_SIZE).max(1);
    self.ensure_free(blocks + 2)?;
    let chars = string::build_chain(&mut self.heap, bytes)
      .expect("ensured capacity")
      .expect("build_chain always returns Some when it returns at all");
    Ok(value::make_cell(&mut self.heap, tag, Payload::Chars(chars)).expect("ensured capacity"))
  }
}

impl Default for Context {
  fn default() -> Self {
    Self::new()
  }
}

/// How many blocks [`value::deep_copy`] needs for `source`: two per list
/// node it will visit (cell plus reference record), one per aliasing
/// cell otherwise, so a bulk `ensure_free` can be done once up front.
fn count_copy_blocks(heap: &Heap, source: BlockId) -> usize {
  match heap.cell(source).tag {
    Tag::String | Tag::Symbol | Tag::User => 1,
    Tag::Number | Tag::Native => 2,
    Tag::List => {
      let head = match &heap.reference(heap.cell(source).reference).payload {
        Payload::List(h) => *h,
        _ => unreachable!(),
      };
      2 + count_copy_chain_blocks(heap, head)
    }
  }
}

fn count_copy_chain_blocks(heap: &Heap, mut head: Link) -> usize {
  let mut total = 0;
  while let Some(id) = head {
    total += count_copy_blocks(heap, id);
    head = heap.cell(id).next;
  }
  total
}
