//! Reader chunks: the tree of token lists the reader builds while parsing,
//! one chunk per open `[`.
//!
//! A chunk tracks its append point as either "still empty, write into
//! `head`" or "last cell written, write into its `next` field". [`TailSlot`]
//! names these two cases explicitly and [`append`] matches on it, rather
//! than keeping a raw pointer to whichever field should receive the next
//! cell.
//!
//! `back` is the chunk one level out, toward which a closing `]` promotes a
//! finished list and through which the reader's symbol/string/number
//! interning search climbs.

use crate::block::{BlockId, Heap, Link, Slot};

/// Where the next cell appended to a chunk should be linked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailSlot {
  /// The chunk is still empty; link into its `head` field.
  Head,
  /// Link into this cell's `next` field.
  After(BlockId),
}

/// One level of open-bracket nesting while reading.
pub struct Chunk {
  head: Link,
  tail: TailSlot,
  /// The enclosing chunk, or `None` for the outermost chunk of a read.
  pub back: Link,
}

impl Chunk {
  fn new(back: Link) -> Self {
    Chunk {
      head: None,
      tail: TailSlot::Head,
      back,
    }
  }

  pub fn head(&self) -> Link {
    self.head
  }
}

/// Opens a new chunk whose enclosing chunk is `back`.
pub fn open_within(heap: &mut Heap, back: Link) -> Option<BlockId> {
  let id = heap.take_free()?;
  heap.install(id, Slot::Chunk(Chunk::new(back)));
  Some(id)
}

/// Appends `obj` to the end of `chunk_id`'s body in O(1), advancing the
/// chunk's tail slot.
pub fn append(heap: &mut Heap, chunk_id: BlockId, obj: BlockId) {
  match heap.chunk(chunk_id).tail {
    TailSlot::Head => heap.chunk_mut(chunk_id).head = Some(obj),
    TailSlot::After(last) => heap.cell_mut(last).next = Some(obj),
  }
  heap.chunk_mut(chunk_id).tail = TailSlot::After(obj);
}
