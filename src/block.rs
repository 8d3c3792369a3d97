//! The block allocator: a singly-linked free list of uniform blocks carved
//! out of host-donated memory.
//!
//! ```text
//!   Heap
//!   +------------------------------------------------------------+
//!   |  slots: Vec<Slot>                                           |
//!   |                                                              |
//!   |  [0: Cell] [1: Free->3] [2: Reference] [3: Free->None] [4: ..]|
//!   |                                                              |
//!   |  free_head: Some(1)                                         |
//!   +------------------------------------------------------------+
//! ```
//!
//! Every runtime structure (a value cell, a reference record, a string
//! segment, or a reader chunk) is exactly one [`Slot`]. Rather than raw
//! blocks reinterpreted through a pointer cast, this crate follows the
//! "arena plus index" approach: one `Vec<Slot>` pool, and every next-link
//! is a [`BlockId`] index instead of a raw pointer. A [`Slot::Free`] entry
//! threads the free list the same way a bump allocator threads its free
//! blocks, just keyed by index rather than address.
//!
//! No coalescing, no alignment concerns (every slot is the same size), and
//! no shrinking: once donated via [`Heap::map_memory`], slots are never
//! returned to the host. Exhaustion is reported to the caller, which is
//! expected to raise an out-of-memory signal and retry after a handler
//! donates more (`map_memory` may be called again at any time).

use crate::chunk::Chunk;
use crate::string::Segment;
use crate::value::{Cell, Reference};

/// An index into a [`Heap`]'s slot pool, playing the role of a block
/// pointer; `None` (via `Link`) plays the role of a null pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u32);

/// A possibly-absent link to a block: the extrinsic "next" pointer every
/// cell carries, plus the analogous links on references, segments, and
/// chunks.
pub type Link = Option<BlockId>;

/// One block's contents. Every variant occupies the same slot size; which
/// variant is live is tracked by the enum discriminant rather than a type
/// tag baked into raw bytes.
pub enum Slot {
  /// Unused block, threaded onto `Heap`'s free list.
  Free(Link),
  Cell(Cell),
  Reference(Reference),
  Segment(Segment),
  Chunk(Chunk),
}

/// Carves host-donated memory into fixed-size blocks and owns the free
/// list.
pub struct Heap {
  slots: Vec<Slot>,
  free_head: Link,
  /// Total blocks ever donated, for low-water-mark bookkeeping.
  donated: usize,
}

impl Heap {
  /// An empty heap with no donated memory.
  pub fn new() -> Self {
    Heap {
      slots: Vec::new(),
      free_head: None,
      donated: 0,
    }
  }

  /// Donates `count` additional blocks, threading them onto the free
  /// list. May be called more than once, including from inside an
  /// out-of-memory handler, to let a retrying allocation succeed.
  pub fn map_memory(&mut self, count: usize) {
    let start = self.slots.len();
    self.slots.reserve(count);
    for i in 0..count {
      let id = BlockId((start + i) as u32);
      let next = self.free_head;
      self.slots.push(Slot::Free(next));
      self.free_head = Some(id);
    }
    self.donated += count;
  }

  /// Total blocks ever donated via `map_memory`.
  pub fn capacity(&self) -> usize {
    self.donated
  }

  /// Number of blocks currently on the free list.
  pub fn free_len(&self) -> usize {
    let mut n = 0;
    let mut cur = self.free_head;
    while let Some(id) = cur {
      n += 1;
      cur = match &self.slots[id.0 as usize] {
        Slot::Free(next) => *next,
        _ => unreachable!("free list pointed at a live slot"),
      };
    }
    n
  }

  /// Removes and returns one block from the free list, or `None` if
  /// exhausted; the caller raises an out-of-memory signal and retries.
  pub fn take_free(&mut self) -> Option<BlockId> {
    let id = self.free_head?;
    let next = match &self.slots[id.0 as usize] {
      Slot::Free(next) => *next,
      _ => unreachable!("free list pointed at a live slot"),
    };
    self.free_head = next;
    Some(id)
  }

  /// Installs `slot` at `id`, which must have just come from
  /// [`Heap::take_free`].
  pub fn install(&mut self, id: BlockId, slot: Slot) {
    self.slots[id.0 as usize] = slot;
  }

  /// Returns `id` to the free list, dropping whatever was stored there.
  pub fn release(&mut self, id: BlockId) {
    let next = self.free_head;
    self.slots[id.0 as usize] = Slot::Free(next);
    self.free_head = Some(id);
  }

  pub fn get(&self, id: BlockId) -> &Slot {
    &self.slots[id.0 as usize]
  }

  pub fn get_mut(&mut self, id: BlockId) -> &mut Slot {
    &mut self.slots[id.0 as usize]
  }

  pub fn cell(&self, id: BlockId) -> &Cell {
    match self.get(id) {
      Slot::Cell(cell) => cell,
      _ => panic!("block {} is not a cell", id.0),
    }
  }

  pub fn cell_mut(&mut self, id: BlockId) -> &mut Cell {
    match self.get_mut(id) {
      Slot::Cell(cell) => cell,
      _ => panic!("block {} is not a cell", id.0),
    }
  }

  pub fn reference(&self, id: BlockId) -> &Reference {
    match self.get(id) {
      Slot::Reference(r) => r,
      _ => panic!("block {} is not a reference record", id.0),
    }
  }

  pub fn reference_mut(&mut self, id: BlockId) -> &mut Reference {
    match self.get_mut(id) {
      Slot::Reference(r) => r,
      _ => panic!("block {} is not a reference record", id.0),
    }
  }

  pub fn segment(&self, id: BlockId) -> &Segment {
    match self.get(id) {
      Slot::Segment(s) => s,
      _ => panic!("block {} is not a string segment", id.0),
    }
  }

  pub fn chunk(&self, id: BlockId) -> &Chunk {
    match self.get(id) {
      Slot::Chunk(c) => c,
      _ => panic!("block {} is not a chunk", id.0),
    }
  }

  pub fn chunk_mut(&mut self, id: BlockId) -> &mut Chunk {
    match self.get_mut(id) {
      Slot::Chunk(c) => c,
      _ => panic!("block {} is not a chunk", id.0),
    }
  }
}

impl Default for Heap {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::value::{Cell, Tag};

  #[test]
  fn donated_blocks_start_free() {
    let mut heap = Heap::new();
    assert_eq!(heap.free_len(), 0);
    heap.map_memory(4);
    assert_eq!(heap.free_len(), 4);
    assert_eq!(heap.capacity(), 4);
  }

  #[test]
  fn take_free_then_release_round_trips() {
    let mut heap = Heap::new();
    heap.map_memory(2);
    let a = heap.take_free().unwrap();
    assert_eq!(heap.free_len(), 1);
    heap.install(
      a,
      Slot::Cell(Cell {
        tag: Tag::Number,
        reference: BlockId(0),
        next: None,
      }),
    );
    heap.release(a);
    assert_eq!(heap.free_len(), 2);
  }

  #[test]
  fn exhaustion_returns_none() {
    let mut heap = Heap::new();
    heap.map_memory(1);
    assert!(heap.take_free().is_some());
    assert!(heap.take_free().is_none());
  }

  #[test]
  fn second_donation_extends_free_list() {
    let mut heap = Heap::new();
    heap.map_memory(1);
    heap.take_free();
    assert!(heap.take_free().is_none());
    heap.map_memory(1);
    assert!(heap.take_free().is_some());
  }
}
