//! Compile-time tunables: block size, string-segment buffer size, maximum
//! symbol length. These are `const` rather than fields on a runtime struct,
//! which lets [`Segment`](crate::string::Segment) store its buffer inline as
//! a fixed-size array instead of reaching for a separately heap-allocated
//! `Vec`. Every block stays exactly one block, carved only from host-donated
//! memory, with no allocation outside the pool [`Heap`](crate::block::Heap)
//! manages.
//!
//! A host that genuinely needs different limits recompiles the crate with
//! these changed.

/// Number of `usize` words in one block. Every block (cell, reference
/// record, string segment, chunk) occupies exactly this many words.
pub const WORDS_PER_BLOCK: usize = 3;

/// Maximum length of a symbol or built-in token, in bytes, including the
/// would-be overflow byte. A token of exactly `SYM_MAX_LEN - 1` bytes is
/// accepted; one more raises a parse error.
pub const SYM_MAX_LEN: usize = 64;

/// Usable bytes per string segment before chaining to another segment (two
/// words, leaving the block's third word for the segment's `next` link).
pub const SEGMENT_BUF_SIZE: usize = 2 * size_of::<usize>();
