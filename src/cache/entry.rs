//! A single cache line's resident state: validity, LRU age, tag, and data.

pub const WORDS_PER_LINE: usize = 4;
pub const LOG_WORDS_PER_LINE: u32 = 2;
/// log2 of the line size in bytes (WORDS_PER_LINE words * 4 bytes/word = 16).
pub const LOG_LINE_BYTES: u32 = LOG_WORDS_PER_LINE + 2;
pub const LINE_BYTES: usize = 1 << LOG_LINE_BYTES;

/// `{ valid, age, tag, line }` as described in the data model: an entry with
/// `valid == false` is never consulted and its other fields are meaningless.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheEntry {
    pub valid: bool,
    pub age: u8,
    pub tag: u32,
    pub line: [u32; WORDS_PER_LINE],
}

impl CacheEntry {
    pub const INVALID: CacheEntry = CacheEntry {
        valid: false,
        age: 0,
        tag: 0,
        line: [0; WORDS_PER_LINE],
    };

    pub fn new(tag: u32, line: [u32; WORDS_PER_LINE]) -> Self {
        CacheEntry {
            valid: true,
            age: 0,
            tag,
            line,
        }
    }
}
