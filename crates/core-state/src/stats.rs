//! Cached buffer statistics with incremental maintenance.
//!
//! Line, byte, and word counts are atomics so the renderer can read them from
//! the mode-line path without synchronisation. Single-byte edits carry an
//! exact word delta; anything larger sets the dirty flag and the next read
//! recomputes by full scan. The boundary is explicit in [`WordDelta`].

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use core_text::GapBuffer;
use core_text::class::is_word_byte;

/// Word-count contribution of one edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordDelta {
    /// Exactly known (only ever produced for single-byte edits).
    Exact(i64),
    /// Not cheaply computable; force a rescan on the next read.
    Rescan,
}

#[derive(Debug)]
pub struct BufferStats {
    lines: AtomicI64,
    bytes: AtomicI64,
    words: AtomicI64,
    dirty: AtomicBool,
}

impl Default for BufferStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferStats {
    /// An empty buffer has one line and nothing else.
    pub fn new() -> Self {
        Self {
            lines: AtomicI64::new(1),
            bytes: AtomicI64::new(0),
            words: AtomicI64::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn reset_empty(&self) {
        self.lines.store(1, Ordering::Release);
        self.bytes.store(0, Ordering::Release);
        self.words.store(0, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Apply an incremental update. An inexact word delta degrades to the
    /// dirty flag; line and byte deltas are always exact.
    pub fn apply(&self, line_delta: i64, byte_delta: i64, word_delta: WordDelta) {
        self.lines.fetch_add(line_delta, Ordering::AcqRel);
        self.bytes.fetch_add(byte_delta, Ordering::AcqRel);
        match word_delta {
            WordDelta::Exact(d) => {
                self.words.fetch_add(d, Ordering::AcqRel);
            }
            WordDelta::Rescan => self.dirty.store(true, Ordering::Release),
        }
    }

    /// Read the cached counts, rescanning first when dirty.
    pub fn read(&self, text: &GapBuffer) -> (u64, u64, u64) {
        if self.is_dirty() {
            self.rescan(text);
        }
        (
            self.lines.load(Ordering::Acquire).max(0) as u64,
            self.bytes.load(Ordering::Acquire).max(0) as u64,
            self.words.load(Ordering::Acquire).max(0) as u64,
        )
    }

    /// Full scan: authoritative counts. Words are runs of non-separator
    /// bytes; separators are space, tab, and newline.
    pub fn rescan(&self, text: &GapBuffer) {
        let bytes = text.to_vec();
        let mut lines: i64 = 1;
        let mut words: i64 = 0;
        let mut in_word = false;
        for &b in &bytes {
            if b == b'\n' {
                lines += 1;
            }
            if matches!(b, b' ' | b'\t' | b'\n') {
                in_word = false;
            } else if !in_word {
                in_word = true;
                words += 1;
            }
        }
        self.lines.store(lines, Ordering::Release);
        self.bytes.store(bytes.len() as i64, Ordering::Release);
        self.words.store(words, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
    }
}

/// Exact word delta for inserting byte `b` between `left` and `right`
/// (`None` at the buffer edge). Inserting a separator inside a word splits it;
/// inserting a word byte between two separators starts a new word.
pub fn insert_word_delta(b: u8, left: Option<u8>, right: Option<u8>) -> WordDelta {
    let l = left.is_some_and(is_word_byte);
    let r = right.is_some_and(is_word_byte);
    let delta = if !is_word_byte(b) {
        i64::from(l && r)
    } else {
        i64::from(!l && !r)
    };
    WordDelta::Exact(delta)
}

/// Exact word delta for deleting byte `b` that sat between `left` and
/// `right`. Deleting the separator between two words merges them; deleting a
/// single-byte word between separators removes it.
pub fn delete_word_delta(b: u8, left: Option<u8>, right: Option<u8>) -> WordDelta {
    let l = left.is_some_and(is_word_byte);
    let r = right.is_some_and(is_word_byte);
    let delta = if !is_word_byte(b) {
        -i64::from(l && r)
    } else {
        -i64::from(!l && !r)
    };
    WordDelta::Exact(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescan_counts_words_and_lines() {
        let gb = GapBuffer::from_str("one two\tthree\nfour\n");
        let stats = BufferStats::new();
        stats.mark_dirty();
        let (lines, bytes, words) = stats.read(&gb);
        assert_eq!(lines, 3); // trailing newline opens an empty third line
        assert_eq!(bytes, 19);
        assert_eq!(words, 4);
        assert!(!stats.is_dirty());
    }

    #[test]
    fn incremental_matches_rescan_for_single_bytes() {
        // Build "ab cd" one byte at a time, applying deltas; the cached word
        // count must equal a full rescan at every step.
        let inserts: &[(usize, u8)] = &[(0, b'a'), (1, b'b'), (2, b' '), (3, b'c'), (4, b'd')];
        let mut gb = GapBuffer::new();
        let stats = BufferStats::new();
        for &(pos, b) in inserts {
            let left = if pos > 0 { gb.get_char(pos - 1) } else { None };
            let right = gb.get_char(pos);
            gb.insert(pos, &[b]).unwrap();
            let line_delta = i64::from(b == b'\n');
            stats.apply(line_delta, 1, insert_word_delta(b, left, right));
            let cached = stats.read(&gb);
            let reference = BufferStats::new();
            reference.mark_dirty();
            assert_eq!(cached, reference.read(&gb));
        }
    }

    #[test]
    fn delete_separator_merges_words() {
        // "ab cd" -> delete the space -> one word.
        let d = delete_word_delta(b' ', Some(b'b'), Some(b'c'));
        assert_eq!(d, WordDelta::Exact(-1));
    }

    #[test]
    fn delete_single_byte_word_removes_it() {
        // " x " -> delete 'x' -> word gone.
        let d = delete_word_delta(b'x', Some(b' '), Some(b' '));
        assert_eq!(d, WordDelta::Exact(-1));
    }

    #[test]
    fn delete_inside_word_is_neutral() {
        let d = delete_word_delta(b'b', Some(b'a'), Some(b'c'));
        assert_eq!(d, WordDelta::Exact(0));
    }

    #[test]
    fn insert_separator_splits_word() {
        let d = insert_word_delta(b' ', Some(b'a'), Some(b'b'));
        assert_eq!(d, WordDelta::Exact(1));
    }

    #[test]
    fn rescan_flag_degrades_gracefully() {
        let gb = GapBuffer::from_str("one two");
        let stats = BufferStats::new();
        stats.apply(0, 7, WordDelta::Rescan);
        assert!(stats.is_dirty());
        let (_, bytes, words) = stats.read(&gb);
        assert_eq!(bytes, 7);
        assert_eq!(words, 2);
    }
}
