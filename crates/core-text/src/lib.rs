//! Gap-buffer text storage with a lazily rebuilt line index.
//!
//! The buffer is a single byte array with a movable gap at the cursor, so
//! sequential edits at a stable cursor cost O(1) amortised. Logical position
//! `p` maps to physical index `p` before the gap and `p + gap_size` after it.
//! A line index (byte offsets of line starts, gap-compensated) is marked dirty
//! on every edit and rebuilt on the next line query; `offset_to_line` is a
//! binary search over it.
//!
//! Invariants, checked by `debug_assert` after every mutation:
//! * `gap_start <= gap_end <= capacity`
//! * `len() + gap_size() == capacity`
//! * the first line-index entry is always 0
//!
//! Concurrency: single writer. The `generation` counter is bumped with a
//! release store on every mutation so other components can detect staleness
//! of anything they derived from the buffer without taking a lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::trace;

use core_events::{Result, Status};

pub mod search;
pub mod width;

pub use search::BmhPattern;

/// Minimum backing capacity for a fresh buffer.
pub const GAP_MIN_SIZE: usize = 1024;
/// Gap sizes beyond this trigger compaction after a delete.
pub const GAP_MAX_GAP: usize = 4096;
/// The line index grows in chunks of this many entries.
pub const LINE_INDEX_CHUNK: usize = 128;

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
pub mod stats {
    use std::sync::atomic::AtomicU64;

    pub static INSERTIONS: AtomicU64 = AtomicU64::new(0);
    pub static DELETIONS: AtomicU64 = AtomicU64::new(0);
    pub static CURSOR_MOVES: AtomicU64 = AtomicU64::new(0);
    pub static EXPANSIONS: AtomicU64 = AtomicU64::new(0);
    pub static COMPACTIONS: AtomicU64 = AtomicU64::new(0);
}

/// Byte-level word classification shared by the statistics and undo layers.
pub mod class {
    /// Everything that is not horizontal/vertical whitespace counts as a word
    /// byte. Multi-byte UTF-8 continuation bytes are all word bytes under
    /// this rule, which is what the single-byte delta paths require.
    #[inline]
    pub const fn is_word_byte(b: u8) -> bool {
        !matches!(b, b' ' | b'\t' | b'\n' | b'\r')
    }
}

struct LineIndex {
    offsets: Vec<usize>,
    dirty: AtomicBool,
}

/// Single-entry cache mapping a byte offset to its char offset within a line.
/// Invalidated wholesale on any edit; rebuilt incrementally by column queries.
struct CharCache {
    line: usize,
    byte_offset: usize,
    char_offset: usize,
    valid: AtomicBool,
}

pub struct GapBuffer {
    data: Vec<u8>,
    gap_start: usize,
    gap_end: usize,
    generation: AtomicU64,
    line_index: LineIndex,
    char_cache: CharCache,
}

impl Default for GapBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl GapBuffer {
    pub fn new() -> Self {
        Self::with_capacity(GAP_MIN_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(GAP_MIN_SIZE);
        let mut offsets = Vec::with_capacity(LINE_INDEX_CHUNK);
        offsets.push(0);
        Self {
            data: vec![0; capacity],
            gap_start: 0,
            gap_end: capacity,
            generation: AtomicU64::new(0),
            line_index: LineIndex {
                offsets,
                dirty: AtomicBool::new(false),
            },
            char_cache: CharCache {
                line: 0,
                byte_offset: 0,
                char_offset: 0,
                valid: AtomicBool::new(true),
            },
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut gb = Self::with_capacity(bytes.len() + GAP_MIN_SIZE);
        // Cannot fail: pos 0 is always valid and capacity is preallocated.
        let _ = gb.insert(0, bytes);
        gb
    }

    pub fn from_str(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }

    /// Logical length in bytes (gap excluded).
    pub fn len(&self) -> usize {
        self.gap_start + (self.data.len() - self.gap_end)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn gap_size(&self) -> usize {
        self.gap_end - self.gap_start
    }

    /// Gap overhead as a fraction of capacity.
    pub fn fragmentation(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.gap_size() as f64 / self.data.len() as f64
    }

    /// Mutation counter; release-published so derived caches elsewhere can be
    /// validated with an acquire load.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    fn invalidate_caches(&mut self) {
        self.line_index.dirty.store(true, Ordering::Release);
        self.char_cache.valid.store(false, Ordering::Release);
    }

    fn check_invariants(&self) {
        debug_assert!(self.gap_start <= self.gap_end);
        debug_assert!(self.gap_end <= self.data.len());
        debug_assert_eq!(self.len() + self.gap_size(), self.data.len());
    }

    // ---------------------------------------------------------------------------------------------
    // Gap movement and sizing
    // ---------------------------------------------------------------------------------------------

    fn move_gap_to(&mut self, pos: usize) {
        if pos == self.gap_start {
            return;
        }
        let gap = self.gap_size();
        if pos < self.gap_start {
            // Move gap left: shift the intervening text right.
            self.data.copy_within(pos..self.gap_start, pos + gap);
        } else {
            // Move gap right: shift the intervening text left.
            self.data
                .copy_within(self.gap_end..pos + gap, self.gap_start);
        }
        self.gap_start = pos;
        self.gap_end = pos + gap;
        stats::CURSOR_MOVES.fetch_add(1, Ordering::Relaxed);
        self.bump_generation();
    }

    fn expand(&mut self, min_additional: usize) {
        let mut new_capacity = self.data.len().max(GAP_MIN_SIZE);
        while new_capacity - self.len() < min_additional {
            new_capacity = new_capacity + new_capacity / 2;
        }
        let mut new_data = vec![0; new_capacity];
        new_data[..self.gap_start].copy_from_slice(&self.data[..self.gap_start]);
        let after = self.data.len() - self.gap_end;
        new_data[new_capacity - after..].copy_from_slice(&self.data[self.gap_end..]);
        self.gap_end = new_capacity - after;
        self.data = new_data;
        stats::EXPANSIONS.fetch_add(1, Ordering::Relaxed);
        self.bump_generation();
    }

    /// Reallocate down to `len + GAP_MIN_SIZE` to cap gap overhead.
    pub fn compact(&mut self) {
        let new_capacity = self.len() + GAP_MIN_SIZE;
        if new_capacity >= self.data.len() {
            return;
        }
        let mut new_data = vec![0; new_capacity];
        new_data[..self.gap_start].copy_from_slice(&self.data[..self.gap_start]);
        let after = self.data.len() - self.gap_end;
        new_data[self.gap_start..self.gap_start + after]
            .copy_from_slice(&self.data[self.gap_end..]);
        // The retained text is packed to the front; the gap is what remains.
        let len = self.gap_start + after;
        self.data = new_data;
        self.gap_start = len;
        self.gap_end = new_capacity;
        stats::COMPACTIONS.fetch_add(1, Ordering::Relaxed);
        self.bump_generation();
        self.check_invariants();
    }

    // ---------------------------------------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------------------------------------

    /// Insert `bytes` at logical position `pos`.
    pub fn insert(&mut self, pos: usize, bytes: &[u8]) -> Result<()> {
        if pos > self.len() {
            return Err(Status::InvalidArgument);
        }
        if self.gap_size() < bytes.len() {
            self.expand(bytes.len());
        }
        self.move_gap_to(pos);
        self.data[self.gap_start..self.gap_start + bytes.len()].copy_from_slice(bytes);
        self.gap_start += bytes.len();
        self.invalidate_caches();
        stats::INSERTIONS.fetch_add(1, Ordering::Relaxed);
        self.bump_generation();
        self.check_invariants();
        trace!(target: "text.gap", pos, len = bytes.len(), "insert");
        Ok(())
    }

    /// Delete `n` bytes starting at logical position `pos`.
    pub fn delete(&mut self, pos: usize, n: usize) -> Result<()> {
        if pos > self.len() || pos + n > self.len() {
            return Err(Status::InvalidArgument);
        }
        self.move_gap_to(pos);
        self.gap_end += n;
        if self.gap_size() > GAP_MAX_GAP {
            self.compact();
        }
        self.invalidate_caches();
        stats::DELETIONS.fetch_add(1, Ordering::Relaxed);
        self.bump_generation();
        self.check_invariants();
        trace!(target: "text.gap", pos, n, "delete");
        Ok(())
    }

    /// Pure gap move: position the gap (cursor) at `pos`.
    pub fn set_cursor(&mut self, pos: usize) -> Result<()> {
        if pos > self.len() {
            return Err(Status::InvalidArgument);
        }
        self.move_gap_to(pos);
        Ok(())
    }

    pub fn cursor(&self) -> usize {
        self.gap_start
    }

    // ---------------------------------------------------------------------------------------------
    // Reads (never move the gap)
    // ---------------------------------------------------------------------------------------------

    pub fn get_char(&self, pos: usize) -> Option<u8> {
        if pos >= self.len() {
            return None;
        }
        if pos < self.gap_start {
            Some(self.data[pos])
        } else {
            Some(self.data[pos + self.gap_size()])
        }
    }

    /// Copy up to `out.len()` bytes starting at `pos` into `out`, handling the
    /// two-segment case when the range straddles the gap. Returns bytes copied.
    pub fn get_text(&self, pos: usize, out: &mut [u8]) -> usize {
        if pos > self.len() {
            return 0;
        }
        let n = out.len().min(self.len() - pos);
        let mut copied = 0;
        let mut pos = pos;
        if pos < self.gap_start {
            let before = (self.gap_start - pos).min(n);
            out[..before].copy_from_slice(&self.data[pos..pos + before]);
            copied = before;
            pos = self.gap_start;
        }
        if copied < n {
            let phys = pos + self.gap_size();
            out[copied..n].copy_from_slice(&self.data[phys..phys + (n - copied)]);
            copied = n;
        }
        copied
    }

    /// Materialise `[pos, pos + n)` as an owned vector (clamped to the end).
    pub fn slice_to_vec(&self, pos: usize, n: usize) -> Vec<u8> {
        if pos >= self.len() {
            return Vec::new();
        }
        let n = n.min(self.len() - pos);
        let mut out = vec![0; n];
        let copied = self.get_text(pos, &mut out);
        out.truncate(copied);
        out
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.slice_to_vec(0, self.len())
    }

    // ---------------------------------------------------------------------------------------------
    // Line index
    // ---------------------------------------------------------------------------------------------

    fn rebuild_line_index(&mut self) {
        self.line_index.offsets.clear();
        self.line_index.offsets.push(0);
        let gap = self.gap_size();
        for i in 0..self.gap_start {
            if self.data[i] == b'\n' {
                self.reserve_line_slot();
                self.line_index.offsets.push(i + 1);
            }
        }
        for i in self.gap_end..self.data.len() {
            if self.data[i] == b'\n' {
                self.reserve_line_slot();
                // Logical offsets are gap-compensated.
                self.line_index.offsets.push(i - gap + 1);
            }
        }
        self.line_index.dirty.store(false, Ordering::Release);
    }

    fn reserve_line_slot(&mut self) {
        if self.line_index.offsets.len() == self.line_index.offsets.capacity() {
            self.line_index.offsets.reserve(LINE_INDEX_CHUNK);
        }
    }

    fn ensure_line_index(&mut self) {
        if self.line_index.dirty.load(Ordering::Acquire) {
            self.rebuild_line_index();
        }
    }

    pub fn line_count(&mut self) -> usize {
        self.ensure_line_index();
        self.line_index.offsets.len()
    }

    /// Byte offset of the start of line `line`, or `len()` when out of range.
    pub fn line_to_offset(&mut self, line: usize) -> usize {
        self.ensure_line_index();
        match self.line_index.offsets.get(line) {
            Some(&off) => off,
            None => self.len(),
        }
    }

    /// Line number containing byte `offset`; binary search over the index.
    pub fn offset_to_line(&mut self, offset: usize) -> usize {
        if offset > self.len() {
            return 0;
        }
        self.ensure_line_index();
        let offsets = &self.line_index.offsets;
        let mut left = 0;
        let mut right = offsets.len() - 1;
        while left < right {
            let mid = left + (right - left + 1) / 2;
            if offsets[mid] <= offset {
                left = mid;
            } else {
                right = mid - 1;
            }
        }
        left
    }

    /// Bytes of line `line` excluding the trailing newline.
    pub fn line_bytes(&mut self, line: usize) -> Vec<u8> {
        let count = self.line_count();
        if line >= count {
            return Vec::new();
        }
        let start = self.line_to_offset(line);
        let end = if line + 1 < count {
            self.line_to_offset(line + 1) - 1
        } else {
            self.len()
        };
        self.slice_to_vec(start, end - start)
    }

    /// Byte length of line `line` excluding the trailing newline.
    pub fn line_len(&mut self, line: usize) -> usize {
        let count = self.line_count();
        if line >= count {
            return 0;
        }
        let start = self.line_to_offset(line);
        let end = if line + 1 < count {
            self.line_to_offset(line + 1) - 1
        } else {
            self.len()
        };
        end - start
    }

    // ---------------------------------------------------------------------------------------------
    // Column cache
    // ---------------------------------------------------------------------------------------------

    /// Character offset of `offset` within its line. The single-entry cache
    /// makes repeated queries on the same line (the common mode-line case)
    /// incremental instead of quadratic.
    pub fn char_offset_in_line(&mut self, offset: usize) -> usize {
        let offset = offset.min(self.len());
        let line = self.offset_to_line(offset);
        let line_start = self.line_to_offset(line);
        let valid = self.char_cache.valid.load(Ordering::Acquire);
        let (mut byte, mut chars) = if valid
            && self.char_cache.line == line
            && self.char_cache.byte_offset <= offset
        {
            (self.char_cache.byte_offset, self.char_cache.char_offset)
        } else {
            (line_start, 0)
        };
        while byte < offset {
            let b = self.get_char(byte).unwrap_or(0);
            // Count only UTF-8 lead bytes.
            if b & 0xC0 != 0x80 {
                chars += 1;
            }
            byte += 1;
        }
        self.char_cache.line = line;
        self.char_cache.byte_offset = offset;
        self.char_cache.char_offset = chars;
        self.char_cache.valid.store(true, Ordering::Release);
        chars
    }

    // ---------------------------------------------------------------------------------------------
    // Search
    // ---------------------------------------------------------------------------------------------

    /// BMH forward search from `start`. Returns the match offset, or `None`.
    pub fn search_forward(
        &self,
        start: usize,
        pattern: &[u8],
        case_sensitive: bool,
    ) -> Result<Option<usize>> {
        let pat = BmhPattern::new(pattern, case_sensitive)?;
        if start >= self.len() {
            return Ok(None);
        }
        let window = self.slice_to_vec(start, self.len() - start);
        Ok(pat.find(&window, 0).map(|p| start + p))
    }

    /// BMH reverse search: the last match ending at or before `start`.
    pub fn search_reverse(
        &self,
        start: usize,
        pattern: &[u8],
        case_sensitive: bool,
    ) -> Result<Option<usize>> {
        let pat = BmhPattern::new(pattern, case_sensitive)?;
        if self.is_empty() {
            return Ok(None);
        }
        let window = self.to_vec();
        Ok(pat.rfind(&window, start.min(self.len() - 1)))
    }
}
