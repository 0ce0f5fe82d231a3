//! Per-buffer circular undo log with grouped steps.
//!
//! Records live in a fixed-capacity ring that doubles on demand up to
//! [`UNDO_MAX_CAPACITY`] and then evicts the oldest entry. Each record carries
//! a monotonic version id (used against the saved baseline for clean/dirty
//! tracking) and a group id; undo and redo apply a whole group as one step.
//!
//! Grouping is automatic unless an explicit group is open: consecutive
//! single-byte inserts coalesce while they stay adjacent on one line, arrive
//! within the grouping window, and stay in the same word/non-word class.
//! A transition between classes ends the group. Deletes coalesce under the
//! symmetric rule for forward-delete (same offset) and backspace (previous
//! record starts where this one ends).
//!
//! The log never mutates text itself; the owning buffer asks for a group of
//! records and replays their inverses while the `in_operation` flag suppresses
//! re-recording.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use core_text::class::is_word_byte;

pub const UNDO_INITIAL_CAPACITY: usize = 100;
pub const UNDO_MAX_CAPACITY: usize = 10_000;
/// Default auto-grouping time window.
pub const UNDO_GROUP_WINDOW_MS: u64 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Insert,
    Delete,
}

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub kind: EditKind,
    /// Line number of the change at the time it was made.
    pub line: usize,
    /// Byte offset within the line.
    pub col: usize,
    /// Owned copy of the inserted or deleted bytes.
    pub text: Vec<u8>,
    pub version_id: u64,
    pub at: Instant,
    pub group_id: u64,
}

pub struct UndoLog {
    ops: Vec<Option<UndoRecord>>,
    head: usize, // next slot to write
    tail: usize, // oldest record
    /// Slot of the last record that can be undone; `None` when everything has
    /// been undone (redo then restarts from `tail`).
    undo_ptr: Option<usize>,
    count: usize,
    version: AtomicU64,
    in_operation: AtomicBool,
    group_forced: AtomicBool,
    resize_failed: AtomicBool,
    current_group_id: AtomicU64,
    group_window: Duration,
}

impl Default for UndoLog {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoLog {
    pub fn new() -> Self {
        Self::with_group_window(Duration::from_millis(UNDO_GROUP_WINDOW_MS))
    }

    pub fn with_group_window(group_window: Duration) -> Self {
        let mut ops = Vec::new();
        ops.resize_with(UNDO_INITIAL_CAPACITY, || None);
        Self {
            ops,
            head: 0,
            tail: 0,
            undo_ptr: None,
            count: 0,
            version: AtomicU64::new(1),
            in_operation: AtomicBool::new(false),
            group_forced: AtomicBool::new(false),
            resize_failed: AtomicBool::new(false),
            current_group_id: AtomicU64::new(1),
            group_window,
        }
    }

    pub fn capacity(&self) -> usize {
        self.ops.len()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn set_group_window(&mut self, window: Duration) {
        self.group_window = window;
    }

    pub fn in_operation(&self) -> bool {
        self.in_operation.load(Ordering::Acquire)
    }

    pub(crate) fn set_in_operation(&self, on: bool) {
        self.in_operation.store(on, Ordering::Release);
    }

    /// Version id of the record at the undo pointer; 1 when fully unwound.
    /// This is what gets compared against the buffer's saved baseline.
    pub fn current_version(&self) -> u64 {
        match self.undo_ptr {
            Some(slot) => self.ops[slot].as_ref().map_or(1, |op| op.version_id),
            None => 1,
        }
    }

    /// Open an explicit group: all records admitted until `group_end` share
    /// one group id and auto-grouping is suppressed.
    pub fn group_begin(&self) {
        self.group_forced.store(true, Ordering::Release);
    }

    pub fn group_end(&self) {
        self.current_group_id.fetch_add(1, Ordering::AcqRel);
        self.group_forced.store(false, Ordering::Release);
    }

    fn fresh_group_id(&self) -> u64 {
        self.current_group_id.fetch_add(1, Ordering::AcqRel) + 1
    }

    // ---------------------------------------------------------------------------------------------
    // Admission
    // ---------------------------------------------------------------------------------------------

    /// Make room for one more record. Doubles up to the cap, then evicts the
    /// oldest entry. A failed grow marks `resize_failed` so the allocation is
    /// not retried; eviction keeps recording alive.
    fn make_room(&mut self) {
        if self.count < self.capacity() {
            return;
        }
        let cap = self.capacity();
        if cap < UNDO_MAX_CAPACITY && !self.resize_failed.load(Ordering::Acquire) {
            let new_cap = (cap * 2).min(UNDO_MAX_CAPACITY);
            let mut new_ops: Vec<Option<UndoRecord>> = Vec::new();
            if new_ops.try_reserve_exact(new_cap).is_err() {
                self.resize_failed.store(true, Ordering::Release);
                debug!(target: "state.undo", cap, "undo_resize_failed");
            } else {
                new_ops.resize_with(new_cap, || None);
                // Unroll the ring head-order into the enlarged array.
                let mut src = self.tail;
                for slot in new_ops.iter_mut().take(self.count) {
                    *slot = self.ops[src].take();
                    src = (src + 1) % cap;
                }
                self.ops = new_ops;
                self.tail = 0;
                self.head = self.count;
                self.undo_ptr = Some(self.count - 1);
                trace!(target: "state.undo", new_cap, "undo_resized");
                return;
            }
        }
        // Evict the oldest entry.
        self.ops[self.tail] = None;
        self.tail = (self.tail + 1) % self.capacity();
        self.count -= 1;
    }

    /// Drop any redo tail: records strictly after the undo pointer.
    fn invalidate_redo(&mut self) {
        let cap = self.capacity();
        let new_head = match self.undo_ptr {
            Some(slot) => (slot + 1) % cap,
            None => self.tail,
        };
        let mut cur = new_head;
        while cur != self.head {
            if self.ops[cur].take().is_some() {
                self.count -= 1;
            }
            cur = (cur + 1) % cap;
        }
        self.head = new_head;
    }

    pub fn record_insert(&mut self, line: usize, col: usize, text: &[u8]) {
        self.record(EditKind::Insert, line, col, text);
    }

    pub fn record_delete(&mut self, line: usize, col: usize, text: &[u8]) {
        self.record(EditKind::Delete, line, col, text);
    }

    fn record(&mut self, kind: EditKind, line: usize, col: usize, text: &[u8]) {
        if self.in_operation() || text.is_empty() {
            return;
        }
        self.invalidate_redo();
        self.make_room();

        let now = Instant::now();
        let group_id = if self.group_forced.load(Ordering::Acquire) {
            self.current_group_id.load(Ordering::Acquire)
        } else {
            self.auto_group_id(kind, line, col, text, now)
        };

        let record = UndoRecord {
            kind,
            line,
            col,
            text: text.to_vec(),
            version_id: self.version.fetch_add(1, Ordering::AcqRel),
            at: now,
            group_id,
        };
        trace!(
            target: "state.undo",
            ?kind,
            line,
            col,
            len = text.len(),
            version = record.version_id,
            group = group_id,
            "record"
        );
        let slot = self.head;
        self.ops[slot] = Some(record);
        self.head = (slot + 1) % self.capacity();
        self.undo_ptr = Some(slot);
        if self.count < self.capacity() {
            self.count += 1;
        } else {
            self.tail = (self.tail + 1) % self.capacity();
        }
    }

    /// Grouping decision against the previous record (the one at the undo
    /// pointer after redo invalidation).
    fn auto_group_id(
        &self,
        kind: EditKind,
        line: usize,
        col: usize,
        text: &[u8],
        now: Instant,
    ) -> u64 {
        let prev = match self.undo_ptr.and_then(|s| self.ops[s].as_ref()) {
            Some(prev) if self.count > 0 => prev,
            _ => return self.fresh_group_id(),
        };
        if prev.kind != kind || prev.line != line {
            return self.fresh_group_id();
        }
        let within_window = now.duration_since(prev.at) < self.group_window;
        let adjacent = match kind {
            EditKind::Insert => prev.col + prev.text.len() == col,
            // Forward delete repeats at one offset; backspace walks left.
            EditKind::Delete => prev.col == col || prev.col == col + text.len(),
        };
        if !within_window || !adjacent {
            return self.fresh_group_id();
        }
        if text.len() == 1 && prev.text.len() == 1 {
            // Same word/non-word class keeps the group; a transition ends it.
            let a = is_word_byte(text[0]);
            let b = is_word_byte(prev.text[0]);
            if a != b {
                return self.fresh_group_id();
            }
        }
        prev.group_id
    }

    // ---------------------------------------------------------------------------------------------
    // Undo / redo group extraction
    // ---------------------------------------------------------------------------------------------

    /// Take the group at the undo pointer, newest record first (the order the
    /// inverses must be applied in), moving the pointer just before the group.
    pub fn take_undo_group(&mut self) -> Option<Vec<UndoRecord>> {
        let start = self.undo_ptr?;
        let cap = self.capacity();
        let first = self.ops[start].as_ref()?.clone();
        let gid = first.group_id;
        let mut group = vec![first];
        let mut cursor = start;
        while cursor != self.tail {
            let prev = (cursor + cap - 1) % cap;
            match self.ops[prev].as_ref() {
                Some(rec) if rec.group_id == gid => {
                    group.push(rec.clone());
                    cursor = prev;
                }
                _ => break,
            }
        }
        self.undo_ptr = if cursor == self.tail {
            None
        } else {
            Some((cursor + cap - 1) % cap)
        };
        debug!(target: "state.undo", group = gid, records = group.len(), "undo_group");
        Some(group)
    }

    /// Take the group after the undo pointer, oldest record first, moving the
    /// pointer onto the last record of the group.
    pub fn take_redo_group(&mut self) -> Option<Vec<UndoRecord>> {
        if self.count == 0 {
            return None;
        }
        let cap = self.capacity();
        let start = match self.undo_ptr {
            Some(slot) => (slot + 1) % cap,
            None => self.tail,
        };
        if start == self.head {
            return None;
        }
        let first = self.ops[start].as_ref()?.clone();
        let gid = first.group_id;
        let mut group = vec![first];
        let mut cursor = start;
        loop {
            let next = (cursor + 1) % cap;
            if next == self.head {
                break;
            }
            match self.ops[next].as_ref() {
                Some(rec) if rec.group_id == gid => {
                    group.push(rec.clone());
                    cursor = next;
                }
                _ => break,
            }
        }
        self.undo_ptr = Some(cursor);
        debug!(target: "state.undo", group = gid, records = group.len(), "redo_group");
        Some(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn adjacent_word_inserts_coalesce() {
        let mut log = UndoLog::new();
        log.record_insert(0, 0, b"h");
        log.record_insert(0, 1, b"i");
        let group = log.take_undo_group().unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(group[0].text, b"i");
        assert_eq!(group[1].text, b"h");
        assert!(log.take_undo_group().is_none());
    }

    #[test]
    fn word_to_nonword_transition_splits_group() {
        // "h i <space> !": two groups, split at the space.
        let mut log = UndoLog::new();
        log.record_insert(0, 0, b"h");
        log.record_insert(0, 1, b"i");
        log.record_insert(0, 2, b" ");
        log.record_insert(0, 3, b"!");
        let g1 = log.take_undo_group().unwrap();
        assert_eq!(g1.iter().map(|r| r.text[0]).collect::<Vec<_>>(), b"! ");
        let g2 = log.take_undo_group().unwrap();
        assert_eq!(g2.iter().map(|r| r.text[0]).collect::<Vec<_>>(), b"ih");
        assert!(log.take_undo_group().is_none());
    }

    #[test]
    fn nonadjacent_inserts_do_not_coalesce() {
        let mut log = UndoLog::new();
        log.record_insert(0, 0, b"a");
        log.record_insert(0, 5, b"b");
        assert_eq!(log.take_undo_group().unwrap().len(), 1);
        assert_eq!(log.take_undo_group().unwrap().len(), 1);
    }

    #[test]
    fn time_window_breaks_group() {
        let mut log = UndoLog::with_group_window(Duration::from_millis(5));
        log.record_insert(0, 0, b"a");
        sleep(Duration::from_millis(10));
        log.record_insert(0, 1, b"b");
        assert_eq!(log.take_undo_group().unwrap().len(), 1);
        assert_eq!(log.take_undo_group().unwrap().len(), 1);
    }

    #[test]
    fn backspace_deletes_coalesce() {
        // Deleting "cba" by backspace: each record starts where the previous
        // one ends.
        let mut log = UndoLog::new();
        log.record_delete(0, 2, b"c");
        log.record_delete(0, 1, b"b");
        log.record_delete(0, 0, b"a");
        let group = log.take_undo_group().unwrap();
        assert_eq!(group.len(), 3);
    }

    #[test]
    fn forward_deletes_coalesce_at_same_offset() {
        let mut log = UndoLog::new();
        log.record_delete(0, 4, b"x");
        log.record_delete(0, 4, b"y");
        assert_eq!(log.take_undo_group().unwrap().len(), 2);
    }

    #[test]
    fn forced_group_spans_everything() {
        let mut log = UndoLog::new();
        log.group_begin();
        log.record_insert(0, 0, b"a");
        log.record_delete(3, 0, b"zzz");
        log.record_insert(9, 9, b" ");
        log.group_end();
        log.record_insert(0, 1, b"b");
        let g1 = log.take_undo_group().unwrap();
        assert_eq!(g1.len(), 1);
        let g2 = log.take_undo_group().unwrap();
        assert_eq!(g2.len(), 3);
    }

    #[test]
    fn new_record_invalidates_redo_tail() {
        let mut log = UndoLog::new();
        log.record_insert(0, 0, b"a");
        log.record_insert(0, 5, b"Q"); // separate group (not adjacent)
        assert!(log.take_undo_group().is_some());
        log.record_insert(0, 9, b"z");
        // The undone "Q" must be gone from the redo path.
        let redo = log.take_redo_group();
        assert!(redo.is_none());
        assert_eq!(log.count(), 2);
    }

    #[test]
    fn redo_after_full_unwind_starts_at_tail() {
        let mut log = UndoLog::new();
        log.record_insert(0, 0, b"h");
        log.record_insert(0, 1, b"i");
        assert!(log.take_undo_group().is_some());
        assert!(log.undo_ptr.is_none());
        let redo = log.take_redo_group().unwrap();
        assert_eq!(redo.len(), 2);
        assert_eq!(redo[0].text, b"h");
        assert_eq!(redo[1].text, b"i");
        assert!(log.take_redo_group().is_none());
    }

    #[test]
    fn ring_doubles_then_evicts() {
        let mut log = UndoLog::new();
        for i in 0..(UNDO_INITIAL_CAPACITY + 10) {
            log.record_insert(i, 0, b"padding..."); // multi-byte, one group each? adjacency fails -> separate groups
        }
        assert_eq!(log.capacity(), UNDO_INITIAL_CAPACITY * 2);
        assert_eq!(log.count(), UNDO_INITIAL_CAPACITY + 10);
    }

    #[test]
    fn version_ids_are_monotonic() {
        let mut log = UndoLog::new();
        log.record_insert(0, 0, b"a");
        log.record_insert(1, 0, b"b");
        let g1 = log.take_undo_group().unwrap();
        let v_last = g1[0].version_id;
        assert_eq!(log.current_version(), v_last - 1);
        assert!(log.take_undo_group().is_some());
        assert_eq!(log.current_version(), 1);
    }
}
