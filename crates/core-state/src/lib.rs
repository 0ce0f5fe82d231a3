//! Buffer state: named text containers over the gap buffer.
//!
//! A [`Buffer`] couples text storage with cached statistics, the undo log,
//! mode/flag bits, and the saved-version baseline. All mutation goes through
//! `insert_at` / `delete_at` so the three stay consistent: every edit updates
//! statistics incrementally (or degrades to the dirty flag), records an undo
//! entry unless an undo/redo is replaying, and raises the CHANGED flag.
//!
//! [`BufferSet`] owns all buffers in an arena indexed by [`BufferId`], with a
//! name-indexed hash map and a lexicographically ordered list that must agree
//! at all times (`validate` checks this in debug builds).

use std::sync::atomic::{AtomicU64, Ordering};

use ahash::RandomState;
use bitflags::bitflags;
use std::collections::HashMap;
use tracing::{debug, info};

use core_events::{Result, Status};
use core_text::GapBuffer;

pub mod kill;
pub mod stats;
pub mod undo;

pub use kill::KillRing;
pub use stats::{BufferStats, WordDelta, delete_word_delta, insert_word_delta};
pub use undo::{EditKind, UndoLog, UndoRecord};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferFlags: u16 {
        /// Buffer differs from its saved baseline.
        const CHANGED   = 1 << 0;
        /// Internal buffer, hidden from user-facing lists.
        const INVISIBLE = 1 << 1;
        /// File was truncated on read.
        const TRUNCATED = 1 << 2;
        /// No modifications allowed.
        const VIEW_ONLY = 1 << 3;
        /// Contents are encrypted on disk.
        const CRYPT     = 1 << 4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModeFlags: u32 {
        const WRAP  = 1 << 0;
        const VIEW  = 1 << 1;
        const EXACT = 1 << 2;
        const OVER  = 1 << 3;
        const MAGIC = 1 << 4;
        const ASAVE = 1 << 5;
        const UTF8  = 1 << 6;
    }
}

/// Mode-line names, in display order.
pub const MODE_NAMES: &[(ModeFlags, &str)] = &[
    (ModeFlags::WRAP, "Wrap"),
    (ModeFlags::VIEW, "View"),
    (ModeFlags::EXACT, "Exact"),
    (ModeFlags::OVER, "Over"),
    (ModeFlags::MAGIC, "Magic"),
    (ModeFlags::ASAVE, "ASave"),
    (ModeFlags::UTF8, "Utf8"),
];

/// A point in a buffer: line number plus byte offset within the line. The
/// offset equal to the line length addresses the trailing newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }

    pub const fn origin() -> Self {
        Self { line: 0, col: 0 }
    }
}

pub struct Buffer {
    pub name: String,
    pub filename: String,
    pub flags: BufferFlags,
    pub modes: ModeFlags,
    text: GapBuffer,
    stats: BufferStats,
    undo: UndoLog,
    saved_version_id: AtomicU64,
    /// Windows currently displaying this buffer.
    pub window_count: u32,
    /// Dot/mark snapshot, meaningful while no window shows the buffer.
    pub dot: Position,
    pub mark: Option<Position>,
    /// False until the file collaborator has read the contents in.
    pub active: bool,
}

impl Buffer {
    pub fn new(name: impl Into<String>, flags: BufferFlags) -> Self {
        Self {
            name: name.into(),
            filename: String::new(),
            flags,
            modes: ModeFlags::empty(),
            text: GapBuffer::new(),
            stats: BufferStats::new(),
            undo: UndoLog::new(),
            saved_version_id: AtomicU64::new(1),
            window_count: 0,
            dot: Position::origin(),
            mark: None,
            active: true,
        }
    }

    pub fn from_str(name: impl Into<String>, content: &str) -> Self {
        let mut buf = Self::new(name, BufferFlags::empty());
        buf.text = GapBuffer::from_str(content);
        buf.stats.mark_dirty();
        buf
    }

    pub fn text(&self) -> &GapBuffer {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is_changed(&self) -> bool {
        self.flags.contains(BufferFlags::CHANGED)
    }

    pub fn undo_log(&self) -> &UndoLog {
        &self.undo
    }

    pub fn undo_log_mut(&mut self) -> &mut UndoLog {
        &mut self.undo
    }

    /// Cached (lines, bytes, words), rescanning when dirty.
    pub fn statistics(&self) -> (u64, u64, u64) {
        self.stats.read(&self.text)
    }

    pub fn stats_cache(&self) -> &BufferStats {
        &self.stats
    }

    // ---------------------------------------------------------------------------------------------
    // Line/offset coordinates
    // ---------------------------------------------------------------------------------------------

    pub fn line_count(&mut self) -> usize {
        self.text.line_count()
    }

    pub fn line_len(&mut self, line: usize) -> usize {
        self.text.line_len(line)
    }

    pub fn line_bytes(&mut self, line: usize) -> Vec<u8> {
        self.text.line_bytes(line)
    }

    pub fn pos_to_offset(&mut self, pos: Position) -> Result<usize> {
        if pos.line >= self.text.line_count() {
            return Err(Status::LineInvalid);
        }
        if pos.col > self.text.line_len(pos.line) {
            return Err(Status::Range);
        }
        Ok(self.text.line_to_offset(pos.line) + pos.col)
    }

    /// Character column of `pos` within its line (multi-byte sequences count
    /// once), served by the gap buffer's column cache.
    pub fn char_col(&mut self, pos: Position) -> usize {
        match self.pos_to_offset(pos) {
            Ok(offset) => self.text.char_offset_in_line(offset),
            Err(_) => pos.col,
        }
    }

    pub fn offset_to_pos(&mut self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let line = self.text.offset_to_line(offset);
        let col = offset - self.text.line_to_offset(line);
        Position::new(line, col)
    }

    // ---------------------------------------------------------------------------------------------
    // Edits
    // ---------------------------------------------------------------------------------------------

    fn check_writable(&self) -> Result<()> {
        if self.modes.contains(ModeFlags::VIEW) || self.flags.contains(BufferFlags::VIEW_ONLY) {
            return Err(Status::FilePermission);
        }
        Ok(())
    }

    /// Insert `bytes` at `pos`. All-or-nothing: on any failure the buffer is
    /// unchanged and nothing is recorded.
    pub fn insert_at(&mut self, pos: Position, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.check_writable()?;
        let offset = self.pos_to_offset(pos)?;
        let left = offset.checked_sub(1).and_then(|o| self.text.get_char(o));
        let right = self.text.get_char(offset);
        self.text.insert(offset, bytes)?;

        let newlines = bytes.iter().filter(|&&b| b == b'\n').count() as i64;
        let word_delta = if bytes.len() == 1 {
            insert_word_delta(bytes[0], left, right)
        } else {
            WordDelta::Rescan
        };
        self.stats.apply(newlines, bytes.len() as i64, word_delta);
        self.undo.record_insert(pos.line, pos.col, bytes);
        self.flags.insert(BufferFlags::CHANGED);
        Ok(())
    }

    /// Delete `n` bytes starting at `pos`, returning the removed text for
    /// kill-ring integration. All-or-nothing as above.
    pub fn delete_at(&mut self, pos: Position, n: usize) -> Result<Vec<u8>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.check_writable()?;
        let offset = self.pos_to_offset(pos)?;
        if offset + n > self.text.len() {
            return Err(Status::Range);
        }
        let deleted = self.text.slice_to_vec(offset, n);
        let left = offset.checked_sub(1).and_then(|o| self.text.get_char(o));
        let right = self.text.get_char(offset + n);
        self.text.delete(offset, n)?;

        let newlines = deleted.iter().filter(|&&b| b == b'\n').count() as i64;
        let word_delta = if n == 1 {
            delete_word_delta(deleted[0], left, right)
        } else {
            WordDelta::Rescan
        };
        self.stats.apply(-newlines, -(n as i64), word_delta);
        self.undo.record_delete(pos.line, pos.col, &deleted);
        self.flags.insert(BufferFlags::CHANGED);
        Ok(deleted)
    }

    /// Blow away all text, statistics, and the changed flag.
    pub fn clear(&mut self) {
        self.text = GapBuffer::new();
        self.stats.reset_empty();
        self.undo = UndoLog::new();
        self.saved_version_id.store(1, Ordering::Release);
        self.flags.remove(BufferFlags::CHANGED);
        self.dot = Position::origin();
        self.mark = None;
    }

    // ---------------------------------------------------------------------------------------------
    // Undo / redo
    // ---------------------------------------------------------------------------------------------

    fn sync_changed_flag(&mut self) {
        if self.undo.current_version() == self.saved_version_id.load(Ordering::Acquire) {
            self.flags.remove(BufferFlags::CHANGED);
        } else {
            self.flags.insert(BufferFlags::CHANGED);
        }
    }

    /// Undo one group. Returns the dot position of the last applied record so
    /// the window layer can move the cursor there, or `None` when the log is
    /// empty.
    pub fn undo(&mut self) -> Result<Option<Position>> {
        if self.undo.in_operation() {
            return Ok(None);
        }
        let Some(group) = self.undo.take_undo_group() else {
            return Ok(None);
        };
        self.undo.set_in_operation(true);
        let mut dot = None;
        let mut outcome = Ok(());
        for rec in &group {
            let pos = Position::new(rec.line, rec.col);
            let applied = match rec.kind {
                EditKind::Insert => self.delete_at(pos, rec.text.len()).map(|_| ()),
                EditKind::Delete => self.insert_at(pos, &rec.text),
            };
            if let Err(e) = applied {
                outcome = Err(e);
                break;
            }
            dot = Some(pos);
        }
        self.undo.set_in_operation(false);
        self.sync_changed_flag();
        outcome.map(|()| dot)
    }

    /// Redo one group, symmetric to [`Buffer::undo`].
    pub fn redo(&mut self) -> Result<Option<Position>> {
        if self.undo.in_operation() {
            return Ok(None);
        }
        let Some(group) = self.undo.take_redo_group() else {
            return Ok(None);
        };
        self.undo.set_in_operation(true);
        let mut dot = None;
        let mut outcome = Ok(());
        for rec in &group {
            let pos = Position::new(rec.line, rec.col);
            let applied = match rec.kind {
                EditKind::Insert => self.insert_at(pos, &rec.text),
                EditKind::Delete => self.delete_at(pos, rec.text.len()).map(|_| ()),
            };
            if let Err(e) = applied {
                outcome = Err(e);
                break;
            }
            dot = Some(pos);
        }
        self.undo.set_in_operation(false);
        self.sync_changed_flag();
        outcome.map(|()| dot)
    }

    /// Stamp the current undo version as the saved baseline and clear the
    /// changed flag.
    pub fn mark_saved(&mut self) {
        self.saved_version_id
            .store(self.undo.current_version(), Ordering::Release);
        self.flags.remove(BufferFlags::CHANGED);
    }
}

// -------------------------------------------------------------------------------------------------
// Buffer set
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchOutcome {
    /// True when the buffer was inactive and the caller must trigger a
    /// read-in through the file collaborator.
    pub needs_read_in: bool,
}

#[derive(Default)]
pub struct BufferSet {
    arena: Vec<Option<Buffer>>,
    by_name: HashMap<String, BufferId, RandomState>,
    /// Ids ordered lexicographically by buffer name.
    order: Vec<BufferId>,
    current: Option<BufferId>,
}

impl BufferSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `name`, creating the buffer when `create` is set. A fresh
    /// buffer starts with one empty line, zeroed statistics, baseline 1, and
    /// a new undo log.
    pub fn find(&mut self, name: &str, create: bool, flags: BufferFlags) -> Result<BufferId> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }
        if !create {
            return Err(Status::BufferInvalid);
        }
        let id = BufferId(self.arena.len() as u32);
        self.arena.push(Some(Buffer::new(name, flags)));
        self.by_name.insert(name.to_string(), id);
        let at = match self
            .order
            .binary_search_by(|probe| self.name_of(*probe).cmp(name))
        {
            Ok(pos) | Err(pos) => pos,
        };
        self.order.insert(at, id);
        info!(target: "state.buffer", name, id = id.0, "buffer_created");
        self.validate();
        Ok(id)
    }

    fn name_of(&self, id: BufferId) -> &str {
        self.arena[id.0 as usize]
            .as_ref()
            .map(|b| b.name.as_str())
            .unwrap_or("")
    }

    pub fn get(&self, id: BufferId) -> Result<&Buffer> {
        self.arena
            .get(id.0 as usize)
            .and_then(|b| b.as_ref())
            .ok_or(Status::BufferInvalid)
    }

    pub fn get_mut(&mut self, id: BufferId) -> Result<&mut Buffer> {
        self.arena
            .get_mut(id.0 as usize)
            .and_then(|b| b.as_mut())
            .ok_or(Status::BufferInvalid)
    }

    pub fn current_id(&self) -> Option<BufferId> {
        self.current
    }

    pub fn current(&self) -> Result<&Buffer> {
        self.current.ok_or(Status::BufferInvalid).and_then(|id| self.get(id))
    }

    pub fn current_mut(&mut self) -> Result<&mut Buffer> {
        let id = self.current.ok_or(Status::BufferInvalid)?;
        self.get_mut(id)
    }

    /// Make `id` current. The outgoing buffer's window count drops; when it
    /// reaches zero the supplied dot/mark snapshot is stored in the buffer
    /// header so the position survives until it is displayed again.
    pub fn switch(
        &mut self,
        id: BufferId,
        snapshot: Option<(Position, Option<Position>)>,
    ) -> Result<SwitchOutcome> {
        self.get(id)?;
        if let Some(old_id) = self.current
            && old_id != id
            && let Ok(old) = self.get_mut(old_id)
        {
            old.window_count = old.window_count.saturating_sub(1);
            if old.window_count == 0
                && let Some((dot, mark)) = snapshot
            {
                old.dot = dot;
                old.mark = mark;
            }
        }
        let buf = self.get_mut(id)?;
        buf.window_count += 1;
        let needs_read_in = !buf.active;
        self.current = Some(id);
        debug!(target: "state.buffer", id = id.0, needs_read_in, "buffer_switched");
        Ok(SwitchOutcome { needs_read_in })
    }

    /// Remove a buffer entirely. Displayed buffers cannot be killed.
    pub fn kill(&mut self, id: BufferId) -> Result<()> {
        let buf = self.get(id)?;
        if buf.window_count > 0 {
            return Err(Status::Error);
        }
        let name = buf.name.clone();
        self.by_name.remove(&name);
        self.order.retain(|&o| o != id);
        self.arena[id.0 as usize] = None;
        if self.current == Some(id) {
            self.current = None;
        }
        info!(target: "state.buffer", name, id = id.0, "buffer_killed");
        self.validate();
        Ok(())
    }

    /// Buffer ids in lexicographic name order.
    pub fn ordered(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The name map and the ordered list must agree.
    fn validate(&self) {
        debug_assert_eq!(self.by_name.len(), self.order.len());
        debug_assert!(
            self.order
                .windows(2)
                .all(|w| self.name_of(w[0]) <= self.name_of(w[1]))
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(buf: &Buffer) -> String {
        String::from_utf8(buf.text().to_vec()).unwrap()
    }

    #[test]
    fn edits_keep_stats_consistent() {
        let mut buf = Buffer::new("t", BufferFlags::empty());
        buf.insert_at(Position::origin(), b"one two\nthree").unwrap();
        let (lines, bytes, words) = buf.statistics();
        assert_eq!((lines, bytes, words), (2, 13, 3));
        buf.delete_at(Position::new(0, 3), 1).unwrap(); // the space
        let (lines, bytes, words) = buf.statistics();
        assert_eq!((lines, bytes, words), (2, 12, 2));
        assert!(buf.is_changed());
    }

    #[test]
    fn single_byte_deltas_match_rescan() {
        let mut buf = Buffer::new("t", BufferFlags::empty());
        for (i, b) in b"ab cd ef".iter().enumerate() {
            buf.insert_at(Position::new(0, i), &[*b]).unwrap();
            let cached = buf.statistics();
            buf.stats_cache().mark_dirty();
            assert_eq!(buf.statistics(), cached);
        }
    }

    #[test]
    fn undo_redo_round_trips_bytes_and_dot() {
        let mut buf = Buffer::new("t", BufferFlags::empty());
        buf.insert_at(Position::origin(), b"hello world").unwrap();
        let before = buf.text().to_vec();
        buf.insert_at(Position::new(0, 5), b",").unwrap();
        let after = buf.text().to_vec();

        let dot = buf.undo().unwrap().unwrap();
        assert_eq!(buf.text().to_vec(), before);
        assert_eq!(dot, Position::new(0, 5));

        let dot = buf.redo().unwrap().unwrap();
        assert_eq!(buf.text().to_vec(), after);
        assert_eq!(dot, Position::new(0, 5));

        // undo(); redo() is the identity.
        buf.undo().unwrap();
        buf.redo().unwrap();
        assert_eq!(buf.text().to_vec(), after);
    }

    #[test]
    fn grouped_typing_undoes_as_units() {
        // Scenario: type h, i, space, ! — two undo steps.
        let mut buf = Buffer::new("t", BufferFlags::empty());
        for (i, b) in b"hi !".iter().enumerate() {
            // "hi !" typed as h,i,space,! means col order 0,1,2,3
            buf.insert_at(Position::new(0, i), &[*b]).unwrap();
        }
        assert_eq!(contents(&buf), "hi !");
        buf.undo().unwrap();
        assert_eq!(contents(&buf), "hi");
        buf.undo().unwrap();
        assert_eq!(contents(&buf), "");
        assert!(buf.undo().unwrap().is_none());
    }

    #[test]
    fn saved_baseline_tracks_changed_flag() {
        let mut buf = Buffer::new("t", BufferFlags::empty());
        buf.insert_at(Position::origin(), b"abc").unwrap();
        buf.mark_saved();
        assert!(!buf.is_changed());

        buf.insert_at(Position::new(0, 3), b"!").unwrap();
        assert!(buf.is_changed());

        buf.undo().unwrap();
        assert!(!buf.is_changed());

        buf.redo().unwrap();
        assert!(buf.is_changed());
    }

    #[test]
    fn view_mode_blocks_edits() {
        let mut buf = Buffer::from_str("t", "locked");
        buf.modes.insert(ModeFlags::VIEW);
        assert_eq!(
            buf.insert_at(Position::origin(), b"x"),
            Err(Status::FilePermission)
        );
        assert_eq!(
            buf.delete_at(Position::origin(), 1).unwrap_err(),
            Status::FilePermission
        );
        assert_eq!(contents(&buf), "locked");
    }

    #[test]
    fn buffer_set_orders_names() {
        let mut set = BufferSet::new();
        let c = set.find("charlie", true, BufferFlags::empty()).unwrap();
        let a = set.find("alpha", true, BufferFlags::empty()).unwrap();
        let b = set.find("bravo", true, BufferFlags::empty()).unwrap();
        assert_eq!(set.ordered().collect::<Vec<_>>(), vec![a, b, c]);
        // find returns the existing id, never a duplicate
        assert_eq!(set.find("alpha", true, BufferFlags::empty()).unwrap(), a);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn missing_buffer_without_create_fails() {
        let mut set = BufferSet::new();
        assert_eq!(
            set.find("ghost", false, BufferFlags::empty()).unwrap_err(),
            Status::BufferInvalid
        );
    }

    #[test]
    fn switch_snapshots_dot_into_old_buffer() {
        let mut set = BufferSet::new();
        let a = set.find("a", true, BufferFlags::empty()).unwrap();
        let b = set.find("b", true, BufferFlags::empty()).unwrap();
        set.switch(a, None).unwrap();
        let out = set
            .switch(b, Some((Position::new(3, 7), Some(Position::new(1, 0)))))
            .unwrap();
        assert!(!out.needs_read_in);
        let old = set.get(a).unwrap();
        assert_eq!(old.dot, Position::new(3, 7));
        assert_eq!(old.mark, Some(Position::new(1, 0)));
        assert_eq!(old.window_count, 0);
        assert_eq!(set.get(b).unwrap().window_count, 1);
    }

    #[test]
    fn kill_refuses_displayed_buffer() {
        let mut set = BufferSet::new();
        let a = set.find("a", true, BufferFlags::empty()).unwrap();
        set.switch(a, None).unwrap();
        assert_eq!(set.kill(a).unwrap_err(), Status::Error);
        // Release it, then the kill goes through.
        let b = set.find("b", true, BufferFlags::empty()).unwrap();
        set.switch(b, None).unwrap();
        set.kill(a).unwrap();
        assert_eq!(
            set.find("a", false, BufferFlags::empty()).unwrap_err(),
            Status::BufferInvalid
        );
        assert_eq!(set.len(), 1);
    }
}
