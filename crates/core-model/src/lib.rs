//! Windows: viewports onto buffers with their own dot, mark, and frame.
//!
//! Positions are `(line, column)` pairs renumbered on structural edits rather
//! than pointers repointed at line records: every window watching the edited
//! buffer gets its top line, dot, and mark shifted by the edit's line delta.
//! A buffer-indexed hash keeps "which windows watch this buffer" O(1) instead
//! of a scan, which is what keeps multi-window fixups cheap.

use ahash::RandomState;
use bitflags::bitflags;
use smallvec::SmallVec;
use std::collections::HashMap;
use tracing::trace;

use core_state::{BufferId, Position};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WindowFlags: u8 {
        /// Reframe requested at the row in `force`.
        const FORCE = 1 << 0;
        /// Dot moved; no text changed.
        const MOVE  = 1 << 1;
        /// Single line edited.
        const EDIT  = 1 << 2;
        /// Structural change; repaint everything visible.
        const HARD  = 1 << 3;
        /// Mode line needs repaint.
        const MODE  = 1 << 4;
        /// Lines were removed (scroll-delete candidate).
        const KILLS = 1 << 5;
        /// Lines were inserted (scroll-insert candidate).
        const INS   = 1 << 6;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u32);

#[derive(Debug, Clone)]
pub struct Window {
    pub id: WindowId,
    pub buffer: BufferId,
    /// First buffer line visible in the window.
    pub top_line: usize,
    pub dot: Position,
    pub mark: Option<Position>,
    /// Screen row where the window starts.
    pub toprow: u16,
    /// Text rows, excluding the mode line.
    pub ntrows: u16,
    pub flags: WindowFlags,
    /// Requested dot row for a forced reframe.
    pub force: i32,
}

impl Window {
    pub fn contains_line(&self, line: usize) -> bool {
        line >= self.top_line && line < self.top_line + self.ntrows as usize
    }

    /// Screen row of the window's mode line.
    pub fn mode_row(&self) -> u16 {
        self.toprow + self.ntrows
    }
}

/// Shape of one buffer edit, as seen by window fixups.
#[derive(Debug, Clone, Copy)]
pub struct EditSpan {
    /// Where the edit started.
    pub start: Position,
    /// Newlines inserted or removed.
    pub newlines: usize,
    /// Total bytes inserted or removed.
    pub bytes: usize,
    /// For multi-line edits, bytes after the last newline.
    pub tail: usize,
}

impl EditSpan {
    pub fn from_text(start: Position, text: &[u8]) -> Self {
        let newlines = text.iter().filter(|&&b| b == b'\n').count();
        let tail = text
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(text.len(), |p| text.len() - p - 1);
        Self {
            start,
            newlines,
            bytes: text.len(),
            tail,
        }
    }

    /// Position just past the span, in the coordinates where the text exists.
    fn end(&self) -> Position {
        if self.newlines == 0 {
            Position::new(self.start.line, self.start.col + self.bytes)
        } else {
            Position::new(self.start.line + self.newlines, self.tail)
        }
    }
}

pub struct WindowSet {
    windows: Vec<Window>,
    current: WindowId,
    by_buffer: HashMap<BufferId, SmallVec<[WindowId; 2]>, RandomState>,
    next_id: u32,
}

impl WindowSet {
    /// One full-height window on `buffer`; `rows` is the screen space
    /// available to windows (the message line is already excluded).
    pub fn new(buffer: BufferId, rows: u16) -> Self {
        let id = WindowId(0);
        let ntrows = rows.saturating_sub(1); // mode line
        let window = Window {
            id,
            buffer,
            top_line: 0,
            dot: Position::origin(),
            mark: None,
            toprow: 0,
            ntrows: ntrows.max(1),
            flags: WindowFlags::HARD | WindowFlags::MODE,
            force: 0,
        };
        let mut by_buffer: HashMap<_, SmallVec<[WindowId; 2]>, RandomState> =
            HashMap::default();
        by_buffer.entry(buffer).or_default().push(id);
        Self {
            windows: vec![window],
            current: id,
            by_buffer,
            next_id: 1,
        }
    }

    pub fn current_id(&self) -> WindowId {
        self.current
    }

    pub fn current(&self) -> &Window {
        self.get(self.current).expect("current window exists")
    }

    pub fn current_mut(&mut self) -> &mut Window {
        let id = self.current;
        self.get_mut(id).expect("current window exists")
    }

    pub fn get(&self, id: WindowId) -> Option<&Window> {
        self.windows.iter().find(|w| w.id == id)
    }

    pub fn get_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        self.windows.iter_mut().find(|w| w.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Window> {
        self.windows.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Window> {
        self.windows.iter_mut()
    }

    /// Windows currently showing `buffer`, O(1) via the buffer hash.
    pub fn watching(&self, buffer: BufferId) -> &[WindowId] {
        self.by_buffer
            .get(&buffer)
            .map_or(&[][..], |v| v.as_slice())
    }

    /// Point the current window at a different buffer.
    pub fn retarget_current(&mut self, buffer: BufferId) {
        let id = self.current;
        let old = self.current().buffer;
        if old == buffer {
            return;
        }
        if let Some(list) = self.by_buffer.get_mut(&old) {
            list.retain(|w| *w != id);
            if list.is_empty() {
                self.by_buffer.remove(&old);
            }
        }
        self.by_buffer.entry(buffer).or_default().push(id);
        let w = self.current_mut();
        w.buffer = buffer;
        w.top_line = 0;
        w.dot = Position::origin();
        w.mark = None;
        w.flags |= WindowFlags::HARD | WindowFlags::MODE;
    }

    /// Split the current window horizontally; the new window takes the lower
    /// half and becomes current.
    pub fn split_current(&mut self) -> Option<WindowId> {
        let cur = self.current().clone();
        if cur.ntrows < 3 {
            return None; // too small to split: each half needs a text row
        }
        let upper_rows = cur.ntrows / 2;
        let lower_rows = cur.ntrows - upper_rows - 1; // one row becomes a mode line
        let id = WindowId(self.next_id);
        self.next_id += 1;
        {
            let w = self.current_mut();
            w.ntrows = upper_rows;
            w.flags |= WindowFlags::HARD | WindowFlags::MODE;
        }
        let lower = Window {
            id,
            buffer: cur.buffer,
            top_line: cur.top_line,
            dot: cur.dot,
            mark: cur.mark,
            toprow: cur.toprow + upper_rows + 1,
            ntrows: lower_rows.max(1),
            flags: WindowFlags::HARD | WindowFlags::MODE,
            force: 0,
        };
        self.by_buffer.entry(cur.buffer).or_default().push(id);
        self.windows.push(lower);
        self.current = id;
        Some(id)
    }

    /// Delete every window but the current one, growing it to full height.
    pub fn only_current(&mut self, rows: u16) {
        let keep = self.current;
        self.windows.retain(|w| w.id == keep);
        self.by_buffer.clear();
        let w = &mut self.windows[0];
        w.toprow = 0;
        w.ntrows = rows.saturating_sub(1).max(1);
        w.flags |= WindowFlags::HARD | WindowFlags::MODE;
        self.by_buffer.entry(w.buffer).or_default().push(keep);
    }

    /// Cycle to the next window in screen order.
    pub fn next_window(&mut self) {
        let idx = self
            .windows
            .iter()
            .position(|w| w.id == self.current)
            .unwrap_or(0);
        self.current = self.windows[(idx + 1) % self.windows.len()].id;
    }

    /// Re-layout after a terminal resize: windows share the new height in
    /// screen order, each keeping at least one text row plus its mode line.
    pub fn relayout(&mut self, rows: u16) {
        let usable = rows;
        let count = self.windows.len() as u16;
        if count == 0 || usable < count * 2 {
            // Not enough space for everyone; collapse to the current window.
            self.only_current(rows);
            return;
        }
        let per = usable / count;
        let mut row = 0;
        for w in &mut self.windows {
            w.toprow = row;
            w.ntrows = per - 1;
            w.flags |= WindowFlags::HARD | WindowFlags::MODE;
            row += per;
        }
        // Give the remainder to the last window.
        if let Some(last) = self.windows.last_mut() {
            last.ntrows += usable - row;
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Edit fixups
    // ---------------------------------------------------------------------------------------------

    fn shift_after_insert(pos: Position, span: &EditSpan) -> Position {
        let s = span.start;
        if pos.line > s.line {
            return Position::new(pos.line + span.newlines, pos.col);
        }
        if pos.line == s.line && pos.col >= s.col {
            return if span.newlines == 0 {
                Position::new(pos.line, pos.col + span.bytes)
            } else {
                Position::new(pos.line + span.newlines, pos.col - s.col + span.tail)
            };
        }
        pos
    }

    fn shift_after_delete(pos: Position, span: &EditSpan) -> Position {
        let s = span.start;
        let e = span.end();
        if pos.line > e.line {
            return Position::new(pos.line - span.newlines, pos.col);
        }
        if (pos.line, pos.col) >= (s.line, s.col) {
            if (pos.line, pos.col) <= (e.line, e.col) {
                return s; // inside the deleted span: clamp to its start
            }
            if pos.line == e.line {
                return Position::new(s.line, s.col + (pos.col - e.col));
            }
        }
        pos
    }

    /// Renumber every window watching `buffer` after an insertion described
    /// by `span`, and flag them for repaint.
    pub fn adjust_after_insert(&mut self, buffer: BufferId, span: EditSpan) {
        let ids: SmallVec<[WindowId; 2]> = self.watching(buffer).into();
        for id in ids {
            let Some(w) = self.get_mut(id) else { continue };
            w.dot = Self::shift_after_insert(w.dot, &span);
            w.mark = w.mark.map(|m| Self::shift_after_insert(m, &span));
            if span.newlines > 0 {
                if w.top_line > span.start.line {
                    w.top_line += span.newlines;
                }
                w.flags |= WindowFlags::HARD | WindowFlags::INS;
            } else {
                w.flags |= WindowFlags::EDIT;
            }
            trace!(target: "model.window", window = id.0, "insert_fixup");
        }
    }

    /// Renumber after a deletion described by `span` (coordinates of the text
    /// as it was before the delete).
    pub fn adjust_after_delete(&mut self, buffer: BufferId, span: EditSpan) {
        let ids: SmallVec<[WindowId; 2]> = self.watching(buffer).into();
        let end = span.end();
        for id in ids {
            let Some(w) = self.get_mut(id) else { continue };
            w.dot = Self::shift_after_delete(w.dot, &span);
            w.mark = w.mark.map(|m| Self::shift_after_delete(m, &span));
            if span.newlines > 0 {
                if w.top_line > end.line {
                    w.top_line -= span.newlines;
                } else if w.top_line > span.start.line {
                    w.top_line = span.start.line;
                }
                w.flags |= WindowFlags::HARD | WindowFlags::KILLS;
            } else {
                w.flags |= WindowFlags::EDIT;
            }
            trace!(target: "model.window", window = id.0, "delete_fixup");
        }
    }
}
