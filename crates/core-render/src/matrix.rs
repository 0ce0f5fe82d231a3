//! Row-by-column cell grid with per-cell dirty tracking.
//!
//! The matrix is the compose target: window redraw writes cells here, and the
//! diff stage later resolves dirty rows against the physical screen. Per-row
//! dirty flags are authoritative; the rectangle list exists for consumers
//! that want coarse regions and is merged lazily once three rectangles
//! overlap. Writes that do not change a cell are dropped before any dirty
//! state is touched.

use bitflags::bitflags;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

use core_events::{Result, Status};

pub const MATRIX_MIN_ROWS: u16 = 24;
pub const MATRIX_MIN_COLS: u16 = 80;
pub const MATRIX_MAX_ROWS: u16 = 300;
pub const MATRIX_MAX_COLS: u16 = 500;
/// Overlapping rectangles tolerated before a lazy merge.
pub const DIRTY_REGION_MERGE_THRESHOLD: usize = 3;
/// Hard cap on tracked rectangles; beyond this the matrix promotes to a
/// full redraw.
pub const MAX_DIRTY_REGIONS: usize = 64;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CellFlags: u8 {
        const DIRTY    = 1 << 0;
        const SELECTED = 1 << 1;
        const CURSOR   = 1 << 2;
        const WRAPPED  = 1 << 3;
        const TAB      = 1 << 4;
        const CONTROL  = 1 << 5;
    }
}

pub const ATTR_NORMAL: u8 = 0x00;
pub const ATTR_BOLD: u8 = 0x01;
pub const ATTR_UNDERLINE: u8 = 0x02;
pub const ATTR_REVERSE: u8 = 0x04;

pub const COLOR_DEFAULT: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub codepoint: char,
    pub attr: u8,
    pub fg: u8,
    pub bg: u8,
    pub flags: CellFlags,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            codepoint: ' ',
            attr: ATTR_NORMAL,
            fg: COLOR_DEFAULT,
            bg: COLOR_DEFAULT,
            flags: CellFlags::DIRTY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub top: u16,
    pub left: u16,
    pub bottom: u16,
    pub right: u16,
}

impl Rect {
    fn overlaps(&self, other: &Rect) -> bool {
        self.top <= other.bottom
            && other.top <= self.bottom
            && self.left <= other.right
            && other.left <= self.right
    }

    fn union(&self, other: &Rect) -> Rect {
        Rect {
            top: self.top.min(other.top),
            left: self.left.min(other.left),
            bottom: self.bottom.max(other.bottom),
            right: self.right.max(other.right),
        }
    }
}

#[derive(Debug, Default)]
pub struct MatrixCounters {
    pub cells_updated: AtomicU64,
    pub regions_merged: AtomicU64,
    pub scroll_operations: AtomicU64,
    pub full_redraws: AtomicU64,
    pub partial_redraws: AtomicU64,
    pub cursor_moves: AtomicU64,
}

pub struct DisplayMatrix {
    rows: u16,
    cols: u16,
    cells: Vec<Cell>,
    line_dirty: Vec<bool>,
    dirty_regions: SmallVec<[Rect; 8]>,
    first_dirty_line: Option<u16>,
    last_dirty_line: Option<u16>,
    full_redraw_pending: bool,
    cursor: (u16, u16),
    old_cursor: Option<(u16, u16)>,
    selection: Option<Rect>,
    generation: AtomicU64,
    pub counters: MatrixCounters,
    tab_width: usize,
}

impl DisplayMatrix {
    pub fn new(rows: u16, cols: u16) -> Result<Self> {
        if rows > MATRIX_MAX_ROWS || cols > MATRIX_MAX_COLS {
            return Err(Status::Range);
        }
        let rows = rows.max(MATRIX_MIN_ROWS);
        let cols = cols.max(MATRIX_MIN_COLS);
        Ok(Self {
            rows,
            cols,
            cells: vec![Cell::default(); rows as usize * cols as usize],
            line_dirty: vec![true; rows as usize],
            dirty_regions: SmallVec::new(),
            first_dirty_line: Some(0),
            last_dirty_line: Some(rows - 1),
            full_redraw_pending: true,
            cursor: (0, 0),
            old_cursor: None,
            selection: None,
            generation: AtomicU64::new(0),
            counters: MatrixCounters::default(),
            tab_width: 8,
        })
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn set_tab_width(&mut self, width: usize) {
        self.tab_width = width.clamp(1, 16);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    #[inline]
    fn index(&self, row: u16, col: u16) -> usize {
        row as usize * self.cols as usize + col as usize
    }

    pub fn cell(&self, row: u16, col: u16) -> Option<&Cell> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        Some(&self.cells[self.index(row, col)])
    }

    pub fn resize(&mut self, rows: u16, cols: u16) -> Result<()> {
        if rows > MATRIX_MAX_ROWS || cols > MATRIX_MAX_COLS {
            return Err(Status::Range);
        }
        let rows = rows.max(MATRIX_MIN_ROWS);
        let cols = cols.max(MATRIX_MIN_COLS);
        let mut cells = vec![Cell::default(); rows as usize * cols as usize];
        let copy_rows = rows.min(self.rows);
        let copy_cols = cols.min(self.cols);
        for r in 0..copy_rows {
            for c in 0..copy_cols {
                cells[r as usize * cols as usize + c as usize] = self.cells[self.index(r, c)];
            }
        }
        self.cells = cells;
        self.rows = rows;
        self.cols = cols;
        self.line_dirty = vec![true; rows as usize];
        self.mark_all_dirty();
        Ok(())
    }

    // ---------------------------------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------------------------------

    pub fn set_cell(&mut self, row: u16, col: u16, codepoint: char, attr: u8, fg: u8, bg: u8) {
        if row >= self.rows || col >= self.cols {
            return;
        }
        let idx = self.index(row, col);
        let cell = &self.cells[idx];
        if cell.codepoint == codepoint && cell.attr == attr && cell.fg == fg && cell.bg == bg {
            return;
        }
        let keep = self.cells[idx].flags & (CellFlags::SELECTED | CellFlags::CURSOR);
        self.cells[idx] = Cell {
            codepoint,
            attr,
            fg,
            bg,
            flags: keep | CellFlags::DIRTY,
        };
        self.mark_dirty(row, col);
        self.counters.cells_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn clear_cell(&mut self, row: u16, col: u16) {
        self.set_cell(row, col, ' ', ATTR_NORMAL, COLOR_DEFAULT, COLOR_DEFAULT);
    }

    pub fn clear_line(&mut self, row: u16) {
        for col in 0..self.cols {
            self.clear_cell(row, col);
        }
    }

    pub fn clear_all(&mut self) {
        for cell in &mut self.cells {
            *cell = Cell::default();
        }
        self.mark_all_dirty();
    }

    /// Render a text run with tab expansion and `^X` control rendering.
    /// Returns the column after the last written cell.
    pub fn render_text(
        &mut self,
        row: u16,
        start_col: u16,
        text: &str,
        attr: u8,
        fg: u8,
        bg: u8,
    ) -> u16 {
        if row >= self.rows {
            return start_col;
        }
        let mut col = start_col;
        for ch in text.chars() {
            if col >= self.cols {
                break;
            }
            if ch == '\t' {
                let stop = self.tab_width - (col as usize % self.tab_width);
                for _ in 0..stop {
                    if col >= self.cols {
                        break;
                    }
                    self.set_cell(row, col, ' ', attr, fg, bg);
                    col += 1;
                }
            } else if (ch as u32) < 0x20 {
                self.set_cell(row, col, '^', attr | ATTR_REVERSE, fg, bg);
                col += 1;
                if col < self.cols {
                    let shown = char::from_u32(ch as u32 + '@' as u32).unwrap_or('?');
                    self.set_cell(row, col, shown, attr | ATTR_REVERSE, fg, bg);
                    col += 1;
                }
            } else {
                self.set_cell(row, col, ch, attr, fg, bg);
                col += 1;
            }
        }
        col
    }

    // ---------------------------------------------------------------------------------------------
    // Dirty tracking
    // ---------------------------------------------------------------------------------------------

    pub fn mark_dirty(&mut self, row: u16, col: u16) {
        if row >= self.rows {
            return;
        }
        self.line_dirty[row as usize] = true;
        self.first_dirty_line = Some(self.first_dirty_line.map_or(row, |f| f.min(row)));
        self.last_dirty_line = Some(self.last_dirty_line.map_or(row, |l| l.max(row)));
        if col < self.cols {
            let idx = self.index(row, col);
            self.cells[idx].flags |= CellFlags::DIRTY;
        }
        self.bump();
    }

    pub fn mark_region_dirty(&mut self, rect: Rect) {
        let bottom = rect.bottom.min(self.rows.saturating_sub(1));
        let right = rect.right.min(self.cols.saturating_sub(1));
        for row in rect.top..=bottom {
            self.line_dirty[row as usize] = true;
            for col in rect.left..=right {
                let idx = self.index(row, col);
                self.cells[idx].flags |= CellFlags::DIRTY;
            }
        }
        self.first_dirty_line = Some(self.first_dirty_line.map_or(rect.top, |f| f.min(rect.top)));
        self.last_dirty_line = Some(self.last_dirty_line.map_or(bottom, |l| l.max(bottom)));
        self.push_region(Rect {
            top: rect.top,
            left: rect.left,
            bottom,
            right,
        });
        self.bump();
    }

    /// Lazy rectangle maintenance: merge once enough overlaps accumulate,
    /// promote to full redraw when the list is hopeless.
    fn push_region(&mut self, rect: Rect) {
        let overlapping = self
            .dirty_regions
            .iter()
            .filter(|r| r.overlaps(&rect))
            .count();
        if overlapping >= DIRTY_REGION_MERGE_THRESHOLD {
            let mut merged = rect;
            self.dirty_regions.retain(|r| {
                if r.overlaps(&merged) {
                    merged = merged.union(r);
                    false
                } else {
                    true
                }
            });
            self.dirty_regions.push(merged);
            self.counters.regions_merged.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dirty_regions.push(rect);
        }
        if self.dirty_regions.len() > MAX_DIRTY_REGIONS {
            trace!(target: "render.matrix", "region_overflow_full_redraw");
            self.dirty_regions.clear();
            self.mark_all_dirty();
        }
    }

    pub fn dirty_regions(&self) -> &[Rect] {
        &self.dirty_regions
    }

    pub fn mark_all_dirty(&mut self) {
        self.full_redraw_pending = true;
        self.line_dirty.fill(true);
        self.first_dirty_line = Some(0);
        self.last_dirty_line = Some(self.rows - 1);
        for cell in &mut self.cells {
            cell.flags |= CellFlags::DIRTY;
        }
        self.counters.full_redraws.fetch_add(1, Ordering::Relaxed);
        self.bump();
    }

    pub fn is_line_dirty(&self, row: u16) -> bool {
        self.line_dirty.get(row as usize).copied().unwrap_or(false)
    }

    pub fn is_cell_dirty(&self, row: u16, col: u16) -> bool {
        self.cell(row, col)
            .is_some_and(|c| c.flags.contains(CellFlags::DIRTY))
    }

    pub fn dirty_span(&self) -> Option<(u16, u16)> {
        Some((self.first_dirty_line?, self.last_dirty_line?))
    }

    pub fn needs_update(&self) -> bool {
        self.full_redraw_pending || self.first_dirty_line.is_some()
    }

    pub fn full_redraw_pending(&self) -> bool {
        self.full_redraw_pending
    }

    /// Clear all dirty state after a flush. Afterwards no cell carries the
    /// dirty flag and the dirty span is empty.
    pub fn commit_updates(&mut self) {
        for cell in &mut self.cells {
            cell.flags -= CellFlags::DIRTY;
        }
        self.line_dirty.fill(false);
        self.first_dirty_line = None;
        self.last_dirty_line = None;
        self.dirty_regions.clear();
        if self.full_redraw_pending {
            self.full_redraw_pending = false;
        } else {
            self.counters.partial_redraws.fetch_add(1, Ordering::Relaxed);
        }
    }

    // ---------------------------------------------------------------------------------------------
    // Cursor and selection
    // ---------------------------------------------------------------------------------------------

    pub fn set_cursor(&mut self, row: u16, col: u16) {
        // The old position loses its cursor bit and becomes dirty.
        let (pr, pc) = self.cursor;
        if pr < self.rows && pc < self.cols {
            let idx = self.index(pr, pc);
            self.cells[idx].flags -= CellFlags::CURSOR;
            self.mark_dirty(pr, pc);
        }
        self.old_cursor = Some(self.cursor);
        self.cursor = (row, col);
        if row < self.rows && col < self.cols {
            let idx = self.index(row, col);
            self.cells[idx].flags |= CellFlags::CURSOR;
            self.mark_dirty(row, col);
        }
        self.counters.cursor_moves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cursor(&self) -> (u16, u16) {
        self.cursor
    }

    pub fn old_cursor(&self) -> Option<(u16, u16)> {
        self.old_cursor
    }

    pub fn set_selection(&mut self, rect: Option<Rect>) {
        let old = self.selection.take();
        if let Some(r) = old {
            self.apply_selection_flag(r, false);
        }
        if let Some(r) = rect {
            self.apply_selection_flag(r, true);
        }
        self.selection = rect;
    }

    fn apply_selection_flag(&mut self, rect: Rect, on: bool) {
        let bottom = rect.bottom.min(self.rows.saturating_sub(1));
        let right = rect.right.min(self.cols.saturating_sub(1));
        for row in rect.top..=bottom {
            for col in rect.left..=right {
                let idx = self.index(row, col);
                if on {
                    self.cells[idx].flags |= CellFlags::SELECTED;
                } else {
                    self.cells[idx].flags -= CellFlags::SELECTED;
                }
                self.cells[idx].flags |= CellFlags::DIRTY;
            }
            self.line_dirty[row as usize] = true;
        }
        self.first_dirty_line = Some(self.first_dirty_line.map_or(rect.top, |f| f.min(rect.top)));
        self.last_dirty_line = Some(self.last_dirty_line.map_or(bottom, |l| l.max(bottom)));
        self.bump();
    }

    /// O(1) selection membership test.
    pub fn in_selection(&self, row: u16, col: u16) -> bool {
        self.selection.is_some_and(|r| {
            row >= r.top && row <= r.bottom && col >= r.left && col <= r.right
        })
    }

    // ---------------------------------------------------------------------------------------------
    // Scrolling
    // ---------------------------------------------------------------------------------------------

    /// Move rows `start+n ..= end` to `start ..= end-n`, clearing the freed
    /// bottom rows and dirtying the whole band.
    pub fn scroll_up(&mut self, start: u16, end: u16, n: u16) {
        if n == 0 || start >= end || end >= self.rows {
            return;
        }
        let n = n.min(end - start);
        let cols = self.cols as usize;
        for dst in start..=(end - n) {
            let src = dst + n;
            let (d, s) = (self.index(dst, 0), self.index(src, 0));
            self.cells.copy_within(s..s + cols, d);
            self.line_dirty[dst as usize] = true;
        }
        for row in (end - n + 1)..=end {
            self.clear_line(row);
        }
        self.mark_region_dirty(Rect {
            top: start,
            left: 0,
            bottom: end,
            right: self.cols - 1,
        });
        self.counters
            .scroll_operations
            .fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> DisplayMatrix {
        let mut m = DisplayMatrix::new(24, 80).unwrap();
        m.commit_updates();
        m
    }

    #[test]
    fn identical_write_is_a_noop() {
        let mut m = matrix();
        m.set_cell(3, 4, 'x', ATTR_NORMAL, COLOR_DEFAULT, COLOR_DEFAULT);
        m.commit_updates();
        let generation = m.generation();
        m.set_cell(3, 4, 'x', ATTR_NORMAL, COLOR_DEFAULT, COLOR_DEFAULT);
        assert_eq!(m.generation(), generation);
        assert!(!m.is_line_dirty(3));
    }

    #[test]
    fn write_dirties_row_and_span() {
        let mut m = matrix();
        m.set_cell(5, 10, 'a', ATTR_NORMAL, COLOR_DEFAULT, COLOR_DEFAULT);
        m.set_cell(9, 0, 'b', ATTR_NORMAL, COLOR_DEFAULT, COLOR_DEFAULT);
        assert!(m.is_line_dirty(5));
        assert!(m.is_cell_dirty(5, 10));
        assert_eq!(m.dirty_span(), Some((5, 9)));
    }

    #[test]
    fn commit_clears_every_dirty_bit() {
        let mut m = matrix();
        m.render_text(2, 0, "hello", ATTR_NORMAL, COLOR_DEFAULT, COLOR_DEFAULT);
        m.commit_updates();
        assert_eq!(m.dirty_span(), None);
        for row in 0..m.rows() {
            assert!(!m.is_line_dirty(row));
            for col in 0..m.cols() {
                assert!(!m.is_cell_dirty(row, col));
            }
        }
    }

    #[test]
    fn tabs_expand_and_controls_caret() {
        let mut m = matrix();
        let end = m.render_text(0, 0, "a\tb", ATTR_NORMAL, COLOR_DEFAULT, COLOR_DEFAULT);
        assert_eq!(end, 9); // a, tab pads to column 8, then b
        assert_eq!(m.cell(0, 8).unwrap().codepoint, 'b');
        let end = m.render_text(1, 0, "\u{1}", ATTR_NORMAL, COLOR_DEFAULT, COLOR_DEFAULT);
        assert_eq!(end, 2);
        assert_eq!(m.cell(1, 0).unwrap().codepoint, '^');
        assert_eq!(m.cell(1, 1).unwrap().codepoint, 'A');
        assert_ne!(m.cell(1, 0).unwrap().attr & ATTR_REVERSE, 0);
    }

    #[test]
    fn cursor_move_dirties_both_positions() {
        let mut m = matrix();
        m.set_cursor(1, 1);
        m.commit_updates();
        m.set_cursor(2, 2);
        assert!(m.is_cell_dirty(1, 1));
        assert!(m.is_cell_dirty(2, 2));
        assert!(m.cell(2, 2).unwrap().flags.contains(CellFlags::CURSOR));
        assert!(!m.cell(1, 1).unwrap().flags.contains(CellFlags::CURSOR));
    }

    #[test]
    fn selection_is_constant_time_rect() {
        let mut m = matrix();
        m.set_selection(Some(Rect {
            top: 2,
            left: 3,
            bottom: 4,
            right: 10,
        }));
        assert!(m.in_selection(3, 5));
        assert!(!m.in_selection(1, 5));
        assert!(!m.in_selection(3, 11));
        m.set_selection(None);
        assert!(!m.in_selection(3, 5));
    }

    #[test]
    fn scroll_up_moves_band_and_clears_bottom() {
        let mut m = matrix();
        for row in 0..6u16 {
            let text = format!("row{row}");
            m.render_text(row, 0, &text, ATTR_NORMAL, COLOR_DEFAULT, COLOR_DEFAULT);
        }
        m.commit_updates();
        m.scroll_up(1, 5, 2);
        assert_eq!(m.cell(1, 3).unwrap().codepoint, '3');
        assert_eq!(m.cell(3, 3).unwrap().codepoint, '5');
        assert_eq!(m.cell(4, 0).unwrap().codepoint, ' ');
        assert_eq!(m.cell(5, 0).unwrap().codepoint, ' ');
        // Untouched row 0 stays.
        assert_eq!(m.cell(0, 3).unwrap().codepoint, '0');
        assert!(m.is_line_dirty(1) && m.is_line_dirty(5));
        assert_eq!(
            m.counters.scroll_operations.load(Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn overlapping_regions_merge_lazily() {
        let mut m = matrix();
        let base = Rect {
            top: 1,
            left: 0,
            bottom: 2,
            right: 10,
        };
        m.mark_region_dirty(base);
        m.mark_region_dirty(Rect {
            top: 2,
            left: 5,
            bottom: 3,
            right: 12,
        });
        m.mark_region_dirty(Rect {
            top: 1,
            left: 2,
            bottom: 2,
            right: 4,
        });
        assert_eq!(m.dirty_regions().len(), 3);
        // Fourth overlapping rect crosses the merge threshold.
        m.mark_region_dirty(Rect {
            top: 2,
            left: 0,
            bottom: 2,
            right: 12,
        });
        assert_eq!(m.dirty_regions().len(), 1);
        assert!(m.counters.regions_merged.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn oversize_dimensions_rejected() {
        assert!(DisplayMatrix::new(MATRIX_MAX_ROWS + 1, 80).is_err());
        assert!(DisplayMatrix::new(24, MATRIX_MAX_COLS + 1).is_err());
    }
}
