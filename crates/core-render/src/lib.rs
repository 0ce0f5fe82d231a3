//! Damage-tracked rendering: windows compose into the display matrix, the
//! diff stage pushes changed rows to the terminal.
//!
//! One update pass:
//! 1. Reframe every flagged window whose dot left the viewport (gentle
//!    scroll by `scroll_count` when just outside, jump-center past a screen).
//! 2. Redraw the affected buffer rows into the matrix; selection cells get
//!    their highlight at compose time; mode lines render reversed.
//! 3. Compose dirty matrix rows into the virtual screen and let the diff
//!    engine (checksums, prefix/suffix skip, scroll detection) emit the
//!    minimal terminal traffic.
//! 4. Park the hardware cursor on the current window's dot and flush.
//!
//! The pass is skipped while an edit transaction is open; the caller re-runs
//! it when the depth returns to zero. Nothing is lost because dirtiness
//! lives in the matrix, not in the skipped call.

pub mod diff;
pub mod matrix;
pub mod metrics;
pub mod status;

pub use diff::{HIGHLIGHT_BIT, Screen, ScreenDiff};
pub use matrix::{Cell, CellFlags, DisplayMatrix, Rect};
pub use metrics::RenderMetrics;
pub use status::{BufferPosition, format_mode_line};

use std::sync::atomic::Ordering;
use tracing::trace;

use core_events::{RENDER_PASSES, Result};
use core_model::{Window, WindowFlags, WindowSet};
use core_state::{Buffer, BufferSet};
use core_terminal::{Capabilities, TerminalSurface};
use core_text::width::display_column;

use matrix::{ATTR_NORMAL, ATTR_REVERSE, COLOR_DEFAULT};

pub struct Renderer {
    pub matrix: DisplayMatrix,
    diff: ScreenDiff,
    scroll_count: usize,
    tab_width: usize,
    pub metrics: RenderMetrics,
}

impl Renderer {
    pub fn new(rows: u16, cols: u16, caps: Capabilities) -> Result<Self> {
        let matrix = DisplayMatrix::new(rows, cols)?;
        let diff = ScreenDiff::new(matrix.rows() as usize, matrix.cols() as usize, caps);
        Ok(Self {
            matrix,
            diff,
            scroll_count: 1,
            tab_width: 8,
            metrics: RenderMetrics::default(),
        })
    }

    pub fn set_scroll_count(&mut self, count: usize) {
        self.scroll_count = count.max(1);
    }

    /// Adopt the surface's capabilities (driver probes happen after init).
    pub fn set_capabilities(&mut self, caps: Capabilities) {
        self.diff.set_capabilities(caps);
    }

    pub fn set_tab_width(&mut self, width: usize) {
        self.tab_width = width.clamp(1, 16);
        self.matrix.set_tab_width(width);
    }

    pub fn resize(&mut self, rows: u16, cols: u16) -> Result<()> {
        self.matrix.resize(rows, cols)?;
        self.diff
            .resize(self.matrix.rows() as usize, self.matrix.cols() as usize);
        Ok(())
    }

    /// Bring the viewport back to the dot.
    ///
    /// Policy: a dot just outside the frame scrolls gently (down to the dot
    /// when above; by overshoot plus `scroll_count - 1` when below). A dot
    /// more than one screen-height away re-centers instead of animating a
    /// long scroll.
    fn reframe(&self, window: &mut Window, total_lines: usize) -> bool {
        let rows = window.ntrows as usize;
        let dot = window.dot.line;
        if window.flags.contains(WindowFlags::FORCE) {
            let offset = (window.force.max(0) as usize).min(rows.saturating_sub(1));
            window.top_line = dot.saturating_sub(offset);
            return true;
        }
        if window.contains_line(dot) {
            return false;
        }
        if dot < window.top_line {
            let distance = window.top_line - dot;
            window.top_line = if distance > rows {
                dot.saturating_sub(rows / 2)
            } else {
                dot
            };
        } else {
            let overshoot = dot - (window.top_line + rows - 1);
            window.top_line = if overshoot > rows {
                dot.saturating_sub(rows / 2)
            } else {
                (window.top_line + overshoot + self.scroll_count - 1).min(dot)
            };
        }
        window.top_line = window.top_line.min(total_lines.saturating_sub(1));
        true
    }

    /// Full render pass over every flagged window.
    pub fn update(
        &mut self,
        windows: &mut WindowSet,
        buffers: &mut BufferSet,
        surface: &mut dyn TerminalSurface,
        force: bool,
    ) -> Result<()> {
        RENDER_PASSES.fetch_add(1, Ordering::Relaxed);
        self.metrics.frames.fetch_add(1, Ordering::Relaxed);

        // Mode-line changes propagate to every window showing that buffer.
        let mode_buffers: Vec<_> = windows
            .iter()
            .filter(|w| w.flags.contains(WindowFlags::MODE))
            .map(|w| w.buffer)
            .collect();
        for w in windows.iter_mut() {
            if mode_buffers.contains(&w.buffer) {
                w.flags |= WindowFlags::MODE;
            }
        }

        for w in windows.iter_mut() {
            if w.flags.is_empty() && !force {
                continue;
            }
            let Ok(buffer) = buffers.get_mut(w.buffer) else {
                continue;
            };
            let total = buffer.line_count();
            if self.reframe(w, total) {
                w.flags |= WindowFlags::HARD;
                self.metrics.windows_reframed.fetch_add(1, Ordering::Relaxed);
            }

            let hard = force
                || w.flags
                    .intersects(WindowFlags::HARD | WindowFlags::KILLS | WindowFlags::INS);
            if hard {
                self.draw_window_rows(w, buffer, 0, w.ntrows);
            } else if w.flags.contains(WindowFlags::EDIT) {
                // Only the dot line changed.
                if w.contains_line(w.dot.line) {
                    let row = (w.dot.line - w.top_line) as u16;
                    self.draw_window_rows(w, buffer, row, row + 1);
                }
            }

            if force || w.flags.intersects(WindowFlags::MODE | WindowFlags::HARD) {
                self.draw_mode_line(w, buffer);
            }
            w.flags = WindowFlags::empty();
            w.force = 0;
        }

        // Hardware cursor follows the current window's dot.
        let cursor = {
            let w = windows.current();
            let buffer = buffers.get_mut(w.buffer)?;
            let line = buffer.line_bytes(w.dot.line);
            let col = (display_column(&line, w.dot.col, self.tab_width) as u16)
                .min(self.matrix.cols().saturating_sub(1));
            let row = (w.toprow as usize + w.dot.line.saturating_sub(w.top_line)) as u16;
            (row.min(self.matrix.rows().saturating_sub(1)), col)
        };
        self.matrix.set_cursor(cursor.0, cursor.1);

        self.compose_dirty_rows();
        self.diff.flush_to(surface, force)?;
        surface.move_to(cursor.0, cursor.1)?;
        surface.flush()?;
        self.matrix.commit_updates();
        trace!(target: "render.diff", force, "update_done");
        Ok(())
    }

    /// Paint window text rows `[from, to)` (window-relative) into the matrix.
    fn draw_window_rows(&mut self, window: &Window, buffer: &mut Buffer, from: u16, to: u16) {
        let total = buffer.line_count();
        for wrow in from..to.min(window.ntrows) {
            let screen_row = window.toprow + wrow;
            if screen_row >= self.matrix.rows() {
                break;
            }
            let line_idx = window.top_line + wrow as usize;
            let text = if line_idx < total {
                String::from_utf8_lossy(&buffer.line_bytes(line_idx)).into_owned()
            } else {
                String::new()
            };
            let end = self.matrix.render_text(
                screen_row,
                0,
                &text,
                ATTR_NORMAL,
                COLOR_DEFAULT,
                COLOR_DEFAULT,
            );
            for col in end..self.matrix.cols() {
                self.matrix.clear_cell(screen_row, col);
            }
            self.metrics.rows_composed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Mode line at the window's bottom row, reverse video. Skipped entirely
    /// when the row would fall outside the matrix.
    fn draw_mode_line(&mut self, window: &Window, buffer: &mut Buffer) {
        let row = window.mode_row();
        if row >= self.matrix.rows() {
            return;
        }
        let total = buffer.line_count();
        let position =
            BufferPosition::compute(window.top_line, window.ntrows as usize, total);
        let char_col = buffer.char_col(window.dot);
        let text = format_mode_line(
            buffer,
            window.dot.line,
            char_col,
            position,
            self.matrix.cols() as usize,
        );
        self.matrix.render_text(
            row,
            0,
            &text,
            ATTR_REVERSE,
            COLOR_DEFAULT,
            COLOR_DEFAULT,
        );
        self.metrics.mode_lines_drawn.fetch_add(1, Ordering::Relaxed);
    }

    /// Push dirty matrix rows into the virtual screen, OR-ing the highlight
    /// bit into selected and reverse-attributed cells.
    fn compose_dirty_rows(&mut self) {
        let cols = self.matrix.cols();
        for row in 0..self.matrix.rows().min(self.diff.virt.rows() as u16) {
            if !self.matrix.is_line_dirty(row) {
                continue;
            }
            let mut cells = Vec::with_capacity(cols as usize);
            for col in 0..cols {
                let Some(cell) = self.matrix.cell(row, col) else {
                    continue;
                };
                let mut value = cell.codepoint as u32;
                if cell.flags.contains(CellFlags::SELECTED) || cell.attr & ATTR_REVERSE != 0 {
                    value |= HIGHLIGHT_BIT;
                }
                cells.push(value);
            }
            self.diff.virt.set_line(row as usize, &cells);
        }
    }

    pub fn diff_counters(&self) -> &diff::DiffCounters {
        &self.diff.counters
    }
}
