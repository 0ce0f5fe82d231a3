//! Virtual-vs-physical screen diff.
//!
//! Both screens hold one `u32` per cell: the codepoint with [`HIGHLIGHT_BIT`]
//! OR-ed in for selected cells. Each line carries a change flag and an atomic
//! FNV-1a checksum; a cheap checksum compare short-circuits the
//! byte-comparison `update_line` for rows that only *look* changed.
//!
//! `update_line` skips the common prefix and suffix, toggles terminal reverse
//! video only on highlight-bit transitions, and uses erase-to-eol when the
//! changed tail is all blanks and long enough to be worth it. The scroll pass
//! runs first: a contiguous block of physical rows matching a shifted block
//! of virtual rows becomes one terminal scroll instead of N rewrites, unless
//! the scroll distance exceeds twice the matched height.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tracing::trace;

use core_events::Result;
use core_terminal::{Capabilities, CellStyle, TerminalSurface};

/// Selection / mode-line highlight marker, OR-ed into the cell codepoint.
pub const HIGHLIGHT_BIT: u32 = 0x8000_0000;

/// Erase-to-eol is only worth emitting when it saves more than this many
/// cell writes.
const ERASE_MIN_SAVING: usize = 3;

#[inline]
fn fnv1a(cells: &[u32]) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for &c in cells {
        for b in c.to_le_bytes() {
            hash ^= u32::from(b);
            hash = hash.wrapping_mul(16_777_619);
        }
    }
    hash
}

pub struct VideoLine {
    pub cells: Vec<u32>,
    pub changed: bool,
    checksum: AtomicU32,
}

impl VideoLine {
    fn blank(cols: usize) -> Self {
        let cells = vec![' ' as u32; cols];
        let checksum = AtomicU32::new(fnv1a(&cells));
        Self {
            cells,
            changed: true,
            checksum,
        }
    }

    pub fn checksum(&self) -> u32 {
        self.checksum.load(Ordering::Acquire)
    }

    pub fn update_checksum(&self) {
        self.checksum.store(fnv1a(&self.cells), Ordering::Release);
    }
}

pub struct Screen {
    pub lines: Vec<VideoLine>,
    pub cols: usize,
}

impl Screen {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            lines: (0..rows).map(|_| VideoLine::blank(cols)).collect(),
            cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.lines.len()
    }

    pub fn resize(&mut self, rows: usize, cols: usize) {
        self.cols = cols;
        self.lines = (0..rows).map(|_| VideoLine::blank(cols)).collect();
    }

    /// Overwrite one line's cells and flag it changed.
    pub fn set_line(&mut self, row: usize, cells: &[u32]) {
        let line = &mut self.lines[row];
        for (dst, src) in line.cells.iter_mut().zip(cells.iter()) {
            *dst = *src;
        }
        for dst in line.cells.iter_mut().skip(cells.len()) {
            *dst = ' ' as u32;
        }
        line.changed = true;
    }
}

#[derive(Debug, Default)]
pub struct DiffCounters {
    pub lines_updated: AtomicU64,
    pub checksum_skips: AtomicU64,
    pub scroll_hits: AtomicU64,
    pub cells_written: AtomicU64,
    pub erase_ops: AtomicU64,
}

pub struct ScreenDiff {
    pub virt: Screen,
    pub phys: Screen,
    caps: Capabilities,
    pub counters: DiffCounters,
}

impl ScreenDiff {
    pub fn new(rows: usize, cols: usize, caps: Capabilities) -> Self {
        Self {
            virt: Screen::new(rows, cols),
            phys: Screen::new(rows, cols),
            caps,
            counters: DiffCounters::default(),
        }
    }

    pub fn resize(&mut self, rows: usize, cols: usize) {
        self.virt.resize(rows, cols);
        self.phys.resize(rows, cols);
    }

    pub fn set_capabilities(&mut self, caps: Capabilities) {
        self.caps = caps;
    }

    /// Push every changed virtual line out to the surface. Scroll detection
    /// runs first so shifted blocks travel as one terminal scroll.
    pub fn flush_to(&mut self, surface: &mut dyn TerminalSurface, force: bool) -> Result<()> {
        if self.caps.can_scroll {
            // Look for delete-shaped then insert-shaped shifts.
            self.try_scroll(surface, false)?;
            self.try_scroll(surface, true)?;
        }
        for row in 0..self.virt.rows() {
            if !self.virt.lines[row].changed {
                continue;
            }
            self.virt.lines[row].update_checksum();
            // Checksum equality is the cheap pre-test; the cell compare
            // guards against collisions before declaring the row clean.
            if !force
                && self.virt.lines[row].checksum() == self.phys.lines[row].checksum()
                && self.virt.lines[row].cells == self.phys.lines[row].cells
            {
                self.virt.lines[row].changed = false;
                self.counters.checksum_skips.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            self.update_line(surface, row)?;
        }
        Ok(())
    }

    /// Byte-level line update: common prefix/suffix skip, highlight-driven
    /// reverse toggling, erase-to-eol for blank tails.
    fn update_line(&mut self, surface: &mut dyn TerminalSurface, row: usize) -> Result<()> {
        let cols = self.virt.cols;
        let (virt, phys) = (&mut self.virt.lines[row], &mut self.phys.lines[row]);

        // Common prefix.
        let mut first = 0;
        while first < cols && virt.cells[first] == phys.cells[first] {
            first += 1;
        }
        if first == cols {
            virt.changed = false;
            return Ok(());
        }

        // Common suffix, noting whether it contains anything non-blank.
        let mut last = cols;
        let mut suffix_nonblank = false;
        while last > first && virt.cells[last - 1] == phys.cells[last - 1] {
            last -= 1;
            if virt.cells[last] != ' ' as u32 {
                suffix_nonblank = true;
            }
        }

        // Candidate erase point: trailing run of blanks inside the changed
        // span. Only profitable without non-blank suffix cells and when it
        // saves enough writes.
        let mut write_end = last;
        if self.caps.can_erase_eol && !suffix_nonblank {
            let mut erase_from = last;
            while erase_from > first && virt.cells[erase_from - 1] & !HIGHLIGHT_BIT == ' ' as u32
            {
                erase_from -= 1;
            }
            if last - erase_from > ERASE_MIN_SAVING {
                write_end = erase_from;
            }
        }

        surface.move_to(row as u16, first as u16)?;
        let mut reverse = false;
        for col in first..write_end {
            let cell = virt.cells[col];
            let highlighted = cell & HIGHLIGHT_BIT != 0;
            if highlighted != reverse && self.caps.can_reverse {
                reverse = highlighted;
                surface.set_reverse(reverse)?;
            }
            let ch = char::from_u32(cell & !HIGHLIGHT_BIT).unwrap_or('\u{FFFD}');
            surface.put_cell(ch, CellStyle::default())?;
            phys.cells[col] = cell;
            self.counters.cells_written.fetch_add(1, Ordering::Relaxed);
        }
        if reverse {
            surface.set_reverse(false)?;
        }
        if write_end < last {
            surface.erase_to_eol()?;
            for col in write_end..last {
                phys.cells[col] = virt.cells[col];
            }
            self.counters.erase_ops.fetch_add(1, Ordering::Relaxed);
        }
        virt.changed = false;
        phys.update_checksum();
        self.counters.lines_updated.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Detect a block of physical rows that reappears shifted in the virtual
    /// screen and emit a terminal scroll for it. `inserts` selects the
    /// direction (lines inserted above vs deleted).
    fn try_scroll(&mut self, surface: &mut dyn TerminalSurface, inserts: bool) -> Result<()> {
        let rows = self.virt.rows();
        let Some(first) = (0..rows).find(|&r| !self.cross_equal(r, r)) else {
            return Ok(());
        };

        let target = if inserts {
            let end = end_of_line(&self.virt.lines[first].cells);
            if end == 0 {
                first
            } else if self.phys.lines[first].cells[..end] == self.virt.lines[first].cells[..end] {
                first + 1
            } else {
                first
            }
        } else {
            first + 1
        };

        // Longest run of rows where physical content matches virtual content
        // shifted to `target`.
        let mut best_match = None;
        let mut best_count = 0;
        for candidate in (target + 1)..rows.saturating_sub(best_count) {
            let matched = if inserts {
                self.cross_equal(candidate, target)
            } else {
                self.cross_equal(target, candidate)
            };
            if matched {
                let mut count = 1;
                let (mut a, mut b) = (candidate + 1, target + 1);
                while a < rows && b < rows {
                    let step = if inserts {
                        self.cross_equal(a, b)
                    } else {
                        self.cross_equal(b, a)
                    };
                    if !step {
                        break;
                    }
                    count += 1;
                    a += 1;
                    b += 1;
                }
                if count > best_count {
                    best_count = count;
                    best_match = Some(candidate);
                }
            }
        }
        let Some(mut matched) = best_match else {
            return Ok(());
        };
        let mut count = best_count;
        let mut target = target;

        if !inserts
            && matched > 0
            && self.cross_equal(first, matched - 1)
        {
            target -= 1;
            matched -= 1;
            count += 1;
        }

        if count <= 2 {
            return Ok(());
        }
        let (from, to) = if inserts {
            (target, matched)
        } else {
            (matched, target)
        };
        // A scroll that moves further than twice the matched height loses.
        if 2 * count < from.abs_diff(to) {
            return Ok(());
        }

        trace!(target: "render.diff", from, to, count, inserts, "scroll_optimised");
        surface.scroll(from as u16, to as u16, count as u16)?;
        self.counters.scroll_hits.fetch_add(1, Ordering::Relaxed);

        // The scrolled band now matches the virtual screen.
        for i in 0..count {
            let row = to + i;
            let cells = self.virt.lines[row].cells.clone();
            self.phys.lines[row].cells = cells;
            self.phys.lines[row].update_checksum();
            self.virt.lines[row].changed = false;
        }
        // Rows the scroll blanked on screen are blank in the physical copy.
        let (blank_from, blank_to) = if inserts {
            (target, matched)
        } else {
            (target + count, matched + count)
        };
        for row in blank_from..blank_to.min(rows) {
            self.phys.lines[row].cells.fill(' ' as u32);
            self.phys.lines[row].update_checksum();
            self.virt.lines[row].changed = true;
        }
        Ok(())
    }

    /// Virtual row `vrow` equals physical row `prow`.
    fn cross_equal(&self, vrow: usize, prow: usize) -> bool {
        self.virt.lines[vrow].cells == self.phys.lines[prow].cells
    }
}

/// Index one past the last non-blank cell.
fn end_of_line(cells: &[u32]) -> usize {
    cells
        .iter()
        .rposition(|&c| c & !HIGHLIGHT_BIT != ' ' as u32)
        .map_or(0, |p| p + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_terminal::{MemorySurface, SurfaceOp};

    fn line(s: &str, cols: usize) -> Vec<u32> {
        let mut v: Vec<u32> = s.chars().map(|c| c as u32).collect();
        v.resize(cols, ' ' as u32);
        v
    }

    fn diff(rows: usize, cols: usize) -> (ScreenDiff, MemorySurface) {
        (
            ScreenDiff::new(rows, cols, Capabilities::default()),
            MemorySurface::new(rows as u16, cols as u16),
        )
    }

    #[test]
    fn initial_flush_paints_everything() {
        let (mut d, mut surf) = diff(3, 10);
        d.virt.set_line(0, &line("hello", 10));
        d.virt.set_line(1, &line("world", 10));
        d.flush_to(&mut surf, false).unwrap();
        assert_eq!(surf.row_text(0), "hello     ");
        assert_eq!(surf.row_text(1), "world     ");
    }

    #[test]
    fn unchanged_line_is_skipped_by_checksum() {
        let (mut d, mut surf) = diff(2, 10);
        d.virt.set_line(0, &line("same", 10));
        d.flush_to(&mut surf, false).unwrap();
        let writes = surf.put_count();
        // Re-flag the line without changing content.
        d.virt.lines[0].changed = true;
        d.flush_to(&mut surf, false).unwrap();
        assert_eq!(surf.put_count(), writes);
        assert!(d.counters.checksum_skips.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn middle_edit_writes_only_the_middle() {
        let (mut d, mut surf) = diff(1, 20);
        d.virt.set_line(0, &line("abcdefghij", 20));
        d.flush_to(&mut surf, false).unwrap();
        surf.ops.clear();
        d.virt.set_line(0, &line("abcXYfghij", 20));
        d.flush_to(&mut surf, false).unwrap();
        // Only the two differing cells get written.
        assert_eq!(surf.put_count(), 2);
        assert_eq!(surf.row_text(0)[..10], *"abcXYfghij");
    }

    #[test]
    fn blank_tail_uses_erase_to_eol() {
        let (mut d, mut surf) = diff(1, 40);
        d.virt.set_line(0, &line("a long line of text here", 40));
        d.flush_to(&mut surf, false).unwrap();
        surf.ops.clear();
        d.virt.set_line(0, &line("a", 40));
        d.flush_to(&mut surf, false).unwrap();
        assert!(surf.ops.contains(&SurfaceOp::EraseToEol));
        assert_eq!(surf.row_text(0).trim_end(), "a");
        // Physical copy agrees with virtual.
        assert_eq!(d.phys.lines[0].cells, d.virt.lines[0].cells);
    }

    #[test]
    fn highlight_transitions_toggle_reverse() {
        let (mut d, mut surf) = diff(1, 10);
        let mut cells = line("abcd", 10);
        cells[1] |= HIGHLIGHT_BIT;
        cells[2] |= HIGHLIGHT_BIT;
        d.virt.set_line(0, &cells);
        d.flush_to(&mut surf, false).unwrap();
        let toggles: Vec<bool> = surf
            .ops
            .iter()
            .filter_map(|op| match op {
                SurfaceOp::Reverse(v) => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(toggles, vec![true, false]);
        assert_eq!(surf.row_text(0)[..4], *"abcd");
    }

    #[test]
    fn shifted_block_becomes_a_scroll() {
        // Physical rows 5..=20 move up by one (delete-shaped shift).
        let rows = 24;
        let (mut d, mut surf) = diff(rows, 10);
        for r in 0..rows {
            d.virt.set_line(r, &line(&format!("line-{r:02}"), 10));
        }
        d.flush_to(&mut surf, false).unwrap();
        surf.ops.clear();
        // Copy rows 5..=20 to 4..=19 and blank row 20.
        for r in 4..20 {
            let src = d.virt.lines[r + 1].cells.clone();
            d.virt.set_line(r, &src);
        }
        d.virt.set_line(20, &line("", 10));
        d.flush_to(&mut surf, false).unwrap();
        let scrolls: Vec<_> = surf.scroll_ops().collect();
        assert_eq!(scrolls.len(), 1, "expected one scroll, ops: {scrolls:?}");
        assert_eq!(d.counters.scroll_hits.load(Ordering::Relaxed), 1);
        // Far fewer writes than repainting 17 rows.
        assert!(surf.put_count() < 20, "wrote {} cells", surf.put_count());
        // Physical equals virtual after commit.
        for r in 0..rows {
            assert_eq!(d.phys.lines[r].cells, d.virt.lines[r].cells, "row {r}");
        }
    }

    #[test]
    fn long_distance_scroll_is_rejected() {
        let rows = 24;
        let (mut d, mut surf) = diff(rows, 10);
        for r in 0..rows {
            d.virt.set_line(r, &line(&format!("row{r:02}"), 10));
        }
        d.flush_to(&mut surf, false).unwrap();
        surf.ops.clear();
        // Move a 3-row block 20 rows up: distance 20 > 2 * 3.
        for r in 0..3 {
            let src = d.virt.lines[r + 20].cells.clone();
            d.virt.set_line(r, &src);
        }
        for r in 20..23 {
            d.virt.set_line(r, &line("", 10));
        }
        d.flush_to(&mut surf, false).unwrap();
        assert_eq!(surf.scroll_ops().count(), 0);
    }

    #[test]
    fn fnv_checksum_is_order_sensitive() {
        let a = fnv1a(&['a' as u32, 'b' as u32]);
        let b = fnv1a(&['b' as u32, 'a' as u32]);
        assert_ne!(a, b);
    }
}
