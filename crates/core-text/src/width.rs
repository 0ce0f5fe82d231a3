//! Display-width computation for buffer lines.
//!
//! Columns are terminal cells: tabs expand to the next tab stop, C0 control
//! bytes render as `^X` (two cells), and everything else is measured with
//! `unicode-width` over grapheme clusters so combining marks do not widen the
//! line.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Width in cells of one grapheme cluster (minimum 1 for anything visible).
pub fn cluster_width(g: &str) -> usize {
    UnicodeWidthStr::width(g).max(1)
}

/// Display column of byte offset `byte` within `line` (no trailing newline),
/// with tabs expanded to `tab_width` stops. Invalid UTF-8 bytes count one
/// cell each (they render as U+FFFD).
pub fn display_column(line: &[u8], byte: usize, tab_width: usize) -> usize {
    let byte = byte.min(line.len());
    let tab = tab_width.max(1);
    let mut col = 0;
    let mut i = 0;
    while i < byte {
        match line[i] {
            b'\t' => {
                col += tab - (col % tab);
                i += 1;
            }
            b if b < 0x20 => {
                col += 2; // ^X
                i += 1;
            }
            b if b < 0x80 => {
                col += 1;
                i += 1;
            }
            _ => {
                // Decode one UTF-8 sequence; fall back to a single replacement
                // cell on invalid input.
                let rest = &line[i..byte.max(i + 1).min(line.len())];
                match next_sequence(rest) {
                    Some((s, len)) => {
                        col += UnicodeWidthStr::width(s);
                        i += len;
                    }
                    None => {
                        col += 1;
                        i += 1;
                    }
                }
            }
        }
    }
    col
}

/// Total display width of a full line.
pub fn line_width(line: &[u8], tab_width: usize) -> usize {
    display_column(line, line.len(), tab_width)
}

/// Grapheme-cluster boundaries of a valid UTF-8 line, for cursor motion.
pub fn next_boundary(line: &str, byte: usize) -> usize {
    if byte >= line.len() {
        return line.len();
    }
    for (idx, _) in line.grapheme_indices(true) {
        if idx > byte {
            return idx;
        }
    }
    line.len()
}

pub fn prev_boundary(line: &str, byte: usize) -> usize {
    if byte == 0 || byte > line.len() {
        return 0;
    }
    let mut last = 0;
    for (idx, _) in line.grapheme_indices(true) {
        if idx >= byte {
            break;
        }
        last = idx;
    }
    last
}

fn next_sequence(bytes: &[u8]) -> Option<(&str, usize)> {
    let len = match bytes.first()? {
        b if b & 0xE0 == 0xC0 => 2,
        b if b & 0xF0 == 0xE0 => 3,
        b if b & 0xF8 == 0xF0 => 4,
        _ => return None,
    };
    let seq = bytes.get(..len)?;
    std::str::from_utf8(seq).ok().map(|s| (s, len))
}
