//! Dot motion commands. Motions never touch buffer text; they move the
//! current window's dot on grapheme boundaries and flag the window MOVE.

use core_events::Result;
use core_model::WindowFlags;
use core_state::Position;
use core_text::width;

use crate::Editor;

fn mark_moved(ed: &mut Editor) {
    let w = ed.windows.current_mut();
    w.flags |= WindowFlags::MOVE | WindowFlags::MODE;
}

fn line_text(ed: &mut Editor, line: usize) -> Result<String> {
    let id = ed.current_buffer_id();
    let buf = ed.buffers.get_mut(id)?;
    Ok(String::from_utf8_lossy(&buf.line_bytes(line)).into_owned())
}

fn line_len(ed: &mut Editor, line: usize) -> Result<usize> {
    let id = ed.current_buffer_id();
    Ok(ed.buffers.get_mut(id)?.line_len(line))
}

fn last_line(ed: &mut Editor) -> Result<usize> {
    let id = ed.current_buffer_id();
    Ok(ed.buffers.get_mut(id)?.line_count().saturating_sub(1))
}

pub fn forward_character(ed: &mut Editor, f: bool, n: i64) -> Result<bool> {
    if n < 0 {
        return backward_character(ed, f, -n);
    }
    for _ in 0..n.max(1) {
        let dot = ed.windows.current().dot;
        let text = line_text(ed, dot.line)?;
        if dot.col < text.len() {
            ed.windows.current_mut().dot.col = width::next_boundary(&text, dot.col);
        } else if dot.line < last_line(ed)? {
            ed.windows.current_mut().dot = Position::new(dot.line + 1, 0);
        } else {
            break;
        }
    }
    mark_moved(ed);
    Ok(true)
}

pub fn backward_character(ed: &mut Editor, f: bool, n: i64) -> Result<bool> {
    if n < 0 {
        return forward_character(ed, f, -n);
    }
    for _ in 0..n.max(1) {
        let dot = ed.windows.current().dot;
        if dot.col > 0 {
            let text = line_text(ed, dot.line)?;
            ed.windows.current_mut().dot.col = width::prev_boundary(&text, dot.col);
        } else if dot.line > 0 {
            let len = line_len(ed, dot.line - 1)?;
            ed.windows.current_mut().dot = Position::new(dot.line - 1, len);
        } else {
            break;
        }
    }
    mark_moved(ed);
    Ok(true)
}

pub fn next_line(ed: &mut Editor, f: bool, n: i64) -> Result<bool> {
    if n < 0 {
        return previous_line(ed, f, -n);
    }
    let last = last_line(ed)?;
    let dot = ed.windows.current().dot;
    let line = (dot.line + n.max(1) as usize).min(last);
    let col = dot.col.min(line_len(ed, line)?);
    ed.windows.current_mut().dot = Position::new(line, col);
    mark_moved(ed);
    Ok(true)
}

pub fn previous_line(ed: &mut Editor, f: bool, n: i64) -> Result<bool> {
    if n < 0 {
        return next_line(ed, f, -n);
    }
    let dot = ed.windows.current().dot;
    let line = dot.line.saturating_sub(n.max(1) as usize);
    let col = dot.col.min(line_len(ed, line)?);
    ed.windows.current_mut().dot = Position::new(line, col);
    mark_moved(ed);
    Ok(true)
}

pub fn beginning_of_line(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    ed.windows.current_mut().dot.col = 0;
    mark_moved(ed);
    Ok(true)
}

pub fn end_of_line(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    let line = ed.windows.current().dot.line;
    let len = line_len(ed, line)?;
    ed.windows.current_mut().dot.col = len;
    mark_moved(ed);
    Ok(true)
}

pub fn beginning_of_file(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    ed.windows.current_mut().dot = Position::origin();
    mark_moved(ed);
    Ok(true)
}

pub fn end_of_file(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    let line = last_line(ed)?;
    let len = line_len(ed, line)?;
    ed.windows.current_mut().dot = Position::new(line, len);
    mark_moved(ed);
    Ok(true)
}

/// Drop the mark at the dot; with dot it delimits the region.
pub fn set_mark(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    let dot = ed.windows.current().dot;
    ed.windows.current_mut().mark = Some(dot);
    ed.set_message("(Mark set)");
    Ok(true)
}

/// Word bytes for word motion: alphanumerics, underscore, and anything
/// beyond ASCII (multi-byte sequences stay inside one word).
fn in_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// Absolute dot offset plus buffer length.
fn dot_offset(ed: &mut Editor) -> Result<(usize, usize)> {
    let (buf_id, dot) = {
        let w = ed.windows.current();
        (w.buffer, w.dot)
    };
    let buf = ed.buffers.get_mut(buf_id)?;
    Ok((buf.pos_to_offset(dot)?, buf.len()))
}

fn move_dot_to_offset(ed: &mut Editor, offset: usize) -> Result<()> {
    let buf_id = ed.current_buffer_id();
    let pos = ed.buffers.get_mut(buf_id)?.offset_to_pos(offset);
    ed.windows.current_mut().dot = pos;
    Ok(())
}

pub fn forward_word(ed: &mut Editor, f: bool, n: i64) -> Result<bool> {
    if n < 0 {
        return backward_word(ed, f, -n);
    }
    let buf_id = ed.current_buffer_id();
    for _ in 0..n.max(1) {
        let (mut offset, len) = dot_offset(ed)?;
        let buf = ed.buffers.get_mut(buf_id)?;
        while offset < len && !buf.text().get_char(offset).is_some_and(in_word) {
            offset += 1;
        }
        while offset < len && buf.text().get_char(offset).is_some_and(in_word) {
            offset += 1;
        }
        move_dot_to_offset(ed, offset)?;
    }
    mark_moved(ed);
    Ok(true)
}

pub fn backward_word(ed: &mut Editor, f: bool, n: i64) -> Result<bool> {
    if n < 0 {
        return forward_word(ed, f, -n);
    }
    let buf_id = ed.current_buffer_id();
    for _ in 0..n.max(1) {
        let (mut offset, _) = dot_offset(ed)?;
        let buf = ed.buffers.get_mut(buf_id)?;
        while offset > 0 && !buf.text().get_char(offset - 1).is_some_and(in_word) {
            offset -= 1;
        }
        while offset > 0 && buf.text().get_char(offset - 1).is_some_and(in_word) {
            offset -= 1;
        }
        move_dot_to_offset(ed, offset)?;
    }
    mark_moved(ed);
    Ok(true)
}

/// Jump to line `n` (1-based), clamped to the buffer.
pub fn goto_line(ed: &mut Editor, _f: bool, n: i64) -> Result<bool> {
    let target = (n.max(1) as usize).saturating_sub(1);
    let line = target.min(last_line(ed)?);
    ed.windows.current_mut().dot = Position::new(line, 0);
    mark_moved(ed);
    Ok(true)
}
