//! Text-changing commands.

use core_events::{Key, Result, Status};
use core_model::WindowFlags;
use core_state::Position;
use core_text::width;

use super::{delete_at_dot, insert_at_dot, start_or_continue_kill};
use crate::Editor;

/// Encode a key's codepoint as the bytes to insert: raw byte for byte-range
/// codes (the decoder hands UTF-8 through byte by byte), UTF-8 encoding for
/// anything larger (scripted inserts).
fn key_bytes(key: Key) -> Vec<u8> {
    let code = key.code();
    if code < 0x100 {
        vec![code as u8]
    } else {
        char::from_u32(code)
            .map(|c| c.to_string().into_bytes())
            .unwrap_or_default()
    }
}

/// Insert a printable key at the dot, `n` times.
pub(crate) fn self_insert(ed: &mut Editor, key: Key, n: i64) -> Result<()> {
    let bytes = key_bytes(key);
    if bytes.is_empty() {
        return Err(Status::InvalidArgument);
    }
    for _ in 0..n.max(1) {
        insert_at_dot(ed, &bytes)?;
    }
    Ok(())
}

/// Paste-content insertion: any byte goes in literally, carriage returns
/// normalise to newlines.
pub(crate) fn insert_literal(ed: &mut Editor, key: Key) -> Result<bool> {
    let code = key.code();
    let byte = if code == '\r' as u32 {
        b'\n'
    } else {
        (code & 0xFF) as u8
    };
    insert_at_dot(ed, &[byte])?;
    Ok(true)
}

pub fn newline(ed: &mut Editor, _f: bool, n: i64) -> Result<bool> {
    for _ in 0..n.max(1) {
        insert_at_dot(ed, b"\n")?;
    }
    Ok(true)
}

pub fn delete_next_character(ed: &mut Editor, f: bool, n: i64) -> Result<bool> {
    if n < 0 {
        return delete_previous_character(ed, f, -n);
    }
    for _ in 0..n.max(1) {
        let (line_len, line_text, dot) = current_line(ed)?;
        if dot.col >= line_len {
            // At end of line: the next byte is the newline (merge), or end
            // of buffer.
            if delete_at_dot(ed, 1, false).is_err() {
                break;
            }
        } else {
            let next = width::next_boundary(&line_text, dot.col);
            delete_at_dot(ed, next - dot.col, false)?;
        }
    }
    Ok(true)
}

pub fn delete_previous_character(ed: &mut Editor, f: bool, n: i64) -> Result<bool> {
    if n < 0 {
        return delete_next_character(ed, f, -n);
    }
    for _ in 0..n.max(1) {
        let dot = ed.windows.current().dot;
        if dot.col == 0 {
            if dot.line == 0 {
                break;
            }
            // Join with the previous line: dot onto its trailing newline.
            let prev_len = {
                let id = ed.current_buffer_id();
                ed.buffers.get_mut(id)?.line_len(dot.line - 1)
            };
            ed.windows.current_mut().dot = Position::new(dot.line - 1, prev_len);
            delete_at_dot(ed, 1, false)?;
        } else {
            let (_, line_text, _) = current_line(ed)?;
            let prev = width::prev_boundary(&line_text, dot.col);
            ed.windows.current_mut().dot = Position::new(dot.line, prev);
            delete_at_dot(ed, dot.col - prev, false)?;
        }
    }
    Ok(true)
}

/// M-d: kill from the dot through the end of the next word.
pub fn delete_next_word(ed: &mut Editor, _f: bool, n: i64) -> Result<bool> {
    fn in_word(b: u8) -> bool {
        b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
    }
    for _ in 0..n.max(1) {
        let (buf_id, dot) = {
            let w = ed.windows.current();
            (w.buffer, w.dot)
        };
        let span = {
            let buf = ed.buffers.get_mut(buf_id)?;
            let start = buf.pos_to_offset(dot)?;
            let len = buf.len();
            let mut offset = start;
            while offset < len && !buf.text().get_char(offset).is_some_and(in_word) {
                offset += 1;
            }
            while offset < len && buf.text().get_char(offset).is_some_and(in_word) {
                offset += 1;
            }
            offset - start
        };
        if span == 0 {
            break;
        }
        delete_at_dot(ed, span, true)?;
    }
    Ok(true)
}

/// Kill from the dot to the end of line; at end of line, kill the newline.
/// Consecutive kills append into one ring slot.
pub fn kill_to_end_of_line(ed: &mut Editor, _f: bool, n: i64) -> Result<bool> {
    for _ in 0..n.max(1) {
        let (line_len, _, dot) = current_line(ed)?;
        let span = if dot.col < line_len {
            line_len - dot.col
        } else {
            1 // the newline
        };
        if delete_at_dot(ed, span, true).is_err() {
            break;
        }
    }
    Ok(true)
}

pub fn yank(ed: &mut Editor, _f: bool, n: i64) -> Result<bool> {
    let text = ed.kill_ring.yank().to_vec();
    if text.is_empty() {
        return Err(Status::NotFound);
    }
    for _ in 0..n.max(1) {
        insert_at_dot(ed, &text)?;
    }
    Ok(true)
}

/// Step back through the kill ring and yank that slot instead.
pub fn yank_pop(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    let text = ed.kill_ring.yank_pop().to_vec();
    if text.is_empty() {
        return Err(Status::NotFound);
    }
    insert_at_dot(ed, &text)?;
    Ok(true)
}

/// Yank from the system clipboard collaborator; failure is a plain
/// not-found, never fatal.
pub fn yank_clipboard(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    let Some(text) = ed.clipboard.get() else {
        return Err(Status::NotFound);
    };
    insert_at_dot(ed, &text)?;
    Ok(true)
}

pub fn undo(ed: &mut Editor, _f: bool, n: i64) -> Result<bool> {
    let id = ed.current_buffer_id();
    let mut moved = None;
    for _ in 0..n.max(1) {
        match ed.buffers.get_mut(id)?.undo()? {
            Some(dot) => moved = Some(dot),
            None => break,
        }
    }
    finish_history_move(ed, moved, "Undo")
}

pub fn redo(ed: &mut Editor, _f: bool, n: i64) -> Result<bool> {
    let id = ed.current_buffer_id();
    let mut moved = None;
    for _ in 0..n.max(1) {
        match ed.buffers.get_mut(id)?.redo()? {
            Some(dot) => moved = Some(dot),
            None => break,
        }
    }
    finish_history_move(ed, moved, "Redo")
}

fn finish_history_move(ed: &mut Editor, moved: Option<Position>, verb: &str) -> Result<bool> {
    let Some(dot) = moved else {
        ed.set_message(format!("({verb}: nothing to do)"));
        return Ok(false);
    };
    // Undo replays bypass the per-edit window fixups, so every window on
    // this buffer gets its positions clamped and a full repaint.
    let id = ed.current_buffer_id();
    let (last_line, dot) = {
        let buf = ed.buffers.get_mut(id)?;
        let last = buf.line_count().saturating_sub(1);
        let line = dot.line.min(last);
        (last, Position::new(line, dot.col.min(buf.line_len(line))))
    };
    let watching: Vec<_> = ed.windows.watching(id).to_vec();
    for wid in watching {
        let clamped_len = {
            let buf = ed.buffers.get_mut(id)?;
            let Some(w) = ed.windows.get(wid) else { continue };
            let line = w.dot.line.min(last_line);
            (line, buf.line_len(line))
        };
        if let Some(w) = ed.windows.get_mut(wid) {
            w.dot = Position::new(clamped_len.0, w.dot.col.min(clamped_len.1));
            w.mark = None;
            w.top_line = w.top_line.min(last_line);
            w.flags |= WindowFlags::HARD | WindowFlags::MODE;
        }
    }
    ed.windows.current_mut().dot = dot;
    Ok(true)
}

/// C-g: drop any pending prefix and kill chain.
pub fn abort_command(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    ed.pending_map = None;
    ed.kill_chaining = false;
    ed.set_message("(Aborted)");
    Ok(false)
}

/// Line length, line text, and dot of the current window.
fn current_line(ed: &mut Editor) -> Result<(usize, String, Position)> {
    let (buf_id, dot) = {
        let w = ed.windows.current();
        (w.buffer, w.dot)
    };
    let buf = ed.buffers.get_mut(buf_id)?;
    let bytes = buf.line_bytes(dot.line);
    Ok((
        bytes.len(),
        String::from_utf8_lossy(&bytes).into_owned(),
        dot,
    ))
}
