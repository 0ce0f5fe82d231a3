//! Region commands: the span between mark and dot.

use core_events::{Result, Status};
use core_model::WindowFlags;
use core_state::Position;

use super::{delete_at_dot, start_or_continue_kill};
use crate::Editor;

/// Region bounds in buffer coordinates: (start position, byte length).
/// Fails when no mark is set.
fn region(ed: &mut Editor) -> Result<(Position, usize)> {
    let (buf_id, dot, mark) = {
        let w = ed.windows.current();
        (w.buffer, w.dot, w.mark.ok_or(Status::NotFound)?)
    };
    let buf = ed.buffers.get_mut(buf_id)?;
    let dot_off = buf.pos_to_offset(dot)?;
    let mark_off = buf.pos_to_offset(mark)?;
    let (start, len) = if dot_off <= mark_off {
        (dot, mark_off - dot_off)
    } else {
        (mark, dot_off - mark_off)
    };
    Ok((start, len))
}

/// C-w: delete the region into the kill ring.
pub fn kill_region(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    let (start, len) = region(ed)?;
    if len == 0 {
        return Err(Status::Range);
    }
    ed.windows.current_mut().dot = start;
    delete_at_dot(ed, len, true)?;
    ed.windows.current_mut().mark = None;
    Ok(true)
}

/// M-w: copy the region into the kill ring without deleting it.
pub fn copy_region(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    let (start, len) = region(ed)?;
    if len == 0 {
        return Err(Status::Range);
    }
    let buf_id = ed.current_buffer_id();
    let text = {
        let buf = ed.buffers.get_mut(buf_id)?;
        let offset = buf.pos_to_offset(start)?;
        buf.text().slice_to_vec(offset, len)
    };
    start_or_continue_kill(ed);
    ed.kill_ring.append(&text);
    let _ = ed.clipboard.set(ed.kill_ring.yank());
    ed.set_message(format!("(Copied {len} bytes)"));
    Ok(true)
}

/// C-x C-x: swap dot and mark.
pub fn exchange_dot_and_mark(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    let w = ed.windows.current_mut();
    let Some(mark) = w.mark else {
        return Err(Status::NotFound);
    };
    w.mark = Some(w.dot);
    w.dot = mark;
    w.flags |= WindowFlags::MOVE | WindowFlags::MODE;
    Ok(true)
}
