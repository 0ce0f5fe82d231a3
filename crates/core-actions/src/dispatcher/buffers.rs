//! Buffer, window, and file commands.

use tracing::info;

use core_events::{Result, Status};
use core_model::WindowFlags;
use core_state::BufferFlags;

use crate::Editor;

/// Cycle the current window to the next buffer in name order.
pub fn next_buffer(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    let current = ed.current_buffer_id();
    let ordered: Vec<_> = ed.buffers.ordered().collect();
    if ordered.len() < 2 {
        return Err(Status::BufferInvalid);
    }
    let idx = ordered.iter().position(|&id| id == current).unwrap_or(0);
    let next = ordered[(idx + 1) % ordered.len()];
    switch_to(ed, next)
}

/// Point the current window at `id`, snapshotting dot/mark into the old
/// buffer header and restoring the new buffer's remembered position.
pub(crate) fn switch_to(ed: &mut Editor, id: core_state::BufferId) -> Result<bool> {
    let snapshot = {
        let w = ed.windows.current();
        (w.dot, w.mark)
    };
    let outcome = ed.buffers.switch(id, Some(snapshot))?;
    ed.windows.retarget_current(id);
    let (dot, mark) = {
        let buf = ed.buffers.get(id)?;
        (buf.dot, buf.mark)
    };
    {
        let w = ed.windows.current_mut();
        w.dot = dot;
        w.mark = mark;
        w.flags |= WindowFlags::HARD | WindowFlags::MODE;
    }
    if outcome.needs_read_in {
        read_in_current(ed)?;
    }
    Ok(true)
}

/// Read the buffer's file through the collaborator, line by line.
fn read_in_current(ed: &mut Editor) -> Result<()> {
    let id = ed.current_buffer_id();
    let path = ed.buffers.get(id)?.filename.clone();
    if path.is_empty() {
        return Ok(());
    }
    ed.file_io.open_read(&path)?;
    let mut content = Vec::new();
    let mut lines = 0usize;
    while let Some(line) = ed.file_io.read_line()? {
        content.extend_from_slice(&line);
        content.push(b'\n');
        lines += 1;
    }
    ed.file_io.close()?;
    content.pop(); // final newline is an artifact of the join
    let buf = ed.buffers.get_mut(id)?;
    buf.clear();
    buf.insert_at(core_state::Position::origin(), &content)?;
    buf.mark_saved();
    buf.active = true;
    info!(target: "actions.dispatch", lines, "file_read");
    ed.set_message(format!("(Read {lines} lines)"));
    Ok(())
}

/// Kill the current buffer after moving the window to another one. A lone
/// displayed buffer cannot be killed.
pub fn kill_buffer(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    let victim = ed.current_buffer_id();
    let ordered: Vec<_> = ed.buffers.ordered().collect();
    if ordered.len() < 2 {
        return Err(Status::Error);
    }
    let idx = ordered.iter().position(|&id| id == victim).unwrap_or(0);
    let fallback = ordered[(idx + 1) % ordered.len()];
    switch_to(ed, fallback)?;
    ed.buffers.kill(victim)?;
    Ok(true)
}

/// Write the current buffer out through the file collaborator and stamp the
/// saved baseline.
pub fn save_file(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    let id = ed.current_buffer_id();
    let (path, line_count) = {
        let buf = ed.buffers.get_mut(id)?;
        let path = if buf.filename.is_empty() {
            buf.name.clone()
        } else {
            buf.filename.clone()
        };
        (path, buf.line_count())
    };
    ed.file_io.open_write(&path)?;
    for line in 0..line_count {
        let bytes = ed.buffers.get_mut(id)?.line_bytes(line);
        ed.file_io.write_line(&bytes)?;
    }
    ed.file_io.close()?;
    let buf = ed.buffers.get_mut(id)?;
    buf.mark_saved();
    ed.windows.current_mut().flags |= WindowFlags::MODE;
    ed.set_message(format!("(Wrote {line_count} lines)"));
    Ok(true)
}

pub fn split_window(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    let buffer = ed.current_buffer_id();
    if ed.windows.split_current().is_none() {
        return Err(Status::Error);
    }
    if let Ok(buf) = ed.buffers.get_mut(buffer) {
        buf.window_count += 1;
    }
    Ok(true)
}

pub fn only_window(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    // Buffers shown only in the dropped windows lose their display count.
    let keep = ed.windows.current_id();
    let dropped: Vec<_> = ed
        .windows
        .iter()
        .filter(|w| w.id != keep)
        .map(|w| w.buffer)
        .collect();
    for buffer in dropped {
        if let Ok(buf) = ed.buffers.get_mut(buffer) {
            buf.window_count = buf.window_count.saturating_sub(1);
        }
    }
    let rows = ed.renderer.matrix.rows().saturating_sub(1);
    ed.windows.only_current(rows);
    Ok(true)
}

pub fn next_window(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    ed.windows.next_window();
    ed.windows.current_mut().flags |= WindowFlags::MODE;
    Ok(true)
}

/// Quit, refusing while modified buffers exist unless forced with a prefix.
pub fn quit(ed: &mut Editor, f: bool, _n: i64) -> Result<bool> {
    let modified = ed
        .buffers
        .ordered()
        .filter_map(|id| ed.buffers.get(id).ok())
        .filter(|b| b.is_changed() && !b.flags.contains(BufferFlags::INVISIBLE))
        .count();
    if modified > 0 && !f {
        ed.set_message(format!("{modified} modified buffer(s) exist"));
        return Ok(false);
    }
    ed.quit_requested = true;
    Ok(true)
}

pub fn refresh_screen(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    ed.renderer.matrix.mark_all_dirty();
    for w in ed.windows.iter_mut() {
        w.flags |= WindowFlags::HARD | WindowFlags::MODE;
    }
    Ok(true)
}

/// C-x C-b: build the buffer listing into an invisible view buffer and show
/// it in the current window.
pub fn list_buffers(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    let rows: Vec<String> = ed
        .buffers
        .ordered()
        .filter_map(|id| ed.buffers.get(id).ok())
        .filter(|b| !b.flags.contains(BufferFlags::INVISIBLE))
        .map(|b| {
            let (lines, bytes, _) = b.statistics();
            let changed = if b.is_changed() { '*' } else { ' ' };
            format!("{changed} {:<20} {lines:>6} lines {bytes:>8} bytes", b.name)
        })
        .collect();
    let mut listing = String::from("  Buffer               Lines          Size\n");
    listing.push_str("  ------               -----          ----\n");
    for row in &rows {
        listing.push_str(row);
        listing.push('\n');
    }

    let id = ed
        .buffers
        .find("*buffers*", true, BufferFlags::INVISIBLE)?;
    ed.apply_undo_config(id);
    {
        let buf = ed.buffers.get_mut(id)?;
        buf.modes.remove(core_state::ModeFlags::VIEW);
        buf.clear();
        buf.insert_at(core_state::Position::origin(), listing.as_bytes())?;
        buf.mark_saved();
        buf.modes.insert(core_state::ModeFlags::VIEW);
    }
    switch_to(ed, id)
}

/// C-x =: report cursor position and cached statistics on the message line.
pub fn buffer_position(ed: &mut Editor, _f: bool, _n: i64) -> Result<bool> {
    let (buf_id, dot) = {
        let w = ed.windows.current();
        (w.buffer, w.dot)
    };
    let (line, col, offset, len, lines, words) = {
        let buf = ed.buffers.get_mut(buf_id)?;
        let offset = buf.pos_to_offset(dot).unwrap_or(0);
        let (lines, bytes, words) = buf.statistics();
        let col = buf.char_col(dot);
        (dot.line + 1, col + 1, offset, bytes, lines, words)
    };
    ed.set_message(format!(
        "Line {line}/{lines} Col {col} Byte {offset}/{len} Words {words}"
    ));
    Ok(true)
}
