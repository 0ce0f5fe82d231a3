//! Search commands over the active pattern.
//!
//! The interactive prompt lives with the message-line collaborator; the core
//! commands search for `Editor::search_pattern`. Case sensitivity follows
//! the buffer's Exact mode, falling back to the configured default fold.

use core_events::{Result, Status};
use core_model::WindowFlags;
use core_state::ModeFlags;

use crate::Editor;

fn case_sensitive(ed: &Editor) -> bool {
    let exact = ed
        .buffers
        .current()
        .map(|b| b.modes.contains(ModeFlags::EXACT))
        .unwrap_or(false);
    exact || !ed.config.file.search.case_fold
}

/// Find the next occurrence after the dot; dot lands just past the match.
pub fn search_forward(ed: &mut Editor, f: bool, n: i64) -> Result<bool> {
    if n < 0 {
        return search_reverse(ed, f, -n);
    }
    if ed.search_pattern.is_empty() {
        return Err(Status::InvalidArgument);
    }
    let pattern = ed.search_pattern.clone();
    let sensitive = case_sensitive(ed);
    let buf_id = ed.current_buffer_id();
    for _ in 0..n.max(1) {
        let buf = ed.buffers.get_mut(buf_id)?;
        let start = buf.pos_to_offset(ed.windows.current().dot)?;
        let hit = buf
            .text()
            .search_forward(start.saturating_add(1).min(buf.len()), &pattern, sensitive)?;
        match hit {
            Some(offset) => {
                let end = offset + pattern.len();
                let pos = ed.buffers.get_mut(buf_id)?.offset_to_pos(end);
                let w = ed.windows.current_mut();
                w.dot = pos;
                w.flags |= WindowFlags::MOVE | WindowFlags::MODE;
            }
            None => return Err(Status::NotFound),
        }
    }
    Ok(true)
}

/// Find the previous occurrence ending before the dot; dot lands on the
/// match start.
pub fn search_reverse(ed: &mut Editor, f: bool, n: i64) -> Result<bool> {
    if n < 0 {
        return search_forward(ed, f, -n);
    }
    if ed.search_pattern.is_empty() {
        return Err(Status::InvalidArgument);
    }
    let pattern = ed.search_pattern.clone();
    let sensitive = case_sensitive(ed);
    let buf_id = ed.current_buffer_id();
    for _ in 0..n.max(1) {
        let buf = ed.buffers.get_mut(buf_id)?;
        let start = buf.pos_to_offset(ed.windows.current().dot)?;
        let hit = buf
            .text()
            .search_reverse(start.saturating_sub(1), &pattern, sensitive)?;
        match hit {
            Some(offset) => {
                let pos = ed.buffers.get_mut(buf_id)?.offset_to_pos(offset);
                let w = ed.windows.current_mut();
                w.dot = pos;
                w.flags |= WindowFlags::MOVE | WindowFlags::MODE;
            }
            None => return Err(Status::NotFound),
        }
    }
    Ok(true)
}
