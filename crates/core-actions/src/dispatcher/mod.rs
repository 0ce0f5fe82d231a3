//! Key dispatch: token → keymap resolution → hook wrap → command.
//!
//! Prefix keys (C-x, ESC, C-h) park the resolver in a child map until the
//! next token arrives. Unbound printable keys fall through to self-insert;
//! unbound everything-else reports on the message line and keeps the editor
//! running. Command failures never propagate past the dispatcher: the status
//! becomes a one-line message.

use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, trace};

use core_events::{COMMANDS_DISPATCHED, InputToken, Key, Result, Status};
use core_keymap::{Binding, CommandId};
use core_model::EditSpan;

use crate::hooks::{HookContext, HookResult};
use crate::Editor;

pub mod buffers;
pub mod edit;
pub mod motion;
pub mod region;
pub mod search;

/// Printable keys self-insert when nothing is bound to them. Multi-byte
/// UTF-8 arrives one byte at a time, so continuation bytes qualify too.
fn is_self_insert(key: Key) -> bool {
    !key.has_control() && !key.has_meta() && !key.is_special() && {
        let code = key.code();
        (0x20..0x7F).contains(&code) || (0x80..0x100).contains(&code)
    }
}

pub fn dispatch_token(ed: &mut Editor, token: InputToken) -> Result<bool> {
    if token.from_paste {
        // Paste content bypasses keymaps entirely and is never recorded as
        // keystrokes; it inserts literally (newlines included).
        return match edit::insert_literal(ed, token.key) {
            Ok(done) => Ok(done),
            Err(status) => {
                ed.set_message(status.to_string());
                Ok(false)
            }
        };
    }
    let pending = ed.pending_map.take();
    // Metafied tokens (the decoder folds ESC+char into one code) route
    // straight into the Meta map; bare ESC still walks the prefix binding
    // in global. Letters after a prefix are upcased, matching how the
    // historical key table is spelled.
    let (map, key, plain) = if let Some(map) = pending {
        (map, upcase_letter(token.key), false)
    } else if token.key.has_meta() && !token.key.is_special() {
        (
            ed.keymaps.meta(),
            upcase_letter(Key(token.key.0 & !core_events::key::META)),
            false,
        )
    } else {
        (ed.keymaps.global(), token.key, true)
    };
    trace!(target: "actions.dispatch", key = %key, plain, "token");
    match ed.keymaps.lookup_chain(map, key) {
        Some(Binding::Prefix(child)) => {
            ed.pending_map = Some(child);
            Ok(true)
        }
        Some(Binding::Command(id)) => match execute_command(ed, id, false, 1) {
            Ok(done) => Ok(done),
            Err(status) => {
                ed.set_message(status.to_string());
                Ok(false)
            }
        },
        None if plain && is_self_insert(key) => match edit::self_insert(ed, key, 1) {
            Ok(()) => Ok(true),
            Err(status) => {
                ed.set_message(status.to_string());
                Ok(false)
            }
        },
        None => {
            ed.set_message("(Key not bound)");
            Ok(false)
        }
    }
}

/// Upcase a plain ASCII letter code, keeping any modifier bits.
fn upcase_letter(key: Key) -> Key {
    let code = key.code();
    if (0x61..=0x7A).contains(&code) {
        Key(key.0 - 0x20)
    } else {
        key
    }
}

/// Run one command wrapped in the hook chains, with state capture before and
/// change detection after.
pub fn execute_command(
    ed: &mut Editor,
    id: CommandId,
    prefix: bool,
    count: i64,
) -> Result<bool> {
    let (name, f) = ed.registry.get(id).ok_or(Status::CommandUnknown)?;
    let buffer_id = ed.current_buffer_id();
    let window_before = ed.windows.current_id();
    let mut ctx = HookContext {
        command: id,
        name,
        prefix,
        count,
        buffer: Some(buffer_id),
        window: window_before,
        started: Instant::now(),
        ended: None,
        buffer_changed: false,
        window_changed: false,
        failed: false,
    };
    match ed.hooks.run_pre(&ctx) {
        HookResult::Handled => return Ok(true),
        HookResult::Abort => return Ok(false),
        _ => {}
    }

    COMMANDS_DISPATCHED.fetch_add(1, Ordering::Relaxed);
    let result = f(ed, prefix, count);

    ctx.ended = Some(Instant::now());
    ctx.buffer_changed = ed
        .buffers
        .get(buffer_id)
        .map(|b| b.is_changed())
        .unwrap_or(false);
    ctx.window_changed = ed.windows.current_id() != window_before;
    ctx.failed = !matches!(result, Ok(true));
    if result.is_err() {
        ed.hooks.run_error(&ctx);
    }
    ed.hooks.run_post(&ctx);

    // A non-kill command breaks the kill chain so the next kill starts a
    // fresh ring slot.
    if !name.contains("kill") {
        ed.kill_chaining = false;
    }
    debug!(target: "actions.dispatch", command = name, ok = !ctx.failed, "executed");
    result
}

// -------------------------------------------------------------------------------------------------
// Shared edit plumbing
// -------------------------------------------------------------------------------------------------

/// Insert at the current window's dot, renumbering every watching window.
pub(crate) fn insert_at_dot(ed: &mut Editor, bytes: &[u8]) -> Result<()> {
    let (buf_id, dot) = {
        let w = ed.windows.current();
        (w.buffer, w.dot)
    };
    ed.buffers.get_mut(buf_id)?.insert_at(dot, bytes)?;
    ed.windows
        .adjust_after_insert(buf_id, EditSpan::from_text(dot, bytes));
    Ok(())
}

/// Delete forward from the dot. With `kill` the removed text goes to the
/// kill ring and (best effort) the system clipboard.
pub(crate) fn delete_at_dot(ed: &mut Editor, n: usize, kill: bool) -> Result<Vec<u8>> {
    let (buf_id, dot) = {
        let w = ed.windows.current();
        (w.buffer, w.dot)
    };
    let deleted = ed.buffers.get_mut(buf_id)?.delete_at(dot, n)?;
    ed.windows
        .adjust_after_delete(buf_id, EditSpan::from_text(dot, &deleted));
    if kill && !deleted.is_empty() {
        start_or_continue_kill(ed);
        ed.kill_ring.append(&deleted);
        if !ed.clipboard.set(ed.kill_ring.yank()) {
            trace!(target: "actions.dispatch", "clipboard_set_failed");
        }
    }
    Ok(deleted)
}

/// Open a fresh kill-ring slot unless this kill chains onto the previous
/// kill command.
pub(crate) fn start_or_continue_kill(ed: &mut Editor) {
    if !ed.kill_chaining {
        ed.kill_ring.start_kill();
        ed.kill_chaining = true;
    }
}
