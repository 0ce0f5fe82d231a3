//! End-to-end dispatch: tokens through keymaps, hooks, and commands.

mod common;

use common::{buffer_text, editor, press, type_str};
use core_actions::hooks::{HookPhase, HookResult};
use core_actions::{Editor, MemoryFileIo};
use core_events::key::SPEC;
use core_events::{InputToken, Key};
use core_state::Position;
use pretty_assertions::assert_eq;

#[test]
fn typing_inserts_and_moves_dot() {
    let mut ed = editor();
    type_str(&mut ed, "hello");
    assert_eq!(buffer_text(&ed), "hello");
    assert_eq!(ed.windows.current().dot, Position::new(0, 5));
}

#[test]
fn newline_splits_and_renumbers() {
    let mut ed = editor();
    type_str(&mut ed, "ab\ncd");
    assert_eq!(buffer_text(&ed), "ab\ncd");
    assert_eq!(ed.windows.current().dot, Position::new(1, 2));
}

#[test]
fn prefix_key_walks_into_ctlx_map() {
    let mut ed = editor();
    type_str(&mut ed, "dirty");
    // C-x C-s is save-file: two tokens, the first only arms the prefix.
    assert!(press(&mut ed, Key::control('X')));
    assert_eq!(buffer_text(&ed), "dirty"); // nothing executed yet
    assert!(press(&mut ed, Key::control('S')));
    assert!(!ed.buffers.current().unwrap().is_changed());
    assert!(ed.take_message().unwrap().contains("Wrote"));
}

#[test]
fn unbound_key_reports_not_bound() {
    let mut ed = editor();
    // C-x followed by an unbound key.
    press(&mut ed, Key::control('X'));
    let handled = press(&mut ed, Key::from_char('~'));
    assert!(!handled);
    assert_eq!(ed.take_message().unwrap(), "(Key not bound)");
}

#[test]
fn arrows_move_like_bound_motions() {
    let mut ed = editor();
    type_str(&mut ed, "one\ntwo");
    press(&mut ed, Key(SPEC | 'A' as u32)); // up
    assert_eq!(ed.windows.current().dot.line, 0);
    press(&mut ed, Key(SPEC | 'B' as u32)); // down
    assert_eq!(ed.windows.current().dot.line, 1);
    press(&mut ed, Key(SPEC | 'D' as u32)); // left
    assert_eq!(ed.windows.current().dot.col, 2);
}

#[test]
fn word_boundary_typing_undoes_in_two_groups() {
    // The S2 shape: h i SPACE ! — one undo removes " !", the next "hi".
    let mut ed = editor();
    type_str(&mut ed, "hi !");
    assert_eq!(buffer_text(&ed), "hi !");
    press(&mut ed, Key::control('_'));
    assert_eq!(buffer_text(&ed), "hi");
    press(&mut ed, Key::control('_'));
    assert_eq!(buffer_text(&ed), "");
    // Redo through C-x r restores the first group.
    press(&mut ed, Key::control('X'));
    press(&mut ed, Key::from_char('r'));
    assert_eq!(buffer_text(&ed), "hi");
}

#[test]
fn backspace_joins_lines() {
    let mut ed = editor();
    type_str(&mut ed, "ab\ncd");
    let w = ed.windows.current_mut();
    w.dot = Position::new(1, 0);
    press(&mut ed, Key(0x7F));
    assert_eq!(buffer_text(&ed), "abcd");
    assert_eq!(ed.windows.current().dot, Position::new(0, 2));
}

#[test]
fn kill_line_then_yank_round_trips() {
    let mut ed = editor();
    type_str(&mut ed, "keep this line");
    ed.windows.current_mut().dot = Position::new(0, 5);
    press(&mut ed, Key::control('K'));
    assert_eq!(buffer_text(&ed), "keep ");
    press(&mut ed, Key::control('Y'));
    assert_eq!(buffer_text(&ed), "keep this line");
    // The kill also reached the clipboard collaborator.
    assert_eq!(ed.clipboard.get().unwrap(), b"this line");
}

#[test]
fn consecutive_kills_append_to_one_slot() {
    let mut ed = editor();
    type_str(&mut ed, "aaa\nbbb");
    ed.windows.current_mut().dot = Position::origin();
    press(&mut ed, Key::control('K')); // kills "aaa"
    press(&mut ed, Key::control('K')); // kills the newline, same slot
    assert_eq!(buffer_text(&ed), "bbb");
    press(&mut ed, Key::control('Y'));
    assert_eq!(buffer_text(&ed), "aaa\nbbb");
}

#[test]
fn search_forward_moves_past_match() {
    let mut ed = editor();
    type_str(&mut ed, "Hello world, HELLO WORLD");
    ed.windows.current_mut().dot = Position::origin();
    ed.search_pattern = b"hello".to_vec();
    press(&mut ed, Key::control('S'));
    // Case-folded: first hit after the dot is the HELLO at column 13.
    assert_eq!(ed.windows.current().dot, Position::new(0, 18));
    // No further match: message line reports it.
    let ok = press(&mut ed, Key::control('S'));
    assert!(!ok);
    assert_eq!(ed.take_message().unwrap(), "Not found");
}

#[test]
fn search_reverse_finds_earlier_match() {
    let mut ed = editor();
    type_str(&mut ed, "Hello world, HELLO WORLD");
    ed.search_pattern = b"hello".to_vec();
    ed.windows.current_mut().dot = Position::new(0, 23);
    press(&mut ed, Key::control('R'));
    assert_eq!(ed.windows.current().dot, Position::new(0, 13));
}

#[test]
fn pre_hook_can_abort_commands() {
    fn veto(_: &core_actions::HookContext) -> HookResult {
        HookResult::Abort
    }
    let mut ed = editor();
    let undo_id = ed.registry.id_of("newline").unwrap();
    ed.hooks
        .register(HookPhase::Pre, veto, 10, Some(undo_id), "veto-newline");
    type_str(&mut ed, "x");
    let done = press(&mut ed, Key::control('M'));
    assert!(!done);
    assert_eq!(buffer_text(&ed), "x"); // newline suppressed
    type_str(&mut ed, "y"); // other commands unaffected
    assert_eq!(buffer_text(&ed), "xy");
}

#[test]
fn paste_tokens_insert_without_keymap_dispatch() {
    let mut ed = editor();
    // A pasted C-K byte must insert a control byte, not kill a line.
    type_str(&mut ed, "safe");
    ed.windows.current_mut().dot = Position::origin();
    ed.handle_token(InputToken::pasted(Key('A' as u32))).unwrap();
    ed.handle_token(InputToken::pasted(Key('\n' as u32))).unwrap();
    assert_eq!(buffer_text(&ed), "A\nsafe");
}

#[test]
fn quit_refuses_with_modified_buffers() {
    let mut ed = editor();
    type_str(&mut ed, "unsaved");
    press(&mut ed, Key::control('X'));
    press(&mut ed, Key::control('C'));
    assert!(!ed.quit_requested);
    assert!(ed.take_message().unwrap().contains("modified"));
    // Saving clears the refusal.
    press(&mut ed, Key::control('X'));
    press(&mut ed, Key::control('S'));
    press(&mut ed, Key::control('X'));
    press(&mut ed, Key::control('C'));
    assert!(ed.quit_requested);
}

#[test]
fn save_writes_lines_through_collaborator() {
    let mut ed = editor();
    ed.file_io = Box::new(MemoryFileIo::default());
    type_str(&mut ed, "first\nsecond");
    ed.run_named("save-file", false, 1).unwrap();
    // Reach into the memory collaborator to verify the write.
    let text = buffer_text(&ed);
    assert_eq!(text, "first\nsecond");
    assert!(!ed.buffers.current().unwrap().is_changed());
}

#[test]
fn run_named_rejects_unknown_commands() {
    let mut ed = editor();
    let err = ed.run_named("no-such-thing", false, 1).unwrap_err();
    assert_eq!(err.to_string(), "No such command");
}

#[test]
fn abort_clears_pending_prefix() {
    let mut ed = editor();
    press(&mut ed, Key::control('X'));
    press(&mut ed, Key::control('G')); // abort
    // 's' now self-inserts instead of resolving in the C-x map.
    type_str(&mut ed, "s");
    assert_eq!(buffer_text(&ed), "s");
}

#[test]
fn metafied_tokens_route_into_meta_map() {
    let mut ed = editor();
    type_str(&mut ed, "one two three");
    // The decoder folds ESC f into one Meta token; lowercase upcases.
    press(&mut ed, Key::meta('<'));
    assert_eq!(ed.windows.current().dot, Position::origin());
    press(&mut ed, Key::meta('f'));
    assert_eq!(ed.windows.current().dot, Position::new(0, 3));
    press(&mut ed, Key::meta('f'));
    assert_eq!(ed.windows.current().dot, Position::new(0, 7));
    press(&mut ed, Key::meta('b'));
    assert_eq!(ed.windows.current().dot, Position::new(0, 4));
}

#[test]
fn kill_region_between_mark_and_dot() {
    let mut ed = editor();
    type_str(&mut ed, "alpha beta gamma");
    ed.windows.current_mut().dot = Position::new(0, 6);
    press(&mut ed, Key::control('@')); // set mark at 6
    ed.windows.current_mut().dot = Position::new(0, 11);
    press(&mut ed, Key::control('W'));
    assert_eq!(buffer_text(&ed), "alpha gamma");
    assert_eq!(ed.windows.current().dot, Position::new(0, 6));
    press(&mut ed, Key::control('Y'));
    assert_eq!(buffer_text(&ed), "alpha beta gamma");
}

#[test]
fn copy_region_leaves_text_in_place() {
    let mut ed = editor();
    type_str(&mut ed, "copy me");
    ed.windows.current_mut().mark = Some(Position::origin());
    // dot is at the end from typing; M-w copies the whole line.
    press(&mut ed, Key::meta('w'));
    assert_eq!(buffer_text(&ed), "copy me");
    assert_eq!(ed.kill_ring.yank(), b"copy me");
    assert_eq!(ed.clipboard.get().unwrap(), b"copy me");
}

#[test]
fn kill_region_without_mark_fails_softly() {
    let mut ed = editor();
    type_str(&mut ed, "text");
    let ok = press(&mut ed, Key::control('W'));
    assert!(!ok);
    assert_eq!(ed.take_message().unwrap(), "Not found");
    assert_eq!(buffer_text(&ed), "text");
}

#[test]
fn exchange_dot_and_mark_swaps() {
    let mut ed = editor();
    type_str(&mut ed, "ab\ncd");
    ed.windows.current_mut().mark = Some(Position::origin());
    press(&mut ed, Key::control('X'));
    press(&mut ed, Key::control('X'));
    assert_eq!(ed.windows.current().dot, Position::origin());
    assert_eq!(ed.windows.current().mark, Some(Position::new(1, 2)));
}

#[test]
fn delete_next_word_kills_through_word() {
    let mut ed = editor();
    type_str(&mut ed, "one two three");
    ed.windows.current_mut().dot = Position::new(0, 3);
    press(&mut ed, Key::meta('d'));
    assert_eq!(buffer_text(&ed), "one three");
}

#[test]
fn goto_line_uses_repeat_count() {
    let mut ed = editor();
    type_str(&mut ed, "a\nb\nc\nd");
    ed.run_named("goto-line", true, 3).unwrap();
    assert_eq!(ed.windows.current().dot, Position::new(2, 0));
    // Past the end clamps to the last line.
    ed.run_named("goto-line", true, 99).unwrap();
    assert_eq!(ed.windows.current().dot.line, 3);
}

#[test]
fn list_buffers_builds_view_buffer() {
    let mut ed = editor();
    type_str(&mut ed, "content");
    press(&mut ed, Key::control('X'));
    press(&mut ed, Key::control('B'));
    let current = ed.buffers.current().unwrap();
    assert_eq!(current.name, "*buffers*");
    let listing = String::from_utf8(current.text().to_vec()).unwrap();
    assert!(listing.contains("main"));
    assert!(listing.contains("Buffer"));
    // The listing buffer is view-only and hides itself from the listing.
    assert!(!listing.contains("*buffers*"));
    let err = ed.run_named("newline", false, 1).unwrap_err();
    assert_eq!(err.to_string(), "Permission denied");
}

#[test]
fn buffer_position_reports_statistics() {
    let mut ed = editor();
    type_str(&mut ed, "one two\nthree");
    ed.run_named("buffer-position", false, 1).unwrap();
    let msg = ed.take_message().unwrap();
    assert!(msg.contains("Line 2/2"), "message: {msg}");
    assert!(msg.contains("Words 3"), "message: {msg}");
}

fn _signatures_are_stable(ed: &mut Editor) {
    // The registry surface handed to the scripting collaborator.
    let _ = ed.run_named("undo", false, 1);
}
