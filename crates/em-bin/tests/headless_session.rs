//! Headless end-to-end: raw bytes through the decoder, dispatcher, and
//! renderer against the in-memory surface, the way the binary wires them.

use core_actions::{Editor, MemoryClipboard};
use core_config::Config;
use core_input::{InputDecoder, SliceSource};
use core_state::Position;
use core_terminal::MemorySurface;

fn session(input: &[u8]) -> (Editor, MemorySurface) {
    let mut editor = Editor::new(24, 80, Config::default()).unwrap();
    editor.clipboard = Box::new(MemoryClipboard::default());
    let mut surface = MemorySurface::new(24, 80);
    editor.render(&mut surface, true).unwrap();

    let mut decoder = InputDecoder::new();
    let mut source = SliceSource::new(input);
    while let Some(token) = decoder.next_token(&mut source) {
        let _ = editor.handle_token(token);
        if !editor.in_edit_transaction() {
            editor.render(&mut surface, false).unwrap();
        }
    }
    (editor, surface)
}

fn text(editor: &Editor) -> String {
    String::from_utf8(editor.buffers.current().unwrap().text().to_vec()).unwrap()
}

#[test]
fn typed_text_reaches_screen() {
    let (editor, surface) = session(b"hello world");
    assert_eq!(text(&editor), "hello world");
    assert!(surface.row_text(0).starts_with("hello world"));
    // Mode line shows the buffer changed.
    assert!(surface.row_text(22).starts_with("-*"));
}

#[test]
fn pasted_block_inserts_verbatim() {
    let mut input = Vec::new();
    input.extend_from_slice(b"typed ");
    input.extend_from_slice(b"\x1b[200~pasted \x15 content\x1b[201~");
    let (editor, _surface) = session(&input);
    // The pasted C-u byte (0x15) lands in the buffer instead of acting as a
    // command key.
    assert_eq!(text(&editor), "typed pasted \u{15} content");
}

#[test]
fn control_keys_run_commands_end_to_end() {
    // Type two lines, go to start of file (M-<), kill the first line.
    let mut input = Vec::new();
    input.extend_from_slice(b"first\rsecond");
    input.extend_from_slice(b"\x1b<"); // meta-< beginning-of-file
    input.push(0x0B); // C-k
    let (editor, surface) = session(&input);
    assert_eq!(text(&editor), "\nsecond");
    assert!(surface.row_text(1).starts_with("second"));
}

#[test]
fn arrows_from_raw_csi_sequences() {
    let mut input = Vec::new();
    input.extend_from_slice(b"ab\rcd");
    input.extend_from_slice(b"\x1b[A"); // up
    input.extend_from_slice(b"\x1b[D"); // left
    let (editor, _) = session(&input);
    assert_eq!(editor.windows.current().dot, Position::new(0, 1));
}

#[test]
fn undo_via_keys_restores_screen() {
    let mut input = Vec::new();
    input.extend_from_slice(b"abc def");
    input.push(0x1F); // C-_ undo: removes the "def" word group
    let (editor, surface) = session(&input);
    assert_eq!(text(&editor), "abc ");
    assert!(surface.row_text(0).starts_with("abc "));
    assert!(!surface.row_text(0).contains("def"));
}
