//! Shared fixtures for dispatcher tests.

use core_actions::{Editor, MemoryClipboard};
use core_config::Config;
use core_events::{InputToken, Key};

pub fn editor() -> Editor {
    let mut ed = Editor::new(24, 80, Config::default()).unwrap();
    ed.clipboard = Box::new(MemoryClipboard::default());
    ed
}

/// Feed a string as typed keys (plain self-insert path).
pub fn type_str(ed: &mut Editor, text: &str) {
    for b in text.bytes() {
        let key = if b == b'\n' {
            Key::control('M')
        } else {
            Key(u32::from(b))
        };
        ed.handle_token(InputToken::new(key)).unwrap();
    }
}

pub fn press(ed: &mut Editor, key: Key) -> bool {
    ed.handle_token(InputToken::new(key)).unwrap()
}

pub fn buffer_text(ed: &Editor) -> String {
    String::from_utf8(ed.buffers.current().unwrap().text().to_vec()).unwrap()
}
