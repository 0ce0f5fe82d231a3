//! Shared vocabulary for the em core: key codes, input tokens, the editor-wide
//! status taxonomy, and process-wide telemetry counters.
//!
//! This crate sits at the bottom of the dependency graph on purpose: every
//! subsystem speaks these types, none of them needs anything heavier. Events
//! here are plain data; channels and async sources live with their owners.

use std::fmt;
use std::sync::atomic::AtomicU64;

pub mod key;
pub mod status;

pub use key::Key;
pub use status::{Result, Status};

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
// Relaxed atomic counters, inspectable from tests and periodically logged by the
// binary. Content never flows through these; lengths and counts only.
// -------------------------------------------------------------------------------------------------
pub static KEYS_DECODED: AtomicU64 = AtomicU64::new(0); // tokens produced by the input decoder
pub static PASTE_SESSIONS: AtomicU64 = AtomicU64::new(0); // bracketed paste start sequences seen
pub static PASTE_BYTES: AtomicU64 = AtomicU64::new(0); // content bytes streamed through paste mode
pub static COMMANDS_DISPATCHED: AtomicU64 = AtomicU64::new(0); // commands executed by the dispatcher
pub static RENDER_PASSES: AtomicU64 = AtomicU64::new(0); // update() entries that reached the diff stage

/// One decoded input token handed from the input decoder to the keymap layer.
///
/// `Key` carries either a plain codepoint/byte or an extended code with
/// Control / Meta / Special bits folded in (arrow keys arrive as
/// `Special | 'A'..'D'`). Paste content arrives as plain byte tokens with
/// `from_paste` set so the dispatcher can suppress macro recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputToken {
    pub key: Key,
    pub from_paste: bool,
}

impl InputToken {
    pub const fn new(key: Key) -> Self {
        Self {
            key,
            from_paste: false,
        }
    }

    pub const fn pasted(key: Key) -> Self {
        Self {
            key,
            from_paste: true,
        }
    }
}

impl fmt::Display for InputToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from_paste {
            write!(f, "paste:{}", self.key)
        } else {
            write!(f, "{}", self.key)
        }
    }
}
