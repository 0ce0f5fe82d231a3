//! Input decoding: one logical token per call from a byte-at-a-time source.
//!
//! The decoder is a small state machine layered in two stages:
//!
//! * [`InputDecoder::next_byte`] replays queued lookahead first, then runs the
//!   bracketed-paste matcher and UTF-8 assembly. Paste mode is entered on
//!   `ESC [ 2 0 0 ~` and left on a full rolling match of `ESC [ 2 0 1 ~`;
//!   a mismatch after a partial match replays the matched prefix as content.
//!   Complete UTF-8 sequences yield their lead byte with the continuation
//!   bytes queued, so byte-granularity callers see every byte in order; an
//!   invalid continuation truncates the sequence and queues the offender.
//! * [`InputDecoder::next_token`] folds the byte stream into key codes:
//!   CSI arrows become `Special|A..D`, focus reports are swallowed, ESC plus
//!   a C0 byte folds to Control, ESC plus a printable yields Meta.
//!
//! Nothing here logs payload bytes; only lengths and counts reach tracing.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use tracing::trace;

use core_events::key::{CONTROL, META, SPEC};
use core_events::{InputToken, KEYS_DECODED, Key, PASTE_BYTES, PASTE_SESSIONS};

const PASTE_START: [u8; 6] = [0x1B, b'[', b'2', b'0', b'0', b'~'];
const PASTE_END: [u8; 6] = [0x1B, b'[', b'2', b'0', b'1', b'~'];

/// Byte-at-a-time input, `None` on end of stream. The terminal driver
/// implements this outside the core.
pub trait ByteSource {
    fn read_byte(&mut self) -> Option<u8>;
}

/// In-memory source for tests and replay.
pub struct SliceSource {
    bytes: Vec<u8>,
    pos: usize,
}

impl SliceSource {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            pos: 0,
        }
    }
}

impl ByteSource for SliceSource {
    fn read_byte(&mut self) -> Option<u8> {
        let b = self.bytes.get(self.pos).copied();
        self.pos += b.is_some() as usize;
        b
    }
}

#[derive(Default)]
pub struct InputDecoder {
    /// Lookahead replay queue; the flag marks bytes that are paste content.
    pending: VecDeque<(u8, bool)>,
    paste_mode: bool,
    /// Rolling match index into the paste end sequence.
    end_match: usize,
}

impl InputDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_paste(&self) -> bool {
        self.paste_mode
    }

    /// Reset all parser state (pending bytes are dropped).
    pub fn reset(&mut self) {
        self.pending.clear();
        self.paste_mode = false;
        self.end_match = 0;
    }

    fn queue(&mut self, byte: u8, from_paste: bool) {
        self.pending.push_back((byte, from_paste));
    }

    /// One byte of input, with its paste flag. Replays lookahead first.
    pub fn next_byte(&mut self, src: &mut dyn ByteSource) -> Option<(u8, bool)> {
        loop {
            if let Some(b) = self.pending.pop_front() {
                return Some(b);
            }

            if self.paste_mode {
                let b = src.read_byte()?;
                if b == PASTE_END[self.end_match] {
                    self.end_match += 1;
                    if self.end_match == PASTE_END.len() {
                        self.paste_mode = false;
                        self.end_match = 0;
                        trace!(target: "input.paste", "paste_end");
                    }
                    continue;
                }
                if self.end_match > 0 {
                    // Partial end-sequence match was actually content.
                    for i in 0..self.end_match {
                        self.queue(PASTE_END[i], true);
                    }
                    self.queue(b, true);
                    self.end_match = 0;
                    continue;
                }
                PASTE_BYTES.fetch_add(1, Ordering::Relaxed);
                return Some((b, true));
            }

            let first = src.read_byte()?;
            if first == 0x1B {
                match self.after_escape(src) {
                    Some(b) => return Some(b),
                    // Paste mode entered; the start sequence is consumed
                    // without producing a byte. Stream the content.
                    None => continue,
                }
            }
            if first < 0x80 {
                return Some((first, false));
            }
            return Some(self.assemble_utf8(src, first));
        }
    }

    /// ESC seen outside paste mode: check for the paste start sequence,
    /// queueing any non-matching lookahead for replay. Returns `None` when
    /// paste mode was entered (the sequence produces no byte).
    fn after_escape(&mut self, src: &mut dyn ByteSource) -> Option<(u8, bool)> {
        let esc = Some((0x1B, false));
        let Some(b1) = src.read_byte() else {
            return esc;
        };
        if b1 != b'[' {
            self.queue(b1, false);
            return esc;
        }
        let mut ahead = [0u8; 3];
        let mut got = 0;
        for slot in &mut ahead {
            match src.read_byte() {
                Some(b) => {
                    *slot = b;
                    got += 1;
                }
                None => break,
            }
        }
        if got == 3 && ahead == [PASTE_START[2], PASTE_START[3], PASTE_START[4]] {
            match src.read_byte() {
                Some(b'~') => {
                    self.paste_mode = true;
                    self.end_match = 0;
                    PASTE_SESSIONS.fetch_add(1, Ordering::Relaxed);
                    trace!(target: "input.paste", "paste_start");
                    return None;
                }
                Some(b5) => {
                    self.queue(b'[', false);
                    for &b in &ahead {
                        self.queue(b, false);
                    }
                    self.queue(b5, false);
                    return esc;
                }
                None => {
                    self.queue(b'[', false);
                    for &b in &ahead {
                        self.queue(b, false);
                    }
                    return esc;
                }
            }
        }
        self.queue(b'[', false);
        for &b in &ahead[..got] {
            self.queue(b, false);
        }
        esc
    }

    /// Collect a 1-4 byte UTF-8 sequence. The lead byte is returned and the
    /// continuations queued in order; an invalid continuation truncates the
    /// sequence and queues the offending byte for the next call.
    fn assemble_utf8(&mut self, src: &mut dyn ByteSource, first: u8) -> (u8, bool) {
        let needed = match first {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return (first, false), // invalid lead, single byte
        };
        let mut collected = 1usize;
        while collected < needed {
            match src.read_byte() {
                Some(b) if b & 0xC0 == 0x80 => {
                    self.queue(b, false);
                    collected += 1;
                }
                Some(b) => {
                    trace!(target: "input.utf8", collected, "truncated_sequence");
                    self.queue(b, false);
                    break;
                }
                None => break,
            }
        }
        (first, false)
    }

    /// One logical input token, or `None` at end of stream.
    pub fn next_token(&mut self, src: &mut dyn ByteSource) -> Option<InputToken> {
        loop {
            let (b, from_paste) = self.next_byte(src)?;
            if from_paste {
                KEYS_DECODED.fetch_add(1, Ordering::Relaxed);
                return Some(InputToken::pasted(Key(u32::from(b))));
            }
            if b == 0x1B {
                match self.next_byte(src) {
                    None => {
                        KEYS_DECODED.fetch_add(1, Ordering::Relaxed);
                        return Some(InputToken::new(Key::ESC));
                    }
                    Some((b'[', _)) => match self.next_byte(src) {
                        None => {
                            self.pending.push_front((b'[', false));
                            KEYS_DECODED.fetch_add(1, Ordering::Relaxed);
                            return Some(InputToken::new(Key::ESC));
                        }
                        Some((c @ b'A'..=b'D', _)) => {
                            KEYS_DECODED.fetch_add(1, Ordering::Relaxed);
                            return Some(InputToken::new(Key(SPEC | u32::from(c))));
                        }
                        // Focus in/out reports; swallow and keep reading.
                        Some((b'I', _)) | Some((b'O', _)) => continue,
                        Some((c, _)) => {
                            KEYS_DECODED.fetch_add(1, Ordering::Relaxed);
                            return Some(InputToken::new(Key(u32::from(c))));
                        }
                    },
                    Some((c, _)) if c <= 0x1F => {
                        KEYS_DECODED.fetch_add(1, Ordering::Relaxed);
                        return Some(InputToken::new(Key(CONTROL | (u32::from(c) + '@' as u32))));
                    }
                    Some((c, _)) => {
                        KEYS_DECODED.fetch_add(1, Ordering::Relaxed);
                        return Some(InputToken::new(Key(META | u32::from(c))));
                    }
                }
            }
            KEYS_DECODED.fetch_add(1, Ordering::Relaxed);
            if b <= 0x1F {
                return Some(InputToken::new(Key(CONTROL | (u32::from(b) + '@' as u32))));
            }
            return Some(InputToken::new(Key(u32::from(b))));
        }
    }
}
