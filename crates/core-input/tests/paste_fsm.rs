//! Bracketed-paste state machine behavior across whole token streams.

use core_input::{InputDecoder, SliceSource};
use core_events::InputToken;
use core_events::key::SPEC;
use pretty_assertions::assert_eq;

fn tokens(input: &[u8]) -> Vec<InputToken> {
    let mut dec = InputDecoder::new();
    let mut src = SliceSource::new(input);
    let mut out = Vec::new();
    while let Some(tok) = dec.next_token(&mut src) {
        out.push(tok);
    }
    out
}

fn chars(toks: &[InputToken]) -> String {
    toks.iter()
        .filter_map(|t| char::from_u32(t.key.code()))
        .collect()
}

#[test]
fn paste_content_passes_through_framed() {
    // ESC [ 2 0 0 ~ A B ESC [ 2 0 1 ~ C
    let mut input = Vec::new();
    input.extend_from_slice(b"\x1b[200~AB\x1b[201~C");
    let toks = tokens(&input);
    assert_eq!(chars(&toks), "ABC");
    // A and B were pasted, C was typed.
    assert!(toks[0].from_paste);
    assert!(toks[1].from_paste);
    assert!(!toks[2].from_paste);
}

#[test]
fn paste_survives_end_lookalike_content() {
    // Content containing a partial end sequence: ESC [ 2 0 not followed by 1~.
    let mut input = Vec::new();
    input.extend_from_slice(b"\x1b[200~x\x1b[20z y\x1b[201~");
    let toks = tokens(&input);
    // The partial match replays as literal content.
    assert_eq!(chars(&toks), "x\u{1b}[20z y");
    assert!(toks.iter().all(|t| t.from_paste));
}

#[test]
fn empty_paste_produces_nothing() {
    let toks = tokens(b"\x1b[200~\x1b[201~done");
    assert_eq!(chars(&toks), "done");
    assert!(toks.iter().all(|t| !t.from_paste));
}

#[test]
fn multiline_paste_keeps_newlines() {
    let toks = tokens(b"\x1b[200~a\nb\x1b[201~");
    let keys: Vec<u32> = toks.iter().map(|t| t.key.0).collect();
    // Newline inside a paste stays a raw byte token, not a command key.
    assert_eq!(keys, vec!['a' as u32, '\n' as u32, 'b' as u32]);
    assert!(toks.iter().all(|t| t.from_paste));
}

#[test]
fn arrows_decode_outside_paste() {
    let toks = tokens(b"\x1b[A\x1b[D");
    assert_eq!(toks[0].key.0, SPEC | 'A' as u32);
    assert_eq!(toks[1].key.0, SPEC | 'D' as u32);
}

#[test]
fn focus_reports_are_swallowed() {
    let toks = tokens(b"\x1b[Ix\x1b[O");
    assert_eq!(chars(&toks), "x");
}

#[test]
fn incomplete_paste_start_is_replayed_literally() {
    // ESC [ 2 0 0 but no tilde: every byte must come back.
    let toks = tokens(b"\x1b[200Q");
    // ESC token (CSI decode consumes '[' and yields the final byte '2'),
    // then the queued "00Q".
    assert!(!toks.is_empty());
    let total: String = chars(&toks);
    assert!(total.contains('0'));
    assert!(total.contains('Q'));
}
