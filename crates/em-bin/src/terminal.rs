//! Crossterm-backed terminal surface and stdin byte source.
//!
//! This is the out-of-core driver half: escape emission goes through
//! crossterm, bytes come straight off stdin in raw mode. Crossterm exposes
//! no scroll-region primitive, so the surface reports `can_scroll: false`
//! and the renderer falls back to plain rewrites.

use std::io::{Read, Stdout, Write, stdout};

use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::{cursor, queue, terminal};

use core_events::{Result, Status};
use core_input::ByteSource;
use core_terminal::{Capabilities, CellStyle, TerminalSurface};

pub struct CrosstermSurface {
    out: Stdout,
    rows: u16,
    cols: u16,
}

impl CrosstermSurface {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            out: stdout(),
            rows,
            cols,
        }
    }

    pub fn capabilities() -> Capabilities {
        Capabilities {
            can_scroll: false,
            can_erase_eol: true,
            can_reverse: true,
        }
    }

    pub fn set_size(&mut self, rows: u16, cols: u16) {
        self.rows = rows;
        self.cols = cols;
    }
}

fn io_err(_: std::io::Error) -> Status {
    Status::Error
}

impl TerminalSurface for CrosstermSurface {
    fn rows(&self) -> u16 {
        self.rows
    }

    fn cols(&self) -> u16 {
        self.cols
    }

    fn move_to(&mut self, row: u16, col: u16) -> Result<()> {
        queue!(self.out, cursor::MoveTo(col, row)).map_err(io_err)
    }

    fn put_cell(&mut self, codepoint: char, _style: CellStyle) -> Result<()> {
        queue!(self.out, Print(codepoint)).map_err(io_err)
    }

    fn set_reverse(&mut self, on: bool) -> Result<()> {
        let attr = if on {
            Attribute::Reverse
        } else {
            Attribute::NoReverse
        };
        queue!(self.out, SetAttribute(attr)).map_err(io_err)
    }

    fn erase_to_eol(&mut self) -> Result<()> {
        queue!(self.out, terminal::Clear(terminal::ClearType::UntilNewLine)).map_err(io_err)
    }

    fn beep(&mut self) {
        let _ = queue!(self.out, Print('\u{7}'));
    }

    fn scroll(&mut self, _from: u16, _to: u16, _count: u16) -> Result<()> {
        // Capability is reported false; the renderer never calls this.
        Err(Status::Error)
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(io_err)
    }
}

/// Blocking byte-at-a-time stdin reader.
pub struct StdinSource {
    stdin: std::io::Stdin,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            stdin: std::io::stdin(),
        }
    }
}

impl ByteSource for StdinSource {
    fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.stdin.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }
}
