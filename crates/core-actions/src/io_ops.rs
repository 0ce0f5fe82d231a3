//! Collaborator interfaces: clipboard and line-oriented file I/O.
//!
//! The concrete implementations (shell-out clipboard, encrypted files,
//! locking) live outside the core. Tests and headless runs use the in-memory
//! versions here; clipboard failures are non-fatal by contract.

use std::collections::HashMap;

use core_events::{Result, Status};

pub trait Clipboard {
    fn get(&mut self) -> Option<Vec<u8>>;
    /// Returns false on failure; callers treat that as non-fatal.
    fn set(&mut self, text: &[u8]) -> bool;
}

/// No clipboard available; gets are empty, sets report failure.
#[derive(Default)]
pub struct NullClipboard;

impl Clipboard for NullClipboard {
    fn get(&mut self) -> Option<Vec<u8>> {
        None
    }

    fn set(&mut self, _text: &[u8]) -> bool {
        false
    }
}

#[derive(Default)]
pub struct MemoryClipboard {
    pub content: Option<Vec<u8>>,
}

impl Clipboard for MemoryClipboard {
    fn get(&mut self) -> Option<Vec<u8>> {
        self.content.clone()
    }

    fn set(&mut self, text: &[u8]) -> bool {
        self.content = Some(text.to_vec());
        true
    }
}

/// Line-oriented file access, one open stream at a time.
pub trait FileIo {
    fn open_read(&mut self, path: &str) -> Result<()>;
    fn open_write(&mut self, path: &str) -> Result<()>;
    /// Next line without its newline; `None` at end of file.
    fn read_line(&mut self) -> Result<Option<Vec<u8>>>;
    fn write_line(&mut self, line: &[u8]) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// In-memory file store keyed by path.
#[derive(Default)]
pub struct MemoryFileIo {
    pub files: HashMap<String, Vec<Vec<u8>>>,
    open: Option<(String, usize, bool)>, // (path, cursor, writing)
}

impl FileIo for MemoryFileIo {
    fn open_read(&mut self, path: &str) -> Result<()> {
        if !self.files.contains_key(path) {
            return Err(Status::FileNotFound);
        }
        self.open = Some((path.to_string(), 0, false));
        Ok(())
    }

    fn open_write(&mut self, path: &str) -> Result<()> {
        self.files.insert(path.to_string(), Vec::new());
        self.open = Some((path.to_string(), 0, true));
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        let Some((path, cursor, writing)) = &mut self.open else {
            return Err(Status::FileRead);
        };
        if *writing {
            return Err(Status::FileRead);
        }
        let lines = self.files.get(path).ok_or(Status::FileNotFound)?;
        let line = lines.get(*cursor).cloned();
        *cursor += line.is_some() as usize;
        Ok(line)
    }

    fn write_line(&mut self, line: &[u8]) -> Result<()> {
        let Some((path, _, writing)) = &self.open else {
            return Err(Status::FileWrite);
        };
        if !writing {
            return Err(Status::FileWrite);
        }
        self.files
            .get_mut(path)
            .ok_or(Status::FileWrite)?
            .push(line.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = None;
        Ok(())
    }
}
