//! Editor-wide status taxonomy.
//!
//! Every fallible core operation returns one of these; success is `Ok(..)`.
//! The `Display` strings are the stable one-liners the dispatcher writes to
//! the message line, so changing them is a user-visible change.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Status>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    #[error("Error")]
    Error,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("Invalid range")]
    Range,
    #[error("Not found")]
    NotFound,
    #[error("File not found")]
    FileNotFound,
    #[error("File read error")]
    FileRead,
    #[error("File write error")]
    FileWrite,
    #[error("Permission denied")]
    FilePermission,
    #[error("No such buffer")]
    BufferInvalid,
    #[error("No such line")]
    LineInvalid,
    #[error("Syntax error")]
    Syntax,
    #[error("No such command")]
    CommandUnknown,
    #[error("Cannot initialize terminal")]
    TerminalInit,
    #[error("Queue full")]
    QueueFull,
    #[error("Timed out")]
    Timeout,
    #[error("Already exists")]
    Duplicate,
}
