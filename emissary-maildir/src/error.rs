//! Error types for the emissary-maildir crate.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Top-level maildir error type.
#[derive(Debug, Error)]
pub enum MaildirError {
    /// I/O operation failed (create, write, rename, delete).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The path is missing one of `tmp`, `new` or `cur`.
    #[error("{} is not a Maildir folder", .0.display())]
    NotAMaildir(PathBuf),

    /// Every candidate name in `tmp` was already taken.
    #[error(
        "Failed to create unique file name in {} after {attempts} attempts, are we under a DoS attack?",
        .dir.display()
    )]
    UniqueNameExhausted { dir: PathBuf, attempts: usize },

    /// `commit()` was called on a writer that had been aborted.
    #[error("Cannot commit, message already aborted: {}", .0.display())]
    AlreadyAborted(PathBuf),

    /// The path handed to the maildir is not one of its messages.
    #[error("Not a message in this Maildir: {}", .0.display())]
    ForeignMessage(PathBuf),
}

/// Specialized `Result` type for maildir operations.
pub type Result<T> = std::result::Result<T, MaildirError>;
