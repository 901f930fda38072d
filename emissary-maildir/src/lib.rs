//! Maildir-backed outbound queue.
//!
//! A queue is a directory with `tmp`, `new` and `cur` subdirectories. Writers
//! stage a message in `tmp` under a unique name and publish it with a single
//! rename into `new`; readers list `new` and `cur`.

pub mod error;
pub mod maildir;
pub mod name;
pub mod writer;

pub use error::{MaildirError, Result};
pub use maildir::{MAX_NAME_ATTEMPTS, Maildir, QUARANTINE_PREFIX};
pub use name::{NameSource, unique_name};
pub use writer::MaildirMessageWriter;
