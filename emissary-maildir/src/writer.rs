use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use emissary_common::internal;

use crate::error::{MaildirError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Committed,
    Aborted,
}

/// Write handle for one message that is not yet visible in the queue.
///
/// Bytes go to a file in `tmp`. [`commit`](Self::commit) renames it into
/// `new`, which is the only point at which consumers can see it;
/// [`abort`](Self::abort) deletes it instead. A writer dropped without either
/// is aborted.
#[derive(Debug)]
pub struct MaildirMessageWriter {
    file: Option<File>,
    tmp_path: PathBuf,
    new_path: PathBuf,
    state: State,
}

impl MaildirMessageWriter {
    pub(crate) const fn new(file: File, tmp_path: PathBuf, new_path: PathBuf) -> Self {
        Self {
            file: Some(file),
            tmp_path,
            new_path,
            state: State::Open,
        }
    }

    /// Where the message is staged
    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Where the message appears once committed
    pub fn new_path(&self) -> &Path {
        &self.new_path
    }

    pub fn is_committed(&self) -> bool {
        self.state == State::Committed
    }

    pub fn is_aborted(&self) -> bool {
        self.state == State::Aborted
    }

    /// Append every chunk in order
    ///
    /// # Errors
    /// If the writer is finalised, or the underlying write fails
    pub fn write_lines<I, B>(&mut self, lines: I) -> io::Result<()>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        for line in lines {
            self.write_all(line.as_ref())?;
        }

        Ok(())
    }

    /// Publish the message by renaming it from `tmp` into `new`.
    ///
    /// Committing twice is a no-op.
    ///
    /// # Errors
    /// - [`MaildirError::AlreadyAborted`] if the writer was aborted
    /// - I/O errors from flushing or renaming
    pub fn commit(&mut self) -> Result<()> {
        match self.state {
            State::Aborted => Err(MaildirError::AlreadyAborted(self.tmp_path.clone())),
            State::Committed => Ok(()),
            State::Open => {
                if let Some(mut file) = self.file.take() {
                    file.flush()?;
                }

                fs::rename(&self.tmp_path, &self.new_path)?;
                self.state = State::Committed;

                internal!(
                    level = DEBUG,
                    "Committed {} to {}",
                    self.tmp_path.display(),
                    self.new_path.display()
                );

                Ok(())
            }
        }
    }

    /// Discard the staged message.
    ///
    /// Aborting twice, or after a commit, is a no-op.
    ///
    /// # Errors
    /// If the staged file cannot be removed
    pub fn abort(&mut self) -> Result<()> {
        if self.state != State::Open {
            return Ok(());
        }

        self.file.take();
        self.state = State::Aborted;

        match fs::remove_file(&self.tmp_path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => {
                internal!(level = DEBUG, "Aborted {}", self.tmp_path.display());
                Ok(())
            }
        }
    }

    fn open_file(&mut self) -> io::Result<&mut File> {
        self.file.as_mut().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("{} has already been finalised", self.tmp_path.display()),
            )
        })
    }
}

impl Write for MaildirMessageWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.open_file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.open_file()?.flush()
    }
}

impl Drop for MaildirMessageWriter {
    fn drop(&mut self) {
        if self.state == State::Open
            && let Err(e) = self.abort()
        {
            tracing::warn!(
                path = %self.tmp_path.display(),
                error = %e,
                "Failed to discard unfinished message"
            );
        }
    }
}
