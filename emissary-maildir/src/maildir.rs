use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use emissary_common::internal;

use crate::{
    error::{MaildirError, Result},
    name::NameSource,
    writer::MaildirMessageWriter,
};

const TMP: &str = "tmp";
const NEW: &str = "new";
const CUR: &str = "cur";

/// How many names are tried in `tmp` before giving up
pub const MAX_NAME_ATTEMPTS: usize = 1000;

/// Prefix given to quarantined entries; the leading dot hides them from readers
pub const QUARANTINE_PREFIX: &str = ".quarantine.";

/// A maildir used as an outbound queue.
///
/// Producers stage entries in `tmp` and publish them into `new` with a rename;
/// consumers read `new` and `cur`. Entries whose name starts with `.` are
/// never listed. No locking is needed beyond what the filesystem guarantees
/// for `open(O_EXCL)`, `rename` and `unlink`.
#[derive(Debug, Clone)]
pub struct Maildir {
    path: PathBuf,
    names: NameSource,
}

impl Maildir {
    /// Open the maildir at `path`.
    ///
    /// With `create`, a missing `path` is created together with `tmp`, `new`
    /// and `cur`. An existing directory is never modified.
    ///
    /// # Errors
    /// - [`MaildirError::NotAMaildir`] if any of the three subdirectories is
    ///   missing afterwards
    /// - I/O errors from creating the directories
    #[tracing::instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, create: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if create && !path.try_exists()? {
            internal!("{} does not exist, creating...", path.display());
            fs::create_dir(&path)?;
            for subdir in [TMP, NEW, CUR] {
                fs::create_dir(path.join(subdir))?;
            }
        }

        if ![CUR, NEW, TMP]
            .iter()
            .all(|subdir| path.join(subdir).is_dir())
        {
            return Err(MaildirError::NotAMaildir(path));
        }

        Ok(Self {
            path,
            names: NameSource::default(),
        })
    }

    /// Replace the source of candidate names for [`new_message`](Self::new_message)
    #[must_use]
    pub fn with_name_source(mut self, names: NameSource) -> Self {
        self.names = names;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full paths of every visible message, `new` entries before `cur` ones.
    ///
    /// Order within a directory is whatever the filesystem returns.
    ///
    /// # Errors
    /// If either directory cannot be read
    pub fn messages(&self) -> Result<Vec<PathBuf>> {
        let mut messages = Vec::new();

        for subdir in [NEW, CUR] {
            for entry in fs::read_dir(self.path.join(subdir))? {
                let entry = entry?;
                if !entry.file_name().to_string_lossy().starts_with('.') {
                    messages.push(entry.path());
                }
            }
        }

        internal!("Found {} messages in {}", messages.len(), self.path.display());

        Ok(messages)
    }

    /// Entries hidden by [`quarantine`](Self::quarantine)
    ///
    /// # Errors
    /// If `cur` cannot be read
    pub fn quarantined(&self) -> Result<Vec<PathBuf>> {
        let mut quarantined = Vec::new();

        for entry in fs::read_dir(self.path.join(CUR))? {
            let entry = entry?;
            if entry
                .file_name()
                .to_string_lossy()
                .starts_with(QUARANTINE_PREFIX)
            {
                quarantined.push(entry.path());
            }
        }

        Ok(quarantined)
    }

    /// Stage a new message in `tmp` under a name nothing else is using.
    ///
    /// # Errors
    /// - [`MaildirError::UniqueNameExhausted`] after [`MAX_NAME_ATTEMPTS`]
    ///   collisions in a row
    /// - I/O errors other than the name already existing
    pub fn new_message(&self) -> Result<MaildirMessageWriter> {
        let tmp = self.path.join(TMP);

        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = self.names.next();
            let tmp_path = tmp.join(&name);

            match exclusive_create(&tmp_path) {
                Ok(file) => {
                    internal!("Staged new message {}", tmp_path.display());
                    let new_path = self.path.join(NEW).join(&name);
                    return Ok(MaildirMessageWriter::new(file, tmp_path, new_path));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        }

        Err(MaildirError::UniqueNameExhausted {
            dir: tmp,
            attempts: MAX_NAME_ATTEMPTS,
        })
    }

    /// Hide a listed message from consumers without deleting it.
    ///
    /// The file is moved to `cur/.quarantine.<name>`, returning the new path.
    ///
    /// # Errors
    /// - [`MaildirError::ForeignMessage`] if `message` is not in `new` or `cur`
    /// - I/O errors from the rename
    pub fn quarantine(&self, message: &Path) -> Result<PathBuf> {
        let in_queue = message
            .parent()
            .is_some_and(|parent| parent == self.path.join(NEW) || parent == self.path.join(CUR));

        let Some(name) = message.file_name().filter(|_| in_queue) else {
            return Err(MaildirError::ForeignMessage(message.to_path_buf()));
        };

        let target = self
            .path
            .join(CUR)
            .join(format!("{QUARANTINE_PREFIX}{}", name.to_string_lossy()));
        fs::rename(message, &target)?;

        Ok(target)
    }
}

#[cfg(unix)]
fn exclusive_create(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn exclusive_create(path: &Path) -> io::Result<fs::File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn open_creates_missing_maildir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("queue");

        let maildir = Maildir::open(&root, true).unwrap();

        assert_eq!(maildir.path(), root);
        for subdir in [TMP, NEW, CUR] {
            assert!(root.join(subdir).is_dir());
        }
    }

    #[test]
    fn open_without_create_rejects_missing_maildir() {
        let dir = tempfile::tempdir().unwrap();

        let err = Maildir::open(dir.path().join("queue"), false).unwrap_err();

        assert!(matches!(err, MaildirError::NotAMaildir(_)));
    }

    #[test]
    fn open_does_not_repair_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(NEW)).unwrap();

        let err = Maildir::open(dir.path(), true).unwrap_err();

        assert!(matches!(err, MaildirError::NotAMaildir(_)));
        assert!(!dir.path().join(TMP).exists());
    }

    #[test]
    fn open_ignores_unrelated_entries() {
        let dir = tempfile::tempdir().unwrap();
        for subdir in [TMP, NEW, CUR, "extra"] {
            fs::create_dir(dir.path().join(subdir)).unwrap();
        }
        fs::write(dir.path().join("README"), "hello").unwrap();

        assert!(Maildir::open(dir.path(), false).is_ok());
    }

    #[test]
    fn open_rejects_file_in_place_of_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(TMP)).unwrap();
        fs::create_dir(dir.path().join(NEW)).unwrap();
        fs::write(dir.path().join(CUR), "").unwrap();

        assert!(matches!(
            Maildir::open(dir.path(), false),
            Err(MaildirError::NotAMaildir(_))
        ));
    }

    #[test]
    fn messages_lists_new_before_cur_and_skips_dotfiles() {
        let dir = tempfile::tempdir().unwrap();
        let maildir = Maildir::open(dir.path().join("q"), true).unwrap();
        let root = maildir.path().to_path_buf();

        fs::write(root.join(CUR).join("1"), "").unwrap();
        fs::write(root.join(NEW).join("2"), "").unwrap();
        fs::write(root.join(NEW).join(".hidden"), "").unwrap();
        fs::write(root.join(TMP).join("3"), "").unwrap();

        let messages = maildir.messages().unwrap();

        assert_eq!(messages, vec![root.join(NEW).join("2"), root.join(CUR).join("1")]);
    }

    #[test]
    fn new_message_is_invisible_until_committed() {
        let dir = tempfile::tempdir().unwrap();
        let maildir = Maildir::open(dir.path().join("q"), true).unwrap();

        let mut writer = maildir.new_message().unwrap();
        writer.write_all(b"Subject: hi\n\nbody\n").unwrap();

        assert!(writer.tmp_path().exists());
        assert!(maildir.messages().unwrap().is_empty());

        writer.commit().unwrap();

        assert!(!writer.tmp_path().exists());
        assert_eq!(maildir.messages().unwrap(), vec![writer.new_path().to_path_buf()]);
        assert_eq!(
            fs::read_to_string(writer.new_path()).unwrap(),
            "Subject: hi\n\nbody\n"
        );
    }

    #[test]
    fn quarantine_hides_message() {
        let dir = tempfile::tempdir().unwrap();
        let maildir = Maildir::open(dir.path().join("q"), true).unwrap();

        let mut writer = maildir.new_message().unwrap();
        writer.write_all(b"junk").unwrap();
        writer.commit().unwrap();

        let target = maildir.quarantine(writer.new_path()).unwrap();

        assert!(maildir.messages().unwrap().is_empty());
        assert_eq!(maildir.quarantined().unwrap(), vec![target.clone()]);
        assert_eq!(fs::read_to_string(target).unwrap(), "junk");
    }

    #[test]
    fn quarantine_rejects_paths_outside_queue() {
        let dir = tempfile::tempdir().unwrap();
        let maildir = Maildir::open(dir.path().join("q"), true).unwrap();
        let outside = dir.path().join("elsewhere");
        fs::write(&outside, "").unwrap();

        assert!(matches!(
            maildir.quarantine(&outside),
            Err(MaildirError::ForeignMessage(_))
        ));
        assert!(outside.exists());
    }
}
