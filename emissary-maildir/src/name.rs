//! Unique file names for new queue entries.

use std::{
    fmt,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use rand::Rng;

/// Upper bound (exclusive) of the random component
const RANDOM_MAX: u32 = 0x7fff_ffff;

/// Produces candidate names for entries in `tmp`.
///
/// Each call must return a fresh candidate; the maildir retries on collision.
#[derive(Clone)]
pub struct NameSource(Arc<dyn Fn() -> String + Send + Sync>);

impl NameSource {
    pub fn new(f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub(crate) fn next(&self) -> String {
        (self.0)()
    }
}

impl Default for NameSource {
    fn default() -> Self {
        Self::new(unique_name)
    }
}

impl fmt::Debug for NameSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NameSource")
    }
}

/// `<unix-timestamp>.<pid>.<hostname>.<random>`
pub fn unique_name() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    format!(
        "{timestamp}.{}.{}.{}",
        std::process::id(),
        escaped_hostname(),
        rand::rng().random_range(0..RANDOM_MAX)
    )
}

/// The local hostname with `/` and `:` escaped so it stays one path component
fn escaped_hostname() -> String {
    let host = hostname::get().map_or_else(
        |_| String::from("localhost"),
        |host| host.to_string_lossy().into_owned(),
    );

    host.replace('/', "\\057").replace(':', "\\072")
}
