//! Queue processor: drains the outbound maildir through a [`Mailer`].

mod thread;

use std::{
    any::Any,
    io,
    panic::AssertUnwindSafe,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use emissary_common::{Envelope, QueuedMessage, Shutdown, internal};
use emissary_maildir::Maildir;
use futures_util::FutureExt;
use serde::Deserialize;
use tracing::{error, info, warn};

pub use self::thread::QueueProcessorThread;
use crate::{error::DeliveryError, mailer::Mailer};

const fn default_poll_interval() -> u64 {
    3
}

/// What to do with a queued file that does not start with an envelope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum MalformedPolicy {
    /// Move it out of the way (`cur/.quarantine.<name>`) and keep going
    #[default]
    Quarantine,
    /// Hand the whole file to the mailer with an empty sender and no recipients
    Deliver,
}

/// Processor settings
///
/// ```ron
/// (
///     poll_interval_secs: 3,
///     malformed: Quarantine,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessorConfig {
    /// Pause between two sweeps of the queue (in seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub malformed: MalformedPolicy,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            malformed: MalformedPolicy::default(),
        }
    }
}

impl ProcessorConfig {
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Counts from one pass over the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sent and removed from the queue
    pub delivered: usize,
    /// Left in place for the next sweep
    pub failed: usize,
    /// Moved aside as malformed
    pub quarantined: usize,
    /// Gone before they could be read
    pub skipped: usize,
    /// The pass stopped early on a shutdown request
    pub interrupted: bool,
}

impl SweepReport {
    /// Number of files the pass looked at
    pub const fn seen(&self) -> usize {
        self.delivered + self.failed + self.quarantined + self.skipped
    }
}

enum Outcome {
    Delivered(Envelope),
    Quarantined(PathBuf),
    Skipped,
}

struct Failure {
    envelope: Option<Envelope>,
    error: DeliveryError,
}

impl Failure {
    fn new(envelope: Option<Envelope>, error: impl Into<DeliveryError>) -> Self {
        Self {
            envelope,
            error: error.into(),
        }
    }
}

/// Sends everything found in a queue maildir, deleting each file once the
/// mailer has accepted it.
///
/// A file that fails (or panics the mailer) is logged and left where it is,
/// so it is retried on the next sweep.
#[derive(Debug, Clone)]
pub struct QueueProcessor {
    maildir: Maildir,
    mailer: Arc<dyn Mailer>,
    config: ProcessorConfig,
}

impl QueueProcessor {
    pub fn new(maildir: Maildir, mailer: Arc<dyn Mailer>, config: ProcessorConfig) -> Self {
        Self {
            maildir,
            mailer,
            config,
        }
    }

    pub const fn maildir(&self) -> &Maildir {
        &self.maildir
    }

    pub const fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// One pass over the queue.
    ///
    /// `shutdown` is checked before every file; once tripped the remaining
    /// files are left for a later run.
    #[tracing::instrument(name = "QueueProcessorThread", skip_all, fields(queue = %self.maildir.path().display()))]
    pub async fn sweep(&self, shutdown: &mut Shutdown) -> SweepReport {
        let mut report = SweepReport::default();

        let messages = match self.maildir.messages() {
            Ok(messages) => messages,
            Err(e) => {
                error!("Unable to list the queue: {e}");
                return report;
            }
        };

        for path in messages {
            if shutdown.is_requested() {
                internal!(level = DEBUG, "Shutdown requested, leaving the rest of the queue");
                report.interrupted = true;
                break;
            }

            match AssertUnwindSafe(self.process_file(&path)).catch_unwind().await {
                Ok(Ok(Outcome::Delivered(envelope))) => {
                    report.delivered += 1;
                    info!(
                        "Mail from {} to {} sent.",
                        envelope.from,
                        envelope.to.join(", ")
                    );
                }
                Ok(Ok(Outcome::Quarantined(target))) => {
                    report.quarantined += 1;
                    warn!(
                        "Queued file {} has no envelope, quarantined as {}",
                        path.display(),
                        target.display()
                    );
                }
                Ok(Ok(Outcome::Skipped)) => {
                    report.skipped += 1;
                    internal!(level = DEBUG, "{} vanished before it was read", path.display());
                }
                Ok(Err(Failure { envelope, error })) => {
                    report.failed += 1;
                    log_failure(&path, envelope.as_ref(), &error);
                }
                Err(panic) => {
                    report.failed += 1;
                    log_failure(&path, None, &panic_message(panic.as_ref()));
                }
            }
        }

        report
    }

    /// Sweep, sleep, repeat until `shutdown` trips.
    ///
    /// A shutdown request interrupts the sleep as well as the sweep, but never
    /// an in-flight delivery.
    pub async fn serve(&self, mut shutdown: Shutdown) {
        let interval = self.config.poll_interval();
        internal!(
            level = INFO,
            "Processing {} every {}s",
            self.maildir.path().display(),
            interval.as_secs()
        );

        while !shutdown.is_requested() {
            let report = self.sweep(&mut shutdown).await;
            if report.seen() > 0 {
                internal!(level = DEBUG, "Sweep finished: {report:?}");
            }

            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = shutdown.requested() => {}
            }
        }

        internal!(level = INFO, "Queue processor stopped");
    }

    async fn process_file(&self, path: &Path) -> Result<Outcome, Failure> {
        let content = match tokio::fs::read(path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Outcome::Skipped),
            Err(e) => return Err(Failure::new(None, e)),
        };

        let queued = QueuedMessage::parse(&content);
        if queued.envelope.is_none() && self.config.malformed == MalformedPolicy::Quarantine {
            return self
                .maildir
                .quarantine(path)
                .map(Outcome::Quarantined)
                .map_err(|e| Failure::new(None, e));
        }

        self.mailer
            .send(queued.from(), queued.to(), queued.body)
            .await
            .map_err(|e| Failure::new(queued.envelope.clone(), e))?;

        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                internal!(level = WARN, "{} was removed while being sent", path.display());
            }
            Err(e) => return Err(Failure::new(queued.envelope, e)),
        }

        Ok(Outcome::Delivered(queued.envelope.unwrap_or_default()))
    }
}

fn log_failure(path: &Path, envelope: Option<&Envelope>, error: &dyn std::fmt::Display) {
    match envelope {
        Some(envelope) if !envelope.from.is_empty() || !envelope.to.is_empty() => {
            error!(
                "Error while sending mail from {} to {}: {error}",
                envelope.from,
                envelope.to.join(", ")
            );
        }
        _ => error!("Error while sending mail {}: {error}", path.display()),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .map_or_else(
            || String::from("mailer panicked"),
            |message| format!("mailer panicked: {message}"),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ProcessorConfig::default();

        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.malformed, MalformedPolicy::Quarantine);
    }

    #[test]
    fn report_counts_every_outcome() {
        let report = SweepReport {
            delivered: 2,
            failed: 1,
            quarantined: 1,
            skipped: 3,
            interrupted: false,
        };

        assert_eq!(report.seen(), 7);
        assert_eq!(SweepReport::default().seen(), 0);
    }

    #[test]
    fn panic_payloads_are_described() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "mailer panicked: boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "mailer panicked: owned");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "mailer panicked");
    }
}
