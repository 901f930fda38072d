use std::{path::Path, sync::LazyLock};

use emissary_common::{Shutdown, Signal, internal, logging};
use emissary_delivery::{DirectMailDelivery, ProcessorConfig, QueueProcessor, QueuedMailDelivery};
use emissary_maildir::Maildir;
use serde::Deserialize;
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::broadcast,
};

use crate::config::{ConfigError, MailerConfig, QueueConfig, from_ron};

/// Top-level configuration
///
/// ```ron
/// Emissary(
///     queue: (path: "/var/spool/emissary", create: true),
///     processor: (poll_interval_secs: 3, malformed: Quarantine),
///     mailer: Sendmail(command: "/usr/sbin/sendmail", args: ["-i"]),
/// )
/// ```
#[derive(Debug, Deserialize)]
pub struct Emissary {
    queue: QueueConfig,
    #[serde(default)]
    processor: ProcessorConfig,
    #[serde(default)]
    mailer: MailerConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Wait for Ctrl-C or `SIGTERM`, then ask the queue processor to stop.
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;

    let received = tokio::select! {
        r = tokio::signal::ctrl_c() => {
            r?;
            "Ctrl-C"
        }
        _ = terminate.recv() => "SIGTERM",
    };
    internal!(
        level = INFO,
        "{received} received, stopping after the current delivery (Ctrl-C again to force)"
    );

    // Sending fails only once the processor has already dropped its token.
    let _ = SHUTDOWN_BROADCAST.send(Signal::Shutdown);

    Ok(())
}

impl Emissary {
    /// Read and parse a RON configuration file
    ///
    /// # Errors
    /// If the file cannot be read or is not a valid configuration
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        from_ron(&content)
    }

    pub const fn queue(&self) -> &QueueConfig {
        &self.queue
    }

    pub const fn processor(&self) -> &ProcessorConfig {
        &self.processor
    }

    pub const fn mailer(&self) -> &MailerConfig {
        &self.mailer
    }

    /// Open the configured queue
    ///
    /// # Errors
    /// If it is missing and may not be created, or is not a maildir
    pub fn open_queue(&self) -> emissary_maildir::Result<Maildir> {
        Maildir::open(self.queue.path(), self.queue.create())
    }

    /// Submission that goes through the queue
    pub fn queued_delivery(&self) -> QueuedMailDelivery {
        QueuedMailDelivery::new(self.queue.path())
    }

    /// Submission that bypasses the queue
    pub fn direct_delivery(&self) -> DirectMailDelivery {
        DirectMailDelivery::new(self.mailer.build())
    }

    /// # Errors
    /// If the queue cannot be opened
    pub fn queue_processor(&self) -> emissary_maildir::Result<QueueProcessor> {
        Ok(QueueProcessor::new(
            self.open_queue()?,
            self.mailer.build(),
            self.processor.clone(),
        ))
    }

    /// Process the queue until Ctrl-C or `SIGTERM`.
    ///
    /// The delivery in flight when the signal arrives is allowed to finish; a
    /// second Ctrl-C abandons it.
    ///
    /// # Errors
    ///
    /// This function will return an error if the queue cannot be opened or
    /// the signal handlers cannot be installed.
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let processor = self.queue_processor()?;

        internal!("Controller running");

        let serve = processor.serve(Shutdown::new(SHUTDOWN_BROADCAST.subscribe()));
        tokio::pin!(serve);

        tokio::select! {
            () = &mut serve => {
                return Ok(());
            }
            r = shutdown() => {
                r?;
            }
        };

        internal!("Shutting down...");

        tokio::select! {
            () = serve => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Forced shutdown, the message being sent may be sent again");
            }
        };

        Ok(())
    }
}
