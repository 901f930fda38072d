//! Application-facing mail submission.

use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use emissary_common::{Envelope, internal};
use emissary_maildir::Maildir;
use parking_lot::Mutex;

use crate::{
    error::DeliveryError,
    mailer::Mailer,
    message_id::ensure_message_id,
    transaction::{MailDataManager, Transaction},
};

/// Submits messages as part of a [`Transaction`].
///
/// Implementations only decide what gets deferred, through
/// [`create_data_manager`](Self::create_data_manager); [`send`](Self::send)
/// takes care of the `Message-Id` and of joining the transaction.
pub trait MailDelivery {
    /// Build the participant that performs the delivery on commit.
    ///
    /// `message` already carries its `Message-Id`.
    ///
    /// # Errors
    /// If the delivery cannot be staged
    fn create_data_manager(
        &self,
        from: &str,
        to: &[String],
        message: &str,
    ) -> Result<MailDataManager, DeliveryError>;

    /// Submit `message`, to take effect only if `transaction` commits.
    ///
    /// Returns the message's `Message-Id` without angle brackets; one is
    /// generated and added to the message when it has none.
    ///
    /// # Errors
    /// - [`DeliveryError::MalformedMessageId`] for a `Message-Id` not wrapped in `<...>`
    /// - Anything [`create_data_manager`](Self::create_data_manager) raises
    fn send(
        &self,
        transaction: &mut Transaction,
        from: &str,
        to: &[String],
        message: &str,
    ) -> Result<String, DeliveryError> {
        let (message_id, message) = ensure_message_id(message)?;
        let manager = self.create_data_manager(from, to, &message)?;
        transaction.join(manager);

        Ok(message_id)
    }
}

/// Queues messages in a maildir for a [`QueueProcessor`](crate::QueueProcessor).
///
/// The message is written to the queue's `tmp` as soon as it is submitted;
/// committing the transaction moves it into `new`, aborting deletes it.
#[derive(Debug, Clone)]
pub struct QueuedMailDelivery {
    queue_path: PathBuf,
}

impl QueuedMailDelivery {
    pub fn new(queue_path: impl Into<PathBuf>) -> Self {
        Self {
            queue_path: queue_path.into(),
        }
    }

    pub fn queue_path(&self) -> &Path {
        &self.queue_path
    }
}

impl MailDelivery for QueuedMailDelivery {
    fn create_data_manager(
        &self,
        from: &str,
        to: &[String],
        message: &str,
    ) -> Result<MailDataManager, DeliveryError> {
        let maildir = Maildir::open(&self.queue_path, true)?;
        let mut writer = maildir.new_message()?;

        let envelope = Envelope {
            from: from.to_owned(),
            to: to.to_vec(),
        };
        writer.write_all(envelope.header().as_bytes())?;
        writer.write_all(message.as_bytes())?;

        internal!(
            level = DEBUG,
            "Staged message {envelope} at {}",
            writer.tmp_path().display()
        );

        let writer = Arc::new(Mutex::new(writer));
        let on_abort = Arc::clone(&writer);

        Ok(
            MailDataManager::new(move || async move {
                writer.lock().commit().map_err(DeliveryError::from)
            })
            .with_abort(move || on_abort.lock().abort().map_err(DeliveryError::from)),
        )
    }
}

/// Sends messages straight through a [`Mailer`] when the transaction commits.
///
/// Nothing is staged, so an abort has nothing to undo. A mailer failure is
/// returned from the commit.
#[derive(Debug, Clone)]
pub struct DirectMailDelivery {
    mailer: Arc<dyn Mailer>,
}

impl DirectMailDelivery {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

impl MailDelivery for DirectMailDelivery {
    fn create_data_manager(
        &self,
        from: &str,
        to: &[String],
        message: &str,
    ) -> Result<MailDataManager, DeliveryError> {
        let mailer = Arc::clone(&self.mailer);
        let envelope = Envelope {
            from: from.to_owned(),
            to: to.to_vec(),
        };
        let message = message.to_owned();

        Ok(MailDataManager::new(move || async move {
            mailer
                .send(&envelope.from, &envelope.to, &message)
                .await
                .map_err(DeliveryError::from)
        }))
    }
}
