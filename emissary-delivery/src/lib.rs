//! Transactional mail submission and the queue processor that drains it.
//!
//! Applications submit through a [`MailDelivery`] inside an explicit
//! [`Transaction`]:
//! - [`QueuedMailDelivery`] stages the message in a maildir queue and
//!   publishes it on commit, for a [`QueueProcessor`] to send later
//! - [`DirectMailDelivery`] calls a [`Mailer`] on commit
//!
//! Nothing is sent or queued if the transaction aborts.

pub mod delivery;
pub mod error;
pub mod mailer;
pub mod message_id;
pub mod processor;
pub mod transaction;

pub use delivery::{DirectMailDelivery, MailDelivery, QueuedMailDelivery};
pub use error::{DeliveryError, MailerError, TransactionError};
pub use mailer::{Mailer, MaildirMailer, SendmailMailer};
pub use message_id::ensure_message_id;
pub use processor::{
    MalformedPolicy, ProcessorConfig, QueueProcessor, QueueProcessorThread, SweepReport,
};
pub use transaction::{DataManager, MailDataManager, Status, Transaction};
