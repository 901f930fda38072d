//! Collaborators that actually hand a message on.

mod maildir;
mod sendmail;

use std::fmt;

use async_trait::async_trait;

pub use self::{maildir::MaildirMailer, sendmail::SendmailMailer};
use crate::error::MailerError;

/// Sends one message to its recipients.
///
/// Implementations own their transport concerns (timeouts, connections,
/// authentication); callers only learn whether the hand-off succeeded.
#[async_trait]
pub trait Mailer: Send + Sync + fmt::Debug {
    /// # Errors
    /// If the message could not be handed on
    async fn send(&self, from: &str, to: &[String], message: &str) -> Result<(), MailerError>;
}
