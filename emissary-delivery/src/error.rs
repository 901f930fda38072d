//! Typed error handling for mail submission and queue processing.
//!
//! Errors are split by who sees them:
//! - Submission errors (bad `Message-Id`, unusable queue) surface from `send()`
//! - Mailer errors surface from a direct delivery's commit, or are logged by
//!   the queue processor
//! - Transaction errors come from driving the two-phase commit itself

use std::{io, process::ExitStatus};

use emissary_maildir::MaildirError;
use thiserror::Error;

/// Top-level delivery error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The message carries a `Message-Id` that is not wrapped in `<...>`.
    #[error("Malformed Message-Id header: {0}")]
    MalformedMessageId(String),

    /// The message headers could not be parsed at all.
    #[error("Malformed message headers: {0}")]
    MalformedHeaders(#[from] mailparse::MailParseError),

    /// The queue could not be opened, written or committed.
    #[error("Queue error: {0}")]
    Queue(#[from] MaildirError),

    /// The mailer refused or failed to send the message.
    #[error("Mailer error: {0}")]
    Mailer(#[from] MailerError),

    /// The two-phase commit could not proceed.
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// I/O error outside the queue itself.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DeliveryError {
    /// Returns `true` if the caller handed in a message that can never be sent as is.
    #[must_use]
    pub const fn is_malformed_input(&self) -> bool {
        matches!(self, Self::MalformedMessageId(_) | Self::MalformedHeaders(_))
    }
}

/// Errors raised while driving a transaction's participants.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Nested transactions were requested from a participant that has none.
    #[error("Subtransactions are not implemented")]
    SubtransactionsUnsupported,
}

/// Errors raised by [`Mailer`](crate::Mailer) implementations.
#[derive(Debug, Error)]
pub enum MailerError {
    /// The message has nobody to go to.
    #[error("No recipients given")]
    NoRecipients,

    /// The external command could not be started.
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The external command ran but reported failure.
    #[error("{command} exited with {status}: {stderr}")]
    ExitStatus {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    /// Local delivery into a maildir failed.
    #[error("Local delivery failed: {0}")]
    Maildir(#[from] MaildirError),

    /// I/O error while talking to the mailer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The mailer rejected the message for its own reasons.
    #[error("Rejected: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_input() {
        let error = DeliveryError::MalformedMessageId("abc@example.com".to_string());
        assert!(error.is_malformed_input());
        assert_eq!(
            error.to_string(),
            "Malformed Message-Id header: abc@example.com"
        );

        let error = DeliveryError::from(MailerError::NoRecipients);
        assert!(!error.is_malformed_input());
    }

    #[test]
    fn test_error_chain() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error = DeliveryError::from(MaildirError::from(io_err));

        assert!(matches!(error, DeliveryError::Queue(MaildirError::Io(_))));
        assert!(error.to_string().contains("access denied"));
    }

    #[test]
    fn test_transaction_error_message() {
        let error = DeliveryError::from(TransactionError::SubtransactionsUnsupported);
        assert_eq!(
            error.to_string(),
            "Transaction error: Subtransactions are not implemented"
        );
    }
}
