use std::{io::Write, path::PathBuf};

use async_trait::async_trait;
use emissary_common::internal;
use emissary_maildir::Maildir;
use serde::Deserialize;

use super::Mailer;
use crate::error::MailerError;

/// Local delivery into a maildir, one file per message.
///
/// The message is prefixed with a `Return-Path` header carrying the sender.
/// Recipients are not recorded; every message lands in the same maildir.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MaildirMailer {
    pub path: PathBuf,
    #[serde(default)]
    pub create: bool,
}

impl MaildirMailer {
    pub fn new(path: impl Into<PathBuf>, create: bool) -> Self {
        Self {
            path: path.into(),
            create,
        }
    }
}

#[async_trait]
impl Mailer for MaildirMailer {
    async fn send(&self, from: &str, to: &[String], message: &str) -> Result<(), MailerError> {
        if to.is_empty() {
            return Err(MailerError::NoRecipients);
        }

        let path = self.path.clone();
        let create = self.create;
        let content = format!("Return-Path: <{from}>\n{message}");

        tokio::task::spawn_blocking(move || -> Result<(), MailerError> {
            let maildir = Maildir::open(&path, create)?;
            let mut writer = maildir.new_message()?;
            writer.write_all(content.as_bytes())?;
            writer.commit()?;

            internal!(level = DEBUG, "Delivered locally to {}", writer.new_path().display());

            Ok(())
        })
        .await
        .map_err(|e| MailerError::Rejected(format!("local delivery task failed: {e}")))?
    }
}
