use std::process::Stdio;

use async_trait::async_trait;
use emissary_common::internal;
use serde::Deserialize;
use tokio::{io::AsyncWriteExt, process::Command};

use super::Mailer;
use crate::error::MailerError;

fn default_command() -> String {
    String::from("/usr/sbin/sendmail")
}

fn default_args() -> Vec<String> {
    vec![String::from("-i")]
}

/// Hands messages to a sendmail-compatible command.
///
/// The command is run as `<command> <args...> -f <from> -- <to...>` with the
/// message on stdin. A non-zero exit status is a failure.
///
/// ```ron
/// Sendmail(
///     command: "/usr/sbin/sendmail",
///     args: ["-i"],
/// )
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SendmailMailer {
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

impl Default for SendmailMailer {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
        }
    }
}

impl SendmailMailer {
    pub fn new(command: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Mailer for SendmailMailer {
    #[tracing::instrument(level = "debug", skip(self, message), fields(command = %self.command))]
    async fn send(&self, from: &str, to: &[String], message: &str) -> Result<(), MailerError> {
        if to.is_empty() {
            return Err(MailerError::NoRecipients);
        }

        let mut command = Command::new(&self.command);
        command.args(&self.args);
        if !from.is_empty() {
            command.arg("-f").arg(from);
        }

        let mut child = command
            .arg("--")
            .args(to)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MailerError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let write = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(message.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };

        // stderr is drained while stdin is written
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output?;
        if !output.status.success() {
            return Err(MailerError::ExitStatus {
                command: self.command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        written?;

        internal!(level = DEBUG, "{} accepted message from {from}", self.command);

        Ok(())
    }
}
