//! In-memory mailer for exercising deliveries and the queue processor
//!
//! It records what it accepted and can be told to reject or panic on
//! selected recipients.
#![allow(dead_code)] // Not every test file uses every knob

use std::{
    collections::HashSet,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use emissary_delivery::{Mailer, MailerError};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub from: String,
    pub to: Vec<String>,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct StubMailer {
    sent: Mutex<Vec<SentMail>>,
    reject: Mutex<HashSet<String>>,
    panic_on: Mutex<HashSet<String>>,
    down: AtomicBool,
}

impl StubMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }

    /// Fail any message addressed to `recipient`
    pub fn reject(&self, recipient: &str) {
        self.reject.lock().insert(recipient.to_string());
    }

    /// Panic on any message addressed to `recipient`
    pub fn panic_on(&self, recipient: &str) {
        self.panic_on.lock().insert(recipient.to_string());
    }

    /// Fail every message while `down` is set
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.reject.lock().clear();
        self.panic_on.lock().clear();
        self.set_down(false);
    }
}

#[async_trait]
impl Mailer for StubMailer {
    async fn send(&self, from: &str, to: &[String], message: &str) -> Result<(), MailerError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(MailerError::Rejected("mailer is down".to_string()));
        }

        if to.iter().any(|recipient| self.panic_on.lock().contains(recipient)) {
            panic!("stub mailer asked to panic");
        }

        if let Some(recipient) = to.iter().find(|recipient| self.reject.lock().contains(*recipient)) {
            return Err(MailerError::Rejected(format!("{recipient} is unknown")));
        }

        self.sent.lock().push(SentMail {
            from: from.to_string(),
            to: to.to_vec(),
            message: message.to_string(),
        });

        Ok(())
    }
}
