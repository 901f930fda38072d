//! Envelope data carried in the first two lines of a queued message.
//!
//! A queued file has no structured envelope, so the sender and recipients are
//! written as two pseudo-headers ahead of the raw RFC 2822 text:
//!
//! ```text
//! X-Zope-From: sender@example.com
//! X-Zope-To: one@example.com, two@example.com
//! Message-Id: <...>
//! ...
//! ```

use std::fmt;

pub const FROM_PREFIX: &str = "X-Zope-From: ";
pub const TO_PREFIX: &str = "X-Zope-To: ";

const RECIPIENT_SEPARATOR: &str = ", ";

/// Sender and recipients of one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: Vec<String>,
}

impl Envelope {
    pub fn new(from: impl Into<String>, to: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            from: from.into(),
            to: to.into_iter().map(Into::into).collect(),
        }
    }

    /// The two envelope lines, each terminated by `\n`
    #[must_use]
    pub fn header(&self) -> String {
        format!(
            "{FROM_PREFIX}{}\n{TO_PREFIX}{}\n",
            self.from,
            self.to.join(RECIPIENT_SEPARATOR)
        )
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from {} to {}", self.from, self.to.join(RECIPIENT_SEPARATOR))
    }
}

/// A queued file split back into its envelope and message text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage<'a> {
    /// `None` when the file did not start with both envelope lines
    pub envelope: Option<Envelope>,
    pub body: &'a str,
}

impl<'a> QueuedMessage<'a> {
    /// Split `content` on its first two newlines.
    ///
    /// Both envelope lines must be present for the envelope to be recognised.
    /// Anything else leaves the content untouched as the body, so a file
    /// written by something other than a queued delivery is never truncated.
    pub fn parse(content: &'a str) -> Self {
        let unrecognised = Self {
            envelope: None,
            body: content,
        };

        let mut parts = content.splitn(3, '\n');
        let (Some(first), Some(second), Some(rest)) = (parts.next(), parts.next(), parts.next())
        else {
            return unrecognised;
        };

        let (Some(from), Some(to)) = (
            first.strip_prefix(FROM_PREFIX),
            second.strip_prefix(TO_PREFIX),
        ) else {
            return unrecognised;
        };

        let to = to
            .split(RECIPIENT_SEPARATOR)
            .filter(|recipient| !recipient.is_empty())
            .map(str::to_owned)
            .collect();

        Self {
            envelope: Some(Envelope {
                from: from.to_owned(),
                to,
            }),
            body: rest,
        }
    }

    /// Sender, or the empty string when no envelope was found
    pub fn from(&self) -> &str {
        self.envelope.as_ref().map_or("", |envelope| &envelope.from)
    }

    /// Recipients, or an empty slice when no envelope was found
    pub fn to(&self) -> &[String] {
        self.envelope
            .as_ref()
            .map(|envelope| envelope.to.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn header_joins_recipients() {
        let envelope = Envelope::new("jim@example.com", ["a@example.com", "b@example.com"]);

        assert_eq!(
            envelope.header(),
            "X-Zope-From: jim@example.com\nX-Zope-To: a@example.com, b@example.com\n"
        );
    }

    #[test]
    fn parse_recovers_what_header_wrote() {
        let envelope = Envelope::new("jim@example.com", ["a@example.com", "b@example.com"]);
        let body = "Subject: hi\n\nHello\nWorld\n";
        let content = format!("{}{body}", envelope.header());

        let parsed = QueuedMessage::parse(&content);

        assert_eq!(parsed.envelope, Some(envelope));
        assert_eq!(parsed.body, body);
    }

    #[test]
    fn parse_without_envelope_keeps_content() {
        let content = "Subject: hi\nFrom: jim@example.com\n\nbody\n";

        let parsed = QueuedMessage::parse(content);

        assert_eq!(parsed.envelope, None);
        assert_eq!(parsed.from(), "");
        assert!(parsed.to().is_empty());
        assert_eq!(parsed.body, content);
    }

    #[test]
    fn parse_requires_both_lines() {
        let content = "X-Zope-From: jim@example.com\nSubject: hi\n\nbody\n";

        let parsed = QueuedMessage::parse(content);

        assert_eq!(parsed.envelope, None);
        assert_eq!(parsed.body, content);
    }

    #[test]
    fn parse_short_content() {
        let parsed = QueuedMessage::parse("X-Zope-From: jim@example.com\n");

        assert_eq!(parsed.envelope, None);
        assert_eq!(parsed.body, "X-Zope-From: jim@example.com\n");
    }

    #[test]
    fn parse_empty_recipient_list() {
        let parsed = QueuedMessage::parse("X-Zope-From: jim@example.com\nX-Zope-To: \nbody");

        assert_eq!(parsed.from(), "jim@example.com");
        assert!(parsed.to().is_empty());
        assert_eq!(parsed.body, "body");
    }
}
