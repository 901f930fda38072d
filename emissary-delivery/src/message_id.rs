//! `Message-Id` extraction and synthesis.

use std::borrow::Cow;

use mailparse::MailHeaderMap;
use rand::Rng;

use crate::error::DeliveryError;

/// Upper bound (exclusive) of the random component
const RANDOM_MAX: u32 = 0x7fff_ffff;

/// Make sure `message` carries a `Message-Id` header.
///
/// Returns the id without its angle brackets together with the message text
/// to submit. An existing header is left untouched; a missing one is
/// generated and prepended.
///
/// # Errors
/// - [`DeliveryError::MalformedMessageId`] if the header is not `<...>`
/// - [`DeliveryError::MalformedHeaders`] if the header block cannot be parsed
pub fn ensure_message_id(message: &str) -> Result<(String, Cow<'_, str>), DeliveryError> {
    let (headers, _) = mailparse::parse_headers(header_block(message).as_bytes())?;

    if let Some(value) = headers
        .get_first_value("Message-Id")
        .filter(|value| !value.trim().is_empty())
    {
        let id = value
            .trim()
            .strip_prefix('<')
            .and_then(|id| id.strip_suffix('>'))
            .ok_or_else(|| DeliveryError::MalformedMessageId(value.clone()))?;

        return Ok((id.to_owned(), Cow::Borrowed(message)));
    }

    let id = generate();
    let message = format!("Message-Id: <{id}>\n{message}");

    Ok((id, Cow::Owned(message)))
}

/// The leading run of header and continuation lines.
///
/// The block ends at the blank separator or at the first line that is
/// neither `Name: value` nor folded whitespace.
fn header_block(message: &str) -> &str {
    let mut end = 0;

    for line in message.split_inclusive('\n') {
        let content = line.trim_end_matches(['\r', '\n']);
        let folded = end > 0 && content.starts_with([' ', '\t']);
        let field = content.split_once(':').is_some_and(|(name, _)| {
            !name.is_empty() && name.bytes().all(|b| b.is_ascii_graphic())
        });

        if content.is_empty() || !(folded || field) {
            break;
        }
        end += line.len();
    }

    &message[..end]
}

/// `<%Y%m%d%H%M%S>.<pid>.<random>@<hostname>`, without angle brackets
pub fn generate() -> String {
    let host = hostname::get().map_or_else(
        |_| String::from("localhost"),
        |host| host.to_string_lossy().into_owned(),
    );

    format!(
        "{}.{}.{}@{host}",
        chrono::Utc::now().format("%Y%m%d%H%M%S"),
        std::process::id(),
        rand::rng().random_range(0..RANDOM_MAX)
    )
}
