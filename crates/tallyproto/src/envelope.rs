//! Application event envelope.
//!
//! Every application message is a JSON-ish array whose first element is the
//! event name: `["<event>"]` or `["<event>",<body>]`. Decoding pulls out the
//! name and keeps the body as raw text; nothing here assumes the body is
//! valid JSON; that is up to whichever handler deserializes it.

use thiserror::Error;

/// A decoded envelope: event name plus the raw, unparsed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFrame {
    pub name: String,
    pub body: Option<String>,
}

impl EventFrame {
    pub fn new(name: impl Into<String>, body: Option<String>) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    /// Body text, if any.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Re-encode in wire form.
    pub fn encode(&self) -> String {
        encode_event(&self.name, self.body())
    }
}

/// Why an envelope could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("envelope does not start with '['")]
    NotAnArray,

    #[error("envelope does not start with a quoted event name")]
    MissingEventName,

    #[error("event name is not terminated")]
    UnterminatedEventName,

    #[error("event name is empty")]
    EmptyEventName,

    #[error("envelope is missing its closing ']'")]
    MissingClosingBracket,

    #[error("expected ',' or ']' after event name, found {0:?}")]
    UnexpectedAfterName(String),

    #[error("envelope has a separator but no body")]
    EmptyBody,
}

/// Split `["<event>",<body>]` into name and raw body.
pub fn decode_event(text: &str) -> Result<EventFrame, EnvelopeError> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .ok_or(EnvelopeError::NotAnArray)?
        .trim_start();

    let after_quote = inner
        .strip_prefix('"')
        .ok_or(EnvelopeError::MissingEventName)?;
    let end = after_quote
        .find('"')
        .ok_or(EnvelopeError::UnterminatedEventName)?;
    let name = &after_quote[..end];
    if name.is_empty() {
        return Err(EnvelopeError::EmptyEventName);
    }

    let rest = after_quote[end + 1..]
        .strip_suffix(']')
        .ok_or(EnvelopeError::MissingClosingBracket)?
        .trim();

    if rest.is_empty() {
        return Ok(EventFrame::new(name, None));
    }

    let body = rest
        .strip_prefix(',')
        .ok_or_else(|| EnvelopeError::UnexpectedAfterName(rest.chars().take(16).collect()))?
        .trim();
    if body.is_empty() {
        return Err(EnvelopeError::EmptyBody);
    }

    Ok(EventFrame::new(name, Some(body.to_string())))
}

/// Wrap an event name and optional raw payload in the envelope.
pub fn encode_event(name: &str, payload: Option<&str>) -> String {
    match payload {
        Some(payload) => format!("[\"{}\",{}]", name, payload),
        None => format!("[\"{}\"]", name),
    }
}
