//! Raw message payloads as the transport hands them over.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// Maximum number of characters kept by [`Payload::preview`].
const PREVIEW_LIMIT: usize = 256;

/// The body of a message, in whichever representation the transport chose.
///
/// Depending on client configuration a broker may deliver message data as
/// text or as raw bytes. Both are kept distinct here so decoding can treat
/// each one explicitly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Textual data, already valid UTF-8.
    Text(String),
    /// Raw bytes, expected (but not guaranteed) to be UTF-8 encoded.
    Binary(Vec<u8>),
}

impl Payload {
    /// Build a text payload.
    pub fn text(data: impl Into<String>) -> Self {
        Payload::Text(data.into())
    }

    /// Build a binary payload.
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Payload::Binary(data.into())
    }

    /// Serialize a value as JSON into a binary payload.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(Payload::Binary)
    }

    /// Raw bytes regardless of representation.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(s) => s.as_bytes(),
            Payload::Binary(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Short, log-safe rendering of the payload.
    ///
    /// Bytes that are not valid UTF-8 are rendered as base64 with a `base64:`
    /// prefix so nothing is lost when an operator inspects a poison message.
    pub fn preview(&self) -> String {
        let rendered = match self {
            Payload::Text(s) => s.clone(),
            Payload::Binary(b) => match std::str::from_utf8(b) {
                Ok(s) => s.to_string(),
                Err(_) => format!("base64:{}", STANDARD.encode(b)),
            },
        };

        if rendered.chars().count() > PREVIEW_LIMIT {
            let truncated: String = rendered.chars().take(PREVIEW_LIMIT).collect();
            format!("{}...", truncated)
        } else {
            rendered
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.preview())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Binary(value)
    }
}
