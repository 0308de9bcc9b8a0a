//! Payload decoding: normalize text/binary to one string, then parse JSON.

use std::borrow::Cow;
use std::str::Utf8Error;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::bus::Payload;

/// A payload that could not be turned into the subject's data type.
///
/// The message stays unacknowledged so the broker will redeliver it.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The data type's `Deserialize` impl panicked.
    #[error("decoder panicked: {0}")]
    Panicked(String),
}

/// Bring either payload representation to text.
///
/// Text is borrowed as-is; bytes are validated as UTF-8 without copying.
pub fn normalize(payload: &Payload) -> Result<Cow<'_, str>, DecodeError> {
    match payload {
        Payload::Text(text) => Ok(Cow::Borrowed(text.as_str())),
        Payload::Binary(bytes) => Ok(Cow::Borrowed(std::str::from_utf8(bytes)?)),
    }
}

/// Decode a payload as JSON into `T`.
pub fn decode<T: DeserializeOwned>(payload: &Payload) -> Result<T, DecodeError> {
    let text = normalize(payload)?;
    Ok(serde_json::from_str(&text)?)
}
