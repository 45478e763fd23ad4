//! Text-frame codec for [`ProtocolMessage`].
//!
//! Encoding is plain serde serialization: struct field order fixes the
//! property order and no whitespace is emitted. Decoding reads the `type`
//! discriminator first so an unknown kind becomes
//! [`ProtocolMessage::Unrecognized`] instead of an error.

use crate::events::ProtocolMessage;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid json: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("frame has no string `type` discriminator")]
    MissingType,
    #[error("malformed `{kind}` message: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("`{0}` messages cannot be encoded")]
    Unrecognized(String),
    #[error("failed to serialize message: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn encode(message: &ProtocolMessage) -> Result<String, EncodeError> {
    if let ProtocolMessage::Unrecognized { kind } = message {
        return Err(EncodeError::Unrecognized(kind.clone()));
    }
    Ok(serde_json::to_string(message)?)
}

pub fn decode(text: &str) -> Result<ProtocolMessage, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(DecodeError::InvalidJson)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_string();

    if !ProtocolMessage::KINDS.contains(&kind.as_str()) {
        return Ok(ProtocolMessage::Unrecognized { kind });
    }

    serde_json::from_value(value).map_err(|source| DecodeError::Malformed { kind, source })
}
