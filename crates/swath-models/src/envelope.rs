//! Result envelope produced by a finished process.
//!
//! The payload crosses a text-only store, so it is stored as a versioned
//! JSON record with the bytes in standard base64:
//!
//! ```json
//! {"v":1,"content_type":"image/png","payload":"iVBORw0KGgo..."}
//! ```
//!
//! Decoding is strict and never evaluates stored text.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current envelope record version.
pub const ENVELOPE_VERSION: u32 = 1;

/// Errors raised while decoding a stored envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Malformed envelope record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported envelope version {0}")]
    UnsupportedVersion(u32),

    #[error("Envelope has an empty content type")]
    MissingContentType,

    #[error("Envelope payload is not valid base64: {0}")]
    InvalidPayload(#[from] base64::DecodeError),
}

/// Content type and bytes of a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEnvelope {
    pub content_type: String,
    pub payload: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnvelopeRecord {
    v: u32,
    content_type: String,
    payload: String,
}

impl ResultEnvelope {
    pub fn new(content_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            payload,
        }
    }

    /// Encode into the stored text form.
    pub fn encode(&self) -> String {
        let record = EnvelopeRecord {
            v: ENVELOPE_VERSION,
            content_type: self.content_type.clone(),
            payload: STANDARD.encode(&self.payload),
        };
        // A struct of one integer and two strings always serializes.
        serde_json::to_string(&record).unwrap_or_default()
    }

    /// Decode the stored text form.
    pub fn decode(stored: &str) -> Result<Self, EnvelopeError> {
        let record: EnvelopeRecord = serde_json::from_str(stored)?;
        if record.v != ENVELOPE_VERSION {
            return Err(EnvelopeError::UnsupportedVersion(record.v));
        }
        if record.content_type.trim().is_empty() {
            return Err(EnvelopeError::MissingContentType);
        }
        let payload = STANDARD.decode(record.payload.as_bytes())?;
        Ok(Self {
            content_type: record.content_type,
            payload,
        })
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    #[test]
    fn test_payload_sizes_survive_encoding() {
        for len in [0usize, 1, 700, 1024 * 1024 + 17] {
            let envelope = ResultEnvelope::new("image/png", pattern(len));
            let decoded = ResultEnvelope::decode(&envelope.encode()).unwrap();
            assert_eq!(decoded, envelope, "payload of {} bytes", len);
        }
    }

    #[test]
    fn test_encoded_form_is_versioned() {
        let stored = ResultEnvelope::new("text/plain", b"hi".to_vec()).encode();
        let value: serde_json::Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(value["v"], 1);
        assert_eq!(value["content_type"], "text/plain");
        assert_eq!(value["payload"], "aGk=");
    }

    #[test]
    fn test_rejects_non_json_literal() {
        let err = ResultEnvelope::decode("['image/png', b'abc']").unwrap_err();
        assert!(matches!(err, EnvelopeError::Malformed(_)));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let err = ResultEnvelope::decode(r#"{"v":2,"content_type":"image/png","payload":""}"#)
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::UnsupportedVersion(2)));
    }

    #[test]
    fn test_rejects_missing_content_type() {
        let err = ResultEnvelope::decode(r#"{"v":1,"content_type":" ","payload":""}"#)
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::MissingContentType));
    }

    #[test]
    fn test_rejects_bad_base64() {
        let err = ResultEnvelope::decode(r#"{"v":1,"content_type":"image/png","payload":"%%%"}"#)
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidPayload(_)));
    }

    #[test]
    fn test_rejects_extra_fields() {
        let err = ResultEnvelope::decode(
            r#"{"v":1,"content_type":"image/png","payload":"","code":"x"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, EnvelopeError::Malformed(_)));
    }
}
