//! Identity verification requests and the signed payload layout.
//!
//! The platform signs the concatenation
//!
//! ```text
//! player_id (UTF-8) || bundle_id (UTF-8) || timestamp (u64, big-endian) || salt
//! ```
//!
//! with no length prefixes or delimiters, so field order is the only framing.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// Standard alphabet, padding optional on decode.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Values reported by the client's local player identity call.
///
/// All fields are required and kept as text, exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    /// URL of the signing certificate.
    pub public_key_url: String,

    pub player_id: String,

    pub bundle_id: String,

    /// Unsigned 64-bit integer in decimal.
    pub timestamp: String,

    /// Base64 signature.
    pub signature: String,

    /// Base64 salt.
    pub salt: String,
}

/// Binary fields of a request after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFields {
    pub timestamp: u64,
    pub signature: Vec<u8>,
    pub salt: Vec<u8>,
}

impl VerificationRequest {
    pub fn new(
        public_key_url: impl Into<String>,
        player_id: impl Into<String>,
        bundle_id: impl Into<String>,
        timestamp: impl Into<String>,
        signature: impl Into<String>,
        salt: impl Into<String>,
    ) -> Self {
        Self {
            public_key_url: public_key_url.into(),
            player_id: player_id.into(),
            bundle_id: bundle_id.into(),
            timestamp: timestamp.into(),
            signature: signature.into(),
            salt: salt.into(),
        }
    }

    /// Decode salt, signature and timestamp.
    pub fn decode(&self) -> AuthResult<DecodedFields> {
        Ok(DecodedFields {
            salt: decode_base64("salt", &self.salt)?,
            signature: decode_base64("signature", &self.signature)?,
            timestamp: parse_timestamp(&self.timestamp)?,
        })
    }

    /// Rebuild the signed payload for this request.
    pub fn payload(&self, fields: &DecodedFields) -> Vec<u8> {
        build_payload(
            &self.player_id,
            &self.bundle_id,
            fields.timestamp,
            &fields.salt,
        )
    }
}

/// Concatenate the signed fields in platform order.
pub fn build_payload(player_id: &str, bundle_id: &str, timestamp: u64, salt: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(player_id.len() + bundle_id.len() + 8 + salt.len());
    payload.extend_from_slice(player_id.as_bytes());
    payload.extend_from_slice(bundle_id.as_bytes());
    payload.extend_from_slice(&timestamp.to_be_bytes());
    payload.extend_from_slice(salt);
    payload
}

/// Encode bytes the way clients submit them.
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

fn decode_base64(field: &'static str, value: &str) -> AuthResult<Vec<u8>> {
    BASE64.decode(value).map_err(|e| AuthError::Decode {
        field,
        message: e.to_string(),
    })
}

fn parse_timestamp(value: &str) -> AuthResult<u64> {
    value.parse::<u64>().map_err(|e| AuthError::Decode {
        field: "timestamp",
        message: format!("{}: {:?}", e, value),
    })
}
