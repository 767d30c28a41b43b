//! Cipher envelope substituted for an encrypted field's value.
//!
//! Wire format (JSON object, member names are case-sensitive):
//!
//! ```text
//! { "Algorithm": "<provider label>", "KeyId": "<keyRef1>",
//!   "Iv": "<base64>", "Ciphertext": "<base64>", "Signature": "<base64>" }
//! ```
//!
//! `Iv` is omitted when empty. Binary members use the standard padded base64
//! alphabet.

use crate::error::Error;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Encrypted field value together with the metadata needed to open it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CipherEnvelope {
    algorithm: String,
    key_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    iv: String,
    ciphertext: String,
    signature: String,
}

impl CipherEnvelope {
    /// Creates an envelope from raw bytes, base64-encoding the binary members.
    ///
    /// An empty `iv` produces an envelope without an `Iv` member.
    #[must_use]
    pub fn new(
        algorithm: impl Into<String>,
        key_id: impl Into<String>,
        iv: &[u8],
        ciphertext: &[u8],
        signature: &[u8],
    ) -> Self {
        Self::from_encoded(
            algorithm,
            key_id,
            encode(iv),
            encode(ciphertext),
            encode(signature),
        )
    }

    /// Creates an envelope from already-encoded members, as found on the wire.
    #[must_use]
    pub fn from_encoded(
        algorithm: impl Into<String>,
        key_id: impl Into<String>,
        iv: impl Into<String>,
        ciphertext: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            algorithm: algorithm.into(),
            key_id: key_id.into(),
            iv: iv.into(),
            ciphertext: ciphertext.into(),
            signature: signature.into(),
        }
    }

    /// Returns the provider label.
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Returns the key identifier the field was sealed under.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Returns the base64 IV, empty for providers without one.
    #[must_use]
    pub fn iv_b64(&self) -> &str {
        &self.iv
    }

    /// Returns the base64 ciphertext.
    #[must_use]
    pub fn ciphertext_b64(&self) -> &str {
        &self.ciphertext
    }

    /// Returns the base64 authentication tag or signature.
    #[must_use]
    pub fn signature_b64(&self) -> &str {
        &self.signature
    }

    /// Decodes the IV.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedEnvelope` if the member is not valid base64.
    pub fn iv(&self) -> Result<Vec<u8>, Error> {
        decode("Iv", &self.iv)
    }

    /// Decodes the ciphertext.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedEnvelope` if the member is not valid base64.
    pub fn ciphertext(&self) -> Result<Vec<u8>, Error> {
        decode("Ciphertext", &self.ciphertext)
    }

    /// Decodes the signature.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedEnvelope` if the member is not valid base64.
    pub fn signature(&self) -> Result<Vec<u8>, Error> {
        decode("Signature", &self.signature)
    }

    /// Serializes the envelope into a JSON value for embedding in a document.
    ///
    /// # Errors
    ///
    /// Returns `Error::Document` if serialization fails.
    pub fn to_value(&self) -> Result<serde_json::Value, Error> {
        serde_json::to_value(self).map_err(|e| Error::Document(format!("envelope: {e}")))
    }

    /// Parses an envelope from an embedded JSON value.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedEnvelope` if the value is not an object with
    /// the required string members.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, Error> {
        Self::deserialize(value).map_err(|e| Error::MalformedEnvelope(e.to_string()))
    }
}

/// Base64-encodes bytes with the envelope alphabet.
#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn decode(member: &str, encoded: &str) -> Result<Vec<u8>, Error> {
    STANDARD
        .decode(encoded)
        .map_err(|e| Error::MalformedEnvelope(format!("{member} is not valid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_wire_member_names() {
        let envelope = CipherEnvelope::new("AES-256-HMAC-SHA256", "k1", &[1; 16], &[2; 32], &[3; 32]);
        let value = envelope.to_value().unwrap();
        let object = value.as_object().unwrap();

        let mut names: Vec<&str> = object.keys().map(String::as_str).collect();
        names.sort_unstable();
        assert_eq!(names, ["Algorithm", "Ciphertext", "Iv", "KeyId", "Signature"]);
        assert_eq!(object["Iv"], json!("AQEBAQEBAQEBAQEBAQEBAQ=="));
    }

    #[test]
    fn test_empty_iv_is_omitted() {
        let envelope = CipherEnvelope::new("RSA-2048-OAEP-SHA1", "pub", &[], &[9; 8], &[8; 8]);
        let value = envelope.to_value().unwrap();

        assert!(value.get("Iv").is_none());
        let parsed = CipherEnvelope::from_value(&value).unwrap();
        assert_eq!(parsed.iv_b64(), "");
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_parse_wire_vector() {
        let value = json!({
            "Algorithm": "AES-256-HMAC-SHA256",
            "KeyId": "mypublickey",
            "Iv": "Cfq84/46Qjet3EEQ1HUwSg==",
            "Ciphertext": "sR6AFEIGWS5Fy9QObNOhbCgfg3vXH4NHVRK1qkhKLQqjkByg2n69lot89qFEJuBsVNTXR77PZR6RjN4h4M9evg==",
            "Signature": "rT89aCj1WosYjWHHu0mf92S195vYnEGA/reDnYelQsM=",
        });

        let envelope = CipherEnvelope::from_value(&value).unwrap();
        assert_eq!(envelope.key_id(), "mypublickey");
        assert_eq!(envelope.iv().unwrap().len(), 16);
        assert_eq!(envelope.ciphertext().unwrap().len(), 64);
        assert_eq!(envelope.signature().unwrap().len(), 32);
    }

    #[test]
    fn test_missing_member_is_malformed() {
        let value = json!({ "Algorithm": "AES-256-HMAC-SHA256", "KeyId": "k1", "Ciphertext": "AA==" });
        let err = CipherEnvelope::from_value(&value).unwrap_err();
        assert!(err.is(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_non_object_is_malformed() {
        let err = CipherEnvelope::from_value(&json!("plaintext")).unwrap_err();
        assert!(err.is(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_bad_base64_is_malformed() {
        let envelope = CipherEnvelope::from_encoded("x", "k1", "", "not base64!", "AA==");
        assert!(envelope.ciphertext().unwrap_err().is(ErrorKind::MalformedEnvelope));
    }
}
