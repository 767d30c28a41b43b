//! Crypto providers sealing and opening individual field values.
//!
//! Two families are supported, both exposed through [`CryptoProvider`]:
//!
//! - [`SymmetricProvider`]: AES-CBC encryption authenticated with HMAC-SHA256
//!   (encrypt-then-MAC).
//! - [`AsymmetricProvider`]: RSA-OAEP encryption with an RSA PKCS#1 v1.5
//!   signature over the ciphertext.
//!
//! New algorithms are added by parameterizing one of the families and
//! registering it under a name, not by implementing the trait elsewhere.

mod asymmetric;
mod symmetric;

pub use asymmetric::AsymmetricProvider;
pub use symmetric::{AesKeySize, SymmetricProvider};

use crate::annotation::Annotation;
use crate::envelope::CipherEnvelope;
use crate::error::Error;
use crate::key_store::KeyStore;

/// Seal/open capability shared by all provider families.
///
/// Providers are stateless. Key material is resolved from the key store on
/// every call and dropped (zeroized) before the call returns.
pub trait CryptoProvider {
    /// Returns the label written into the `Algorithm` member of every envelope.
    fn label(&self) -> &str;

    /// Encrypts and authenticates `plaintext` under the annotation's keys.
    ///
    /// # Errors
    ///
    /// Returns a missing-key error if the annotation lacks a key reference,
    /// `Error::KeyStore` if a key cannot be resolved, `Error::KeySize` or
    /// `Error::InvalidKey` for unusable key material, and
    /// `Error::EncryptionFailed` or `Error::PayloadTooLarge` if sealing fails.
    fn seal(
        &self,
        plaintext: &[u8],
        annotation: &Annotation,
        store: &dyn KeyStore,
    ) -> Result<CipherEnvelope, Error>;

    /// Verifies and decrypts an envelope under the annotation's keys.
    ///
    /// Verification always completes before any decryption is attempted.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlgorithmMismatch` if the envelope was produced by a
    /// different provider, `Error::MalformedEnvelope` for undecodable members,
    /// `Error::AuthenticationFailed` if verification fails and
    /// `Error::DecryptionFailed` if the verified ciphertext does not decrypt.
    fn open(
        &self,
        envelope: &CipherEnvelope,
        annotation: &Annotation,
        store: &dyn KeyStore,
    ) -> Result<Vec<u8>, Error>;
}

/// A registered provider, one variant per family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// AES-CBC + HMAC-SHA256.
    Symmetric(SymmetricProvider),
    /// RSA-OAEP + RSA signature.
    Asymmetric(AsymmetricProvider),
}

impl CryptoProvider for Provider {
    fn label(&self) -> &str {
        match self {
            Self::Symmetric(p) => p.label(),
            Self::Asymmetric(p) => p.label(),
        }
    }

    fn seal(
        &self,
        plaintext: &[u8],
        annotation: &Annotation,
        store: &dyn KeyStore,
    ) -> Result<CipherEnvelope, Error> {
        match self {
            Self::Symmetric(p) => p.seal(plaintext, annotation, store),
            Self::Asymmetric(p) => p.seal(plaintext, annotation, store),
        }
    }

    fn open(
        &self,
        envelope: &CipherEnvelope,
        annotation: &Annotation,
        store: &dyn KeyStore,
    ) -> Result<Vec<u8>, Error> {
        match self {
            Self::Symmetric(p) => p.open(envelope, annotation, store),
            Self::Asymmetric(p) => p.open(envelope, annotation, store),
        }
    }
}

impl From<SymmetricProvider> for Provider {
    fn from(provider: SymmetricProvider) -> Self {
        Self::Symmetric(provider)
    }
}

impl From<AsymmetricProvider> for Provider {
    fn from(provider: AsymmetricProvider) -> Self {
        Self::Asymmetric(provider)
    }
}

/// Extracts the two key references every provider family requires.
///
/// A missing first reference is always `MissingPublicKey`; the error for a
/// missing second reference depends on the family's role for that key.
fn required_key_refs<'a>(
    annotation: &'a Annotation,
    missing_second: fn(String) -> Error,
) -> Result<(&'a str, &'a str), Error> {
    let provider = annotation.algorithm();
    let first = annotation
        .key_ref(0)
        .ok_or_else(|| Error::MissingPublicKey { provider: provider.to_string() })?;
    let second = annotation.key_ref(1).ok_or_else(|| missing_second(provider.to_string()))?;
    Ok((first, second))
}

/// Rejects envelopes sealed by a provider with a different label.
fn check_label(expected: &str, envelope: &CipherEnvelope) -> Result<(), Error> {
    if envelope.algorithm() == expected {
        Ok(())
    } else {
        Err(Error::AlgorithmMismatch {
            expected: expected.to_string(),
            found: envelope.algorithm().to_string(),
        })
    }
}

/// Picks the key id to re-resolve the first key from on open.
///
/// The envelope's `KeyId` wins so that fields sealed under an earlier key stay
/// readable after the annotation moves to a new one. Only usable where the
/// authenticating key comes from the annotation (the symmetric family).
fn reopen_key_id<'a>(envelope: &'a CipherEnvelope, annotated: &'a str) -> &'a str {
    if envelope.key_id().is_empty() {
        annotated
    } else {
        envelope.key_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::key_store::MemoryKeyStore;

    #[test]
    fn test_required_key_refs_ordering() {
        let missing_private: fn(String) -> Error = |provider| Error::MissingPrivateKey { provider };

        let none = Annotation::parse("aes256");
        let err = required_key_refs(&none, missing_private).unwrap_err();
        assert!(err.is(ErrorKind::MissingPublicKey));

        let one = Annotation::parse("aes256,k1");
        let err = required_key_refs(&one, missing_private).unwrap_err();
        assert!(err.is(ErrorKind::MissingPrivateKey));

        let two = Annotation::parse("aes256,k1,k2");
        assert_eq!(required_key_refs(&two, missing_private).unwrap(), ("k1", "k2"));
    }

    #[test]
    fn test_check_label_mismatch() {
        let envelope = CipherEnvelope::from_encoded("AES-128-HMAC-SHA256", "k1", "", "", "");
        let err = check_label("AES-256-HMAC-SHA256", &envelope).unwrap_err();
        assert!(err.is(ErrorKind::AlgorithmMismatch));
    }

    #[test]
    fn test_reopen_key_id_prefers_envelope() {
        let envelope = CipherEnvelope::from_encoded("x", "old-key", "", "", "");
        assert_eq!(reopen_key_id(&envelope, "new-key"), "old-key");

        let anonymous = CipherEnvelope::from_encoded("x", "", "", "", "");
        assert_eq!(reopen_key_id(&anonymous, "new-key"), "new-key");
    }

    #[test]
    fn test_enum_dispatch_uses_family_label() {
        let provider = Provider::from(SymmetricProvider::new(AesKeySize::Aes128));
        assert_eq!(provider.label(), "AES-128-HMAC-SHA256");

        let store = MemoryKeyStore::new()
            .with_key("enc", vec![3u8; 16])
            .with_key("mac", b"mac".to_vec());
        let annotation = Annotation::parse("aes128,enc,mac");

        let envelope = provider.seal(b"\"hi\"", &annotation, &store).unwrap();
        assert_eq!(envelope.algorithm(), "AES-128-HMAC-SHA256");
        assert_eq!(provider.open(&envelope, &annotation, &store).unwrap(), b"\"hi\"");
    }
}
