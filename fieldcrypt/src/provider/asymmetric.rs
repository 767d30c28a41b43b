//! RSA-OAEP encryption signed with RSASSA-PKCS1-v1_5.
//!
//! Seal encrypts the plaintext under the public key (OAEP, SHA-1 digest and
//! MGF1) and signs the raw ciphertext with the private key (PKCS#1 v1.5 over
//! SHA-256). Open verifies the signature before decrypting.

use super::{check_label, required_key_refs, CryptoProvider};
use crate::annotation::Annotation;
use crate::envelope::CipherEnvelope;
use crate::error::Error;
use crate::key_store::KeyStore;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use secrecy::ExposeSecret;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// OAEP overhead with SHA-1: two digest lengths plus two bytes.
const OAEP_SHA1_OVERHEAD: usize = 2 * 20 + 2;

/// Asymmetric encrypt+sign provider for a fixed modulus size.
///
/// Key references: `[0]` the public key (encryption role), `[1]` the private
/// key (private role). Keys are DER (PKCS#1, SPKI or PKCS#8) or the matching
/// PEM encodings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsymmetricProvider {
    modulus_bits: usize,
    label: String,
}

impl AsymmetricProvider {
    /// Creates a provider for keys with the given modulus size in bits.
    #[must_use]
    pub fn new(modulus_bits: usize) -> Self {
        Self { modulus_bits, label: format!("RSA-{modulus_bits}-OAEP-SHA1") }
    }

    /// Returns the modulus size in bits.
    #[must_use]
    pub const fn modulus_bits(&self) -> usize {
        self.modulus_bits
    }

    /// Returns the largest plaintext, in bytes, a single seal accepts.
    #[must_use]
    pub const fn max_payload(&self) -> usize {
        (self.modulus_bits / 8).saturating_sub(OAEP_SHA1_OVERHEAD)
    }

    fn check_modulus(&self, key_id: &str, size: usize) -> Result<(), Error> {
        let expected = self.modulus_bits / 8;
        if size == expected {
            Ok(())
        } else {
            Err(Error::KeySize { key_id: key_id.to_string(), expected, actual: size })
        }
    }

    fn public_key(&self, key_id: &str, store: &dyn KeyStore) -> Result<RsaPublicKey, Error> {
        let encoded = store.encryption_key(key_id)?;
        let key = decode_public(encoded.expose_secret())
            .map_err(|reason| Error::InvalidKey { key_id: key_id.to_string(), reason })?;
        self.check_modulus(key_id, key.size())?;
        Ok(key)
    }

    fn private_key(&self, key_id: &str, store: &dyn KeyStore) -> Result<RsaPrivateKey, Error> {
        let encoded = store.signing_or_decryption_key(key_id)?;
        let key = decode_private(encoded.expose_secret())
            .map_err(|reason| Error::InvalidKey { key_id: key_id.to_string(), reason })?;
        self.check_modulus(key_id, key.size())?;
        Ok(key)
    }
}

impl CryptoProvider for AsymmetricProvider {
    fn label(&self) -> &str {
        &self.label
    }

    fn seal(
        &self,
        plaintext: &[u8],
        annotation: &Annotation,
        store: &dyn KeyStore,
    ) -> Result<CipherEnvelope, Error> {
        let (public_ref, private_ref) =
            required_key_refs(annotation, |provider| Error::MissingSigningKey { provider })?;

        let public = self.public_key(public_ref, store)?;
        let private = self.private_key(private_ref, store)?;

        let max = self.max_payload();
        if plaintext.len() > max {
            return Err(Error::PayloadTooLarge { max, actual: plaintext.len() });
        }

        let ciphertext = public
            .encrypt(&mut OsRng, Oaep::new::<Sha1>(), plaintext)
            .map_err(|e| Error::EncryptionFailed(format!("RSA-OAEP: {e}")))?;

        let digest = Sha256::digest(&ciphertext);
        let signature = private
            .sign_with_rng(&mut OsRng, Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| Error::EncryptionFailed(format!("RSA signature: {e}")))?;

        Ok(CipherEnvelope::new(&self.label, public_ref, &[], &ciphertext, &signature))
    }

    fn open(
        &self,
        envelope: &CipherEnvelope,
        annotation: &Annotation,
        store: &dyn KeyStore,
    ) -> Result<Vec<u8>, Error> {
        let (public_ref, private_ref) =
            required_key_refs(annotation, |provider| Error::MissingSigningKey { provider })?;
        check_label(&self.label, envelope)?;

        // Signatures verify only against the annotated public key.
        if !envelope.key_id().is_empty() && envelope.key_id() != public_ref {
            return Err(Error::AuthenticationFailed);
        }

        let ciphertext = envelope.ciphertext()?;
        let signature = envelope.signature()?;

        let public = self.public_key(public_ref, store)?;
        let private = self.private_key(private_ref, store)?;

        let digest = Sha256::digest(&ciphertext);
        public
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
            .map_err(|_| Error::AuthenticationFailed)?;

        private
            .decrypt_blinded(&mut OsRng, Oaep::new::<Sha1>(), &ciphertext)
            .map_err(|e| Error::DecryptionFailed(format!("RSA-OAEP: {e}")))
    }
}

fn pem_text(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes).ok().filter(|text| text.trim_start().starts_with("-----BEGIN"))
}

fn decode_public(bytes: &[u8]) -> Result<RsaPublicKey, String> {
    match pem_text(bytes) {
        Some(pem) => RsaPublicKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPublicKey::from_public_key_pem(pem))
            .map_err(|e| e.to_string()),
        None => RsaPublicKey::from_pkcs1_der(bytes)
            .or_else(|_| RsaPublicKey::from_public_key_der(bytes))
            .map_err(|e| e.to_string()),
    }
}

fn decode_private(bytes: &[u8]) -> Result<RsaPrivateKey, String> {
    match pem_text(bytes) {
        Some(pem) => RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| e.to_string()),
        None => RsaPrivateKey::from_pkcs1_der(bytes)
            .or_else(|_| RsaPrivateKey::from_pkcs8_der(bytes))
            .map_err(|e| e.to_string()),
    }
}
