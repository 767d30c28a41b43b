//! AES-CBC with HMAC-SHA256 (encrypt-then-MAC).
//!
//! The MAC covers the UTF-8 concatenation, without separators, of
//!
//! ```text
//! KeyId || Algorithm || base64(Iv) || base64(Ciphertext)
//! ```
//!
//! using the exact strings carried by the envelope. This is the layout other
//! implementations of the envelope format produce, so it must not change.

use super::{check_label, reopen_key_id, required_key_refs, CryptoProvider};
use crate::annotation::Annotation;
use crate::envelope::{encode, CipherEnvelope};
use crate::error::Error;
use crate::key_store::KeyStore;
use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::{
    block_padding::Pkcs7, BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit,
};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use secrecy::ExposeSecret;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// IV size for AES-CBC (one block, 128 bits).
pub const IV_SIZE: usize = 16;

/// AES key size, which also selects the envelope label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AesKeySize {
    /// AES-128 (16-byte key).
    Aes128,
    /// AES-192 (24-byte key).
    Aes192,
    /// AES-256 (32-byte key).
    Aes256,
}

impl AesKeySize {
    /// Returns the required encryption key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }

    /// Returns the envelope label for this key size.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Aes128 => "AES-128-HMAC-SHA256",
            Self::Aes192 => "AES-192-HMAC-SHA256",
            Self::Aes256 => "AES-256-HMAC-SHA256",
        }
    }
}

/// Symmetric authenticated provider.
///
/// Key references: `[0]` the AES key (encryption role), `[1]` the HMAC key
/// (private role). The AES key must be exactly [`AesKeySize::key_len`] bytes;
/// the HMAC key may be of any length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymmetricProvider {
    key_size: AesKeySize,
}

impl SymmetricProvider {
    /// Creates a provider for the given AES key size.
    #[must_use]
    pub const fn new(key_size: AesKeySize) -> Self {
        Self { key_size }
    }

    /// Returns the AES key size.
    #[must_use]
    pub const fn key_size(&self) -> AesKeySize {
        self.key_size
    }

    fn check_key_size(&self, key_id: &str, key: &[u8]) -> Result<(), Error> {
        let expected = self.key_size.key_len();
        if key.len() == expected {
            Ok(())
        } else {
            Err(Error::KeySize { key_id: key_id.to_string(), expected, actual: key.len() })
        }
    }

    fn mac(
        &self,
        mac_key: &[u8],
        key_id: &str,
        iv_b64: &str,
        ciphertext_b64: &str,
    ) -> Result<HmacSha256, Error> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
            .map_err(|e| Error::EncryptionFailed(format!("HMAC setup: {e}")))?;
        mac.update(key_id.as_bytes());
        mac.update(self.key_size.label().as_bytes());
        mac.update(iv_b64.as_bytes());
        mac.update(ciphertext_b64.as_bytes());
        Ok(mac)
    }

    fn encrypt(&self, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        match self.key_size {
            AesKeySize::Aes128 => cbc_encrypt::<Aes128>(key, iv, plaintext),
            AesKeySize::Aes192 => cbc_encrypt::<Aes192>(key, iv, plaintext),
            AesKeySize::Aes256 => cbc_encrypt::<Aes256>(key, iv, plaintext),
        }
    }

    fn decrypt(&self, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        match self.key_size {
            AesKeySize::Aes128 => cbc_decrypt::<Aes128>(key, iv, ciphertext),
            AesKeySize::Aes192 => cbc_decrypt::<Aes192>(key, iv, ciphertext),
            AesKeySize::Aes256 => cbc_decrypt::<Aes256>(key, iv, ciphertext),
        }
    }
}

impl CryptoProvider for SymmetricProvider {
    fn label(&self) -> &str {
        self.key_size.label()
    }

    fn seal(
        &self,
        plaintext: &[u8],
        annotation: &Annotation,
        store: &dyn KeyStore,
    ) -> Result<CipherEnvelope, Error> {
        let (enc_ref, mac_ref) =
            required_key_refs(annotation, |provider| Error::MissingPrivateKey { provider })?;

        let enc_key = store.encryption_key(enc_ref)?;
        let mac_key = store.signing_or_decryption_key(mac_ref)?;
        self.check_key_size(enc_ref, enc_key.expose_secret())?;

        let mut iv = [0u8; IV_SIZE];
        OsRng
            .try_fill_bytes(&mut iv)
            .map_err(|e| Error::EncryptionFailed(format!("entropy unavailable: {e}")))?;

        let ciphertext = self.encrypt(enc_key.expose_secret(), &iv, plaintext)?;

        let iv_b64 = encode(&iv);
        let ciphertext_b64 = encode(&ciphertext);
        let tag = self
            .mac(mac_key.expose_secret(), enc_ref, &iv_b64, &ciphertext_b64)?
            .finalize()
            .into_bytes();

        Ok(CipherEnvelope::from_encoded(
            self.label(),
            enc_ref,
            iv_b64,
            ciphertext_b64,
            encode(&tag),
        ))
    }

    fn open(
        &self,
        envelope: &CipherEnvelope,
        annotation: &Annotation,
        store: &dyn KeyStore,
    ) -> Result<Vec<u8>, Error> {
        let (enc_ref, mac_ref) =
            required_key_refs(annotation, |provider| Error::MissingPrivateKey { provider })?;
        check_label(self.label(), envelope)?;

        let iv = envelope.iv()?;
        let ciphertext = envelope.ciphertext()?;
        let signature = envelope.signature()?;
        if iv.len() != IV_SIZE {
            return Err(Error::MalformedEnvelope(format!(
                "IV must be {IV_SIZE} bytes, got {}",
                iv.len()
            )));
        }

        let key_id = reopen_key_id(envelope, enc_ref);
        let enc_key = store.encryption_key(key_id)?;
        let mac_key = store.signing_or_decryption_key(mac_ref)?;
        self.check_key_size(key_id, enc_key.expose_secret())?;

        self.mac(
            mac_key.expose_secret(),
            envelope.key_id(),
            envelope.iv_b64(),
            envelope.ciphertext_b64(),
        )?
        .verify_slice(&signature)
        .map_err(|_| Error::AuthenticationFailed)?;

        self.decrypt(enc_key.expose_secret(), &iv, &ciphertext)
    }
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let cipher = cbc::Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|e| Error::EncryptionFailed(format!("cipher setup: {e}")))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    let cipher = cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|e| Error::DecryptionFailed(format!("cipher setup: {e}")))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| Error::DecryptionFailed("invalid padding or ciphertext length".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::key_store::MemoryKeyStore;

    const VECTOR_MESSAGE: &[u8] = b"\"The old grey goose jumped over the wrickety gate.\"";

    fn vector_envelope() -> CipherEnvelope {
        CipherEnvelope::from_encoded(
            "AES-256-HMAC-SHA256",
            "mypublickey",
            "Cfq84/46Qjet3EEQ1HUwSg==",
            "sR6AFEIGWS5Fy9QObNOhbCgfg3vXH4NHVRK1qkhKLQqjkByg2n69lot89qFEJuBsVNTXR77PZR6RjN4h4M9evg==",
            "rT89aCj1WosYjWHHu0mf92S195vYnEGA/reDnYelQsM=",
        )
    }

    fn vector_store() -> MemoryKeyStore {
        MemoryKeyStore::new()
            .with_key("mypublickey", b"!mysecretkey#9^5usdk39d&dlf)03sL".to_vec())
            .with_key("myhmackey", b"myauthpassword".to_vec())
    }

    fn test_store() -> MemoryKeyStore {
        let key = hex::decode("1234567890123456123456789012345612345678901234561234567890123456")
            .unwrap();
        MemoryKeyStore::new().with_key("somekey", key.clone()).with_key("hmackey", key)
    }

    fn flip_bit(encoded: &str) -> String {
        let mut bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded)
            .unwrap();
        bytes[0] ^= 0x01;
        encode(&bytes)
    }

    #[test]
    fn test_open_cross_implementation_vector() {
        let provider = SymmetricProvider::new(AesKeySize::Aes256);
        let annotation = Annotation::parse("aes256,mypublickey,myhmackey");

        let plaintext = provider.open(&vector_envelope(), &annotation, &vector_store()).unwrap();
        assert_eq!(plaintext, VECTOR_MESSAGE);
    }

    #[test]
    fn test_mac_layout_matches_vector() {
        let provider = SymmetricProvider::new(AesKeySize::Aes256);
        let envelope = vector_envelope();

        let tag = provider
            .mac(b"myauthpassword", envelope.key_id(), envelope.iv_b64(), envelope.ciphertext_b64())
            .unwrap()
            .finalize()
            .into_bytes();
        assert_eq!(encode(&tag), envelope.signature_b64());
    }

    #[test]
    fn test_seal_open_round_trip() {
        let provider = SymmetricProvider::new(AesKeySize::Aes256);
        let annotation = Annotation::parse("aes256,somekey,hmackey");
        let store = test_store();

        let envelope = provider.seal(b"\"World\"", &annotation, &store).unwrap();
        assert_eq!(envelope.algorithm(), "AES-256-HMAC-SHA256");
        assert_eq!(envelope.key_id(), "somekey");
        assert_eq!(envelope.iv().unwrap().len(), IV_SIZE);

        let plaintext = provider.open(&envelope, &annotation, &store).unwrap();
        assert_eq!(plaintext, b"\"World\"");
    }

    #[test]
    fn test_seal_uses_fresh_iv() {
        let provider = SymmetricProvider::new(AesKeySize::Aes256);
        let annotation = Annotation::parse("aes256,somekey,hmackey");
        let store = test_store();

        let first = provider.seal(b"1337", &annotation, &store).unwrap();
        let second = provider.seal(b"1337", &annotation, &store).unwrap();
        assert_ne!(first.iv_b64(), second.iv_b64());
        assert_ne!(first.ciphertext_b64(), second.ciphertext_b64());
    }

    #[test]
    fn test_empty_plaintext_pads_to_one_block() {
        let provider = SymmetricProvider::new(AesKeySize::Aes256);
        let annotation = Annotation::parse("aes256,somekey,hmackey");
        let store = test_store();

        let envelope = provider.seal(b"", &annotation, &store).unwrap();
        assert_eq!(envelope.ciphertext().unwrap().len(), 16);
        assert!(provider.open(&envelope, &annotation, &store).unwrap().is_empty());
    }

    #[test]
    fn test_tampered_ciphertext_fails_authentication() {
        let provider = SymmetricProvider::new(AesKeySize::Aes256);
        let annotation = Annotation::parse("aes256,mypublickey,myhmackey");
        let envelope = vector_envelope();

        let tampered = CipherEnvelope::from_encoded(
            envelope.algorithm(),
            envelope.key_id(),
            envelope.iv_b64(),
            flip_bit(envelope.ciphertext_b64()),
            envelope.signature_b64(),
        );

        let err = provider.open(&tampered, &annotation, &vector_store()).unwrap_err();
        assert!(err.is(ErrorKind::AuthenticationFailed));
    }

    #[test]
    fn test_tampered_signature_fails_authentication() {
        let provider = SymmetricProvider::new(AesKeySize::Aes256);
        let annotation = Annotation::parse("aes256,mypublickey,myhmackey");
        let envelope = vector_envelope();

        let tampered = CipherEnvelope::from_encoded(
            envelope.algorithm(),
            envelope.key_id(),
            envelope.iv_b64(),
            envelope.ciphertext_b64(),
            flip_bit(envelope.signature_b64()),
        );

        let err = provider.open(&tampered, &annotation, &vector_store()).unwrap_err();
        assert!(err.is(ErrorKind::AuthenticationFailed));
    }

    #[test]
    fn test_wrong_mac_key_fails_authentication() {
        let provider = SymmetricProvider::new(AesKeySize::Aes256);
        let annotation = Annotation::parse("aes256,mypublickey,otherhmac");
        let store = vector_store().with_key("otherhmac", b"notthepassword".to_vec());

        let err = provider.open(&vector_envelope(), &annotation, &store).unwrap_err();
        assert!(err.is(ErrorKind::AuthenticationFailed));
    }

    #[test]
    fn test_key_size_rejected_before_encryption() {
        let key = hex::decode("12345678901234561234567890123456123456789012345612345678901234561234")
            .unwrap();
        let store = MemoryKeyStore::new().with_key("somekey", key.clone()).with_key("hmackey", key);
        let provider = SymmetricProvider::new(AesKeySize::Aes256);
        let annotation = Annotation::parse("aes256,somekey,hmackey");

        let err = provider.seal(b"\"something\"", &annotation, &store).unwrap_err();
        assert!(
            matches!(err, Error::KeySize { expected: 32, actual: 34, .. }),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_label_mismatch_rejected() {
        let provider = SymmetricProvider::new(AesKeySize::Aes128);
        let annotation = Annotation::parse("aes128,mypublickey,myhmackey");

        let err = provider.open(&vector_envelope(), &annotation, &vector_store()).unwrap_err();
        assert!(err.is(ErrorKind::AlgorithmMismatch));
    }

    #[test]
    fn test_short_iv_is_malformed() {
        let provider = SymmetricProvider::new(AesKeySize::Aes256);
        let annotation = Annotation::parse("aes256,mypublickey,myhmackey");
        let envelope = vector_envelope();
        let short = CipherEnvelope::from_encoded(
            envelope.algorithm(),
            envelope.key_id(),
            "AAAA",
            envelope.ciphertext_b64(),
            envelope.signature_b64(),
        );

        let err = provider.open(&short, &annotation, &vector_store()).unwrap_err();
        assert!(err.is(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_missing_keys_in_store() {
        let provider = SymmetricProvider::new(AesKeySize::Aes256);
        let annotation = Annotation::parse("aes256,somekey,hmackey");

        let err = provider.seal(b"1", &annotation, &MemoryKeyStore::new()).unwrap_err();
        assert!(err.is(ErrorKind::KeyStore));
    }

    #[test]
    fn test_other_key_sizes_round_trip() {
        for (size, name) in [(AesKeySize::Aes128, "aes128"), (AesKeySize::Aes192, "aes192")] {
            let provider = SymmetricProvider::new(size);
            let store = MemoryKeyStore::new()
                .with_key("enc", vec![0x5a; size.key_len()])
                .with_key("mac", vec![0xa5; 32]);
            let annotation = Annotation::parse(&format!("{name},enc,mac"));

            let envelope = provider.seal(b"{\"a\":1}", &annotation, &store).unwrap();
            assert_eq!(envelope.algorithm(), size.label());
            assert_eq!(provider.open(&envelope, &annotation, &store).unwrap(), b"{\"a\":1}");
        }
    }
}
