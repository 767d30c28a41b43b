//! Key store abstraction for resolving key references to key material.

use crate::error::KeyStoreError;
use secrecy::{ExposeSecret, SecretVec};
use std::collections::HashMap;

/// Resolves key references named in field annotations to key bytes.
///
/// Keys are looked up in one of two roles. Providers ask for the first key
/// reference of an annotation through [`KeyStore::encryption_key`] and for the
/// second through [`KeyStore::signing_or_decryption_key`]. A store may serve
/// both roles from the same backing map.
///
/// Implementations must be thread-safe (`Send + Sync`) so that documents can
/// be transformed concurrently. The engine never retries a failed lookup and
/// never caches the returned material beyond a single field.
///
/// # Example
///
/// ```rust,ignore
/// use fieldcrypt::key_store::KeyStore;
///
/// struct VaultStore;
///
/// impl KeyStore for VaultStore {
///     fn encryption_key(&self, id: &str) -> Result<SecretVec<u8>, KeyStoreError> {
///         // Implementation
///     }
///     // ... other methods
/// }
/// ```
pub trait KeyStore: Send + Sync {
    /// Returns the public or encryption key stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns `KeyStoreError::KeyNotFound` if no such key exists.
    fn encryption_key(&self, id: &str) -> Result<SecretVec<u8>, KeyStoreError>;

    /// Returns the private key (authentication, signing or decryption) stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns `KeyStoreError::KeyNotFound` if no such key exists.
    fn signing_or_decryption_key(&self, id: &str) -> Result<SecretVec<u8>, KeyStoreError>;
}

impl<S: KeyStore + ?Sized> KeyStore for &S {
    fn encryption_key(&self, id: &str) -> Result<SecretVec<u8>, KeyStoreError> {
        (**self).encryption_key(id)
    }

    fn signing_or_decryption_key(&self, id: &str) -> Result<SecretVec<u8>, KeyStoreError> {
        (**self).signing_or_decryption_key(id)
    }
}

/// In-memory key store serving both roles from a single map.
///
/// Keys are held in process memory for the lifetime of the store, which makes
/// it suitable for tests and local tooling only.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: HashMap<String, SecretVec<u8>>,
}

impl MemoryKeyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key, replacing any previous key with the same identifier.
    #[must_use]
    pub fn with_key(mut self, id: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        self.insert(id, key);
        self
    }

    /// Inserts a key, replacing any previous key with the same identifier.
    pub fn insert(&mut self, id: impl Into<String>, key: impl Into<Vec<u8>>) {
        self.keys.insert(id.into(), SecretVec::new(key.into()));
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn lookup(&self, id: &str) -> Result<SecretVec<u8>, KeyStoreError> {
        self.keys
            .get(id)
            .map(|key| SecretVec::new(key.expose_secret().clone()))
            .ok_or_else(|| KeyStoreError::KeyNotFound(id.to_string()))
    }
}

impl KeyStore for MemoryKeyStore {
    fn encryption_key(&self, id: &str) -> Result<SecretVec<u8>, KeyStoreError> {
        self.lookup(id)
    }

    fn signing_or_decryption_key(&self, id: &str) -> Result<SecretVec<u8>, KeyStoreError> {
        self.lookup(id)
    }
}

impl std::fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("MemoryKeyStore").field("key_ids", &ids).finish()
    }
}
