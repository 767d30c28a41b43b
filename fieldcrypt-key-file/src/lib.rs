//! File-based key store for `FieldCrypt`.
//!
//! This store reads keys from the filesystem and is suitable for
//! development and testing environments.

#![warn(clippy::pedantic, clippy::nursery)]

use fieldcrypt::error::KeyStoreError;
use fieldcrypt::key_store::KeyStore;
use secrecy::SecretVec;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension of key files.
pub const KEY_FILE_EXTENSION: &str = "key";

/// File-based key store for development and testing.
///
/// Each key is a file named after its identifier, holding the raw key bytes
/// (symmetric keys) or a DER or PEM encoded RSA key:
/// ```text
/// keys/
/// ├── orders-enc.key   (32 raw bytes)
/// ├── orders-mac.key
/// └── billing.key      (RSA public key, PEM)
/// private/
/// └── billing-sign.key (RSA private key, PEM, 0600 permissions)
/// ```
///
/// Private keys are read from a separate directory when one is configured,
/// otherwise from the same directory as public keys.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    key_dir: PathBuf,
    private_dir: Option<PathBuf>,
}

impl FileKeyStore {
    /// Creates a new `FileKeyStore`.
    ///
    /// # Arguments
    ///
    /// * `key_dir` - Directory containing key files
    ///
    /// # Errors
    ///
    /// Returns `KeyStoreError::Backend` if the directory doesn't exist.
    pub fn new(key_dir: impl Into<PathBuf>) -> Result<Self, KeyStoreError> {
        let key_dir = existing_dir(key_dir.into())?;
        Ok(Self { key_dir, private_dir: None })
    }

    /// Reads private keys from a separate directory.
    ///
    /// # Errors
    ///
    /// Returns `KeyStoreError::Backend` if the directory doesn't exist.
    pub fn with_private_dir(mut self, private_dir: impl Into<PathBuf>) -> Result<Self, KeyStoreError> {
        self.private_dir = Some(existing_dir(private_dir.into())?);
        Ok(self)
    }

    /// Returns the directory public and encryption keys are read from.
    #[must_use]
    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    /// Returns the directory private keys are read from.
    #[must_use]
    pub fn private_dir(&self) -> &Path {
        self.private_dir.as_deref().unwrap_or(&self.key_dir)
    }

    /// Returns the path a key identifier maps to inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns `KeyStoreError::InvalidKeyId` if the identifier is empty or
    /// could escape the directory.
    pub fn key_path(dir: &Path, id: &str) -> Result<PathBuf, KeyStoreError> {
        if id.is_empty() || id.contains(['/', '\\', '\0']) || id.contains("..") {
            return Err(KeyStoreError::InvalidKeyId(id.to_string()));
        }
        Ok(dir.join(format!("{id}.{KEY_FILE_EXTENSION}")))
    }

    fn read_key(dir: &Path, id: &str) -> Result<SecretVec<u8>, KeyStoreError> {
        let path = Self::key_path(dir, id)?;
        match std::fs::read(&path) {
            Ok(bytes) => {
                debug!(key_id = %id, path = %path.display(), "loaded key file");
                Ok(SecretVec::new(bytes))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(KeyStoreError::KeyNotFound(id.to_string()))
            }
            Err(err) => {
                warn!(key_id = %id, error = %err, "failed to read key file");
                Err(KeyStoreError::Io(err))
            }
        }
    }
}

impl KeyStore for FileKeyStore {
    fn encryption_key(&self, id: &str) -> Result<SecretVec<u8>, KeyStoreError> {
        Self::read_key(&self.key_dir, id)
    }

    fn signing_or_decryption_key(&self, id: &str) -> Result<SecretVec<u8>, KeyStoreError> {
        let dir = self.private_dir();
        warn_if_exposed(dir, id);
        Self::read_key(dir, id)
    }
}

fn existing_dir(dir: PathBuf) -> Result<PathBuf, KeyStoreError> {
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(KeyStoreError::Backend(format!(
            "Key directory does not exist: {}",
            dir.display()
        )))
    }
}

/// Logs private key files readable by group or others.
#[cfg(unix)]
fn warn_if_exposed(dir: &Path, id: &str) {
    use std::os::unix::fs::PermissionsExt;

    let Ok(path) = FileKeyStore::key_path(dir, id) else {
        return;
    };
    if let Ok(metadata) = std::fs::metadata(&path) {
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            warn!(
                key_id = %id,
                mode = %format!("{:o}", mode & 0o777),
                "private key file is accessible to other users"
            );
        }
    }
}

#[cfg(not(unix))]
const fn warn_if_exposed(_dir: &Path, _id: &str) {}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    fn write_key(dir: &Path, id: &str, bytes: &[u8]) {
        std::fs::write(dir.join(format!("{id}.key")), bytes).unwrap();
    }

    #[test]
    fn test_reads_both_roles_from_key_dir() {
        let temp_dir = TempDir::new().unwrap();
        write_key(temp_dir.path(), "enc", &[1u8; 32]);
        write_key(temp_dir.path(), "mac", b"auth");

        let store = FileKeyStore::new(temp_dir.path()).unwrap();
        assert_eq!(store.encryption_key("enc").unwrap().expose_secret(), &vec![1u8; 32]);
        assert_eq!(store.signing_or_decryption_key("mac").unwrap().expose_secret(), b"auth");
        assert_eq!(store.private_dir(), temp_dir.path());
    }

    #[test]
    fn test_private_dir_is_separate() {
        let public = TempDir::new().unwrap();
        let private = TempDir::new().unwrap();
        write_key(public.path(), "shared", b"public");
        write_key(private.path(), "shared", b"private");

        let store = FileKeyStore::new(public.path())
            .unwrap()
            .with_private_dir(private.path())
            .unwrap();
        assert_eq!(store.encryption_key("shared").unwrap().expose_secret(), b"public");
        assert_eq!(store.signing_or_decryption_key("shared").unwrap().expose_secret(), b"private");
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyStore::new(temp_dir.path()).unwrap();

        let Err(err) = store.encryption_key("absent") else {
            panic!("missing key resolved");
        };
        assert!(matches!(err, KeyStoreError::KeyNotFound(id) if id == "absent"));
    }

    #[test]
    fn test_rejects_escaping_ids() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyStore::new(temp_dir.path()).unwrap();

        for id in ["", "../secret", "a/b", "a\\b", ".."] {
            let result = store.encryption_key(id);
            assert!(matches!(result, Err(KeyStoreError::InvalidKeyId(_))), "{id:?} accepted");
        }
    }

    #[test]
    fn test_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");

        assert!(matches!(FileKeyStore::new(&missing), Err(KeyStoreError::Backend(_))));
        let store = FileKeyStore::new(temp_dir.path()).unwrap();
        assert!(store.with_private_dir(&missing).is_err());
    }
}
