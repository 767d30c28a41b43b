//! Error types for field encryption operations.

use std::fmt;

/// Main error type for `fieldcrypt` operations.
///
/// Every variant maps to exactly one [`ErrorKind`]. Callers should classify
/// failures with [`Error::is`] or [`is_error_kind`] rather than by matching on
/// the rendered message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No provider is registered under the annotation's algorithm name
    #[error("crypto provider not found: {0}")]
    ProviderNotFound(String),

    /// The annotation does not name the first (encryption/public) key
    #[error("provider {provider} requires a public key reference")]
    MissingPublicKey {
        /// Algorithm name from the annotation
        provider: String,
    },

    /// The annotation does not name the authentication key of a symmetric provider
    #[error("provider {provider} requires a private key reference")]
    MissingPrivateKey {
        /// Algorithm name from the annotation
        provider: String,
    },

    /// The annotation does not name the signing key of an asymmetric provider
    #[error("provider {provider} requires a signing key reference")]
    MissingSigningKey {
        /// Algorithm name from the annotation
        provider: String,
    },

    /// Key material has the wrong size for the algorithm
    #[error("invalid size for key {key_id}: expected {expected} bytes, got {actual}")]
    KeySize {
        /// Identifier the key was resolved from
        key_id: String,
        /// Size the algorithm requires
        expected: usize,
        /// Size of the resolved key
        actual: usize,
    },

    /// Key bytes could not be decoded for the algorithm
    #[error("invalid key {key_id}: {reason}")]
    InvalidKey {
        /// Identifier the key was resolved from
        key_id: String,
        /// Decoder message
        reason: String,
    },

    /// MAC or signature verification failed (data may be corrupted or tampered)
    #[error("authentication failed: ciphertext or signature may be corrupted or tampered")]
    AuthenticationFailed,

    /// Encryption operation failed
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption operation failed
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Plaintext does not fit the algorithm's maximum message size
    #[error("payload too large: {actual} bytes (max: {max})")]
    PayloadTooLarge {
        /// Largest payload the provider accepts
        max: usize,
        /// Size of the rejected payload
        actual: usize,
    },

    /// Key store lookup failed
    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    /// Wire data is not a valid cipher envelope
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The envelope's algorithm label does not match the selected provider
    #[error("algorithm mismatch: expected {expected}, found {found}")]
    AlgorithmMismatch {
        /// Label the provider produces
        expected: String,
        /// Label carried by the envelope
        found: String,
    },

    /// Field annotation is syntactically invalid
    #[error("invalid annotation {annotation:?}: {reason}")]
    InvalidAnnotation {
        /// Annotation text as written on the field
        annotation: String,
        /// What is wrong with it
        reason: String,
    },

    /// The document could not be decoded or encoded
    #[error("document error: {0}")]
    Document(String),

    /// A provider was registered after the global registry was frozen
    #[error("provider registry is frozen; cannot register {0}")]
    RegistryFrozen(String),
}

/// Machine-checkable classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::ProviderNotFound`].
    ProviderNotFound,
    /// See [`Error::MissingPublicKey`].
    MissingPublicKey,
    /// See [`Error::MissingPrivateKey`].
    MissingPrivateKey,
    /// See [`Error::MissingSigningKey`].
    MissingSigningKey,
    /// See [`Error::KeySize`].
    KeySize,
    /// See [`Error::InvalidKey`].
    InvalidKey,
    /// See [`Error::AuthenticationFailed`].
    AuthenticationFailed,
    /// See [`Error::EncryptionFailed`].
    EncryptionFailed,
    /// See [`Error::DecryptionFailed`].
    DecryptionFailed,
    /// See [`Error::PayloadTooLarge`].
    PayloadTooLarge,
    /// See [`Error::KeyStore`].
    KeyStore,
    /// See [`Error::MalformedEnvelope`].
    MalformedEnvelope,
    /// See [`Error::AlgorithmMismatch`].
    AlgorithmMismatch,
    /// See [`Error::InvalidAnnotation`].
    InvalidAnnotation,
    /// See [`Error::Document`].
    Document,
    /// See [`Error::RegistryFrozen`].
    RegistryFrozen,
}

impl Error {
    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ProviderNotFound(_) => ErrorKind::ProviderNotFound,
            Self::MissingPublicKey { .. } => ErrorKind::MissingPublicKey,
            Self::MissingPrivateKey { .. } => ErrorKind::MissingPrivateKey,
            Self::MissingSigningKey { .. } => ErrorKind::MissingSigningKey,
            Self::KeySize { .. } => ErrorKind::KeySize,
            Self::InvalidKey { .. } => ErrorKind::InvalidKey,
            Self::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            Self::EncryptionFailed(_) => ErrorKind::EncryptionFailed,
            Self::DecryptionFailed(_) => ErrorKind::DecryptionFailed,
            Self::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Self::KeyStore(_) => ErrorKind::KeyStore,
            Self::MalformedEnvelope(_) => ErrorKind::MalformedEnvelope,
            Self::AlgorithmMismatch { .. } => ErrorKind::AlgorithmMismatch,
            Self::InvalidAnnotation { .. } => ErrorKind::InvalidAnnotation,
            Self::Document(_) => ErrorKind::Document,
            Self::RegistryFrozen(_) => ErrorKind::RegistryFrozen,
        }
    }

    /// Checks whether this error is of the given kind.
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }
}

/// Checks whether a result's error is of the given kind.
///
/// Returns `false` for `Ok` values, so it can be applied directly to the
/// outcome of an encrypt or decrypt call.
///
/// ```
/// use fieldcrypt::error::{is_error_kind, Error, ErrorKind};
///
/// let result: Result<(), Error> = Err(Error::ProviderNotFound("rot13".into()));
/// assert!(is_error_kind(&result, ErrorKind::ProviderNotFound));
/// ```
pub fn is_error_kind<T>(result: &Result<T, Error>, kind: ErrorKind) -> bool {
    matches!(result, Err(err) if err.is(kind))
}

/// Errors specific to key store lookups.
#[derive(Debug)]
pub enum KeyStoreError {
    /// No key is stored under the identifier
    KeyNotFound(String),

    /// The identifier is not acceptable to the store
    InvalidKeyId(String),

    /// The backing store failed
    Backend(String),

    /// I/O operation failed
    Io(std::io::Error),
}

impl fmt::Display for KeyStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyNotFound(id) => write!(f, "key not found: {id}"),
            Self::InvalidKeyId(id) => write!(f, "invalid key id: {id:?}"),
            Self::Backend(msg) => write!(f, "backend failure: {msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for KeyStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KeyStoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
