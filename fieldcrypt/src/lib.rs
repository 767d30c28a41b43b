//! # `FieldCrypt`
//!
//! Field-level encryption for structured documents. Selected fields are
//! replaced by self-describing cipher envelopes that other implementations of
//! the same wire format can open.
//!
//! ## Features
//!
//! - Per-field annotations naming a provider and its key identifiers
//! - AES-CBC with HMAC-SHA256 (encrypt-then-MAC) providers
//! - RSA-OAEP encryption with PKCS#1 v1.5 signatures
//! - Pluggable key stores and document codecs
//! - `#[derive(Encryptable)]` for typed documents (via `fieldcrypt-derive`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use fieldcrypt::prelude::*;
//! use fieldcrypt_key_file::FileKeyStore;
//!
//! #[derive(Serialize, Deserialize, Encryptable)]
//! struct User {
//!     name: String,
//!     #[crypt(annotation = "aes256,user-enc,user-mac")]
//!     ssn: String,
//! }
//!
//! let store = FileKeyStore::new("./keys")?;
//! let bytes = encrypt_struct(&user, &store)?;
//! let user: User = decrypt_struct(&bytes, &store)?;
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod annotation;
pub mod envelope;
pub mod error;
pub mod key_store;
pub mod provider;
pub mod registry;
pub mod shape;
pub mod transformer;

pub use transformer::{decrypt_document, decrypt_struct, encrypt_document, encrypt_struct};

pub mod prelude {
    //! Convenience re-exports for common use.
    pub use crate::annotation::Annotation;
    pub use crate::envelope::CipherEnvelope;
    pub use crate::error::{Error, ErrorKind, KeyStoreError};
    pub use crate::key_store::{KeyStore, MemoryKeyStore};
    pub use crate::provider::{AesKeySize, AsymmetricProvider, CryptoProvider, Provider, SymmetricProvider};
    pub use crate::registry::{register_provider, ProviderRegistry};
    pub use crate::shape::{Encryptable, FieldDescriptor, Shape};
    pub use crate::transformer::{
        decrypt_document, decrypt_struct, encrypt_document, encrypt_struct, Codec, JsonCodec,
        Transformer,
    };
}
