//! Document transformer sealing and opening annotated fields.
//!
//! On encrypt, every annotated field `name` present in the document is
//! replaced by `__crypt_name` holding a [`CipherEnvelope`]. On decrypt the
//! envelope is opened and the plaintext value restored under `name`. A call
//! either transforms every annotated field or returns an error; the input is
//! never modified.

use crate::annotation::Annotation;
use crate::envelope::CipherEnvelope;
use crate::error::Error;
use crate::key_store::KeyStore;
use crate::provider::{CryptoProvider, Provider};
use crate::registry::{self, ProviderRegistry};
use crate::shape::{walk, Encryptable, FieldVisitor, Shape};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Prefix marking a field whose value is a cipher envelope.
pub const DEFAULT_FIELD_PREFIX: &str = "__crypt_";

/// Serializer interface between raw document bytes and the document tree.
pub trait Codec {
    /// Decodes document bytes into a tree.
    ///
    /// # Errors
    ///
    /// Returns `Error::Document` if the bytes are not a valid document.
    fn decode(&self, bytes: &[u8]) -> Result<Value, Error>;

    /// Encodes a tree into document bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Document` if the tree cannot be encoded.
    fn encode(&self, document: &Value) -> Result<Vec<u8>, Error>;
}

/// JSON document codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Value, Error> {
        serde_json::from_slice(bytes).map_err(|e| Error::Document(format!("invalid JSON: {e}")))
    }

    fn encode(&self, document: &Value) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(document).map_err(|e| Error::Document(format!("JSON encoding: {e}")))
    }
}

/// Applies a shape's annotations to documents.
///
/// # Example
///
/// ```
/// use fieldcrypt::key_store::MemoryKeyStore;
/// use fieldcrypt::shape::{FieldDescriptor, Shape};
/// use fieldcrypt::transformer::Transformer;
/// use serde_json::json;
///
/// # fn main() -> Result<(), fieldcrypt::error::Error> {
/// let store = MemoryKeyStore::new()
///     .with_key("enckey", vec![7u8; 32])
///     .with_key("mackey", b"mac secret".to_vec());
/// let shape = Shape::new(vec![FieldDescriptor::annotated("ssn", "aes256,enckey,mackey")]);
///
/// let transformer = Transformer::new();
/// let doc = json!({ "name": "alice", "ssn": "123-45-6789" });
///
/// let sealed = transformer.encrypt_value(&doc, &shape, &store)?;
/// assert!(sealed.get("ssn").is_none());
/// assert!(sealed.get("__crypt_ssn").is_some());
///
/// let opened = transformer.decrypt_value(&sealed, &shape, &store)?;
/// assert_eq!(opened, doc);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Transformer<'r> {
    registry: &'r ProviderRegistry,
    field_prefix: String,
}

impl Transformer<'static> {
    /// Creates a transformer over the process-wide registry.
    ///
    /// The first call freezes the registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(registry::global())
    }
}

impl Default for Transformer<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r> Transformer<'r> {
    /// Creates a transformer over an explicitly built registry.
    #[must_use]
    pub fn with_registry(registry: &'r ProviderRegistry) -> Self {
        Self { registry, field_prefix: DEFAULT_FIELD_PREFIX.to_string() }
    }

    /// Sets the prefix marking encrypted fields.
    #[must_use]
    pub fn with_field_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.field_prefix = prefix.into();
        self
    }

    /// Returns the prefix marking encrypted fields.
    #[must_use]
    pub fn field_prefix(&self) -> &str {
        &self.field_prefix
    }

    /// Returns the name an encrypted field is stored under.
    #[must_use]
    pub fn encrypted_name(&self, name: &str) -> String {
        format!("{}{name}", self.field_prefix)
    }

    /// Encrypts the annotated fields of a document tree.
    ///
    /// # Errors
    ///
    /// Returns `Error::Document` if the root is not an object, or the first
    /// provider, key store or annotation error encountered.
    pub fn encrypt_value(
        &self,
        document: &Value,
        shape: &Shape,
        store: &dyn KeyStore,
    ) -> Result<Value, Error> {
        self.seal_tree(document.clone(), shape, store)
    }

    /// Decrypts the annotated fields of a document tree.
    ///
    /// # Errors
    ///
    /// Returns `Error::Document` if the root is not an object,
    /// `Error::AuthenticationFailed` if an annotated field holds a plaintext
    /// value, or the first envelope, provider, key store or annotation error
    /// encountered.
    pub fn decrypt_value(
        &self,
        document: &Value,
        shape: &Shape,
        store: &dyn KeyStore,
    ) -> Result<Value, Error> {
        self.open_tree(document.clone(), shape, store)
    }

    /// Encrypts the annotated fields of a serialized JSON document.
    ///
    /// # Errors
    ///
    /// See [`Transformer::encrypt_value`]; undecodable bytes are `Error::Document`.
    pub fn encrypt_document(
        &self,
        bytes: &[u8],
        shape: &Shape,
        store: &dyn KeyStore,
    ) -> Result<Vec<u8>, Error> {
        self.encrypt_document_with(&JsonCodec, bytes, shape, store)
    }

    /// Decrypts the annotated fields of a serialized JSON document.
    ///
    /// # Errors
    ///
    /// See [`Transformer::decrypt_value`]; undecodable bytes are `Error::Document`.
    pub fn decrypt_document(
        &self,
        bytes: &[u8],
        shape: &Shape,
        store: &dyn KeyStore,
    ) -> Result<Vec<u8>, Error> {
        self.decrypt_document_with(&JsonCodec, bytes, shape, store)
    }

    /// Encrypts a serialized document using the given codec.
    ///
    /// # Errors
    ///
    /// See [`Transformer::encrypt_value`].
    pub fn encrypt_document_with(
        &self,
        codec: &dyn Codec,
        bytes: &[u8],
        shape: &Shape,
        store: &dyn KeyStore,
    ) -> Result<Vec<u8>, Error> {
        let sealed = self.seal_tree(codec.decode(bytes)?, shape, store)?;
        codec.encode(&sealed)
    }

    /// Decrypts a serialized document using the given codec.
    ///
    /// # Errors
    ///
    /// See [`Transformer::decrypt_value`].
    pub fn decrypt_document_with(
        &self,
        codec: &dyn Codec,
        bytes: &[u8],
        shape: &Shape,
        store: &dyn KeyStore,
    ) -> Result<Vec<u8>, Error> {
        let opened = self.open_tree(codec.decode(bytes)?, shape, store)?;
        codec.encode(&opened)
    }

    /// Serializes a value to JSON and encrypts its annotated fields.
    ///
    /// # Errors
    ///
    /// See [`Transformer::encrypt_value`].
    pub fn encrypt_struct<T: Serialize + Encryptable>(
        &self,
        value: &T,
        store: &dyn KeyStore,
    ) -> Result<Vec<u8>, Error> {
        let document = serde_json::to_value(value)
            .map_err(|e| Error::Document(format!("serialization: {e}")))?;
        let sealed = self.seal_tree(document, T::shape(), store)?;
        JsonCodec.encode(&sealed)
    }

    /// Decrypts a JSON document and deserializes it.
    ///
    /// # Errors
    ///
    /// See [`Transformer::decrypt_value`]; a decrypted document that does not
    /// match `T` is `Error::Document`.
    pub fn decrypt_struct<T: DeserializeOwned + Encryptable>(
        &self,
        bytes: &[u8],
        store: &dyn KeyStore,
    ) -> Result<T, Error> {
        let opened = self.open_tree(JsonCodec.decode(bytes)?, T::shape(), store)?;
        serde_json::from_value(opened).map_err(|e| Error::Document(format!("deserialization: {e}")))
    }

    fn seal_tree(&self, mut document: Value, shape: &Shape, store: &dyn KeyStore) -> Result<Value, Error> {
        walk(shape, root_object(&mut document)?, &mut Sealer { transformer: self, store })?;
        Ok(document)
    }

    fn open_tree(&self, mut document: Value, shape: &Shape, store: &dyn KeyStore) -> Result<Value, Error> {
        walk(shape, root_object(&mut document)?, &mut Opener { transformer: self, store })?;
        Ok(document)
    }

    fn provider_for(&self, annotation: &Annotation) -> Result<&'r Provider, Error> {
        annotation.validate()?;
        self.registry.lookup(annotation.algorithm())
    }
}

fn root_object(document: &mut Value) -> Result<&mut Map<String, Value>, Error> {
    document
        .as_object_mut()
        .ok_or_else(|| Error::Document("document root must be an object".to_string()))
}

/// Encrypt direction of the walk.
struct Sealer<'a, 'r> {
    transformer: &'a Transformer<'r>,
    store: &'a dyn KeyStore,
}

impl FieldVisitor for Sealer<'_, '_> {
    fn visit_annotated(
        &mut self,
        object: &mut Map<String, Value>,
        name: &str,
        annotation: &Annotation,
        path: &str,
    ) -> Result<(), Error> {
        let provider = self.transformer.provider_for(annotation)?;
        let Some(value) = object.get(name) else {
            return Ok(());
        };

        let plaintext = Zeroizing::new(
            serde_json::to_vec(value)
                .map_err(|e| Error::Document(format!("encoding field {path}: {e}")))?,
        );
        let envelope = provider.seal(&plaintext, annotation, self.store)?;

        object.remove(name);
        object.insert(self.transformer.encrypted_name(name), envelope.to_value()?);
        debug!(field = %path, algorithm = %annotation.algorithm(), "sealed field");
        Ok(())
    }
}

/// Decrypt direction of the walk.
struct Opener<'a, 'r> {
    transformer: &'a Transformer<'r>,
    store: &'a dyn KeyStore,
}

impl FieldVisitor for Opener<'_, '_> {
    fn visit_annotated(
        &mut self,
        object: &mut Map<String, Value>,
        name: &str,
        annotation: &Annotation,
        path: &str,
    ) -> Result<(), Error> {
        let provider = self.transformer.provider_for(annotation)?;
        // An encrypted field never carries a plaintext value.
        if object.contains_key(name) {
            warn!(field = %path, "plaintext value in place of an encrypted field");
            return Err(Error::AuthenticationFailed);
        }

        let encrypted_name = self.transformer.encrypted_name(name);
        let Some(wire) = object.get(&encrypted_name) else {
            return Ok(());
        };

        let envelope = CipherEnvelope::from_value(wire)?;
        let plaintext = Zeroizing::new(provider.open(&envelope, annotation, self.store)?);
        let value: Value = serde_json::from_slice(&plaintext).map_err(|e| {
            Error::DecryptionFailed(format!("plaintext of {path} is not valid JSON: {e}"))
        })?;

        object.remove(&encrypted_name);
        object.insert(name.to_string(), value);
        debug!(field = %path, algorithm = %annotation.algorithm(), "opened field");
        Ok(())
    }
}

/// Encrypts a serialized JSON document with the process-wide registry.
///
/// # Errors
///
/// See [`Transformer::encrypt_document`].
pub fn encrypt_document(bytes: &[u8], shape: &Shape, store: &dyn KeyStore) -> Result<Vec<u8>, Error> {
    Transformer::new().encrypt_document(bytes, shape, store)
}

/// Decrypts a serialized JSON document with the process-wide registry.
///
/// # Errors
///
/// See [`Transformer::decrypt_document`].
pub fn decrypt_document(bytes: &[u8], shape: &Shape, store: &dyn KeyStore) -> Result<Vec<u8>, Error> {
    Transformer::new().decrypt_document(bytes, shape, store)
}

/// Serializes and encrypts a value with the process-wide registry.
///
/// # Errors
///
/// See [`Transformer::encrypt_struct`].
pub fn encrypt_struct<T: Serialize + Encryptable>(
    value: &T,
    store: &dyn KeyStore,
) -> Result<Vec<u8>, Error> {
    Transformer::new().encrypt_struct(value, store)
}

/// Decrypts and deserializes a value with the process-wide registry.
///
/// # Errors
///
/// See [`Transformer::decrypt_struct`].
pub fn decrypt_struct<T: DeserializeOwned + Encryptable>(
    bytes: &[u8],
    store: &dyn KeyStore,
) -> Result<T, Error> {
    Transformer::new().decrypt_struct(bytes, store)
}
