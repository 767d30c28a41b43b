//! Provider registry mapping algorithm names to providers.
//!
//! The process-wide registry is built once, on first use or by an explicit
//! [`freeze`], from the built-in providers plus anything staged with
//! [`register_provider`]. After that it is immutable and lookups take no lock.

use crate::error::Error;
use crate::provider::{AesKeySize, AsymmetricProvider, Provider, SymmetricProvider};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::{debug, warn};

/// Immutable mapping from algorithm name to provider.
///
/// # Example
///
/// ```
/// use fieldcrypt::provider::AsymmetricProvider;
/// use fieldcrypt::registry::ProviderRegistry;
///
/// let registry = ProviderRegistry::with_builtins()
///     .with_provider("rsa4096", AsymmetricProvider::new(4096));
///
/// assert!(registry.lookup("aes256").is_ok());
/// assert!(registry.lookup("rsa4096").is_ok());
/// assert!(registry.lookup("rot13").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Provider>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in providers:
    /// `aes128`, `aes192`, `aes256` and `rsa2048`.
    #[must_use]
    pub fn with_builtins() -> Self {
        Self::new()
            .with_provider("aes128", SymmetricProvider::new(AesKeySize::Aes128))
            .with_provider("aes192", SymmetricProvider::new(AesKeySize::Aes192))
            .with_provider("aes256", SymmetricProvider::new(AesKeySize::Aes256))
            .with_provider("rsa2048", AsymmetricProvider::new(2048))
    }

    /// Adds a provider, replacing any provider already registered under `name`.
    #[must_use]
    pub fn with_provider(mut self, name: impl Into<String>, provider: impl Into<Provider>) -> Self {
        self.providers.insert(name.into(), provider.into());
        self
    }

    /// Looks up a provider by algorithm name. Names match exactly.
    ///
    /// # Errors
    ///
    /// Returns `Error::ProviderNotFound` if no provider has that name.
    pub fn lookup(&self, name: &str) -> Result<&Provider, Error> {
        self.providers.get(name).ok_or_else(|| Error::ProviderNotFound(name.to_string()))
    }

    /// Returns the registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

struct Staging {
    frozen: bool,
    providers: Vec<(String, Provider)>,
}

static STAGING: Mutex<Staging> = Mutex::new(Staging { frozen: false, providers: Vec::new() });
static GLOBAL: OnceLock<ProviderRegistry> = OnceLock::new();

/// Stages a provider for the process-wide registry.
///
/// Must be called before the registry is first used.
///
/// # Errors
///
/// Returns `Error::RegistryFrozen` if the global registry has already been built.
pub fn register_provider(name: impl Into<String>, provider: impl Into<Provider>) -> Result<(), Error> {
    let name = name.into();
    let mut staging = STAGING.lock().unwrap_or_else(PoisonError::into_inner);
    if staging.frozen {
        warn!(provider = %name, "rejected provider registration after registry freeze");
        return Err(Error::RegistryFrozen(name));
    }
    debug!(provider = %name, "staged provider registration");
    staging.providers.push((name, provider.into()));
    Ok(())
}

/// Returns the process-wide registry, building and freezing it on first call.
pub fn global() -> &'static ProviderRegistry {
    GLOBAL.get_or_init(|| {
        let mut staging = STAGING.lock().unwrap_or_else(PoisonError::into_inner);
        staging.frozen = true;
        let registry = staging
            .providers
            .drain(..)
            .fold(ProviderRegistry::with_builtins(), |registry, (name, provider)| {
                registry.with_provider(name, provider)
            });
        debug!(providers = ?registry.names(), "provider registry frozen");
        registry
    })
}

/// Builds and freezes the process-wide registry.
///
/// Equivalent to [`global`]; provided to make the end of the initialization
/// phase explicit at process start.
pub fn freeze() -> &'static ProviderRegistry {
    global()
}
