//! store::registry
//!
//! Backend selection and store creation.
//!
//! # Design
//!
//! The registry is the one place that knows which backend serves which
//! namespace. It is built once from configuration at startup and handed to
//! consumers by reference; there is no global registry.
//!
//! Namespaces without a provider entry of their own use the `default`
//! provider. Namespaces that resolve to the same provider share one store
//! instance.
//!
//! # Example
//!
//! ```ignore
//! use pagevault::store::Registry;
//!
//! let registry = Registry::from_config(&config)?;
//! let store = registry.store_for(&Namespace::new("pages")?)?;
//! let exists = store.exists(&DocumentRef::parse("pages", "Home")?)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::{ContentStore, GitStore, MemoryStore, StoreError, StoreSettings};
use crate::core::config::{Config, ConfigError, ProviderConfig};
use crate::core::types::Namespace;
use crate::git::GitSettings;

/// Supported storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// A git repository on disk
    Git,
    /// Process-local, lost on exit
    Memory,
}

impl BackendKind {
    /// Get all available backends.
    pub fn all() -> &'static [BackendKind] {
        &[BackendKind::Git, BackendKind::Memory]
    }

    /// Get the backend name as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Git => "git",
            BackendKind::Memory => "memory",
        }
    }

    /// Parse a backend from a string.
    ///
    /// # Example
    ///
    /// ```
    /// use pagevault::store::BackendKind;
    ///
    /// assert_eq!(BackendKind::parse("git"), Some(BackendKind::Git));
    /// assert_eq!(BackendKind::parse("Memory"), Some(BackendKind::Memory));
    /// assert_eq!(BackendKind::parse("svn"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "git" => Some(BackendKind::Git),
            "memory" => Some(BackendKind::Memory),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Names accepted for `backend` in configuration.
pub fn valid_backend_names() -> Vec<&'static str> {
    BackendKind::all().iter().map(|b| b.name()).collect()
}

/// Errors from building or querying a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("provider '{provider}': {source}")]
    Store {
        provider: String,
        source: StoreError,
    },

    #[error("unknown backend '{name}', available: {}", valid_backend_names().join(", "))]
    UnknownBackend { name: String },

    #[error("namespace '{namespace}' is not configured")]
    UnknownNamespace { namespace: String },
}

/// Stores by namespace.
#[derive(Debug, Clone)]
pub struct Registry {
    namespaces: Vec<Namespace>,
    stores: BTreeMap<Namespace, Arc<dyn ContentStore>>,
}

impl Registry {
    /// Create one store per configured provider and map every namespace to
    /// its store.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NoProvider`] if a namespace has no provider and
    ///   there is no `default`
    /// - [`RegistryError::Store`] if a repository cannot be opened
    pub fn from_config(config: &Config) -> Result<Self, RegistryError> {
        let settings = StoreSettings {
            git: GitSettings {
                git_bin: config.git_bin().into(),
                timeout: config.timeout(),
                committer: config.committer()?,
            },
            lock_timeout: config.lock_timeout(),
        };

        let mut by_provider: BTreeMap<String, Arc<dyn ContentStore>> = BTreeMap::new();
        let mut stores = BTreeMap::new();
        let namespaces = config.namespaces();
        for ns in &namespaces {
            let (key, provider) = config.provider_for(ns)?;
            let store = match by_provider.get(key) {
                Some(store) => Arc::clone(store),
                None => {
                    let store = create_store(key, provider, &settings)?;
                    by_provider.insert(key.to_string(), Arc::clone(&store));
                    store
                }
            };
            debug!(namespace = %ns, provider = key, backend = %store.backend(), "registered");
            stores.insert(ns.clone(), store);
        }

        Ok(Self { namespaces, stores })
    }

    /// Serve every namespace in `namespaces` from one store.
    pub fn single(namespaces: Vec<Namespace>, store: Arc<dyn ContentStore>) -> Self {
        let stores = namespaces
            .iter()
            .map(|ns| (ns.clone(), Arc::clone(&store)))
            .collect();
        Self { namespaces, stores }
    }

    /// The store serving `namespace`.
    pub fn store_for(&self, namespace: &Namespace) -> Result<&dyn ContentStore, RegistryError> {
        self.stores
            .get(namespace)
            .map(|s| s.as_ref())
            .ok_or_else(|| RegistryError::UnknownNamespace {
                namespace: namespace.to_string(),
            })
    }

    /// Configured namespaces, in configured order.
    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }
}

fn create_store(
    key: &str,
    provider: &ProviderConfig,
    settings: &StoreSettings,
) -> Result<Arc<dyn ContentStore>, RegistryError> {
    let backend =
        BackendKind::parse(provider.backend()).ok_or_else(|| RegistryError::UnknownBackend {
            name: provider.backend().to_string(),
        })?;
    match backend {
        BackendKind::Git => {
            let path = provider.path.as_deref().ok_or_else(|| {
                ConfigError::InvalidValue(format!("provider '{}': git backend requires a path", key))
            })?;
            let store =
                GitStore::open(path, settings.clone()).map_err(|source| RegistryError::Store {
                    provider: key.to_string(),
                    source,
                })?;
            Ok(Arc::new(store))
        }
        BackendKind::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
