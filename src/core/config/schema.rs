//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Validation
//!
//! Config values are validated after parsing: namespaces and provider keys
//! must be valid namespaces, backends must be known, git providers need a
//! path, and timeouts must be positive.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::{Author, Namespace};

/// Provider key used for namespaces without their own entry.
pub const DEFAULT_PROVIDER: &str = "default";

/// The configuration file.
///
/// # Example
///
/// ```toml
/// namespaces = ["pages", "users"]
///
/// [providers.default]
/// backend = "git"
/// path = "/srv/wiki"
///
/// [runner]
/// timeout_secs = 30
///
/// [feed]
/// limit = 15
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Namespaces served (default: `["pages"]`)
    pub namespaces: Option<Vec<String>>,

    /// Storage providers by namespace, plus `default`
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Backend process settings
    pub runner: Option<RunnerConfig>,

    /// Change feed settings
    pub feed: Option<FeedConfig>,

    /// Committer identity recorded on every commit
    pub committer: Option<CommitterConfig>,
}

impl ConfigFile {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(namespaces) = &self.namespaces {
            if namespaces.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "namespaces cannot be empty".to_string(),
                ));
            }
            for ns in namespaces {
                Namespace::new(ns.as_str())
                    .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
            }
        }

        for (key, provider) in &self.providers {
            if key != DEFAULT_PROVIDER {
                Namespace::new(key.as_str()).map_err(|e| {
                    ConfigError::InvalidValue(format!("provider '{}': {}", key, e))
                })?;
            }
            provider
                .validate()
                .map_err(|e| ConfigError::InvalidValue(format!("provider '{}': {}", key, e)))?;
        }

        if let Some(runner) = &self.runner {
            runner.validate()?;
        }

        if let Some(committer) = &self.committer {
            committer.author()?;
        }

        Ok(())
    }
}

/// One storage provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Backend name (default: "git")
    pub backend: Option<String>,

    /// Repository working tree (required for "git")
    pub path: Option<PathBuf>,
}

impl ProviderConfig {
    /// Backend name with the default applied.
    pub fn backend(&self) -> &str {
        self.backend.as_deref().unwrap_or("git")
    }

    fn validate(&self) -> Result<(), String> {
        let backend = self.backend();
        let valid = crate::store::valid_backend_names();
        if !valid.contains(&backend) {
            return Err(format!(
                "invalid backend '{}', must be one of: {}",
                backend,
                valid.join(", ")
            ));
        }
        if backend == "git" && self.path.is_none() {
            return Err("git backend requires a path".to_string());
        }
        Ok(())
    }
}

/// Backend process settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// git executable (default: "git")
    pub git_bin: Option<String>,

    /// Deadline per git process in seconds (default: 30)
    pub timeout_secs: Option<u64>,

    /// Wait for the repository lock in seconds (default: 10)
    pub lock_timeout_secs: Option<u64>,
}

impl RunnerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bin) = &self.git_bin {
            if bin.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "runner.git_bin cannot be empty".to_string(),
                ));
            }
        }
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "runner.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Change feed settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FeedConfig {
    /// Entries in the merged feed, 0 for all (default: 15)
    pub limit: Option<usize>,

    /// Changes taken from each namespace and kind (default: 15)
    pub per_namespace_limit: Option<usize>,
}

/// Committer identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CommitterConfig {
    pub name: String,
    pub email: String,
}

impl CommitterConfig {
    /// The validated identity.
    pub fn author(&self) -> Result<Author, ConfigError> {
        Author::new(self.name.as_str(), self.email.as_str())
            .map_err(|e| ConfigError::InvalidValue(format!("committer: {}", e)))
    }
}
