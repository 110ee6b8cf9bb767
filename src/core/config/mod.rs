//! core::config
//!
//! Configuration schema and loading.
//!
//! # Locations
//!
//! Searched in order; the first file that exists wins:
//! 1. An explicit path (`--config`); it must exist
//! 2. `$PAGEVAULT_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/pagevault/config.toml`
//! 4. `~/.pagevault/config.toml` (canonical write location)
//!
//! No file at all is not an error: defaults apply, but there is no provider,
//! so opening a store fails with [`ConfigError::NoProvider`].
//!
//! # Example
//!
//! ```no_run
//! use pagevault::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! for ns in config.namespaces() {
//!     println!("{}", ns);
//! }
//! println!("Feed limit: {}", config.feed_limit());
//! ```

pub mod schema;

pub use schema::{
    CommitterConfig, ConfigFile, FeedConfig, ProviderConfig, RunnerConfig, DEFAULT_PROVIDER,
};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::types::{Author, Namespace};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "PAGEVAULT_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("no storage provider configured for namespace '{namespace}'")]
    NoProvider { namespace: String },

    #[error("home directory not found")]
    NoHomeDir,
}

/// Loaded configuration with defaults applied through accessors.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// The parsed file (empty when none was found)
    pub file: ConfigFile,
    /// Where it was loaded from
    path: Option<PathBuf>,
}

impl Config {
    pub const DEFAULT_NAMESPACE: &'static str = "pages";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 10;
    pub const DEFAULT_FEED_LIMIT: usize = 15;

    /// Load configuration from the standard locations.
    ///
    /// # Errors
    ///
    /// Returns an error if `explicit` does not exist, or if the file found
    /// cannot be parsed or fails validation.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let xdg = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from);
        let home = dirs::home_dir();
        match locate(explicit, env, xdg, home)? {
            Some(path) => Self::from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load and validate a specific file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.validate()?;
        Ok(Self {
            file,
            path: Some(path.to_path_buf()),
        })
    }

    /// Wrap an in-memory configuration after validating it.
    pub fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        file.validate()?;
        Ok(Self { file, path: None })
    }

    /// Get the canonical path for the config file.
    ///
    /// Returns `~/.pagevault/config.toml`.
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".pagevault/config.toml"))
    }

    /// Write a config file atomically.
    ///
    /// Creates parent directories if needed. Uses atomic write (write to
    /// temp file, then rename) to prevent corruption.
    pub fn write_atomic(path: &Path, file: &ConfigFile) -> Result<(), ConfigError> {
        let write_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ConfigError::WriteError { path, source }
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err(path))?;
        }

        let contents =
            toml::to_string_pretty(file).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        // Write to temp file in same directory (for atomic rename)
        let temp_path = path.with_extension("toml.tmp");
        let mut temp = fs::File::create(&temp_path).map_err(write_err(&temp_path))?;
        temp.write_all(contents.as_bytes())
            .map_err(write_err(&temp_path))?;
        temp.sync_all().map_err(write_err(&temp_path))?;

        fs::rename(&temp_path, path).map_err(write_err(path))?;
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Namespaces served, in configured order.
    pub fn namespaces(&self) -> Vec<Namespace> {
        match &self.file.namespaces {
            // Validated at load time.
            Some(names) => names
                .iter()
                .filter_map(|n| Namespace::new(n.as_str()).ok())
                .collect(),
            None => Namespace::new(Self::DEFAULT_NAMESPACE)
                .into_iter()
                .collect(),
        }
    }

    /// The provider serving `namespace`, falling back to `default`.
    ///
    /// Returns the provider key alongside its settings.
    pub fn provider_for(
        &self,
        namespace: &Namespace,
    ) -> Result<(&str, &ProviderConfig), ConfigError> {
        self.file
            .providers
            .get_key_value(namespace.as_str())
            .or_else(|| self.file.providers.get_key_value(DEFAULT_PROVIDER))
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::NoProvider {
                namespace: namespace.to_string(),
            })
    }

    /// git executable.
    pub fn git_bin(&self) -> &str {
        self.file
            .runner
            .as_ref()
            .and_then(|r| r.git_bin.as_deref())
            .unwrap_or("git")
    }

    /// Deadline per git process.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(
            self.file
                .runner
                .as_ref()
                .and_then(|r| r.timeout_secs)
                .unwrap_or(Self::DEFAULT_TIMEOUT_SECS),
        )
    }

    /// How long a mutation waits for the repository lock.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(
            self.file
                .runner
                .as_ref()
                .and_then(|r| r.lock_timeout_secs)
                .unwrap_or(Self::DEFAULT_LOCK_TIMEOUT_SECS),
        )
    }

    /// Entries in the merged feed (0 = all).
    pub fn feed_limit(&self) -> usize {
        self.file
            .feed
            .as_ref()
            .and_then(|f| f.limit)
            .unwrap_or(Self::DEFAULT_FEED_LIMIT)
    }

    /// Changes taken per namespace and kind before merging (0 = all).
    pub fn per_namespace_limit(&self) -> usize {
        self.file
            .feed
            .as_ref()
            .and_then(|f| f.per_namespace_limit)
            .unwrap_or(Self::DEFAULT_FEED_LIMIT)
    }

    /// Configured committer, if any.
    pub fn committer(&self) -> Result<Option<Author>, ConfigError> {
        self.file
            .committer
            .as_ref()
            .map(CommitterConfig::author)
            .transpose()
    }

    /// Path the configuration was loaded from.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Pick the config file to load.
fn locate(
    explicit: Option<&Path>,
    env: Option<PathBuf>,
    xdg_config_home: Option<PathBuf>,
    home: Option<PathBuf>,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::ReadError {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }
        return Ok(Some(path.to_path_buf()));
    }

    let candidates = [
        env,
        xdg_config_home.map(|x| x.join("pagevault/config.toml")),
        home.map(|h| h.join(".pagevault/config.toml")),
    ];
    Ok(candidates.into_iter().flatten().find(|p| p.exists()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.namespaces(), [Namespace::new("pages").unwrap()]);
        assert_eq!(config.git_bin(), "git");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.lock_timeout(), Duration::from_secs(10));
        assert_eq!(config.feed_limit(), 15);
        assert_eq!(config.per_namespace_limit(), 15);
        assert!(config.committer().unwrap().is_none());
        assert!(matches!(
            config.provider_for(&Namespace::new("pages").unwrap()),
            Err(ConfigError::NoProvider { .. })
        ));
    }

    #[test]
    fn explicit_path_must_exist() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        assert!(matches!(
            locate(Some(&missing), None, None, None),
            Err(ConfigError::ReadError { .. })
        ));
    }

    #[test]
    fn search_order() {
        let temp = TempDir::new().unwrap();
        let xdg = temp.path().join("xdg");
        let home = temp.path().join("home");
        let home_file = write(&home, ".pagevault/config.toml", "");
        assert_eq!(
            locate(None, None, Some(xdg.clone()), Some(home.clone())).unwrap(),
            Some(home_file)
        );

        let xdg_file = write(&xdg, "pagevault/config.toml", "");
        assert_eq!(
            locate(None, None, Some(xdg.clone()), Some(home.clone())).unwrap(),
            Some(xdg_file)
        );

        let env_file = write(temp.path(), "env.toml", "");
        assert_eq!(
            locate(None, Some(env_file.clone()), Some(xdg), Some(home)).unwrap(),
            Some(env_file)
        );
    }

    #[test]
    fn nothing_found() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            locate(None, None, None, Some(temp.path().to_path_buf())).unwrap(),
            None
        );
    }

    #[test]
    fn provider_fallback() {
        let temp = TempDir::new().unwrap();
        let path = write(
            temp.path(),
            "config.toml",
            r#"
            namespaces = ["pages", "users"]

            [providers.default]
            path = "/srv/wiki"

            [providers.users]
            backend = "memory"
            "#,
        );
        let config = Config::from_path(&path).unwrap();
        let (key, provider) = config
            .provider_for(&Namespace::new("pages").unwrap())
            .unwrap();
        assert_eq!(key, "default");
        assert_eq!(provider.path.as_deref(), Some(Path::new("/srv/wiki")));

        let (key, provider) = config
            .provider_for(&Namespace::new("users").unwrap())
            .unwrap();
        assert_eq!(key, "users");
        assert_eq!(provider.backend(), "memory");
        assert_eq!(config.loaded_from(), Some(path.as_path()));
    }

    #[test]
    fn parse_error_names_file() {
        let temp = TempDir::new().unwrap();
        let path = write(temp.path(), "config.toml", "namespaces = [");
        let err = Config::from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn unknown_fields_rejected() {
        let temp = TempDir::new().unwrap();
        let path = write(temp.path(), "config.toml", "app_name = \"Wiki\"\n");
        assert!(Config::from_path(&path).is_err());
    }

    #[test]
    fn write_atomic_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/config.toml");
        let mut file = ConfigFile::default();
        file.providers.insert(
            DEFAULT_PROVIDER.into(),
            ProviderConfig {
                backend: None,
                path: Some(PathBuf::from("/srv/wiki")),
            },
        );

        Config::write_atomic(&path, &file).unwrap();
        assert!(!path.with_extension("toml.tmp").exists());

        let loaded = Config::from_path(&path).unwrap();
        assert_eq!(loaded.file, file);
    }
}
