//! cli
//!
//! Command-line interface layer for pagevault.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install the tracing subscriber
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap, loads configuration,
//! builds the [`Registry`] once and hands it to the command handlers, which
//! talk to stores only through [`ContentStore`].

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;
use crate::core::types::{Author, Namespace};
use crate::store::{ContentStore, Registry};
use crate::ui::output::Verbosity;
use args::AuthorArgs;

/// Environment variable holding a tracing filter directive.
pub const LOG_ENV: &str = "PAGEVAULT_LOG";

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit `--config` path
    pub config_path: Option<PathBuf>,
    /// `--namespace`
    pub namespace: String,
    pub verbosity: Verbosity,
    /// `--json`
    pub json: bool,
}

impl Context {
    /// Load configuration from `--config` or the standard locations.
    pub fn config(&self) -> Result<Config> {
        Config::load(self.config_path.as_deref()).context("Failed to load configuration")
    }

    /// Build the registry from configuration.
    pub fn registry(&self) -> Result<(Config, Registry)> {
        let config = self.config()?;
        let registry = Registry::from_config(&config).context("Failed to open storage")?;
        Ok((config, registry))
    }

    /// The validated `--namespace`.
    pub fn namespace(&self) -> Result<Namespace> {
        Namespace::new(self.namespace.as_str()).context("Invalid --namespace")
    }

    /// The store serving `--namespace`.
    pub fn store<'r>(&self, registry: &'r Registry) -> Result<&'r dyn ContentStore> {
        Ok(registry.store_for(&self.namespace()?)?)
    }
}

/// Resolve the commit identity from flags, falling back to the configured
/// committer.
pub fn resolve_author(args: &AuthorArgs, config: &Config) -> Result<Author> {
    match (&args.author, &args.email) {
        (Some(name), Some(email)) => {
            Ok(Author::new(name.as_str(), email.as_str()).context("Invalid author")?)
        }
        (None, None) => match config.committer()? {
            Some(author) => Ok(author),
            None => bail!("--author and --email are required (or configure [committer])"),
        },
        _ => bail!("--author and --email must be given together"),
    }
}

/// Install the global tracing subscriber.
///
/// `PAGEVAULT_LOG` wins when set; otherwise `warn`, or `debug` with `--debug`.
fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "warn" }));
    // A subscriber may already be installed when embedded in tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.debug);

    let ctx = Context {
        config_path: cli.config.clone(),
        namespace: cli.namespace.clone(),
        verbosity: Verbosity::from_flags(cli.quiet, cli.debug),
        json: cli.json,
    };

    commands::dispatch(cli.command, &ctx)
}
