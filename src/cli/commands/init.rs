//! init command - Create a repository and a configuration pointing at it

use std::path::Path;

use anyhow::{bail, Context as _, Result};
use tracing::info;

use crate::cli::Context;
use crate::core::config::{Config, ConfigFile, ProviderConfig, DEFAULT_PROVIDER};
use crate::git::Git;
use crate::store::BackendKind;
use crate::ui::output;

/// Initialize a repository at `path` and write a configuration file.
///
/// The configuration goes to `--config` when given, otherwise to
/// `~/.pagevault/config.toml`. An existing file is only replaced with
/// `force`. Re-initializing an existing repository is harmless.
pub fn init(ctx: &Context, path: &Path, force: bool) -> Result<()> {
    let namespace = ctx.namespace()?;
    let config_path = match &ctx.config_path {
        Some(p) => p.clone(),
        None => Config::default_config_path()?,
    };
    if config_path.exists() && !force {
        bail!(
            "Configuration already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let info = Git::init(path).context("Failed to initialize repository")?;
    info!(work_dir = %info.work_dir.display(), "repository ready");

    let mut file = ConfigFile {
        namespaces: Some(vec![namespace.to_string()]),
        ..Default::default()
    };
    file.providers.insert(
        DEFAULT_PROVIDER.to_string(),
        ProviderConfig {
            backend: Some(BackendKind::Git.name().to_string()),
            path: Some(info.work_dir.clone()),
        },
    );
    Config::write_atomic(&config_path, &file).context("Failed to write configuration")?;

    if ctx.json {
        output::json(&serde_json::json!({
            "repository": info.work_dir,
            "config": config_path,
        }))?;
    } else {
        output::print(
            format!("Initialized repository at {}", info.work_dir.display()),
            ctx.verbosity,
        );
        output::print(
            format!("Wrote configuration to {}", config_path.display()),
            ctx.verbosity,
        );
    }
    Ok(())
}
