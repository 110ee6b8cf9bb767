//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Validates command-specific arguments into domain types
//! 2. Calls the store (or feed builder) through the registry
//! 3. Formats and displays output, as JSON with `--json`

mod attach;
mod completion;
mod feed;
mod history;
mod init;
mod pages;

pub use attach::attach;
pub use completion::completion;
pub use feed::feed;
pub use history::{changes, diff, log};
pub use init::init;
pub use pages::{delete, exists, list, read, rename, save};

use std::io::Read;
use std::path::Path;

use anyhow::{Context as _, Result};

use crate::cli::args::Command;
use crate::cli::Context;
use crate::core::types::RevSpec;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Init { path, force } => init::init(ctx, &path, force),
        Command::Exists { name, rev } => pages::exists(ctx, &name, rev.as_deref()),
        Command::Read { name, rev } => pages::read(ctx, &name, rev.as_deref()),
        Command::List => pages::list(ctx),
        Command::Save {
            name,
            file,
            message,
            author,
        } => pages::save(ctx, &name, file.as_deref(), &message, &author),
        Command::Rename { from, to, author } => pages::rename(ctx, &from, &to, &author),
        Command::Delete { name, author } => pages::delete(ctx, &name, &author),
        Command::Log { name } => history::log(ctx, &name),
        Command::Changes { limit } => history::changes(ctx, limit),
        Command::Diff { name, from, to } => history::diff(ctx, &name, &from, &to),
        Command::Attach { action } => attach::attach(ctx, action),
        Command::Feed { limit } => feed::feed(ctx, limit),
        Command::Completion { shell } => completion::completion(shell),
    }
}

/// Content from `file`, or all of stdin.
fn read_content(file: Option<&Path>) -> Result<Vec<u8>> {
    match file {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// Validate an optional `--rev`.
fn revision_ref(rev: Option<&str>) -> Result<Option<RevSpec>> {
    Ok(rev.map(RevSpec::new).transpose()?)
}
