//! Page commands - exists, read, list, save, rename, delete

use std::io::Write;
use std::path::Path;

use anyhow::{Context as _, Result};

use super::{read_content, revision_ref};
use crate::cli::args::AuthorArgs;
use crate::cli::{resolve_author, Context};
use crate::core::types::{DocumentName, DocumentRef, Revision};
use crate::ui::output;

fn document(ctx: &Context, name: &str, rev: Option<&str>) -> Result<DocumentRef> {
    let doc = DocumentRef::new(ctx.namespace()?, DocumentName::new(name)?);
    Ok(match revision_ref(rev)? {
        Some(rev) => doc.at(rev),
        None => doc,
    })
}

fn report(ctx: &Context, verb: &str, what: &str, revision: &Revision) -> Result<()> {
    if ctx.json {
        output::json(revision)?;
    } else {
        output::print(
            format!("{} {} ({})", verb, what, revision.short_id),
            ctx.verbosity,
        );
    }
    Ok(())
}

/// Print whether a page exists.
pub fn exists(ctx: &Context, name: &str, rev: Option<&str>) -> Result<()> {
    let (_, registry) = ctx.registry()?;
    let doc = document(ctx, name, rev)?;
    let found = ctx.store(&registry)?.exists(&doc)?;
    if ctx.json {
        output::json(&serde_json::json!({ "name": name, "exists": found }))?;
    } else {
        println!("{}", if found { "yes" } else { "no" });
    }
    Ok(())
}

/// Write the raw content of a page to stdout.
pub fn read(ctx: &Context, name: &str, rev: Option<&str>) -> Result<()> {
    let (_, registry) = ctx.registry()?;
    let doc = document(ctx, name, rev)?;
    let content = ctx
        .store(&registry)?
        .read(&doc)
        .with_context(|| format!("Failed to read {}", doc))?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&content)?;
    stdout.flush()?;
    Ok(())
}

/// List the pages of the namespace.
pub fn list(ctx: &Context) -> Result<()> {
    let (_, registry) = ctx.registry()?;
    let names = ctx.store(&registry)?.list(&ctx.namespace()?)?;
    if ctx.json {
        output::json(&names)?;
    } else if !names.is_empty() {
        println!("{}", output::format_list(&names, ""));
    }
    Ok(())
}

/// Save a page from a file or stdin.
pub fn save(
    ctx: &Context,
    name: &str,
    file: Option<&Path>,
    message: &str,
    author: &AuthorArgs,
) -> Result<()> {
    let (config, registry) = ctx.registry()?;
    let author = resolve_author(author, &config)?;
    let doc = document(ctx, name, None)?;
    let content = read_content(file)?;
    let revision = ctx
        .store(&registry)?
        .save(&doc, &content, message, &author)
        .with_context(|| format!("Failed to save {}", doc))?;
    report(ctx, "Saved", name, &revision)
}

/// Rename a page.
pub fn rename(ctx: &Context, from: &str, to: &str, author: &AuthorArgs) -> Result<()> {
    let (config, registry) = ctx.registry()?;
    let author = resolve_author(author, &config)?;
    let source = document(ctx, from, None)?;
    let target = document(ctx, to, None)?;
    let revision = ctx
        .store(&registry)?
        .rename(&source, &target, &author)
        .with_context(|| format!("Failed to rename {} to {}", from, to))?;
    report(ctx, "Renamed", &format!("{} to {}", from, to), &revision)
}

/// Delete a page.
pub fn delete(ctx: &Context, name: &str, author: &AuthorArgs) -> Result<()> {
    let (config, registry) = ctx.registry()?;
    let author = resolve_author(author, &config)?;
    let doc = document(ctx, name, None)?;
    let revision = ctx
        .store(&registry)?
        .delete(&doc, &author)
        .with_context(|| format!("Failed to delete {}", doc))?;
    report(ctx, "Deleted", name, &revision)
}
