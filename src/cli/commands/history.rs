//! History commands - log, changes, diff

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::core::types::{DocumentName, DocumentRef, RevSpec};
use crate::ui::output;

/// Show the revisions of a page, oldest first.
pub fn log(ctx: &Context, name: &str) -> Result<()> {
    let (_, registry) = ctx.registry()?;
    let doc = DocumentRef::new(ctx.namespace()?, DocumentName::new(name)?);
    let revisions = ctx.store(&registry)?.revisions(&doc)?;
    if ctx.json {
        output::json(&revisions)?;
    } else {
        for revision in &revisions {
            println!("{}", output::format_revision(revision));
        }
    }
    Ok(())
}

/// Show the revisions of every page in the namespace, oldest first.
pub fn changes(ctx: &Context, limit: usize) -> Result<()> {
    let (_, registry) = ctx.registry()?;
    let changes = ctx.store(&registry)?.changes(&ctx.namespace()?, limit)?;
    if ctx.json {
        output::json(&changes)?;
    } else {
        for change in &changes {
            println!("{}", output::format_change(change));
        }
    }
    Ok(())
}

/// Print the diff of a page between two revisions.
pub fn diff(ctx: &Context, name: &str, from: &str, to: &str) -> Result<()> {
    let (_, registry) = ctx.registry()?;
    let doc = DocumentRef::new(ctx.namespace()?, DocumentName::new(name)?);
    let from = RevSpec::new(from)?;
    let to = RevSpec::new(to)?;
    let text = ctx
        .store(&registry)?
        .diff(&doc, &from, &to)
        .with_context(|| format!("Failed to diff {} between {} and {}", doc, from, to))?;
    if ctx.json {
        output::json(&serde_json::json!({
            "name": name,
            "from": from,
            "to": to,
            "diff": text,
        }))?;
    } else {
        print!("{}", text);
    }
    Ok(())
}
