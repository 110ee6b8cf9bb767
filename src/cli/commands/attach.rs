//! attach command - Manage page attachments

use std::io::Write;

use anyhow::{Context as _, Result};

use super::{read_content, revision_ref};
use crate::cli::args::AttachAction;
use crate::cli::{resolve_author, Context};
use crate::core::types::{AttachmentRef, DocumentName};
use crate::ui::output;

fn attachment(ctx: &Context, page: &str, name: &str) -> Result<AttachmentRef> {
    Ok(AttachmentRef::new(
        ctx.namespace()?,
        DocumentName::new(page)?,
        DocumentName::new(name)?,
    ))
}

/// Run an attachment subcommand.
pub fn attach(ctx: &Context, action: AttachAction) -> Result<()> {
    let (config, registry) = ctx.registry()?;
    let store = ctx.store(&registry)?;

    match action {
        AttachAction::List { page } => {
            let page = DocumentName::new(page)?;
            let names = store.attachment_list(&ctx.namespace()?, &page)?;
            if ctx.json {
                output::json(&names)?;
            } else if !names.is_empty() {
                println!("{}", output::format_list(&names, ""));
            }
        }
        AttachAction::Read { page, name, rev } => {
            let mut target = attachment(ctx, &page, &name)?;
            if let Some(rev) = revision_ref(rev.as_deref())? {
                target = target.at(rev);
            }
            let content = store
                .attachment_read(&target)
                .with_context(|| format!("Failed to read {}", target))?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&content)?;
            stdout.flush()?;
        }
        AttachAction::Save {
            page,
            name,
            file,
            message,
            author,
        } => {
            let author = resolve_author(&author, &config)?;
            let target = attachment(ctx, &page, &name)?;
            let content = read_content(file.as_deref())?;
            let revision = store
                .attachment_save(&target, &content, &message, &author)
                .with_context(|| format!("Failed to save {}", target))?;
            if ctx.json {
                output::json(&revision)?;
            } else {
                output::print(
                    format!("Attached {} to {} ({})", name, page, revision.short_id),
                    ctx.verbosity,
                );
            }
        }
        AttachAction::Delete { page, name, author } => {
            let author = resolve_author(&author, &config)?;
            let target = attachment(ctx, &page, &name)?;
            let revision = store
                .attachment_delete(&target, &author)
                .with_context(|| format!("Failed to delete {}", target))?;
            if ctx.json {
                output::json(&revision)?;
            } else {
                output::print(
                    format!("Deleted {} from {} ({})", name, page, revision.short_id),
                    ctx.verbosity,
                );
            }
        }
        AttachAction::Log {
            page,
            name: Some(name),
        } => {
            let revisions = store.attachment_revisions(&attachment(ctx, &page, &name)?)?;
            if ctx.json {
                output::json(&revisions)?;
            } else {
                for revision in &revisions {
                    println!("{}", output::format_revision(revision));
                }
            }
        }
        AttachAction::Log { page, name: None } => {
            let page = DocumentName::new(page)?;
            let changes = store.attachment_changes(&ctx.namespace()?, Some(&page), 0)?;
            if ctx.json {
                output::json(&changes)?;
            } else {
                for change in &changes {
                    println!("{}", output::format_change(change));
                }
            }
        }
    }
    Ok(())
}
