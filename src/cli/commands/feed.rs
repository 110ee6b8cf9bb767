//! feed command - Recent changes across all namespaces

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::feed::{by_day, FeedBuilder};
use crate::ui::output;

/// Print the change feed, grouped by day.
pub fn feed(ctx: &Context, limit: Option<usize>) -> Result<()> {
    let (config, registry) = ctx.registry()?;
    let mut builder = FeedBuilder::from_config(&config);
    if let Some(limit) = limit {
        builder = builder.limit(limit);
    }
    let entries = builder.build(&registry).context("Failed to build feed")?;

    if ctx.json {
        return Ok(output::json(&entries)?);
    }
    for (day, items) in by_day(&entries) {
        println!("{}", day);
        for entry in items {
            println!("  {}", output::format_change(&entry.change));
        }
    }
    Ok(())
}
