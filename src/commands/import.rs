use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use calfeed_core::ics::parse_feed;
use calfeed_core::reconcile::{index_by_uid, Reconciler};
use calfeed_core::store::EventStore;

use super::{build_context, LOCAL_OWNER};

pub async fn run(file: PathBuf) -> Result<()> {
    let ctx = build_context()?;

    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("Could not read {}", file.display()))?;
    let candidates = parse_feed(&content)?;

    // Manual imports join against previously imported (subscription-less)
    // events only, and never delete anything.
    let previous = index_by_uid(
        ctx.store
            .all()
            .await?
            .into_iter()
            .filter(|e| e.source_subscription_id.is_none())
            .collect(),
    );

    let reconciler = Reconciler::new(ctx.store.clone() as Arc<dyn EventStore>);
    let outcome = reconciler.import(LOCAL_OWNER, &previous, &candidates).await;

    println!(
        "Imported {}: {} added, {} updated",
        file.display().to_string().bold(),
        outcome.added,
        outcome.updated
    );
    for error in &outcome.errors {
        eprintln!("  {} {}", "warning:".yellow(), error);
    }
    Ok(())
}
