use anyhow::{bail, Result};
use owo_colors::OwoColorize;

use calfeed_core::store::SubscriptionStore;

use super::{build_context, find_subscription};

pub async fn run(name: Option<String>, all: bool) -> Result<()> {
    let ctx = build_context()?;

    let subscriptions = match name {
        Some(name) => vec![find_subscription(&ctx.store, &name).await?],
        None if all => SubscriptionStore::list(ctx.store.as_ref()).await?,
        None => bail!("Specify a subscription name, or --all"),
    };

    if subscriptions.is_empty() {
        println!("No subscriptions to sync.");
        return Ok(());
    }

    for subscription in subscriptions {
        match ctx.scheduler.sync_subscription(&subscription.id).await {
            Ok(outcome) => {
                println!(
                    "{}: {} added, {} updated, {} deleted",
                    subscription.name.bold(),
                    outcome.added,
                    outcome.updated,
                    outcome.deleted
                );
                for error in &outcome.errors {
                    eprintln!("  {} {}", "warning:".yellow(), error);
                }
            }
            Err(e) => eprintln!("{}: {}", subscription.name.bold(), e.to_string().red()),
        }
    }

    Ok(())
}
