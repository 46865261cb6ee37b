use anyhow::Result;
use clap::Subcommand;
use owo_colors::OwoColorize;
use uuid::Uuid;

use calfeed_core::subscription::CalendarSubscription;

use super::{build_context, find_subscription, LOCAL_OWNER};

#[derive(Subcommand)]
pub enum SubscribeAction {
    /// Subscribe to a webcal/https feed (the feed is validated before saving)
    Add {
        /// Display name for the subscription
        name: String,

        /// Feed URL (webcal:// or https://)
        url: String,

        /// Sync interval in minutes
        #[arg(short, long)]
        interval: Option<u32>,

        /// Display color (e.g. "#336699")
        #[arg(long)]
        color: Option<String>,
    },
    /// List subscriptions and their sync status
    List,
    /// Remove a subscription and every event sourced from it
    Remove {
        /// Subscription name or id
        name: String,
    },
}

pub async fn run(action: SubscribeAction) -> Result<()> {
    let ctx = build_context()?;

    match action {
        SubscribeAction::Add {
            name,
            url,
            interval,
            color,
        } => {
            let interval = interval.unwrap_or(ctx.config.default_sync_interval_minutes);
            let mut subscription = CalendarSubscription::new(
                Uuid::new_v4().to_string(),
                LOCAL_OWNER,
                name.clone(),
                url,
                interval,
            );
            subscription.color = color;

            let outcome = ctx.scheduler.add_subscription(subscription).await?;
            println!(
                "Subscribed to '{}': {} event(s) imported",
                name.bold(),
                outcome.added.to_string().green()
            );
            for error in &outcome.errors {
                eprintln!("  {} {}", "warning:".yellow(), error);
            }
        }
        SubscribeAction::List => {
            use calfeed_core::store::SubscriptionStore;
            let subscriptions = SubscriptionStore::list(ctx.store.as_ref()).await?;
            if subscriptions.is_empty() {
                println!("No subscriptions. Add one with `calfeed subscribe add <name> <url>`.");
                return Ok(());
            }
            for sub in subscriptions {
                let status = match (&sub.last_sync_error, &sub.last_sync_at) {
                    (Some(error), _) => format!("failed: {error}").red().to_string(),
                    (None, Some(at)) => format!("synced {}", at.format("%Y-%m-%d %H:%M UTC"))
                        .green()
                        .to_string(),
                    (None, None) => "never synced".dimmed().to_string(),
                };
                println!(
                    "{}  every {}m  {}\n    {}",
                    sub.name.bold(),
                    sub.sync_interval_minutes,
                    status,
                    sub.url.dimmed()
                );
            }
        }
        SubscribeAction::Remove { name } => {
            let subscription = find_subscription(&ctx.store, &name).await?;
            let removed = ctx.scheduler.remove_subscription(&subscription.id).await?;
            println!(
                "Removed '{}' and {} event(s)",
                subscription.name.bold(),
                removed
            );
        }
    }

    Ok(())
}
