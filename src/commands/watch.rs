use anyhow::Result;

use calfeed_core::store::SubscriptionStore;

use super::build_context;

pub async fn run() -> Result<()> {
    let ctx = build_context()?;

    let count = SubscriptionStore::list(ctx.store.as_ref()).await?.len();
    println!(
        "Watching {count} subscription(s), scanning every {}s. Press Ctrl-C to stop.",
        ctx.config.tick_interval_secs
    );

    ctx.scheduler.clone().start();
    tokio::signal::ctrl_c().await?;
    ctx.scheduler.stop().await;

    println!("Stopped.");
    Ok(())
}
