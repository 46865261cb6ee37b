pub mod add;
pub mod events;
pub mod export;
pub mod import;
pub mod subscribe;
pub mod sync;
pub mod watch;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use calfeed_core::clock::SystemClock;
use calfeed_core::fetch::HttpFeedFetcher;
use calfeed_core::store::{EventStore, SubscriptionStore};
use calfeed_core::subscription::CalendarSubscription;
use calfeed_core::sync::SyncScheduler;

use crate::config::CalfeedConfig;
use crate::store::JsonFileStore;

/// Owner id for everything created by this binary. The store schema carries
/// an owner so multi-user deployments can scope by user.
pub const LOCAL_OWNER: &str = "local";

pub struct AppContext {
    pub config: CalfeedConfig,
    pub store: Arc<JsonFileStore>,
    pub scheduler: Arc<SyncScheduler>,
}

pub fn build_context() -> Result<AppContext> {
    let config = CalfeedConfig::load()?;
    let store = Arc::new(JsonFileStore::open(&config.data_path())?);
    let scheduler = Arc::new(
        SyncScheduler::new(
            store.clone() as Arc<dyn SubscriptionStore>,
            store.clone() as Arc<dyn EventStore>,
            Arc::new(HttpFeedFetcher::new()?),
            Arc::new(SystemClock),
        )
        .with_tick_interval(Duration::from_secs(config.tick_interval_secs))
        .with_cycle_timeout(Duration::from_secs(config.cycle_timeout_secs)),
    );

    Ok(AppContext {
        config,
        store,
        scheduler,
    })
}

/// Resolve a subscription by name or id.
pub async fn find_subscription(store: &JsonFileStore, needle: &str) -> Result<CalendarSubscription> {
    let subscriptions = SubscriptionStore::list(store).await?;
    subscriptions
        .into_iter()
        .find(|s| s.name == needle || s.id == needle)
        .ok_or_else(|| anyhow::anyhow!("No subscription named '{needle}'"))
}

/// Parse a date or datetime argument ("2025-03-20" or "2025-03-20T15:00").
pub fn parse_datetime(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M") {
        return Ok(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        return Ok(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(d.and_time(NaiveTime::MIN).and_utc());
    }
    bail!("Unrecognized date '{input}' (expected e.g. 2025-03-20 or 2025-03-20T15:00)")
}
