//! Background synchronization of feed subscriptions.
//!
//! A single periodic driver promotes due subscriptions to sync cycles
//! (fetch, parse, reconcile, persist status). Cycles for different
//! subscriptions run concurrently; a given subscription's cycle is strictly
//! sequential and non-reentrant, enforced by an in-flight marker. Every
//! terminal outcome writes `last_sync_at` and either clears or sets
//! `last_sync_error`; failures never delete event data.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{CalFeedError, CalFeedResult};
use crate::fetch::{FeedFetcher, FetchOutcome};
use crate::ics;
use crate::reconcile::{index_by_uid, ReconcileOutcome, Reconciler};
use crate::store::{EventStore, SubscriptionStore};
use crate::subscription::CalendarSubscription;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_CYCLE_TIMEOUT: Duration = Duration::from_secs(60);

/// What one successful cycle produced.
enum CycleSuccess {
    NotModified,
    Fetched {
        outcome: ReconcileOutcome,
        etag: Option<String>,
        last_modified: Option<String>,
    },
}

pub struct SyncScheduler {
    subscriptions: Arc<dyn SubscriptionStore>,
    events: Arc<dyn EventStore>,
    fetcher: Arc<dyn FeedFetcher>,
    clock: Arc<dyn Clock>,
    reconciler: Reconciler,
    tick_interval: Duration,
    cycle_timeout: Duration,
    in_flight: Mutex<HashSet<String>>,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        events: Arc<dyn EventStore>,
        fetcher: Arc<dyn FeedFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let reconciler = Reconciler::new(events.clone());
        SyncScheduler {
            subscriptions,
            events,
            fetcher,
            clock,
            reconciler,
            tick_interval: DEFAULT_TICK_INTERVAL,
            cycle_timeout: DEFAULT_CYCLE_TIMEOUT,
            in_flight: Mutex::new(HashSet::new()),
            cancel: CancellationToken::new(),
            driver: Mutex::new(None),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_cycle_timeout(mut self, timeout: Duration) -> Self {
        self.cycle_timeout = timeout;
        self
    }

    /// Start the periodic driver. Idempotent: a second call while running is
    /// a no-op.
    pub fn start(self: Arc<Self>) {
        let mut driver = match self.driver.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if driver.is_some() {
            return;
        }

        let scheduler = Arc::clone(&self);
        let cancel = self.cancel.clone();
        *driver = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.tick_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = scheduler.run_due_cycles().await {
                            warn!(error = %e, "sync tick failed");
                        }
                    }
                }
            }
            debug!("sync driver stopped");
        }));
    }

    /// Stop the periodic driver and wait for it to wind down. In-flight
    /// cycles finish on their own.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = match self.driver.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// One tick: run a sync cycle for every due subscription, concurrently.
    /// Subscriptions already in flight are skipped.
    pub async fn run_due_cycles(&self) -> CalFeedResult<()> {
        let now = self.clock.now();
        let due: Vec<CalendarSubscription> = self
            .subscriptions
            .list()
            .await?
            .into_iter()
            .filter(|sub| sub.is_due(now))
            .collect();

        if due.is_empty() {
            return Ok(());
        }
        debug!(count = due.len(), "running due sync cycles");

        let cycles = due.into_iter().map(|sub| async move {
            let name = sub.name.clone();
            match self.sync_one(sub).await {
                Ok(outcome) => info!(
                    subscription = %name,
                    added = outcome.added,
                    updated = outcome.updated,
                    deleted = outcome.deleted,
                    "sync cycle finished"
                ),
                Err(CalFeedError::SyncInProgress(_)) => {
                    debug!(subscription = %name, "sync already in flight; skipping")
                }
                Err(e) => warn!(subscription = %name, error = %e, "sync cycle failed"),
            }
        });
        futures::future::join_all(cycles).await;
        Ok(())
    }

    /// Manual/forced sync for one subscription: bypasses the due-check but
    /// still respects the single-in-flight rule.
    pub async fn sync_subscription(&self, id: &str) -> CalFeedResult<ReconcileOutcome> {
        let subscription = self
            .subscriptions
            .get(id)
            .await?
            .ok_or_else(|| CalFeedError::SubscriptionNotFound(id.to_string()))?;
        self.sync_one(subscription).await
    }

    /// Create a subscription: one synchronous validation fetch + parse must
    /// succeed before the subscription persists, followed by one
    /// reconciliation cycle whose outcome is returned.
    pub async fn add_subscription(
        &self,
        subscription: CalendarSubscription,
    ) -> CalFeedResult<ReconcileOutcome> {
        if subscription.sync_interval_minutes == 0 {
            return Err(CalFeedError::Config(
                "sync interval must be a positive number of minutes".to_string(),
            ));
        }

        let fetched = self.fetcher.fetch(&subscription.url, None, None).await?;
        let FetchOutcome::Fetched {
            body,
            etag,
            last_modified,
        } = fetched
        else {
            return Err(CalFeedError::FeedUnreachable(
                "server returned not-modified for an unconditional request".to_string(),
            ));
        };
        let candidates = ics::parse_feed(&body)?;

        self.subscriptions.insert(subscription.clone()).await?;
        let outcome = self
            .reconciler
            .reconcile(&subscription, &Default::default(), &candidates)
            .await;

        let mut subscription = subscription;
        subscription.last_sync_at = Some(self.clock.now());
        subscription.last_sync_error = None;
        subscription.etag = etag;
        subscription.last_modified = last_modified;
        self.subscriptions.update(&subscription).await?;

        info!(subscription = %subscription.name, added = outcome.added, "subscription created");
        Ok(outcome)
    }

    /// Delete a subscription, cascading deletion of every event sourced from
    /// it.
    pub async fn remove_subscription(&self, id: &str) -> CalFeedResult<usize> {
        let removed = self.events.delete_for_subscription(id).await?;
        self.subscriptions.delete(id).await?;
        info!(subscription = %id, events_removed = removed, "subscription removed");
        Ok(removed)
    }

    /// Run one full cycle for a subscription under the in-flight marker and
    /// the per-cycle timeout, then persist the sync metadata.
    async fn sync_one(
        &self,
        subscription: CalendarSubscription,
    ) -> CalFeedResult<ReconcileOutcome> {
        let _guard = self
            .begin(&subscription.id)
            .ok_or_else(|| CalFeedError::SyncInProgress(subscription.id.clone()))?;

        let result = match tokio::time::timeout(self.cycle_timeout, self.run_cycle(&subscription))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(CalFeedError::FeedUnreachable(format!(
                "sync cycle timed out after {}s",
                self.cycle_timeout.as_secs()
            ))),
        };

        let mut updated = subscription;
        updated.last_sync_at = Some(self.clock.now());
        match &result {
            Ok(CycleSuccess::NotModified) => {
                updated.last_sync_error = None;
            }
            Ok(CycleSuccess::Fetched {
                etag,
                last_modified,
                ..
            }) => {
                updated.last_sync_error = None;
                updated.etag = etag.clone();
                updated.last_modified = last_modified.clone();
            }
            Err(e) => {
                // Events and validators are left untouched on failure.
                updated.last_sync_error = Some(e.to_string());
            }
        }
        if let Err(e) = self.subscriptions.update(&updated).await {
            warn!(subscription = %updated.id, error = %e, "failed to persist sync metadata");
        }

        match result {
            Ok(CycleSuccess::NotModified) => Ok(ReconcileOutcome::default()),
            Ok(CycleSuccess::Fetched { outcome, .. }) => Ok(outcome),
            Err(e) => Err(e),
        }
    }

    /// Fetch, parse, and reconcile. No metadata writes happen here.
    async fn run_cycle(&self, subscription: &CalendarSubscription) -> CalFeedResult<CycleSuccess> {
        let fetched = self
            .fetcher
            .fetch(
                &subscription.url,
                subscription.etag.as_deref(),
                subscription.last_modified.as_deref(),
            )
            .await?;

        match fetched {
            FetchOutcome::NotModified => {
                debug!(subscription = %subscription.id, "feed not modified");
                Ok(CycleSuccess::NotModified)
            }
            FetchOutcome::Fetched {
                body,
                etag,
                last_modified,
            } => {
                let candidates = ics::parse_feed(&body)?;
                let previous = index_by_uid(
                    self.events
                        .events_for_subscription(&subscription.id)
                        .await?,
                );
                let outcome = self
                    .reconciler
                    .reconcile(subscription, &previous, &candidates)
                    .await;
                Ok(CycleSuccess::Fetched {
                    outcome,
                    etag,
                    last_modified,
                })
            }
        }
    }

    fn begin(&self, id: &str) -> Option<InFlightGuard<'_>> {
        let mut in_flight = self.in_flight.lock().ok()?;
        if !in_flight.insert(id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            id: id.to_string(),
            set: &self.in_flight,
        })
    }
}

/// RAII marker releasing a subscription's in-flight slot, including on
/// timeout or panic unwind within the cycle.
struct InFlightGuard<'a> {
    id: String,
    set: &'a Mutex<HashSet<String>>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.id);
        }
    }
}
