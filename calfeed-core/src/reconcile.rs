//! Full-set reconciliation of feed candidates against stored events.
//!
//! The candidate list is always treated as the complete authoritative state
//! of the remote feed as of one fetch. The join key is the external uid,
//! never the storage-internal event id.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::event::{CandidateEvent, Event};
use crate::store::EventStore;
use crate::subscription::CalendarSubscription;

/// Counts of applied changes plus the per-row failures encountered.
///
/// Counts reflect final per-row outcomes only; a row that failed is counted
/// in `errors`, not in the change counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub errors: Vec<String>,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.deleted == 0 && self.errors.is_empty()
    }
}

pub struct Reconciler {
    events: Arc<dyn EventStore>,
}

impl Reconciler {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Reconciler { events }
    }

    /// Reconcile `candidates` against the previous snapshot for one
    /// subscription: upsert every candidate, then delete previously stored
    /// events absent from the candidate set.
    ///
    /// Each create/update/delete is attempted independently; a failed row
    /// never blocks the remaining rows. Re-running with identical input is
    /// a no-op.
    pub async fn reconcile(
        &self,
        subscription: &CalendarSubscription,
        previous_by_uid: &HashMap<String, Event>,
        candidates: &[CandidateEvent],
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        let seen = self
            .apply_candidates(
                Some(subscription),
                &subscription.owner_id,
                previous_by_uid,
                candidates,
                &mut outcome,
            )
            .await;

        for (uid, event) in previous_by_uid {
            if seen.contains(uid.as_str()) {
                continue;
            }
            match self.events.delete(&event.id).await {
                Ok(()) => outcome.deleted += 1,
                Err(e) => outcome.errors.push(format!("delete {uid}: {e}")),
            }
        }

        debug!(
            subscription = %subscription.id,
            added = outcome.added,
            updated = outcome.updated,
            deleted = outcome.deleted,
            errors = outcome.errors.len(),
            "reconciliation finished"
        );
        outcome
    }

    /// One-shot import: create-or-update by uid, but never delete events
    /// absent from the input.
    pub async fn import(
        &self,
        owner_id: &str,
        previous_by_uid: &HashMap<String, Event>,
        candidates: &[CandidateEvent],
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        self.apply_candidates(None, owner_id, previous_by_uid, candidates, &mut outcome)
            .await;
        outcome
    }

    /// Upsert pass shared by reconcile and import. Returns the set of
    /// candidate uids processed. When a uid appears more than once in the
    /// candidate list, the first occurrence wins.
    async fn apply_candidates(
        &self,
        subscription: Option<&CalendarSubscription>,
        owner_id: &str,
        previous_by_uid: &HashMap<String, Event>,
        candidates: &[CandidateEvent],
        outcome: &mut ReconcileOutcome,
    ) -> HashSet<String> {
        let mut seen = HashSet::new();

        for candidate in candidates {
            if !seen.insert(candidate.uid.clone()) {
                continue;
            }

            match previous_by_uid.get(&candidate.uid) {
                Some(existing) => {
                    if !candidate_differs(existing, candidate) {
                        continue;
                    }
                    let mut updated = existing.clone();
                    apply_candidate_fields(&mut updated, candidate);
                    match self.events.update(&updated).await {
                        Ok(()) => outcome.updated += 1,
                        Err(e) => outcome.errors.push(format!("update {}: {e}", candidate.uid)),
                    }
                }
                None => {
                    let event = event_from_candidate(candidate, owner_id, subscription);
                    match self.events.insert(event).await {
                        Ok(()) => outcome.added += 1,
                        Err(e) => outcome.errors.push(format!("create {}: {e}", candidate.uid)),
                    }
                }
            }
        }

        seen
    }
}

/// Whether any reconciled field of the stored event differs from the
/// candidate.
fn candidate_differs(existing: &Event, candidate: &CandidateEvent) -> bool {
    existing.title != candidate.title
        || existing.start != candidate.start
        || existing.end != candidate.end
        || existing.all_day != candidate.all_day
        || existing.description != candidate.description
        || existing.location != candidate.location
        || existing.rrule != candidate.rrule
}

/// Copy the reconciled fields onto a stored event. The stored id, provenance,
/// and exclusion dates are never touched by an update.
fn apply_candidate_fields(event: &mut Event, candidate: &CandidateEvent) {
    event.title = candidate.title.clone();
    event.start = candidate.start;
    event.end = candidate.end;
    event.all_day = candidate.all_day;
    event.description = candidate.description.clone();
    event.location = candidate.location.clone();
    event.rrule = candidate.rrule.clone();
}

fn event_from_candidate(
    candidate: &CandidateEvent,
    owner_id: &str,
    subscription: Option<&CalendarSubscription>,
) -> Event {
    Event {
        id: Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        title: candidate.title.clone(),
        color: subscription.and_then(|s| s.color.clone()),
        description: candidate.description.clone(),
        location: candidate.location.clone(),
        start: candidate.start,
        end: candidate.end,
        all_day: candidate.all_day,
        rrule: candidate.rrule.clone(),
        dtstart: None,
        duration_ms: None,
        exdates: vec![],
        source_subscription_id: subscription.map(|s| s.id.clone()),
        source_uid: Some(candidate.uid.clone()),
    }
}

/// Index previously stored events by their external uid, the reconciliation
/// join key. Events without one cannot be reconciled and are ignored.
pub fn index_by_uid(events: Vec<Event>) -> HashMap<String, Event> {
    events
        .into_iter()
        .filter_map(|e| e.source_uid.clone().map(|uid| (uid, e)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CalFeedError, CalFeedResult};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    fn subscription() -> CalendarSubscription {
        CalendarSubscription::new("s1", "u1", "Team", "https://example.com/cal.ics", 30)
    }

    fn candidate(uid: &str, title: &str) -> CandidateEvent {
        CandidateEvent {
            uid: uid.to_string(),
            title: title.to_string(),
            start: Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 1, 15, 11, 0, 0).unwrap(),
            all_day: false,
            description: None,
            location: None,
            rrule: None,
        }
    }

    async fn seed(store: &Arc<MemoryStore>, candidates: &[CandidateEvent]) -> HashMap<String, Event> {
        let reconciler = Reconciler::new(store.clone() as Arc<dyn EventStore>);
        let sub = subscription();
        reconciler.reconcile(&sub, &HashMap::new(), candidates).await;
        index_by_uid(store.events_for_subscription(&sub.id).await.unwrap())
    }

    #[tokio::test]
    async fn test_full_set_reconciliation_scenario() {
        let store = Arc::new(MemoryStore::new());
        let previous = seed(
            &store,
            &[candidate("a", "A"), candidate("b", "B"), candidate("c", "C")],
        )
        .await;
        assert_eq!(previous.len(), 3);

        let reconciler = Reconciler::new(store.clone() as Arc<dyn EventStore>);
        let outcome = reconciler
            .reconcile(
                &subscription(),
                &previous,
                &[
                    candidate("b", "B updated"),
                    candidate("c", "C updated"),
                    candidate("d", "D"),
                ],
            )
            .await;

        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.updated, 2);
        assert_eq!(outcome.deleted, 1);
        assert!(outcome.errors.is_empty());

        let remaining = index_by_uid(store.events_for_subscription("s1").await.unwrap());
        assert!(!remaining.contains_key("a"));
        assert_eq!(remaining["b"].title, "B updated");
        assert_eq!(remaining["d"].title, "D");
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let candidates = vec![candidate("a", "A"), candidate("b", "B")];
        let previous = seed(&store, &candidates).await;

        let reconciler = Reconciler::new(store.clone() as Arc<dyn EventStore>);
        let second = reconciler
            .reconcile(&subscription(), &previous, &candidates)
            .await;

        assert!(second.is_noop(), "second run must be a no-op: {second:?}");
    }

    #[tokio::test]
    async fn test_update_preserves_stored_id_and_uid() {
        let store = Arc::new(MemoryStore::new());
        let previous = seed(&store, &[candidate("a", "A")]).await;
        let original_id = previous["a"].id.clone();

        let reconciler = Reconciler::new(store.clone() as Arc<dyn EventStore>);
        reconciler
            .reconcile(&subscription(), &previous, &[candidate("a", "A v2")])
            .await;

        let events = store.events_for_subscription("s1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, original_id);
        assert_eq!(events[0].source_uid.as_deref(), Some("a"));
        assert_eq!(events[0].title, "A v2");
    }

    #[tokio::test]
    async fn test_duplicate_candidate_uids_first_wins() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(store.clone() as Arc<dyn EventStore>);
        let outcome = reconciler
            .reconcile(
                &subscription(),
                &HashMap::new(),
                &[candidate("a", "First"), candidate("a", "Second")],
            )
            .await;

        assert_eq!(outcome.added, 1);
        let events = store.events_for_subscription("s1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "First");
    }

    #[tokio::test]
    async fn test_import_never_deletes() {
        let store = Arc::new(MemoryStore::new());
        let previous = seed(&store, &[candidate("a", "A"), candidate("b", "B")]).await;

        let reconciler = Reconciler::new(store.clone() as Arc<dyn EventStore>);
        let outcome = reconciler
            .import("u1", &previous, &[candidate("c", "C")])
            .await;

        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.deleted, 0);
        assert_eq!(store.all().await.unwrap().len(), 3);
    }

    /// Store wrapper that fails updates for one specific event id.
    struct FlakyStore {
        inner: MemoryStore,
        fail_update_id: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl EventStore for FlakyStore {
        async fn insert(&self, event: Event) -> CalFeedResult<()> {
            self.inner.insert(event).await
        }
        async fn update(&self, event: &Event) -> CalFeedResult<()> {
            if self.fail_update_id.lock().unwrap().as_deref() == Some(event.id.as_str()) {
                return Err(CalFeedError::Store("simulated write failure".to_string()));
            }
            self.inner.update(event).await
        }
        async fn delete(&self, id: &str) -> CalFeedResult<()> {
            self.inner.delete(id).await
        }
        async fn all(&self) -> CalFeedResult<Vec<Event>> {
            self.inner.all().await
        }
        async fn events_for_subscription(&self, subscription_id: &str) -> CalFeedResult<Vec<Event>> {
            self.inner.events_for_subscription(subscription_id).await
        }
        async fn delete_for_subscription(&self, subscription_id: &str) -> CalFeedResult<usize> {
            self.inner.delete_for_subscription(subscription_id).await
        }
    }

    #[tokio::test]
    async fn test_partial_failure_does_not_block_remaining_rows() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            fail_update_id: std::sync::Mutex::new(None),
        });
        let reconciler = Reconciler::new(store.clone() as Arc<dyn EventStore>);

        let sub = subscription();
        reconciler
            .reconcile(
                &sub,
                &HashMap::new(),
                &[candidate("a", "A"), candidate("b", "B")],
            )
            .await;
        let previous = index_by_uid(store.events_for_subscription("s1").await.unwrap());
        *store.fail_update_id.lock().unwrap() = Some(previous["a"].id.clone());

        let outcome = reconciler
            .reconcile(
                &sub,
                &previous,
                &[
                    candidate("a", "A v2"),
                    candidate("b", "B v2"),
                    candidate("c", "C"),
                ],
            )
            .await;

        assert_eq!(outcome.updated, 1, "the other update still lands");
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("update a"));
    }
}
