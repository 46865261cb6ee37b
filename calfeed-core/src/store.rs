//! Abstract event and subscription stores.
//!
//! The engine depends on these traits, not on a specific database. The store
//! must provide per-event-row atomicity for create/update/delete; it does not
//! need cross-row transactions for a whole reconciliation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CalFeedError, CalFeedResult};
use crate::event::Event;
use crate::subscription::CalendarSubscription;

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert(&self, event: Event) -> CalFeedResult<()>;
    async fn update(&self, event: &Event) -> CalFeedResult<()>;
    async fn delete(&self, id: &str) -> CalFeedResult<()>;
    async fn all(&self) -> CalFeedResult<Vec<Event>>;
    async fn events_for_subscription(&self, subscription_id: &str) -> CalFeedResult<Vec<Event>>;
    /// Delete every event sourced from the given subscription, returning the
    /// number removed.
    async fn delete_for_subscription(&self, subscription_id: &str) -> CalFeedResult<usize>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get(&self, id: &str) -> CalFeedResult<Option<CalendarSubscription>>;
    async fn list(&self) -> CalFeedResult<Vec<CalendarSubscription>>;
    async fn insert(&self, subscription: CalendarSubscription) -> CalFeedResult<()>;
    async fn update(&self, subscription: &CalendarSubscription) -> CalFeedResult<()>;
    async fn delete(&self, id: &str) -> CalFeedResult<()>;
}

/// In-memory store backing tests and acting as the reference implementation
/// of both traits.
#[derive(Default)]
pub struct MemoryStore {
    events: Mutex<HashMap<String, Event>>,
    subscriptions: Mutex<HashMap<String, CalendarSubscription>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_events(&self) -> CalFeedResult<std::sync::MutexGuard<'_, HashMap<String, Event>>> {
        self.events
            .lock()
            .map_err(|_| CalFeedError::Store("event store lock poisoned".to_string()))
    }

    fn lock_subscriptions(
        &self,
    ) -> CalFeedResult<std::sync::MutexGuard<'_, HashMap<String, CalendarSubscription>>> {
        self.subscriptions
            .lock()
            .map_err(|_| CalFeedError::Store("subscription store lock poisoned".to_string()))
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert(&self, event: Event) -> CalFeedResult<()> {
        self.lock_events()?.insert(event.id.clone(), event);
        Ok(())
    }

    async fn update(&self, event: &Event) -> CalFeedResult<()> {
        let mut events = self.lock_events()?;
        if !events.contains_key(&event.id) {
            return Err(CalFeedError::EventNotFound(event.id.clone()));
        }
        events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> CalFeedResult<()> {
        self.lock_events()?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CalFeedError::EventNotFound(id.to_string()))
    }

    async fn all(&self) -> CalFeedResult<Vec<Event>> {
        Ok(self.lock_events()?.values().cloned().collect())
    }

    async fn events_for_subscription(&self, subscription_id: &str) -> CalFeedResult<Vec<Event>> {
        Ok(self
            .lock_events()?
            .values()
            .filter(|e| e.source_subscription_id.as_deref() == Some(subscription_id))
            .cloned()
            .collect())
    }

    async fn delete_for_subscription(&self, subscription_id: &str) -> CalFeedResult<usize> {
        let mut events = self.lock_events()?;
        let ids: Vec<String> = events
            .values()
            .filter(|e| e.source_subscription_id.as_deref() == Some(subscription_id))
            .map(|e| e.id.clone())
            .collect();
        for id in &ids {
            events.remove(id);
        }
        Ok(ids.len())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn get(&self, id: &str) -> CalFeedResult<Option<CalendarSubscription>> {
        Ok(self.lock_subscriptions()?.get(id).cloned())
    }

    async fn list(&self) -> CalFeedResult<Vec<CalendarSubscription>> {
        let mut subs: Vec<_> = self.lock_subscriptions()?.values().cloned().collect();
        subs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(subs)
    }

    async fn insert(&self, subscription: CalendarSubscription) -> CalFeedResult<()> {
        self.lock_subscriptions()?
            .insert(subscription.id.clone(), subscription);
        Ok(())
    }

    async fn update(&self, subscription: &CalendarSubscription) -> CalFeedResult<()> {
        let mut subs = self.lock_subscriptions()?;
        if !subs.contains_key(&subscription.id) {
            return Err(CalFeedError::SubscriptionNotFound(subscription.id.clone()));
        }
        subs.insert(subscription.id.clone(), subscription.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> CalFeedResult<()> {
        self.lock_subscriptions()?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CalFeedError::SubscriptionNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sourced_event(id: &str, subscription_id: &str, uid: &str) -> Event {
        Event {
            id: id.to_string(),
            owner_id: "u1".to_string(),
            title: format!("Event {id}"),
            color: None,
            description: None,
            location: None,
            start: Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 1, 15, 11, 0, 0).unwrap(),
            all_day: false,
            rrule: None,
            dtstart: None,
            duration_ms: None,
            exdates: vec![],
            source_subscription_id: Some(subscription_id.to_string()),
            source_uid: Some(uid.to_string()),
        }
    }

    #[tokio::test]
    async fn test_events_for_subscription_filters_by_provenance() {
        let store = MemoryStore::new();
        EventStore::insert(&store, sourced_event("e1", "s1", "a")).await.unwrap();
        EventStore::insert(&store, sourced_event("e2", "s1", "b")).await.unwrap();
        EventStore::insert(&store, sourced_event("e3", "s2", "c")).await.unwrap();

        let events = store.events_for_subscription("s1").await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_for_subscription_cascades() {
        let store = MemoryStore::new();
        EventStore::insert(&store, sourced_event("e1", "s1", "a")).await.unwrap();
        EventStore::insert(&store, sourced_event("e2", "s2", "b")).await.unwrap();

        let removed = store.delete_for_subscription("s1").await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_event_errors() {
        let store = MemoryStore::new();
        let event = sourced_event("missing", "s1", "a");
        let err = EventStore::update(&store, &event).await.unwrap_err();
        assert!(matches!(err, CalFeedError::EventNotFound(_)));
    }
}
