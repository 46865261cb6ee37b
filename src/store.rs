//! JSON-file implementation of the engine's store traits.
//!
//! The whole store is one JSON document; writes go through a temp file and
//! an atomic rename.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use calfeed_core::error::{CalFeedError, CalFeedResult};
use calfeed_core::event::Event;
use calfeed_core::store::{EventStore, SubscriptionStore};
use calfeed_core::subscription::CalendarSubscription;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    events: Vec<Event>,
    #[serde(default)]
    subscriptions: Vec<CalendarSubscription>,
}

pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl JsonFileStore {
    pub fn open(path: &Path) -> CalFeedResult<Self> {
        let data = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| CalFeedError::Serialization(format!("{}: {e}", path.display())))?
        } else {
            StoreData::default()
        };

        Ok(JsonFileStore {
            path: path.to_path_buf(),
            data: Mutex::new(data),
        })
    }

    fn lock(&self) -> CalFeedResult<std::sync::MutexGuard<'_, StoreData>> {
        self.data
            .lock()
            .map_err(|_| CalFeedError::Store("store lock poisoned".to_string()))
    }

    fn persist(&self, data: &StoreData) -> CalFeedResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(data)
            .map_err(|e| CalFeedError::Serialization(e.to_string()))?;

        let temp = self.path.with_extension("json.tmp");
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for JsonFileStore {
    async fn insert(&self, event: Event) -> CalFeedResult<()> {
        let mut data = self.lock()?;
        data.events.retain(|e| e.id != event.id);
        data.events.push(event);
        self.persist(&data)
    }

    async fn update(&self, event: &Event) -> CalFeedResult<()> {
        let mut data = self.lock()?;
        let slot = data
            .events
            .iter_mut()
            .find(|e| e.id == event.id)
            .ok_or_else(|| CalFeedError::EventNotFound(event.id.clone()))?;
        *slot = event.clone();
        self.persist(&data)
    }

    async fn delete(&self, id: &str) -> CalFeedResult<()> {
        let mut data = self.lock()?;
        let before = data.events.len();
        data.events.retain(|e| e.id != id);
        if data.events.len() == before {
            return Err(CalFeedError::EventNotFound(id.to_string()));
        }
        self.persist(&data)
    }

    async fn all(&self) -> CalFeedResult<Vec<Event>> {
        Ok(self.lock()?.events.clone())
    }

    async fn events_for_subscription(&self, subscription_id: &str) -> CalFeedResult<Vec<Event>> {
        Ok(self
            .lock()?
            .events
            .iter()
            .filter(|e| e.source_subscription_id.as_deref() == Some(subscription_id))
            .cloned()
            .collect())
    }

    async fn delete_for_subscription(&self, subscription_id: &str) -> CalFeedResult<usize> {
        let mut data = self.lock()?;
        let before = data.events.len();
        data.events
            .retain(|e| e.source_subscription_id.as_deref() != Some(subscription_id));
        let removed = before - data.events.len();
        self.persist(&data)?;
        Ok(removed)
    }
}

#[async_trait]
impl SubscriptionStore for JsonFileStore {
    async fn get(&self, id: &str) -> CalFeedResult<Option<CalendarSubscription>> {
        Ok(self
            .lock()?
            .subscriptions
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn list(&self) -> CalFeedResult<Vec<CalendarSubscription>> {
        let mut subs = self.lock()?.subscriptions.clone();
        subs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(subs)
    }

    async fn insert(&self, subscription: CalendarSubscription) -> CalFeedResult<()> {
        let mut data = self.lock()?;
        data.subscriptions.retain(|s| s.id != subscription.id);
        data.subscriptions.push(subscription);
        self.persist(&data)
    }

    async fn update(&self, subscription: &CalendarSubscription) -> CalFeedResult<()> {
        let mut data = self.lock()?;
        let slot = data
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id)
            .ok_or_else(|| CalFeedError::SubscriptionNotFound(subscription.id.clone()))?;
        *slot = subscription.clone();
        self.persist(&data)
    }

    async fn delete(&self, id: &str) -> CalFeedResult<()> {
        let mut data = self.lock()?;
        let before = data.subscriptions.len();
        data.subscriptions.retain(|s| s.id != id);
        if data.subscriptions.len() == before {
            return Err(CalFeedError::SubscriptionNotFound(id.to_string()));
        }
        self.persist(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(id: &str) -> Event {
        Event {
            id: id.to_string(),
            owner_id: "local".to_string(),
            title: "Stored".to_string(),
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
            source_subscription_id: None,
            source_uid: None,
        }
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonFileStore::open(&path).unwrap();
        EventStore::insert(&store, event("e1")).await.unwrap();
        SubscriptionStore::insert(
            &store,
            CalendarSubscription::new("s1", "local", "Team", "https://example.com/a.ics", 30),
        )
        .await
        .unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.all().await.unwrap().len(), 1);
        assert_eq!(
            SubscriptionStore::list(&reopened).await.unwrap()[0].name,
            "Team"
        );
    }

    #[tokio::test]
    async fn test_delete_missing_event_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(&dir.path().join("store.json")).unwrap();
        let err = EventStore::delete(&store, "nope").await.unwrap_err();
        assert!(matches!(err, CalFeedError::EventNotFound(_)));
    }

    #[tokio::test]
    async fn test_insert_replaces_same_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(&dir.path().join("store.json")).unwrap();

        EventStore::insert(&store, event("e1")).await.unwrap();
        let mut replacement = event("e1");
        replacement.title = "Replaced".to_string();
        EventStore::insert(&store, replacement).await.unwrap();

        let events = store.all().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Replaced");
    }
}
