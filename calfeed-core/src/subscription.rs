//! Calendar feed subscriptions and their sync metadata.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A subscription to an externally hosted calendar feed.
///
/// Sync metadata (`last_sync_at`, `last_sync_error`, `etag`, `last_modified`)
/// is mutated only by the subscription's own sync cycle; the owning user may
/// change name, color, and interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSubscription {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub auto_sync: bool,
    /// Strictly positive.
    pub sync_interval_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_error: Option<String>,

    // HTTP validators from the last successful fetch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl CalendarSubscription {
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        sync_interval_minutes: u32,
    ) -> Self {
        CalendarSubscription {
            id: id.into(),
            owner_id: owner_id.into(),
            name: name.into(),
            url: url.into(),
            color: None,
            auto_sync: true,
            sync_interval_minutes: sync_interval_minutes.max(1),
            last_sync_at: None,
            last_sync_error: None,
            etag: None,
            last_modified: None,
        }
    }

    /// A subscription is due exactly when auto-sync is on and it has either
    /// never synced or its interval has elapsed since the last sync.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.auto_sync {
            return false;
        }
        match self.last_sync_at {
            None => true,
            Some(last) => now >= last + Duration::minutes(i64::from(self.sync_interval_minutes)),
        }
    }
}
