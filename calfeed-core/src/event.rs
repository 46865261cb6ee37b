//! Event types: persisted masters, ephemeral occurrences, and feed candidates.
//!
//! An [`Event`] is the stored record. A recurring master (one with an RRULE)
//! is never rendered directly; the expander turns it into [`Occurrence`]
//! values, which exist only for the duration of one expansion call and are
//! never written back.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A persisted calendar event.
///
/// For non-recurring events `start`/`end` are the rendered bounds. For a
/// recurring master they are the bounds of the first occurrence; the
/// recurrence fields (`rrule`, `dtstart`, `duration_ms`, `exdates`) describe
/// the rest of the series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,

    // Recurrence fields (set iff this event is a recurring master)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrule: Option<String>,
    /// Recurrence anchor; falls back to `start` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtstart: Option<DateTime<Utc>>,
    /// Occurrence duration in milliseconds; falls back to `end - start`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Excluded occurrence start times.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exdates: Vec<DateTime<Utc>>,

    // Provenance (set iff sourced from an external feed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_subscription_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uid: Option<String>,
}

impl Event {
    pub fn is_recurring(&self) -> bool {
        self.rrule.is_some()
    }

    /// Occurrence duration: explicit `duration_ms` when present, else the
    /// span of the first occurrence. Never negative.
    pub fn occurrence_duration(&self) -> Duration {
        let duration = match self.duration_ms {
            Some(ms) => Duration::milliseconds(ms),
            None => self.end - self.start,
        };
        duration.max(Duration::zero())
    }

    /// Recurrence anchor: explicit `dtstart` when present, else `start`.
    pub fn recurrence_anchor(&self) -> DateTime<Utc> {
        self.dtstart.unwrap_or(self.start)
    }

    /// Whether `[start, end)` intersects `[window_start, window_end)`.
    pub fn intersects(&self, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> bool {
        self.start < window_end && self.end > window_start
    }
}

/// One concrete instance of a recurring master at a resolved start time.
///
/// Ephemeral: created on each expansion request, discarded after use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_subscription_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uid: Option<String>,

    pub is_recurring_instance: bool,
    pub original_event_id: String,
    /// 0-based position among the occurrences emitted for one expansion call.
    pub recurrence_index: usize,
}

impl Occurrence {
    pub fn from_master(
        master: &Event,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        recurrence_index: usize,
    ) -> Self {
        Occurrence {
            id: format!("{}:{}", master.id, start.timestamp()),
            owner_id: master.owner_id.clone(),
            title: master.title.clone(),
            color: master.color.clone(),
            description: master.description.clone(),
            location: master.location.clone(),
            start,
            end,
            all_day: master.all_day,
            source_subscription_id: master.source_subscription_id.clone(),
            source_uid: master.source_uid.clone(),
            is_recurring_instance: true,
            original_event_id: master.id.clone(),
            recurrence_index,
        }
    }
}

/// Output of a windowed expansion: plain events pass through, recurring
/// masters are replaced by their occurrences.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExpandedEvent {
    Single(Event),
    Instance(Occurrence),
}

impl ExpandedEvent {
    pub fn start(&self) -> DateTime<Utc> {
        match self {
            ExpandedEvent::Single(e) => e.start,
            ExpandedEvent::Instance(o) => o.start,
        }
    }

    pub fn end(&self) -> DateTime<Utc> {
        match self {
            ExpandedEvent::Single(e) => e.end,
            ExpandedEvent::Instance(o) => o.end,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ExpandedEvent::Single(e) => &e.title,
            ExpandedEvent::Instance(o) => &o.title,
        }
    }

    pub fn all_day(&self) -> bool {
        match self {
            ExpandedEvent::Single(e) => e.all_day,
            ExpandedEvent::Instance(o) => o.all_day,
        }
    }
}

/// A candidate event parsed from an external feed, before reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvent {
    pub uid: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrule: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plain_event(start_h: u32, end_h: u32) -> Event {
        Event {
            id: "e1".to_string(),
            owner_id: "u1".to_string(),
            title: "Test".to_string(),
            color: None,
            description: None,
            location: None,
            start: Utc.with_ymd_and_hms(2025, 1, 15, start_h, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 1, 15, end_h, 0, 0).unwrap(),
            all_day: false,
            rrule: None,
            dtstart: None,
            duration_ms: None,
            exdates: vec![],
            source_subscription_id: None,
            source_uid: None,
        }
    }

    #[test]
    fn test_occurrence_duration_falls_back_to_span() {
        let event = plain_event(10, 12);
        assert_eq!(event.occurrence_duration(), Duration::hours(2));
    }

    #[test]
    fn test_occurrence_duration_prefers_explicit_field() {
        let mut event = plain_event(10, 12);
        event.duration_ms = Some(30 * 60 * 1000);
        assert_eq!(event.occurrence_duration(), Duration::minutes(30));
    }

    #[test]
    fn test_intersects_is_half_open() {
        let event = plain_event(10, 11);
        let w0 = Utc.with_ymd_and_hms(2025, 1, 15, 11, 0, 0).unwrap();
        let w1 = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        // Event ends exactly at window start: no intersection.
        assert!(!event.intersects(w0, w1));

        let w0 = Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap();
        assert!(event.intersects(w0, w1));
    }
}
