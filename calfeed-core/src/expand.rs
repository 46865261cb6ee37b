//! Windowed expansion of recurring masters into concrete occurrences.
//!
//! Non-recurring events pass through; recurring masters are replaced by their
//! occurrences within the window. Results are ephemeral and never persisted.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::CalFeedResult;
use crate::event::{Event, ExpandedEvent, Occurrence};
use crate::recurrence::{RRuleEngine, RecurrenceRuleEngine, DEFAULT_OCCURRENCE_CAP};

type CacheKey = (String, i64, i64, String);

struct CacheEntry {
    inserted_at: Instant,
    occurrences: Vec<DateTime<Utc>>,
}

/// Bounded, time-limited cache of interpreter output, keyed by
/// (master id, window bounds, rule string).
///
/// Purely a performance optimization: reads may always safely recompute, and
/// the cache is never a source of truth.
pub struct ExpansionCache {
    ttl: StdDuration,
    capacity: usize,
    entries: Mutex<std::collections::HashMap<CacheKey, CacheEntry>>,
}

impl ExpansionCache {
    pub fn new(ttl: StdDuration, capacity: usize) -> Self {
        ExpansionCache {
            ttl,
            capacity,
            entries: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// A cache that never stores anything; the test substitute.
    pub fn disabled() -> Self {
        Self::new(StdDuration::ZERO, 0)
    }

    fn get(&self, key: &CacheKey) -> Option<Vec<DateTime<Utc>>> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                Some(entry.occurrences.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: CacheKey, occurrences: Vec<DateTime<Utc>>) {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.len() >= self.capacity {
            entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        }
        if entries.len() >= self.capacity {
            // Still full after dropping expired entries: evict the oldest.
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                inserted_at: Instant::now(),
                occurrences,
            },
        );
    }
}

pub struct OccurrenceExpander {
    engine: Arc<dyn RecurrenceRuleEngine>,
    cache: ExpansionCache,
}

impl OccurrenceExpander {
    pub fn new(engine: Arc<dyn RecurrenceRuleEngine>, cache: ExpansionCache) -> Self {
        OccurrenceExpander { engine, cache }
    }

    /// Default engine (rrule-backed) with a short-lived cache.
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(RRuleEngine),
            ExpansionCache::new(StdDuration::from_secs(30), 256),
        )
    }

    /// Expand `masters` over `[window_start, window_end)`.
    ///
    /// A master whose recurrence rule fails to parse is emitted once as a
    /// plain event; one bad rule never blanks the whole response.
    pub fn expand(
        &self,
        masters: &[Event],
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Vec<ExpandedEvent> {
        let mut out = Vec::new();

        for master in masters {
            if !master.is_recurring() {
                if master.intersects(window_start, window_end) {
                    out.push(ExpandedEvent::Single(master.clone()));
                }
                continue;
            }

            match self.expand_master(master, window_start, window_end) {
                Ok(occurrences) => out.extend(occurrences.into_iter().map(ExpandedEvent::Instance)),
                Err(e) => {
                    warn!(
                        event_id = %master.id,
                        error = %e,
                        "recurrence rule failed to parse; rendering master as a single event"
                    );
                    out.push(ExpandedEvent::Single(master.clone()));
                }
            }
        }

        out
    }

    fn expand_master(
        &self,
        master: &Event,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> CalFeedResult<Vec<Occurrence>> {
        let rule = master.rrule.as_deref().unwrap_or_default();
        let duration = master.occurrence_duration();
        let anchor = master.recurrence_anchor();

        // Shift the lower bound back by the occurrence duration so an
        // occurrence that starts before the window but extends into it is
        // still produced.
        let effective_start = window_start - duration;

        let key: CacheKey = (
            master.id.clone(),
            effective_start.timestamp(),
            window_end.timestamp(),
            rule.to_string(),
        );

        let starts = match self.cache.get(&key) {
            Some(cached) => cached,
            None => {
                let computed = self.engine.occurrences_between(
                    rule,
                    anchor,
                    effective_start,
                    window_end,
                    DEFAULT_OCCURRENCE_CAP,
                )?;
                self.cache.put(key, computed.clone());
                computed
            }
        };

        let excluded: HashSet<DateTime<Utc>> = master.exdates.iter().copied().collect();

        let mut occurrences = Vec::new();
        for start in starts {
            if excluded.contains(&start) {
                continue;
            }
            let end = start + duration;
            // Half-open intersection with [window_start, window_end).
            if end <= window_start || start >= window_end {
                continue;
            }
            let index = occurrences.len();
            occurrences.push(Occurrence::from_master(master, start, end, index));
        }

        Ok(occurrences)
    }
}
