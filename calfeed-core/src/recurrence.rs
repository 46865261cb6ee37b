//! Recurrence rule interpretation.
//!
//! Wraps the `rrule` crate behind [`RecurrenceRuleEngine`] so the rest of the
//! engine is isolated from that library's exact parse and error types. Pure
//! computation, no I/O.

use chrono::{DateTime, Duration, Utc};
use rrule::RRuleSet;

use crate::error::{CalFeedError, CalFeedResult};

/// Hard cap on occurrences produced for a single rule, even when the rule is
/// unbounded. Bounds memory/CPU for windows spanning arbitrarily long ranges.
pub const DEFAULT_OCCURRENCE_CAP: usize = 100;

pub trait RecurrenceRuleEngine: Send + Sync {
    /// Resolve the occurrence start times of `rule` (anchored at `anchor`)
    /// that fall within `[window_start, window_end]`, truncated to at most
    /// `cap` entries. The result is non-decreasing and duplicate-free.
    fn occurrences_between(
        &self,
        rule: &str,
        anchor: DateTime<Utc>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        cap: usize,
    ) -> CalFeedResult<Vec<DateTime<Utc>>>;

    /// Human-readable description of `rule` for UI display. Returns a generic
    /// fallback string on unparseable input, never an error.
    fn describe(&self, rule: &str) -> String;
}

/// [`RecurrenceRuleEngine`] implementation backed by the `rrule` crate.
pub struct RRuleEngine;

/// Strip an optional leading `RRULE:` property-name prefix.
fn rule_body(rule: &str) -> &str {
    let trimmed = rule.trim();
    trimmed
        .strip_prefix("RRULE:")
        .or_else(|| trimmed.strip_prefix("rrule:"))
        .unwrap_or(trimmed)
}

/// Build the iCalendar-format input the rrule crate parser expects.
fn build_rrule_input(rule: &str, anchor: DateTime<Utc>) -> String {
    format!(
        "DTSTART:{}\nRRULE:{}",
        anchor.format("%Y%m%dT%H%M%SZ"),
        rule_body(rule)
    )
}

impl RecurrenceRuleEngine for RRuleEngine {
    fn occurrences_between(
        &self,
        rule: &str,
        anchor: DateTime<Utc>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        cap: usize,
    ) -> CalFeedResult<Vec<DateTime<Utc>>> {
        let input = build_rrule_input(rule, anchor);
        let rrule_set: RRuleSet = input
            .parse::<RRuleSet>()
            .map_err(|e| CalFeedError::InvalidRecurrenceRule(e.to_string()))?;

        // after/before are exclusive; widen by a second to make the window
        // bounds inclusive.
        let tz = rrule::Tz::Tz(chrono_tz::UTC);
        let after = (window_start - Duration::seconds(1)).with_timezone(&tz);
        let before = (window_end + Duration::seconds(1)).with_timezone(&tz);

        let capped = cap.min(u16::MAX as usize);
        let result = rrule_set.after(after).before(before).all(capped as u16);

        let mut occurrences: Vec<DateTime<Utc>> = result
            .dates
            .iter()
            .map(|dt| dt.with_timezone(&Utc))
            .collect();
        occurrences.dedup();
        occurrences.truncate(capped);
        Ok(occurrences)
    }

    fn describe(&self, rule: &str) -> String {
        describe_rule(rule)
    }
}

const GENERIC_DESCRIPTION: &str = "Repeats on a custom schedule";

/// Render a recurrence rule as a short human-readable phrase, e.g.
/// "Every 2 weeks on Mon, Wed, 10 times".
pub fn describe_rule(rule: &str) -> String {
    let body = rule_body(rule);

    // Validate against the real parser first so we never describe a rule the
    // interpreter would reject.
    let probe = format!("DTSTART:20250101T000000Z\nRRULE:{body}");
    if probe.parse::<RRuleSet>().is_err() {
        return GENERIC_DESCRIPTION.to_string();
    }

    let mut freq = None;
    let mut interval: u32 = 1;
    let mut count = None;
    let mut until = None;
    let mut by_day = None;

    for part in body.split(';') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.to_ascii_uppercase().as_str() {
            "FREQ" => freq = Some(value.to_ascii_uppercase()),
            "INTERVAL" => interval = value.parse().unwrap_or(1),
            "COUNT" => count = value.parse::<u32>().ok(),
            "UNTIL" => until = parse_until_date(value),
            "BYDAY" => by_day = Some(describe_by_day(value)),
            _ => {}
        }
    }

    let base = match freq.as_deref() {
        Some("DAILY") if interval <= 1 => "Daily".to_string(),
        Some("DAILY") => format!("Every {interval} days"),
        Some("WEEKLY") if interval <= 1 => "Weekly".to_string(),
        Some("WEEKLY") => format!("Every {interval} weeks"),
        Some("MONTHLY") if interval <= 1 => "Monthly".to_string(),
        Some("MONTHLY") => format!("Every {interval} months"),
        Some("YEARLY") if interval <= 1 => "Yearly".to_string(),
        Some("YEARLY") => format!("Every {interval} years"),
        Some("HOURLY") if interval <= 1 => "Hourly".to_string(),
        Some("HOURLY") => format!("Every {interval} hours"),
        _ => return GENERIC_DESCRIPTION.to_string(),
    };

    let mut description = base;
    if let Some(days) = by_day {
        if !days.is_empty() {
            description.push_str(&format!(" on {days}"));
        }
    }
    if let Some(count) = count {
        description.push_str(&format!(", {count} times"));
    } else if let Some(until) = until {
        description.push_str(&format!(", until {until}"));
    }
    description
}

fn parse_until_date(value: &str) -> Option<String> {
    let date_part = value.get(0..8)?;
    chrono::NaiveDate::parse_from_str(date_part, "%Y%m%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn describe_by_day(value: &str) -> String {
    value
        .split(',')
        .filter_map(|day| match day.trim() {
            "MO" => Some("Mon"),
            "TU" => Some("Tue"),
            "WE" => Some("Wed"),
            "TH" => Some("Thu"),
            "FR" => Some("Fri"),
            "SA" => Some("Sat"),
            "SU" => Some("Sun"),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_daily_count_rule_yields_each_day() {
        let engine = RRuleEngine;
        let occurrences = engine
            .occurrences_between(
                "FREQ=DAILY;COUNT=5",
                ts(2025, 1, 15, 10),
                ts(2025, 1, 1, 0),
                ts(2025, 1, 31, 0),
                DEFAULT_OCCURRENCE_CAP,
            )
            .unwrap();

        assert_eq!(occurrences.len(), 5);
        for (i, occurrence) in occurrences.iter().enumerate() {
            assert_eq!(*occurrence, ts(2025, 1, 15 + i as u32, 10));
        }
    }

    #[test]
    fn test_rrule_prefix_is_stripped() {
        let engine = RRuleEngine;
        let occurrences = engine
            .occurrences_between(
                "RRULE:FREQ=DAILY;COUNT=3",
                ts(2025, 1, 15, 10),
                ts(2025, 1, 1, 0),
                ts(2025, 1, 31, 0),
                DEFAULT_OCCURRENCE_CAP,
            )
            .unwrap();
        assert_eq!(occurrences.len(), 3);
    }

    #[test]
    fn test_unbounded_rule_is_capped() {
        let engine = RRuleEngine;
        let occurrences = engine
            .occurrences_between(
                "FREQ=DAILY",
                ts(2025, 1, 1, 10),
                ts(2025, 1, 1, 0),
                ts(2026, 1, 1, 0),
                DEFAULT_OCCURRENCE_CAP,
            )
            .unwrap();
        assert_eq!(occurrences.len(), DEFAULT_OCCURRENCE_CAP);
    }

    #[test]
    fn test_result_is_sorted_and_duplicate_free() {
        let engine = RRuleEngine;
        let occurrences = engine
            .occurrences_between(
                "FREQ=WEEKLY;BYDAY=MO,WE,FR;COUNT=9",
                ts(2025, 1, 6, 9),
                ts(2025, 1, 1, 0),
                ts(2025, 3, 1, 0),
                DEFAULT_OCCURRENCE_CAP,
            )
            .unwrap();

        assert_eq!(occurrences.len(), 9);
        for pair in occurrences.windows(2) {
            assert!(pair[0] < pair[1], "occurrences must be strictly increasing");
        }
    }

    #[test]
    fn test_malformed_rule_is_invalid_recurrence_rule() {
        let engine = RRuleEngine;
        let err = engine
            .occurrences_between(
                "FREQ=SOMETIMES",
                ts(2025, 1, 15, 10),
                ts(2025, 1, 1, 0),
                ts(2025, 1, 31, 0),
                DEFAULT_OCCURRENCE_CAP,
            )
            .unwrap_err();
        assert!(matches!(err, CalFeedError::InvalidRecurrenceRule(_)));
    }

    #[test]
    fn test_window_excludes_out_of_range_occurrences() {
        let engine = RRuleEngine;
        let occurrences = engine
            .occurrences_between(
                "FREQ=DAILY;COUNT=10",
                ts(2025, 1, 1, 10),
                ts(2025, 1, 3, 0),
                ts(2025, 1, 5, 23),
                DEFAULT_OCCURRENCE_CAP,
            )
            .unwrap();
        assert_eq!(
            occurrences,
            vec![ts(2025, 1, 3, 10), ts(2025, 1, 4, 10), ts(2025, 1, 5, 10)]
        );
    }

    #[test]
    fn test_describe_weekly_rule() {
        assert_eq!(
            describe_rule("FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE"),
            "Every 2 weeks on Mon, Wed"
        );
    }

    #[test]
    fn test_describe_count_and_until() {
        assert_eq!(describe_rule("FREQ=DAILY;COUNT=5"), "Daily, 5 times");
        assert_eq!(
            describe_rule("RRULE:FREQ=MONTHLY;UNTIL=20250601T000000Z"),
            "Monthly, until 2025-06-01"
        );
    }

    #[test]
    fn test_describe_falls_back_on_garbage() {
        assert_eq!(describe_rule("FREQ=SOMETIMES"), GENERIC_DESCRIPTION);
        assert_eq!(describe_rule(""), GENERIC_DESCRIPTION);
    }
}
