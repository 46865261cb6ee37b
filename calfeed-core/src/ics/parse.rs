//! Feed parsing using the icalendar crate's parser.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use icalendar::{
    parser::{read_calendar, unfold, Component},
    DatePerhapsTime,
};
use tracing::warn;

use crate::error::{CalFeedError, CalFeedResult};
use crate::event::CandidateEvent;

/// Parse an iCalendar document into candidate events.
///
/// Malformed top-level structure fails the whole call; malformed individual
/// event components are skipped with a warning, never fatal.
pub fn parse_feed(document: &str) -> CalFeedResult<Vec<CandidateEvent>> {
    if !document.contains("BEGIN:VCALENDAR") {
        return Err(CalFeedError::InvalidFeedFormat(
            "missing VCALENDAR container".to_string(),
        ));
    }

    let unfolded = unfold(document);
    let calendar = read_calendar(&unfolded)
        .map_err(|e| CalFeedError::InvalidFeedFormat(e.to_string()))?;

    let mut candidates = Vec::new();
    for component in &calendar.components {
        if component.name != "VEVENT" {
            continue;
        }
        if let Some(candidate) = parse_vevent(component) {
            candidates.push(candidate);
        }
    }

    Ok(candidates)
}

/// Parse a single VEVENT; returns None (after a warning) when the component
/// has no usable start.
fn parse_vevent(vevent: &Component) -> Option<CandidateEvent> {
    let title = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| "(No title)".to_string());

    let start_prop = match vevent.find_prop("DTSTART") {
        Some(prop) => prop,
        None => {
            warn!(summary = %title, "event component has no DTSTART; skipping");
            return None;
        }
    };
    let (start, all_day) = match DatePerhapsTime::try_from(start_prop).ok().map(to_utc) {
        Some(resolved) => resolved,
        None => {
            warn!(summary = %title, "event component has unparseable DTSTART; skipping");
            return None;
        }
    };

    let end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(|dpt| to_utc(dpt).0)
        .or_else(|| duration_end(vevent, start))
        .unwrap_or_else(|| default_end(start, all_day));

    let uid = vevent
        .find_prop("UID")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| synthesize_uid(start, &title));

    let description = vevent.find_prop("DESCRIPTION").map(|p| p.val.to_string());
    let location = vevent.find_prop("LOCATION").map(|p| p.val.to_string());
    let rrule = vevent.find_prop("RRULE").map(|p| p.val.to_string());

    Some(CandidateEvent {
        uid,
        title,
        start,
        end,
        all_day,
        description,
        location,
        rrule,
    })
}

/// Convert icalendar's DatePerhapsTime to UTC, flagging date-only values.
///
/// Date-only values become midnight UTC; zoned values are resolved through
/// their TZID, falling back to a floating interpretation when the zone is
/// unknown.
fn to_utc(dpt: DatePerhapsTime) -> (DateTime<Utc>, bool) {
    match dpt {
        DatePerhapsTime::Date(d) => (d.and_time(NaiveTime::MIN).and_utc(), true),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => (dt, false),
            icalendar::CalendarDateTime::Floating(naive) => (naive.and_utc(), false),
            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => {
                let resolved = tzid
                    .parse::<chrono_tz::Tz>()
                    .ok()
                    .and_then(|tz| {
                        use chrono::TimeZone;
                        tz.from_local_datetime(&date_time)
                            .earliest()
                            .map(|dt| dt.with_timezone(&Utc))
                    })
                    .unwrap_or_else(|| date_time.and_utc());
                (resolved, false)
            }
        },
    }
}

/// End synthesized from an ISO-8601 DURATION property, when present.
fn duration_end(vevent: &Component, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let value = vevent.find_prop("DURATION")?.val.to_string();
    let duration = iso8601::duration(&value).ok()?;
    let std_duration: std::time::Duration = duration.into();
    let chrono_duration = Duration::from_std(std_duration).ok()?;
    Some(start + chrono_duration)
}

/// A missing end is synthesized: one day for all-day events, one hour
/// otherwise.
fn default_end(start: DateTime<Utc>, all_day: bool) -> DateTime<Utc> {
    if all_day {
        start + Duration::hours(24)
    } else {
        start + Duration::hours(1)
    }
}

/// Deterministic fallback uid for events without one: stable across repeated
/// parses of the same document. Such events have no external identity to
/// reconcile against, so stability across documents is not required.
fn synthesize_uid(start: DateTime<Utc>, title: &str) -> String {
    let slug = slugify(title);
    let slug = if slug.is_empty() { "event".to_string() } else { slug };
    format!("{}-{}@calfeed", start.format("%Y%m%dT%H%M%SZ"), slug)
}

/// Convert a string to an identifier-safe slug.
fn slugify(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(24)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:meeting-1\r\n\
SUMMARY:Standup\r\n\
DTSTART:20250115T100000Z\r\n\
DTEND:20250115T103000Z\r\n\
LOCATION:Room 4\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:allday-1\r\n\
SUMMARY:Conference\r\n\
DTSTART;VALUE=DATE:20250120\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn test_parse_feed_extracts_all_events() {
        let candidates = parse_feed(FEED).unwrap();
        assert_eq!(candidates.len(), 2);

        let meeting = &candidates[0];
        assert_eq!(meeting.uid, "meeting-1");
        assert_eq!(meeting.title, "Standup");
        assert_eq!(
            meeting.start,
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()
        );
        assert_eq!(
            meeting.end,
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap()
        );
        assert!(!meeting.all_day);
        assert_eq!(meeting.location.as_deref(), Some("Room 4"));
    }

    #[test]
    fn test_date_only_start_is_all_day_with_synthesized_end() {
        let candidates = parse_feed(FEED).unwrap();
        let conference = &candidates[1];
        assert!(conference.all_day);
        assert_eq!(
            conference.start,
            Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap()
        );
        // Missing DTEND on an all-day event: start + 24h.
        assert_eq!(
            conference.end,
            Utc.with_ymd_and_hms(2025, 1, 21, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_missing_end_on_timed_event_defaults_to_one_hour() {
        let ics = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:x\r\nSUMMARY:Call\r\n\
DTSTART:20250115T100000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let candidates = parse_feed(ics).unwrap();
        assert_eq!(
            candidates[0].end,
            Utc.with_ymd_and_hms(2025, 1, 15, 11, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_duration_property_synthesizes_end() {
        let ics = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:x\r\nSUMMARY:Call\r\n\
DTSTART:20250115T100000Z\r\nDURATION:PT45M\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let candidates = parse_feed(ics).unwrap();
        assert_eq!(
            candidates[0].end,
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 45, 0).unwrap()
        );
    }

    #[test]
    fn test_event_without_start_is_skipped_not_fatal() {
        let ics = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\nUID:broken\r\nSUMMARY:No start\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:ok\r\nSUMMARY:Fine\r\nDTSTART:20250115T100000Z\r\nEND:VEVENT\r\n\
END:VCALENDAR\r\n";
        let candidates = parse_feed(ics).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].uid, "ok");
    }

    #[test]
    fn test_rrule_is_captured_verbatim() {
        let ics = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:x\r\nSUMMARY:Weekly\r\n\
DTSTART:20250115T100000Z\r\nRRULE:FREQ=WEEKLY;BYDAY=MO\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let candidates = parse_feed(ics).unwrap();
        assert_eq!(candidates[0].rrule.as_deref(), Some("FREQ=WEEKLY;BYDAY=MO"));
    }

    #[test]
    fn test_non_calendar_document_is_invalid_feed_format() {
        let err = parse_feed("<html>not a calendar</html>").unwrap_err();
        assert!(matches!(err, CalFeedError::InvalidFeedFormat(_)));
    }

    #[test]
    fn test_synthesized_uid_is_stable_across_parses() {
        let ics = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nSUMMARY:Anonymous\r\n\
DTSTART:20250115T100000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let first = parse_feed(ics).unwrap();
        let second = parse_feed(ics).unwrap();
        assert_eq!(first[0].uid, second[0].uid);
        assert!(first[0].uid.contains("anonymous"));
    }
}
