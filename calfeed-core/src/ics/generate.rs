//! Feed generation.

use chrono::{DateTime, Utc};
use icalendar::{Calendar, Component, EventLike, Property, ValueType};

use crate::event::Event;

/// Serialize stored events into a single iCalendar document, one VEVENT per
/// event.
///
/// Round-trip property: parsing the output reproduces each event's uid,
/// title, start, end (to format precision), and recurrence rule.
pub fn generate_feed(events: &[Event]) -> String {
    let mut cal = Calendar::new();
    for event in events {
        cal.push(build_vevent(event));
    }
    cal.done().to_string()
}

fn build_vevent(event: &Event) -> icalendar::Event {
    let mut ics_event = icalendar::Event::new();

    // Stable uid: reuse the external identity when present, else derive one
    // from the storage id.
    let uid = event
        .source_uid
        .clone()
        .unwrap_or_else(|| format!("{}@calfeed", event.id));
    ics_event.uid(&uid);
    ics_event.summary(&event.title);

    let dtstamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    ics_event.add_property("DTSTAMP", dtstamp);

    add_datetime_property(&mut ics_event, "DTSTART", event.start, event.all_day);
    add_datetime_property(&mut ics_event, "DTEND", event.end, event.all_day);

    if let Some(ref description) = event.description {
        ics_event.description(description);
    }
    if let Some(ref location) = event.location {
        ics_event.location(location);
    }

    if let Some(ref rrule) = event.rrule {
        let rule = rrule.trim().trim_start_matches("RRULE:");
        ics_event.add_property("RRULE", rule);
    }
    for exdate in &event.exdates {
        add_exdate_property(&mut ics_event, *exdate, event.all_day);
    }

    ics_event.done()
}

/// Add a datetime property, date-only for all-day events.
fn add_datetime_property(
    ics_event: &mut icalendar::Event,
    name: &str,
    time: DateTime<Utc>,
    all_day: bool,
) {
    if all_day {
        let mut prop = Property::new(name, time.format("%Y%m%d").to_string());
        prop.append_parameter(ValueType::Date);
        ics_event.append_property(prop);
    } else {
        ics_event.add_property(name, time.format("%Y%m%dT%H%M%SZ").to_string());
    }
}

fn add_exdate_property(ics_event: &mut icalendar::Event, time: DateTime<Utc>, all_day: bool) {
    if all_day {
        let mut prop = Property::new("EXDATE", time.format("%Y%m%d").to_string());
        prop.append_parameter(ValueType::Date);
        ics_event.append_multi_property(prop);
    } else {
        let prop = Property::new("EXDATE", time.format("%Y%m%dT%H%M%SZ").to_string());
        ics_event.append_multi_property(prop);
    }
}
