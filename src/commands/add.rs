use anyhow::{Context, Result};
use chrono::Duration;
use owo_colors::OwoColorize;
use uuid::Uuid;

use calfeed_core::event::Event;
use calfeed_core::recurrence::describe_rule;
use calfeed_core::store::EventStore;

use super::{build_context, parse_datetime, LOCAL_OWNER};

pub async fn run(
    title: String,
    start: String,
    end: Option<String>,
    duration: Option<String>,
    rrule: Option<String>,
    all_day: bool,
) -> Result<()> {
    let ctx = build_context()?;

    let start = parse_datetime(&start)?;
    let end = match (end, duration) {
        (Some(end), _) => parse_datetime(&end)?,
        (None, Some(duration)) => {
            let parsed = humantime::parse_duration(&duration)
                .with_context(|| format!("Unrecognized duration '{duration}'"))?;
            start + Duration::from_std(parsed)?
        }
        (None, None) if all_day => start + Duration::days(1),
        (None, None) => start + Duration::hours(1),
    };

    let event = Event {
        id: Uuid::new_v4().to_string(),
        owner_id: LOCAL_OWNER.to_string(),
        title: title.clone(),
        color: None,
        description: None,
        location: None,
        start,
        end,
        all_day,
        rrule: rrule.clone(),
        dtstart: None,
        duration_ms: None,
        exdates: vec![],
        source_subscription_id: None,
        source_uid: None,
    };
    EventStore::insert(ctx.store.as_ref(), event).await?;

    println!("Created '{}'", title.bold());
    if let Some(rule) = &rrule {
        println!("  {}", describe_rule(rule).dimmed());
    }
    Ok(())
}
