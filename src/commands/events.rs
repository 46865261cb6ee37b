use anyhow::Result;
use chrono::{Duration, Utc};
use owo_colors::OwoColorize;

use calfeed_core::event::ExpandedEvent;
use calfeed_core::expand::OccurrenceExpander;
use calfeed_core::store::EventStore;

use super::{build_context, parse_datetime};

pub async fn run(from: Option<String>, to: Option<String>, json: bool) -> Result<()> {
    let ctx = build_context()?;

    let window_start = match from {
        Some(s) => parse_datetime(&s)?,
        None => Utc::now(),
    };
    let window_end = match to {
        Some(s) => parse_datetime(&s)?,
        None => window_start + Duration::days(7),
    };

    let masters = ctx.store.all().await?;
    let expander = OccurrenceExpander::with_defaults();
    let mut items = expander.expand(&masters, window_start, window_end);
    items.sort_by_key(|item| item.start());

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!(
            "No events between {} and {}.",
            window_start.format("%Y-%m-%d"),
            window_end.format("%Y-%m-%d")
        );
        return Ok(());
    }

    for item in &items {
        let when = if item.all_day() {
            item.start().format("%Y-%m-%d      (all day)").to_string()
        } else {
            format!(
                "{} - {}",
                item.start().format("%Y-%m-%d %H:%M"),
                item.end().format("%H:%M")
            )
        };
        let marker = match item {
            ExpandedEvent::Instance(_) => " ↻".dimmed().to_string(),
            ExpandedEvent::Single(_) => String::new(),
        };
        println!("{}  {}{}", when.dimmed(), item.title(), marker);
    }

    Ok(())
}
