use std::path::PathBuf;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use calfeed_core::ics::generate_feed;
use calfeed_core::store::EventStore;

use super::build_context;

pub async fn run(out: Option<PathBuf>) -> Result<()> {
    let ctx = build_context()?;

    let mut events = ctx.store.all().await?;
    events.sort_by_key(|e| e.start);

    let feed = generate_feed(&events);

    match out {
        Some(path) => {
            std::fs::write(&path, feed)
                .with_context(|| format!("Could not write {}", path.display()))?;
            println!(
                "Wrote {} event(s) to {}",
                events.len(),
                path.display().to_string().bold()
            );
        }
        None => print!("{feed}"),
    }
    Ok(())
}
