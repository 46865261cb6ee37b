//! Core engine for the calfeed ecosystem.
//!
//! This crate implements feed subscription syncing and calendar display
//! logic on top of abstract stores:
//! - iCalendar parsing/generation (`ics`)
//! - recurrence rule interpretation and windowed occurrence expansion
//!   (`recurrence`, `expand`)
//! - uid-keyed reconciliation of fetched feeds against stored events
//!   (`reconcile`)
//! - conditional feed retrieval and the background sync scheduler
//!   (`fetch`, `sync`)

pub mod clock;
pub mod error;
pub mod event;
pub mod expand;
pub mod fetch;
pub mod ics;
pub mod reconcile;
pub mod recurrence;
pub mod store;
pub mod subscription;
pub mod sync;

pub use error::{CalFeedError, CalFeedResult};
pub use event::{CandidateEvent, Event, ExpandedEvent, Occurrence};
pub use subscription::CalendarSubscription;
