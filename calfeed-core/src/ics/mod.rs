//! iCalendar feed parsing and generation.

mod generate;
mod parse;

pub use generate::generate_feed;
pub use parse::parse_feed;
