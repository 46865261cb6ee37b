//! Error types for the calfeed engine.

use thiserror::Error;

/// Errors that can occur in calfeed operations.
///
/// Nothing here is fatal to the process: every variant is scoped to a single
/// subscription, feed document, or event and is reported as data by the
/// scheduler and reconciler.
#[derive(Error, Debug)]
pub enum CalFeedError {
    #[error("Invalid recurrence rule: {0}")]
    InvalidRecurrenceRule(String),

    #[error("Invalid feed format: {0}")]
    InvalidFeedFormat(String),

    #[error("Feed unreachable: {0}")]
    FeedUnreachable(String),

    #[error("Sync already in progress for subscription '{0}'")]
    SyncInProgress(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for calfeed operations.
pub type CalFeedResult<T> = Result<T, CalFeedError>;
