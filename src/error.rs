//! Error types for the quiet-hours engine and the notification scheduler.
//!
//! Configuration loading and the binary use `anyhow`; everything the library
//! hands back to a caller is one of these enums.

use std::path::PathBuf;
use thiserror::Error;

/// Rejected input when building quiet periods or scheduling requests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("hour {0} out of range (expected 0-23)")]
    Hour(u32),

    #[error("minute {0} out of range (expected 0-59)")]
    Minute(u32),

    #[error("minute of day {0} out of range (expected 0-1439)")]
    MinuteOfDay(u32),

    #[error("weekday code {0} out of range (expected 1=Sunday through 7=Saturday)")]
    Weekday(u32),

    #[error("invalid time of day '{0}' (expected HH:MM)")]
    TimeFormat(String),
}

/// Key-value store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures reported by the delivery collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The collaborator refused the request (bad trigger, quota, ...).
    #[error("delivery request rejected: {0}")]
    Rejected(String),

    /// The collaborator could not be reached.
    #[error("delivery service unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by scheduler operations.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("target hour {0} out of range (expected 0-23)")]
    InvalidHour(u32),

    #[error("delay interval must be positive")]
    InvalidInterval,

    #[error("could not compute a fire time from {0}")]
    FireTime(chrono::NaiveDateTime),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("scheduling state not persisted: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;
