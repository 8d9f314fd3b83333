/// Scheduling state of the single notification slot, and the routing decision
/// the hosting UI derives from it on every foreground transition.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::StoreError;
use crate::store::KeyValueStore;

pub const DEFAULT_SLOT_ID: &str = "dailyNovelty";

pub const SLOT_ID_KEY: &str = "NextNoveltyId";
pub const NEXT_FIRE_TIME_KEY: &str = "NextNoveltyTime";
pub const STATUS_KEY: &str = "CurrentNoveltyStatus";
pub const ONBOARDING_KEY: &str = "novelty_onboarding_completed_v1";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Proposed,
    Scheduled,
    Delayed,
    Blocked,
    Delivered,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Proposed => "proposed",
            NotificationStatus::Scheduled => "scheduled",
            NotificationStatus::Delayed => "delayed",
            NotificationStatus::Blocked => "blocked",
            NotificationStatus::Delivered => "delivered",
        }
    }

    /// A request is waiting in the delivery service
    pub fn is_pending(&self) -> bool {
        matches!(self, NotificationStatus::Scheduled | NotificationStatus::Delayed)
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proposed" => Ok(NotificationStatus::Proposed),
            "scheduled" => Ok(NotificationStatus::Scheduled),
            "delayed" => Ok(NotificationStatus::Delayed),
            "blocked" => Ok(NotificationStatus::Blocked),
            "delivered" => Ok(NotificationStatus::Delivered),
            other => Err(format!("unknown notification status '{}'", other)),
        }
    }
}

/// What the scheduler last did with the slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingState {
    pub scheduled_id: String,
    /// `None` means nothing is scheduled
    pub next_fire_time: Option<NaiveDateTime>,
    pub status: NotificationStatus,
}

impl SchedulingState {
    pub fn new(slot_id: impl Into<String>) -> Self {
        Self {
            scheduled_id: slot_id.into(),
            next_fire_time: None,
            status: NotificationStatus::Proposed,
        }
    }

    /// Read the persisted scalar entries. Absent or unreadable entries fall
    /// back to the defaults for `slot_id`.
    pub fn load(store: &dyn KeyValueStore, slot_id: &str) -> Self {
        let mut state = Self::new(slot_id);

        match store.get(SLOT_ID_KEY) {
            Ok(Some(id)) if id != slot_id => {
                // A different slot name was configured since; its state does not apply
                warn!("Stored slot '{}' does not match '{}', ignoring stored state", id, slot_id);
                return state;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to read {}: {}", SLOT_ID_KEY, e);
                return state;
            }
        }

        match store.get(NEXT_FIRE_TIME_KEY) {
            Ok(Some(raw)) => match NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT) {
                Ok(at) => state.next_fire_time = Some(at),
                Err(e) => warn!("Ignoring unreadable {} '{}': {}", NEXT_FIRE_TIME_KEY, raw, e),
            },
            Ok(None) => {}
            Err(e) => warn!("Failed to read {}: {}", NEXT_FIRE_TIME_KEY, e),
        }

        match store.get(STATUS_KEY) {
            Ok(Some(raw)) => match raw.parse() {
                Ok(status) => state.status = status,
                Err(e) => warn!("Ignoring {}: {}", STATUS_KEY, e),
            },
            Ok(None) => {}
            Err(e) => warn!("Failed to read {}: {}", STATUS_KEY, e),
        }

        state
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        store.set(SLOT_ID_KEY, &self.scheduled_id)?;
        match self.next_fire_time {
            Some(at) => store.set(NEXT_FIRE_TIME_KEY, &at.format(TIMESTAMP_FORMAT).to_string())?,
            None => store.remove(NEXT_FIRE_TIME_KEY)?,
        }
        store.set(STATUS_KEY, self.status.as_str())
    }

    /// True once the next fire time has arrived
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.next_fire_time.is_some_and(|at| now >= at)
    }
}

/// Which screen the hosting UI should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Onboarding,
    /// The next novelty time has arrived
    NoveltyDue,
    Main,
}

pub fn route(state: &SchedulingState, onboarding_completed: bool, now: NaiveDateTime) -> Route {
    if !onboarding_completed {
        Route::Onboarding
    } else if state.is_due(now) {
        Route::NoveltyDue
    } else {
        Route::Main
    }
}

pub fn onboarding_completed(store: &dyn KeyValueStore) -> bool {
    match store.get(ONBOARDING_KEY) {
        Ok(Some(raw)) => raw == "true",
        Ok(None) => false,
        Err(e) => {
            warn!("Failed to read {}: {}", ONBOARDING_KEY, e);
            false
        }
    }
}

pub fn set_onboarding_completed(store: &dyn KeyValueStore, completed: bool) -> Result<(), StoreError> {
    store.set(ONBOARDING_KEY, if completed { "true" } else { "false" })
}
