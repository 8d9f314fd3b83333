/// Quiet periods: recurring weekly windows during which notifications are muted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::time::{TimeOfDay, FRIDAY, MONDAY, SATURDAY, SUNDAY};

/// Set of weekday codes (1 = Sunday ... 7 = Saturday).
///
/// Codes are validated when built through [`WeekdaySet::new`] or
/// [`WeekdaySet::insert`]. A set read back from storage may carry stray codes;
/// those simply never match a real weekday.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdaySet(BTreeSet<u8>);

impl WeekdaySet {
    pub fn new<I>(codes: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = u8>,
    {
        let mut set = Self::default();
        for code in codes {
            set.insert(code)?;
        }
        Ok(set)
    }

    /// Monday through Friday.
    pub fn weekdays() -> Self {
        Self((MONDAY..=FRIDAY).collect())
    }

    pub fn weekend() -> Self {
        Self([SATURDAY, SUNDAY].into_iter().collect())
    }

    pub fn every_day() -> Self {
        Self((SUNDAY..=SATURDAY).collect())
    }

    pub fn insert(&mut self, code: u8) -> Result<bool, ValidationError> {
        if !(SUNDAY..=SATURDAY).contains(&code) {
            return Err(ValidationError::Weekday(code as u32));
        }
        Ok(self.0.insert(code))
    }

    pub fn remove(&mut self, code: u8) -> bool {
        self.0.remove(&code)
    }

    pub fn contains(&self, code: u8) -> bool {
        self.0.contains(&code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }
}

/// A user-defined time range when notifications should be muted.
///
/// Start and end are wall-clock times of day; the window repeats on every
/// weekday listed in `days_of_week`. When `end` is earlier than `start` the
/// window runs past midnight into the following day. `start == end` is an
/// empty window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuietPeriod {
    id: Uuid,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub days_of_week: WeekdaySet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl QuietPeriod {
    /// New enabled, unnamed period with a fresh id.
    pub fn new(start: TimeOfDay, end: TimeOfDay, days_of_week: WeekdaySet) -> Self {
        Self {
            id: Uuid::new_v4(),
            start,
            end,
            days_of_week,
            name: None,
            enabled: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Label for logs; falls back the way the quiet-hours list does.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unnamed")
    }
}
