/// Wall-clock helpers shared by the evaluator and the scheduler.
///
/// Everything here works on local wall-clock time (`NaiveDateTime`). Weekdays
/// use calendar codes: 1 = Sunday ... 7 = Saturday.

use chrono::{Datelike, Local, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use crate::error::ValidationError;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

pub const SUNDAY: u8 = 1;
pub const MONDAY: u8 = 2;
pub const TUESDAY: u8 = 3;
pub const WEDNESDAY: u8 = 4;
pub const THURSDAY: u8 = 5;
pub const FRIDAY: u8 = 6;
pub const SATURDAY: u8 = 7;

/// Sentinel written into a missing component so the period reads as malformed
const MISSING: u8 = u8::MAX;

/// Hour and minute of a local time; the date is never part of it.
///
/// Values built through [`TimeOfDay::new`] are always valid. Values read back
/// from storage are not re-validated: an out-of-range or missing component
/// makes [`TimeOfDay::minute_of_day`] return `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeOfDay {
    #[serde(default = "missing_component")]
    pub hour: u8,
    #[serde(default = "missing_component")]
    pub minute: u8,
}

fn missing_component() -> u8 {
    MISSING
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self, ValidationError> {
        if hour > 23 {
            return Err(ValidationError::Hour(hour));
        }
        if minute > 59 {
            return Err(ValidationError::Minute(minute));
        }
        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    pub fn from_minute_of_day(minute_of_day: u32) -> Result<Self, ValidationError> {
        if minute_of_day >= MINUTES_PER_DAY as u32 {
            return Err(ValidationError::MinuteOfDay(minute_of_day));
        }
        Self::new(minute_of_day / 60, minute_of_day % 60)
    }

    /// Minutes since midnight, or `None` when a component is malformed.
    pub fn minute_of_day(&self) -> Option<u16> {
        if self.hour > 23 || self.minute > 59 {
            return None;
        }
        Some(self.hour as u16 * 60 + self.minute as u16)
    }

    pub fn of(at: &NaiveDateTime) -> Self {
        Self {
            hour: at.hour() as u8,
            minute: at.minute() as u8,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = ValidationError;

    /// Parse "HH:MM" (24-hour clock).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ValidationError::TimeFormat(s.to_string());
        let (hour, minute) = s.trim().split_once(':').ok_or_else(bad)?;
        let hour: u32 = hour.parse().map_err(|_| bad())?;
        let minute: u32 = minute.parse().map_err(|_| bad())?;
        Self::new(hour, minute)
    }
}

/// Minutes since local midnight for an instant.
pub fn minute_of_day(at: &NaiveDateTime) -> u16 {
    (at.hour() * 60 + at.minute()) as u16
}

/// Calendar weekday code of an instant (1 = Sunday).
pub fn weekday_code(at: &NaiveDateTime) -> u8 {
    at.weekday().number_from_sunday() as u8
}

/// The weekday before `code`, wrapping Sunday (1) back to Saturday (7).
pub fn previous_weekday(code: u8) -> u8 {
    if code <= SUNDAY {
        SATURDAY
    } else {
        code - 1
    }
}

/// The weekday after `code`, wrapping Saturday (7) to Sunday (1).
pub fn next_weekday(code: u8) -> u8 {
    code % 7 + 1
}

/// Human name for a weekday code, for logs and CLI output.
pub fn weekday_name(code: u8) -> &'static str {
    match code {
        SUNDAY => "Sunday",
        MONDAY => "Monday",
        TUESDAY => "Tuesday",
        WEDNESDAY => "Wednesday",
        THURSDAY => "Thursday",
        FRIDAY => "Friday",
        SATURDAY => "Saturday",
        _ => "invalid",
    }
}

/// Source of "now" as local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Reads the real clock, either in the system zone or a configured one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    zone: Option<Tz>,
}

impl SystemClock {
    pub fn local() -> Self {
        Self { zone: None }
    }

    pub fn in_zone(zone: Tz) -> Self {
        Self { zone: Some(zone) }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        match self.zone {
            Some(zone) => Utc::now().with_timezone(&zone).naive_local(),
            None => Local::now().naive_local(),
        }
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.write().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }
}



/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    use super::*;

    #[kani::proof]
    fn previous_weekday_in_range() {
        let code: u8 = kani::any();
        kani::assume(code >= 1 && code <= 7);
        let prev = previous_weekday(code);
        kani::assert(prev >= 1 && prev <= 7, "previous weekday must be 1-7");
        kani::assert(next_weekday(prev) == code, "next undoes previous");
    }

    #[kani::proof]
    fn minute_of_day_bounded() {
        let hour: u8 = kani::any();
        let minute: u8 = kani::any();
        let t = TimeOfDay { hour, minute };
        if let Some(m) = t.minute_of_day() {
            kani::assert(m < MINUTES_PER_DAY, "minute of day must be < 1440");
        }
    }
}
