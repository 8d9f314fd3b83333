use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::delivery::{AlertSetting, AuthorizationStatus, NotificationSettings};
use crate::scheduler::{SchedulerSettings, DEFAULT_DAILY_HOUR};
use crate::state::DEFAULT_SLOT_ID;

#[derive(Debug, Clone)]
pub struct Config {
    // Key-value file holding the profile and the scheduling state
    pub store_path: PathBuf,

    // Scheduling
    pub slot_id: String,
    pub daily_hour: u32,
    pub delay_secs: u64,

    /// IANA zone name; unset means the system local zone
    pub timezone: Option<String>,

    // Platform permission state for the in-process authorization provider
    pub authorization: String,
    pub alerts_enabled: bool,
    pub grant_on_request: bool,

    // Daemon loop
    pub foreground_interval_secs: u64,
    pub tick_secs: u64,

    // Status HTTP server port (optional, disabled if not set)
    pub status_port: Option<u16>,
}

/// Accepts the usual spellings; anything else keeps the default
fn parse_bool(raw: Option<String>, default: bool) -> bool {
    match raw.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
        Some(s) if matches!(s.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(s) if matches!(s.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env if present, ignore if missing
        Self::from_getter(|key| env::var(key).ok())
    }

    /// Parse config from a custom getter function (for testing)
    pub fn from_getter<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            store_path: get("NOVELTY_STORE_PATH")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "./novelty-store.json".to_string())
                .into(),

            slot_id: get("NOVELTY_SLOT_ID").unwrap_or_else(|| DEFAULT_SLOT_ID.to_string()),
            daily_hour: match get("NOVELTY_DAILY_HOUR") {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .context("NOVELTY_DAILY_HOUR must be a number between 0 and 23")?,
                None => DEFAULT_DAILY_HOUR,
            },
            delay_secs: get("NOVELTY_DELAY_SECS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(60),

            timezone: get("NOVELTY_TIMEZONE").filter(|s| !s.trim().is_empty()),

            authorization: get("NOVELTY_AUTHORIZATION").unwrap_or_else(|| "authorized".to_string()),
            alerts_enabled: parse_bool(get("NOVELTY_ALERTS_ENABLED"), true),
            grant_on_request: parse_bool(get("NOVELTY_GRANT_ON_REQUEST"), true),

            foreground_interval_secs: get("NOVELTY_FOREGROUND_INTERVAL_SECS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(3600),
            tick_secs: get("NOVELTY_TICK_SECS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(30),

            status_port: get("STATUS_PORT").and_then(|s| s.parse().ok()),
        })
    }

    /// Create config from a HashMap (convenience for testing)
    #[cfg(test)]
    pub fn from_map(map: &HashMap<&str, &str>) -> Result<Self> {
        Self::from_getter(|key| map.get(key).map(|v| v.to_string()))
    }

    /// Validate configuration values at startup.
    /// Returns Ok(()) if all validations pass, or Err with details of what failed.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.slot_id.trim().is_empty() {
            errors.push("NOVELTY_SLOT_ID cannot be empty.".to_string());
        }

        if self.daily_hour > 23 {
            errors.push(format!(
                "NOVELTY_DAILY_HOUR={} out of range (expected 0-23).",
                self.daily_hour
            ));
        }

        if self.delay_secs == 0 {
            errors.push("NOVELTY_DELAY_SECS must be greater than 0.".to_string());
        }

        if let Err(e) = self.zone() {
            errors.push(e.to_string());
        }

        if let Err(e) = self.authorization.parse::<AuthorizationStatus>() {
            errors.push(format!("NOVELTY_AUTHORIZATION: {}.", e));
        }

        if self.foreground_interval_secs == 0 {
            errors.push("NOVELTY_FOREGROUND_INTERVAL_SECS must be greater than 0.".to_string());
        }

        if self.tick_secs == 0 {
            errors.push("NOVELTY_TICK_SECS must be greater than 0.".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )
        }
    }

    pub fn zone(&self) -> Result<Option<Tz>> {
        match &self.timezone {
            Some(name) => {
                let zone = name
                    .trim()
                    .parse::<Tz>()
                    .map_err(|e| anyhow::anyhow!("NOVELTY_TIMEZONE '{}' unknown: {}", name, e))?;
                Ok(Some(zone))
            }
            None => Ok(None),
        }
    }

    pub fn notification_settings(&self) -> Result<NotificationSettings> {
        let authorization = self
            .authorization
            .parse::<AuthorizationStatus>()
            .map_err(anyhow::Error::msg)
            .context("NOVELTY_AUTHORIZATION")?;
        Ok(NotificationSettings {
            authorization,
            alerts: if self.alerts_enabled {
                AlertSetting::Enabled
            } else {
                AlertSetting::Disabled
            },
        })
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            slot_id: self.slot_id.clone(),
            daily_hour: self.daily_hour,
            delay: Duration::from_secs(self.delay_secs),
        }
    }
}



/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    use super::*;

    #[kani::proof]
    fn parse_bool_keeps_default_for_missing() {
        let default: bool = kani::any();
        kani::assert(parse_bool(None, default) == default, "missing value keeps default");
    }
}
