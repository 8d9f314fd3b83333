//! Platform collaborators: notification permission and local delivery.
//!
//! The scheduler only talks to these traits. [`LocalNotificationCenter`] and
//! [`StaticAuthorization`] are the in-process implementations used by the
//! daemon and the tests.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::DeliveryError;
use crate::time::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthorizationStatus {
    Authorized,
    Denied,
    NotDetermined,
    Provisional,
}

impl AuthorizationStatus {
    /// Only full authorization schedules; provisional (quiet) delivery does not
    pub fn allows_scheduling(&self) -> bool {
        matches!(self, AuthorizationStatus::Authorized)
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuthorizationStatus::Authorized => "authorized",
            AuthorizationStatus::Denied => "denied",
            AuthorizationStatus::NotDetermined => "notDetermined",
            AuthorizationStatus::Provisional => "provisional",
        };
        f.write_str(s)
    }
}

impl FromStr for AuthorizationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "authorized" => Ok(AuthorizationStatus::Authorized),
            "denied" => Ok(AuthorizationStatus::Denied),
            "notdetermined" => Ok(AuthorizationStatus::NotDetermined),
            "provisional" => Ok(AuthorizationStatus::Provisional),
            _ => Err(format!("unknown authorization status '{}'", s)),
        }
    }
}

/// The user's per-app alert switch in system settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSetting {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationSettings {
    pub authorization: AuthorizationStatus,
    pub alerts: AlertSetting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub sound: bool,
}

impl NotificationContent {
    pub fn daily_novelty() -> Self {
        Self {
            title: "Your novelty is here!".to_string(),
            body: "Tap to view today's challenge and shift your perspective.".to_string(),
            sound: true,
        }
    }

    pub fn delayed_novelty() -> Self {
        Self {
            title: "Your delayed novelty is here".to_string(),
            body: "Ready now? Tap to view today's challenge.".to_string(),
            sound: true,
        }
    }
}

/// When a one-shot request fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// At a local wall-clock instant
    At(NaiveDateTime),
    /// After an interval from submission
    After(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub slot_id: String,
    pub content: NotificationContent,
    pub trigger: Trigger,
}

#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    async fn settings(&self) -> NotificationSettings;

    /// Prompt for permission; resolves to whether it was granted.
    async fn request_authorization(&self) -> Result<bool, DeliveryError>;
}

/// Local/push notification service.
///
/// At most one request is pending per slot id: submitting under an id that
/// already has a pending request replaces it.
#[async_trait]
pub trait DeliveryCenter: Send + Sync {
    async fn submit(&self, request: NotificationRequest) -> Result<(), DeliveryError>;
    async fn cancel(&self, slot_id: &str) -> Result<(), DeliveryError>;
    async fn pending(&self, slot_id: &str) -> Option<NotificationRequest>;
}

/// Permission state fixed by configuration.
#[derive(Debug)]
pub struct StaticAuthorization {
    settings: RwLock<NotificationSettings>,
    grant_on_request: bool,
}

impl StaticAuthorization {
    pub fn new(settings: NotificationSettings, grant_on_request: bool) -> Self {
        Self {
            settings: RwLock::new(settings),
            grant_on_request,
        }
    }

    pub fn authorized() -> Self {
        Self::new(
            NotificationSettings {
                authorization: AuthorizationStatus::Authorized,
                alerts: AlertSetting::Enabled,
            },
            true,
        )
    }

    pub fn set(&self, settings: NotificationSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }
}

#[async_trait]
impl AuthorizationProvider for StaticAuthorization {
    async fn settings(&self) -> NotificationSettings {
        *self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    async fn request_authorization(&self) -> Result<bool, DeliveryError> {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        // Like the system prompt, only an undecided user gets asked
        if settings.authorization == AuthorizationStatus::NotDetermined {
            settings.authorization = if self.grant_on_request {
                AuthorizationStatus::Authorized
            } else {
                AuthorizationStatus::Denied
            };
        }
        let granted = settings.authorization.allows_scheduling();
        info!(
            "Notification permission {} ({})",
            if granted { "granted" } else { "denied" },
            settings.authorization
        );
        Ok(granted)
    }
}

#[derive(Debug, Clone)]
struct PendingRequest {
    request: NotificationRequest,
    fire_at: NaiveDateTime,
}

/// In-process delivery: a map from slot id to its one pending request.
pub struct LocalNotificationCenter {
    pending: Mutex<HashMap<String, PendingRequest>>,
    clock: Arc<dyn Clock>,
}

impl LocalNotificationCenter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// When the request under `slot_id` is due to fire, if any.
    pub fn fire_time(&self, slot_id: &str) -> Option<NaiveDateTime> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(slot_id)
            .map(|p| p.fire_at)
    }

    /// Remove and return every request due at `now`, with its fire time.
    pub fn take_due(&self, now: NaiveDateTime) -> Vec<(NotificationRequest, NaiveDateTime)> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let due: Vec<String> = pending
            .iter()
            .filter(|(_, p)| p.fire_at <= now)
            .map(|(id, _)| id.clone())
            .collect();

        due.into_iter()
            .filter_map(|id| pending.remove(&id))
            .map(|p| (p.request, p.fire_at))
            .collect()
    }
}

#[async_trait]
impl DeliveryCenter for LocalNotificationCenter {
    async fn submit(&self, request: NotificationRequest) -> Result<(), DeliveryError> {
        let fire_at = match request.trigger {
            Trigger::At(at) => {
                // A one-shot calendar trigger in the past would never fire
                if at <= self.clock.now() {
                    return Err(DeliveryError::Rejected(format!(
                        "calendar trigger {} is not in the future",
                        at
                    )));
                }
                at
            }
            Trigger::After(interval) => {
                let interval = chrono::Duration::from_std(interval)
                    .map_err(|_| DeliveryError::Rejected("trigger interval too large".to_string()))?;
                self.clock.now() + interval
            }
        };

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let slot_id = request.slot_id.clone();
        if pending
            .insert(slot_id.clone(), PendingRequest { request, fire_at })
            .is_some()
        {
            debug!("Replaced pending request for slot '{}'", slot_id);
        }
        debug!("Slot '{}' will fire at {}", slot_id, fire_at);
        Ok(())
    }

    async fn cancel(&self, slot_id: &str) -> Result<(), DeliveryError> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.remove(slot_id).is_some() {
            debug!("Cancelled pending request for slot '{}'", slot_id);
        }
        Ok(())
    }

    async fn pending(&self, slot_id: &str) -> Option<NotificationRequest> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(slot_id)
            .map(|p| p.request.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn request(slot: &str, trigger: Trigger) -> NotificationRequest {
        NotificationRequest {
            slot_id: slot.to_string(),
            content: NotificationContent::daily_novelty(),
            trigger,
        }
    }

    #[test]
    fn test_authorization_status_parse() {
        assert_eq!("authorized".parse::<AuthorizationStatus>(), Ok(AuthorizationStatus::Authorized));
        assert_eq!("notDetermined".parse::<AuthorizationStatus>(), Ok(AuthorizationStatus::NotDetermined));
        assert_eq!("not_determined".parse::<AuthorizationStatus>(), Ok(AuthorizationStatus::NotDetermined));
        assert_eq!("PROVISIONAL".parse::<AuthorizationStatus>(), Ok(AuthorizationStatus::Provisional));
        assert!("maybe".parse::<AuthorizationStatus>().is_err());
    }

    #[test]
    fn test_authorization_allows_scheduling() {
        assert!(AuthorizationStatus::Authorized.allows_scheduling());
        assert!(!AuthorizationStatus::Provisional.allows_scheduling());
        assert!(!AuthorizationStatus::Denied.allows_scheduling());
        assert!(!AuthorizationStatus::NotDetermined.allows_scheduling());
    }

    #[tokio::test]
    async fn test_request_authorization_only_changes_undecided() {
        let undecided = StaticAuthorization::new(
            NotificationSettings {
                authorization: AuthorizationStatus::NotDetermined,
                alerts: AlertSetting::Enabled,
            },
            true,
        );
        assert!(undecided.request_authorization().await.unwrap());
        assert_eq!(
            undecided.settings().await.authorization,
            AuthorizationStatus::Authorized
        );

        let denied = StaticAuthorization::new(
            NotificationSettings {
                authorization: AuthorizationStatus::Denied,
                alerts: AlertSetting::Enabled,
            },
            true,
        );
        assert!(!denied.request_authorization().await.unwrap());
        assert_eq!(denied.settings().await.authorization, AuthorizationStatus::Denied);
    }

    #[tokio::test]
    async fn test_submit_replaces_same_slot() {
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let center = LocalNotificationCenter::new(clock);

        center.submit(request("dailyNovelty", Trigger::At(at(11, 1)))).await.unwrap();
        center.submit(request("dailyNovelty", Trigger::At(at(11, 2)))).await.unwrap();

        assert_eq!(center.pending_count(), 1);
        assert_eq!(center.fire_time("dailyNovelty"), Some(at(11, 2)));
    }

    #[tokio::test]
    async fn test_past_calendar_trigger_rejected() {
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let center = LocalNotificationCenter::new(clock.clone());
        center.submit(request("dailyNovelty", Trigger::At(at(11, 1)))).await.unwrap();

        clock.set(at(15, 30));
        let err = center
            .submit(request("dailyNovelty", Trigger::At(at(11, 31))))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected(_)));

        let now = center.submit(request("dailyNovelty", Trigger::At(at(15, 30)))).await;
        assert!(matches!(now, Err(DeliveryError::Rejected(_))));

        // The earlier request is still the pending one
        assert_eq!(center.fire_time("dailyNovelty"), Some(at(11, 1)));
        assert_eq!(center.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_interval_trigger_uses_clock() {
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let center = LocalNotificationCenter::new(clock);
        center
            .submit(request("dailyNovelty", Trigger::After(Duration::from_secs(60))))
            .await
            .unwrap();
        assert_eq!(center.fire_time("dailyNovelty"), Some(at(9, 1)));
    }

    #[tokio::test]
    async fn test_cancel_removes_only_that_slot() {
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let center = LocalNotificationCenter::new(clock);
        center.submit(request("a", Trigger::At(at(10, 0)))).await.unwrap();
        center.submit(request("b", Trigger::At(at(10, 0)))).await.unwrap();

        center.cancel("a").await.unwrap();
        center.cancel("missing").await.unwrap();

        assert!(center.pending("a").await.is_none());
        assert!(center.pending("b").await.is_some());
    }

    #[tokio::test]
    async fn test_take_due_fires_once() {
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let center = LocalNotificationCenter::new(clock);
        center.submit(request("a", Trigger::At(at(10, 0)))).await.unwrap();
        center.submit(request("b", Trigger::At(at(12, 0)))).await.unwrap();

        assert!(center.take_due(at(9, 59)).is_empty());

        let fired = center.take_due(at(10, 0));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0.slot_id, "a");
        assert_eq!(fired[0].1, at(10, 0));

        assert!(center.take_due(at(10, 30)).is_empty());
        assert_eq!(center.pending_count(), 1);
    }
}
