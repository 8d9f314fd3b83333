/// Single-slot daily notification scheduler
/// Places the daily novelty reminder (or a short delay) into one replaceable
/// slot, skipping instants that fall inside the user's quiet hours.

use chrono::{NaiveDateTime, Timelike};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::delivery::{
    AlertSetting, AuthorizationProvider, DeliveryCenter, NotificationContent, NotificationRequest,
    Trigger,
};
use crate::error::{Result, SchedulerError};
use crate::evaluator::{self, Decision};
use crate::policy::PolicyProvider;
use crate::state::{self, NotificationStatus, Route, SchedulingState, DEFAULT_SLOT_ID};
use crate::status::SchedulerMetrics;
use crate::store::KeyValueStore;
use crate::time::Clock;

pub const DEFAULT_DAILY_HOUR: u32 = 11;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub slot_id: String,
    /// Hour of day the daily reminder targets
    pub daily_hour: u32,
    pub delay: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            slot_id: DEFAULT_SLOT_ID.to_string(),
            daily_hour: DEFAULT_DAILY_HOUR,
            delay: DEFAULT_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    NotAuthorized,
    AlertsDisabled,
}

/// Result of one scheduling attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled(NaiveDateTime),
    Delayed(NaiveDateTime),
    /// The candidate fell inside a quiet period; nothing was submitted
    Blocked(NaiveDateTime),
    Suppressed(SuppressReason),
}

impl fmt::Display for ScheduleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleOutcome::Scheduled(at) => write!(f, "scheduled for {}", at),
            ScheduleOutcome::Delayed(at) => write!(f, "delayed until {}", at),
            ScheduleOutcome::Blocked(at) => write!(f, "blocked by quiet hours at {}", at),
            ScheduleOutcome::Suppressed(SuppressReason::NotAuthorized) => {
                write!(f, "suppressed (notifications not authorized)")
            }
            ScheduleOutcome::Suppressed(SuppressReason::AlertsDisabled) => {
                write!(f, "suppressed (alerts disabled)")
            }
        }
    }
}

/// Today's fire time for the daily reminder.
///
/// `target_hour:00` on the current date, pushed forward by the current minute
/// plus one. Minute 59 carries into the next hour and hour 23 into the next
/// day. Seconds are always zero. `None` if the hour is out of range.
pub fn daily_candidate(now: NaiveDateTime, target_hour: u32) -> Option<NaiveDateTime> {
    let base = now.date().and_hms_opt(target_hour, 0, 0)?;
    base.checked_add_signed(chrono::Duration::minutes(i64::from(now.minute()) + 1))
}

/// Owns the scheduling state of one slot.
///
/// Every mutating operation holds the state lock from the moment it reads
/// the state until the new state is persisted, including the await on the
/// delivery center.
pub struct NotificationScheduler {
    settings: SchedulerSettings,
    state: Mutex<SchedulingState>,
    policy: Arc<dyn PolicyProvider>,
    authorization: Arc<dyn AuthorizationProvider>,
    delivery: Arc<dyn DeliveryCenter>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<SchedulerMetrics>,
}

impl NotificationScheduler {
    pub fn new(
        settings: SchedulerSettings,
        policy: Arc<dyn PolicyProvider>,
        authorization: Arc<dyn AuthorizationProvider>,
        delivery: Arc<dyn DeliveryCenter>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = SchedulingState::new(settings.slot_id.clone());
        Self {
            settings,
            state: Mutex::new(state),
            policy,
            authorization,
            delivery,
            store,
            clock,
            metrics: Arc::new(SchedulerMetrics::new()),
        }
    }

    /// Share an externally owned metrics instance (status endpoint)
    pub fn with_metrics(mut self, metrics: Arc<SchedulerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn metrics(&self) -> Arc<SchedulerMetrics> {
        self.metrics.clone()
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Load the persisted state for the configured slot.
    pub async fn restore(&self) -> SchedulingState {
        let mut state = self.state.lock().await;
        *state = SchedulingState::load(self.store.as_ref(), &self.settings.slot_id);
        info!(
            "Restored slot '{}': status={}, next fire time={}",
            state.scheduled_id,
            state.status,
            state
                .next_fire_time
                .map(|t| t.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        state.clone()
    }

    pub async fn state(&self) -> SchedulingState {
        self.state.lock().await.clone()
    }

    pub async fn route(&self, onboarding_completed: bool) -> Route {
        let state = self.state.lock().await;
        state::route(&state, onboarding_completed, self.clock.now())
    }

    pub fn is_allowed_at(&self, at: NaiveDateTime) -> bool {
        evaluator::is_allowed(&self.policy.policy(), at)
    }

    pub fn is_allowed_now(&self) -> bool {
        self.is_allowed_at(self.clock.now())
    }

    /// Schedule today's reminder at `target_hour` (see [`daily_candidate`]).
    ///
    /// Replaces whatever is pending in the slot. A candidate inside quiet
    /// hours leaves both the slot and the state untouched. The candidate is
    /// never moved to tomorrow; once today's fire time has passed the
    /// delivery center refuses the request and the state is kept.
    pub async fn schedule_daily_once(&self, target_hour: u32) -> Result<ScheduleOutcome> {
        if target_hour > 23 {
            return Err(SchedulerError::InvalidHour(target_hour));
        }

        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let candidate =
            daily_candidate(now, target_hour).ok_or(SchedulerError::FireTime(now))?;

        if self.is_blocked(candidate) {
            self.metrics.record_blocked();
            return Ok(ScheduleOutcome::Blocked(candidate));
        }

        let request = NotificationRequest {
            slot_id: self.settings.slot_id.clone(),
            content: NotificationContent::daily_novelty(),
            trigger: Trigger::At(candidate),
        };
        self.replace_pending(request).await?;

        info!("Daily novelty scheduled for {}", candidate);
        self.metrics.record_scheduled();
        self.commit(&mut state, Some(candidate), NotificationStatus::Scheduled)?;
        Ok(ScheduleOutcome::Scheduled(candidate))
    }

    pub async fn schedule_daily_once_default(&self) -> Result<ScheduleOutcome> {
        self.schedule_daily_once(self.settings.daily_hour).await
    }

    /// Push the reminder `interval` into the future ("remind me later").
    pub async fn delay(&self, interval: Duration) -> Result<ScheduleOutcome> {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval);
        }

        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let candidate = chrono::Duration::from_std(interval)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .ok_or(SchedulerError::FireTime(now))?;

        if self.is_blocked(candidate) {
            self.metrics.record_blocked();
            return Ok(ScheduleOutcome::Blocked(candidate));
        }

        let request = NotificationRequest {
            slot_id: self.settings.slot_id.clone(),
            content: NotificationContent::delayed_novelty(),
            trigger: Trigger::After(interval),
        };
        self.replace_pending(request).await?;

        info!("Novelty delayed until {}", candidate);
        self.metrics.record_delayed();
        self.commit(&mut state, Some(candidate), NotificationStatus::Delayed)?;
        Ok(ScheduleOutcome::Delayed(candidate))
    }

    pub async fn delay_default(&self) -> Result<ScheduleOutcome> {
        self.delay(self.settings.delay).await
    }

    /// One foreground pass: honour the platform permission state, then try
    /// to schedule today's reminder.
    pub async fn setup_todays_notification(&self) -> Result<ScheduleOutcome> {
        let settings = self.authorization.settings().await;
        debug!(
            "Notification settings: authorization={}, alerts={:?}",
            settings.authorization, settings.alerts
        );

        if !settings.authorization.allows_scheduling() {
            return self
                .suppress(SuppressReason::NotAuthorized, NotificationStatus::Proposed)
                .await;
        }
        if settings.alerts == AlertSetting::Disabled {
            return self
                .suppress(SuppressReason::AlertsDisabled, NotificationStatus::Blocked)
                .await;
        }

        self.schedule_daily_once_default().await
    }

    /// Ask for notification permission; on grant, run a foreground pass.
    pub async fn request_authorization(&self) -> Result<bool> {
        let granted = self.authorization.request_authorization().await?;
        if granted {
            self.setup_todays_notification().await?;
        }
        Ok(granted)
    }

    /// The delivery center reports that `slot_id` fired at `fired_at`.
    ///
    /// Returns whether the state changed.
    pub async fn record_delivery(&self, slot_id: &str, fired_at: NaiveDateTime) -> Result<bool> {
        let mut state = self.state.lock().await;
        if slot_id != state.scheduled_id {
            debug!("Ignoring delivery for unknown slot '{}'", slot_id);
            return Ok(false);
        }
        if !state.status.is_pending() {
            debug!(
                "Ignoring delivery for slot '{}' in status {}",
                slot_id, state.status
            );
            return Ok(false);
        }

        info!("Novelty delivered at {}", fired_at);
        self.metrics.record_delivered();
        let next_fire_time = state.next_fire_time;
        self.commit(&mut state, next_fire_time, NotificationStatus::Delivered)?;
        Ok(true)
    }

    fn is_blocked(&self, candidate: NaiveDateTime) -> bool {
        match evaluator::evaluate(&self.policy.policy(), candidate) {
            Decision::Allowed(_) => false,
            Decision::Blocked(block) => {
                info!(
                    "Not scheduling at {}: inside quiet period '{}'",
                    candidate,
                    block.period_name.as_deref().unwrap_or("Unnamed")
                );
                true
            }
        }
    }

    /// Submit under the slot id. The delivery center upserts, so a failed
    /// submission leaves the previously acknowledged request in place.
    async fn replace_pending(&self, request: NotificationRequest) -> Result<()> {
        if let Err(e) = self.delivery.submit(request).await {
            error!("Failed to submit novelty notification: {}", e);
            self.metrics.record_failure();
            return Err(e.into());
        }
        Ok(())
    }

    async fn suppress(
        &self,
        reason: SuppressReason,
        status: NotificationStatus,
    ) -> Result<ScheduleOutcome> {
        let mut state = self.state.lock().await;
        if let Err(e) = self.delivery.cancel(&self.settings.slot_id).await {
            warn!("Failed to cancel pending '{}': {}", self.settings.slot_id, e);
        }

        let outcome = ScheduleOutcome::Suppressed(reason);
        info!("Daily novelty {}", outcome);
        self.metrics.record_suppressed();
        self.commit(&mut state, None, status)?;
        Ok(outcome)
    }

    fn commit(
        &self,
        state: &mut SchedulingState,
        next_fire_time: Option<NaiveDateTime>,
        status: NotificationStatus,
    ) -> Result<()> {
        state.next_fire_time = next_fire_time;
        state.status = status;
        state.save(self.store.as_ref()).map_err(|e| {
            error!("Failed to persist scheduling state: {}", e);
            SchedulerError::Store(e)
        })
    }
}
