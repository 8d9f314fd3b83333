/// Foreground loop for the daemon
/// Periodically runs a foreground pass (as if the app had come to the
/// foreground) and fires due requests from the local notification center.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::delivery::LocalNotificationCenter;
use crate::scheduler::{NotificationScheduler, ScheduleOutcome};

/// Format duration for logging
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;

    if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else if mins > 0 {
        format!("{}m", mins)
    } else {
        format!("{}s", secs)
    }
}

/// One foreground pass. Errors are logged; the next pass is the retry.
pub async fn foreground_pass(scheduler: &NotificationScheduler) -> Option<ScheduleOutcome> {
    match scheduler.setup_todays_notification().await {
        Ok(outcome) => {
            info!("Foreground pass: {}", outcome);
            Some(outcome)
        }
        Err(e) => {
            error!("Foreground pass failed: {}", e);
            None
        }
    }
}

/// Fire every request that is due and report it to the scheduler.
/// Returns how many notifications were shown.
pub async fn fire_due(scheduler: &NotificationScheduler, center: &LocalNotificationCenter) -> usize {
    let due = center.take_due(scheduler.now());
    let count = due.len();

    for (request, fired_at) in due {
        info!("Notification shown: {} - {}", request.content.title, request.content.body);
        if let Err(e) = scheduler.record_delivery(&request.slot_id, fired_at).await {
            error!("Failed to record delivery of '{}': {}", request.slot_id, e);
        }
    }

    count
}

/// Tick until the slot's pending request has fired or `cancel_token` is
/// cancelled. Returns whether it fired.
///
/// Requests held by a [`LocalNotificationCenter`] live only as long as the
/// process, so one-shot runs wait here instead of exiting with a slot that
/// nothing will deliver.
pub async fn run_until_delivered(
    scheduler: &NotificationScheduler,
    center: &LocalNotificationCenter,
    tick_every: Duration,
    cancel_token: CancellationToken,
) -> bool {
    let slot_id = scheduler.settings().slot_id.clone();
    let Some(fire_at) = center.fire_time(&slot_id) else {
        debug!("Nothing pending in slot '{}'", slot_id);
        return false;
    };
    info!("Waiting for slot '{}' to fire at {}", slot_id, fire_at);

    let mut tick = interval(tick_every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                fire_due(scheduler, center).await;
                if center.fire_time(&slot_id).is_none() {
                    return true;
                }
            }
            _ = cancel_token.cancelled() => {
                warn!("Slot '{}' abandoned before {}; it will not be delivered", slot_id, fire_at);
                return false;
            }
        }
    }
}

/// Run until `cancel_token` is cancelled. The first foreground pass runs
/// immediately.
pub async fn run_foreground_loop(
    scheduler: Arc<NotificationScheduler>,
    center: Arc<LocalNotificationCenter>,
    foreground_every: Duration,
    tick_every: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        "Foreground loop started (pass every {}, tick every {})",
        format_duration(foreground_every),
        format_duration(tick_every)
    );

    let mut foreground = interval(foreground_every);
    foreground.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick = interval(tick_every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = foreground.tick() => {
                foreground_pass(&scheduler).await;
                debug!("Next foreground pass in {}", format_duration(foreground_every));
            }
            _ = tick.tick() => {
                fire_due(&scheduler, &center).await;
            }
            _ = cancel_token.cancelled() => {
                info!("Foreground loop shutting down");
                break;
            }
        }
    }
}
