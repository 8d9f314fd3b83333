/// Quiet-hours evaluation: is a notification allowed at a given instant?
///
/// Pure functions over a policy snapshot. Nothing here touches the clock, the
/// store or the delivery service, so it can be called from any thread.

use chrono::NaiveDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::policy::DndPolicy;
use crate::quiet_period::QuietPeriod;
use crate::time::{minute_of_day, previous_weekday, weekday_code};

/// Shape of a period's window once its times are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// `start < end`, contained in one day
    SameDay { start: u16, end: u16 },
    /// `start > end`, runs past midnight
    Overnight { start: u16, end: u16 },
    /// `start == end`: empty, never blocks
    Degenerate,
    /// A time component is out of range or missing
    Malformed,
}

impl Window {
    pub fn of(period: &QuietPeriod) -> Self {
        match (period.start.minute_of_day(), period.end.minute_of_day()) {
            (Some(start), Some(end)) if start < end => Window::SameDay { start, end },
            (Some(start), Some(end)) if start > end => Window::Overnight { start, end },
            (Some(_), Some(_)) => Window::Degenerate,
            _ => Window::Malformed,
        }
    }
}

/// Which part of a window matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowHalf {
    SameDay,
    /// Evening part, on the weekday the window starts
    OvernightStart,
    /// After-midnight part, attributed to the previous weekday's entry
    OvernightSpillover,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub period_id: Uuid,
    pub period_name: Option<String>,
    pub half: WindowHalf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    DndDisabled,
    NoMatchingPeriod,
}

/// Outcome of evaluating a policy at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed(AllowReason),
    Blocked(Block),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }
}

/// Whether a notification may be delivered at `at` (local wall-clock time).
pub fn is_allowed(policy: &DndPolicy, at: NaiveDateTime) -> bool {
    evaluate(policy, at).is_allowed()
}

/// Like [`is_allowed`] but reports the first period that blocked.
pub fn evaluate(policy: &DndPolicy, at: NaiveDateTime) -> Decision {
    if !policy.globally_enabled {
        debug!("DND globally disabled, {} allowed", at);
        return Decision::Allowed(AllowReason::DndDisabled);
    }

    let minute = minute_of_day(&at);
    let weekday = weekday_code(&at);

    for period in policy.enabled_periods() {
        if let Some(half) = blocking_half(period, minute, weekday) {
            debug!(
                "{} blocked by quiet period '{}' ({:?})",
                at,
                period.display_name(),
                half
            );
            return Decision::Blocked(Block {
                period_id: period.id(),
                period_name: period.name.clone(),
                half,
            });
        }
    }

    debug!("No quiet period matched, {} allowed", at);
    Decision::Allowed(AllowReason::NoMatchingPeriod)
}

/// Testable core: does `period` block at `minute` of weekday `weekday`?
///
/// Ignores `enabled`; callers filter disabled periods.
pub fn blocking_half(period: &QuietPeriod, minute: u16, weekday: u8) -> Option<WindowHalf> {
    match Window::of(period) {
        Window::SameDay { start, end } => {
            let inside = minute >= start && minute < end;
            (inside && period.days_of_week.contains(weekday)).then_some(WindowHalf::SameDay)
        }
        Window::Overnight { start, end } => {
            if period.days_of_week.contains(weekday) && minute >= start {
                Some(WindowHalf::OvernightStart)
            } else if period.days_of_week.contains(previous_weekday(weekday)) && minute < end {
                Some(WindowHalf::OvernightSpillover)
            } else {
                None
            }
        }
        Window::Degenerate => None,
        Window::Malformed => {
            warn!(
                "Quiet period '{}' has malformed times ({} - {}), ignoring it",
                period.display_name(),
                period.start,
                period.end
            );
            None
        }
    }
}

/// First minute boundary at or after `from` that the policy allows, searching
/// up to one week ahead. `None` if every minute of the week is blocked.
///
/// Not used by the scheduler, which leaves a blocked slot for the next
/// foreground pass to retry.
pub fn next_allowed_at(policy: &DndPolicy, from: NaiveDateTime) -> Option<NaiveDateTime> {
    use chrono::{Duration, Timelike};

    let mut candidate = from.with_second(0)?.with_nanosecond(0)?;
    if candidate < from {
        candidate += Duration::minutes(1);
    }
    let horizon = candidate + Duration::days(7);
    while candidate <= horizon {
        if is_allowed(policy, candidate) {
            return Some(candidate);
        }
        candidate += Duration::minutes(1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiet_period::WeekdaySet;
    use crate::time::{TimeOfDay, FRIDAY, MONDAY, SATURDAY, SUNDAY, THURSDAY, TUESDAY, WEDNESDAY};
    use chrono::{NaiveDate, Timelike};

    /// 2025-06-01 is a Sunday; day offsets pick the weekday
    fn on(weekday: u8, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, weekday as u32)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn period(start: (u32, u32), end: (u32, u32), days: &[u8]) -> QuietPeriod {
        QuietPeriod::new(
            TimeOfDay::new(start.0, start.1).unwrap(),
            TimeOfDay::new(end.0, end.1).unwrap(),
            WeekdaySet::new(days.iter().copied()).unwrap(),
        )
    }

    fn policy_of(periods: Vec<QuietPeriod>) -> DndPolicy {
        DndPolicy::new(periods, true)
    }

    fn sleep_policy() -> DndPolicy {
        policy_of(vec![period((22, 30), (7, 0), &[2, 3, 4, 5, 6]).with_name("Sleep")])
    }

    #[test]
    fn test_fixture_weekdays() {
        assert_eq!(weekday_code(&on(SUNDAY, 0, 0)), SUNDAY);
        assert_eq!(weekday_code(&on(SATURDAY, 0, 0)), SATURDAY);
    }

    #[test]
    fn test_window_classification() {
        assert!(matches!(
            Window::of(&period((9, 0), (17, 0), &[2])),
            Window::SameDay { start: 540, end: 1020 }
        ));
        assert!(matches!(
            Window::of(&period((22, 30), (7, 0), &[2])),
            Window::Overnight { start: 1350, end: 420 }
        ));
        assert_eq!(Window::of(&period((8, 0), (8, 0), &[2])), Window::Degenerate);

        let mut broken = period((8, 0), (9, 0), &[2]);
        broken.start = TimeOfDay { hour: 31, minute: 0 };
        assert_eq!(Window::of(&broken), Window::Malformed);
    }

    // === Sleep window: 22:30-07:00, Mon-Fri ===

    #[test]
    fn test_overnight_blocks_evening_on_start_day() {
        assert!(!is_allowed(&sleep_policy(), on(TUESDAY, 23, 0)));
    }

    #[test]
    fn test_overnight_blocks_spillover_next_morning() {
        assert!(!is_allowed(&sleep_policy(), on(WEDNESDAY, 6, 30)));
    }

    #[test]
    fn test_overnight_allows_at_end() {
        assert!(is_allowed(&sleep_policy(), on(WEDNESDAY, 7, 0)));
    }

    #[test]
    fn test_overnight_allows_evening_of_unlisted_day() {
        assert!(is_allowed(&sleep_policy(), on(SATURDAY, 23, 0)));
    }

    #[test]
    fn test_overnight_spillover_from_friday_into_saturday() {
        // Friday is listed, so early Saturday is still quiet
        assert!(!is_allowed(&sleep_policy(), on(SATURDAY, 6, 59)));
        assert!(is_allowed(&sleep_policy(), on(SATURDAY, 7, 0)));
    }

    #[test]
    fn test_overnight_no_spillover_into_monday() {
        // Sunday is not listed, so early Monday is not quiet
        assert!(is_allowed(&sleep_policy(), on(MONDAY, 3, 0)));
        // but Monday evening is
        assert!(!is_allowed(&sleep_policy(), on(MONDAY, 22, 30)));
        assert!(is_allowed(&sleep_policy(), on(MONDAY, 22, 29)));
    }

    #[test]
    fn test_saturday_evening_spills_into_sunday_morning() {
        let policy = policy_of(vec![period((23, 0), (8, 0), &[SATURDAY])]);
        assert!(!is_allowed(&policy, on(SUNDAY, 7, 59)));
        assert!(is_allowed(&policy, on(SUNDAY, 8, 0)));
        assert!(is_allowed(&policy, on(SUNDAY, 23, 30)));
    }

    // === Global switch ===

    #[test]
    fn test_global_disable_allows_everything() {
        let mut policy = sleep_policy();
        policy.set_globally_enabled(false);
        assert!(is_allowed(&policy, on(TUESDAY, 23, 0)));
        assert_eq!(
            evaluate(&policy, on(TUESDAY, 23, 0)),
            Decision::Allowed(AllowReason::DndDisabled)
        );
    }

    // === Same-day windows ===

    #[test]
    fn test_same_day_boundaries() {
        let policy = policy_of(vec![period((9, 0), (17, 0), &[THURSDAY])]);
        assert!(is_allowed(&policy, on(THURSDAY, 8, 59)));
        assert!(!is_allowed(&policy, on(THURSDAY, 9, 0)));
        assert!(!is_allowed(&policy, on(THURSDAY, 16, 59)));
        assert!(is_allowed(&policy, on(THURSDAY, 17, 0)));
        // Other days untouched
        assert!(is_allowed(&policy, on(FRIDAY, 12, 0)));
    }

    #[test]
    fn test_same_day_window_ending_at_midnight_minus_one() {
        let policy = policy_of(vec![period((0, 0), (23, 59), &[MONDAY])]);
        assert!(!is_allowed(&policy, on(MONDAY, 0, 0)));
        assert!(!is_allowed(&policy, on(MONDAY, 23, 58)));
        assert!(is_allowed(&policy, on(MONDAY, 23, 59)));
        assert!(is_allowed(&policy, on(TUESDAY, 0, 0)));
    }

    // === Degenerate and malformed ===

    #[test]
    fn test_degenerate_window_never_blocks() {
        let policy = policy_of(vec![period((8, 0), (8, 0), &[1, 2, 3, 4, 5, 6, 7])]);
        for day in SUNDAY..=SATURDAY {
            for (h, m) in [(0, 0), (7, 59), (8, 0), (8, 1), (12, 0), (23, 59)] {
                assert!(is_allowed(&policy, on(day, h, m)), "day {} {}:{}", day, h, m);
            }
        }
    }

    #[test]
    fn test_malformed_period_does_not_block_others() {
        let mut broken = period((0, 0), (23, 0), &[TUESDAY]);
        broken.end = TimeOfDay { hour: 99, minute: 0 };
        let policy = policy_of(vec![broken, period((22, 30), (7, 0), &[TUESDAY])]);

        // The broken period would cover noon; it must fail open
        assert!(is_allowed(&policy, on(TUESDAY, 12, 0)));
        // The good period after it still blocks
        assert!(!is_allowed(&policy, on(TUESDAY, 23, 0)));
    }

    #[test]
    fn test_disabled_period_is_inert() {
        let policy = policy_of(vec![period((22, 30), (7, 0), &[TUESDAY]).disabled()]);
        assert!(is_allowed(&policy, on(TUESDAY, 23, 0)));
    }

    #[test]
    fn test_empty_policy_allows() {
        assert_eq!(
            evaluate(&DndPolicy::default(), on(TUESDAY, 23, 0)),
            Decision::Allowed(AllowReason::NoMatchingPeriod)
        );
    }

    #[test]
    fn test_evaluate_reports_first_matching_period() {
        let first = period((21, 0), (6, 0), &[TUESDAY]).with_name("Early night");
        let second = period((22, 30), (7, 0), &[TUESDAY]).with_name("Sleep");
        let first_id = first.id();
        let policy = policy_of(vec![first, second]);

        match evaluate(&policy, on(TUESDAY, 23, 0)) {
            Decision::Blocked(block) => {
                assert_eq!(block.period_id, first_id);
                assert_eq!(block.period_name.as_deref(), Some("Early night"));
                assert_eq!(block.half, WindowHalf::OvernightStart);
            }
            other => panic!("expected a block, got {:?}", other),
        }

        match evaluate(&policy, on(WEDNESDAY, 5, 0)) {
            Decision::Blocked(block) => assert_eq!(block.half, WindowHalf::OvernightSpillover),
            other => panic!("expected a block, got {:?}", other),
        }
    }

    #[test]
    fn test_seconds_do_not_matter() {
        let at = on(WEDNESDAY, 6, 59).with_second(59).unwrap();
        assert!(!is_allowed(&sleep_policy(), at));
    }

    // === next_allowed_at ===

    #[test]
    fn test_next_allowed_at_skips_quiet_hours() {
        let next = next_allowed_at(&sleep_policy(), on(TUESDAY, 23, 0));
        assert_eq!(next, Some(on(WEDNESDAY, 7, 0)));
    }

    #[test]
    fn test_next_allowed_at_returns_from_when_allowed() {
        assert_eq!(
            next_allowed_at(&sleep_policy(), on(WEDNESDAY, 12, 0)),
            Some(on(WEDNESDAY, 12, 0))
        );
    }

    #[test]
    fn test_next_allowed_at_rounds_up_to_minute() {
        let from = on(WEDNESDAY, 12, 0).with_second(30).unwrap();
        assert_eq!(next_allowed_at(&sleep_policy(), from), Some(on(WEDNESDAY, 12, 1)));
    }

    #[test]
    fn test_next_allowed_at_none_when_always_blocked() {
        // Overlapping overnight windows covering the whole week
        let policy = policy_of(vec![
            period((0, 0), (23, 59), &[1, 2, 3, 4, 5, 6, 7]),
            period((23, 59), (0, 0), &[1, 2, 3, 4, 5, 6, 7]),
        ]);
        assert_eq!(next_allowed_at(&policy, on(TUESDAY, 12, 0)), None);
    }
}
