/// State machine model of the single notification slot
///
/// Checks the scheduler's slot protocol with stateright: submissions upsert
/// under one id, state is written only after the delivery center acknowledges,
/// and failed or blocked attempts leave everything untouched.

use stateright::*;

use crate::state::NotificationStatus;

/// Fire times are abstracted to small integers
type FireTime = u8;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
enum Action {
    /// Candidate allowed and the submission acknowledged
    Schedule(FireTime),
    /// Candidate allowed but the submission failed
    ScheduleFails(FireTime),
    /// Candidate inside quiet hours
    Blocked(FireTime),
    Delay(FireTime),
    Fire,
    Unauthorized,
    AlertsDisabled,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct SlotState {
    /// Requests in the delivery center, keyed by slot id
    pending: Vec<(&'static str, FireTime)>,
    /// Every fire time the delivery center ever acknowledged
    acknowledged: Vec<FireTime>,
    next_fire_time: Option<FireTime>,
    status: NotificationStatus,
    steps: u8,
}

const SLOT: &str = "dailyNovelty";

impl SlotState {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
            acknowledged: Vec::new(),
            next_fire_time: None,
            status: NotificationStatus::Proposed,
            steps: 0,
        }
    }

    fn cancel(&mut self) {
        self.pending.retain(|(id, _)| *id != SLOT);
    }

    fn submit(&mut self, at: FireTime) {
        self.pending.retain(|(id, _)| *id != SLOT);
        self.pending.push((SLOT, at));
        if !self.acknowledged.contains(&at) {
            self.acknowledged.push(at);
            self.acknowledged.sort_unstable();
        }
    }
}

struct SlotModel {
    fire_times: Vec<FireTime>,
    max_steps: u8,
}

impl Model for SlotModel {
    type State = SlotState;
    type Action = Action;

    fn init_states(&self) -> Vec<Self::State> {
        vec![SlotState::new()]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        if state.steps >= self.max_steps {
            return;
        }
        for &t in &self.fire_times {
            actions.push(Action::Schedule(t));
            actions.push(Action::ScheduleFails(t));
            actions.push(Action::Blocked(t));
            actions.push(Action::Delay(t));
        }
        if !state.pending.is_empty() {
            actions.push(Action::Fire);
        }
        actions.push(Action::Unauthorized);
        actions.push(Action::AlertsDisabled);
    }

    fn next_state(&self, state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut next = state.clone();
        next.steps += 1;
        match action {
            Action::Schedule(t) => {
                next.submit(t);
                next.next_fire_time = Some(t);
                next.status = NotificationStatus::Scheduled;
            }
            Action::Delay(t) => {
                next.submit(t);
                next.next_fire_time = Some(t);
                next.status = NotificationStatus::Delayed;
            }
            // The previous request stays with the delivery center
            Action::ScheduleFails(_) | Action::Blocked(_) => {}
            Action::Fire => {
                next.pending.retain(|(id, _)| *id != SLOT);
                if next.status.is_pending() {
                    next.status = NotificationStatus::Delivered;
                }
            }
            Action::Unauthorized => {
                next.cancel();
                next.next_fire_time = None;
                next.status = NotificationStatus::Proposed;
            }
            Action::AlertsDisabled => {
                next.cancel();
                next.next_fire_time = None;
                next.status = NotificationStatus::Blocked;
            }
        }
        Some(next)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            Property::always("at_most_one_pending_per_slot", |_: &Self, s: &SlotState| {
                s.pending.iter().filter(|(id, _)| *id == SLOT).count() <= 1
            }),
            Property::always("fire_time_was_acknowledged", |_: &Self, s: &SlotState| {
                s.next_fire_time.map_or(true, |t| s.acknowledged.contains(&t))
            }),
            Property::always("pending_status_has_fire_time", |_: &Self, s: &SlotState| {
                !s.status.is_pending() || s.next_fire_time.is_some()
            }),
            Property::always("pending_status_held_by_center", |_: &Self, s: &SlotState| {
                !s.status.is_pending()
                    || s.next_fire_time.map_or(false, |t| s.pending.contains(&(SLOT, t)))
            }),
            Property::always("suppressed_has_no_fire_time", |_: &Self, s: &SlotState| {
                !matches!(s.status, NotificationStatus::Proposed | NotificationStatus::Blocked)
                    || s.next_fire_time.is_none()
            }),
            Property::sometimes("can_deliver", |_: &Self, s: &SlotState| {
                s.status == NotificationStatus::Delivered
            }),
        ]
    }
}

#[test]
fn test_slot_model_properties() {
    let model = SlotModel {
        fire_times: vec![1, 2],
        max_steps: 4,
    };

    model
        .checker()
        .threads(1)
        .spawn_bfs()
        .join()
        .assert_properties();
}

#[test]
fn test_blocked_attempt_is_a_no_op() {
    let model = SlotModel {
        fire_times: vec![1],
        max_steps: 3,
    };
    let scheduled = model
        .next_state(&SlotState::new(), Action::Schedule(1))
        .unwrap();
    let after_block = model.next_state(&scheduled, Action::Blocked(1)).unwrap();

    assert_eq!(after_block.pending, scheduled.pending);
    assert_eq!(after_block.next_fire_time, scheduled.next_fire_time);
    assert_eq!(after_block.status, scheduled.status);
}

#[test]
fn test_failed_submission_keeps_pending_request() {
    let model = SlotModel {
        fire_times: vec![1, 2],
        max_steps: 3,
    };
    let scheduled = model
        .next_state(&SlotState::new(), Action::Schedule(1))
        .unwrap();
    let after_failure = model
        .next_state(&scheduled, Action::ScheduleFails(2))
        .unwrap();

    assert_eq!(after_failure.pending, vec![(SLOT, 1)]);
    assert_eq!(after_failure.next_fire_time, Some(1));
    assert_eq!(after_failure.status, NotificationStatus::Scheduled);
}
