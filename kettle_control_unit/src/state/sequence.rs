//! Top-level status transitions.
//!
//! Every status change in the engine goes through
//! [`SequenceMachine::handle_event`]; side effects (timers, relays,
//! snapshots) are applied by the caller only on `TransitionResult::Ok`.
//!
//! | From                      | Event          | To             |
//! |---------------------------|----------------|----------------|
//! | Idle, Completed           | Start          | Running        |
//! | Running                   | Pause          | Paused         |
//! | Running                   | HardStop       | Paused         |
//! | Paused, WaitingForUser    | Resume         | Running        |
//! | Running                   | AwaitOperator  | WaitingForUser |
//! | Running, Paused, Waiting  | Advance        | Running        |
//! | Running, Paused, Waiting  | Finish         | Completed      |
//! | Idle                      | Restore        | Running        |
//! | any                       | Stop           | Idle           |
//! | any                       | EnterManual    | Manual         |
//! | any                       | ScheduleDelay  | DelayedWait    |

use kettle_common::state::SequenceStatus;

/// Result of a status transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition succeeded with the new status.
    Ok(SequenceStatus),
    /// Transition rejected with the reason.
    Rejected(&'static str),
}

/// Event that can change the top-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    Start,
    Pause,
    /// Hard stop while a step is timing.
    HardStop,
    Resume,
    /// Addition fired or step timer ran out under a manual policy.
    AwaitOperator,
    /// Move to the next step.
    Advance,
    /// Last step done.
    Finish,
    /// Resume a recipe from a recovery snapshot.
    Restore,
    Stop,
    EnterManual,
    ScheduleDelay,
}

#[derive(Debug, Clone, Default)]
pub struct SequenceMachine {
    status: SequenceStatus,
}

impl SequenceMachine {
    pub const fn new() -> Self {
        Self {
            status: SequenceStatus::Idle,
        }
    }

    #[inline]
    pub const fn status(&self) -> SequenceStatus {
        self.status
    }

    /// Attempt a transition.
    pub fn handle_event(&mut self, event: SequenceEvent) -> TransitionResult {
        use SequenceEvent::*;
        use SequenceStatus::*;

        let next = match (self.status, event) {
            (Idle | Completed, Start) => Running,
            (_, Start) => return TransitionResult::Rejected("sequence already active"),

            (Running, Pause) => Paused,
            (_, Pause) => return TransitionResult::Rejected("sequence not running"),

            (Running, HardStop) => Paused,
            (_, HardStop) => return TransitionResult::Rejected("no step timing"),

            (Paused | WaitingForUser, Resume) => Running,
            (_, Resume) => return TransitionResult::Rejected("nothing to resume"),

            (Running, AwaitOperator) => WaitingForUser,
            (_, AwaitOperator) => return TransitionResult::Rejected("sequence not running"),

            (Running | Paused | WaitingForUser, Advance) => Running,
            (Running | Paused | WaitingForUser, Finish) => Completed,
            (_, Advance | Finish) => return TransitionResult::Rejected("no step in progress"),

            (Idle, Restore) => Running,
            (_, Restore) => return TransitionResult::Rejected("engine busy"),

            (_, Stop) => Idle,
            (_, EnterManual) => Manual,
            (_, ScheduleDelay) => DelayedWait,
        };

        self.status = next;
        TransitionResult::Ok(next)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use SequenceEvent::*;

    fn machine_in(events: &[SequenceEvent]) -> SequenceMachine {
        let mut m = SequenceMachine::new();
        for e in events {
            assert!(matches!(m.handle_event(*e), TransitionResult::Ok(_)));
        }
        m
    }

    #[test]
    fn happy_path() {
        let mut m = machine_in(&[Start, Pause, Resume, AwaitOperator]);
        assert_eq!(m.status(), SequenceStatus::WaitingForUser);
        assert_eq!(m.handle_event(Advance), TransitionResult::Ok(SequenceStatus::Running));
        assert_eq!(m.handle_event(Finish), TransitionResult::Ok(SequenceStatus::Completed));
        assert_eq!(m.handle_event(Start), TransitionResult::Ok(SequenceStatus::Running));
    }

    #[test]
    fn rejects_out_of_order_events() {
        let mut m = SequenceMachine::new();
        assert!(matches!(m.handle_event(Pause), TransitionResult::Rejected(_)));
        assert!(matches!(m.handle_event(Resume), TransitionResult::Rejected(_)));
        assert!(matches!(m.handle_event(Advance), TransitionResult::Rejected(_)));
        assert_eq!(m.status(), SequenceStatus::Idle);

        let mut m = machine_in(&[Start]);
        assert!(matches!(m.handle_event(Start), TransitionResult::Rejected(_)));
        assert!(matches!(m.handle_event(Restore), TransitionResult::Rejected(_)));
    }

    #[test]
    fn hard_stop_only_pauses_a_running_step() {
        let mut m = machine_in(&[Start, Pause]);
        assert!(matches!(m.handle_event(HardStop), TransitionResult::Rejected(_)));
        assert_eq!(m.status(), SequenceStatus::Paused);
    }

    #[test]
    fn stop_manual_and_delay_apply_from_anywhere() {
        for status_events in [&[][..], &[Start][..], &[EnterManual][..], &[ScheduleDelay][..]] {
            let mut m = machine_in(status_events);
            assert_eq!(m.handle_event(Stop), TransitionResult::Ok(SequenceStatus::Idle));
            assert_eq!(m.handle_event(EnterManual), TransitionResult::Ok(SequenceStatus::Manual));
            assert_eq!(
                m.handle_event(ScheduleDelay),
                TransitionResult::Ok(SequenceStatus::DelayedWait)
            );
        }
    }
}
