use std::fmt;

use common::error::AppError;
use serde::Serialize;
use state_machines::state_machine;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "Pending",
            JobState::Running => "Running",
            JobState::Succeeded => "Succeeded",
            JobState::Failed => "Failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum JobTransition {
    Start,
    Succeed,
    Fail,
}

impl JobTransition {
    fn as_str(self) -> &'static str {
        match self {
            JobTransition::Start => "start",
            JobTransition::Succeed => "succeed",
            JobTransition::Fail => "fail",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: JobLifecycleMachine,
        initial: Pending,
        states: [Pending, Running, Succeeded, Failed],
        events {
            start {
                transition: { from: Pending, to: Running }
            }
            succeed {
                transition: { from: Running, to: Succeeded }
            }
            fail {
                transition: { from: Pending, to: Failed }
                transition: { from: Running, to: Failed }
            }
        }
    }

    pub(super) fn pending() -> JobLifecycleMachine<(), Pending> {
        JobLifecycleMachine::new(())
    }

    pub(super) fn running() -> Option<JobLifecycleMachine<(), Running>> {
        pending().start().ok()
    }
}

fn invalid_transition(state: JobState, event: JobTransition) -> AppError {
    AppError::InternalError(format!(
        "Invalid job transition: {} -> {}",
        state.as_str(),
        event.as_str()
    ))
}

/// Validates `event` against the job lifecycle and returns the resulting state.
pub fn compute_next_state(state: JobState, event: JobTransition) -> Result<JobState, AppError> {
    use lifecycle::{pending, running};

    let next = match (state, event) {
        (JobState::Pending, JobTransition::Start) => {
            pending().start().ok().map(|_| JobState::Running)
        }
        (JobState::Pending, JobTransition::Fail) => {
            pending().fail().ok().map(|_| JobState::Failed)
        }
        (JobState::Running, JobTransition::Succeed) => {
            running().and_then(|m| m.succeed().ok()).map(|_| JobState::Succeeded)
        }
        (JobState::Running, JobTransition::Fail) => {
            running().and_then(|m| m.fail().ok()).map(|_| JobState::Failed)
        }
        _ => None,
    };

    next.ok_or_else(|| invalid_transition(state, event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_succeeded() {
        let running = compute_next_state(JobState::Pending, JobTransition::Start).unwrap();
        assert_eq!(running, JobState::Running);
        assert_eq!(
            compute_next_state(running, JobTransition::Succeed).unwrap(),
            JobState::Succeeded
        );
    }

    #[test]
    fn failure_is_reachable_before_and_during_run() {
        assert_eq!(
            compute_next_state(JobState::Pending, JobTransition::Fail).unwrap(),
            JobState::Failed
        );
        assert_eq!(
            compute_next_state(JobState::Running, JobTransition::Fail).unwrap(),
            JobState::Failed
        );
    }

    #[test]
    fn terminal_states_accept_no_events() {
        for state in [JobState::Succeeded, JobState::Failed] {
            assert!(state.is_terminal());
            for event in [JobTransition::Start, JobTransition::Succeed, JobTransition::Fail] {
                assert!(compute_next_state(state, event).is_err());
            }
        }
        assert!(compute_next_state(JobState::Pending, JobTransition::Succeed).is_err());
    }
}
