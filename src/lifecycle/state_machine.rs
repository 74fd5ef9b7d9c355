use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::types::HelperOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HelperState {
    Created,       // Creation request accepted
    AwaitingReady, // Waiting for the agent to start
    Running,       // Started, waiting for it to finish
    Succeeded,
    Failed,
    TimedOut,
}

impl HelperState {
    pub fn as_str(&self) -> &str {
        match self {
            HelperState::Created => "Created",
            HelperState::AwaitingReady => "AwaitingReady",
            HelperState::Running => "Running",
            HelperState::Succeeded => "Succeeded",
            HelperState::Failed => "Failed",
            HelperState::TimedOut => "TimedOut",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HelperState::Succeeded | HelperState::Failed | HelperState::TimedOut
        )
    }
}

impl From<HelperOutcome> for HelperState {
    fn from(outcome: HelperOutcome) -> Self {
        match outcome {
            HelperOutcome::Running => HelperState::Running,
            HelperOutcome::Succeeded => HelperState::Succeeded,
            HelperOutcome::Failed => HelperState::Failed,
            HelperOutcome::TimedOut => HelperState::TimedOut,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    StatusCheckStarted,
    Ready,
    Finished(HelperOutcome),
    NotReady,
}

pub struct HelperStateMachine;

impl HelperStateMachine {
    /// Terminal states are absorbing: any event on them is rejected.
    pub fn transition(state: HelperState, event: LifecycleEvent) -> Result<HelperState> {
        let next = match (state, event) {
            (HelperState::Created, LifecycleEvent::StatusCheckStarted) => {
                HelperState::AwaitingReady
            }
            (HelperState::AwaitingReady, LifecycleEvent::Ready) => HelperState::Running,
            (HelperState::AwaitingReady, LifecycleEvent::NotReady) => HelperState::TimedOut,
            (HelperState::AwaitingReady, LifecycleEvent::Finished(HelperOutcome::Failed)) => {
                HelperState::Failed
            }
            (HelperState::Running, LifecycleEvent::Finished(outcome))
                if outcome.is_terminal() =>
            {
                outcome.into()
            }

            _ => {
                return Err(anyhow!(
                    "Invalid helper transition from {:?} with event {:?}",
                    state,
                    event
                ));
            }
        };

        Ok(next)
    }
}
