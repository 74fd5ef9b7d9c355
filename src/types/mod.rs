pub mod helper;
pub mod selector;
pub mod target;

pub use helper::{
    EnvSource, EnvVar, HelperContainer, HelperLaunchSpec, HostPathVolume, ResourceRequirements,
    RestartPolicy, SecurityContext, VolumeMount,
};
pub use selector::{LabelSuffix, RunId, Selector};
pub use target::{TargetInstance, TargetSpec};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ChaosError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceMode {
    Serial,   // One target at a time, torn down before the next
    Parallel, // Whole batch launched and torn down together
}

impl SequenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceMode::Serial => "serial",
            SequenceMode::Parallel => "parallel",
        }
    }
}

impl FromStr for SequenceMode {
    type Err = ChaosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(SequenceMode::Serial),
            "parallel" => Ok(SequenceMode::Parallel),
            other => Err(ChaosError::Config(format!(
                "{} sequence is not supported",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPolicy {
    #[default]
    Delete,
    Retain,
}

impl CleanupPolicy {
    /// Unknown values fall back to `Delete`.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("retain") {
            CleanupPolicy::Retain
        } else {
            CleanupPolicy::Delete
        }
    }
}

/// Terminal (or still running) state of one helper agent, or of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HelperOutcome {
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl HelperOutcome {
    fn severity(&self) -> u8 {
        match self {
            HelperOutcome::Succeeded => 0,
            HelperOutcome::Running => 1,
            HelperOutcome::TimedOut => 2,
            HelperOutcome::Failed => 3,
        }
    }

    /// Failed > TimedOut > Running > Succeeded.
    pub fn worst(self, other: HelperOutcome) -> HelperOutcome {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, HelperOutcome::Running)
    }
}

impl fmt::Display for HelperOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HelperOutcome::Running => "Running",
            HelperOutcome::Succeeded => "Succeeded",
            HelperOutcome::Failed => "Failed",
            HelperOutcome::TimedOut => "TimedOut",
        };
        f.write_str(s)
    }
}

/// Phase reported by the platform for a helper agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl AgentPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentPhase::Succeeded | AgentPhase::Failed)
    }

    /// Past the readiness gate: the agent has started (and possibly already finished).
    pub fn is_ready(&self) -> bool {
        matches!(self, AgentPhase::Running | AgentPhase::Succeeded)
    }

    /// Any terminal phase other than `Succeeded` counts as a failure.
    pub fn outcome(&self) -> HelperOutcome {
        match self {
            AgentPhase::Succeeded => HelperOutcome::Succeeded,
            p if p.is_terminal() => HelperOutcome::Failed,
            _ => HelperOutcome::Running,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub name: String,
    pub phase: AgentPhase,
    pub node_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentHandle {
    pub name: String,
    pub namespace: String,
}
