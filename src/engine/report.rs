use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ChaosError, ChaosResult};
use crate::lifecycle::{HelperState, HelperStateMachine, LifecycleEvent};
use crate::types::{HelperOutcome, RunId, SequenceMode, TargetInstance};

/// Per-target record of one injection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetReport {
    pub target: String,
    pub node: String,
    pub run_id: Option<RunId>,
    pub helper_name: Option<String>,
    /// `None` until a creation request was accepted.
    pub state: Option<HelperState>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub detail: Option<String>,
}

impl TargetReport {
    pub fn pending(target: &TargetInstance) -> Self {
        Self {
            target: target.name.clone(),
            node: target.node_name.clone(),
            run_id: None,
            helper_name: None,
            state: None,
            started_at: None,
            finished_at: None,
            detail: None,
        }
    }

    pub fn start(&mut self, run_id: &RunId, helper_name: &str) {
        self.run_id = Some(run_id.clone());
        self.helper_name = Some(helper_name.to_string());
        self.started_at = Some(Utc::now());
    }

    pub fn created(&mut self) {
        self.state = Some(HelperState::Created);
    }

    /// Applies `event` to the tracked state. Reports that never had a helper
    /// created, or that already settled, are left alone.
    pub fn advance(&mut self, event: LifecycleEvent) {
        let Some(state) = self.state else {
            return;
        };
        if state.is_terminal() {
            return;
        }

        match HelperStateMachine::transition(state, event) {
            Ok(next) => self.state = Some(next),
            Err(e) => log::warn!("Helper for target {}: {}", self.target, e),
        }
    }

    /// Stamps the end time of a started injection and records `error`, if
    /// any, as its detail.
    pub fn finish(&mut self, error: Option<&ChaosError>) {
        if self.started_at.is_none() {
            return;
        }
        self.finished_at = Some(Utc::now());
        if let Some(err) = error {
            if self.detail.is_none() {
                self.detail = Some(err.to_string());
            }
        }
    }
}

/// Outcome of one orchestrator run.
#[derive(Debug)]
pub struct RunResult {
    /// `None` when validation failed before the mode was known.
    pub mode: Option<SequenceMode>,
    pub outcome: HelperOutcome,
    pub error: Option<ChaosError>,
    pub targets: Vec<TargetReport>,
}

impl RunResult {
    pub fn failed(
        mode: Option<SequenceMode>,
        error: ChaosError,
        targets: Vec<TargetReport>,
    ) -> Self {
        Self {
            mode,
            outcome: error.outcome(),
            error: Some(error),
            targets,
        }
    }

    pub fn completed(
        mode: SequenceMode,
        result: ChaosResult<HelperOutcome>,
        targets: Vec<TargetReport>,
    ) -> Self {
        match result {
            Ok(outcome) => Self {
                mode: Some(mode),
                outcome,
                error: None,
                targets,
            },
            Err(err) => Self::failed(Some(mode), err, targets),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.outcome == HelperOutcome::Succeeded
    }

    pub fn into_result(self) -> ChaosResult<Vec<TargetReport>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.targets),
        }
    }

    /// Serializable summary for printing.
    pub fn summary(&self) -> RunSummary<'_> {
        RunSummary {
            mode: self.mode.map(|m| m.as_str()),
            outcome: self.outcome,
            error: self.error.as_ref().map(|e| e.to_string()),
            targets: &self.targets,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub mode: Option<&'static str>,
    pub outcome: HelperOutcome,
    pub error: Option<String>,
    pub targets: &'a [TargetReport],
}
