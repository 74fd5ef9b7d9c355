use thiserror::Error;

use crate::types::HelperOutcome;

#[derive(Debug, Error)]
pub enum ChaosError {
    #[error("invalid experiment configuration: {0}")]
    Config(String),

    #[error("unable to resolve target instances: {0}")]
    Resolution(String),

    #[error("unable to derive helper data: {0}")]
    Derivation(String),

    #[error("probes failed during chaos: {0}")]
    Probe(String),

    #[error("unable to create helper `{helper}` for target `{target}`: {reason}")]
    Create {
        helper: String,
        target: String,
        reason: String,
    },

    #[error("helper agents matching `{selector}` are not running: {reason}")]
    NotReady { selector: String, reason: String },

    #[error("helper agents matching `{selector}` finished as {outcome}")]
    Completion {
        selector: String,
        outcome: HelperOutcome,
    },

    #[error("unable to delete helper agents matching `{selector}`: {reason}")]
    Cleanup { selector: String, reason: String },
}

impl ChaosError {
    /// Outcome recorded in the run result when the run ends with this error.
    pub fn outcome(&self) -> HelperOutcome {
        match self {
            ChaosError::Completion { outcome, .. } => *outcome,
            ChaosError::NotReady { .. } => HelperOutcome::TimedOut,
            _ => HelperOutcome::Failed,
        }
    }

    pub fn is_cleanup(&self) -> bool {
        matches!(self, ChaosError::Cleanup { .. })
    }
}

pub type ChaosResult<T> = std::result::Result<T, ChaosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_error_keeps_outcome() {
        let err = ChaosError::Completion {
            selector: "app=stress-helper-abc".to_string(),
            outcome: HelperOutcome::TimedOut,
        };
        assert_eq!(err.outcome(), HelperOutcome::TimedOut);
        assert!(err.to_string().contains("TimedOut"));
    }

    #[test]
    fn test_not_ready_maps_to_timed_out() {
        let err = ChaosError::NotReady {
            selector: "name=x".to_string(),
            reason: "pending".to_string(),
        };
        assert_eq!(err.outcome(), HelperOutcome::TimedOut);
    }

    #[test]
    fn test_other_errors_map_to_failed() {
        assert_eq!(
            ChaosError::Config("bad".to_string()).outcome(),
            HelperOutcome::Failed
        );
        assert!(ChaosError::Cleanup {
            selector: "s".to_string(),
            reason: "r".to_string()
        }
        .is_cleanup());
    }
}
