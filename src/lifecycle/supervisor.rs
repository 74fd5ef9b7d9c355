use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use super::poll::poll_until;
use crate::config::ExperimentConfig;
use crate::error::{ChaosError, ChaosResult};
use crate::platform::Platform;
use crate::types::{
    AgentHandle, AgentPhase, CleanupPolicy, HelperLaunchSpec, HelperOutcome, Selector,
};

/// Creates helper agents, waits on them and reaps them. All queries are
/// scoped by selector within the chaos namespace.
pub struct LifecycleSupervisor {
    pub(super) platform: Arc<dyn Platform>,
    pub(super) namespace: String,
    pub(super) cleanup: CleanupPolicy,
    pub(super) poll_delay: Duration,
    pub(super) status_timeout: Duration,
}

impl LifecycleSupervisor {
    pub fn new(platform: Arc<dyn Platform>, config: &ExperimentConfig) -> Self {
        Self {
            platform,
            namespace: config.chaos_namespace.clone(),
            cleanup: config.cleanup_policy,
            poll_delay: config.poll_delay(),
            status_timeout: config.status_timeout(),
        }
    }

    /// No retry here: a rejected creation aborts the run.
    pub async fn create(&self, spec: &HelperLaunchSpec) -> ChaosResult<AgentHandle> {
        log::info!(
            "Creating helper {} on node {} for target {}",
            spec.name,
            spec.node_name,
            spec.target
        );

        self.platform
            .create_agent(spec)
            .await
            .map_err(|e| ChaosError::Create {
                helper: spec.name.clone(),
                target: spec.target.clone(),
                reason: format!("{:#}", e),
            })
    }

    /// Waits until every matched agent is running (or already succeeded).
    /// An agent that fails before becoming ready aborts the wait with a
    /// completion error.
    pub async fn await_ready(
        &self,
        selector: &Selector,
        timeout: Duration,
        poll_delay: Duration,
    ) -> ChaosResult<()> {
        log::info!("Checking the status of helper agents matching {}", selector);

        match poll_until(poll_delay, timeout, move || self.check_ready(selector)).await {
            Ok(result) => result,
            Err(deadline) => Err(ChaosError::NotReady {
                selector: selector.to_string(),
                reason: format!(
                    "{} after {}s",
                    deadline
                        .last
                        .unwrap_or_else(|| "no status observed".to_string()),
                    deadline.waited.as_secs()
                ),
            }),
        }
    }

    async fn check_ready(&self, selector: &Selector) -> ControlFlow<ChaosResult<()>, String> {
        let agents = match self.platform.get_agents_by_label(&self.namespace, selector).await {
            Ok(agents) => agents,
            Err(e) => {
                log::warn!("Unable to list helper agents matching {}: {:#}", selector, e);
                return ControlFlow::Continue(format!("listing failed: {:#}", e));
            }
        };

        if agents.is_empty() {
            return ControlFlow::Continue("no helper agents found".to_string());
        }

        if let Some(failed) = agents
            .iter()
            .find(|a| a.phase.is_terminal() && a.phase != AgentPhase::Succeeded)
        {
            log::warn!(
                "Helper {} is in {:?} phase before becoming ready",
                failed.name,
                failed.phase
            );
            return ControlFlow::Break(Err(ChaosError::Completion {
                selector: selector.to_string(),
                outcome: failed.phase.outcome(),
            }));
        }

        match agents.iter().find(|a| !a.phase.is_ready()) {
            Some(waiting) => ControlFlow::Continue(format!(
                "helper {} is in {:?} phase",
                waiting.name, waiting.phase
            )),
            None => ControlFlow::Break(Ok(())),
        }
    }

    /// Waits until every matched agent is terminal and returns the worst
    /// outcome seen. Running past `budget` yields `TimedOut`, unless a
    /// failure was already observed.
    pub async fn await_completion(
        &self,
        selector: &Selector,
        budget: Duration,
        poll_delay: Duration,
    ) -> HelperOutcome {
        log::info!(
            "Waiting up to {}s for helper agents matching {} to complete",
            budget.as_secs(),
            selector
        );

        let outcome = match poll_until(poll_delay, budget, move || self.check_completion(selector))
            .await
        {
            Ok(outcome) => outcome,
            Err(deadline) => {
                HelperOutcome::TimedOut.worst(deadline.last.unwrap_or(HelperOutcome::Running))
            }
        };

        log::info!("Helper agents matching {} finished as {}", selector, outcome);
        outcome
    }

    async fn check_completion(
        &self,
        selector: &Selector,
    ) -> ControlFlow<HelperOutcome, HelperOutcome> {
        let agents = match self.platform.get_agents_by_label(&self.namespace, selector).await {
            Ok(agents) => agents,
            Err(e) => {
                log::warn!("Unable to list helper agents matching {}: {:#}", selector, e);
                return ControlFlow::Continue(HelperOutcome::Running);
            }
        };

        if agents.is_empty() {
            return ControlFlow::Continue(HelperOutcome::Running);
        }

        let all_terminal = agents.iter().all(|a| a.phase.is_terminal());
        let worst = agents
            .iter()
            .map(|a| a.phase.outcome())
            .fold(HelperOutcome::Succeeded, HelperOutcome::worst);

        if all_terminal {
            ControlFlow::Break(worst)
        } else {
            ControlFlow::Continue(worst)
        }
    }
}
