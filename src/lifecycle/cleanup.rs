use std::future::Future;
use std::ops::ControlFlow;

use super::poll::poll_until;
use super::supervisor::LifecycleSupervisor;
use crate::error::{ChaosError, ChaosResult};
use crate::types::{CleanupPolicy, Selector};

impl LifecycleSupervisor {
    /// Deletes every agent matching `selector` and waits for them to go away,
    /// unless the cleanup policy retains them. Safe on empty selectors.
    pub async fn reap(&self, selector: &Selector) -> ChaosResult<()> {
        if self.cleanup == CleanupPolicy::Retain {
            log::info!(
                "Retaining helper agents matching {} (cleanup policy is retain)",
                selector
            );
            return Ok(());
        }

        log::info!("Deleting helper agents matching {}", selector);
        self.platform
            .delete_agents_by_label(&self.namespace, selector)
            .await
            .map_err(|e| ChaosError::Cleanup {
                selector: selector.to_string(),
                reason: format!("{:#}", e),
            })?;

        poll_until(self.poll_delay, self.status_timeout, move || {
            self.check_deleted(selector)
        })
        .await
        .map_err(|deadline| ChaosError::Cleanup {
            selector: selector.to_string(),
            reason: deadline
                .last
                .unwrap_or_else(|| "helper agents still present".to_string()),
        })
    }

    async fn check_deleted(&self, selector: &Selector) -> ControlFlow<(), String> {
        match self.platform.get_agents_by_label(&self.namespace, selector).await {
            Ok(agents) if agents.is_empty() => ControlFlow::Break(()),
            Ok(agents) => ControlFlow::Continue(format!(
                "{} helper agents still present after deletion",
                agents.len()
            )),
            Err(e) => ControlFlow::Continue(format!("listing failed: {:#}", e)),
        }
    }

    /// Runs `work`, then reaps `selector` exactly once whatever the result.
    ///
    /// A cleanup failure only surfaces when `work` succeeded; otherwise it is
    /// logged and the original error is returned.
    pub async fn guarded<T, F>(&self, selector: &Selector, work: F) -> ChaosResult<T>
    where
        F: Future<Output = ChaosResult<T>>,
    {
        let result = work.await;
        let reaped = self.reap(selector).await;

        match (result, reaped) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(cleanup)) => Err(cleanup),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup)) => {
                log::error!("{} (while handling: {})", cleanup, err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::ExperimentConfig;
    use crate::helper::build_helper_spec;
    use crate::platform::{HelperBehaviour, SimulatedCluster};
    use crate::types::{LabelSuffix, RunId, TargetInstance};

    fn config(cleanup_policy: CleanupPolicy) -> ExperimentConfig {
        ExperimentConfig {
            experiment_name: "mem-hog".to_string(),
            chaos_namespace: "litmus".to_string(),
            cleanup_policy,
            ..Default::default()
        }
    }

    async fn create(
        cluster: &SimulatedCluster,
        config: &ExperimentConfig,
        target: &str,
    ) -> (LifecycleSupervisor, Selector) {
        let supervisor = LifecycleSupervisor::new(Arc::new(cluster.clone()), config);
        let run_id = RunId::generate();
        let spec = build_helper_spec(
            config,
            &TargetInstance::new(target, "shop", "node-1"),
            &run_id,
            &LabelSuffix::from("b"),
        );
        supervisor.create(&spec).await.unwrap();
        (supervisor, Selector::per_agent(&config.experiment_name, &run_id))
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_deletes() {
        let cluster = SimulatedCluster::new();
        let (supervisor, selector) = create(&cluster, &config(CleanupPolicy::Delete), "a").await;

        supervisor.reap(&selector).await.unwrap();

        assert!(cluster.live_agents().is_empty());
        assert_eq!(cluster.deletions(), vec![selector.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_retains() {
        let cluster = SimulatedCluster::new();
        let (supervisor, selector) = create(&cluster, &config(CleanupPolicy::Retain), "a").await;

        supervisor.reap(&selector).await.unwrap();

        assert_eq!(cluster.live_agents().len(), 1);
        assert!(cluster.deletions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_never_created_selector() {
        let cluster = SimulatedCluster::new();
        let config = config(CleanupPolicy::Delete);
        let supervisor = LifecycleSupervisor::new(Arc::new(cluster.clone()), &config);

        let selector = Selector::per_agent("mem-hog", &RunId::from("ghost"));
        supervisor.reap(&selector).await.unwrap();
        supervisor.reap(&selector).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_reports_undeletable_helper() {
        let behaviour = HelperBehaviour {
            undeletable: true,
            ..Default::default()
        };
        let cluster = SimulatedCluster::new().with_behaviour("a", behaviour);
        let (supervisor, selector) = create(&cluster, &config(CleanupPolicy::Delete), "a").await;

        let err = supervisor.reap(&selector).await.unwrap_err();
        assert!(err.is_cleanup());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_reaps_on_error() {
        let cluster = SimulatedCluster::new();
        let (supervisor, selector) = create(&cluster, &config(CleanupPolicy::Delete), "a").await;

        let result: ChaosResult<()> = supervisor
            .guarded(&selector, async {
                Err(ChaosError::NotReady {
                    selector: selector.to_string(),
                    reason: "pending".to_string(),
                })
            })
            .await;

        assert!(matches!(result, Err(ChaosError::NotReady { .. })));
        assert!(cluster.live_agents().is_empty());
        assert_eq!(cluster.deletions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_error_does_not_mask_original() {
        let behaviour = HelperBehaviour {
            undeletable: true,
            ..Default::default()
        };
        let cluster = SimulatedCluster::new().with_behaviour("a", behaviour);
        let (supervisor, selector) = create(&cluster, &config(CleanupPolicy::Delete), "a").await;

        let result: ChaosResult<()> = supervisor
            .guarded(&selector, async {
                Err(ChaosError::Completion {
                    selector: selector.to_string(),
                    outcome: crate::types::HelperOutcome::Failed,
                })
            })
            .await;

        assert!(matches!(result, Err(ChaosError::Completion { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_error_surfaces_on_success() {
        let behaviour = HelperBehaviour {
            undeletable: true,
            ..Default::default()
        };
        let cluster = SimulatedCluster::new().with_behaviour("a", behaviour);
        let (supervisor, selector) = create(&cluster, &config(CleanupPolicy::Delete), "a").await;

        let result = supervisor.guarded(&selector, async { Ok(42) }).await;
        assert!(matches!(result, Err(ChaosError::Cleanup { .. })));
    }
}
