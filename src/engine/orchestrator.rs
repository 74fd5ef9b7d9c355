use std::sync::Arc;

use super::report::RunResult;
use super::strategy::{strategy_for, InjectionContext};
use crate::config::ExperimentConfig;
use crate::error::{ChaosError, ChaosResult};
use crate::lifecycle::LifecycleSupervisor;
use crate::platform::{DerivedConfigSource, Platform, ProbeRunner, TargetResolver};
use crate::types::{LabelSuffix, SequenceMode, TargetInstance, TargetSpec};

/// Drives one stress-chaos run: validate, resolve targets, derive helper data,
/// then hand over to the strategy for the configured sequence.
pub struct Orchestrator {
    platform: Arc<dyn Platform>,
    resolver: Arc<dyn TargetResolver>,
    probes: Option<Arc<dyn ProbeRunner>>,
    derived: Option<Arc<dyn DerivedConfigSource>>,
}

impl Orchestrator {
    pub fn new(platform: Arc<dyn Platform>, resolver: Arc<dyn TargetResolver>) -> Self {
        Self {
            platform,
            resolver,
            probes: None,
            derived: None,
        }
    }

    pub fn with_probes(mut self, probes: Arc<dyn ProbeRunner>) -> Self {
        self.probes = Some(probes);
        self
    }

    pub fn with_derived_config(mut self, source: Arc<dyn DerivedConfigSource>) -> Self {
        self.derived = Some(source);
        self
    }

    /// Runs against the targets selected by the config itself.
    pub async fn run_experiment(&self, config: ExperimentConfig) -> RunResult {
        if let Err(err) = config.validate() {
            log::error!("{}", err);
            return RunResult::failed(None, err, Vec::new());
        }
        let spec = config.target_spec();
        self.run(config, spec).await
    }

    pub async fn run(&self, config: ExperimentConfig, spec: TargetSpec) -> RunResult {
        let mode = match validate(&config, &spec) {
            Ok(mode) => mode,
            Err(err) => {
                log::error!("{}", err);
                return RunResult::failed(None, err, Vec::new());
            }
        };

        let (config, targets) = match self.prepare(config, &spec).await {
            Ok(prepared) => prepared,
            Err(err) => {
                log::error!("{}", err);
                return RunResult::failed(Some(mode), err, Vec::new());
            }
        };

        let label_suffix = LabelSuffix::generate();
        let supervisor = LifecycleSupervisor::new(self.platform.clone(), &config);
        let ctx = InjectionContext {
            config: &config,
            supervisor: &supervisor,
            label_suffix: &label_suffix,
            probes: self.probes.as_deref(),
        };

        let strategy = strategy_for(mode);
        log::info!(
            "Injecting {} on {} targets in {} mode",
            config.experiment_name,
            targets.len(),
            strategy.mode().as_str()
        );
        let run = strategy.inject(&ctx, &targets).await;

        match &run.result {
            Ok(outcome) => log::info!("{} finished as {}", config.experiment_name, outcome),
            Err(err) => log::error!("{} failed: {}", config.experiment_name, err),
        }
        RunResult::completed(mode, run.result, run.reports)
    }

    async fn prepare(
        &self,
        config: ExperimentConfig,
        spec: &TargetSpec,
    ) -> ChaosResult<(ExperimentConfig, Vec<TargetInstance>)> {
        let targets = self.resolve(spec).await?;

        let ramp = config.ramp_time();
        if !ramp.is_zero() {
            log::info!("Waiting for the ramp time of {}s", ramp.as_secs());
            tokio::time::sleep(ramp).await;
        }

        let config = self.derive(config, &targets).await?;
        Ok((config, targets))
    }

    async fn resolve(&self, spec: &TargetSpec) -> ChaosResult<Vec<TargetInstance>> {
        let targets = self
            .resolver
            .resolve_targets(spec)
            .await
            .map_err(|e| ChaosError::Resolution(format!("{:#}", e)))?;

        if targets.is_empty() {
            return Err(ChaosError::Resolution(format!(
                "no target instances found in namespace {}",
                spec.namespace
            )));
        }
        if let Some(unplaced) = targets.iter().find(|t| !t.is_placed()) {
            return Err(ChaosError::Resolution(format!(
                "target {} is not scheduled on any node",
                unplaced.name
            )));
        }

        for target in &targets {
            log::info!("Target {} on node {}", target.name, target.node_name);
        }
        Ok(targets)
    }

    /// Fills in the fields helpers copy from the orchestrator's environment.
    /// Returns a new config; values already set are kept.
    async fn derive(
        &self,
        mut config: ExperimentConfig,
        targets: &[TargetInstance],
    ) -> ChaosResult<ExperimentConfig> {
        if let Some(source) = &self.derived {
            if config.service_account.is_empty() {
                config.service_account = source
                    .service_account(&config.chaos_pod_name, &config.chaos_namespace)
                    .await
                    .map_err(|e| {
                        ChaosError::Derivation(format!(
                            "unable to get the service account name: {:#}",
                            e
                        ))
                    })?;
            }
        }

        if config.target_container.is_empty() {
            let first = targets
                .first()
                .ok_or_else(|| ChaosError::Derivation("no target to inspect".to_string()))?;
            config.target_container = first.containers.first().cloned().ok_or_else(|| {
                ChaosError::Derivation(format!("target {} has no containers", first.name))
            })?;
        }

        if let Some(source) = &self.derived {
            if !config.engine_name.is_empty() {
                let derived = source
                    .resolve_derived_config(
                        &config.chaos_pod_name,
                        &config.chaos_namespace,
                        &config.experiment_name,
                    )
                    .await
                    .map_err(|e| ChaosError::Derivation(format!("{:#}", e)))?;
                config.annotations = derived.annotations;
                config.resources = derived.resources;
                config.image_pull_secrets = derived.image_pull_secrets;
            }
        }

        Ok(config)
    }
}

fn validate(config: &ExperimentConfig, spec: &TargetSpec) -> ChaosResult<SequenceMode> {
    let mode = config.validate_settings()?;
    if spec.is_empty() {
        return Err(ChaosError::Config(
            "please provide one of the app label or target pods".to_string(),
        ));
    }
    Ok(mode)
}
