use async_trait::async_trait;

use super::report::TargetReport;
use crate::config::ExperimentConfig;
use crate::error::{ChaosError, ChaosResult};
use crate::helper::build_helper_spec;
use crate::lifecycle::{LifecycleEvent, LifecycleSupervisor};
use crate::platform::{ProbeRunner, ProbeStage};
use crate::types::{HelperOutcome, LabelSuffix, RunId, Selector, SequenceMode, TargetInstance};

/// Everything a strategy needs for one run. The config already carries its
/// derived fields.
pub struct InjectionContext<'a> {
    pub config: &'a ExperimentConfig,
    pub supervisor: &'a LifecycleSupervisor,
    pub label_suffix: &'a LabelSuffix,
    pub probes: Option<&'a dyn ProbeRunner>,
}

/// Reports for every target plus the run's overall result.
#[derive(Debug)]
pub struct StrategyRun {
    pub reports: Vec<TargetReport>,
    pub result: ChaosResult<HelperOutcome>,
}

#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn mode(&self) -> SequenceMode;

    async fn inject(&self, ctx: &InjectionContext<'_>, targets: &[TargetInstance]) -> StrategyRun;
}

pub fn strategy_for(mode: SequenceMode) -> Box<dyn ExecutionStrategy> {
    match mode {
        SequenceMode::Serial => Box::new(SerialStrategy),
        SequenceMode::Parallel => Box::new(ParallelStrategy),
    }
}

/// One helper at a time; each is reaped before the next is created.
/// Stops at the first target that does not succeed.
pub struct SerialStrategy;

#[async_trait]
impl ExecutionStrategy for SerialStrategy {
    fn mode(&self) -> SequenceMode {
        SequenceMode::Serial
    }

    async fn inject(&self, ctx: &InjectionContext<'_>, targets: &[TargetInstance]) -> StrategyRun {
        let mut reports: Vec<TargetReport> = targets.iter().map(TargetReport::pending).collect();

        let mut result = run_probes(ctx).await.map(|_| HelperOutcome::Succeeded);
        if result.is_ok() {
            for (target, report) in targets.iter().zip(reports.iter_mut()) {
                let injected = inject_one(ctx, target, report).await;
                report.finish(injected.as_ref().err());
                if let Err(err) = injected {
                    result = Err(err);
                    break;
                }
            }
        }

        StrategyRun { reports, result }
    }
}

async fn inject_one(
    ctx: &InjectionContext<'_>,
    target: &TargetInstance,
    report: &mut TargetReport,
) -> ChaosResult<()> {
    let run_id = RunId::generate();
    let spec = build_helper_spec(ctx.config, target, &run_id, ctx.label_suffix);
    let selector = Selector::per_agent(&ctx.config.experiment_name, &run_id);
    report.start(&run_id, &spec.name);

    // Nothing exists to reap if creation was rejected.
    ctx.supervisor.create(&spec).await?;
    report.created();

    ctx.supervisor
        .guarded(&selector, supervise(ctx, &selector, std::slice::from_mut(report)))
        .await
        .map(|_| ())
}

/// Whole batch launched together under one batch selector and reaped once.
pub struct ParallelStrategy;

#[async_trait]
impl ExecutionStrategy for ParallelStrategy {
    fn mode(&self) -> SequenceMode {
        SequenceMode::Parallel
    }

    async fn inject(&self, ctx: &InjectionContext<'_>, targets: &[TargetInstance]) -> StrategyRun {
        let mut reports: Vec<TargetReport> = targets.iter().map(TargetReport::pending).collect();

        if let Err(err) = run_probes(ctx).await {
            return StrategyRun {
                reports,
                result: Err(err),
            };
        }

        let batch = Selector::per_batch(&ctx.config.experiment_name, ctx.label_suffix);
        let result = ctx
            .supervisor
            .guarded(&batch, async {
                for (target, report) in targets.iter().zip(reports.iter_mut()) {
                    let run_id = RunId::generate();
                    let spec = build_helper_spec(ctx.config, target, &run_id, ctx.label_suffix);
                    report.start(&run_id, &spec.name);
                    ctx.supervisor.create(&spec).await?;
                    report.created();
                }
                supervise(ctx, &batch, &mut reports).await
            })
            .await;

        for report in reports.iter_mut() {
            report.finish(result.as_ref().err());
        }

        StrategyRun { reports, result }
    }
}

async fn run_probes(ctx: &InjectionContext<'_>) -> ChaosResult<()> {
    let Some(probes) = ctx.probes else {
        return Ok(());
    };

    log::info!("Running {} probes", ProbeStage::DuringChaos.as_str());
    probes
        .run_probes(ProbeStage::DuringChaos)
        .await
        .map_err(|e| ChaosError::Probe(format!("{:#}", e)))
}

/// Readiness then completion wait for every agent matching `selector`.
/// Anything but success becomes an error.
async fn supervise(
    ctx: &InjectionContext<'_>,
    selector: &Selector,
    reports: &mut [TargetReport],
) -> ChaosResult<HelperOutcome> {
    let config = ctx.config;
    advance_all(reports, LifecycleEvent::StatusCheckStarted);

    if let Err(err) = ctx
        .supervisor
        .await_ready(selector, config.status_timeout(), config.poll_delay())
        .await
    {
        let event = match err {
            ChaosError::NotReady { .. } => LifecycleEvent::NotReady,
            _ => LifecycleEvent::Finished(err.outcome()),
        };
        advance_all(reports, event);
        return Err(err);
    }
    advance_all(reports, LifecycleEvent::Ready);

    let outcome = ctx
        .supervisor
        .await_completion(selector, config.completion_budget(), config.poll_delay())
        .await;
    advance_all(reports, LifecycleEvent::Finished(outcome));

    if outcome != HelperOutcome::Succeeded {
        return Err(ChaosError::Completion {
            selector: selector.to_string(),
            outcome,
        });
    }
    Ok(outcome)
}

fn advance_all(reports: &mut [TargetReport], event: LifecycleEvent) {
    for report in reports.iter_mut() {
        report.advance(event);
    }
}
