pub mod orchestrator;
pub mod report;
pub mod strategy;

pub use orchestrator::Orchestrator;
pub use report::{RunResult, RunSummary, TargetReport};
pub use strategy::{
    strategy_for, ExecutionStrategy, InjectionContext, ParallelStrategy, SerialStrategy,
    StrategyRun,
};
