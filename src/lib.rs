pub mod config;
pub mod engine;
pub mod error;
pub mod helper;
pub mod lifecycle;
pub mod platform;
pub mod types;

pub use config::ExperimentConfig;
pub use engine::{Orchestrator, RunResult, TargetReport};
pub use error::{ChaosError, ChaosResult};
pub use types::{
    CleanupPolicy, HelperLaunchSpec, HelperOutcome, Selector, SequenceMode, TargetInstance,
    TargetSpec,
};
