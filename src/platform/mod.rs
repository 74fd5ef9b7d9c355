pub mod memory;

pub use memory::{ClusterEvent, ExperimentPod, HelperBehaviour, SimulatedCluster};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{
    AgentHandle, AgentStatus, HelperLaunchSpec, ResourceRequirements, Selector, TargetInstance,
    TargetSpec,
};

/// Workload API used to create, list and delete helper agents.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn create_agent(&self, spec: &HelperLaunchSpec) -> Result<AgentHandle>;
    async fn get_agents_by_label(&self, namespace: &str, selector: &Selector)
        -> Result<Vec<AgentStatus>>;
    /// Deleting a selector that matches nothing is not an error.
    async fn delete_agents_by_label(&self, namespace: &str, selector: &Selector) -> Result<()>;
}

#[async_trait]
pub trait TargetResolver: Send + Sync {
    /// Ordered list of instances to disrupt, or an error when none can be found.
    async fn resolve_targets(&self, spec: &TargetSpec) -> Result<Vec<TargetInstance>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeStage {
    DuringChaos,
}

impl ProbeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStage::DuringChaos => "DuringChaos",
        }
    }
}

#[async_trait]
pub trait ProbeRunner: Send + Sync {
    async fn run_probes(&self, stage: ProbeStage) -> Result<()>;
}

/// Helper data copied from the orchestrator's own pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedConfig {
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default)]
    pub image_pull_secrets: Vec<String>,
}

/// Looks up identity data of the pod this orchestrator runs in.
#[async_trait]
pub trait DerivedConfigSource: Send + Sync {
    async fn service_account(&self, pod: &str, namespace: &str) -> Result<String>;
    async fn resolve_derived_config(
        &self,
        pod: &str,
        namespace: &str,
        container: &str,
    ) -> Result<DerivedConfig>;
}

/// Number of targets selected by percentage: never less than one.
pub fn affected_count(percent: u32, total: usize) -> usize {
    let adjusted = (percent.min(100) as usize * total) / 100;
    adjusted.max(1).min(total)
}
