use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::{affected_count, DerivedConfig, DerivedConfigSource, Platform, TargetResolver};
use crate::types::{
    AgentHandle, AgentPhase, AgentStatus, HelperLaunchSpec, Selector, TargetInstance, TargetSpec,
};

/// Scripted lifecycle of a helper agent launched against one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperBehaviour {
    /// Creation is refused with this message.
    pub reject: Option<String>,
    pub pending_secs: u64,
    pub never_ready: bool,
    /// Defaults to the chaos duration handed to the helper.
    pub run_secs: Option<u64>,
    pub hang: bool,
    pub final_phase: AgentPhase,
    /// Survives delete requests.
    pub undeletable: bool,
}

impl Default for HelperBehaviour {
    fn default() -> Self {
        Self {
            reject: None,
            pending_secs: 0,
            never_ready: false,
            run_secs: None,
            hang: false,
            final_phase: AgentPhase::Succeeded,
            undeletable: false,
        }
    }
}

impl HelperBehaviour {
    pub fn succeeds_after(secs: u64) -> Self {
        Self {
            run_secs: Some(secs),
            ..Default::default()
        }
    }

    pub fn fails_after(secs: u64) -> Self {
        Self {
            run_secs: Some(secs),
            final_phase: AgentPhase::Failed,
            ..Default::default()
        }
    }

    pub fn hangs() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    pub fn never_ready() -> Self {
        Self {
            never_ready: true,
            ..Default::default()
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            reject: Some(reason.into()),
            ..Default::default()
        }
    }

    fn phase_at(&self, elapsed: Duration, run_for: Duration) -> AgentPhase {
        let pending = Duration::from_secs(self.pending_secs);
        if self.never_ready || elapsed < pending {
            AgentPhase::Pending
        } else if self.hang || elapsed < pending + run_for {
            AgentPhase::Running
        } else {
            self.final_phase
        }
    }
}

/// The pod this orchestrator pretends to run in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentPod {
    pub namespace: String,
    #[serde(default)]
    pub service_account: String,
    #[serde(default)]
    pub derived: DerivedConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterEvent {
    Created { name: String, target: String },
    CreateRejected { name: String, target: String },
    Listed { selector: String },
    Deleted { selector: String, removed: usize },
}

/// On-disk description of a simulated cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterManifest {
    pub pods: Vec<TargetInstance>,
    pub behaviours: BTreeMap<String, HelperBehaviour>,
    pub experiment_pods: BTreeMap<String, ExperimentPod>,
}

struct SimAgent {
    namespace: String,
    labels: BTreeMap<String, String>,
    node_name: String,
    created_at: Instant,
    run_for: Duration,
    behaviour: HelperBehaviour,
}

#[derive(Default)]
struct ClusterState {
    pods: Vec<TargetInstance>,
    behaviours: HashMap<String, HelperBehaviour>,
    experiment_pods: HashMap<String, ExperimentPod>,
    agents: BTreeMap<String, SimAgent>,
    events: Vec<ClusterEvent>,
    peak_live: usize,
    list_failures: usize,
}

/// In-memory cluster implementing every collaborator trait. Helper phases
/// advance with the tokio clock, so paused-time tests run instantly.
#[derive(Clone, Default)]
pub struct SimulatedCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl SimulatedCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_manifest(manifest: ClusterManifest) -> Self {
        let state = ClusterState {
            pods: manifest.pods,
            behaviours: manifest.behaviours.into_iter().collect(),
            experiment_pods: manifest.experiment_pods.into_iter().collect(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let manifest: ClusterManifest = serde_yaml::from_str(&raw)?;
        Ok(Self::from_manifest(manifest))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ClusterState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("simulated cluster state lock poisoned"))
    }

    /// Setup and inspection recover a poisoned lock.
    fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_pod(self, pod: TargetInstance) -> Self {
        self.state().pods.push(pod);
        self
    }

    pub fn with_behaviour(self, target: &str, behaviour: HelperBehaviour) -> Self {
        self.state().behaviours.insert(target.to_string(), behaviour);
        self
    }

    pub fn with_experiment_pod(self, name: &str, pod: ExperimentPod) -> Self {
        self.state().experiment_pods.insert(name.to_string(), pod);
        self
    }

    /// The next `count` list calls fail.
    pub fn fail_next_lists(&self, count: usize) {
        self.state().list_failures = count;
    }

    pub fn events(&self) -> Vec<ClusterEvent> {
        self.state().events.clone()
    }

    pub fn created(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ClusterEvent::Created { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Targets of accepted creations, in creation order.
    pub fn created_targets(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ClusterEvent::Created { target, .. } => Some(target),
                _ => None,
            })
            .collect()
    }

    pub fn deletions(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ClusterEvent::Deleted { selector, .. } => Some(selector),
                _ => None,
            })
            .collect()
    }

    pub fn live_agents(&self) -> Vec<String> {
        self.state().agents.keys().cloned().collect()
    }

    /// Highest number of helper agents alive at the same time.
    pub fn peak_live(&self) -> usize {
        self.state().peak_live
    }
}

#[async_trait]
impl Platform for SimulatedCluster {
    async fn create_agent(&self, spec: &HelperLaunchSpec) -> Result<AgentHandle> {
        let mut state = self.lock()?;
        let behaviour = state
            .behaviours
            .get(&spec.target)
            .cloned()
            .unwrap_or_default();

        if let Some(reason) = &behaviour.reject {
            state.events.push(ClusterEvent::CreateRejected {
                name: spec.name.clone(),
                target: spec.target.clone(),
            });
            return Err(anyhow!("{}", reason));
        }
        if state.agents.contains_key(&spec.name) {
            return Err(anyhow!("helper {} already exists", spec.name));
        }

        let run_for = behaviour.run_secs.unwrap_or_else(|| {
            spec.env_value("TOTAL_CHAOS_DURATION")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0)
        });

        state.agents.insert(
            spec.name.clone(),
            SimAgent {
                namespace: spec.namespace.clone(),
                labels: spec.labels.clone(),
                node_name: spec.node_name.clone(),
                created_at: Instant::now(),
                run_for: Duration::from_secs(run_for),
                behaviour,
            },
        );
        state.events.push(ClusterEvent::Created {
            name: spec.name.clone(),
            target: spec.target.clone(),
        });
        state.peak_live = state.peak_live.max(state.agents.len());

        Ok(AgentHandle {
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
        })
    }

    async fn get_agents_by_label(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<AgentStatus>> {
        let mut state = self.lock()?;
        state.events.push(ClusterEvent::Listed {
            selector: selector.to_string(),
        });
        if state.list_failures > 0 {
            state.list_failures -= 1;
            return Err(anyhow!("simulated list failure"));
        }

        let now = Instant::now();
        Ok(state
            .agents
            .iter()
            .filter(|(_, a)| a.namespace == namespace && selector.matches(&a.labels))
            .map(|(name, a)| AgentStatus {
                name: name.clone(),
                phase: a.behaviour.phase_at(now - a.created_at, a.run_for),
                node_name: a.node_name.clone(),
            })
            .collect())
    }

    async fn delete_agents_by_label(&self, namespace: &str, selector: &Selector) -> Result<()> {
        let mut state = self.lock()?;
        let before = state.agents.len();
        state.agents.retain(|_, a| {
            a.namespace != namespace || !selector.matches(&a.labels) || a.behaviour.undeletable
        });
        let removed = before - state.agents.len();
        state.events.push(ClusterEvent::Deleted {
            selector: selector.to_string(),
            removed,
        });
        Ok(())
    }
}

#[async_trait]
impl TargetResolver for SimulatedCluster {
    async fn resolve_targets(&self, spec: &TargetSpec) -> Result<Vec<TargetInstance>> {
        let state = self.lock()?;
        let in_namespace = state.pods.iter().filter(|p| p.namespace == spec.namespace);

        if !spec.names.is_empty() {
            return spec
                .names
                .iter()
                .map(|name| {
                    in_namespace
                        .clone()
                        .find(|p| &p.name == name)
                        .cloned()
                        .ok_or_else(|| {
                            anyhow!("pod {} not found in namespace {}", name, spec.namespace)
                        })
                })
                .collect();
        }

        let selector = spec
            .label
            .as_ref()
            .ok_or_else(|| anyhow!("neither target names nor a label were given"))?;
        let matching: Vec<TargetInstance> = in_namespace
            .filter(|p| selector.matches(&p.labels))
            .cloned()
            .collect();
        if matching.is_empty() {
            return Err(anyhow!(
                "no pods with label {} in namespace {}",
                selector,
                spec.namespace
            ));
        }

        let count = affected_count(spec.affected_percent, matching.len());
        Ok(matching.into_iter().take(count).collect())
    }
}

#[async_trait]
impl DerivedConfigSource for SimulatedCluster {
    async fn service_account(&self, pod: &str, namespace: &str) -> Result<String> {
        let state = self.lock()?;
        state
            .experiment_pods
            .get(pod)
            .filter(|p| p.namespace == namespace)
            .map(|p| p.service_account.clone())
            .ok_or_else(|| anyhow!("experiment pod {} not found in {}", pod, namespace))
    }

    async fn resolve_derived_config(
        &self,
        pod: &str,
        namespace: &str,
        _container: &str,
    ) -> Result<DerivedConfig> {
        let state = self.lock()?;
        state
            .experiment_pods
            .get(pod)
            .filter(|p| p.namespace == namespace)
            .map(|p| p.derived.clone())
            .ok_or_else(|| anyhow!("experiment pod {} not found in {}", pod, namespace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EnvSource, EnvVar, HelperContainer, RestartPolicy, SecurityContext};

    fn launch_spec(name: &str, target: &str, batch: &str) -> HelperLaunchSpec {
        let mut labels = BTreeMap::new();
        labels.insert("name".to_string(), name.to_string());
        labels.insert("app".to_string(), batch.to_string());
        HelperLaunchSpec {
            name: name.to_string(),
            namespace: "litmus".to_string(),
            labels,
            annotations: BTreeMap::new(),
            target: target.to_string(),
            node_name: "node-1".to_string(),
            host_pid: true,
            host_ipc: true,
            host_network: true,
            termination_grace_period_secs: 0,
            restart_policy: RestartPolicy::Never,
            service_account: String::new(),
            image_pull_secrets: vec![],
            volumes: vec![],
            container: HelperContainer {
                name: "stress".to_string(),
                image: "runner".to_string(),
                image_pull_policy: "Always".to_string(),
                command: vec![],
                args: vec![],
                resources: Default::default(),
                env: vec![EnvVar {
                    name: "TOTAL_CHAOS_DURATION".to_string(),
                    source: EnvSource::Value("10".to_string()),
                }],
                volume_mounts: vec![],
                security_context: SecurityContext {
                    privileged: true,
                    run_as_user: 0,
                    capabilities: vec![],
                },
            },
        }
    }

    fn cluster() -> SimulatedCluster {
        SimulatedCluster::new()
            .with_pod(TargetInstance::new("web-0", "shop", "node-1").with_label("app", "web"))
            .with_pod(TargetInstance::new("web-1", "shop", "node-2").with_label("app", "web"))
            .with_pod(TargetInstance::new("db-0", "shop", "node-1").with_label("app", "db"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_follows_clock() {
        let cluster = SimulatedCluster::new();
        cluster
            .create_agent(&launch_spec("h-1", "web-0", "b"))
            .await
            .unwrap();
        let selector = Selector::parse("name=h-1").unwrap();

        let agents = cluster.get_agents_by_label("litmus", &selector).await.unwrap();
        assert_eq!(agents[0].phase, AgentPhase::Running);

        tokio::time::advance(Duration::from_secs(10)).await;
        let agents = cluster.get_agents_by_label("litmus", &selector).await.unwrap();
        assert_eq!(agents[0].phase, AgentPhase::Succeeded);
    }

    #[tokio::test]
    async fn test_rejected_creation() {
        let cluster =
            SimulatedCluster::new().with_behaviour("web-0", HelperBehaviour::rejected("quota"));
        let err = cluster
            .create_agent(&launch_spec("h-1", "web-0", "b"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("quota"));
        assert!(cluster.live_agents().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let cluster = SimulatedCluster::new();
        cluster.create_agent(&launch_spec("h-1", "a", "b")).await.unwrap();
        assert!(cluster.create_agent(&launch_spec("h-1", "c", "b")).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_by_batch_label_is_idempotent() {
        let cluster = SimulatedCluster::new();
        cluster.create_agent(&launch_spec("h-1", "a", "batch")).await.unwrap();
        cluster.create_agent(&launch_spec("h-2", "b", "batch")).await.unwrap();
        assert_eq!(cluster.peak_live(), 2);

        let selector = Selector::parse("app=batch").unwrap();
        cluster.delete_agents_by_label("litmus", &selector).await.unwrap();
        cluster.delete_agents_by_label("litmus", &selector).await.unwrap();

        assert!(cluster.live_agents().is_empty());
        assert_eq!(
            cluster.events().last(),
            Some(&ClusterEvent::Deleted {
                selector: "app=batch".to_string(),
                removed: 0
            })
        );
    }

    #[tokio::test]
    async fn test_resolve_by_names() {
        let spec = TargetSpec {
            namespace: "shop".to_string(),
            names: vec!["db-0".to_string(), "web-1".to_string()],
            ..Default::default()
        };
        let targets = cluster().resolve_targets(&spec).await.unwrap();
        let names: Vec<_> = targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["db-0", "web-1"]);
    }

    #[tokio::test]
    async fn test_resolve_missing_name() {
        let spec = TargetSpec {
            namespace: "shop".to_string(),
            names: vec!["ghost".to_string()],
            ..Default::default()
        };
        assert!(cluster().resolve_targets(&spec).await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_by_label_and_percentage() {
        let spec = TargetSpec {
            namespace: "shop".to_string(),
            label: Selector::parse("app=web"),
            affected_percent: 0,
            ..Default::default()
        };
        assert_eq!(cluster().resolve_targets(&spec).await.unwrap().len(), 1);

        let spec = TargetSpec {
            affected_percent: 100,
            ..spec
        };
        assert_eq!(cluster().resolve_targets(&spec).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_transient_list_failure() {
        let cluster = SimulatedCluster::new();
        cluster.fail_next_lists(1);
        let selector = Selector::parse("app=x").unwrap();
        assert!(cluster.get_agents_by_label("litmus", &selector).await.is_err());
        assert!(cluster.get_agents_by_label("litmus", &selector).await.is_ok());
    }

    #[tokio::test]
    async fn test_setup_survives_poisoned_lock() {
        let cluster = SimulatedCluster::new();
        let shared = cluster.clone();
        let poisoned = std::thread::spawn(move || {
            let _guard = shared.state.lock().unwrap();
            panic!("poison the lock");
        })
        .join();
        assert!(poisoned.is_err());

        let cluster = cluster
            .with_pod(TargetInstance::new("web-0", "shop", "node-1"))
            .with_behaviour("web-0", HelperBehaviour::hangs());

        let state = cluster.state();
        assert_eq!(state.pods.len(), 1);
        assert!(state.behaviours["web-0"].hang);
        drop(state);
        assert!(cluster.events().is_empty());
    }

    #[test]
    fn test_manifest_from_yaml() {
        let manifest: ClusterManifest = serde_yaml::from_str(
            r#"
pods:
  - name: web-0
    namespace: shop
    node_name: node-1
    containers: [nginx]
behaviours:
  web-0:
    final_phase: Failed
    run_secs: 5
"#,
        )
        .unwrap();
        assert_eq!(manifest.pods.len(), 1);
        assert_eq!(manifest.behaviours["web-0"].final_phase, AgentPhase::Failed);
        assert_eq!(manifest.behaviours["web-0"].run_secs, Some(5));
    }
}
