use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete request to start one helper agent for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperLaunchSpec {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub target: String,

    // Placement and host namespaces
    pub node_name: String,
    pub host_pid: bool,
    pub host_ipc: bool,
    pub host_network: bool,

    pub termination_grace_period_secs: u64,
    pub restart_policy: RestartPolicy,
    pub service_account: String,
    pub image_pull_secrets: Vec<String>,
    pub volumes: Vec<HostPathVolume>,
    pub container: HelperContainer,
}

impl HelperLaunchSpec {
    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.container
            .env
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| match &e.source {
                EnvSource::Value(v) => Some(v.as_str()),
                EnvSource::FieldRef { .. } => None,
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicy {
    Never,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperContainer {
    pub name: String,
    pub image: String,
    pub image_pull_policy: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub resources: ResourceRequirements,
    pub env: Vec<EnvVar>,
    pub volume_mounts: Vec<VolumeMount>,
    pub security_context: SecurityContext,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub source: EnvSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvSource {
    Value(String),
    /// Filled in by the platform when the agent starts.
    FieldRef {
        api_version: String,
        field_path: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPathVolume {
    pub name: String,
    pub host_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    pub privileged: bool,
    pub run_as_user: i64,
    pub capabilities: Vec<String>,
}
