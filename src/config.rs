use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ChaosError;
use crate::types::{CleanupPolicy, ResourceRequirements, Selector, SequenceMode, TargetSpec};

/// Experiment-specific knobs handed to the helper agent untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressTunables {
    pub cpu_cores: u32,
    pub filesystem_utilization_percentage: u32,
    pub filesystem_utilization_bytes: u64,
    pub number_of_workers: u32,
    pub memory_consumption: u64,
    pub volume_mount_path: String,
}

impl Default for StressTunables {
    fn default() -> Self {
        Self {
            cpu_cores: 1,
            filesystem_utilization_percentage: 0,
            filesystem_utilization_bytes: 0,
            number_of_workers: 1,
            memory_consumption: 500,
            volume_mount_path: String::new(),
        }
    }
}

/// Per-run configuration. Read-only once the derived fields are filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub experiment_name: String,
    pub engine_name: String,
    pub chaos_duration_secs: u64,
    pub ramp_time_secs: u64,

    // Target selection
    pub app_ns: String,
    pub app_label: String,
    pub target_pods: String,
    pub pods_affected_perc: u32,
    pub sequence: String,

    // Identity of this run
    pub chaos_uid: String,
    pub chaos_namespace: String,
    pub chaos_pod_name: String,

    pub timeout_secs: u64,
    pub delay_secs: u64,

    // Helper agent template
    pub lib_image: String,
    pub lib_image_pull_policy: String,
    pub socket_path: String,
    pub container_runtime: String,
    pub termination_grace_period_secs: u64,
    pub cleanup_policy: CleanupPolicy,
    pub tunables: StressTunables,

    // Derived lazily, once per run
    pub service_account: String,
    pub target_container: String,
    pub annotations: BTreeMap<String, String>,
    pub resources: ResourceRequirements,
    pub image_pull_secrets: Vec<String>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            experiment_name: "stress-chaos".to_string(),
            engine_name: String::new(),
            chaos_duration_secs: 60,
            ramp_time_secs: 0,
            app_ns: "default".to_string(),
            app_label: String::new(),
            target_pods: String::new(),
            pods_affected_perc: 0,
            sequence: SequenceMode::Parallel.as_str().to_string(),
            chaos_uid: String::new(),
            chaos_namespace: "default".to_string(),
            chaos_pod_name: String::new(),
            timeout_secs: 180,
            delay_secs: 2,
            lib_image: "litmuschaos/go-runner:latest".to_string(),
            lib_image_pull_policy: "Always".to_string(),
            socket_path: "/var/run/docker.sock".to_string(),
            container_runtime: "docker".to_string(),
            termination_grace_period_secs: 0,
            cleanup_policy: CleanupPolicy::Delete,
            tunables: StressTunables::default(),
            service_account: String::new(),
            target_container: String::new(),
            annotations: BTreeMap::new(),
            resources: ResourceRequirements::default(),
            image_pull_secrets: Vec::new(),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl ExperimentConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let t = StressTunables::default();

        Self {
            experiment_name: env_string("EXPERIMENT_NAME", &d.experiment_name),
            engine_name: env_string("CHAOSENGINE", &d.engine_name),
            chaos_duration_secs: env_parse("TOTAL_CHAOS_DURATION", d.chaos_duration_secs),
            ramp_time_secs: env_parse("RAMP_TIME", d.ramp_time_secs),
            app_ns: env_string("APP_NAMESPACE", &d.app_ns),
            app_label: env_string("APP_LABEL", &d.app_label),
            target_pods: env_string("TARGET_PODS", &d.target_pods),
            pods_affected_perc: env_parse("PODS_AFFECTED_PERC", d.pods_affected_perc),
            sequence: env_string("SEQUENCE", &d.sequence),
            chaos_uid: env_string("CHAOS_UID", &d.chaos_uid),
            chaos_namespace: env_string("CHAOS_NAMESPACE", &d.chaos_namespace),
            chaos_pod_name: env_string("POD_NAME", &d.chaos_pod_name),
            timeout_secs: env_parse("STATUS_CHECK_TIMEOUT", d.timeout_secs),
            delay_secs: env_parse("STATUS_CHECK_DELAY", d.delay_secs),
            lib_image: env_string("LIB_IMAGE", &d.lib_image),
            lib_image_pull_policy: env_string("LIB_IMAGE_PULL_POLICY", &d.lib_image_pull_policy),
            socket_path: env_string("SOCKET_PATH", &d.socket_path),
            container_runtime: env_string("CONTAINER_RUNTIME", &d.container_runtime),
            termination_grace_period_secs: env_parse(
                "TERMINATION_GRACE_PERIOD_SECONDS",
                d.termination_grace_period_secs,
            ),
            cleanup_policy: CleanupPolicy::parse(&env_string("JOB_CLEANUP_POLICY", "delete")),
            tunables: StressTunables {
                cpu_cores: env_parse("CPU_CORES", t.cpu_cores),
                filesystem_utilization_percentage: env_parse(
                    "FILESYSTEM_UTILIZATION_PERCENTAGE",
                    t.filesystem_utilization_percentage,
                ),
                filesystem_utilization_bytes: env_parse(
                    "FILESYSTEM_UTILIZATION_BYTES",
                    t.filesystem_utilization_bytes,
                ),
                number_of_workers: env_parse("NUMBER_OF_WORKERS", t.number_of_workers),
                memory_consumption: env_parse("MEMORY_CONSUMPTION", t.memory_consumption),
                volume_mount_path: env_string("VOLUME_MOUNT_PATH", &t.volume_mount_path),
            },
            service_account: env_string("CHAOS_SERVICE_ACCOUNT", &d.service_account),
            target_container: env_string("TARGET_CONTAINER", &d.target_container),
            annotations: BTreeMap::new(),
            resources: ResourceRequirements::default(),
            image_pull_secrets: Vec::new(),
        }
    }

    /// Loads a YAML, TOML or JSON file, picked by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading experiment config {}", path.display()))?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let config: Self = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&raw)?,
            "toml" => toml::from_str(&raw)?,
            "json" => serde_json::from_str(&raw)?,
            other => return Err(anyhow!("unsupported config format: {:?}", other)),
        };
        Ok(config)
    }

    /// Checks the run can start and returns the parsed sequence mode,
    /// target selection included.
    pub fn validate(&self) -> Result<SequenceMode, ChaosError> {
        let mode = self.validate_settings()?;
        if self.target_pods.trim().is_empty() && self.app_label.trim().is_empty() {
            return Err(ChaosError::Config(
                "please provide one of the app label or target pods".to_string(),
            ));
        }
        if !self.app_label.trim().is_empty() && Selector::parse(&self.app_label).is_none() {
            return Err(ChaosError::Config(format!(
                "app label {:?} is not of the form key=value",
                self.app_label
            )));
        }
        Ok(mode)
    }

    /// Checks everything except target selection and returns the sequence mode.
    pub fn validate_settings(&self) -> Result<SequenceMode, ChaosError> {
        if self.experiment_name.trim().is_empty() {
            return Err(ChaosError::Config("experiment name is empty".to_string()));
        }
        if self.chaos_namespace.trim().is_empty() {
            return Err(ChaosError::Config("chaos namespace is empty".to_string()));
        }
        if self.delay_secs == 0 {
            return Err(ChaosError::Config("status check delay must be non-zero".to_string()));
        }
        self.sequence.parse()
    }

    pub fn target_spec(&self) -> TargetSpec {
        TargetSpec {
            namespace: self.app_ns.clone(),
            names: TargetSpec::parse_names(&self.target_pods),
            label: Selector::parse(&self.app_label),
            affected_percent: self.pods_affected_perc,
        }
    }

    pub fn chaos_duration(&self) -> Duration {
        Duration::from_secs(self.chaos_duration_secs)
    }

    pub fn ramp_time(&self) -> Duration {
        Duration::from_secs(self.ramp_time_secs)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    /// Upper bound for a helper to finish: chaos duration plus the status timeout.
    pub fn completion_budget(&self) -> Duration {
        self.chaos_duration().saturating_add(self.status_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> ExperimentConfig {
        ExperimentConfig {
            target_pods: "nginx-0".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = ExperimentConfig::default();
        assert_eq!(config.chaos_duration_secs, 60);
        assert_eq!(config.timeout_secs, 180);
        assert_eq!(config.delay_secs, 2);
        assert_eq!(config.sequence, "parallel");
        assert_eq!(config.cleanup_policy, CleanupPolicy::Delete);
    }

    #[test]
    fn test_completion_budget() {
        let config = ExperimentConfig {
            chaos_duration_secs: 30,
            timeout_secs: 90,
            ..Default::default()
        };
        assert_eq!(config.completion_budget(), Duration::from_secs(120));
    }

    #[test]
    fn test_completion_budget_saturates() {
        let config = ExperimentConfig {
            chaos_duration_secs: u64::MAX,
            timeout_secs: 60,
            ..Default::default()
        };
        assert_eq!(config.completion_budget(), Duration::MAX);
    }

    #[test]
    fn test_validate_requires_target_selection() {
        let config = ExperimentConfig::default();
        assert!(matches!(config.validate(), Err(ChaosError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_sequence() {
        let config = ExperimentConfig {
            sequence: "invalid".to_string(),
            ..valid_config()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invalid sequence is not supported"));
    }

    #[test]
    fn test_validate_rejects_malformed_label() {
        let config = ExperimentConfig {
            target_pods: String::new(),
            app_label: "nginx".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ChaosError::Config(_))));
    }

    #[test]
    fn test_validate_returns_mode() {
        let config = ExperimentConfig {
            sequence: "SERIAL".to_string(),
            ..valid_config()
        };
        assert_eq!(config.validate().unwrap(), SequenceMode::Serial);
    }

    #[test]
    fn test_target_spec_from_config() {
        let config = ExperimentConfig {
            app_ns: "shop".to_string(),
            target_pods: "a,b".to_string(),
            app_label: "app=cart".to_string(),
            pods_affected_perc: 50,
            ..Default::default()
        };
        let spec = config.target_spec();
        assert_eq!(spec.namespace, "shop");
        assert_eq!(spec.names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(spec.label.unwrap().to_string(), "app=cart");
        assert_eq!(spec.affected_percent, 50);
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("TOTAL_CHAOS_DURATION", "45");
        std::env::set_var("SEQUENCE", "serial");
        std::env::set_var("JOB_CLEANUP_POLICY", "retain");
        std::env::set_var("CPU_CORES", "not-a-number");

        let config = ExperimentConfig::from_env();

        assert_eq!(config.chaos_duration_secs, 45);
        assert_eq!(config.sequence, "serial");
        assert_eq!(config.cleanup_policy, CleanupPolicy::Retain);
        assert_eq!(config.tunables.cpu_cores, 1);

        std::env::remove_var("TOTAL_CHAOS_DURATION");
        std::env::remove_var("SEQUENCE");
        std::env::remove_var("JOB_CLEANUP_POLICY");
        std::env::remove_var("CPU_CORES");
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "experiment_name: pod-memory-hog\nchaos_duration_secs: 30\ntarget_pods: web-0\ncleanup_policy: retain\ntunables:\n  memory_consumption: 1024\n"
        )
        .unwrap();

        let config = ExperimentConfig::from_file(file.path()).unwrap();
        assert_eq!(config.experiment_name, "pod-memory-hog");
        assert_eq!(config.chaos_duration_secs, 30);
        assert_eq!(config.cleanup_policy, CleanupPolicy::Retain);
        assert_eq!(config.tunables.memory_consumption, 1024);
        assert_eq!(config.tunables.number_of_workers, 1);
        assert_eq!(config.timeout_secs, 180);
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "experiment_name = \"pod-cpu-hog\"\nsequence = \"serial\"").unwrap();

        let config = ExperimentConfig::from_file(file.path()).unwrap();
        assert_eq!(config.experiment_name, "pod-cpu-hog");
        assert_eq!(config.sequence, "serial");
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(
            file,
            r#"{{"experiment_name": "pod-memory-hog", "timeout_secs": 90, "tunables": {{"memory_consumption": 1024}}}}"#
        )
        .unwrap();

        let config = ExperimentConfig::from_file(file.path()).unwrap();
        assert_eq!(config.experiment_name, "pod-memory-hog");
        assert_eq!(config.timeout_secs, 90);
        assert_eq!(config.tunables.memory_consumption, 1024);
        assert_eq!(config.tunables.cpu_cores, 1);
        assert_eq!(config.sequence, "parallel");
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(ExperimentConfig::from_file(file.path()).is_err());
    }
}
