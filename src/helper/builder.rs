use std::collections::BTreeMap;

use super::env::EnvBuilder;
use crate::config::ExperimentConfig;
use crate::types::selector::{helper_name, AGENT_LABEL, BATCH_LABEL};
use crate::types::{
    EnvVar, HelperContainer, HelperLaunchSpec, HostPathVolume, LabelSuffix, RestartPolicy, RunId,
    SecurityContext, TargetInstance, VolumeMount,
};

/// Capabilities the stress mechanism needs on the host.
pub const HELPER_CAPABILITIES: [&str; 5] = ["SYS_PTRACE", "SYS_ADMIN", "MKNOD", "SYS_CHROOT", "KILL"];

const HELPER_COMMAND: &str = "/bin/bash";
const HELPER_ARGS: &str = "./helpers -name stress-chaos";
const PART_OF: &str = "litmus";
const SOCKET_VOLUME: &str = "socket-path";
const SYS_VOLUME: &str = "sys-path";
const SYS_PATH: &str = "/sys";

/// Launch spec for one helper agent pinned to the target's node.
///
/// Pure: the config must already carry its derived fields (service account,
/// target container, annotations, resources, pull secrets).
pub fn build_helper_spec(
    config: &ExperimentConfig,
    target: &TargetInstance,
    run_id: &RunId,
    label_suffix: &LabelSuffix,
) -> HelperLaunchSpec {
    let name = helper_name(&config.experiment_name, run_id.as_str());

    let mut labels = BTreeMap::new();
    labels.insert(
        BATCH_LABEL.to_string(),
        helper_name(&config.experiment_name, label_suffix.as_str()),
    );
    labels.insert(AGENT_LABEL.to_string(), name.clone());
    labels.insert("chaosUID".to_string(), config.chaos_uid.clone());
    labels.insert("app.kubernetes.io/part-of".to_string(), PART_OF.to_string());

    HelperLaunchSpec {
        name,
        namespace: config.chaos_namespace.clone(),
        labels,
        annotations: config.annotations.clone(),
        target: target.name.clone(),
        node_name: target.node_name.clone(),
        host_pid: true,
        host_ipc: true,
        host_network: true,
        termination_grace_period_secs: config.termination_grace_period_secs,
        restart_policy: RestartPolicy::Never,
        service_account: config.service_account.clone(),
        image_pull_secrets: config.image_pull_secrets.clone(),
        volumes: vec![
            HostPathVolume {
                name: SOCKET_VOLUME.to_string(),
                host_path: config.socket_path.clone(),
            },
            HostPathVolume {
                name: SYS_VOLUME.to_string(),
                host_path: SYS_PATH.to_string(),
            },
        ],
        container: HelperContainer {
            name: config.experiment_name.clone(),
            image: config.lib_image.clone(),
            image_pull_policy: config.lib_image_pull_policy.clone(),
            command: vec![HELPER_COMMAND.to_string()],
            args: vec!["-c".to_string(), HELPER_ARGS.to_string()],
            resources: config.resources.clone(),
            env: helper_env(config, target),
            volume_mounts: vec![
                VolumeMount {
                    name: SOCKET_VOLUME.to_string(),
                    mount_path: config.socket_path.clone(),
                },
                VolumeMount {
                    name: SYS_VOLUME.to_string(),
                    mount_path: SYS_PATH.to_string(),
                },
            ],
            security_context: SecurityContext {
                privileged: true,
                run_as_user: 0,
                capabilities: HELPER_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
            },
        },
    }
}

fn helper_env(config: &ExperimentConfig, target: &TargetInstance) -> Vec<EnvVar> {
    let tunables = &config.tunables;

    EnvBuilder::new()
        .set("APP_NS", &target.namespace)
        .set("APP_POD", &target.name)
        .set("APP_CONTAINER", &config.target_container)
        .set("TOTAL_CHAOS_DURATION", config.chaos_duration_secs)
        .set("CHAOS_NAMESPACE", &config.chaos_namespace)
        .set("CHAOS_ENGINE", &config.engine_name)
        .set("CHAOS_UID", &config.chaos_uid)
        .set("CONTAINER_RUNTIME", &config.container_runtime)
        .set("EXPERIMENT_NAME", &config.experiment_name)
        .set("SOCKET_PATH", &config.socket_path)
        .set("CPU_CORES", tunables.cpu_cores)
        .set(
            "FILESYSTEM_UTILIZATION_PERCENTAGE",
            tunables.filesystem_utilization_percentage,
        )
        .set(
            "FILESYSTEM_UTILIZATION_BYTES",
            tunables.filesystem_utilization_bytes,
        )
        .set("NUMBER_OF_WORKERS", tunables.number_of_workers)
        .set("MEMORY_CONSUMPTION", tunables.memory_consumption)
        .set("VOLUME_MOUNT_PATH", &tunables.volume_mount_path)
        .set_field_ref("POD_NAME", "v1", "metadata.name")
        .build()
}
