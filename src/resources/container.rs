//! Building blocks for container specifications.

use k8s_openapi::api::core::v1::{
    Capabilities, ContainerPort, EnvVar, EnvVarSource, ExecAction, ObjectFieldSelector, Probe,
    SecretKeySelector, SecurityContext, VolumeMount,
};

/// User the Ironic containers run as.
pub const IRONIC_USER: i64 = 997;
/// Group the Ironic containers run as.
pub const IRONIC_GROUP: i64 = 994;
/// User and group of the keepalived container.
pub const KEEPALIVED_USER: i64 = 65532;
/// User and group of the MariaDB container.
pub const MARIADB_USER: i64 = 27;

/// Ironic restarts are expensive (the local database is wiped), so probes
/// are patient.
const PROBE_INITIAL_DELAY_SECONDS: i32 = 1;
const PROBE_TIMEOUT_SECONDS: i32 = 5;
const PROBE_FAILURE_THRESHOLD: i32 = 12;

/// Plain environment variable.
pub fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        value_from: None,
    }
}

/// Environment variable read from a Secret key.
pub fn env_from_secret(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                optional: None,
            }),
            ..Default::default()
        }),
    }
}

/// Environment variable from the downward API.
pub fn env_from_field(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                api_version: None,
            }),
            ..Default::default()
        }),
    }
}

/// TCP port exposed on the host (the Ironic pod uses host networking).
pub fn host_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        host_port: Some(port),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

/// UDP port exposed on the host.
pub fn host_port_udp(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        protocol: Some("UDP".to_string()),
        ..host_port(name, port)
    }
}

/// Exec probe running a shell command.
pub fn exec_probe(command: Vec<String>) -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(command),
        }),
        initial_delay_seconds: Some(PROBE_INITIAL_DELAY_SECONDS),
        timeout_seconds: Some(PROBE_TIMEOUT_SECONDS),
        failure_threshold: Some(PROBE_FAILURE_THRESHOLD),
        ..Default::default()
    }
}

/// Probe fetching a local URL with curl.
pub fn http_probe(https: bool, port: i32, path: &str) -> Probe {
    let scheme = if https { "https" } else { "http" };
    exec_probe(vec![
        "curl".to_string(),
        "-sSfk".to_string(),
        format!("{}://127.0.0.1:{}{}", scheme, port, path),
    ])
}

/// Probe checking that the given UDP ports are listening.
pub fn udp_ports_probe(ports: &[i32]) -> Probe {
    let checks = ports
        .iter()
        .map(|port| format!("ss -lun | grep -q ':{} '", port))
        .collect::<Vec<_>>()
        .join(" && ");
    exec_probe(vec!["sh".to_string(), "-c".to_string(), checks])
}

/// Security context dropping all capabilities except `add`.
pub fn security_context(user: i64, group: i64, add: &[&str]) -> SecurityContext {
    SecurityContext {
        run_as_user: Some(user),
        run_as_group: Some(group),
        allow_privilege_escalation: Some(false),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            add: if add.is_empty() {
                None
            } else {
                Some(add.iter().map(|c| c.to_string()).collect())
            },
        }),
        ..Default::default()
    }
}

/// Volume mount.
pub fn mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}
