//! Pod template of the Ironic service.
//!
//! A pure function of the record, the resolved version and the secrets it
//! references. The same inputs always produce the same template: container,
//! env var and volume lists are built in a fixed order.
//!
//! ## Containers
//!
//! | Container | When | Purpose |
//! |-----------|------|---------|
//! | ramdisk-downloader (init) | unless `disableDownloader` | fetch the agent ramdisk |
//! | ironic | always | API and conductor |
//! | httpd | always | image server, TLS termination |
//! | ramdisk-logs | always | tail ramdisk logs |
//! | dnsmasq | DHCP configured, not HA | DHCP/TFTP/DNS |
//! | keepalived | `ipAddressManager: keepalived` | floating provisioning IP |
//! | ironic-prometheus-exporter | exporter enabled | BMC sensor metrics |

use std::collections::BTreeMap;

use ipnet::IpNet;
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EmptyDirVolumeSource, EnvVar, KeyToPath, PodSpec,
    PodTemplateSpec, Secret, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::controller::secrets::KEY_HTPASSWD;
use crate::controller::version_info::VersionInfo;
use crate::crd::{
    CaKind, CaReference, DEFAULT_SENSOR_COLLECTION_INTERVAL, Dhcp, Ironic, IronicDatabase,
    non_empty, set_dhcp_defaults,
};
use crate::resources::common::{
    DATABASE_PORT, LABEL_OWNER, database_credentials_secret_name, database_service_dns_name,
    ironic_deployment_name, standard_labels,
};
use crate::resources::container::{
    IRONIC_GROUP, IRONIC_USER, KEEPALIVED_USER, env, env_from_field, env_from_secret, host_port,
    host_port_udp, http_probe, mount, security_context, udp_ports_probe,
};

/// Port of the Prometheus exporter sidecar.
pub const EXPORTER_PORT: i32 = 9608;

/// Annotation recording the resourceVersion of the API credentials.
pub const ANNOTATION_API_SECRET_VERSION: &str = "ironic.metal3.io/api-secret-version";
/// Annotation recording the resourceVersion of the TLS Secret.
pub const ANNOTATION_TLS_SECRET_VERSION: &str = "ironic.metal3.io/tls-secret-version";

const VOLUME_SHARED: &str = "ironic-shared";
const VOLUME_CERT_IRONIC: &str = "cert-ironic";
const VOLUME_AUTH: &str = "ironic-auth";
const VOLUME_CERT_MARIADB: &str = "cert-mariadb";
const VOLUME_BMC_CA: &str = "cert-bmc-ca";
const VOLUME_TRUSTED_CA: &str = "cert-trusted-ca";

const PATH_SHARED: &str = "/shared";
const PATH_CERT_IRONIC: &str = "/certs/ironic";
const PATH_CERT_VMEDIA: &str = "/certs/vmedia";
const PATH_AUTH: &str = "/auth/ironic";
const PATH_CERT_MARIADB: &str = "/certs/mariadb";
const PATH_BMC_CA: &str = "/certs/ca/bmc";
const PATH_TRUSTED_CA: &str = "/certs/ca/trusted";

/// Resolved database connection of an Ironic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConnection {
    /// Host and port.
    pub host: String,
    /// Database name.
    pub name: String,
    /// Secret with username and password.
    pub credentials_name: String,
    /// TLS Secret of a managed database.
    pub tls_secret_name: Option<String>,
}

/// Work out how Ironic reaches its database. `managed` is the referenced
/// IronicDatabase, if any. Returns `None` when no database is configured
/// or the managed one is missing.
pub fn database_connection(
    ironic: &Ironic,
    managed: Option<&IronicDatabase>,
    cluster_domain: &str,
) -> Option<DatabaseConnection> {
    let db = ironic.spec.database.as_ref()?;
    let name = db.database_name().to_string();

    if let Some(host) = non_empty(&db.host) {
        return Some(DatabaseConnection {
            host: host.to_string(),
            name,
            credentials_name: non_empty(&db.credentials_name)?.to_string(),
            tls_secret_name: None,
        });
    }

    let managed = managed?;
    let namespace = managed.namespace().unwrap_or_default();
    let credentials_name = non_empty(&db.credentials_name)
        .map(str::to_string)
        .or_else(|| {
            managed
                .status
                .as_ref()
                .and_then(|s| non_empty(&s.credentials_name))
                .map(str::to_string)
        })
        .or_else(|| managed.spec.credentials_name().map(str::to_string))
        .unwrap_or_else(|| database_credentials_secret_name(managed));

    Some(DatabaseConnection {
        host: format!(
            "{}:{}",
            database_service_dns_name(&managed.name_any(), &namespace, cluster_domain),
            DATABASE_PORT
        ),
        name,
        credentials_name,
        tls_secret_name: managed.spec.tls_certificate_name().map(str::to_string),
    })
}

/// Everything the composer needs besides the record itself.
#[derive(Clone, Copy)]
pub struct IronicInputs<'a> {
    pub ironic: &'a Ironic,
    pub version: &'a VersionInfo,
    pub api_secret: &'a Secret,
    pub tls_secret: Option<&'a Secret>,
    pub database: Option<&'a DatabaseConnection>,
}

impl IronicInputs<'_> {
    fn tls(&self) -> bool {
        self.ironic.spec.tls.enabled()
    }

    fn vmedia_tls(&self) -> bool {
        self.ironic.spec.tls.virtual_media_tls()
    }

    fn high_availability(&self) -> bool {
        self.ironic.spec.high_availability
    }

    fn exporter_enabled(&self) -> bool {
        self.ironic
            .spec
            .prometheus_exporter
            .as_ref()
            .is_some_and(|p| p.enabled)
    }

    /// DHCP block with defaults applied, unless dnsmasq is not deployed.
    fn dhcp(&self) -> Option<Dhcp> {
        if self.high_availability() {
            return None;
        }
        let mut dhcp = self.ironic.spec.networking.dhcp.clone()?;
        set_dhcp_defaults(&mut dhcp);
        Some(dhcp)
    }

    fn api_secret_name(&self) -> String {
        self.api_secret.name_any()
    }
}

/// Variables shared by every Ironic-related container.
fn common_env(inputs: &IronicInputs) -> Vec<EnvVar> {
    let spec = &inputs.ironic.spec;
    let networking = &spec.networking;

    let mut vars = vec![
        env("IRONIC_LISTEN_PORT", networking.api_port.to_string()),
        env("HTTP_PORT", networking.image_server_port.to_string()),
        env(
            "LISTEN_ALL_INTERFACES",
            (!networking.bind_interface).to_string(),
        ),
        env("USE_IRONIC_INSPECTOR", "false"),
    ];

    let mut has_identity = false;
    if let Some(ip) = networking.ip_address() {
        vars.push(env("PROVISIONING_IP", ip));
        has_identity = true;
    }
    if let Some(interface) = networking.interface() {
        vars.push(env("PROVISIONING_INTERFACE", interface));
        has_identity = true;
    }
    if !networking.mac_addresses.is_empty() {
        vars.push(env("PROVISIONING_MACS", networking.mac_addresses.join(",")));
        has_identity = true;
    }
    if !has_identity {
        vars.push(env_from_field("PROVISIONING_IP", "status.hostIP"));
    }

    if inputs.tls() {
        vars.push(env("IRONIC_PRIVATE_PORT", "unix"));
        vars.push(env("IRONIC_REVERSE_PROXY_SETUP", "true"));
        if inputs.vmedia_tls() {
            vars.push(env(
                "VMEDIA_TLS_PORT",
                networking.image_server_tls_port.to_string(),
            ));
        }
    }

    vars
}

pub(crate) fn database_env(database: &DatabaseConnection) -> Vec<EnvVar> {
    let mut vars = vec![
        env("IRONIC_USE_MARIADB", "true"),
        env("MARIADB_HOST", database.host.clone()),
        env("MARIADB_DATABASE", database.name.clone()),
        env_from_secret("MARIADB_USER", &database.credentials_name, "username"),
        env_from_secret("MARIADB_PASSWORD", &database.credentials_name, "password"),
    ];
    if database.tls_secret_name.is_some() {
        vars.push(env("MARIADB_TLS_ENABLED", "true"));
    }
    vars
}

fn join_agent_images<F>(inputs: &IronicInputs, field: F) -> Option<String>
where
    F: Fn(&crate::crd::AgentImages) -> &str,
{
    let images = &inputs.ironic.spec.overrides.as_ref()?.agent_images;
    if images.is_empty() {
        return None;
    }
    Some(
        images
            .iter()
            .map(|i| format!("{}:{}", i.architecture, field(i)))
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn ironic_env(inputs: &IronicInputs) -> Vec<EnvVar> {
    let spec = &inputs.ironic.spec;
    let mut vars = common_env(inputs);

    if let Some(database) = inputs.database {
        vars.extend(database_env(database));
    }

    if inputs.high_availability() {
        vars.push(env("IRONIC_EXPOSE_JSON_RPC", "true"));
        vars.push(env("IRONIC_DEPLOYMENT", "Conductor"));
        vars.push(env(
            "IRONIC_INSECURE",
            spec.tls.disable_rpc_host_validation.to_string(),
        ));
        vars.push(env(
            "IRONIC_JSON_RPC_PORT",
            spec.networking.rpc_port.to_string(),
        ));
        if inputs.tls() {
            let insecure = spec.tls.insecure_rpc.unwrap_or(false);
            vars.push(env("IRONIC_JSON_RPC_TLS", (!insecure).to_string()));
        }
    }

    // Ironic authenticates itself without TLS, and JSON-RPC always does.
    if !inputs.tls() || inputs.high_availability() {
        vars.push(env_from_secret(
            "IRONIC_HTPASSWD",
            &inputs.api_secret_name(),
            KEY_HTPASSWD,
        ));
    }

    if let Some(params) = non_empty(&spec.deploy_ramdisk.extra_kernel_params) {
        vars.push(env("IRONIC_KERNEL_PARAMS", params));
    }
    if let Some(key) = non_empty(&spec.deploy_ramdisk.ssh_key) {
        vars.push(env("IRONIC_RAMDISK_SSH_KEY", key.trim()));
    }
    if !spec.inspection.collectors.is_empty() {
        vars.push(env(
            "IRONIC_IPA_COLLECTORS",
            spec.inspection.collectors.join(","),
        ));
    }
    if !spec.inspection.vlan_interfaces.is_empty() {
        vars.push(env(
            "IRONIC_INSPECTOR_VLAN_INTERFACES",
            spec.inspection.vlan_interfaces.join(","),
        ));
    }
    if let Some(external) = spec.networking.external_ip() {
        vars.push(env("IRONIC_EXTERNAL_IP", external));
    }
    if let Some(kernels) = join_agent_images(inputs, |i| i.kernel.as_str()) {
        vars.push(env("DEPLOY_KERNEL_BY_ARCH", kernels));
    }
    if let Some(ramdisks) = join_agent_images(inputs, |i| i.initramfs.as_str()) {
        vars.push(env("DEPLOY_RAMDISK_BY_ARCH", ramdisks));
    }
    if let Some(ca) = &spec.tls.bmc_ca {
        vars.push(env(
            "BMC_CACERT_FILE",
            format!("{}/{}", PATH_BMC_CA, ca.key()),
        ));
    }
    if let Some(ca) = &spec.tls.trusted_ca {
        vars.push(env(
            "TRUSTED_CACERT_FILE",
            format!("{}/{}", PATH_TRUSTED_CA, ca.key()),
        ));
    }
    if let Some(exporter) = spec.prometheus_exporter.as_ref().filter(|p| p.enabled) {
        vars.push(env("SEND_SENSOR_DATA", "true"));
        vars.push(env(
            "OS_SENSOR_DATA__INTERVAL",
            exporter
                .sensor_collection_interval
                .unwrap_or(DEFAULT_SENSOR_COLLECTION_INTERVAL)
                .to_string(),
        ));
    }

    for option in &spec.extra_config {
        let group = if option.group.is_empty() {
            "DEFAULT"
        } else {
            option.group.as_str()
        };
        vars.push(env(
            &format!(
                "OS_{}__{}",
                group.to_uppercase(),
                option.name.to_uppercase()
            ),
            option.value.clone(),
        ));
    }

    vars
}

fn httpd_env(inputs: &IronicInputs) -> Vec<EnvVar> {
    let mut vars = common_env(inputs);
    // httpd terminates TLS and therefore authenticates API requests.
    if inputs.tls() {
        vars.push(env_from_secret(
            "IRONIC_HTPASSWD",
            &inputs.api_secret_name(),
            KEY_HTPASSWD,
        ));
    }
    vars
}

/// `begin,end,prefix` of one DHCP range.
fn dhcp_range(cidr: &str, begin: Option<&str>, end: Option<&str>) -> Option<String> {
    let network: IpNet = cidr.parse().ok()?;
    let (default_begin, default_end) = crate::crd::default_dhcp_range(&network)
        .map(|(b, e)| (Some(b.to_string()), Some(e.to_string())))
        .unwrap_or((None, None));
    let begin = begin.map(str::to_string).or(default_begin)?;
    let end = end.map(str::to_string).or(default_end)?;
    Some(format!("{},{},{}", begin, end, network.prefix_len()))
}

fn dnsmasq_env(inputs: &IronicInputs, dhcp: &Dhcp) -> Vec<EnvVar> {
    let mut vars = common_env(inputs);

    let mut ranges = Vec::new();
    if let Some(cidr) = dhcp.network_cidr()
        && let Some(range) = dhcp_range(
            cidr,
            non_empty(&dhcp.range_begin),
            non_empty(&dhcp.range_end),
        )
    {
        ranges.push(range);
    }
    for extra in &dhcp.network_ranges {
        if let Some(range) = dhcp_range(
            &extra.network_cidr,
            non_empty(&extra.range_begin),
            non_empty(&extra.range_end),
        ) {
            ranges.push(range);
        }
    }
    if !ranges.is_empty() {
        vars.push(env("DHCP_RANGE", ranges.join(";")));
    }

    if dhcp.serve_dns {
        vars.push(env("DNS_IP", "provisioning"));
    } else if let Some(dns) = dhcp.dns_address() {
        vars.push(env("DNS_IP", dns));
    }
    if let Some(gateway) = dhcp.gateway_address() {
        vars.push(env("GATEWAY_IP", gateway));
    }
    if !dhcp.hosts.is_empty() {
        vars.push(env("DHCP_HOSTS", dhcp.hosts.join(";")));
    }
    if !dhcp.ignore.is_empty() {
        vars.push(env("DHCP_IGNORE", dhcp.ignore.join(",")));
    }
    vars
}

fn ca_volume(name: &str, reference: &CaReference) -> Volume {
    let items = Some(vec![KeyToPath {
        key: reference.key().to_string(),
        path: reference.key().to_string(),
        mode: None,
    }]);
    match reference.kind {
        CaKind::Secret => Volume {
            name: name.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(reference.name.clone()),
                items,
                ..Default::default()
            }),
            ..Default::default()
        },
        CaKind::ConfigMap => Volume {
            name: name.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: reference.name.clone(),
                items,
                ..Default::default()
            }),
            ..Default::default()
        },
    }
}

fn secret_volume(name: &str, secret_name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn volumes(inputs: &IronicInputs) -> Vec<Volume> {
    let tls = &inputs.ironic.spec.tls;
    let mut volumes = vec![Volume {
        name: VOLUME_SHARED.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }];
    if let Some(cert) = tls.certificate_name() {
        volumes.push(secret_volume(VOLUME_CERT_IRONIC, cert));
    }
    if inputs.high_availability() {
        volumes.push(secret_volume(VOLUME_AUTH, &inputs.api_secret_name()));
    }
    if let Some(secret) = inputs.database.and_then(|d| d.tls_secret_name.as_deref()) {
        volumes.push(secret_volume(VOLUME_CERT_MARIADB, secret));
    }
    if let Some(ca) = &tls.bmc_ca {
        volumes.push(ca_volume(VOLUME_BMC_CA, ca));
    }
    if let Some(ca) = &tls.trusted_ca {
        volumes.push(ca_volume(VOLUME_TRUSTED_CA, ca));
    }
    volumes
}

fn shared_mount() -> VolumeMount {
    mount(VOLUME_SHARED, PATH_SHARED, false)
}

fn cert_mounts(inputs: &IronicInputs) -> Vec<VolumeMount> {
    let mut mounts = Vec::new();
    if inputs.tls() {
        mounts.push(mount(VOLUME_CERT_IRONIC, PATH_CERT_IRONIC, true));
        if inputs.vmedia_tls() {
            mounts.push(mount(VOLUME_CERT_IRONIC, PATH_CERT_VMEDIA, true));
        }
    }
    mounts
}

fn ironic_mounts(inputs: &IronicInputs) -> Vec<VolumeMount> {
    let tls = &inputs.ironic.spec.tls;
    let mut mounts = vec![shared_mount()];
    mounts.extend(cert_mounts(inputs));
    if inputs.high_availability() {
        mounts.push(mount(VOLUME_AUTH, PATH_AUTH, true));
    }
    if inputs.database.is_some_and(|d| d.tls_secret_name.is_some()) {
        mounts.push(mount(VOLUME_CERT_MARIADB, PATH_CERT_MARIADB, true));
    }
    if tls.bmc_ca.is_some() {
        mounts.push(mount(VOLUME_BMC_CA, PATH_BMC_CA, true));
    }
    if tls.trusted_ca.is_some() {
        mounts.push(mount(VOLUME_TRUSTED_CA, PATH_TRUSTED_CA, true));
    }
    mounts
}

fn ironic_container(inputs: &IronicInputs) -> Container {
    let networking = &inputs.ironic.spec.networking;
    let mut ports = Vec::new();
    if !inputs.tls() {
        ports.push(host_port("ironic-api", networking.api_port));
    }
    if inputs.high_availability() {
        ports.push(host_port("json-rpc", networking.rpc_port));
    }
    let probe = http_probe(inputs.tls(), networking.api_port, "/");

    Container {
        name: "ironic".to_string(),
        image: Some(inputs.version.ironic_image.clone()),
        command: Some(vec!["/bin/runironic".to_string()]),
        env: Some(ironic_env(inputs)),
        ports: Some(ports),
        volume_mounts: Some(ironic_mounts(inputs)),
        liveness_probe: Some(probe.clone()),
        readiness_probe: Some(probe),
        security_context: Some(security_context(IRONIC_USER, IRONIC_GROUP, &[])),
        ..Default::default()
    }
}

fn httpd_container(inputs: &IronicInputs) -> Container {
    let networking = &inputs.ironic.spec.networking;
    let mut ports = Vec::new();
    if inputs.tls() {
        ports.push(host_port("ironic-api", networking.api_port));
    }
    ports.push(host_port("image-svc", networking.image_server_port));
    if inputs.vmedia_tls() {
        ports.push(host_port("image-svc-tls", networking.image_server_tls_port));
    }
    let probe = http_probe(false, networking.image_server_port, "/images");

    let mut mounts = vec![shared_mount()];
    mounts.extend(cert_mounts(inputs));

    Container {
        name: "httpd".to_string(),
        image: Some(inputs.version.ironic_image.clone()),
        command: Some(vec!["/bin/runhttpd".to_string()]),
        env: Some(httpd_env(inputs)),
        ports: Some(ports),
        volume_mounts: Some(mounts),
        liveness_probe: Some(probe.clone()),
        readiness_probe: Some(probe),
        security_context: Some(security_context(IRONIC_USER, IRONIC_GROUP, &[])),
        ..Default::default()
    }
}

fn ramdisk_logs_container(inputs: &IronicInputs) -> Container {
    Container {
        name: "ramdisk-logs".to_string(),
        image: Some(inputs.version.ironic_image.clone()),
        command: Some(vec!["/bin/runlogwatch.sh".to_string()]),
        volume_mounts: Some(vec![shared_mount()]),
        security_context: Some(security_context(IRONIC_USER, IRONIC_GROUP, &[])),
        ..Default::default()
    }
}

fn dnsmasq_container(inputs: &IronicInputs, dhcp: &Dhcp) -> Container {
    let mut ports = vec![host_port_udp("dhcp", 67), host_port_udp("tftp", 69)];
    if dhcp.serve_dns {
        ports.push(host_port_udp("dns", 53));
    }
    let probe = udp_ports_probe(&[67, 69]);

    Container {
        name: "dnsmasq".to_string(),
        image: Some(inputs.version.ironic_image.clone()),
        command: Some(vec!["/bin/rundnsmasq".to_string()]),
        env: Some(dnsmasq_env(inputs, dhcp)),
        ports: Some(ports),
        volume_mounts: Some(vec![shared_mount()]),
        liveness_probe: Some(probe.clone()),
        readiness_probe: Some(probe),
        security_context: Some(security_context(
            IRONIC_USER,
            IRONIC_GROUP,
            &["NET_ADMIN", "NET_BIND_SERVICE", "NET_RAW"],
        )),
        ..Default::default()
    }
}

fn keepalived_container(inputs: &IronicInputs) -> Container {
    let networking = &inputs.ironic.spec.networking;
    let mut vars = Vec::new();
    if let Some(ip) = networking.ip_address() {
        vars.push(env("PROVISIONING_IP", ip));
    }
    if let Some(interface) = networking.interface() {
        vars.push(env("PROVISIONING_INTERFACE", interface));
    }

    Container {
        name: "keepalived".to_string(),
        image: Some(inputs.version.keepalived_image.clone()),
        command: Some(vec!["/bin/runkeepalived".to_string()]),
        env: Some(vars),
        security_context: Some(security_context(
            KEEPALIVED_USER,
            KEEPALIVED_USER,
            &["NET_ADMIN", "NET_BROADCAST", "NET_RAW"],
        )),
        ..Default::default()
    }
}

fn exporter_container(inputs: &IronicInputs) -> Container {
    let probe = http_probe(false, EXPORTER_PORT, "/metrics");
    Container {
        name: "ironic-prometheus-exporter".to_string(),
        image: Some(inputs.version.ironic_image.clone()),
        command: Some(vec!["/bin/runironic-exporter".to_string()]),
        env: Some(vec![env("FLASK_RUN_PORT", EXPORTER_PORT.to_string())]),
        ports: Some(vec![host_port("metrics", EXPORTER_PORT)]),
        volume_mounts: Some(vec![shared_mount()]),
        liveness_probe: Some(probe.clone()),
        readiness_probe: Some(probe),
        security_context: Some(security_context(IRONIC_USER, IRONIC_GROUP, &[])),
        ..Default::default()
    }
}

fn downloader_container(inputs: &IronicInputs) -> Container {
    let mut vars = vec![
        env("IPA_BASEURI", inputs.version.agent_download_url.clone()),
        env("IPA_BRANCH", inputs.version.agent_branch.clone()),
    ];
    let mut mounts = vec![shared_mount()];
    if let Some(ca) = &inputs.ironic.spec.tls.trusted_ca {
        vars.push(env(
            "TRUSTED_CACERT_FILE",
            format!("{}/{}", PATH_TRUSTED_CA, ca.key()),
        ));
        mounts.push(mount(VOLUME_TRUSTED_CA, PATH_TRUSTED_CA, true));
    }

    Container {
        name: "ramdisk-downloader".to_string(),
        image: Some(inputs.version.ramdisk_downloader_image.clone()),
        command: Some(vec!["/usr/local/bin/get-resource.sh".to_string()]),
        env: Some(vars),
        volume_mounts: Some(mounts),
        security_context: Some(security_context(IRONIC_USER, IRONIC_GROUP, &[])),
        ..Default::default()
    }
}

/// Pod labels: built-in labels, then user overrides, except that the
/// selector label can never be overwritten.
pub fn ironic_pod_labels(ironic: &Ironic) -> BTreeMap<String, String> {
    let mut labels = standard_labels(&ironic.name_any(), "ironic");
    if let Some(overrides) = &ironic.spec.overrides {
        labels.extend(overrides.labels.clone());
    }
    labels.insert(LABEL_OWNER.to_string(), ironic_deployment_name(ironic));
    labels
}

fn pod_annotations(inputs: &IronicInputs) -> BTreeMap<String, String> {
    let mut annotations = inputs
        .ironic
        .spec
        .overrides
        .as_ref()
        .map(|o| o.annotations.clone())
        .unwrap_or_default();
    if let Some(version) = inputs.api_secret.resource_version() {
        annotations.insert(ANNOTATION_API_SECRET_VERSION.to_string(), version);
    }
    if let Some(version) = inputs.tls_secret.and_then(|s| s.resource_version()) {
        annotations.insert(ANNOTATION_TLS_SECRET_VERSION.to_string(), version);
    }
    annotations
}

/// Names of the containers the template will contain, in order.
pub fn ironic_container_names(template: &PodTemplateSpec) -> Vec<String> {
    template
        .spec
        .as_ref()
        .map(|s| s.containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

/// Compose the pod template of the Ironic Deployment or DaemonSet.
pub fn ironic_pod_template(inputs: &IronicInputs) -> PodTemplateSpec {
    let spec = &inputs.ironic.spec;

    let mut containers = vec![
        ironic_container(inputs),
        httpd_container(inputs),
        ramdisk_logs_container(inputs),
    ];
    if let Some(dhcp) = inputs.dhcp() {
        containers.push(dnsmasq_container(inputs, &dhcp));
    }
    if spec.networking.uses_keepalived() {
        containers.push(keepalived_container(inputs));
    }
    if inputs.exporter_enabled() {
        containers.push(exporter_container(inputs));
    }

    let init_containers = if spec.deploy_ramdisk.disable_downloader {
        None
    } else {
        Some(vec![downloader_container(inputs)])
    };

    let annotations = pod_annotations(inputs);

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(ironic_pod_labels(inputs.ironic)),
            annotations: (!annotations.is_empty()).then_some(annotations),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers,
            init_containers,
            volumes: Some(volumes(inputs)),
            host_network: Some(true),
            dns_policy: Some("ClusterFirstWithHostNet".to_string()),
            node_selector: (!spec.node_selector.is_empty()).then(|| spec.node_selector.clone()),
            ..Default::default()
        }),
    }
}
