//! Ironic Custom Resource Definition.
//!
//! An `Ironic` record describes a complete provisioning service: the Ironic
//! API and conductor, the image server, optional DHCP/TFTP boot service,
//! optional floating IP management, metrics exporter and database backend.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;

/// Ironic is a custom resource for deploying the Ironic provisioning service.
///
/// Example:
/// ```yaml
/// apiVersion: ironic.metal3.io/v1alpha1
/// kind: Ironic
/// metadata:
///   name: ironic
/// spec:
///   version: "32.0"
///   networking:
///     interface: eth0
///     ipAddress: 192.0.2.2
///     ipAddressManager: keepalived
///     dhcp:
///       networkCIDR: 192.0.2.0/24
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ironic.metal3.io",
    version = "v1alpha1",
    kind = "Ironic",
    plural = "ironics",
    status = "IronicStatus",
    namespaced,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".status.installedVersion"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IronicSpec {
    /// Ironic version to install: MAJOR.MINOR or "latest".
    /// Defaults to the version shipped with the operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Overrides for the container images.
    #[serde(default)]
    pub images: Images,

    /// External or managed MariaDB database. Required for highAvailability.
    /// Cannot be changed once set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<Database>,

    /// Run Ironic as a DaemonSet on every matching node (requires a database).
    #[serde(default)]
    pub high_availability: bool,

    /// Provisioning network configuration.
    #[serde(default)]
    pub networking: Networking,

    /// TLS configuration.
    #[serde(default)]
    pub tls: Tls,

    /// Deploy ramdisk configuration.
    #[serde(default)]
    pub deploy_ramdisk: DeployRamdisk,

    /// In-band inspection configuration.
    #[serde(default)]
    pub inspection: Inspection,

    /// Name of the Secret with API credentials (username, password).
    /// Generated automatically when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_credentials_name: String,

    /// Prometheus exporter for BMC sensor data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_exporter: Option<PrometheusExporter>,

    /// Extra Ironic configuration options.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_config: Vec<ExtraConfig>,

    /// Low-level overrides of the generated pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Overrides>,

    /// Node selector for the Ironic pods.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
}

/// Container image overrides.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Images {
    /// Ironic image (also used by httpd, dnsmasq and the log watcher).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ironic: Option<String>,

    /// Image of the init container downloading the agent ramdisk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_ramdisk_downloader: Option<String>,

    /// Keepalived image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keepalived: Option<String>,

    /// Branch of the ironic-python-agent ramdisk to download.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_branch: Option<String>,

    /// Base URL to download the agent ramdisk from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_download_url: Option<String>,
}

/// Database connection. Either `host` (external database) or
/// `ironicDatabaseName` (managed IronicDatabase) must be set.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /// Secret with the database username and password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_name: Option<String>,

    /// Host (and optionally port) of an external database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Database name (default: ironic).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Name of an IronicDatabase in the same namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ironic_database_name: Option<String>,
}

impl Database {
    pub fn database_name(&self) -> &str {
        non_empty(&self.name).unwrap_or(DEFAULT_DATABASE_NAME)
    }
}

/// Database name used when none is configured.
pub const DEFAULT_DATABASE_NAME: &str = "ironic";

/// How the provisioning IP address is managed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum IpAddressManager {
    /// The address is managed outside of the operator.
    #[default]
    None,
    /// A keepalived sidecar maintains the address on the interface.
    Keepalived,
}

/// Provisioning network configuration.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Networking {
    /// IP address Ironic listens on and advertises.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// Network interface of the provisioning network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    /// MAC addresses used to find the provisioning interface.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mac_addresses: Vec<String>,

    /// Only listen on the provisioning interface instead of all interfaces.
    #[serde(default)]
    pub bind_interface: bool,

    /// External IP for virtual media when the provisioning network is not routable.
    #[serde(default, rename = "externalIP", skip_serializing_if = "Option::is_none")]
    pub external_ip: Option<String>,

    /// Ironic API port (default: 6385).
    #[serde(default = "default_api_port")]
    pub api_port: i32,

    /// Image server HTTP port (default: 6180).
    #[serde(default = "default_image_server_port")]
    pub image_server_port: i32,

    /// Image server HTTPS port for virtual media (default: 6183).
    #[serde(default = "default_image_server_tls_port", rename = "imageServerTLSPort")]
    pub image_server_tls_port: i32,

    /// JSON-RPC port used between conductors (default: 6189).
    #[serde(default = "default_rpc_port")]
    pub rpc_port: i32,

    /// DHCP/TFTP service configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp: Option<Dhcp>,

    /// Manager of the provisioning IP address.
    #[serde(default)]
    pub ip_address_manager: IpAddressManager,
}

impl Default for Networking {
    fn default() -> Self {
        Self {
            ip_address: None,
            interface: None,
            mac_addresses: Vec::new(),
            bind_interface: false,
            external_ip: None,
            api_port: default_api_port(),
            image_server_port: default_image_server_port(),
            image_server_tls_port: default_image_server_tls_port(),
            rpc_port: default_rpc_port(),
            dhcp: None,
            ip_address_manager: IpAddressManager::None,
        }
    }
}

impl Networking {
    pub fn ip_address(&self) -> Option<&str> {
        non_empty(&self.ip_address)
    }

    pub fn interface(&self) -> Option<&str> {
        non_empty(&self.interface)
    }

    pub fn external_ip(&self) -> Option<&str> {
        non_empty(&self.external_ip)
    }

    pub fn uses_keepalived(&self) -> bool {
        self.ip_address_manager == IpAddressManager::Keepalived
    }
}

/// Default Ironic API port.
pub const DEFAULT_API_PORT: i32 = 6385;
/// Default image server port.
pub const DEFAULT_IMAGE_SERVER_PORT: i32 = 6180;
/// Default image server TLS port.
pub const DEFAULT_IMAGE_SERVER_TLS_PORT: i32 = 6183;
/// Default JSON-RPC port.
pub const DEFAULT_RPC_PORT: i32 = 6189;

fn default_api_port() -> i32 {
    DEFAULT_API_PORT
}

fn default_image_server_port() -> i32 {
    DEFAULT_IMAGE_SERVER_PORT
}

fn default_image_server_tls_port() -> i32 {
    DEFAULT_IMAGE_SERVER_TLS_PORT
}

fn default_rpc_port() -> i32 {
    DEFAULT_RPC_PORT
}

/// DHCP configuration for the dnsmasq sidecar.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Dhcp {
    /// CIDR of the provisioning network. Required when the primary range is used.
    #[serde(default, rename = "networkCIDR", skip_serializing_if = "Option::is_none")]
    pub network_cidr: Option<String>,

    /// First address of the DHCP range (default: network address + 10).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_begin: Option<String>,

    /// Last address of the DHCP range (default: broadcast address - 2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_end: Option<String>,

    /// Additional DHCP ranges, e.g. for routed provisioning networks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_ranges: Vec<DhcpRange>,

    /// DNS server to advertise. Mutually exclusive with serveDNS.
    #[serde(default, rename = "dnsAddress", skip_serializing_if = "Option::is_none")]
    pub dns_address: Option<String>,

    /// Advertise the provisioning IP as the DNS server.
    #[serde(default, rename = "serveDNS")]
    pub serve_dns: bool,

    /// Gateway to advertise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_address: Option<String>,

    /// Raw dnsmasq dhcp-host entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,

    /// Raw dnsmasq dhcp-ignore entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,
}

impl Dhcp {
    pub fn network_cidr(&self) -> Option<&str> {
        non_empty(&self.network_cidr)
    }

    pub fn dns_address(&self) -> Option<&str> {
        non_empty(&self.dns_address)
    }

    pub fn gateway_address(&self) -> Option<&str> {
        non_empty(&self.gateway_address)
    }
}

/// An additional DHCP range.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DhcpRange {
    #[serde(default, rename = "networkCIDR")]
    pub network_cidr: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_begin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_end: Option<String>,
}

/// Kind of object holding a CA bundle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum CaKind {
    #[default]
    Secret,
    ConfigMap,
}

impl std::fmt::Display for CaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaKind::Secret => write!(f, "Secret"),
            CaKind::ConfigMap => write!(f, "ConfigMap"),
        }
    }
}

/// Reference to a CA bundle in a Secret or ConfigMap.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CaReference {
    /// Object name.
    pub name: String,

    /// Object kind (default: Secret).
    #[serde(default)]
    pub kind: CaKind,

    /// Key holding the bundle (default: ca.crt).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Key of a CA bundle when none is configured.
pub const DEFAULT_CA_KEY: &str = "ca.crt";

impl CaReference {
    pub fn key(&self) -> &str {
        non_empty(&self.key).unwrap_or(DEFAULT_CA_KEY)
    }
}

/// TLS configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tls {
    /// Secret of type kubernetes.io/tls with the API and image server certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_name: Option<String>,

    /// CA bundle used to verify BMC certificates.
    #[serde(default, rename = "bmcCA", skip_serializing_if = "Option::is_none")]
    pub bmc_ca: Option<CaReference>,

    /// CA bundle trusted for all outgoing connections (e.g. image downloads).
    #[serde(default, rename = "trustedCA", skip_serializing_if = "Option::is_none")]
    pub trusted_ca: Option<CaReference>,

    /// Do not serve virtual media over HTTPS.
    #[serde(default, rename = "disableVirtualMediaTLS")]
    pub disable_virtual_media_tls: bool,

    /// Disable TLS on JSON-RPC (highAvailability only).
    #[serde(default, rename = "insecureRPC", skip_serializing_if = "Option::is_none")]
    pub insecure_rpc: Option<bool>,

    /// Skip host name validation of JSON-RPC certificates.
    #[serde(default, rename = "disableRPCHostValidation")]
    pub disable_rpc_host_validation: bool,
}

impl Tls {
    pub fn certificate_name(&self) -> Option<&str> {
        non_empty(&self.certificate_name)
    }

    /// Whether Ironic and the image server are exposed over HTTPS.
    pub fn enabled(&self) -> bool {
        self.certificate_name().is_some()
    }

    /// Whether the image server also listens on its TLS port.
    pub fn virtual_media_tls(&self) -> bool {
        self.enabled() && !self.disable_virtual_media_tls
    }
}

/// Deploy ramdisk configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeployRamdisk {
    /// Public SSH key injected into the ramdisk.
    #[serde(default, rename = "sshKey", skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,

    /// Extra kernel parameters for the ramdisk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_kernel_params: Option<String>,

    /// Skip the ramdisk downloader init container.
    #[serde(default)]
    pub disable_downloader: bool,
}

/// In-band inspection configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    /// Ironic Python Agent collectors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collectors: Vec<String>,

    /// VLAN interfaces to inspect, e.g. "eth0.100" or "all".
    #[serde(default, rename = "vlanInterfaces", skip_serializing_if = "Vec::is_empty")]
    pub vlan_interfaces: Vec<String>,
}

/// Prometheus exporter configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusExporter {
    /// Run the exporter and collect sensor data.
    #[serde(default)]
    pub enabled: bool,

    /// Do not create a ServiceMonitor even if the CRD is installed.
    #[serde(default)]
    pub disable_service_monitor: bool,

    /// Sensor data collection interval in seconds (default: 60).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_collection_interval: Option<i32>,
}

/// Default sensor collection interval in seconds.
pub const DEFAULT_SENSOR_COLLECTION_INTERVAL: i32 = 60;

/// An Ironic configuration option, rendered as OS_<GROUP>__<NAME>.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtraConfig {
    /// Configuration group (default: DEFAULT).
    #[serde(default)]
    pub group: String,
    /// Option name.
    pub name: String,
    /// Option value.
    pub value: String,
}

/// Per-architecture agent kernel and initramfs.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentImages {
    /// CPU architecture, e.g. x86_64 or aarch64.
    pub architecture: String,
    /// URL of the kernel.
    pub kernel: String,
    /// URL of the initramfs.
    pub initramfs: String,
}

/// Low-level overrides of the generated pod.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Overrides {
    /// Extra pod annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Extra pod labels. Built-in labels cannot be overwritten.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Agent images per architecture.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_images: Vec<AgentImages>,
}

/// Observed state of an Ironic.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IronicStatus {
    /// Version that is fully deployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,

    /// Version that is being deployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_version: Option<String>,

    /// Conditions describing the current state.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// URLs of the Ironic API.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,

    /// The generation most recently observed by the controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Treat empty strings the same as missing values.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
