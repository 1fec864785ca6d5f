//! Validation logic for Ironic and IronicDatabase records.
//!
//! Checks run in a fixed order and the first failure wins, so the same
//! record always produces the same message. Messages start with the dotted
//! path of the offending field.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::LazyLock;

use ipnet::IpNet;
use kube::ResourceExt;

use crate::config::OperatorConfig;
use crate::controller::error::{Error, Result};
use crate::crd::{
    Dhcp, Ironic, IronicDatabase, IronicSpec, Networking, VERSION_BMC_CA,
    VERSION_PROMETHEUS_EXPORTER, Version, non_empty, set_dhcp_defaults,
};

/// Maximum record name length, leaving room for suffixes like
/// `-post-34.0-to-latest` on job names.
pub const MAX_NAME_LENGTH: usize = 40;

/// Validate an Ironic record, optionally against its previous state.
pub fn validate_ironic(
    resource: &Ironic,
    old: Option<&Ironic>,
    config: &OperatorConfig,
) -> Result<()> {
    validate_name_length(&resource.name_any())?;
    let spec = &resource.spec;
    let version = resolved_version(spec, config)?;

    validate_high_availability(spec, config)?;
    validate_database(spec)?;
    validate_networking(&spec.networking, spec.high_availability)?;
    validate_tls(spec)?;
    validate_version_gates(spec, version)?;
    validate_extra_config(spec)?;
    validate_overrides(spec)?;

    if let Some(old) = old {
        validate_ironic_update(spec, &old.spec)?;
    }
    Ok(())
}

/// Validate an IronicDatabase record, optionally against its previous state.
pub fn validate_ironic_database(
    resource: &IronicDatabase,
    old: Option<&IronicDatabase>,
) -> Result<()> {
    validate_name_length(&resource.name_any())?;

    if let Some(old) = old
        && let Some(previous) = old.spec.credentials_name()
        && resource.spec.credentials_name() != Some(previous)
    {
        return Err(Error::Validation(format!(
            "spec.credentialsName: cannot change the credentials secret once set (was {})",
            previous
        )));
    }
    Ok(())
}

/// Refuse moving an installation with an external database to an older
/// numeric version. Moving away from `latest` is always allowed.
pub fn check_downgrade(installed: Option<&str>, requested: Version, has_database: bool) -> Result<()> {
    if !has_database {
        return Ok(());
    }
    let Some(installed) = installed.filter(|v| !v.is_empty()) else {
        return Ok(());
    };
    let installed: Version = installed.parse()?;
    if !installed.is_latest() && requested < installed {
        return Err(Error::Validation(format!(
            "spec.version: Ironic does not support downgrades with an external database \
             (installed {}, requested {})",
            installed, requested
        )));
    }
    Ok(())
}

/// The version a record resolves to: its own request or the operator default.
pub fn resolved_version(spec: &IronicSpec, config: &OperatorConfig) -> Result<Version> {
    let Some(requested) = non_empty(&spec.version) else {
        return Ok(config.default_version);
    };
    let version: Version = requested
        .trim()
        .parse()
        .map_err(|e| Error::Validation(format!("spec.version: {}", e)))?;
    version
        .ensure_supported()
        .map_err(|e| Error::Validation(format!("spec.version: {}", e)))?;
    Ok(version)
}

fn validate_name_length(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LENGTH {
        return Err(Error::Validation(format!(
            "metadata.name: '{}' exceeds maximum length of {} characters",
            name, MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

fn validate_high_availability(spec: &IronicSpec, config: &OperatorConfig) -> Result<()> {
    if !spec.high_availability {
        return Ok(());
    }
    if !config.feature_gates.high_availability {
        return Err(Error::Validation(
            "spec.highAvailability: disabled by the HighAvailability feature gate".to_string(),
        ));
    }
    if spec.database.is_none() {
        return Err(Error::Validation(
            "spec.database: database is required for highly available architecture".to_string(),
        ));
    }
    if spec.networking.ip_address().is_some() {
        return Err(Error::Validation(
            "spec.networking.ipAddress: networking.ipAddress makes no sense with highly available architecture"
                .to_string(),
        ));
    }
    if spec.networking.dhcp.is_some() {
        return Err(Error::Validation(
            "spec.networking.dhcp: DHCP support is not implemented in the highly available architecture"
                .to_string(),
        ));
    }
    if spec.networking.uses_keepalived() {
        return Err(Error::Validation(
            "spec.networking.ipAddressManager: keepalived is not supported in the highly available architecture"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_database(spec: &IronicSpec) -> Result<()> {
    let Some(db) = &spec.database else {
        return Ok(());
    };
    match (non_empty(&db.host), non_empty(&db.ironic_database_name)) {
        (Some(_), Some(_)) => Err(Error::Validation(
            "spec.database: host and ironicDatabaseName are mutually exclusive".to_string(),
        )),
        (None, None) => Err(Error::Validation(
            "spec.database: either host or ironicDatabaseName is required".to_string(),
        )),
        (Some(_), None) if non_empty(&db.credentials_name).is_none() => Err(Error::Validation(
            "spec.database.credentialsName: required for an external database".to_string(),
        )),
        _ => Ok(()),
    }
}

fn parse_ip(field: &str, value: &str) -> Result<IpAddr> {
    value
        .parse()
        .map_err(|_| Error::Validation(format!("{}: {} is not a valid IP address", field, value)))
}

fn parse_cidr(field: &str, value: &str) -> Result<IpNet> {
    value
        .parse()
        .map_err(|_| Error::Validation(format!("{}: {} is not a valid CIDR", field, value)))
}

fn is_valid_mac(mac: &str) -> bool {
    static MAC_RE: LazyLock<Option<regex::Regex>> = LazyLock::new(|| {
        regex::Regex::new(r"^([0-9A-Fa-f]{2}[:-]){5}[0-9A-Fa-f]{2}$").ok()
    });
    MAC_RE.as_ref().is_some_and(|re| re.is_match(mac))
}

fn validate_port(field: &str, port: i32) -> Result<()> {
    if !(1..=65535).contains(&port) {
        return Err(Error::Validation(format!(
            "{}: port {} is out of range",
            field, port
        )));
    }
    Ok(())
}

fn validate_networking(networking: &Networking, high_availability: bool) -> Result<()> {
    validate_port("spec.networking.apiPort", networking.api_port)?;
    validate_port("spec.networking.imageServerPort", networking.image_server_port)?;
    validate_port(
        "spec.networking.imageServerTLSPort",
        networking.image_server_tls_port,
    )?;
    validate_port("spec.networking.rpcPort", networking.rpc_port)?;

    let mut ports = BTreeSet::new();
    let mut listen = vec![
        networking.api_port,
        networking.image_server_port,
        networking.image_server_tls_port,
    ];
    if high_availability {
        listen.push(networking.rpc_port);
    }
    for port in listen {
        if !ports.insert(port) {
            return Err(Error::Validation(format!(
                "spec.networking: port {} is used more than once",
                port
            )));
        }
    }

    let ip_address = networking
        .ip_address()
        .map(|ip| parse_ip("spec.networking.ipAddress", ip))
        .transpose()?;
    if let Some(external) = networking.external_ip() {
        parse_ip("spec.networking.externalIP", external)?;
    }
    for mac in &networking.mac_addresses {
        if !is_valid_mac(mac) {
            return Err(Error::Validation(format!(
                "spec.networking.macAddresses: {} is not a valid MAC address",
                mac
            )));
        }
    }

    if networking.uses_keepalived()
        && (ip_address.is_none() || networking.interface().is_none())
    {
        return Err(Error::Validation(
            "spec.networking.ipAddressManager: keepalived requires networking.ipAddress and networking.interface"
                .to_string(),
        ));
    }

    if let Some(dhcp) = &networking.dhcp {
        validate_dhcp(dhcp, ip_address)?;
    }
    Ok(())
}

/// Validate one `begin..end` range against its network.
fn validate_range(
    field: &str,
    network: &IpNet,
    begin: Option<&str>,
    end: Option<&str>,
) -> Result<()> {
    let (Some(begin), Some(end)) = (begin, end) else {
        return Err(Error::Validation(format!(
            "{}: rangeBegin and rangeEnd are required (network {} too small for a default range)",
            field, network
        )));
    };
    let begin_ip = parse_ip(&format!("{}.rangeBegin", field), begin)?;
    let end_ip = parse_ip(&format!("{}.rangeEnd", field), end)?;
    for (name, ip) in [("rangeBegin", begin_ip), ("rangeEnd", end_ip)] {
        if !network.contains(&ip) {
            return Err(Error::Validation(format!(
                "{}.{}: {} is not in networkCIDR {}",
                field, name, ip, network
            )));
        }
    }
    if begin_ip > end_ip {
        return Err(Error::Validation(format!(
            "{}: rangeBegin {} is after rangeEnd {}",
            field, begin_ip, end_ip
        )));
    }
    Ok(())
}

fn validate_dhcp(dhcp: &Dhcp, ip_address: Option<IpAddr>) -> Result<()> {
    let mut dhcp = dhcp.clone();
    set_dhcp_defaults(&mut dhcp);

    match dhcp.network_cidr() {
        Some(cidr) => {
            let network = parse_cidr("spec.networking.dhcp.networkCIDR", cidr)?;
            validate_range(
                "spec.networking.dhcp",
                &network,
                non_empty(&dhcp.range_begin),
                non_empty(&dhcp.range_end),
            )?;
            if let Some(ip) = ip_address
                && !network.contains(&ip)
            {
                return Err(Error::Validation(format!(
                    "spec.networking.ipAddress: {} is not in networking.dhcp.networkCIDR {}",
                    ip, network
                )));
            }
        }
        None if dhcp.network_ranges.is_empty() => {
            return Err(Error::Validation(
                "spec.networking.dhcp.networkCIDR: required when DHCP is enabled".to_string(),
            ));
        }
        None => {
            if dhcp.range_begin.is_some() || dhcp.range_end.is_some() {
                return Err(Error::Validation(
                    "spec.networking.dhcp.networkCIDR: required when rangeBegin or rangeEnd is set"
                        .to_string(),
                ));
            }
        }
    }

    for (index, range) in dhcp.network_ranges.iter().enumerate() {
        let field = format!("spec.networking.dhcp.networkRanges[{}]", index);
        if range.network_cidr.is_empty() {
            return Err(Error::Validation(format!(
                "{}.networkCIDR: required",
                field
            )));
        }
        let network = parse_cidr(&format!("{}.networkCIDR", field), &range.network_cidr)?;
        let defaults = crate::crd::default_dhcp_range(&network);
        let begin = non_empty(&range.range_begin)
            .map(str::to_string)
            .or_else(|| defaults.map(|(b, _)| b.to_string()));
        let end = non_empty(&range.range_end)
            .map(str::to_string)
            .or_else(|| defaults.map(|(_, e)| e.to_string()));
        validate_range(&field, &network, begin.as_deref(), end.as_deref())?;
    }

    if dhcp.serve_dns && dhcp.dns_address().is_some() {
        return Err(Error::Validation(
            "spec.networking.dhcp: serveDNS and dnsAddress are mutually exclusive".to_string(),
        ));
    }
    if let Some(dns) = dhcp.dns_address() {
        parse_ip("spec.networking.dhcp.dnsAddress", dns)?;
    }
    if let Some(gateway) = dhcp.gateway_address() {
        parse_ip("spec.networking.dhcp.gatewayAddress", gateway)?;
    }
    Ok(())
}

fn validate_tls(spec: &IronicSpec) -> Result<()> {
    if spec.tls.insecure_rpc.is_some() && !spec.high_availability {
        return Err(Error::Validation(
            "spec.tls.insecureRPC: makes no sense without highAvailability".to_string(),
        ));
    }
    for (field, reference) in [
        ("spec.tls.bmcCA", &spec.tls.bmc_ca),
        ("spec.tls.trustedCA", &spec.tls.trusted_ca),
    ] {
        if let Some(reference) = reference
            && reference.name.is_empty()
        {
            return Err(Error::Validation(format!("{}.name: required", field)));
        }
    }
    Ok(())
}

fn validate_version_gates(spec: &IronicSpec, version: Version) -> Result<()> {
    let exporter_enabled = spec.prometheus_exporter.as_ref().is_some_and(|p| p.enabled);
    if exporter_enabled && version < VERSION_PROMETHEUS_EXPORTER {
        return Err(Error::Validation(format!(
            "spec.prometheusExporter: requires Ironic {} or newer, got {}",
            VERSION_PROMETHEUS_EXPORTER, version
        )));
    }
    if let Some(exporter) = &spec.prometheus_exporter
        && let Some(interval) = exporter.sensor_collection_interval
        && interval <= 0
    {
        return Err(Error::Validation(format!(
            "spec.prometheusExporter.sensorCollectionInterval: must be positive, got {}",
            interval
        )));
    }
    if spec.tls.bmc_ca.is_some() && version < VERSION_BMC_CA {
        return Err(Error::Validation(format!(
            "spec.tls.bmcCA: requires Ironic {} or newer, got {}",
            VERSION_BMC_CA, version
        )));
    }
    Ok(())
}

fn is_valid_option_name(value: &str) -> bool {
    static OPTION_RE: LazyLock<Option<regex::Regex>> =
        LazyLock::new(|| regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());
    OPTION_RE.as_ref().is_some_and(|re| re.is_match(value))
}

fn validate_extra_config(spec: &IronicSpec) -> Result<()> {
    for (index, option) in spec.extra_config.iter().enumerate() {
        if !option.group.is_empty() && !is_valid_option_name(&option.group) {
            return Err(Error::Validation(format!(
                "spec.extraConfig[{}].group: {:?} is not a valid option group",
                index, option.group
            )));
        }
        if !is_valid_option_name(&option.name) {
            return Err(Error::Validation(format!(
                "spec.extraConfig[{}].name: {:?} is not a valid option name",
                index, option.name
            )));
        }
    }
    Ok(())
}

fn validate_overrides(spec: &IronicSpec) -> Result<()> {
    let Some(overrides) = &spec.overrides else {
        return Ok(());
    };
    let mut architectures = BTreeSet::new();
    for (index, images) in overrides.agent_images.iter().enumerate() {
        let field = format!("spec.overrides.agentImages[{}]", index);
        if images.architecture.is_empty() {
            return Err(Error::Validation(format!("{}.architecture: required", field)));
        }
        if images.kernel.is_empty() || images.initramfs.is_empty() {
            return Err(Error::Validation(format!(
                "{}: kernel and initramfs are required",
                field
            )));
        }
        if !architectures.insert(images.architecture.as_str()) {
            return Err(Error::Validation(format!(
                "{}.architecture: {} is listed more than once",
                field, images.architecture
            )));
        }
    }
    Ok(())
}

/// Checks that only apply when an existing record is changed.
pub fn validate_ironic_update(spec: &IronicSpec, old: &IronicSpec) -> Result<()> {
    if let Some(previous) = &old.database
        && spec.database.as_ref() != Some(previous)
    {
        return Err(Error::Validation(
            "spec.database: cannot change the database once set".to_string(),
        ));
    }
    Ok(())
}
