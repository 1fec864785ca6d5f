// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for ironic-standalone-operator.
//!
//! Uses proptest to generate random inputs and verify invariants.

#[path = "../common/mod.rs"]
mod common;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use proptest::prelude::*;

use ironic_standalone_operator::config::OperatorConfig;
use ironic_standalone_operator::controller::state_machine::{Observation, Phase, derive_phase};
use ironic_standalone_operator::controller::status::{Status, fold};
use ironic_standalone_operator::controller::version_info::VersionInfo;
use ironic_standalone_operator::crd::{Dhcp, Version, default_dhcp_range, set_dhcp_defaults};
use ironic_standalone_operator::resources::ensure::{template_hash, with_template_hash};
use ironic_standalone_operator::resources::ironic_pod::{IronicInputs, ironic_pod_template};
use ironic_standalone_operator::resources::jobs::UpgradePhase;

use common::{IronicBuilder, credentials_secret};

/// Strategy for generating numeric versions.
fn numeric_version() -> impl Strategy<Value = Version> {
    (1u32..200, 0u32..100).prop_map(|(major, minor)| Version::new(major, minor))
}

/// Strategy for generating any version, `latest` included.
fn any_version() -> impl Strategy<Value = Version> {
    prop_oneof![4 => numeric_version(), 1 => Just(Version::Latest)]
}

/// Strategy for generating IPv4 networks large enough to hold a range.
fn ipv4_network() -> impl Strategy<Value = IpNet> {
    (any::<u32>(), 8u8..=28).prop_map(|(addr, prefix)| {
        IpNet::V4(Ipv4Net::new(Ipv4Addr::from(addr), prefix).unwrap().trunc())
    })
}

/// Strategy for generating IPv6 networks large enough to hold a range.
fn ipv6_network() -> impl Strategy<Value = IpNet> {
    (any::<u128>(), 16u8..=124).prop_map(|(addr, prefix)| {
        IpNet::V6(Ipv6Net::new(Ipv6Addr::from(addr), prefix).unwrap().trunc())
    })
}

fn any_status() -> impl Strategy<Value = Status> {
    prop_oneof![
        Just(Status::Ready),
        "[a-z ]{1,12}".prop_map(Status::updated),
        "[a-z ]{1,12}".prop_map(Status::in_progress),
        "[a-z ]{1,12}".prop_map(Status::deployment_failed),
        "[a-z ]{1,12}".prop_map(Status::user_error),
    ]
}

proptest! {
    /// Property: versions survive a display/parse round trip.
    #[test]
    fn version_display_parses_back(version in any_version()) {
        prop_assert_eq!(version.to_string().parse::<Version>().unwrap(), version);
    }

    /// Property: `latest` is above every numeric version.
    #[test]
    fn latest_is_greatest(version in numeric_version()) {
        prop_assert!(Version::Latest > version);
    }

    /// Property: ordering follows (major, minor).
    #[test]
    fn ordering_is_lexicographic(a in numeric_version(), b in numeric_version()) {
        let key = |v: &Version| match v {
            Version::Numeric { major, minor } => (*major, *minor),
            Version::Latest => unreachable!(),
        };
        prop_assert_eq!(a.cmp(&b), key(&a).cmp(&key(&b)));
    }

    /// Property: leading zeros never parse.
    #[test]
    fn leading_zero_rejected(major in 1u32..100, minor in 0u32..100) {
        let text = format!("0{}.{}", major, minor);
        prop_assert!(text.parse::<Version>().is_err());
    }

    /// Property: default ranges stay inside the network, in order.
    #[test]
    fn default_range_inside_network(network in prop_oneof![ipv4_network(), ipv6_network()]) {
        let (begin, end) = default_dhcp_range(&network).expect("network is large enough");
        prop_assert!(network.contains(&begin));
        prop_assert!(network.contains(&end));
        prop_assert!(begin < end);
        prop_assert_ne!(begin, network.network());
        prop_assert_ne!(end, network.broadcast());
        prop_assert!(matches!(
            (begin, end),
            (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_))
        ));
    }

    /// Property: DHCP defaulting is idempotent.
    #[test]
    fn dhcp_defaults_idempotent(network in ipv4_network()) {
        let mut dhcp = Dhcp {
            network_cidr: Some(network.to_string()),
            ..Default::default()
        };
        set_dhcp_defaults(&mut dhcp);
        let once = dhcp.clone();
        set_dhcp_defaults(&mut dhcp);
        prop_assert_eq!(once, dhcp);
    }

    /// Property: folding keeps the highest priority outcome regardless of
    /// where it appears.
    #[test]
    fn fold_prefers_errors(statuses in prop::collection::vec(any_status(), 0..8)) {
        let folded = fold(statuses.clone());
        if statuses.iter().any(Status::is_error) {
            prop_assert!(folded.is_error());
        } else if statuses.iter().any(Status::needs_requeue) {
            prop_assert!(folded.needs_requeue());
        } else if statuses.iter().all(Status::is_ready) {
            prop_assert!(folded.is_ready());
        }
    }

    /// Property: the same record composes the same template and hash.
    #[test]
    fn composition_is_deterministic(
        ip in any::<[u8; 4]>(),
        keepalived in any::<bool>(),
        version in prop::sample::select(vec!["30.0", "31.0", "32.0", "33.0", "34.0", "latest"]),
    ) {
        let ip = Ipv4Addr::from(ip).to_string();
        let mut builder = IronicBuilder::new("ironic").version(version).ip_address(&ip);
        if keepalived {
            builder = builder.keepalived("eth0", &ip);
        }
        let ironic = builder.build();
        let info = VersionInfo::from_config(&OperatorConfig::default())
            .with_overrides(ironic.spec.version.as_deref(), &ironic.spec.images)
            .unwrap();
        let secret = credentials_secret("ironic-api-credentials", "admin", "s3cret");
        let inputs = IronicInputs {
            ironic: &ironic,
            version: &info,
            api_secret: &secret,
            tls_secret: None,
            database: None,
        };
        let first = with_template_hash(ironic_pod_template(&inputs)).unwrap();
        let second = with_template_hash(ironic_pod_template(&inputs)).unwrap();
        prop_assert_eq!(&first, &second);
        // The recorded hash does not feed into itself.
        prop_assert_eq!(
            template_hash(&first).unwrap(),
            template_hash(&ironic_pod_template(&inputs)).unwrap()
        );
    }

    /// Property: a deletion marker always wins over everything else.
    #[test]
    fn deletion_dominates(
        status in prop::option::of(any_status()),
        secrets_ready in any::<bool>(),
        has_finalizer in any::<bool>(),
        finalizer_removed in any::<bool>(),
        pre in any::<bool>(),
    ) {
        let observation = Observation {
            deleting: true,
            finalizer_removed,
            has_finalizer,
            secrets_ready,
            upgrade: pre.then_some(UpgradePhase::Pre),
            status,
        };
        let phase = derive_phase(&observation);
        prop_assert!(matches!(phase, Phase::Deleting | Phase::Deleted));
    }
}
