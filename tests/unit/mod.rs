// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for ironic-standalone-operator.
//!
//! These tests run without a Kubernetes cluster and test individual
//! components in isolation through the public API.

#[path = "../common/mod.rs"]
mod common;

mod version_tests {
    use ironic_standalone_operator::crd::{SUPPORTED_VERSIONS, Version, VersionError};

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "0.42".parse::<Version>(),
            Err(VersionError::InvalidMajor(_))
        ));
        assert!(matches!(
            "42.foo".parse::<Version>(),
            Err(VersionError::InvalidMinor(_))
        ));
        assert!(matches!(
            "1,2".parse::<Version>(),
            Err(VersionError::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_ordering() {
        let v = |s: &str| s.parse::<Version>().unwrap();
        assert!(Version::Latest > v("99.99"));
        assert!(v("41.99") < v("42.0"));
        assert!(v("42.99") > v("42.0"));
    }

    #[test]
    fn test_display_round_trip() {
        for version in SUPPORTED_VERSIONS {
            assert_eq!(version.to_string().parse::<Version>().unwrap(), *version);
        }
    }

    #[test]
    fn test_image_tag() {
        assert_eq!(Version::new(32, 0).image_tag(), "release-32.0");
        assert_eq!(Version::Latest.image_tag(), "latest");
    }

    #[test]
    fn test_unsupported_version() {
        let err = Version::new(12, 0).ensure_supported().unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }
}

mod defaults_tests {
    use ipnet::IpNet;
    use ironic_standalone_operator::crd::{Dhcp, default_dhcp_range, set_dhcp_defaults};

    fn range(cidr: &str) -> Option<(String, String)> {
        let network: IpNet = cidr.parse().unwrap();
        default_dhcp_range(&network).map(|(a, b)| (a.to_string(), b.to_string()))
    }

    #[test]
    fn test_ipv4_range() {
        assert_eq!(
            range("10.1.42.0/24"),
            Some(("10.1.42.10".to_string(), "10.1.42.253".to_string()))
        );
    }

    #[test]
    fn test_ipv6_range() {
        assert_eq!(
            range("2001:db8::/112"),
            Some(("2001:db8::a".to_string(), "2001:db8::fffd".to_string()))
        );
    }

    #[test]
    fn test_network_too_small() {
        assert_eq!(range("10.1.42.0/32"), None);
        assert_eq!(range("10.1.42.0/29"), None);
    }

    #[test]
    fn test_set_defaults_keeps_explicit_values() {
        let mut dhcp = Dhcp {
            network_cidr: Some("192.0.2.0/24".to_string()),
            range_begin: Some("192.0.2.100".to_string()),
            ..Default::default()
        };
        set_dhcp_defaults(&mut dhcp);
        assert_eq!(dhcp.range_begin.as_deref(), Some("192.0.2.100"));
        assert_eq!(dhcp.range_end.as_deref(), Some("192.0.2.253"));
    }
}

mod crd_tests {
    use ironic_standalone_operator::crd::{
        DEFAULT_API_PORT, DEFAULT_IMAGE_SERVER_PORT, Ironic, IronicDatabase, IronicSpec,
    };
    use kube::CustomResourceExt;

    #[test]
    fn test_serde_field_names() {
        let spec: IronicSpec = serde_json::from_value(serde_json::json!({
            "networking": {
                "interface": "eth0",
                "ipAddress": "192.0.2.2",
                "externalIP": "198.51.100.1",
                "ipAddressManager": "keepalived",
                "dhcp": {"networkCIDR": "192.0.2.0/24", "serveDNS": true}
            },
            "tls": {"certificateName": "ironic-tls", "disableVirtualMediaTLS": true},
            "apiCredentialsName": "creds"
        }))
        .unwrap();
        assert_eq!(spec.networking.external_ip(), Some("198.51.100.1"));
        assert!(spec.networking.uses_keepalived());
        let dhcp = spec.networking.dhcp.as_ref().unwrap();
        assert_eq!(dhcp.network_cidr(), Some("192.0.2.0/24"));
        assert!(dhcp.serve_dns);
        assert!(spec.tls.enabled());
        assert!(!spec.tls.virtual_media_tls());
        assert_eq!(spec.api_credentials_name, "creds");
    }

    #[test]
    fn test_port_defaults() {
        let spec: IronicSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(spec.networking.api_port, DEFAULT_API_PORT);
        assert_eq!(spec.networking.image_server_port, DEFAULT_IMAGE_SERVER_PORT);
        assert!(!spec.high_availability);
    }

    #[test]
    fn test_crd_definitions() {
        let ironic = Ironic::crd();
        assert_eq!(ironic.spec.group, "ironic.metal3.io");
        assert_eq!(ironic.spec.names.kind, "Ironic");
        let database = IronicDatabase::crd();
        assert_eq!(database.spec.names.plural, "ironicdatabases");
    }
}

mod config_tests {
    use std::collections::BTreeMap;

    use ironic_standalone_operator::config::{ConfigError, OperatorConfig};
    use ironic_standalone_operator::crd::Version;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::from_map(&BTreeMap::new()).unwrap();
        assert_eq!(config.default_version, Version::Latest);
        assert_eq!(config.cluster_domain, "cluster.local");
        assert!(!config.feature_gates.high_availability);
        assert!(config.watch_namespace.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = OperatorConfig::from_map(&vars(&[
            ("IRONIC_VERSION", "32.0"),
            ("IRONIC_FEATURE_GATES", "HighAvailability=true"),
            ("WATCH_NAMESPACE", "metal3"),
            ("IRONIC_IMAGE", "registry.example.com/ironic:v1"),
        ]))
        .unwrap();
        assert_eq!(config.default_version, Version::new(32, 0));
        assert!(config.feature_gates.high_availability);
        assert_eq!(config.watch_namespace.as_deref(), Some("metal3"));
        assert_eq!(config.images.ironic, "registry.example.com/ironic:v1");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            OperatorConfig::from_map(&vars(&[("IRONIC_FEATURE_GATES", "Bogus=true")])),
            Err(ConfigError::UnknownFeatureGate(_))
        ));
        assert!(OperatorConfig::from_map(&vars(&[("IRONIC_VERSION", "12.0")])).is_err());
        assert!(OperatorConfig::from_map(&vars(&[("MAX_CONCURRENT_RECONCILES", "0")])).is_err());
    }
}

mod status_tests {
    use std::time::Duration;

    use ironic_standalone_operator::controller::status::{
        ConditionBuilder, REQUEUE_DEPLOYMENT_FAILED, REQUEUE_IN_PROGRESS, Status, fold, is_ready,
    };
    use kube::runtime::controller::Action;

    #[test]
    fn test_fold_priority() {
        assert_eq!(fold(Vec::new()), Status::Ready);
        let folded = fold([
            Status::Ready,
            Status::in_progress("waiting"),
            Status::updated("written"),
        ]);
        assert_eq!(folded, Status::updated("written"));
        let folded = fold([Status::updated("written"), Status::deployment_failed("boom")]);
        assert!(folded.is_error());
    }

    #[test]
    fn test_actions() {
        assert_eq!(
            Status::in_progress("x").action(),
            Action::requeue(REQUEUE_IN_PROGRESS)
        );
        assert_eq!(
            Status::deployment_failed("x").action(),
            Action::requeue(REQUEUE_DEPLOYMENT_FAILED)
        );
        assert_eq!(Status::user_error("x").action(), Action::await_change());
        assert_eq!(REQUEUE_IN_PROGRESS, Duration::from_secs(10));
    }

    #[test]
    fn test_transition_time_kept() {
        let mut builder = ConditionBuilder::new();
        builder.status(&Status::Ready, "Ironic", Some(1));
        let first = builder.build();

        let mut builder = ConditionBuilder::from_existing(&first);
        builder.status(&Status::Ready, "Ironic", Some(2));
        let second = builder.build();
        assert!(is_ready(&second));
        assert_eq!(
            first[0].last_transition_time,
            second[0].last_transition_time
        );
        assert_eq!(second[0].observed_generation, Some(2));
    }
}

mod state_machine_tests {
    use ironic_standalone_operator::controller::state_machine::{Observation, Phase, derive_phase};
    use ironic_standalone_operator::controller::status::Status;

    #[test]
    fn test_restart_derives_same_phase() {
        let observation = Observation {
            has_finalizer: true,
            secrets_ready: true,
            status: Some(Status::Ready),
            ..Default::default()
        };
        assert_eq!(derive_phase(&observation), Phase::Ready);
        assert_eq!(derive_phase(&observation.clone()), Phase::Ready);
    }

    #[test]
    fn test_nothing_leaves_deleted() {
        for phase in Phase::ALL {
            assert!(!Phase::Deleted.can_transition_to(phase));
        }
    }
}

mod secrets_tests {
    use ironic_standalone_operator::controller::secrets::{
        KEY_HTPASSWD, check_tls_secret, generate_credentials, htpasswd_matches,
        new_credentials_secret, read_credentials, update_htpasswd,
    };

    use crate::common::{IronicBuilder, credentials_secret, tls_secret};

    #[test]
    fn test_generated_secret_verifies() {
        let ironic = IronicBuilder::new("ironic").build();
        let credentials = generate_credentials();
        let secret = new_credentials_secret(
            &ironic,
            "ironic-api-credentials".to_string(),
            "api-credentials",
            &credentials,
            true,
        )
        .unwrap();

        let read_back = read_credentials(&secret).unwrap();
        assert_eq!(read_back, credentials);
        let entry = secret.data.as_ref().unwrap().get(KEY_HTPASSWD).unwrap();
        let entry = String::from_utf8(entry.0.clone()).unwrap();
        assert!(htpasswd_matches(&read_back, &entry));

        let owners = secret.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_ne!(owners[0].controller, Some(true));
    }

    #[test]
    fn test_read_trims_whitespace() {
        let secret = credentials_secret("creds", " admin\n", "s3cret\n");
        let credentials = read_credentials(&secret).unwrap();
        assert_eq!(credentials.username, "admin");
        assert_eq!(credentials.password, "s3cret");
    }

    #[test]
    fn test_invalid_username() {
        let secret = credentials_secret("creds", "ad:min", "s3cret");
        assert!(read_credentials(&secret).is_err());
    }

    #[test]
    fn test_htpasswd_refreshed_once() {
        let mut secret = credentials_secret("creds", "admin", "s3cret");
        assert!(update_htpasswd(&mut secret).unwrap());
        assert!(!update_htpasswd(&mut secret).unwrap());
    }

    #[test]
    fn test_tls_secret() {
        assert!(check_tls_secret(&tls_secret("ironic-tls")).is_ok());
        assert!(check_tls_secret(&credentials_secret("creds", "a", "b")).is_err());
    }
}

mod version_info_tests {
    use ironic_standalone_operator::config::OperatorConfig;
    use ironic_standalone_operator::controller::version_info::{VersionInfo, image_with_tag};
    use ironic_standalone_operator::crd::{Images, Version};

    #[test]
    fn test_version_swaps_tag() {
        let info = VersionInfo::from_config(&OperatorConfig::default())
            .with_overrides(Some("32.0"), &Images::default())
            .unwrap();
        assert_eq!(info.installed_version, Version::new(32, 0));
        assert_eq!(info.ironic_image, "quay.io/metal3-io/ironic:release-32.0");
    }

    #[test]
    fn test_image_override_wins() {
        let images = Images {
            ironic: Some("example.com/ironic:custom".to_string()),
            ..Default::default()
        };
        let info = VersionInfo::from_config(&OperatorConfig::default())
            .with_overrides(Some("32.0"), &images)
            .unwrap();
        assert_eq!(info.ironic_image, "example.com/ironic:custom");
    }

    #[test]
    fn test_registry_port() {
        assert_eq!(
            image_with_tag("registry:5000/ironic", "latest"),
            "registry:5000/ironic:latest"
        );
    }
}
