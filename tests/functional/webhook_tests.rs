//! Admission policies for Ironic and IronicDatabase.

use ironic_standalone_operator::config::OperatorConfig;
use ironic_standalone_operator::crd::{Ironic, IronicDatabase};
use ironic_standalone_operator::webhooks::policies::{validate_ironic, validate_ironic_database};
use ironic_standalone_operator::webhooks::{ValidationContext, ValidationResult};

use crate::{IronicBuilder, IronicDatabaseBuilder, operator_config};

fn admit(new: &Ironic, old: Option<&Ironic>, config: &OperatorConfig) -> ValidationResult {
    validate_ironic(&ValidationContext {
        resource: new,
        old_resource: old,
        dry_run: false,
        namespace: Some("metal3"),
        config,
    })
}

fn admit_database(new: &IronicDatabase, old: Option<&IronicDatabase>) -> ValidationResult {
    let config = OperatorConfig::default();
    validate_ironic_database(&ValidationContext {
        resource: new,
        old_resource: old,
        dry_run: false,
        namespace: Some("metal3"),
        config: &config,
    })
}

#[test]
fn test_create_allowed() {
    let ironic = IronicBuilder::new("ironic")
        .keepalived("eth0", "192.0.2.2")
        .dhcp("192.0.2.0/24", None, None)
        .build();
    assert!(admit(&ironic, None, &OperatorConfig::default()).allowed);
}

#[test]
fn test_create_denied_with_field_path() {
    let ironic = IronicBuilder::new("ironic")
        .high_availability()
        .external_database("db.example.com", "db-creds")
        .build();
    let result = admit(&ironic, None, &operator_config(false));
    assert!(!result.allowed);
    assert_eq!(result.reason.as_deref(), Some("ValidationFailed"));
    assert!(
        result
            .message
            .unwrap()
            .starts_with("spec.highAvailability")
    );
}

#[test]
fn test_database_cannot_change() {
    let old = IronicBuilder::new("ironic")
        .external_database("db.example.com", "db-creds")
        .build();
    let new = IronicBuilder::new("ironic")
        .external_database("other.example.com", "db-creds")
        .build();
    let result = admit(&new, Some(&old), &OperatorConfig::default());
    assert!(!result.allowed);
    assert_eq!(result.reason.as_deref(), Some("ImmutableField"));
}

#[test]
fn test_downgrade_denied_on_update() {
    let old = IronicBuilder::new("ironic")
        .external_database("db.example.com", "db-creds")
        .version("32.0")
        .installed("32.0")
        .build();
    let new = IronicBuilder::new("ironic")
        .external_database("db.example.com", "db-creds")
        .version("31.0")
        .build();
    let result = admit(&new, Some(&old), &OperatorConfig::default());
    assert!(!result.allowed);
    assert_eq!(result.reason.as_deref(), Some("DowngradeRefused"));

    let upgrade = IronicBuilder::new("ironic")
        .external_database("db.example.com", "db-creds")
        .version("33.0")
        .build();
    assert!(admit(&upgrade, Some(&old), &OperatorConfig::default()).allowed);
}

#[test]
fn test_database_credentials_immutable() {
    let old = IronicDatabaseBuilder::new("idb").credentials("first").build();
    let same = IronicDatabaseBuilder::new("idb")
        .credentials("first")
        .tls("idb-tls")
        .build();
    assert!(admit_database(&same, Some(&old)).allowed);

    let changed = IronicDatabaseBuilder::new("idb").credentials("second").build();
    let result = admit_database(&changed, Some(&old));
    assert!(!result.allowed);
    assert!(result.message.unwrap().contains("credentialsName"));
}

#[test]
fn test_database_name_length() {
    let long = IronicDatabaseBuilder::new("x".repeat(41)).build();
    assert!(!admit_database(&long, None).allowed);
}
