//! Test fixtures and builder patterns for Ironic and IronicDatabase.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentCondition, DeploymentStatus};
use k8s_openapi::api::batch::v1::{Job, JobCondition, JobStatus};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use ironic_standalone_operator::config::OperatorConfig;
use ironic_standalone_operator::crd::{
    CONDITION_READY, Condition, Database, Dhcp, IpAddressManager, Ironic, IronicDatabase,
    IronicDatabaseSpec, IronicSpec, IronicStatus, REASON_DEPLOYMENT_AVAILABLE,
};

/// Builder for creating Ironic test fixtures.
///
/// # Example
/// ```ignore
/// let ironic = IronicBuilder::new("ironic")
///     .namespace("metal3")
///     .keepalived("eth0", "192.0.2.2")
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct IronicBuilder {
    name: String,
    namespace: String,
    spec: IronicSpec,
    status: Option<IronicStatus>,
    generation: Option<i64>,
    uid: String,
}

impl IronicBuilder {
    /// Create a new builder with the given record name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: "metal3".to_string(),
            spec: IronicSpec::default(),
            status: None,
            generation: Some(1),
            uid: "ironic-uid".to_string(),
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.spec.version = Some(version.into());
        self
    }

    pub fn api_credentials(mut self, name: impl Into<String>) -> Self {
        self.spec.api_credentials_name = name.into();
        self
    }

    /// Use an external database at `host`.
    pub fn external_database(mut self, host: impl Into<String>, credentials: &str) -> Self {
        self.spec.database = Some(Database {
            host: Some(host.into()),
            credentials_name: Some(credentials.to_string()),
            ..Default::default()
        });
        self
    }

    /// Use the managed IronicDatabase `name`.
    pub fn managed_database(mut self, name: impl Into<String>) -> Self {
        self.spec.database = Some(Database {
            ironic_database_name: Some(name.into()),
            ..Default::default()
        });
        self
    }

    pub fn high_availability(mut self) -> Self {
        self.spec.high_availability = true;
        self
    }

    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.spec.networking.interface = Some(interface.into());
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.spec.networking.ip_address = Some(ip.into());
        self
    }

    /// Static provisioning IP managed by keepalived on `interface`.
    pub fn keepalived(self, interface: &str, ip: &str) -> Self {
        let mut builder = self.interface(interface).ip_address(ip);
        builder.spec.networking.ip_address_manager = IpAddressManager::Keepalived;
        builder
    }

    pub fn dhcp(mut self, cidr: &str, begin: Option<&str>, end: Option<&str>) -> Self {
        self.spec.networking.dhcp = Some(Dhcp {
            network_cidr: Some(cidr.to_string()),
            range_begin: begin.map(str::to_string),
            range_end: end.map(str::to_string),
            ..Default::default()
        });
        self
    }

    pub fn tls(mut self, certificate: impl Into<String>) -> Self {
        self.spec.tls.certificate_name = Some(certificate.into());
        self
    }

    /// Mark the record as deployed and Ready at `installed`.
    pub fn installed(mut self, installed: &str) -> Self {
        self.status = Some(IronicStatus {
            installed_version: Some(installed.to_string()),
            requested_version: Some(installed.to_string()),
            conditions: vec![Condition::ready(
                true,
                REASON_DEPLOYMENT_AVAILABLE,
                "Ironic is available",
                self.generation,
            )],
            observed_generation: self.generation,
            ..Default::default()
        });
        self
    }

    pub fn status(mut self, status: IronicStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Mutable access for tweaks the builder has no method for.
    pub fn spec_mut(&mut self) -> &mut IronicSpec {
        &mut self.spec
    }

    pub fn build(self) -> Ironic {
        let mut ironic = Ironic::new(&self.name, self.spec);
        ironic.metadata.namespace = Some(self.namespace);
        ironic.metadata.uid = Some(self.uid);
        ironic.metadata.generation = self.generation;
        ironic.status = self.status;
        ironic
    }
}

/// Builder for creating IronicDatabase test fixtures.
#[derive(Clone, Debug)]
pub struct IronicDatabaseBuilder {
    name: String,
    namespace: String,
    spec: IronicDatabaseSpec,
}

impl IronicDatabaseBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: "metal3".to_string(),
            spec: IronicDatabaseSpec::default(),
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn credentials(mut self, name: impl Into<String>) -> Self {
        self.spec.credentials_name = Some(name.into());
        self
    }

    pub fn tls(mut self, certificate: impl Into<String>) -> Self {
        self.spec.tls_certificate_name = Some(certificate.into());
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.spec.image = Some(image.into());
        self
    }

    pub fn build(self) -> IronicDatabase {
        let mut database = IronicDatabase::new(&self.name, self.spec);
        database.metadata.namespace = Some(self.namespace);
        database.metadata.uid = Some("database-uid".to_string());
        database.metadata.generation = Some(1);
        database
    }
}

/// Operator configuration with the HighAvailability gate set as given.
pub fn operator_config(high_availability: bool) -> OperatorConfig {
    let mut config = OperatorConfig::default();
    config.feature_gates.high_availability = high_availability;
    config
}

fn secret(name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("metal3".to_string()),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                .collect::<BTreeMap<_, _>>(),
        ),
        ..Default::default()
    }
}

/// A credentials Secret with `username` and `password`.
pub fn credentials_secret(name: &str, username: &str, password: &str) -> Secret {
    secret(name, &[("username", username), ("password", password)])
}

/// A kubernetes.io/tls Secret with dummy contents.
pub fn tls_secret(name: &str) -> Secret {
    let mut secret = secret(name, &[("tls.crt", "CERT"), ("tls.key", "KEY")]);
    secret.type_ = Some("kubernetes.io/tls".to_string());
    secret
}

/// A Deployment whose controller observed generation 1 and reports it
/// Available.
pub fn available_deployment(name: &str) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            generation: Some(1),
            ..Default::default()
        },
        status: Some(DeploymentStatus {
            observed_generation: Some(1),
            conditions: Some(vec![DeploymentCondition {
                type_: "Available".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Give `job` a terminal condition of type `kind` (Complete or Failed).
pub fn finish_job(mut job: Job, kind: &str, message: &str) -> Job {
    job.status = Some(JobStatus {
        conditions: Some(vec![JobCondition {
            type_: kind.to_string(),
            status: "True".to_string(),
            message: Some(message.to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    });
    job
}

/// Status of the Ready condition, if any.
pub fn ready_condition(status: &IronicStatus) -> Option<&Condition> {
    status
        .conditions
        .iter()
        .find(|c| c.r#type == CONDITION_READY)
}
