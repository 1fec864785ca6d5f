//! ironic-standalone-operator: runs Ironic and its database from `Ironic`
//! and `IronicDatabase` records.
//!
//! `ironic-standalone-operator crdgen` prints both CRDs and exits. Otherwise
//! the process serves probes right away, waits for the leader lease and then
//! runs the controllers, plus the admission webhooks when certificates are
//! mounted. Losing the lease ends the process with an error so that the pod
//! restarts and rejoins the election.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kube::{Client, CustomResourceExt};
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ironic_standalone_operator::crd::{Ironic, IronicDatabase};
use ironic_standalone_operator::health::{HealthState, run_health_server};
use ironic_standalone_operator::{
    OperatorConfig, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, run_controllers, run_webhook_server,
};

const LEASE_NAME: &str = "ironic-standalone-operator-leader";
const LEASE_TTL: Duration = Duration::from_secs(15);
const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(5);

/// Time given to in-flight passes after SIGTERM.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

type BoxError = Box<dyn std::error::Error>;

const DEFAULT_LOG_FILTER: &str = "ironic_standalone_operator=info,kube=info,kube_leader_election=info";

#[derive(Debug, thiserror::Error)]
enum LeaderError {
    #[error("lease {0} was taken over by another replica")]
    Lost(&'static str),

    #[error("failed to renew the leader lease: {0}")]
    Renew(String),
}

/// Who competes for the lease, and where the Lease object lives.
struct LeaderIdentity {
    holder_id: String,
    namespace: String,
}

impl LeaderIdentity {
    fn from_env() -> Self {
        let holder_id = std::env::var("POD_NAME").unwrap_or_else(|_| {
            warn!("POD_NAME not set, using hostname");
            hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string())
        });
        let namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| {
            warn!("POD_NAMESPACE not set, using 'default'");
            "default".to_string()
        });
        Self {
            holder_id,
            namespace,
        }
    }

    fn lease_lock(&self, client: Client) -> LeaseLock {
        LeaseLock::new(
            client,
            &self.namespace,
            LeaseLockParams {
                holder_id: self.holder_id.clone(),
                lease_name: LEASE_NAME.to_string(),
                lease_ttl: LEASE_TTL,
            },
        )
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    if std::env::args().nth(1).as_deref() == Some("crdgen") {
        return print_crds();
    }

    init_tracing()?;
    info!("Starting ironic-standalone-operator");

    let config = OperatorConfig::from_env()?;
    info!(
        watch_namespace = ?config.watch_namespace,
        default_version = %config.default_version,
        concurrency = config.max_concurrent_reconciles,
        high_availability = config.feature_gates.high_availability,
        "Loaded configuration"
    );

    let client = Client::try_default().await?;
    let identity = LeaderIdentity::from_env();
    let health_state = Arc::new(HealthState::new());

    // Probes must answer on standby replicas too.
    let health_handle = tokio::spawn(run_health_server(health_state.clone()));

    let lease_lock = identity.lease_lock(client.clone());
    info!(
        holder_id = %identity.holder_id,
        namespace = %identity.namespace,
        lease_name = LEASE_NAME,
        "Waiting for leadership"
    );
    acquire_leadership(&lease_lock).await;
    health_state.set_leader(true);
    info!("Acquired leadership");

    let controller_handle = tokio::spawn(run_controllers(
        client.clone(),
        config.clone(),
        Some(health_state.clone()),
    ));
    let webhook_handle = spawn_webhook_server(config);

    let outcome: Result<(), BoxError> = tokio::select! {
        result = controller_handle => {
            error!("Controllers stopped");
            result.map_err(BoxError::from)
        }
        result = health_handle => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BoxError::from(e)),
            Err(e) => Err(BoxError::from(e)),
        },
        result = async {
            match webhook_handle {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        } => {
            if let Err(e) = result {
                error!("Webhook server task panicked: {}", e);
            }
            Ok(())
        }
        e = keep_leadership(&lease_lock) => {
            health_state.set_leader(false);
            error!("{}", e);
            Err(BoxError::from(e))
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
            health_state.set_leader(false);
            info!(
                grace_period_secs = SHUTDOWN_GRACE_PERIOD.as_secs(),
                "Waiting for in-flight reconciliations"
            );
            tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;
            Ok(())
        }
    };

    info!("Operator stopped");
    outcome
}

fn print_crds() -> Result<(), BoxError> {
    for crd in [Ironic::crd(), IronicDatabase::crd()] {
        println!("---");
        println!("{}", serde_json::to_string_pretty(&crd)?);
    }
    Ok(())
}

/// JSON logs, filtered by `RUST_LOG` on top of the operator defaults.
fn init_tracing() -> Result<(), BoxError> {
    let mut filter = EnvFilter::from_default_env();
    for directive in DEFAULT_LOG_FILTER.split(',') {
        filter = filter.add_directive(directive.parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();
    Ok(())
}

/// Retry until the lease is ours.
async fn acquire_leadership(lease_lock: &LeaseLock) {
    loop {
        match lease_lock.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => return,
            Ok(_) => info!("Another replica is leader, waiting"),
            Err(e) => warn!("Failed to acquire lease: {}, retrying", e),
        }
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
    }
}

/// Renew the lease until a renewal fails.
async fn keep_leadership(lease_lock: &LeaseLock) -> LeaderError {
    loop {
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
        match lease_lock.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => {}
            Ok(_) => return LeaderError::Lost(LEASE_NAME),
            Err(e) => return LeaderError::Renew(e.to_string()),
        }
    }
}

fn spawn_webhook_server(config: OperatorConfig) -> Option<tokio::task::JoinHandle<()>> {
    if !(Path::new(WEBHOOK_CERT_PATH).exists() && Path::new(WEBHOOK_KEY_PATH).exists()) {
        info!("Webhook certificates not found, webhook server disabled");
        return None;
    }
    info!("Webhook certificates found, starting webhook server");
    let config = Arc::new(config);
    Some(tokio::spawn(async move {
        if let Err(e) = run_webhook_server(config, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH).await {
            error!("Webhook server error: {}", e);
        }
    }))
}

/// Resolves on SIGTERM or SIGINT. A handler that cannot be installed never
/// resolves, leaving the other one in charge.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
