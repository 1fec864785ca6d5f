//! Health probes and Prometheus metrics.
//!
//! `/healthz` answers as long as the process serves HTTP. `/readyz` only
//! succeeds once this replica holds the leader lease and its controllers are
//! running, so standby replicas stay out of the Service. `/metrics` exposes
//! the registry below in the OpenMetrics text format.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tracing::{error, info};

use crate::controller::state_machine::Phase;
use crate::resources::jobs::UpgradePhase;

/// Port of the probe and metrics server.
pub const HEALTH_PORT: u16 = 8080;

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// One reconciled record.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RecordLabels {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl RecordLabels {
    pub fn new(kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    fn with_phase(&self, phase: Phase) -> PhaseLabels {
        PhaseLabels {
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            phase: phase.to_string(),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PhaseLabels {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub phase: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct UpgradeJobLabels {
    pub namespace: String,
    pub name: String,
    pub step: String,
}

/// Operator metrics, all prefixed with `ironic_operator_`.
pub struct Metrics {
    reconciliations: Family<RecordLabels, Counter>,
    reconcile_errors: Family<RecordLabels, Counter>,
    reconcile_duration: Family<RecordLabels, Histogram>,
    /// 1 for the current phase of a record, 0 for every other phase.
    record_phase: Family<PhaseLabels, Gauge>,
    upgrade_jobs: Family<UpgradeJobLabels, Counter>,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("ironic_operator");

        let reconciliations = Family::<RecordLabels, Counter>::default();
        registry.register(
            "reconciliations",
            "Reconcile passes per record",
            reconciliations.clone(),
        );

        let reconcile_errors = Family::<RecordLabels, Counter>::default();
        registry.register(
            "reconcile_errors",
            "Reconcile passes that ended with an error",
            reconcile_errors.clone(),
        );

        // 1ms up to ~16s; passes that create objects sit in the 10-100ms range.
        let reconcile_duration = Family::<RecordLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.001, 2.0, 15))
        });
        registry.register(
            "reconcile_duration_seconds",
            "Duration of one reconcile pass",
            reconcile_duration.clone(),
        );

        let record_phase = Family::<PhaseLabels, Gauge>::default();
        registry.register(
            "record_phase",
            "Lifecycle phase of each Ironic and IronicDatabase record",
            record_phase.clone(),
        );

        let upgrade_jobs = Family::<UpgradeJobLabels, Counter>::default();
        registry.register(
            "upgrade_jobs",
            "Database upgrade jobs started, by step",
            upgrade_jobs.clone(),
        );

        Self {
            reconciliations,
            reconcile_errors,
            reconcile_duration,
            record_phase,
            upgrade_jobs,
            registry,
        }
    }

    /// Count a finished pass and move the record to the phase it ended in.
    pub fn observe_reconcile(&self, record: &RecordLabels, elapsed: Duration, phase: Phase) {
        self.reconciliations.get_or_create(record).inc();
        self.reconcile_duration
            .get_or_create(record)
            .observe(elapsed.as_secs_f64());
        self.set_phase(record, phase);
    }

    pub fn record_error(&self, record: &RecordLabels) {
        self.reconcile_errors.get_or_create(record).inc();
    }

    /// A deleted record drops all of its phase series.
    pub fn set_phase(&self, record: &RecordLabels, phase: Phase) {
        for candidate in Phase::ALL {
            let labels = record.with_phase(candidate);
            if phase == Phase::Deleted {
                self.record_phase.remove(&labels);
            } else {
                self.record_phase
                    .get_or_create(&labels)
                    .set(i64::from(candidate == phase));
            }
        }
    }

    pub fn record_upgrade_job(&self, namespace: &str, name: &str, step: UpgradePhase) {
        let labels = UpgradeJobLabels {
            namespace: namespace.to_string(),
            name: name.to_string(),
            step: step.as_str().to_string(),
        };
        self.upgrade_jobs.get_or_create(&labels).inc();
    }

    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

/// Shared state between the controllers, the leader election loop and the
/// probe handlers.
pub struct HealthState {
    leader: AtomicBool,
    controllers_running: AtomicBool,
    /// Unix seconds of the last successful pass, 0 before the first one.
    last_reconcile: AtomicI64,
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            leader: AtomicBool::new(false),
            controllers_running: AtomicBool::new(false),
            last_reconcile: AtomicI64::new(0),
            metrics: Metrics::new(),
        }
    }

    pub fn set_leader(&self, leader: bool) {
        self.leader.store(leader, Ordering::SeqCst);
    }

    pub fn set_controllers_running(&self, running: bool) {
        self.controllers_running.store(running, Ordering::SeqCst);
    }

    /// Why the replica is not ready, or `None` when it is.
    pub fn not_ready_reason(&self) -> Option<&'static str> {
        if !self.leader.load(Ordering::SeqCst) {
            Some("not the leader")
        } else if !self.controllers_running.load(Ordering::SeqCst) {
            Some("controllers not running")
        } else {
            None
        }
    }

    pub fn is_ready(&self) -> bool {
        self.not_ready_reason().is_none()
    }

    pub fn mark_reconciled(&self) {
        self.last_reconcile
            .store(jiff::Timestamp::now().as_second(), Ordering::Relaxed);
    }

    pub fn last_reconcile(&self) -> Option<jiff::Timestamp> {
        match self.last_reconcile.load(Ordering::Relaxed) {
            0 => None,
            seconds => jiff::Timestamp::from_second(seconds).ok(),
        }
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    match state.not_ready_reason() {
        None => (StatusCode::OK, "ready").into_response(),
        Some(reason) => (StatusCode::SERVICE_UNAVAILABLE, reason).into_response(),
    }
}

async fn metrics(State(state): State<Arc<HealthState>>) -> Response {
    match state.metrics.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the probes and metrics on all interfaces until the listener fails.
pub async fn run_health_server(state: Arc<HealthState>) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], HEALTH_PORT));
    info!(port = HEALTH_PORT, "Starting health server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, create_router(state)).await
}
