//! An operator instance restricted to one test namespace.
//!
//! The instance runs in the test's runtime with its own [`HealthState`];
//! `start` returns once the controllers report running, and dropping the
//! value aborts them. Declare it after the [`TestNamespace`] so that it is
//! dropped first and the namespace teardown does not race a live controller.
//!
//! [`TestNamespace`]: crate::TestNamespace

use std::sync::Arc;
use std::time::{Duration, Instant};

use ironic_standalone_operator::{HealthState, OperatorConfig, run_controllers};
use kube::Client;
use tokio::task::JoinHandle;
use tracing::info;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
const STARTUP_POLL: Duration = Duration::from_millis(50);

pub struct ScopedOperator {
    handle: JoinHandle<()>,
    health: Arc<HealthState>,
    namespace: String,
}

impl ScopedOperator {
    pub async fn start(client: Client, namespace: &str) -> Self {
        Self::start_with_config(client, namespace, OperatorConfig::default()).await
    }

    /// Start with custom feature gates or images. The watch namespace is
    /// always overridden.
    pub async fn start_with_config(
        client: Client,
        namespace: &str,
        mut config: OperatorConfig,
    ) -> Self {
        config.watch_namespace = Some(namespace.to_string());

        // No lease in tests: this instance is the leader.
        let health = Arc::new(HealthState::new());
        health.set_leader(true);

        let handle = tokio::spawn(run_controllers(client, config, Some(health.clone())));

        let deadline = Instant::now() + STARTUP_TIMEOUT;
        while !health.is_ready() {
            assert!(
                !handle.is_finished(),
                "controllers for {} exited during start-up",
                namespace
            );
            assert!(
                Instant::now() < deadline,
                "controllers for {} not running after {:?}",
                namespace,
                STARTUP_TIMEOUT
            );
            tokio::time::sleep(STARTUP_POLL).await;
        }
        info!(namespace = %namespace, "Scoped operator running");

        Self {
            handle,
            health,
            namespace: namespace.to_string(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Time of the last pass that ended without an error.
    pub fn last_reconcile(&self) -> Option<jiff::Timestamp> {
        self.health.last_reconcile()
    }
}

impl Drop for ScopedOperator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
