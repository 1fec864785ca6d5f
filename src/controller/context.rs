//! Shared context for the controllers.
//!
//! The Context struct holds shared state that is passed to the reconcilers,
//! including the Kubernetes client, the operator configuration, the cache of
//! labeled Secrets and the event recorder.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::runtime::reflector::Store;
use kube::{Client, Resource};

use crate::config::OperatorConfig;
use crate::health::HealthState;

/// Field manager name for the operator
pub const FIELD_MANAGER: &str = "ironic-standalone-operator";

/// Shared context for the controllers
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Event reporter identity
    reporter: Reporter,
    /// Optional health state for metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
    /// Operator configuration
    pub config: Arc<OperatorConfig>,
    /// Cache of Secrets carrying the environment label
    pub secret_store: Option<Store<Secret>>,
    /// Whether the ServiceMonitor CRD was found at start-up
    pub service_monitor_available: bool,
}

impl Context {
    /// Create a new context
    pub fn new(
        client: Client,
        config: Arc<OperatorConfig>,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: FIELD_MANAGER.into(),
                instance: std::env::var("POD_NAME").ok(),
            },
            health_state,
            config,
            secret_store: None,
            service_monitor_available: false,
        }
    }

    /// Use a reflector store for Secret lookups
    pub fn with_secret_store(mut self, store: Store<Secret>) -> Self {
        self.secret_store = Some(store);
        self
    }

    /// Record whether ServiceMonitors can be created
    pub fn with_service_monitor(mut self, available: bool) -> Self {
        self.service_monitor_available = available;
        self
    }

    /// Create an event recorder for publishing Kubernetes events
    fn recorder(&self) -> Recorder {
        Recorder::new(self.client.clone(), self.reporter.clone())
    }

    async fn publish<K>(
        &self,
        resource: &K,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) where
        K: Resource<DynamicType = ()>,
    {
        let recorder = self.recorder();
        let object_ref = resource.object_ref(&());
        if let Err(e) = recorder
            .publish(
                &Event {
                    type_,
                    reason: reason.into(),
                    note,
                    action: action.into(),
                    secondary: None,
                },
                &object_ref,
            )
            .await
        {
            tracing::warn!(reason = %reason, error = %e, "Failed to publish event");
        }
    }

    /// Publish a normal event for a resource
    pub async fn publish_normal_event<K>(
        &self,
        resource: &K,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) where
        K: Resource<DynamicType = ()>,
    {
        self.publish(resource, EventType::Normal, reason, action, note)
            .await;
    }

    /// Publish a warning event for a resource
    pub async fn publish_warning_event<K>(
        &self,
        resource: &K,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) where
        K: Resource<DynamicType = ()>,
    {
        self.publish(resource, EventType::Warning, reason, action, note)
            .await;
    }
}
