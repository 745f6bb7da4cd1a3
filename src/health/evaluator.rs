// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Health evaluation of one `Postgres` per tick.
//!
//! # Steps
//!
//! 1. Instances being deleted are skipped.
//! 2. Every pod that is not yet ready is probed at its pod DNS name. A pod that
//!    answers gets its `Ready` condition set; one that does not is left alone and
//!    the next pod is tried.
//! 3. The primary service is probed. On failure `DatabaseAcceptingConnection` and
//!    `DatabaseReady` are both set to `False` and evaluation stops for this tick.
//!    On success `DatabaseAcceptingConnection` becomes `True`.
//! 4. Clustered instances (more than one replica) re-probe the primary and then
//!    every pod, stopping at the first failure. A standalone instance is healthy
//!    once its primary answered.
//! 5. A healthy instance gets `DatabaseReady=True`. An unhealthy one keeps whatever
//!    `DatabaseReady` it had.
//!
//! Replication lag between the primary and standbys is not checked.

use crate::constants::POSTGRES_PORT;
use crate::crd::Postgres;
use crate::metrics::record_health_probe;
use crate::postgres::LivenessProbe;
use crate::reconcilers::status::ConditionUpdate;
use crate::status_reasons::{
    accepting_connection_message, not_accepting_connection_message, ready_message,
    CONDITION_TYPE_ACCEPTING_CONNECTION, CONDITION_TYPE_POD_READY, CONDITION_TYPE_READY,
    REASON_ACCEPTING_CONNECTION, REASON_NOT_ACCEPTING_CONNECTION,
    REASON_READINESS_CHECK_FAILED, REASON_READINESS_CHECK_SUCCEEDED, STATUS_FALSE, STATUS_TRUE,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the evaluator reads from and writes to the cluster.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Every `Postgres` in every namespace.
    async fn list_postgres(&self) -> Result<Vec<Arc<Postgres>>>;

    /// Pods selected by the instance's offshoot labels.
    async fn list_pods(&self, pg: &Postgres) -> Result<Vec<Pod>>;

    /// Set the pod's `Ready` condition to `True`.
    async fn mark_pod_ready(&self, pod: &Pod) -> Result<()>;

    /// Port of the primary service.
    async fn primary_service_port(&self, pg: &Postgres) -> Result<u16>;

    /// Write instance-level conditions.
    async fn set_conditions(&self, pg: &Postgres, updates: Vec<ConditionUpdate>) -> Result<()>;
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    /// Not evaluated this tick (deleting, or the cluster could not be read).
    Skipped,
    /// The primary did not answer.
    PrimaryOffline,
    /// The primary answered but a cluster member did not.
    Unhealthy,
    Healthy,
}

/// Per-tick result for one instance. Not persisted beyond the conditions it feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCondition {
    /// `namespace/name`
    pub instance: String,
    pub online: bool,
    pub checked_at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub verdict: HealthVerdict,
    pub condition: HealthCondition,
    /// Pods whose `Ready` condition was set this tick.
    pub pods_marked_ready: Vec<String>,
}

impl HealthReport {
    fn new(instance: String, verdict: HealthVerdict, reason: Option<String>) -> Self {
        Self {
            verdict,
            condition: HealthCondition {
                instance,
                online: matches!(verdict, HealthVerdict::Healthy | HealthVerdict::Unhealthy),
                checked_at: Utc::now(),
                reason,
            },
            pods_marked_ready: Vec::new(),
        }
    }
}

fn pod_is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == CONDITION_TYPE_POD_READY && c.status == STATUS_TRUE)
        })
}

/// Runs the per-instance health state machine.
pub struct HealthEvaluator {
    store: Arc<dyn HealthStore>,
    prober: Arc<dyn LivenessProbe>,
    governing_service: String,
}

impl HealthEvaluator {
    #[must_use]
    pub fn new(
        store: Arc<dyn HealthStore>,
        prober: Arc<dyn LivenessProbe>,
        governing_service: impl Into<String>,
    ) -> Self {
        Self {
            store,
            prober,
            governing_service: governing_service.into(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn HealthStore> {
        &self.store
    }

    async fn probe_pod(&self, pg: &Postgres, pod: &Pod) -> Result<(), crate::errors::ProbeError> {
        let host = pg.host_dns(&pod.name_any(), &self.governing_service);
        let result = self.prober.probe(pg, &host, POSTGRES_PORT).await;
        record_health_probe("pod", result.as_ref().map_or_else(|e| e.kind(), |_| "online"));
        result
    }

    /// Evaluate one instance and write the resulting conditions.
    pub async fn evaluate(&self, pg: &Postgres) -> HealthReport {
        let namespace = pg.namespace().unwrap_or_default();
        let name = pg.name_any();
        let instance = format!("{namespace}/{name}");

        if pg.is_being_deleted() {
            debug!(namespace = %namespace, name = %name, "Skipping health check of deleting Postgres");
            return HealthReport::new(instance, HealthVerdict::Skipped, Some("deleting".to_string()));
        }

        let pods = match self.store.list_pods(pg).await {
            Ok(pods) => pods,
            Err(e) => {
                warn!(namespace = %namespace, name = %name, error = %e, "Failed to list pods");
                return HealthReport::new(instance, HealthVerdict::Skipped, Some(e.to_string()));
            }
        };

        let mut pods_marked_ready = Vec::new();
        for pod in pods.iter().filter(|pod| !pod_is_ready(pod)) {
            let pod_name = pod.name_any();
            match self.probe_pod(pg, pod).await {
                Ok(()) => match self.store.mark_pod_ready(pod).await {
                    Ok(()) => pods_marked_ready.push(pod_name),
                    Err(e) => {
                        warn!(namespace = %namespace, pod = %pod_name, error = %e, "Failed to mark pod ready");
                    }
                },
                Err(e) => {
                    debug!(namespace = %namespace, pod = %pod_name, error = %e, "Pod is not accepting connections yet");
                }
            }
        }

        let port = match self.store.primary_service_port(pg).await {
            Ok(port) => port,
            Err(e) => {
                warn!(namespace = %namespace, name = %name, error = %e, "Failed to resolve primary service port");
                let mut report =
                    HealthReport::new(instance, HealthVerdict::Skipped, Some(e.to_string()));
                report.pods_marked_ready = pods_marked_ready;
                return report;
            }
        };

        let primary_host = pg.primary_service_dns();
        let primary = self.prober.probe(pg, &primary_host, port).await;
        record_health_probe(
            "primary",
            primary.as_ref().map_or_else(|e| e.kind(), |_| "online"),
        );

        if let Err(e) = primary {
            warn!(namespace = %namespace, name = %name, error = %e, "Postgres is not accepting connections");
            let message = not_accepting_connection_message(&namespace, &name, &e.to_string());
            let updates = vec![
                ConditionUpdate {
                    condition_type: CONDITION_TYPE_ACCEPTING_CONNECTION,
                    status: STATUS_FALSE,
                    reason: REASON_NOT_ACCEPTING_CONNECTION,
                    message: message.clone(),
                },
                ConditionUpdate {
                    condition_type: CONDITION_TYPE_READY,
                    status: STATUS_FALSE,
                    reason: REASON_READINESS_CHECK_FAILED,
                    message,
                },
            ];
            self.write_conditions(pg, updates).await;

            let mut report =
                HealthReport::new(instance, HealthVerdict::PrimaryOffline, Some(e.to_string()));
            report.pods_marked_ready = pods_marked_ready;
            return report;
        }

        let mut updates = vec![ConditionUpdate {
            condition_type: CONDITION_TYPE_ACCEPTING_CONNECTION,
            status: STATUS_TRUE,
            reason: REASON_ACCEPTING_CONNECTION,
            message: accepting_connection_message(&namespace, &name),
        }];

        let cluster = if pg.spec.replicas() > 1 {
            self.check_cluster(pg, &primary_host, port, &pods).await
        } else {
            Ok(())
        };

        let (verdict, reason) = match cluster {
            Ok(()) => {
                updates.push(ConditionUpdate {
                    condition_type: CONDITION_TYPE_READY,
                    status: STATUS_TRUE,
                    reason: REASON_READINESS_CHECK_SUCCEEDED,
                    message: ready_message(&namespace, &name),
                });
                (HealthVerdict::Healthy, None)
            }
            Err(reason) => {
                info!(namespace = %namespace, name = %name, reason = %reason, "Postgres cluster is unhealthy");
                (HealthVerdict::Unhealthy, Some(reason))
            }
        };

        self.write_conditions(pg, updates).await;

        let mut report = HealthReport::new(instance, verdict, reason);
        report.pods_marked_ready = pods_marked_ready;
        report
    }

    /// Primary then every pod; the first failure decides.
    async fn check_cluster(
        &self,
        pg: &Postgres,
        primary_host: &str,
        port: u16,
        pods: &[Pod],
    ) -> Result<(), String> {
        let primary = self.prober.probe(pg, primary_host, port).await;
        record_health_probe(
            "cluster",
            primary.as_ref().map_or_else(|e| e.kind(), |_| "online"),
        );
        primary.map_err(|e| format!("primary: {e}"))?;

        for pod in pods {
            self.probe_pod(pg, pod)
                .await
                .map_err(|e| format!("pod {}: {e}", pod.name_any()))?;
        }
        Ok(())
    }

    async fn write_conditions(&self, pg: &Postgres, updates: Vec<ConditionUpdate>) {
        if let Err(e) = self.store.set_conditions(pg, updates).await {
            warn!(
                namespace = %pg.namespace().unwrap_or_default(),
                name = %pg.name_any(),
                error = %e,
                "Failed to write health conditions"
            );
        }
    }
}

#[cfg(test)]
#[path = "evaluator_tests.rs"]
mod evaluator_tests;
