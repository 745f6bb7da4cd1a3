// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Monitoring agents for the exporter sidecar.
//!
//! The backend is selected by [`MonitorAgent`]; [`new_agent`] has one arm per
//! variant and hands back a [`MonitoringAgent`] trait object.
//!
//! - `prometheus.io/builtin` annotates the `<name>-stats` service with the
//!   `prometheus.io/scrape|path|port` annotations.
//! - `prometheus.io/operator` creates the stats service plus a
//!   `monitoring.coreos.com/v1` `ServiceMonitor` selecting it.
//!
//! Both are idempotent: `create_or_update` may be called on every pass and
//! `delete` tolerates objects that are already gone.

use crate::config::OperatorConfig;
use crate::constants::EXPORTER_PORT_NAME;
use crate::crd::{MonitorAgent, MonitorSpec, Postgres};
use crate::labels::{
    ANNOTATION_MONITOR_AGENT, ANNOTATION_PROMETHEUS_PATH, ANNOTATION_PROMETHEUS_PORT,
    ANNOTATION_PROMETHEUS_SCRAPE,
};
use crate::postgres_resources::{build_labels, build_stats_service, stats_service_name};
use crate::reconcilers::resources::{create_or_apply, delete_if_exists};
use crate::reconcilers::retry::is_not_found;
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::api::{ApiResource, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Path the exporter serves metrics on.
pub const METRICS_PATH: &str = "/metrics";

const SERVICE_MONITOR_GROUP: &str = "monitoring.coreos.com";
const SERVICE_MONITOR_VERSION: &str = "v1";
const SERVICE_MONITOR_KIND: &str = "ServiceMonitor";
const SERVICE_MONITOR_PLURAL: &str = "servicemonitors";

/// Idempotent monitoring backend for one database.
#[async_trait]
pub trait MonitoringAgent: Send + Sync {
    /// Create or update everything `spec` needs for `pg`.
    async fn create_or_update(&self, pg: &Postgres, spec: &MonitorSpec) -> Result<()>;

    /// Remove what `create_or_update` created for `spec`.
    async fn delete(&self, pg: &Postgres, spec: &MonitorSpec) -> Result<()>;
}

/// Build the agent for `agent`.
#[must_use]
pub fn new_agent(
    client: Client,
    config: Arc<OperatorConfig>,
    agent: MonitorAgent,
) -> Box<dyn MonitoringAgent> {
    match agent {
        MonitorAgent::PrometheusBuiltin => Box::new(BuiltinPrometheus::new(client, config)),
        MonitorAgent::PrometheusOperator => Box::new(PrometheusOperator::new(client, config)),
    }
}

/// What the update transition must do with the monitoring agent.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorChange {
    /// Nothing configured before or after, or nothing changed
    None,
    Add(MonitorSpec),
    Remove(MonitorSpec),
    /// The agent type changed: tear the old one down, stand the new one up
    Replace { old: MonitorSpec, new: MonitorSpec },
    /// Same agent, different settings
    Update(MonitorSpec),
}

/// Diff the last applied monitor spec against the desired one.
#[must_use]
pub fn plan_monitor_change(old: Option<&MonitorSpec>, new: Option<&MonitorSpec>) -> MonitorChange {
    match (old, new) {
        (None, None) => MonitorChange::None,
        (None, Some(new)) => MonitorChange::Add(new.clone()),
        (Some(old), None) => MonitorChange::Remove(old.clone()),
        (Some(old), Some(new)) if old.agent != new.agent => MonitorChange::Replace {
            old: old.clone(),
            new: new.clone(),
        },
        (Some(old), Some(new)) if old != new => MonitorChange::Update(new.clone()),
        (Some(_), Some(_)) => MonitorChange::None,
    }
}

fn exporter_port_for(spec: &MonitorSpec, pg: &Postgres) -> i32 {
    spec.prometheus
        .as_ref()
        .and_then(|p| p.port)
        .unwrap_or_else(|| crate::postgres_resources::exporter_port(pg))
}

/// Annotations the builtin agent puts on the stats service.
#[must_use]
pub fn builtin_annotations(pg: &Postgres, spec: &MonitorSpec) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            ANNOTATION_MONITOR_AGENT.to_string(),
            spec.agent.as_str().to_string(),
        ),
        (ANNOTATION_PROMETHEUS_SCRAPE.to_string(), "true".to_string()),
        (ANNOTATION_PROMETHEUS_PATH.to_string(), METRICS_PATH.to_string()),
        (
            ANNOTATION_PROMETHEUS_PORT.to_string(),
            exporter_port_for(spec, pg).to_string(),
        ),
    ])
}

/// Scrape annotations on the stats service.
pub struct BuiltinPrometheus {
    client: Client,
    config: Arc<OperatorConfig>,
}

impl BuiltinPrometheus {
    #[must_use]
    pub fn new(client: Client, config: Arc<OperatorConfig>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl MonitoringAgent for BuiltinPrometheus {
    async fn create_or_update(&self, pg: &Postgres, spec: &MonitorSpec) -> Result<()> {
        let namespace = pg.namespace().unwrap_or_default();
        let service = build_stats_service(pg, builtin_annotations(pg, spec));
        create_or_apply(&self.client, &namespace, &service, &self.config.field_manager).await?;
        debug!(namespace = %namespace, name = %pg.name_any(), "Builtin Prometheus annotations applied");
        Ok(())
    }

    async fn delete(&self, pg: &Postgres, _spec: &MonitorSpec) -> Result<()> {
        let namespace = pg.namespace().unwrap_or_default();
        delete_if_exists::<Service>(&self.client, &namespace, &stats_service_name(pg)).await?;
        Ok(())
    }
}

/// Name of the `ServiceMonitor` for `pg`, unique across namespaces.
#[must_use]
pub fn service_monitor_name(pg: &Postgres) -> String {
    format!(
        "kubedb-{}-{}",
        pg.namespace().unwrap_or_default(),
        pg.name_any()
    )
}

/// Namespace the `ServiceMonitor` lives in.
#[must_use]
pub fn service_monitor_namespace(pg: &Postgres, spec: &MonitorSpec) -> String {
    spec.prometheus
        .as_ref()
        .and_then(|p| p.namespace.clone())
        .unwrap_or_else(|| pg.namespace().unwrap_or_default())
}

fn service_monitor_resource() -> ApiResource {
    let gvk = GroupVersionKind {
        group: SERVICE_MONITOR_GROUP.to_string(),
        version: SERVICE_MONITOR_VERSION.to_string(),
        kind: SERVICE_MONITOR_KIND.to_string(),
    };
    ApiResource::from_gvk_with_plural(&gvk, SERVICE_MONITOR_PLURAL)
}

/// Build the `ServiceMonitor` scraping the stats service of `pg`.
#[must_use]
pub fn build_service_monitor(pg: &Postgres, spec: &MonitorSpec) -> DynamicObject {
    let namespace = service_monitor_namespace(pg, spec);
    let prometheus = spec.prometheus.clone().unwrap_or_default();

    let mut labels = build_labels(pg);
    labels.extend(prometheus.labels);

    let mut endpoint = json!({
        "port": EXPORTER_PORT_NAME,
        "path": METRICS_PATH,
    });
    if let Some(interval) = prometheus.interval {
        endpoint["interval"] = json!(interval);
    }

    let mut monitor = DynamicObject::new(&service_monitor_name(pg), &service_monitor_resource())
        .within(&namespace)
        .data(json!({
            "spec": {
                "namespaceSelector": {
                    "matchNames": [pg.namespace().unwrap_or_default()],
                },
                "selector": {
                    "matchLabels": pg.offshoot_selectors(),
                },
                "endpoints": [endpoint],
            }
        }));
    monitor.metadata.labels = Some(labels);
    monitor
}

/// `ServiceMonitor` for the Prometheus Operator.
pub struct PrometheusOperator {
    client: Client,
    config: Arc<OperatorConfig>,
}

impl PrometheusOperator {
    #[must_use]
    pub fn new(client: Client, config: Arc<OperatorConfig>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl MonitoringAgent for PrometheusOperator {
    async fn create_or_update(&self, pg: &Postgres, spec: &MonitorSpec) -> Result<()> {
        let namespace = pg.namespace().unwrap_or_default();
        let service = build_stats_service(
            pg,
            BTreeMap::from([(
                ANNOTATION_MONITOR_AGENT.to_string(),
                spec.agent.as_str().to_string(),
            )]),
        );
        create_or_apply(&self.client, &namespace, &service, &self.config.field_manager).await?;

        let monitor = build_service_monitor(pg, spec);
        let monitor_namespace = service_monitor_namespace(pg, spec);
        let name = service_monitor_name(pg);
        let api: Api<DynamicObject> = Api::namespaced_with(
            self.client.clone(),
            &monitor_namespace,
            &service_monitor_resource(),
        );
        api.patch(
            &name,
            &PatchParams::apply(&self.config.field_manager).force(),
            &Patch::Apply(&monitor),
        )
        .await
        .with_context(|| format!("applying ServiceMonitor {monitor_namespace}/{name}"))?;

        info!(
            namespace = %monitor_namespace,
            name = %name,
            "ServiceMonitor applied"
        );
        Ok(())
    }

    async fn delete(&self, pg: &Postgres, spec: &MonitorSpec) -> Result<()> {
        let namespace = pg.namespace().unwrap_or_default();
        let monitor_namespace = service_monitor_namespace(pg, spec);
        let name = service_monitor_name(pg);
        let api: Api<DynamicObject> = Api::namespaced_with(
            self.client.clone(),
            &monitor_namespace,
            &service_monitor_resource(),
        );

        match api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => info!(namespace = %monitor_namespace, name = %name, "ServiceMonitor deleted"),
            Err(e) if is_not_found(&e) => {
                debug!(namespace = %monitor_namespace, name = %name, "ServiceMonitor already gone");
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("deleting ServiceMonitor {monitor_namespace}/{name}")
                });
            }
        }

        delete_if_exists::<Service>(&self.client, &namespace, &stats_service_name(pg)).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod monitor_tests;
