// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster-backed [`HealthStore`].
//!
//! Instances come from the `Postgres` reflector store shared with the controller;
//! pods and services are read from the API server on every tick.

use super::evaluator::HealthStore;
use crate::config::OperatorConfig;
use crate::constants::POSTGRES_PORT_NAME;
use crate::crd::Postgres;
use crate::labels::selector_string;
use crate::reconcilers::status::{apply_condition_updates, update_status, ConditionUpdate};
use crate::status_reasons::{CONDITION_TYPE_POD_READY, REASON_POD_READY_AND_ONLINE, STATUS_TRUE};
use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{ListParams, Patch, PatchParams};
use kube::runtime::reflector::Store;
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use std::sync::Arc;

pub struct KubeHealthStore {
    client: Client,
    config: Arc<OperatorConfig>,
    postgres: Store<Postgres>,
}

impl KubeHealthStore {
    #[must_use]
    pub fn new(client: Client, config: Arc<OperatorConfig>, postgres: Store<Postgres>) -> Self {
        Self {
            client,
            config,
            postgres,
        }
    }
}

#[async_trait]
impl HealthStore for KubeHealthStore {
    async fn list_postgres(&self) -> Result<Vec<Arc<Postgres>>> {
        Ok(self.postgres.state())
    }

    async fn list_pods(&self, pg: &Postgres) -> Result<Vec<Pod>> {
        let namespace = pg.namespace().unwrap_or_default();
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
        let params = ListParams::default().labels(&selector_string(&pg.offshoot_selectors()));
        let pods = api
            .list(&params)
            .await
            .with_context(|| format!("listing pods of Postgres {namespace}/{}", pg.name_any()))?;
        Ok(pods.items)
    }

    async fn mark_pod_ready(&self, pod: &Pod) -> Result<()> {
        let namespace = pod.namespace().unwrap_or_default();
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
        let patch = json!({
            "status": {
                "conditions": [{
                    "type": CONDITION_TYPE_POD_READY,
                    "status": STATUS_TRUE,
                    "reason": REASON_POD_READY_AND_ONLINE,
                    "lastTransitionTime": Utc::now().to_rfc3339(),
                }]
            }
        });
        api.patch_status(&pod.name_any(), &PatchParams::default(), &Patch::Strategic(&patch))
            .await
            .with_context(|| format!("marking pod {namespace}/{} ready", pod.name_any()))?;
        Ok(())
    }

    async fn primary_service_port(&self, pg: &Postgres) -> Result<u16> {
        let namespace = pg.namespace().unwrap_or_default();
        let name = pg.name_any();
        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        let service = api
            .get(&name)
            .await
            .with_context(|| format!("fetching primary service {namespace}/{name}"))?;

        let port = service
            .spec
            .and_then(|spec| spec.ports)
            .unwrap_or_default()
            .into_iter()
            .find(|port| port.name.as_deref() == Some(POSTGRES_PORT_NAME))
            .ok_or_else(|| anyhow!("service {namespace}/{name} has no port named {POSTGRES_PORT_NAME}"))?;

        u16::try_from(port.port).with_context(|| format!("invalid port {} on {namespace}/{name}", port.port))
    }

    async fn set_conditions(&self, pg: &Postgres, updates: Vec<ConditionUpdate>) -> Result<()> {
        let namespace = pg.namespace().unwrap_or_default();
        update_status::<Postgres, _>(
            &self.client,
            &self.config,
            &namespace,
            &pg.name_any(),
            |latest, status| {
                apply_condition_updates(&mut status.conditions, &updates, latest.metadata.generation);
            },
        )
        .await?;
        Ok(())
    }
}
