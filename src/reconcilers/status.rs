// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers and status writers.
//!
//! # Condition Format
//!
//! Conditions follow the standard Kubernetes format, plus `observedGeneration`:
//! - `type`: The aspect being reported (`DatabaseReady`, `DatabaseAcceptingConnection`)
//! - `status`: "True", "False", or "Unknown"
//! - `reason`: A programmatic identifier (CamelCase)
//! - `message`: A human-readable explanation
//! - `lastTransitionTime`: RFC3339 timestamp when the status last changed
//!
//! # Writing status
//!
//! Status writes are read-modify-write: fetch the latest object, apply a mutation
//! to a copy of its status, and merge-patch it back with the fetched
//! `resourceVersion` as a precondition. A conflict fails the attempt and the whole
//! cycle is repeated, up to the configured attempt ceiling.
//!
//! # Example
//!
//! ```rust,no_run
//! use postgres_operator::reconcilers::status::create_condition;
//!
//! let condition = create_condition(
//!     "DatabaseReady",
//!     "True",
//!     "ReadinessCheckSucceeded",
//!     "The PostgreSQL: demo/pg is ready.",
//!     Some(2),
//! );
//! ```

use crate::config::OperatorConfig;
use crate::crd::{
    Condition, DatabasePhase, DormantDatabase, DormantDatabaseStatus, Postgres, PostgresStatus,
};
use crate::reconcilers::phase::can_transition;
use crate::reconcilers::retry::update_with_retry;
use anyhow::Result;
use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::fmt::Debug;
use tracing::{debug, warn};

/// Create a new condition stamped with the current time.
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
        observed_generation,
    }
}

#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Whether the condition of the given type exists with status "True".
#[must_use]
pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    find_condition(conditions, condition_type).is_some_and(|c| c.status == "True")
}

/// Insert or update a condition in place.
///
/// `lastTransitionTime` is preserved when the status does not change.
pub fn update_condition_in_memory(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition_type) {
        let last_transition_time = if existing.status == status {
            existing
                .last_transition_time
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339())
        } else {
            Utc::now().to_rfc3339()
        };

        existing.status = status.to_string();
        existing.reason = Some(reason.to_string());
        existing.message = Some(message.to_string());
        existing.last_transition_time = Some(last_transition_time);
        existing.observed_generation = observed_generation;
    } else {
        conditions.push(create_condition(
            condition_type,
            status,
            reason,
            message,
            observed_generation,
        ));
    }
}

/// Compare two condition sets ignoring timestamps.
#[must_use]
pub fn conditions_equal(current: &[Condition], new: &[Condition]) -> bool {
    if current.len() != new.len() {
        return false;
    }

    new.iter().all(|new_cond| {
        current.iter().any(|curr| {
            curr.r#type == new_cond.r#type
                && curr.status == new_cond.status
                && curr.reason == new_cond.reason
                && curr.message == new_cond.message
                && curr.observed_generation == new_cond.observed_generation
        })
    })
}

/// A condition to write, as computed by the health checker or a reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionUpdate {
    pub condition_type: &'static str,
    pub status: &'static str,
    pub reason: &'static str,
    pub message: String,
}

/// Apply a batch of condition updates to a condition list.
pub fn apply_condition_updates(
    conditions: &mut Vec<Condition>,
    updates: &[ConditionUpdate],
    observed_generation: Option<i64>,
) {
    for update in updates {
        update_condition_in_memory(
            conditions,
            update.condition_type,
            update.status,
            update.reason,
            &update.message,
            observed_generation,
        );
    }
}

/// Resources whose status the operator writes with [`update_status`].
pub trait StatusObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    type Status: Clone + Default + PartialEq + Serialize + Send;

    fn current_status(&self) -> Option<&Self::Status>;
}

impl StatusObject for Postgres {
    type Status = PostgresStatus;

    fn current_status(&self) -> Option<&PostgresStatus> {
        self.status.as_ref()
    }
}

impl StatusObject for DormantDatabase {
    type Status = DormantDatabaseStatus;

    fn current_status(&self) -> Option<&DormantDatabaseStatus> {
        self.status.as_ref()
    }
}

/// Read-modify-write the status of a namespaced object with fixed-attempt retry.
///
/// # Arguments
///
/// * `client` - Kubernetes client
/// * `config` - Supplies the attempt ceiling and the delay between attempts
/// * `namespace` / `name` - Object to update
/// * `mutate` - Applied to a copy of the latest status; may be called once per attempt
///
/// # Returns
///
/// The object as stored after the write (or as fetched, if nothing changed).
///
/// # Errors
///
/// Returns the last API error once all attempts have failed.
pub async fn update_status<K, F>(
    client: &Client,
    config: &OperatorConfig,
    namespace: &str,
    name: &str,
    mutate: F,
) -> Result<K>
where
    K: StatusObject,
    F: Fn(&K, &mut K::Status),
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let operation_name = format!("{} {namespace}/{name}", K::kind(&()));

    update_with_retry(
        config.status_update_attempts,
        config.status_update_interval(),
        &operation_name,
        |_| {
            let api = api.clone();
            let mutate = &mutate;
            async move {
                let latest = api.get(name).await?;
                let current = latest.current_status().cloned().unwrap_or_default();
                let mut next = current.clone();
                mutate(&latest, &mut next);

                if next == current {
                    return Ok(latest);
                }

                let patch = json!({
                    "metadata": { "resourceVersion": latest.resource_version() },
                    "status": next,
                });
                let updated = api
                    .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await?;
                debug!(
                    namespace = %namespace,
                    name = %name,
                    kind = %K::kind(&()),
                    "Status updated"
                );
                Ok(updated)
            }
        },
    )
    .await
}

/// Move a `Postgres` to `phase`, honoring the transition table.
///
/// Disallowed transitions are logged and skipped rather than written.
///
/// # Errors
///
/// Returns an error if the status write fails after all attempts.
pub async fn set_postgres_phase(
    client: &Client,
    config: &OperatorConfig,
    pg: &Postgres,
    phase: DatabasePhase,
) -> Result<Postgres> {
    let namespace = pg.namespace().unwrap_or_default();
    let name = pg.name_any();

    update_status::<Postgres, _>(client, config, &namespace, &name, |latest, status| {
        if status.phase == Some(phase) {
            return;
        }
        if !can_transition(status.phase, phase) {
            warn!(
                namespace = %namespace,
                name = %name,
                from = ?status.phase,
                to = %phase,
                "Refusing invalid phase transition"
            );
            return;
        }
        status.phase = Some(phase);
        status.observed_generation = latest.metadata.generation;
        if phase == DatabasePhase::Creating && status.creation_time.is_none() {
            status.creation_time = Some(Utc::now().to_rfc3339());
        }
    })
    .await
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
