// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Dormant database lifecycle: halt, pause, resume and wipe-out.
//!
//! A `DormantDatabase` keeps the metadata and spec of a `Postgres` that was deleted
//! with `terminationPolicy: Halt`. The workload is torn down but the PVCs and the
//! auth secret stay, so the database can later be resumed with its data.
//!
//! # Halt
//!
//! [`halt_database`] deletes the workload tier by label selector: the
//! `PodDisruptionBudget`, the `StatefulSet`, `RoleBinding`, `Role`,
//! `ServiceAccount` and the services, followed by the leader-lock `ConfigMap`.
//! PVCs and secrets are never touched.
//!
//! # Wipe-out
//!
//! [`wipe_out_database`] deletes PVCs and snapshots matching the database's
//! selector, then the secrets nobody else uses, then the WAL archive. A secret is
//! only deleted when no other `Postgres` or `DormantDatabase` of the namespace
//! references it and it carries the KubeDB management label; secrets a user
//! attached by hand are left alone.

use crate::constants::{KIND_POSTGRES, LEADER_LOCK_SUFFIX};
use crate::context::Context;
use crate::crd::{
    ArchiverSpec, DormantDatabase, DormantDatabasePhase, DormantDatabaseSpec, InitSpec, Origin,
    OriginMeta, OriginSpec, Postgres, PostgresSpec, Snapshot,
};
use crate::errors::LifecycleError;
use crate::labels::{
    is_kubedb_managed, offshoot_labels, offshoot_selectors, selector_string,
    ANNOTATION_INIT_SPEC,
};
use crate::metrics::forget_phase;
use crate::reconcilers::events;
use crate::reconcilers::resources::{create_if_absent, delete_by_selector, delete_if_exists};
use crate::reconcilers::status::update_status;
use crate::reconcilers::wal::wipe_out_archive;
use crate::status_reasons::{
    EVENT_FAILED_TO_WIPE_OUT, EVENT_PAUSING, EVENT_RESUMING, EVENT_SUCCESSFUL_PAUSE,
    EVENT_SUCCESSFUL_WIPE_OUT,
};
use anyhow::{Context as _, Result};
use chrono::Utc;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{
    ConfigMap, PersistentVolumeClaim, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Api, Client, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// Secret peer-usage scan
// ============================================================================

/// Auth secret a database spec refers to, defaulting to `<name>-auth`.
#[must_use]
pub fn referenced_secrets(name: &str, spec: &PostgresSpec) -> Vec<String> {
    let auth = spec.auth_secret.as_ref().map_or_else(
        || format!("{name}-{}", crate::constants::AUTH_SECRET_SUFFIX),
        |s| s.name.clone(),
    );
    vec![auth]
}

/// Secrets referenced by every database of the namespace other than `name`.
///
/// Both live `Postgres` objects and `Postgres`-kind dormant records count.
#[must_use]
pub fn secrets_used_by_peers<'a>(
    name: &str,
    postgreses: impl IntoIterator<Item = &'a Postgres>,
    dormant_databases: impl IntoIterator<Item = &'a DormantDatabase>,
) -> BTreeSet<String> {
    let mut used = BTreeSet::new();

    for pg in postgreses {
        if pg.name_any() != name {
            used.extend(referenced_secrets(&pg.name_any(), &pg.spec));
        }
    }

    for dd in dormant_databases {
        if dd.name_any() == name || dd.origin_kind() != Some(KIND_POSTGRES) {
            continue;
        }
        if let Some(spec) = dd.origin_postgres() {
            used.extend(referenced_secrets(&dd.spec.origin.metadata.name, spec));
        }
    }

    used
}

/// Candidates nobody else references, in input order.
#[must_use]
pub fn unused_secrets(candidates: &[String], used_by_peers: &BTreeSet<String>) -> Vec<String> {
    candidates
        .iter()
        .filter(|s| !used_by_peers.contains(*s))
        .cloned()
        .collect()
}

/// Names of the secrets in `live` that the operator may delete.
///
/// Only secrets carrying the KubeDB management labels qualify; secrets a user
/// created and attached by hand are kept even when nothing references them.
#[must_use]
pub fn deletable_secrets<'a>(live: impl IntoIterator<Item = &'a Secret>) -> Vec<String> {
    live.into_iter()
        .filter(|secret| is_kubedb_managed(secret.labels()))
        .map(ResourceExt::name_any)
        .collect()
}

// ============================================================================
// Halt / wipe-out
// ============================================================================

/// Delete the workload tier of a database, keeping PVCs and secrets.
///
/// # Errors
///
/// Returns the first failed list or delete.
pub async fn halt_database(client: &Client, namespace: &str, name: &str) -> Result<()> {
    let selector = selector_string(&offshoot_selectors(KIND_POSTGRES, name));
    debug!(namespace = %namespace, name = %name, selector = %selector, "Halting database");

    delete_by_selector::<PodDisruptionBudget>(client, namespace, &selector).await?;
    delete_by_selector::<StatefulSet>(client, namespace, &selector).await?;
    delete_by_selector::<RoleBinding>(client, namespace, &selector).await?;
    delete_by_selector::<Role>(client, namespace, &selector).await?;
    delete_by_selector::<ServiceAccount>(client, namespace, &selector).await?;
    delete_by_selector::<Service>(client, namespace, &selector).await?;
    delete_if_exists::<ConfigMap>(client, namespace, &format!("{name}-{LEADER_LOCK_SUFFIX}"))
        .await?;

    info!(namespace = %namespace, name = %name, "Database workload halted");
    Ok(())
}

/// Delete the PVCs of a database.
///
/// # Errors
///
/// Returns the first failed list or delete.
pub async fn delete_volumes(client: &Client, namespace: &str, name: &str) -> Result<usize> {
    let selector = selector_string(&offshoot_selectors(KIND_POSTGRES, name));
    delete_by_selector::<PersistentVolumeClaim>(client, namespace, &selector).await
}

/// Everything a wipe-out needs to know about the database being removed.
#[derive(Debug, Clone, PartialEq)]
pub struct WipeOutTarget {
    pub namespace: String,
    pub name: String,
    pub secrets: Vec<String>,
    pub archiver: Option<ArchiverSpec>,
}

impl WipeOutTarget {
    #[must_use]
    pub fn from_postgres(pg: &Postgres) -> Self {
        let name = pg.name_any();
        Self {
            namespace: pg.namespace().unwrap_or_default(),
            secrets: referenced_secrets(&name, &pg.spec),
            archiver: pg.spec.archiver.clone(),
            name,
        }
    }

    /// Build from a dormant record; `None` when it holds no `Postgres` origin.
    #[must_use]
    pub fn from_dormant(dd: &DormantDatabase) -> Option<Self> {
        let spec = dd.origin_postgres()?;
        let name = dd.spec.origin.metadata.name.clone();
        Some(Self {
            namespace: dd.namespace().unwrap_or_default(),
            secrets: referenced_secrets(&name, spec),
            archiver: spec.archiver.clone(),
            name,
        })
    }
}

/// Irreversibly delete the data of a database.
///
/// The workload must already be halted. PVCs and snapshots go first, then unused
/// managed secrets, then the WAL archive when an archiver is configured.
///
/// # Errors
///
/// Returns the first failed API call or object-store operation. A missing storage
/// secret is an error; an archiver naming no storage is skipped.
pub async fn wipe_out_database(ctx: &Context, target: &WipeOutTarget) -> Result<()> {
    let client = &ctx.client;
    let namespace = target.namespace.as_str();
    let name = target.name.as_str();
    let selector = selector_string(&offshoot_selectors(KIND_POSTGRES, name));

    delete_by_selector::<PersistentVolumeClaim>(client, namespace, &selector).await?;
    delete_by_selector::<Snapshot>(client, namespace, &selector).await?;

    let postgreses = ctx.stores.postgreses_in(namespace);
    let dormant = ctx.stores.dormant_databases_in(namespace);
    let used = secrets_used_by_peers(
        name,
        postgreses.iter().map(AsRef::as_ref),
        dormant.iter().map(AsRef::as_ref),
    );

    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let mut live = Vec::new();
    for secret_name in unused_secrets(&target.secrets, &used) {
        if let Some(secret) = secrets.get_opt(&secret_name).await? {
            live.push(secret);
        }
    }
    let deletable = deletable_secrets(&live);
    for secret in &live {
        let secret_name = secret.name_any();
        if deletable.contains(&secret_name) {
            delete_if_exists::<Secret>(client, namespace, &secret_name).await?;
        } else {
            debug!(
                namespace = %namespace,
                secret = %secret_name,
                "Keeping secret not managed by the operator"
            );
        }
    }

    if let Some(archiver) = &target.archiver {
        let storage_secret = match &archiver.storage.storage_secret_name {
            Some(secret_name) => Some(
                secrets
                    .get_opt(secret_name)
                    .await?
                    .with_context(|| format!("storage secret {namespace}/{secret_name} not found"))?,
            ),
            None => None,
        };
        let removed = wipe_out_archive(archiver, storage_secret.as_ref(), namespace, name)
            .await
            .with_context(|| format!("wiping out WAL archive of {namespace}/{name}"))?;
        debug!(namespace = %namespace, name = %name, removed = removed, "WAL objects removed");
    }

    info!(namespace = %namespace, name = %name, "Database wiped out");
    Ok(())
}

// ============================================================================
// Dormant record <-> Postgres
// ============================================================================

/// Capture `pg` as a dormant record.
///
/// `spec.init` is moved into the `kubedb.com/postgres-init-spec` annotation so that
/// the record can be resumed without replaying the one-shot initialization.
///
/// # Errors
///
/// Returns an error if the init spec cannot be serialized.
pub fn build_dormant_database(pg: &Postgres) -> Result<DormantDatabase> {
    let name = pg.name_any();
    let namespace = pg.namespace().unwrap_or_default();

    let mut annotations = pg.annotations().clone();
    let mut spec = pg.spec.clone();
    if let Some(init) = spec.init.take() {
        let encoded = serde_json::to_string(&init).context("encoding init spec")?;
        annotations.insert(ANNOTATION_INIT_SPEC.to_string(), encoded);
    }

    Ok(DormantDatabase {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.clone()),
            labels: Some(offshoot_labels(KIND_POSTGRES, &name)),
            ..Default::default()
        },
        spec: DormantDatabaseSpec {
            origin: Origin {
                metadata: OriginMeta {
                    name,
                    namespace,
                    labels: pg.labels().clone(),
                    annotations,
                },
                spec: OriginSpec {
                    postgres: Some(spec),
                },
            },
            wipe_out: false,
            resume: false,
        },
        status: None,
    })
}

/// Init spec recorded on a paused database, if any.
#[must_use]
pub fn recorded_init_spec(annotations: &BTreeMap<String, String>) -> Option<InitSpec> {
    annotations
        .get(ANNOTATION_INIT_SPEC)
        .and_then(|raw| serde_json::from_str(raw).ok())
}

/// Rebuild the `Postgres` a dormant record was taken from.
///
/// # Errors
///
/// Returns [`LifecycleError::MissingOrigin`] for a non-`Postgres` record and
/// [`LifecycleError::InitSpecOnResume`] when the origin still carries `spec.init`.
pub fn postgres_from_dormant(dd: &DormantDatabase) -> Result<Postgres, LifecycleError> {
    let origin = &dd.spec.origin;
    let spec = dd
        .origin_postgres()
        .ok_or_else(|| LifecycleError::MissingOrigin {
            namespace: dd.namespace().unwrap_or_default(),
            name: dd.name_any(),
        })?;
    if spec.init.is_some() {
        return Err(LifecycleError::InitSpecOnResume);
    }

    let mut pg = Postgres::new(&origin.metadata.name, spec.clone());
    pg.metadata.namespace = Some(origin.metadata.namespace.clone());
    if !origin.metadata.labels.is_empty() {
        pg.metadata.labels = Some(origin.metadata.labels.clone());
    }
    let mut annotations = dd.annotations().clone();
    annotations.extend(origin.metadata.annotations.clone());
    if !annotations.is_empty() {
        pg.metadata.annotations = Some(annotations);
    }
    Ok(pg)
}

// ============================================================================
// Pause (termination policy Halt)
// ============================================================================

/// Pause a `Postgres` that is being deleted with `terminationPolicy: Halt`.
///
/// Creates the dormant record, stops the backup schedule, removes the monitoring
/// agent and halts the workload. Monitor removal is best-effort.
///
/// # Errors
///
/// Returns an error if the dormant record cannot be created or the halt fails.
pub async fn pause_database(ctx: &Context, pg: &Postgres) -> Result<()> {
    let client = &ctx.client;
    let namespace = pg.namespace().unwrap_or_default();
    let name = pg.name_any();

    events::normal(client, pg, EVENT_PAUSING, &format!("Pausing Postgres {namespace}/{name}"))
        .await;

    let dormant = build_dormant_database(pg)?;
    if !create_if_absent(client, &namespace, &dormant).await? {
        debug!(namespace = %namespace, name = %name, "DormantDatabase already exists");
    }

    ctx.backups
        .stop(pg)
        .await
        .with_context(|| format!("stopping backup schedule of {namespace}/{name}"))?;

    super::postgres::remove_monitor(ctx, pg).await;

    halt_database(client, &namespace, &name).await?;
    forget_phase(&namespace, &name);

    events::normal(
        client,
        pg,
        EVENT_SUCCESSFUL_PAUSE,
        &format!("Successfully paused Postgres {namespace}/{name}"),
    )
    .await;
    Ok(())
}

// ============================================================================
// DormantDatabase controller
// ============================================================================

async fn set_dormant_phase(
    ctx: &Context,
    dd: &DormantDatabase,
    phase: DormantDatabasePhase,
) -> Result<DormantDatabase> {
    let namespace = dd.namespace().unwrap_or_default();
    update_status::<DormantDatabase, _>(
        &ctx.client,
        &ctx.config,
        &namespace,
        &dd.name_any(),
        |latest, status| {
            status.phase = Some(phase);
            status.observed_generation = latest.metadata.generation;
            match phase {
                DormantDatabasePhase::Paused if status.pausing_time.is_none() => {
                    status.pausing_time = Some(Utc::now().to_rfc3339());
                }
                DormantDatabasePhase::WipedOut if status.wipe_out_time.is_none() => {
                    status.wipe_out_time = Some(Utc::now().to_rfc3339());
                }
                _ => {}
            }
        },
    )
    .await
}

/// Reconcile a `DormantDatabase`.
///
/// - `spec.resume: true` recreates the `Postgres` and deletes the record
/// - `spec.wipeOut: true` wipes the data out once (phase `WipedOut`)
/// - otherwise the workload is halted (phase `Paused`)
///
/// # Errors
///
/// Returns an error when a step fails; the controller re-queues the record.
pub async fn reconcile_dormant_database(ctx: Arc<Context>, dd: DormantDatabase) -> Result<()> {
    let namespace = dd.namespace().unwrap_or_default();
    let name = dd.name_any();

    if dd.metadata.deletion_timestamp.is_some() {
        debug!(namespace = %namespace, name = %name, "DormantDatabase is being deleted");
        return Ok(());
    }

    if dd.origin_kind().is_some_and(|kind| kind != KIND_POSTGRES) {
        debug!(namespace = %namespace, name = %name, "Ignoring DormantDatabase of another kind");
        return Ok(());
    }

    let phase = dd.status.as_ref().and_then(|s| s.phase);

    if dd.spec.resume {
        return resume_database(&ctx, &dd).await;
    }

    if dd.spec.wipe_out {
        if phase == Some(DormantDatabasePhase::WipedOut) {
            return Ok(());
        }
        set_dormant_phase(&ctx, &dd, DormantDatabasePhase::WipingOut).await?;

        let target = WipeOutTarget::from_dormant(&dd).ok_or_else(|| {
            LifecycleError::MissingOrigin {
                namespace: namespace.clone(),
                name: name.clone(),
            }
        })?;
        let result = async {
            halt_database(&ctx.client, &namespace, &target.name).await?;
            wipe_out_database(&ctx, &target).await
        }
        .await;

        if let Err(e) = result {
            events::warning(&ctx.client, &dd, EVENT_FAILED_TO_WIPE_OUT, &format!("{e:#}")).await;
            set_dormant_phase(&ctx, &dd, DormantDatabasePhase::Failed).await?;
            return Err(e);
        }

        set_dormant_phase(&ctx, &dd, DormantDatabasePhase::WipedOut).await?;
        events::normal(
            &ctx.client,
            &dd,
            EVENT_SUCCESSFUL_WIPE_OUT,
            &format!("Successfully wiped out database {namespace}/{name}"),
        )
        .await;
        return Ok(());
    }

    if matches!(
        phase,
        Some(DormantDatabasePhase::Paused | DormantDatabasePhase::WipedOut)
    ) {
        return Ok(());
    }

    set_dormant_phase(&ctx, &dd, DormantDatabasePhase::Pausing).await?;
    if let Err(e) = halt_database(&ctx.client, &namespace, &dd.spec.origin.metadata.name).await {
        set_dormant_phase(&ctx, &dd, DormantDatabasePhase::Failed).await?;
        return Err(e);
    }
    set_dormant_phase(&ctx, &dd, DormantDatabasePhase::Paused).await?;
    events::normal(
        &ctx.client,
        &dd,
        EVENT_SUCCESSFUL_PAUSE,
        &format!("Database {namespace}/{name} paused"),
    )
    .await;
    Ok(())
}

async fn resume_database(ctx: &Context, dd: &DormantDatabase) -> Result<()> {
    let namespace = dd.namespace().unwrap_or_default();
    let name = dd.name_any();

    if dd.status.as_ref().and_then(|s| s.phase) == Some(DormantDatabasePhase::WipedOut) {
        warn!(namespace = %namespace, name = %name, "Cannot resume a wiped out database");
        return Ok(());
    }

    set_dormant_phase(ctx, dd, DormantDatabasePhase::Resuming).await?;
    events::normal(
        &ctx.client,
        dd,
        EVENT_RESUMING,
        &format!("Resuming database {namespace}/{name}"),
    )
    .await;

    let pg = match postgres_from_dormant(dd) {
        Ok(pg) => pg,
        Err(e) => {
            events::warning(&ctx.client, dd, crate::status_reasons::EVENT_FAILED, &e.to_string())
                .await;
            set_dormant_phase(ctx, dd, DormantDatabasePhase::Failed).await?;
            return Err(e.into());
        }
    };

    create_if_absent(&ctx.client, &namespace, &pg)
        .await
        .with_context(|| format!("recreating Postgres {namespace}/{name}"))?;
    delete_if_exists::<DormantDatabase>(&ctx.client, &namespace, &name).await?;

    info!(namespace = %namespace, name = %name, "Database resumed");
    Ok(())
}

#[cfg(test)]
#[path = "dormant_tests.rs"]
mod dormant_tests;
