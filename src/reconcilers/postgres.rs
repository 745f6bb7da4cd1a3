// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `Postgres` reconciliation.
//!
//! # Create
//!
//! A `Postgres` that has not reached `Running` goes through the create flow:
//!
//! 1. Phase `Creating` (best-effort)
//! 2. Strict validation; an invalid spec gets an `InvalidSpec` event and phase
//!    `Failed`, and nothing is provisioned
//! 3. A same-named `DormantDatabase` blocks the create unless it is resuming
//! 4. The auth secret is generated when `spec.authSecret` is empty
//! 5. Services, RBAC, `StatefulSet` and PDB are applied, one event per step
//! 6. Wait for every member of the `StatefulSet` to be ready
//! 7. Restore from `spec.init.snapshotSource` (phase `Initializing`)
//! 8. Phase `Running`, then backup schedule and monitoring
//!
//! A failed restore is reported through events but the database still moves to
//! `Running`; see [`phase_after_initialization`].
//!
//! # Update
//!
//! A `Running` database re-applies its offshoots when the generation moved, and
//! diffs `spec.backupSchedule` / `spec.monitor` against `status.applied`.
//!
//! # Delete
//!
//! The `kubedb.com/postgres` finalizer holds the object until the termination
//! policy has been carried out.

use crate::admission::{validate_postgres, KubeLookup};
use crate::constants::{KIND_POSTGRES, POSTGRES_FINALIZER};
use crate::context::Context;
use crate::crd::{
    AppliedSpec, BackupScheduleSpec, DatabasePhase, DormantDatabase, MonitorSpec, Postgres,
    PostgresVersion, Snapshot, TerminationPolicy,
};
use crate::errors::LifecycleError;
use crate::labels::ANNOTATION_INIT_SPEC;
use crate::metrics::{forget_phase, record_error, record_phase};
use crate::postgres_resources::{
    build_auth_secret, build_governing_service, build_pdb, build_primary_service,
    build_replicas_service, build_role, build_role_binding, build_service_account,
    build_statefulset, default_auth_secret_name, generate_password,
};
use crate::reconcilers::backup::{validate_backup_schedule, JobOutcome};
use crate::reconcilers::dormant::{
    delete_volumes, halt_database, pause_database, wipe_out_database, WipeOutTarget,
};
use crate::reconcilers::events;
use crate::reconcilers::finalizers::{
    ensure_finalizer, handle_deletion, CleanupOutcome, FinalizerCleanup,
};
use crate::reconcilers::monitor::{new_agent, plan_monitor_change, MonitorChange};
use crate::reconcilers::phase::can_transition;
use crate::reconcilers::resources::{create_if_absent, create_or_apply, delete_if_exists};
use crate::reconcilers::retry::{poll_until, retry_api_call};
use crate::reconcilers::should_reconcile;
use crate::reconcilers::status::{set_postgres_phase, update_status};
use crate::status_reasons::{
    EVENT_BACKUP_SCHEDULED, EVENT_CREATING, EVENT_DELETION_LOCKED, EVENT_FAILED,
    EVENT_FAILED_TO_ADD_MONITOR, EVENT_FAILED_TO_DELETE_MONITOR, EVENT_FAILED_TO_INITIALIZE,
    EVENT_FAILED_TO_PAUSE, EVENT_FAILED_TO_SCHEDULE_BACKUP, EVENT_FAILED_TO_WIPE_OUT,
    EVENT_INITIALIZING, EVENT_INVALID_SPEC, EVENT_SUCCESSFUL, EVENT_SUCCESSFUL_INITIALIZE,
    EVENT_SUCCESSFUL_MONITOR_ADD, EVENT_SUCCESSFUL_MONITOR_DELETE,
    EVENT_SUCCESSFUL_MONITOR_UPDATE, EVENT_SUCCESSFUL_WIPE_OUT,
};
use anyhow::{anyhow, Context as _, Result};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::api::{Patch, PatchParams};
use kube::{Api, ResourceExt};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// ============================================================================
// Pure decisions
// ============================================================================

/// Result of the one-shot initialization step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// Nothing to restore (no snapshot source, already initialized, or resumed)
    Skipped,
    Succeeded,
    Failed(String),
}

/// Phase a database moves to once initialization has been attempted.
///
/// Always `Running`: a failed restore is surfaced as a `FailedToInitialize`
/// event, it does not fail the database.
#[must_use]
pub fn phase_after_initialization(_outcome: &InitOutcome) -> DatabasePhase {
    DatabasePhase::Running
}

/// Whether creating `pg` is allowed given a same-named dormant record.
///
/// # Errors
///
/// - [`LifecycleError::DormantKindMismatch`] if the record belongs to another kind
/// - [`LifecycleError::ResumeRequired`] if it is a paused `Postgres` that is not
///   being resumed
pub fn check_dormant_conflict(
    pg: &Postgres,
    dormant: Option<&DormantDatabase>,
) -> Result<(), LifecycleError> {
    let Some(dd) = dormant else {
        return Ok(());
    };
    let namespace = pg.namespace().unwrap_or_default();
    let name = pg.name_any();

    match dd.origin_kind() {
        Some(kind) if kind != KIND_POSTGRES => Err(LifecycleError::DormantKindMismatch {
            namespace,
            name,
            kind: kind.to_string(),
        }),
        _ if dd.spec.resume => Ok(()),
        _ => Err(LifecycleError::ResumeRequired { namespace, name }),
    }
}

/// Whether every wanted member of `sts` reports ready.
#[must_use]
pub fn statefulset_ready(sts: &StatefulSet, replicas: i32) -> bool {
    sts.status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0)
        >= replicas
}

/// Whether `pg` came back from a dormant record.
///
/// Resumed databases carry their original init spec as an annotation and are
/// never re-initialized.
#[must_use]
pub fn is_resumed(pg: &Postgres) -> bool {
    pg.annotations().contains_key(ANNOTATION_INIT_SPEC)
}

/// Image for backup and restore jobs: the catalog's, else the configured default.
#[must_use]
pub fn tools_image(version: &PostgresVersion, fallback: &str) -> String {
    version
        .spec
        .tools_image
        .clone()
        .unwrap_or_else(|| fallback.to_string())
}

/// What the backup sync must do.
#[derive(Debug, Clone, PartialEq)]
pub enum BackupChange {
    None,
    Schedule(BackupScheduleSpec),
    Stop,
}

#[must_use]
pub fn plan_backup_change(
    applied: Option<&BackupScheduleSpec>,
    desired: Option<&BackupScheduleSpec>,
) -> BackupChange {
    match (applied, desired) {
        (applied, Some(desired)) if applied != Some(desired) => {
            BackupChange::Schedule(desired.clone())
        }
        (Some(_), None) => BackupChange::Stop,
        _ => BackupChange::None,
    }
}

fn applied(pg: &Postgres) -> AppliedSpec {
    pg.status
        .as_ref()
        .and_then(|s| s.applied.clone())
        .unwrap_or_default()
}

// ============================================================================
// Entry point
// ============================================================================

/// Reconcile one `Postgres`.
///
/// # Errors
///
/// Returns an error when a step fails; the controller re-queues the object.
pub async fn reconcile_postgres(ctx: Arc<Context>, pg: Postgres) -> Result<()> {
    let namespace = pg.namespace().unwrap_or_default();
    let name = pg.name_any();

    if pg.is_being_deleted() {
        handle_deletion(&ctx, &pg, POSTGRES_FINALIZER).await?;
        return Ok(());
    }

    ensure_finalizer(&ctx.client, &pg, POSTGRES_FINALIZER).await?;

    match pg.phase() {
        Some(DatabasePhase::WipedOut) => {
            debug!(namespace = %namespace, name = %name, "Postgres is wiped out");
            Ok(())
        }
        Some(DatabasePhase::Running) => update_postgres(&ctx, &pg).await,
        _ => create_postgres(&ctx, &pg).await,
    }
}

// ============================================================================
// Create
// ============================================================================

async fn set_phase(ctx: &Context, pg: &Postgres, phase: DatabasePhase) -> Result<Postgres> {
    let updated = set_postgres_phase(&ctx.client, &ctx.config, pg, phase).await?;
    if let Some(current) = updated.phase() {
        record_phase(
            &updated.namespace().unwrap_or_default(),
            &updated.name_any(),
            &current.to_string(),
        );
    }
    Ok(updated)
}

async fn create_postgres(ctx: &Context, pg: &Postgres) -> Result<()> {
    let namespace = pg.namespace().unwrap_or_default();
    let name = pg.name_any();
    let client = &ctx.client;

    let pg = match set_phase(ctx, pg, DatabasePhase::Creating).await {
        Ok(latest) => latest,
        Err(e) => {
            warn!(namespace = %namespace, name = %name, "Failed to set phase Creating: {:#}", e);
            pg.clone()
        }
    };
    events::normal(client, &pg, EVENT_CREATING, &format!("Creating Postgres {namespace}/{name}"))
        .await;

    let lookup = KubeLookup::new(client.clone());
    if let Err(e) = validate_postgres(&lookup, &pg, true).await {
        error!(namespace = %namespace, name = %name, "Invalid Postgres spec: {}", e);
        record_error(KIND_POSTGRES, "validation");
        events::warning(client, &pg, EVENT_INVALID_SPEC, &e.to_string()).await;
        set_phase(ctx, &pg, DatabasePhase::Failed).await?;
        return Ok(());
    }

    let dormant_api: Api<DormantDatabase> = Api::namespaced(client.clone(), &namespace);
    let dormant = dormant_api.get_opt(&name).await?;
    if let Err(e) = check_dormant_conflict(&pg, dormant.as_ref()) {
        events::warning(client, &pg, EVENT_FAILED, &e.to_string()).await;
        set_phase(ctx, &pg, DatabasePhase::Failed).await?;
        return Err(e.into());
    }

    let pg = ensure_auth_secret(ctx, &pg).await?;
    let version = fetch_version(ctx, &pg).await?;

    apply_offshoots(ctx, &pg, &version, true).await?;

    if let Err(e) = wait_for_statefulset(ctx, &pg).await {
        events::warning(client, &pg, EVENT_FAILED, &format!("{e:#}")).await;
        set_phase(ctx, &pg, DatabasePhase::Failed).await?;
        return Err(e);
    }

    let outcome = initialize(ctx, &pg, &version).await;
    let pg = set_phase(ctx, &pg, phase_after_initialization(&outcome)).await?;
    mark_initialized(ctx, &pg).await?;

    events::normal(
        client,
        &pg,
        EVENT_SUCCESSFUL,
        &format!("Successfully created Postgres {namespace}/{name}"),
    )
    .await;
    info!(namespace = %namespace, name = %name, "Postgres is running");

    sync_backup_and_monitor(ctx, &pg, &version).await
}

/// Generate `<name>-auth` and point `spec.authSecret` at it when no secret is set.
async fn ensure_auth_secret(ctx: &Context, pg: &Postgres) -> Result<Postgres> {
    if pg.spec.auth_secret.is_some() {
        return Ok(pg.clone());
    }
    let namespace = pg.namespace().unwrap_or_default();
    let name = pg.name_any();
    let secret_name = default_auth_secret_name(pg);

    let secret = build_auth_secret(pg, &generate_password());
    if create_if_absent(&ctx.client, &namespace, &secret).await? {
        info!(namespace = %namespace, name = %name, secret = %secret_name, "Generated auth secret");
    }

    let api: Api<Postgres> = Api::namespaced(ctx.client.clone(), &namespace);
    let patch = json!({ "spec": { "authSecret": { "name": secret_name } } });
    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .with_context(|| format!("setting spec.authSecret of {namespace}/{name}"))
}

async fn fetch_version(ctx: &Context, pg: &Postgres) -> Result<PostgresVersion> {
    let api: Api<PostgresVersion> = Api::all(ctx.client.clone());
    let name = pg.spec.version.as_str();
    retry_api_call(|| api.get_opt(name), &format!("get PostgresVersion {name}"))
        .await?
        .ok_or_else(|| anyhow!("PostgresVersion {name:?} not found"))
}

/// Run one provisioning step, publishing its outcome when `announce` is set.
async fn step<F>(ctx: &Context, pg: &Postgres, what: &str, announce: bool, fut: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match fut.await {
        Ok(()) => {
            if announce {
                events::normal(&ctx.client, pg, EVENT_SUCCESSFUL, &format!("Successfully created {what}"))
                    .await;
            }
            Ok(())
        }
        Err(e) => {
            record_error(KIND_POSTGRES, "provisioning");
            events::warning(&ctx.client, pg, EVENT_FAILED, &format!("Failed to create {what}: {e:#}"))
                .await;
            Err(e.context(format!("creating {what}")))
        }
    }
}

async fn apply_offshoots(
    ctx: &Context,
    pg: &Postgres,
    version: &PostgresVersion,
    announce: bool,
) -> Result<()> {
    let client = &ctx.client;
    let fm = ctx.config.field_manager.as_str();
    let namespace = pg.namespace().unwrap_or_default();
    let ns = namespace.as_str();

    let governing = build_governing_service(&ctx.config.governing_service, ns);
    step(ctx, pg, "governing service", announce, create_or_apply(client, ns, &governing, fm)).await?;

    step(ctx, pg, "primary service", announce, async {
        create_or_apply(client, ns, &build_primary_service(pg), fm).await?;
        create_or_apply(client, ns, &build_replicas_service(pg), fm).await
    })
    .await?;

    step(ctx, pg, "RBAC", announce, async {
        create_or_apply(client, ns, &build_service_account(pg), fm).await?;
        create_or_apply(client, ns, &build_role(pg), fm).await?;
        create_or_apply(client, ns, &build_role_binding(pg), fm).await
    })
    .await?;

    let sts = build_statefulset(
        pg,
        version,
        &ctx.config.governing_service,
        &ctx.config.exporter_image,
    );
    step(ctx, pg, "StatefulSet", announce, create_or_apply(client, ns, &sts, fm)).await?;

    match build_pdb(pg) {
        Some(pdb) => {
            step(ctx, pg, "PodDisruptionBudget", announce, create_or_apply(client, ns, &pdb, fm))
                .await?;
        }
        None => {
            delete_if_exists::<PodDisruptionBudget>(client, ns, &pg.name_any()).await?;
        }
    }

    Ok(())
}

async fn wait_for_statefulset(ctx: &Context, pg: &Postgres) -> Result<()> {
    let namespace = pg.namespace().unwrap_or_default();
    let name = pg.name_any();
    let replicas = pg.spec.replicas();
    let api: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), &namespace);

    poll_until(
        ctx.config.statefulset_poll(),
        &format!("StatefulSet {namespace}/{name} to be ready"),
        || {
            let api = api.clone();
            let name = name.clone();
            async move {
                let sts = api.get_opt(&name).await?;
                Ok(sts.is_some_and(|s| statefulset_ready(&s, replicas)))
            }
        },
    )
    .await
}

/// Restore from `spec.init.snapshotSource`, never failing the caller.
async fn initialize(ctx: &Context, pg: &Postgres, version: &PostgresVersion) -> InitOutcome {
    let namespace = pg.namespace().unwrap_or_default();
    let name = pg.name_any();

    let Some(source) = pg.spec.init.as_ref().and_then(|i| i.snapshot_source.as_ref()) else {
        return InitOutcome::Skipped;
    };
    if pg.spec.is_initialized() || is_resumed(pg) {
        return InitOutcome::Skipped;
    }

    if let Err(e) = set_phase(ctx, pg, DatabasePhase::Initializing).await {
        warn!(namespace = %namespace, name = %name, "Failed to set phase Initializing: {:#}", e);
    }
    events::normal(
        &ctx.client,
        pg,
        EVENT_INITIALIZING,
        &format!("Initializing from Snapshot {}", source.name),
    )
    .await;

    let snapshot_ns = source.namespace.clone().unwrap_or_else(|| namespace.clone());
    let result = async {
        let api: Api<Snapshot> = Api::namespaced(ctx.client.clone(), &snapshot_ns);
        let snapshot = api
            .get(&source.name)
            .await
            .with_context(|| format!("reading Snapshot {snapshot_ns}/{}", source.name))?;
        ctx.jobs
            .restore(pg, &snapshot, &tools_image(version, &ctx.config.tools_image))
            .await
    }
    .await;

    let outcome = match result {
        Ok(JobOutcome::Succeeded) => InitOutcome::Succeeded,
        Ok(JobOutcome::Failed) => InitOutcome::Failed("restore job failed".to_string()),
        Err(e) => InitOutcome::Failed(format!("{e:#}")),
    };

    match &outcome {
        InitOutcome::Failed(reason) => {
            warn!(namespace = %namespace, name = %name, reason = %reason, "Initialization failed");
            events::warning(
                &ctx.client,
                pg,
                EVENT_FAILED_TO_INITIALIZE,
                &format!("Failed to initialize: {reason}"),
            )
            .await;
        }
        _ => {
            events::normal(
                &ctx.client,
                pg,
                EVENT_SUCCESSFUL_INITIALIZE,
                "Successfully completed initialization",
            )
            .await;
        }
    }
    outcome
}

/// Set `spec.init.initialized` once the database reached `Running`.
async fn mark_initialized(ctx: &Context, pg: &Postgres) -> Result<()> {
    if pg.spec.init.is_none() || pg.spec.is_initialized() {
        return Ok(());
    }
    let namespace = pg.namespace().unwrap_or_default();
    let api: Api<Postgres> = Api::namespaced(ctx.client.clone(), &namespace);
    let patch = json!({ "spec": { "init": { "initialized": true } } });
    api.patch(&pg.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .with_context(|| format!("marking {namespace}/{} initialized", pg.name_any()))?;
    Ok(())
}

// ============================================================================
// Update
// ============================================================================

async fn update_postgres(ctx: &Context, pg: &Postgres) -> Result<()> {
    let namespace = pg.namespace().unwrap_or_default();
    let name = pg.name_any();
    let version = fetch_version(ctx, pg).await?;

    let observed = pg.status.as_ref().and_then(|s| s.observed_generation);
    if should_reconcile(pg.metadata.generation, observed) {
        info!(namespace = %namespace, name = %name, "Spec changed, re-applying offshoots");
        apply_offshoots(ctx, pg, &version, false).await?;
        update_status::<Postgres, _>(&ctx.client, &ctx.config, &namespace, &name, |latest, status| {
            status.observed_generation = latest.metadata.generation;
        })
        .await?;
    }

    record_phase(&namespace, &name, &DatabasePhase::Running.to_string());
    sync_backup_and_monitor(ctx, pg, &version).await
}

/// Bring the backup schedule and monitoring agent in line with the spec.
///
/// Failures are published as events and leave `status.applied` untouched for the
/// failed part, so the next pass tries again.
async fn sync_backup_and_monitor(
    ctx: &Context,
    pg: &Postgres,
    version: &PostgresVersion,
) -> Result<()> {
    let namespace = pg.namespace().unwrap_or_default();
    let name = pg.name_any();
    let before = applied(pg);
    let mut after = before.clone();

    match plan_backup_change(before.backup_schedule.as_ref(), pg.spec.backup_schedule.as_ref()) {
        BackupChange::None => {}
        BackupChange::Schedule(schedule) => {
            let result = match validate_backup_schedule(&schedule) {
                Ok(()) => {
                    ctx.backups
                        .schedule(pg, &schedule, &tools_image(version, &ctx.config.tools_image))
                        .await
                }
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(()) => {
                    events::normal(
                        &ctx.client,
                        pg,
                        EVENT_BACKUP_SCHEDULED,
                        &format!("Backup scheduled at {:?}", schedule.cron_expression),
                    )
                    .await;
                    after.backup_schedule = Some(schedule);
                }
                Err(e) => {
                    warn!(namespace = %namespace, name = %name, "Failed to schedule backup: {:#}", e);
                    events::warning(&ctx.client, pg, EVENT_FAILED_TO_SCHEDULE_BACKUP, &format!("{e:#}"))
                        .await;
                }
            }
        }
        BackupChange::Stop => match ctx.backups.stop(pg).await {
            Ok(()) => after.backup_schedule = None,
            Err(e) => {
                warn!(namespace = %namespace, name = %name, "Failed to stop backup: {:#}", e);
            }
        },
    }

    after.monitor = sync_monitor(ctx, pg, before.monitor.as_ref()).await;

    if after != before {
        update_status::<Postgres, _>(&ctx.client, &ctx.config, &namespace, &name, |_, status| {
            status.applied = Some(after.clone());
        })
        .await?;
    }
    Ok(())
}

/// Apply the planned monitor change and return the spec now in effect.
async fn sync_monitor(
    ctx: &Context,
    pg: &Postgres,
    applied: Option<&MonitorSpec>,
) -> Option<MonitorSpec> {
    match plan_monitor_change(applied, pg.spec.monitor.as_ref()) {
        MonitorChange::None => applied.cloned(),
        MonitorChange::Add(spec) => add_monitor(ctx, pg, spec, EVENT_SUCCESSFUL_MONITOR_ADD).await,
        MonitorChange::Update(spec) => add_monitor(ctx, pg, spec, EVENT_SUCCESSFUL_MONITOR_UPDATE)
            .await
            .or_else(|| applied.cloned()),
        MonitorChange::Remove(old) => {
            if delete_monitor(ctx, pg, &old).await {
                None
            } else {
                Some(old)
            }
        }
        MonitorChange::Replace { old, new } => {
            if !delete_monitor(ctx, pg, &old).await {
                return Some(old);
            }
            add_monitor(ctx, pg, new, EVENT_SUCCESSFUL_MONITOR_ADD).await
        }
    }
}

async fn add_monitor(
    ctx: &Context,
    pg: &Postgres,
    spec: MonitorSpec,
    reason: &str,
) -> Option<MonitorSpec> {
    let agent = new_agent(ctx.client.clone(), ctx.config.clone(), spec.agent);
    match agent.create_or_update(pg, &spec).await {
        Ok(()) => {
            events::normal(
                &ctx.client,
                pg,
                reason,
                &format!("Monitoring agent {} ready", spec.agent.as_str()),
            )
            .await;
            Some(spec)
        }
        Err(e) => {
            warn!(
                namespace = %pg.namespace().unwrap_or_default(),
                name = %pg.name_any(),
                "Failed to set up monitoring: {:#}",
                e
            );
            events::warning(&ctx.client, pg, EVENT_FAILED_TO_ADD_MONITOR, &format!("{e:#}"))
                .await;
            None
        }
    }
}

async fn delete_monitor(ctx: &Context, pg: &Postgres, spec: &MonitorSpec) -> bool {
    let agent = new_agent(ctx.client.clone(), ctx.config.clone(), spec.agent);
    match agent.delete(pg, spec).await {
        Ok(()) => {
            events::normal(
                &ctx.client,
                pg,
                EVENT_SUCCESSFUL_MONITOR_DELETE,
                &format!("Monitoring agent {} removed", spec.agent.as_str()),
            )
            .await;
            true
        }
        Err(e) => {
            warn!(
                namespace = %pg.namespace().unwrap_or_default(),
                name = %pg.name_any(),
                "Failed to remove monitoring: {:#}",
                e
            );
            events::warning(&ctx.client, pg, EVENT_FAILED_TO_DELETE_MONITOR, &format!("{e:#}"))
                .await;
            false
        }
    }
}

/// Tear down whatever monitoring `pg` has. Best-effort.
pub async fn remove_monitor(ctx: &Context, pg: &Postgres) {
    let spec = applied(pg).monitor.or_else(|| pg.spec.monitor.clone());
    if let Some(spec) = spec {
        delete_monitor(ctx, pg, &spec).await;
    }
}

// ============================================================================
// Delete
// ============================================================================

#[async_trait::async_trait]
impl FinalizerCleanup for Postgres {
    async fn cleanup(&self, ctx: &Context) -> Result<CleanupOutcome> {
        let namespace = self.namespace().unwrap_or_default();
        let name = self.name_any();
        let policy = self.spec.termination_policy.unwrap_or(TerminationPolicy::Halt);
        info!(namespace = %namespace, name = %name, policy = %policy, "Postgres is being deleted");

        match policy {
            TerminationPolicy::DoNotTerminate => {
                events::warning(
                    &ctx.client,
                    self,
                    EVENT_DELETION_LOCKED,
                    &format!(
                        "Postgres {namespace}/{name} has terminationPolicy DoNotTerminate. Change it to delete."
                    ),
                )
                .await;
                return Ok(CleanupOutcome::Retain);
            }
            TerminationPolicy::Halt => {
                if let Err(e) = pause_database(ctx, self).await {
                    events::warning(&ctx.client, self, EVENT_FAILED_TO_PAUSE, &format!("{e:#}"))
                        .await;
                    return Err(e);
                }
            }
            TerminationPolicy::Delete => {
                release_workload(ctx, self).await?;
                let removed = delete_volumes(&ctx.client, &namespace, &name).await?;
                info!(namespace = %namespace, name = %name, pvcs = removed, "Deleted volumes");
            }
            TerminationPolicy::WipeOut => {
                let result = async {
                    release_workload(ctx, self).await?;
                    wipe_out_database(ctx, &WipeOutTarget::from_postgres(self)).await
                }
                .await;
                if let Err(e) = result {
                    events::warning(&ctx.client, self, EVENT_FAILED_TO_WIPE_OUT, &format!("{e:#}"))
                        .await;
                    return Err(e);
                }
                events::normal(
                    &ctx.client,
                    self,
                    EVENT_SUCCESSFUL_WIPE_OUT,
                    &format!("Successfully wiped out Postgres {namespace}/{name}"),
                )
                .await;
            }
        }

        record_final_phase(ctx, self, policy).await;
        forget_phase(&namespace, &name);
        Ok(CleanupOutcome::Done)
    }
}

/// Phase a deleted `Postgres` ends in once its termination policy has run.
#[must_use]
pub fn phase_after_deletion(policy: TerminationPolicy) -> Option<DatabasePhase> {
    match policy {
        TerminationPolicy::Halt => Some(DatabasePhase::Halted),
        TerminationPolicy::WipeOut => Some(DatabasePhase::WipedOut),
        TerminationPolicy::Delete | TerminationPolicy::DoNotTerminate => None,
    }
}

/// Record the final phase before the finalizer lets go. Best effort.
async fn record_final_phase(ctx: &Context, pg: &Postgres, policy: TerminationPolicy) {
    let Some(phase) = phase_after_deletion(policy) else {
        return;
    };
    if !can_transition(pg.phase(), phase) {
        debug!(name = %pg.name_any(), from = ?pg.phase(), to = %phase, "Skipping final phase");
        return;
    }
    if let Err(e) = set_postgres_phase(&ctx.client, &ctx.config, pg, phase).await {
        warn!(
            namespace = ?pg.namespace(),
            name = %pg.name_any(),
            error = %format!("{e:#}"),
            "Failed to record final phase"
        );
    }
}

/// Stop backups, drop monitoring and halt the workload.
async fn release_workload(ctx: &Context, pg: &Postgres) -> Result<()> {
    let namespace = pg.namespace().unwrap_or_default();
    let name = pg.name_any();
    ctx.backups
        .stop(pg)
        .await
        .with_context(|| format!("stopping backup schedule of {namespace}/{name}"))?;
    remove_monitor(ctx, pg).await;
    halt_database(&ctx.client, &namespace, &name).await
}

#[cfg(test)]
#[path = "postgres_tests.rs"]
mod postgres_tests;
