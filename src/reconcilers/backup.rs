// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Backup scheduling and restore jobs.
//!
//! Both collaborators sit behind traits so the `Postgres` reconciler can be
//! exercised without a cluster:
//!
//! - [`BackupScheduler`] registers a periodic backup as a `batch/v1` `CronJob`
//!   named `<name>-backup`, or removes it.
//! - [`JobRunner`] runs a one-shot restore `Job` named `<name>-restore-<snapshot>`
//!   and waits until it either succeeds or fails.

use crate::config::OperatorConfig;
use crate::crd::{BackupScheduleSpec, Postgres, Snapshot};
use crate::errors::ValidationError;
use crate::postgres_resources::{
    backup_cronjob_name, build_backup_cronjob, build_restore_job, restore_job_name,
};
use crate::reconcilers::resources::{create_if_absent, create_or_apply, delete_if_exists};
use crate::reconcilers::retry::poll_until;
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Number of fields in a standard cron expression.
const CRON_FIELD_COUNT: usize = 5;

/// Validate a backup schedule before it is registered.
///
/// The cron expression must have exactly five whitespace-separated fields made of
/// digits, letters (`MON`, `JAN`) and the operators `* / , - ?`. The storage secret
/// must be named.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidBackupSchedule`] describing the first problem found.
pub fn validate_backup_schedule(schedule: &BackupScheduleSpec) -> Result<(), ValidationError> {
    let fields: Vec<&str> = schedule.cron_expression.split_whitespace().collect();
    if fields.len() != CRON_FIELD_COUNT {
        return Err(ValidationError::InvalidBackupSchedule {
            reason: format!(
                "cron expression {:?} must have {CRON_FIELD_COUNT} fields, found {}",
                schedule.cron_expression,
                fields.len()
            ),
        });
    }

    if let Some(field) = fields.iter().find(|f| {
        !f.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '/' | ',' | '-' | '?'))
    }) {
        return Err(ValidationError::InvalidBackupSchedule {
            reason: format!("invalid cron field {field:?}"),
        });
    }

    if schedule.storage_secret_name.trim().is_empty() {
        return Err(ValidationError::InvalidBackupSchedule {
            reason: "storageSecretName is required".to_string(),
        });
    }

    Ok(())
}

/// Registers and removes the periodic backup of a database.
#[async_trait]
pub trait BackupScheduler: Send + Sync {
    /// Register (or update) the backup schedule for `pg`.
    async fn schedule(
        &self,
        pg: &Postgres,
        schedule: &BackupScheduleSpec,
        tools_image: &str,
    ) -> Result<()>;

    /// Remove the backup schedule of `pg`. Removing an absent schedule succeeds.
    async fn stop(&self, pg: &Postgres) -> Result<()>;
}

/// [`BackupScheduler`] backed by a `batch/v1` `CronJob`.
pub struct CronJobScheduler {
    client: Client,
    config: Arc<OperatorConfig>,
}

impl CronJobScheduler {
    #[must_use]
    pub fn new(client: Client, config: Arc<OperatorConfig>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl BackupScheduler for CronJobScheduler {
    async fn schedule(
        &self,
        pg: &Postgres,
        schedule: &BackupScheduleSpec,
        tools_image: &str,
    ) -> Result<()> {
        validate_backup_schedule(schedule)?;

        let namespace = pg.namespace().unwrap_or_default();
        let cronjob = build_backup_cronjob(pg, schedule, tools_image);
        create_or_apply(&self.client, &namespace, &cronjob, &self.config.field_manager)
            .await
            .with_context(|| format!("scheduling backup for {namespace}/{}", pg.name_any()))?;

        info!(
            namespace = %namespace,
            name = %pg.name_any(),
            schedule = %schedule.cron_expression,
            "Backup schedule registered"
        );
        Ok(())
    }

    async fn stop(&self, pg: &Postgres) -> Result<()> {
        let namespace = pg.namespace().unwrap_or_default();
        if delete_if_exists::<CronJob>(&self.client, &namespace, &backup_cronjob_name(pg)).await? {
            info!(namespace = %namespace, name = %pg.name_any(), "Backup schedule removed");
        }
        Ok(())
    }
}

/// Terminal state of a restore job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
}

/// Terminal outcome of `job`, or `None` while it is still running.
#[must_use]
pub fn job_outcome(job: &Job) -> Option<JobOutcome> {
    let status = job.status.as_ref()?;
    if status.succeeded.unwrap_or(0) > 0 {
        Some(JobOutcome::Succeeded)
    } else if status.failed.unwrap_or(0) > 0 {
        Some(JobOutcome::Failed)
    } else {
        None
    }
}

/// Runs a restore of a snapshot into a database.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Start the restore and wait for it to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the job cannot be created or does not finish in time.
    /// A job that runs and fails is reported as `Ok(JobOutcome::Failed)`.
    async fn restore(&self, pg: &Postgres, snapshot: &Snapshot, tools_image: &str)
        -> Result<JobOutcome>;
}

/// [`JobRunner`] backed by a `batch/v1` `Job`.
pub struct KubeJobRunner {
    client: Client,
    config: Arc<OperatorConfig>,
}

impl KubeJobRunner {
    #[must_use]
    pub fn new(client: Client, config: Arc<OperatorConfig>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl JobRunner for KubeJobRunner {
    async fn restore(
        &self,
        pg: &Postgres,
        snapshot: &Snapshot,
        tools_image: &str,
    ) -> Result<JobOutcome> {
        let namespace = pg.namespace().unwrap_or_default();
        let job_name = restore_job_name(pg, &snapshot.name_any());
        let job = build_restore_job(pg, snapshot, tools_image);

        if !create_if_absent(&self.client, &namespace, &job).await? {
            debug!(
                namespace = %namespace,
                job = %job_name,
                "Restore job already exists, waiting for it"
            );
        }

        let api: Api<Job> = Api::namespaced(self.client.clone(), &namespace);
        poll_until(self.config.restore_poll(), &format!("restore job {job_name}"), || {
            let api = api.clone();
            let job_name = job_name.clone();
            async move {
                let job = api
                    .get(&job_name)
                    .await
                    .with_context(|| format!("reading restore job {job_name}"))?;
                Ok(job_outcome(&job).is_some())
            }
        })
        .await?;

        let job = api
            .get(&job_name)
            .await
            .with_context(|| format!("reading restore job {job_name}"))?;
        let outcome = job_outcome(&job).unwrap_or(JobOutcome::Failed);
        if outcome == JobOutcome::Failed {
            warn!(namespace = %namespace, job = %job_name, "Restore job failed");
        } else {
            info!(namespace = %namespace, job = %job_name, "Restore job succeeded");
        }
        Ok(outcome)
    }
}
