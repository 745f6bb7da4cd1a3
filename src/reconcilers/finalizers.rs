// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Finalizer management for namespaced resources.
//!
//! A resource carrying our finalizer cannot disappear until [`handle_deletion`] has
//! run its [`FinalizerCleanup::cleanup`] and the cleanup reported
//! [`CleanupOutcome::Done`]. A cleanup may also answer
//! [`CleanupOutcome::Retain`] to keep the resource around, which is how
//! `terminationPolicy: DoNotTerminate` locks a `Postgres` against deletion.
//!
//! # Example
//!
//! ```rust,ignore
//! use postgres_operator::constants::POSTGRES_FINALIZER;
//! use postgres_operator::reconcilers::finalizers::{ensure_finalizer, handle_deletion};
//!
//! async fn reconcile(ctx: &Context, pg: Postgres) -> anyhow::Result<()> {
//!     if pg.metadata.deletion_timestamp.is_some() {
//!         handle_deletion(ctx, &pg, POSTGRES_FINALIZER).await?;
//!         return Ok(());
//!     }
//!     ensure_finalizer(&ctx.client, &pg, POSTGRES_FINALIZER).await?;
//!     // Normal reconciliation...
//!     Ok(())
//! }
//! ```

use crate::context::Context;
use anyhow::Result;
use kube::api::{Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use tracing::info;

/// What [`handle_deletion`] should do once cleanup returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Cleanup finished; remove the finalizer.
    Done,
    /// Keep the finalizer; the resource stays until a later pass finishes cleanup.
    Retain,
}

/// Resources that need cleanup before their finalizer is removed.
#[async_trait::async_trait]
pub trait FinalizerCleanup: Resource + ResourceExt + Clone {
    /// Run the deletion side effects.
    ///
    /// # Errors
    ///
    /// An error keeps the finalizer in place; the next reconciliation retries.
    async fn cleanup(&self, ctx: &Context) -> Result<CleanupOutcome>;
}

/// Whether `finalizer` is present on `resource`.
#[must_use]
pub fn has_finalizer<T: Resource>(resource: &T, finalizer: &str) -> bool {
    resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Finalizer list of `resource` with `finalizer` appended (if missing).
#[must_use]
pub fn with_finalizer<T: Resource>(resource: &T, finalizer: &str) -> Vec<String> {
    let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
    if !finalizers.iter().any(|f| f == finalizer) {
        finalizers.push(finalizer.to_string());
    }
    finalizers
}

/// Finalizer list of `resource` with every copy of `finalizer` removed.
#[must_use]
pub fn without_finalizer<T: Resource>(resource: &T, finalizer: &str) -> Vec<String> {
    let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
    finalizers.retain(|f| f != finalizer);
    finalizers
}

async fn patch_finalizers<T>(client: &Client, resource: &T, finalizers: Vec<String>) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let namespace = resource.namespace().unwrap_or_default();
    let api: Api<T> = Api::namespaced(client.clone(), &namespace);
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(&resource.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Add `finalizer` to `resource` if not already present.
///
/// # Errors
///
/// Returns an error if the patch fails.
pub async fn ensure_finalizer<T>(client: &Client, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    if has_finalizer(resource, finalizer) {
        return Ok(());
    }

    patch_finalizers(client, resource, with_finalizer(resource, finalizer)).await?;
    info!(
        kind = %T::kind(&()),
        namespace = %resource.namespace().unwrap_or_default(),
        name = %resource.name_any(),
        finalizer = %finalizer,
        "Added finalizer"
    );
    Ok(())
}

/// Remove `finalizer` from `resource` if present.
///
/// # Errors
///
/// Returns an error if the patch fails.
pub async fn remove_finalizer<T>(client: &Client, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    if !has_finalizer(resource, finalizer) {
        return Ok(());
    }

    patch_finalizers(client, resource, without_finalizer(resource, finalizer)).await?;
    info!(
        kind = %T::kind(&()),
        namespace = %resource.namespace().unwrap_or_default(),
        name = %resource.name_any(),
        finalizer = %finalizer,
        "Removed finalizer"
    );
    Ok(())
}

/// Run cleanup for a resource being deleted and release it.
///
/// Nothing happens if our finalizer is already gone. Otherwise cleanup runs and,
/// when it reports [`CleanupOutcome::Done`], the finalizer is removed.
///
/// # Errors
///
/// Returns the cleanup or patch error; the finalizer then stays in place.
pub async fn handle_deletion<T>(ctx: &Context, resource: &T, finalizer: &str) -> Result<CleanupOutcome>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + FinalizerCleanup
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    if !has_finalizer(resource, finalizer) {
        return Ok(CleanupOutcome::Done);
    }

    info!(kind = %T::kind(&()), namespace = %namespace, name = %name, "Running deletion cleanup");
    let outcome = resource.cleanup(ctx).await?;

    if outcome == CleanupOutcome::Done {
        remove_finalizer(&ctx.client, resource, finalizer).await?;
    } else {
        info!(
            kind = %T::kind(&()),
            namespace = %namespace,
            name = %name,
            "Cleanup retained the resource, finalizer kept"
        );
    }
    Ok(outcome)
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
