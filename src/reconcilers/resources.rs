// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic create, apply and delete helpers for offshoot objects.
//!
//! Provisioning is idempotent: every helper may be called on every reconciliation
//! pass without creating duplicates or failing on objects that already exist.
//!
//! # Strategies
//!
//! - **Apply**: server-side apply for objects the operator owns outright
//!   (services, RBAC, `StatefulSet`, PDB, `CronJob`)
//! - **Create if absent**: for objects that must never be overwritten once they
//!   exist (the generated auth secret, restore jobs)
//! - **Delete**: by name or by label selector, treating 404 as success
//!
//! # Example
//!
//! ```rust,no_run
//! use postgres_operator::reconcilers::resources::create_or_apply;
//! use k8s_openapi::api::core::v1::ServiceAccount;
//! use kube::Client;
//! use anyhow::Result;
//!
//! async fn example(client: &Client, namespace: &str, sa: ServiceAccount) -> Result<()> {
//!     create_or_apply(client, namespace, &sa, "postgres-operator").await?;
//!     Ok(())
//! }
//! ```

use crate::metrics::{record_resource_created, record_resource_deleted};
use crate::reconcilers::pagination::list_all_paginated;
use crate::reconcilers::retry::is_not_found;
use anyhow::{Context as _, Result};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

/// Bound shared by every helper in this module.
pub trait NamespacedObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> NamespacedObject for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

fn object_name<T: NamespacedObject>(resource: &T) -> Result<String> {
    resource
        .meta()
        .name
        .clone()
        .ok_or_else(|| anyhow::anyhow!("{} must have a name", T::kind(&())))
}

/// Create or update a resource using server-side apply.
///
/// If the resource exists it is patched with SSA under `field_manager`,
/// otherwise it is created.
///
/// # Errors
///
/// Returns an error if the resource has no name or an API call fails.
pub async fn create_or_apply<T>(
    client: &Client,
    namespace: &str,
    resource: &T,
    field_manager: &str,
) -> Result<()>
where
    T: NamespacedObject,
{
    let name = object_name(resource)?;
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let kind = T::kind(&());

    debug!(
        namespace = %namespace,
        name = %name,
        kind = %kind,
        "Creating or updating resource with Apply strategy"
    );

    match api.get_opt(&name).await? {
        Some(_) => {
            api.patch(
                &name,
                &PatchParams::apply(field_manager).force(),
                &Patch::Apply(resource),
            )
            .await
            .with_context(|| format!("applying {kind} {namespace}/{name}"))?;
            debug!("Updated {} {}/{}", kind, namespace, name);
        }
        None => {
            api.create(&PostParams::default(), resource)
                .await
                .with_context(|| format!("creating {kind} {namespace}/{name}"))?;
            record_resource_created(&kind);
            info!("Created {} {}/{}", kind, namespace, name);
        }
    }

    Ok(())
}

/// Create a resource unless one with the same name already exists.
///
/// # Returns
///
/// `true` if the resource was created by this call.
///
/// # Errors
///
/// Returns an error if the resource has no name or an API call fails.
pub async fn create_if_absent<T>(client: &Client, namespace: &str, resource: &T) -> Result<bool>
where
    T: NamespacedObject,
{
    let name = object_name(resource)?;
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let kind = T::kind(&());

    match api.create(&PostParams::default(), resource).await {
        Ok(_) => {
            record_resource_created(&kind);
            info!("Created {} {}/{}", kind, namespace, name);
            Ok(true)
        }
        Err(kube::Error::Api(e)) if e.code == 409 => {
            debug!("{} {}/{} already exists", kind, namespace, name);
            Ok(false)
        }
        Err(e) => Err(e).with_context(|| format!("creating {kind} {namespace}/{name}")),
    }
}

/// Delete a resource by name. A missing resource is not an error.
///
/// # Returns
///
/// `true` if a delete was issued.
///
/// # Errors
///
/// Returns an error if the API call fails with anything other than 404.
pub async fn delete_if_exists<T>(client: &Client, namespace: &str, name: &str) -> Result<bool>
where
    T: NamespacedObject,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let kind = T::kind(&());

    match api.delete(name, &DeleteParams::foreground()).await {
        Ok(_) => {
            record_resource_deleted(&kind);
            info!("Deleted {} {}/{}", kind, namespace, name);
            Ok(true)
        }
        Err(e) if is_not_found(&e) => {
            debug!("{} {}/{} already gone", kind, namespace, name);
            Ok(false)
        }
        Err(e) => Err(e).with_context(|| format!("deleting {kind} {namespace}/{name}")),
    }
}

/// Delete every resource of type `T` matching `selector` in `namespace`.
///
/// # Returns
///
/// The number of deletes issued.
///
/// # Errors
///
/// Returns an error if listing fails or a delete fails with anything other than 404.
pub async fn delete_by_selector<T>(client: &Client, namespace: &str, selector: &str) -> Result<usize>
where
    T: NamespacedObject,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let kind = T::kind(&());

    let items = list_all_paginated(&api, ListParams::default().labels(selector))
        .await
        .with_context(|| format!("listing {kind} in {namespace} by {selector}"))?;

    let mut deleted = 0;
    for item in items {
        if delete_if_exists::<T>(client, namespace, &item.name_any()).await? {
            deleted += 1;
        }
    }

    if deleted > 0 {
        info!(
            namespace = %namespace,
            kind = %kind,
            selector = %selector,
            count = deleted,
            "Deleted resources by selector"
        );
    }
    Ok(deleted)
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
