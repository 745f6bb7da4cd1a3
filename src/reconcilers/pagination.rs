// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Paged list calls against the API server.

use crate::constants::KUBE_LIST_PAGE_SIZE;
use anyhow::Result;
use kube::{api::ListParams, Api, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// List every object matching `list_params`, [`KUBE_LIST_PAGE_SIZE`] at a time.
///
/// Any `limit` or `continue` already set on `list_params` is replaced.
///
/// # Example
///
/// ```no_run
/// use kube::{Api, Client, api::ListParams};
/// use k8s_openapi::api::core::v1::PersistentVolumeClaim;
/// use postgres_operator::reconcilers::pagination::list_all_paginated;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = Client::try_default().await?;
/// let api: Api<PersistentVolumeClaim> = Api::namespaced(client, "demo");
/// let params = ListParams::default().labels("kubedb.com/name=quick-postgres");
///
/// let claims = list_all_paginated(&api, params).await?;
/// println!("{} claims", claims.len());
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if Kubernetes API operations fail.
pub async fn list_all_paginated<K>(api: &Api<K>, mut list_params: ListParams) -> Result<Vec<K>>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
    K::DynamicType: Default,
{
    list_params.limit = Some(KUBE_LIST_PAGE_SIZE);
    list_params.continue_token = None;

    let mut all_items = Vec::new();
    let mut page_count = 0;

    loop {
        page_count += 1;
        let result = api.list(&list_params).await?;

        let item_count = result.items.len();
        all_items.extend(result.items);

        debug!(
            page = page_count,
            items_in_page = item_count,
            total_items = all_items.len(),
            "Fetched list page"
        );

        match result.metadata.continue_ {
            Some(token) if !token.is_empty() => list_params.continue_token = Some(token),
            _ => break,
        }
    }

    debug!(
        total_pages = page_count,
        total_items = all_items.len(),
        "Paged list complete"
    );

    Ok(all_items)
}

#[cfg(test)]
#[path = "pagination_tests.rs"]
mod pagination_tests;
