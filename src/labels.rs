// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! Offshoot objects (services, statefulsets, RBAC, PVCs, snapshots) are selected
//! by the `kubedb.com/kind` + `kubedb.com/name` pair, so every builder in
//! [`crate::postgres_resources`] stamps both.

use std::collections::BTreeMap;

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the tool managing the object
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the application name
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for the instance name
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

// ============================================================================
// Label Values
// ============================================================================

/// Value of `app.kubernetes.io/managed-by` on objects the operator owns.
///
/// Secrets carrying this value may be deleted by a wipe-out; anything else is
/// treated as user-owned and left alone.
pub const MANAGED_BY_KUBEDB: &str = "kubedb.com";

/// Value of `app.kubernetes.io/name`
pub const APP_NAME_POSTGRES: &str = "postgres";

// ============================================================================
// KubeDB Labels
// ============================================================================

/// Kind of database an offshoot object belongs to
pub const LABEL_DATABASE_KIND: &str = "kubedb.com/kind";

/// Name of the database an offshoot object belongs to
pub const LABEL_DATABASE_NAME: &str = "kubedb.com/name";

/// Role of a pod (`primary` / `replica`), maintained by the database image
pub const LABEL_ROLE: &str = "kubedb.com/role";

// ============================================================================
// KubeDB Annotations
// ============================================================================

/// Annotation on a `DormantDatabase` holding the JSON of the paused instance's init spec
pub const ANNOTATION_INIT_SPEC: &str = "kubedb.com/postgres-init-spec";

/// Annotation selecting the monitoring agent on the stats service
pub const ANNOTATION_MONITOR_AGENT: &str = "monitoring.appscode.com/agent";

/// Prometheus scrape annotations used by the builtin monitoring agent
pub const ANNOTATION_PROMETHEUS_SCRAPE: &str = "prometheus.io/scrape";
pub const ANNOTATION_PROMETHEUS_PATH: &str = "prometheus.io/path";
pub const ANNOTATION_PROMETHEUS_PORT: &str = "prometheus.io/port";

/// Labels that select every offshoot object of a database.
#[must_use]
pub fn offshoot_selectors(kind: &str, name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_DATABASE_KIND.to_string(), kind.to_string());
    labels.insert(LABEL_DATABASE_NAME.to_string(), name.to_string());
    labels
}

/// Full label set stamped on offshoot objects created by the operator.
#[must_use]
pub fn offshoot_labels(kind: &str, name: &str) -> BTreeMap<String, String> {
    let mut labels = offshoot_selectors(kind, name);
    labels.insert(K8S_MANAGED_BY.to_string(), MANAGED_BY_KUBEDB.to_string());
    labels.insert(K8S_NAME.to_string(), APP_NAME_POSTGRES.to_string());
    labels.insert(K8S_INSTANCE.to_string(), name.to_string());
    labels
}

/// Render a label map as a `key=value,...` selector string.
#[must_use]
pub fn selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether an object is owned by the operator according to its labels.
#[must_use]
pub fn is_kubedb_managed(labels: &BTreeMap<String, String>) -> bool {
    labels.get(K8S_MANAGED_BY).map(String::as_str) == Some(MANAGED_BY_KUBEDB)
}
