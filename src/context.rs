// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the `Postgres` and `DormantDatabase` controllers.
//!
//! Both controllers receive an `Arc<Context>` that contains:
//! - the Kubernetes client
//! - the operator configuration
//! - reflector stores for both CRD types
//! - the backup and restore collaborators
//!
//! The stores give in-memory lookups by `(namespace, name)` so that the
//! dormant-record check on create and the peer-secret scan on wipe-out do not
//! need extra API round trips.

use crate::config::OperatorConfig;
use crate::crd::{DormantDatabase, Postgres};
use crate::reconcilers::backup::{BackupScheduler, JobRunner};
use kube::runtime::reflector::Store;
use kube::{Client, ResourceExt};
use std::sync::Arc;

/// Shared context passed to all controllers.
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client for API operations
    pub client: Client,

    /// Operator settings, parsed once at startup
    pub config: Arc<OperatorConfig>,

    /// Reflector stores for both CRD types
    pub stores: Stores,

    /// Registers and removes periodic backups
    pub backups: Arc<dyn BackupScheduler>,

    /// Runs one-shot restore jobs
    pub jobs: Arc<dyn JobRunner>,
}

/// Reflector stores populated by the controllers' watches.
#[derive(Clone)]
pub struct Stores {
    pub postgreses: Store<Postgres>,
    pub dormant_databases: Store<DormantDatabase>,
}

impl Stores {
    /// Get a `Postgres` by name and namespace from the store.
    #[must_use]
    pub fn get_postgres(&self, name: &str, namespace: &str) -> Option<Arc<Postgres>> {
        self.postgreses
            .state()
            .iter()
            .find(|pg| pg.name_any() == name && pg.namespace().as_deref() == Some(namespace))
            .cloned()
    }

    /// Get a `DormantDatabase` by name and namespace from the store.
    #[must_use]
    pub fn get_dormant_database(&self, name: &str, namespace: &str) -> Option<Arc<DormantDatabase>> {
        self.dormant_databases
            .state()
            .iter()
            .find(|dd| dd.name_any() == name && dd.namespace().as_deref() == Some(namespace))
            .cloned()
    }

    /// All `Postgres` objects in `namespace`.
    #[must_use]
    pub fn postgreses_in(&self, namespace: &str) -> Vec<Arc<Postgres>> {
        self.postgreses
            .state()
            .into_iter()
            .filter(|pg| pg.namespace().as_deref() == Some(namespace))
            .collect()
    }

    /// All `DormantDatabase` objects in `namespace`.
    #[must_use]
    pub fn dormant_databases_in(&self, namespace: &str) -> Vec<Arc<DormantDatabase>> {
        self.dormant_databases
            .state()
            .into_iter()
            .filter(|dd| dd.namespace().as_deref() == Some(namespace))
            .collect()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
