// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation for `Postgres` and `DormantDatabase` resources.
//!
//! # Reconcilers
//!
//! - [`reconcile_postgres`] - provisions a database, keeps its offshoots, backup
//!   schedule and monitoring in line with the spec, and carries out the
//!   termination policy on delete
//! - [`reconcile_dormant_database`] - resumes or wipes out a halted database
//!
//! # Building blocks
//!
//! - [`resources`] / [`pagination`] - idempotent create, apply and delete
//! - [`status`] / [`phase`] - status writes and the phase transition table
//! - [`finalizers`] - deletion gating
//! - [`events`] - Kubernetes events on the database object
//! - [`backup`] / [`monitor`] / [`wal`] - backup schedule, restore jobs,
//!   monitoring agents and WAL archive cleanup
//! - [`retry`] - backoff and polling
//!
//! # Example
//!
//! ```rust,no_run
//! use postgres_operator::context::Context;
//! use postgres_operator::crd::Postgres;
//! use postgres_operator::reconcilers::reconcile_postgres;
//! use std::sync::Arc;
//!
//! async fn reconcile(ctx: Arc<Context>, pg: Postgres) -> anyhow::Result<()> {
//!     reconcile_postgres(ctx, pg).await
//! }
//! ```

pub mod backup;
pub mod dormant;
pub mod events;
pub mod finalizers;
pub mod monitor;
pub mod pagination;
pub mod phase;
pub mod postgres;
pub mod resources;
pub mod retry;
pub mod status;
pub mod wal;

pub use dormant::reconcile_dormant_database;
pub use postgres::reconcile_postgres;

/// Whether the spec moved since the controller last processed it.
///
/// `metadata.generation` only changes on spec writes; `status.observedGeneration`
/// is what the controller recorded after its last pass. A missing observed
/// generation means the object was never processed. Without a current generation
/// there is nothing to compare, so no work is done.
#[must_use]
pub fn should_reconcile(current_generation: Option<i64>, observed_generation: Option<i64>) -> bool {
    match (current_generation, observed_generation) {
        (Some(current), Some(observed)) => current != observed,
        (Some(_), None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod mod_tests;
