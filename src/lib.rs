// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # postgres-operator - PostgreSQL Operator for Kubernetes
//!
//! Manages PostgreSQL databases declared as `Postgres` custom resources: each one
//! becomes a `StatefulSet` with its services, RBAC, auth secret and disruption
//! budget, optionally restored from a `Snapshot`, backed up on a schedule and
//! scraped by Prometheus. Deleting a database follows its termination policy,
//! which may park it as a `DormantDatabase` to be resumed later.
//!
//! ## Modules
//!
//! - [`crd`] - `Postgres`, `PostgresVersion`, `DormantDatabase` and `Snapshot`
//! - [`reconcilers`] - the two controllers and their building blocks
//! - [`admission`] - validating webhook for `Postgres`
//! - [`health`] - background health checks written back as conditions
//! - [`postgres`] - credentials, certificates and liveness probes against the servers
//! - [`postgres_resources`] - builders for every offshoot object
//! - [`context`] - shared context and reflector stores
//! - [`config`] - command-line and environment configuration
//! - [`metrics`] / [`server`] - Prometheus metrics and the probe endpoints
//!
//! ## Example
//!
//! ```rust,no_run
//! use postgres_operator::crd::{Postgres, PostgresSpec, StorageType, TerminationPolicy};
//!
//! let spec = PostgresSpec {
//!     version: "9.6".to_string(),
//!     replicas: Some(3),
//!     storage_type: Some(StorageType::Durable),
//!     termination_policy: Some(TerminationPolicy::Halt),
//!     ..PostgresSpec::default()
//! };
//! let pg = Postgres::new("quick-postgres", spec);
//! ```

pub mod admission;
pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod errors;
pub mod health;
pub mod labels;
pub mod metrics;
pub mod postgres;
pub mod postgres_resources;
pub mod reconcilers;
pub mod server;
pub mod status_reasons;

#[cfg(test)]
mod crd_tests;
