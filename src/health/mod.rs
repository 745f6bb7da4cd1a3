// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Background health checking of running databases.
//!
//! - [`evaluator`] - per-instance pod, primary and cluster checks, written back as conditions
//! - [`scheduler`] - the recurring, cancellable tick fanning out one evaluation per instance
//! - [`kube_view`] - the cluster-backed [`evaluator::HealthStore`]

pub mod evaluator;
pub mod kube_view;
pub mod scheduler;

pub use evaluator::{HealthCondition, HealthEvaluator, HealthReport, HealthStore, HealthVerdict};
pub use kube_view::KubeHealthStore;
pub use scheduler::HealthScheduler;
