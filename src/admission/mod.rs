// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Validating admission for `Postgres` resources.
//!
//! - [`validator`] - the admission rules, usable without a webhook (the
//!   reconciler runs [`validator::validate_postgres`] in strict mode before
//!   provisioning)
//! - [`server`] - the HTTPS endpoint the API server calls

pub mod server;
pub mod validator;

pub use server::{run_webhook_server, WebhookError};
pub use validator::{
    validate_postgres, AdmissionDecision, AdmissionLookup, KubeLookup, PostgresValidator,
};
