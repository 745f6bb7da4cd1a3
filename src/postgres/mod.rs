// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Talking to the database servers themselves.
//!
//! Layered leaf-first:
//!
//! - [`credentials`] - username/password from the auth secret
//! - [`certs`] - certificate material written to local scratch storage
//! - [`connection`] - the connection descriptor, per auth mode and SSL mode
//! - [`probe`] - a bounded `SELECT now();` round trip with guaranteed session release

pub mod certs;
pub mod connection;
pub mod credentials;
pub mod probe;

pub use connection::{effective_ssl_mode, ConnectionDescriptor};
pub use credentials::{resolve_credentials, Credentials};
pub use probe::{check_liveness, LivenessProbe, PostgresProber};
