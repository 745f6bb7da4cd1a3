// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the PostgreSQL operator.
//!
//! This module provides specialized error types for:
//! - Resolving database credentials from secrets
//! - Building connection descriptors and saving certificate material
//! - Probing live database servers
//! - Validating `Postgres` objects (admission and pre-create)
//! - Dormant database lifecycle and WAL archive cleanup
//!
//! Reconcilers wrap these in `anyhow::Error` with namespace/name context; the
//! health checker turns them into condition messages.

use thiserror::Error;

/// Errors resolving the username/password of a database.
#[derive(Error, Debug, Clone)]
pub enum CredentialError {
    /// No usable credentials. `name` is the secret, or the `Postgres` itself when
    /// `spec.authSecret` is unset; `reason` says which case applies.
    #[error("credentials for {namespace}/{name} not found: {reason}")]
    CredentialNotFound {
        namespace: String,
        name: String,
        reason: String,
    },
}

/// Errors building a connection descriptor.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    #[error("failed to set up connection to Postgres {namespace}/{name}: {reason}")]
    ConnectionSetupFailed {
        namespace: String,
        name: String,
        reason: String,
    },
}

/// Errors from a single liveness probe.
#[derive(Error, Debug, Clone)]
pub enum ProbeError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Setup(#[from] ConnectionError),

    #[error("timed out after {secs}s probing {host}")]
    Timeout { host: String, secs: u64 },

    #[error("failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("query against {host} failed: {reason}")]
    Query { host: String, reason: String },

    #[error("invalid TLS configuration: {reason}")]
    Tls { reason: String },
}

impl ProbeError {
    /// Whether the failure is about the server rather than our own configuration.
    ///
    /// Configuration errors (missing secret, bad certificates) will not heal by
    /// retrying on the next tick until someone fixes the objects.
    #[must_use]
    pub fn is_server_side(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Connect { .. } | Self::Query { .. }
        )
    }

    /// Short label used for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Credentials(_) => "credentials",
            Self::Setup(_) => "setup",
            Self::Timeout { .. } => "timeout",
            Self::Connect { .. } => "connect",
            Self::Query { .. } => "query",
            Self::Tls { .. } => "tls",
        }
    }
}

/// Validation failures for a `Postgres` object.
///
/// The display strings are returned verbatim to API clients by the admission webhook.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("spec.version is missing")]
    MissingVersion,

    #[error("PostgresVersion {version:?} not found")]
    UnknownVersion { version: String },

    #[error("PostgresVersion {version:?} is deprecated")]
    DeprecatedVersion { version: String },

    #[error("spec.replicas {replicas} invalid. Value must be greater than zero")]
    InvalidReplicas { replicas: i32 },

    #[error("environment variable {name} is forbidden to use in Postgres spec")]
    ForbiddenEnvVar { name: String },

    #[error("'spec.storageType' is missing")]
    MissingStorageType,

    #[error("invalid storage spec: {reason}")]
    InvalidStorage { reason: String },

    #[error("can't have sslMode '{ssl_mode}' without spec.tls")]
    SslModeRequiresTls { ssl_mode: String },

    #[error("can't have spec.tls with sslMode 'disable'")]
    TlsRequiresSslMode,

    #[error("can't have clientAuthMode 'cert' with sslMode 'disable'")]
    CertAuthRequiresSsl,

    #[error(
        "spec.leaderElection invalid: electionTick ({election_tick}) must be greater than heartbeatTick ({heartbeat_tick}), and both must be positive"
    )]
    InvalidLeaderElection {
        election_tick: i32,
        heartbeat_tick: i32,
    },

    #[error("'spec.terminationPolicy' is missing")]
    MissingTerminationPolicy,

    #[error("'spec.terminationPolicy: Halt' can not be used for 'Ephemeral' storage")]
    HaltWithEphemeralStorage,

    #[error("invalid monitor spec: {reason}")]
    InvalidMonitor { reason: String },

    #[error("invalid backup schedule: {reason}")]
    InvalidBackupSchedule { reason: String },

    #[error("auth secret {name} not found")]
    MissingAuthSecret { name: String },

    #[error("precondition failed for: {}. At least one of the following was changed:\n\t{}", .changed.join(", "), .guarded.join("\n\t"))]
    ImmutableFieldsChanged {
        changed: Vec<String>,
        guarded: Vec<String>,
    },

    #[error(
        "postgres \"{namespace}/{name}\" can't be terminated. To delete, change spec.terminationPolicy"
    )]
    DeletionForbidden { namespace: String, name: String },

    /// A catalog or API lookup needed for validation failed.
    #[error("failed to look up {what}: {reason}")]
    Lookup { what: String, reason: String },
}

/// Errors from the dormant database lifecycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LifecycleError {
    /// Creating a `Postgres` whose name is held by a dormant record of the same kind.
    #[error("resume Postgres {namespace}/{name} from its DormantDatabase instead of creating it")]
    ResumeRequired { namespace: String, name: String },

    #[error("a DormantDatabase {namespace}/{name} of kind {kind} already exists")]
    DormantKindMismatch {
        namespace: String,
        name: String,
        kind: String,
    },

    #[error("do not support InitSpec in spec.origin.postgres")]
    InitSpecOnResume,

    #[error("DormantDatabase {namespace}/{name} has no Postgres origin")]
    MissingOrigin { namespace: String, name: String },
}

/// Errors from the WAL archive object store.
#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("object store I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("object store {operation} on {bucket}/{key}: {reason}")]
    Remote {
        operation: &'static str,
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("invalid storage secret {secret}: {reason}")]
    InvalidCredentials { secret: String, reason: String },

    #[error("unsupported archive storage: {reason}")]
    Unsupported { reason: String },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
