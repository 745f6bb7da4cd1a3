// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for PostgreSQL management.
//!
//! # Resource Types
//!
//! - [`Postgres`] - A declared PostgreSQL deployment (standalone or streaming cluster)
//! - [`DormantDatabase`] - The retained descriptor of a halted `Postgres`, used to resume it
//! - [`Snapshot`] - A backup taken from a database, usable as an init source
//! - [`PostgresVersion`] - Cluster-scoped catalog entry mapping a version to images
//!
//! # Example: Declaring an Instance
//!
//! ```rust,no_run
//! use postgres_operator::crd::{
//!     Postgres, PostgresSpec, StorageSpec, StorageType, TerminationPolicy,
//! };
//!
//! let spec = PostgresSpec {
//!     version: "9.6".to_string(),
//!     replicas: Some(3),
//!     storage_type: Some(StorageType::Durable),
//!     storage: Some(StorageSpec {
//!         storage_class_name: Some("standard".to_string()),
//!         access_modes: vec!["ReadWriteOnce".to_string()],
//!         size: Some("1Gi".to_string()),
//!     }),
//!     termination_policy: Some(TerminationPolicy::Halt),
//!     ..PostgresSpec::default()
//! };
//! let pg = Postgres::new("quick-postgres", spec);
//! ```

use crate::constants::{CLIENT_CERT_SECRET_SUFFIX, KIND_POSTGRES, SERVER_CERT_SECRET_SUFFIX};
use crate::labels::offshoot_selectors;
use k8s_openapi::api::core::v1::{EnvVar, ResourceRequirements};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Standard Kubernetes condition, extended with the generation it was computed for.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g. `DatabaseReady`, `DatabaseAcceptingConnection`)
    pub r#type: String,

    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    /// `metadata.generation` the condition was computed against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

// ============================================================================
// Postgres enums
// ============================================================================

/// Whether the database data survives pod restarts.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum StorageType {
    /// Backed by a `PersistentVolumeClaim` per pod
    Durable,
    /// Backed by an `emptyDir`; lost when the pod goes away
    Ephemeral,
}

/// How clients authenticate to the server.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientAuthMode {
    #[default]
    Md5,
    Scram,
    /// Client certificate authentication; requires TLS.
    Cert,
}

/// libpq `sslmode` values.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    #[default]
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Disable => "disable",
            Self::Allow => "allow",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        };
        f.write_str(value)
    }
}

/// Standby servers accept read-only queries (`Hot`) or not (`Warm`).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum StandbyMode {
    Hot,
    Warm,
}

/// Replication mode between the primary and its standbys.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum StreamingMode {
    Asynchronous,
    Synchronous,
}

/// What happens to the database when the `Postgres` object is deleted.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum TerminationPolicy {
    /// Deletion is rejected.
    DoNotTerminate,
    /// Workloads are removed; PVCs and secrets kept in a `DormantDatabase` for resume.
    Halt,
    /// Workloads and PVCs are removed; secrets and snapshots kept.
    Delete,
    /// Everything is removed, including unshared secrets, snapshots and WAL archives.
    WipeOut,
}

impl fmt::Display for TerminationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Lifecycle phase of a `Postgres`.
///
/// Allowed transitions are listed in [`crate::reconcilers::phase`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum DatabasePhase {
    Creating,
    Initializing,
    Running,
    Halted,
    Failed,
    WipedOut,
}

impl fmt::Display for DatabasePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Postgres spec building blocks
// ============================================================================

/// Reference to a secret in the database's namespace.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SecretReference {
    pub name: String,
}

/// Storage request for `Durable` instances.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,

    /// Requested capacity, e.g. `1Gi`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// Raft-style tick configuration for the in-pod leader election.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderElectionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_duration_seconds: Option<i32>,

    /// Ticks without a heartbeat before a standby starts an election
    pub election_tick: i32,

    /// Ticks between heartbeats from the leader
    pub heartbeat_tick: i32,
}

/// One-shot initialization source. Immutable once `initialized` is true.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitSpec {
    #[serde(default)]
    pub initialized: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_source: Option<SnapshotSourceSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_source: Option<ScriptSourceSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSourceSpec {
    pub name: String,

    /// Defaults to the database's namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptSourceSpec {
    /// ConfigMap holding the init scripts
    pub config_map: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_path: Option<String>,
}

/// Periodic backup configuration.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupScheduleSpec {
    /// Five-field cron expression
    pub cron_expression: String,

    /// Secret holding the object storage credentials
    pub storage_secret_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Continuous WAL archiving.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArchiverSpec {
    pub storage: ArchiveStorageSpec,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveStorageSpec {
    /// Archive onto a mounted filesystem path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalStorageSpec>,

    /// S3 (or S3-compatible) bucket holding the archive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Endpoint of an S3-compatible service; AWS when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Secret with `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY`; the ambient
    /// AWS credential chain is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_secret_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalStorageSpec {
    pub path: String,
}

/// Monitoring backend.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum MonitorAgent {
    /// Scrape annotations on the stats service
    #[serde(rename = "prometheus.io/builtin")]
    PrometheusBuiltin,
    /// A `ServiceMonitor` for the Prometheus Operator
    #[serde(rename = "prometheus.io/operator")]
    PrometheusOperator,
}

impl MonitorAgent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrometheusBuiltin => "prometheus.io/builtin",
            Self::PrometheusOperator => "prometheus.io/operator",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSpec {
    pub agent: MonitorAgent,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prometheus: Option<PrometheusSpec>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusSpec {
    /// Exporter port; defaults to the builtin exporter port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,

    /// Namespace the `ServiceMonitor` is created in (operator agent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Labels the Prometheus Operator selects `ServiceMonitor`s by
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Scrape interval, e.g. `30s`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
    pub kind: String,
    pub name: String,
}

/// TLS configuration. Secrets default to `<name>-server-cert` and `<name>-client-cert`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_ref: Option<IssuerRef>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_cert_secret: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_cert_secret: Option<String>,
}

// ============================================================================
// Postgres
// ============================================================================

/// `Postgres` declares a PostgreSQL deployment.
///
/// # Example YAML
///
/// ```yaml
/// apiVersion: kubedb.com/v1alpha2
/// kind: Postgres
/// metadata:
///   name: quick-postgres
///   namespace: demo
/// spec:
///   version: "9.6"
///   replicas: 3
///   storageType: Durable
///   storage:
///     storageClassName: standard
///     accessModes: [ReadWriteOnce]
///     size: 1Gi
///   terminationPolicy: Halt
/// ```
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "kubedb.com",
    version = "v1alpha2",
    kind = "Postgres",
    plural = "postgreses",
    shortname = "pg",
    namespaced,
    doc = "Postgres declares a PostgreSQL database. The operator provisions a StatefulSet with its services and RBAC, probes the servers for readiness, and halts or wipes the database out on deletion according to its termination policy."
)]
#[kube(status = "PostgresStatus")]
#[serde(rename_all = "camelCase")]
pub struct PostgresSpec {
    /// Version name, resolved against the `PostgresVersion` catalog.
    pub version: String,

    /// Number of members; more than one runs a streaming cluster. Defaults to 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub standby_mode: Option<StandbyMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming_mode: Option<StreamingMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader_election: Option<LeaderElectionConfig>,

    /// Secret with `username` and `password`. Generated as `<name>-auth` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_secret: Option<SecretReference>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_type: Option<StorageType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub init: Option<InitSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_schedule: Option<BackupScheduleSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub archiver: Option<ArchiverSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor: Option<MonitorSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    /// Defaults to `md5`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_auth_mode: Option<ClientAuthMode>,

    /// Defaults to `disable`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_mode: Option<SslMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_policy: Option<TerminationPolicy>,
}

/// Monitoring and backup configuration the operator last acted on.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppliedSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor: Option<MonitorSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_schedule: Option<BackupScheduleSpec>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostgresStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<DatabasePhase>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<AppliedSpec>,
}

impl PostgresSpec {
    #[must_use]
    pub fn replicas(&self) -> i32 {
        self.replicas.unwrap_or(1)
    }

    #[must_use]
    pub fn client_auth_mode(&self) -> ClientAuthMode {
        self.client_auth_mode.unwrap_or_default()
    }

    #[must_use]
    pub fn ssl_mode(&self) -> SslMode {
        self.ssl_mode.unwrap_or_default()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.init.as_ref().is_some_and(|init| init.initialized)
    }
}

impl Postgres {
    /// Labels selecting every offshoot object (pods, services, PVCs, snapshots).
    #[must_use]
    pub fn offshoot_selectors(&self) -> BTreeMap<String, String> {
        offshoot_selectors(KIND_POSTGRES, &self.name_any())
    }

    /// In-cluster DNS name of the primary service.
    #[must_use]
    pub fn primary_service_dns(&self) -> String {
        format!(
            "{}.{}.svc",
            self.name_any(),
            self.namespace().unwrap_or_default()
        )
    }

    /// In-cluster DNS name of one pod behind the governing service.
    #[must_use]
    pub fn host_dns(&self, pod_name: &str, governing_service: &str) -> String {
        format!(
            "{pod_name}.{governing_service}.{}.svc",
            self.namespace().unwrap_or_default()
        )
    }

    #[must_use]
    pub fn auth_secret_name(&self) -> Option<&str> {
        self.spec.auth_secret.as_ref().map(|s| s.name.as_str())
    }

    #[must_use]
    pub fn client_cert_secret_name(&self) -> String {
        self.spec
            .tls
            .as_ref()
            .and_then(|tls| tls.client_cert_secret.clone())
            .unwrap_or_else(|| format!("{}-{CLIENT_CERT_SECRET_SUFFIX}", self.name_any()))
    }

    #[must_use]
    pub fn server_cert_secret_name(&self) -> String {
        self.spec
            .tls
            .as_ref()
            .and_then(|tls| tls.server_cert_secret.clone())
            .unwrap_or_else(|| format!("{}-{SERVER_CERT_SECRET_SUFFIX}", self.name_any()))
    }

    #[must_use]
    pub fn phase(&self) -> Option<DatabasePhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }

    #[must_use]
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

// ============================================================================
// DormantDatabase
// ============================================================================

/// Metadata of the paused instance.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OriginMeta {
    pub name: String,
    pub namespace: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OriginSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresSpec>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    pub metadata: OriginMeta,
    pub spec: OriginSpec,
}

/// `DormantDatabase` retains a halted database so it can be resumed or wiped out.
///
/// # Example YAML
///
/// ```yaml
/// apiVersion: kubedb.com/v1alpha2
/// kind: DormantDatabase
/// metadata:
///   name: quick-postgres
///   namespace: demo
///   labels:
///     kubedb.com/kind: Postgres
/// spec:
///   wipeOut: false
///   resume: false
///   origin:
///     metadata:
///       name: quick-postgres
///       namespace: demo
///     spec:
///       postgres:
///         version: "9.6"
/// ```
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "kubedb.com",
    version = "v1alpha2",
    kind = "DormantDatabase",
    shortname = "drmn",
    namespaced,
    doc = "DormantDatabase keeps the spec and metadata of a halted database. Set spec.resume to recreate the database, or spec.wipeOut to delete its data."
)]
#[kube(status = "DormantDatabaseStatus")]
#[serde(rename_all = "camelCase")]
pub struct DormantDatabaseSpec {
    pub origin: Origin,

    #[serde(default)]
    pub wipe_out: bool,

    #[serde(default)]
    pub resume: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum DormantDatabasePhase {
    Pausing,
    Paused,
    WipingOut,
    WipedOut,
    Resuming,
    Failed,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DormantDatabaseStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<DormantDatabasePhase>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pausing_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub wipe_out_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl DormantDatabase {
    /// Kind of the origin database, taken from the `kubedb.com/kind` label.
    #[must_use]
    pub fn origin_kind(&self) -> Option<&str> {
        self.labels()
            .get(crate::labels::LABEL_DATABASE_KIND)
            .map(String::as_str)
    }

    #[must_use]
    pub fn origin_postgres(&self) -> Option<&PostgresSpec> {
        self.spec.origin.spec.postgres.as_ref()
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// A backup taken from a database.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "kubedb.com",
    version = "v1alpha2",
    kind = "Snapshot",
    namespaced,
    doc = "Snapshot is a point-in-time backup of a database, stored in object storage. A Snapshot can be referenced from spec.init.snapshotSource to initialize a new database."
)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSpec {
    pub database_name: String,

    pub storage_secret_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

// ============================================================================
// PostgresVersion (catalog)
// ============================================================================

/// Catalog entry for a supported PostgreSQL version.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "catalog.kubedb.com",
    version = "v1alpha1",
    kind = "PostgresVersion",
    doc = "PostgresVersion maps a version name used in Postgres.spec.version to the database, exporter and tools images."
)]
#[serde(rename_all = "camelCase")]
pub struct PostgresVersionSpec {
    pub version: String,

    pub db_image: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exporter_image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools_image: Option<String>,

    /// Deprecated versions can no longer be used for new databases
    #[serde(default)]
    pub deprecated: bool,
}
