// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the PostgreSQL operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the database CRDs (`Postgres`, `DormantDatabase`, `Snapshot`)
pub const API_GROUP: &str = "kubedb.com";

/// API version for the database CRDs
pub const API_VERSION: &str = "v1alpha2";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "kubedb.com/v1alpha2";

/// API group for the version catalog
pub const CATALOG_API_GROUP: &str = "catalog.kubedb.com";

/// Kind name for `Postgres` resource
pub const KIND_POSTGRES: &str = "Postgres";

/// Kind name for `DormantDatabase` resource
pub const KIND_DORMANT_DATABASE: &str = "DormantDatabase";

/// Plural resource name for `Postgres`
pub const RESOURCE_POSTGRES_PLURAL: &str = "postgreses";

/// Singular resource name for `Postgres`
pub const RESOURCE_POSTGRES_SINGULAR: &str = "postgres";

/// Group served by the validating admission webhook
pub const VALIDATOR_API_GROUP: &str = "validators.kubedb.com";

/// Version served by the validating admission webhook
pub const VALIDATOR_API_VERSION: &str = "v1alpha1";

/// Finalizer placed on every `Postgres` managed by the operator
pub const POSTGRES_FINALIZER: &str = "kubedb.com/postgres";

/// Reporter name used for Kubernetes Events and field manager for server-side apply
pub const OPERATOR_NAME: &str = "postgres-operator";

// ============================================================================
// PostgreSQL Protocol Constants
// ============================================================================

/// Standard PostgreSQL port
pub const POSTGRES_PORT: u16 = 5432;

/// Name of the primary service port
pub const POSTGRES_PORT_NAME: &str = "api";

/// Database the health checker connects to
pub const POSTGRES_DEFAULT_DATABASE: &str = "postgres";

/// Default superuser created in generated auth secrets
pub const POSTGRES_DEFAULT_USER: &str = "postgres";

/// Query issued by the liveness prober
pub const PROBE_QUERY: &str = "SELECT now();";

/// Timeout applied to connect + query of a single probe
pub const PROBE_TIMEOUT_SECS: u64 = 5;

/// Port the postgres exporter listens on inside the pod
pub const EXPORTER_PORT: i32 = 56790;

/// Name of the database port on the container
pub const POSTGRES_CONTAINER_PORT_NAME: &str = "db";

/// Name of the exporter port on the stats service
pub const EXPORTER_PORT_NAME: &str = "prom-http";

// ============================================================================
// Secret Keys
// ============================================================================

/// Key holding the database user in an auth secret
pub const SECRET_KEY_USERNAME: &str = "username";

/// Key holding the database password in an auth secret
pub const SECRET_KEY_PASSWORD: &str = "password";

/// Key holding the CA certificate in a TLS secret
pub const SECRET_KEY_CA_CERT: &str = "ca.crt";

/// Key holding the client/server certificate in a TLS secret
pub const SECRET_KEY_TLS_CERT: &str = "tls.crt";

/// Key holding the private key in a TLS secret
pub const SECRET_KEY_TLS_KEY: &str = "tls.key";

/// Length of generated database passwords
pub const GENERATED_PASSWORD_LENGTH: usize = 16;

// ============================================================================
// Resource Name Suffixes
// ============================================================================

/// Suffix of the generated auth secret
pub const AUTH_SECRET_SUFFIX: &str = "auth";

/// Suffix of the client certificate secret used for `cert` auth mode
pub const CLIENT_CERT_SECRET_SUFFIX: &str = "client-cert";

/// Suffix of the server certificate secret mounted into the pods
pub const SERVER_CERT_SECRET_SUFFIX: &str = "server-cert";

/// Suffix of the ConfigMap the replicas use as a leader lock
pub const LEADER_LOCK_SUFFIX: &str = "leader-lock";

/// Suffix of the service selecting standby pods
pub const REPLICAS_SERVICE_SUFFIX: &str = "replicas";

/// Suffix of the monitoring stats service
pub const STATS_SERVICE_SUFFIX: &str = "stats";

/// Suffix of the backup `CronJob`
pub const BACKUP_CRONJOB_SUFFIX: &str = "backup";

/// Suffix of the restore `Job`
pub const RESTORE_JOB_SUFFIX: &str = "restore";

// ============================================================================
// Timing Constants
// ============================================================================

/// Default interval between health-check ticks
pub const DEFAULT_READINESS_PROBE_INTERVAL_SECS: u64 = 10;

/// Requeue interval for a settled `Postgres` (`Running` or `Failed`) and for dormant databases
pub const RUNNING_REQUEUE_SECS: u64 = 300;

/// Requeue interval for a `Postgres` that is not yet running
pub const PENDING_REQUEUE_SECS: u64 = 30;

/// Requeue interval after a reconciliation error
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Ceiling for the `StatefulSet` readiness wait
pub const STATEFULSET_READY_TIMEOUT_SECS: u64 = 30 * 60;

/// Ceiling for the restore job wait
pub const RESTORE_JOB_TIMEOUT_SECS: u64 = 30 * 60;

/// Interval between polls while waiting on a `StatefulSet` or `Job`
pub const POLL_INTERVAL_SECS: u64 = 10;

/// Number of attempts for status-only writes
pub const STATUS_UPDATE_ATTEMPTS: u32 = 5;

/// Delay between status-only write attempts
pub const STATUS_UPDATE_INTERVAL_MILLIS: u64 = 10;

// ============================================================================
// Kubernetes API Constants
// ============================================================================

/// Page size for paginated list calls against the Kubernetes API
pub const KUBE_LIST_PAGE_SIZE: u32 = 100;

/// Page size for WAL archive listings
pub const WAL_LIST_PAGE_SIZE: usize = 50;

/// Storage secret key holding the S3 access key id
pub const STORAGE_SECRET_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";

/// Storage secret key holding the S3 secret access key
pub const STORAGE_SECRET_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";

/// Region used for S3 when neither the archiver nor the environment sets one
pub const DEFAULT_S3_REGION: &str = "us-east-1";

// ============================================================================
// Server Constants
// ============================================================================

/// Default port for `/metrics` and health endpoints
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Default port for the validating admission webhook
pub const WEBHOOK_SERVER_PORT: u16 = 8443;

/// Default bind address for the HTTP servers
pub const SERVER_BIND_ADDRESS: &str = "0.0.0.0";

/// Path the admission webhook is served on
pub const WEBHOOK_VALIDATE_PATH: &str = "/validate";

/// Default scratch directory for certificate material
pub const DEFAULT_CERT_DIR: &str = "/tmp/postgres-operator/certs";

/// Default governing (headless) service used for pod DNS
pub const DEFAULT_GOVERNING_SERVICE: &str = "kubedb";

/// Default exporter image when the version catalog does not name one
pub const DEFAULT_EXPORTER_IMAGE: &str = "kubedb/postgres_exporter:v0.4.6";

/// Default image used for backup/restore jobs
pub const DEFAULT_TOOLS_IMAGE: &str = "kubedb/postgres-tools:latest";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of tokio worker threads
pub const TOKIO_WORKER_THREADS: usize = 4;
