// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Operator configuration.
//!
//! Every knob is a command-line flag that can also be set from the environment.
//! The parsed [`OperatorConfig`] is shared through [`crate::context::Context`]; nothing
//! is kept in mutable globals.
//!
//! # Example
//!
//! ```rust
//! use clap::Parser;
//! use postgres_operator::config::OperatorConfig;
//!
//! let config = OperatorConfig::parse_from([
//!     "postgres-operator",
//!     "--readiness-probe-interval-secs",
//!     "30",
//! ]);
//! assert_eq!(config.readiness_probe_interval().as_secs(), 30);
//! ```

use crate::constants::{
    DEFAULT_CERT_DIR, DEFAULT_EXPORTER_IMAGE, DEFAULT_GOVERNING_SERVICE,
    DEFAULT_READINESS_PROBE_INTERVAL_SECS, DEFAULT_TOOLS_IMAGE, METRICS_SERVER_PORT,
    OPERATOR_NAME, POLL_INTERVAL_SECS, RESTORE_JOB_TIMEOUT_SECS, STATEFULSET_READY_TIMEOUT_SECS,
    STATUS_UPDATE_ATTEMPTS, STATUS_UPDATE_INTERVAL_MILLIS, WEBHOOK_SERVER_PORT,
};
use crate::reconcilers::retry::PollConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Spec paths that may never change once a `Postgres` exists.
pub const DEFAULT_IMMUTABLE_SPEC_FIELDS: [&str; 5] = [
    "spec.standbyMode",
    "spec.streamingMode",
    "spec.authSecret",
    "spec.storageType",
    "spec.storage",
];

#[derive(Parser, Debug, Clone)]
#[command(name = "postgres-operator", about = "PostgreSQL Operator for Kubernetes", version)]
pub struct OperatorConfig {
    /// Seconds between health-check ticks
    #[arg(long, env = "READINESS_PROBE_INTERVAL_SECS", default_value_t = DEFAULT_READINESS_PROBE_INTERVAL_SECS)]
    pub readiness_probe_interval_secs: u64,

    /// Headless service giving database pods stable DNS names
    #[arg(long, env = "GOVERNING_SERVICE", default_value = DEFAULT_GOVERNING_SERVICE)]
    pub governing_service: String,

    /// Scratch directory for client certificate material
    #[arg(long, env = "CERT_DIR", default_value = DEFAULT_CERT_DIR)]
    pub cert_dir: PathBuf,

    /// Port serving /metrics, /healthz and /readyz
    #[arg(long, env = "METRICS_PORT", default_value_t = METRICS_SERVER_PORT)]
    pub metrics_port: u16,

    /// Serve the validating admission webhook
    #[arg(long, env = "ENABLE_WEBHOOK", default_value_t = false)]
    pub enable_webhook: bool,

    #[arg(long, env = "WEBHOOK_PORT", default_value_t = WEBHOOK_SERVER_PORT)]
    pub webhook_port: u16,

    #[arg(long, env = "WEBHOOK_CERT", default_value = "/etc/webhook/certs/tls.crt")]
    pub webhook_cert: PathBuf,

    #[arg(long, env = "WEBHOOK_KEY", default_value = "/etc/webhook/certs/tls.key")]
    pub webhook_key: PathBuf,

    /// Run the background database health checker
    #[arg(long, env = "ENABLE_HEALTH_CHECKER", default_value_t = true, action = clap::ArgAction::Set)]
    pub enable_health_checker: bool,

    /// Field manager for server-side apply
    #[arg(long, env = "FIELD_MANAGER", default_value = OPERATOR_NAME)]
    pub field_manager: String,

    /// Exporter image used when the version catalog does not name one
    #[arg(long, env = "EXPORTER_IMAGE", default_value = DEFAULT_EXPORTER_IMAGE)]
    pub exporter_image: String,

    /// Image running backup and restore jobs
    #[arg(long, env = "TOOLS_IMAGE", default_value = DEFAULT_TOOLS_IMAGE)]
    pub tools_image: String,

    /// Spec paths rejected on update (spec.init is added once initialized)
    #[arg(
        long,
        env = "IMMUTABLE_SPEC_FIELDS",
        value_delimiter = ',',
        default_values_t = DEFAULT_IMMUTABLE_SPEC_FIELDS.map(String::from)
    )]
    pub immutable_spec_fields: Vec<String>,

    #[arg(long, env = "STATUS_UPDATE_ATTEMPTS", default_value_t = STATUS_UPDATE_ATTEMPTS)]
    pub status_update_attempts: u32,

    #[arg(long, env = "STATUS_UPDATE_INTERVAL_MS", default_value_t = STATUS_UPDATE_INTERVAL_MILLIS)]
    pub status_update_interval_ms: u64,

    #[arg(long, env = "STATEFULSET_READY_TIMEOUT_SECS", default_value_t = STATEFULSET_READY_TIMEOUT_SECS)]
    pub statefulset_ready_timeout_secs: u64,

    #[arg(long, env = "RESTORE_TIMEOUT_SECS", default_value_t = RESTORE_JOB_TIMEOUT_SECS)]
    pub restore_timeout_secs: u64,

    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self::parse_from([OPERATOR_NAME])
    }
}

impl OperatorConfig {
    #[must_use]
    pub fn readiness_probe_interval(&self) -> Duration {
        Duration::from_secs(self.readiness_probe_interval_secs)
    }

    #[must_use]
    pub fn status_update_interval(&self) -> Duration {
        Duration::from_millis(self.status_update_interval_ms)
    }

    /// Poll settings for the `StatefulSet` readiness wait.
    #[must_use]
    pub fn statefulset_poll(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.statefulset_ready_timeout_secs),
        }
    }

    /// Poll settings for the restore job wait.
    #[must_use]
    pub fn restore_poll(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.restore_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::default();
        assert_eq!(config.readiness_probe_interval(), Duration::from_secs(10));
        assert_eq!(config.governing_service, "kubedb");
        assert_eq!(config.status_update_attempts, 5);
        assert!(config.enable_health_checker);
        assert!(!config.enable_webhook);
        assert_eq!(config.statefulset_poll().timeout, Duration::from_secs(1800));
        assert_eq!(
            config.immutable_spec_fields,
            DEFAULT_IMMUTABLE_SPEC_FIELDS.map(String::from).to_vec()
        );
    }

    #[test]
    fn test_immutable_fields_are_comma_separated() {
        let config = OperatorConfig::parse_from([
            "postgres-operator",
            "--immutable-spec-fields",
            "spec.storageType,spec.version",
        ]);
        assert_eq!(
            config.immutable_spec_fields,
            vec!["spec.storageType".to_string(), "spec.version".to_string()]
        );
    }

    #[test]
    fn test_health_checker_can_be_disabled() {
        let config =
            OperatorConfig::parse_from(["postgres-operator", "--enable-health-checker", "false"]);
        assert!(!config.enable_health_checker);
    }
}
