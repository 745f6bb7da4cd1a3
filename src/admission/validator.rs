// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Validating admission for `Postgres` objects.
//!
//! [`PostgresValidator::admit`] takes one admission request and returns an
//! [`AdmissionDecision`]:
//!
//! - **CREATE / UPDATE**: structural and cross-field checks from
//!   [`validate_postgres`]. Updates are also diffed against the old object: the
//!   identity fields plus the configured immutable spec paths must not change, and
//!   `spec.init` joins that list once the database has been initialized.
//! - **DELETE**: the request carries no body, so the live object is fetched and the
//!   delete is rejected while `terminationPolicy` is `DoNotTerminate`.
//! - Any other operation, group or kind is allowed unconditionally.
//!
//! Until [`PostgresValidator::initialize`] has been called the validator answers
//! [`AdmissionDecision::NotReady`], which the webhook turns into a 503.

use crate::constants::{
    API_GROUP, KIND_POSTGRES, RESOURCE_POSTGRES_SINGULAR, VALIDATOR_API_GROUP,
    VALIDATOR_API_VERSION,
};
use crate::crd::{
    ClientAuthMode, MonitorAgent, Postgres, PostgresVersion, SslMode, StorageType,
    TerminationPolicy,
};
use crate::errors::ValidationError;
use crate::metrics::record_admission;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client, ResourceExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Environment variables the operator sets itself from the auth secret.
pub const FORBIDDEN_ENV_VARS: [&str; 2] = ["POSTGRES_PASSWORD", "POSTGRES_USER"];

/// Paths that identify an object and can never change.
const IDENTITY_FIELDS: [&str; 4] = ["apiVersion", "kind", "metadata.name", "metadata.namespace"];

/// Path added to the immutable set once `spec.init.initialized` is true.
const INIT_FIELD: &str = "spec.init";

// ============================================================================
// Collaborators
// ============================================================================

/// Cluster reads the validator needs.
#[async_trait]
pub trait AdmissionLookup: Send + Sync {
    async fn get_postgres(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Postgres>>;

    async fn get_version(&self, version: &str) -> anyhow::Result<Option<PostgresVersion>>;

    async fn secret_exists(&self, namespace: &str, name: &str) -> anyhow::Result<bool>;
}

/// [`AdmissionLookup`] reading straight from the API server.
pub struct KubeLookup {
    client: Client,
}

impl KubeLookup {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AdmissionLookup for KubeLookup {
    async fn get_postgres(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Postgres>> {
        let api: Api<Postgres> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_version(&self, version: &str) -> anyhow::Result<Option<PostgresVersion>> {
        let api: Api<PostgresVersion> = Api::all(self.client.clone());
        Ok(api.get_opt(version).await?)
    }

    async fn secret_exists(&self, namespace: &str, name: &str) -> anyhow::Result<bool> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?.is_some())
    }
}

// ============================================================================
// Structural validation
// ============================================================================

fn lookup_error(what: String, e: &anyhow::Error) -> ValidationError {
    ValidationError::Lookup {
        what,
        reason: format!("{e:#}"),
    }
}

/// Validate a `Postgres` against every structural and cross-field rule.
///
/// `strict` adds the checks only the controller runs before provisioning: the
/// referenced auth secret must exist and the catalog version must not be deprecated.
///
/// # Errors
///
/// Returns the first rule that fails, or [`ValidationError::Lookup`] when a catalog
/// or secret read fails.
pub async fn validate_postgres(
    lookup: &dyn AdmissionLookup,
    pg: &Postgres,
    strict: bool,
) -> Result<(), ValidationError> {
    let spec = &pg.spec;
    let namespace = pg.namespace().unwrap_or_default();

    if spec.version.trim().is_empty() {
        return Err(ValidationError::MissingVersion);
    }
    let version = lookup
        .get_version(&spec.version)
        .await
        .map_err(|e| lookup_error(format!("PostgresVersion {}", spec.version), &e))?
        .ok_or_else(|| ValidationError::UnknownVersion {
            version: spec.version.clone(),
        })?;

    if spec.replicas() < 1 {
        return Err(ValidationError::InvalidReplicas {
            replicas: spec.replicas(),
        });
    }

    if let Some(template) = &spec.pod_template {
        if let Some(env) = template
            .env
            .iter()
            .find(|e| FORBIDDEN_ENV_VARS.contains(&e.name.as_str()))
        {
            return Err(ValidationError::ForbiddenEnvVar {
                name: env.name.clone(),
            });
        }
    }

    validate_storage(pg)?;

    let ssl_mode = spec.ssl_mode();
    if spec.client_auth_mode() == ClientAuthMode::Cert && ssl_mode == SslMode::Disable {
        return Err(ValidationError::CertAuthRequiresSsl);
    }
    if spec.tls.is_some() && ssl_mode == SslMode::Disable {
        return Err(ValidationError::TlsRequiresSslMode);
    }
    if spec.tls.is_none() && ssl_mode != SslMode::Disable {
        return Err(ValidationError::SslModeRequiresTls {
            ssl_mode: ssl_mode.to_string(),
        });
    }

    if strict {
        if let Some(secret) = pg.auth_secret_name() {
            let exists = lookup
                .secret_exists(&namespace, secret)
                .await
                .map_err(|e| lookup_error(format!("secret {namespace}/{secret}"), &e))?;
            if !exists {
                return Err(ValidationError::MissingAuthSecret {
                    name: secret.to_string(),
                });
            }
        }
        if version.spec.deprecated {
            return Err(ValidationError::DeprecatedVersion {
                version: spec.version.clone(),
            });
        }
    }

    if let Some(le) = &spec.leader_election {
        if le.election_tick <= le.heartbeat_tick || le.heartbeat_tick <= 0 {
            return Err(ValidationError::InvalidLeaderElection {
                election_tick: le.election_tick,
                heartbeat_tick: le.heartbeat_tick,
            });
        }
    }

    match spec.termination_policy {
        None => return Err(ValidationError::MissingTerminationPolicy),
        Some(TerminationPolicy::Halt) if spec.storage_type == Some(StorageType::Ephemeral) => {
            return Err(ValidationError::HaltWithEphemeralStorage);
        }
        Some(_) => {}
    }

    validate_monitor(pg)
}

fn validate_storage(pg: &Postgres) -> Result<(), ValidationError> {
    let spec = &pg.spec;
    match spec.storage_type {
        None => Err(ValidationError::MissingStorageType),
        Some(StorageType::Ephemeral) => {
            if spec.storage.is_some() {
                return Err(ValidationError::InvalidStorage {
                    reason: "'spec.storage' must be empty for storageType Ephemeral".to_string(),
                });
            }
            Ok(())
        }
        Some(StorageType::Durable) => {
            let storage = spec.storage.as_ref().ok_or_else(|| ValidationError::InvalidStorage {
                reason: "'spec.storage' is required for storageType Durable".to_string(),
            })?;
            if storage.size.as_deref().is_none_or(|s| s.trim().is_empty()) {
                return Err(ValidationError::InvalidStorage {
                    reason: "'spec.storage.size' is required".to_string(),
                });
            }
            Ok(())
        }
    }
}

fn validate_monitor(pg: &Postgres) -> Result<(), ValidationError> {
    let Some(monitor) = &pg.spec.monitor else {
        return Ok(());
    };

    if let Some(port) = monitor.prometheus.as_ref().and_then(|p| p.port) {
        if !(1..=65535).contains(&port) {
            return Err(ValidationError::InvalidMonitor {
                reason: format!("prometheus.port {port} is out of range"),
            });
        }
    }

    if monitor.agent == MonitorAgent::PrometheusOperator
        && monitor
            .prometheus
            .as_ref()
            .is_none_or(|p| p.labels.is_empty())
    {
        return Err(ValidationError::InvalidMonitor {
            reason: format!(
                "prometheus.labels are required for agent {}",
                monitor.agent.as_str()
            ),
        });
    }

    Ok(())
}

// ============================================================================
// Update preconditions
// ============================================================================

/// Immutable paths for one update of `old`.
///
/// Built fresh per call from the configured list so concurrent admissions never
/// share a mutable set.
#[must_use]
pub fn immutable_fields_for(old: &Postgres, configured: &[String]) -> Vec<String> {
    let mut fields: Vec<String> = IDENTITY_FIELDS.iter().map(|f| (*f).to_string()).collect();
    fields.extend(configured.iter().cloned());
    if old.spec.is_initialized() && !fields.iter().any(|f| f == INIT_FIELD) {
        fields.push(INIT_FIELD.to_string());
    }
    fields
}

fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let pointer = format!("/{}", path.replace('.', "/"));
    value.pointer(&pointer)
}

/// Paths from `fields` whose values differ between `old` and `new`.
#[must_use]
pub fn changed_fields(old: &Value, new: &Value, fields: &[String]) -> Vec<String> {
    fields
        .iter()
        .filter(|path| lookup_path(old, path) != lookup_path(new, path))
        .cloned()
        .collect()
}

/// Reject an update that changes an immutable path.
///
/// # Errors
///
/// Returns [`ValidationError::ImmutableFieldsChanged`] listing the changed paths
/// and every guarded path.
pub fn validate_update(
    old: &Postgres,
    new: &Postgres,
    configured: &[String],
) -> Result<(), ValidationError> {
    let fields = immutable_fields_for(old, configured);
    let encode = |pg: &Postgres| {
        serde_json::to_value(pg).map_err(|e| ValidationError::Lookup {
            what: "object encoding".to_string(),
            reason: e.to_string(),
        })
    };
    let changed = changed_fields(&encode(old)?, &encode(new)?, &fields);
    if changed.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::ImmutableFieldsChanged {
            changed,
            guarded: fields,
        })
    }
}

// ============================================================================
// Admission
// ============================================================================

/// Group/version/kind carried in an admission request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestKind {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

/// The parts of an `admission.k8s.io/v1` request the validator reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    pub kind: RequestKind,
    pub operation: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Set for writes to a subresource such as `status`
    #[serde(default)]
    pub sub_resource: Option<String>,
    #[serde(default)]
    pub object: Option<Value>,
    #[serde(default)]
    pub old_object: Option<Value>,
}

/// Result of one admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Allowed,
    Denied(String),
    /// The validator has no cluster access yet
    NotReady,
}

impl AdmissionDecision {
    fn label(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied(_) => "denied",
            Self::NotReady => "not_ready",
        }
    }
}

/// Resource the validator is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorResource {
    pub group: &'static str,
    pub version: &'static str,
    pub resource: &'static str,
    pub singular: &'static str,
}

/// Admission validator for `Postgres`.
pub struct PostgresValidator {
    lookup: RwLock<Option<Arc<dyn AdmissionLookup>>>,
    immutable_fields: Vec<String>,
}

impl PostgresValidator {
    /// Create an uninitialized validator guarding `immutable_fields` on update.
    #[must_use]
    pub fn new(immutable_fields: Vec<String>) -> Self {
        Self {
            lookup: RwLock::new(None),
            immutable_fields,
        }
    }

    /// Give the validator cluster access; admissions are served from here on.
    pub async fn initialize(&self, lookup: Arc<dyn AdmissionLookup>) {
        *self.lookup.write().await = Some(lookup);
        info!("Postgres admission validator initialized");
    }

    #[must_use]
    pub fn resource(&self) -> ValidatorResource {
        ValidatorResource {
            group: VALIDATOR_API_GROUP,
            version: VALIDATOR_API_VERSION,
            resource: "postgresreviews",
            singular: "postgresreview",
        }
    }

    /// Decide one admission request.
    pub async fn admit(&self, request: &AdmissionRequest) -> AdmissionDecision {
        let operation = request.operation.as_str();
        let decision = self.decide(request).await;

        match &decision {
            AdmissionDecision::Denied(reason) => warn!(
                uid = %request.uid,
                operation = %operation,
                namespace = ?request.namespace,
                name = ?request.name,
                reason = %reason,
                "Admission request denied"
            ),
            _ => debug!(uid = %request.uid, operation = %operation, "Admission decided"),
        }
        record_admission(operation, decision.label());
        decision
    }

    async fn decide(&self, request: &AdmissionRequest) -> AdmissionDecision {
        if request.kind.group != API_GROUP
            || (request.kind.kind != KIND_POSTGRES
                && request.kind.kind.to_lowercase() != RESOURCE_POSTGRES_SINGULAR)
        {
            return AdmissionDecision::Allowed;
        }
        if !matches!(request.operation.as_str(), "CREATE" | "UPDATE" | "DELETE") {
            return AdmissionDecision::Allowed;
        }
        if request.sub_resource.as_deref().is_some_and(|s| !s.is_empty()) {
            return AdmissionDecision::Allowed;
        }

        let Some(lookup) = self.lookup.read().await.clone() else {
            return AdmissionDecision::NotReady;
        };

        let result = match request.operation.as_str() {
            "DELETE" => self.admit_delete(lookup.as_ref(), request).await,
            _ => self.admit_write(lookup.as_ref(), request).await,
        };
        match result {
            Ok(()) => AdmissionDecision::Allowed,
            Err(e) => AdmissionDecision::Denied(e.to_string()),
        }
    }

    async fn admit_delete(
        &self,
        lookup: &dyn AdmissionLookup,
        request: &AdmissionRequest,
    ) -> Result<(), ValidationError> {
        let namespace = request.namespace.clone().unwrap_or_default();
        let name = request.name.clone().unwrap_or_default();

        let live = lookup
            .get_postgres(&namespace, &name)
            .await
            .map_err(|e| lookup_error(format!("Postgres {namespace}/{name}"), &e))?;

        match live {
            Some(pg) if pg.spec.termination_policy == Some(TerminationPolicy::DoNotTerminate) => {
                Err(ValidationError::DeletionForbidden { namespace, name })
            }
            _ => Ok(()),
        }
    }

    async fn admit_write(
        &self,
        lookup: &dyn AdmissionLookup,
        request: &AdmissionRequest,
    ) -> Result<(), ValidationError> {
        let decode = |value: Option<&Value>| -> Result<Postgres, ValidationError> {
            let value = value.ok_or_else(|| ValidationError::Lookup {
                what: "request object".to_string(),
                reason: "missing".to_string(),
            })?;
            serde_json::from_value(value.clone()).map_err(|e| ValidationError::Lookup {
                what: "request object".to_string(),
                reason: e.to_string(),
            })
        };

        let mut pg = decode(request.object.as_ref())?;

        if request.operation == "UPDATE" {
            let mut old = decode(request.old_object.as_ref())?;
            // The operator fills in a generated auth secret after create.
            if old.spec.auth_secret.is_none() {
                old.spec.auth_secret.clone_from(&pg.spec.auth_secret);
            } else if pg.spec.auth_secret.is_none() {
                pg.spec.auth_secret.clone_from(&old.spec.auth_secret);
            }
            validate_update(&old, &pg, &self.immutable_fields)?;
        }

        validate_postgres(lookup, &pg, false).await
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod validator_tests;
