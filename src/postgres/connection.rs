// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Connection descriptors for probing a database server.
//!
//! A descriptor is built fresh for every probe from the instance's auth mode,
//! SSL mode and resolved credentials:
//!
//! | Auth / TLS                | Certificate paths        | SSL mode              |
//! |---------------------------|--------------------------|-----------------------|
//! | `clientAuthMode: cert`    | CA, client cert, key     | normalized spec value |
//! | TLS configured, other auth| CA only                  | normalized spec value |
//! | no TLS                    | none                     | `disable`             |
//!
//! The driver has no notion of `prefer` or `allow`, so both are sent as `require`.
//! The stored spec is never touched.

use super::certs::{CertPaths, CertStore};
use super::credentials::Credentials;
use crate::constants::{POSTGRES_DEFAULT_DATABASE, PROBE_TIMEOUT_SECS};
use crate::crd::{ClientAuthMode, Postgres, SslMode};
use crate::errors::ConnectionError;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client, ResourceExt};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// SSL mode actually used for the outbound connection.
#[must_use]
pub fn effective_ssl_mode(configured: SslMode) -> SslMode {
    match configured {
        SslMode::Prefer | SslMode::Allow => SslMode::Require,
        other => other,
    }
}

/// Everything needed to open one session against one server.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub ssl_mode: SslMode,
    pub client_cert_path: Option<PathBuf>,
    pub client_key_path: Option<PathBuf>,
    pub ca_cert_path: Option<PathBuf>,
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl ConnectionDescriptor {
    /// Build a descriptor from already saved certificate material.
    ///
    /// `certs` is required whenever TLS is configured or the instance uses
    /// certificate authentication.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::ConnectionSetupFailed`] when certificate
    /// material is required but missing or incomplete.
    pub fn build(
        pg: &Postgres,
        creds: &Credentials,
        host: impl Into<String>,
        port: u16,
        certs: Option<&CertPaths>,
    ) -> Result<Self, ConnectionError> {
        let setup_failed = |reason: &str| ConnectionError::ConnectionSetupFailed {
            namespace: pg.namespace().unwrap_or_default(),
            name: pg.name_any(),
            reason: reason.to_string(),
        };

        let mut descriptor = Self {
            host: host.into(),
            port,
            database: POSTGRES_DEFAULT_DATABASE.to_string(),
            user: creds.username.clone(),
            password: creds.password.clone(),
            ssl_mode: SslMode::Disable,
            client_cert_path: None,
            client_key_path: None,
            ca_cert_path: None,
        };

        if pg.spec.client_auth_mode() == ClientAuthMode::Cert {
            let certs = certs.ok_or_else(|| setup_failed("client certificate secret not saved"))?;
            let (Some(cert), Some(key)) = (&certs.client_cert, &certs.client_key) else {
                return Err(setup_failed(
                    "client certificate secret must hold tls.crt and tls.key for cert auth",
                ));
            };
            descriptor.ssl_mode = effective_ssl_mode(pg.spec.ssl_mode());
            descriptor.ca_cert_path = Some(certs.ca_cert.clone());
            descriptor.client_cert_path = Some(cert.clone());
            descriptor.client_key_path = Some(key.clone());
        } else if pg.spec.tls.is_some() {
            let certs = certs.ok_or_else(|| setup_failed("CA certificate not saved"))?;
            descriptor.ssl_mode = effective_ssl_mode(pg.spec.ssl_mode());
            descriptor.ca_cert_path = Some(certs.ca_cert.clone());
        }

        Ok(descriptor)
    }

    #[must_use]
    pub fn uses_tls(&self) -> bool {
        self.ssl_mode != SslMode::Disable
    }

    /// libpq-style rendering with the password masked, for logs.
    #[must_use]
    pub fn redacted(&self) -> String {
        let mut out = format!(
            "user={} password=****** host={} port={} dbname={} sslmode={}",
            self.user, self.host, self.port, self.database, self.ssl_mode
        );
        for (key, path) in [
            ("sslrootcert", &self.ca_cert_path),
            ("sslcert", &self.client_cert_path),
            ("sslkey", &self.client_key_path),
        ] {
            if let Some(path) = path {
                out.push_str(&format!(" {key}={}", path.display()));
            }
        }
        out
    }

    /// Driver configuration. Certificate verification is configured separately
    /// on the TLS connector.
    #[must_use]
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .password(&self.password)
            .connect_timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .ssl_mode(if self.uses_tls() {
                tokio_postgres::config::SslMode::Require
            } else {
                tokio_postgres::config::SslMode::Disable
            });
        config
    }
}

/// Fetch and save certificate material if needed, then build the descriptor.
///
/// # Errors
///
/// Secret fetch and file write failures surface as
/// [`ConnectionError::ConnectionSetupFailed`].
pub async fn prepare_connection(
    client: &Client,
    cert_store: &CertStore,
    pg: &Postgres,
    creds: &Credentials,
    host: &str,
    port: u16,
) -> Result<ConnectionDescriptor, ConnectionError> {
    let namespace = pg.namespace().unwrap_or_default();
    let name = pg.name_any();

    let needs_certs = pg.spec.tls.is_some() || pg.spec.client_auth_mode() == ClientAuthMode::Cert;
    let certs = if needs_certs {
        let secret_name = pg.client_cert_secret_name();
        let secrets: Api<Secret> = Api::namespaced(client.clone(), &namespace);
        let secret = secrets
            .get(&secret_name)
            .await
            .map_err(|e| ConnectionError::ConnectionSetupFailed {
                namespace: namespace.clone(),
                name: name.clone(),
                reason: format!("fetching secret {secret_name}: {e}"),
            })?;
        Some(cert_store.save(&namespace, &name, &secret).await?)
    } else {
        None
    };

    let descriptor = ConnectionDescriptor::build(pg, creds, host, port, certs.as_ref())?;
    debug!(namespace = %namespace, name = %name, dsn = %descriptor.redacted(), "Prepared connection");
    Ok(descriptor)
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod connection_tests;
