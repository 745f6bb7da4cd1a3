// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Liveness probing of PostgreSQL servers.
//!
//! A probe opens a session, runs `SELECT now();` and closes the session. The whole
//! attempt is bounded by [`PROBE_TIMEOUT_SECS`]. Sessions are wrapped in a
//! [`SessionGuard`] so they are closed exactly once on every path, including when
//! the timeout drops the in-flight future.
//!
//! Sessions come from a [`SessionFactory`]. [`PgSessionFactory`] talks to real
//! servers with `tokio-postgres`, optionally over rustls.

use super::certs::CertStore;
use super::connection::{prepare_connection, ConnectionDescriptor};
use super::credentials::resolve_credentials;
use crate::constants::{PROBE_QUERY, PROBE_TIMEOUT_SECS};
use crate::crd::{Postgres, SslMode};
use crate::errors::ProbeError;
use async_trait::async_trait;
use kube::Client;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// An open database session.
#[async_trait]
pub trait DatabaseSession: Send {
    /// Run the trivial probe query.
    async fn round_trip(&mut self) -> Result<(), ProbeError>;

    /// Release the session. Called exactly once by [`SessionGuard`].
    fn close(&mut self);
}

/// Opens sessions for connection descriptors.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn DatabaseSession>, ProbeError>;
}

/// Owns a session and closes it once, explicitly or on drop.
pub struct SessionGuard {
    session: Option<Box<dyn DatabaseSession>>,
}

impl SessionGuard {
    #[must_use]
    pub fn new(session: Box<dyn DatabaseSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// # Errors
    ///
    /// Propagates the session's query error.
    pub async fn round_trip(&mut self) -> Result<(), ProbeError> {
        match self.session.as_mut() {
            Some(session) => session.round_trip().await,
            None => Err(ProbeError::Query {
                host: String::new(),
                reason: "session already closed".to_string(),
            }),
        }
    }

    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open a session, run the probe query and release the session.
///
/// # Errors
///
/// [`ProbeError::Timeout`] when the attempt exceeds the probe timeout, otherwise
/// the connect or query error.
pub async fn check_liveness(
    sessions: &dyn SessionFactory,
    descriptor: &ConnectionDescriptor,
) -> Result<(), ProbeError> {
    let attempt = async {
        let mut guard = SessionGuard::new(sessions.open(descriptor).await?);
        let result = guard.round_trip().await;
        guard.close();
        result
    };

    tokio::time::timeout(Duration::from_secs(PROBE_TIMEOUT_SECS), attempt)
        .await
        .unwrap_or_else(|_| {
            Err(ProbeError::Timeout {
                host: descriptor.host.clone(),
                secs: PROBE_TIMEOUT_SECS,
            })
        })
}

/// Probes one `Postgres` endpoint.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// # Errors
    ///
    /// Any [`ProbeError`] means the endpoint is offline for this tick.
    async fn probe(&self, pg: &Postgres, host: &str, port: u16) -> Result<(), ProbeError>;
}

/// Resolves credentials and certificates from the cluster, then probes.
pub struct PostgresProber {
    client: Client,
    certs: Arc<CertStore>,
    sessions: Arc<dyn SessionFactory>,
}

impl PostgresProber {
    #[must_use]
    pub fn new(client: Client, certs: Arc<CertStore>, sessions: Arc<dyn SessionFactory>) -> Self {
        Self {
            client,
            certs,
            sessions,
        }
    }
}

#[async_trait]
impl LivenessProbe for PostgresProber {
    async fn probe(&self, pg: &Postgres, host: &str, port: u16) -> Result<(), ProbeError> {
        let creds = resolve_credentials(&self.client, pg).await?;
        let descriptor =
            prepare_connection(&self.client, &self.certs, pg, &creds, host, port).await?;
        check_liveness(self.sessions.as_ref(), &descriptor).await
    }
}

// ============================================================================
// tokio-postgres sessions
// ============================================================================

/// A live `tokio-postgres` client and its connection task.
pub struct PgSession {
    host: String,
    client: tokio_postgres::Client,
    connection: JoinHandle<()>,
}

#[async_trait]
impl DatabaseSession for PgSession {
    async fn round_trip(&mut self) -> Result<(), ProbeError> {
        self.client
            .simple_query(PROBE_QUERY)
            .await
            .map(|_| ())
            .map_err(|e| ProbeError::Query {
                host: self.host.clone(),
                reason: e.to_string(),
            })
    }

    fn close(&mut self) {
        self.connection.abort();
    }
}

/// Opens real sessions with `tokio-postgres`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgSessionFactory;

#[async_trait]
impl SessionFactory for PgSessionFactory {
    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn DatabaseSession>, ProbeError> {
        let config = descriptor.to_pg_config();
        let host = descriptor.host.clone();
        let connect_failed = |e: tokio_postgres::Error| ProbeError::Connect {
            host: descriptor.host.clone(),
            reason: e.to_string(),
        };

        let (client, connection) = if descriptor.uses_tls() {
            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_client_config(descriptor)?);
            let (client, connection) = config.connect(tls).await.map_err(connect_failed)?;
            let host = host.clone();
            let handle = tokio::spawn(async move {
                if let Err(e) = connection.await {
                    debug!(host = %host, error = %e, "Probe connection closed with error");
                }
            });
            (client, handle)
        } else {
            let (client, connection) = config
                .connect(tokio_postgres::NoTls)
                .await
                .map_err(connect_failed)?;
            let host = host.clone();
            let handle = tokio::spawn(async move {
                if let Err(e) = connection.await {
                    debug!(host = %host, error = %e, "Probe connection closed with error");
                }
            });
            (client, handle)
        };

        Ok(Box::new(PgSession {
            host,
            client,
            connection,
        }))
    }
}

// ============================================================================
// TLS
// ============================================================================

fn tls_error(reason: impl std::fmt::Display) -> ProbeError {
    ProbeError::Tls {
        reason: reason.to_string(),
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ProbeError> {
    let file = std::fs::File::open(path).map_err(|e| tls_error(format!("{}: {e}", path.display())))?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error(format!("{}: {e}", path.display())))
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ProbeError> {
    let file = std::fs::File::open(path).map_err(|e| tls_error(format!("{}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| tls_error(format!("{}: {e}", path.display())))?
        .ok_or_else(|| tls_error(format!("{}: no private key found", path.display())))
}

/// Build the rustls client configuration for a descriptor's SSL mode.
///
/// | Mode                 | Server certificate check          |
/// |----------------------|-----------------------------------|
/// | `require`, no CA     | none                              |
/// | `require` / `verify-ca` | chain against the CA, any name |
/// | `verify-full`        | chain and hostname                |
///
/// # Errors
///
/// [`ProbeError::Tls`] when certificate files are unreadable or invalid.
pub fn tls_client_config(descriptor: &ConnectionDescriptor) -> Result<ClientConfig, ProbeError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let verifier: Arc<dyn ServerCertVerifier> = match &descriptor.ca_cert_path {
        None if descriptor.ssl_mode == SslMode::Require => {
            Arc::new(NoVerifier(provider.clone()))
        }
        None => {
            return Err(tls_error(format!(
                "sslmode {} needs a CA certificate",
                descriptor.ssl_mode
            )))
        }
        Some(ca_path) => {
            let mut roots = RootCertStore::empty();
            for cert in load_certs(ca_path)? {
                roots.add(cert).map_err(tls_error)?;
            }
            let webpki = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
                .build()
                .map_err(tls_error)?;
            if descriptor.ssl_mode == SslMode::VerifyFull {
                webpki as Arc<dyn ServerCertVerifier>
            } else {
                Arc::new(CaOnlyVerifier(webpki))
            }
        }
    };

    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(tls_error)?
        .dangerous()
        .with_custom_certificate_verifier(verifier);

    match (&descriptor.client_cert_path, &descriptor.client_key_path) {
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(load_certs(cert)?, load_key(key)?)
            .map_err(tls_error),
        _ => Ok(builder.with_no_client_auth()),
    }
}

/// Accepts any server certificate; handshake signatures are still checked.
#[derive(Debug)]
struct NoVerifier(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Verifies the chain against the configured CA but ignores the hostname.
#[derive(Debug)]
struct CaOnlyVerifier(Arc<WebPkiServerVerifier>);

fn is_name_mismatch(error: &CertificateError) -> bool {
    // Newer rustls releases report the mismatch with context attached.
    matches!(error, CertificateError::NotValidForName)
        || format!("{error:?}").starts_with("NotValidForName")
}

impl ServerCertVerifier for CaOnlyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self
            .0
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(rustls::Error::InvalidCertificate(ref e)) if is_name_mismatch(e) => {
                Ok(ServerCertVerified::assertion())
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.0.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.0.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.supported_verify_schemes()
    }
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod probe_tests;
