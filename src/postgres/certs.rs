// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Local scratch storage for TLS certificate material.
//!
//! The SQL client reads the CA, client certificate and key from files, so the
//! contents of the client-cert secret are written under
//! `<root>/postgreses.kubedb.com/<namespace>/<name>/`. A SHA-256 fingerprint of the
//! secret data is remembered per instance; files are only rewritten when the
//! secret rotates. Each file is written to a temporary sibling and renamed into
//! place, so concurrent probes reading the previous files never see a partial write.
//!
//! Every instance has its own lock slot; writers of one instance never wait on
//! another instance.

use crate::constants::{
    API_GROUP, RESOURCE_POSTGRES_PLURAL, SECRET_KEY_CA_CERT, SECRET_KEY_TLS_CERT,
    SECRET_KEY_TLS_KEY,
};
use crate::errors::ConnectionError;
use k8s_openapi::api::core::v1::Secret;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Paths of the certificate material for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPaths {
    pub ca_cert: PathBuf,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
}

/// Fingerprint of the material currently on disk for one instance.
type Slot = Arc<Mutex<Option<String>>>;

/// Writes certificate secrets to disk, keyed by instance identity.
#[derive(Debug)]
pub struct CertStore {
    root: PathBuf,
    slots: Mutex<HashMap<String, Slot>>,
}

impl CertStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    async fn slot(&self, key: &str) -> Slot {
        self.slots
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Directory holding the material of one instance.
    #[must_use]
    pub fn dir_for(&self, namespace: &str, name: &str) -> PathBuf {
        self.root
            .join(format!("{RESOURCE_POSTGRES_PLURAL}.{API_GROUP}"))
            .join(namespace)
            .join(name)
    }

    /// Make sure the files for `namespace/name` match `secret`.
    ///
    /// `ca.crt` is required; `tls.crt` and `tls.key` are written when present.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::ConnectionSetupFailed`] if `ca.crt` is missing or
    /// a file cannot be written.
    pub async fn save(
        &self,
        namespace: &str,
        name: &str,
        secret: &Secret,
    ) -> Result<CertPaths, ConnectionError> {
        let setup_failed = |reason: String| ConnectionError::ConnectionSetupFailed {
            namespace: namespace.to_string(),
            name: name.to_string(),
            reason,
        };

        let data = secret.data.clone().unwrap_or_default();
        let get = |key: &str| data.get(key).map(|bytes| bytes.0.as_slice());

        let ca = get(SECRET_KEY_CA_CERT).ok_or_else(|| {
            setup_failed(format!(
                "certificate secret has no '{SECRET_KEY_CA_CERT}' entry"
            ))
        })?;
        let cert = get(SECRET_KEY_TLS_CERT);
        let key = get(SECRET_KEY_TLS_KEY);

        let dir = self.dir_for(namespace, name);
        let paths = CertPaths {
            ca_cert: dir.join(SECRET_KEY_CA_CERT),
            client_cert: cert.map(|_| dir.join(SECRET_KEY_TLS_CERT)),
            client_key: key.map(|_| dir.join(SECRET_KEY_TLS_KEY)),
        };

        let fingerprint = fingerprint(&[ca, cert.unwrap_or_default(), key.unwrap_or_default()]);
        let cache_key = format!("{namespace}/{name}");

        let slot = self.slot(&cache_key).await;
        let mut current = slot.lock().await;
        if current.as_ref() == Some(&fingerprint)
            && tokio::fs::try_exists(&paths.ca_cert).await.unwrap_or(false)
        {
            return Ok(paths);
        }

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| setup_failed(format!("creating {}: {e}", dir.display())))?;

        write_atomic(&paths.ca_cert, ca, false)
            .await
            .map_err(|e| setup_failed(e.to_string()))?;
        if let (Some(path), Some(bytes)) = (&paths.client_cert, cert) {
            write_atomic(path, bytes, false)
                .await
                .map_err(|e| setup_failed(e.to_string()))?;
        }
        if let (Some(path), Some(bytes)) = (&paths.client_key, key) {
            write_atomic(path, bytes, true)
                .await
                .map_err(|e| setup_failed(e.to_string()))?;
        }

        debug!(namespace = %namespace, name = %name, dir = %dir.display(), "Saved certificate material");
        *current = Some(fingerprint);

        Ok(paths)
    }

    /// Remove the material of an instance that no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an I/O error other than "not found".
    pub async fn remove(&self, namespace: &str, name: &str) -> std::io::Result<()> {
        let slot = self.slots.lock().await.remove(&format!("{namespace}/{name}"));
        let _writer = match &slot {
            Some(slot) => Some(slot.lock().await),
            None => None,
        };

        match tokio::fs::remove_dir_all(self.dir_for(namespace, name)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Hex SHA-256 over the given parts, each length-prefixed.
#[must_use]
pub fn fingerprint(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(64), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
}

async fn write_atomic(path: &Path, contents: &[u8], private: bool) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;

    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
    }
    #[cfg(not(unix))]
    let _ = private;

    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
#[path = "certs_tests.rs"]
mod certs_tests;
