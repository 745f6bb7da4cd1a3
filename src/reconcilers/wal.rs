// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Write-ahead-log archive removal on wipe-out.
//!
//! The archive of a database lives under `<prefix>/kubedb/<namespace>/<name>/archive`.
//! Listing is cursor-paginated: [`wipe_out_wal_data`] asks for pages of
//! [`WAL_LIST_PAGE_SIZE`] objects and keeps going until the store reports no
//! further cursor.
//!
//! Two stores exist: [`S3ObjectStore`] for `archiver.storage.bucket` (AWS or any
//! S3-compatible endpoint) and [`LocalObjectStore`] for `archiver.storage.local`.

use crate::constants::{
    DEFAULT_S3_REGION, STORAGE_SECRET_ACCESS_KEY_ID, STORAGE_SECRET_SECRET_ACCESS_KEY,
    WAL_LIST_PAGE_SIZE,
};
use crate::crd::ArchiverSpec;
use crate::errors::ObjectStoreError;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client as S3Client;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Object keys, relative to the store root
    pub items: Vec<String>,
    /// Cursor for the next page; `None` at the end of the listing
    pub next_cursor: Option<String>,
}

/// Prefix-based listing and deletion of archived objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List up to `limit` keys under `prefix`, starting after `cursor`.
    async fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page, ObjectStoreError>;

    /// Remove one object. Removing a missing object succeeds.
    async fn remove(&self, key: &str) -> Result<(), ObjectStoreError>;
}

/// Archive folder for a database.
#[must_use]
pub fn wal_data_dir(prefix: Option<&str>, namespace: &str, name: &str) -> String {
    let base = format!("kubedb/{namespace}/{name}/archive");
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}/{base}"),
        None => base,
    }
}

/// Remove every object under the archive folder of `namespace/name`.
///
/// # Returns
///
/// The number of objects removed.
///
/// # Errors
///
/// Returns the first listing or removal error.
pub async fn wipe_out_wal_data(
    store: &dyn ObjectStore,
    prefix: Option<&str>,
    namespace: &str,
    name: &str,
) -> Result<usize, ObjectStoreError> {
    let folder = wal_data_dir(prefix, namespace, name);
    let mut cursor: Option<String> = None;
    let mut removed = 0;

    loop {
        let page = store
            .list(&folder, cursor.as_deref(), WAL_LIST_PAGE_SIZE)
            .await?;
        debug!(folder = %folder, items = page.items.len(), "Listed WAL page");

        for key in &page.items {
            store.remove(key).await?;
            removed += 1;
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    info!(
        namespace = %namespace,
        name = %name,
        folder = %folder,
        removed = removed,
        "WAL archive wiped out"
    );
    Ok(removed)
}

/// Remove the WAL archive described by `archiver`.
///
/// An archiver with neither a bucket nor a local path has nothing to wipe; it is
/// logged and counts as zero objects removed.
///
/// # Errors
///
/// Returns credential, listing or removal errors of the store.
pub async fn wipe_out_archive(
    archiver: &ArchiverSpec,
    storage_secret: Option<&Secret>,
    namespace: &str,
    name: &str,
) -> Result<usize, ObjectStoreError> {
    let store = match object_store_for(archiver, storage_secret).await {
        Ok(store) => store,
        Err(ObjectStoreError::Unsupported { reason }) => {
            warn!(
                namespace = %namespace,
                name = %name,
                reason = %reason,
                "Skipping WAL archive wipe-out"
            );
            return Ok(0);
        }
        Err(e) => return Err(e),
    };
    wipe_out_wal_data(store.as_ref(), archive_prefix(archiver), namespace, name).await
}

/// Open the object store an archiver spec points at.
///
/// `storage_secret` is the secret named by `archiver.storage.storageSecretName`,
/// when one is set.
///
/// # Errors
///
/// - [`ObjectStoreError::InvalidCredentials`] if the storage secret lacks a key
/// - [`ObjectStoreError::Unsupported`] if the spec names no storage at all
pub async fn object_store_for(
    archiver: &ArchiverSpec,
    storage_secret: Option<&Secret>,
) -> Result<Box<dyn ObjectStore>, ObjectStoreError> {
    let storage = &archiver.storage;
    if let Some(bucket) = &storage.bucket {
        let credentials = storage_secret.map(s3_credentials).transpose()?;
        let client = s3_client(
            credentials,
            storage.region.as_deref(),
            storage.endpoint.as_deref(),
        )
        .await;
        return Ok(Box::new(S3ObjectStore::new(client, bucket)));
    }
    if let Some(local) = &storage.local {
        return Ok(Box::new(LocalObjectStore::new(&local.path)));
    }

    Err(ObjectStoreError::Unsupported {
        reason: "archiver.storage has neither local nor bucket".to_string(),
    })
}

/// Archive prefix configured on an archiver spec.
#[must_use]
pub fn archive_prefix(archiver: &ArchiverSpec) -> Option<&str> {
    archiver.storage.prefix.as_deref()
}

/// [`ObjectStore`] rooted at a local directory.
///
/// Keys are `/`-separated paths relative to the root. The cursor is the last key
/// of the previous page; keys are listed in lexical order.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn io_error(path: &Path, source: std::io::Error) -> ObjectStoreError {
        ObjectStoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    async fn collect_keys(&self, dir: &Path, keys: &mut Vec<String>) -> Result<(), ObjectStoreError> {
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Self::io_error(&current, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Self::io_error(&current, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| Self::io_error(&path, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page, ObjectStoreError> {
        let mut keys = Vec::new();
        self.collect_keys(&self.root.join(prefix), &mut keys).await?;
        keys.sort();

        let mut remaining = keys
            .into_iter()
            .filter(|k| cursor.is_none_or(|c| k.as_str() > c))
            .peekable();

        let items: Vec<String> = remaining.by_ref().take(limit).collect();
        let next_cursor = if remaining.peek().is_some() {
            items.last().cloned()
        } else {
            None
        };

        Ok(Page { items, next_cursor })
    }

    async fn remove(&self, key: &str) -> Result<(), ObjectStoreError> {
        let path = self.root.join(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }
}

// ============================================================================
// S3
// ============================================================================

/// Static S3 credentials read from a storage secret.
///
/// # Errors
///
/// Returns [`ObjectStoreError::InvalidCredentials`] when a key is missing or not UTF-8.
pub fn s3_credentials(secret: &Secret) -> Result<Credentials, ObjectStoreError> {
    let read = |key: &str| -> Result<String, ObjectStoreError> {
        let invalid = |reason: String| ObjectStoreError::InvalidCredentials {
            secret: secret.name_any(),
            reason,
        };
        let bytes = secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .ok_or_else(|| invalid(format!("missing key {key}")))?;
        String::from_utf8(bytes.0.clone()).map_err(|_| invalid(format!("key {key} is not UTF-8")))
    };

    Ok(Credentials::new(
        read(STORAGE_SECRET_ACCESS_KEY_ID)?,
        read(STORAGE_SECRET_SECRET_ACCESS_KEY)?,
        None,
        None,
        "kubedb-storage-secret",
    ))
}

/// Build an S3 client.
///
/// Without static credentials the ambient AWS chain (environment, web identity,
/// instance metadata) is used. A custom endpoint switches to path-style addressing,
/// which S3-compatible services such as MinIO expect.
pub async fn s3_client(
    credentials: Option<Credentials>,
    region: Option<&str>,
    endpoint: Option<&str>,
) -> S3Client {
    let mut builder = match credentials {
        Some(credentials) => aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.unwrap_or(DEFAULT_S3_REGION).to_string()))
            .credentials_provider(credentials),
        None => {
            let configured = region.map(|r| Region::new(r.to_string()));
            let region_provider = RegionProviderChain::first_try(configured)
                .or_default_provider()
                .or_else(Region::new(DEFAULT_S3_REGION));
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(region_provider)
                .load()
                .await;
            aws_sdk_s3::config::Builder::from(&shared)
        }
    };

    if let Some(endpoint) = endpoint {
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }
    S3Client::from_conf(builder.build())
}

/// [`ObjectStore`] over one S3 bucket.
///
/// The cursor is the S3 continuation token.
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    fn remote_error<E: std::error::Error>(
        &self,
        operation: &'static str,
        key: &str,
        err: E,
    ) -> ObjectStoreError {
        ObjectStoreError::Remote {
            operation,
            bucket: self.bucket.clone(),
            key: key.to_string(),
            reason: DisplayErrorContext(err).to_string(),
        }
    }
}

/// Listing prefix for a folder: S3 has no directories, so match on `<folder>/`.
#[must_use]
pub fn s3_folder_prefix(folder: &str) -> String {
    format!("{}/", folder.trim_end_matches('/'))
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page, ObjectStoreError> {
        let prefix = s3_folder_prefix(prefix);
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .max_keys(i32::try_from(limit).unwrap_or(i32::MAX))
            .set_continuation_token(cursor.map(str::to_string))
            .send()
            .await
            .map_err(|e| self.remote_error("list", &prefix, e))?;

        let items = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();
        let next_cursor = output.next_continuation_token().map(str::to_string);

        Ok(Page { items, next_cursor })
    }

    async fn remove(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| self.remote_error("delete", key, e))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod wal_tests;
