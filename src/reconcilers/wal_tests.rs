// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `wal.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::crd::{ArchiveStorageSpec, LocalStorageSpec};
    use k8s_openapi::ByteString;
    use std::sync::Mutex;

    #[test]
    fn test_wal_data_dir() {
        assert_eq!(wal_data_dir(None, "demo", "pg"), "kubedb/demo/pg/archive");
        assert_eq!(
            wal_data_dir(Some("/team/"), "demo", "pg"),
            "team/kubedb/demo/pg/archive"
        );
        assert_eq!(wal_data_dir(Some(""), "demo", "pg"), "kubedb/demo/pg/archive");
    }

    /// Records every call; pages by index so the loop can be checked without disk.
    struct FakeStore {
        keys: Vec<String>,
        listed_cursors: Mutex<Vec<Option<String>>>,
        removed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn list(
            &self,
            prefix: &str,
            cursor: Option<&str>,
            limit: usize,
        ) -> Result<Page, ObjectStoreError> {
            self.listed_cursors
                .lock()
                .unwrap()
                .push(cursor.map(str::to_string));
            let start = cursor.map_or(0, |c| c.parse::<usize>().unwrap());
            let items: Vec<String> = self
                .keys
                .iter()
                .filter(|k| k.starts_with(prefix))
                .skip(start)
                .take(limit)
                .cloned()
                .collect();
            let end = start + items.len();
            let next_cursor = (end < self.keys.len()).then(|| end.to_string());
            Ok(Page { items, next_cursor })
        }

        async fn remove(&self, key: &str) -> Result<(), ObjectStoreError> {
            self.removed.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_wipe_out_follows_cursor_until_end() {
        let keys: Vec<String> = (0..120)
            .map(|i| format!("kubedb/demo/pg/archive/wal-{i:04}"))
            .collect();
        let store = FakeStore {
            keys: keys.clone(),
            listed_cursors: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        };

        let removed = wipe_out_wal_data(&store, None, "demo", "pg").await.unwrap();

        assert_eq!(removed, 120);
        assert_eq!(*store.removed.lock().unwrap(), keys);
        assert_eq!(
            *store.listed_cursors.lock().unwrap(),
            vec![None, Some("50".to_string()), Some("100".to_string())]
        );
    }

    #[tokio::test]
    async fn test_local_store_lists_in_pages() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("kubedb/demo/pg/archive");
        tokio::fs::create_dir_all(archive.join("0000001")).await.unwrap();
        for i in 0..5 {
            tokio::fs::write(archive.join(format!("0000001/wal-{i}")), b"x")
                .await
                .unwrap();
        }

        let store = LocalObjectStore::new(dir.path());
        let first = store.list("kubedb/demo/pg/archive", None, 3).await.unwrap();
        assert_eq!(first.items.len(), 3);
        assert_eq!(first.items[0], "kubedb/demo/pg/archive/0000001/wal-0");
        let cursor = first.next_cursor.clone().unwrap();
        assert_eq!(cursor, "kubedb/demo/pg/archive/0000001/wal-2");

        let second = store
            .list("kubedb/demo/pg/archive", Some(&cursor), 3)
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_local_wipe_out_keeps_other_databases() {
        let dir = tempfile::tempdir().unwrap();
        let ours = dir.path().join("backups/kubedb/demo/pg/archive");
        let theirs = dir.path().join("backups/kubedb/demo/other/archive");
        tokio::fs::create_dir_all(&ours).await.unwrap();
        tokio::fs::create_dir_all(&theirs).await.unwrap();
        for i in 0..60 {
            tokio::fs::write(ours.join(format!("wal-{i:03}")), b"x").await.unwrap();
        }
        tokio::fs::write(theirs.join("wal-000"), b"x").await.unwrap();

        let store = LocalObjectStore::new(dir.path());
        let removed = wipe_out_wal_data(&store, Some("backups"), "demo", "pg")
            .await
            .unwrap();

        assert_eq!(removed, 60);
        assert!(store
            .list("backups/kubedb/demo/pg/archive", None, 10)
            .await
            .unwrap()
            .items
            .is_empty());
        assert!(theirs.join("wal-000").exists());
    }

    #[tokio::test]
    async fn test_missing_archive_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert_eq!(
            wipe_out_wal_data(&store, None, "demo", "never-archived")
                .await
                .unwrap(),
            0
        );
        store.remove("kubedb/demo/never-archived/archive/x").await.unwrap();
    }

    fn local_archiver(path: &Path, prefix: Option<&str>) -> ArchiverSpec {
        ArchiverSpec {
            storage: ArchiveStorageSpec {
                local: Some(LocalStorageSpec {
                    path: path.display().to_string(),
                }),
                prefix: prefix.map(str::to_string),
                ..Default::default()
            },
        }
    }

    fn storage_secret(data: &[(&str, &str)]) -> Secret {
        let mut secret = Secret::default();
        secret.metadata.name = Some("s3-creds".to_string());
        secret.data = Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        );
        secret
    }

    #[tokio::test]
    async fn test_archiver_without_storage_is_skipped() {
        let archiver = ArchiverSpec::default();
        let err = object_store_for(&archiver, None).await.err().unwrap();
        assert!(matches!(err, ObjectStoreError::Unsupported { .. }));

        let removed = wipe_out_archive(&archiver, None, "demo", "pg").await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_wipe_out_archive_on_local_storage() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("team/kubedb/demo/pg/archive");
        tokio::fs::create_dir_all(&archive).await.unwrap();
        for i in 0..3 {
            tokio::fs::write(archive.join(format!("wal-{i}")), b"x").await.unwrap();
        }

        let archiver = local_archiver(dir.path(), Some("team"));
        assert_eq!(archive_prefix(&archiver), Some("team"));
        let removed = wipe_out_archive(&archiver, None, "demo", "pg").await.unwrap();
        assert_eq!(removed, 3);
    }

    #[tokio::test]
    async fn test_bucket_with_bad_secret_is_an_error() {
        let archiver = ArchiverSpec {
            storage: ArchiveStorageSpec {
                bucket: Some("wal-bucket".to_string()),
                storage_secret_name: Some("s3-creds".to_string()),
                ..Default::default()
            },
        };
        let secret = storage_secret(&[(STORAGE_SECRET_ACCESS_KEY_ID, "AKIA")]);

        let err = wipe_out_archive(&archiver, Some(&secret), "demo", "pg")
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectStoreError::InvalidCredentials { .. }));
        assert!(err.to_string().contains(STORAGE_SECRET_SECRET_ACCESS_KEY));
    }

    #[test]
    fn test_s3_credentials_from_secret() {
        let secret = storage_secret(&[
            (STORAGE_SECRET_ACCESS_KEY_ID, "AKIA"),
            (STORAGE_SECRET_SECRET_ACCESS_KEY, "shh"),
        ]);
        let credentials = s3_credentials(&secret).unwrap();
        assert_eq!(credentials.access_key_id(), "AKIA");
        assert_eq!(credentials.secret_access_key(), "shh");
    }

    #[test]
    fn test_s3_folder_prefix() {
        assert_eq!(s3_folder_prefix("kubedb/demo/pg/archive"), "kubedb/demo/pg/archive/");
        assert_eq!(s3_folder_prefix("kubedb/demo/pg/archive/"), "kubedb/demo/pg/archive/");
    }
}
