// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the certificate scratch store.

#[cfg(test)]
mod tests {
    use super::super::*;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    fn cert_secret(entries: &[(&str, &str)]) -> Secret {
        Secret {
            data: Some(
                entries
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_save_writes_all_three_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CertStore::new(tmp.path());
        let secret = cert_secret(&[("ca.crt", "CA"), ("tls.crt", "CERT"), ("tls.key", "KEY")]);

        let paths = store.save("demo", "pg", &secret).await.unwrap();

        let dir = tmp.path().join("postgreses.kubedb.com").join("demo").join("pg");
        assert_eq!(paths.ca_cert, dir.join("ca.crt"));
        assert_eq!(std::fs::read_to_string(&paths.ca_cert).unwrap(), "CA");
        assert_eq!(
            std::fs::read_to_string(paths.client_cert.as_ref().unwrap()).unwrap(),
            "CERT"
        );
        assert_eq!(
            std::fs::read_to_string(paths.client_key.as_ref().unwrap()).unwrap(),
            "KEY"
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(paths.client_key.unwrap())
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600, "private key must not be world readable");
        }
    }

    #[tokio::test]
    async fn test_ca_only_secret() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CertStore::new(tmp.path());

        let paths = store
            .save("demo", "pg", &cert_secret(&[("ca.crt", "CA")]))
            .await
            .unwrap();

        assert!(paths.client_cert.is_none());
        assert!(paths.client_key.is_none());
    }

    #[tokio::test]
    async fn test_missing_ca_is_setup_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CertStore::new(tmp.path());

        let err = store
            .save("demo", "pg", &cert_secret(&[("tls.crt", "CERT")]))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no 'ca.crt' entry"), "{err}");
    }

    #[tokio::test]
    async fn test_rotation_rewrites_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CertStore::new(tmp.path());

        store
            .save("demo", "pg", &cert_secret(&[("ca.crt", "CA-1")]))
            .await
            .unwrap();
        let paths = store
            .save("demo", "pg", &cert_secret(&[("ca.crt", "CA-2")]))
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(paths.ca_cert).unwrap(), "CA-2");
    }

    #[tokio::test]
    async fn test_unchanged_secret_is_not_rewritten() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CertStore::new(tmp.path());
        let secret = cert_secret(&[("ca.crt", "CA")]);

        let paths = store.save("demo", "pg", &secret).await.unwrap();
        // Tamper with the file; an unchanged fingerprint must not trigger a rewrite.
        std::fs::write(&paths.ca_cert, "LOCAL").unwrap();
        store.save("demo", "pg", &secret).await.unwrap();

        assert_eq!(std::fs::read_to_string(&paths.ca_cert).unwrap(), "LOCAL");
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CertStore::new(tmp.path());
        store
            .save("demo", "pg", &cert_secret(&[("ca.crt", "CA")]))
            .await
            .unwrap();

        store.remove("demo", "pg").await.unwrap();
        store.remove("demo", "pg").await.unwrap();
        assert!(!store.dir_for("demo", "pg").exists());
    }

    #[tokio::test]
    async fn test_instances_do_not_share_a_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CertStore::new(tmp.path());
        let secret = cert_secret(&[("ca.crt", "CA")]);

        let busy = store.slot("demo/pg-a").await;
        let _writer = busy.lock().await;

        let saved = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            store.save("demo", "pg-b", &secret),
        )
        .await
        .expect("saving pg-b must not wait for pg-a");
        assert!(saved.is_ok());
    }

    #[tokio::test]
    async fn test_deleted_files_are_rewritten() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CertStore::new(tmp.path());
        let secret = cert_secret(&[("ca.crt", "CA")]);

        let paths = store.save("demo", "pg", &secret).await.unwrap();
        std::fs::remove_file(&paths.ca_cert).unwrap();

        store.save("demo", "pg", &secret).await.unwrap();
        assert_eq!(std::fs::read_to_string(&paths.ca_cert).unwrap(), "CA");
    }

    #[test]
    fn test_fingerprint_separates_parts() {
        assert_ne!(fingerprint(&[b"ab", b"c"]), fingerprint(&[b"a", b"bc"]));
        assert_eq!(fingerprint(&[b"x"]).len(), 64);
    }
}
