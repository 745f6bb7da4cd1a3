// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for connection descriptors.

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::crd::{PostgresSpec, TlsConfig};

    const ALL_MODES: [SslMode; 6] = [
        SslMode::Disable,
        SslMode::Allow,
        SslMode::Prefer,
        SslMode::Require,
        SslMode::VerifyCa,
        SslMode::VerifyFull,
    ];

    fn creds() -> Credentials {
        Credentials {
            username: "postgres".to_string(),
            password: "s3cret".to_string(),
        }
    }

    fn pg(auth: ClientAuthMode, ssl: SslMode, tls: bool) -> Postgres {
        let mut pg = Postgres::new(
            "quick-postgres",
            PostgresSpec {
                version: "9.6".to_string(),
                client_auth_mode: Some(auth),
                ssl_mode: Some(ssl),
                tls: tls.then(TlsConfig::default),
                ..PostgresSpec::default()
            },
        );
        pg.metadata.namespace = Some("demo".to_string());
        pg
    }

    fn full_certs() -> CertPaths {
        CertPaths {
            ca_cert: PathBuf::from("/certs/ca.crt"),
            client_cert: Some(PathBuf::from("/certs/tls.crt")),
            client_key: Some(PathBuf::from("/certs/tls.key")),
        }
    }

    #[test]
    fn test_prefer_and_allow_become_require() {
        assert_eq!(effective_ssl_mode(SslMode::Prefer), SslMode::Require);
        assert_eq!(effective_ssl_mode(SslMode::Allow), SslMode::Require);
    }

    #[test]
    fn test_other_modes_pass_through() {
        for mode in ALL_MODES {
            if matches!(mode, SslMode::Prefer | SslMode::Allow) {
                continue;
            }
            assert_eq!(effective_ssl_mode(mode), mode);
            // idempotent
            assert_eq!(effective_ssl_mode(effective_ssl_mode(mode)), mode);
        }
    }

    #[test]
    fn test_descriptor_normalizes_for_every_tls_mode() {
        for mode in ALL_MODES.into_iter().filter(|m| *m != SslMode::Disable) {
            let pg = pg(ClientAuthMode::Md5, mode, true);
            let desc =
                ConnectionDescriptor::build(&pg, &creds(), "pg.demo.svc", 5432, Some(&full_certs()))
                    .unwrap();
            assert_eq!(desc.ssl_mode, effective_ssl_mode(mode), "mode {mode}");
            // spec untouched
            assert_eq!(pg.spec.ssl_mode, Some(mode));
        }
    }

    #[test]
    fn test_cert_auth_includes_all_paths() {
        let pg = pg(ClientAuthMode::Cert, SslMode::VerifyFull, true);
        let desc = ConnectionDescriptor::build(&pg, &creds(), "h", 5432, Some(&full_certs())).unwrap();

        assert_eq!(desc.ssl_mode, SslMode::VerifyFull);
        assert_eq!(desc.ca_cert_path, Some(PathBuf::from("/certs/ca.crt")));
        assert_eq!(desc.client_cert_path, Some(PathBuf::from("/certs/tls.crt")));
        assert_eq!(desc.client_key_path, Some(PathBuf::from("/certs/tls.key")));
    }

    #[test]
    fn test_cert_auth_without_key_fails() {
        let pg = pg(ClientAuthMode::Cert, SslMode::Require, true);
        let certs = CertPaths {
            client_key: None,
            ..full_certs()
        };
        let err = ConnectionDescriptor::build(&pg, &creds(), "h", 5432, Some(&certs)).unwrap_err();
        assert!(matches!(err, ConnectionError::ConnectionSetupFailed { .. }));
    }

    #[test]
    fn test_tls_without_cert_auth_only_has_ca() {
        let pg = pg(ClientAuthMode::Scram, SslMode::Prefer, true);
        let desc = ConnectionDescriptor::build(&pg, &creds(), "h", 5432, Some(&full_certs())).unwrap();

        assert_eq!(desc.ssl_mode, SslMode::Require);
        assert!(desc.ca_cert_path.is_some());
        assert!(desc.client_cert_path.is_none());
        assert!(desc.client_key_path.is_none());
    }

    #[test]
    fn test_no_tls_forces_disable() {
        let pg = pg(ClientAuthMode::Md5, SslMode::Require, false);
        let desc = ConnectionDescriptor::build(&pg, &creds(), "h", 5432, None).unwrap();

        assert_eq!(desc.ssl_mode, SslMode::Disable);
        assert!(desc.ca_cert_path.is_none());
        assert!(!desc.uses_tls());
        assert_eq!(desc.database, "postgres");
        assert_eq!(desc.user, "postgres");
    }

    #[test]
    fn test_redacted_hides_password() {
        let pg = pg(ClientAuthMode::Md5, SslMode::Disable, false);
        let desc = ConnectionDescriptor::build(&pg, &creds(), "pg.demo.svc", 5432, None).unwrap();

        let rendered = format!("{desc:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("host=pg.demo.svc"));
        assert!(rendered.contains("sslmode=disable"));
    }
}
