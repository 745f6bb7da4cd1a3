// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the liveness prober.

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Behavior {
        Online,
        QueryFails,
        OpenFails,
        Hangs,
    }

    struct FakeSession {
        behavior: Behavior,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DatabaseSession for FakeSession {
        async fn round_trip(&mut self) -> Result<(), ProbeError> {
            match self.behavior {
                Behavior::Online => Ok(()),
                Behavior::Hangs => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
                _ => Err(ProbeError::Query {
                    host: "fake".to_string(),
                    reason: "relation does not exist".to_string(),
                }),
            }
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeFactory {
        behavior: Behavior,
        opens: AtomicUsize,
        closes: Arc<AtomicUsize>,
    }

    impl FakeFactory {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                opens: AtomicUsize::new(0),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionFactory for FakeFactory {
        async fn open(
            &self,
            _descriptor: &ConnectionDescriptor,
        ) -> Result<Box<dyn DatabaseSession>, ProbeError> {
            if matches!(self.behavior, Behavior::OpenFails) {
                return Err(ProbeError::Connect {
                    host: "fake".to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                behavior: self.behavior,
                closes: self.closes.clone(),
            }))
        }
    }

    fn descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor {
            host: "quick-postgres.demo.svc".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "pw".to_string(),
            ssl_mode: SslMode::Disable,
            client_cert_path: None,
            client_key_path: None,
            ca_cert_path: None,
        }
    }

    #[tokio::test]
    async fn test_online_session_closed_once() {
        let factory = FakeFactory::new(Behavior::Online);
        check_liveness(&factory, &descriptor()).await.unwrap();
        assert_eq!(factory.opens.load(Ordering::SeqCst), 1);
        assert_eq!(factory.closes(), 1);
    }

    #[tokio::test]
    async fn test_query_failure_still_closes_once() {
        let factory = FakeFactory::new(Behavior::QueryFails);
        let err = check_liveness(&factory, &descriptor()).await.unwrap_err();
        assert!(matches!(err, ProbeError::Query { .. }));
        assert_eq!(factory.closes(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_has_nothing_to_close() {
        let factory = FakeFactory::new(Behavior::OpenFails);
        let err = check_liveness(&factory, &descriptor()).await.unwrap_err();
        assert!(matches!(err, ProbeError::Connect { .. }));
        assert!(err.is_server_side());
        assert_eq!(factory.closes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_drops_and_closes_session() {
        let factory = FakeFactory::new(Behavior::Hangs);
        let err = check_liveness(&factory, &descriptor()).await.unwrap_err();

        match err {
            ProbeError::Timeout { host, secs } => {
                assert_eq!(host, "quick-postgres.demo.svc");
                assert_eq!(secs, 5);
            }
            other => panic!("expected timeout, got {other}"),
        }
        assert_eq!(factory.closes(), 1);
    }

    #[tokio::test]
    async fn test_guard_close_is_idempotent() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut guard = SessionGuard::new(Box::new(FakeSession {
            behavior: Behavior::Online,
            closes: closes.clone(),
        }));
        guard.close();
        guard.close();
        drop(guard);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_require_without_ca_skips_verification() {
        let desc = ConnectionDescriptor {
            ssl_mode: SslMode::Require,
            ..descriptor()
        };
        assert!(tls_client_config(&desc).is_ok());
    }

    #[test]
    fn test_verify_full_without_ca_is_rejected() {
        let desc = ConnectionDescriptor {
            ssl_mode: SslMode::VerifyFull,
            ..descriptor()
        };
        assert!(matches!(
            tls_client_config(&desc),
            Err(ProbeError::Tls { .. })
        ));
    }

    #[test]
    fn test_unreadable_ca_is_tls_error() {
        let desc = ConnectionDescriptor {
            ssl_mode: SslMode::VerifyCa,
            ca_cert_path: Some(PathBuf::from("/nonexistent/ca.crt")),
            ..descriptor()
        };
        let err = tls_client_config(&desc).unwrap_err();
        assert!(!err.is_server_side());
        assert_eq!(err.kind(), "tls");
    }
}
