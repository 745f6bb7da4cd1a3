// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `crd.rs`

#[cfg(test)]
mod tests {
    use crate::constants::{API_GROUP, API_VERSION, CATALOG_API_GROUP};
    use crate::crd::*;
    use crate::labels::{LABEL_DATABASE_KIND, LABEL_DATABASE_NAME};
    use kube::CustomResourceExt;

    const QUICK_POSTGRES: &str = r#"
apiVersion: kubedb.com/v1alpha2
kind: Postgres
metadata:
  name: quick-postgres
  namespace: demo
spec:
  version: "9.6"
  replicas: 3
  standbyMode: Hot
  storageType: Durable
  storage:
    storageClassName: standard
    accessModes: ["ReadWriteOnce"]
    size: 1Gi
  sslMode: verify-full
  clientAuthMode: scram
  monitor:
    agent: prometheus.io/operator
    prometheus:
      port: 56790
  terminationPolicy: WipeOut
"#;

    fn quick_postgres() -> Postgres {
        serde_yaml::from_str(QUICK_POSTGRES).unwrap()
    }

    #[test]
    fn test_postgres_manifest_parses() {
        let pg = quick_postgres();
        assert_eq!(pg.spec.version, "9.6");
        assert_eq!(pg.spec.replicas(), 3);
        assert_eq!(pg.spec.standby_mode, Some(StandbyMode::Hot));
        assert_eq!(pg.spec.storage_type, Some(StorageType::Durable));
        assert_eq!(pg.spec.ssl_mode(), SslMode::VerifyFull);
        assert_eq!(pg.spec.client_auth_mode(), ClientAuthMode::Scram);
        assert_eq!(
            pg.spec.monitor.as_ref().map(|m| m.agent),
            Some(MonitorAgent::PrometheusOperator)
        );
        assert_eq!(pg.spec.termination_policy, Some(TerminationPolicy::WipeOut));
    }

    #[test]
    fn test_spec_defaults() {
        let spec = PostgresSpec::default();
        assert_eq!(spec.replicas(), 1);
        assert_eq!(spec.ssl_mode(), SslMode::Disable);
        assert_eq!(spec.client_auth_mode(), ClientAuthMode::Md5);
        assert!(!spec.is_initialized());
    }

    #[test]
    fn test_spec_serializes_camel_case_without_empty_fields() {
        let value = serde_json::to_value(&quick_postgres().spec).unwrap();
        assert_eq!(value["storageType"], "Durable");
        assert_eq!(value["sslMode"], "verify-full");
        assert!(value.get("authSecret").is_none());
        assert!(value.get("init").is_none());
    }

    #[test]
    fn test_dns_names() {
        let pg = quick_postgres();
        assert_eq!(pg.primary_service_dns(), "quick-postgres.demo.svc");
        assert_eq!(
            pg.host_dns("quick-postgres-0", "kubedb"),
            "quick-postgres-0.kubedb.demo.svc"
        );
    }

    #[test]
    fn test_offshoot_selectors() {
        let selectors = quick_postgres().offshoot_selectors();
        assert_eq!(selectors[LABEL_DATABASE_KIND], "Postgres");
        assert_eq!(selectors[LABEL_DATABASE_NAME], "quick-postgres");
        assert_eq!(selectors.len(), 2);
    }

    #[test]
    fn test_cert_secret_names_default_from_name() {
        let mut pg = quick_postgres();
        assert!(pg.client_cert_secret_name().starts_with("quick-postgres-"));
        assert_ne!(pg.client_cert_secret_name(), pg.server_cert_secret_name());

        pg.spec.tls = Some(TlsConfig {
            client_cert_secret: Some("my-client".to_string()),
            ..Default::default()
        });
        assert_eq!(pg.client_cert_secret_name(), "my-client");
    }

    #[test]
    fn test_phase_display_matches_wire_value() {
        for phase in [
            DatabasePhase::Creating,
            DatabasePhase::Initializing,
            DatabasePhase::Running,
            DatabasePhase::Halted,
            DatabasePhase::Failed,
            DatabasePhase::WipedOut,
        ] {
            assert_eq!(serde_json::to_value(phase).unwrap(), phase.to_string());
        }
    }

    #[test]
    fn test_ssl_mode_display_matches_wire_value() {
        for mode in [SslMode::Disable, SslMode::Prefer, SslMode::VerifyCa, SslMode::VerifyFull] {
            assert_eq!(serde_json::to_value(mode).unwrap(), mode.to_string());
        }
    }

    #[test]
    fn test_monitor_agent_as_str_matches_wire_value() {
        for agent in [MonitorAgent::PrometheusBuiltin, MonitorAgent::PrometheusOperator] {
            assert_eq!(serde_json::to_value(agent).unwrap(), agent.as_str());
        }
    }

    #[test]
    fn test_crd_identity() {
        let crd = Postgres::crd();
        assert_eq!(crd.spec.group, API_GROUP);
        assert_eq!(crd.spec.versions[0].name, API_VERSION);
        assert_eq!(crd.spec.names.kind, "Postgres");
        assert_eq!(crd.spec.scope, "Namespaced");

        let dormant = DormantDatabase::crd();
        assert_eq!(dormant.spec.names.kind, "DormantDatabase");

        let version = PostgresVersion::crd();
        assert_eq!(version.spec.group, CATALOG_API_GROUP);
        assert_eq!(version.spec.scope, "Cluster");
    }

    #[test]
    fn test_dormant_resume_and_wipe_out_default_false() {
        let dd: DormantDatabase = serde_yaml::from_str(
            r"
apiVersion: kubedb.com/v1alpha2
kind: DormantDatabase
metadata:
  name: quick-postgres
  namespace: demo
spec:
  origin:
    metadata:
      name: quick-postgres
      namespace: demo
    spec:
      postgres:
        version: '9.6'
",
        )
        .unwrap();
        assert!(!dd.spec.resume);
        assert!(!dd.spec.wipe_out);
        assert_eq!(dd.origin_postgres().map(|s| s.version.as_str()), Some("9.6"));
        assert!(dd.origin_kind().is_none());
    }
}
