// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the health evaluator.

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::crd::PostgresSpec;
    use crate::errors::ProbeError;
    use k8s_openapi::api::core::v1::{PodCondition, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::api::ObjectMeta;
    use std::collections::HashSet;
    use std::sync::Mutex;

    const PRIMARY: &str = "pg.demo.svc";

    fn pod_host(i: usize) -> String {
        format!("pg-{i}.kubedb.demo.svc")
    }

    #[derive(Default)]
    pub(crate) struct FakeStore {
        pub pods: Vec<Pod>,
        pub port_fails: bool,
        pub marked_ready: Mutex<Vec<String>>,
        pub writes: Mutex<Vec<Vec<ConditionUpdate>>>,
    }

    #[async_trait]
    impl HealthStore for FakeStore {
        async fn list_postgres(&self) -> Result<Vec<Arc<Postgres>>> {
            Ok(Vec::new())
        }

        async fn list_pods(&self, _pg: &Postgres) -> Result<Vec<Pod>> {
            Ok(self.pods.clone())
        }

        async fn mark_pod_ready(&self, pod: &Pod) -> Result<()> {
            self.marked_ready.lock().unwrap().push(pod.name_any());
            Ok(())
        }

        async fn primary_service_port(&self, _pg: &Postgres) -> Result<u16> {
            if self.port_fails {
                anyhow::bail!("service demo/pg not found");
            }
            Ok(5432)
        }

        async fn set_conditions(&self, _pg: &Postgres, updates: Vec<ConditionUpdate>) -> Result<()> {
            self.writes.lock().unwrap().push(updates);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeProber {
        offline: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeProber {
        fn offline(hosts: &[&str]) -> Self {
            Self {
                offline: hosts.iter().map(|h| (*h).to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LivenessProbe for FakeProber {
        async fn probe(&self, _pg: &Postgres, host: &str, _port: u16) -> Result<(), ProbeError> {
            self.calls.lock().unwrap().push(host.to_string());
            if self.offline.contains(host) {
                return Err(ProbeError::Connect {
                    host: host.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            Ok(())
        }
    }

    fn postgres(replicas: i32) -> Postgres {
        let mut pg = Postgres::new(
            "pg",
            PostgresSpec {
                version: "9.6".to_string(),
                replicas: Some(replicas),
                ..PostgresSpec::default()
            },
        );
        pg.metadata.namespace = Some("demo".to_string());
        pg
    }

    fn pod(i: usize, ready: bool) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(format!("pg-{i}")),
                namespace: Some("demo".to_string()),
                ..Default::default()
            },
            status: Some(PodStatus {
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: if ready { "True" } else { "False" }.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn evaluator(store: Arc<FakeStore>, prober: Arc<FakeProber>) -> HealthEvaluator {
        HealthEvaluator::new(store, prober, "kubedb")
    }

    fn last_write(store: &FakeStore) -> Vec<ConditionUpdate> {
        store.writes.lock().unwrap().last().cloned().unwrap_or_default()
    }

    fn status_of(updates: &[ConditionUpdate], condition_type: &str) -> Option<&'static str> {
        updates
            .iter()
            .find(|u| u.condition_type == condition_type)
            .map(|u| u.status)
    }

    #[tokio::test]
    async fn test_primary_failure_short_circuits() {
        let store = Arc::new(FakeStore {
            pods: vec![pod(0, true), pod(1, true), pod(2, true)],
            ..Default::default()
        });
        let prober = Arc::new(FakeProber::offline(&[PRIMARY]));

        let report = evaluator(store.clone(), prober.clone())
            .evaluate(&postgres(3))
            .await;

        assert_eq!(report.verdict, HealthVerdict::PrimaryOffline);
        assert!(!report.condition.online);
        assert!(report.condition.reason.as_deref().unwrap().contains("connection refused"));

        // Ready pods are not re-probed and the cluster step never runs.
        assert_eq!(prober.calls(), vec![PRIMARY.to_string()]);

        let updates = last_write(&store);
        assert_eq!(status_of(&updates, CONDITION_TYPE_ACCEPTING_CONNECTION), Some("False"));
        assert_eq!(status_of(&updates, CONDITION_TYPE_READY), Some("False"));
        assert!(updates[0].message.contains("is not accepting client requests"));
    }

    #[tokio::test]
    async fn test_clustered_all_online_is_healthy() {
        let store = Arc::new(FakeStore {
            pods: vec![pod(0, true), pod(1, true), pod(2, true)],
            ..Default::default()
        });
        let prober = Arc::new(FakeProber::default());

        let report = evaluator(store.clone(), prober.clone())
            .evaluate(&postgres(3))
            .await;

        assert_eq!(report.verdict, HealthVerdict::Healthy);
        assert_eq!(
            prober.calls(),
            vec![
                PRIMARY.to_string(),
                PRIMARY.to_string(),
                pod_host(0),
                pod_host(1),
                pod_host(2)
            ]
        );
        let updates = last_write(&store);
        assert_eq!(status_of(&updates, CONDITION_TYPE_ACCEPTING_CONNECTION), Some("True"));
        assert_eq!(status_of(&updates, CONDITION_TYPE_READY), Some("True"));
    }

    #[tokio::test]
    async fn test_one_failing_pod_makes_cluster_unhealthy() {
        let second = pod_host(1);
        let store = Arc::new(FakeStore {
            pods: vec![pod(0, true), pod(1, true), pod(2, true)],
            ..Default::default()
        });
        let prober = Arc::new(FakeProber::offline(&[second.as_str()]));

        let report = evaluator(store.clone(), prober.clone())
            .evaluate(&postgres(3))
            .await;

        assert_eq!(report.verdict, HealthVerdict::Unhealthy);
        assert!(report.condition.online);
        assert!(report.condition.reason.as_deref().unwrap().contains("pg-1"));

        // The first failing pod stops the cluster check.
        assert!(!prober.calls().contains(&pod_host(2)));

        // AcceptingConnection is True and Ready is left as it was.
        let updates = last_write(&store);
        assert_eq!(status_of(&updates, CONDITION_TYPE_ACCEPTING_CONNECTION), Some("True"));
        assert_eq!(status_of(&updates, CONDITION_TYPE_READY), None);
    }

    #[tokio::test]
    async fn test_standalone_primary_only() {
        let store = Arc::new(FakeStore {
            pods: vec![pod(0, true)],
            ..Default::default()
        });
        let prober = Arc::new(FakeProber::default());

        let report = evaluator(store.clone(), prober.clone())
            .evaluate(&postgres(1))
            .await;

        assert_eq!(report.verdict, HealthVerdict::Healthy);
        assert_eq!(prober.calls(), vec![PRIMARY.to_string()]);
        assert_eq!(status_of(&last_write(&store), CONDITION_TYPE_READY), Some("True"));
    }

    #[tokio::test]
    async fn test_unready_pods_are_probed_and_marked() {
        let store = Arc::new(FakeStore {
            pods: vec![pod(0, false), pod(1, false), pod(2, true)],
            ..Default::default()
        });
        let first = pod_host(0);
        let prober = Arc::new(FakeProber::offline(&[first.as_str()]));

        let report = evaluator(store.clone(), prober.clone())
            .evaluate(&postgres(1))
            .await;

        // pg-0 failed but evaluation went on to pg-1.
        assert_eq!(report.pods_marked_ready, vec!["pg-1".to_string()]);
        assert_eq!(*store.marked_ready.lock().unwrap(), vec!["pg-1".to_string()]);
        assert_eq!(
            prober.calls(),
            vec![pod_host(0), pod_host(1), PRIMARY.to_string()]
        );
    }

    #[tokio::test]
    async fn test_deleting_instance_is_skipped() {
        let store = Arc::new(FakeStore::default());
        let prober = Arc::new(FakeProber::default());
        let mut pg = postgres(3);
        pg.metadata.deletion_timestamp = Some(Time(k8s_openapi::jiff::Timestamp::now()));

        let report = evaluator(store.clone(), prober.clone()).evaluate(&pg).await;

        assert_eq!(report.verdict, HealthVerdict::Skipped);
        assert!(prober.calls().is_empty());
        assert!(store.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_primary_service_writes_nothing() {
        let store = Arc::new(FakeStore {
            port_fails: true,
            ..Default::default()
        });
        let prober = Arc::new(FakeProber::default());

        let report = evaluator(store.clone(), prober.clone())
            .evaluate(&postgres(1))
            .await;

        assert_eq!(report.verdict, HealthVerdict::Skipped);
        assert!(store.writes.lock().unwrap().is_empty());
    }
}
