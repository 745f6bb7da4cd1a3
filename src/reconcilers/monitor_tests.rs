// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `monitor.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::crd::{PostgresSpec, PrometheusSpec};

    fn pg() -> Postgres {
        let mut pg = Postgres::new("quick-postgres", PostgresSpec::default());
        pg.metadata.namespace = Some("demo".to_string());
        pg
    }

    fn builtin() -> MonitorSpec {
        MonitorSpec {
            agent: MonitorAgent::PrometheusBuiltin,
            prometheus: None,
        }
    }

    fn operator(namespace: Option<&str>) -> MonitorSpec {
        MonitorSpec {
            agent: MonitorAgent::PrometheusOperator,
            prometheus: Some(PrometheusSpec {
                port: Some(9187),
                namespace: namespace.map(str::to_string),
                labels: BTreeMap::from([("k8s-app".to_string(), "prometheus".to_string())]),
                interval: Some("10s".to_string()),
            }),
        }
    }

    #[test]
    fn test_plan_add_and_remove() {
        assert_eq!(plan_monitor_change(None, None), MonitorChange::None);
        assert_eq!(
            plan_monitor_change(None, Some(&builtin())),
            MonitorChange::Add(builtin())
        );
        assert_eq!(
            plan_monitor_change(Some(&builtin()), None),
            MonitorChange::Remove(builtin())
        );
    }

    #[test]
    fn test_plan_agent_change_replaces() {
        let change = plan_monitor_change(Some(&builtin()), Some(&operator(None)));
        assert_eq!(
            change,
            MonitorChange::Replace {
                old: builtin(),
                new: operator(None),
            }
        );
    }

    #[test]
    fn test_plan_same_agent_updates_in_place() {
        let old = operator(None);
        let new = operator(Some("monitoring"));
        assert_eq!(
            plan_monitor_change(Some(&old), Some(&new)),
            MonitorChange::Update(new.clone())
        );
        assert_eq!(plan_monitor_change(Some(&new), Some(&new)), MonitorChange::None);
    }

    #[test]
    fn test_builtin_annotations_default_port() {
        let annotations = builtin_annotations(&pg(), &builtin());
        assert_eq!(annotations["prometheus.io/scrape"], "true");
        assert_eq!(annotations["prometheus.io/path"], "/metrics");
        assert_eq!(annotations["prometheus.io/port"], "56790");
        assert_eq!(annotations["monitoring.appscode.com/agent"], "prometheus.io/builtin");
    }

    #[test]
    fn test_builtin_annotations_custom_port() {
        let spec = MonitorSpec {
            agent: MonitorAgent::PrometheusBuiltin,
            prometheus: Some(PrometheusSpec {
                port: Some(9000),
                ..Default::default()
            }),
        };
        assert_eq!(builtin_annotations(&pg(), &spec)["prometheus.io/port"], "9000");
    }

    #[test]
    fn test_service_monitor_defaults_to_database_namespace() {
        let monitor = build_service_monitor(&pg(), &operator(None));
        assert_eq!(monitor.metadata.namespace.as_deref(), Some("demo"));
        assert_eq!(monitor.metadata.name.as_deref(), Some("kubedb-demo-quick-postgres"));
        let types = monitor.types.unwrap();
        assert_eq!(types.api_version, "monitoring.coreos.com/v1");
        assert_eq!(types.kind, "ServiceMonitor");
    }

    #[test]
    fn test_service_monitor_spec() {
        let monitor = build_service_monitor(&pg(), &operator(Some("monitoring")));
        assert_eq!(monitor.metadata.namespace.as_deref(), Some("monitoring"));

        let labels = monitor.metadata.labels.unwrap();
        assert_eq!(labels["k8s-app"], "prometheus");
        assert_eq!(labels["kubedb.com/name"], "quick-postgres");

        let spec = &monitor.data["spec"];
        assert_eq!(spec["namespaceSelector"]["matchNames"][0], "demo");
        assert_eq!(spec["selector"]["matchLabels"]["kubedb.com/kind"], "Postgres");
        assert_eq!(spec["endpoints"][0]["port"], "prom-http");
        assert_eq!(spec["endpoints"][0]["path"], "/metrics");
        assert_eq!(spec["endpoints"][0]["interval"], "10s");
    }
}
