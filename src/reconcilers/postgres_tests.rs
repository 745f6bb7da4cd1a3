// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `postgres.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::crd::{
        DormantDatabaseSpec, Origin, OriginMeta, OriginSpec, PostgresSpec, PostgresVersionSpec,
    };
    use crate::labels::LABEL_DATABASE_KIND;
    use k8s_openapi::api::apps::v1::StatefulSetStatus;
    use std::collections::BTreeMap;

    fn pg() -> Postgres {
        let mut pg = Postgres::new(
            "quick-postgres",
            PostgresSpec {
                version: "9.6".to_string(),
                ..Default::default()
            },
        );
        pg.metadata.namespace = Some("demo".to_string());
        pg
    }

    fn dormant(kind: &str, resume: bool) -> DormantDatabase {
        let mut dd = DormantDatabase::new(
            "quick-postgres",
            DormantDatabaseSpec {
                origin: Origin {
                    metadata: OriginMeta {
                        name: "quick-postgres".to_string(),
                        namespace: "demo".to_string(),
                        ..Default::default()
                    },
                    spec: OriginSpec {
                        postgres: Some(pg().spec),
                    },
                },
                wipe_out: false,
                resume,
            },
        );
        dd.metadata.namespace = Some("demo".to_string());
        dd.metadata.labels = Some(BTreeMap::from([(
            LABEL_DATABASE_KIND.to_string(),
            kind.to_string(),
        )]));
        dd
    }

    fn version(tools: Option<&str>) -> PostgresVersion {
        PostgresVersion::new(
            "9.6",
            PostgresVersionSpec {
                version: "9.6".to_string(),
                db_image: "kubedb/postgres:9.6".to_string(),
                exporter_image: None,
                tools_image: tools.map(String::from),
                deprecated: false,
            },
        )
    }

    fn schedule(cron: &str) -> BackupScheduleSpec {
        BackupScheduleSpec {
            cron_expression: cron.to_string(),
            storage_secret_name: "s3-secret".to_string(),
            bucket: Some("backups".to_string()),
            prefix: None,
        }
    }

    fn sts_with_ready(ready: Option<i32>) -> StatefulSet {
        StatefulSet {
            status: Some(StatefulSetStatus {
                ready_replicas: ready,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_failed_initialization_still_runs() {
        assert_eq!(
            phase_after_initialization(&InitOutcome::Failed("restore job failed".to_string())),
            DatabasePhase::Running
        );
        assert_eq!(
            phase_after_initialization(&InitOutcome::Succeeded),
            DatabasePhase::Running
        );
        assert_eq!(
            phase_after_initialization(&InitOutcome::Skipped),
            DatabasePhase::Running
        );
    }

    #[test]
    fn test_phase_after_deletion() {
        assert_eq!(
            phase_after_deletion(TerminationPolicy::Halt),
            Some(DatabasePhase::Halted)
        );
        assert_eq!(
            phase_after_deletion(TerminationPolicy::WipeOut),
            Some(DatabasePhase::WipedOut)
        );
        assert_eq!(phase_after_deletion(TerminationPolicy::Delete), None);
        assert_eq!(phase_after_deletion(TerminationPolicy::DoNotTerminate), None);

        // A running database can always record its final phase.
        for policy in [TerminationPolicy::Halt, TerminationPolicy::WipeOut] {
            let phase = phase_after_deletion(policy).unwrap();
            assert!(can_transition(Some(DatabasePhase::Running), phase));
        }
    }

    #[test]
    fn test_no_dormant_record_allows_create() {
        assert!(check_dormant_conflict(&pg(), None).is_ok());
    }

    #[test]
    fn test_paused_postgres_requires_resume() {
        let err = check_dormant_conflict(&pg(), Some(&dormant("Postgres", false))).unwrap_err();
        assert!(matches!(err, LifecycleError::ResumeRequired { .. }));
    }

    #[test]
    fn test_resuming_dormant_allows_create() {
        assert!(check_dormant_conflict(&pg(), Some(&dormant("Postgres", true))).is_ok());
    }

    #[test]
    fn test_dormant_of_other_kind_blocks_create() {
        let err = check_dormant_conflict(&pg(), Some(&dormant("MySQL", true))).unwrap_err();
        match err {
            LifecycleError::DormantKindMismatch { kind, name, .. } => {
                assert_eq!(kind, "MySQL");
                assert_eq!(name, "quick-postgres");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_statefulset_ready_counts_members() {
        assert!(!statefulset_ready(&StatefulSet::default(), 1));
        assert!(!statefulset_ready(&sts_with_ready(None), 1));
        assert!(!statefulset_ready(&sts_with_ready(Some(2)), 3));
        assert!(statefulset_ready(&sts_with_ready(Some(3)), 3));
    }

    #[test]
    fn test_resumed_detected_by_annotation() {
        let mut resumed = pg();
        assert!(!is_resumed(&resumed));
        resumed.metadata.annotations = Some(BTreeMap::from([(
            ANNOTATION_INIT_SPEC.to_string(),
            "{}".to_string(),
        )]));
        assert!(is_resumed(&resumed));
    }

    #[test]
    fn test_tools_image_prefers_catalog() {
        assert_eq!(
            tools_image(&version(Some("kubedb/postgres-tools:9.6")), "fallback:1"),
            "kubedb/postgres-tools:9.6"
        );
        assert_eq!(tools_image(&version(None), "fallback:1"), "fallback:1");
    }

    #[test]
    fn test_backup_plan() {
        let daily = schedule("0 2 * * *");
        let hourly = schedule("0 * * * *");

        assert_eq!(plan_backup_change(None, None), BackupChange::None);
        assert_eq!(
            plan_backup_change(None, Some(&daily)),
            BackupChange::Schedule(daily.clone())
        );
        assert_eq!(plan_backup_change(Some(&daily), Some(&daily)), BackupChange::None);
        assert_eq!(
            plan_backup_change(Some(&daily), Some(&hourly)),
            BackupChange::Schedule(hourly)
        );
        assert_eq!(plan_backup_change(Some(&daily), None), BackupChange::Stop);
    }

    #[test]
    fn test_applied_defaults_to_empty() {
        let applied = applied(&pg());
        assert!(applied.monitor.is_none());
        assert!(applied.backup_schedule.is_none());
    }
}
