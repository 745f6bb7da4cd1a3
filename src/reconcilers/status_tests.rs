// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for status condition helpers.

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::status_reasons::{
        CONDITION_TYPE_ACCEPTING_CONNECTION, CONDITION_TYPE_READY, REASON_READINESS_CHECK_FAILED,
        REASON_READINESS_CHECK_SUCCEEDED, STATUS_FALSE, STATUS_TRUE,
    };

    #[test]
    fn test_create_condition_basic() {
        let condition = create_condition("DatabaseReady", "True", "ReadinessCheckSucceeded", "ok", Some(3));

        assert_eq!(condition.r#type, "DatabaseReady");
        assert_eq!(condition.status, "True");
        assert_eq!(condition.reason.as_deref(), Some("ReadinessCheckSucceeded"));
        assert_eq!(condition.message.as_deref(), Some("ok"));
        assert_eq!(condition.observed_generation, Some(3));
        assert!(condition.last_transition_time.is_some());
    }

    #[test]
    fn test_update_condition_preserves_transition_time_when_status_unchanged() {
        let mut conditions = vec![Condition {
            r#type: CONDITION_TYPE_READY.to_string(),
            status: STATUS_TRUE.to_string(),
            reason: Some(REASON_READINESS_CHECK_SUCCEEDED.to_string()),
            message: Some("old".to_string()),
            last_transition_time: Some("2025-01-01T00:00:00+00:00".to_string()),
            observed_generation: Some(1),
        }];

        update_condition_in_memory(
            &mut conditions,
            CONDITION_TYPE_READY,
            STATUS_TRUE,
            REASON_READINESS_CHECK_SUCCEEDED,
            "new",
            Some(2),
        );

        assert_eq!(conditions.len(), 1);
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2025-01-01T00:00:00+00:00")
        );
        assert_eq!(conditions[0].message.as_deref(), Some("new"));
        assert_eq!(conditions[0].observed_generation, Some(2));
    }

    #[test]
    fn test_update_condition_bumps_transition_time_on_status_change() {
        let mut conditions = vec![Condition {
            r#type: CONDITION_TYPE_READY.to_string(),
            status: STATUS_TRUE.to_string(),
            reason: None,
            message: None,
            last_transition_time: Some("2025-01-01T00:00:00+00:00".to_string()),
            observed_generation: None,
        }];

        update_condition_in_memory(
            &mut conditions,
            CONDITION_TYPE_READY,
            STATUS_FALSE,
            REASON_READINESS_CHECK_FAILED,
            "probe failed",
            None,
        );

        assert_ne!(
            conditions[0].last_transition_time.as_deref(),
            Some("2025-01-01T00:00:00+00:00")
        );
        assert_eq!(conditions[0].status, STATUS_FALSE);
    }

    #[test]
    fn test_apply_condition_updates_adds_missing_types() {
        let mut conditions = Vec::new();
        apply_condition_updates(
            &mut conditions,
            &[
                ConditionUpdate {
                    condition_type: CONDITION_TYPE_ACCEPTING_CONNECTION,
                    status: STATUS_FALSE,
                    reason: "DatabaseNotAcceptingConnectionRequest",
                    message: "down".to_string(),
                },
                ConditionUpdate {
                    condition_type: CONDITION_TYPE_READY,
                    status: STATUS_FALSE,
                    reason: REASON_READINESS_CHECK_FAILED,
                    message: "down".to_string(),
                },
            ],
            Some(4),
        );

        assert_eq!(conditions.len(), 2);
        assert!(!is_condition_true(&conditions, CONDITION_TYPE_READY));
        assert!(find_condition(&conditions, CONDITION_TYPE_ACCEPTING_CONNECTION).is_some());
        assert!(conditions.iter().all(|c| c.observed_generation == Some(4)));
    }

    #[test]
    fn test_conditions_equal_ignores_timestamps() {
        let a = vec![create_condition("DatabaseReady", "True", "R", "m", Some(1))];
        let mut b = a.clone();
        b[0].last_transition_time = Some("2020-01-01T00:00:00Z".to_string());
        assert!(conditions_equal(&a, &b));

        b[0].status = "False".to_string();
        assert!(!conditions_equal(&a, &b));
    }

    #[test]
    fn test_find_condition_with_empty_list() {
        assert!(find_condition(&[], CONDITION_TYPE_READY).is_none());
        assert!(!is_condition_true(&[], CONDITION_TYPE_READY));
    }
}
