// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Condition types, condition reasons and event reasons for `Postgres` resources.
//!
//! Reasons are programmatic identifiers in CamelCase that explain why a condition has
//! a particular status. Event reasons show up in `kubectl describe` next to the
//! human-readable note.
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   phase: Running
//!   conditions:
//!     - type: DatabaseAcceptingConnection
//!       status: "True"
//!       reason: DatabaseAcceptingConnectionRequest
//!       message: "The PostgreSQL: demo/pg is accepting client requests."
//!       observedGeneration: 2
//!     - type: DatabaseReady
//!       status: "True"
//!       reason: ReadinessCheckSucceeded
//!       message: "The PostgreSQL: demo/pg is ready."
//!       observedGeneration: 2
//! ```

// ============================================================================
// Condition Types
// ============================================================================

/// The primary endpoint answers a trivial query.
pub const CONDITION_TYPE_ACCEPTING_CONNECTION: &str = "DatabaseAcceptingConnection";

/// The instance (standalone or every member of the cluster) is healthy.
pub const CONDITION_TYPE_READY: &str = "DatabaseReady";

/// Pod-level readiness condition written by the health checker.
pub const CONDITION_TYPE_POD_READY: &str = "Ready";

// ============================================================================
// Condition Reasons
// ============================================================================

pub const REASON_ACCEPTING_CONNECTION: &str = "DatabaseAcceptingConnectionRequest";

pub const REASON_NOT_ACCEPTING_CONNECTION: &str = "DatabaseNotAcceptingConnectionRequest";

pub const REASON_READINESS_CHECK_SUCCEEDED: &str = "ReadinessCheckSucceeded";

pub const REASON_READINESS_CHECK_FAILED: &str = "ReadinessCheckFailed";

/// Reason on the pod `Ready` condition once the server inside answered a probe.
pub const REASON_POD_READY_AND_ONLINE: &str = "DBConditionTypeReadyAndServerOnline";

// ============================================================================
// Condition Status Values
// ============================================================================

pub const STATUS_TRUE: &str = "True";

pub const STATUS_FALSE: &str = "False";

// ============================================================================
// Event Reasons
// ============================================================================

pub const EVENT_CREATING: &str = "Creating";
pub const EVENT_SUCCESSFUL: &str = "Successful";
pub const EVENT_FAILED: &str = "Failed";
pub const EVENT_INVALID_SPEC: &str = "InvalidSpec";
pub const EVENT_INITIALIZING: &str = "Initializing";
pub const EVENT_SUCCESSFUL_INITIALIZE: &str = "SuccessfulInitialize";
pub const EVENT_FAILED_TO_INITIALIZE: &str = "FailedToInitialize";
pub const EVENT_PAUSING: &str = "Pausing";
pub const EVENT_SUCCESSFUL_PAUSE: &str = "SuccessfulPause";
pub const EVENT_FAILED_TO_PAUSE: &str = "FailedToPause";
pub const EVENT_RESUMING: &str = "Resuming";
pub const EVENT_SUCCESSFUL_WIPE_OUT: &str = "SuccessfulWipeOut";
pub const EVENT_FAILED_TO_WIPE_OUT: &str = "FailedToWipeOut";
pub const EVENT_DELETION_LOCKED: &str = "DeletionLocked";
pub const EVENT_SUCCESSFUL_MONITOR_ADD: &str = "SuccessfulMonitorAdd";
pub const EVENT_FAILED_TO_ADD_MONITOR: &str = "FailedToAddMonitor";
pub const EVENT_SUCCESSFUL_MONITOR_UPDATE: &str = "SuccessfulMonitorUpdate";
pub const EVENT_SUCCESSFUL_MONITOR_DELETE: &str = "SuccessfulMonitorDelete";
pub const EVENT_FAILED_TO_DELETE_MONITOR: &str = "FailedToDeleteMonitor";
pub const EVENT_BACKUP_SCHEDULED: &str = "BackupScheduled";
pub const EVENT_FAILED_TO_SCHEDULE_BACKUP: &str = "FailedToScheduleBackup";

/// Message of `DatabaseAcceptingConnection=True`.
#[must_use]
pub fn accepting_connection_message(namespace: &str, name: &str) -> String {
    format!("The PostgreSQL: {namespace}/{name} is accepting client requests.")
}

/// Message of `DatabaseAcceptingConnection=False`.
#[must_use]
pub fn not_accepting_connection_message(namespace: &str, name: &str, error: &str) -> String {
    format!("The PostgreSQL: {namespace}/{name} is not accepting client requests. error: {error}")
}

/// Message of `DatabaseReady=True`.
#[must_use]
pub fn ready_message(namespace: &str, name: &str) -> String {
    format!("The PostgreSQL: {namespace}/{name} is ready.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_message() {
        assert_eq!(ready_message("demo", "pg"), "The PostgreSQL: demo/pg is ready.");
    }

    #[test]
    fn test_not_accepting_message_carries_error() {
        let msg = not_accepting_connection_message("demo", "pg", "connection refused");
        assert!(msg.starts_with("The PostgreSQL: demo/pg is not accepting"));
        assert!(msg.ends_with("error: connection refused"));
    }
}
