// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Phase transition table for `Postgres`.
//!
//! | From           | To                                             |
//! |----------------|------------------------------------------------|
//! | (none)         | `Creating`                                     |
//! | `Creating`     | `Initializing`, `Running`, `Failed`            |
//! | `Initializing` | `Running`, `Failed`                            |
//! | `Running`      | `Halted`, `Failed`, `WipedOut`, `Creating`     |
//! | `Halted`       | `Creating`, `WipedOut`                         |
//! | `Failed`       | `Creating`                                     |
//! | `WipedOut`     | (terminal)                                     |
//!
//! `Running -> Creating` re-provisions after an out-of-band change, `Halted -> Creating`
//! is a resume and `Failed -> Creating` is the next reconciliation pass after a failure.
//! Writing the current phase again is always accepted.
//!
//! `Halted` and `WipedOut` are written by the finalizer just before it releases a
//! deleted `Postgres`. After that the halted database lives on as a
//! `DormantDatabase`, whose own phase tracks pause, resume and wipe-out.

use crate::crd::DatabasePhase;

/// Whether a `Postgres` may move from `from` to `to`.
#[must_use]
pub fn can_transition(from: Option<DatabasePhase>, to: DatabasePhase) -> bool {
    use DatabasePhase::{Creating, Failed, Halted, Initializing, Running, WipedOut};

    let Some(from) = from else {
        return to == Creating;
    };
    if from == to {
        return true;
    }

    matches!(
        (from, to),
        (Creating, Initializing | Running | Failed)
            | (Initializing, Running | Failed)
            | (Running, Halted | Failed | WipedOut | Creating)
            | (Halted, Creating | WipedOut)
            | (Failed, Creating)
    )
}

/// Whether no further transitions are possible.
#[must_use]
pub fn is_terminal(phase: DatabasePhase) -> bool {
    phase == DatabasePhase::WipedOut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::DatabasePhase::*;

    #[test]
    fn test_new_instance_must_start_creating() {
        assert!(can_transition(None, Creating));
        assert!(!can_transition(None, Running));
        assert!(!can_transition(None, Failed));
    }

    #[test]
    fn test_create_path() {
        assert!(can_transition(Some(Creating), Initializing));
        assert!(can_transition(Some(Initializing), Running));
        assert!(can_transition(Some(Creating), Running));
        assert!(!can_transition(Some(Initializing), Creating));
    }

    #[test]
    fn test_pause_and_resume() {
        assert!(can_transition(Some(Running), Halted));
        assert!(can_transition(Some(Halted), Creating));
        assert!(!can_transition(Some(Halted), Running));
    }

    #[test]
    fn test_any_provisioning_state_can_fail() {
        for from in [Creating, Initializing, Running] {
            assert!(can_transition(Some(from), Failed), "{from} -> Failed");
        }
        assert!(can_transition(Some(Failed), Creating));
    }

    #[test]
    fn test_wiped_out_is_terminal() {
        assert!(is_terminal(WipedOut));
        for to in [Creating, Initializing, Running, Halted, Failed] {
            assert!(!can_transition(Some(WipedOut), to), "WipedOut -> {to}");
        }
        assert!(can_transition(Some(Halted), WipedOut));
        assert!(can_transition(Some(Running), WipedOut));
        assert!(!can_transition(Some(Creating), WipedOut));
    }

    #[test]
    fn test_same_phase_is_accepted() {
        assert!(can_transition(Some(Running), Running));
    }
}
