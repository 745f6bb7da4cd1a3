// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for reconciler helper functions.

#[cfg(test)]
mod tests {
    use super::super::should_reconcile;

    #[test]
    fn test_should_reconcile_when_generations_equal() {
        assert!(!should_reconcile(Some(5), Some(5)));
    }

    #[test]
    fn test_should_reconcile_when_spec_changed() {
        assert!(should_reconcile(Some(7), Some(5)));
    }

    #[test]
    fn test_should_reconcile_first_pass() {
        assert!(should_reconcile(Some(1), None));
    }

    #[test]
    fn test_should_reconcile_without_generation() {
        assert!(!should_reconcile(None, Some(5)));
        assert!(!should_reconcile(None, None));
    }

    #[test]
    fn test_should_reconcile_generation_went_backwards() {
        // Recreated objects restart at generation 1 while an old status may linger.
        assert!(should_reconcile(Some(1), Some(4)));
    }
}
