//! Skip policy for embedded-cluster integration tests.
//!
//! Environments without the embedded PostgreSQL binaries can opt out via
//! `SKIP_TEST_CLUSTER`; everywhere else a failed bootstrap is a hard test
//! failure so CI breakage is not masked.

/// True when `SKIP_TEST_CLUSTER` is set to a truthy value
/// ("1", "true", "yes", case-insensitive).
pub fn should_skip_test_cluster() -> bool {
    std::env::var("SKIP_TEST_CLUSTER")
        .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Handle a cluster bootstrap failure consistently across suites.
///
/// Returns `None` (with a skip marker on stderr) when skipping is allowed,
/// and panics otherwise.
pub fn handle_cluster_setup_failure<T>(reason: impl std::fmt::Display) -> Option<T> {
    if should_skip_test_cluster() {
        eprintln!("SKIP-TEST-CLUSTER: {reason}");
        None
    } else {
        panic!("Test cluster setup failed: {reason}. Set SKIP_TEST_CLUSTER=1 to skip.");
    }
}
