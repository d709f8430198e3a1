//! BDD scenarios for the retry orchestrator.

use rstest_bdd_macros::scenario;

use super::test_helpers::{RetryContext, retry_context};

#[scenario(
    path = "tests/features/retry.feature",
    name = "Transient exit codes are retried until the attempts run out"
)]
fn scenario_exhaustion(retry_context: RetryContext) {
    drop(retry_context);
}

#[scenario(
    path = "tests/features/retry.feature",
    name = "Permission errors fail on the first attempt"
)]
fn scenario_fatal(retry_context: RetryContext) {
    drop(retry_context);
}

#[scenario(
    path = "tests/features/retry.feature",
    name = "A command that recovers stops retrying"
)]
fn scenario_recovery(retry_context: RetryContext) {
    drop(retry_context);
}

#[scenario(
    path = "tests/features/retry.feature",
    name = "A dead cached session is replaced exactly once"
)]
fn scenario_dead_session(retry_context: RetryContext) {
    drop(retry_context);
}
