//! BDD scenarios for the instance manager.

use rstest_bdd_macros::scenario;

use super::test_helpers::{CloudContext, cloud_context};

#[scenario(
    path = "tests/features/cloud.feature",
    name = "Stopping a node waits for the provider to confirm"
)]
fn scenario_stop_confirmed(cloud_context: CloudContext) {
    drop(cloud_context);
}

#[scenario(
    path = "tests/features/cloud.feature",
    name = "A stopped node comes back after a start"
)]
fn scenario_start(cloud_context: CloudContext) {
    drop(cloud_context);
}

#[scenario(
    path = "tests/features/cloud.feature",
    name = "A node that never stops times out at the deadline"
)]
fn scenario_stop_timeout(cloud_context: CloudContext) {
    drop(cloud_context);
}

#[scenario(
    path = "tests/features/cloud.feature",
    name = "One failing creation does not hide the others"
)]
fn scenario_partial_batch(cloud_context: CloudContext) {
    drop(cloud_context);
}

#[scenario(
    path = "tests/features/cloud.feature",
    name = "Rolling back a partial batch terminates the survivors"
)]
fn scenario_rollback(cloud_context: CloudContext) {
    drop(cloud_context);
}

#[scenario(
    path = "tests/features/cloud.feature",
    name = "Only running nodes are terminated by address"
)]
fn scenario_terminate_requires_running(cloud_context: CloudContext) {
    drop(cloud_context);
}
