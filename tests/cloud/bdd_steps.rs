//! BDD step definitions for the instance lifecycle.

use std::time::Duration;

use rstest_bdd_macros::{given, then, when};
use ruslan::{CloudError, InstanceState};
use tokio::time::Instant;

use super::test_helpers::{CloudContext, names};
use crate::runtime::paused_runtime;

#[given("a running instance named \"{name}\"")]
fn running_instance(cloud_context: &CloudContext, name: String) {
    let id = cloud_context.cloud.insert(&name, InstanceState::Running);
    cloud_context.instance_id.replace(Some(id));
}

#[given("a stopped instance named \"{name}\"")]
fn stopped_instance(cloud_context: &CloudContext, name: String) {
    let id = cloud_context.cloud.insert(&name, InstanceState::Stopped);
    cloud_context.instance_id.replace(Some(id));
}

#[given("the provider reports \"{states}\" for it")]
fn provider_reports(cloud_context: &CloudContext, states: String) {
    let scripted: Vec<InstanceState> = names(&states)
        .iter()
        .map(|state| match state.as_str() {
            "pending" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "stopping" => InstanceState::Stopping,
            "stopped" => InstanceState::Stopped,
            "terminated" => InstanceState::Terminated,
            other => panic!("unknown state '{other}' in scenario"),
        })
        .collect();
    cloud_context
        .cloud
        .script_states(&cloud_context.instance_id(), scripted);
}

#[given("the instance ignores power actions")]
fn instance_frozen(cloud_context: &CloudContext) {
    cloud_context.cloud.freeze(&cloud_context.instance_id());
}

#[given("creation of \"{name}\" fails with \"{message}\"")]
fn creation_fails(cloud_context: &CloudContext, name: String, message: String) {
    cloud_context.cloud.fail_create(&name, &message);
}

#[when("I stop the instance")]
fn stop_instance(cloud_context: &CloudContext) {
    let id = cloud_context.instance_id();
    let (result, elapsed) = paused_runtime().block_on(async {
        let started = Instant::now();
        let result = cloud_context.manager.stop(&id).await;
        (result, started.elapsed())
    });
    cloud_context.power_result.replace(Some(result));
    cloud_context.elapsed.set(elapsed);
}

#[when("I start the instance")]
fn start_instance(cloud_context: &CloudContext) {
    let id = cloud_context.instance_id();
    let result = paused_runtime().block_on(cloud_context.manager.start(&id));
    cloud_context.power_result.replace(Some(result));
}

#[when("I create instances \"{list}\"")]
fn create_instances(cloud_context: &CloudContext, list: String) {
    let requested = names(&list);
    let outcome = paused_runtime().block_on(cloud_context.manager.create_many(&requested));
    cloud_context.batch.replace(Some(outcome));
}

#[when("I roll back the batch")]
fn roll_back(cloud_context: &CloudContext) {
    let outcome = cloud_context.batch();
    paused_runtime()
        .block_on(cloud_context.manager.rollback(&outcome.succeeded))
        .unwrap_or_else(|err| panic!("rollback should succeed: {err}"));
}

#[when("I terminate the instance by its public address")]
fn terminate_by_address(cloud_context: &CloudContext) {
    let ip = cloud_context
        .cloud
        .public_ip_of(&cloud_context.instance_id())
        .unwrap_or_else(|| panic!("the fake cloud assigns public addresses"));
    let result = paused_runtime().block_on(cloud_context.manager.terminate(&ip));
    cloud_context.terminate_result.replace(Some(result));
}

#[then("the instance is reported as \"{state}\"")]
fn instance_reported_as(cloud_context: &CloudContext, state: String) {
    let instance = cloud_context
        .power_result()
        .unwrap_or_else(|err| panic!("power action should succeed: {err}"));
    assert_eq!(instance.state.to_string(), state);
    assert_eq!(instance.id, cloud_context.instance_id());
}

#[then("the provider was polled \"{count}\" times")]
fn provider_polled(cloud_context: &CloudContext, count: usize) {
    assert_eq!(
        cloud_context
            .cloud
            .describe_count(&cloud_context.instance_id()),
        count
    );
}

#[then("the operation times out after \"{seconds}\" seconds")]
fn operation_times_out(cloud_context: &CloudContext, seconds: u64) {
    let limit = Duration::from_secs(seconds);
    let result = cloud_context.power_result();
    assert!(
        matches!(result, Err(CloudError::Timeout { waited, .. }) if waited == limit),
        "unexpected result: {result:?}"
    );
    assert_eq!(cloud_context.elapsed.get(), limit);
}

#[then("instances \"{list}\" are running")]
fn instances_running(cloud_context: &CloudContext, list: String) {
    let outcome = cloud_context.batch();
    let created: Vec<String> = outcome
        .succeeded
        .iter()
        .map(|instance| instance.name.clone())
        .collect();
    assert_eq!(created, names(&list));
    for instance in &outcome.succeeded {
        assert_eq!(
            cloud_context.cloud.state_of(&instance.id),
            Some(InstanceState::Running)
        );
        assert!(instance.public_ip.is_some(), "addresses are read back");
    }
}

#[then("the batch error names \"{name}\"")]
fn batch_error_names(cloud_context: &CloudContext, name: String) {
    let outcome = cloud_context.batch();
    let failed: Vec<&str> = outcome
        .failed
        .iter()
        .map(|failure| failure.name.as_str())
        .collect();
    assert_eq!(failed, [name.as_str()]);

    let err = outcome
        .into_result()
        .expect_err("a batch with a failure is an error");
    assert!(err.to_string().contains(&name), "error: {err}");
}

#[then("every created instance is terminated")]
fn created_instances_terminated(cloud_context: &CloudContext) {
    let outcome = cloud_context.batch();
    assert!(!outcome.succeeded.is_empty(), "some instances should exist");
    for instance in &outcome.succeeded {
        assert_eq!(
            cloud_context.cloud.state_of(&instance.id),
            Some(InstanceState::Terminated)
        );
    }
}

#[then("termination is refused because the instance is \"{state}\"")]
fn termination_refused(cloud_context: &CloudContext, state: String) {
    let result = cloud_context
        .terminate_result
        .borrow()
        .clone()
        .unwrap_or_else(|| panic!("the scenario should terminate first"));
    assert!(
        matches!(
            result,
            Err(CloudError::NotRunning { state: ref found, .. }) if found.to_string() == state
        ),
        "unexpected result: {result:?}"
    );
    assert_eq!(
        cloud_context
            .cloud
            .state_of(&cloud_context.instance_id())
            .map(|current| current.to_string()),
        Some(state)
    );
}
