//! Integration tests for cluster service control through the retry layer.

use std::sync::Arc;
use std::time::Duration;

use rstest::{fixture, rstest};
use ruslan::remote::{RawOutput, SessionCache};
use ruslan::test_support::ScriptedConnector;
use ruslan::{
    NodeRole, RetryError, RetryOrchestrator, RetryPolicy, ServiceAction, ServiceController,
    ServiceError, Verb,
};

#[fixture]
fn connector() -> ScriptedConnector {
    ScriptedConnector::new()
}

fn controller(connector: &ScriptedConnector) -> ServiceController<ScriptedConnector> {
    ServiceController::new(RetryOrchestrator::new(Arc::new(SessionCache::new(
        connector.clone(),
    ))))
}

fn restart_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_attempts(3)
        .with_base_delay(Duration::from_secs(1))
        .with_retryable_exit_codes([255])
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn restart_recovers_after_two_dropped_connections(connector: ScriptedConnector) {
    connector.push_exit(255, "");
    connector.push_exit(255, "");
    let action = ServiceAction::new("k3s", Verb::Restart, NodeRole::Server);

    let output = controller(&connector)
        .apply("10.0.0.1", &action, &restart_policy())
        .await
        .expect("third attempt succeeds");

    assert_eq!(output, "");
    assert_eq!(
        connector.commands(),
        vec![String::from("sudo systemctl restart k3s"); 3]
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn status_returns_trimmed_output(connector: ScriptedConnector) {
    connector.push_output(RawOutput::success("  active (running)\n\n"));
    let action = ServiceAction::new("rke2", Verb::Status, NodeRole::Agent);

    let output = controller(&connector)
        .apply("10.0.0.2", &action, &restart_policy())
        .await
        .expect("status succeeds");

    assert_eq!(output, "active (running)");
    assert_eq!(connector.commands(), ["sudo systemctl status rke2-agent"]);
}

#[rstest]
#[tokio::test]
async fn unknown_distribution_never_contacts_the_host(connector: ScriptedConnector) {
    let action = ServiceAction::new("microk8s", Verb::Start, NodeRole::Server);

    let err = controller(&connector)
        .apply("10.0.0.3", &action, &restart_policy())
        .await
        .expect_err("no unit is known for microk8s");

    assert!(matches!(err, ServiceError::UnknownUnit { .. }));
    assert_eq!(connector.connect_count(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn exit_codes_outside_the_whitelist_are_fatal(connector: ScriptedConnector) {
    connector.push_exit(3, "");
    let action = ServiceAction::new("k3s", Verb::Stop, NodeRole::Agent);

    let err = controller(&connector)
        .apply("10.0.0.4", &action, &restart_policy())
        .await
        .expect_err("exit code 3 is not retryable here");

    assert!(
        matches!(
            err,
            ServiceError::Remote {
                verb: Verb::Stop,
                source: RetryError::Fatal { attempt: 1, .. },
                ..
            }
        ),
        "unexpected error: {err}"
    );
    assert_eq!(connector.commands(), ["sudo systemctl stop k3s-agent"]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn rotation_runs_the_distribution_tool(connector: ScriptedConnector) {
    let action = ServiceAction::new("rke2", Verb::RotateCredential, NodeRole::Server);

    controller(&connector)
        .apply("10.0.0.5", &action, &restart_policy())
        .await
        .expect("rotation succeeds");

    assert_eq!(connector.commands(), ["sudo rke2 certificate rotate"]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn apply_many_reports_every_host_in_order(connector: ScriptedConnector) {
    connector.refuse_host(
        "10.0.0.7",
        ruslan::RemoteError::transport("10.0.0.7", "Host key verification failed."),
    );
    let hosts = ["10.0.0.6", "10.0.0.7", "10.0.0.8"];
    let action = ServiceAction::new("k3s", Verb::Start, NodeRole::Server);

    let results = controller(&connector)
        .apply_many(&hosts, &action, &restart_policy())
        .await
        .expect("the action maps to a unit");

    let order: Vec<&str> = results.iter().map(|(host, _)| host.as_str()).collect();
    assert_eq!(order, hosts);
    let failed: Vec<&str> = results
        .iter()
        .filter(|(_, result)| result.is_err())
        .map(|(host, _)| host.as_str())
        .collect();
    assert_eq!(failed, ["10.0.0.7"]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn apply_many_trims_status_like_apply(connector: ScriptedConnector) {
    connector.push_output(RawOutput::success("\n  active (running)  \n"));
    let action = ServiceAction::new("k3s", Verb::Status, NodeRole::Server);

    let results = controller(&connector)
        .apply_many(&["10.0.0.9"], &action, &restart_policy())
        .await
        .expect("the action maps to a unit");

    assert!(matches!(
        results.first(),
        Some((_, Ok(output))) if output == "active (running)"
    ));
}
