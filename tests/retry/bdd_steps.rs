//! BDD step definitions for retried remote commands.

use std::time::Duration;

use rstest_bdd_macros::{given, then, when};
use ruslan::RetryError;
use ruslan::remote::RawOutput;

use super::test_helpers::RetryContext;
use crate::runtime::paused_runtime;

#[given("a retry policy of \"{attempts}\" attempts starting at \"{base}\" seconds growing by \"{factor}\"")]
fn retry_policy(retry_context: &RetryContext, attempts: u32, base: u64, factor: f64) {
    let policy = retry_context
        .policy
        .borrow()
        .clone()
        .with_attempts(attempts)
        .with_base_delay(Duration::from_secs(base))
        .with_delay_multiplier(factor);
    retry_context.policy.replace(policy);
}

#[given("the host fails the next \"{count}\" commands with exit code \"{code}\"")]
fn host_fails_commands(retry_context: &RetryContext, count: usize, code: i32) {
    for _ in 0..count {
        retry_context.connector.push_exit(code, "");
    }
}

#[given("the next command fails with \"{stderr}\" and exit code \"{code}\"")]
fn next_command_fails(retry_context: &RetryContext, stderr: String, code: i32) {
    retry_context.connector.push_exit(code, &stderr);
}

#[given("the following command prints \"{stdout}\"")]
fn following_command_prints(retry_context: &RetryContext, stdout: String) {
    retry_context
        .connector
        .push_output(RawOutput::success(format!("{stdout}\n")));
}

#[given("a session to \"{host}\" is already cached")]
fn session_cached(retry_context: &RetryContext, host: String) {
    paused_runtime()
        .block_on(retry_context.orchestrator.cache().acquire(&host))
        .unwrap_or_else(|err| panic!("warm-up session should connect: {err}"));
}

#[given("the cached session stops answering")]
fn cached_session_dies(retry_context: &RetryContext) {
    retry_context.connector.fail_next_probe();
}

#[when("I run \"{command}\" on \"{host}\" with retries")]
fn run_with_retries(retry_context: &RetryContext, command: String, host: String) {
    let policy = retry_context.policy.borrow().clone();
    let outcome = paused_runtime().block_on(
        retry_context
            .orchestrator
            .run_with_retry(&host, &command, &policy),
    );
    retry_context.outcome.replace(Some(outcome));
}

#[then("the command ran \"{count}\" times")]
fn command_ran(retry_context: &RetryContext, count: usize) {
    assert_eq!(retry_context.connector.commands().len(), count);
}

#[then("the waits between attempts were \"{gaps}\" seconds")]
fn waits_between_attempts(retry_context: &RetryContext, gaps: String) {
    let expected: Vec<Duration> = gaps
        .split(',')
        .map(|gap| {
            gap.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .unwrap_or_else(|err| panic!("gap '{gap}' should be whole seconds: {err}"))
        })
        .collect();
    assert_eq!(retry_context.connector.command_gaps(), expected);
}

#[then("the run is exhausted after \"{attempts}\" attempts")]
fn run_exhausted(retry_context: &RetryContext, attempts: u32) {
    let outcome = retry_context.outcome();
    assert!(
        matches!(outcome, Err(RetryError::Exhausted { attempts: made, .. }) if made == attempts),
        "unexpected outcome: {outcome:?}"
    );
}

#[then("the run fails fatally on attempt \"{attempt}\"")]
fn run_fatal(retry_context: &RetryContext, attempt: u32) {
    let outcome = retry_context.outcome();
    assert!(
        matches!(outcome, Err(RetryError::Fatal { attempt: made, .. }) if made == attempt),
        "unexpected outcome: {outcome:?}"
    );
}

#[then("the run succeeds with output \"{stdout}\"")]
fn run_succeeds_with(retry_context: &RetryContext, stdout: String) {
    assert_eq!(retry_context.outcome(), Ok(stdout));
}

#[then("the run succeeds")]
fn run_succeeds(retry_context: &RetryContext) {
    let outcome = retry_context.outcome();
    assert!(outcome.is_ok(), "unexpected outcome: {outcome:?}");
}

#[then("\"{count}\" sessions were dialled in total")]
fn sessions_dialled(retry_context: &RetryContext, count: usize) {
    assert_eq!(retry_context.connector.connect_count(), count);
}
