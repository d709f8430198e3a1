//! Binary entry point for the Ruslan CLI.

mod cli;

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use shell_escape::unix::escape;
use thiserror::Error;

use ruslan::logging;
use ruslan::{
    CloudError, ConfigError, Instance, InstanceManager, NodeRole, RetryConfig, RetryError,
    RetryOrchestrator, RetryPolicy, ScalewayCloud, ScalewayConfig, ServiceAction,
    ServiceController, ServiceError, SessionCache, Ssh2Connector, SshConfig, Verb,
};

use cli::{Cli, ExecCommand, InstanceAction, InstancesCommand, ServiceCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("invalid command argument: {0}")]
    InvalidCommand(String),
    #[error("remote command failed: {0}")]
    Remote(#[from] RetryError),
    #[error("service action failed: {0}")]
    Service(#[from] ServiceError),
    #[error("{failed} of {total} hosts failed")]
    Hosts { failed: usize, total: usize },
    #[error("cloud operation failed: {0}")]
    Cloud(#[from] CloudError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = logging::init(logging::DEFAULT_FILTER) {
        writeln!(io::stderr(), "{err}").ok();
    }

    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Exec(command) => exec(command).await,
        Cli::Service(command) => service(command).await,
        Cli::Instances(command) => instances(command).await,
    }
}

async fn exec(args: ExecCommand) -> Result<(), CliError> {
    validate_command_args(&args.command)?;
    let policy = load_policy()?;
    let orchestrator = ssh_orchestrator(&policy)?;
    let remote_command = render_remote_command(&args.command);

    let outcome = orchestrator
        .run_with_retry(&args.host, &remote_command, &policy)
        .await;
    orchestrator.cache().close_all().await;

    let stdout = outcome?;
    if !stdout.is_empty() {
        writeln!(io::stdout(), "{stdout}").ok();
    }
    Ok(())
}

async fn service(args: ServiceCommand) -> Result<(), CliError> {
    let action = parse_service_action(&args)?;
    let policy = load_policy()?;
    let orchestrator = ssh_orchestrator(&policy)?;
    let controller = ServiceController::new(orchestrator.clone());

    let outcome = controller.apply_many(&args.hosts, &action, &policy).await;
    orchestrator.cache().close_all().await;

    let per_host = outcome?;
    let total = per_host.len();
    let mut failed = 0;
    for (host, result) in per_host {
        match result {
            Ok(output) => write_host_output(io::stdout(), &host, &output),
            Err(err) => {
                failed += 1;
                writeln!(io::stderr(), "{host}: {err}").ok();
            }
        }
    }

    if failed > 0 {
        return Err(CliError::Hosts { failed, total });
    }
    Ok(())
}

async fn instances(args: InstancesCommand) -> Result<(), CliError> {
    let config = ScalewayConfig::load_without_cli_args()?;
    let cloud = ScalewayCloud::new(config).map_err(|err| CliError::Backend(err.to_string()))?;
    let manager = InstanceManager::new(cloud);
    let mut stdout = io::stdout();

    match args.action {
        InstanceAction::Create { names, rollback } => {
            let outcome = manager.create_many(&names).await;
            for instance in &outcome.succeeded {
                write_instance(&mut stdout, instance);
            }
            if rollback && !outcome.is_complete() {
                manager.rollback(&outcome.succeeded).await?;
            }
            outcome.into_result()?;
        }
        InstanceAction::Start { id } => {
            let instance = manager.start(&id).await?;
            write_instance(&mut stdout, &instance);
        }
        InstanceAction::Stop { id } => {
            let instance = manager.stop(&id).await?;
            write_instance(&mut stdout, &instance);
        }
        InstanceAction::Terminate { ip } => manager.terminate(&ip).await?,
        InstanceAction::ReleaseIp { ip } => match manager.release_floating_ip(&ip).await? {
            Some(released) => {
                writeln!(stdout, "released {} ({})", released.address, released.id).ok();
            }
            None => {
                writeln!(stdout, "no floating address attached to the owner of {ip}").ok();
            }
        },
        InstanceAction::Lookup { ip } => {
            let id = manager.get_id_by_ip(&ip).await?;
            writeln!(stdout, "{id}").ok();
        }
    }
    Ok(())
}

fn load_policy() -> Result<RetryPolicy, CliError> {
    let config = RetryConfig::load_without_cli_args()?;
    Ok(config.to_policy()?)
}

fn ssh_orchestrator(policy: &RetryPolicy) -> Result<RetryOrchestrator<Ssh2Connector>, CliError> {
    let credentials = SshConfig::load_without_cli_args()?.credentials()?;
    let connector = Ssh2Connector::new(credentials).with_command_timeout(policy.attempt_timeout);
    let cache = SessionCache::new(connector);
    Ok(RetryOrchestrator::new(Arc::new(cache)))
}

fn parse_service_action(args: &ServiceCommand) -> Result<ServiceAction, CliError> {
    let verb: Verb = args.verb.parse()?;
    let role: NodeRole = args.role.parse()?;
    Ok(ServiceAction::new(args.service.trim(), verb, role))
}

fn render_remote_command(args: &[String]) -> String {
    let mut result = String::new();
    let mut first = true;

    for arg in args {
        if first {
            first = false;
        } else {
            result.push(' ');
        }

        let escaped = escape(arg.as_str().into());
        result.push_str(escaped.as_ref());
    }

    result
}

fn validate_command_args(args: &[String]) -> Result<(), CliError> {
    for arg in args {
        if arg
            .chars()
            .any(|ch| matches!(ch, '\n' | '\r' | '\u{0000}'..='\u{001F}' | '\u{007F}'))
        {
            return Err(CliError::InvalidCommand(String::from(concat!(
                "command arguments must not contain control characters (ASCII ",
                "0x00-0x1F or 0x7F, e.g. newline, carriage return, tab, NUL)"
            ))));
        }
    }
    Ok(())
}

fn write_host_output(mut target: impl Write, host: &str, output: &str) {
    for line in output.lines() {
        writeln!(target, "{host}: {line}").ok();
    }
}

fn write_instance(mut target: impl Write, instance: &Instance) {
    writeln!(
        target,
        "{}\t{}\t{}\t{}\t{}",
        instance.name,
        instance.id,
        instance.state,
        instance.public_ip.as_deref().unwrap_or("-"),
        instance.private_ip.as_deref().unwrap_or("-"),
    )
    .ok();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruslan::InstanceState;
    use rstest::rstest;

    fn service_args(verb: &str, role: &str) -> ServiceCommand {
        ServiceCommand {
            hosts: vec![String::from("10.0.0.1")],
            service: String::from(" k3s "),
            role: String::from(role),
            verb: String::from(verb),
        }
    }

    #[test]
    fn validate_command_args_rejects_control_characters() {
        let err = validate_command_args(&[String::from("echo\tbad")])
            .expect_err("tab should be rejected");

        assert!(
            matches!(
                err,
                CliError::InvalidCommand(ref message) if message.contains("control characters")
            ),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn validate_command_args_accepts_safe_arguments() {
        assert!(validate_command_args(&[String::from("echo"), String::from("ok")]).is_ok());
    }

    #[test]
    fn render_remote_command_escapes_arguments() {
        let args = vec![
            String::from("echo"),
            String::from("a b"),
            String::from("c'd"),
        ];
        let rendered = render_remote_command(&args);

        assert_eq!(rendered, "echo 'a b' 'c'\\''d'");
    }

    #[rstest]
    #[case("restart", "agent", Verb::Restart, NodeRole::Agent)]
    #[case("rotate", "server", Verb::RotateCredential, NodeRole::Server)]
    #[case("Status", "Server", Verb::Status, NodeRole::Server)]
    fn service_arguments_parse_into_actions(
        #[case] verb: &str,
        #[case] role: &str,
        #[case] expected_verb: Verb,
        #[case] expected_role: NodeRole,
    ) {
        let action = parse_service_action(&service_args(verb, role)).expect("arguments are valid");

        assert_eq!(action, ServiceAction::new("k3s", expected_verb, expected_role));
    }

    #[test]
    fn unknown_verb_is_a_service_error() {
        let err = parse_service_action(&service_args("reload", "server"))
            .expect_err("reload is not supported");

        assert!(
            matches!(err, CliError::Service(ServiceError::UnknownVerb { .. })),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn host_output_is_prefixed_per_line() {
        let mut buf = Vec::new();
        write_host_output(&mut buf, "node-1", "active\nrunning");

        let rendered = String::from_utf8(buf).expect("utf8");
        assert_eq!(rendered, "node-1: active\nnode-1: running\n");
    }

    #[test]
    fn instances_render_as_tab_separated_rows() {
        let instance = Instance {
            id: String::from("srv-1"),
            name: String::from("node-a"),
            public_ip: Some(String::from("51.15.1.2")),
            private_ip: None,
            state: InstanceState::Running,
            system_ok: true,
        };
        let mut buf = Vec::new();
        write_instance(&mut buf, &instance);

        let rendered = String::from_utf8(buf).expect("utf8");
        assert_eq!(rendered, "node-a\tsrv-1\trunning\t51.15.1.2\t-\n");
    }

    #[test]
    fn write_error_writes_cli_error() {
        let mut buf = Vec::new();
        let err = CliError::Hosts {
            failed: 1,
            total: 3,
        };
        write_error(&mut buf, &err);
        let rendered = String::from_utf8(buf).expect("utf8");
        assert!(
            rendered.contains("1 of 3 hosts failed"),
            "rendered: {rendered}"
        );
    }
}
