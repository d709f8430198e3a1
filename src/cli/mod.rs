//! Command-line interface definitions for the `ruslan` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Parser, Subcommand};

/// Top-level CLI for the `ruslan` binary.
#[derive(Debug, Parser)]
#[command(
    name = "ruslan",
    about = "Run commands on cluster nodes with retries and manage their instances",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Run one command on a host, retrying transient failures.
    #[command(name = "exec", about = "Run a command on a host over SSH with retries")]
    Exec(ExecCommand),
    /// Start, stop, restart, query, or rotate a cluster service.
    #[command(name = "service", about = "Control a cluster service on one or more nodes")]
    Service(ServiceCommand),
    /// Manage cloud instances.
    #[command(name = "instances", about = "Create, power, and tear down cloud instances")]
    Instances(InstancesCommand),
}

/// Arguments for the `ruslan exec` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ExecCommand {
    /// Host name or address to connect to.
    #[arg(long, value_name = "HOST")]
    pub(crate) host: String,
    /// Command to execute on the remote host (use -- to separate flags).
    #[arg(required = true, trailing_var_arg = true)]
    pub(crate) command: Vec<String>,
}

/// Arguments for the `ruslan service` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ServiceCommand {
    /// Target host; repeat to act on several nodes concurrently.
    #[arg(long = "host", value_name = "HOST", required = true)]
    pub(crate) hosts: Vec<String>,
    /// Distribution name, for example `k3s` or `rke2`.
    #[arg(long, value_name = "SERVICE")]
    pub(crate) service: String,
    /// Node role: `server` or `agent`.
    #[arg(long, value_name = "ROLE", default_value = "server")]
    pub(crate) role: String,
    /// Verb: start, stop, restart, status, or rotate-credential.
    #[arg(value_name = "VERB")]
    pub(crate) verb: String,
}

/// Arguments for the `ruslan instances` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct InstancesCommand {
    /// Instance operation to perform.
    #[command(subcommand)]
    pub(crate) action: InstanceAction,
}

/// Operations under `ruslan instances`.
#[derive(Debug, Subcommand)]
pub(crate) enum InstanceAction {
    /// Create instances concurrently and wait until they run.
    #[command(name = "create")]
    Create {
        /// Names of the instances to create.
        #[arg(required = true, value_name = "NAME")]
        names: Vec<String>,
        /// Terminate the instances that did come up when any creation fails.
        #[arg(long)]
        rollback: bool,
    },
    /// Power on a stopped instance and wait until it is healthy.
    #[command(name = "start")]
    Start {
        /// Provider instance identifier.
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Power off an instance and wait until it stops.
    #[command(name = "stop")]
    Stop {
        /// Provider instance identifier.
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Terminate the running instance that owns an address.
    #[command(name = "terminate")]
    Terminate {
        /// Public or private address of the instance.
        #[arg(value_name = "IP")]
        ip: String,
    },
    /// Release the floating address attached to the instance owning an address.
    #[command(name = "release-ip")]
    ReleaseIp {
        /// Public or private address of the instance.
        #[arg(value_name = "IP")]
        ip: String,
    },
    /// Print the identifier of the instance that owns an address.
    #[command(name = "lookup")]
    Lookup {
        /// Public or private address of the instance.
        #[arg(value_name = "IP")]
        ip: String,
    },
}
