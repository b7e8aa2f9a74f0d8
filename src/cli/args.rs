//! CLI argument definitions and `LaunchProfile` construction.
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use super::{build_launch_args, resolve_config_path, LaunchProfile, TransportMode};
use crate::registry::validate_service_name;

/// Parsed command intent from CLI.
#[derive(Debug, Clone)]
pub enum ParsedCommand {
    RunServer(LaunchProfile),
    Cli(CliInvocation),
}

/// Utility command plus the settings shared with server mode.
#[derive(Debug, Clone)]
pub struct CliInvocation {
    pub command: CliCommand,
    pub config_path: PathBuf,
    pub config_explicit: bool,
    pub ledger_override: Option<PathBuf>,
}

/// Top-level optional CLI commands.
#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Inspect or modify the shared port ledger.
    #[command(about = "Inspect or modify the shared port ledger")]
    Ports(PortsArgs),
    /// Print the launch plan for enabled services.
    #[command(about = "Print the launch plan for enabled services")]
    Services(ServicesArgs),
    /// Launch enabled services and forward shutdown to them.
    #[command(about = "Launch enabled services and forward shutdown to them")]
    Supervise(ServicesArgs),
}

/// `ports` command container.
#[derive(Debug, Clone, Args)]
#[command(
    about = "Inspect or modify the shared port ledger",
    long_about = "Inspect or modify the shared port ledger.\n\nSubcommands:\n  register  Claim a port for a service.\n  list      Show latest claims and every occupied port.\n  lookup    Print the latest port claimed by a service.\n  compact   Keep only the latest claim per service.",
    after_help = "Hint: `compact` is never run automatically; run it while no servers are starting."
)]
pub struct PortsArgs {
    #[command(subcommand)]
    pub command: PortsCommand,
}

/// Ledger subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum PortsCommand {
    /// Claim a port for a service (allocated unless `--port` is given).
    Register(RegisterArgs),
    /// Show latest claims and every occupied port.
    List,
    /// Print the latest port claimed by a service.
    Lookup(LookupArgs),
    /// Rewrite the ledger keeping only the latest claim per service.
    Compact,
}

/// Arguments for `ports register`.
#[derive(Debug, Clone, Args)]
pub struct RegisterArgs {
    /// Service name recorded in the ledger.
    pub service_name: String,
    /// Explicit port; skips collision checks.
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,
    /// First port of the allocation range (inclusive).
    #[arg(long)]
    pub range_start: Option<u32>,
    /// End of the allocation range (exclusive).
    #[arg(long)]
    pub range_end: Option<u32>,
    /// Maximum random probes before giving up.
    #[arg(long)]
    pub max_attempts: Option<u32>,
    /// Skip the advisory lock (reproduces the unguarded race).
    #[arg(long, default_value_t = false)]
    pub no_lock: bool,
    /// Bound on the whole registration; 0 waits indefinitely.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// Arguments for `ports lookup`.
#[derive(Debug, Clone, Args)]
pub struct LookupArgs {
    pub service_name: String,
}

/// Arguments for `services` and `supervise`.
#[derive(Debug, Clone, Args)]
pub struct ServicesArgs {
    /// Path to services.toml.
    #[arg(long, default_value = "services.toml")]
    pub file: PathBuf,
}

/// Command-line arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mcp-swarm",
    author,
    version,
    about = "Port registry and launcher for hardware MCP servers sharing one host",
    long_about = None
)]
pub struct LaunchProfileArgs {
    /// Select stdio (default), sse or http.
    #[arg(long, value_enum, default_value_t = TransportMode::Stdio)]
    pub transport: TransportMode,
    /// Bind host (overrides [server].host).
    #[arg(long)]
    pub host: Option<String>,
    /// Bind port (overrides [server].port); omitted means "register one".
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,
    /// Service name recorded in the ledger (overrides [server].name).
    #[arg(long)]
    pub name: Option<String>,
    /// Path to config.toml (overrides MCP_CONFIG_PATH).
    #[arg(long = "config", global = true)]
    pub config_override: Option<PathBuf>,
    /// Path to the port ledger (overrides MCP_PORT_LEDGER and [registry].ledger_path).
    #[arg(long = "ledger", global = true)]
    pub ledger_override: Option<PathBuf>,
    /// Optional CLI command mode.
    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

impl LaunchProfileArgs {
    /// Build a `LaunchProfile` from CLI args and environment variables.
    pub fn build(self) -> Result<LaunchProfile> {
        let (config_path, config_explicit) = resolve_config_path(self.config_override)?;
        if let Some(name) = &self.name {
            validate_service_name(name)?;
        }

        let launch_args = build_launch_args(
            self.transport,
            &config_path,
            self.host.as_deref(),
            self.port,
        );

        Ok(LaunchProfile {
            config_path,
            config_explicit,
            transport: self.transport,
            name: self.name,
            host: self.host,
            port: self.port,
            ledger_override: self.ledger_override,
            launch_args,
        })
    }

    /// Parse CLI args into either server launch mode or utility command mode.
    pub fn into_command(self) -> Result<ParsedCommand> {
        match self.command {
            Some(command) => {
                validate_command(&command)?;
                let (config_path, config_explicit) = resolve_config_path(self.config_override)?;
                Ok(ParsedCommand::Cli(CliInvocation {
                    command,
                    config_path,
                    config_explicit,
                    ledger_override: self.ledger_override,
                }))
            }
            None => Ok(ParsedCommand::RunServer(self.build()?)),
        }
    }
}

fn validate_command(command: &CliCommand) -> Result<()> {
    match command {
        CliCommand::Ports(ports) => match &ports.command {
            PortsCommand::Register(args) => validate_service_name(&args.service_name)?,
            PortsCommand::Lookup(args) => validate_service_name(&args.service_name)?,
            PortsCommand::List | PortsCommand::Compact => {}
        },
        CliCommand::Services(_) | CliCommand::Supervise(_) => {}
    }

    Ok(())
}
