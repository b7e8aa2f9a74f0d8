//! CLI entrypoint module structure.
use std::{path::Path, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde_json::json;

use crate::{
    lib::{paths::resolve_ledger_path, signals::shutdown_signal},
    registry::{
        register_with_deadline, LockMode, PortLedger, PortRange, RegistrationOptions,
        ServiceRegistrar,
    },
    server::config::{RegistrySection, ServerConfig},
    supervisor::{
        supervise, LaunchPlan, ServicesConfig, SupervisorOutcome, DEFAULT_SHUTDOWN_GRACE,
    },
};

pub mod args;
pub mod profile;

pub use args::{
    CliCommand, CliInvocation, LaunchProfileArgs, LookupArgs, ParsedCommand, PortsArgs,
    PortsCommand, RegisterArgs, ServicesArgs,
};
pub use profile::{build_launch_args, resolve_config_path, LaunchProfile, TransportMode};

/// Execute CLI command mode and return a user-facing result payload.
pub async fn execute_cli_command(invocation: CliInvocation) -> Result<String> {
    let CliInvocation {
        command,
        config_path,
        config_explicit,
        ledger_override,
    } = invocation;

    match command {
        CliCommand::Ports(ports) => {
            let config = ServerConfig::load(config_path, config_explicit)?;
            let ledger_path =
                resolve_ledger_path(ledger_override, config.registry.ledger_path.as_deref())?;
            let ledger = PortLedger::new(ledger_path);
            run_ports_command(ports.command, &ledger, &config.registry).await
        }
        CliCommand::Services(args) => describe_services(&args.file),
        CliCommand::Supervise(args) => supervise_services(&args.file).await,
    }
}

async fn run_ports_command(
    command: PortsCommand,
    ledger: &PortLedger,
    registry: &RegistrySection,
) -> Result<String> {
    let ledger_path = ledger.path().to_string_lossy().into_owned();
    let payload = match command {
        PortsCommand::Register(args) => {
            let options = registration_options(&args, registry)?;
            let registrar = ServiceRegistrar::new(ledger.clone(), options);
            let registration =
                register_with_deadline(registrar, args.service_name, args.port).await?;
            json!({
                "status": "registered",
                "service_name": registration.service_name,
                "port": registration.port,
                "origin": registration.origin,
                "ledger_path": ledger_path,
            })
        }
        PortsCommand::List => {
            let scan = ledger.scan()?;
            json!({
                "ledger_path": ledger_path,
                "services": scan.latest_entries(),
                "occupied_ports": scan.occupied_ports(),
                "skipped_lines": scan.skipped_lines,
            })
        }
        PortsCommand::Lookup(args) => {
            let port = ledger.latest_port(&args.service_name)?.ok_or_else(|| {
                anyhow!(
                    "service `{}` has no entry in {ledger_path}",
                    args.service_name
                )
            })?;
            json!({
                "service_name": args.service_name,
                "port": port,
                "ledger_path": ledger_path,
            })
        }
        PortsCommand::Compact => {
            let summary = ledger.compact()?;
            json!({
                "status": "compacted",
                "ledger_path": ledger_path,
                "lines_before": summary.lines_before,
                "lines_after": summary.lines_after,
                "skipped_lines": summary.skipped_lines,
            })
        }
    };

    Ok(serde_json::to_string_pretty(&payload)?)
}

/// Config-file policy with per-invocation overrides from `ports register`.
fn registration_options(
    args: &RegisterArgs,
    registry: &RegistrySection,
) -> Result<RegistrationOptions> {
    let mut options = registry.options();
    if args.range_start.is_some() || args.range_end.is_some() {
        options.range = PortRange::new(
            args.range_start
                .unwrap_or_else(|| u32::from(options.range.start())),
            args.range_end.unwrap_or_else(|| options.range.end()),
        )?;
    }
    if let Some(max_attempts) = args.max_attempts {
        options.max_attempts = max_attempts;
    }
    if args.no_lock {
        options.lock_mode = LockMode::Unlocked;
    }
    if let Some(secs) = args.timeout_secs {
        options.timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    Ok(options)
}

fn load_plan(file: &Path) -> Result<LaunchPlan> {
    let config = ServicesConfig::load_from_path(file.to_path_buf())
        .with_context(|| format!("failed to load services from {}", file.display()))?;
    Ok(LaunchPlan::from_config(&config))
}

fn describe_services(file: &Path) -> Result<String> {
    let plan = load_plan(file)?;
    Ok(serde_json::to_string_pretty(&plan)?)
}

async fn supervise_services(file: &Path) -> Result<String> {
    let plan = load_plan(file)?;
    if plan.services.is_empty() {
        return Err(anyhow!("no enabled services in {}", file.display()));
    }
    let report = supervise(&plan, shutdown_signal(), DEFAULT_SHUTDOWN_GRACE).await;
    let rendered = serde_json::to_string_pretty(&report)?;
    // Children stopped by our own shutdown are not failures.
    if report.outcome == SupervisorOutcome::ChildrenExited {
        let failed: Vec<_> = report
            .failed_children()
            .map(|child| format!("{} ({})", child.name, child.status))
            .collect();
        if !failed.is_empty() {
            return Err(anyhow!(
                "services exited with failure: {}\n{rendered}",
                failed.join(", ")
            ));
        }
    }
    Ok(rendered)
}
