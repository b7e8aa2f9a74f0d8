//! Entry point for mcp-swarm.
use std::{process::ExitCode, time::Duration};

use clap::Parser;
use mcp_swarm::{
    cli::{execute_cli_command, CliInvocation, LaunchProfile, LaunchProfileArgs, ParsedCommand},
    lib::telemetry,
    server::{
        config::ServerConfig,
        runtime::{self, RuntimeExit},
    },
};

/// How long blocking registration work may keep the process alive after the
/// command has already returned, e.g. after a timeout.
const BLOCKING_DRAIN: Duration = Duration::from_millis(250);

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start the async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(bootstrap());
    // A timed-out registration may still be parked in `spawn_blocking` on a
    // lock that never frees; dropping the runtime would join it forever.
    runtime.shutdown_timeout(BLOCKING_DRAIN);

    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(exit) => exit.report(),
    }
}

async fn bootstrap() -> Result<(), RuntimeExit> {
    telemetry::init_tracing().map_err(RuntimeExit::from_error)?;
    let args = LaunchProfileArgs::parse();
    let command = args.into_command().map_err(RuntimeExit::from_error)?;

    match command {
        ParsedCommand::RunServer(profile) => run_server(profile).await,
        ParsedCommand::Cli(invocation) => handle_cli_command(invocation).await,
    }
}

async fn run_server(profile: LaunchProfile) -> Result<(), RuntimeExit> {
    let config = ServerConfig::load(profile.config_path.clone(), profile.config_explicit)
        .map_err(RuntimeExit::from_error)?;
    runtime::run_server(profile, config).await
}

async fn handle_cli_command(invocation: CliInvocation) -> Result<(), RuntimeExit> {
    let message = execute_cli_command(invocation)
        .await
        .map_err(RuntimeExit::from_error)?;
    println!("{message}");
    Ok(())
}
