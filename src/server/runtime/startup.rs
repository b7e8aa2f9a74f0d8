use std::process::ExitCode;

use anyhow::{Context, Error};
use rmcp::ServiceExt;
use serde_json::json;
use tokio::net::TcpListener;

use crate::{
    cli::{LaunchProfile, TransportMode},
    lib::{
        errors::{RegistryError, MCP_CLIENT_REQUIRED_ERROR},
        paths::resolve_ledger_path,
        signals::shutdown_signal,
        telemetry::{emit_runtime_mode, RuntimeModeTelemetry},
    },
    registry::{register_with_deadline, PortLedger, ServiceRegistrar},
    server::{
        config::ServerConfig,
        runtime::{build_instructions, PortRegistryServer},
    },
};

const MCP_CLIENT_REQUIRED_EXIT: u8 = 44;

/// Bundles a runtime error message with an exit code and optional structured error data.
#[derive(Debug)]
pub struct RuntimeExit {
    message: String,
    code: u8,
    error_data: Option<rmcp::model::ErrorData>,
}

impl RuntimeExit {
    pub fn structured(error: rmcp::model::ErrorData, code: u8) -> Self {
        Self {
            message: error.message.to_string(),
            code,
            error_data: Some(error),
        }
    }

    /// Registry failures anywhere in the chain keep their dedicated exit code.
    pub fn from_error(err: impl Into<Error>) -> Self {
        let err = err.into();
        if let Some(registry) = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<RegistryError>())
        {
            return Self::from_registry_error(registry);
        }
        Self {
            message: format!("{err:?}"),
            code: 1,
            error_data: None,
        }
    }

    pub fn from_registry_error(err: &RegistryError) -> Self {
        Self::structured(err.to_error_data(), err.exit_code())
    }

    pub fn report(self) -> ExitCode {
        if let Some(data) = self.error_data {
            if let Ok(serialized) = serde_json::to_string(&data) {
                eprintln!("{serialized}");
            } else {
                eprintln!("{}", data.message);
            }
        } else {
            eprintln!("{}", self.message);
        }
        ExitCode::from(self.code)
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn error_data(&self) -> Option<&rmcp::model::ErrorData> {
        self.error_data.as_ref()
    }
}

/// Refuse to run stdio when a human terminal is attached instead of a client.
pub fn ensure_invoked_via_mcp_client(profile: &LaunchProfile) -> Result<(), RuntimeExit> {
    use std::io::IsTerminal;
    let stdin_tty = std::io::stdin().is_terminal();
    let stdout_tty = std::io::stdout().is_terminal();
    if stdin_tty || stdout_tty {
        let data = MCP_CLIENT_REQUIRED_ERROR
            .builder()
            .retryable(true)
            .details(json!({
                "transport": profile.transport.as_str(),
                "stdin_is_tty": stdin_tty,
                "stdout_is_tty": stdout_tty
            }))
            .with_exit_code_value(MCP_CLIENT_REQUIRED_EXIT)
            .build()
            .map_err(RuntimeExit::from_error)?;
        return Err(RuntimeExit::structured(data, MCP_CLIENT_REQUIRED_EXIT));
    }
    Ok(())
}

/// Start the MCP server and select stdio/network based on the launch profile.
///
/// Network transports claim their port in the ledger before binding; stdio
/// never touches the ledger on startup.
pub async fn run_server(profile: LaunchProfile, config: ServerConfig) -> Result<(), RuntimeExit> {
    let service_name = profile
        .name
        .clone()
        .unwrap_or_else(|| config.server.name.clone());
    let ledger_path = resolve_ledger_path(
        profile.ledger_override.clone(),
        config.registry.ledger_path.as_deref(),
    )
    .map_err(RuntimeExit::from_error)?;
    let ledger = PortLedger::new(ledger_path);
    let options = config.registry.options();

    let instructions = build_instructions(&service_name, profile.transport, ledger.path());
    let server = PortRegistryServer::new(ledger.clone(), options, instructions);
    let ledger_display = ledger.path().to_string_lossy().into_owned();
    let config_display = config.source_path.to_string_lossy().into_owned();

    if profile.transport == TransportMode::Stdio {
        ensure_invoked_via_mcp_client(&profile)?;
        emit_runtime_mode(&RuntimeModeTelemetry {
            service_name: &service_name,
            transport: profile.transport.as_str(),
            host: None,
            port: None,
            ledger_path: &ledger_display,
            config_path: &config_display,
            launch_args: &profile.launch_args,
        });
        return tokio::select! {
            result = run_stdio(server) => result,
            _ = shutdown_signal() => Ok(()),
        };
    }

    let host = profile
        .host
        .clone()
        .unwrap_or_else(|| config.server.host.clone());
    let registrar = ServiceRegistrar::new(ledger, options);
    let registration =
        register_with_deadline(registrar, service_name.clone(), profile.port.or(config.server.port))
            .await
            .map_err(|err| RuntimeExit::from_registry_error(&err))?;

    let addr = format!("{host}:{}", registration.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr} for {service_name}"))
        .map_err(RuntimeExit::from_error)?;

    println!("{service_name} listening on {addr}");
    emit_runtime_mode(&RuntimeModeTelemetry {
        service_name: &service_name,
        transport: profile.transport.as_str(),
        host: Some(host.as_str()),
        port: Some(registration.port),
        ledger_path: &ledger_display,
        config_path: &config_display,
        launch_args: &profile.launch_args,
    });

    tokio::select! {
        result = run_listener(server, listener, profile.transport) => result,
        _ = shutdown_signal() => Ok(()),
    }
}

async fn run_stdio(server: PortRegistryServer) -> Result<(), RuntimeExit> {
    let running = server
        .serve(rmcp::transport::stdio())
        .await
        .map_err(RuntimeExit::from_error)?;
    running.waiting().await.map_err(RuntimeExit::from_error)?;
    Ok(())
}

async fn run_listener(
    server: PortRegistryServer,
    listener: TcpListener,
    transport: TransportMode,
) -> Result<(), RuntimeExit> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("failed to accept MCP connection")
            .map_err(RuntimeExit::from_error)?;
        tracing::info!(
            target: "mcp_swarm::runtime",
            peer = %peer,
            transport = transport.as_str(),
            "Accepted connection from MCP client"
        );
        let session = server.clone();
        tokio::spawn(async move {
            let outcome = match session.serve(stream).await {
                Ok(running) => running.waiting().await.map(|_| ()).map_err(Error::from),
                Err(err) => Err(Error::from(err)),
            };
            if let Err(err) = outcome {
                tracing::warn!(
                    target: "mcp_swarm::runtime",
                    peer = %peer,
                    error = %err,
                    "MCP session ended with an error"
                );
            }
        });
    }
}
