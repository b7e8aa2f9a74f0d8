//! Telemetry initialization and registration span helpers.

use std::time::Instant;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, info_span, warn, Span};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

/// Initialize `tracing` and format developer logs.
pub fn init_tracing() -> Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize tracing: {err}"))
}

/// Span covering one registration attempt against the ledger.
pub struct RegistrationSpan {
    span: Span,
    started_at: Instant,
    attempt_id: Uuid,
}

impl RegistrationSpan {
    pub fn start(service_name: &str, ledger_path: &str) -> Self {
        let attempt_id = Uuid::new_v4();
        let span = info_span!(
            target: "mcp_swarm::registry",
            "registration",
            %attempt_id,
            service_name,
            ledger_path
        );
        Self {
            span,
            started_at: Instant::now(),
            attempt_id,
        }
    }

    /// Log a phase transition inside the span.
    pub fn phase(&self, phase: &'static str) {
        let _entered = self.span.enter();
        tracing::debug!(
            target: "mcp_swarm::registry",
            attempt_id = %self.attempt_id,
            phase,
            "Registration phase changed"
        );
    }

    /// Close the span, recording the claimed port.
    pub fn succeed(self, port: u16, origin: &'static str) {
        let elapsed_ms = self.started_at.elapsed().as_millis();
        let _entered = self.span.enter();
        info!(
            target: "mcp_swarm::registry",
            attempt_id = %self.attempt_id,
            port,
            origin,
            elapsed_ms,
            "Registered service port"
        );
    }

    /// Close the span, recording why registration failed.
    pub fn fail(self, reason: &str) {
        let elapsed_ms = self.started_at.elapsed().as_millis();
        let _entered = self.span.enter();
        warn!(
            target: "mcp_swarm::registry",
            attempt_id = %self.attempt_id,
            reason,
            elapsed_ms,
            "Service registration failed"
        );
    }
}

/// Payload for logging MCP runtime state as structured telemetry.
#[derive(Debug, Serialize)]
pub struct RuntimeModeTelemetry<'a> {
    pub service_name: &'a str,
    pub transport: &'a str,
    pub host: Option<&'a str>,
    pub port: Option<u16>,
    pub ledger_path: &'a str,
    pub config_path: &'a str,
    pub launch_args: &'a [String],
}

/// Emit runtime mode to `tracing`.
pub fn emit_runtime_mode(telemetry: &RuntimeModeTelemetry<'_>) {
    info!(
        target: "mcp_swarm::runtime",
        service_name = telemetry.service_name,
        transport = telemetry.transport,
        host = telemetry.host.unwrap_or(""),
        port = telemetry.port.unwrap_or_default(),
        ledger_path = telemetry.ledger_path,
        config_path = telemetry.config_path,
        launch_args = ?telemetry.launch_args,
        "Started MCP server"
    );
}
