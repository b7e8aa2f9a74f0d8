//! LaunchProfile and config/ledger resolution.
use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

const DEFAULT_CONFIG: &str = "config.toml";
const MCP_CONFIG_ENV: &str = "MCP_CONFIG_PATH";

/// MCP transport mode.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Standard input/output; no listener, no port.
    Stdio,
    /// Event-stream clients on a TCP listener.
    Sse,
    /// Request/response HTTP clients on a TCP listener.
    Http,
}

impl TransportMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Stdio => "stdio",
            TransportMode::Sse => "sse",
            TransportMode::Http => "http",
        }
    }

    /// Whether this transport binds a network listener (and so needs a port).
    pub const fn is_network(&self) -> bool {
        !matches!(self, TransportMode::Stdio)
    }
}

/// Resolved launch profile.
#[derive(Debug, Clone)]
pub struct LaunchProfile {
    pub config_path: PathBuf,
    /// True when the config path came from `--config` or `MCP_CONFIG_PATH`.
    pub config_explicit: bool,
    pub transport: TransportMode,
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ledger_override: Option<PathBuf>,
    pub launch_args: Vec<String>,
}

/// Resolve config path in the order: CLI override → env var → default.
///
/// Returns the absolute path and whether it was chosen explicitly.
pub fn resolve_config_path(override_path: Option<PathBuf>) -> Result<(PathBuf, bool)> {
    let (path, explicit) = match override_path {
        Some(path) => (path, true),
        None => match env::var_os(MCP_CONFIG_ENV).filter(|value| !value.is_empty()) {
            Some(value) => (PathBuf::from(value), true),
            None => (PathBuf::from(DEFAULT_CONFIG), false),
        },
    };

    if path.is_absolute() {
        return Ok((path, explicit));
    }

    let cwd = env::current_dir().context("failed to obtain current directory")?;
    Ok((cwd.join(path), explicit))
}

/// Build launch arguments suitable for reproduction/logging.
pub fn build_launch_args(
    transport: TransportMode,
    config: &Path,
    host: Option<&str>,
    port: Option<u16>,
) -> Vec<String> {
    let mut args = vec![
        format!("--transport={}", transport.as_str()),
        format!("--config={}", config.display()),
    ];
    if let Some(host) = host {
        args.push(format!("--host={host}"));
    }
    if let Some(port) = port {
        args.push(format!("--port={port}"));
    }
    args
}
