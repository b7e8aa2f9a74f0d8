//! Resolution of the shared ledger location.

use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

/// Environment variable overriding the ledger path.
pub const LEDGER_ENV: &str = "MCP_PORT_LEDGER";
/// Ledger shared by sibling projects: one level above each project directory.
pub const DEFAULT_LEDGER_PATH: &str = "../mcp_ports.txt";

/// Resolve the ledger path in the order: CLI override → env var → config → default.
pub fn resolve_ledger_path(
    cli_override: Option<PathBuf>,
    configured: Option<&Path>,
) -> Result<PathBuf> {
    resolve_ledger_path_from(
        cli_override,
        env::var_os(LEDGER_ENV).map(PathBuf::from),
        configured,
    )
}

fn resolve_ledger_path_from(
    cli_override: Option<PathBuf>,
    env_value: Option<PathBuf>,
    configured: Option<&Path>,
) -> Result<PathBuf> {
    let path = cli_override
        .or(env_value.filter(|p| !p.as_os_str().is_empty()))
        .or_else(|| configured.map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_PATH));
    absolutize(path)
}

/// Join relative paths onto the current directory.
pub fn absolutize(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = env::current_dir().context("failed to obtain current directory")?;
    Ok(cwd.join(path))
}
