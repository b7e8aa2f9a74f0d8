use std::path::Path;

use serde::Deserialize;

use crate::{lib::errors::ConfigError, registry::validate_service_name};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVICE_NAME: &str = "mcp-swarm";

/// Identity and socket settings of this server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSection {
    pub name: String,
    pub host: String,
    /// Explicit port. `None` means "register one from the ledger".
    pub port: Option<u16>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERVICE_NAME.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawServerSection {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<i64>,
}

pub fn parse_server_section(
    raw: Option<RawServerSection>,
    path: &Path,
) -> Result<ServerSection, ConfigError> {
    let server_raw = raw.unwrap_or_default();
    let name = server_raw
        .name
        .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
    validate_service_name(&name).map_err(|err| ConfigError::InvalidField {
        path: path.to_path_buf(),
        field: "server.name",
        message: err.to_string(),
    })?;
    let host = server_raw
        .host
        .filter(|host| !host.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server_raw
        .port
        .map(|port| validate_port(port, path))
        .transpose()?;
    Ok(ServerSection { name, host, port })
}

fn validate_port(port: i64, path: &Path) -> Result<u16, ConfigError> {
    match u16::try_from(port) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::InvalidField {
            path: path.to_path_buf(),
            field: "server.port",
            message: "Use a port in the range 1-65535".into(),
        }),
    }
}
