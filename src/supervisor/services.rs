//! `services.toml`: which sibling servers the supervisor launches.
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use serde::Deserialize;
use tracing::{error, info};

use crate::{
    cli::TransportMode, lib::errors::ConfigError, registry::validate_service_name,
    server::config::DEFAULT_HOST,
};

/// One configured service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub name: String,
    pub enabled: bool,
    /// Fixed port. `None` leaves the choice to the child's own registration.
    pub port: Option<u16>,
    pub host: String,
    pub project_dir: PathBuf,
    pub description: String,
    /// Program followed by its leading arguments.
    pub command: Vec<String>,
    pub transport: TransportMode,
}

/// Every service in the file, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicesConfig {
    pub services: Vec<ServiceConfig>,
    pub source_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawServicesConfig {
    services: Option<BTreeMap<String, RawServiceEntry>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawServiceEntry {
    pub enabled: Option<bool>,
    pub port: Option<i64>,
    pub host: Option<String>,
    pub project_dir: Option<PathBuf>,
    pub description: Option<String>,
    pub command: Option<Vec<String>>,
    pub transport: Option<String>,
}

impl ServicesConfig {
    /// Table keys are lowercased by the `config` crate, so `[services.FrontCamera]`
    /// yields a service named `frontcamera`.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        info!(
            target: "mcp_swarm::config",
            path = %path.display(),
            "Loading services configuration"
        );

        let document = config::Config::builder()
            .add_source(config::File::from(path.clone()))
            .build()
            .map_err(|err| ConfigError::from_read_error(path.clone(), err))?;
        let raw: RawServicesConfig = document
            .try_deserialize()
            .map_err(|err| ConfigError::from_parse_error(path.clone(), err))?;

        let services = raw
            .services
            .ok_or(ConfigError::MissingField {
                path: path.clone(),
                field: "services",
            })?
            .into_iter()
            .map(|(name, entry)| parse_service_entry(name, entry, &path))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                error!(
                    target: "mcp_swarm::config",
                    path = %path.display(),
                    reason = %err,
                    "Failed to validate services configuration"
                );
                err
            })?;

        Ok(Self {
            services,
            source_path: path,
        })
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ServiceConfig> {
        self.services.iter().filter(|service| service.enabled)
    }
}

pub fn parse_service_entry(
    name: String,
    raw: RawServiceEntry,
    path: &Path,
) -> Result<ServiceConfig, ConfigError> {
    let invalid = |field: &'static str, message: String| ConfigError::InvalidField {
        path: path.to_path_buf(),
        field,
        message: format!("service `{name}`: {message}"),
    };

    validate_service_name(&name).map_err(|err| invalid("services", err.to_string()))?;
    if name.chars().any(char::is_uppercase) {
        return Err(invalid("services", "service names must be lowercase".into()));
    }
    let enabled = raw.enabled.unwrap_or(false);

    let port = match raw.port {
        None => None,
        Some(port) => Some(
            u16::try_from(port)
                .ok()
                .filter(|port| *port != 0)
                .ok_or_else(|| invalid("services.port", "use a port in 1-65535".into()))?,
        ),
    };

    let transport = match raw.transport.as_deref() {
        None => TransportMode::Sse,
        Some(value) => TransportMode::from_str(value, true)
            .map_err(|_| invalid("services.transport", format!("unknown transport `{value}`")))?,
    };

    let project_dir = raw
        .project_dir
        .filter(|dir| !dir.as_os_str().is_empty())
        .ok_or_else(|| invalid("services.project_dir", "is required".into()))?;

    let command = raw.command.unwrap_or_default();
    if enabled && command.first().map_or(true, |program| program.trim().is_empty()) {
        return Err(invalid(
            "services.command",
            "enabled services need a non-empty command".into(),
        ));
    }

    Ok(ServiceConfig {
        enabled,
        port,
        host: raw
            .host
            .filter(|host| !host.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        project_dir,
        description: raw.description.unwrap_or_default(),
        command,
        transport,
        name,
    })
}
