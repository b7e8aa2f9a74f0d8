//! Load and validate server configuration.
use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info};

use crate::lib::errors::ConfigError;

pub mod registry;
pub mod server;
pub mod telemetry;

pub use registry::{
    parse_registry_section, RawRegistrySection, RegistrySection, DEFAULT_TIMEOUT_SECS,
};
pub use server::{
    parse_server_section, RawServerSection, ServerSection, DEFAULT_HOST, DEFAULT_SERVICE_NAME,
};

/// Top-level configuration container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub registry: RegistrySection,
    pub source_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawServerConfig {
    server: Option<RawServerSection>,
    registry: Option<RawRegistrySection>,
}

impl ServerConfig {
    /// Built-in defaults, attributed to `source_path` for logging.
    pub fn defaults(source_path: PathBuf) -> Self {
        Self {
            server: ServerSection::default(),
            registry: RegistrySection::default(),
            source_path,
        }
    }

    /// Load `path`. A missing file is only an error when it was asked for.
    pub fn load(path: PathBuf, explicit: bool) -> Result<Self, ConfigError> {
        if !explicit && !path.exists() {
            telemetry::log_defaults(&path);
            return Ok(Self::defaults(path));
        }
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        info!(
            target: "mcp_swarm::config",
            path = %path.display(),
            "Starting configuration load"
        );

        let builder = config::Config::builder().add_source(config::File::from(path.clone()));
        let document = builder.build().map_err(|err| {
            let error = ConfigError::from_read_error(path.clone(), err);
            error!(
                target: "mcp_swarm::config",
                path = %path.display(),
                reason = %error,
                "Failed to read configuration file"
            );
            error
        })?;

        let raw: RawServerConfig = document.try_deserialize().map_err(|err| {
            let error = ConfigError::from_parse_error(path.clone(), err);
            error!(
                target: "mcp_swarm::config",
                path = %path.display(),
                reason = %error,
                "Failed to parse configuration file"
            );
            error
        })?;

        let config = Self::from_raw(raw, path.clone()).map_err(|err| {
            error!(
                target: "mcp_swarm::config",
                path = %path.display(),
                reason = %err,
                "Failed to validate configuration file"
            );
            err
        })?;

        telemetry::log_loaded(&config);
        Ok(config)
    }

    fn from_raw(raw: RawServerConfig, path: PathBuf) -> Result<Self, ConfigError> {
        let server = parse_server_section(raw.server, &path)?;
        let registry = parse_registry_section(raw.registry, &path)?;

        Ok(Self {
            server,
            registry,
            source_path: path,
        })
    }
}
