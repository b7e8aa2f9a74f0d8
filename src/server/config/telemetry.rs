use tracing::{debug, info};

use super::ServerConfig;

pub fn log_defaults(path: &std::path::Path) {
    debug!(
        target: "mcp_swarm::config",
        path = %path.display(),
        "Default configuration file not found; using built-in defaults"
    );
}

pub fn log_loaded(config: &ServerConfig) {
    info!(
        target: "mcp_swarm::config",
        path = %config.source_path.display(),
        name = %config.server.name,
        host = %config.server.host,
        port = ?config.server.port,
        range_start = config.registry.range.start(),
        range_end = config.registry.range.end(),
        max_attempts = config.registry.max_attempts,
        lock = config.registry.lock,
        "Configuration file loaded successfully"
    );
}
