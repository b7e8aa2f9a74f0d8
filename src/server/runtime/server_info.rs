use std::path::Path;

use crate::cli::TransportMode;

/// Build the `ServerInfo.instructions` string shown to MCP clients.
pub fn build_instructions(service_name: &str, transport: TransportMode, ledger: &Path) -> String {
    format!(
        "{service_name} serving the shared port ledger {ledger} over {transport}. Call list_ports to see every claim, lookup_service to find a sibling server's port, and register_service to claim one.",
        ledger = ledger.display(),
        transport = transport.as_str(),
    )
}
