//! Ledger tools: list claims, look up a service, register a service.
use rmcp::model::ErrorData;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    lib::errors::{RegistryError, SERVICE_NOT_REGISTERED_ERROR},
    registry::{
        register_with_deadline, PortLedger, PortLedgerEntry, RegistrationOptions,
        ServiceRegistrar,
    },
};

/// Latest claim of one service.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ServicePort {
    pub service_name: String,
    pub port: u16,
}

impl From<PortLedgerEntry> for ServicePort {
    fn from(entry: PortLedgerEntry) -> Self {
        Self {
            service_name: entry.service_name,
            port: entry.port,
        }
    }
}

/// Response from `list_ports`.
#[derive(Debug, Serialize, JsonSchema)]
pub struct ListPortsResponse {
    pub ledger_path: String,
    /// Latest claim per service, in order of last appearance.
    pub services: Vec<ServicePort>,
    /// Every port named by any line, ascending.
    pub occupied_ports: Vec<u16>,
    pub skipped_lines: usize,
}

/// Input for `lookup_service`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct LookupServiceRequest {
    pub service_name: String,
}

/// Input for `register_service`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RegisterServiceRequest {
    pub service_name: String,
    /// Record this port as-is instead of allocating one.
    #[serde(default)]
    pub port: Option<u16>,
}

/// Response from `register_service`.
#[derive(Debug, Serialize, JsonSchema)]
pub struct RegisterServiceResponse {
    pub service_name: String,
    pub port: u16,
    /// `explicit` or `allocated`.
    pub origin: &'static str,
    pub ledger_path: String,
}

pub fn list_ports(ledger: &PortLedger) -> Result<ListPortsResponse, RegistryError> {
    let scan = ledger.scan()?;
    Ok(ListPortsResponse {
        ledger_path: ledger.path().to_string_lossy().into_owned(),
        occupied_ports: scan.occupied_ports().into_iter().collect(),
        skipped_lines: scan.skipped_lines,
        services: scan.latest_entries().into_iter().map(Into::into).collect(),
    })
}

pub fn lookup_service(
    ledger: &PortLedger,
    request: LookupServiceRequest,
) -> Result<ServicePort, ErrorData> {
    let port = ledger
        .latest_port(&request.service_name)
        .map_err(|err| err.to_error_data())?;
    match port {
        Some(port) => Ok(ServicePort {
            service_name: request.service_name,
            port,
        }),
        None => Err(not_registered_error(&request.service_name, ledger)),
    }
}

pub async fn register_service(
    ledger: &PortLedger,
    options: RegistrationOptions,
    request: RegisterServiceRequest,
) -> Result<RegisterServiceResponse, RegistryError> {
    let registrar = ServiceRegistrar::new(ledger.clone(), options);
    let registration = register_with_deadline(registrar, request.service_name, request.port).await?;
    Ok(RegisterServiceResponse {
        service_name: registration.service_name,
        port: registration.port,
        origin: registration.origin.as_str(),
        ledger_path: ledger.path().to_string_lossy().into_owned(),
    })
}

fn not_registered_error(service_name: &str, ledger: &PortLedger) -> ErrorData {
    SERVICE_NOT_REGISTERED_ERROR
        .builder()
        .retryable(true)
        .details(json!({
            "service_name": service_name,
            "ledger_path": ledger.path().to_string_lossy(),
        }))
        .build()
        .unwrap_or_else(|err| ErrorData::internal_error(err.to_string(), None))
}
