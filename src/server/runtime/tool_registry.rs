use std::sync::Arc;

use rmcp::{
    handler::server::{wrapper::Parameters, ServerHandler},
    model::{ErrorData, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, Json,
};

use crate::{
    registry::{PortLedger, RegistrationOptions},
    tools::{
        self, ListPortsResponse, LookupServiceRequest, RegisterServiceRequest,
        RegisterServiceResponse, ServerToolRouter, ServicePort,
    },
};

#[derive(Clone)]
pub struct PortRegistryServer {
    ledger: Arc<PortLedger>,
    options: RegistrationOptions,
    instructions: Arc<String>,
    tool_router: ServerToolRouter<Self>,
}

impl PortRegistryServer {
    pub fn new(ledger: PortLedger, options: RegistrationOptions, instructions: String) -> Self {
        Self {
            ledger: Arc::new(ledger),
            options,
            instructions: Arc::new(instructions),
            tool_router: tools::build_router(Self::tool_router),
        }
    }
}

#[tool_router(router = tool_router)]
impl PortRegistryServer {
    #[tool(
        name = "list_ports",
        description = "List the latest port claimed by each service and every occupied port"
    )]
    async fn list_ports(&self) -> Result<Json<ListPortsResponse>, ErrorData> {
        tools::list_ports(&self.ledger)
            .map(Json)
            .map_err(|err| err.to_error_data())
    }

    #[tool(
        name = "lookup_service",
        description = "Return the latest port recorded for a service"
    )]
    async fn lookup_service(
        &self,
        Parameters(request): Parameters<LookupServiceRequest>,
    ) -> Result<Json<ServicePort>, ErrorData> {
        tools::lookup_service(&self.ledger, request).map(Json)
    }

    #[tool(
        name = "register_service",
        description = "Claim a port for a service; omit `port` to allocate a free one"
    )]
    async fn register_service(
        &self,
        Parameters(request): Parameters<RegisterServiceRequest>,
    ) -> Result<Json<RegisterServiceResponse>, ErrorData> {
        tools::register_service(&self.ledger, self.options, request)
            .await
            .map(Json)
            .map_err(|err| err.to_error_data())
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for PortRegistryServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some((*self.instructions).clone()),
            ..ServerInfo::default()
        }
    }
}
