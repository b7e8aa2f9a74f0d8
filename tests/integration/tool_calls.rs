use std::fs;

use anyhow::Result;
use rmcp::{
    model::{CallToolRequestParam, ClientInfo},
    serve_client,
    service::ServiceError,
    ServiceExt,
};
use serde_json::{json, Value};

use mcp_swarm::{
    cli::TransportMode,
    registry::{PortLedger, PortRange, RegistrationOptions},
    server::runtime::{build_instructions, PortRegistryServer},
};

use crate::common::Workspace;

fn build_server(workspace: &Workspace, options: RegistrationOptions) -> PortRegistryServer {
    let ledger = PortLedger::new(workspace.ledger());
    let instructions = build_instructions("test", TransportMode::Stdio, ledger.path());
    PortRegistryServer::new(ledger, options, instructions)
}

async fn call(
    server: PortRegistryServer,
    tool: &'static str,
    arguments: Value,
) -> Result<Result<Value, ServiceError>> {
    let (server_transport, client_transport) = tokio::io::duplex(4096);
    let server_task = tokio::spawn(async move {
        server.serve(server_transport).await?.waiting().await?;
        Result::<_, anyhow::Error>::Ok(())
    });
    let client = serve_client(ClientInfo::default(), client_transport).await?;

    let result = client
        .call_tool(CallToolRequestParam {
            name: tool.into(),
            arguments: arguments.as_object().cloned(),
        })
        .await;

    let _ = client.cancel().await;
    let _ = server_task.await;

    Ok(result.map(|response| response.structured_content.unwrap_or(Value::Null)))
}

#[tokio::test]
async fn list_ports_reports_latest_claims() -> Result<()> {
    let workspace = Workspace::new();
    workspace.seed_ledger("camera:8001\nnot a line\nmic:8002\ncamera:8003\n");

    let payload = call(
        build_server(&workspace, RegistrationOptions::default()),
        "list_ports",
        json!({}),
    )
    .await?
    .expect("list_ports should succeed");

    assert_eq!(
        payload["services"],
        json!([
            { "service_name": "mic", "port": 8002 },
            { "service_name": "camera", "port": 8003 },
        ])
    );
    assert_eq!(payload["occupied_ports"], json!([8001, 8002, 8003]));
    assert_eq!(payload["skipped_lines"], json!(1));
    Ok(())
}

#[tokio::test]
async fn lookup_of_missing_service_returns_structured_error() -> Result<()> {
    let workspace = Workspace::new();

    let error = call(
        build_server(&workspace, RegistrationOptions::default()),
        "lookup_service",
        json!({ "service_name": "speaker" }),
    )
    .await?
    .expect_err("nothing is registered");

    match error {
        ServiceError::McpError(inner) => {
            let data = inner.data.expect("error data present");
            assert_eq!(data["code"], json!("SERVICE_NOT_REGISTERED"));
            assert_eq!(data["retryable"], json!(true));
        }
        other => panic!("Unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn register_service_allocates_within_the_server_range() -> Result<()> {
    let workspace = Workspace::new();
    let options = RegistrationOptions {
        range: PortRange::new(8100, 8102).expect("valid range"),
        ..RegistrationOptions::default()
    };

    let payload = call(
        build_server(&workspace, options),
        "register_service",
        json!({ "service_name": "eink" }),
    )
    .await?
    .expect("register_service should succeed");

    let port = payload["port"].as_u64().expect("numeric port");
    assert!((8100..8102).contains(&port), "port {port} outside range");
    assert_eq!(payload["origin"], json!("allocated"));
    assert_eq!(
        fs::read_to_string(workspace.ledger())?,
        format!("eink:{port}\n")
    );
    Ok(())
}

#[tokio::test]
async fn register_service_exhaustion_carries_exit_code() -> Result<()> {
    let workspace = Workspace::new();
    workspace.seed_ledger("camera:8100\n");
    let options = RegistrationOptions {
        range: PortRange::new(8100, 8101).expect("valid range"),
        max_attempts: 4,
        ..RegistrationOptions::default()
    };

    let error = call(
        build_server(&workspace, options),
        "register_service",
        json!({ "service_name": "eink" }),
    )
    .await?
    .expect_err("the only port is taken");

    match error {
        ServiceError::McpError(inner) => {
            let data = inner.data.expect("error data present");
            assert_eq!(data["code"], json!("PORT_ALLOCATION_EXHAUSTED"));
            assert_eq!(data["exit_code"], json!(45));
            assert_eq!(data["details"]["attempts"], json!(4));
        }
        other => panic!("Unexpected error: {other:?}"),
    }
    assert_eq!(fs::read_to_string(workspace.ledger())?, "camera:8100\n");
    Ok(())
}
