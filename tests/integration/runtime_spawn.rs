use std::{process::Stdio, time::Duration};

use anyhow::{Context, Result};
use rmcp::{
    model::{CallToolRequestParam, ClientInfo},
    serve_client,
};
use serde_json::json;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpStream,
    process::Command,
    time::timeout,
};

use crate::common::{ledger_lines, spawn_server_process, Workspace, BINARY_PATH};

#[tokio::test]
async fn inspector_style_spawn_lists_tools() -> Result<()> {
    let workspace = Workspace::new();
    let (mut child, transport, stderr_task) = spawn_server_process(&workspace).await?;

    let client = serve_client(ClientInfo::default(), transport).await?;
    let list = client.list_tools(None).await?;
    for expected in ["list_ports", "lookup_service", "register_service"] {
        assert!(
            list.tools.iter().any(|tool| tool.name.as_ref() == expected),
            "list_tools should include {expected}: {:?}",
            list.tools
        );
    }

    client.cancel().await?;
    let status = timeout(Duration::from_secs(5), child.wait()).await??;
    assert!(
        status.success(),
        "server should exit cleanly but exit status was {status:?}"
    );
    if let Some(handle) = stderr_task {
        let _ = handle.await;
    }
    assert!(
        !workspace.ledger().exists(),
        "stdio mode must not register a port"
    );
    Ok(())
}

#[tokio::test]
async fn network_mode_registers_before_listening() -> Result<()> {
    let workspace = Workspace::new();
    workspace.write_config(
        "[server]\nname = \"camera\"\nhost = \"127.0.0.1\"\n\n[registry]\nrange_start = 42000\nrange_end = 43000\n",
    );

    let mut child = Command::new(BINARY_PATH)
        .current_dir(workspace.dir.path())
        .env_remove("MCP_CONFIG_PATH")
        .env_remove("MCP_PORT_LEDGER")
        .args(["--transport", "sse", "--ledger"])
        .arg(workspace.ledger())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .context("failed to spawn server process")?;

    let stdout = child.stdout.take().context("child stdout")?;
    let mut lines = BufReader::new(stdout).lines();
    let banner = timeout(Duration::from_secs(10), lines.next_line())
        .await??
        .context("server printed nothing")?;
    let addr = banner
        .strip_prefix("camera listening on ")
        .with_context(|| format!("unexpected banner: {banner}"))?
        .to_string();
    let port: u16 = addr
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse().ok())
        .with_context(|| format!("no port in {addr}"))?;
    assert!((42000..43000).contains(&port), "port {port} outside range");
    assert_eq!(ledger_lines(&workspace.ledger()), vec![format!("camera:{port}")]);

    let stream = TcpStream::connect(&addr).await?;
    let client = serve_client(ClientInfo::default(), stream).await?;
    let response = client
        .call_tool(CallToolRequestParam {
            name: "lookup_service".into(),
            arguments: json!({ "service_name": "camera" }).as_object().cloned(),
        })
        .await?;
    let payload = response
        .structured_content
        .context("structured_content should exist")?;
    assert_eq!(payload["port"], json!(port));
    let _ = client.cancel().await;

    let pid = child.id().context("child pid")?;
    // SAFETY: signalling our own child.
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    assert_eq!(result, 0, "SIGTERM should be delivered");
    let status = timeout(Duration::from_secs(5), child.wait()).await??;
    assert!(status.success(), "SIGTERM should be a clean shutdown: {status:?}");
    Ok(())
}

#[tokio::test]
async fn explicit_port_flag_is_recorded_as_is() -> Result<()> {
    let workspace = Workspace::new();
    workspace.seed_ledger("other:42517\n");

    let mut child = Command::new(BINARY_PATH)
        .current_dir(workspace.dir.path())
        .env_remove("MCP_CONFIG_PATH")
        .env_remove("MCP_PORT_LEDGER")
        .args(["--transport", "http", "--host", "127.0.0.1", "--port", "42517"])
        .args(["--name", "mic", "--ledger"])
        .arg(workspace.ledger())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .context("failed to spawn server process")?;

    let stdout = child.stdout.take().context("child stdout")?;
    let mut lines = BufReader::new(stdout).lines();
    let banner = timeout(Duration::from_secs(10), lines.next_line())
        .await??
        .context("server printed nothing")?;
    assert_eq!(banner, "mic listening on 127.0.0.1:42517");
    assert_eq!(workspace.ledger_contents(), "other:42517\nmic:42517\n");

    child.kill().await?;
    Ok(())
}
