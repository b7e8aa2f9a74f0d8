use std::{
    fs, io,
    path::{Path, PathBuf},
    process::{Command as StdCommand, Output, Stdio},
};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf},
    process::{Child, ChildStdin, ChildStdout, Command},
    task::JoinHandle,
};

pub const BINARY_PATH: &str = env!("CARGO_BIN_EXE_mcp-swarm");

/// Scratch directory holding a ledger and (optionally) a config file.
pub struct Workspace {
    pub dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("can create temporary directory"),
        }
    }

    pub fn ledger(&self) -> PathBuf {
        self.dir.path().join("mcp_ports.txt")
    }

    pub fn ledger_contents(&self) -> String {
        fs::read_to_string(self.ledger()).unwrap_or_default()
    }

    pub fn seed_ledger(&self, contents: &str) {
        fs::write(self.ledger(), contents).expect("can seed ledger");
    }

    /// Write `config.toml` into the workspace, which is the binary's cwd.
    pub fn write_config(&self, contents: &str) {
        fs::write(self.dir.path().join("config.toml"), contents).expect("can write config");
    }

    /// Base command: cwd inside the workspace, no inherited overrides.
    pub fn command(&self) -> StdCommand {
        let mut command = StdCommand::new(BINARY_PATH);
        command
            .current_dir(self.dir.path())
            .env_remove("MCP_CONFIG_PATH")
            .env_remove("MCP_PORT_LEDGER")
            .env("RUST_LOG", "warn");
        command
    }

    pub fn ports(&self, args: &[&str]) -> Output {
        self.command()
            .arg("ports")
            .args(args)
            .arg("--ledger")
            .arg(self.ledger())
            .stdin(Stdio::null())
            .output()
            .expect("process should start")
    }
}

pub fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout is not JSON ({err}): {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

pub fn ledger_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

pub async fn spawn_server_process(
    workspace: &Workspace,
) -> Result<(Child, ChildIoBridge, Option<JoinHandle<()>>)> {
    let mut command = Command::new(BINARY_PATH);
    command
        .current_dir(workspace.dir.path())
        .env_remove("MCP_CONFIG_PATH")
        .env_remove("MCP_PORT_LEDGER")
        .arg("--name")
        .arg("stdio-probe")
        .arg("--ledger")
        .arg(workspace.ledger())
        .stdout(Stdio::piped())
        .stdin(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let mut child = command.spawn().context("failed to spawn server process")?;
    let stdout = child.stdout.take().context("child stdout")?;
    let stdin = child.stdin.take().context("child stdin")?;
    let bridge = ChildIoBridge::new(stdout, stdin);
    let stderr_handle = child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
        })
    });
    Ok((child, bridge, stderr_handle))
}

pub struct ChildIoBridge {
    stdout: ChildStdout,
    stdin: ChildStdin,
}

impl ChildIoBridge {
    pub fn new(stdout: ChildStdout, stdin: ChildStdin) -> Self {
        Self { stdout, stdin }
    }
}

impl AsyncRead for ChildIoBridge {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::pin::Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

impl AsyncWrite for ChildIoBridge {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        data: &[u8],
    ) -> std::task::Poll<io::Result<usize>> {
        std::pin::Pin::new(&mut self.stdin).poll_write(cx, data)
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::pin::Pin::new(&mut self.stdin).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::pin::Pin::new(&mut self.stdin).poll_shutdown(cx)
    }
}
