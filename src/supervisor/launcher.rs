//! Launch enabled services as child processes and forward shutdown to them.
//!
//! Restarting failed children is intentionally not done here: a child that
//! exits is reported and stays down.
use std::{
    collections::HashMap,
    future::Future,
    os::unix::process::ExitStatusExt,
    path::PathBuf,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{process::Command, task::JoinSet};
use tracing::{error, info, warn};

use super::services::ServicesConfig;
use crate::cli::TransportMode;

/// How long children get between SIGTERM and SIGKILL.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Resolved command line for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchSpec {
    pub name: String,
    pub description: String,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub transport: TransportMode,
    pub port: Option<u16>,
}

/// Enabled services in name order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchPlan {
    pub services: Vec<LaunchSpec>,
}

impl LaunchPlan {
    pub fn from_config(config: &ServicesConfig) -> Self {
        let services = config
            .enabled()
            .filter_map(|service| {
                let (program, leading) = service.command.split_first()?;
                let mut args = leading.to_vec();
                args.extend([
                    "--transport".to_string(),
                    service.transport.as_str().to_string(),
                    "--host".to_string(),
                    service.host.clone(),
                ]);
                if let Some(port) = service.port {
                    args.extend(["--port".to_string(), port.to_string()]);
                }
                Some(LaunchSpec {
                    name: service.name.clone(),
                    description: service.description.clone(),
                    program: program.clone(),
                    args,
                    working_dir: service.project_dir.clone(),
                    transport: service.transport,
                    port: service.port,
                })
            })
            .collect();
        Self { services }
    }
}

/// Why supervision ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorOutcome {
    /// The operator asked for shutdown.
    Shutdown,
    /// Every child exited on its own.
    ChildrenExited,
}

/// Final state of one child.
#[derive(Debug, Clone, Serialize)]
pub struct ChildSummary {
    pub name: String,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub exited_at: DateTime<Utc>,
    pub status: String,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupervisorReport {
    pub outcome: SupervisorOutcome,
    pub children: Vec<ChildSummary>,
}

impl SupervisorReport {
    pub fn failed_children(&self) -> impl Iterator<Item = &ChildSummary> {
        self.children.iter().filter(|child| !child.success)
    }
}

struct ChildExit {
    name: String,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    status: std::io::Result<ExitStatus>,
}

/// Run every service in `plan` until they all exit or `shutdown` resolves.
///
/// On shutdown each live child gets SIGTERM, then SIGKILL after `grace`.
pub async fn supervise<F>(plan: &LaunchPlan, shutdown: F, grace: Duration) -> SupervisorReport
where
    F: Future<Output = ()>,
{
    let mut children = Vec::new();
    let mut live: HashMap<String, u32> = HashMap::new();
    let mut waits = JoinSet::new();

    for spec in &plan.services {
        let spawned = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                error!(
                    target: "mcp_swarm::supervisor",
                    service = %spec.name,
                    program = %spec.program,
                    error = %err,
                    "Failed to launch service"
                );
                children.push(ChildSummary {
                    name: spec.name.clone(),
                    pid: None,
                    started_at: None,
                    exited_at: Utc::now(),
                    status: format!("spawn failed: {err}"),
                    success: false,
                });
                continue;
            }
        };

        let pid = child.id();
        let started_at = Utc::now();
        info!(
            target: "mcp_swarm::supervisor",
            service = %spec.name,
            pid = ?pid,
            port = ?spec.port,
            transport = spec.transport.as_str(),
            "Launched service"
        );
        if let Some(pid) = pid {
            live.insert(spec.name.clone(), pid);
        }
        let name = spec.name.clone();
        waits.spawn(async move {
            let status = child.wait().await;
            ChildExit {
                name,
                pid,
                started_at,
                status,
            }
        });
    }

    tokio::pin!(shutdown);
    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => break SupervisorOutcome::Shutdown,
            joined = waits.join_next() => match joined {
                Some(Ok(exit)) => {
                    live.remove(&exit.name);
                    children.push(summarize(exit));
                }
                Some(Err(err)) => warn!(
                    target: "mcp_swarm::supervisor",
                    error = %err,
                    "Child wait task failed"
                ),
                None => break SupervisorOutcome::ChildrenExited,
            },
        }
    };

    if outcome == SupervisorOutcome::Shutdown {
        for (name, pid) in &live {
            forward_terminate(name, *pid);
        }
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = waits.join_next().await {
                if let Ok(exit) = joined {
                    children.push(summarize(exit));
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                target: "mcp_swarm::supervisor",
                grace_ms = grace.as_millis(),
                "Children ignored SIGTERM; killing them"
            );
            // Aborting drops each `Child`, and `kill_on_drop` sends SIGKILL.
            waits.abort_all();
            while waits.join_next().await.is_some() {}
            for name in live.keys() {
                if !children.iter().any(|child| &child.name == name) {
                    children.push(ChildSummary {
                        name: name.clone(),
                        pid: live.get(name).copied(),
                        started_at: None,
                        exited_at: Utc::now(),
                        status: "killed".into(),
                        success: false,
                    });
                }
            }
        }
    }

    SupervisorReport { outcome, children }
}

fn forward_terminate(name: &str, pid: u32) {
    let Ok(raw_pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: plain syscall; a stale pid only yields ESRCH.
    let result = unsafe { libc::kill(raw_pid, libc::SIGTERM) };
    if result == 0 {
        info!(target: "mcp_swarm::supervisor", service = name, pid, "Forwarded SIGTERM");
    } else {
        warn!(
            target: "mcp_swarm::supervisor",
            service = name,
            pid,
            error = %std::io::Error::last_os_error(),
            "Failed to forward SIGTERM"
        );
    }
}

fn summarize(exit: ChildExit) -> ChildSummary {
    let exited_at = Utc::now();
    let run_ms = (exited_at - exit.started_at).num_milliseconds();
    let (status, success) = match &exit.status {
        Ok(status) => match (status.code(), status.signal()) {
            (Some(code), _) => (format!("exit {code}"), status.success()),
            (None, Some(signal)) => (format!("signal {signal}"), false),
            (None, None) => ("unknown".to_string(), false),
        },
        Err(err) => (format!("wait failed: {err}"), false),
    };
    if success {
        info!(
            target: "mcp_swarm::supervisor",
            service = %exit.name,
            status = %status,
            run_ms,
            "Service exited"
        );
    } else {
        warn!(
            target: "mcp_swarm::supervisor",
            service = %exit.name,
            status = %status,
            run_ms,
            "Service exited with failure"
        );
    }
    ChildSummary {
        name: exit.name,
        pid: exit.pid,
        started_at: Some(exit.started_at),
        exited_at,
        status,
        success,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::tempdir;

    use super::*;
    use crate::supervisor::services::ServicesConfig;

    fn fixture_path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    fn shell_spec(name: &str, script: &str, dir: &Path) -> LaunchSpec {
        LaunchSpec {
            name: name.into(),
            description: String::new(),
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            working_dir: dir.to_path_buf(),
            transport: TransportMode::Sse,
            port: None,
        }
    }

    #[test]
    fn plan_skips_disabled_services_and_appends_bind_flags() {
        let config = ServicesConfig::load_from_path(fixture_path("services.toml"))
            .expect("services.toml should load");
        let plan = LaunchPlan::from_config(&config);

        let names: Vec<_> = plan.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["camera", "mic"]);

        let camera = &plan.services[0];
        assert_eq!(camera.program, "./camera-mcp");
        assert_eq!(
            camera.args,
            vec!["--verbose", "--transport", "sse", "--host", "127.0.0.1", "--port", "8101"]
        );
        assert_eq!(camera.working_dir, PathBuf::from("/opt/mcp/camera"));

        let mic = &plan.services[1];
        assert_eq!(mic.args, vec!["--transport", "http", "--host", "0.0.0.0"]);
        assert_eq!(mic.port, None);
    }

    #[tokio::test]
    async fn reports_children_that_exit_on_their_own() {
        let temp = tempdir().expect("can create temporary directory");
        let plan = LaunchPlan {
            services: vec![
                shell_spec("ok", "exit 0", temp.path()),
                shell_spec("broken", "exit 3", temp.path()),
            ],
        };

        let report = supervise(&plan, std::future::pending(), DEFAULT_SHUTDOWN_GRACE).await;

        assert_eq!(report.outcome, SupervisorOutcome::ChildrenExited);
        assert_eq!(report.children.len(), 2);
        let failed: Vec<_> = report.failed_children().map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["broken"]);
        let broken = report
            .children
            .iter()
            .find(|c| c.name == "broken")
            .expect("broken child reported");
        assert_eq!(broken.status, "exit 3");
    }

    #[tokio::test]
    async fn shutdown_forwards_sigterm_to_children() {
        let temp = tempdir().expect("can create temporary directory");
        let plan = LaunchPlan {
            services: vec![shell_spec("sleeper", "exec sleep 30", temp.path())],
        };

        let report = supervise(
            &plan,
            tokio::time::sleep(Duration::from_millis(200)),
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(report.outcome, SupervisorOutcome::Shutdown);
        assert_eq!(report.children.len(), 1);
        assert_eq!(report.children[0].status, format!("signal {}", libc::SIGTERM));
    }

    #[tokio::test]
    async fn missing_program_is_reported_not_fatal() {
        let temp = tempdir().expect("can create temporary directory");
        let mut missing = shell_spec("ghost", "", temp.path());
        missing.program = "/nonexistent/mcp-server".into();
        missing.args.clear();
        let plan = LaunchPlan {
            services: vec![missing, shell_spec("ok", "exit 0", temp.path())],
        };

        let report = supervise(&plan, std::future::pending(), DEFAULT_SHUTDOWN_GRACE).await;

        assert_eq!(report.outcome, SupervisorOutcome::ChildrenExited);
        let ghost = report
            .children
            .iter()
            .find(|c| c.name == "ghost")
            .expect("ghost reported");
        assert!(!ghost.success);
        assert!(ghost.status.starts_with("spawn failed"), "{}", ghost.status);
    }
}
