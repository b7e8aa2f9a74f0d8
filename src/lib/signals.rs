//! Operator shutdown signals.

use std::{future::Future, io};

use tracing::{info, warn};

/// Resolve on Ctrl-C or SIGTERM, whichever arrives first.
pub async fn shutdown_signal() {
    let mut terminate =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(stream) => Some(stream),
            Err(err) => {
                warn!(
                    target: "mcp_swarm::runtime",
                    error = %err,
                    "Failed to install SIGTERM handler; only Ctrl-C will stop the process"
                );
                None
            }
        };

    let terminated = async {
        match terminate.as_mut() {
            Some(stream) => {
                stream.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = interrupted(tokio::signal::ctrl_c()) => {
            info!(target: "mcp_swarm::runtime", signal = "SIGINT", "Shutdown requested");
        }
        _ = terminated => {
            info!(target: "mcp_swarm::runtime", signal = "SIGTERM", "Shutdown requested");
        }
    }
}

/// Resolve when `ctrl_c` reports a real Ctrl-C. A handler that failed to
/// install never resolves, leaving SIGTERM as the only way out.
async fn interrupted<F>(ctrl_c: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(err) = ctrl_c.await {
        warn!(
            target: "mcp_swarm::runtime",
            error = %err,
            "Failed to install Ctrl-C handler; only SIGTERM will stop the process"
        );
        std::future::pending::<()>().await;
    }
}
