//! Launches the sibling MCP servers listed in `services.toml`.

pub mod launcher;
pub mod services;

pub use launcher::{
    supervise, ChildSummary, LaunchPlan, LaunchSpec, SupervisorOutcome, SupervisorReport,
    DEFAULT_SHUTDOWN_GRACE,
};
pub use services::{ServiceConfig, ServicesConfig};
