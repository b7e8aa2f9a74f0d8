//! MCP server: configuration loading and the runtime that serves the port tools.

pub mod config;
pub mod runtime;
