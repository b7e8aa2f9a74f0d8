//! Shared library modules providing error types, ledger file primitives, path
//! resolution and telemetry initialization.

pub mod errors;
pub mod fs;
pub mod paths;
pub mod signals;
pub mod telemetry;
