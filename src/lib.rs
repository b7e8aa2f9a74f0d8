//! Library crate root: the shared port registry, the MCP server exposing it
//! and the supervisor that launches sibling servers.

#[path = "lib/mod.rs"]
pub mod lib_mod;
pub use lib_mod as lib;
pub mod cli;
pub mod registry;
pub mod server;
pub mod supervisor;
pub mod tools;
