//! Tool and resource integrations
//!
//! Provides the business logic of the model bridge exposed over the MCP protocol

pub mod resources;
pub mod tools;
pub mod utils;
