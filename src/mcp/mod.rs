//! Model Context Protocol (MCP) request handling and JSON-RPC implementations
//!
//! Provides protocol-level specifics surrounding JSON-RPC framing, negotiation, formatting, and routing.

pub mod rpc;
pub mod server;
