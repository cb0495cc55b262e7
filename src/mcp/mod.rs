//! Model Context Protocol server.
//!
//! Exposes a single tool, `run_flake_tests`, over newline-delimited JSON-RPC
//! on standard input/output. Logs go to standard error so the protocol
//! stream stays clean.

mod protocol;
mod server;
mod tools;

pub use protocol::{
    negotiate_protocol_version, CallToolResult, Content, Response, RpcError, ToolDefinition,
    SUPPORTED_PROTOCOL_VERSIONS,
};
pub use server::McpServer;
pub use tools::{resolve_directory, FlakeTestParams, FlakeTool, TOOL_NAME};

/// Name advertised in `serverInfo`.
pub const SERVER_NAME: &str = "flake";

/// Version advertised in `serverInfo`.
pub const SERVER_VERSION: &str = "1.0.0";
