//! Wire types for the Model Context Protocol subset mcpproxy speaks to
//! upstreams and exposes to downstream agents.
//! This crate mirrors MCP 2025-06-18 framing: JSON-RPC 2.0 envelopes
//! (`jsonrpc`), the tool catalogue types (`tools`), and the handful of
//! notifications mcpproxy actually subscribes to (`notifications`).

pub mod error;
pub mod jsonrpc;
pub mod notifications;
pub mod tools;

pub use error::{Error, ErrorKind};
pub use jsonrpc::{Request, RequestId, Response};
pub use tools::{Tool, ToolAnnotations, ToolInputSchema};

/// MCP protocol version this crate frames against.
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";
