//! The core layer of the three-layer upstream client:
//! pure protocol I/O over stdio or HTTP/SSE, plus local IPC dialer
//! selection.
//! Nothing in this crate knows about reconnection, backoff, or OAuth —
//! that's the managed layer in `mcpproxy-supervisor`. This crate only
//! frames JSON-RPC and moves bytes.

pub mod connection;
pub mod http;
pub mod ipc;
pub mod stdio;

pub use connection::{ToolsChangedCallback, UpstreamConnection};
pub use http::StreamableHttpConnection;
pub use ipc::{Dialer, DialerError, IpcEndpoint, IpcError};
pub use stdio::StdioConnection;
