//! Builds the right [`UpstreamConnection`] for a configured
//! [`UpstreamServer`] and wraps it with the call-level conveniences the
//! managed layer in `mcpproxy-supervisor` needs: a fresh-token hook for
//! Authorization headers and a bounded `call_tool` timeout
pub mod client;
pub mod connect;

pub use client::{Client, ClientError};
pub use connect::build_connection;
