//! The built-in downstream tool surface every MCP client sees through
//! mcpproxy: four fixed tools (`crate::builtin`) in place of a raw union
//! of upstream tools, gated by intent validation (`crate::intent`) and
//! routed by `crate::dispatch::Dispatcher`.

pub mod builtin;
pub mod dispatch;
pub mod intent;
pub mod protocol;

pub use dispatch::{CallContext, Dispatcher};
pub use protocol::McpSession;
