//! Per-upstream lifecycle actors and the `Supervisor` that owns them.
//! This crate is the managed + façade tiers of the three-layer upstream
//! client architecture: `mcpproxy-client` is
//! the core transport-agnostic I/O layer; [`actor::UpstreamActor`] owns
//! one upstream's mutable runtime state end to end (connect, backoff,
//! OAuth, tool discovery); [`supervisor::Supervisor`] is the façade
//! `mcpproxy-server` and `mcpproxy-api` dispatch through.

pub mod actor;
pub mod events;
pub mod managed;
pub mod supervisor;
pub mod token_store;

pub use actor::UpstreamActor;
pub use events::{EventBus, ServerStateEvent, StatusSummary, ToolIndexUpdateEvent};
pub use managed::{ActorCommand, ActorHandle};
pub use supervisor::Supervisor;
pub use token_store::StorageTokenStore;
