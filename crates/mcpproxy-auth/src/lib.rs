//! OAuth 2.1 support for upstream authentication.
//! Drives discovery → (DCR if needed) → authorization-code+PKCE (or
//! device code) → token persistence. The managed layer in
//! `mcpproxy-supervisor` owns *when* to call into this crate; this crate
//! only implements the protocol mechanics.

pub mod dcr;
pub mod discovery;
pub mod flow;
pub mod pkce;
pub mod tokens;

pub use discovery::{AuthorizationServerMetadata, DiscoveryError, DiscoveryFetcher};
pub use flow::{OAuthFlow, OAuthFlowError};
pub use tokens::{TokenSet, TokenStore};
