//! JSON-RPC error object and the protocol-level error kinds mcpproxy needs
//! to preserve verbatim when forwarding an upstream's error to a
//! downstream agent.

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Coarse classification of a protocol-level failure. Kept small and
/// stable because `ErrorKind` round-trips through dispatch: a user
/// rejection from an upstream must still look like a user rejection to
/// the downstream agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorKind {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    #[default]
    Internal,
    Transport,
    Timeout,
    UserRejected,
}

impl ErrorKind {
    fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::Internal => -32603,
            Self::Transport => -32000,
            Self::Timeout => -32001,
            Self::UserRejected => -1,
        }
    }
}

/// A JSON-RPC error object, also used internally as mcpproxy's
/// protocol-tier error type.
#[derive(Debug, Clone, ThisError, Serialize, Deserialize)]
#[error("{message}")]
pub struct Error {
    pub code: i64,
    pub message: String,
    #[serde(skip)]
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Error {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: kind.code(),
            message: message.into(),
            kind,
            data: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn user_rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UserRejected, message)
    }

    pub fn method_not_found(method: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::MethodNotFound, format!("method not found: {method}"))
    }
}
