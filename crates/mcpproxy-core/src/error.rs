//! The aggregate error type every mcpproxy layer converts into: a tiered
//! error hierarchy generalized to the six kinds names:
//! validation, not-found, auth, upstream, infrastructure, internal.

use thiserror::Error;

pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

/// The stable `snake_case_code` strings, used as the
/// `error` field of every error response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MissingIntent,
    MissingOperationType,
    InvalidOperationType,
    IntentMismatch,
    ServerMismatch,
    InvalidSensitivity,
    ReasonTooLong,
    InvalidArgument,
    ServerNotFound,
    ToolNotFound,
    EndpointNotFound,
    Unauthenticated,
    Forbidden,
    NeedsLogin,
    UpstreamError,
    UpstreamTimeout,
    PortConflict,
    DbLocked,
    DockerUnavailable,
    ConfigError,
    PermissionDenied,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingIntent => "missing_intent",
            Self::MissingOperationType => "missing_operation_type",
            Self::InvalidOperationType => "invalid_operation_type",
            Self::IntentMismatch => "intent_mismatch",
            Self::ServerMismatch => "server_mismatch",
            Self::InvalidSensitivity => "invalid_sensitivity",
            Self::ReasonTooLong => "reason_too_long",
            Self::InvalidArgument => "invalid_argument",
            Self::ServerNotFound => "server_not_found",
            Self::ToolNotFound => "tool_not_found",
            Self::EndpointNotFound => "endpoint_not_found",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::NeedsLogin => "needs_login",
            Self::UpstreamError => "upstream_error",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::PortConflict => "port_conflict",
            Self::DbLocked => "db_locked",
            Self::DockerUnavailable => "docker_unavailable",
            Self::ConfigError => "config_error",
            Self::PermissionDenied => "permission_denied",
            Self::InternalError => "internal_error",
        }
    }

    /// HTTP status this code maps to, 
    pub fn http_status(self) -> u16 {
        match self {
            Self::MissingIntent
            | Self::MissingOperationType
            | Self::InvalidOperationType
            | Self::IntentMismatch
            | Self::ServerMismatch
            | Self::InvalidSensitivity
            | Self::ReasonTooLong
            | Self::InvalidArgument => 400,
            Self::ServerNotFound | Self::ToolNotFound | Self::EndpointNotFound => 404,
            Self::Unauthenticated => 401,
            Self::Forbidden => 403,
            Self::NeedsLogin => 409,
            Self::UpstreamError | Self::UpstreamTimeout => 502,
            Self::PortConflict | Self::DbLocked | Self::DockerUnavailable | Self::ConfigError => 500,
            Self::PermissionDenied => 403,
            Self::InternalError => 500,
        }
    }
}

/// The aggregate error. Validation errors are local and terminal; upstream
/// errors are forwarded from a managed upstream; infrastructure errors map
/// onto core process exit codes and tray states
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{code}: {message}")]
    Validation { code: ErrorCode, message: String },

    #[error("{code}: {message}")]
    NotFound { code: ErrorCode, message: String },

    #[error("{code}: {message}")]
    Auth { code: ErrorCode, message: String },

    #[error("upstream '{server}': {message}")]
    Upstream {
        code: ErrorCode,
        server: String,
        message: String,
    },

    #[error("{code}: {message}")]
    Infrastructure { code: ErrorCode, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code,.. }
            | Self::NotFound { code,.. }
            | Self::Auth { code,.. }
            | Self::Upstream { code,.. }
            | Self::Infrastructure { code,.. } => *code,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn validation(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn server_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::NotFound {
            code: ErrorCode::ServerNotFound,
            message: format!("no such upstream server: {name}"),
        }
    }

    pub fn tool_not_found(qualified_name: impl Into<String>) -> Self {
        let qn = qualified_name.into();
        Self::NotFound {
            code: ErrorCode::ToolNotFound,
            message: format!("no such tool: {qn}"),
        }
    }

    pub fn auth_error(message: impl Into<String>) -> Self {
        Self::Auth {
            code: ErrorCode::Unauthenticated,
            message: message.into(),
        }
    }

    pub fn upstream(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            code: ErrorCode::UpstreamError,
            server: server.into(),
            message: message.into(),
        }
    }

    pub fn upstream_timeout(server: impl Into<String>) -> Self {
        Self::Upstream {
            code: ErrorCode::UpstreamTimeout,
            server: server.into(),
            message: "timed out waiting for upstream".to_string(),
        }
    }

    pub fn infrastructure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Infrastructure {
            code,
            message: message.into(),
        }
    }

    /// Maps infrastructure errors onto the process exit codes from
    ///: 0 ok, 2 port conflict, 3 db locked, 4 config
    /// invalid, 5 permission denied, 1 generic.
    pub fn exit_code(&self) -> i32 {
        match self.code() {
            ErrorCode::PortConflict => 2,
            ErrorCode::DbLocked => 3,
            ErrorCode::ConfigError => 4,
            ErrorCode::PermissionDenied => 5,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_http_status() {
        assert_eq!(ErrorCode::ServerMismatch.http_status(), 400);
        assert_eq!(ErrorCode::ServerNotFound.http_status(), 404);
        assert_eq!(ErrorCode::Unauthenticated.http_status(), 401);
    }

    #[test]
    fn infrastructure_errors_map_to_exit_codes() {
        let err = ProxyError::infrastructure(ErrorCode::DbLocked, "db locked");
        assert_eq!(err.exit_code(), 3);
        let err = ProxyError::infrastructure(ErrorCode::PortConflict, "port busy");
        assert_eq!(err.exit_code(), 2);
        let err = ProxyError::infrastructure(ErrorCode::PermissionDenied, "cannot bind socket");
        assert_eq!(err.exit_code(), 5);
    }
}
