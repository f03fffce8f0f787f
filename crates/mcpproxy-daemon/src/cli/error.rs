//! CLI-facing error type and the `Request ID` reporting 
//! requires: "the CLI prints `Request ID: <id>` and `Run 'mcpproxy logs
//! --request-id <id>' to see detailed logs` on non-zero exit".

use mcpproxy_core::error::ProxyError;
use mcpproxy_transport::DialerError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// The daemon's own `{error, message, request_id}` wire body
    /// (`mcpproxy_api::error::ApiError`), surfaced from a non-2xx
    /// response to a CLI command that dials a running daemon.
    #[error("{message}")]
    Remote { message: String, request_id: Option<String> },

    #[error("could not reach daemon: {0}")]
    Dial(#[from] DialerError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Remote/dial/io failures that never reach a `ProxyError` exit 1,
    /// matching the generic case.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Proxy(e) => e.exit_code(),
            Self::Remote {.. } | Self::Dial(_) | Self::Io(_) => 1,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Remote { request_id,.. } => request_id.as_deref(),
            _ => None,
        }
    }

    /// Builds a `Remote` error from a decoded error body, if it looks
    /// like one; otherwise falls back to a generic message.
    pub fn from_error_body(body: &serde_json::Value) -> Self {
        let message = body.get("message").and_then(serde_json::Value::as_str).unwrap_or("request failed").to_string();
        let request_id = body.get("request_id").and_then(serde_json::Value::as_str).map(str::to_string);
        Self::Remote { message, request_id }
    }
}

pub fn report(error: &CliError) {
    eprintln!("error: {error}");
    if let Some(id) = error.request_id() {
        eprintln!("Request ID: {id}");
        eprintln!("Run 'mcpproxy logs --request-id {id}' to see detailed logs");
    }
}
