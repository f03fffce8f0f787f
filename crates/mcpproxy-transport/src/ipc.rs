//! Local IPC transport selection: parses one of
//! `unix://<path>`, `npipe:////./pipe/<name>`, or `http(s)://host:port`
//! and returns a dialer plus a base URL for the HTTP client layered on
//! top of it.

use std::path::PathBuf;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("unrecognized endpoint scheme: {0}")]
    UnknownScheme(String),
    #[error("malformed endpoint: {0}")]
    Malformed(String),
}

/// A parsed local transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcEndpoint {
    Unix { path: PathBuf },
    NamedPipe { name: String },
    Tcp { host: String, port: u16 },
}

impl IpcEndpoint {
    pub fn parse(endpoint: &str) -> Result<Self, IpcError> {
        if let Some(rest) = endpoint.strip_prefix("unix://") {
            if rest.is_empty() {
                return Err(IpcError::Malformed(endpoint.to_string()));
            }
            return Ok(Self::Unix { path: PathBuf::from(rest) });
        }
        if let Some(rest) = endpoint.strip_prefix("npipe://") {
            let name = rest.trim_start_matches('/').trim_start_matches("./pipe/");
            if name.is_empty() {
                return Err(IpcError::Malformed(endpoint.to_string()));
            }
            return Ok(Self::NamedPipe { name: name.to_string() });
        }
        if let Some(rest) = endpoint.strip_prefix("http://").or_else(|| endpoint.strip_prefix("https://")) {
            let (host, port) = rest
                .split_once(':')
                .ok_or_else(|| IpcError::Malformed(endpoint.to_string()))?;
            let port: u16 = port
                .trim_end_matches('/')
                .parse()
                .map_err(|_| IpcError::Malformed(endpoint.to_string()))?;
            return Ok(Self::Tcp { host: host.to_string(), port });
        }
        Err(IpcError::UnknownScheme(endpoint.to_string()))
    }

    /// Socket/pipe connections are implicitly trusted: the daemon
    /// disables API-key enforcement on them.
    pub fn is_trusted(&self) -> bool {
        !matches!(self, Self::Tcp {.. })
    }

    /// Base URL the HTTP client should address requests to, regardless
    /// of the underlying socket/pipe/TCP transport.
    pub fn base_url(&self) -> String {
        match self {
            Self::Unix {.. } | Self::NamedPipe {.. } => "http://localhost".to_string(),
            Self::Tcp { host, port } => format!("http://{host}:{port}"),
        }
    }
}

/// Issues one HTTP request over whichever transport `endpoint` names.
/// Used by CLI commands that talk to an already-running daemon rather
/// than reimplementing transport selection in every command.
#[derive(Debug, Clone)]
pub struct Dialer {
    endpoint: IpcEndpoint,
    api_key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DialerError {
    #[error(transparent)]
    Endpoint(#[from] IpcError),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("response was not valid JSON: {0}")]
    InvalidResponse(String),
    #[error("named pipe dialing is only implemented on Windows")]
    NamedPipeUnsupported,
}

impl Dialer {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, DialerError> {
        Ok(Self { endpoint: IpcEndpoint::parse(endpoint)?, api_key })
    }

    pub fn is_trusted(&self) -> bool {
        self.endpoint.is_trusted()
    }

    /// Performs `method path` against the dialed transport and decodes
    /// the JSON body. `body`, if present, is sent as the JSON request
    /// body with `Content-Type: application/json`.
    pub async fn request(&self, method: &str, path: &str, body: Option<Value>) -> Result<Value, DialerError> {
        match &self.endpoint {
            IpcEndpoint::Tcp {.. } => self.request_tcp(method, path, body).await,
            #[cfg(unix)]
            IpcEndpoint::Unix { path: sock } => self.request_unix(sock, method, path, body).await,
            #[cfg(not(unix))]
            IpcEndpoint::Unix {.. } => Err(DialerError::Connect("unix sockets are only implemented on Unix".to_string())),
            IpcEndpoint::NamedPipe {.. } => Err(DialerError::NamedPipeUnsupported),
        }
    }

    async fn request_tcp(&self, method: &str, path: &str, body: Option<Value>) -> Result<Value, DialerError> {
        let client = reqwest::Client::new();
        let url = format!("{}{}", self.endpoint.base_url(), path);
        let mut builder = client.request(
            method.parse().map_err(|e: reqwest::Method| DialerError::Request(format!("{e}")))?,
            url,
        );
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let resp = builder.send().await.map_err(|e| DialerError::Request(e.to_string()))?;
        resp.json().await.map_err(|e| DialerError::InvalidResponse(e.to_string()))
    }

    #[cfg(unix)]
    async fn request_unix(&self, sock: &std::path::Path, method: &str, path: &str, body: Option<Value>) -> Result<Value, DialerError> {
        use bytes::Bytes;
        use http_body_util::{BodyExt, Full};
        use hyper::Request as HyperRequest;
        use hyper_util::rt::TokioIo;
        use tokio::net::UnixStream;

        let stream = UnixStream::connect(sock).await.map_err(|e| DialerError::Connect(e.to_string()))?;
        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| DialerError::Connect(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "unix socket connection closed");
            }
        });

        let body_bytes = match &body {
            Some(v) => serde_json::to_vec(v).map_err(|e| DialerError::Request(e.to_string()))?,
            None => Vec::new(),
        };
        let mut builder = HyperRequest::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost")
            .header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }
        let request = builder
            .body(Full::new(Bytes::from(body_bytes)))
            .map_err(|e| DialerError::Request(e.to_string()))?;

        let response = sender.send_request(request).await.map_err(|e| DialerError::Request(e.to_string()))?;
        let collected = response.into_body().collect().await.map_err(|e| DialerError::Request(e.to_string()))?;
        let bytes = collected.to_bytes();
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| DialerError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_socket() {
        let ep = IpcEndpoint::parse("unix:///tmp/mcpproxy.sock").unwrap();
        assert_eq!(ep, IpcEndpoint::Unix { path: PathBuf::from("/tmp/mcpproxy.sock") });
        assert!(ep.is_trusted());
        assert_eq!(ep.base_url(), "http://localhost");
    }

    #[test]
    fn parses_named_pipe() {
        let ep = IpcEndpoint::parse("npipe:////./pipe/mcpproxy").unwrap();
        assert_eq!(ep, IpcEndpoint::NamedPipe { name: "mcpproxy".to_string() });
        assert!(ep.is_trusted());
    }

    #[test]
    fn parses_loopback_tcp_as_untrusted() {
        let ep = IpcEndpoint::parse("http://127.0.0.1:8080").unwrap();
        assert_eq!(
            ep,
            IpcEndpoint::Tcp { host: "127.0.0.1".to_string(), port: 8080 }
        );
        assert!(!ep.is_trusted());
        assert_eq!(ep.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(matches!(IpcEndpoint::parse("ftp://x"), Err(IpcError::UnknownScheme(_))));
    }

    #[tokio::test]
    async fn dialer_rejects_named_pipe_on_non_windows() {
        let dialer = Dialer::new("npipe:////./pipe/mcpproxy", None).unwrap();
        assert!(dialer.is_trusted());
        let err = dialer.request("GET", "/ready", None).await.unwrap_err();
        assert!(matches!(err, DialerError::NamedPipeUnsupported));
    }

    #[tokio::test]
    async fn dialer_over_unix_socket_round_trips_json() {
        use tokio::net::UnixListener;

        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("mcpproxy.sock");
        let listener = UnixListener::bind(&sock_path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let io = hyper_util::rt::TokioIo::new(stream);
            let service = hyper::service::service_fn(|_req: hyper::Request<hyper::body::Incoming>| async move {
                Ok::<_, std::convert::Infallible>(hyper::Response::new(http_body_util::Full::new(bytes::Bytes::from(
                    r#"{"ok":true}"#,
                ))))
            });
            hyper::server::conn::http1::Builder::new()
                .serve_connection(io, service)
                .await
                .unwrap();
        });

        let dialer = Dialer::new(&format!("unix://{}", sock_path.display()), None).unwrap();
        let response = dialer.request("GET", "/ready", None).await.unwrap();
        assert_eq!(response, serde_json::json!({"ok": true}));

        server.abort();
    }
}
