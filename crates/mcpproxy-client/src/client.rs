//! Call-level wrapper around an [`UpstreamConnection`]: bounds every
//! round trip with a timeout so one wedged upstream cannot starve the
//! supervisor's actor loop.

use mcpproxy_protocol::Tool;
use mcpproxy_transport::connection::{ConnectionError, ToolsChangedCallback, UpstreamConnection};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

/// Wraps a boxed [`UpstreamConnection`] with a configurable per-call
/// timeout. Cloning shares the underlying connection.
#[derive(Clone)]
pub struct Client {
    connection: Arc<dyn UpstreamConnection>,
    call_timeout: Duration,
}

impl Client {
    pub fn new(connection: Arc<dyn UpstreamConnection>) -> Self {
        Self { connection, call_timeout: DEFAULT_CALL_TIMEOUT }
    }

    pub fn with_timeout(connection: Arc<dyn UpstreamConnection>, call_timeout: Duration) -> Self {
        Self { connection, call_timeout }
    }

    pub async fn initialize(&self, client_name: &str, client_version: &str) -> Result<Value, ClientError> {
        self.bounded(self.connection.initialize(client_name, client_version)).await
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>, ClientError> {
        self.bounded(self.connection.list_tools()).await
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ClientError> {
        self.bounded(self.connection.call_tool(name, arguments)).await
    }

    pub async fn set_on_tools_changed(&self, callback: Arc<dyn ToolsChangedCallback>) {
        self.connection.set_on_tools_changed(callback).await;
    }

    pub async fn close(&self) -> Result<(), ClientError> {
        Ok(self.connection.close().await?)
    }

    async fn bounded<T>(&self, fut: impl std::future::Future<Output = Result<T, ConnectionError>>) -> Result<T, ClientError> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ClientError::Timeout(self.call_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubConnection;

    #[async_trait]
    impl UpstreamConnection for StubConnection {
        async fn initialize(&self, _client_name: &str, _client_version: &str) -> mcpproxy_transport::connection::ConnectionResult<Value> {
            Ok(Value::Null)
        }
        async fn list_tools(&self) -> mcpproxy_transport::connection::ConnectionResult<Vec<Tool>> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(vec![])
        }
        async fn call_tool(&self, _name: &str, _arguments: Value) -> mcpproxy_transport::connection::ConnectionResult<Value> {
            Ok(Value::Null)
        }
        async fn set_on_tools_changed(&self, _callback: Arc<dyn ToolsChangedCallback>) {}
        async fn close(&self) -> mcpproxy_transport::connection::ConnectionResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn call_within_timeout_succeeds() {
        let client = Client::new(Arc::new(StubConnection));
        assert!(client.list_tools().await.is_ok());
    }

    #[tokio::test]
    async fn call_past_timeout_errors() {
        let client = Client::with_timeout(Arc::new(StubConnection), Duration::from_millis(5));
        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)));
    }
}
