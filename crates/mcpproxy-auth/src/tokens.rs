//! Token storage abstraction. `mcpproxy-supervisor` wires a real
//! implementation backed by `mcpproxy-storage`; tests use the in-memory
//! one below.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenSet {
    pub fn is_expired(&self, skew: chrono::Duration) -> bool {
        Utc::now() + skew >= self.expires_at
    }

    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self, server_name: &str) -> Result<Option<TokenSet>, TokenStoreError>;
    async fn save(&self, server_name: &str, tokens: &TokenSet) -> Result<(), TokenStoreError>;
    async fn clear(&self, server_name: &str) -> Result<(), TokenStoreError>;
}

/// In-process token store, used by tests and as a scaffold before the
/// persistent `mcpproxy-storage` wiring lands.
#[derive(Default)]
pub struct InMemoryTokenStore {
    inner: Mutex<HashMap<String, TokenSet>>,
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self, server_name: &str) -> Result<Option<TokenSet>, TokenStoreError> {
        Ok(self.inner.lock().expect("token store mutex poisoned").get(server_name).cloned())
    }

    async fn save(&self, server_name: &str, tokens: &TokenSet) -> Result<(), TokenStoreError> {
        self.inner
            .lock()
            .expect("token store mutex poisoned")
            .insert(server_name.to_string(), tokens.clone());
        Ok(())
    }

    async fn clear(&self, server_name: &str) -> Result<(), TokenStoreError> {
        self.inner.lock().expect("token store mutex poisoned").remove(server_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_honors_skew() {
        let tokens = TokenSet {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: Utc::now() + chrono::Duration::seconds(30),
            token_type: "Bearer".to_string(),
        };
        assert!(!tokens.is_expired(chrono::Duration::seconds(5)));
        assert!(tokens.is_expired(chrono::Duration::seconds(60)));
    }

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryTokenStore::default();
        assert!(store.load("srv").await.unwrap().is_none());

        let tokens = TokenSet {
            access_token: "t".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            token_type: "Bearer".to_string(),
        };
        store.save("srv", &tokens).await.unwrap();
        assert_eq!(store.load("srv").await.unwrap().unwrap().access_token, "t");

        store.clear("srv").await.unwrap();
        assert!(store.load("srv").await.unwrap().is_none());
    }
}
