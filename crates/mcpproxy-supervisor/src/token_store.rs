//! Persistent OAuth token storage: adapts [`mcpproxy_storage::Bucket`] to
//! the `mcpproxy-auth` [`TokenStore`] trait so token state survives a
//! daemon restart, living in the `oauth_tokens` bucket of the shared
//! `config.db`.
//! This glue lives here rather than in `mcpproxy-storage` (which knows
//! nothing about OAuth) or `mcpproxy-auth` (which knows nothing about
//! sled) because `mcpproxy-supervisor` is the first crate in the
//! dependency order that depends on both.

use async_trait::async_trait;
use mcpproxy_auth::tokens::{TokenSet, TokenStore, TokenStoreError};
use mcpproxy_storage::Bucket;

pub struct StorageTokenStore {
    bucket: Bucket,
}

impl StorageTokenStore {
    pub fn new(bucket: Bucket) -> Self {
        Self { bucket }
    }
}

#[async_trait]
impl TokenStore for StorageTokenStore {
    async fn load(&self, server_name: &str) -> Result<Option<TokenSet>, TokenStoreError> {
        self.bucket
            .get(server_name)
            .map_err(|e| TokenStoreError::Backend(e.to_string()))
    }

    async fn save(&self, server_name: &str, tokens: &TokenSet) -> Result<(), TokenStoreError> {
        self.bucket
            .put(server_name, tokens)
            .map_err(|e| TokenStoreError::Backend(e.to_string()))
    }

    async fn clear(&self, server_name: &str) -> Result<(), TokenStoreError> {
        self.bucket
            .delete(server_name)
            .map_err(|e| TokenStoreError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mcpproxy_storage::Database;

    fn store() -> StorageTokenStore {
        let db = Database::temporary().unwrap();
        StorageTokenStore::new(db.bucket("oauth_tokens").unwrap())
    }

    #[tokio::test]
    async fn round_trips_through_sled() {
        let store = store();
        assert!(store.load("github").await.unwrap().is_none());

        let tokens = TokenSet {
            access_token: "a".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            token_type: "Bearer".to_string(),
        };
        store.save("github", &tokens).await.unwrap();
        assert_eq!(store.load("github").await.unwrap().unwrap().access_token, "a");

        store.clear("github").await.unwrap();
        assert!(store.load("github").await.unwrap().is_none());
    }
}
