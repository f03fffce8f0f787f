//! Embedded storage: an opaque bucketed key-value
//! store plus a dedicated append-only activity log, both backed by one
//! sled database at `~/.mcpproxy/config.db`.

pub mod activity;
pub mod error;
pub mod kv;

pub use activity::{ActivityCursor, ActivityLog};
pub use error::StorageError;
pub use kv::Bucket;

use std::path::Path;

/// Opens (or creates) the on-disk database. A corrupted or lock-held
/// database surfaces as [`StorageError::Corrupt`], which callers map to
/// exit code 3.
pub struct Database {
    db: sled::Db,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref())?;
        Ok(Self { db })
    }

    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    pub fn bucket(&self, name: &str) -> Result<Bucket, StorageError> {
        Ok(Bucket::new(self.db.open_tree(name)?))
    }

    pub fn activity_log(&self) -> Result<ActivityLog, StorageError> {
        Ok(ActivityLog::new(self.db.open_tree("activity")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_distinct_buckets_from_one_database() {
        let db = Database::temporary().unwrap();
        let servers = db.bucket("servers").unwrap();
        let tokens = db.bucket("oauth_tokens").unwrap();
        servers.put("github", &serde_json::json!({"enabled": true})).unwrap();
        assert!(servers.get::<serde_json::Value>("github").unwrap().is_some());
        assert!(tokens.get::<serde_json::Value>("github").unwrap().is_none());
    }

    #[test]
    fn activity_log_is_independent_of_buckets() {
        let db = Database::temporary().unwrap();
        let log = db.activity_log().unwrap();
        let record = mcpproxy_core::activity::ActivityRecord {
            id: 0,
            timestamp: std::time::SystemTime::now(),
            kind: mcpproxy_core::activity::ActivityType::ServerChange,
            server_name: Some("github".into()),
            tool_name: None,
            status: mcpproxy_core::activity::ActivityStatus::Success,
            duration_ms: 0,
            mcp_session_id: None,
            mcp_client_name: None,
            mcp_client_version: None,
            parent_call_id: None,
            request_id: "req-1".into(),
            metadata: serde_json::json!({}),
        };
        log.append(record).unwrap();
        let (page, _) = log.query(&mcpproxy_core::activity::ActivityFilter::default(), 10, None).unwrap();
        assert_eq!(page.len(), 1);
    }
}
