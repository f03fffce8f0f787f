//! Append-only activity log: entries are keyed by a
//! monotonically increasing `(timestamp_millis, seq)` composite so
//! `QueryActivity` can page forward in true append order even when two
//! records land in the same millisecond.

use crate::error::StorageError;
use mcpproxy_core::activity::{ActivityFilter, ActivityRecord};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque pagination cursor: the composite key of the last record
/// returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityCursor(u128);

impl ActivityCursor {
    pub fn encode(self) -> String {
        self.0.to_string()
    }

    pub fn parse(s: &str) -> Option<Self> {
        s.parse().ok().map(ActivityCursor)
    }
}

pub struct ActivityLog {
    tree: sled::Tree,
    seq: AtomicU64,
}

fn composite_key(millis: u128, seq: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&(millis as u64).to_be_bytes());
    key[8..].copy_from_slice(&seq.to_be_bytes());
    key
}

impl ActivityLog {
    pub(crate) fn new(tree: sled::Tree) -> Self {
        Self { tree, seq: AtomicU64::new(0) }
    }

    /// Appends a record, assigning its `id` from the composite ordering
    /// key so callers can treat `id` as an opaque, time-ordered handle.
    pub fn append(&self, mut record: ActivityRecord) -> Result<ActivityRecord, StorageError> {
        let millis = record
            .timestamp
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let key = composite_key(millis, seq);
        let id = u64::from_be_bytes(key[..8].try_into().expect("8 bytes")) ^ seq;
        record.id = id;

        let bytes = serde_json::to_vec(&record)?;
        self.tree.insert(key, bytes)?;
        self.tree.flush()?;
        Ok(record)
    }

    /// Returns up to `limit` records matching `filter`, scanning in
    /// append order starting after `cursor` (or from the beginning when
    /// `cursor` is `None`), plus the cursor to resume from if more
    /// records remain.
    pub fn query(
        &self,
        filter: &ActivityFilter,
        limit: usize,
        cursor: Option<ActivityCursor>,
    ) -> Result<(Vec<ActivityRecord>, Option<ActivityCursor>), StorageError> {
        let mut matched = Vec::new();
        let mut next_cursor = None;

        let start = cursor.map(|c| c.0.to_be_bytes());
        let iter = match &start {
            Some(bytes) => self.tree.range((std::ops::Bound::Excluded(bytes.as_slice()), std::ops::Bound::Unbounded)),
            None => self.tree.range(..),
        };

        for entry in iter {
            let (key, value) = entry?;
            let record: ActivityRecord = serde_json::from_slice(&value)?;
            if filter.matches(&record) {
                if matched.len() == limit {
                    let mut key_bytes = [0u8; 16];
                    key_bytes.copy_from_slice(&key);
                    next_cursor = Some(ActivityCursor(u128::from_be_bytes(key_bytes)));
                    break;
                }
                matched.push(record);
            }
        }
        Ok((matched, next_cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpproxy_core::activity::{ActivityStatus, ActivityType};

    fn log() -> ActivityLog {
        let db = sled::Config::new().temporary(true).open().unwrap();
        ActivityLog::new(db.open_tree("activity").unwrap())
    }

    fn record(tool: &str) -> ActivityRecord {
        ActivityRecord {
            id: 0,
            timestamp: SystemTime::now(),
            kind: ActivityType::ToolCall,
            server_name: Some("github".into()),
            tool_name: Some(tool.into()),
            status: ActivityStatus::Success,
            duration_ms: 10,
            mcp_session_id: None,
            mcp_client_name: None,
            mcp_client_version: None,
            parent_call_id: None,
            request_id: "req-1".into(),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn append_assigns_increasing_ids() {
        let log = log();
        let a = log.append(record("list_repos")).unwrap();
        let b = log.append(record("delete_repo")).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn query_respects_filter_and_limit() {
        let log = log();
        for i in 0..5 {
            log.append(record(&format!("tool-{i}"))).unwrap();
        }
        let (page, cursor) = log.query(&ActivityFilter::default(), 2, None).unwrap();
        assert_eq!(page.len(), 2);
        assert!(cursor.is_some());

        let (rest, next) = log.query(&ActivityFilter::default(), 10, cursor).unwrap();
        assert_eq!(rest.len(), 3);
        assert!(next.is_none());
    }

    #[test]
    fn query_filters_by_tool_name() {
        let log = log();
        log.append(record("read_file")).unwrap();
        log.append(record("delete_repo")).unwrap();
        let filter = ActivityFilter { tool_name: Some("delete_repo".into()),..Default::default() };
        let (page, _) = log.query(&filter, 10, None).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].tool_name.as_deref(), Some("delete_repo"));
    }
}
