//! Opaque bucketed key-value storage: `Get/Put/Delete`
//! are atomic single-key operations against a named sled tree; `List`
//! scans a prefix within one bucket.

use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A named partition of the key-value space. Each bucket is backed by
/// its own sled tree so prefix scans never cross bucket boundaries.
pub struct Bucket {
    tree: sled::Tree,
}

impl Bucket {
    pub(crate) fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value)?;
        self.tree.insert(key.as_bytes(), bytes)?;
        self.tree.flush()?;
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.tree.remove(key.as_bytes())?;
        self.tree.flush()?;
        Ok(())
    }

    /// Lists every value whose key starts with `prefix`, in key order.
    pub fn list<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<(String, T)>, StorageError> {
        let mut results = Vec::new();
        for entry in self.tree.scan_prefix(prefix.as_bytes()) {
            let (key, value) = entry?;
            let key = String::from_utf8_lossy(&key).into_owned();
            let value = serde_json::from_slice(&value)?;
            results.push((key, value));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Widget {
        count: u32,
    }

    fn bucket() -> Bucket {
        let db = sled::Config::new().temporary(true).open().unwrap();
        Bucket::new(db.open_tree("widgets").unwrap())
    }

    #[test]
    fn put_then_get_round_trips() {
        let b = bucket();
        b.put("a", &Widget { count: 1 }).unwrap();
        assert_eq!(b.get::<Widget>("a").unwrap(), Some(Widget { count: 1 }));
        assert_eq!(b.get::<Widget>("missing").unwrap(), None);
    }

    #[test]
    fn delete_removes_key() {
        let b = bucket();
        b.put("a", &Widget { count: 1 }).unwrap();
        b.delete("a").unwrap();
        assert_eq!(b.get::<Widget>("a").unwrap(), None);
    }

    #[test]
    fn list_scans_prefix_in_order() {
        let b = bucket();
        b.put("server/github", &Widget { count: 1 }).unwrap();
        b.put("server/gitlab", &Widget { count: 2 }).unwrap();
        b.put("other/x", &Widget { count: 3 }).unwrap();

        let results: Vec<(String, Widget)> = b.list("server/").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "server/github");
        assert_eq!(results[1].0, "server/gitlab");
    }
}
