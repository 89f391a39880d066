// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory key-value backend.
//
// A `BTreeMap` behind a tokio `RwLock`; the ordering makes prefix scans
// (one collection at a time) a range walk. Used by tests and by the API
// binary when no external store is wired in.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::StorageBackend;
use crate::error::StorageError;

/// An in-memory storage backend backed by a sorted `BTreeMap`.
///
/// Clones share the same underlying map.
///
/// # Example
///
/// ```rust
/// use gatehouse_storage::memory::InMemoryBackend;
/// use gatehouse_storage::backend::StorageBackend;
///
/// # tokio_test::block_on(async {
/// let backend = InMemoryBackend::new();
/// backend.put(b"roles:r1", b"{}").await.unwrap();
/// assert_eq!(backend.get(b"roles:r1").await.unwrap(), Some(b"{}".to_vec()));
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryBackend {
    /// Create a new, empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the number of keys currently stored.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Return true if the store contains no keys.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let map = self.data.read().await;
        Ok(map.get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut map = self.data.write().await;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, StorageError> {
        let mut map = self.data.write().await;
        Ok(map.remove(key).is_some())
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let map = self.data.read().await;
        let results = map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(results)
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let backend = InMemoryBackend::new();
        assert!(backend.is_empty().await);
        assert_eq!(backend.get(b"users:u1").await.unwrap(), None);

        backend.put(b"users:u1", b"one").await.unwrap();
        backend.put(b"users:u1", b"two").await.unwrap();
        assert_eq!(backend.get(b"users:u1").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(backend.len().await, 1);

        assert!(backend.delete(b"users:u1").await.unwrap());
        assert!(!backend.delete(b"users:u1").await.unwrap());
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_scan_prefix_stays_inside_collection() {
        let backend = InMemoryBackend::new();
        backend.put(b"roles:a", b"1").await.unwrap();
        backend.put(b"roles:b", b"2").await.unwrap();
        backend.put(b"records:a", b"3").await.unwrap();
        backend.put(b"rolesx:a", b"4").await.unwrap();

        let roles = backend.scan_prefix(b"roles:", usize::MAX).await.unwrap();
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].0, b"roles:a".to_vec());
        assert_eq!(roles[1].0, b"roles:b".to_vec());

        let limited = backend.scan_prefix(b"roles:", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let backend = InMemoryBackend::new();
        let clone = backend.clone();

        backend.put(b"shared", b"data").await.unwrap();
        assert_eq!(clone.get(b"shared").await.unwrap(), Some(b"data".to_vec()));
        assert_eq!(clone.name(), "in-memory");
    }
}
