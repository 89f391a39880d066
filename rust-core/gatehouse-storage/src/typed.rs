// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Typed, namespaced view over a `StorageBackend`.
//
// Values are serialized as JSON and keys are prefixed with `"{namespace}:"`,
// so every document collection gets its own key range inside one physical
// backend.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::StorageBackend;
use crate::error::StorageError;

/// A typed wrapper around a [`StorageBackend`] that handles serialization
/// and namespace prefixing automatically.
///
/// # Example
///
/// ```rust
/// use gatehouse_storage::memory::InMemoryBackend;
/// use gatehouse_storage::typed::TypedStore;
///
/// # tokio_test::block_on(async {
/// let store = TypedStore::new(InMemoryBackend::new(), "roles");
/// store.put("r1", &vec!["read:record".to_string()]).await.unwrap();
///
/// let perms: Vec<String> = store.get("r1").await.unwrap().unwrap();
/// assert_eq!(perms, vec!["read:record"]);
/// # });
/// ```
pub struct TypedStore<B: StorageBackend> {
    backend: B,
    namespace: String,
}

impl<B: StorageBackend> TypedStore<B> {
    /// Create a new typed store wrapping `backend` with the given namespace.
    pub fn new(backend: B, namespace: &str) -> Self {
        Self {
            backend,
            namespace: namespace.to_string(),
        }
    }

    /// Return the namespace prefix used by this store.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn prefixed_key(&self, key: &str) -> Vec<u8> {
        format!("{}:{}", self.namespace, key).into_bytes()
    }

    /// Retrieve and deserialize a value by its logical key.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let full_key = self.prefixed_key(key);
        match self.backend.get(&full_key).await? {
            Some(bytes) => {
                let value: T = serde_json::from_slice(&bytes).map_err(|err| {
                    StorageError::SerializationError(format!(
                        "failed to deserialize value for key '{}:{}': {}",
                        self.namespace, key, err
                    ))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Serialize and store a value under the given logical key.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let full_key = self.prefixed_key(key);
        let bytes = serde_json::to_vec(value).map_err(|err| {
            StorageError::SerializationError(format!(
                "failed to serialize value for key '{}:{}': {}",
                self.namespace, key, err
            ))
        })?;
        self.backend.put(&full_key, &bytes).await
    }

    /// Delete a value by its logical key.
    pub async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let full_key = self.prefixed_key(key);
        self.backend.delete(&full_key).await
    }

    /// Deserialize every value in this namespace, in key order.
    pub async fn values<T: DeserializeOwned>(&self) -> Result<Vec<T>, StorageError> {
        let prefix = format!("{}:", self.namespace).into_bytes();
        let raw = self.backend.scan_prefix(&prefix, usize::MAX).await?;

        raw.into_iter()
            .map(|(raw_key, raw_value)| {
                serde_json::from_slice(&raw_value).map_err(|err| {
                    StorageError::CorruptedData(format!(
                        "undecodable value under '{}': {}",
                        String::from_utf8_lossy(&raw_key),
                        err
                    ))
                })
            })
            .collect()
    }
}
