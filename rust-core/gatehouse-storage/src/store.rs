// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! The document store contract consumed by the CRUD engine, and a
//! reference implementation over any [`StorageBackend`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::backend::StorageBackend;
use crate::document::{Document, Filter, Population, ID_FIELD};
use crate::error::{StorageError, StorageResult};
use crate::typed::TypedStore;

/// Collection-oriented document store.
///
/// Stores guarantee per-document atomicity for `insert`, `update_set` and
/// `remove`. There are no multi-document transactions: callers combining
/// several calls (uniqueness check then insert, role removal then reference
/// cleanup) must tolerate interleaving with concurrent operations.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document in `collection` matching `filter`.
    async fn find(&self, collection: &str, filter: &Filter) -> StorageResult<Vec<Document>>;

    /// The document with the given id, if any.
    async fn find_one(&self, collection: &str, id: &str) -> StorageResult<Option<Document>>;

    /// Persist a new document and return it with its id.
    ///
    /// A string `_id` inside `fields` is used as the id; otherwise the store
    /// generates one.
    async fn insert(&self, collection: &str, fields: Map<String, Value>) -> StorageResult<Document>;

    /// Overwrite the given fields of one document and return the result, or
    /// `None` when the document does not exist.
    async fn update_set(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> StorageResult<Option<Document>>;

    /// Remove one document and return its final state, or `None` when it
    /// does not exist.
    async fn remove(&self, collection: &str, id: &str) -> StorageResult<Option<Document>>;

    /// Replace relation ids by the documents they reference.
    ///
    /// Dangling single references become `null`; dangling entries of an id
    /// array are dropped. Values that are not ids (already populated objects,
    /// `null`) are left alone, so populating twice is harmless.
    async fn populate(
        &self,
        mut document: Document,
        populations: &[Population],
    ) -> StorageResult<Document> {
        for population in populations {
            let Some(value) = document.fields().get(&population.path).cloned() else {
                continue;
            };

            let populated = match value {
                Value::String(id) => match self.find_one(&population.collection, &id).await? {
                    Some(related) => self.populate(related, &population.nested).await?.to_value(),
                    None => Value::Null,
                },
                Value::Array(items) => {
                    let mut resolved = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::String(id) => {
                                if let Some(related) =
                                    self.find_one(&population.collection, &id).await?
                                {
                                    let related =
                                        self.populate(related, &population.nested).await?;
                                    resolved.push(related.to_value());
                                }
                            }
                            other => resolved.push(other),
                        }
                    }
                    Value::Array(resolved)
                }
                other => other,
            };

            document.set(population.path.clone(), populated);
        }
        Ok(document)
    }
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn find(&self, collection: &str, filter: &Filter) -> StorageResult<Vec<Document>> {
        (**self).find(collection, filter).await
    }

    async fn find_one(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        (**self).find_one(collection, id).await
    }

    async fn insert(&self, collection: &str, fields: Map<String, Value>) -> StorageResult<Document> {
        (**self).insert(collection, fields).await
    }

    async fn update_set(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> StorageResult<Option<Document>> {
        (**self).update_set(collection, id, fields).await
    }

    async fn remove(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        (**self).remove(collection, id).await
    }

    async fn populate(
        &self,
        document: Document,
        populations: &[Population],
    ) -> StorageResult<Document> {
        (**self).populate(document, populations).await
    }
}

/// [`DocumentStore`] over a key-value [`StorageBackend`].
///
/// Each collection is a [`TypedStore`] namespace and each document one JSON
/// value keyed by its id. Writes are serialized behind an async mutex so a
/// read-modify-write in `update_set` cannot lose a concurrent write to the
/// same document.
pub struct KvDocumentStore<B: StorageBackend> {
    backend: Arc<B>,
    writes: Mutex<()>,
}

impl<B: StorageBackend> KvDocumentStore<B> {
    pub fn new(backend: B) -> Self {
        Self::from_shared(Arc::new(backend))
    }

    /// Share an existing backend handle.
    pub fn from_shared(backend: Arc<B>) -> Self {
        Self {
            backend,
            writes: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn collection(&self, collection: &str) -> StorageResult<TypedStore<Arc<B>>> {
        if collection.is_empty() || collection.contains(':') {
            return Err(StorageError::InvalidDocument(format!(
                "invalid collection name '{}'",
                collection
            )));
        }
        Ok(TypedStore::new(Arc::clone(&self.backend), collection))
    }
}

#[async_trait]
impl<B: StorageBackend> DocumentStore for KvDocumentStore<B> {
    async fn find(&self, collection: &str, filter: &Filter) -> StorageResult<Vec<Document>> {
        let documents: Vec<Document> = self.collection(collection)?.values().await?;
        Ok(documents
            .into_iter()
            .filter(|document| filter.matches(document))
            .collect())
    }

    async fn find_one(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        self.collection(collection)?.get(id).await
    }

    #[instrument(skip(self, values), fields(backend = self.backend.name()))]
    async fn insert(
        &self,
        collection: &str,
        mut values: Map<String, Value>,
    ) -> StorageResult<Document> {
        let store = self.collection(collection)?;
        let _guard = self.writes.lock().await;

        let id = match values.remove(ID_FIELD) {
            Some(Value::String(id)) => {
                if store.get::<Document>(&id).await?.is_some() {
                    return Err(StorageError::DuplicateId {
                        collection: collection.to_string(),
                        id,
                    });
                }
                id
            }
            Some(other) => {
                return Err(StorageError::InvalidDocument(format!(
                    "document id must be a string, got {}",
                    other
                )))
            }
            None => Uuid::new_v4().simple().to_string(),
        };

        let document = Document::new(id, values);
        store.put(document.id(), &document).await?;
        debug!(collection, id = document.id(), "Document inserted");
        Ok(document)
    }

    #[instrument(skip(self, values), fields(backend = self.backend.name()))]
    async fn update_set(
        &self,
        collection: &str,
        id: &str,
        values: Map<String, Value>,
    ) -> StorageResult<Option<Document>> {
        let store = self.collection(collection)?;
        let _guard = self.writes.lock().await;

        let Some(mut document) = store.get::<Document>(id).await? else {
            return Ok(None);
        };
        document.apply_set(&values);
        store.put(id, &document).await?;
        debug!(collection, id, changed = values.len(), "Document updated");
        Ok(Some(document))
    }

    #[instrument(skip(self), fields(backend = self.backend.name()))]
    async fn remove(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        let store = self.collection(collection)?;
        let _guard = self.writes.lock().await;

        let Some(document) = store.get::<Document>(id).await? else {
            return Ok(None);
        };
        store.delete(id).await?;
        debug!(collection, id, "Document removed");
        Ok(Some(document))
    }
}
