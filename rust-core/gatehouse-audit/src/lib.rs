// SPDX-License-Identifier: PMPL-1.0-or-later
//! Gatehouse Audit Trail
//!
//! Every successful mutation performed by the CRUD engine leaves one
//! [`AuditRecord`] behind: who did it, to which document of which model, what
//! kind of mutation it was, and the serialized document afterwards (or, for a
//! deletion, the document that was removed).
//!
//! # Architecture
//!
//! - **AuditAction**: `Create` / `Update` / `Delete`, persisted as the HTTP
//!   verbs `POST` / `PATCH` / `DELETE` for compatibility with existing trails.
//! - **AuditRecord**: the persisted shape
//!   `{createdAt, creator, content, model, action, value, reason}`.
//! - **AuditRecorder**: appends records to a collection of the document store.
//!   Recording is best-effort: a failure is logged and counted, never returned,
//!   so an unavailable audit trail cannot fail or roll back the mutation that
//!   triggered it.
//!
//! Records are append-only. Nothing in this crate updates or removes them.

use std::sync::Arc;

use chrono::Utc;
use gatehouse_storage::{Document, DocumentStore, Filter, StorageError};
use prometheus::{IntCounter, Registry};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Collection audit records are written to by default.
pub const DEFAULT_COLLECTION: &str = "records";

/// Audit-specific errors.
///
/// Only [`AuditRecorder::try_record`] and the query helpers surface these;
/// [`AuditRecorder::record`] swallows them.
#[derive(Error, Debug)]
pub enum AuditError {
    /// The snapshot or the record could not be serialized.
    #[error("Audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The document store rejected the write or read.
    #[error("Audit storage error: {0}")]
    Storage(#[from] StorageError),

    /// Prometheus metric registration failed.
    #[error("Audit metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Kind of mutation being recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuditAction {
    #[serde(rename = "POST")]
    Create,
    #[serde(rename = "PATCH")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
}

impl AuditAction {
    /// The persisted verb.
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "POST",
            AuditAction::Update => "PATCH",
            AuditAction::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable entry of the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Milliseconds since the UNIX epoch.
    pub created_at: i64,
    /// Principal that performed the mutation; `None` for anonymous writes
    /// to publicly writable models.
    pub creator: Option<String>,
    /// Id of the mutated document.
    pub content: String,
    /// Entity type of the mutated document.
    pub model: String,
    pub action: AuditAction,
    /// JSON serialization of the document snapshot.
    pub value: String,
    #[serde(default)]
    pub reason: String,
}

impl AuditRecord {
    /// Build a record stamped with the current time.
    pub fn new(
        actor: Option<&str>,
        entity_type: &str,
        action: AuditAction,
        snapshot: &Document,
        reason: impl Into<String>,
    ) -> Result<Self, AuditError> {
        Ok(Self {
            created_at: Utc::now().timestamp_millis(),
            creator: actor.map(str::to_string),
            content: snapshot.id().to_string(),
            model: entity_type.to_string(),
            action,
            value: serde_json::to_string(snapshot)?,
            reason: reason.into(),
        })
    }

    /// Decode the snapshot back into a document.
    pub fn snapshot(&self) -> Result<Document, AuditError> {
        Ok(serde_json::from_str(&self.value)?)
    }

    /// Read a record out of a stored document.
    pub fn from_document(document: &Document) -> Result<Self, AuditError> {
        Ok(serde_json::from_value(serde_json::Value::Object(
            document.fields().clone(),
        ))?)
    }
}

/// Prometheus counters for the audit trail.
#[derive(Clone)]
struct AuditMetrics {
    recorded: IntCounter,
    failed: IntCounter,
}

/// Appends [`AuditRecord`]s to the document store.
///
/// Cheap to clone; clones share the store handle and counters.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn DocumentStore>,
    collection: String,
    metrics: Option<AuditMetrics>,
}

impl AuditRecorder {
    /// Recorder writing into [`DEFAULT_COLLECTION`].
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_collection(store, DEFAULT_COLLECTION)
    }

    pub fn with_collection(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            metrics: None,
        }
    }

    /// Register `gatehouse_audit_records_total` and
    /// `gatehouse_audit_failures_total` with `registry`.
    pub fn with_prometheus(mut self, registry: &Registry) -> Result<Self, AuditError> {
        let recorded = IntCounter::new(
            "gatehouse_audit_records_total",
            "Audit records successfully appended",
        )?;
        let failed = IntCounter::new(
            "gatehouse_audit_failures_total",
            "Audit records that could not be appended",
        )?;
        registry.register(Box::new(recorded.clone()))?;
        registry.register(Box::new(failed.clone()))?;

        self.metrics = Some(AuditMetrics { recorded, failed });
        Ok(self)
    }

    /// Collection the records are written to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Append a record, best-effort.
    ///
    /// Returns the stored record document, or `None` when recording failed.
    /// Failures are reported through the log and the failure counter only.
    pub async fn record(
        &self,
        actor: Option<&str>,
        entity_type: &str,
        action: AuditAction,
        snapshot: &Document,
        reason: &str,
    ) -> Option<Document> {
        match self
            .try_record(actor, entity_type, action, snapshot, reason)
            .await
        {
            Ok(document) => {
                if let Some(metrics) = &self.metrics {
                    metrics.recorded.inc();
                }
                Some(document)
            }
            Err(err) => {
                if let Some(metrics) = &self.metrics {
                    metrics.failed.inc();
                }
                warn!(
                    model = %entity_type,
                    content = %snapshot.id(),
                    action = %action,
                    error = %err,
                    "Audit record dropped"
                );
                None
            }
        }
    }

    /// Append a record and report failures to the caller.
    #[instrument(skip(self, snapshot, reason), fields(content = %snapshot.id()))]
    pub async fn try_record(
        &self,
        actor: Option<&str>,
        entity_type: &str,
        action: AuditAction,
        snapshot: &Document,
        reason: &str,
    ) -> Result<Document, AuditError> {
        let record = AuditRecord::new(actor, entity_type, action, snapshot, reason)?;
        let serde_json::Value::Object(fields) = serde_json::to_value(&record)? else {
            return Err(AuditError::Storage(StorageError::InvalidDocument(
                "audit record did not serialize to an object".to_string(),
            )));
        };
        let document = self.store.insert(&self.collection, fields).await?;
        debug!(record = %document.id(), "Audit record appended");
        Ok(document)
    }

    /// Every record about one document, oldest first.
    pub async fn history(&self, content_id: &str) -> Result<Vec<AuditRecord>, AuditError> {
        let documents = self
            .store
            .find(&self.collection, &Filter::all().eq("content", content_id))
            .await?;
        let mut records = documents
            .iter()
            .map(AuditRecord::from_document)
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }

    /// Every record created by one principal, oldest first.
    pub async fn by_actor(&self, actor: &str) -> Result<Vec<AuditRecord>, AuditError> {
        let documents = self
            .store
            .find(&self.collection, &Filter::all().eq("creator", actor))
            .await?;
        let mut records = documents
            .iter()
            .map(AuditRecord::from_document)
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("collection", &self.collection)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gatehouse_storage::{InMemoryBackend, KvDocumentStore, Population, StorageResult};
    use serde_json::{json, Map, Value};

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn recorder() -> AuditRecorder {
        AuditRecorder::new(Arc::new(KvDocumentStore::new(InMemoryBackend::new())))
    }

    /// A store whose writes always fail.
    struct BrokenStore;

    #[async_trait]
    impl DocumentStore for BrokenStore {
        async fn find(&self, _: &str, _: &Filter) -> StorageResult<Vec<Document>> {
            Err(StorageError::BackendUnavailable("down".to_string()))
        }
        async fn find_one(&self, _: &str, _: &str) -> StorageResult<Option<Document>> {
            Err(StorageError::BackendUnavailable("down".to_string()))
        }
        async fn insert(&self, _: &str, _: Map<String, Value>) -> StorageResult<Document> {
            Err(StorageError::BackendUnavailable("down".to_string()))
        }
        async fn update_set(
            &self,
            _: &str,
            _: &str,
            _: Map<String, Value>,
        ) -> StorageResult<Option<Document>> {
            Err(StorageError::BackendUnavailable("down".to_string()))
        }
        async fn remove(&self, _: &str, _: &str) -> StorageResult<Option<Document>> {
            Err(StorageError::BackendUnavailable("down".to_string()))
        }
        async fn populate(&self, d: Document, _: &[Population]) -> StorageResult<Document> {
            Ok(d)
        }
    }

    #[test]
    fn test_action_wire_names() {
        assert_eq!(serde_json::to_value(AuditAction::Create).unwrap(), json!("POST"));
        assert_eq!(serde_json::to_value(AuditAction::Update).unwrap(), json!("PATCH"));
        assert_eq!(serde_json::to_value(AuditAction::Delete).unwrap(), json!("DELETE"));
        assert_eq!(AuditAction::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_record_shape() {
        let snapshot = doc(json!({"_id": "d1", "name": "x"}));
        let record =
            AuditRecord::new(Some("u1"), "role", AuditAction::Create, &snapshot, "").unwrap();
        let value = serde_json::to_value(&record).unwrap();

        for key in ["createdAt", "creator", "content", "model", "action", "value", "reason"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["content"], json!("d1"));
        assert_eq!(value["action"], json!("POST"));
        assert_eq!(record.snapshot().unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_record_and_history() {
        let recorder = recorder();
        let v1 = doc(json!({"_id": "d1", "name": "a"}));
        let v2 = doc(json!({"_id": "d1", "name": "b"}));

        assert!(recorder
            .record(Some("u1"), "role", AuditAction::Create, &v1, "")
            .await
            .is_some());
        assert!(recorder
            .record(Some("u2"), "role", AuditAction::Update, &v2, "rename")
            .await
            .is_some());

        let history = recorder.history("d1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].created_at <= history[1].created_at);
        let update = history
            .iter()
            .find(|r| r.action == AuditAction::Update)
            .unwrap();
        assert_eq!(update.reason, "rename");
        assert_eq!(update.snapshot().unwrap(), v2);

        let by_u2 = recorder.by_actor("u2").await.unwrap();
        assert_eq!(by_u2.len(), 1);
        assert_eq!(by_u2[0].creator.as_deref(), Some("u2"));
    }

    #[tokio::test]
    async fn test_failures_are_swallowed_and_counted() {
        let registry = Registry::new();
        let recorder = AuditRecorder::new(Arc::new(BrokenStore))
            .with_prometheus(&registry)
            .unwrap();
        let snapshot = doc(json!({"_id": "d1"}));

        let stored = recorder
            .record(None, "role", AuditAction::Delete, &snapshot, "")
            .await;
        assert!(stored.is_none());
        assert!(recorder
            .try_record(None, "role", AuditAction::Delete, &snapshot, "")
            .await
            .is_err());

        let text = prometheus::TextEncoder::new()
            .encode_to_string(&registry.gather())
            .unwrap();
        assert!(text.contains("gatehouse_audit_failures_total 1"));
        assert!(text.contains("gatehouse_audit_records_total 0"));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        let store: Arc<dyn DocumentStore> = Arc::new(BrokenStore);
        assert!(AuditRecorder::new(Arc::clone(&store))
            .with_prometheus(&registry)
            .is_ok());
        assert!(matches!(
            AuditRecorder::new(store).with_prometheus(&registry),
            Err(AuditError::Metrics(_))
        ));
    }
}
