//! Document records and the store they are persisted in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::debug;

/// A persisted analysis outcome. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: i64,
    pub file_name: String,
    /// Empty when the upload never reached disk.
    pub file_path: String,
    pub mime_type: String,
    pub size: i64,
    pub ocr_text: String,
    pub llm_summary: String,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the caller; `id` and `created_at` come from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewDocument {
    pub file_name: String,
    pub file_path: String,
    pub mime_type: String,
    pub size: i64,
    pub ocr_text: String,
    pub llm_summary: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {id} not found")]
    NotFound { id: i64 },
    #[error("document store error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, doc: NewDocument) -> Result<DocumentRecord, StoreError>;
    /// All records, newest first.
    async fn list(&self) -> Result<Vec<DocumentRecord>, StoreError>;
    async fn get(&self, id: i64) -> Result<DocumentRecord, StoreError>;
    /// Remove a record, returning what was deleted.
    async fn delete(&self, id: i64) -> Result<DocumentRecord, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_id: i64,
    records: BTreeMap<i64, DocumentRecord>,
}

/// Process-local store. Ids are assigned under the write lock, so they follow
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryInner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryInner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, doc: NewDocument) -> Result<DocumentRecord, StoreError> {
        let mut inner = self.write()?;
        inner.next_id += 1;
        let record = DocumentRecord {
            id: inner.next_id,
            file_name: doc.file_name,
            file_path: doc.file_path,
            mime_type: doc.mime_type,
            size: doc.size,
            ocr_text: doc.ocr_text,
            llm_summary: doc.llm_summary,
            created_at: Utc::now(),
        };
        inner.records.insert(record.id, record.clone());
        debug!("MemoryStore: created document {}", record.id);
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<DocumentRecord>, StoreError> {
        let inner = self.read()?;
        let mut records: Vec<DocumentRecord> = inner.records.values().cloned().collect();
        // Timestamps can tie at clock resolution; id breaks the tie.
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn get(&self, id: i64) -> Result<DocumentRecord, StoreError> {
        self.read()?
            .records
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { id })
    }

    async fn delete(&self, id: i64) -> Result<DocumentRecord, StoreError> {
        let removed = self
            .write()?
            .records
            .remove(&id)
            .ok_or(StoreError::NotFound { id })?;
        debug!("MemoryStore: deleted document {}", id);
        Ok(removed)
    }
}
