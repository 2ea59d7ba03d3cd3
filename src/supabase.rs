//! Supabase (PostgREST) backend for the `documents` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::SupabaseConfig;
use crate::store::{DocumentRecord, DocumentStore, NewDocument, StoreError};

const TABLE: &str = "documents";

#[derive(Clone)]
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    service_role_key: String,
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            service_role_key: config.service_role_key,
        }
    }

    fn table_url(&self, query: &str) -> String {
        format!("{}/rest/v1/{}{}", self.base_url, TABLE, query)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
    }

    /// Send, check status, and decode the returned rows.
    async fn rows(&self, request: RequestBuilder, what: &str) -> Result<Vec<DocumentRow>, StoreError> {
        let resp = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("{} request failed: {}", what, e)))?;
        let resp = check_status(resp, what).await?;
        resp.json()
            .await
            .map_err(|e| StoreError::Backend(format!("{} returned invalid rows: {}", what, e)))
    }
}

async fn check_status(resp: Response, what: &str) -> Result<Response, StoreError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    Err(StoreError::Backend(format!(
        "Supabase {} failed: {} - {}",
        what, status, text
    )))
}

#[async_trait]
impl DocumentStore for SupabaseStore {
    async fn create(&self, doc: NewDocument) -> Result<DocumentRecord, StoreError> {
        debug!("Inserting document: {}", doc.file_name);
        let request = self
            .client
            .post(self.table_url(""))
            .header("Prefer", "return=representation")
            .json(&doc);

        let record = self
            .rows(request, "insert")
            .await?
            .into_iter()
            .next()
            .map(DocumentRecord::from)
            .ok_or_else(|| StoreError::Backend("insert returned no row".to_string()))?;

        info!("Inserted document {} into Supabase", record.id);
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<DocumentRecord>, StoreError> {
        let request = self
            .client
            .get(self.table_url("?select=*&order=created_at.desc,id.desc"));
        let rows = self.rows(request, "list").await?;
        Ok(rows.into_iter().map(DocumentRecord::from).collect())
    }

    async fn get(&self, id: i64) -> Result<DocumentRecord, StoreError> {
        let request = self
            .client
            .get(self.table_url(&format!("?id=eq.{}&select=*", id)));
        self.rows(request, "get")
            .await?
            .into_iter()
            .next()
            .map(DocumentRecord::from)
            .ok_or(StoreError::NotFound { id })
    }

    async fn delete(&self, id: i64) -> Result<DocumentRecord, StoreError> {
        let request = self
            .client
            .delete(self.table_url(&format!("?id=eq.{}", id)))
            .header("Prefer", "return=representation");
        let removed = self
            .rows(request, "delete")
            .await?
            .into_iter()
            .next()
            .map(DocumentRecord::from)
            .ok_or(StoreError::NotFound { id })?;

        info!("Deleted document {} from Supabase", id);
        Ok(removed)
    }
}

// ============================================================================
// Supabase row types
// ============================================================================

#[derive(Debug, Deserialize)]
struct DocumentRow {
    id: i64,
    file_name: String,
    #[serde(default)]
    file_path: Option<String>,
    mime_type: String,
    size: i64,
    // Null only in rows older than the `not null` constraint.
    ocr_text: Option<String>,
    llm_summary: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<DocumentRow> for DocumentRecord {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            file_name: row.file_name,
            file_path: row.file_path.unwrap_or_default(),
            mime_type: row.mime_type,
            size: row.size,
            ocr_text: row.ocr_text.unwrap_or_default(),
            llm_summary: row.llm_summary.unwrap_or_default(),
            created_at: row.created_at,
        }
    }
}
