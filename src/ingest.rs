//! Upload ingestion: encode, infer, parse, persist.
//!
//! Every call to [`Ingestor::ingest`] performs exactly one store write. Failures
//! in the analysis stages are recorded as data in that write rather than
//! returned to the caller.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::encoder;
use crate::inference::{Inference, InferenceError};
use crate::parser::{self, ParsedAnalysis};
use crate::prompt;
use crate::store::{DocumentRecord, DocumentStore, NewDocument, StoreError};

/// `ocrText` of every degraded record.
pub const FAILURE_OCR_TEXT: &str = "Falha na leitura.";
/// Prefix of `llmSummary` on degraded records.
pub const FAILURE_SUMMARY_PREFIX: &str = "Erro: ";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Arquivo não salvo em disco.{}", detail(.0))]
    MissingFile(String),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

fn detail(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!(" {}", text)
    }
}

/// One upload, as handed over by the transport layer.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub file_name: String,
    pub media_type: String,
    pub size_bytes: u64,
    /// `None` when the upload was never written to disk.
    pub file_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    Encoding,
    Inferring,
    Parsing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Succeeded(ParsedAnalysis),
    Failed(String),
}

impl AnalysisOutcome {
    /// Fields for the record written on either terminal transition.
    fn into_fields(self) -> (String, String) {
        match self {
            AnalysisOutcome::Succeeded(parsed) => (parsed.ocr_text, parsed.summary),
            AnalysisOutcome::Failed(diagnostic) => (
                FAILURE_OCR_TEXT.to_string(),
                format!("{}{}", FAILURE_SUMMARY_PREFIX, diagnostic),
            ),
        }
    }
}

#[derive(Clone)]
pub struct Ingestor {
    inference: Arc<dyn Inference>,
    store: Arc<dyn DocumentStore>,
}

impl Ingestor {
    pub fn new(inference: Arc<dyn Inference>, store: Arc<dyn DocumentStore>) -> Self {
        Self { inference, store }
    }

    /// Run the pipeline and persist its outcome. Only a failed store write
    /// is returned as an error.
    pub async fn ingest(&self, request: AnalysisRequest) -> Result<DocumentRecord, StoreError> {
        info!(
            "Analyzing upload: {} ({}, {} bytes)",
            request.file_name, request.media_type, request.size_bytes
        );

        let outcome = match self.analyze(&request).await {
            Ok(parsed) => {
                info!("Analysis complete: {}", request.file_name);
                AnalysisOutcome::Succeeded(parsed)
            }
            Err((stage, e)) => {
                error!(
                    "Analysis failed for {} at {:?}: {}",
                    request.file_name, stage, e
                );
                AnalysisOutcome::Failed(e.to_string())
            }
        };

        self.persist(&request, outcome).await
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<ParsedAnalysis, (Stage, IngestError)> {
        let path = request.file_path.as_deref().ok_or_else(|| {
            (Stage::Received, IngestError::MissingFile(String::new()))
        })?;

        debug!("Encoding {}", path.display());
        let bytes = encoder::read_file(path)
            .await
            .map_err(|e| (Stage::Encoding, e))?;
        let image = encoder::encode(&bytes, &request.media_type);

        debug!("Requesting analysis for {}", request.file_name);
        let raw = self
            .inference
            .infer(&image, &prompt::build_prompt())
            .await
            .map_err(|e| (Stage::Inferring, IngestError::from(e)))?;

        debug!("{:?}: reply of {} chars", Stage::Parsing, raw.len());
        Ok(parser::parse(&raw))
    }

    async fn persist(
        &self,
        request: &AnalysisRequest,
        outcome: AnalysisOutcome,
    ) -> Result<DocumentRecord, StoreError> {
        let (ocr_text, llm_summary) = outcome.into_fields();
        let doc = NewDocument {
            file_name: request.file_name.clone(),
            file_path: request
                .file_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            mime_type: request.media_type.clone(),
            size: i64::try_from(request.size_bytes).unwrap_or(i64::MAX),
            ocr_text,
            llm_summary,
        };

        self.store.create(doc).await.map_err(|e| {
            warn!("Failed to persist record for {}: {}", request.file_name, e);
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InferenceConfig;
    use crate::encoder::DataReference;
    use crate::inference::ChatCompletionsClient;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fake model: replays a fixed result and records what it was sent.
    struct FakeInference {
        reply: Result<String, fn() -> InferenceError>,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl FakeInference {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(err: fn() -> InferenceError) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(err),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Inference for FakeInference {
        async fn infer(
            &self,
            image: &DataReference,
            instruction: &str,
        ) -> Result<String, InferenceError> {
            self.seen
                .lock()
                .unwrap()
                .push((image.to_url(), instruction.to_string()));
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn write_upload(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn request(path: Option<PathBuf>) -> AnalysisRequest {
        AnalysisRequest {
            file_name: "invoice.png".to_string(),
            media_type: "image/png".to_string(),
            size_bytes: 4,
            file_path: path,
        }
    }

    #[tokio::test]
    async fn test_successful_upload_stores_parsed_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_upload(&dir, "invoice.png", b"\x89PNG");
        let model = FakeInference::replying(
            "---OCR START---\nTotal: 42\n---OCR END---\n---SUMMARY START---\nInvoice for 42 units.\n---SUMMARY END---",
        );
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(model.clone(), store.clone());

        let record = ingestor.ingest(request(Some(path.clone()))).await.unwrap();

        assert_eq!(record.ocr_text, "Total: 42");
        assert_eq!(record.llm_summary, "Invoice for 42 units.");
        assert_eq!(record.file_path, path.to_string_lossy());
        assert_eq!(record.mime_type, "image/png");
        assert_eq!(record.size, 4);
        assert_eq!(store.list().await.unwrap(), vec![record]);

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].0, "data:image/png;base64,iVBORw==");
        assert_eq!(seen[0].1, prompt::build_prompt());
    }

    #[tokio::test]
    async fn test_missing_path_records_failure_without_inference() {
        let model = FakeInference::replying("unused");
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(model.clone(), store.clone());

        let record = ingestor.ingest(request(None)).await.unwrap();

        assert_eq!(record.file_path, "");
        assert_eq!(record.ocr_text, FAILURE_OCR_TEXT);
        assert!(record.llm_summary.starts_with("Erro: "));
        assert!(record.llm_summary.contains("Arquivo não salvo em disco."));
        assert_eq!(model.calls(), 0);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_path_records_failure() {
        let dir = tempfile::tempdir().unwrap();
        let model = FakeInference::replying("unused");
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(model.clone(), store.clone());

        let record = ingestor
            .ingest(request(Some(dir.path().join("vanished.png"))))
            .await
            .unwrap();

        assert_eq!(record.ocr_text, FAILURE_OCR_TEXT);
        assert!(record.llm_summary.starts_with("Erro: Arquivo não salvo em disco."));
        assert!(record.file_path.ends_with("vanished.png"));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_inference_error_message_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_upload(&dir, "invoice.png", b"img");
        let model = FakeInference::failing(|| InferenceError::Api {
            status: 503,
            body: "upstream connect error".to_string(),
        });
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(model.clone(), store.clone());

        let record = ingestor.ingest(request(Some(path))).await.unwrap();

        let expected = InferenceError::Api {
            status: 503,
            body: "upstream connect error".to_string(),
        }
        .to_string();
        assert_eq!(record.ocr_text, FAILURE_OCR_TEXT);
        assert_eq!(record.llm_summary, format!("Erro: {}", expected));
        assert_eq!(model.calls(), 1);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_network_error_is_recorded() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let path = write_upload(&dir, "invoice.png", b"img");
        let client = ChatCompletionsClient::new(InferenceConfig {
            base_url: format!("http://{}", addr),
            ..InferenceConfig::new("test-key")
        });
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(Arc::new(client.clone()), store.clone());

        let record = ingestor.ingest(request(Some(path.clone()))).await.unwrap();

        let image = encoder::encode(b"img", "image/png");
        let transport = client
            .infer(&image, &prompt::build_prompt())
            .await
            .unwrap_err();
        assert!(matches!(transport, InferenceError::Transport(_)));

        assert_eq!(record.ocr_text, FAILURE_OCR_TEXT);
        assert!(record.llm_summary.starts_with("Erro: inference request failed"));
        assert_eq!(record.llm_summary, format!("Erro: {}", transport));
        assert_eq!(store.list().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_marker_free_reply_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_upload(&dir, "note.png", b"img");
        let model = FakeInference::replying("  Just the words on the page.  ");
        let ingestor = Ingestor::new(model, Arc::new(MemoryStore::new()));

        let record = ingestor.ingest(request(Some(path))).await.unwrap();

        assert_eq!(record.ocr_text, "Just the words on the page.");
        assert_eq!(record.llm_summary, parser::SUMMARY_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_each_attempt_writes_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_upload(&dir, "a.png", b"img");
        let store = Arc::new(MemoryStore::new());
        let ok = Ingestor::new(FakeInference::replying("text"), store.clone());
        let failing = Ingestor::new(
            FakeInference::failing(|| InferenceError::EmptyReply),
            store.clone(),
        );

        ok.ingest(request(Some(path.clone()))).await.unwrap();
        failing.ingest(request(Some(path))).await.unwrap();
        ok.ingest(request(None)).await.unwrap();

        let records = store.list().await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records
            .iter()
            .all(|r| !r.ocr_text.is_empty() && !r.llm_summary.is_empty()));
    }

    #[test]
    fn test_outcome_fields() {
        let failed = AnalysisOutcome::Failed("boom".to_string()).into_fields();
        assert_eq!(failed, (FAILURE_OCR_TEXT.to_string(), "Erro: boom".to_string()));

        let ok = AnalysisOutcome::Succeeded(ParsedAnalysis {
            ocr_text: "o".to_string(),
            summary: "s".to_string(),
        })
        .into_fields();
        assert_eq!(ok, ("o".to_string(), "s".to_string()));
    }
}
