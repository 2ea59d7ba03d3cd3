//! Binary encoding of uploaded files into self-describing data references.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::fmt;
use std::path::Path;

use crate::ingest::IngestError;

/// Media type + base64 payload, rendered as a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataReference {
    media_type: String,
    payload: String,
}

impl DataReference {
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Full `data:{media_type};base64,{payload}` form, ready for a request body.
    pub fn to_url(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DataReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.media_type, self.payload)
    }
}

/// Encode raw bytes into a data reference. Pure and deterministic.
pub fn encode(bytes: &[u8], media_type: &str) -> DataReference {
    DataReference {
        media_type: media_type.to_string(),
        payload: BASE64.encode(bytes),
    }
}

/// Read a stored upload back from disk.
pub async fn read_file(path: &Path) -> Result<Vec<u8>, IngestError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| IngestError::MissingFile(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_renders_data_url() {
        let reference = encode(b"hello", "image/png");
        assert_eq!(reference.media_type(), "image/png");
        assert_eq!(reference.payload(), "aGVsbG8=");
        assert_eq!(reference.to_url(), "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn test_encode_is_deterministic() {
        let bytes = [0u8, 255, 17, 42, 128];
        assert_eq!(encode(&bytes, "image/jpeg"), encode(&bytes, "image/jpeg"));
    }

    #[test]
    fn test_encode_empty_input() {
        assert_eq!(encode(&[], "image/png").to_url(), "data:image/png;base64,");
    }

    #[tokio::test]
    async fn test_read_file_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_file(&dir.path().join("gone.png")).await.unwrap_err();
        assert!(matches!(err, IngestError::MissingFile(_)));
    }
}
