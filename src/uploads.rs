//! Staging of uploaded files on local disk.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Directory where multipart uploads are written before analysis.
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    /// Create the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the bytes under a unique name. Returns `None` on I/O failure;
    /// the caller records that as a missing file.
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Option<PathBuf> {
        let path = self
            .root
            .join(format!("{}-{}", Uuid::new_v4(), sanitize_file_name(original_name)));

        match tokio::fs::write(&path, bytes).await {
            Ok(()) => {
                debug!("Saved upload {} to {}", original_name, path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Could not save upload {}: {}", original_name, e);
                None
            }
        }
    }

    /// Delete a staged file after its record is gone. Paths outside the
    /// upload directory are left alone; failures are only logged.
    pub async fn remove(&self, file_path: &str) {
        if file_path.is_empty() {
            return;
        }
        let path = Path::new(file_path);
        if !path.starts_with(&self.root) {
            warn!("Refusing to remove {} outside {}", path.display(), self.root.display());
            return;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Removed staged upload {}", path.display()),
            Err(e) => warn!("Could not remove staged upload {}: {}", path.display(), e),
        }
    }
}

/// Keep only `[A-Za-z0-9._-]`, and never return an empty or dot-only name.
pub fn sanitize_file_name(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").unwrap());

    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = unsafe_chars.replace_all(base, "_");
    if cleaned.chars().all(|c| c == '.') {
        "upload".to_string()
    } else {
        cleaned.into_owned()
    }
}

/// Resolve the media type, sniffing the bytes when the client sent none.
pub fn resolve_media_type(declared: Option<&str>, bytes: &[u8]) -> String {
    match declared {
        Some(mime) if !mime.is_empty() && mime != "application/octet-stream" => mime.to_string(),
        _ => sniff_media_type(bytes).unwrap_or("application/octet-stream").to_string(),
    }
}

fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    use image::ImageFormat;

    let mime = match image::guess_format(bytes).ok()? {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::Ico => "image/x-icon",
        _ => return None,
    };
    Some(mime)
}
