// Blob storage for uploaded project files, deliveries and receipts

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use crate::error::{AppError, Result};

pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

const ALLOWED_EXTENSIONS: [&str; 6] = ["jpeg", "jpg", "png", "pdf", "mp3", "wav"];

#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Upload {
    // Only images, PDFs and audio, up to 50 MiB; extension and MIME must agree.
    pub fn check_allowed(&self) -> Result<()> {
        if self.data.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }
        if self.data.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::Validation(
                "File exceeds the 50 MB upload limit".to_string(),
            ));
        }

        let extension = extension_of(&self.file_name).unwrap_or_default();
        let mime = self.content_type.to_ascii_lowercase();
        let ext_ok = ALLOWED_EXTENSIONS.contains(&extension.as_str());
        let mime_ok = ALLOWED_EXTENSIONS.iter().any(|t| mime.contains(t))
            || mime == "audio/mpeg"
            || mime == "audio/x-wav";

        if !ext_ok || !mime_ok {
            return Err(AppError::Validation(
                "File type not allowed! Only images, PDFs, and audio files are permitted."
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub key: String,
    pub url: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, upload: &Upload) -> Result<StoredBlob>;
    async fn delete(&self, url: &str) -> Result<()>;
}

pub struct LocalBlobStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            base_path: base_path.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create storage directory: {e}")))?;
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/uploads/{key}", self.public_base_url)
    }

    fn key_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.strip_prefix(&self.public_base_url)?
            .strip_prefix("/uploads/")
            .filter(|key| !key.is_empty() && !key.contains('/') && !key.contains(".."))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, upload: &Upload) -> Result<StoredBlob> {
        let key = match extension_of(&upload.file_name) {
            Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
            None => Uuid::new_v4().to_string(),
        };

        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create directories: {e}")))?;
        fs::write(self.base_path.join(&key), &upload.data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write file: {e}")))?;

        Ok(StoredBlob {
            url: self.url_for(&key),
            key,
        })
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let Some(key) = self.key_from_url(url) else {
            tracing::warn!(url, "Not a locally stored blob; nothing deleted");
            return Ok(());
        };

        let path = self.base_path.join(key);
        if fs::try_exists(&path).await.unwrap_or(false) {
            fs::remove_file(&path)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to delete file: {e}")))?;
        }
        Ok(())
    }
}
