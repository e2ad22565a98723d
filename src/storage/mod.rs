//! Blob storage for uploaded banner images.
//!
//! Banners are addressed by a public path (`/uploads/<name>`) which is what
//! gets persisted on applications and vendors. The local backend writes
//! into the configured uploads directory, which the HTTP layer also serves.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to write blob: {0}")]
    Write(#[source] std::io::Error),

    #[error("Failed to remove blob: {0}")]
    Remove(#[source] std::io::Error),

    #[error("Invalid blob reference: {0}")]
    InvalidReference(String),

    #[error("Unsupported image format")]
    UnsupportedFormat,
}

/// Image formats accepted as banners, identified by their leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if infer::image::is_png(bytes) {
            Some(Self::Png)
        } else if infer::image::is_jpeg(bytes) {
            Some(Self::Jpeg)
        } else if infer::image::is_gif(bytes) {
            Some(Self::Gif)
        } else if infer::image::is_webp(bytes) {
            Some(Self::Webp)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }
}

/// Public location of a stored blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef(pub String);

impl BlobRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlobRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An uploaded banner. `file_name` is the client's label and is only logged;
/// the stored name and type come from the content.
#[derive(Debug, Clone)]
pub struct BannerUpload {
    pub file_name: Option<String>,
    pub bytes: Bytes,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, upload: &BannerUpload) -> Result<BlobRef, StorageError>;

    /// Remove a blob. Releasing a blob that is already gone succeeds.
    async fn release(&self, blob: &BlobRef) -> Result<(), StorageError>;
}

/// Filesystem-backed blob store
pub struct LocalBlobStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_prefix: "/uploads".to_string(),
        }
    }

    /// Collision-free file name with the extension of the detected format
    fn generate_name(format: ImageFormat) -> String {
        format!(
            "{}-{}.{}",
            chrono::Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4().simple(),
            format.extension()
        )
    }

    /// Map a public reference back to a path inside the root, refusing traversal
    fn resolve(&self, blob: &BlobRef) -> Result<PathBuf, StorageError> {
        let name = blob
            .as_str()
            .strip_prefix(&self.public_prefix)
            .map(|rest| rest.trim_start_matches('/'))
            .ok_or_else(|| StorageError::InvalidReference(blob.to_string()))?;

        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(StorageError::InvalidReference(blob.to_string()));
        }

        Ok(self.root.join(name))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, upload: &BannerUpload) -> Result<BlobRef, StorageError> {
        let format = ImageFormat::sniff(&upload.bytes).ok_or(StorageError::UnsupportedFormat)?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(StorageError::Write)?;

        let name = Self::generate_name(format);
        let path = self.root.join(&name);
        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(StorageError::Write)?;

        tracing::debug!(
            path = %path.display(),
            original = upload.file_name.as_deref().unwrap_or("-"),
            size = upload.bytes.len(),
            "Stored banner"
        );
        Ok(BlobRef(format!("{}/{}", self.public_prefix, name)))
    }

    async fn release(&self, blob: &BlobRef) -> Result<(), StorageError> {
        let path = self.resolve(blob)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Released banner");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Remove(e)),
        }
    }
}
