use std::path::{Path, PathBuf};
use tokio::fs::File;
use uuid::Uuid;

/// Filesystem shared with the workers: uploaded documents go in, worker
/// artifacts (extracted audio) come out.
pub struct ArtifactStore {
    data_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Write an uploaded document where the ingestion worker reads it:
    /// `{data_dir}/uploads/{user_id}/{product_id}/{filename}`.
    pub async fn save_upload(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        filename: &str,
        data: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let dir = self
            .data_dir
            .join("uploads")
            .join(user_id.to_string())
            .join(product_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(safe_file_name(filename));
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }

    /// Open an artifact by the path a worker recorded in job output,
    /// returning the handle and its length in bytes.
    pub async fn open(&self, path: &str) -> Result<(File, u64), StorageError> {
        let file = File::open(path).await?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// Remove an upload whose database records were never committed.
    pub async fn discard(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to discard upload");
        }
    }
}

/// Keep only the final path component of a client-supplied name.
pub fn safe_file_name(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .unwrap_or("upload.bin")
        .to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),
}
