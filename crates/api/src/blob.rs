//! Blob storage collaborator for file uploads

use std::path::PathBuf;

use async_trait::async_trait;
use huddle_shared::{ChatError, ChatResult};
use uuid::Uuid;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the bytes and return a URL clients can fetch them from
    async fn put(&self, file_name: &str, mime_type: &str, bytes: &[u8]) -> ChatResult<String>;
}

/// Writes uploads to a local directory served under `/uploads`
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Keep only characters that are safe in a path segment
fn sanitize_file_name(file_name: &str) -> String {
    let cleaned: String = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, file_name: &str, mime_type: &str, bytes: &[u8]) -> ChatResult<String> {
        let stored_name = format!("{}-{}", Uuid::new_v4(), sanitize_file_name(file_name));

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ChatError::Upstream(format!("blob store: {e}")))?;
        tokio::fs::write(self.root.join(&stored_name), bytes)
            .await
            .map_err(|e| ChatError::Upstream(format!("blob store: {e}")))?;

        tracing::debug!(
            file_name = %stored_name,
            mime_type = %mime_type,
            size = bytes.len(),
            "Stored upload"
        );

        Ok(format!("{}/uploads/{}", self.public_url, stored_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\docs\\my report.pdf"), "my_report.pdf");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[tokio::test]
    async fn test_put_writes_file_and_returns_url() {
        let root = std::env::temp_dir().join(format!("huddle-blob-{}", Uuid::new_v4()));
        let store = LocalBlobStore::new(&root, "http://localhost:3000/");

        let url = store.put("cat.png", "image/png", b"meow").await.unwrap();
        assert!(url.starts_with("http://localhost:3000/uploads/"));
        assert!(url.ends_with("-cat.png"));

        let stored_name = url.rsplit('/').next().unwrap();
        let bytes = tokio::fs::read(root.join(stored_name)).await.unwrap();
        assert_eq!(bytes, b"meow");

        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
