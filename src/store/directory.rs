use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::{PipelineStore, StoreError};

/// Reads pipeline documents from a local directory (development setups).
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl PipelineStore for DirectoryStore {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.root.join(key);
        debug!(path = %path.display(), "Reading pipeline document");

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key.to_string())),
            Err(e) => Err(StoreError::Io {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_existing_document() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("p.json"), r#"{"mode":"parallel","steps":["a"]}"#)
            .unwrap();

        let store = DirectoryStore::new(dir.path().to_path_buf());
        let bytes = store.get_object("p.json").await.unwrap();
        assert!(bytes.starts_with(b"{\"mode\""));
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().to_path_buf());

        let err = store.get_object("missing.json").await.unwrap_err();
        assert_eq!(err, StoreError::NotFound("missing.json".to_string()));
    }
}
