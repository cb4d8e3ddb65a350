use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::DocumentSource;
use crate::error::FetchError;
use crate::pdf::SourceDocument;

/// Reads `<dir>/<entity>.pdf`.
#[derive(Debug, Clone)]
pub struct LocalDocumentSource {
    dir: PathBuf,
}

impl LocalDocumentSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, entity_id: &str) -> PathBuf {
        self.dir.join(format!("{}.pdf", entity_id))
    }
}

#[async_trait]
impl DocumentSource for LocalDocumentSource {
    async fn fetch(&self, entity_id: &str) -> Result<SourceDocument, FetchError> {
        let path = self.path_for(entity_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::NotFound(format!("{} ({})", entity_id, path.display())));
            }
            Err(e) => return Err(e.into()),
        };

        debug!(entity = entity_id, "Read {} bytes from {}", bytes.len(), path.display());

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| entity_id.to_string());
        Ok(SourceDocument::new(name, bytes))
    }
}
