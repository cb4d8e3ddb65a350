//! Boundaries to the outside world: configuration table, documents, results.

mod local;
mod memory;

pub use local::LocalDocumentSource;
pub use memory::MemorySink;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, SheetOcrError, SinkError};
use crate::models::ConfigRow;
use crate::pdf::SourceDocument;

/// Supplies the configuration table, one row per entity.
pub trait ConfigSource {
    fn rows(&self) -> Result<Vec<ConfigRow>, SheetOcrError>;
}

/// In-memory rows, mostly for tests and embedding.
impl ConfigSource for Vec<ConfigRow> {
    fn rows(&self) -> Result<Vec<ConfigRow>, SheetOcrError> {
        Ok(self.clone())
    }
}

/// Resolves and downloads an entity's document.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, entity_id: &str) -> Result<SourceDocument, FetchError>;
}

/// One recognized value bound for a destination cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellValue {
    pub destination: String,
    pub text: String,
}

impl CellValue {
    pub fn new(destination: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            text: text.into(),
        }
    }
}

/// A single destination the sink refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRejection {
    pub destination: String,
    pub reason: String,
}

/// Receives each entity's recognized values.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Write one entity's batch. Destinations the sink cannot address are
    /// returned as rejections; everything else is written.
    async fn deliver(&self, entity_id: &str, cells: &[CellValue]) -> Result<Vec<CellRejection>, SinkError>;
}
