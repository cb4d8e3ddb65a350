use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CellRejection, CellValue, ResultSink};
use crate::error::SinkError;

/// Sink that keeps every delivered cell in memory.
///
/// Used for dry runs and tests. Later deliveries to the same destination
/// overwrite earlier ones, like a real worksheet.
#[derive(Debug, Default)]
pub struct MemorySink {
    sheets: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All cells as `(entity, destination, text)`, sorted.
    pub fn cells(&self) -> Vec<(String, String, String)> {
        let sheets = match self.sheets.lock() {
            Ok(sheets) => sheets,
            Err(poisoned) => poisoned.into_inner(),
        };
        sheets
            .iter()
            .flat_map(|(entity, cells)| {
                cells
                    .iter()
                    .map(move |(dest, text)| (entity.clone(), dest.clone(), text.clone()))
            })
            .collect()
    }

    /// Text delivered to one cell.
    pub fn get(&self, entity_id: &str, destination: &str) -> Option<String> {
        let sheets = self.sheets.lock().ok()?;
        sheets.get(entity_id)?.get(destination).cloned()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn deliver(&self, entity_id: &str, cells: &[CellValue]) -> Result<Vec<CellRejection>, SinkError> {
        let mut sheets = self
            .sheets
            .lock()
            .map_err(|_| SinkError::Unavailable("memory sink lock poisoned".to_string()))?;
        let sheet = sheets.entry(entity_id.to_string()).or_default();
        for cell in cells {
            sheet.insert(cell.destination.clone(), cell.text.clone());
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let sink = MemorySink::new();
        let cells = vec![CellValue::new("A1", "ABC"), CellValue::new("B2", "123")];

        sink.deliver("VNM", &cells).await.unwrap();
        sink.deliver("VNM", &cells).await.unwrap();

        assert_eq!(
            sink.cells(),
            vec![
                ("VNM".to_string(), "A1".to_string(), "ABC".to_string()),
                ("VNM".to_string(), "B2".to_string(), "123".to_string()),
            ]
        );
        assert_eq!(sink.get("VNM", "B2").as_deref(), Some("123"));
    }
}
