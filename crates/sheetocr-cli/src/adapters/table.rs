//! CSV configuration table.

use std::io::Read;
use std::path::PathBuf;

use tracing::{debug, warn};

use sheetocr_core::{ConfigRow, ConfigSource, SheetOcrError};

/// Reads the configuration table from a CSV file.
///
/// Column 1 holds the entity id, the remaining columns hold region
/// instructions. Cells containing commas must be quoted.
pub struct CsvConfigSource {
    path: PathBuf,
    has_header: bool,
}

impl CsvConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            has_header: true,
        }
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }
}

impl ConfigSource for CsvConfigSource {
    fn rows(&self) -> Result<Vec<ConfigRow>, SheetOcrError> {
        let file = std::fs::File::open(&self.path)?;
        let rows = read_rows(file, self.has_header)?;
        debug!("Read {} rows from {}", rows.len(), self.path.display());
        Ok(rows)
    }
}

/// Parse configuration rows from any CSV reader.
pub fn read_rows<R: Read>(reader: R, has_header: bool) -> Result<Vec<ConfigRow>, SheetOcrError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| SheetOcrError::Config(format!("config table: {}", e)))?;
        let line = index + 1 + usize::from(has_header);

        let entity_id = record.get(0).unwrap_or_default().trim();
        if entity_id.is_empty() {
            if record.iter().any(|cell| !cell.trim().is_empty()) {
                warn!(line, "Skipping row without entity id");
            }
            continue;
        }

        rows.push(ConfigRow {
            entity_id: entity_id.to_string(),
            cells: record.iter().skip(1).map(str::to_string).collect(),
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_read_rows() {
        let csv = "code,revenue,profit\n\
                   VNM,\"1,A1,0,0,100,50\",\"2,B2,0,0,100,50\"\n\
                   HPG,\"3,C7,10,10,200,80\"\n";
        let rows = read_rows(csv.as_bytes(), true).unwrap();

        assert_eq!(
            rows,
            vec![
                ConfigRow {
                    entity_id: "VNM".to_string(),
                    cells: vec!["1,A1,0,0,100,50".to_string(), "2,B2,0,0,100,50".to_string()],
                },
                ConfigRow {
                    entity_id: "HPG".to_string(),
                    cells: vec!["3,C7,10,10,200,80".to_string()],
                },
            ]
        );
    }

    #[test]
    fn test_rows_without_entity_are_skipped() {
        let csv = " ,\"1,A1,0,0,100,50\"\n,\nFPT,\n";
        let rows = read_rows(csv.as_bytes(), false).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity_id, "FPT");
        assert_eq!(rows[0].cells, vec![String::new()]);
    }

    #[test]
    fn test_missing_file() {
        let source = CsvConfigSource::new("/nonexistent/config.csv");
        assert!(matches!(source.rows(), Err(SheetOcrError::Io(_))));
    }
}
