//! Result sink writing one CSV worksheet per entity.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::debug;

use sheetocr_core::error::SinkError;
use sheetocr_core::models::config::SinkConfig;
use sheetocr_core::{CellRejection, CellValue, ResultSink};

lazy_static! {
    static ref A1_RE: Regex = Regex::new(r"^([A-Za-z]{1,3})([1-9][0-9]{0,6})$").unwrap();
}

/// Rows in a worksheet (`1..=1048576`).
pub const MAX_ROWS: usize = 1_048_576;
/// Columns in a worksheet (`A..=XFD`).
pub const MAX_COLUMNS: usize = 16_384;

/// Zero-based (row, column) of an A1-style reference such as `B12` or `AA3`.
///
/// References past `XFD1048576` are rejected.
pub fn parse_a1(reference: &str) -> Option<(usize, usize)> {
    let caps = A1_RE.captures(reference.trim())?;
    let column = caps[1]
        .chars()
        .fold(0usize, |acc, c| acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1));
    let row: usize = caps[2].parse().ok()?;
    if row > MAX_ROWS || column > MAX_COLUMNS {
        return None;
    }
    Some((row - 1, column - 1))
}

/// Writes `<dir>/<entity>.csv`, creating it on demand. Existing cells that
/// are not addressed are left untouched.
pub struct CsvWorkbookSink {
    dir: PathBuf,
    normalize_text: bool,
    empty_text: Option<String>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CsvWorkbookSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            normalize_text: false,
            empty_text: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &SinkConfig) -> Self {
        let mut sink = Self::new(&config.output_dir);
        sink.normalize_text = config.normalize_text;
        sink.empty_text = config.empty_text.clone();
        sink
    }

    pub fn worksheet_path(&self, entity_id: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", entity_id))
    }

    async fn worksheet_lock(&self, entity_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(entity_id.to_string()).or_default().clone()
    }

    fn prepare(&self, text: &str) -> String {
        let text = if self.normalize_text {
            normalize(text)
        } else {
            text.to_string()
        };
        match &self.empty_text {
            Some(placeholder) if text.trim().is_empty() => placeholder.clone(),
            _ => text,
        }
    }
}

/// Collapse whitespace within each line, trim, and drop blank lines.
pub fn normalize(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ResultSink for CsvWorkbookSink {
    async fn deliver(&self, entity_id: &str, cells: &[CellValue]) -> Result<Vec<CellRejection>, SinkError> {
        let mut updates = Vec::with_capacity(cells.len());
        let mut rejections = Vec::new();

        for cell in cells {
            match parse_a1(&cell.destination) {
                Some((row, col)) => updates.push((row, col, self.prepare(&cell.text))),
                None => rejections.push(CellRejection {
                    destination: cell.destination.clone(),
                    reason: "not an A1 cell reference within A1:XFD1048576".to_string(),
                }),
            }
        }

        if updates.is_empty() {
            return Ok(rejections);
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SinkError::Unavailable(format!("{}: {}", self.dir.display(), e)))?;

        let lock = self.worksheet_lock(entity_id).await;
        let _guard = lock.lock().await;

        let path = self.worksheet_path(entity_id);
        let written = updates.len();
        tokio::task::spawn_blocking(move || write_cells(&path, updates))
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r)
            .map_err(|reason| SinkError::Worksheet {
                worksheet: entity_id.to_string(),
                reason,
            })?;

        debug!(entity = entity_id, "Wrote {} cells", written);
        Ok(rejections)
    }
}

fn write_cells(path: &Path, updates: Vec<(usize, usize, String)>) -> Result<(), String> {
    let mut grid = read_grid(path)?;

    for (row, col, text) in updates {
        if grid.len() <= row {
            grid.resize_with(row + 1, Vec::new);
        }
        let cells = &mut grid[row];
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = text;
    }

    // Ragged rows: only addressed cells are materialized. An empty row is
    // written as one empty field so it is not read back as a blank line.
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| e.to_string())?;
    for mut row in grid {
        if row.is_empty() {
            row.push(String::new());
        }
        writer.write_record(&row).map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())
}

fn read_grid(path: &Path) -> Result<Vec<Vec<String>>, String> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| e.to_string())?;

    reader
        .records()
        .map(|r| {
            r.map(|record| record.iter().map(str::to_string).collect())
                .map_err(|e| e.to_string())
        })
        .collect()
}
