//! Per-entity and per-run reports.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::extract::JobOutcome;
use super::state::EntityState;
use crate::error::SheetOcrError;

/// What happened to one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityReport {
    pub entity_id: String,
    pub state: EntityState,
    /// Name of the fetched document, if any.
    pub document: Option<String>,
    /// One outcome per non-empty config cell, in column order.
    pub outcomes: Vec<JobOutcome>,
    /// Cells the sink accepted.
    pub delivered: usize,
    /// Entity-level failure, if any.
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl EntityReport {
    pub fn pending(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: EntityState::Pending,
            document: None,
            outcomes: Vec::new(),
            delivered: 0,
            error: None,
            elapsed_ms: 0,
        }
    }

    /// Number of jobs that did not produce a delivered value.
    pub fn failed_jobs(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_ok()).count()
    }
}

/// Everything a batch run did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub entities: Vec<EntityReport>,
    /// Set when the run stopped early on request.
    pub cancelled: bool,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            entities: Vec::new(),
            cancelled: false,
        }
    }

    pub fn has_failed_entities(&self) -> bool {
        self.entities.iter().any(|e| e.state.is_failed())
    }

    pub fn count_in(&self, predicate: impl Fn(EntityState) -> bool) -> usize {
        self.entities.iter().filter(|e| predicate(e.state)).count()
    }

    /// Plain-text summary: totals, then one line per entity and per failed job.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let done = self.count_in(|s| s == EntityState::Done);
        let failed = self.count_in(EntityState::is_failed);
        let pending = self.count_in(|s| s == EntityState::Pending);

        let _ = writeln!(out, "Run started {}", self.started_at.to_rfc3339());
        let _ = writeln!(
            out,
            "{} entities: {} done, {} failed, {} not started{}",
            self.entities.len(),
            done,
            failed,
            pending,
            if self.cancelled { " (cancelled)" } else { "" }
        );

        for entity in &self.entities {
            let _ = write!(
                out,
                "\n{}: {} ({}/{} cells delivered, {}ms)",
                entity.entity_id,
                entity.state,
                entity.delivered,
                entity.outcomes.len(),
                entity.elapsed_ms
            );
            if let Some(error) = &entity.error {
                let _ = write!(out, " - {}", error);
            }
            out.push('\n');

            for outcome in entity.outcomes.iter().filter(|o| !o.is_ok()) {
                if let super::ExtractionResult::Failed { kind, reason } = &outcome.result {
                    let _ = writeln!(out, "  column {} [{}]: {} - {}", outcome.column, outcome.raw, kind, reason);
                }
            }
        }

        out
    }

    /// Write `run-<timestamp>.json` and `run-<timestamp>.txt` into `dir`.
    ///
    /// The timestamp has millisecond precision; a numeric suffix is added if
    /// a report with the same name already exists. Returns the JSON path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, SheetOcrError> {
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(self)?;

        let stamp = self.started_at.format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let mut stem = format!("run-{}", stamp);
        let mut suffix = 1;
        while dir.join(format!("{}.json", stem)).exists() {
            suffix += 1;
            stem = format!("run-{}-{}", stamp, suffix);
        }

        let json_path = dir.join(format!("{}.json", stem));
        std::fs::write(&json_path, json)?;
        std::fs::write(dir.join(format!("{}.txt", stem)), self.summary())?;

        Ok(json_path)
    }
}
