//! Batch orchestration: one entity at a time through fetch, extraction and
//! delivery, with failures isolated per job and per entity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use futures_util::{stream, StreamExt};
use tracing::{debug, error, info, warn};

use super::extract::{fail_all, ExtractionResult, RegionPipeline};
use super::report::{EntityReport, RunReport};
use super::retry::{retry, RetryPolicy};
use super::state::{EntityState, Stage};
use crate::error::{ErrorKind, FetchError, SheetOcrError, SinkError};
use crate::io::{CellValue, DocumentSource, ResultSink};
use crate::models::{ConfigRow, EntityJobSet, SheetOcrConfig};
use crate::ocr::TextRecognizer;
use crate::pdf::DocumentRasterizer;

/// Shared flag that stops new entities from starting.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Callback invoked with each finished (or skipped) entity.
pub type EntityObserver = Arc<dyn Fn(&EntityReport) + Send + Sync>;

/// Drives entities through the pipeline.
pub struct Orchestrator {
    pipeline: RegionPipeline,
    source: Arc<dyn DocumentSource>,
    sink: Arc<dyn ResultSink>,
    retry: RetryPolicy,
    concurrency: usize,
    cancel: CancelToken,
    observer: Option<EntityObserver>,
}

impl Orchestrator {
    /// Build an orchestrator. Fails if the configuration is inconsistent.
    pub fn new(
        config: &SheetOcrConfig,
        rasterizer: Arc<dyn DocumentRasterizer>,
        recognizer: Arc<dyn TextRecognizer>,
        source: Arc<dyn DocumentSource>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self, SheetOcrError> {
        config.validate()?;

        let mut pipeline =
            RegionPipeline::new(rasterizer, recognizer, config.raster.dpi, config.ocr.languages.clone());
        if config.workspace.keep_images {
            pipeline = pipeline.keep_images_in(&config.workspace.images_dir);
        }

        Ok(Self {
            pipeline,
            source,
            sink,
            retry: config.fetch.retry.clone(),
            concurrency: config.run.concurrency,
            cancel: CancelToken::new(),
            observer: None,
        })
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_observer(mut self, observer: EntityObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Process every row. Entity reports keep the row order.
    ///
    /// Only an unavailable sink aborts the run; every other failure is
    /// recorded in the report.
    pub async fn run(&self, rows: &[ConfigRow]) -> Result<RunReport, SheetOcrError> {
        let mut report = RunReport::new(Utc::now());
        let fatal: Mutex<Option<SinkError>> = Mutex::new(None);

        info!("Processing {} entities (concurrency {})", rows.len(), self.concurrency);

        report.entities = stream::iter(rows.iter().map(EntityJobSet::from_row))
            .map(|set| self.process_or_skip(set, &fatal))
            .buffered(self.concurrency)
            .collect()
            .await;

        if let Some(e) = fatal.lock().ok().and_then(|mut f| f.take()) {
            error!("Run aborted: {}", e);
            return Err(e.into());
        }

        report.cancelled = self.cancel.is_cancelled();
        info!(
            "Run finished: {} done, {} failed, {} not started",
            report.count_in(|s| s == EntityState::Done),
            report.count_in(EntityState::is_failed),
            report.count_in(|s| s == EntityState::Pending)
        );
        Ok(report)
    }

    async fn process_or_skip(&self, set: EntityJobSet, fatal: &Mutex<Option<SinkError>>) -> EntityReport {
        let halted = fatal.lock().map(|f| f.is_some()).unwrap_or(true);
        let report = if halted || self.cancel.is_cancelled() {
            debug!(entity = %set.entity_id, "Not started");
            EntityReport::pending(&set.entity_id)
        } else {
            match self.process_entity(&set).await {
                Ok(report) => report,
                Err(e) => {
                    if let Ok(mut slot) = fatal.lock() {
                        slot.get_or_insert(e);
                    }
                    EntityReport::pending(&set.entity_id)
                }
            }
        };

        if let Some(observer) = &self.observer {
            observer(&report);
        }
        report
    }

    /// Run one entity end to end.
    ///
    /// Returns `Err` only when the sink is unavailable.
    pub async fn process_entity(&self, set: &EntityJobSet) -> Result<EntityReport, SinkError> {
        let start = Instant::now();
        let entity_id = set.entity_id.as_str();
        let mut report = EntityReport::pending(entity_id);

        if set.jobs().next().is_none() {
            let reason = match set.malformed_count() {
                0 => "row has no region instructions".to_string(),
                n => format!("no valid region instructions ({} malformed)", n),
            };
            warn!(entity = entity_id, "Not fetching: {}", reason);
            report.outcomes = fail_all(set, ErrorKind::MalformedConfig, &reason);
            report.error = Some(reason);
            let state = EntityState::Pending.advance(EntityState::Failed(Stage::Extracting));
            return Ok(self.finish(report, state, start));
        }

        let mut state = EntityState::Pending.advance(EntityState::Fetching);

        info!(entity = entity_id, "Fetching document");
        let fetched = retry(
            &self.retry,
            &format!("fetch {}", entity_id),
            |_| self.source.fetch(entity_id),
            FetchError::is_transient,
        )
        .await;

        let document = match fetched {
            Ok(document) => document,
            Err(e) => {
                warn!(entity = entity_id, "Fetch failed: {}", e);
                report.outcomes = fail_all(set, ErrorKind::FetchFailure, &e.to_string());
                report.error = Some(e.to_string());
                return Ok(self.finish(report, state.advance(EntityState::Failed(Stage::Fetching)), start));
            }
        };
        report.document = Some(document.name.clone());
        state = state.advance(EntityState::Rasterizing);

        let pipeline = self.pipeline.clone();
        let job_set = set.clone();
        let extracted = tokio::task::spawn_blocking(move || pipeline.extract(&job_set, &document))
            .await
            .map_err(|e| format!("extraction task failed: {}", e))
            .and_then(|r| r.map_err(|e| e.to_string()));

        match extracted {
            Ok(outcomes) => report.outcomes = outcomes,
            Err(reason) => {
                warn!(entity = entity_id, "Cannot rasterize document: {}", reason);
                report.outcomes = fail_all(set, ErrorKind::RasterFailure, &reason);
                report.error = Some(reason);
                return Ok(self.finish(report, state.advance(EntityState::Failed(Stage::Rasterizing)), start));
            }
        };
        state = state.advance(EntityState::Extracting);

        let cells: Vec<CellValue> = report
            .outcomes
            .iter()
            .filter_map(|o| Some(CellValue::new(o.destination()?, o.result.text()?)))
            .collect();

        if cells.is_empty() {
            report.error = Some("no region produced text".to_string());
            return Ok(self.finish(report, state.advance(EntityState::Failed(Stage::Extracting)), start));
        }

        state = state.advance(EntityState::Delivering);
        let skipped = report.outcomes.len() - cells.len();
        if skipped > 0 {
            warn!(entity = entity_id, "Skipping {} failed cells", skipped);
        }

        match self.sink.deliver(entity_id, &cells).await {
            Ok(rejections) => {
                for rejection in &rejections {
                    warn!(
                        entity = entity_id,
                        destination = %rejection.destination,
                        "Sink rejected cell: {}",
                        rejection.reason
                    );
                    for outcome in report
                        .outcomes
                        .iter_mut()
                        .filter(|o| o.is_ok() && o.destination() == Some(rejection.destination.as_str()))
                    {
                        outcome.result = ExtractionResult::failed(ErrorKind::DeliveryFailure, &rejection.reason);
                    }
                }
                report.delivered = report.outcomes.iter().filter(|o| o.is_ok()).count();
                state = state.advance(EntityState::Done);
            }
            Err(e @ SinkError::Unavailable(_)) => return Err(e),
            Err(e) => {
                warn!(entity = entity_id, "Delivery failed: {}", e);
                for outcome in report.outcomes.iter_mut().filter(|o| o.is_ok()) {
                    outcome.result = ExtractionResult::failed(ErrorKind::DeliveryFailure, &e);
                }
                report.error = Some(e.to_string());
                state = state.advance(EntityState::Failed(Stage::Delivering));
            }
        }

        Ok(self.finish(report, state, start))
    }

    fn finish(&self, mut report: EntityReport, state: EntityState, start: Instant) -> EntityReport {
        report.state = state;
        report.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            entity = %report.entity_id,
            state = %report.state,
            delivered = report.delivered,
            failed = report.failed_jobs(),
            "Entity finished in {}ms",
            report.elapsed_ms
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
