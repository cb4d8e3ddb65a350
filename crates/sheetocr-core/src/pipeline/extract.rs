//! Region extraction for one entity: rasterize, crop, recognize.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::error::{ErrorKind, RasterError};
use crate::models::{EntityJobSet, RegionJob};
use crate::ocr::TextRecognizer;
use crate::pdf::{crop_region, DocumentRasterizer, OpenedDocument, RasterPage, SourceDocument};

/// Result of one region job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExtractionResult {
    Ok { text: String },
    Failed { kind: ErrorKind, reason: String },
}

impl ExtractionResult {
    pub fn ok(text: impl Into<String>) -> Self {
        ExtractionResult::Ok { text: text.into() }
    }

    pub fn failed(kind: ErrorKind, reason: impl ToString) -> Self {
        ExtractionResult::Failed {
            kind,
            reason: reason.to_string(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ExtractionResult::Ok { text } => Some(text),
            ExtractionResult::Failed { .. } => None,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ExtractionResult::Ok { .. } => None,
            ExtractionResult::Failed { kind, .. } => Some(*kind),
        }
    }
}

/// One configured cell and what became of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// 1-based sheet column of the config cell.
    pub column: usize,
    pub raw: String,
    /// Parsed job, absent when the cell was malformed.
    pub job: Option<RegionJob>,
    pub result: ExtractionResult,
}

impl JobOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self.result, ExtractionResult::Ok { .. })
    }

    pub fn destination(&self) -> Option<&str> {
        self.job.as_ref().map(|job| job.destination.as_str())
    }
}

/// Outcomes for a job set where no page could be reached.
///
/// Malformed cells keep their parse error; every parsed job gets `kind`.
pub fn fail_all(set: &EntityJobSet, kind: ErrorKind, reason: &str) -> Vec<JobOutcome> {
    set.slots
        .iter()
        .map(|slot| match &slot.parsed {
            Ok(job) => JobOutcome {
                column: slot.column,
                raw: slot.raw.clone(),
                job: Some(job.clone()),
                result: ExtractionResult::failed(kind, reason),
            },
            Err(e) => JobOutcome {
                column: slot.column,
                raw: slot.raw.clone(),
                job: None,
                result: ExtractionResult::failed(ErrorKind::MalformedConfig, e),
            },
        })
        .collect()
}

/// Synchronous extraction over one document.
///
/// Each distinct page is rasterized at most once and dropped as soon as no
/// later job references it. Recognition runs once per job.
#[derive(Clone)]
pub struct RegionPipeline {
    rasterizer: Arc<dyn DocumentRasterizer>,
    recognizer: Arc<dyn TextRecognizer>,
    dpi: u32,
    languages: Vec<String>,
    keep_images: Option<PathBuf>,
}

impl RegionPipeline {
    pub fn new(
        rasterizer: Arc<dyn DocumentRasterizer>,
        recognizer: Arc<dyn TextRecognizer>,
        dpi: u32,
        languages: Vec<String>,
    ) -> Self {
        Self {
            rasterizer,
            recognizer,
            dpi,
            languages,
            keep_images: None,
        }
    }

    /// Save each rasterized page under `dir/<entity>/` before releasing it.
    pub fn keep_images_in(mut self, dir: impl Into<PathBuf>) -> Self {
        self.keep_images = Some(dir.into());
        self
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Run every job of `set` against `document`.
    ///
    /// Fails only when the document cannot be opened at all. Everything
    /// else is recorded per job, in slot order.
    pub fn extract(&self, set: &EntityJobSet, document: &SourceDocument) -> Result<Vec<JobOutcome>, RasterError> {
        let start = Instant::now();
        let opened = self.rasterizer.open(document)?;
        let page_count = opened.page_count();

        // Outstanding references per page, used to release pages early.
        let mut remaining: HashMap<u32, usize> = HashMap::new();
        for (_, job) in set.jobs() {
            if job.page <= page_count {
                *remaining.entry(job.page).or_default() += 1;
            }
        }

        let mut pages: HashMap<u32, Result<RasterPage, RasterError>> = HashMap::new();
        let mut outcomes = Vec::with_capacity(set.slots.len());

        for slot in &set.slots {
            let job = match &slot.parsed {
                Ok(job) => job,
                Err(e) => {
                    outcomes.push(JobOutcome {
                        column: slot.column,
                        raw: slot.raw.clone(),
                        job: None,
                        result: ExtractionResult::failed(ErrorKind::MalformedConfig, e),
                    });
                    continue;
                }
            };

            let result = if job.page > page_count {
                let e = RasterError::PageOutOfRange {
                    page: job.page,
                    count: page_count,
                };
                warn!(entity = %set.entity_id, column = slot.column, "{}", e);
                ExtractionResult::failed(ErrorKind::RasterFailure, e)
            } else {
                let page = pages
                    .entry(job.page)
                    .or_insert_with(|| self.rasterize(&set.entity_id, opened.as_ref(), job.page));
                self.run_job(&set.entity_id, job, page)
            };

            if let ExtractionResult::Failed { kind, reason } = &result {
                warn!(
                    entity = %set.entity_id,
                    column = slot.column,
                    page = job.page,
                    destination = %job.destination,
                    rect = %job.rect,
                    "{}: {}",
                    kind,
                    reason
                );
            }

            outcomes.push(JobOutcome {
                column: slot.column,
                raw: slot.raw.clone(),
                job: Some(job.clone()),
                result,
            });

            self.release(&set.entity_id, job.page, &mut remaining, &mut pages);
        }

        info!(
            entity = %set.entity_id,
            "Extracted {}/{} regions from {} pages in {}ms",
            outcomes.iter().filter(|o| o.is_ok()).count(),
            outcomes.len(),
            page_count,
            start.elapsed().as_millis()
        );

        Ok(outcomes)
    }

    fn rasterize(&self, entity_id: &str, opened: &dyn OpenedDocument, page: u32) -> Result<RasterPage, RasterError> {
        debug!(entity = entity_id, page, dpi = self.dpi, "Rasterizing page");
        opened.rasterize(page, self.dpi)
    }

    fn run_job(&self, entity_id: &str, job: &RegionJob, page: &Result<RasterPage, RasterError>) -> ExtractionResult {
        let page = match page {
            Ok(page) => page,
            Err(e) => return ExtractionResult::failed(ErrorKind::RasterFailure, e),
        };

        let crop = match crop_region(page, &job.rect) {
            Ok(crop) => crop,
            Err(e) => return ExtractionResult::failed(ErrorKind::EmptyRegion, e),
        };

        match self.recognizer.recognize(&crop, &self.languages) {
            Ok(text) => {
                trace!(entity = entity_id, destination = %job.destination, "Recognized {:?}", text);
                ExtractionResult::ok(text)
            }
            Err(e) => ExtractionResult::failed(ErrorKind::RecognitionFailure, e),
        }
    }

    fn release(
        &self,
        entity_id: &str,
        page: u32,
        remaining: &mut HashMap<u32, usize>,
        pages: &mut HashMap<u32, Result<RasterPage, RasterError>>,
    ) {
        let Some(count) = remaining.get_mut(&page) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }

        remaining.remove(&page);
        if let Some(Ok(raster)) = pages.remove(&page) {
            if let Some(dir) = &self.keep_images {
                save_page(&dir.join(entity_id), &raster);
            }
            trace!(entity = entity_id, page, "Released page");
        }
    }
}

fn save_page(dir: &Path, page: &RasterPage) {
    let path = dir.join(format!("page-{}.png", page.page));
    let saved = std::fs::create_dir_all(dir)
        .map_err(|e| e.to_string())
        .and_then(|_| page.image.save(&path).map_err(|e| e.to_string()));
    match saved {
        Ok(()) => debug!("Kept page image {}", path.display()),
        Err(e) => warn!("Failed to keep page image {}: {}", path.display(), e),
    }
}
