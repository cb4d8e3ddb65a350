//! Core library for region-based document OCR.
//!
//! This crate provides:
//! - Region instructions (`page,destination,x1,y1,x2,y2`) and their parsing
//! - Page rasterization (poppler) and region cropping
//! - Multi-language text recognition using `pure-onnx-ocr` models
//! - Batch orchestration with per-job failure isolation and run reports

pub mod error;
pub mod io;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pipeline;

pub use error::{ErrorKind, Result, SheetOcrError};
pub use io::{CellRejection, CellValue, ConfigSource, DocumentSource, LocalDocumentSource, MemorySink, ResultSink};
pub use models::{ConfigRow, EntityJobSet, Rect, RegionJob, SheetOcrConfig};
pub use ocr::{LanguageModel, MultiLanguageRecognizer, TextBox, TextRecognizer};
#[cfg(feature = "native")]
pub use ocr::PureOnnxModel;
pub use pdf::{DocumentRasterizer, OpenedDocument, PopplerRasterizer, RasterPage, SourceDocument};
pub use pipeline::{
    CancelToken, EntityReport, EntityState, ExtractionResult, JobOutcome, Orchestrator, RegionPipeline,
    RetryPolicy, RunReport, Stage,
};
