//! Error types for the sheetocr-core library.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::region::Rect;

/// Failure categories recorded against jobs and entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    MalformedConfig,
    FetchFailure,
    RasterFailure,
    EmptyRegion,
    RecognitionFailure,
    DeliveryFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::MalformedConfig => "MalformedConfig",
            ErrorKind::FetchFailure => "FetchFailure",
            ErrorKind::RasterFailure => "RasterFailure",
            ErrorKind::EmptyRegion => "EmptyRegion",
            ErrorKind::RecognitionFailure => "RecognitionFailure",
            ErrorKind::DeliveryFailure => "DeliveryFailure",
        };
        f.write_str(name)
    }
}

/// Main error type for the sheetocr library.
#[derive(Error, Debug)]
pub enum SheetOcrError {
    /// A region instruction could not be parsed.
    #[error("region config error: {0}")]
    Region(#[from] RegionParseError),

    /// Page rasterization error.
    #[error("raster error: {0}")]
    Raster(#[from] RasterError),

    /// Region cropping error.
    #[error("crop error: {0}")]
    Crop(#[from] CropError),

    /// Text recognition error.
    #[error("recognition error: {0}")]
    Recognition(#[from] RecognitionError),

    /// Document acquisition error.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Result sink error.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SheetOcrError {
    /// The job-level failure category, if this error maps to one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SheetOcrError::Region(_) => Some(ErrorKind::MalformedConfig),
            SheetOcrError::Raster(_) => Some(ErrorKind::RasterFailure),
            SheetOcrError::Crop(_) => Some(ErrorKind::EmptyRegion),
            SheetOcrError::Recognition(_) => Some(ErrorKind::RecognitionFailure),
            SheetOcrError::Fetch(_) => Some(ErrorKind::FetchFailure),
            SheetOcrError::Sink(_) => Some(ErrorKind::DeliveryFailure),
            SheetOcrError::Image(_) | SheetOcrError::Io(_) | SheetOcrError::Json(_) | SheetOcrError::Config(_) => None,
        }
    }
}

/// Errors raised while parsing a `page,destination,x1,y1,x2,y2` instruction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionParseError {
    /// Wrong number of comma-separated fields.
    #[error("expected 6 comma-separated fields, found {0}")]
    Arity(usize),

    /// A numeric field is not a non-negative integer.
    #[error("field `{field}` (position {position}) is not a non-negative integer: {value:?}")]
    NotANumber {
        field: &'static str,
        position: usize,
        value: String,
    },

    /// Pages are 1-based.
    #[error("field `page` (position 1) must be at least 1")]
    PageZero,

    /// The destination field is blank.
    #[error("field `destination` (position 2) is empty")]
    EmptyDestination,

    /// `x1 >= x2` or `y1 >= y2`.
    #[error("rectangle ({x1}, {y1}, {x2}, {y2}) is inverted or empty")]
    InvertedRect { x1: u32, y1: u32, x2: u32, y2: u32 },
}

/// Errors related to page rasterization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RasterError {
    /// The document could not be opened or parsed.
    #[error("failed to open document: {0}")]
    Open(String),

    /// The document is encrypted with a non-empty password.
    #[error("document is encrypted")]
    Encrypted,

    /// Requested page does not exist.
    #[error("page {page} is out of range (document has {count} pages)")]
    PageOutOfRange { page: u32, count: u32 },

    /// The page-rendering engine is missing.
    #[error("rendering backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The renderer ran but produced no usable bitmap.
    #[error("failed to render page {page}: {reason}")]
    Render { page: u32, reason: String },
}

/// Errors related to cropping a region out of a page.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CropError {
    /// The rectangle does not overlap the page at all.
    #[error("region {rect} lies outside the {width}x{height} page")]
    EmptyRegion { rect: Rect, width: u32, height: u32 },
}

/// Errors related to text recognition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// Failed to load a language model.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// The input image has a zero dimension.
    #[error("invalid image: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    /// None of the requested languages has a loaded model.
    #[error("no model loaded for languages {0:?}")]
    NoModel(Vec<String>),

    /// The engine failed while reading the image.
    #[error("text recognition failed: {0}")]
    Engine(String),
}

/// Errors related to acquiring an entity's document.
#[derive(Error, Debug)]
pub enum FetchError {
    /// No document exists for the entity.
    #[error("no document found for {0}")]
    NotFound(String),

    /// Transport or HTTP status failure.
    #[error("request failed: {0}")]
    Http(String),

    /// I/O error while reading or storing the document.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, FetchError::NotFound(_))
    }
}

/// Errors raised by a result sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The sink session is gone; no entity can be delivered.
    #[error("result sink unavailable: {0}")]
    Unavailable(String),

    /// One worksheet could not be written.
    #[error("failed to write worksheet {worksheet}: {reason}")]
    Worksheet { worksheet: String, reason: String },
}

/// Result type for the sheetocr library.
pub type Result<T> = std::result::Result<T, SheetOcrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err: SheetOcrError = RegionParseError::Arity(5).into();
        assert_eq!(err.kind(), Some(ErrorKind::MalformedConfig));

        let err: SheetOcrError = RasterError::Encrypted.into();
        assert_eq!(err.kind(), Some(ErrorKind::RasterFailure));

        let err = SheetOcrError::Config("bad".to_string());
        assert_eq!(err.kind(), None);
    }

    #[test]
    fn test_parse_error_names_field() {
        let err = RegionParseError::NotANumber {
            field: "x2",
            position: 5,
            value: "abc".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("x2"));
        assert!(msg.contains("position 5"));
    }
}
