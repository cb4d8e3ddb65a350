//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::SheetOcrError;
use crate::pipeline::RetryPolicy;

/// Rasterization DPI that region rectangles are authored against.
///
/// Region coordinates are raster pixels at this resolution. Changing it
/// moves every configured rectangle, so it only changes together with
/// [`RasterConfig::region_dpi`].
pub const DEFAULT_RENDER_DPI: u32 = 200;

/// Main configuration for the sheetocr pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetOcrConfig {
    /// Page rasterization configuration.
    pub raster: RasterConfig,

    /// OCR configuration.
    pub ocr: OcrConfig,

    /// Document acquisition configuration.
    pub fetch: FetchConfig,

    /// Result sink configuration.
    pub sink: SinkConfig,

    /// Temporary artifact locations.
    pub workspace: WorkspaceConfig,

    /// Batch run behavior.
    pub run: RunConfig,
}

/// Page rasterization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// DPI for rendering pages to images.
    pub dpi: u32,

    /// DPI the configured rectangles were measured at. Must equal `dpi`.
    pub region_dpi: u32,

    /// Path or name of the poppler `pdftoppm` binary.
    pub pdftoppm_path: PathBuf,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_RENDER_DPI,
            region_dpi: DEFAULT_RENDER_DPI,
            pdftoppm_path: PathBuf::from("pdftoppm"),
        }
    }
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Active language models, in preference order.
    pub languages: Vec<String>,

    /// Directory holding one model sub-directory per language.
    pub model_dir: PathBuf,

    /// Boxes below this confidence are dropped unless nothing else is left.
    pub min_confidence: f32,

    /// Keep `[UNK]` markers instead of replacing them with spaces.
    pub keep_unk: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: vec!["vi".to_string(), "en".to_string()],
            model_dir: PathBuf::from("models"),
            min_confidence: 0.5,
            keep_unk: false,
        }
    }
}

impl OcrConfig {
    /// Directory holding `det.onnx`, `rec.onnx` and `dict.txt` for a language.
    pub fn language_dir(&self, language: &str) -> PathBuf {
        self.model_dir.join(language)
    }
}

/// Where documents come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSourceKind {
    /// `<local_dir>/<entity>.pdf`
    Local,
    /// Resolve a report link from a listing page, then download it.
    Http,
}

/// Document acquisition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub source: DocumentSourceKind,

    /// Directory used by the local source.
    pub local_dir: PathBuf,

    /// Listing page URL; the entity id is appended.
    pub listing_url: String,

    /// Base for relative document links.
    pub base_url: String,

    /// Text identifying the listing row that links the wanted report.
    pub link_keyword: String,

    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,

    /// Retry policy for acquisition.
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            source: DocumentSourceKind::Local,
            local_dir: PathBuf::from("documents"),
            listing_url: "https://cafef.vn/du-lieu/Ajax/CongTy/BaoCaoTaiChinh.aspx?sym=".to_string(),
            base_url: "https://cafef.vn".to_string(),
            link_keyword: "báo cáo tài chính hợp nhất".to_string(),
            timeout_secs: 60,
            retry: RetryPolicy::default(),
        }
    }
}

/// Result sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Directory holding one worksheet file per entity.
    pub output_dir: PathBuf,

    /// Collapse runs of whitespace within each line and trim.
    pub normalize_text: bool,

    /// Written in place of empty recognized text.
    pub empty_text: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("sheets"),
            normalize_text: false,
            empty_text: None,
        }
    }
}

/// Temporary artifact roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Rasterized pages, written only when `keep_images` is set.
    pub images_dir: PathBuf,

    /// Run reports.
    pub reports_dir: PathBuf,

    /// Keep rasterized pages on disk after use.
    pub keep_images: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            images_dir: PathBuf::from("images"),
            reports_dir: PathBuf::from("reports"),
            keep_images: false,
        }
    }
}

/// Batch run behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Maximum entities in flight.
    pub concurrency: usize,

    /// Exit non-zero when any entity fails.
    pub strict: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            strict: false,
        }
    }
}

impl SheetOcrConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), SheetOcrError> {
        if self.raster.dpi == 0 {
            return Err(SheetOcrError::Config("raster.dpi must be positive".to_string()));
        }
        if self.raster.dpi != self.raster.region_dpi {
            return Err(SheetOcrError::Config(format!(
                "raster.dpi ({}) differs from raster.region_dpi ({}); region rectangles are \
                 raster pixels and must be re-measured when the DPI changes",
                self.raster.dpi, self.raster.region_dpi
            )));
        }
        if self.ocr.languages.is_empty() {
            return Err(SheetOcrError::Config("ocr.languages is empty".to_string()));
        }
        if self.run.concurrency == 0 {
            return Err(SheetOcrError::Config("run.concurrency must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SheetOcrConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.raster.dpi, DEFAULT_RENDER_DPI);
        assert_eq!(config.ocr.languages, vec!["vi", "en"]);
    }

    #[test]
    fn test_dpi_contract_enforced() {
        let mut config = SheetOcrConfig::default();
        config.raster.dpi = 300;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("region_dpi"));

        config.raster.region_dpi = 300;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SheetOcrConfig =
            serde_json::from_str(r#"{"run": {"strict": true}, "fetch": {"source": "http"}}"#).unwrap();
        assert!(config.run.strict);
        assert_eq!(config.run.concurrency, 1);
        assert_eq!(config.fetch.source, DocumentSourceKind::Http);
        assert_eq!(config.fetch.retry.max_attempts, RetryPolicy::default().max_attempts);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = SheetOcrConfig::default();
        config.workspace.keep_images = true;
        config.save(&path).unwrap();

        let loaded = SheetOcrConfig::from_file(&path).unwrap();
        assert!(loaded.workspace.keep_images);
        assert_eq!(loaded.ocr.language_dir("vi"), PathBuf::from("models").join("vi"));
    }
}
