//! Page rasterization through poppler's `pdftoppm`, with lopdf for page accounting.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use lopdf::Document;
use tempfile::TempDir;
use tracing::{debug, trace};

use super::{DocumentRasterizer, OpenedDocument, RasterPage, Result, SourceDocument};
use crate::error::RasterError;
use crate::models::config::RasterConfig;

/// Rasterizer backed by the poppler `pdftoppm` binary.
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    pdftoppm: PathBuf,
}

impl PopplerRasterizer {
    /// Create a rasterizer using the given `pdftoppm` binary.
    pub fn new(pdftoppm: impl Into<PathBuf>) -> Self {
        Self {
            pdftoppm: pdftoppm.into(),
        }
    }

    pub fn from_config(config: &RasterConfig) -> Self {
        Self::new(&config.pdftoppm_path)
    }

    /// Whether the `pdftoppm` binary can be launched.
    pub fn is_available(&self) -> bool {
        Command::new(&self.pdftoppm).arg("-v").output().is_ok()
    }

    fn load(&self, document: &SourceDocument) -> Result<Document> {
        let mut doc =
            Document::load_mem(&document.bytes).map_err(|e| RasterError::Open(e.to_string()))?;

        // Empty-password encryption is common on published reports.
        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(RasterError::Encrypted);
            }
            debug!("Decrypted {} with empty password", document.name);
        }

        Ok(doc)
    }

    fn render(&self, input: &Path, output_prefix: &Path, page: u32, dpi: u32) -> Result<()> {
        let output = Command::new(&self.pdftoppm)
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-singlefile")
            .arg("-png")
            .arg(input)
            .arg(output_prefix)
            .output()
            .map_err(|e| match e.kind() {
                IoErrorKind::NotFound | IoErrorKind::PermissionDenied => {
                    RasterError::BackendUnavailable(format!("{}: {}", self.pdftoppm.display(), e))
                }
                _ => RasterError::Render {
                    page,
                    reason: e.to_string(),
                },
            })?;

        if !output.status.success() {
            return Err(RasterError::Render {
                page,
                reason: format!(
                    "pdftoppm exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(())
    }
}

impl Default for PopplerRasterizer {
    fn default() -> Self {
        Self::from_config(&RasterConfig::default())
    }
}

impl DocumentRasterizer for PopplerRasterizer {
    fn page_count(&self, document: &SourceDocument) -> Result<u32> {
        let doc = self.load(document)?;
        let count = doc.get_pages().len() as u32;
        if count == 0 {
            return Err(RasterError::Open("document has no pages".to_string()));
        }
        debug!("{} has {} pages", document.name, count);
        Ok(count)
    }

    fn rasterize(&self, document: &SourceDocument, page: u32, dpi: u32) -> Result<RasterPage> {
        self.open(document)?.rasterize(page, dpi)
    }

    /// Parse the document once and stage a single temp copy for `pdftoppm`.
    fn open<'a>(&'a self, document: &'a SourceDocument) -> Result<Box<dyn OpenedDocument + 'a>> {
        let page_count = self.page_count(document)?;

        let stage_err = |e: std::io::Error| RasterError::Open(format!("cannot stage document: {}", e));
        let dir = tempfile::tempdir().map_err(stage_err)?;
        let input = dir.path().join("document.pdf");
        std::fs::write(&input, &document.bytes).map_err(stage_err)?;

        Ok(Box::new(PopplerDocument {
            rasterizer: self,
            name: &document.name,
            dir,
            input,
            page_count,
        }))
    }
}

/// A parsed document staged on disk for `pdftoppm`; removed on drop.
struct PopplerDocument<'a> {
    rasterizer: &'a PopplerRasterizer,
    name: &'a str,
    dir: TempDir,
    input: PathBuf,
    page_count: u32,
}

impl OpenedDocument for PopplerDocument<'_> {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn rasterize(&self, page: u32, dpi: u32) -> Result<RasterPage> {
        if page == 0 || page > self.page_count {
            return Err(RasterError::PageOutOfRange {
                page,
                count: self.page_count,
            });
        }

        let output_prefix = self.dir.path().join(format!("page-{}-{}", page, dpi));
        self.rasterizer.render(&self.input, &output_prefix, page, dpi)?;

        let output = output_prefix.with_extension("png");
        let image = image::open(&output)
            .map_err(|e| RasterError::Render {
                page,
                reason: e.to_string(),
            })?
            .to_rgb8();
        let _ = std::fs::remove_file(&output);

        trace!(
            "Rasterized {} page {} at {} DPI: {}x{}",
            self.name,
            page,
            dpi,
            image.width(),
            image.height()
        );

        Ok(RasterPage::new(page, image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    fn sample_pdf(texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 36.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_page_count() {
        let document = SourceDocument::new("two.pdf", sample_pdf(&["ABC", "123"]));
        let rasterizer = PopplerRasterizer::default();
        assert_eq!(rasterizer.page_count(&document).unwrap(), 2);
    }

    #[test]
    fn test_corrupt_document() {
        let document = SourceDocument::new("broken.pdf", b"not a pdf at all".to_vec());
        let rasterizer = PopplerRasterizer::default();
        assert!(matches!(
            rasterizer.page_count(&document),
            Err(RasterError::Open(_))
        ));
    }

    #[test]
    fn test_page_out_of_range() {
        let document = SourceDocument::new("two.pdf", sample_pdf(&["ABC", "123"]));
        let rasterizer = PopplerRasterizer::default();
        assert_eq!(
            rasterizer.rasterize(&document, 3, 72).unwrap_err(),
            RasterError::PageOutOfRange { page: 3, count: 2 }
        );
    }

    #[test]
    fn test_open_parses_once() {
        let document = SourceDocument::new("two.pdf", sample_pdf(&["ABC", "123"]));
        let rasterizer = PopplerRasterizer::new("/nonexistent/bin/pdftoppm");
        let opened = rasterizer.open(&document).unwrap();

        assert_eq!(opened.page_count(), 2);
        assert_eq!(
            opened.rasterize(0, 72).unwrap_err(),
            RasterError::PageOutOfRange { page: 0, count: 2 }
        );
        // Pages in range go straight to the backend.
        assert!(matches!(
            opened.rasterize(2, 72),
            Err(RasterError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_open_corrupt_document() {
        let document = SourceDocument::new("broken.pdf", b"not a pdf at all".to_vec());
        let rasterizer = PopplerRasterizer::default();
        assert!(matches!(rasterizer.open(&document), Err(RasterError::Open(_))));
    }

    #[test]
    fn test_missing_backend() {
        let document = SourceDocument::new("one.pdf", sample_pdf(&["ABC"]));
        let rasterizer = PopplerRasterizer::new("/nonexistent/bin/pdftoppm");
        assert!(!rasterizer.is_available());
        assert!(matches!(
            rasterizer.rasterize(&document, 1, 72),
            Err(RasterError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_rasterize_is_deterministic() {
        let rasterizer = PopplerRasterizer::default();
        if !rasterizer.is_available() {
            eprintln!("pdftoppm not installed, skipping");
            return;
        }

        let document = SourceDocument::new("one.pdf", sample_pdf(&["ABC"]));
        let first = rasterizer.rasterize(&document, 1, 72).unwrap();
        let second = rasterizer.open(&document).unwrap().rasterize(1, 72).unwrap();

        // 8.5x11in at 72 DPI
        assert_eq!((first.width(), first.height()), (612, 792));
        assert_eq!(first, second);
    }
}
