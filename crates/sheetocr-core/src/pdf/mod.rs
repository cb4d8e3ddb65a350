//! Document rasterization and region cropping.

mod crop;
mod poppler;

pub use crop::crop_region;
pub use poppler::PopplerRasterizer;

use image::RgbImage;

use crate::error::RasterError;

/// Result type for rasterization.
pub type Result<T> = std::result::Result<T, RasterError>;

/// A document as delivered by a document source.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// File name or URL tail, for logs and reports.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// One rasterized page.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterPage {
    /// 1-based page index.
    pub page: u32,
    pub image: RgbImage,
}

impl RasterPage {
    pub fn new(page: u32, image: RgbImage) -> Self {
        Self { page, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Turns document pages into bitmaps.
///
/// Implementations must be deterministic: the same bytes, page and DPI
/// give pixel-identical output.
pub trait DocumentRasterizer: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self, document: &SourceDocument) -> Result<u32>;

    /// Render a 1-based page at the given DPI.
    fn rasterize(&self, document: &SourceDocument, page: u32, dpi: u32) -> Result<RasterPage>;

    /// Open a document for rendering several of its pages.
    ///
    /// The default counts pages once and forwards each render to
    /// [`rasterize`](Self::rasterize). Backends with costly setup override it.
    fn open<'a>(&'a self, document: &'a SourceDocument) -> Result<Box<dyn OpenedDocument + 'a>> {
        let page_count = self.page_count(document)?;
        Ok(Box::new(Forwarding {
            rasterizer: self,
            document,
            page_count,
        }))
    }
}

/// A document whose page count is known and whose pages can be rendered
/// without re-reading it.
pub trait OpenedDocument {
    fn page_count(&self) -> u32;

    /// Render a 1-based page at the given DPI.
    fn rasterize(&self, page: u32, dpi: u32) -> Result<RasterPage>;
}

struct Forwarding<'a, R: ?Sized> {
    rasterizer: &'a R,
    document: &'a SourceDocument,
    page_count: u32,
}

impl<R: DocumentRasterizer + ?Sized> OpenedDocument for Forwarding<'_, R> {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn rasterize(&self, page: u32, dpi: u32) -> Result<RasterPage> {
        self.rasterizer.rasterize(self.document, page, dpi)
    }
}
