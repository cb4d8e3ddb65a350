//! Text recognition over cropped regions.

mod recognizer;
#[cfg(feature = "native")]
mod pure_engine;

pub use recognizer::MultiLanguageRecognizer;
#[cfg(feature = "native")]
pub use pure_engine::PureOnnxModel;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::RecognitionError;

/// A detected text box with its coordinates and content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    /// Quadrilateral (x1, y1, x2, y2, x3, y3, x4, y4), relative to the crop.
    pub bbox: [f32; 8],

    /// Recognized text content.
    pub text: String,

    /// Recognition confidence (0.0 - 1.0).
    pub confidence: f32,
}

impl TextBox {
    /// Get the axis-aligned bounding rectangle.
    pub fn rect(&self) -> (f32, f32, f32, f32) {
        let xs = [self.bbox[0], self.bbox[2], self.bbox[4], self.bbox[6]];
        let ys = [self.bbox[1], self.bbox[3], self.bbox[5], self.bbox[7]];

        let min_x = xs.iter().cloned().fold(f32::INFINITY, f32::min);
        let max_x = xs.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let min_y = ys.iter().cloned().fold(f32::INFINITY, f32::min);
        let max_y = ys.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

        (min_x, min_y, max_x, max_y)
    }

    fn center_y(&self) -> f32 {
        let (_, min_y, _, max_y) = self.rect();
        (min_y + max_y) / 2.0
    }
}

/// One OCR model for one language.
pub trait LanguageModel: Send + Sync {
    /// Language code this model reads, e.g. `vi`.
    fn language(&self) -> &str;

    /// Detect and read every text box in the image.
    fn read(&self, image: &DynamicImage) -> Result<Vec<TextBox>, RecognitionError>;
}

/// Reads the text of one cropped region.
pub trait TextRecognizer: Send + Sync {
    /// Recognize the text in `image` using the given languages.
    ///
    /// Returns best-effort text with line structure preserved. Only
    /// structural problems fail; low confidence never does.
    fn recognize(&self, image: &DynamicImage, languages: &[String]) -> Result<String, RecognitionError>;
}

/// Join boxes in reading order: words on one visual row with a space, rows
/// with a newline.
pub fn compose_text(boxes: &[TextBox]) -> String {
    let mut ordered: Vec<&TextBox> = boxes.iter().filter(|b| !b.text.trim().is_empty()).collect();
    ordered.sort_by(|a, b| a.center_y().total_cmp(&b.center_y()));

    let mut rows: Vec<Vec<&TextBox>> = Vec::new();
    for text_box in ordered {
        let (_, min_y, _, max_y) = text_box.rect();
        let same_row = rows.last().is_some_and(|row| {
            let anchor = row[0];
            let (_, a_min, _, a_max) = anchor.rect();
            let tolerance = ((a_max - a_min).min(max_y - min_y) / 2.0).max(1.0);
            (text_box.center_y() - anchor.center_y()).abs() <= tolerance
        });

        match rows.last_mut() {
            Some(row) if same_row => row.push(text_box),
            _ => rows.push(vec![text_box]),
        }
    }

    rows.into_iter()
        .map(|mut row| {
            row.sort_by(|a, b| a.rect().0.total_cmp(&b.rect().0));
            row.iter()
                .map(|b| b.text.trim())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
pub(crate) fn text_box(x: f32, y: f32, w: f32, h: f32, text: &str, confidence: f32) -> TextBox {
    TextBox {
        bbox: [x, y, x + w, y, x + w, y + h, x, y + h],
        text: text.to_string(),
        confidence,
    }
}
