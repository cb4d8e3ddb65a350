//! Multi-language recognition: read a crop with every active language model
//! and keep the best interpretation.

use image::{DynamicImage, GenericImageView};
use tracing::{debug, trace, warn};

use super::{compose_text, LanguageModel, TextBox, TextRecognizer};
use crate::error::RecognitionError;
#[cfg(feature = "native")]
use crate::models::config::OcrConfig;

/// Scores closer than this are considered a tie.
const SCORE_EPSILON: f32 = 1e-3;

/// Recognizer that arbitrates between several language models.
pub struct MultiLanguageRecognizer {
    models: Vec<Box<dyn LanguageModel>>,
    min_confidence: f32,
    keep_unk: bool,
}

/// One language model's reading of a crop.
#[derive(Debug, Clone)]
struct Candidate {
    language: String,
    text: String,
    score: f32,
    diacritics: usize,
}

impl MultiLanguageRecognizer {
    /// Create a recognizer over the given models.
    pub fn new(models: Vec<Box<dyn LanguageModel>>) -> Self {
        Self {
            models,
            min_confidence: 0.5,
            keep_unk: false,
        }
    }

    /// Set the per-box confidence filter.
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Keep `[UNK]` markers in the output.
    pub fn with_keep_unk(mut self, keep_unk: bool) -> Self {
        self.keep_unk = keep_unk;
        self
    }

    /// Load one `pure-onnx-ocr` model per configured language.
    #[cfg(feature = "native")]
    pub fn from_config(config: &OcrConfig) -> Result<Self, RecognitionError> {
        let models = config
            .languages
            .iter()
            .map(|language| {
                super::PureOnnxModel::from_dir(language, &config.language_dir(language))
                    .map(|model| Box::new(model) as Box<dyn LanguageModel>)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(models)
            .with_min_confidence(config.min_confidence)
            .with_keep_unk(config.keep_unk))
    }

    /// Languages with a loaded model.
    pub fn languages(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.language()).collect()
    }

    fn candidate(&self, language: &str, boxes: Vec<TextBox>) -> Candidate {
        let boxes: Vec<TextBox> = boxes
            .into_iter()
            .map(|mut b| {
                if !self.keep_unk {
                    b.text = b.text.replace("[UNK]", " ");
                }
                b
            })
            .collect();

        let confident: Vec<TextBox> = boxes
            .iter()
            .filter(|b| b.confidence >= self.min_confidence)
            .cloned()
            .collect();

        // Best effort: never come back empty-handed just for low confidence.
        let kept = if confident.is_empty() { boxes } else { confident };

        let text = compose_text(&kept);
        Candidate {
            language: language.to_string(),
            score: weighted_confidence(&kept),
            diacritics: count_diacritics(&text),
            text,
        }
    }
}

/// Mean box confidence weighted by the number of characters in each box.
fn weighted_confidence(boxes: &[TextBox]) -> f32 {
    let (weighted, chars) = boxes.iter().fold((0.0f32, 0usize), |(sum, n), b| {
        let len = b.text.trim().chars().count();
        (sum + b.confidence * len as f32, n + len)
    });
    if chars == 0 { 0.0 } else { weighted / chars as f32 }
}

fn count_diacritics(text: &str) -> usize {
    text.chars().filter(|c| c.is_alphabetic() && !c.is_ascii()).count()
}

/// Pick the best candidate. Ties go to the reading with more diacritics,
/// then to the earlier language.
fn select(candidates: Vec<Candidate>) -> Option<Candidate> {
    candidates.into_iter().reduce(|best, next| {
        if next.score > best.score + SCORE_EPSILON {
            next
        } else if (next.score - best.score).abs() <= SCORE_EPSILON && next.diacritics > best.diacritics {
            next
        } else {
            best
        }
    })
}

impl TextRecognizer for MultiLanguageRecognizer {
    fn recognize(&self, image: &DynamicImage, languages: &[String]) -> Result<String, RecognitionError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(RecognitionError::EmptyImage { width, height });
        }

        let active: Vec<&dyn LanguageModel> = self
            .models
            .iter()
            .map(|m| m.as_ref())
            .filter(|m| languages.iter().any(|l| l == m.language()))
            .collect();

        if active.is_empty() {
            return Err(RecognitionError::NoModel(languages.to_vec()));
        }

        let mut candidates = Vec::with_capacity(active.len());
        let mut last_error = None;

        for model in active {
            match model.read(image) {
                Ok(boxes) => {
                    let candidate = self.candidate(model.language(), boxes);
                    trace!(
                        language = %candidate.language,
                        score = candidate.score,
                        "Candidate: {:?}",
                        candidate.text
                    );
                    candidates.push(candidate);
                }
                Err(e) => {
                    warn!(language = model.language(), "Language model failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        match select(candidates) {
            Some(best) => {
                debug!(language = %best.language, score = best.score, "Selected reading");
                Ok(best.text)
            }
            None => Err(last_error.unwrap_or_else(|| RecognitionError::NoModel(languages.to_vec()))),
        }
    }
}
