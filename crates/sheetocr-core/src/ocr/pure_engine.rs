//! Language model backed by `pure-onnx-ocr` (pure Rust, no external ONNX Runtime).
//!
//! The engine keeps per-shape plan caches in `RefCell`s and cannot leave the
//! thread that built it. Each model owns one worker thread holding its engine;
//! callers send crops over a channel and block on the reply.

use std::path::Path;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use tracing::{debug, info};

use super::{LanguageModel, TextBox};
use crate::error::RecognitionError;

/// Detection model file inside a language directory.
pub const DET_MODEL: &str = "det.onnx";
/// Recognition model file inside a language directory.
pub const REC_MODEL: &str = "rec.onnx";
/// Character dictionary inside a language directory.
pub const DICTIONARY: &str = "dict.txt";

type Reply = Result<Vec<TextBox>, RecognitionError>;

struct ReadRequest {
    image: DynamicImage,
    reply: mpsc::Sender<Reply>,
}

/// One `pure-onnx-ocr` engine loaded for a single language.
pub struct PureOnnxModel {
    language: String,
    requests: Option<mpsc::Sender<ReadRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl PureOnnxModel {
    /// Load `det.onnx`, `rec.onnx` and `dict.txt` from `dir`.
    ///
    /// Returns once the worker has built its engine, so load errors surface
    /// here rather than on the first read.
    pub fn from_dir(language: &str, dir: &Path) -> Result<Self, RecognitionError> {
        let det_path = dir.join(DET_MODEL);
        let rec_path = dir.join(REC_MODEL);
        let dict_path = dir.join(DICTIONARY);

        for path in [&det_path, &rec_path, &dict_path] {
            if !path.is_file() {
                return Err(RecognitionError::ModelLoad(format!(
                    "{}: missing {}",
                    language,
                    path.display()
                )));
            }
        }

        let (requests, inbox) = mpsc::channel::<ReadRequest>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), RecognitionError>>(1);
        let worker_language = language.to_string();

        let worker = thread::Builder::new()
            .name(format!("ocr-{}", language))
            .spawn(move || {
                let engine = match build_engine(&worker_language, &det_path, &rec_path, &dict_path) {
                    Ok(engine) => {
                        let _ = ready_tx.send(Ok(()));
                        engine
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                for request in inbox {
                    let _ = request.reply.send(read_boxes(&engine, &worker_language, &request.image));
                }
                debug!(language = %worker_language, "OCR worker stopped");
            })
            .map_err(|e| RecognitionError::ModelLoad(format!("{}: cannot start worker: {}", language, e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(RecognitionError::ModelLoad(format!(
                    "{}: worker exited while loading",
                    language
                )));
            }
        }

        info!("Loaded {} model from {}", language, dir.display());

        Ok(Self {
            language: language.to_string(),
            requests: Some(requests),
            worker: Some(worker),
        })
    }
}

impl LanguageModel for PureOnnxModel {
    fn language(&self) -> &str {
        &self.language
    }

    fn read(&self, image: &DynamicImage) -> Result<Vec<TextBox>, RecognitionError> {
        let stopped = || RecognitionError::Engine(format!("{} OCR worker is not running", self.language));

        let requests = self.requests.as_ref().ok_or_else(stopped)?;
        let (reply, response) = mpsc::channel();
        requests
            .send(ReadRequest {
                image: image.clone(),
                reply,
            })
            .map_err(|_| stopped())?;

        response.recv().map_err(|_| stopped())?
    }
}

impl Drop for PureOnnxModel {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn build_engine(
    language: &str,
    det_path: &Path,
    rec_path: &Path,
    dict_path: &Path,
) -> Result<pure_onnx_ocr::engine::OcrEngine, RecognitionError> {
    pure_onnx_ocr::engine::OcrEngineBuilder::new()
        .det_model_path(det_path)
        .rec_model_path(rec_path)
        .dictionary_path(dict_path)
        .build()
        .map_err(|e| RecognitionError::ModelLoad(format!("{}: pure-onnx-ocr: {}", language, e)))
}

fn read_boxes(
    engine: &pure_onnx_ocr::engine::OcrEngine,
    language: &str,
    image: &DynamicImage,
) -> Result<Vec<TextBox>, RecognitionError> {
    let start = Instant::now();
    let (width, height) = image.dimensions();

    let results = engine
        .run_from_image(image)
        .map_err(|e| RecognitionError::Engine(format!("pure-onnx-ocr: {}", e)))?;

    debug!(
        language = %language,
        "{} text regions in {}x{} crop ({}ms)",
        results.len(),
        width,
        height,
        start.elapsed().as_millis()
    );

    Ok(results
        .iter()
        .map(|r| TextBox {
            bbox: polygon_to_bbox(&r.bounding_box),
            text: r.text.clone(),
            confidence: r.confidence,
        })
        .collect())
}

/// First four exterior points of the polygon as `[x1, y1, ..., x4, y4]`.
fn polygon_to_bbox(polygon: &pure_onnx_ocr::Polygon<f64>) -> [f32; 8] {
    let mut bbox = [0.0f32; 8];
    for (i, coord) in polygon.exterior().coords().take(4).enumerate() {
        bbox[i * 2] = coord.x as f32;
        bbox[i * 2 + 1] = coord.y as f32;
    }
    bbox
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_model_can_cross_threads() {
        assert_send_sync::<PureOnnxModel>();
        assert_send_sync::<Box<dyn LanguageModel>>();
    }

    #[test]
    fn test_missing_model_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DET_MODEL), b"").unwrap();

        let err = PureOnnxModel::from_dir("vi", dir.path()).err().unwrap();
        match err {
            RecognitionError::ModelLoad(msg) => assert!(msg.contains(REC_MODEL)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unreadable_models_fail_on_load() {
        let dir = tempfile::tempdir().unwrap();
        for name in [DET_MODEL, REC_MODEL] {
            std::fs::write(dir.path().join(name), b"not an onnx model").unwrap();
        }
        std::fs::write(dir.path().join(DICTIONARY), "a\nb\n").unwrap();

        let err = PureOnnxModel::from_dir("en", dir.path()).err().unwrap();
        match err {
            RecognitionError::ModelLoad(msg) => assert!(msg.starts_with("en:")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
