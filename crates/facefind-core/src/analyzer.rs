//! Detect-then-embed face analysis over whole images.

use crate::detector::{DetectorConfig, DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::DetectedFace;
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Anything that can find faces in an image and embed each of them.
pub trait FaceAnalysis {
    /// Return every face in `image`, in detector order (highest confidence first).
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError>;
}

/// Locations of the two ONNX models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

impl ModelPaths {
    /// Standard InsightFace file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detector: dir.join(DETECTOR_MODEL_FILE),
            recognizer: dir.join(RECOGNIZER_MODEL_FILE),
        }
    }
}

/// Default model directory: `$XDG_DATA_HOME/face-finder/models`, falling
/// back to `~/.local/share/face-finder/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("face-finder")
        .join("models")
}

/// SCRFD detector + ArcFace recognizer.
pub struct FaceAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FaceAnalyzer {
    /// Load both models. Fails fast if either file is missing or invalid.
    pub fn load(paths: &ModelPaths, config: DetectorConfig) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(&paths.detector, config)?;
        let recognizer = FaceRecognizer::load(&paths.recognizer)?;
        Ok(Self { detector, recognizer })
    }

    /// Input/output tensor names of both loaded models.
    pub fn describe(&self) -> ModelReport {
        let (detector_inputs, detector_outputs) = self.detector.io_names();
        let (recognizer_inputs, recognizer_outputs) = self.recognizer.io_names();
        ModelReport {
            detector_inputs,
            detector_outputs,
            recognizer_inputs,
            recognizer_outputs,
        }
    }
}

impl FaceAnalysis for FaceAnalyzer {
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError> {
        let boxes = self.detector.detect(image)?;
        tracing::debug!(faces = boxes.len(), "detection finished");

        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            match self.recognizer.extract(image, &bbox) {
                Ok(embedding) => faces.push(DetectedFace { bbox, embedding }),
                Err(RecognizerError::NoLandmarks) => {
                    tracing::warn!(confidence = bbox.confidence, "face without landmarks skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(faces)
    }
}

/// Tensor names reported by `face-finder --check`.
#[derive(Debug, Clone)]
pub struct ModelReport {
    pub detector_inputs: Vec<String>,
    pub detector_outputs: Vec<String>,
    pub recognizer_inputs: Vec<String>,
    pub recognizer_outputs: Vec<String>,
}
