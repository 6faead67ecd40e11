//! facefind-core — Face detection, recognition and crop geometry.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime for CPU inference.

pub mod alignment;
pub mod analyzer;
pub mod crop;
pub mod detector;
pub mod loader;
pub mod recognizer;
pub mod types;

pub use analyzer::{default_model_dir, AnalyzerError, FaceAnalysis, FaceAnalyzer, ModelPaths, ModelReport};
pub use crop::{crop_file_name, crop_image, expand_box, CropRegion};
pub use detector::{DetectorConfig, FaceDetector};
pub use loader::open_upright;
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, CosineMatcher, DetectedFace, Embedding, MatchResult, Matcher};
