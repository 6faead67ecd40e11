use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
///
/// Coordinates are in pixels of the original (un-letterboxed) image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Corner form `(x1, y1, x2, y2)`.
    pub fn corners(&self) -> (f32, f32, f32, f32) {
        (self.x, self.y, self.x + self.width, self.y + self.height)
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Cosine similarity between two embeddings: both vectors are normalized
    /// and their dot product taken.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. A zero-length
    /// vector on either side yields 0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }
}

/// A face found by the analyzer: where it is, and what it looks like.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Result of comparing a probe embedding against the reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Cosine similarity to the reference [-1, 1].
    pub similarity: f32,
}

/// Strategy for deciding whether a probe face is the reference person.
pub trait Matcher {
    fn compare(&self, reference: &Embedding, probe: &Embedding, threshold: f32) -> MatchResult;
}

/// Cosine similarity matcher. A probe matches when its similarity is at
/// least `threshold` (inclusive).
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(&self, reference: &Embedding, probe: &Embedding, threshold: f32) -> MatchResult {
        let similarity = reference.similarity(probe);
        MatchResult {
            matched: similarity >= threshold,
            similarity,
        }
    }
}
