//! Reference extraction and the per-image match/crop loop.

use anyhow::{bail, Context, Result};
use facefind_core::{
    crop_file_name, crop_image, expand_box, open_upright, BoundingBox, CropRegion, Embedding, FaceAnalysis,
    Matcher,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::discovery::discover_images;

/// Settings that drive matching and cropping.
#[derive(Debug, Clone)]
pub struct MatchSettings {
    pub threshold: f32,
    pub scale: f32,
    pub output_dir: PathBuf,
}

/// What happened to one input image.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageStatus {
    Processed,
    /// The file could not be opened or decoded.
    Unreadable { reason: String },
    /// The file decoded but face analysis failed.
    Failed { reason: String },
}

/// One detected face and the decision made about it.
#[derive(Debug, Clone, Serialize)]
pub struct FaceRecord {
    /// 1-based position in detector order.
    pub index: usize,
    pub bbox: BoundingBox,
    pub similarity: f32,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropRegion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageOutcome {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: ImageStatus,
    pub faces: Vec<FaceRecord>,
}

impl ImageOutcome {
    fn without_faces(path: &Path, status: ImageStatus) -> Self {
        Self { path: path.to_path_buf(), status, faces: Vec::new() }
    }

    pub fn matches(&self) -> usize {
        self.faces.iter().filter(|f| f.matched).count()
    }

    pub fn crops(&self) -> usize {
        self.faces.iter().filter(|f| f.output.is_some()).count()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub images: Vec<ImageOutcome>,
}

impl RunSummary {
    /// Every attempted image counts, readable or not.
    pub fn processed(&self) -> usize {
        self.images.len()
    }

    pub fn matches(&self) -> usize {
        self.images.iter().map(ImageOutcome::matches).sum()
    }

    pub fn crops(&self) -> usize {
        self.images.iter().map(ImageOutcome::crops).sum()
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Embed the face in the reference image.
///
/// Fails if the image cannot be read or contains no face. With several
/// faces, the one with the largest box wins.
pub fn reference_embedding<A: FaceAnalysis>(analyzer: &mut A, path: &Path) -> Result<Embedding> {
    println!("Loading reference image: {}", path.display());

    let image = open_upright(path)
        .with_context(|| format!("cannot read reference image {}", path.display()))?
        .to_rgb8();

    let faces = analyzer
        .analyze(&image)
        .with_context(|| format!("face analysis failed for reference image {}", path.display()))?;

    if faces.len() > 1 {
        tracing::warn!(
            faces = faces.len(),
            "multiple faces found in reference image, using the largest one"
        );
    }

    // First of equally large faces wins, so ties resolve in detector order.
    let Some(largest) = faces
        .into_iter()
        .reduce(|best, face| if face.bbox.area() > best.bbox.area() { face } else { best })
    else {
        bail!("no face found in reference image {}", path.display());
    };

    tracing::info!(
        confidence = largest.bbox.confidence,
        width = largest.bbox.width,
        height = largest.bbox.height,
        "reference face selected"
    );
    println!("Reference face extracted successfully");

    Ok(largest.embedding)
}

/// Detect faces in one image, compare each to the reference, and save a
/// crop for every match.
///
/// Never fails: unreadable files and analysis errors are reported and
/// recorded in the returned outcome.
pub fn process_image<A: FaceAnalysis, M: Matcher>(
    analyzer: &mut A,
    matcher: &M,
    path: &Path,
    reference: &Embedding,
    settings: &MatchSettings,
) -> ImageOutcome {
    let name = display_name(path);

    let image = match open_upright(path) {
        Ok(image) => image,
        Err(e) => {
            println!("  Error: cannot read image {name}: {e}");
            return ImageOutcome::without_faces(path, ImageStatus::Unreadable { reason: e.to_string() });
        }
    };
    let (width, height) = (image.width(), image.height());

    let faces = match analyzer.analyze(&image.to_rgb8()) {
        Ok(faces) => faces,
        Err(e) => {
            println!("  Error processing {name}: {e}");
            return ImageOutcome::without_faces(path, ImageStatus::Failed { reason: e.to_string() });
        }
    };

    if faces.is_empty() {
        println!("  No faces detected in {name}");
        return ImageOutcome::without_faces(path, ImageStatus::Processed);
    }
    println!("  Found {} face(s) in {name}", faces.len());

    let mut records = Vec::with_capacity(faces.len());
    let mut match_count = 0;

    for (i, face) in faces.into_iter().enumerate() {
        let index = i + 1;
        let result = matcher.compare(reference, &face.embedding, settings.threshold);

        let mut record = FaceRecord {
            index,
            bbox: face.bbox,
            similarity: result.similarity,
            matched: result.matched,
            crop: None,
            output: None,
        };

        if !result.matched {
            println!("    ✗ Face {index} does not match (similarity: {:.3})", result.similarity);
            records.push(record);
            continue;
        }

        match_count += 1;
        println!("    ✓ Face {index} matches! (similarity: {:.3})", result.similarity);

        let region = expand_box(&record.bbox, settings.scale, width, height);
        record.crop = Some(region);

        match crop_image(&image, &region) {
            None => {
                println!("    Skipped: crop region for face {index} lies outside the image");
                tracing::warn!(?region, path = %path.display(), "empty crop region");
            }
            Some(cropped) => {
                let file_name = crop_file_name(path, match_count);
                let output_path = settings.output_dir.join(&file_name);
                match cropped.save(&output_path) {
                    Ok(()) => {
                        println!("    Saved to: {file_name}");
                        record.output = Some(output_path);
                    }
                    Err(e) => {
                        println!("    Error: failed to save {file_name}: {e}");
                        tracing::warn!(error = %e, path = %output_path.display(), "crop not saved");
                    }
                }
            }
        }

        records.push(record);
    }

    ImageOutcome {
        path: path.to_path_buf(),
        status: ImageStatus::Processed,
        faces: records,
    }
}

/// Where crops of `path` go: `output_dir` mirrors the image's subfolder
/// below `folder`, so same-named files in different subfolders never
/// share an output name.
fn output_dir_for(folder: &Path, path: &Path, output_dir: &Path) -> PathBuf {
    match path.parent().and_then(|parent| parent.strip_prefix(folder).ok()) {
        Some(relative) if !relative.as_os_str().is_empty() => output_dir.join(relative),
        _ => output_dir.to_path_buf(),
    }
}

/// Run [`process_image`] over every image in `folder`, in sorted order.
pub fn process_folder<A: FaceAnalysis, M: Matcher>(
    analyzer: &mut A,
    matcher: &M,
    folder: &Path,
    recursive: bool,
    reference: &Embedding,
    settings: &MatchSettings,
) -> Result<RunSummary> {
    let images = discover_images(folder, recursive)?;

    if images.is_empty() {
        println!("No images found in {}", folder.display());
        return Ok(RunSummary::default());
    }

    println!();
    println!("Found {} images to process", images.len());
    println!("Scale factor: {}x", settings.scale);
    println!("Similarity threshold: {}", settings.threshold);
    println!("{}", "-".repeat(60));

    let mut summary = RunSummary::default();
    for path in &images {
        println!();
        println!("Processing: {}", display_name(path));

        let image_settings = MatchSettings {
            output_dir: output_dir_for(folder, path, &settings.output_dir),
            ..settings.clone()
        };
        if image_settings.output_dir != settings.output_dir {
            if let Err(e) = std::fs::create_dir_all(&image_settings.output_dir) {
                tracing::warn!(
                    error = %e,
                    dir = %image_settings.output_dir.display(),
                    "cannot create output subfolder"
                );
            }
        }

        let outcome = process_image(analyzer, matcher, path, reference, &image_settings);
        tracing::debug!(
            path = %path.display(),
            matches = outcome.matches(),
            crops = outcome.crops(),
            "image done"
        );
        summary.images.push(outcome);
    }

    Ok(summary)
}
