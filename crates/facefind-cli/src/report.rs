use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::pipeline::{ImageOutcome, RunSummary};

/// JSON summary written by `--report`.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub version: &'static str,
    pub reference_image: &'a Path,
    pub input_folder: &'a Path,
    pub output_dir: PathBuf,
    pub threshold: f32,
    pub scale: f32,
    pub processed: usize,
    pub matches: usize,
    pub crops: usize,
    pub images: &'a [ImageOutcome],
}

impl<'a> Report<'a> {
    pub fn new(
        reference_image: &'a Path,
        input_folder: &'a Path,
        output_dir: PathBuf,
        threshold: f32,
        scale: f32,
        summary: &'a RunSummary,
    ) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            reference_image,
            input_folder,
            output_dir,
            threshold,
            scale,
            processed: summary.processed(),
            matches: summary.matches(),
            crops: summary.crops(),
            images: &summary.images,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        tracing::info!(path = %path.display(), "report written");
        Ok(())
    }
}
