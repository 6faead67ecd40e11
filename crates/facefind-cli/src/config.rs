use anyhow::{bail, Context, Result};
use facefind_core::detector::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_NMS_THRESHOLD};
use facefind_core::DetectorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_SCALE: f32 = 2.0;
pub const DEFAULT_THRESHOLD: f32 = 0.4;

/// Recommended ranges; values outside only produce a warning.
const SCALE_RANGE: (f32, f32) = (1.0, 3.0);
const THRESHOLD_RANGE: (f32, f32) = (0.2, 0.7);

/// Optional TOML configuration file. Every field may be omitted.
///
/// ```toml
/// [models]
/// dir = "/opt/insightface/buffalo_l"
///
/// [detection]
/// confidence_threshold = 0.5
/// nms_threshold = 0.4
///
/// [matching]
/// threshold = 0.42
///
/// [crop]
/// scale = 2.5
///
/// [output]
/// dir = "results"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub models: ModelsSection,
    pub detection: DetectionSection,
    pub matching: MatchingSection,
    pub crop: CropSection,
    pub output: OutputSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelsSection {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionSection {
    pub confidence_threshold: Option<f32>,
    pub nms_threshold: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchingSection {
    pub threshold: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CropSection {
    pub scale: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    pub dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
    }
}

/// Values given on the command line or through `FACE_FINDER_*` variables.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub scale: Option<f32>,
    pub threshold: Option<f32>,
}

/// Fully resolved run settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory containing det_10g.onnx and w600k_r50.onnx.
    pub model_dir: PathBuf,
    pub detector: DetectorConfig,
    /// Cosine similarity at or above which a face matches the reference.
    pub threshold: f32,
    /// Multiplier applied to the detected face box before cropping.
    pub scale: f32,
    pub output_dir: PathBuf,
}

impl Settings {
    /// Layer overrides over the config file over built-in defaults.
    pub fn resolve(overrides: Overrides, file: FileConfig) -> Self {
        Self {
            model_dir: overrides
                .model_dir
                .or(file.models.dir)
                .unwrap_or_else(facefind_core::default_model_dir),
            detector: DetectorConfig {
                confidence_threshold: file
                    .detection
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                nms_threshold: file.detection.nms_threshold.unwrap_or(DEFAULT_NMS_THRESHOLD),
            },
            threshold: overrides
                .threshold
                .or(file.matching.threshold)
                .unwrap_or(DEFAULT_THRESHOLD),
            scale: overrides.scale.or(file.crop.scale).unwrap_or(DEFAULT_SCALE),
            output_dir: overrides
                .output_dir
                .or(file.output.dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        }
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            bail!("scale factor must be a positive number, got {}", self.scale);
        }
        if !self.threshold.is_finite() {
            bail!("similarity threshold must be a number, got {}", self.threshold);
        }
        let det = &self.detector;
        if !(0.0..=1.0).contains(&det.confidence_threshold) || !(0.0..=1.0).contains(&det.nms_threshold) {
            bail!(
                "detection thresholds must be within [0, 1], got confidence={} nms={}",
                det.confidence_threshold,
                det.nms_threshold
            );
        }
        Ok(())
    }

    /// Human-readable warnings for values outside the recommended ranges.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.scale < SCALE_RANGE.0 || self.scale > SCALE_RANGE.1 {
            warnings.push(format!(
                "scale factor {} is outside the recommended range ({}-{})",
                self.scale, SCALE_RANGE.0, SCALE_RANGE.1
            ));
        }
        if self.threshold < THRESHOLD_RANGE.0 || self.threshold > THRESHOLD_RANGE.1 {
            warnings.push(format!(
                "threshold {} is outside the recommended range ({}-{})",
                self.threshold, THRESHOLD_RANGE.0, THRESHOLD_RANGE.1
            ));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::resolve(Overrides::default(), FileConfig::default());
        assert_eq!(s.output_dir, PathBuf::from("output"));
        assert_eq!(s.scale, 2.0);
        assert_eq!(s.threshold, 0.4);
        assert_eq!(s.detector.confidence_threshold, 0.5);
        assert_eq!(s.detector.nms_threshold, 0.4);
        assert!(s.model_dir.ends_with("face-finder/models"));
        assert!(s.validate().is_ok());
        assert!(s.warnings().is_empty());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file: FileConfig = toml::from_str(
            r#"
            [models]
            dir = "/opt/models"

            [detection]
            confidence_threshold = 0.6

            [matching]
            threshold = 0.45

            [crop]
            scale = 2.5

            [output]
            dir = "results"
            "#,
        )
        .unwrap();

        let s = Settings::resolve(Overrides::default(), file);
        assert_eq!(s.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(s.detector.confidence_threshold, 0.6);
        assert_eq!(s.detector.nms_threshold, 0.4);
        assert_eq!(s.threshold, 0.45);
        assert_eq!(s.scale, 2.5);
        assert_eq!(s.output_dir, PathBuf::from("results"));
    }

    #[test]
    fn test_overrides_beat_file() {
        let file: FileConfig = toml::from_str("[matching]\nthreshold = 0.45\n[crop]\nscale = 2.5\n").unwrap();
        let overrides = Overrides {
            threshold: Some(0.3),
            output_dir: Some(PathBuf::from("cli-out")),
            ..Overrides::default()
        };
        let s = Settings::resolve(overrides, file);
        assert_eq!(s.threshold, 0.3);
        assert_eq!(s.scale, 2.5);
        assert_eq!(s.output_dir, PathBuf::from("cli-out"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<FileConfig>("[matching]\nthreshhold = 0.5\n").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileConfig::load(&dir.path().join("nope.toml")).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_scale() {
        for scale in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let overrides = Overrides { scale: Some(scale), ..Overrides::default() };
            let s = Settings::resolve(overrides, FileConfig::default());
            assert!(s.validate().is_err(), "scale {scale} should be rejected");
        }
    }

    #[test]
    fn test_validate_rejects_nan_threshold() {
        let overrides = Overrides { threshold: Some(f32::NAN), ..Overrides::default() };
        assert!(Settings::resolve(overrides, FileConfig::default()).validate().is_err());
    }

    #[test]
    fn test_out_of_range_values_only_warn() {
        let overrides = Overrides {
            scale: Some(4.0),
            threshold: Some(0.8),
            ..Overrides::default()
        };
        let s = Settings::resolve(overrides, FileConfig::default());
        assert!(s.validate().is_ok());
        let warnings = s.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("(1-3)"), "{}", warnings[0]);
        assert!(warnings[1].contains("(0.2-0.7)"), "{}", warnings[1]);
    }

    #[test]
    fn test_threshold_warning_matches_checked_range() {
        let at = |threshold| {
            let overrides = Overrides { threshold: Some(threshold), ..Overrides::default() };
            Settings::resolve(overrides, FileConfig::default()).warnings()
        };
        // inside the stated range, outside the old narrower text
        assert!(at(0.25).is_empty());
        assert!(at(0.65).is_empty());
        assert!(at(0.1)[0].contains("0.2-0.7"));
    }
}
