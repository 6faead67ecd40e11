use anyhow::{bail, Context, Result};
use clap::Parser;
use facefind_core::{CosineMatcher, FaceAnalyzer, ModelPaths};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod discovery;
mod pipeline;
mod report;

use config::{FileConfig, Overrides, Settings};
use pipeline::MatchSettings;

const EXAMPLES: &str = "\
Examples:
  # Find faces matching reference.jpg in photos/
  face-finder reference.jpg photos/

  # Write crops to a specific directory
  face-finder reference.jpg photos/ -o output/person1/

  # Stricter matching (higher is stricter)
  face-finder reference.jpg photos/ -t 0.45

  # Larger crops (2.0 = twice the face size)
  face-finder reference.jpg photos/ -s 2.5

  # Verify the models load
  face-finder --check --model-dir ~/models/buffalo_l";

#[derive(Parser, Debug)]
#[command(
    name = "face-finder",
    version,
    about = "Find and crop a specific face across a folder of images",
    after_help = EXAMPLES
)]
struct Cli {
    /// Image containing the face to find
    #[arg(required_unless_present = "check")]
    reference_image: Option<PathBuf>,

    /// Folder containing images to search
    #[arg(required_unless_present = "check")]
    input_folder: Option<PathBuf>,

    /// Output directory for cropped faces [default: output]
    #[arg(short, long, env = "FACE_FINDER_OUTPUT_DIR")]
    output: Option<PathBuf>,

    /// Bounding box scale factor, recommended 1.0-3.0 [default: 2.0]
    #[arg(short, long, env = "FACE_FINDER_SCALE")]
    scale: Option<f32>,

    /// Similarity threshold, recommended 0.2-0.7, higher is stricter [default: 0.4]
    #[arg(short, long, env = "FACE_FINDER_THRESHOLD")]
    threshold: Option<f32>,

    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, env = "FACE_FINDER_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also search subdirectories of the input folder
    #[arg(short, long)]
    recursive: bool,

    /// Write a JSON summary of every face examined
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Load the models, print their inputs and outputs, and exit
    #[arg(long)]
    check: bool,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            model_dir: self.model_dir.clone(),
            output_dir: self.output.clone(),
            scale: self.scale,
            threshold: self.threshold,
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();
}

fn load_analyzer(settings: &Settings) -> Result<FaceAnalyzer> {
    let paths = ModelPaths::in_dir(&settings.model_dir);
    FaceAnalyzer::load(&paths, settings.detector)
        .with_context(|| format!("failed to load face models from {}", settings.model_dir.display()))
}

fn run_check(settings: &Settings) -> Result<()> {
    println!("Model directory: {}", settings.model_dir.display());
    let analyzer = load_analyzer(settings)?;
    let report = analyzer.describe();
    println!("  detector   inputs={:?} outputs={:?}", report.detector_inputs, report.detector_outputs);
    println!("  recognizer inputs={:?} outputs={:?}", report.recognizer_inputs, report.recognizer_outputs);
    println!("Models loaded successfully");
    Ok(())
}

fn print_banner(reference: &Path, folder: &Path, settings: &Settings) {
    let rule = "=".repeat(60);
    println!("{rule}");
    println!("Face Finder");
    println!("{rule}");
    println!("Reference:            {}", reference.display());
    println!("Input folder:         {}", folder.display());
    println!("Output folder:        {}", settings.output_dir.display());
    println!("Scale factor:         {}x", settings.scale);
    println!("Similarity threshold: {}", settings.threshold);
    println!("{rule}");
    println!();
}

fn run(cli: Cli) -> Result<()> {
    let file_config = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(cli.overrides(), file_config);
    settings.validate()?;
    for warning in settings.warnings() {
        tracing::warn!("{warning}");
    }

    if cli.check {
        return run_check(&settings);
    }

    let (Some(reference), Some(folder)) = (cli.reference_image.as_deref(), cli.input_folder.as_deref()) else {
        bail!("a reference image and an input folder are required");
    };

    if !reference.exists() {
        bail!("reference image not found: {}", reference.display());
    }
    if !folder.is_dir() {
        bail!("input folder not found: {}", folder.display());
    }

    std::fs::create_dir_all(&settings.output_dir).with_context(|| {
        format!("failed to create output directory {}", settings.output_dir.display())
    })?;

    print_banner(reference, folder, &settings);

    println!("Loading face analysis models...");
    let mut analyzer = load_analyzer(&settings)?;
    println!("Models loaded successfully");

    let reference_embedding = pipeline::reference_embedding(&mut analyzer, reference)?;

    let match_settings = MatchSettings {
        threshold: settings.threshold,
        scale: settings.scale,
        output_dir: settings.output_dir.clone(),
    };
    let summary = pipeline::process_folder(
        &mut analyzer,
        &CosineMatcher,
        folder,
        cli.recursive,
        &reference_embedding,
        &match_settings,
    )?;

    let output_dir = std::fs::canonicalize(&settings.output_dir).unwrap_or_else(|_| settings.output_dir.clone());

    println!();
    println!("{}", "=".repeat(60));
    println!("Processing complete!");
    println!("Processed: {} images", summary.processed());
    println!("Found: {} matching faces", summary.matches());
    if summary.crops() != summary.matches() {
        println!("Saved: {} crops", summary.crops());
    }
    println!("Results saved to: {}", output_dir.display());
    println!("{}", "=".repeat(60));

    if let Some(report_path) = &cli.report {
        report::Report::new(
            reference,
            folder,
            output_dir,
            settings.threshold,
            settings.scale,
            &summary,
        )
        .write(report_path)?;
        println!("Report written to: {}", report_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli)
}
