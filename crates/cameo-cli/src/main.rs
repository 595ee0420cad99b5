use anyhow::{Context, Result};
use cameo_core::{
    FeatureEncoder, IdentityMatcher, ReferenceBuilder, ReferenceSet, VideoProcessor,
};
use cameo_onnx::{OnnxEmbedder, OnnxLandmarkDetector};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod sink;
mod source;

use config::CameoConfig;
use sink::SegmentWriter;
use source::ImageDirSource;

#[derive(Parser)]
#[command(
    name = "cameo",
    about = "Track known identities in video streams and extract the segments they appear in"
)]
struct Cli {
    /// Path to a TOML config file; defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a reference set from a labeled image dataset
    /// (one subdirectory per identity).
    BuildRefs {
        /// Dataset root directory.
        #[arg(long)]
        dataset: PathBuf,
        /// Output path for the reference set blob.
        #[arg(long)]
        out: PathBuf,
    },
    /// Process a frame sequence and extract presence segments.
    Process {
        /// Directory of frame images, lexicographic order.
        #[arg(long)]
        frames: PathBuf,
        /// Reference set built with `build-refs`.
        #[arg(long)]
        refs: PathBuf,
        /// Directory for segment metadata output.
        #[arg(long)]
        out_dir: PathBuf,
        /// Frame rate used to timestamp the images.
        #[arg(long, default_value_t = 25.0)]
        fps: f64,
    },
    /// Inspect a saved reference set.
    ShowRefs {
        #[arg(long)]
        refs: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<CameoConfig> {
    match path {
        Some(path) => CameoConfig::load(path),
        None => Ok(CameoConfig::default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::BuildRefs { dataset, out } => {
            let mut detector =
                OnnxLandmarkDetector::load(&config.detector_model.to_string_lossy())?;
            let embedder = OnnxEmbedder::load(&config.embedder_model.to_string_lossy())?;
            let mut encoder = FeatureEncoder::new(embedder);

            let refs = ReferenceBuilder::new(&mut detector, &mut encoder)
                .build(&dataset)
                .context("building reference set")?;
            refs.save(&out)
                .with_context(|| format!("saving reference set to {}", out.display()))?;

            println!(
                "built {} reference(s), feature dimension {}",
                refs.len(),
                refs.feature_dim()
            );
            for label in refs.labels() {
                println!("  {label}");
            }
        }
        Commands::Process {
            frames,
            refs,
            out_dir,
            fps,
        } => {
            let refs = Arc::new(
                ReferenceSet::load(&refs)
                    .with_context(|| format!("loading reference set {}", refs.display()))?,
            );
            tracing::info!(labels = refs.len(), dim = refs.feature_dim(), "reference set loaded");

            let detector = OnnxLandmarkDetector::load(&config.detector_model.to_string_lossy())?;
            let embedder = OnnxEmbedder::load(&config.embedder_model.to_string_lossy())?;
            let encoder = FeatureEncoder::new(embedder);
            let matcher = IdentityMatcher::new(refs, config.threshold)?;

            let mut processor = VideoProcessor::new(
                detector,
                encoder,
                matcher,
                config.nth_frame,
                config.window_size,
            )?;
            let mut source = ImageDirSource::open(&frames, fps)?;
            let mut sink = SegmentWriter::create(&out_dir)?;

            let stats = processor.process(&mut source, &mut sink)?;
            println!(
                "processed {} frames ({} analyses, {} detector failures): {} segment(s)",
                stats.frames, stats.ticks, stats.detection_failures, stats.segments
            );
        }
        Commands::ShowRefs { refs } => {
            let refs = ReferenceSet::load(&refs)?;
            println!(
                "{} label(s), feature dimension {}",
                refs.len(),
                refs.feature_dim()
            );
            for label in refs.labels() {
                println!("  {label}");
            }
        }
    }

    Ok(())
}
