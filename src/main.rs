use anyhow::{Context, Result};
use casme_prep::crop::{self, CropConfig};
use casme_prep::detector::{DetectorOptions, create_detector};
use casme_prep::interrupt;
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Crop CASME II frames to the detected face, in place")]
struct Args {
    /// Dataset root containing one directory of .jpg frames per category
    #[clap(short, long, value_parser, default_value = "/kaggle/working/CASME2_RAW_selected")]
    root: PathBuf,

    /// Path to the face detection model
    #[clap(
        short,
        long,
        value_parser,
        default_value = "/kaggle/input/retinaface-model/seeta_fd_frontal_v1.0.bin"
    )]
    model: PathBuf,

    /// Face detector to use
    #[clap(long, default_value = "rustface")]
    detector: String,

    /// Square size for output faces (px)
    #[clap(short, long, default_value_t = crop::DEFAULT_FACE_SIZE)]
    size: u32,

    /// Smallest face the detector looks for (px)
    #[clap(long, default_value = "20")]
    min_face_size: u32,

    /// Detector score threshold
    #[clap(long, default_value = "2.0")]
    score_threshold: f64,

    /// Download the model if it is not present at --model
    #[clap(long)]
    download_model: bool,
}

/// Main program logic
fn run(args: Args) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let stop = interrupt::install_handler()?;

    let mut options = DetectorOptions::new(&args.model);
    options.download = args.download_model;
    options.min_face_size = args.min_face_size;
    options.score_threshold = args.score_threshold;

    info!("Initializing face detector: {}", args.detector);
    let mut detector = create_detector(&args.detector, &options)
        .context("Failed to initialize face detector")?;

    let config = CropConfig {
        root: args.root,
        size: args.size,
    };

    let report = crop::crop_dataset(&config, detector.as_mut(), &stop)?;

    if !report.failures.is_empty() {
        for failure in &report.failures {
            error!("  {:?}: {}", failure.path, failure.reason);
        }
        anyhow::bail!(
            "{} of {} images could not be cropped",
            report.failures.len(),
            report.attempted()
        );
    }

    if report.interrupted {
        anyhow::bail!("Interrupted after {} images", report.attempted());
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    run(args)
}
