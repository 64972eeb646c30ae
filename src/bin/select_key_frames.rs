use anyhow::Result;
use casme_prep::annotations::load_annotations;
use casme_prep::interrupt;
use casme_prep::select::{SelectConfig, select_key_frames};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about = "Copy the onset, apex and offset frames of each annotated CASME II video"
)]
struct Args {
    /// Root of the raw dataset (sub<NN>/<Filename>/img<N>.jpg)
    #[clap(
        short,
        long,
        value_parser,
        default_value = "/kaggle/input/casmeii/CASME2-RAW/CASME2-RAW"
    )]
    src_root: PathBuf,

    /// Output directory for the renamed key frames
    #[clap(short, long, value_parser, default_value = "/kaggle/working/CASME2_key_frames")]
    dst_root: PathBuf,

    /// Coding spreadsheet (.xlsx, .xls, .ods or .csv)
    #[clap(
        short,
        long,
        value_parser,
        default_value = "/kaggle/input/casmeii/CASME2-coding-20140508.xlsx"
    )]
    annotations: PathBuf,

    /// Hide the progress bar
    #[clap(long)]
    no_progress: bool,
}

fn run(args: Args) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let stop = interrupt::install_handler()?;

    let config = SelectConfig {
        src_root: args.src_root,
        dst_root: args.dst_root,
        annotations: args.annotations,
    };

    let rows = load_annotations(&config.annotations)?;

    let progress = if args.no_progress {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(rows.len() as u64);
        let style = ProgressStyle::with_template(
            "{msg} {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}]",
        )?;
        pb.set_style(style.progress_chars("##-"));
        pb
    };

    let report = select_key_frames(&config, &rows, &progress, &stop)?;

    if report.interrupted {
        anyhow::bail!("Interrupted after {} of {} rows", report.rows, rows.len());
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    run(args)
}
