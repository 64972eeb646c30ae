use crate::annotations::{AnnotationRow, FrameType};
use crate::interrupt;
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use log::{info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

/// Settings for one key-frame selection run.
#[derive(Debug, Clone)]
pub struct SelectConfig {
    /// Root holding `sub<NN>/<Filename>/img<N>.jpg`.
    pub src_root: PathBuf,
    /// Flat output directory.
    pub dst_root: PathBuf,
    /// Coding spreadsheet (`.xlsx` or `.csv`).
    pub annotations: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedFrame {
    pub frame_type: FrameType,
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Outcome of [`select_key_frames`].
#[derive(Debug, Default)]
pub struct SelectionReport {
    /// Rows looked at, including skipped ones.
    pub rows: usize,
    pub copied: Vec<CopiedFrame>,
    /// Source frames that did not exist.
    pub missing: Vec<PathBuf>,
    /// Filenames of rows skipped for invalid frame data.
    pub skipped: Vec<String>,
    pub interrupted: bool,
}

/// Copy the onset, apex and offset frames of every valid row into
/// `config.dst_root` as `<Filename>_<frame_type>.jpg`.
///
/// Rows with any unusable frame index are skipped whole. Within a valid row
/// each frame is copied on its own: a missing source only loses that frame.
/// Log lines are written with `progress` suspended so they never share a
/// terminal line with the bar.
pub fn select_key_frames(
    config: &SelectConfig,
    rows: &[AnnotationRow],
    progress: &ProgressBar,
    stop: &AtomicBool,
) -> Result<SelectionReport> {
    fs::create_dir_all(&config.dst_root)
        .with_context(|| format!("Failed to create output directory {:?}", config.dst_root))?;

    let mut report = SelectionReport::default();
    let mut written = HashSet::new();

    progress.set_length(rows.len() as u64);
    progress.set_message("Processing videos");

    for row in rows {
        if interrupt::requested(stop) {
            progress.suspend(|| {
                warn!("Interrupted after {} of {} rows", report.rows, rows.len())
            });
            report.interrupted = true;
            break;
        }

        report.rows += 1;
        progress.inc(1);

        let Some(frames) = row.key_frames() else {
            progress.suspend(|| warn!("Skipping {}: invalid frame data", row.filename));
            report.skipped.push(row.filename.clone());
            continue;
        };

        for frame_type in FrameType::ALL {
            let source = frames.source_path(&config.src_root, frame_type);

            if !source.exists() {
                progress.suspend(|| warn!("Not found: {}", source.display()));
                report.missing.push(source);
                continue;
            }

            let destination = config.dst_root.join(frames.destination_name(frame_type));

            if !written.insert(destination.clone()) {
                progress.suspend(|| {
                    warn!(
                        "{} was already written in this run, overwriting with {}",
                        destination.display(),
                        source.display()
                    )
                });
            }

            fs::copy(&source, &destination)
                .with_context(|| format!("Failed to copy {:?} to {:?}", source, destination))?;
            progress.suspend(|| {
                info!("Copied: {} -> {}", source.display(), destination.display())
            });

            report.copied.push(CopiedFrame {
                frame_type,
                source,
                destination,
            });
        }
    }

    progress.finish_with_message("Done");

    info!(
        "Processed {} rows: {} frames copied, {} missing, {} rows skipped",
        report.rows,
        report.copied.len(),
        report.missing.len(),
        report.skipped.len()
    );

    Ok(report)
}
