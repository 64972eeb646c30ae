use crate::detector::{FaceBox, FaceDetector};
use crate::interrupt;
use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Default square size of the written faces (px).
pub const DEFAULT_FACE_SIZE: u32 = 128;

/// Settings for one face-crop run.
#[derive(Debug, Clone)]
pub struct CropConfig {
    /// Dataset root holding one directory per category.
    pub root: PathBuf,
    /// Square size for output faces (px)
    pub size: u32,
}

impl CropConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            size: DEFAULT_FACE_SIZE,
        }
    }
}

#[derive(Debug, Error)]
pub enum CropError {
    #[error("face box {face:?} lies outside the {width}x{height} image")]
    EmptyRegion { face: FaceBox, width: u32, height: u32 },
}

/// One image found under a category directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryImage {
    pub category: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CropFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of [`crop_dataset`].
#[derive(Debug, Default)]
pub struct CropReport {
    /// Images rewritten successfully.
    pub processed: usize,
    pub failures: Vec<CropFailure>,
    /// The run stopped early on Ctrl-C.
    pub interrupted: bool,
}

impl CropReport {
    pub fn attempted(&self) -> usize {
        self.processed + self.failures.len()
    }
}

/// List `<root>/<category>/*.jpg`, sorted by path.
///
/// Only one directory level is scanned: files directly under `root` and
/// anything nested deeper than a category directory are ignored.
pub fn scan_images(root: &Path) -> Result<Vec<CategoryImage>> {
    if !root.is_dir() {
        anyhow::bail!("Dataset root {:?} does not exist or is not a directory", root);
    }

    let images = WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(readable)
        .filter(|e| e.file_type().is_file() && is_jpeg(e.path()))
        .filter_map(|e| {
            let category = e.path().parent()?.file_name()?.to_string_lossy().into_owned();
            Some(CategoryImage {
                category,
                path: e.into_path(),
            })
        })
        .collect();

    Ok(images)
}

/// Drop entries walkdir could not read, saying which one and why.
fn readable(entry: walkdir::Result<DirEntry>) -> Option<DirEntry> {
    match entry {
        Ok(entry) => Some(entry),
        Err(err) => {
            let path = err.path().map(Path::to_path_buf).unwrap_or_default();
            warn!("Skipping unreadable entry {:?}: {}", path, err);
            None
        }
    }
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("jpg"))
        .unwrap_or(false)
}

/// Cut the face out of `image`. Both `right` and `bottom` are included.
///
/// The box is clamped to the image; a box that misses the image entirely is
/// an error rather than an empty crop.
pub fn crop_to_box(image: &DynamicImage, face: FaceBox) -> Result<DynamicImage, CropError> {
    let (width, height) = image.dimensions();
    let empty = || CropError::EmptyRegion { face, width, height };

    if width == 0 || height == 0 {
        return Err(empty());
    }

    let left = face.left.max(0) as i64;
    let top = face.top.max(0) as i64;
    let right = (face.right as i64).min(width as i64 - 1);
    let bottom = (face.bottom as i64).min(height as i64 - 1);

    if right < left || bottom < top {
        return Err(empty());
    }

    Ok(image.crop_imm(
        left as u32,
        top as u32,
        (right - left + 1) as u32,
        (bottom - top + 1) as u32,
    ))
}

/// Crop to the face and stretch it to `size` x `size`.
pub fn crop_and_resize(
    image: &DynamicImage,
    face: FaceBox,
    size: u32,
) -> Result<DynamicImage, CropError> {
    let cropped = crop_to_box(image, face)?;
    Ok(cropped.resize_exact(size, size, FilterType::Triangle))
}

/// Detect, crop and resize one image, overwriting it in place.
pub fn process_image(path: &Path, detector: &mut dyn FaceDetector, size: u32) -> Result<FaceBox> {
    let img = image::open(path)
        .with_context(|| format!("Failed to open image: {:?}", path))?;

    let face = detector
        .detect(&img)
        .with_context(|| format!("Face detection failed for {:?}", path))?;

    let resized = crop_and_resize(&img, face, size)?;

    // Always write three-channel JPEG, whatever the source layout
    DynamicImage::ImageRgb8(resized.to_rgb8())
        .save_with_format(path, ImageFormat::Jpeg)
        .with_context(|| format!("Failed to save cropped face to: {:?}", path))?;

    debug!("Cropped {:?} to {:?}", path, face);
    Ok(face)
}

/// Crop every image of the dataset in place.
///
/// A failing image is logged and recorded in the report; the batch carries on
/// with the next one.
pub fn crop_dataset(
    config: &CropConfig,
    detector: &mut dyn FaceDetector,
    stop: &AtomicBool,
) -> Result<CropReport> {
    info!("Scanning dataset root for images: {:?}", config.root);
    let images = scan_images(&config.root)?;

    info!("Found {} images", images.len());

    let mut report = CropReport::default();

    if images.is_empty() {
        warn!("No images found under {:?}", config.root);
        return Ok(report);
    }

    let start_time = Instant::now();

    for item in &images {
        if interrupt::requested(stop) {
            warn!("Interrupted after {} of {} images", report.attempted(), images.len());
            report.interrupted = true;
            break;
        }

        match process_image(&item.path, detector, config.size) {
            Ok(_) => report.processed += 1,
            Err(err) => {
                error!("Failed to process {:?}: {:#}", item.path, err);
                report.failures.push(CropFailure {
                    path: item.path.clone(),
                    reason: format!("{:#}", err),
                });
            }
        }

        let done = report.attempted();
        if done % 10 == 0 {
            let elapsed = start_time.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                info!(
                    "Processed {}/{} images ({:.2} images/sec, category {})",
                    done,
                    images.len(),
                    done as f64 / elapsed,
                    item.category
                );
            }
        }
    }

    info!(
        "Finished cropping. {} images rewritten, {} failed, in {} seconds",
        report.processed,
        report.failures.len(),
        start_time.elapsed().as_secs()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([x as u8, y as u8, 0])
        }))
    }

    #[test]
    fn crop_includes_right_and_bottom() {
        let img = gradient(256, 256);
        let face = crop_to_box(&img, FaceBox::new(50, 60, 150, 160)).unwrap();

        assert_eq!(face.dimensions(), (101, 101));
        assert_eq!(face.get_pixel(0, 0).0[..3], [50, 60, 0]);
        assert_eq!(face.get_pixel(100, 100).0[..3], [150, 160, 0]);
    }

    #[test]
    fn crop_single_pixel_box() {
        let img = gradient(16, 16);
        let face = crop_to_box(&img, FaceBox::new(3, 4, 3, 4)).unwrap();
        assert_eq!(face.dimensions(), (1, 1));
        assert_eq!(face.get_pixel(0, 0).0[..3], [3, 4, 0]);
    }

    #[test]
    fn crop_clamps_to_image() {
        let img = gradient(100, 80);
        let face = crop_to_box(&img, FaceBox::new(-10, -5, 120, 90)).unwrap();
        assert_eq!(face.dimensions(), (100, 80));
    }

    #[test]
    fn crop_outside_image_is_error() {
        let img = gradient(100, 80);
        let err = crop_to_box(&img, FaceBox::new(200, 10, 250, 40)).unwrap_err();
        assert!(matches!(err, CropError::EmptyRegion { width: 100, height: 80, .. }));
    }

    #[test]
    fn resize_ignores_aspect_ratio() {
        let img = gradient(300, 120);
        let face = crop_and_resize(&img, FaceBox::new(0, 0, 299, 59), 128).unwrap();
        assert_eq!(face.dimensions(), (128, 128));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let category = dir.path().join("happiness");
        std::fs::create_dir_all(&category).unwrap();
        gradient(4, 4).save(category.join("a.jpg")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), category.join("b.jpg")).unwrap();

        let broken = WalkDir::new(&category)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .find(|e| e.is_err())
            .expect("dangling link yields a walk error");
        assert!(readable(broken).is_none());

        let found = scan_images(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, category.join("a.jpg"));
    }

    #[test]
    fn only_jpg_extension_matches() {
        assert!(is_jpeg(Path::new("a/img1.jpg")));
        assert!(is_jpeg(Path::new("a/img1.JPG")));
        assert!(!is_jpeg(Path::new("a/img1.png")));
        assert!(!is_jpeg(Path::new("a/img1.jpeg")));
        assert!(!is_jpeg(Path::new("a/jpg")));
    }
}
