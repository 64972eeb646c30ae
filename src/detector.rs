use anyhow::{Context, Result};
use image::DynamicImage;
use log::{info, warn};
use rustface::{Detector, ImageData};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Mirrors for the SeetaFace frontal model used by `rustface`.
const MODEL_URLS: [&str; 2] = [
    "https://github.com/atomashpolskiy/rustface/raw/master/model/seeta_fd_frontal_v1.0.bin",
    "https://raw.githubusercontent.com/atomashpolskiy/rustface/master/model/seeta_fd_frontal_v1.0.bin",
];

/// Face bounding box in pixel coordinates.
///
/// `right` and `bottom` are inclusive: a box with `left == right` is one
/// pixel wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl FaceBox {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Build a box from an origin and an exclusive extent.
    pub fn from_rect(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            left: x,
            top: y,
            right: x + width as i32 - 1,
            bottom: y + height as i32 - 1,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left + 1
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top + 1
    }
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("no face detected")]
    NoFace,
    #[error("detector backend failed: {0}")]
    Backend(String),
}

/// Trait for face detector implementations
pub trait FaceDetector {
    /// Locate the primary face in an image.
    fn detect(&mut self, image: &DynamicImage) -> Result<FaceBox, DetectError>;
}

/// Settings used when constructing a detector backend.
#[derive(Debug, Clone)]
pub struct DetectorOptions {
    pub model_path: PathBuf,
    /// Fetch the model from the known mirrors when it is missing.
    pub download: bool,
    pub min_face_size: u32,
    pub score_threshold: f64,
    pub pyramid_scale_factor: f32,
    pub slide_window_step: u32,
}

impl DetectorOptions {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            download: false,
            min_face_size: 20,
            score_threshold: 2.0,
            pyramid_scale_factor: 0.8,
            slide_window_step: 4,
        }
    }
}

/// RustFace (SeetaFace) detector implementation
pub struct RustFaceDetector {
    detector: Box<dyn Detector>,
}

impl RustFaceDetector {
    pub fn load(options: &DetectorOptions) -> Result<Self> {
        let model_path = &options.model_path;

        if !model_path.exists() {
            if !options.download {
                anyhow::bail!(
                    "Face detection model not found at {:?}. \
                     Pass --download-model to fetch it, or download it manually from \
                     https://github.com/atomashpolskiy/rustface/tree/master/model",
                    model_path
                );
            }
            download_model(model_path)?;
        } else {
            info!("Using face detection model at {:?}", model_path);
        }

        let mut detector = rustface::create_detector(&model_path.to_string_lossy())
            .with_context(|| format!("Failed to create face detector from {:?}", model_path))?;

        detector.set_min_face_size(options.min_face_size);
        detector.set_score_thresh(options.score_threshold);
        detector.set_pyramid_scale_factor(options.pyramid_scale_factor);
        detector.set_slide_window_step(options.slide_window_step, options.slide_window_step);

        Ok(Self { detector })
    }
}

impl FaceDetector for RustFaceDetector {
    fn detect(&mut self, image: &DynamicImage) -> Result<FaceBox, DetectError> {
        let gray_image = image.to_luma8();

        let (width, height) = gray_image.dimensions();
        let mut image_data = ImageData::new(gray_image.as_raw(), width, height);

        let faces = self.detector.detect(&mut image_data);

        // Several candidates: keep the most confident one
        let best = faces
            .iter()
            .max_by(|a, b| a.score().total_cmp(&b.score()))
            .ok_or(DetectError::NoFace)?;

        let bbox = best.bbox();
        Ok(FaceBox::from_rect(bbox.x(), bbox.y(), bbox.width(), bbox.height()))
    }
}

/// Fetch the model file into `model_path`, trying each mirror in turn.
fn download_model(model_path: &Path) -> Result<()> {
    info!("Downloading face detection model to {:?}", model_path);

    if let Some(parent) = model_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create model directory {:?}", parent))?;
    }

    let mut last_error = None;

    for url in MODEL_URLS {
        info!("Trying to download from: {}", url);

        match ureq::get(url).call() {
            Ok(response) => {
                let mut reader = response.into_reader();
                let mut file = fs::File::create(model_path)
                    .with_context(|| format!("Failed to create {:?}", model_path))?;
                std::io::copy(&mut reader, &mut file)
                    .with_context(|| format!("Failed to write model to {:?}", model_path))?;
                info!("Model downloaded successfully from {}", url);
                return Ok(());
            }
            Err(err) => {
                warn!("Failed to download from {}: {}", url, err);
                last_error = Some(err);
            }
        }
    }

    Err(anyhow::anyhow!(
        "Failed to download model from all sources. Last error: {:?}",
        last_error
    ))
}

// Factory function to create detectors by name
pub fn create_detector(name: &str, options: &DetectorOptions) -> Result<Box<dyn FaceDetector>> {
    match name.to_lowercase().as_str() {
        "rustface" => Ok(Box::new(RustFaceDetector::load(options)?)),
        _ => Err(anyhow::anyhow!("Unknown detector: {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_box_bounds_are_inclusive() {
        let face = FaceBox::new(50, 60, 150, 160);
        assert_eq!(face.width(), 101);
        assert_eq!(face.height(), 101);
    }

    #[test]
    fn face_box_from_rect() {
        let face = FaceBox::from_rect(10, 20, 30, 40);
        assert_eq!(face, FaceBox::new(10, 20, 39, 59));
        assert_eq!(face.width(), 30);
        assert_eq!(face.height(), 40);
    }

    #[test]
    fn unknown_detector_is_rejected() {
        let options = DetectorOptions::new("model/does-not-matter.bin");
        let err = create_detector("retinaface", &options).err().unwrap();
        assert!(err.to_string().contains("Unknown detector"));
    }

    #[test]
    fn missing_model_is_fatal_without_download() {
        let dir = tempfile::tempdir().unwrap();
        let options = DetectorOptions::new(dir.path().join("missing.bin"));
        let err = create_detector("rustface", &options).err().unwrap();
        assert!(err.to_string().contains("not found"));
    }
}
