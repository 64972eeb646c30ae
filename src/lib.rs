pub mod annotations;
pub mod crop;
pub mod detector;
pub mod interrupt;
pub mod select;

// Re-export commonly used items
pub use annotations::{AnnotationRow, Cell, FrameType, KeyFrames, load_annotations};
pub use crop::{CropConfig, CropReport, crop_dataset};
pub use detector::{DetectError, DetectorOptions, FaceBox, FaceDetector, create_detector};
pub use select::{SelectConfig, SelectionReport, select_key_frames};
