//! Dataset module for skin lesion image data
//!
//! This module provides functionality for:
//! - The fixed diagnosis taxonomy and the persisted label artifact
//! - Splitting a raw `<class>/<image>` tree into train/val/test
//! - Loading a split tree as labeled samples
//! - Training-time augmentation and Burn `Dataset`/`Batcher` integration
//!
//! ## Label order
//!
//! Integer labels are the positions of the class folders sorted by name. The
//! trainer writes that order next to every checkpoint (`labels.json`) and the
//! predictor reads it back, so both sides always agree on label indices.

pub mod augmentation;
pub mod burn_dataset;
pub mod labels;
pub mod loader;
pub mod split;

pub use augmentation::{AugmentationConfig, Augmenter};
pub use burn_dataset::{LesionBatch, LesionBatcher, LesionBurnDataset, LesionItem};
pub use labels::ClassLabels;
pub use loader::{DatasetStats, ImageSample, SkinLesionDataset};
pub use split::{split_dataset, ExistingOutputPolicy, SplitConfig, SplitSummary};

/// Number of diagnosis classes
pub const NUM_CLASSES: usize = 9;

/// Canonical class order (sorted folder names)
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "Acne",
    "Benign_tumors",
    "Eczema",
    "Infestations_Bites",
    "Lichen",
    "Psoriasis",
    "Seborrh_Keratoses",
    "Vitiligo",
    "Warts",
];

/// File extensions recognized as images (compared lowercase)
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tiff", "webp"];

/// Whether a path has one of the recognized image extensions
pub fn is_image_file(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_class_names_are_sorted() {
        let mut sorted = CLASS_NAMES.to_vec();
        sorted.sort();
        assert_eq!(sorted, CLASS_NAMES.to_vec());
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/b.JPG")));
        assert!(is_image_file(Path::new("x.webp")));
        assert!(is_image_file(Path::new("x.tiff")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }
}
