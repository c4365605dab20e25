//! Split-tree loader
//!
//! Reads one split directory (`<root>/<class_name>/*.jpg`) into labeled
//! samples. Labels follow the sorted class-folder order captured in
//! [`ClassLabels`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{is_image_file, ClassLabels};
use crate::utils::error::{Result, SkinLesionError};

/// A single image sample with its label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSample {
    pub path: PathBuf,
    /// Index into the dataset's `ClassLabels`
    pub label: usize,
    pub class_name: String,
}

/// One split of the dataset (train, val or test)
#[derive(Debug)]
pub struct SkinLesionDataset {
    pub root_dir: PathBuf,
    pub samples: Vec<ImageSample>,
    pub labels: ClassLabels,
}

impl SkinLesionDataset {
    /// Load a split directory, deriving the label order from its class folders
    ///
    /// ```text
    /// root_dir/
    /// ├── Acne/
    /// │   ├── Acne_3f2a....jpg
    /// │   └── ...
    /// ├── Benign_tumors/
    /// └── ...
    /// ```
    pub fn from_split_dir<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref();
        let labels = ClassLabels::from_class_dirs(root_dir)?;
        Self::with_labels(root_dir, labels)
    }

    /// Load a split directory that must use an already-established label order
    pub fn with_labels<P: AsRef<Path>>(root_dir: P, labels: ClassLabels) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Loading split from: {:?}", root_dir);

        let found = ClassLabels::from_class_dirs(&root_dir)?;
        labels.ensure_same(&found, &format!("class folders in {}", root_dir.display()))?;

        let mut samples = Vec::new();
        for (label, class_name) in labels.classes.iter().enumerate() {
            let class_dir = root_dir.join(class_name);

            let mut paths: Vec<PathBuf> = WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| is_image_file(p))
                .collect();
            paths.sort();

            debug!("Class '{}' (label {}): {} images", class_name, label, paths.len());

            samples.extend(paths.into_iter().map(|path| ImageSample {
                path,
                label,
                class_name: class_name.clone(),
            }));
        }

        info!(
            "Loaded {} samples across {} classes",
            samples.len(),
            labels.len()
        );

        Ok(Self {
            root_dir,
            samples,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    /// Images per class, indexed by label
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }

    /// (path, label) pairs for the Burn dataset
    pub fn pairs(&self) -> Vec<(PathBuf, usize)> {
        self.samples
            .iter()
            .map(|s| (s.path.clone(), s.label))
            .collect()
    }

    pub fn get_stats(&self) -> DatasetStats {
        DatasetStats {
            total_samples: self.samples.len(),
            num_classes: self.num_classes(),
            class_counts: self.class_counts(),
            class_names: self.labels.classes.clone(),
        }
    }
}

/// Statistics about one split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub num_classes: usize,
    pub class_counts: Vec<usize>,
    pub class_names: Vec<String>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self) {
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.num_classes);
        println!("  Samples per class:");

        for (idx, (name, count)) in self.class_names.iter().zip(&self.class_counts).enumerate() {
            let bar_len = if self.total_samples > 0 {
                (*count as f32 / self.total_samples as f32 * 40.0) as usize
            } else {
                0
            };
            println!("    {:2}. {:20} {:5} {}", idx, name, count, "█".repeat(bar_len));
        }
    }

    /// Classes without any images
    pub fn empty_classes(&self) -> Vec<&str> {
        self.class_names
            .iter()
            .zip(&self.class_counts)
            .filter(|(_, &count)| count == 0)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Fail early with a readable error when a split directory is missing
pub fn require_split_dir(root: &Path, split: &str) -> Result<PathBuf> {
    let dir = root.join(split);
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(SkinLesionError::PathNotFound(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch_images(dir: &Path, class: &str, names: &[&str]) {
        let class_dir = dir.join(class);
        std::fs::create_dir_all(&class_dir).unwrap();
        for name in names {
            std::fs::write(class_dir.join(name), b"not decoded by the loader").unwrap();
        }
    }

    #[test]
    fn test_labels_follow_sorted_folders() {
        let dir = TempDir::new().unwrap();
        touch_images(dir.path(), "Warts", &["b.jpg", "a.jpg"]);
        touch_images(dir.path(), "Acne", &["x.png", "notes.txt"]);

        let dataset = SkinLesionDataset::from_split_dir(dir.path()).unwrap();

        assert_eq!(dataset.labels.classes, vec!["Acne", "Warts"]);
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.class_counts(), vec![1, 2]);
        // sorted within a class
        assert!(dataset.samples[1].path.ends_with("Warts/a.jpg"));
        assert_eq!(dataset.samples[1].label, 1);
    }

    #[test]
    fn test_with_labels_rejects_different_folders() {
        let dir = TempDir::new().unwrap();
        touch_images(dir.path(), "Acne", &["a.jpg"]);

        let expected = ClassLabels::new(vec!["Acne".into(), "Warts".into()]);
        let err = SkinLesionDataset::with_labels(dir.path(), expected).unwrap_err();
        assert!(matches!(err, SkinLesionError::LabelMismatch(_)));
    }

    #[test]
    fn test_stats_reports_empty_classes() {
        let dir = TempDir::new().unwrap();
        touch_images(dir.path(), "Acne", &["a.jpg"]);
        touch_images(dir.path(), "Lichen", &[]);

        let stats = SkinLesionDataset::from_split_dir(dir.path()).unwrap().get_stats();
        assert_eq!(stats.empty_classes(), vec!["Lichen"]);
    }

    #[test]
    fn test_require_split_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("train")).unwrap();
        assert!(require_split_dir(dir.path(), "train").is_ok());
        assert!(matches!(
            require_split_dir(dir.path(), "val"),
            Err(SkinLesionError::PathNotFound(_))
        ));
    }
}
