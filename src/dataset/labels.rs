//! Persisted class label order.
//!
//! `labels.json` records which class name each output neuron stands for. It is
//! written by the trainer beside every checkpoint and read by the predictor.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::CLASS_NAMES;
use crate::utils::error::{Result, SkinLesionError};

/// Current artifact format version
pub const LABELS_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLabels {
    pub version: u32,
    pub classes: Vec<String>,
}

impl ClassLabels {
    pub fn new(classes: Vec<String>) -> Self {
        Self {
            version: LABELS_VERSION,
            classes,
        }
    }

    /// The built-in 9-class taxonomy
    pub fn canonical() -> Self {
        Self::new(CLASS_NAMES.iter().map(|s| s.to_string()).collect())
    }

    /// Sorted names of the immediate subdirectories of `root`
    pub fn from_class_dirs(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(SkinLesionError::PathNotFound(root.to_path_buf()));
        }

        let mut classes = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    classes.push(name.to_string());
                }
            }
        }
        classes.sort();

        if classes.is_empty() {
            return Err(SkinLesionError::Dataset(format!(
                "no class folders found in {}",
                root.display()
            )));
        }

        Ok(Self::new(classes))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    /// Fail with `LabelMismatch` unless both sides list the same classes in the same order
    pub fn ensure_same(&self, other: &ClassLabels, context: &str) -> Result<()> {
        if self.classes == other.classes {
            return Ok(());
        }
        Err(SkinLesionError::LabelMismatch(format!(
            "{}: expected [{}], found [{}]",
            context,
            self.classes.join(", "),
            other.classes.join(", ")
        )))
    }

    /// `<stem>.labels.json` beside a checkpoint stem
    pub fn sidecar_path(checkpoint_stem: &Path) -> PathBuf {
        let mut name = checkpoint_stem
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".labels.json");
        checkpoint_stem.with_file_name(name)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SkinLesionError::PathNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let labels: ClassLabels = serde_json::from_str(&content)?;

        if labels.version != LABELS_VERSION {
            return Err(SkinLesionError::Serialization(format!(
                "unsupported labels version {} in {}",
                labels.version,
                path.display()
            )));
        }
        if labels.is_empty() {
            return Err(SkinLesionError::Dataset(format!(
                "label file {} lists no classes",
                path.display()
            )));
        }
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_class_dirs_sorts_and_skips_files() {
        let dir = TempDir::new().unwrap();
        for name in ["Warts", "Acne", "Eczema"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("README.txt"), "x").unwrap();

        let labels = ClassLabels::from_class_dirs(dir.path()).unwrap();
        assert_eq!(labels.classes, vec!["Acne", "Eczema", "Warts"]);
        assert_eq!(labels.name(2), Some("Warts"));
    }

    #[test]
    fn test_from_class_dirs_empty_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(ClassLabels::from_class_dirs(dir.path()).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.json");
        ClassLabels::canonical().save(&path).unwrap();

        let loaded = ClassLabels::load(&path).unwrap();
        assert_eq!(loaded, ClassLabels::canonical());
        assert_eq!(loaded.name(7), Some("Vitiligo"));
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.json");
        std::fs::write(&path, r#"{"version": 9, "classes": ["Acne"]}"#).unwrap();
        assert!(ClassLabels::load(&path).is_err());
    }

    #[test]
    fn test_ensure_same_detects_reordering() {
        let a = ClassLabels::new(vec!["Acne".into(), "Warts".into()]);
        let b = ClassLabels::new(vec!["Warts".into(), "Acne".into()]);
        let err = a.ensure_same(&b, "validation split").unwrap_err();
        assert!(matches!(err, SkinLesionError::LabelMismatch(_)));
        assert!(a.ensure_same(&a.clone(), "same").is_ok());
    }

    #[test]
    fn test_sidecar_path() {
        let stem = Path::new("models/efficientnet_b3_epoch_03");
        assert_eq!(
            ClassLabels::sidecar_path(stem),
            PathBuf::from("models/efficientnet_b3_epoch_03.labels.json")
        );
    }
}
