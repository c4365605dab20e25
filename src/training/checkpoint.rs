//! Checkpoint files
//!
//! Every epoch produces three files sharing one stem,
//! `<output>/<backbone>_epoch_<NN>`:
//! - `<stem>.mpk`: model record written by Burn's `CompactRecorder`
//! - `<stem>.json`: [`CheckpointMetadata`], enough to rebuild the architecture
//! - `<stem>.labels.json`: the class label order of the model head

use std::path::{Path, PathBuf};

use burn::{module::Module, record::CompactRecorder, tensor::backend::Backend};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::ClassLabels;
use crate::model::{Backbone, LesionClassifier, LesionClassifierConfig};
use crate::utils::error::{Result, SkinLesionError};

/// Extension appended by `CompactRecorder`
pub const RECORD_EXTENSION: &str = "mpk";

/// Everything needed to rebuild a model from its record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// One-based epoch number
    pub epoch: usize,
    pub train_accuracy: f64,
    pub val_accuracy: f64,
    pub learning_rate: f64,
    pub backbone: Backbone,
    #[serde(default)]
    pub width_multiplier: Option<f64>,
    #[serde(default)]
    pub depth_multiplier: Option<f64>,
    /// Resolution the model was trained at
    pub image_size: usize,
    pub num_classes: usize,
    pub saved_at: String,
}

impl CheckpointMetadata {
    pub fn model_config(&self) -> LesionClassifierConfig {
        LesionClassifierConfig::new()
            .with_num_classes(self.num_classes)
            .with_backbone(self.backbone)
            .with_width_multiplier(self.width_multiplier)
            .with_depth_multiplier(self.depth_multiplier)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SkinLesionError::PathNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// `<output>/<backbone>_epoch_<NN>` for a one-based epoch
pub fn checkpoint_stem(output_dir: &Path, backbone: Backbone, epoch: usize) -> PathBuf {
    output_dir.join(format!("{}_epoch_{:02}", backbone.id(), epoch))
}

/// Accept either a stem or the `.mpk` record path
pub fn normalize_stem(path: &Path) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some(RECORD_EXTENSION) => path.with_extension(""),
        _ => path.to_path_buf(),
    }
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut name = stem.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    stem.with_file_name(name)
}

pub fn record_path(stem: &Path) -> PathBuf {
    with_suffix(stem, ".mpk")
}

pub fn metadata_path(stem: &Path) -> PathBuf {
    with_suffix(stem, ".json")
}

/// Write the record, metadata and label sidecar for one epoch
pub fn save_checkpoint<B: Backend>(
    model: &LesionClassifier<B>,
    stem: &Path,
    metadata: &CheckpointMetadata,
    labels: &ClassLabels,
) -> Result<()> {
    if let Some(parent) = stem.parent() {
        std::fs::create_dir_all(parent)?;
    }

    model
        .clone()
        .save_file(stem.to_path_buf(), &CompactRecorder::new())
        .map_err(|e| SkinLesionError::Model(format!("failed to save model: {:?}", e)))?;

    metadata.save(&metadata_path(stem))?;
    labels.save(&ClassLabels::sidecar_path(stem))?;

    info!("Saved checkpoint: {:?}", record_path(stem));
    Ok(())
}

/// Rebuild the model described by `<stem>.json` and load `<stem>.mpk` into it
pub fn load_checkpoint<B: Backend>(
    stem: &Path,
    device: &B::Device,
) -> Result<(LesionClassifier<B>, CheckpointMetadata)> {
    let stem = normalize_stem(stem);
    let record = record_path(&stem);
    if !record.exists() {
        return Err(SkinLesionError::PathNotFound(record));
    }

    let metadata = CheckpointMetadata::load(&metadata_path(&stem))?;
    let model = LesionClassifier::<B>::new(&metadata.model_config(), device)
        .load_file(stem.clone(), &CompactRecorder::new(), device)
        .map_err(|e| SkinLesionError::Model(format!("failed to load {:?}: {:?}", record, e)))?;

    info!(
        "Loaded checkpoint {:?} (epoch {}, {} classes)",
        record, metadata.epoch, metadata.num_classes
    );
    Ok((model, metadata))
}

/// Timestamp used in checkpoint metadata
pub fn timestamp() -> String {
    Local::now().to_rfc3339()
}
