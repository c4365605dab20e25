//! Training Configuration
//!
//! Hyperparameters for a training run. A `TrainingConfig` is built once
//! (defaults, TOML file, CLI overrides), validated, then handed to the
//! trainer by reference.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::efficientnet::{Backbone, LesionClassifierConfig};
use crate::dataset::AugmentationConfig;
use crate::utils::error::{Result, SkinLesionError};

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Batch size for training and validation
    pub batch_size: usize,

    /// Number of training epochs
    pub epochs: usize,

    /// Initial learning rate
    pub learning_rate: f64,

    /// AdamW weight decay
    pub weight_decay: f32,

    /// Floor of the cosine schedule
    pub min_lr: f64,

    /// Training resolution (square)
    pub image_size: usize,

    pub backbone: Backbone,

    /// Overrides the backbone's width multiplier
    pub width_multiplier: Option<f64>,

    /// Overrides the backbone's depth multiplier
    pub depth_multiplier: Option<f64>,

    /// Random seed for reproducibility
    pub seed: u64,

    /// Apply augmentation to training images
    pub use_augmentation: bool,

    pub augmentation: AugmentationConfig,

    /// Burn record with backbone weights to start from
    pub pretrained_backbone: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            epochs: 30,
            learning_rate: 1e-4,
            weight_decay: 1e-2,
            min_lr: 0.0,
            image_size: 300,
            backbone: Backbone::EfficientNetB3,
            width_multiplier: None,
            depth_multiplier: None,
            seed: 42,
            use_augmentation: true,
            augmentation: AugmentationConfig::default(),
            pretrained_backbone: None,
        }
    }
}

impl TrainingConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SkinLesionError::Config("batch_size must be greater than 0".to_string()));
        }

        if self.epochs == 0 {
            return Err(SkinLesionError::Config("epochs must be greater than 0".to_string()));
        }

        if !(self.learning_rate > 0.0) {
            return Err(SkinLesionError::Config("learning_rate must be positive".to_string()));
        }

        if self.min_lr < 0.0 || self.min_lr > self.learning_rate {
            return Err(SkinLesionError::Config(
                "min_lr must be in range [0, learning_rate]".to_string(),
            ));
        }

        if self.image_size == 0 {
            return Err(SkinLesionError::Config("image_size must be greater than 0".to_string()));
        }

        if self.weight_decay < 0.0 {
            return Err(SkinLesionError::Config("weight_decay must not be negative".to_string()));
        }

        Ok(())
    }

    /// Model configuration for the given number of classes
    pub fn model_config(&self, num_classes: usize) -> LesionClassifierConfig {
        LesionClassifierConfig::new()
            .with_num_classes(num_classes)
            .with_backbone(self.backbone)
            .with_width_multiplier(self.width_multiplier)
            .with_depth_multiplier(self.depth_multiplier)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.epochs, 30);
        assert_eq!(config.image_size, 300);
        assert_eq!(config.backbone, Backbone::EfficientNetB3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_training_config_validation() {
        let mut config = TrainingConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        config = TrainingConfig::default();
        config.epochs = 0;
        assert!(config.validate().is_err());

        config = TrainingConfig::default();
        config.learning_rate = 0.0;
        assert!(config.validate().is_err());

        config = TrainingConfig::default();
        config.image_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TrainingConfig = toml::from_str(
            r#"
            epochs = 3
            backbone = "efficientnet_b0"
            "#,
        )
        .unwrap();

        assert_eq!(config.epochs, 3);
        assert_eq!(config.backbone, Backbone::EfficientNetB0);
        assert_eq!(config.batch_size, 32);
    }

    #[test]
    fn test_save_writes_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let config = TrainingConfig {
            epochs: 7,
            use_augmentation: false,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let json = std::fs::read_to_string(&path).unwrap();
        let loaded: TrainingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_model_config_carries_overrides() {
        let config = TrainingConfig {
            width_multiplier: Some(0.5),
            ..Default::default()
        };
        let model_config = config.model_config(9);
        assert_eq!(model_config.num_classes, 9);
        assert_eq!(model_config.width_multiplier, Some(0.5));
        assert_eq!(model_config.depth_multiplier, None);
    }
}
