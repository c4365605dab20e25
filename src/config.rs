//! Pipeline configuration file
//!
//! One TOML file can configure all three stages:
//!
//! ```toml
//! [split]
//! seed = 42
//! on_existing = "refuse"
//!
//! [training]
//! epochs = 30
//! backbone = "efficientnet_b3"
//!
//! [inference]
//! image_size = 224
//! ```
//!
//! Missing sections and fields fall back to their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dataset::SplitConfig;
use crate::inference::InferenceConfig;
use crate::model::TrainingConfig;
use crate::utils::error::{Result, ResultExt, SkinLesionError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub split: SplitConfig,
    pub training: TrainingConfig,
    pub inference: InferenceConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.split.validate()?;
        self.training.validate()?;
        self.inference.validate()?;
        Ok(())
    }
}

/// Read a TOML pipeline configuration
pub fn load_toml_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        return Err(SkinLesionError::PathNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    Ok(toml::from_str(&content)?)
}

/// The file's configuration, or defaults when no file is given
pub fn load_or_default(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => load_toml_config(path),
        None => Ok(PipelineConfig::default()),
    }
}
