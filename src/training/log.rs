//! Per-epoch CSV log (`training_log.csv`)

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::utils::error::Result;

pub const TRAINING_LOG_FILE: &str = "training_log.csv";
pub const TRAINING_LOG_HEADER: &str = "Epoch,Train_Acc,Val_Acc";

/// Appends one row per epoch; accuracies are fractions written with 4 decimals
#[derive(Debug, Clone)]
pub struct TrainingLog {
    path: PathBuf,
}

impl TrainingLog {
    /// Create (or truncate) the log and write the header
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = File::create(path)?;
        writeln!(file, "{}", TRAINING_LOG_HEADER)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn append(&self, epoch: usize, train_accuracy: f64, val_accuracy: f64) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{},{:.4},{:.4}", epoch, train_accuracy, val_accuracy)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
