//! Training module for the skin lesion classifier
//!
//! This module provides:
//! - The supervised training loop (weighted cross-entropy, AdamW)
//! - Learning rate scheduling
//! - Per-epoch checkpoints and the CSV training log
//!
//! ## Artifacts
//!
//! A run writes into its output directory:
//! 1. `labels.json` and `training_config.json`
//! 2. `<backbone>_epoch_<NN>.mpk` with `.json` metadata and `.labels.json` per epoch
//! 3. `training_log.csv`
//! 4. `classification_report.txt` and `confusion_matrix.csv` after the final epoch

pub mod checkpoint;
pub mod log;
pub mod scheduler;
pub mod supervised;

// Re-export main types for convenience
pub use checkpoint::{load_checkpoint, save_checkpoint, CheckpointMetadata};
pub use log::TrainingLog;
pub use scheduler::LRScheduler;
pub use supervised::{inverse_frequency_weights, run_training, TrainingSummary};

// Re-export TrainingConfig from model::config where it's defined
pub use crate::model::config::TrainingConfig;
