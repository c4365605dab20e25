//! # Skin Lesion Classification
//!
//! A Rust library for skin lesion image classification using the Burn framework.
//!
//! ## Features
//!
//! - **Dataset splitting**: seeded, reproducible train/val/test partitioning with image normalization
//! - **Training**: EfficientNet-style classifier, class-weighted loss, AdamW with cosine annealing
//! - **Inference**: top-5 diagnoses with a symptom-based adjustment of the softmax output
//!
//! ## Modules
//!
//! - `dataset`: Class taxonomy, label artifact, splitter, loaders and augmentation
//! - `model`: EfficientNet-style network built with Burn and training hyperparameters
//! - `training`: Training loop, checkpoints, CSV log and learning rate scheduling
//! - `inference`: Predictor and symptom scoring
//! - `config`: TOML pipeline configuration
//! - `utils`: Error type, logging, metrics and helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use skin_lesion::dataset::{split_dataset, SplitConfig};
//! use skin_lesion::inference::{InferenceConfig, LesionPredictor, SymptomFlags};
//!
//! let summary = split_dataset("data/raw".as_ref(), "data/split".as_ref(), &SplitConfig::default())?;
//! println!("{}", summary);
//!
//! let predictor = LesionPredictor::<MyBackend>::load(
//!     "output/efficientnet_b3_epoch_30".as_ref(),
//!     None,
//!     InferenceConfig::default(),
//!     device,
//! )?;
//! let outcome = predictor.predict_bytes(&bytes, &SymptomFlags::new())?;
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::{load_toml_config, PipelineConfig};
pub use dataset::{split_dataset, ClassLabels, SkinLesionDataset, SplitConfig, CLASS_NAMES, NUM_CLASSES};
pub use inference::{InferenceConfig, LesionPredictor, PredictionOutcome, RankedPrediction, SymptomFlags};
pub use model::{Backbone, LesionClassifier, TrainingConfig};
pub use training::{run_training, TrainingSummary};
pub use utils::error::{Result, SkinLesionError};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
