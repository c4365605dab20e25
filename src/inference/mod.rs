//! Inference module for model prediction
//!
//! This module provides:
//! - Checkpoint loading and single image prediction
//! - Symptom-based adjustment of the softmax output
//! - Top-k ranking of the adjusted distribution
//!
//! ## Scoring
//!
//! `adjusted = (softmax + 0.2 * bias) / sum`, where `bias` is the flag-weighted
//! sum of the symptom rows. Probabilities are rounded to 4 decimals before
//! the stable descending sort, so equal rounded values keep class order.

pub mod predictor;
pub mod symptoms;

// Re-export main types for convenience
pub use predictor::{InferenceConfig, LesionPredictor, PredictionOutcome};
pub use symptoms::{adjust_probabilities, rank_predictions, RankedPrediction, Symptom, SymptomFlags};
