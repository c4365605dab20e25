//! Model module for the skin lesion classifier using the Burn framework
//!
//! This module provides:
//! - An EfficientNet-style classifier with a replaceable classification head
//! - Training hyperparameters
//!
//! ## Architecture
//!
//! Backbone variants `efficientnet_b0` through `efficientnet_b3` share one
//! base network and differ only in width and depth scaling. The native
//! resolution of `efficientnet_b3` is 300 px.

pub mod config;
pub mod efficientnet;

pub use config::TrainingConfig;
pub use efficientnet::{Backbone, LesionClassifier, LesionClassifierConfig};
