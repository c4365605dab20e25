//! Inference Predictor Module
//!
//! Loads a trained checkpoint and turns one image plus optional symptom
//! flags into a ranked list of diagnoses.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::tensor::backend::Backend;
use image::{imageops::FilterType, DynamicImage};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::symptoms::{adjust_probabilities, rank_predictions, RankedPrediction, SymptomFlags};
use crate::dataset::burn_dataset::{images_to_tensor, to_chw};
use crate::dataset::ClassLabels;
use crate::model::LesionClassifier;
use crate::training::checkpoint::{load_checkpoint, normalize_stem, record_path};
use crate::utils::error::{Result, SkinLesionError};

/// Inference settings
///
/// `image_size` defaults to 224 while training defaults to 300. The two are
/// independent; the predictor logs a warning when they differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub image_size: usize,
    /// Number of ranked entries returned
    pub top_k: usize,
    /// Multiplier applied to the symptom bias
    pub symptom_scale: f32,
    /// Decimal places of returned probabilities
    pub decimals: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            image_size: 224,
            top_k: 5,
            symptom_scale: 0.2,
            decimals: 4,
        }
    }
}

impl InferenceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.image_size == 0 {
            return Err(SkinLesionError::Config("image_size must be greater than 0".to_string()));
        }
        if self.top_k == 0 {
            return Err(SkinLesionError::Config("top_k must be greater than 0".to_string()));
        }
        if self.symptom_scale < 0.0 {
            return Err(SkinLesionError::Config("symptom_scale must not be negative".to_string()));
        }
        Ok(())
    }
}

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionOutcome {
    /// Top-k entries, highest first
    pub predictions: Vec<RankedPrediction>,

    /// Full adjusted distribution in label order
    pub probabilities: Vec<f32>,

    pub inference_time_ms: f64,
}

impl PredictionOutcome {
    /// Pretty print the prediction result
    pub fn display(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("Inference time: {:.2} ms\n", self.inference_time_ms));
        output.push_str(&format!("\nTop-{} predictions:\n", self.predictions.len()));
        for (i, p) in self.predictions.iter().enumerate() {
            output.push_str(&format!("  {}. {:<20} {:.4}\n", i + 1, p.name, p.prob));
        }
        output
    }
}

/// Resize to a square and flatten to CHW floats in [0, 1]
pub fn preprocess(image: &DynamicImage, image_size: usize) -> Vec<f32> {
    let resized = image
        .resize_exact(image_size as u32, image_size as u32, FilterType::Triangle)
        .to_rgb8();
    to_chw(&resized)
}

/// A loaded model with its label order and settings
#[derive(Debug)]
pub struct LesionPredictor<B: Backend> {
    model: LesionClassifier<B>,
    labels: ClassLabels,
    config: InferenceConfig,
    device: B::Device,
    checkpoint: Option<PathBuf>,
    trained_image_size: Option<usize>,
}

impl<B: Backend> LesionPredictor<B> {
    /// Load `<stem>.mpk` with its metadata and label artifact.
    ///
    /// `labels` defaults to the checkpoint's `<stem>.labels.json`.
    pub fn load(
        checkpoint: &Path,
        labels: Option<&Path>,
        config: InferenceConfig,
        device: B::Device,
    ) -> Result<Self> {
        config.validate()?;
        let stem = normalize_stem(checkpoint);

        let labels_path = labels
            .map(Path::to_path_buf)
            .unwrap_or_else(|| ClassLabels::sidecar_path(&stem));
        let labels = ClassLabels::load(&labels_path)?;

        let (model, metadata) = load_checkpoint::<B>(&stem, &device)?;
        if metadata.num_classes != labels.len() {
            return Err(SkinLesionError::LabelMismatch(format!(
                "checkpoint has {} outputs but {} lists {} classes",
                metadata.num_classes,
                labels_path.display(),
                labels.len()
            )));
        }

        let mut predictor = Self::from_parts(model, labels, config, device)?;
        predictor.checkpoint = Some(record_path(&stem));
        predictor.trained_image_size = Some(metadata.image_size);

        if let Some((inference, trained)) = predictor.resolution_mismatch() {
            warn!(
                "Inference resolution {} differs from training resolution {} recorded in {:?}",
                inference,
                trained,
                record_path(&stem)
            );
        }
        Ok(predictor)
    }

    /// Wrap an in-memory model. The label order must be the canonical one,
    /// since the symptom weight table is indexed by it.
    pub fn from_parts(
        model: LesionClassifier<B>,
        labels: ClassLabels,
        config: InferenceConfig,
        device: B::Device,
    ) -> Result<Self> {
        config.validate()?;
        ClassLabels::canonical().ensure_same(&labels, "symptom weight table")?;
        if model.num_classes() != labels.len() {
            return Err(SkinLesionError::LabelMismatch(format!(
                "model has {} outputs, labels list {} classes",
                model.num_classes(),
                labels.len()
            )));
        }

        info!("Predictor ready: {} classes at {}px", labels.len(), config.image_size);
        Ok(Self {
            model,
            labels,
            config,
            device,
            checkpoint: None,
            trained_image_size: None,
        })
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn checkpoint(&self) -> Option<&Path> {
        self.checkpoint.as_deref()
    }

    pub fn trained_image_size(&self) -> Option<usize> {
        self.trained_image_size
    }

    /// `(inference, training)` resolutions when the checkpoint was trained at another size
    pub fn resolution_mismatch(&self) -> Option<(usize, usize)> {
        self.trained_image_size
            .filter(|&trained| trained != self.config.image_size)
            .map(|trained| (self.config.image_size, trained))
    }

    /// Softmax distribution for one image, in label order
    pub fn probabilities(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let size = self.config.image_size;
        let input = images_to_tensor::<B>(preprocess(image, size), 1, size, &self.device);

        self.model
            .forward_softmax(input)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| SkinLesionError::Inference(format!("failed to read model output: {:?}", e)))
    }

    pub fn predict_image(&self, image: &DynamicImage, flags: &SymptomFlags) -> Result<PredictionOutcome> {
        let start = Instant::now();

        let base = self.probabilities(image)?;
        let probabilities = adjust_probabilities(&base, flags, self.config.symptom_scale)?;
        let predictions = rank_predictions(
            &probabilities,
            &self.labels,
            self.config.top_k,
            self.config.decimals,
        );

        Ok(PredictionOutcome {
            predictions,
            probabilities,
            inference_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Decode an uploaded image and predict
    pub fn predict_bytes(&self, bytes: &[u8], flags: &SymptomFlags) -> Result<PredictionOutcome> {
        if bytes.is_empty() {
            return Err(SkinLesionError::InvalidInput("empty image upload".to_string()));
        }
        let image = image::load_from_memory(bytes)
            .map_err(|e| SkinLesionError::InvalidInput(format!("cannot decode image: {}", e)))?;
        self.predict_image(&image, flags)
    }

    /// Load an image file and predict
    pub fn predict_file(&self, path: &Path, flags: &SymptomFlags) -> Result<PredictionOutcome> {
        let image = image::open(path)
            .map_err(|e| SkinLesionError::ImageLoad(path.to_path_buf(), e.to_string()))?;
        self.predict_image(&image, flags)
    }
}
