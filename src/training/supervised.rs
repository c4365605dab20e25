//! Supervised Training Implementation
//!
//! A custom training loop on Burn's autodiff API: weighted cross-entropy,
//! AdamW, a cosine learning-rate schedule, a validation pass on the inner
//! backend after every epoch, and a checkpoint per epoch.

use std::path::{Path, PathBuf};

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion,
    },
};
use colored::Colorize;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::info;

use super::checkpoint::{self, CheckpointMetadata};
use super::log::{TrainingLog, TRAINING_LOG_FILE};
use super::scheduler::LRScheduler;
use crate::dataset::{
    loader::require_split_dir, Augmenter, ClassLabels, LesionBatch, LesionBatcher,
    LesionBurnDataset, LesionItem, SkinLesionDataset,
};
use crate::model::{LesionClassifier, TrainingConfig};
use crate::utils::error::{Result, SkinLesionError};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::{AccuracyTracker, ClassificationReport, RunningAverage};
use crate::utils::progress_bar;

pub const LABELS_FILE: &str = "labels.json";
pub const REPORT_FILE: &str = "classification_report.txt";
pub const CONFUSION_MATRIX_FILE: &str = "confusion_matrix.csv";
pub const CONFIG_FILE: &str = "training_config.json";

/// Result of a completed training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub epochs: usize,
    pub final_train_accuracy: f64,
    pub final_val_accuracy: f64,
    /// Checkpoint stems in epoch order
    pub checkpoints: Vec<PathBuf>,
    pub labels: ClassLabels,
    pub report: ClassificationReport,
}

/// Per-class loss weights `1 / count`
pub fn inverse_frequency_weights(counts: &[usize], labels: &ClassLabels) -> Result<Vec<f32>> {
    counts
        .iter()
        .enumerate()
        .map(|(idx, &count)| {
            if count == 0 {
                Err(SkinLesionError::Training(format!(
                    "class '{}' has no training images",
                    labels.name(idx).unwrap_or("?")
                )))
            } else {
                Ok(1.0 / count as f32)
            }
        })
        .collect()
}

/// Validation predictions of one pass
#[derive(Debug, Clone, Default)]
struct Evaluation {
    predictions: Vec<usize>,
    targets: Vec<usize>,
}

impl Evaluation {
    fn accuracy(&self) -> f64 {
        if self.targets.is_empty() {
            return 0.0;
        }
        let correct = self
            .predictions
            .iter()
            .zip(&self.targets)
            .filter(|(p, t)| p == t)
            .count();
        correct as f64 / self.targets.len() as f64
    }
}

/// Train on `<data_dir>/train`, validate on `<data_dir>/val`, write artifacts to `output_dir`
///
/// # Type Parameters
/// * `B` - The autodiff backend to use (e.g., `Autodiff<NdArray>` or `Autodiff<Cuda>`)
pub fn run_training<B: AutodiffBackend>(
    config: &TrainingConfig,
    data_dir: &Path,
    output_dir: &Path,
    device: &B::Device,
) -> Result<TrainingSummary> {
    config.validate()?;
    println!("{}", "Initializing Training...".green().bold());
    info!("Device: {:?}", device);

    B::seed(device, config.seed);
    std::fs::create_dir_all(output_dir)?;

    // Load the dataset
    println!("{}", "Loading Dataset...".cyan());
    let train_set = SkinLesionDataset::from_split_dir(require_split_dir(data_dir, "train")?)?;
    let labels = train_set.labels.clone();
    let val_set = SkinLesionDataset::with_labels(require_split_dir(data_dir, "val")?, labels.clone())?;

    let stats = train_set.get_stats();
    stats.print();

    if train_set.is_empty() {
        return Err(SkinLesionError::Training(format!(
            "no training images found under {}",
            data_dir.display()
        )));
    }
    let empty = stats.empty_classes();
    if !empty.is_empty() {
        return Err(SkinLesionError::Training(format!(
            "classes without training images: {}",
            empty.join(", ")
        )));
    }
    if val_set.is_empty() {
        return Err(SkinLesionError::Training(format!(
            "no validation images found under {}",
            data_dir.display()
        )));
    }

    let class_weights = inverse_frequency_weights(&train_set.class_counts(), &labels)?;

    labels.save(&output_dir.join(LABELS_FILE))?;
    config.save(&output_dir.join(CONFIG_FILE))?;

    // Create datasets and batcher
    let mut train_dataset = LesionBurnDataset::new(train_set.pairs(), config.image_size);
    if config.use_augmentation {
        train_dataset = train_dataset
            .with_augmentation(Augmenter::new(config.augmentation.clone()), config.seed);
    }
    let val_dataset = LesionBurnDataset::new(val_set.pairs(), config.image_size);
    let batcher = LesionBatcher::new(config.image_size);

    // Create model
    println!("{}", "Creating Model...".cyan());
    let mut model = LesionClassifier::<B>::new(&config.model_config(labels.len()), device);
    if let Some(path) = &config.pretrained_backbone {
        info!("Loading pretrained backbone from {:?}", path);
        model = model.with_backbone_weights(path, device)?;
    }

    let loss_fn = CrossEntropyLossConfig::new()
        .with_weights(Some(class_weights))
        .init(device);

    let mut optimizer = AdamWConfig::new()
        .with_weight_decay(config.weight_decay)
        .init();

    let scheduler = LRScheduler::cosine_annealing(config.learning_rate, config.min_lr, config.epochs);

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Training samples:   {}", train_dataset.len());
    println!("  Validation samples: {}", val_dataset.len());
    println!("  Classes:            {}", labels.len());
    println!("  Backbone:           {}", config.backbone);
    println!("  Image size:         {}", config.image_size);
    println!("  Epochs:             {}", config.epochs);
    println!("  Batch size:         {}", config.batch_size);
    println!("  Schedule:           {}", scheduler.description());
    println!("  Augmentation:       {}", train_dataset.is_augmented());
    println!();

    let csv_log = TrainingLog::create(&output_dir.join(TRAINING_LOG_FILE))?;
    let mut logger = TrainingLogger::new(config.epochs);
    let mut epoch_rng = ChaCha8Rng::seed_from_u64(config.seed);

    let mut checkpoints = Vec::with_capacity(config.epochs);
    let mut last_eval = Evaluation::default();
    let mut final_train_accuracy = 0.0;

    for epoch in 0..config.epochs {
        let learning_rate = scheduler.get_lr(epoch);
        logger.start_epoch(epoch, learning_rate);
        println!("{}", format!("Epoch {}/{}", epoch + 1, config.epochs).yellow().bold());

        train_dataset.set_epoch(epoch);
        let mut indices: Vec<usize> = (0..train_dataset.len()).collect();
        indices.shuffle(&mut epoch_rng);

        let mut epoch_loss = RunningAverage::new();
        let mut accuracy = AccuracyTracker::new();
        let progress = progress_bar(indices.len() as u64, "images");

        for batch_indices in indices.chunks(config.batch_size) {
            let items = load_batch(&train_dataset, batch_indices)?;
            progress.inc(batch_indices.len() as u64);

            let batch: LesionBatch<B> = batcher.batch(items, device);
            let batch_size = batch.targets.dims()[0];

            let output = model.forward(batch.images);
            let loss = loss_fn.forward(output.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            epoch_loss.add(loss_value);

            let predictions = output.argmax(1).reshape([batch_size]);
            let batch_correct: i64 = predictions
                .equal(batch.targets)
                .int()
                .sum()
                .into_scalar()
                .elem();
            accuracy.add(batch_correct as usize, batch_size);

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(learning_rate, model, grads);
        }
        progress.finish_and_clear();

        let train_accuracy = accuracy.accuracy();
        let eval = evaluate(&model.valid(), &val_dataset, &batcher, config.batch_size, device)?;
        let val_accuracy = eval.accuracy();

        logger.end_epoch(epoch_loss.average(), train_accuracy, val_accuracy);
        csv_log.append(epoch + 1, train_accuracy, val_accuracy)?;

        let stem = checkpoint::checkpoint_stem(output_dir, config.backbone, epoch + 1);
        let metadata = CheckpointMetadata {
            epoch: epoch + 1,
            train_accuracy,
            val_accuracy,
            learning_rate,
            backbone: config.backbone,
            width_multiplier: config.width_multiplier,
            depth_multiplier: config.depth_multiplier,
            image_size: config.image_size,
            num_classes: labels.len(),
            saved_at: checkpoint::timestamp(),
        };
        checkpoint::save_checkpoint(&model, &stem, &metadata, &labels)?;
        checkpoints.push(stem);

        println!(
            "  {} Loss: {:.4} | Train Acc: {:.4} | Val Acc: {:.4}",
            "→".cyan(),
            epoch_loss.average(),
            train_accuracy,
            val_accuracy,
        );

        final_train_accuracy = train_accuracy;
        last_eval = eval;
    }

    let final_val_accuracy = last_eval.accuracy();
    logger.log_complete(final_val_accuracy);

    let report = ClassificationReport::from_predictions(
        &last_eval.predictions,
        &last_eval.targets,
        &labels.classes,
    );
    println!();
    println!("{}", "Classification Report (validation, final epoch):".cyan().bold());
    println!("{}", report);
    report.save(&output_dir.join(REPORT_FILE))?;
    report
        .confusion_matrix
        .save_csv(&output_dir.join(CONFUSION_MATRIX_FILE), &labels.classes)?;

    println!("{}", "Training Complete!".green().bold());
    println!("  Final validation accuracy: {:.4}", final_val_accuracy);
    if let Some(last) = checkpoints.last() {
        println!("  Final checkpoint: {:?}", checkpoint::record_path(last));
    }

    Ok(TrainingSummary {
        epochs: config.epochs,
        final_train_accuracy,
        final_val_accuracy,
        checkpoints,
        labels,
        report,
    })
}

/// Run the model in evaluation mode over a dataset
fn evaluate<B: Backend>(
    model: &LesionClassifier<B>,
    dataset: &LesionBurnDataset,
    batcher: &LesionBatcher,
    batch_size: usize,
    device: &B::Device,
) -> Result<Evaluation> {
    let mut eval = Evaluation::default();
    let indices: Vec<usize> = (0..dataset.len()).collect();

    for chunk in indices.chunks(batch_size) {
        let items = load_batch(dataset, chunk)?;

        let batch: LesionBatch<B> = batcher.batch(items, device);
        let n = batch.targets.dims()[0];
        let predictions = model.forward(batch.images).argmax(1).reshape([n]);

        eval.predictions.extend(tensor_to_labels(predictions.into_data())?);
        eval.targets.extend(tensor_to_labels(batch.targets.into_data())?);
    }

    Ok(eval)
}

/// Load every item of a batch; a single unreadable image aborts the run
fn load_batch(dataset: &LesionBurnDataset, indices: &[usize]) -> Result<Vec<LesionItem>> {
    indices
        .iter()
        .map(|&i| {
            dataset.try_get(i).map_err(|e| {
                SkinLesionError::Training(format!("failed to load training batch: {}", e))
            })
        })
        .collect()
}

fn tensor_to_labels(data: burn::tensor::TensorData) -> Result<Vec<usize>> {
    let values = data
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| SkinLesionError::Training(format!("failed to read labels: {:?}", e)))?;
    Ok(values.into_iter().map(|v| v.max(0) as usize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Backbone;
    use burn::backend::{Autodiff, NdArray};
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn write_split(root: &Path, split: &str, class: &str, color: [u8; 3], count: usize) {
        let dir = root.join(split).join(class);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            RgbImage::from_pixel(24, 24, Rgb(color))
                .save(dir.join(format!("{}_{}.png", class, i)))
                .unwrap();
        }
    }

    fn tiny_config() -> TrainingConfig {
        TrainingConfig {
            batch_size: 2,
            epochs: 1,
            image_size: 32,
            backbone: Backbone::EfficientNetB0,
            width_multiplier: Some(0.25),
            depth_multiplier: Some(0.3),
            use_augmentation: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_inverse_frequency_weights() {
        let labels = ClassLabels::new(vec!["a".into(), "b".into(), "c".into()]);
        let weights = inverse_frequency_weights(&[10, 4, 1], &labels).unwrap();
        assert_eq!(weights, vec![0.1, 0.25, 1.0]);
    }

    #[test]
    fn test_inverse_frequency_weights_zero_count() {
        let labels = ClassLabels::new(vec!["a".into(), "b".into()]);
        let err = inverse_frequency_weights(&[3, 0], &labels).unwrap_err();
        assert!(err.to_string().contains("class 'b' has no training images"));
    }

    #[test]
    fn test_evaluation_accuracy() {
        let eval = Evaluation {
            predictions: vec![0, 1, 1, 2],
            targets: vec![0, 1, 2, 2],
        };
        assert_eq!(eval.accuracy(), 0.75);
        assert_eq!(Evaluation::default().accuracy(), 0.0);
    }

    #[test]
    fn test_missing_val_split_is_an_error() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_split(data.path(), "train", "A", [200, 10, 10], 2);

        let device = Default::default();
        let result = run_training::<TestBackend>(&tiny_config(), data.path(), out.path(), &device);
        assert!(matches!(result, Err(SkinLesionError::PathNotFound(_))));
    }

    #[test]
    fn test_val_with_different_classes_is_rejected() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_split(data.path(), "train", "A", [200, 10, 10], 2);
        write_split(data.path(), "train", "B", [10, 10, 200], 2);
        write_split(data.path(), "val", "A", [200, 10, 10], 1);
        write_split(data.path(), "val", "C", [10, 200, 10], 1);

        let device = Default::default();
        let result = run_training::<TestBackend>(&tiny_config(), data.path(), out.path(), &device);
        assert!(matches!(result, Err(SkinLesionError::LabelMismatch(_))));
    }

    #[test]
    fn test_corrupt_training_image_aborts_run() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_split(data.path(), "train", "A", [200, 10, 10], 2);
        write_split(data.path(), "train", "B", [10, 10, 200], 2);
        std::fs::write(data.path().join("train/A/corrupt.jpg"), b"not an image").unwrap();
        write_split(data.path(), "val", "A", [200, 10, 10], 1);
        write_split(data.path(), "val", "B", [10, 10, 200], 1);

        let device = Default::default();
        let result = run_training::<TestBackend>(&tiny_config(), data.path(), out.path(), &device);
        match result {
            Err(SkinLesionError::Training(msg)) => assert!(msg.contains("corrupt.jpg")),
            other => panic!("expected a training error, got {:?}", other.map(|s| s.epochs)),
        }
        assert!(!checkpoint::record_path(&out.path().join("efficientnet_b0_epoch_01")).exists());
    }

    #[test]
    fn test_corrupt_validation_image_aborts_run() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_split(data.path(), "train", "A", [200, 10, 10], 2);
        write_split(data.path(), "train", "B", [10, 10, 200], 2);
        write_split(data.path(), "val", "A", [200, 10, 10], 1);
        write_split(data.path(), "val", "B", [10, 10, 200], 1);
        std::fs::write(data.path().join("val/B/broken.png"), b"garbage").unwrap();

        let device = Default::default();
        let result = run_training::<TestBackend>(&tiny_config(), data.path(), out.path(), &device);
        assert!(matches!(result, Err(SkinLesionError::Training(_))));
    }

    #[test]
    fn test_class_without_training_images_is_an_error() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_split(data.path(), "train", "A", [200, 10, 10], 2);
        std::fs::create_dir_all(data.path().join("train/B")).unwrap();
        write_split(data.path(), "val", "A", [200, 10, 10], 1);
        write_split(data.path(), "val", "B", [10, 10, 200], 1);

        let device = Default::default();
        let result = run_training::<TestBackend>(&tiny_config(), data.path(), out.path(), &device);
        match result {
            Err(SkinLesionError::Training(msg)) => assert!(msg.contains(": B")),
            other => panic!("expected a training error, got {:?}", other.map(|s| s.epochs)),
        }
    }

    #[test]
    fn test_empty_validation_split_is_an_error() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_split(data.path(), "train", "A", [200, 10, 10], 2);
        write_split(data.path(), "train", "B", [10, 10, 200], 2);
        std::fs::create_dir_all(data.path().join("val/A")).unwrap();
        std::fs::create_dir_all(data.path().join("val/B")).unwrap();

        let device = Default::default();
        let result = run_training::<TestBackend>(&tiny_config(), data.path(), out.path(), &device);
        match result {
            Err(SkinLesionError::Training(msg)) => assert!(msg.contains("no validation images")),
            other => panic!("expected a training error, got {:?}", other.map(|s| s.epochs)),
        }
        assert!(!out.path().join(TRAINING_LOG_FILE).exists());
    }

    #[test]
    fn test_one_epoch_smoke() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write_split(data.path(), "train", "A", [200, 10, 10], 3);
        write_split(data.path(), "train", "B", [10, 10, 200], 2);
        write_split(data.path(), "val", "A", [200, 10, 10], 1);
        write_split(data.path(), "val", "B", [10, 10, 200], 1);

        let device = Default::default();
        let summary =
            run_training::<TestBackend>(&tiny_config(), data.path(), out.path(), &device).unwrap();

        assert_eq!(summary.epochs, 1);
        assert_eq!(summary.checkpoints.len(), 1);
        assert_eq!(summary.report.total_samples, 2);
        assert!((0.0..=1.0).contains(&summary.final_val_accuracy));

        let stem = out.path().join("efficientnet_b0_epoch_01");
        assert_eq!(summary.checkpoints[0], stem);
        assert!(checkpoint::record_path(&stem).exists());
        assert!(checkpoint::metadata_path(&stem).exists());
        assert!(ClassLabels::sidecar_path(&stem).exists());

        let labels = ClassLabels::load(&out.path().join(LABELS_FILE)).unwrap();
        assert_eq!(labels.classes, vec!["A", "B"]);

        let csv = std::fs::read_to_string(out.path().join(TRAINING_LOG_FILE)).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Epoch,Train_Acc,Val_Acc");
        assert!(lines[1].starts_with("1,"));

        assert!(out.path().join(REPORT_FILE).exists());
        assert!(out.path().join(CONFUSION_MATRIX_FILE).exists());
    }
}
