//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` and `Batcher` for skin lesion images. Items
//! carry CHW pixels in [0, 1]; the batcher applies ImageNet normalization on
//! the device.

use std::path::{Path, PathBuf};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::augmentation::Augmenter;
use crate::utils::error::{Result, SkinLesionError};

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A single image ready for batching
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LesionItem {
    /// Flattened CHW pixels in [0, 1], length 3 * H * W
    pub image: Vec<f32>,
    pub label: usize,
    pub path: String,
}

/// Decode an image file, convert to RGB and resize to a square
pub fn load_rgb(path: &Path, image_size: usize) -> Result<RgbImage> {
    let img = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| SkinLesionError::ImageLoad(path.to_path_buf(), e.to_string()))?;

    Ok(img
        .resize_exact(image_size as u32, image_size as u32, FilterType::Triangle)
        .to_rgb8())
}

/// RGB image to flat CHW floats in [0, 1]
pub fn to_chw(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (i, pixel) in img.pixels().enumerate() {
        data[i] = pixel[0] as f32 / 255.0;
        data[plane + i] = pixel[1] as f32 / 255.0;
        data[2 * plane + i] = pixel[2] as f32 / 255.0;
    }

    data
}

/// Lazily loaded dataset over (path, label) pairs.
///
/// With an augmenter attached, every `(epoch, index)` pair draws from its own
/// seeded generator, so a run is reproducible regardless of batch order.
#[derive(Debug, Clone)]
pub struct LesionBurnDataset {
    samples: Vec<(PathBuf, usize)>,
    image_size: usize,
    augmenter: Option<Augmenter>,
    seed: u64,
    epoch: usize,
}

impl LesionBurnDataset {
    pub fn new(samples: Vec<(PathBuf, usize)>, image_size: usize) -> Self {
        Self {
            samples,
            image_size,
            augmenter: None,
            seed: 0,
            epoch: 0,
        }
    }

    /// Attach training-time augmentation
    pub fn with_augmentation(mut self, augmenter: Augmenter, seed: u64) -> Self {
        self.augmenter = Some(augmenter);
        self.seed = seed;
        self
    }

    /// Select the epoch used to derive augmentation randomness
    pub fn set_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
    }

    pub fn is_augmented(&self) -> bool {
        self.augmenter.is_some()
    }

    /// Load one item, reporting decode failures
    pub fn try_get(&self, index: usize) -> Result<LesionItem> {
        let (path, label) = self.samples.get(index).ok_or_else(|| {
            SkinLesionError::Dataset(format!(
                "index {} out of range for {} samples",
                index,
                self.samples.len()
            ))
        })?;

        let mut img = load_rgb(path, self.image_size)?;

        if let Some(augmenter) = &self.augmenter {
            let item_seed = self
                .seed
                .wrapping_mul(1_000_003)
                .wrapping_add((self.epoch as u64) << 32)
                .wrapping_add(index as u64);
            let mut rng = ChaCha8Rng::seed_from_u64(item_seed);
            img = augmenter.apply(&img, &mut rng);
        }

        Ok(LesionItem {
            image: to_chw(&img),
            label: *label,
            path: path.to_string_lossy().to_string(),
        })
    }
}

impl Dataset<LesionItem> for LesionBurnDataset {
    fn get(&self, index: usize) -> Option<LesionItem> {
        match self.try_get(index) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping item {}: {}", index, e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images and labels
#[derive(Clone, Debug)]
pub struct LesionBatch<B: Backend> {
    /// [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Builds normalized batches on the target device
#[derive(Clone, Debug)]
pub struct LesionBatcher {
    image_size: usize,
}

impl LesionBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

/// Stack flat CHW images into a normalized `[n, 3, size, size]` tensor
pub fn images_to_tensor<B: Backend>(
    images: Vec<f32>,
    batch_size: usize,
    image_size: usize,
    device: &B::Device,
) -> Tensor<B, 4> {
    let images = Tensor::<B, 4>::from_floats(
        TensorData::new(images, [batch_size, 3, image_size, image_size]),
        device,
    );

    let mean = Tensor::<B, 4>::from_floats(
        TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]),
        device,
    );
    let std = Tensor::<B, 4>::from_floats(
        TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]),
        device,
    );

    (images - mean) / std
}

impl<B: Backend> Batcher<B, LesionItem, LesionBatch<B>> for LesionBatcher {
    fn batch(&self, items: Vec<LesionItem>, device: &B::Device) -> LesionBatch<B> {
        let batch_size = items.len();

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = images_to_tensor::<B>(images_data, batch_size, self.image_size, device);

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets_data, [batch_size]),
            device,
        );

        LesionBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::AugmentationConfig;
    use burn::backend::NdArray;
    use image::Rgb;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn write_image(dir: &Path, name: &str, color: [u8; 3]) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(20, 16, Rgb(color)).save(&path).unwrap();
        path
    }

    #[test]
    fn test_to_chw_layout() {
        let img = RgbImage::from_pixel(2, 2, Rgb([255, 0, 51]));
        let data = to_chw(&img);
        assert_eq!(data.len(), 12);
        assert_eq!(&data[0..4], &[1.0; 4]);
        assert_eq!(&data[4..8], &[0.0; 4]);
        assert!((data[8] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_dataset_loads_and_resizes() {
        let dir = TempDir::new().unwrap();
        let path = write_image(dir.path(), "a.png", [10, 20, 30]);
        let dataset = LesionBurnDataset::new(vec![(path, 3)], 8);

        let item = dataset.get(0).unwrap();
        assert_eq!(item.image.len(), 3 * 8 * 8);
        assert_eq!(item.label, 3);
        assert!(dataset.get(1).is_none());
    }

    #[test]
    fn test_try_get_reports_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.jpg");
        std::fs::write(&path, b"garbage").unwrap();
        let dataset = LesionBurnDataset::new(vec![(path, 0)], 8);

        assert!(dataset.try_get(0).is_err());
        assert!(dataset.get(0).is_none());
    }

    #[test]
    fn test_augmentation_is_seeded_per_epoch() {
        let dir = TempDir::new().unwrap();
        let img = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 15) as u8, (y * 15) as u8, 0]));
        let path = dir.path().join("g.png");
        img.save(&path).unwrap();

        let mut dataset = LesionBurnDataset::new(vec![(path, 0)], 16)
            .with_augmentation(Augmenter::new(AugmentationConfig::default()), 42);

        let first = dataset.try_get(0).unwrap().image;
        let again = dataset.try_get(0).unwrap().image;
        assert_eq!(first, again);

        dataset.set_epoch(1);
        let next_epoch = dataset.try_get(0).unwrap().image;
        assert_ne!(first, next_epoch);
    }

    #[test]
    fn test_batcher_shapes_and_normalization() {
        let device = Default::default();
        let batcher = LesionBatcher::new(2);
        let items = vec![
            LesionItem {
                image: vec![IMAGENET_MEAN[0]; 4]
                    .into_iter()
                    .chain(vec![IMAGENET_MEAN[1]; 4])
                    .chain(vec![IMAGENET_MEAN[2]; 4])
                    .collect(),
                label: 1,
                path: "a".into(),
            },
            LesionItem {
                image: vec![1.0; 12],
                label: 4,
                path: "b".into(),
            },
        ];

        let batch: LesionBatch<TestBackend> = batcher.batch(items, &device);
        assert_eq!(batch.images.dims(), [2, 3, 2, 2]);
        assert_eq!(batch.targets.dims(), [2]);

        let values = batch.images.into_data().to_vec::<f32>().unwrap();
        // first image equals the mean, so it normalizes to zero
        assert!(values[..12].iter().all(|v| v.abs() < 1e-5));
        let expected = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        assert!((values[12] - expected).abs() < 1e-5);

        let targets = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![1, 4]);
    }
}
