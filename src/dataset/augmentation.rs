//! Training-time data augmentation
//!
//! Random horizontal flip, rotation within ±`max_rotation_degrees` and
//! brightness/contrast jitter. Validation images never pass through here.

use image::{imageops, Rgb, RgbImage};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Augmentation strengths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Probability of a horizontal flip
    pub horizontal_flip_prob: f64,
    /// Rotation angle is drawn uniformly from [-max, max]
    pub max_rotation_degrees: f32,
    /// Brightness factor is drawn from [1 - b, 1 + b]
    pub brightness: f32,
    /// Contrast factor is drawn from [1 - c, 1 + c]
    pub contrast: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            horizontal_flip_prob: 0.5,
            max_rotation_degrees: 15.0,
            brightness: 0.2,
            contrast: 0.2,
        }
    }
}

impl AugmentationConfig {
    /// No-op augmentation
    pub fn disabled() -> Self {
        Self {
            horizontal_flip_prob: 0.0,
            max_rotation_degrees: 0.0,
            brightness: 0.0,
            contrast: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    /// Apply the full random pipeline
    pub fn apply<R: Rng + ?Sized>(&self, img: &RgbImage, rng: &mut R) -> RgbImage {
        let mut out = if rng.gen_bool(self.config.horizontal_flip_prob.clamp(0.0, 1.0)) {
            imageops::flip_horizontal(img)
        } else {
            img.clone()
        };

        if self.config.max_rotation_degrees > 0.0 {
            let max = self.config.max_rotation_degrees;
            let angle = rng.gen_range(-max..=max);
            out = rotate(&out, angle);
        }

        let brightness = jitter_factor(self.config.brightness, rng);
        let contrast = jitter_factor(self.config.contrast, rng);
        adjust_brightness_contrast(&mut out, brightness, contrast);

        out
    }
}

fn jitter_factor<R: Rng + ?Sized>(strength: f32, rng: &mut R) -> f32 {
    if strength <= 0.0 {
        return 1.0;
    }
    let low = (1.0 - strength).max(0.0);
    rng.gen_range(low..=1.0 + strength)
}

/// Rotate around the image center (bilinear sampling, black fill)
pub fn rotate(img: &RgbImage, degrees: f32) -> RgbImage {
    let (width, height) = img.dimensions();
    if degrees == 0.0 || width == 0 || height == 0 {
        return img.clone();
    }

    let (sin, cos) = degrees.to_radians().sin_cos();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;

    RgbImage::from_fn(width, height, |x, y| {
        // inverse mapping: output pixel -> source location
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let sx = cos * dx + sin * dy + cx;
        let sy = -sin * dx + cos * dy + cy;
        sample_bilinear(img, sx, sy)
    })
}

fn sample_bilinear(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    if x < -0.5 || y < -0.5 || x > max_x + 0.5 || y > max_y + 0.5 {
        return Rgb([0, 0, 0]);
    }
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Scale brightness, then blend towards the mean gray level by the contrast factor
pub fn adjust_brightness_contrast(img: &mut RgbImage, brightness: f32, contrast: f32) {
    if brightness == 1.0 && contrast == 1.0 {
        return;
    }

    for pixel in img.pixels_mut() {
        for c in 0..3 {
            pixel[c] = (pixel[c] as f32 * brightness).round().clamp(0.0, 255.0) as u8;
        }
    }

    if contrast == 1.0 {
        return;
    }

    let num_pixels = (img.width() * img.height()).max(1) as f32;
    let mean_gray = img
        .pixels()
        .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
        .sum::<f32>()
        / num_pixels;

    for pixel in img.pixels_mut() {
        for c in 0..3 {
            let value = mean_gray + contrast * (pixel[c] as f32 - mean_gray);
            pixel[c] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 128]))
    }

    #[test]
    fn test_disabled_is_identity() {
        let img = gradient(9, 7);
        let augmenter = Augmenter::new(AugmentationConfig::disabled());
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(augmenter.apply(&img, &mut rng), img);
    }

    #[test]
    fn test_always_flip() {
        let img = gradient(5, 5);
        let augmenter = Augmenter::new(AugmentationConfig {
            horizontal_flip_prob: 1.0,
            ..AugmentationConfig::disabled()
        });
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let out = augmenter.apply(&img, &mut rng);
        assert_eq!(out.get_pixel(0, 0), img.get_pixel(4, 0));
    }

    #[test]
    fn test_rotation_keeps_size_and_center() {
        let img = gradient(11, 11);
        let rotated = rotate(&img, 15.0);
        assert_eq!(rotated.dimensions(), (11, 11));
        assert_eq!(rotated.get_pixel(5, 5), img.get_pixel(5, 5));
    }

    #[test]
    fn test_rotation_by_90_degrees_moves_corners_inside() {
        let img = gradient(5, 5);
        let rotated = rotate(&img, 90.0);
        // a square rotated by 90 degrees stays fully covered
        assert_ne!(rotated.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_brightness_contrast() {
        let mut img = RgbImage::from_pixel(2, 2, Rgb([100, 100, 100]));
        adjust_brightness_contrast(&mut img, 1.5, 1.0);
        assert_eq!(img.get_pixel(0, 0), &Rgb([150, 150, 150]));

        // uniform image: contrast has nothing to stretch
        adjust_brightness_contrast(&mut img, 1.0, 0.5);
        assert_eq!(img.get_pixel(1, 1), &Rgb([150, 150, 150]));
    }

    #[test]
    fn test_same_seed_same_output() {
        let img = gradient(16, 16);
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let a = augmenter.apply(&img, &mut ChaCha8Rng::seed_from_u64(9));
        let b = augmenter.apply(&img, &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
