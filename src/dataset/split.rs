//! Dataset Splitter
//!
//! Turns a raw `<input>/<class>/<image>` tree into
//! `<output>/{train,val,test}/<class>/<class>_<uuid>.jpg`.
//!
//! Every class is shuffled with its own `ChaCha8Rng` seeded from the
//! configured seed, then sliced: the first `floor(train * n)` files go to
//! train, the next `floor(val * n)` to val and the remainder to test. The
//! same seed and input therefore always give the same membership, while the
//! output file names are fresh UUIDs on every run.
//!
//! A file that fails to decode, resize or encode becomes an
//! [`ImageOutcome::Failed`] entry: it is written to `error_log.txt`, counted
//! in the [`SplitSummary`] and the run moves on.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Local;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageReader;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use super::{is_image_file, ClassLabels};
use crate::utils::error::{Result, SkinLesionError};

/// Name of the per-run failure log inside the output root
pub const ERROR_LOG_FILE: &str = "error_log.txt";

/// Name of the manifest written after a run
pub const SPLIT_INFO_FILE: &str = "split_info.json";

/// What to do when the output tree already holds split images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingOutputPolicy {
    /// Stop with `OutputNotEmpty`
    #[default]
    Refuse,
    /// Delete the existing split directories first
    Overwrite,
    /// Add the new images next to the existing ones
    Merge,
}

impl FromStr for ExistingOutputPolicy {
    type Err = SkinLesionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "refuse" => Ok(Self::Refuse),
            "overwrite" => Ok(Self::Overwrite),
            "merge" => Ok(Self::Merge),
            other => Err(SkinLesionError::Config(format!(
                "unknown output policy '{}' (expected refuse, overwrite or merge)",
                other
            ))),
        }
    }
}

impl fmt::Display for ExistingOutputPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refuse => write!(f, "refuse"),
            Self::Overwrite => write!(f, "overwrite"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// Configuration for splitting a raw dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub train_ratio: f64,
    pub val_ratio: f64,
    pub test_ratio: f64,
    /// Seed for the per-class shuffle
    pub seed: u64,
    /// Side length of the square output images
    pub image_size: u32,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    pub on_existing: ExistingOutputPolicy,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_ratio: 0.70,
            val_ratio: 0.15,
            test_ratio: 0.15,
            seed: 42,
            image_size: 300,
            jpeg_quality: 95,
            on_existing: ExistingOutputPolicy::Refuse,
        }
    }
}

impl SplitConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, ratio) in [
            ("train_ratio", self.train_ratio),
            ("val_ratio", self.val_ratio),
            ("test_ratio", self.test_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(SkinLesionError::Config(format!(
                    "{} must be in [0, 1], got {}",
                    name, ratio
                )));
            }
        }

        let sum = self.train_ratio + self.val_ratio + self.test_ratio;
        if (sum - 1.0).abs() > 1e-5 {
            return Err(SkinLesionError::Config(format!(
                "split ratios must sum to 1.0, got {}",
                sum
            )));
        }

        if self.image_size == 0 {
            return Err(SkinLesionError::Config("image_size must be > 0".into()));
        }

        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(SkinLesionError::Config(format!(
                "jpeg_quality must be in 1..=100, got {}",
                self.jpeg_quality
            )));
        }

        Ok(())
    }

    /// `(train_end, val_end)` slice bounds for a class with `total` images
    pub fn partition_bounds(&self, total: usize) -> (usize, usize) {
        let train_end = (self.train_ratio * total as f64).floor() as usize;
        let val_end = train_end + (self.val_ratio * total as f64).floor() as usize;
        (train_end.min(total), val_end.min(total))
    }
}

/// One of the three output partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    /// Directory name under the output root
    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// Shuffled and sliced membership of one class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassPlan {
    pub train: Vec<PathBuf>,
    pub val: Vec<PathBuf>,
    pub test: Vec<PathBuf>,
}

impl ClassPlan {
    pub fn files(&self, split: Split) -> &[PathBuf] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Deterministically assign a class's files to train/val/test.
///
/// Input order does not matter: files are sorted before the seeded shuffle.
pub fn plan_class_split(mut files: Vec<PathBuf>, config: &SplitConfig) -> ClassPlan {
    files.sort();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    files.shuffle(&mut rng);

    let (train_end, val_end) = config.partition_bounds(files.len());
    let test = files.split_off(val_end);
    let val = files.split_off(train_end);

    ClassPlan {
        train: files,
        val,
        test,
    }
}

/// Image files directly inside a class folder
pub fn list_class_images(class_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(class_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_image_file(p))
        .collect()
}

/// A file that could not be processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitFailure {
    pub source: PathBuf,
    pub class_name: String,
    pub reason: String,
}

impl SplitFailure {
    /// Line written to `error_log.txt`
    pub fn log_line(&self) -> String {
        let file_name = self
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string());
        format!(
            "Failed to process {} in class {}: {}",
            file_name, self.class_name, self.reason
        )
    }
}

/// Result of processing a single source image
#[derive(Debug, Clone)]
pub enum ImageOutcome {
    Written {
        split: Split,
        class_name: String,
        source: PathBuf,
        output: PathBuf,
    },
    Failed(SplitFailure),
}

/// Written-image counts for one class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSplitCounts {
    pub class_name: String,
    pub train: usize,
    pub val: usize,
    pub test: usize,
    pub failed: usize,
}

/// Where one source image ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitAssignment {
    pub split: Split,
    pub class_name: String,
    pub source: PathBuf,
    pub output: PathBuf,
}

/// Aggregated outcome of a split run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SplitSummary {
    pub classes: Vec<ClassSplitCounts>,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<SplitFailure>,
    pub assignments: Vec<SplitAssignment>,
}

impl SplitSummary {
    fn with_classes(classes: &[String]) -> Self {
        Self {
            classes: classes
                .iter()
                .map(|name| ClassSplitCounts {
                    class_name: name.clone(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    /// Fold one outcome into the counts
    pub fn record(&mut self, outcome: ImageOutcome) {
        match outcome {
            ImageOutcome::Written {
                split,
                class_name,
                source,
                output,
            } => {
                self.succeeded += 1;
                if let Some(counts) = self.class_mut(&class_name) {
                    match split {
                        Split::Train => counts.train += 1,
                        Split::Val => counts.val += 1,
                        Split::Test => counts.test += 1,
                    }
                }
                self.assignments.push(SplitAssignment {
                    split,
                    class_name,
                    source,
                    output,
                });
            }
            ImageOutcome::Failed(failure) => {
                self.failed += 1;
                if let Some(counts) = self.class_mut(&failure.class_name) {
                    counts.failed += 1;
                }
                self.failures.push(failure);
            }
        }
    }

    fn class_mut(&mut self, class_name: &str) -> Option<&mut ClassSplitCounts> {
        self.classes.iter_mut().find(|c| c.class_name == class_name)
    }

    /// Written images per split across all classes
    pub fn split_totals(&self) -> (usize, usize, usize) {
        self.classes.iter().fold((0, 0, 0), |(tr, va, te), c| {
            (tr + c.train, va + c.val, te + c.test)
        })
    }

    pub fn class(&self, class_name: &str) -> Option<&ClassSplitCounts> {
        self.classes.iter().find(|c| c.class_name == class_name)
    }
}

impl fmt::Display for SplitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (train, val, test) = self.split_totals();
        writeln!(f, "Split Summary:")?;
        writeln!(f, "  Written:  {}", self.succeeded)?;
        writeln!(f, "  Failed:   {}", self.failed)?;
        writeln!(f, "  Train / Val / Test: {} / {} / {}", train, val, test)?;
        for c in &self.classes {
            writeln!(
                f,
                "    {:20} {:5} {:5} {:5}{}",
                c.class_name,
                c.train,
                c.val,
                c.test,
                if c.failed > 0 {
                    format!("  ({} failed)", c.failed)
                } else {
                    String::new()
                }
            )?;
        }
        Ok(())
    }
}

/// Manifest persisted next to the split tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitManifest {
    pub created_at: String,
    pub source_dir: PathBuf,
    pub config: SplitConfig,
    pub classes: Vec<String>,
    pub summary: SplitSummary,
}

/// Decode, convert to RGB, resize and re-encode one image under a fresh name.
pub fn process_image(
    source: &Path,
    dest_dir: &Path,
    class_name: &str,
    config: &SplitConfig,
) -> Result<PathBuf> {
    let img = ImageReader::open(source)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| SkinLesionError::ImageLoad(source.to_path_buf(), e.to_string()))?;

    let rgb = image::imageops::resize(
        &img.to_rgb8(),
        config.image_size,
        config.image_size,
        FilterType::Lanczos3,
    );

    let output = dest_dir.join(format!("{}_{}.jpg", class_name, Uuid::new_v4().simple()));
    let mut writer = BufWriter::new(File::create(&output)?);
    let encoder = JpegEncoder::new_with_quality(&mut writer, config.jpeg_quality);
    rgb.write_with_encoder(encoder)?;
    writer.flush()?;

    Ok(output)
}

/// Whether any regular file exists below one of the split directories
fn output_has_split_images(output_root: &Path) -> bool {
    Split::ALL.iter().any(|split| {
        WalkDir::new(output_root.join(split.dir_name()))
            .into_iter()
            .filter_map(|e| e.ok())
            .any(|e| e.file_type().is_file())
    })
}

/// Apply the existing-output policy and create the directory tree up front
fn prepare_output(output_root: &Path, classes: &[String], policy: ExistingOutputPolicy) -> Result<()> {
    if output_has_split_images(output_root) {
        match policy {
            ExistingOutputPolicy::Refuse => {
                return Err(SkinLesionError::OutputNotEmpty(output_root.to_path_buf()));
            }
            ExistingOutputPolicy::Overwrite => {
                info!("Removing existing split directories in {:?}", output_root);
                for split in Split::ALL {
                    let dir = output_root.join(split.dir_name());
                    if dir.exists() {
                        std::fs::remove_dir_all(&dir)?;
                    }
                }
            }
            ExistingOutputPolicy::Merge => {
                warn!(
                    "Merging into non-empty output {:?}; existing images are kept",
                    output_root
                );
            }
        }
    }

    for split in Split::ALL {
        for class_name in classes {
            std::fs::create_dir_all(output_root.join(split.dir_name()).join(class_name))?;
        }
    }
    Ok(())
}

/// Split `input_root` into `output_root/{train,val,test}`.
///
/// Per-image failures never abort the run; they are returned in the summary
/// and appended to `error_log.txt`. Configuration and filesystem errors on
/// the output tree itself are returned as `Err`.
pub fn split_dataset(
    input_root: &Path,
    output_root: &Path,
    config: &SplitConfig,
) -> Result<SplitSummary> {
    config.validate()?;

    let labels = ClassLabels::from_class_dirs(input_root)?;
    info!(
        "Splitting {} classes from {:?} into {:?}",
        labels.len(),
        input_root,
        output_root
    );

    prepare_output(output_root, &labels.classes, config.on_existing)?;

    let plans: Vec<(String, ClassPlan)> = labels
        .classes
        .iter()
        .map(|class_name| {
            let files = list_class_images(&input_root.join(class_name));
            (class_name.clone(), plan_class_split(files, config))
        })
        .collect();

    let total: usize = plans.iter().map(|(_, plan)| plan.len()).sum();
    let progress = crate::utils::progress_bar(total as u64, "images");

    let mut error_log = BufWriter::new(File::create(output_root.join(ERROR_LOG_FILE))?);
    let mut summary = SplitSummary::with_classes(&labels.classes);

    for (class_name, plan) in &plans {
        info!(
            "{}: {} images -> train {}, val {}, test {}",
            class_name,
            plan.len(),
            plan.train.len(),
            plan.val.len(),
            plan.test.len()
        );

        for split in Split::ALL {
            let dest_dir = output_root.join(split.dir_name()).join(class_name);

            for source in plan.files(split) {
                let outcome = match process_image(source, &dest_dir, class_name, config) {
                    Ok(output) => ImageOutcome::Written {
                        split,
                        class_name: class_name.clone(),
                        source: source.clone(),
                        output,
                    },
                    Err(e) => ImageOutcome::Failed(SplitFailure {
                        source: source.clone(),
                        class_name: class_name.clone(),
                        reason: e.to_string(),
                    }),
                };

                if let ImageOutcome::Failed(failure) = &outcome {
                    let line = failure.log_line();
                    warn!("{}", line);
                    writeln!(error_log, "{}", line)?;
                }

                summary.record(outcome);
                progress.inc(1);
            }
        }
    }

    error_log.flush()?;
    progress.finish_and_clear();

    let manifest = SplitManifest {
        created_at: Local::now().to_rfc3339(),
        source_dir: input_root.to_path_buf(),
        config: config.clone(),
        classes: labels.classes.clone(),
        summary: summary.clone(),
    };
    std::fs::write(
        output_root.join(SPLIT_INFO_FILE),
        serde_json::to_string_pretty(&manifest)?,
    )?;

    info!(
        "Split finished: {} written, {} failed",
        summary.succeeded, summary.failed
    );

    Ok(summary)
}
