//! Skin Lesion Classification CLI
//!
//! Entry point for splitting a raw image tree, training the classifier and
//! running a prediction from the command line.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use skin_lesion::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use skin_lesion::config::load_or_default;
use skin_lesion::dataset::{split_dataset, ExistingOutputPolicy};
use skin_lesion::inference::{LesionPredictor, Symptom, SymptomFlags};
use skin_lesion::model::Backbone;
use skin_lesion::training::run_training;
use skin_lesion::utils::logging::{init_logging, LogConfig};

/// Skin lesion classification with Burn
#[derive(Parser, Debug)]
#[command(name = "skin_lesion")]
#[command(version)]
#[command(about = "Skin lesion dataset splitting, training and inference", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Pipeline configuration file (TOML); flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split a `<class>/<image>` tree into train/val/test
    Split {
        /// Raw dataset root with one folder per class
        #[arg(short, long)]
        input: PathBuf,

        /// Output root for train/, val/ and test/
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        train_ratio: Option<f64>,

        #[arg(long)]
        val_ratio: Option<f64>,

        #[arg(long)]
        test_ratio: Option<f64>,

        /// Side length of the written images
        #[arg(long)]
        image_size: Option<u32>,

        /// JPEG quality (1-100)
        #[arg(long)]
        quality: Option<u8>,

        /// What to do when the output already holds split images (refuse, overwrite, merge)
        #[arg(long)]
        on_existing: Option<ExistingOutputPolicy>,
    },

    /// Train the classifier on a split dataset
    Train {
        /// Split root containing train/ and val/
        #[arg(short, long, default_value = "data/split")]
        data_dir: PathBuf,

        /// Output directory for checkpoints and logs
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        #[arg(short, long)]
        epochs: Option<usize>,

        #[arg(short, long)]
        batch_size: Option<usize>,

        #[arg(short, long)]
        learning_rate: Option<f64>,

        #[arg(long)]
        image_size: Option<usize>,

        /// efficientnet_b0 .. efficientnet_b3
        #[arg(long)]
        backbone: Option<Backbone>,

        #[arg(long)]
        seed: Option<u64>,

        /// Disable training-time augmentation
        #[arg(long, default_value = "false")]
        no_augmentation: bool,

        /// Burn record with pretrained backbone weights
        #[arg(long)]
        pretrained: Option<PathBuf>,
    },

    /// Run inference on a single image
    Infer {
        /// Path to input image
        #[arg(short, long)]
        input: PathBuf,

        /// Checkpoint stem or `.mpk` file
        #[arg(short, long)]
        model: PathBuf,

        /// Label artifact (defaults to `<stem>.labels.json`)
        #[arg(long)]
        labels: Option<PathBuf>,

        #[arg(long)]
        image_size: Option<usize>,

        #[command(flatten)]
        symptoms: SymptomArgs,
    },
}

#[derive(Args, Debug, Default)]
struct SymptomArgs {
    #[arg(long, default_value = "0")]
    itching: i64,

    #[arg(long, default_value = "0")]
    bleeding: i64,

    #[arg(long, default_value = "0")]
    scaly_skin: i64,

    #[arg(long, default_value = "0")]
    white_patches: i64,

    #[arg(long, default_value = "0")]
    sudden_onset: i64,
}

impl SymptomArgs {
    fn flags(&self) -> SymptomFlags {
        SymptomFlags::new()
            .with(Symptom::Itching, self.itching)
            .with(Symptom::Bleeding, self.bleeding)
            .with(Symptom::ScalySkin, self.scaly_skin)
            .with(Symptom::WhitePatches, self.white_patches)
            .with(Symptom::SuddenOnset, self.sudden_onset)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    let mut config = load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Split {
            input,
            output,
            seed,
            train_ratio,
            val_ratio,
            test_ratio,
            image_size,
            quality,
            on_existing,
        } => {
            let split = &mut config.split;
            if let Some(seed) = seed {
                split.seed = seed;
            }
            if let Some(ratio) = train_ratio {
                split.train_ratio = ratio;
            }
            if let Some(ratio) = val_ratio {
                split.val_ratio = ratio;
            }
            if let Some(ratio) = test_ratio {
                split.test_ratio = ratio;
            }
            if let Some(size) = image_size {
                split.image_size = size;
            }
            if let Some(quality) = quality {
                split.jpeg_quality = quality;
            }
            if let Some(policy) = on_existing {
                split.on_existing = policy;
            }

            cmd_split(&input, &output, &config.split)?;
        }

        Commands::Train {
            data_dir,
            output_dir,
            epochs,
            batch_size,
            learning_rate,
            image_size,
            backbone,
            seed,
            no_augmentation,
            pretrained,
        } => {
            let training = &mut config.training;
            if let Some(epochs) = epochs {
                training.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                training.batch_size = batch_size;
            }
            if let Some(lr) = learning_rate {
                training.learning_rate = lr;
            }
            if let Some(size) = image_size {
                training.image_size = size;
            }
            if let Some(backbone) = backbone {
                training.backbone = backbone;
            }
            if let Some(seed) = seed {
                training.seed = seed;
            }
            if no_augmentation {
                training.use_augmentation = false;
            }
            if pretrained.is_some() {
                training.pretrained_backbone = pretrained;
            }

            info!("Backend: {}", backend_name());
            let device = default_device();
            let summary = run_training::<TrainingBackend>(&config.training, &data_dir, &output_dir, &device)?;

            println!("{}", "Next steps:".cyan().bold());
            if let Some(last) = summary.checkpoints.last() {
                println!(
                    "  • Run inference: skin_lesion infer --model {} --input <image>",
                    last.display()
                );
            }
        }

        Commands::Infer {
            input,
            model,
            labels,
            image_size,
            symptoms,
        } => {
            if let Some(size) = image_size {
                config.inference.image_size = size;
            }
            cmd_infer(&input, &model, labels.as_deref(), &config.inference, &symptoms.flags())?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════════╗
 ║   Skin Lesion Classification                                     ║
 ║   Dataset splitting, training and inference with Burn + Rust     ║
 ╚══════════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_split(input: &Path, output: &Path, config: &skin_lesion::SplitConfig) -> Result<()> {
    info!("Splitting {:?} into {:?}", input, output);
    println!("{}", "Splitting Dataset...".cyan().bold());

    let summary = split_dataset(input, output, config)?;
    println!("{}", summary);

    if summary.failed > 0 {
        println!(
            "{} {} image(s) could not be processed, see {}",
            "Warning:".yellow(),
            summary.failed,
            output.join(skin_lesion::dataset::split::ERROR_LOG_FILE).display()
        );
    }
    println!("{}", "Split Complete!".green().bold());
    Ok(())
}

fn cmd_infer(
    input: &Path,
    model: &Path,
    labels: Option<&Path>,
    config: &skin_lesion::InferenceConfig,
    flags: &SymptomFlags,
) -> Result<()> {
    info!("Running inference on: {:?}", input);
    info!("Using model: {:?}", model);

    let predictor =
        LesionPredictor::<DefaultBackend>::load(model, labels, config.clone(), default_device())?;
    let outcome = predictor.predict_file(input, flags)?;

    println!("{}", "Prediction:".cyan().bold());
    println!("  Image: {:?}", input);
    if !flags.is_empty() {
        println!("  Symptoms: {:?}", flags);
    }
    print!("{}", outcome.display());

    Ok(())
}
