//! Utilities: error type, logging setup, evaluation metrics and small helpers.

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{Result, ResultExt, SkinLesionError};
pub use logging::{init_logging, LogConfig};
pub use metrics::{ClassificationReport, ConfusionMatrix};

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}

/// Progress bar in the style used by the CLI commands
pub fn progress_bar(len: u64, unit: &str) -> indicatif::ProgressBar {
    let template = format!("[{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{eta}})", unit);
    let style = indicatif::ProgressStyle::default_bar()
        .template(&template)
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar());

    let bar = indicatif::ProgressBar::new(len);
    bar.set_style(style);
    bar
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
