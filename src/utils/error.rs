//! Error Handling Module
//!
//! Defines the error type shared by the splitter, trainer and predictor.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for skin lesion pipeline operations
#[derive(Error, Debug)]
pub enum SkinLesionError {
    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model construction or (de)serialization
    #[error("Model error: {0}")]
    Model(String),

    /// Fatal training error
    #[error("Training error: {0}")]
    Training(String),

    /// Error while running a prediction
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Two components disagree on the class label order
    #[error("Class label mismatch: {0}")]
    LabelMismatch(String),

    /// Splitter output directory already holds split images
    #[error("Output directory '{0}' already contains split images (use --on-existing overwrite or merge)")]
    OutputNotEmpty(PathBuf),
}

/// Convenience Result type for pipeline operations
pub type Result<T> = std::result::Result<T, SkinLesionError>;

impl From<serde_json::Error> for SkinLesionError {
    fn from(err: serde_json::Error) -> Self {
        SkinLesionError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SkinLesionError {
    fn from(err: toml::de::Error) -> Self {
        SkinLesionError::Config(err.to_string())
    }
}

impl From<image::ImageError> for SkinLesionError {
    fn from(err: image::ImageError) -> Self {
        SkinLesionError::InvalidInput(format!("image: {}", err))
    }
}

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| SkinLesionError::InvalidInput(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| SkinLesionError::InvalidInput(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| SkinLesionError::InvalidInput(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| SkinLesionError::InvalidInput(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SkinLesionError::Dataset("no class folders".to_string());
        assert_eq!(format!("{}", err), "Dataset error: no class folders");
    }

    #[test]
    fn test_image_load_error_mentions_file() {
        let path = PathBuf::from("/data/raw/Acne/lesion_01.jpg");
        let err = SkinLesionError::ImageLoad(path, "truncated".to_string());
        assert!(format!("{}", err).contains("lesion_01.jpg"));
    }

    #[test]
    fn test_output_not_empty_suggests_policy() {
        let err = SkinLesionError::OutputNotEmpty(PathBuf::from("out"));
        assert!(err.to_string().contains("--on-existing"));
    }

    #[test]
    fn test_json_error_converts() {
        let parsed: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: SkinLesionError = parsed.unwrap_err().into();
        assert!(matches!(err, SkinLesionError::Serialization(_)));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<i32, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        let with_context = result.context("Failed to read labels");
        assert!(with_context.unwrap_err().to_string().contains("Failed to read labels"));
    }

    #[test]
    fn test_option_context() {
        let opt: Option<i32> = None;
        assert!(opt.context("Value was None").is_err());
    }
}
