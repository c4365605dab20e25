//! Application state for the inference server
//!
//! The predictor is loaded once at startup and owned by the state. Requests
//! take the lock one at a time; the model itself is never mutated.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use skin_lesion::backend::DefaultBackend;
use skin_lesion::inference::{InferenceConfig, LesionPredictor};

pub type ServerPredictor = LesionPredictor<DefaultBackend>;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Directory served for `/` and unmatched paths
    pub static_dir: PathBuf,
    /// File inside `static_dir` used for `/` and as the fallback page
    pub landing_page: String,
    /// Maximum request body size for uploads
    pub max_upload_bytes: usize,
    pub inference: InferenceConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            static_dir: PathBuf::from("."),
            landing_page: "home.html".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
            inference: InferenceConfig::default(),
        }
    }
}

/// Read-only facts about the loaded model
#[derive(Clone, Debug, Serialize)]
pub struct ModelInfo {
    pub classes: Vec<String>,
    pub checkpoint: Option<String>,
    pub image_size: usize,
    pub trained_image_size: Option<usize>,
    /// Served at a different resolution than the checkpoint was trained at
    pub resolution_mismatch: bool,
}

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    pub predictor: Arc<Mutex<ServerPredictor>>,
    pub model_info: ModelInfo,
    /// Server start time
    pub started_at: Instant,
    pub started_at_utc: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig, predictor: ServerPredictor) -> Self {
        let model_info = ModelInfo {
            classes: predictor.labels().classes.clone(),
            checkpoint: predictor.checkpoint().map(|p| p.display().to_string()),
            image_size: predictor.config().image_size,
            trained_image_size: predictor.trained_image_size(),
            resolution_mismatch: predictor.resolution_mismatch().is_some(),
        };

        Self {
            config,
            predictor: Arc::new(Mutex::new(predictor)),
            model_info,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
