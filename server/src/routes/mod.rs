//! HTTP routes for the inference server

pub mod files;
pub mod health;
pub mod predict;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

/// Build the application router
pub fn router(state: SharedState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_check))
        .route("/predict", post(predict::predict))
        .route("/", get(files::serve_index))
        .fallback(files::serve_static)
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[cfg(test)]
pub mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::Request, http::StatusCode, Router};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use skin_lesion::backend::{default_device, DefaultBackend};
    use skin_lesion::inference::{InferenceConfig, LesionPredictor};
    use skin_lesion::model::{Backbone, LesionClassifier, LesionClassifierConfig};
    use skin_lesion::training::checkpoint::{checkpoint_stem, save_checkpoint, timestamp};
    use skin_lesion::training::CheckpointMetadata;
    use skin_lesion::ClassLabels;

    use super::router;
    use crate::state::{AppState, ServerConfig};

    /// Router over a tiny untrained model and a temporary static directory
    pub fn test_app() -> (Router, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("home.html"),
            "<html><body>landing</body></html>",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("js/app.js"), "console.log('ok');").unwrap();

        let device = default_device();
        let model_config = LesionClassifierConfig::new()
            .with_num_classes(9)
            .with_backbone(Backbone::EfficientNetB0)
            .with_width_multiplier(Some(0.25))
            .with_depth_multiplier(Some(0.3));
        let model = LesionClassifier::<DefaultBackend>::new(&model_config, &device);

        let inference = InferenceConfig {
            image_size: 32,
            ..InferenceConfig::default()
        };
        let predictor =
            LesionPredictor::from_parts(model, ClassLabels::canonical(), inference.clone(), device)
                .unwrap();

        let config = ServerConfig {
            static_dir: dir.path().to_path_buf(),
            inference,
            ..ServerConfig::default()
        };

        (router(Arc::new(AppState::new(config, predictor))), dir)
    }

    #[tokio::test]
    async fn test_health_reports_model() {
        let (app, _dir) = test_app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["model"]["classes"].as_array().unwrap().len(), 9);
        assert_eq!(json["model"]["image_size"], 32);
        assert!(json["model"]["trained_image_size"].is_null());
        assert_eq!(json["model"]["resolution_mismatch"], false);
    }

    #[tokio::test]
    async fn test_health_reports_training_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let device = default_device();
        let metadata = CheckpointMetadata {
            epoch: 3,
            train_accuracy: 0.5,
            val_accuracy: 0.5,
            learning_rate: 1e-4,
            backbone: Backbone::EfficientNetB0,
            width_multiplier: Some(0.25),
            depth_multiplier: Some(0.3),
            image_size: 48,
            num_classes: 9,
            saved_at: timestamp(),
        };
        let model = LesionClassifier::<DefaultBackend>::new(&metadata.model_config(), &device);
        let stem = checkpoint_stem(dir.path(), metadata.backbone, metadata.epoch);
        save_checkpoint(&model, &stem, &metadata, &ClassLabels::canonical()).unwrap();

        let inference = InferenceConfig {
            image_size: 32,
            ..InferenceConfig::default()
        };
        let predictor = LesionPredictor::load(&stem, None, inference.clone(), device).unwrap();
        let config = ServerConfig {
            static_dir: dir.path().to_path_buf(),
            inference,
            ..ServerConfig::default()
        };
        let app = router(Arc::new(AppState::new(config, predictor)));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["model"]["image_size"], 32);
        assert_eq!(json["model"]["trained_image_size"], 48);
        assert_eq!(json["model"]["resolution_mismatch"], true);
        assert!(json["model"]["checkpoint"]
            .as_str()
            .unwrap()
            .ends_with("efficientnet_b0_epoch_03.mpk"));
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected_as_json() {
        let (app, _dir) = test_app();
        let boundary = "B";
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"x.png\"\r\n\r\n",
            b = boundary
        )
        .into_bytes();
        body.extend(std::iter::repeat(0u8).take(17 * 1024 * 1024));
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/predict")
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={}", boundary),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["success"], false);
    }
}
