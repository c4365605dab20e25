//! Prediction endpoint
//!
//! `POST /predict` takes a multipart form with an `image` file and optional
//! integer symptom fields. Every outcome is a JSON body with HTTP 200:
//! `{"success": true, "predictions": [...]}` or `{"success": false, "error": "..."}`.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

use skin_lesion::inference::{RankedPrediction, Symptom, SymptomFlags};

use crate::state::SharedState;

/// Multipart field carrying the uploaded image
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predictions: Option<Vec<RankedPrediction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictResponse {
    fn ok(predictions: Vec<RankedPrediction>) -> Self {
        Self {
            success: true,
            predictions: Some(predictions),
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            predictions: None,
            error: Some(message),
        }
    }
}

/// POST /predict
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<PredictResponse> {
    let result = match multipart {
        Ok(multipart) => run_prediction(&state, multipart).await,
        Err(rejection) => Err(rejection.body_text()),
    };

    match result {
        Ok(predictions) => Json(PredictResponse::ok(predictions)),
        Err(message) => {
            warn!("Prediction failed: {}", message);
            Json(PredictResponse::error(message))
        }
    }
}

async fn run_prediction(
    state: &SharedState,
    multipart: Multipart,
) -> Result<Vec<RankedPrediction>, String> {
    let (bytes, flags) = read_form(multipart).await?;

    let predictor = state.predictor.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        // the predictor is read-only, so a poisoned lock still holds a usable model
        let predictor = predictor.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        predictor.predict_bytes(&bytes, &flags)
    })
    .await
    .map_err(|e| format!("prediction task failed: {}", e))?
    .map_err(|e| e.to_string())?;

    info!(
        "Predicted {} in {:.1} ms",
        outcome
            .predictions
            .first()
            .map(|p| p.name.as_str())
            .unwrap_or("-"),
        outcome.inference_time_ms
    );
    Ok(outcome.predictions)
}

/// Collect the image bytes and symptom values; other fields are ignored
async fn read_form(mut multipart: Multipart) -> Result<(Vec<u8>, SymptomFlags), String> {
    let mut image = None;
    let mut flags = SymptomFlags::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("invalid multipart body: {}", e))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == IMAGE_FIELD {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| format!("failed to read image upload: {}", e))?;
            image = Some(bytes.to_vec());
        } else if Symptom::from_key(&name).is_some() {
            let text = field
                .text()
                .await
                .map_err(|e| format!("failed to read field '{}': {}", name, e))?;
            flags.parse_value(&name, &text).map_err(|e| e.to_string())?;
        }
    }

    let image = image.ok_or_else(|| format!("missing '{}' file in form data", IMAGE_FIELD))?;
    Ok((image, flags))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use image::{ImageFormat, Rgb, RgbImage};
    use serde_json::Value;
    use std::io::Cursor;
    use tower::ServiceExt;

    use crate::routes::tests::test_app;

    const BOUNDARY: &str = "X-SKIN-LESION-BOUNDARY";

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_fn(20, 20, |x, y| Rgb([(x * 12) as u8, (y * 12) as u8, 140]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    fn multipart_body(image: Option<&[u8]>, fields: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some(image) = image {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"lesion.png\"\r\nContent-Type: image/png\r\n\r\n",
                    BOUNDARY
                )
                .as_bytes(),
            );
            body.extend_from_slice(image);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn post_predict(body: Vec<u8>) -> (StatusCode, Value) {
        let (app, _dir) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/predict")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={}", BOUNDARY),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_predict_success() {
        let image = png_bytes();
        let (status, json) = post_predict(multipart_body(Some(&image), &[("itching", "1")])).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        let predictions = json["predictions"].as_array().unwrap();
        assert_eq!(predictions.len(), 5);
        assert!(predictions[0]["name"].is_string());
        let probs: Vec<f64> = predictions.iter().map(|p| p["prob"].as_f64().unwrap()).collect();
        assert!(probs.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn test_unparseable_image_is_structured_failure() {
        let (status, json) = post_predict(multipart_body(Some(b"not an image"), &[])).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("decode"));
    }

    #[tokio::test]
    async fn test_malformed_symptom_is_structured_failure() {
        let image = png_bytes();
        let (status, json) =
            post_predict(multipart_body(Some(&image), &[("white_patches", "yes")])).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("white_patches"));
    }

    #[tokio::test]
    async fn test_missing_image_field() {
        let (_, json) = post_predict(multipart_body(None, &[("itching", "1")])).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("image"));
    }

    #[tokio::test]
    async fn test_non_multipart_request_is_json() {
        let (app, _dir) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/predict")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
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
