//! Static file serving with a landing-page fallback
//!
//! `/` serves the landing page. Any other path is looked up inside the
//! static directory; when it does not resolve to a file there, the landing
//! page is served instead so client-side routes keep working.

use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

use crate::state::SharedState;

/// GET / - Landing page
pub async fn serve_index(State(state): State<SharedState>) -> Response {
    serve_landing_page(&state).await
}

/// Fallback for every unmatched path
pub async fn serve_static(State(state): State<SharedState>, uri: Uri) -> Response {
    let relative = uri.path().trim_start_matches('/');

    if !relative.is_empty() {
        if let Some(file) = resolve_static_path(&state.config.static_dir, relative) {
            return stream_file(&file).await;
        }
        debug!("No static file for {:?}, serving landing page", relative);
    }

    serve_landing_page(&state).await
}

async fn serve_landing_page(state: &SharedState) -> Response {
    match resolve_static_path(&state.config.static_dir, &state.config.landing_page) {
        Some(page) => stream_file(&page).await,
        None => {
            error!(
                "Landing page {:?} not found in {:?}",
                state.config.landing_page, state.config.static_dir
            );
            (StatusCode::NOT_FOUND, "Page not found").into_response()
        }
    }
}

/// Resolve `relative` inside `base`, refusing anything that escapes it
pub fn resolve_static_path(base: &Path, relative: &str) -> Option<PathBuf> {
    let canonical_base = base.canonicalize().ok()?;
    let canonical_file = base.join(relative).canonicalize().ok()?;

    if !canonical_file.starts_with(&canonical_base) || !canonical_file.is_file() {
        return None;
    }
    Some(canonical_file)
}

/// Content type from the file extension
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

async fn stream_file(path: &Path) -> Response {
    let file = match fs::File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to open file {:?}: {}", path, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to open file").into_response();
        }
    };

    let body = Body::from_stream(ReaderStream::new(file));
    ([(header::CONTENT_TYPE, content_type_for(path))], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::routes::tests::test_app;

    async fn get(path: &str) -> (StatusCode, String, String) {
        let (app, _dir) = test_app();
        let response = app
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, String::from_utf8_lossy(&bytes).to_string())
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let site = dir.path().join("site");
        std::fs::create_dir_all(&site).unwrap();
        std::fs::write(site.join("a.css"), "body{}").unwrap();
        std::fs::write(dir.path().join("secret.txt"), "nope").unwrap();

        assert!(resolve_static_path(&site, "a.css").is_some());
        assert!(resolve_static_path(&site, "../secret.txt").is_none());
        assert!(resolve_static_path(&site, "missing.css").is_none());
        assert!(resolve_static_path(dir.path(), "site").is_none());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("home.html")), "text/html; charset=utf-8");
        assert_eq!(content_type_for(Path::new("js/model.js")), "text/javascript; charset=utf-8");
        assert_eq!(content_type_for(Path::new("x.PNG")), "image/png");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_root_serves_landing_page() {
        let (status, content_type, body) = get("/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("text/html"));
        assert!(body.contains("landing"));
    }

    #[tokio::test]
    async fn test_existing_asset_is_served() {
        let (status, content_type, body) = get("/js/app.js").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("text/javascript"));
        assert!(body.contains("console.log"));
    }

    #[tokio::test]
    async fn test_unknown_path_falls_back_to_landing_page() {
        let (status, _, body) = get("/history/42").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("landing"));
    }
}
