//! Skin Lesion Inference Server
//!
//! Loads a trained checkpoint once and serves `POST /predict`, a health
//! check, and the static front-end.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use skin_lesion::backend::{backend_name, default_device};
use skin_lesion::config::load_or_default;

use crate::state::{AppState, ServerConfig, ServerPredictor};

/// Skin Lesion Inference Server
#[derive(Parser, Debug)]
#[command(name = "skin-lesion-server")]
#[command(version)]
#[command(about = "HTTP inference service for the skin lesion classifier")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "5000")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Checkpoint stem or `.mpk` file
    #[arg(short, long, env = "SKIN_LESION_MODEL")]
    model: PathBuf,

    /// Label artifact (defaults to `<stem>.labels.json`)
    #[arg(long, env = "SKIN_LESION_LABELS")]
    labels: Option<PathBuf>,

    /// Directory holding the front-end files
    #[arg(long, env = "SKIN_LESION_STATIC_DIR", default_value = ".")]
    static_dir: PathBuf,

    /// Page served for `/` and unknown paths
    #[arg(long, default_value = "home.html")]
    landing_page: String,

    /// Preprocessing resolution; overrides the config file
    #[arg(long)]
    image_size: Option<usize>,

    /// Upload size limit in megabytes
    #[arg(long, default_value = "16")]
    max_upload_mb: usize,

    /// Pipeline configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let mut inference = load_or_default(cli.config.as_deref())?.inference;
    if let Some(size) = cli.image_size {
        inference.image_size = size;
    }

    let config = ServerConfig {
        static_dir: cli.static_dir,
        landing_page: cli.landing_page,
        max_upload_bytes: cli.max_upload_mb * 1024 * 1024,
        inference,
    };

    info!("Skin Lesion Inference Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Backend:     {}", backend_name());
    info!("  Model:       {:?}", cli.model);
    info!("  Static dir:  {:?}", config.static_dir);
    info!("  Image size:  {}", config.inference.image_size);
    info!("  Upload max:  {} MB", cli.max_upload_mb);

    if !config.static_dir.join(&config.landing_page).is_file() {
        warn!(
            "Landing page {:?} not found in {:?}. `/` will return 404.",
            config.landing_page, config.static_dir
        );
    }

    let predictor = ServerPredictor::load(
        &cli.model,
        cli.labels.as_deref(),
        config.inference.clone(),
        default_device(),
    )
    .with_context(|| format!("failed to load model from {:?}", cli.model))?;
    info!("Loaded {} classes", predictor.labels().len());

    let state = Arc::new(AppState::new(config, predictor));
    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
