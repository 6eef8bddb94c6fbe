//! HTTP surface: upload, history, health, the upload page and the generated
//! prototypes.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use serde::Serialize;
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::config::Config;
use crate::constants::{DEMOS_URL_PREFIX, RECENT_SESSIONS_ON_INDEX};
use crate::history::{HistoryStore, Session};
use crate::model::ModelClient;

mod upload;
mod views;

use upload::upload_handler;
use views::{IndexTemplate, RecentSession};

#[derive(Clone)]
pub(crate) struct AppState {
    config: Arc<Config>,
    client: Arc<dyn ModelClient>,
    history: Arc<HistoryStore>,
    started_at: Instant,
}

impl AppState {
    fn new(config: Config, client: Arc<dyn ModelClient>) -> Self {
        let history = HistoryStore::new(config.history_path());
        Self {
            config: Arc::new(config),
            client,
            history: Arc::new(history),
            started_at: Instant::now(),
        }
    }
}

#[derive(Serialize)]
struct HistoryResponse {
    success: bool,
    total: usize,
    sessions: Vec<Session>,
}

async fn history_handler(State(state): State<AppState>) -> Json<HistoryResponse> {
    let sessions = state.history.load().await.sessions;
    Json(HistoryResponse {
        success: true,
        total: sessions.len(),
        sessions,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthConfig {
    model: String,
    max_tokens: u32,
    max_image_dimension: u32,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime: f64,
    config: HealthConfig,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime: state.started_at.elapsed().as_secs_f64(),
        config: HealthConfig {
            model: state.config.model.clone(),
            max_tokens: state.config.max_tokens,
            max_image_dimension: state.config.max_image_dimension,
        },
    })
}

async fn index_handler(State(state): State<AppState>) -> IndexTemplate {
    let sessions = state
        .history
        .load()
        .await
        .sessions
        .into_iter()
        .take(RECENT_SESSIONS_ON_INDEX)
        .map(RecentSession::from)
        .collect();
    IndexTemplate {
        model: state.config.model.clone(),
        max_image_dimension: state.config.max_image_dimension,
        max_upload_mb: state.config.max_upload_bytes / (1024 * 1024),
        sessions,
    }
}

async fn styles_handler() -> impl IntoResponse {
    const STYLES: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/styles.css"));
    ([(CONTENT_TYPE, "text/css")], STYLES)
}

fn create_router(state: AppState) -> Router {
    let demos = ServeDir::new(state.config.output_dir());
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", axum::routing::get(index_handler))
        .route("/static/styles.css", axum::routing::get(styles_handler))
        .route("/upload", axum::routing::post(upload_handler))
        .route("/history", axum::routing::get(history_handler))
        .route("/health", axum::routing::get(health_handler))
        .nest_service(DEMOS_URL_PREFIX, demos)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Creates the data directories and serves until interrupted.
pub async fn setup_server(
    config: Config,
    client: Arc<dyn ModelClient>,
) -> Result<(), anyhow::Error> {
    config.ensure_dirs().await?;
    let addr = format!("{}:{}", config.listen_address, config.port);
    info!(
        "Using model {} (max {} tokens, images up to {}px), data in {}",
        config.model,
        config.max_tokens,
        config.max_image_dimension,
        config.data_dir.display()
    );
    let app = create_router(AppState::new(config, client));

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    Ok(())
}
