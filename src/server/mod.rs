//! HTTP front end.
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /` | upload page |
//! | `POST /upload` | multipart `file` (+ optional `job`) → deck + cards as JSON |
//! | `GET /download/{filename}` | a finished `.apkg` as an attachment |
//! | `GET /progress` | SSE stream of the process-wide progress mirror |
//! | `GET /progress/{job}` | SSE stream of one upload's progress |
//!
//! Every error leaves as `{"error": message, "code": code}` with the status
//! from [`Pdf2AnkiError::status_code`](crate::Pdf2AnkiError::status_code).

mod error;
mod handlers;

use crate::config::{ConversionConfig, ServerConfig};
use crate::error::Pdf2AnkiError;
use crate::pipeline::llm::CardExtractor;
use crate::progress::ProgressRegistry;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<dyn CardExtractor>,
    pub conversion: Arc<ConversionConfig>,
    pub server: Arc<ServerConfig>,
    pub registry: Arc<ProgressRegistry>,
}

impl AppState {
    pub fn new(
        extractor: Arc<dyn CardExtractor>,
        conversion: ConversionConfig,
        server: ServerConfig,
    ) -> Self {
        let registry = Arc::new(ProgressRegistry::new(server.progress_retention));
        Self {
            extractor,
            conversion: Arc::new(conversion),
            server: Arc::new(server),
            registry,
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let limit = state.server.max_upload_bytes;
    Router::new()
        .route("/", get(handlers::index))
        .route("/upload", post(handlers::upload))
        .route("/download/{filename}", get(handlers::download))
        .route("/progress", get(handlers::progress))
        .route("/progress/{job}", get(handlers::progress_job))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Bind `state.server.bind` and serve until Ctrl-C.
pub async fn serve(state: AppState) -> Result<(), Pdf2AnkiError> {
    state.server.validate()?;
    tokio::fs::create_dir_all(&state.server.output_dir)
        .await
        .map_err(|e| {
            Pdf2AnkiError::InvalidConfig(format!(
                "cannot create output dir '{}': {e}",
                state.server.output_dir.display()
            ))
        })?;

    let addr = state.server.bind;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Pdf2AnkiError::InvalidConfig(format!("cannot bind {addr}: {e}")))?;
    info!(
        "Listening on http://{} (decks → {})",
        addr,
        state.server.output_dir.display()
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Pdf2AnkiError::Internal(format!("server error: {e}")))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
